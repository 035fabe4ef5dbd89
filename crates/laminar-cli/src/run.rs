//! Driver loop: constant stimuli, seeded noise, periodic recording.

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use laminar_core::{ChannelInput, SimulationParams, SynapseChannel, TimeSeries};
use laminar_engine::{ExternalInputs, NetworkSimulator, NetworkSpec, PopulationKind};
use ndarray::Array2;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Constant input on one channel of one layer over a step window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stimulus {
    pub column: usize,
    pub layer: String,
    #[serde(default)]
    pub channel: SynapseChannel,
    pub value: ChannelInput,
    #[serde(default)]
    pub start: usize,
    /// Exclusive; runs to the end when absent
    #[serde(default)]
    pub stop: Option<usize>,
}

impl Stimulus {
    fn active(&self, step: usize) -> bool {
        step >= self.start && self.stop.map_or(true, |stop| step < stop)
    }
}

/// Network description plus what to feed it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(flatten)]
    pub network: NetworkSpec,
    #[serde(default)]
    pub stimuli: Vec<Stimulus>,
    #[serde(default)]
    pub steps: Option<usize>,
    #[serde(default)]
    pub record_every: Option<usize>,
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }
}

#[derive(Debug, Serialize)]
pub struct RunResults {
    pub dt: f64,
    pub steps: usize,
    pub seed: u64,
    pub noise_sigma: f64,
    /// Mean readout per layer, in weight-matrix order
    pub activity: Vec<TimeSeries>,
    pub final_weights: Array2<f64>,
    pub weight_history: Vec<Array2<f64>>,
}

/// Owns the simulator and everything that varies from step to step
pub struct Driver {
    sim: NetworkSimulator,
    stimuli: Vec<Stimulus>,
    rng: ChaCha8Rng,
    noise: Option<Normal<f64>>,
    sigma: f64,
    seed: u64,
    /// (column index, layer name, units)
    layers: Vec<(usize, String, usize)>,
}

impl Driver {
    pub fn new(config: &RunConfig, seed: u64, sigma: f64) -> Result<Self> {
        let sim = config.network.build().context("building network")?;
        let noise = if sigma > 0.0 {
            Some(Normal::new(0.0, sigma).context("invalid noise amplitude")?)
        } else {
            None
        };
        let layers = sim
            .columns()
            .iter()
            .flat_map(|c| {
                c.layers()
                    .iter()
                    .map(move |l| (c.index(), l.name.clone(), l.population.n_units()))
            })
            .collect();

        Ok(Self {
            sim,
            stimuli: config.stimuli.clone(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            noise,
            sigma,
            seed,
            layers,
        })
    }

    pub fn simulator(&self) -> &NetworkSimulator {
        &self.sim
    }

    fn inputs(&mut self, step: usize) -> Result<ExternalInputs> {
        let mut external = ExternalInputs::new();
        for stimulus in self.stimuli.iter().filter(|s| s.active(step)) {
            let slot = external
                .entry(stimulus.column)
                .or_default()
                .entry(stimulus.layer.clone())
                .or_default()
                .entry(stimulus.channel)
                .or_default();
            // Overlapping stimuli on one channel add up
            slot.accumulate(&stimulus.value).with_context(|| {
                format!("stimulus on column {} layer '{}'", stimulus.column, stimulus.layer)
            })?;
        }

        if let Some(noise) = &self.noise {
            for (col, layer, n_units) in &self.layers {
                let xi: Vec<f64> = (0..*n_units).map(|_| noise.sample(&mut self.rng)).collect();
                external
                    .entry(*col)
                    .or_default()
                    .entry(layer.clone())
                    .or_default()
                    .insert(SynapseChannel::Noise, ChannelInput::from(xi));
            }
        }
        Ok(external)
    }

    pub fn run(&mut self, params: &SimulationParams, progress: &ProgressBar) -> Result<RunResults> {
        params.validate()?;

        let mut activity: Vec<TimeSeries> = self
            .sim
            .columns()
            .iter()
            .flat_map(|c| {
                c.layers().iter().map(move |l| {
                    let units = match l.population.kind() {
                        PopulationKind::SpikeBased => "spike fraction",
                        PopulationKind::RateBased => "activity",
                    };
                    TimeSeries::new(&format!("{}/{}", c.index(), l.name)).with_units(units)
                })
            })
            .collect();
        let plastic = self.sim.plasticity().is_some();

        for step in 0..params.n_steps {
            let inputs = self.inputs(step)?;
            self.sim
                .run_step(step, &inputs)
                .with_context(|| format!("step {}", step))?;

            if params.should_record(step) {
                let t = params.time_of(step);
                for (series, value) in activity.iter_mut().zip(self.sim.layer_means().iter()) {
                    series.push(t, *value);
                }
                if plastic {
                    self.sim.record_weights();
                }
            }
            progress.inc(1);
        }

        log::info!("finished {} steps", params.n_steps);
        Ok(RunResults {
            dt: params.dt,
            steps: params.n_steps,
            seed: self.seed,
            noise_sigma: self.sigma,
            activity,
            final_weights: self.sim.connections().weights().clone(),
            weight_history: self.sim.weight_history().to_vec(),
        })
    }
}
