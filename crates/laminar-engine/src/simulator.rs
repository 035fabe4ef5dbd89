//! Per-step orchestration across columns.
//!
//! One call to [`NetworkSimulator::run_step`] runs, in order:
//!
//! 1. validation of external inputs (nothing is mutated on failure)
//! 2. snapshot of every layer's mean readout from the previous step
//! 3. coupling resolution against the snapshot
//! 4. merge of external inputs
//! 5. population updates
//! 6. plasticity, then running averages for the covariance rule
//!
//! Coupling only ever sees the snapshot, so every edge carries a one-step
//! propagation delay.

use crate::column::{Column, ColumnState, LayerInputs};
use crate::connections::{ConnectionManager, CouplingKind, CouplingRule, ResolvedRule};
use crate::plasticity::{Observables, PlasticityEngine, PlasticityRule, RunningAverages};
use crate::population::{NeuronPopulation, PopulationKind};
use laminar_core::{
    ChannelInput, ChannelInputs, LaminarError, Rate, Result, SynapseChannel, Time, Weight,
};
use ndarray::{Array1, Array2};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// External inputs for one step: column index -> layer -> channel -> value
pub type ExternalInputs = HashMap<usize, LayerInputs>;

/// Channel inputs assembled during one step, one entry per matrix index.
/// Built fresh by every `run_step` call and consumed by the update phase.
#[derive(Debug)]
struct StepDrive {
    inputs: Vec<ChannelInputs>,
}

impl StepDrive {
    fn new(n_layers: usize) -> Self {
        Self {
            inputs: vec![ChannelInputs::new(); n_layers],
        }
    }

    fn add(&mut self, index: usize, channel: SynapseChannel, value: &ChannelInput) -> Result<()> {
        match self.inputs[index].entry(channel) {
            Entry::Occupied(mut e) => e.get_mut().accumulate(value),
            Entry::Vacant(e) => {
                e.insert(value.clone());
                Ok(())
            }
        }
    }

    fn take(&mut self, index: usize) -> ChannelInputs {
        std::mem::take(&mut self.inputs[index])
    }
}

/// Pick the concrete channel for a coupling contribution
fn route(
    channel: SynapseChannel,
    target: PopulationKind,
    weight: Weight,
    value: f64,
) -> (SynapseChannel, f64) {
    match (channel, target) {
        (SynapseChannel::Additive, PopulationKind::SpikeBased) if weight < 0.0 => {
            (SynapseChannel::Inh, value.abs())
        }
        (SynapseChannel::Additive, PopulationKind::SpikeBased) => (SynapseChannel::Exc, value),
        (SynapseChannel::Additive, PopulationKind::RateBased) => (SynapseChannel::Total, value),
        (ch, _) => (ch, value),
    }
}

/// Mean spike-time offset (post minus pre) over this step's paired events.
///
/// A post spike pairs with the most recent pre spike, and a pre spike with
/// the most recent post spike. A partner only counts when it lies nearer to
/// the new spike than to the same layer's previous volley (`prev_pre`,
/// `prev_post`: latest spikes strictly before `t`); otherwise it already
/// belongs to an earlier pairing. `None` when either side is not
/// spike-based, does not record spike times, or no event has a partner.
fn timing_offset(
    pre: &dyn NeuronPopulation,
    post: &dyn NeuronPopulation,
    t: Time,
    prev_pre: Option<Time>,
    prev_post: Option<Time>,
) -> Option<Time> {
    let (pre_spikes, pre_times) = (pre.spikes()?, pre.last_spike_times()?);
    let (post_spikes, post_times) = (post.spikes()?, post.last_spike_times()?);

    let latest = |times: &Array1<Time>| {
        times
            .iter()
            .copied()
            .filter(|x| x.is_finite())
            .fold(None, |acc: Option<Time>, x| Some(acc.map_or(x, |a| a.max(x))))
    };
    let nearer = |partner: Time, previous: Option<Time>| {
        previous.map_or(true, |p| t - partner < partner - p)
    };

    let mut sum = 0.0;
    let mut events = 0usize;
    if let Some(t_pre) = latest(pre_times).filter(|&x| nearer(x, prev_post)) {
        let n = post_spikes.iter().filter(|&&s| s).count();
        sum += n as f64 * (t - t_pre);
        events += n;
    }
    if let Some(t_post) = latest(post_times).filter(|&x| nearer(x, prev_pre)) {
        let n = pre_spikes.iter().filter(|&&s| s).count();
        sum += n as f64 * (t_post - t);
        events += n;
    }
    (events > 0).then(|| sum / events as f64)
}

#[derive(Debug, Clone)]
struct Plasticity {
    engine: PlasticityEngine,
    /// Plastic coupling rules by position; `None` means every rule
    rules: Option<Vec<usize>>,
    averages: Option<RunningAverages>,
}

/// Drives a fixed set of columns and their coupling one step at a time
#[derive(Debug)]
pub struct NetworkSimulator {
    columns: Vec<Column>,
    connections: ConnectionManager,
    dt: Time,
    /// First matrix index of each column
    offsets: Vec<usize>,
    /// (column position, layer position) per matrix index
    locations: Vec<(usize, usize)>,
    /// Time of each layer's latest step with any spike
    last_volley: Vec<Option<Time>>,
    plasticity: Option<Plasticity>,
}

impl NetworkSimulator {
    pub fn new(columns: Vec<Column>, rules: Vec<CouplingRule>, dt: Time) -> Result<Self> {
        if !(dt > 0.0) {
            return Err(LaminarError::Configuration(format!(
                "dt must be positive, got {}",
                dt
            )));
        }
        let connections = ConnectionManager::new(&columns, rules)?;

        let mut offsets = Vec::with_capacity(columns.len());
        let mut locations = Vec::with_capacity(connections.dimension());
        for (c, column) in columns.iter().enumerate() {
            offsets.push(locations.len());
            locations.extend((0..column.n_layers()).map(|l| (c, l)));
        }

        log::debug!(
            "network simulator: {} columns, {} layers, dt = {}",
            columns.len(),
            locations.len(),
            dt
        );

        Ok(Self {
            columns,
            connections,
            dt,
            offsets,
            last_volley: vec![None; locations.len()],
            locations,
            plasticity: None,
        })
    }

    pub fn with_plasticity(
        mut self,
        engine: PlasticityEngine,
        rules: Option<Vec<usize>>,
    ) -> Result<Self> {
        self.set_plasticity(engine, rules)?;
        Ok(self)
    }

    /// Attach a plasticity engine to the given coupling rules (all if `None`).
    /// Replaces any previous configuration and drops running averages.
    pub fn set_plasticity(
        &mut self,
        engine: PlasticityEngine,
        rules: Option<Vec<usize>>,
    ) -> Result<()> {
        let n_rules = self.connections.resolved_rules().len();
        if let Some(ids) = &rules {
            if let Some(bad) = ids.iter().find(|&&id| id >= n_rules) {
                return Err(LaminarError::Configuration(format!(
                    "plastic rule {} out of range ({} rules)",
                    bad, n_rules
                )));
            }
            if let Some((i, dup)) = ids
                .iter()
                .enumerate()
                .find(|&(i, id)| ids[..i].contains(id))
            {
                return Err(LaminarError::Configuration(format!(
                    "plastic rule {} listed twice (position {})",
                    dup, i
                )));
            }
        }
        let averages = match engine.rule() {
            PlasticityRule::Covariance(p) => Some(RunningAverages::new(self.dt, p.tau_avg)),
            PlasticityRule::SpikeTiming(_) => None,
        };
        log::debug!("plasticity enabled: {}", engine.rule().label());
        self.plasticity = Some(Plasticity {
            engine,
            rules,
            averages,
        });
        Ok(())
    }

    pub fn clear_plasticity(&mut self) {
        self.plasticity = None;
    }

    pub fn plasticity(&self) -> Option<&PlasticityEngine> {
        self.plasticity.as_ref().map(|p| &p.engine)
    }

    /// Running rate averages, once the covariance rule has observed a step
    pub fn rate_averages(&self) -> Option<&Array1<Rate>> {
        self.plasticity
            .as_ref()
            .and_then(|p| p.averages.as_ref())
            .and_then(|a| a.values())
    }

    pub fn dt(&self) -> Time {
        self.dt
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.iter().find(|c| c.index() == index)
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    pub fn connections_mut(&mut self) -> &mut ConnectionManager {
        &mut self.connections
    }

    /// Readout of every column, in column order
    pub fn get_state(&self) -> Vec<ColumnState> {
        self.columns.iter().map(Column::get_state).collect()
    }

    pub fn record_weights(&mut self) {
        self.connections.record_weights();
    }

    pub fn weight_history(&self) -> &[Array2<Weight>] {
        self.connections.weight_history()
    }

    /// Restore every population; weights are kept, running averages dropped.
    pub fn reset(&mut self) {
        for column in &mut self.columns {
            column.reset();
        }
        self.last_volley.fill(None);
        if let Some(averages) = self.plasticity.as_mut().and_then(|p| p.averages.as_mut()) {
            averages.clear();
        }
    }

    /// Mean readout of every layer, indexed like the weight matrix
    pub fn layer_means(&self) -> Array1<Rate> {
        self.columns
            .iter()
            .flat_map(|c| c.layers().iter().map(|l| l.population.mean_activity()))
            .collect()
    }

    fn population_at(&self, index: usize) -> &dyn NeuronPopulation {
        population_at(&self.columns, &self.locations, index)
    }

    fn validate_external(&self, external: &ExternalInputs) -> Result<()> {
        for (&col, layers) in external {
            match self.column(col) {
                Some(column) => column.validate_inputs(layers)?,
                None => {
                    if let Some(layer) = layers.keys().next() {
                        return Err(LaminarError::Lookup {
                            column: col,
                            layer: layer.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn resolve_coupling(&self, snapshot: &Array1<Rate>, drive: &mut StepDrive) -> Result<()> {
        for rule in self.connections.resolved_rules() {
            let target_kind = self.population_at(rule.target).kind();
            match rule.combine {
                CouplingKind::Additive => {
                    for &source in &rule.sources {
                        let w = self.connections.weight_at(source, rule.target);
                        let value = w * snapshot[source];
                        if value == 0.0 {
                            continue;
                        }
                        let (channel, value) = route(rule.channel, target_kind, w, value);
                        drive.add(rule.target, channel, &ChannelInput::Scalar(value))?;
                    }
                }
                CouplingKind::Multiplicative => {
                    let product: f64 = rule.sources.iter().map(|&s| snapshot[s]).product();
                    if product == 0.0 {
                        continue;
                    }
                    let w = self.connections.weight_at(rule.sources[0], rule.target);
                    let value = w * product;
                    if value == 0.0 {
                        continue;
                    }
                    let (channel, value) = route(rule.channel, target_kind, w, value);
                    drive.add(rule.target, channel, &ChannelInput::Scalar(value))?;
                }
                CouplingKind::Divisive => {
                    return Err(LaminarError::Configuration(
                        "divisive coupling is not supported".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Advance the whole network by one step.
    ///
    /// On error nothing has been mutated and the simulator can keep running.
    pub fn run_step(&mut self, step_index: usize, external: &ExternalInputs) -> Result<()> {
        self.validate_external(external)?;
        let t = step_index as f64 * self.dt;

        let snapshot = self.layer_means();
        let mut drive = StepDrive::new(self.connections.dimension());
        self.resolve_coupling(&snapshot, &mut drive)?;

        for (&col, layers) in external {
            for (layer, channels) in layers {
                let index = self
                    .connections
                    .index_of(col, layer)
                    .ok_or_else(|| LaminarError::Lookup {
                        column: col,
                        layer: layer.clone(),
                    })?;
                for (channel, value) in channels {
                    drive.add(index, *channel, value)?;
                }
            }
        }

        for (c, column) in self.columns.iter_mut().enumerate() {
            let offset = self.offsets[c];
            let inputs: LayerInputs = column
                .layer_names()
                .enumerate()
                .map(|(l, name)| (name.to_string(), drive.take(offset + l)))
                .filter(|(_, channels)| !channels.is_empty())
                .collect();
            column.update(&inputs, t)?;
        }

        if self.plasticity.is_some() {
            self.apply_plasticity(t);
        }
        self.note_volleys(t);
        log::trace!("step {} (t = {:.3}) complete", step_index, t);
        Ok(())
    }

    fn note_volleys(&mut self, t: Time) {
        for (index, last) in self.last_volley.iter_mut().enumerate() {
            let population = population_at(&self.columns, &self.locations, index);
            if population.spikes().is_some_and(|s| s.iter().any(|&x| x)) {
                *last = Some(t);
            }
        }
    }

    fn apply_plasticity(&mut self, t: Time) {
        let rates = self.layer_means();
        let Some(plasticity) = self.plasticity.as_mut() else {
            return;
        };
        let updates = plasticity_updates(
            plasticity,
            &self.connections,
            &self.columns,
            &self.locations,
            &self.last_volley,
            &rates,
            t,
        );

        let (w_min, w_max) = plasticity.engine.bounds();
        for (source, target, dw) in updates {
            let w = self.connections.apply_delta(source, target, dw, w_min, w_max);
            log::trace!("w[{} <- {}] += {:.6} -> {:.6}", target, source, dw, w);
        }

        if let Some(averages) = plasticity.averages.as_mut() {
            averages.update(&rates);
        }
    }

    /// Rewrite every rule's first-source weight with `f(w, pre_rates, post_rate)`.
    ///
    /// Rates are the current layer means. No clamping is applied.
    pub fn apply_plasticity_with<F>(&mut self, f: F)
    where
        F: Fn(Weight, &[Rate], Rate) -> Weight,
    {
        let rates = self.layer_means();
        let updates: Vec<(usize, usize, Weight)> = self
            .connections
            .resolved_rules()
            .iter()
            .filter_map(|rule| {
                let source = *rule.sources.first()?;
                let pre: Vec<Rate> = rule.sources.iter().map(|&s| rates[s]).collect();
                let w = self.connections.weight_at(source, rule.target);
                Some((source, rule.target, f(w, &pre, rates[rule.target])))
            })
            .collect();
        for (source, target, w) in updates {
            self.connections.set_weight_at(source, target, w);
        }
    }
}

fn population_at<'a>(
    columns: &'a [Column],
    locations: &[(usize, usize)],
    index: usize,
) -> &'a dyn NeuronPopulation {
    let (c, l) = locations[index];
    columns[c].layers()[l].population.as_ref()
}

/// Weight deltas for the plastic rules, computed before any write
fn plasticity_updates(
    plasticity: &mut Plasticity,
    connections: &ConnectionManager,
    columns: &[Column],
    locations: &[(usize, usize)],
    last_volley: &[Option<Time>],
    rates: &Array1<Rate>,
    t: Time,
) -> Vec<(usize, usize, Weight)> {
    let rules = connections.resolved_rules();
    let selected: Vec<&ResolvedRule> = match &plasticity.rules {
        Some(ids) => ids.iter().filter_map(|&id| rules.get(id)).collect(),
        None => rules.iter().collect(),
    };

    let mut updates = Vec::new();
    for rule in selected {
        for (source, target) in rule.weighted_pairs() {
            let observables = match plasticity.engine.rule() {
                PlasticityRule::SpikeTiming(_) => {
                    let pre = population_at(columns, locations, source);
                    let post = population_at(columns, locations, target);
                    let (prev_pre, prev_post) = (last_volley[source], last_volley[target]);
                    match timing_offset(pre, post, t, prev_pre, prev_post) {
                        Some(delta_t) => Observables::Timing { delta_t },
                        None => continue,
                    }
                }
                PlasticityRule::Covariance(_) => {
                    let Some(averages) = plasticity.averages.as_mut() else {
                        continue;
                    };
                    let avg = averages.ensure_init(rates);
                    Observables::Rates {
                        pre: rates[source],
                        post: rates[target],
                        pre_avg: avg[source],
                        post_avg: avg[target],
                    }
                }
            };
            let w = connections.weight_at(source, target);
            let dw = plasticity.engine.calculate_dw(w, &observables);
            if dw != 0.0 {
                updates.push((source, target, dw));
            }
        }
    }
    updates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::population::{
        ConductanceParams, ConductancePopulation, LeakyRatePopulation, RateParams,
    };

    fn kick(value: f64) -> ChannelInputs {
        [(SynapseChannel::Noise, ChannelInput::Scalar(value))]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_route_additive() {
        let spiking = PopulationKind::SpikeBased;
        assert_eq!(
            route(SynapseChannel::Additive, spiking, 2.0, 0.4),
            (SynapseChannel::Exc, 0.4)
        );
        assert_eq!(
            route(SynapseChannel::Additive, spiking, -2.0, -0.4),
            (SynapseChannel::Inh, 0.4)
        );
        assert_eq!(
            route(SynapseChannel::Additive, PopulationKind::RateBased, -2.0, -0.4),
            (SynapseChannel::Total, -0.4)
        );
        assert_eq!(
            route(SynapseChannel::Nmda, spiking, 1.0, 0.3),
            (SynapseChannel::Nmda, 0.3)
        );
    }

    #[test]
    fn test_timing_offset_causal_pair() {
        let params = ConductanceParams::default();
        let mut pre = ConductancePopulation::new(1, params.clone(), 0.1).unwrap();
        let mut post = ConductancePopulation::new(1, params, 0.1).unwrap();

        pre.update(&kick(20.0), 1.0).unwrap();
        post.update(&kick(0.0), 1.0).unwrap();
        // Pre spiked with no post partner yet
        assert_eq!(timing_offset(&pre, &post, 1.0, None, None), None);

        pre.update(&kick(0.0), 1.5).unwrap();
        post.update(&kick(20.0), 1.5).unwrap();
        let delta = timing_offset(&pre, &post, 1.5, Some(1.0), None).unwrap();
        assert!((delta - 0.5).abs() < 1e-12);

        // Same pair seen from the other side is anti-causal
        let delta = timing_offset(&post, &pre, 1.5, None, Some(1.0)).unwrap();
        assert!((delta + 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_timing_offset_skips_claimed_partner() {
        let params = ConductanceParams::default();
        let mut pre = ConductancePopulation::new(2, params.clone(), 0.1).unwrap();
        let mut post = ConductancePopulation::new(1, params, 0.1).unwrap();
        let pre_kick = |unit: usize| {
            let mut values = vec![0.0; 2];
            values[unit] = 20.0;
            [(SynapseChannel::Noise, ChannelInput::from(values))]
                .into_iter()
                .collect::<ChannelInputs>()
        };

        pre.update(&pre_kick(0), 1.0).unwrap();
        post.update(&kick(0.0), 1.0).unwrap();
        pre.update(&kick(0.0), 1.5).unwrap();
        post.update(&kick(20.0), 1.5).unwrap();
        pre.update(&pre_kick(1), 3.0).unwrap();
        post.update(&kick(0.0), 3.0).unwrap();
        assert!(pre.spikes().unwrap()[1]);

        // The post spike at 1.5 is nearer the pre volley at 1.0 than this one
        assert_eq!(timing_offset(&pre, &post, 3.0, Some(1.0), Some(1.5)), None);
        // Without an earlier pre volley it is this spike's partner
        let delta = timing_offset(&pre, &post, 3.0, None, Some(1.5)).unwrap();
        assert!((delta + 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_timing_offset_needs_spikes() {
        let conductance = ConductancePopulation::new(1, ConductanceParams::default(), 0.1).unwrap();
        let rate = LeakyRatePopulation::new(1, RateParams::default(), 0.1).unwrap();
        assert_eq!(timing_offset(&rate, &conductance, 0.0, None, None), None);
        assert_eq!(timing_offset(&conductance, &conductance, 0.0, None, None), None);
    }
}
