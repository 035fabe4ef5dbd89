//! # Laminar CLI
//!
//! Command-line driver for cortical column networks.

mod run;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use laminar_core::{SimulationParams, SynapseChannel};
use laminar_engine::{CouplingKind, NetworkSpec};
use run::{Driver, RunConfig};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "laminar")]
#[command(author = "Yatrogenesis")]
#[command(version = "0.1.0")]
#[command(about = "Multi-population cortical column simulator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a network description with its stimuli
    Run {
        /// JSON network + stimuli file
        config: PathBuf,
        /// Number of steps (overrides the file)
        #[arg(short, long)]
        steps: Option<usize>,
        /// Noise RNG seed
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Standard deviation of per-unit Gaussian noise (0 disables)
        #[arg(short, long, default_value_t = 0.0)]
        noise: f64,
        /// Record every K steps (overrides the file)
        #[arg(short, long)]
        record_every: Option<usize>,
        /// Write results as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Build a network and report its topology
    Validate {
        /// JSON network file
        config: PathBuf,
    },

    /// List population models, gains, channels and plasticity rules
    List,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            steps,
            seed,
            noise,
            record_every,
            output,
        } => {
            println!("{} {}", "Loading network:".green().bold(), config.display());
            let run_config = RunConfig::load(&config)?;
            let defaults = SimulationParams::default();
            let params = SimulationParams {
                dt: run_config.network.dt,
                n_steps: steps.or(run_config.steps).unwrap_or(defaults.n_steps),
                record_every: record_every
                    .or(run_config.record_every)
                    .unwrap_or(defaults.record_every),
            };

            let mut driver = Driver::new(&run_config, seed, noise)?;
            println!(
                "  {} layers, {} rules, {} steps at dt = {}",
                driver.simulator().connections().dimension(),
                driver.simulator().connections().rules().len(),
                params.n_steps,
                params.dt
            );
            if noise > 0.0 {
                println!("  Noise: sigma = {} (seed {})", noise, seed);
            }

            let progress = ProgressBar::new(params.n_steps as u64);
            progress.set_style(
                ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} steps ({eta})")
                    .context("progress template")?,
            );
            let results = driver.run(&params, &progress)?;
            progress.finish_and_clear();

            println!("{}", "Mean layer activity:".green().bold());
            for series in &results.activity {
                println!(
                    "  {:<16} {:>8.4} {}",
                    series.name.cyan(),
                    series.mean(),
                    series.units.as_deref().unwrap_or("")
                );
            }

            let connections = driver.simulator().connections();
            if !connections.rules().is_empty() {
                println!("{}", "Final weights:".green().bold());
                for rule in connections.resolved_rules() {
                    for (source, target) in rule.weighted_pairs() {
                        if let (Some(s), Some(t)) =
                            (connections.address_of(source), connections.address_of(target))
                        {
                            println!(
                                "  {}/{} -> {}/{}: {:.4}",
                                s.0,
                                s.1,
                                t.0,
                                t.1,
                                connections.weight_at(source, target)
                            );
                        }
                    }
                }
            }

            if let Some(path) = output {
                let json = serde_json::to_string_pretty(&results)?;
                std::fs::write(&path, json)
                    .with_context(|| format!("writing {}", path.display()))?;
                println!("{} {}", "Results written to".green().bold(), path.display());
            }
        }

        Commands::Validate { config } => {
            println!("{} {}", "Validating:".green().bold(), config.display());
            let spec = NetworkSpec::load(&config)
                .with_context(|| format!("loading {}", config.display()))?;
            let sim = spec.build().context("building network")?;
            let connections = sim.connections();

            println!("  Columns: {}", sim.columns().len());
            println!("  Units:   {}", spec.n_units());
            println!("  Matrix:  {0}x{0}", connections.dimension());
            for index in 0..connections.dimension() {
                if let Some((col, layer)) = connections.address_of(index) {
                    println!("    [{}] column {} layer {}", index, col, layer.cyan());
                }
            }
            let multiplicative = connections
                .rules()
                .iter()
                .filter(|r| r.combine == CouplingKind::Multiplicative)
                .count();
            println!(
                "  Rules:   {} ({} multiplicative)",
                connections.rules().len(),
                multiplicative
            );
            match sim.plasticity() {
                Some(engine) => println!("  Plasticity: {}", engine.rule().label().cyan()),
                None => println!("  Plasticity: {}", "none".yellow()),
            }
            println!("{}", "OK".green().bold());
        }

        Commands::List => {
            println!("{}", "Population models:".green().bold());
            println!("  {} - conductance-based integrate-and-fire", "conductance".cyan());
            println!("  {} - first-order rate dynamics", "leaky_rate".cyan());
            println!("  {} - spike response kernels", "spike_response".cyan());
            println!("  {} - FitzHugh-Nagumo oscillators", "fitzhugh_nagumo".cyan());
            println!();
            println!("{}", "Gain functions:".green().bold());
            for gain in ["sigmoid", "threshold_linear", "step", "identity"] {
                println!("  {}", gain.cyan());
            }
            println!();
            println!("{}", "Input channels:".green().bold());
            for channel in SynapseChannel::ALL {
                println!("  {}", channel.as_str().cyan());
            }
            println!();
            println!("{}", "Plasticity rules:".green().bold());
            println!("  {} - pair-based STDP with soft bounds", "spike_timing".cyan());
            println!("  {} - rate covariance against running averages", "covariance".cyan());
        }
    }

    Ok(())
}
