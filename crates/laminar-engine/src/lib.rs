//! # Laminar Engine
//!
//! Continuous-time simulation of interacting cortical columns.
//!
//! A network is a list of [`Column`]s, each an ordered set of named layers
//! backed by a [`NeuronPopulation`], plus a list of [`CouplingRule`]s that
//! turn the previous step's layer readouts into synaptic drive. The
//! [`NetworkSimulator`] advances everything in lock-step and optionally
//! adapts the coupling weights with a [`PlasticityEngine`].
//!
//! - Population variants: conductance-based integrate-and-fire, leaky rate,
//!   spike response model, FitzHugh-Nagumo
//! - Coupling: additive or multiplicative, over a dense weight matrix
//! - Plasticity: pair-based STDP, rate covariance
//! - Networks can be described declaratively and loaded from JSON
//!   ([`NetworkSpec`])
//!
//! Randomness never originates here: noise is supplied by the caller as an
//! ordinary input channel, so identical inputs give identical trajectories.

pub mod column;
pub mod connections;
pub mod network;
pub mod plasticity;
pub mod population;
pub mod simulator;

pub use column::{Column, ColumnSpec, ColumnState, Layer, LayerInputs, LayerSpec};
pub use connections::{ConnectionManager, CouplingKind, CouplingRule, ResolvedRule};
pub use network::{NetworkSpec, PlasticitySpec};
pub use plasticity::{
    CovarianceParams, Observables, PlasticityEngine, PlasticityRule, RunningAverages, StdpParams,
};
pub use population::{
    ConductanceParams, ConductancePopulation, FhnParams, FitzHughNagumoPopulation, LayerState,
    LeakyRatePopulation, NeuronPopulation, PopulationKind, PopulationSpec, RateParams,
    SpikeResponsePopulation, SrmParams,
};
pub use simulator::{ExternalInputs, NetworkSimulator};

pub use laminar_core::{
    ChannelInput, ChannelInputs, GainFunction, LaminarError, Result, SynapseChannel, Time,
};
