//! # Laminar Core
//!
//! Shared types for laminar column network simulation.
//!
//! ## Vocabulary
//!
//! | Concept | Type | Notes |
//! |---------|------|-------|
//! | Synaptic channel | [`SynapseChannel`] | `additive`, `exc`, `inh`, `nmda`, `total`, `noise` |
//! | Channel value | [`ChannelInput`] | Scalar (broadcast) or per-unit array |
//! | Rate gain | [`GainFunction`] | Sigmoid, threshold-linear, step, identity |
//! | Recorder | [`TimeSeries`] | Driver-side recording of observables |
//!
//! Everything numeric is `f64`; time is in milliseconds, voltages in mV.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Common errors
#[derive(Debug, Error)]
pub enum LaminarError {
    /// Malformed topology or parameters, detected at build time.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Per-step input array does not match the population size.
    #[error("Dimension error ({context}): expected {expected} values, got {got}")]
    Dimension {
        context: String,
        expected: usize,
        got: usize,
    },

    /// (column, layer) pair that is not part of the topology.
    #[error("Unknown layer '{layer}' in column {column}")]
    Lookup { column: usize, layer: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LaminarError>;

/// Time point (ms)
pub type Time = f64;

/// Voltage (mV)
pub type Voltage = f64;

/// Coupling weight (dimensionless)
pub type Weight = f64;

/// Population rate or mean activity
pub type Rate = f64;

// ============================================================================
// TIME SERIES
// ============================================================================

/// Time series data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeries {
    /// Time points
    pub time: Vec<Time>,
    /// Values at each time point
    pub values: Vec<f64>,
    /// Variable name
    pub name: String,
    /// Units
    pub units: Option<String>,
}

impl TimeSeries {
    pub fn new(name: &str) -> Self {
        Self {
            time: Vec::new(),
            values: Vec::new(),
            name: name.to_string(),
            units: None,
        }
    }

    pub fn with_units(mut self, units: &str) -> Self {
        self.units = Some(units.to_string());
        self
    }

    pub fn push(&mut self, t: Time, v: f64) {
        self.time.push(t);
        self.values.push(v);
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Mean over all recorded values (0 when empty)
    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }
}

// ============================================================================
// SIMULATION PARAMETERS
// ============================================================================

/// Driver-level simulation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationParams {
    /// Time step (ms)
    pub dt: Time,
    /// Number of steps to run
    pub n_steps: usize,
    /// Recording interval in steps (0 disables recording)
    pub record_every: usize,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            dt: 0.1,
            n_steps: 1000,
            record_every: 10,
        }
    }
}

impl SimulationParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.dt > 0.0) {
            return Err(LaminarError::Configuration(format!(
                "time step must be positive, got {}",
                self.dt
            )));
        }
        Ok(())
    }

    /// Simulated time at the start of `step`
    pub fn time_of(&self, step: usize) -> Time {
        step as f64 * self.dt
    }

    pub fn should_record(&self, step: usize) -> bool {
        self.record_every > 0 && step % self.record_every == 0
    }
}

// ============================================================================
// GAIN FUNCTIONS
// ============================================================================

/// Slope used to emulate a hard threshold with a sigmoid
pub const STEP_SLOPE: f64 = 50.0;

/// Static nonlinearity of a rate population
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GainFunction {
    /// Logistic: 1/(1+exp(-beta*(x-x0)))
    Sigmoid { beta: f64, x0: f64 },
    /// max(0, x-theta)
    ThresholdLinear { theta: f64 },
    /// Logistic with slope [`STEP_SLOPE`]
    Step { x0: f64 },
    /// f(x) = x
    Identity,
}

impl Default for GainFunction {
    fn default() -> Self {
        Self::Sigmoid { beta: 1.0, x0: 5.0 }
    }
}

impl GainFunction {
    /// Build a gain from a label and a parameter bag.
    ///
    /// Missing parameters fall back to `beta = 1`, `x0 = 5`, `theta = 2`.
    /// Unrecognized labels yield [`GainFunction::Identity`].
    pub fn from_label(label: &str, params: &HashMap<String, f64>) -> Self {
        let get = |key: &str, default: f64| params.get(key).copied().unwrap_or(default);
        match label {
            "sigmoid" => Self::Sigmoid {
                beta: get("beta", 1.0),
                x0: get("x0", 5.0),
            },
            "threshold_linear" => Self::ThresholdLinear {
                theta: get("theta", 2.0),
            },
            "step" => Self::Step { x0: get("x0", 5.0) },
            _ => Self::Identity,
        }
    }

    /// Evaluate gain at input x
    pub fn eval(&self, x: f64) -> f64 {
        match self {
            Self::Sigmoid { beta, x0 } => 1.0 / (1.0 + (-beta * (x - x0)).exp()),
            Self::ThresholdLinear { theta } => (x - theta).max(0.0),
            Self::Step { x0 } => 1.0 / (1.0 + (-STEP_SLOPE * (x - x0)).exp()),
            Self::Identity => x,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Sigmoid { .. } => "sigmoid",
            Self::ThresholdLinear { .. } => "threshold_linear",
            Self::Step { .. } => "step",
            Self::Identity => "identity",
        }
    }
}

// ============================================================================
// SYNAPTIC CHANNELS
// ============================================================================

/// Named input channel of a population
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SynapseChannel {
    /// Sign-routed: excitatory for non-negative drive, inhibitory otherwise
    Additive,
    #[serde(alias = "weighted_spikes", alias = "exc_spikes")]
    Exc,
    Inh,
    /// Voltage-gated excitatory channel
    Nmda,
    #[serde(alias = "I_total")]
    Total,
    #[serde(alias = "I_noise")]
    Noise,
}

impl SynapseChannel {
    pub const ALL: [SynapseChannel; 6] = [
        Self::Additive,
        Self::Exc,
        Self::Inh,
        Self::Nmda,
        Self::Total,
        Self::Noise,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Additive => "additive",
            Self::Exc => "exc",
            Self::Inh => "inh",
            Self::Nmda => "nmda",
            Self::Total => "total",
            Self::Noise => "noise",
        }
    }
}

impl Default for SynapseChannel {
    fn default() -> Self {
        Self::Additive
    }
}

impl fmt::Display for SynapseChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SynapseChannel {
    type Err = LaminarError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "additive" => Ok(Self::Additive),
            "exc" | "weighted_spikes" | "exc_spikes" => Ok(Self::Exc),
            "inh" => Ok(Self::Inh),
            "nmda" => Ok(Self::Nmda),
            "total" | "I_total" => Ok(Self::Total),
            "noise" | "I_noise" => Ok(Self::Noise),
            other => Err(LaminarError::Configuration(format!(
                "unknown synapse channel '{}'",
                other
            ))),
        }
    }
}

// ============================================================================
// CHANNEL VALUES
// ============================================================================

/// Value delivered on one channel for one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawChannelInput", into = "RawChannelInput")]
pub enum ChannelInput {
    /// Broadcast to every unit
    Scalar(f64),
    /// One value per unit
    Units(Array1<f64>),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawChannelInput {
    Scalar(f64),
    Units(Vec<f64>),
}

impl From<RawChannelInput> for ChannelInput {
    fn from(raw: RawChannelInput) -> Self {
        match raw {
            RawChannelInput::Scalar(x) => Self::Scalar(x),
            RawChannelInput::Units(v) => Self::Units(Array1::from(v)),
        }
    }
}

impl From<ChannelInput> for RawChannelInput {
    fn from(input: ChannelInput) -> Self {
        match input {
            ChannelInput::Scalar(x) => Self::Scalar(x),
            ChannelInput::Units(a) => Self::Units(a.to_vec()),
        }
    }
}

impl From<f64> for ChannelInput {
    fn from(x: f64) -> Self {
        Self::Scalar(x)
    }
}

impl From<Array1<f64>> for ChannelInput {
    fn from(a: Array1<f64>) -> Self {
        Self::Units(a)
    }
}

impl From<Vec<f64>> for ChannelInput {
    fn from(v: Vec<f64>) -> Self {
        Self::Units(Array1::from(v))
    }
}

impl Default for ChannelInput {
    fn default() -> Self {
        Self::Scalar(0.0)
    }
}

impl ChannelInput {
    /// Number of per-unit values, `None` for scalars
    pub fn len(&self) -> Option<usize> {
        match self {
            Self::Scalar(_) => None,
            Self::Units(a) => Some(a.len()),
        }
    }

    /// Scalars are valid for any population; arrays must match `n_units`.
    pub fn check_len(&self, n_units: usize, context: &str) -> Result<()> {
        match self.len() {
            Some(got) if got != n_units => Err(LaminarError::Dimension {
                context: context.to_string(),
                expected: n_units,
                got,
            }),
            _ => Ok(()),
        }
    }

    /// Expand to a per-unit array
    pub fn to_array(&self, n_units: usize) -> Array1<f64> {
        match self {
            Self::Scalar(x) => Array1::from_elem(n_units, *x),
            Self::Units(a) => a.clone(),
        }
    }

    /// Accumulate another value on the same channel
    pub fn accumulate(&mut self, other: &ChannelInput) -> Result<()> {
        match other {
            Self::Scalar(b) => match self {
                Self::Scalar(a) => *a += *b,
                Self::Units(a) => *a += *b,
            },
            Self::Units(b) => match self {
                Self::Scalar(a) => {
                    let merged = b + *a;
                    *self = Self::Units(merged);
                }
                Self::Units(a) => {
                    if a.len() != b.len() {
                        return Err(LaminarError::Dimension {
                            context: "channel accumulation".into(),
                            expected: a.len(),
                            got: b.len(),
                        });
                    }
                    *a += b;
                }
            },
        }
        Ok(())
    }

    pub fn scaled(&self, factor: f64) -> ChannelInput {
        match self {
            Self::Scalar(x) => Self::Scalar(x * factor),
            Self::Units(a) => Self::Units(a * factor),
        }
    }
}

/// Inputs for one population for one step
pub type ChannelInputs = HashMap<SynapseChannel, ChannelInput>;

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_gain_functions() {
        let sig = GainFunction::Sigmoid { beta: 1.0, x0: 5.0 };
        assert!((sig.eval(5.0) - 0.5).abs() < 1e-12);

        let tl = GainFunction::ThresholdLinear { theta: 2.0 };
        assert_eq!(tl.eval(1.0), 0.0);
        assert_eq!(tl.eval(3.5), 1.5);

        let step = GainFunction::Step { x0: 1.0 };
        assert!(step.eval(0.9) < 0.01);
        assert!(step.eval(1.1) > 0.99);
    }

    #[test]
    fn test_gain_from_label() {
        let mut params = HashMap::new();
        params.insert("beta".to_string(), 5.0);
        params.insert("x0".to_string(), 0.8);

        let g = GainFunction::from_label("sigmoid", &params);
        assert_eq!(g, GainFunction::Sigmoid { beta: 5.0, x0: 0.8 });

        let g = GainFunction::from_label("threshold_linear", &HashMap::new());
        assert_eq!(g, GainFunction::ThresholdLinear { theta: 2.0 });

        let g = GainFunction::from_label("tanh", &params);
        assert_eq!(g, GainFunction::Identity);
        assert_eq!(g.eval(-3.0), -3.0);
    }

    #[test]
    fn test_channel_parsing() {
        assert_eq!("exc".parse::<SynapseChannel>().unwrap(), SynapseChannel::Exc);
        assert_eq!("I_total".parse::<SynapseChannel>().unwrap(), SynapseChannel::Total);
        assert_eq!("I_noise".parse::<SynapseChannel>().unwrap(), SynapseChannel::Noise);
        assert!(matches!(
            "divisive".parse::<SynapseChannel>(),
            Err(LaminarError::Configuration(_))
        ));

        let ch: SynapseChannel = serde_json::from_str("\"weighted_spikes\"").unwrap();
        assert_eq!(ch, SynapseChannel::Exc);
        assert_eq!(SynapseChannel::default(), SynapseChannel::Additive);
    }

    #[test]
    fn test_channel_accumulate() {
        let mut x = ChannelInput::Scalar(1.0);
        x.accumulate(&ChannelInput::Scalar(2.0)).unwrap();
        assert_eq!(x, ChannelInput::Scalar(3.0));

        x.accumulate(&ChannelInput::from(vec![1.0, 2.0])).unwrap();
        assert_eq!(x, ChannelInput::Units(array![4.0, 5.0]));

        let err = x.accumulate(&ChannelInput::from(vec![1.0, 2.0, 3.0]));
        assert!(matches!(err, Err(LaminarError::Dimension { expected: 2, got: 3, .. })));
    }

    #[test]
    fn test_channel_check_len() {
        assert!(ChannelInput::Scalar(7.0).check_len(100, "L4").is_ok());
        assert!(ChannelInput::from(vec![0.0; 3]).check_len(3, "L4").is_ok());
        assert!(ChannelInput::from(vec![0.0; 2]).check_len(3, "L4").is_err());
    }

    #[test]
    fn test_channel_input_json() {
        let scalar: ChannelInput = serde_json::from_str("2.5").unwrap();
        assert_eq!(scalar, ChannelInput::Scalar(2.5));

        let units: ChannelInput = serde_json::from_str("[1.0, 0.0]").unwrap();
        assert_eq!(units.len(), Some(2));
        assert_eq!(units.to_array(2), Array1::from(vec![1.0, 0.0]));
    }

    #[test]
    fn test_time_series() {
        let mut ts = TimeSeries::new("rate").with_units("spikes/step");
        ts.push(0.0, 0.2);
        ts.push(0.1, 0.4);
        assert_eq!(ts.len(), 2);
        assert!((ts.mean() - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_simulation_params() {
        let params = SimulationParams::default();
        assert!(params.validate().is_ok());
        assert!(params.should_record(20));
        assert!(!params.should_record(21));

        let bad = SimulationParams { dt: 0.0, ..Default::default() };
        assert!(bad.validate().is_err());
    }
}
