//! Weight plasticity rules.
//!
//! The engine is a pure function of the rule and the observables for one
//! (source, target) pair. Clamping to the rule's bounds is left to the
//! caller so that direct weight writes stay unclamped.

use laminar_core::{LaminarError, Rate, Result, Time, Weight};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Pair-based spike-timing dependent plasticity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StdpParams {
    pub a_plus: f64,  // LTP amplitude
    pub a_minus: f64, // LTD amplitude (negative)
    pub tau_plus: Time,
    pub tau_minus: Time,
    pub w_min: Weight,
    pub w_max: Weight,
}

impl Default for StdpParams {
    fn default() -> Self {
        Self {
            a_plus: 0.1,
            a_minus: -0.1,
            tau_plus: 20.0,
            tau_minus: 20.0,
            w_min: -1.0,
            w_max: 1.0,
        }
    }
}

/// Rate covariance rule against running averages
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CovarianceParams {
    pub eta: f64,
    pub tau_avg: Time,
    pub w_min: Weight,
    pub w_max: Weight,
}

impl Default for CovarianceParams {
    fn default() -> Self {
        Self {
            eta: 0.01,
            tau_avg: 100.0,
            w_min: -1.0,
            w_max: 1.0,
        }
    }
}

/// Plasticity rule selection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlasticityRule {
    SpikeTiming(StdpParams),
    Covariance(CovarianceParams),
}

impl Default for PlasticityRule {
    fn default() -> Self {
        Self::SpikeTiming(StdpParams::default())
    }
}

impl PlasticityRule {
    pub fn bounds(&self) -> (Weight, Weight) {
        match self {
            Self::SpikeTiming(p) => (p.w_min, p.w_max),
            Self::Covariance(p) => (p.w_min, p.w_max),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::SpikeTiming(_) => "spike_timing",
            Self::Covariance(_) => "covariance",
        }
    }

    pub fn validate(&self) -> Result<()> {
        let (w_min, w_max) = self.bounds();
        if w_min > w_max {
            return Err(LaminarError::Configuration(format!(
                "weight bounds inverted: w_min {} > w_max {}",
                w_min, w_max
            )));
        }
        let taus = match self {
            Self::SpikeTiming(p) => vec![("tau_plus", p.tau_plus), ("tau_minus", p.tau_minus)],
            Self::Covariance(p) => vec![("tau_avg", p.tau_avg)],
        };
        for (name, tau) in taus {
            if !(tau > 0.0) {
                return Err(LaminarError::Configuration(format!(
                    "{} must be positive, got {}",
                    name, tau
                )));
            }
        }
        Ok(())
    }
}

/// What a rule observes for one (source, target) pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Observables {
    /// Mean post-minus-pre spike time difference over this step's events
    Timing { delta_t: Time },
    Rates {
        pre: Rate,
        post: Rate,
        pre_avg: Rate,
        post_avg: Rate,
    },
}

/// Computes weight changes for a configured rule
#[derive(Debug, Clone)]
pub struct PlasticityEngine {
    rule: PlasticityRule,
}

impl PlasticityEngine {
    pub fn new(rule: PlasticityRule) -> Result<Self> {
        rule.validate()?;
        Ok(Self { rule })
    }

    pub fn rule(&self) -> &PlasticityRule {
        &self.rule
    }

    pub fn bounds(&self) -> (Weight, Weight) {
        self.rule.bounds()
    }

    /// Unclamped weight change. Observables of the wrong kind yield zero.
    pub fn calculate_dw(&self, w: Weight, observables: &Observables) -> Weight {
        match (&self.rule, observables) {
            (PlasticityRule::SpikeTiming(p), Observables::Timing { delta_t }) => {
                stdp_dw(p, w, *delta_t)
            }
            (
                PlasticityRule::Covariance(p),
                Observables::Rates {
                    pre,
                    post,
                    pre_avg,
                    post_avg,
                },
            ) => p.eta * (pre - pre_avg) * (post - post_avg),
            _ => 0.0,
        }
    }
}

/// Soft-bounded STDP window
fn stdp_dw(p: &StdpParams, w: Weight, delta_t: Time) -> Weight {
    if delta_t > 0.0 {
        p.a_plus * (p.w_max - w) * (-delta_t / p.tau_plus).exp()
    } else if delta_t < 0.0 {
        p.a_minus * (w - p.w_min) * (delta_t / p.tau_minus).exp()
    } else {
        0.0
    }
}

/// Leaky running averages of per-layer rates, created on first observation
#[derive(Debug, Clone)]
pub struct RunningAverages {
    leak: f64,
    values: Option<Array1<Rate>>,
}

impl RunningAverages {
    pub fn new(dt: Time, tau_avg: Time) -> Self {
        Self {
            leak: dt / tau_avg,
            values: None,
        }
    }

    /// Seed from `rates` if nothing has been observed yet
    pub fn ensure_init(&mut self, rates: &Array1<Rate>) -> &Array1<Rate> {
        self.values.get_or_insert_with(|| rates.clone())
    }

    pub fn update(&mut self, rates: &Array1<Rate>) {
        let leak = self.leak;
        match &mut self.values {
            Some(avg) => avg.zip_mut_with(rates, |a, &r| *a += leak * (r - *a)),
            None => self.values = Some(rates.clone()),
        }
    }

    pub fn values(&self) -> Option<&Array1<Rate>> {
        self.values.as_ref()
    }

    pub fn clear(&mut self) {
        self.values = None;
    }
}
