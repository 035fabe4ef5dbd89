//! Neuron populations: one layer's worth of units sharing a dynamics variant.
//!
//! Four variants implement [`NeuronPopulation`]:
//! - [`ConductancePopulation`]: leaky integrate-and-fire driven by decaying
//!   synaptic conductance traces (exc, inh, voltage-gated NMDA)
//! - [`LeakyRatePopulation`]: first-order rate dynamics through a static gain
//! - [`SpikeResponsePopulation`]: kernel-sum spike response model
//! - [`FitzHughNagumoPopulation`]: two-variable relaxation oscillator
//!
//! The readout kind is fixed at construction and exposed through
//! [`NeuronPopulation::kind`], so callers never inspect the readout to find it.

use laminar_core::{
    ChannelInputs, GainFunction, LaminarError, Result, SynapseChannel, Time, Voltage,
};
use ndarray::{Array1, Zip};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Readout capability of a population
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PopulationKind {
    /// Emits a boolean spike vector each step
    SpikeBased,
    /// Exposes a continuous non-negative activity vector
    RateBased,
}

/// Live readout of one population
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerState {
    Spikes(Array1<bool>),
    Activity(Array1<f64>),
}

impl LayerState {
    pub fn len(&self) -> usize {
        match self {
            Self::Spikes(s) => s.len(),
            Self::Activity(a) => a.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> PopulationKind {
        match self {
            Self::Spikes(_) => PopulationKind::SpikeBased,
            Self::Activity(_) => PopulationKind::RateBased,
        }
    }

    /// Fraction of spiking units, or mean activity
    pub fn mean(&self) -> f64 {
        match self {
            Self::Spikes(s) => spike_fraction(s),
            Self::Activity(a) => a.mean().unwrap_or(0.0),
        }
    }

    pub fn as_spikes(&self) -> Option<&Array1<bool>> {
        match self {
            Self::Spikes(s) => Some(s),
            Self::Activity(_) => None,
        }
    }

    pub fn as_activity(&self) -> Option<&Array1<f64>> {
        match self {
            Self::Spikes(_) => None,
            Self::Activity(a) => Some(a),
        }
    }
}

/// Contract shared by every population variant
pub trait NeuronPopulation: fmt::Debug {
    fn n_units(&self) -> usize;

    fn kind(&self) -> PopulationKind;

    /// Whether input on `channel` can be integrated
    fn accepts(&self, channel: SynapseChannel) -> bool;

    /// Advance one step. `t` is the simulated time of this step.
    fn update(&mut self, inputs: &ChannelInputs, t: Time) -> Result<()>;

    /// Copy of the readout as of the last completed update
    fn state(&self) -> LayerState;

    /// Scalar population observable: spike fraction or mean activity
    fn mean_activity(&self) -> f64;

    /// Restore construction-time state
    fn reset(&mut self);

    fn spikes(&self) -> Option<&Array1<bool>> {
        None
    }

    /// Most recent spike time per unit (`-inf` if never)
    fn last_spike_times(&self) -> Option<&Array1<Time>> {
        None
    }

    fn voltages(&self) -> Option<&Array1<Voltage>> {
        None
    }

    /// Reject unsupported channels and mis-sized arrays without mutating.
    fn validate_inputs(&self, inputs: &ChannelInputs) -> Result<()> {
        for (channel, value) in inputs {
            if !self.accepts(*channel) {
                return Err(LaminarError::Configuration(format!(
                    "channel '{}' is not supported by this population",
                    channel
                )));
            }
            value.check_len(self.n_units(), &format!("channel '{}'", channel))?;
        }
        Ok(())
    }
}

fn spike_fraction(spikes: &Array1<bool>) -> f64 {
    if spikes.is_empty() {
        return 0.0;
    }
    spikes.iter().filter(|&&s| s).count() as f64 / spikes.len() as f64
}

fn check_units(n_units: usize) -> Result<()> {
    if n_units == 0 {
        return Err(LaminarError::Configuration(
            "population must have at least one unit".into(),
        ));
    }
    Ok(())
}

fn check_positive(name: &str, value: f64) -> Result<()> {
    if !(value > 0.0) {
        return Err(LaminarError::Configuration(format!(
            "{} must be positive, got {}",
            name, value
        )));
    }
    Ok(())
}

/// Sum of the listed channels, zeros where absent
fn drive(inputs: &ChannelInputs, channels: &[SynapseChannel], n_units: usize) -> Array1<f64> {
    let mut total = Array1::zeros(n_units);
    for channel in channels {
        if let Some(value) = inputs.get(channel) {
            total += &value.to_array(n_units);
        }
    }
    total
}

/// Excitatory and inhibitory drive, with `additive` split by sign
fn split_drive(inputs: &ChannelInputs, n_units: usize) -> (Array1<f64>, Array1<f64>) {
    let mut exc = drive(
        inputs,
        &[SynapseChannel::Exc, SynapseChannel::Total],
        n_units,
    );
    let mut inh = drive(inputs, &[SynapseChannel::Inh], n_units);
    if let Some(value) = inputs.get(&SynapseChannel::Additive) {
        let signed = value.to_array(n_units);
        exc += &signed.mapv(|x| x.max(0.0));
        inh += &signed.mapv(|x| (-x).max(0.0));
    }
    (exc, inh)
}

// ============================================================================
// CONDUCTANCE-BASED SPIKING
// ============================================================================

/// Parameters for the conductance-driven integrate-and-fire variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConductanceParams {
    pub tau_m: f64,     // Membrane time constant (ms)
    pub theta: Voltage, // Spike threshold (mV)
    pub v_reset: Voltage,
    pub v_rest: Voltage,
    pub r_m: f64,         // Membrane resistance
    pub tau_syn_exc: f64, // Excitatory trace time constant (ms)
    /// Inhibitory trace time constant; `None` subtracts inhibition instantly
    pub tau_syn_inh: Option<f64>,
    /// NMDA trace time constant; `None` disables the NMDA channel
    pub tau_nmda: Option<f64>,
    /// Units at or below this voltage ignore NMDA input (mV)
    pub nmda_gate: Voltage,
    pub delta: f64, // Refractory period (ms)
    pub record_spike_times: bool,
}

impl Default for ConductanceParams {
    fn default() -> Self {
        Self {
            tau_m: 15.0,
            theta: -55.0,
            v_reset: -70.0,
            v_rest: -70.0,
            r_m: 10.0,
            tau_syn_exc: 5.0,
            tau_syn_inh: Some(10.0),
            tau_nmda: None,
            nmda_gate: -60.0,
            delta: 2.0,
            record_spike_times: true,
        }
    }
}

impl ConductanceParams {
    pub fn validate(&self) -> Result<()> {
        check_positive("tau_m", self.tau_m)?;
        check_positive("tau_syn_exc", self.tau_syn_exc)?;
        if let Some(tau) = self.tau_syn_inh {
            check_positive("tau_syn_inh", tau)?;
        }
        if let Some(tau) = self.tau_nmda {
            check_positive("tau_nmda", tau)?;
        }
        if self.delta < 0.0 {
            return Err(LaminarError::Configuration(format!(
                "refractory period must be non-negative, got {}",
                self.delta
            )));
        }
        Ok(())
    }
}

/// A decaying conductance trace
#[derive(Debug, Clone)]
struct Trace {
    g: Array1<f64>,
    decay: f64,
}

impl Trace {
    fn new(n_units: usize, tau: f64, dt: Time) -> Self {
        Self {
            g: Array1::zeros(n_units),
            decay: (-dt / tau).exp(),
        }
    }

    fn decay_and_add(&mut self, input: &Array1<f64>) {
        self.g *= self.decay;
        self.g += input;
    }
}

/// Conductance-based leaky integrate-and-fire population
#[derive(Debug, Clone)]
pub struct ConductancePopulation {
    params: ConductanceParams,
    dt: Time,
    refractory_steps: u32,
    v: Array1<Voltage>,
    spikes: Array1<bool>,
    refractory: Array1<u32>,
    last_spike: Array1<Time>,
    exc: Trace,
    inh: Option<Trace>,
    nmda: Option<Trace>,
}

impl ConductancePopulation {
    pub fn new(n_units: usize, params: ConductanceParams, dt: Time) -> Result<Self> {
        check_units(n_units)?;
        check_positive("dt", dt)?;
        params.validate()?;

        let refractory_steps = (params.delta / dt).round() as u32;
        Ok(Self {
            dt,
            refractory_steps,
            v: Array1::from_elem(n_units, params.v_rest),
            spikes: Array1::from_elem(n_units, false),
            refractory: Array1::zeros(n_units),
            last_spike: Array1::from_elem(n_units, f64::NEG_INFINITY),
            exc: Trace::new(n_units, params.tau_syn_exc, dt),
            inh: params.tau_syn_inh.map(|tau| Trace::new(n_units, tau, dt)),
            nmda: params.tau_nmda.map(|tau| Trace::new(n_units, tau, dt)),
            params,
        })
    }

    pub fn params(&self) -> &ConductanceParams {
        &self.params
    }

    pub fn refractory_steps(&self) -> u32 {
        self.refractory_steps
    }

    /// Net synaptic drive: excitatory traces minus inhibitory trace
    pub fn synaptic_current(&self) -> Array1<f64> {
        let mut i_syn = self.exc.g.clone();
        if let Some(nmda) = &self.nmda {
            i_syn += &nmda.g;
        }
        if let Some(inh) = &self.inh {
            i_syn -= &inh.g;
        }
        i_syn
    }
}

impl NeuronPopulation for ConductancePopulation {
    fn n_units(&self) -> usize {
        self.v.len()
    }

    fn kind(&self) -> PopulationKind {
        PopulationKind::SpikeBased
    }

    fn accepts(&self, channel: SynapseChannel) -> bool {
        match channel {
            SynapseChannel::Nmda => self.nmda.is_some(),
            _ => true,
        }
    }

    fn update(&mut self, inputs: &ChannelInputs, t: Time) -> Result<()> {
        self.validate_inputs(inputs)?;
        let n = self.n_units();
        let (exc_in, inh_in) = split_drive(inputs, n);

        // 1. Decay traces, then integrate this step's input
        match &mut self.inh {
            Some(inh) => {
                self.exc.decay_and_add(&exc_in);
                inh.decay_and_add(&inh_in);
            }
            None => self.exc.decay_and_add(&(&exc_in - &inh_in)),
        }

        // 2. NMDA only integrates into units already above the gate
        if let Some(nmda) = &mut self.nmda {
            let nmda_in = drive(inputs, &[SynapseChannel::Nmda], n);
            let gate = self.params.nmda_gate;
            nmda.g *= nmda.decay;
            Zip::from(&mut nmda.g)
                .and(&nmda_in)
                .and(&self.v)
                .for_each(|g, &x, &v| {
                    if v > gate {
                        *g += x;
                    }
                });
        }

        // 3-4. Integrate non-refractory units, count down the rest
        let i_syn = self.synaptic_current();
        let noise = drive(inputs, &[SynapseChannel::Noise], n);
        let p = &self.params;
        let dt = self.dt;
        Zip::from(&mut self.v)
            .and(&mut self.refractory)
            .and(&i_syn)
            .and(&noise)
            .for_each(|v, countdown, &i, &xi| {
                if *countdown > 0 {
                    *countdown -= 1;
                } else {
                    *v += dt * (-(*v - p.v_rest) + p.r_m * i) / p.tau_m + xi;
                }
            });

        // 5. Threshold on the just-updated voltage
        let refractory_steps = self.refractory_steps;
        let record = p.record_spike_times;
        let (theta, v_reset) = (p.theta, p.v_reset);
        Zip::from(&mut self.spikes)
            .and(&mut self.v)
            .and(&mut self.refractory)
            .and(&mut self.last_spike)
            .for_each(|spike, v, countdown, last| {
                *spike = *v >= theta;
                if *spike {
                    *v = v_reset;
                    *countdown = refractory_steps;
                    if record {
                        *last = t;
                    }
                }
            });

        Ok(())
    }

    fn state(&self) -> LayerState {
        LayerState::Spikes(self.spikes.clone())
    }

    fn mean_activity(&self) -> f64 {
        spike_fraction(&self.spikes)
    }

    fn reset(&mut self) {
        let n = self.n_units();
        self.v.fill(self.params.v_rest);
        self.spikes.fill(false);
        self.refractory.fill(0);
        self.last_spike.fill(f64::NEG_INFINITY);
        self.exc.g = Array1::zeros(n);
        if let Some(inh) = &mut self.inh {
            inh.g = Array1::zeros(n);
        }
        if let Some(nmda) = &mut self.nmda {
            nmda.g = Array1::zeros(n);
        }
    }

    fn spikes(&self) -> Option<&Array1<bool>> {
        Some(&self.spikes)
    }

    fn last_spike_times(&self) -> Option<&Array1<Time>> {
        self.params.record_spike_times.then_some(&self.last_spike)
    }

    fn voltages(&self) -> Option<&Array1<Voltage>> {
        Some(&self.v)
    }
}

// ============================================================================
// LEAKY RATE
// ============================================================================

/// Parameters for the leaky rate variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateParams {
    pub tau_a: f64, // Activity time constant (ms)
    pub gain: GainFunction,
}

impl Default for RateParams {
    fn default() -> Self {
        Self {
            tau_a: 20.0,
            gain: GainFunction::default(),
        }
    }
}

/// Population rate model: dA/dt = (-A + gain(I)) / tau_A, A >= 0
#[derive(Debug, Clone)]
pub struct LeakyRatePopulation {
    params: RateParams,
    dt: Time,
    activity: Array1<f64>,
}

impl LeakyRatePopulation {
    pub fn new(n_units: usize, params: RateParams, dt: Time) -> Result<Self> {
        check_units(n_units)?;
        check_positive("dt", dt)?;
        check_positive("tau_a", params.tau_a)?;
        Ok(Self {
            params,
            dt,
            activity: Array1::zeros(n_units),
        })
    }

    pub fn params(&self) -> &RateParams {
        &self.params
    }

    pub fn activity(&self) -> &Array1<f64> {
        &self.activity
    }
}

impl NeuronPopulation for LeakyRatePopulation {
    fn n_units(&self) -> usize {
        self.activity.len()
    }

    fn kind(&self) -> PopulationKind {
        PopulationKind::RateBased
    }

    fn accepts(&self, _channel: SynapseChannel) -> bool {
        true
    }

    fn update(&mut self, inputs: &ChannelInputs, _t: Time) -> Result<()> {
        self.validate_inputs(inputs)?;
        let n = self.n_units();
        let total = drive(
            inputs,
            &[
                SynapseChannel::Additive,
                SynapseChannel::Exc,
                SynapseChannel::Nmda,
                SynapseChannel::Total,
                SynapseChannel::Noise,
            ],
            n,
        ) - drive(inputs, &[SynapseChannel::Inh], n);

        let gain = self.params.gain;
        let rate = self.dt / self.params.tau_a;
        Zip::from(&mut self.activity)
            .and(&total)
            .for_each(|a, &x| {
                *a += rate * (-*a + gain.eval(x));
                if *a < 0.0 {
                    *a = 0.0;
                }
            });
        Ok(())
    }

    fn state(&self) -> LayerState {
        LayerState::Activity(self.activity.clone())
    }

    fn mean_activity(&self) -> f64 {
        self.activity.mean().unwrap_or(0.0)
    }

    fn reset(&mut self) {
        self.activity.fill(0.0);
    }
}

// ============================================================================
// SPIKE RESPONSE MODEL
// ============================================================================

/// Parameters for the spike response variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SrmParams {
    pub tau_m: f64,
    pub theta: Voltage,
    pub v_reset: Voltage,
    pub v_rest: Voltage,
}

impl Default for SrmParams {
    fn default() -> Self {
        Self {
            tau_m: 15.0,
            theta: -55.0,
            v_reset: -70.0,
            v_rest: -70.0,
        }
    }
}

/// Spike response model: v = v_rest + h_syn + h_ref + noise
#[derive(Debug, Clone)]
pub struct SpikeResponsePopulation {
    params: SrmParams,
    decay: f64,
    v: Array1<Voltage>,
    spikes: Array1<bool>,
    h_syn: Array1<f64>,
    h_ref: Array1<f64>,
    last_spike: Array1<Time>,
}

impl SpikeResponsePopulation {
    pub fn new(n_units: usize, params: SrmParams, dt: Time) -> Result<Self> {
        check_units(n_units)?;
        check_positive("dt", dt)?;
        check_positive("tau_m", params.tau_m)?;
        Ok(Self {
            decay: (-dt / params.tau_m).exp(),
            v: Array1::from_elem(n_units, params.v_rest),
            spikes: Array1::from_elem(n_units, false),
            h_syn: Array1::zeros(n_units),
            h_ref: Array1::zeros(n_units),
            last_spike: Array1::from_elem(n_units, f64::NEG_INFINITY),
            params,
        })
    }

    pub fn params(&self) -> &SrmParams {
        &self.params
    }
}

impl NeuronPopulation for SpikeResponsePopulation {
    fn n_units(&self) -> usize {
        self.v.len()
    }

    fn kind(&self) -> PopulationKind {
        PopulationKind::SpikeBased
    }

    fn accepts(&self, channel: SynapseChannel) -> bool {
        channel != SynapseChannel::Nmda
    }

    fn update(&mut self, inputs: &ChannelInputs, t: Time) -> Result<()> {
        self.validate_inputs(inputs)?;
        let n = self.n_units();
        let (exc_in, inh_in) = split_drive(inputs, n);
        let noise = drive(inputs, &[SynapseChannel::Noise], n);

        self.h_syn *= self.decay;
        self.h_ref *= self.decay;
        self.h_syn += &(exc_in - inh_in);

        let p = &self.params;
        self.v = &self.h_syn + &self.h_ref + &noise + p.v_rest;

        let (theta, reset_offset) = (p.theta, p.v_reset - p.v_rest);
        Zip::from(&mut self.spikes)
            .and(&self.v)
            .and(&self.h_syn)
            .and(&mut self.h_ref)
            .and(&mut self.last_spike)
            .for_each(|spike, &v, &h_syn, h_ref, last| {
                *spike = v >= theta;
                if *spike {
                    // Reset kernel cancels the synaptic potential
                    *h_ref = reset_offset - h_syn;
                    *last = t;
                }
            });
        Ok(())
    }

    fn state(&self) -> LayerState {
        LayerState::Spikes(self.spikes.clone())
    }

    fn mean_activity(&self) -> f64 {
        spike_fraction(&self.spikes)
    }

    fn reset(&mut self) {
        self.v.fill(self.params.v_rest);
        self.spikes.fill(false);
        self.h_syn.fill(0.0);
        self.h_ref.fill(0.0);
        self.last_spike.fill(f64::NEG_INFINITY);
    }

    fn spikes(&self) -> Option<&Array1<bool>> {
        Some(&self.spikes)
    }

    fn last_spike_times(&self) -> Option<&Array1<Time>> {
        Some(&self.last_spike)
    }

    fn voltages(&self) -> Option<&Array1<Voltage>> {
        Some(&self.v)
    }
}

// ============================================================================
// FITZHUGH-NAGUMO
// ============================================================================

/// Parameters for the FitzHugh-Nagumo relaxation oscillator (dimensionless)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FhnParams {
    pub a: f64,
    pub b: f64,
    pub epsilon: f64,   // Recovery rate
    pub threshold: f64, // Readout is v > threshold
    pub v_init: f64,
    pub w_init: f64,
}

impl Default for FhnParams {
    fn default() -> Self {
        Self {
            a: 0.7,
            b: 0.8,
            epsilon: 0.08,
            threshold: 1.0,
            v_init: -1.1,
            w_init: -0.5,
        }
    }
}

/// FitzHugh-Nagumo units:
///
/// dv/dt = v - v^3/3 - w + I
/// dw/dt = epsilon (v + a - b w)
///
/// Every step with `v > threshold` counts as a spike, so one excursion can
/// span several steps.
#[derive(Debug, Clone)]
pub struct FitzHughNagumoPopulation {
    params: FhnParams,
    dt: Time,
    v: Array1<f64>,
    w: Array1<f64>,
    initial: (Array1<f64>, Array1<f64>),
    spikes: Array1<bool>,
    last_spike: Array1<Time>,
}

impl FitzHughNagumoPopulation {
    /// Every unit starts at `(v_init, w_init)`
    pub fn new(n_units: usize, params: FhnParams, dt: Time) -> Result<Self> {
        check_units(n_units)?;
        let v = Array1::from_elem(n_units, params.v_init);
        let w = Array1::from_elem(n_units, params.w_init);
        Self::with_initial_state(params, dt, v, w)
    }

    /// Start from a caller-chosen state, e.g. a randomised one
    pub fn with_initial_state(
        params: FhnParams,
        dt: Time,
        v: Array1<f64>,
        w: Array1<f64>,
    ) -> Result<Self> {
        check_units(v.len())?;
        check_positive("dt", dt)?;
        check_positive("epsilon", params.epsilon)?;
        if w.len() != v.len() {
            return Err(LaminarError::Dimension {
                context: "initial recovery variable".into(),
                expected: v.len(),
                got: w.len(),
            });
        }
        let n_units = v.len();
        Ok(Self {
            params,
            dt,
            initial: (v.clone(), w.clone()),
            v,
            w,
            spikes: Array1::from_elem(n_units, false),
            last_spike: Array1::from_elem(n_units, f64::NEG_INFINITY),
        })
    }

    pub fn params(&self) -> &FhnParams {
        &self.params
    }

    pub fn recovery(&self) -> &Array1<f64> {
        &self.w
    }
}

impl NeuronPopulation for FitzHughNagumoPopulation {
    fn n_units(&self) -> usize {
        self.v.len()
    }

    fn kind(&self) -> PopulationKind {
        PopulationKind::SpikeBased
    }

    fn accepts(&self, channel: SynapseChannel) -> bool {
        channel != SynapseChannel::Nmda
    }

    fn update(&mut self, inputs: &ChannelInputs, t: Time) -> Result<()> {
        self.validate_inputs(inputs)?;
        let n = self.n_units();
        let (exc_in, inh_in) = split_drive(inputs, n);
        let current = exc_in - inh_in + drive(inputs, &[SynapseChannel::Noise], n);

        let (p, dt) = (&self.params, self.dt);
        Zip::from(&mut self.v)
            .and(&mut self.w)
            .and(&current)
            .for_each(|v, w, &i| {
                let dv = *v - v.powi(3) / 3.0 - *w + i;
                let dw = p.epsilon * (*v + p.a - p.b * *w);
                *v += dt * dv;
                *w += dt * dw;
            });

        let threshold = p.threshold;
        Zip::from(&mut self.spikes)
            .and(&mut self.last_spike)
            .and(&self.v)
            .for_each(|spike, last, &v| {
                *spike = v > threshold;
                if *spike {
                    *last = t;
                }
            });
        Ok(())
    }

    fn state(&self) -> LayerState {
        LayerState::Spikes(self.spikes.clone())
    }

    fn mean_activity(&self) -> f64 {
        spike_fraction(&self.spikes)
    }

    fn reset(&mut self) {
        self.v.assign(&self.initial.0);
        self.w.assign(&self.initial.1);
        self.spikes.fill(false);
        self.last_spike.fill(f64::NEG_INFINITY);
    }

    fn spikes(&self) -> Option<&Array1<bool>> {
        Some(&self.spikes)
    }

    fn last_spike_times(&self) -> Option<&Array1<Time>> {
        Some(&self.last_spike)
    }

    fn voltages(&self) -> Option<&Array1<Voltage>> {
        Some(&self.v)
    }
}

// ============================================================================
// CONSTRUCTION
// ============================================================================

/// Population variant plus parameters, as supplied by a network description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum PopulationSpec {
    Conductance(ConductanceParams),
    LeakyRate(RateParams),
    SpikeResponse(SrmParams),
    #[serde(rename = "fitzhugh_nagumo")]
    FitzHughNagumo(FhnParams),
}

impl Default for PopulationSpec {
    fn default() -> Self {
        Self::Conductance(ConductanceParams::default())
    }
}

impl PopulationSpec {
    pub fn kind(&self) -> PopulationKind {
        match self {
            Self::LeakyRate(_) => PopulationKind::RateBased,
            Self::Conductance(_) | Self::SpikeResponse(_) | Self::FitzHughNagumo(_) => {
                PopulationKind::SpikeBased
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Conductance(_) => "conductance",
            Self::LeakyRate(_) => "leaky_rate",
            Self::SpikeResponse(_) => "spike_response",
            Self::FitzHughNagumo(_) => "fitzhugh_nagumo",
        }
    }

    pub fn build(&self, n_units: usize, dt: Time) -> Result<Box<dyn NeuronPopulation>> {
        Ok(match self {
            Self::Conductance(p) => Box::new(ConductancePopulation::new(n_units, p.clone(), dt)?),
            Self::LeakyRate(p) => Box::new(LeakyRatePopulation::new(n_units, p.clone(), dt)?),
            Self::SpikeResponse(p) => {
                Box::new(SpikeResponsePopulation::new(n_units, p.clone(), dt)?)
            }
            Self::FitzHughNagumo(p) => {
                Box::new(FitzHughNagumoPopulation::new(n_units, p.clone(), dt)?)
            }
        })
    }
}
