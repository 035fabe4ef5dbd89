//! End-to-end behaviour of whole networks driven step by step.

use laminar_engine::{
    ChannelInput, ColumnSpec, CouplingRule, CovarianceParams, ExternalInputs, GainFunction,
    LaminarError, LayerState, NetworkSimulator, NetworkSpec, PlasticityEngine, PlasticityRule,
    PopulationSpec, RateParams, StdpParams, SynapseChannel,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

fn drive(entries: &[(usize, &str, SynapseChannel, ChannelInput)]) -> ExternalInputs {
    let mut external = ExternalInputs::new();
    for (col, layer, channel, value) in entries {
        external
            .entry(*col)
            .or_default()
            .entry(layer.to_string())
            .or_default()
            .insert(*channel, value.clone());
    }
    external
}

fn rate(tau_a: f64, gain: GainFunction) -> PopulationSpec {
    PopulationSpec::LeakyRate(RateParams { tau_a, gain })
}

fn spikes(sim: &NetworkSimulator, col: usize, layer: &str) -> usize {
    let state = sim.column(col).unwrap().get_state();
    match state.get(layer).unwrap() {
        LayerState::Spikes(s) => s.iter().filter(|&&x| x).count(),
        LayerState::Activity(_) => panic!("{} is rate-based", layer),
    }
}

fn mean(sim: &NetworkSimulator, col: usize, layer: &str) -> f64 {
    sim.column(col).unwrap().get_state().get(layer).unwrap().mean()
}

// ============================================================================
// SIGNAL PROPAGATION
// ============================================================================

#[test]
fn test_signal_propagation() {
    let mut sim = NetworkSpec::new(0.1)
        .column(
            ColumnSpec::new(0, PopulationSpec::default())
                .layer("input", 5)
                .layer("output", 5),
        )
        .rule(CouplingRule::additive(&[(0, "input")], (0, "output"), 5.0))
        .build()
        .unwrap();

    let stimulus = drive(&[(0, "input", SynapseChannel::Exc, ChannelInput::Scalar(2.0))]);
    let mut first_input = None;
    let mut first_output = None;
    for step in 0..300 {
        sim.run_step(step, &stimulus).unwrap();
        if first_input.is_none() && spikes(&sim, 0, "input") > 0 {
            first_input = Some(step);
        }
        if first_output.is_none() && spikes(&sim, 0, "output") > 0 {
            first_output = Some(step);
        }
    }

    let first_input = first_input.expect("input layer never fired");
    let first_output = first_output.expect("output layer never fired");
    assert!(first_output >= 2);
    assert!(first_output > first_input);
}

#[test]
fn test_one_step_delay() {
    let identity = rate(1.0, GainFunction::Identity);
    let mut sim = NetworkSpec::new(0.1)
        .column(ColumnSpec::new(0, identity.clone()).layer("src", 2))
        .column(ColumnSpec::new(1, identity).layer("dst", 2))
        .rule(CouplingRule::additive(&[(0, "src")], (1, "dst"), 1.0))
        .build()
        .unwrap();

    let stimulus = drive(&[(0, "src", SynapseChannel::Total, ChannelInput::Scalar(1.0))]);
    sim.run_step(0, &stimulus).unwrap();
    assert!(mean(&sim, 0, "src") > 0.0);
    assert_eq!(mean(&sim, 1, "dst"), 0.0);

    sim.run_step(1, &stimulus).unwrap();
    assert!(mean(&sim, 1, "dst") > 0.0);
}

#[test]
fn test_negative_weight_inhibits_spiking_target() {
    let mut sim = NetworkSpec::new(0.1)
        .column(
            ColumnSpec::new(0, PopulationSpec::default())
                .layer("inh", 2)
                .layer("target", 2),
        )
        .rule(CouplingRule::additive(&[(0, "inh")], (0, "target"), -3.0))
        .build()
        .unwrap();

    // One volley from the inhibitory layer
    let volley = drive(&[(0, "inh", SynapseChannel::Noise, ChannelInput::Scalar(20.0))]);
    sim.run_step(0, &volley).unwrap();
    assert_eq!(spikes(&sim, 0, "inh"), 2);
    sim.run_step(1, &ExternalInputs::new()).unwrap();

    let voltages = sim.column(0).unwrap().voltages();
    let (_, target) = voltages.iter().find(|(name, _)| name == "target").unwrap();
    assert!(target.iter().all(|&v| v < -70.0));
}

// ============================================================================
// SPIKE-TIMING PLASTICITY
// ============================================================================

fn stdp() -> PlasticityEngine {
    PlasticityEngine::new(PlasticityRule::SpikeTiming(StdpParams {
        a_plus: 0.1,
        a_minus: -0.1,
        tau_plus: 20.0,
        tau_minus: 20.0,
        w_max: 1.0,
        ..Default::default()
    }))
    .unwrap()
}

fn timing_network() -> NetworkSimulator {
    NetworkSpec::new(0.1)
        .column(
            ColumnSpec::new(0, PopulationSpec::default())
                .layer("pre", 3)
                .layer("post", 3),
        )
        .rule(CouplingRule::additive(&[(0, "pre")], (0, "post"), 0.5))
        .build()
        .unwrap()
        .with_plasticity(stdp(), None)
        .unwrap()
}

/// Kick `first` at the start of every 20 ms period and `second` 5 ms later,
/// for 1000 steps. Returns the pre->post weight after each pairing.
fn run_pairing(first: &str, second: &str) -> Vec<f64> {
    const PERIOD: usize = 200;
    const OFFSET: usize = 50;
    let mut sim = timing_network();
    let (w_min, w_max) = stdp().bounds();
    let kick = |layer: &str| drive(&[(0, layer, SynapseChannel::Noise, ChannelInput::Scalar(20.0))]);
    let (kick_first, kick_second, quiet) = (kick(first), kick(second), ExternalInputs::new());

    let mut samples = vec![sim.connections().get_weight(0, "pre", 0, "post").unwrap()];
    for step in 0..1000 {
        let input = match step % PERIOD {
            0 => &kick_first,
            OFFSET => &kick_second,
            _ => &quiet,
        };
        sim.run_step(step, input).unwrap();
        let w = sim.connections().get_weight(0, "pre", 0, "post").unwrap();
        assert!((w_min..=w_max).contains(&w), "weight {} out of bounds", w);
        if step % PERIOD == 0 {
            assert_eq!(spikes(&sim, 0, first), 3);
        }
        if step % PERIOD == OFFSET {
            assert_eq!(spikes(&sim, 0, second), 3);
            samples.push(w);
        }
    }
    samples
}

#[test]
fn test_causal_pairing_potentiates() {
    let samples = run_pairing("pre", "post");
    assert_eq!(samples.len(), 6);
    for pair in samples.windows(2) {
        assert!(pair[1] > pair[0], "weights {:?}", samples);
    }
}

#[test]
fn test_anti_causal_pairing_depresses() {
    let samples = run_pairing("post", "pre");
    assert_eq!(samples.len(), 6);
    for pair in samples.windows(2) {
        assert!(pair[1] < pair[0], "weights {:?}", samples);
    }
}

#[test]
fn test_stdp_rule_convergence_bounds() {
    let engine = stdp();
    let mut sim = timing_network();
    let (w_min, w_max) = engine.bounds();
    let source = sim.connections().index_of(0, "pre").unwrap();
    let target = sim.connections().index_of(0, "post").unwrap();

    for (delta_t, potentiates) in [(5.0, true), (-5.0, false)] {
        sim.connections_mut().update_weight(0, "pre", 0, "post", 0.5).unwrap();
        let mut w = 0.5;
        for _ in 0..1000 {
            let dw = engine.calculate_dw(w, &laminar_engine::Observables::Timing { delta_t });
            let next = sim
                .connections_mut()
                .apply_delta(source, target, dw, w_min, w_max);
            assert!((w_min..=w_max).contains(&next));
            if potentiates {
                assert!(next > w || w_max - w < 1e-12);
            } else {
                assert!(next < w || w - w_min < 1e-12);
            }
            w = next;
        }
    }
}

// ============================================================================
// COVARIANCE PLASTICITY
// ============================================================================

fn noisy_pair() -> NetworkSimulator {
    let identity = rate(20.0, GainFunction::Identity);
    NetworkSpec::new(0.1)
        .column(ColumnSpec::new(0, identity.clone()).layer("pop", 10))
        .column(ColumnSpec::new(1, identity).layer("pop", 10))
        .rule(CouplingRule::additive(&[(0, "pop")], (1, "pop"), 0.2))
        .build()
        .unwrap()
}

fn noisy_input(rng: &mut ChaCha8Rng, noise: &Normal<f64>) -> ExternalInputs {
    let mut sample = || ChannelInput::from((0..10).map(|_| noise.sample(rng)).collect::<Vec<_>>());
    let (n0, n1) = (sample(), sample());
    drive(&[
        (0, "pop", SynapseChannel::Total, ChannelInput::Scalar(1.0)),
        (0, "pop", SynapseChannel::Noise, n0),
        (1, "pop", SynapseChannel::Total, ChannelInput::Scalar(1.0)),
        (1, "pop", SynapseChannel::Noise, n1),
    ])
}

#[test]
fn test_uncorrelated_covariance_is_stable() {
    let mut sim = noisy_pair();
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let noise = Normal::new(0.0, 0.1).unwrap();

    for step in 0..2000 {
        sim.run_step(step, &noisy_input(&mut rng, &noise)).unwrap();
    }

    let rule = PlasticityRule::Covariance(CovarianceParams {
        eta: 0.05,
        ..Default::default()
    });
    sim.set_plasticity(PlasticityEngine::new(rule).unwrap(), None)
        .unwrap();
    let w0 = sim.connections().get_weight(0, "pop", 1, "pop").unwrap();
    for step in 2000..4000 {
        sim.run_step(step, &noisy_input(&mut rng, &noise)).unwrap();
    }
    let w1 = sim.connections().get_weight(0, "pop", 1, "pop").unwrap();

    assert!((w1 - w0).abs() < 0.05, "drifted from {} to {}", w0, w1);
    assert_eq!(sim.rate_averages().unwrap().len(), 2);
}

// ============================================================================
// MULTIPLICATIVE COUPLING
// ============================================================================

#[test]
fn test_multiplicative_and_gate() {
    let source = rate(5.0, GainFunction::Identity);
    let gate = rate(5.0, GainFunction::Sigmoid { beta: 10.0, x0: 0.8 });
    let mut sim = NetworkSpec::new(0.1)
        .column(ColumnSpec::new(0, source.clone()).layer("a", 4))
        .column(ColumnSpec::new(1, source).layer("b", 4))
        .column(ColumnSpec::new(2, gate).layer("out", 4))
        .rule(CouplingRule::multiplicative(&[(0, "a"), (1, "b")], (2, "out"), 5.0))
        .build()
        .unwrap();

    for (x, y) in [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)] {
        sim.reset();
        let input = drive(&[
            (0, "a", SynapseChannel::Total, ChannelInput::Scalar(x)),
            (1, "b", SynapseChannel::Total, ChannelInput::Scalar(y)),
        ]);
        for step in 0..200 {
            sim.run_step(step, &input).unwrap();
        }
        let out = mean(&sim, 2, "out");
        if x == 1.0 && y == 1.0 {
            assert!(out > 0.5, "({}, {}) -> {}", x, y, out);
        } else {
            assert!(out < 0.1, "({}, {}) -> {}", x, y, out);
        }
    }
}

// ============================================================================
// STEP CONTRACT
// ============================================================================

#[test]
fn test_no_steps_keeps_initial_state() {
    let spec = NetworkSpec::new(0.1)
        .column(
            ColumnSpec::new(0, PopulationSpec::default())
                .layer("L4", 3)
                .layer("L2/3", 2),
        )
        .column(ColumnSpec::new(1, rate(10.0, GainFunction::default())).layer("L5", 4));
    let sim = spec.build().unwrap();

    for column in sim.get_state() {
        for (_, layer) in &column.layers {
            match layer {
                LayerState::Spikes(s) => assert!(s.iter().all(|&x| !x)),
                LayerState::Activity(a) => assert!(a.iter().all(|&x| x == 0.0)),
            }
        }
    }
    assert_eq!(sim.get_state(), spec.build().unwrap().get_state());
}

#[test]
fn test_runs_are_deterministic() {
    let run = || {
        let mut sim = noisy_pair()
            .with_plasticity(
                PlasticityEngine::new(PlasticityRule::Covariance(CovarianceParams::default()))
                    .unwrap(),
                None,
            )
            .unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let noise = Normal::new(0.0, 0.1).unwrap();
        for step in 0..500 {
            sim.run_step(step, &noisy_input(&mut rng, &noise)).unwrap();
        }
        (sim.get_state(), sim.connections().weights().clone())
    };
    assert_eq!(run(), run());
}

#[test]
fn test_dimension_error_leaves_state_intact() {
    let mut sim = noisy_pair();
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let noise = Normal::new(0.0, 0.1).unwrap();
    for step in 0..10 {
        sim.run_step(step, &noisy_input(&mut rng, &noise)).unwrap();
    }
    let before = sim.get_state();

    let bad = drive(&[
        (0, "pop", SynapseChannel::Total, ChannelInput::Scalar(1.0)),
        (1, "pop", SynapseChannel::Noise, ChannelInput::from(vec![0.0; 3])),
    ]);
    let err = sim.run_step(10, &bad).unwrap_err();
    assert!(matches!(err, LaminarError::Dimension { expected: 10, got: 3, .. }));
    assert_eq!(sim.get_state(), before);

    sim.run_step(10, &noisy_input(&mut rng, &noise)).unwrap();
    assert_ne!(sim.get_state(), before);
}

#[test]
fn test_unknown_external_target() {
    let mut sim = noisy_pair();
    let err = sim
        .run_step(0, &drive(&[(0, "L9", SynapseChannel::Total, ChannelInput::Scalar(1.0))]))
        .unwrap_err();
    assert!(matches!(err, LaminarError::Lookup { column: 0, .. }));

    let err = sim
        .run_step(0, &drive(&[(5, "pop", SynapseChannel::Total, ChannelInput::Scalar(1.0))]))
        .unwrap_err();
    assert!(matches!(err, LaminarError::Lookup { column: 5, .. }));
}

#[test]
fn test_unsupported_external_channel() {
    let mut sim = timing_network();
    let err = sim
        .run_step(0, &drive(&[(0, "pre", SynapseChannel::Nmda, ChannelInput::Scalar(1.0))]))
        .unwrap_err();
    assert!(matches!(err, LaminarError::Configuration(_)));
}

#[test]
fn test_custom_plasticity_and_history() {
    let mut sim = noisy_pair();
    sim.record_weights();
    sim.apply_plasticity_with(|w, pre, post| w + pre.len() as f64 + post);
    sim.record_weights();

    // Both layers are silent, so only the source count is added
    let w = sim.connections().get_weight(0, "pop", 1, "pop").unwrap();
    assert!((w - 1.2).abs() < 1e-12);
    let history = sim.weight_history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0][[1, 0]], 0.2);
    assert_eq!(history[1][[1, 0]], w);
}

#[test]
fn test_reset_keeps_weights() {
    let mut sim = noisy_pair();
    let initial = sim.get_state();
    sim.connections_mut()
        .update_weight(0, "pop", 1, "pop", 0.9)
        .unwrap();
    let stimulus = drive(&[(0, "pop", SynapseChannel::Total, ChannelInput::Scalar(1.0))]);
    for step in 0..20 {
        sim.run_step(step, &stimulus).unwrap();
    }
    sim.reset();
    assert_eq!(sim.get_state(), initial);
    assert_eq!(sim.connections().get_weight(0, "pop", 1, "pop").unwrap(), 0.9);
}
