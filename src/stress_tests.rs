/// Production-level stress testing for the gesture pipeline.
///
/// These tests are designed to expose real-world failure modes that would only
/// appear under extreme, sustained, or pathological conditions.

#[cfg(test)]
mod stress_tests {
    use crate::config::{EngineConfig, PoleMode};
    use crate::pipeline::*;
    use crate::types::*;

    struct NullHost;

    impl SensorHost for NullHost {
        fn available_sensors(&self) -> Vec<SensorKind> {
            vec![SensorKind::Uncalibrated]
        }

        fn set_sampling_delay(&mut self, _delay_us: u32) {}
    }

    /// Deterministic pseudo-random noise in [-1, 1).
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self) -> f32 {
            self.0 = self
                .0
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            ((self.0 >> 40) as f32 / (1u64 << 24) as f32) * 2.0 - 1.0
        }
    }

    const AMBIENT: Vec3 = [18.0, -42.0, 7.0];

    fn engine(config: EngineConfig) -> GestureEngine<NullHost> {
        GestureEngine::new(config, NullHost, 0).unwrap()
    }

    /// Fire timers, then process one sample; return everything produced.
    fn step(engine: &mut GestureEngine<NullHost>, t: u64, v: Vec3) -> StepOutput {
        let mut out = engine.advance(t);
        out.merge(engine.process_sample(RawSample::new(t, v[0], v[1], v[2])));
        out
    }

    fn with_noise(rng: &mut Lcg, field: Vec3, amplitude: f32) -> Vec3 {
        [
            AMBIENT[0] + field[0] + rng.next() * amplitude,
            AMBIENT[1] + field[1] + rng.next() * amplitude,
            AMBIENT[2] + field[2] + rng.next() * amplitude,
        ]
    }

    // ============================================================================
    // CATEGORY 1: EXTREME DURATION
    // ============================================================================

    /// Ten minutes of noisy ambient field at 50Hz must never produce a gesture
    #[test]
    fn stress_ten_minutes_ambient_noise_no_false_gestures() {
        let mut engine = engine(EngineConfig::default());
        let mut rng = Lcg(7);
        let mut gestures = 0;

        for i in 0..30_000u64 {
            let out = step(&mut engine, i * 20, with_noise(&mut rng, [0.0; 3], 10.0));
            gestures += out.gestures.len();
        }

        assert_eq!(gestures, 0);
        assert_eq!(engine.samples_processed(), 30_000);
        let status = engine.status().unwrap();
        assert!(status.adaptive_trigger.is_finite());
        assert!(status.adaptive_trigger >= 500.0);
        assert!(engine.activity().len() <= 100);
    }

    /// One minute with a press every five seconds: exactly one gesture per press
    #[test]
    fn stress_periodic_presses_over_noise() {
        let mut engine = engine(EngineConfig::default());
        let mut rng = Lcg(42);
        let mut gestures = Vec::new();

        for i in 0..3_000u64 {
            let t = i * 20;
            let pressing = t >= 2500 && t % 5000 >= 2500 && t % 5000 < 2800;
            let field = if pressing { [700.0, 0.0, 0.0] } else { [0.0; 3] };
            let out = step(&mut engine, t, with_noise(&mut rng, field, 10.0));
            gestures.extend(out.gestures);
        }

        assert_eq!(gestures.len(), 12, "gestures: {:?}", gestures);
        for g in &gestures {
            assert_eq!(g.kind, GestureKind::ShortPress);
            assert_eq!(g.pole, GesturePole::All);
            assert_eq!(g.started_at_ms % 5000, 2560);
        }
    }

    // ============================================================================
    // CATEGORY 2: PATHOLOGICAL INPUT
    // ============================================================================

    /// Test with NaN and Inf values (corrupted sensor data)
    #[test]
    fn stress_nan_and_inf_corruption() {
        let mut engine = engine(EngineConfig::default());
        let pathological_cases = [
            [f32::NAN, 0.0, 0.0],
            [0.0, f32::NAN, 0.0],
            [0.0, 0.0, f32::NAN],
            [f32::INFINITY, 0.0, 0.0],
            [0.0, f32::NEG_INFINITY, 0.0],
            [f32::NAN, f32::INFINITY, f32::NEG_INFINITY],
        ];

        let mut t = 0;
        for round in 0..200 {
            for _ in 0..5 {
                step(&mut engine, t, AMBIENT);
                t += 20;
            }
            let bad = pathological_cases[round % pathological_cases.len()];
            let out = step(&mut engine, t, bad);
            assert!(out.status.is_none());
            t += 20;
        }

        assert_eq!(engine.samples_dropped(), 200);
        assert_eq!(engine.samples_processed(), 1000);
        let status = engine.status().unwrap();
        assert!(status.magnitude.is_finite());
        assert!(status.x.is_finite() && status.y.is_finite() && status.z.is_finite());
        assert_eq!(engine.state().baseline.baseline(), AMBIENT);
    }

    /// A dead sensor reporting all-zero vectors after calibration
    #[test]
    fn stress_zero_vector_stream() {
        let mut engine = engine(EngineConfig::default());
        for i in 0..200u64 {
            step(&mut engine, i * 20, AMBIENT);
        }
        let mut gestures = 0;
        for i in 200..2000u64 {
            gestures += step(&mut engine, i * 20, [0.0, 0.0, 0.0]).gestures.len();
        }
        // |AMBIENT| is far below the trigger threshold
        assert_eq!(gestures, 0);
        assert!(engine.status().unwrap().magnitude < 100.0);
    }

    /// Saturated sensor: suppressed, then recovers for a normal press
    #[test]
    fn stress_saturation_then_recovery() {
        let mut engine = engine(EngineConfig::default());
        let mut t = 0;
        let mut feed = |engine: &mut GestureEngine<NullHost>, field: Vec3, duration_ms: u64| {
            let mut out = StepOutput::default();
            let end = t + duration_ms;
            while t < end {
                out.merge(step(
                    engine,
                    t,
                    [AMBIENT[0] + field[0], AMBIENT[1] + field[1], AMBIENT[2] + field[2]],
                ));
                t += 20;
            }
            out
        };

        feed(&mut engine, [0.0; 3], 4000);
        let saturated = feed(&mut engine, [4900.0, 0.0, 0.0], 2000);
        assert!(saturated.gestures.is_empty());
        assert!(saturated
            .notices
            .iter()
            .any(|n| matches!(n, Notice::Suppressed { .. })));

        let quiet = feed(&mut engine, [0.0; 3], 2000);
        assert!(quiet.gestures.is_empty());
        assert!(!engine.state().suppression.is_latched());

        let press = feed(&mut engine, [700.0, 0.0, 0.0], 400);
        let release = feed(&mut engine, [0.0; 3], 400);
        let gestures: Vec<Gesture> = press.gestures.into_iter().chain(release.gestures).collect();
        assert_eq!(gestures.len(), 1);
        assert_eq!(gestures[0].kind, GestureKind::ShortPress);
    }

    /// Pole flipping every sample never settles into a stable pole
    #[test]
    fn stress_pole_flicker_yields_undefined_pole() {
        let mut config = EngineConfig::default();
        config.trigger.pole_mode = PoleMode::Split;
        let mut engine = engine(config);
        for i in 0..200u64 {
            step(&mut engine, i * 20, AMBIENT);
        }

        let mut gestures = Vec::new();
        for i in 200..400u64 {
            let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
            let v = [AMBIENT[0] + sign * 700.0, AMBIENT[1], AMBIENT[2]];
            gestures.extend(step(&mut engine, i * 20, v).gestures);
        }

        assert!(!gestures.is_empty());
        for g in &gestures {
            assert_eq!(g.pole, GesturePole::None);
        }
    }

    // ============================================================================
    // CATEGORY 3: TEMPORAL CHAOS
    // ============================================================================

    #[test]
    fn stress_nonmonotonic_timestamps() {
        let mut engine = engine(EngineConfig::default());
        let mut rng = Lcg(99);
        let mut t: u64 = 10_000;
        let mut last_status_ts = 0;

        for i in 0..5_000u64 {
            // Mostly forward, sometimes backwards by up to 200 ms
            let jump = (rng.next() * 100.0) as i64 + 20;
            t = (t as i64 + jump).max(0) as u64;
            let field = if i % 400 < 20 { [700.0, 0.0, 0.0] } else { [0.0; 3] };
            let out = step(&mut engine, t, with_noise(&mut rng, field, 5.0));

            let status = out.status.unwrap();
            assert!(status.timestamp_ms >= last_status_ts);
            last_status_ts = status.timestamp_ms;
            for g in &out.gestures {
                assert!(g.fired_at_ms >= g.started_at_ms);
            }
        }
    }

    #[test]
    fn stress_zero_time_deltas() {
        let mut engine = engine(EngineConfig::default());
        for _ in 0..1_000 {
            step(&mut engine, 5_000, AMBIENT);
        }
        assert_eq!(engine.samples_processed(), 1_000);
        assert!(engine.state().baseline.is_ready());
        assert_eq!(engine.state().phase(), TriggerPhase::Idle);
    }

    /// Sensor delivery with large jitter and occasional multi-second gaps
    #[test]
    fn stress_irregular_delivery_with_gaps() {
        let mut engine = engine(EngineConfig::default());
        let mut rng = Lcg(2024);
        let mut t = 0u64;

        for i in 0..6_000u64 {
            let interval = if i % 997 == 0 { 3_000 } else { 5 + ((rng.next() + 1.0) * 30.0) as u64 };
            t += interval;
            let field = if (i / 150) % 4 == 1 { [650.0, 0.0, 0.0] } else { [0.0; 3] };
            let out = step(&mut engine, t, with_noise(&mut rng, field, 8.0));
            for g in &out.gestures {
                assert!(g.fired_at_ms >= g.started_at_ms);
            }
        }

        // Timers stay scheduled and never fall behind the clock by more than a period
        let deadline = engine.next_deadline().unwrap();
        assert!(deadline > t);
        assert!(deadline <= t + 500);
    }

    // ============================================================================
    // CATEGORY 4: STATE RESET CYCLES
    // ============================================================================

    #[test]
    fn stress_repeated_zero_and_reload_cycles() {
        let mut engine = engine(EngineConfig::default());
        let mut rng = Lcg(5);
        let mut t = 0u64;

        for cycle in 0..300u64 {
            for _ in 0..10 {
                let field = if cycle % 3 == 0 { [800.0, 0.0, 0.0] } else { [0.0; 3] };
                step(&mut engine, t, with_noise(&mut rng, field, 10.0));
                t += 20;
            }
            if cycle % 2 == 0 {
                engine.zero_baseline(t);
            } else {
                let mut config = EngineConfig::default();
                config.trigger.long_press_ms = 1000 + (cycle % 5) * 100;
                engine.reload_config(config, t);
            }
            assert_eq!(engine.state().phase(), TriggerPhase::Idle);
            assert!(engine.state().filter.is_empty());
        }

        assert!(engine.activity().len() <= 100);
        let deadline = engine.next_deadline().unwrap();
        assert!(deadline > t && deadline <= t + 500);
    }

    // ============================================================================
    // CATEGORY 5: EXTREME CONFIGURATIONS
    // ============================================================================

    #[test]
    fn stress_extreme_configurations() {
        let mut configs = Vec::new();

        let mut zeros = EngineConfig::default();
        zeros.signal.filter_window = 0;
        zeros.baseline.cold_start_samples = 0;
        zeros.trigger.press_debounce_ms = 0;
        zeros.trigger.release_debounce_ms = 0;
        zeros.trigger.cooldown_ms = 0;
        zeros.sampling.rate_check_ms = 0;
        zeros.watchdog.period_ms = 0;
        configs.push(zeros);

        let mut inverted = EngineConfig::default();
        inverted.trigger.reset_threshold = 900.0;
        inverted.sampling.low_rate_hz = 200.0;
        inverted.suppression.threshold = 10.0;
        configs.push(inverted);

        let mut garbage = EngineConfig::default();
        garbage.trigger.trigger_threshold = f32::NAN;
        garbage.baseline.drift_rate = f32::INFINITY;
        garbage.polarity.max_magnitude = -5.0;
        garbage.signal.noise_sample_cap = 0;
        configs.push(garbage);

        for config in configs {
            let mut engine = engine(config);
            let mut rng = Lcg(11);
            for i in 0..2_000u64 {
                let field = if i % 200 < 40 { [900.0, 0.0, 0.0] } else { [0.0; 3] };
                let out = step(&mut engine, i * 20, with_noise(&mut rng, field, 10.0));
                let status = out.status.unwrap();
                assert!(status.adaptive_trigger.is_finite());
                assert!(status.adaptive_reset < status.adaptive_trigger);
            }
        }
    }
}
