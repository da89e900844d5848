/// Power monitoring example: duty-cycled sampling over a simulated minute
use magnet_gesture::sampling::SamplingStats;
use magnet_gesture::{EngineConfig, GestureEngine, RawSample, SensorHost, SensorKind};

/// Simulated sensor that actually honours the requested delay.
struct ThrottledSensor {
    delay_us: u32,
    wakeups: u64,
}

impl SensorHost for ThrottledSensor {
    fn available_sensors(&self) -> Vec<SensorKind> {
        vec![SensorKind::Uncalibrated]
    }

    fn set_sampling_delay(&mut self, delay_us: u32) {
        self.delay_us = delay_us;
    }
}

fn main() {
    println!("=== Magnet Gesture Engine: Power Monitoring Example ===\n");

    let config = EngineConfig::default();
    println!("Engine configured with:");
    println!("  - High rate: {:.0}Hz", config.sampling.high_rate_hz);
    println!("  - Low rate: {:.0}Hz after {} ms of quiet", config.sampling.low_rate_hz, config.sampling.energy_hold_ms);
    println!("  - Boost window: {} ms\n", config.sampling.boost_ms);

    let host = ThrottledSensor {
        delay_us: 0,
        wakeups: 0,
    };
    let mut engine = match GestureEngine::new(config, host, 0) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("cannot start engine: {e}");
            return;
        }
    };

    // A press every 15 seconds, otherwise a quiet desk
    let ambient = [25.0, -40.0, 8.0];
    let duration_ms = 60_000u64;
    let mut t = 0u64;
    let mut last_delay = engine.sampling_delay_us();
    let mut gestures = 0;

    while t < duration_ms {
        let pressing = t >= 5_000 && (t - 5_000) % 15_000 < 400;
        let x = if pressing { 700.0 } else { 0.0 };

        let mut out = engine.advance(t);
        out.merge(engine.process_sample(RawSample::new(t, ambient[0] + x, ambient[1], ambient[2])));
        engine.host_mut().wakeups += 1;
        gestures += out.gestures.len();

        let delay = engine.sampling_delay_us();
        if delay != last_delay {
            println!(
                "[{:>6} ms] sampling -> {:.1}Hz",
                t,
                1_000_000.0 / delay as f32
            );
            last_delay = delay;
        }

        // Next sample arrives after the requested period
        t += (engine.host().delay_us as u64 / 1000).max(1);
    }

    print_report(&engine.sampling_stats(), engine.host().wakeups, duration_ms, gestures);
}

fn print_report(stats: &SamplingStats, wakeups: u64, duration_ms: u64, gestures: usize) {
    let fixed_wakeups = duration_ms as f32 / 1000.0 * stats.high_rate_hz;

    println!("\n=== Power Report ===");
    println!("  Gestures detected: {}", gestures);
    println!("  Time at high rate: {:.1} s", stats.high_ms as f32 / 1000.0);
    println!("  Time at low rate:  {:.1} s", stats.low_ms as f32 / 1000.0);
    println!("  Rate switches:     {}", stats.switches);
    println!("  Sensor wake-ups:   {} (fixed high rate: {:.0})", wakeups, fixed_wakeups);
    println!("  Estimated savings: {:.0}%", stats.savings_percent());
}
