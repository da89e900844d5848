/// Basic usage example: feed magnetometer samples, get gestures and actions
use magnet_gesture::{
    EngineConfig, EngineObserver, Gesture, GestureEngine, Notice, PoleMode, RawSample, SensorHost,
    SensorKind,
};

/// Stand-in for the phone's sensor service.
struct DemoSensor;

impl SensorHost for DemoSensor {
    fn available_sensors(&self) -> Vec<SensorKind> {
        vec![SensorKind::Uncalibrated]
    }

    fn set_sampling_delay(&mut self, delay_us: u32) {
        println!("  [host] sampling delay -> {} µs", delay_us);
    }
}

/// Prints notices as they happen.
struct NoticePrinter;

impl EngineObserver for NoticePrinter {
    fn on_notice(&mut self, notice: &Notice) {
        match notice {
            Notice::BaselineReady { at_ms, baseline } => {
                println!("  [{at_ms:>5} ms] baseline ready: {:?}", baseline)
            }
            Notice::Suppressed { at_ms, magnitude } => {
                println!("  [{at_ms:>5} ms] strong field {magnitude:.0} µT, gestures suppressed")
            }
            _ => {}
        }
    }
}

fn main() {
    println!("=== Magnet Gesture Engine: Basic Example ===\n");

    let mut config = EngineConfig::default();
    config.trigger.pole_mode = PoleMode::Split;

    let mut engine = match GestureEngine::new(config, DemoSensor, 0) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("cannot start engine: {e}");
            return;
        }
    };
    engine.add_observer(Box::new(NoticePrinter));

    // Earth field plus a little desk clutter (µT)
    let ambient = [22.0, -38.0, 12.0];
    let phases: [(&str, [f32; 3], u64); 6] = [
        ("settling", [0.0, 0.0, 0.0], 2500),
        ("north tap", [700.0, 0.0, 0.0], 350),
        ("rest", [0.0, 0.0, 0.0], 1500),
        ("south hold", [-650.0, 0.0, 0.0], 1800),
        ("rest", [0.0, 0.0, 0.0], 1500),
        ("magnet left on the sensor", [0.0, 2400.0, 0.0], 1000),
    ];

    let mut t = 0u64;
    let mut gestures: Vec<Gesture> = Vec::new();
    for (name, field, duration_ms) in phases {
        println!("\n--- {} ({} ms) ---", name, duration_ms);
        let end = t + duration_ms;
        while t < end {
            let mut out = engine.advance(t);
            out.merge(engine.process_sample(RawSample::new(
                t,
                ambient[0] + field[0],
                ambient[1] + field[1],
                ambient[2] + field[2],
            )));
            for gesture in &out.gestures {
                print_gesture(gesture, &engine);
            }
            gestures.extend(out.gestures);
            t += 20;
        }
    }

    println!("\n=== Summary ===");
    println!("Samples processed: {}", engine.samples_processed());
    println!("Gestures: {}", gestures.len());
    println!("Recent activity:");
    for entry in engine.activity().iter() {
        println!("  [{:>5} ms] {}", entry.timestamp_ms, entry.message);
    }
}

fn print_gesture(gesture: &Gesture, engine: &GestureEngine<DemoSensor>) {
    println!(
        "  [{:>5} ms] {} {} ({} ms) -> {}",
        gesture.fired_at_ms,
        gesture.pole.as_str(),
        if gesture.long_press { "long press" } else { "short press" },
        gesture.duration_ms(),
        engine.action_for(gesture)
    );
}
