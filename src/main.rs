//! `magnet-replay`: run a recorded magnetometer trace through the gesture engine.
//!
//! Reads samples from a file (or stdin with `-`) and prints one JSON object
//! per gesture, with the action it maps to. Timers are driven from the sample
//! timestamps, so a replay is deterministic.
//!
//! Accepted input formats, one sample per line:
//!
//! - JSON lines: `{"timestamp_ms": 120, "x": 21.5, "y": -33.0, "z": 9.8}`
//! - CSV: `t,x,y,z` (a non-numeric header line is skipped)
//!
//! # Usage
//!
//! ```bash
//! magnet-replay trace.jsonl
//! magnet-replay --config tuned.json --notices --summary trace.csv
//! RUST_LOG=magnet_gesture=debug magnet-replay trace.csv
//! ```

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::json;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use magnet_gesture::{EngineConfig, GestureEngine, RawSample, SensorHost, SensorKind, StepOutput};

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "magnet-replay",
    version,
    about = "Replay a magnetometer trace through the magnet gesture engine",
    long_about = None,
)]
struct Args {
    /// Trace file (JSON lines or CSV). Use `-` for stdin.
    input: PathBuf,

    /// Engine configuration (JSON). Missing fields take defaults.
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Issue a manual zero at this timestamp (ms). May be repeated.
    #[arg(long = "zero-at")]
    zero_at: Vec<u64>,

    /// Also print notices (baseline, suppression, rate changes).
    #[arg(long, default_value_t = false)]
    notices: bool,

    /// Also print every status snapshot.
    #[arg(long, default_value_t = false)]
    status: bool,

    /// Print sampling statistics and the activity log to stderr at the end.
    #[arg(long, default_value_t = false)]
    summary: bool,
}

/// Replay host: every sensor exists, delay requests are only logged.
struct ReplayHost {
    delay_changes: usize,
}

impl SensorHost for ReplayHost {
    fn available_sensors(&self) -> Vec<SensorKind> {
        vec![SensorKind::Uncalibrated, SensorKind::Calibrated]
    }

    fn set_sampling_delay(&mut self, delay_us: u32) {
        self.delay_changes += 1;
        debug!(delay_us, "sampling delay requested");
    }
}

// ---------------------------------------------------------------------------
// Input parsing
// ---------------------------------------------------------------------------

/// Parse one trace line. Returns `Ok(None)` for blank lines, comments and,
/// when `header_allowed`, a CSV header.
fn parse_line(line: &str, header_allowed: bool) -> Result<Option<RawSample>> {
    let line = line.trim();
    if is_skippable(line) {
        return Ok(None);
    }
    if line.starts_with('{') {
        let sample = serde_json::from_str(line).context("invalid JSON sample")?;
        return Ok(Some(sample));
    }

    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != 4 {
        bail!("expected 4 CSV fields (t,x,y,z), found {}", fields.len());
    }
    let timestamp_ms = match fields[0].parse::<u64>() {
        Ok(t) => t,
        Err(_) if header_allowed => return Ok(None),
        Err(e) => bail!("invalid timestamp '{}': {}", fields[0], e),
    };
    let mut axes = [0.0f32; 3];
    for (axis, field) in axes.iter_mut().zip(&fields[1..]) {
        *axis = field
            .parse()
            .with_context(|| format!("invalid field component '{}'", field))?;
    }
    Ok(Some(RawSample::new(timestamp_ms, axes[0], axes[1], axes[2])))
}

fn is_skippable(line: &str) -> bool {
    line.is_empty() || line.starts_with('#')
}

fn open_input(path: &PathBuf) -> Result<Box<dyn BufRead>> {
    if path.as_os_str() == "-" {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let file = File::open(path).with_context(|| format!("cannot open trace {}", path.display()))?;
    Ok(Box::new(BufReader::new(file)))
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn emit(
    out: &mut impl Write,
    engine: &GestureEngine<ReplayHost>,
    step: &StepOutput,
    args: &Args,
) -> Result<()> {
    for gesture in &step.gestures {
        let line = json!({
            "gesture": gesture,
            "action": engine.action_for(gesture).as_str(),
        });
        writeln!(out, "{}", line)?;
    }
    if args.notices {
        for notice in &step.notices {
            writeln!(out, "{}", json!({ "notice": notice }))?;
        }
    }
    if args.status {
        if let Some(status) = &step.status {
            writeln!(out, "{}", json!({ "status": status }))?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => EngineConfig::load(path).with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let reader = open_input(&args.input)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let mut zero_at = args.zero_at.clone();
    zero_at.sort_unstable();
    let mut zero_at = zero_at.into_iter().peekable();

    let mut engine: Option<GestureEngine<ReplayHost>> = None;
    let mut gesture_count = 0usize;
    let mut header_allowed = true;

    for (index, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("reading line {}", index + 1))?;
        let parsed = parse_line(&line, header_allowed);
        if !is_skippable(line.trim()) {
            // Only the first content line may be a header
            header_allowed = false;
        }
        let sample = match parsed {
            Ok(Some(sample)) => sample,
            Ok(None) => continue,
            Err(e) => {
                warn!(line = index + 1, error = %e, "skipping malformed line");
                continue;
            }
        };

        let ts = sample.timestamp_ms;
        if engine.is_none() {
            // Timers start at the first sample's clock
            let started = GestureEngine::new(config.clone(), ReplayHost { delay_changes: 0 }, ts)
                .context("starting gesture engine")?;
            engine = Some(started);
        }
        let Some(running) = engine.as_mut() else {
            continue;
        };

        let mut step = running.advance(ts);
        while zero_at.peek().map_or(false, |&at| at <= ts) {
            zero_at.next();
            step.merge(running.zero_baseline(ts));
        }
        step.merge(running.process_sample(sample));

        gesture_count += step.gestures.len();
        emit(&mut out, running, &step, &args)?;
    }

    let Some(engine) = engine else {
        bail!("no samples in {}", args.input.display());
    };
    info!(
        samples = engine.samples_processed(),
        gestures = gesture_count,
        "replay finished"
    );

    if args.summary {
        let stats = engine.sampling_stats();
        eprintln!("samples processed: {}", engine.samples_processed());
        eprintln!("samples dropped:   {}", engine.samples_dropped());
        eprintln!("gestures:          {}", gesture_count);
        eprintln!("final phase:       {}", engine.state().phase().label());
        eprintln!("delay changes:     {}", engine.host().delay_changes);
        eprintln!(
            "low-rate time:     {:.1}% (est. {:.1}% fewer wake-ups)",
            stats.low_rate_fraction() * 100.0,
            stats.savings_percent()
        );
        eprintln!("activity:");
        for entry in engine.activity().iter() {
            eprintln!("  [{:>8} ms] {}", entry.timestamp_ms, entry.message);
        }
    }

    Ok(())
}
