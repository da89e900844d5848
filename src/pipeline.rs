//! Complete gesture pipeline integrating every conditioning stage.
//!
//! This module orchestrates the per-sample data flow from a raw
//! magnetometer reading to classified gestures and a UI status snapshot.
//!
//! # Architecture
//!
//! Each sample runs the full pipeline to completion:
//! 1. **Baseline**: subtract the learned zero-reference (cold start, drift)
//! 2. **Filter**: moving-average of the compensated magnitude
//! 3. **Sampling rate**: pick the hardware rate from the filtered energy
//! 4. **Polarity**: debounced N/S classification with high-field lock
//! 5. **Auto-zero**: re-zero on sustained low or stable fields
//! 6. **Noise**: learn the quiescent floor, derive adaptive thresholds
//! 7. **Suppression**: latch on strong, steady fields
//! 8. **Trigger**: `Idle → Timing → Cooldown` and gesture emission
//!
//! All transient state lives in one [`PipelineState`]. Zero commands and
//! configuration reloads build a fresh value and replace the old one in a
//! single assignment, so no sample can observe a half-reset pipeline.
//!
//! Two periodic timers share the engine's [`TimerQueue`]: a stale-sensor
//! watchdog and a sampling-rate re-evaluation. A reload cancels both by
//! token and schedules them under the new periods. The engine never blocks and
//! never spawns threads; see [`crate::runtime`] for the event loop.

use tracing::{debug, info, warn};

use crate::actions::Action;
use crate::activity::ActivityLog;
use crate::baseline::{AutoZero, BaselineTracker};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::polarity::PolarityClassifier;
use crate::sampling::{SamplingRateController, SamplingStats};
use crate::signal::{MagnitudeFilter, NoiseEstimator, Thresholds};
use crate::suppression::StrongFieldSuppressor;
use crate::timer::{TimerKind, TimerQueue, TimerToken};
use crate::trigger::{TriggerEvent, TriggerInput, TriggerStateMachine};
use crate::types::{norm, Gesture, Notice, RawSample, StatusSnapshot, TriggerPhase, Vec3, ZeroReason};

// ============================================================================
// HOST & OBSERVER CONTRACTS
// ============================================================================

/// Magnetometer variants a host may offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    /// Raw field without hard-iron compensation. Preferred: the OS
    /// calibration can jump while a magnet is near.
    Uncalibrated,
    /// OS-calibrated field.
    Calibrated,
}

/// Platform side of the sensor: what exists and how fast to sample it.
pub trait SensorHost {
    fn available_sensors(&self) -> Vec<SensorKind>;

    /// Request a sampling period. Hosts may clamp or ignore the request.
    fn set_sampling_delay(&mut self, delay_us: u32);
}

/// Pick the best available magnetometer.
pub fn select_sensor(available: &[SensorKind]) -> Result<SensorKind, EngineError> {
    if available.contains(&SensorKind::Uncalibrated) {
        Ok(SensorKind::Uncalibrated)
    } else if available.contains(&SensorKind::Calibrated) {
        warn!("uncalibrated magnetometer unavailable; falling back to calibrated sensor");
        Ok(SensorKind::Calibrated)
    } else {
        Err(EngineError::SensorUnavailable)
    }
}

/// Receives engine output synchronously after each event.
///
/// All methods default to no-ops. Throttling and threading are the
/// observer's concern.
pub trait EngineObserver {
    fn on_gesture(&mut self, _gesture: &Gesture) {}
    fn on_status(&mut self, _status: &StatusSnapshot) {}
    fn on_notice(&mut self, _notice: &Notice) {}
}

/// Everything produced by one engine entry point.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutput {
    pub gestures: Vec<Gesture>,
    pub notices: Vec<Notice>,
    /// Present when a sample was processed.
    pub status: Option<StatusSnapshot>,
}

impl StepOutput {
    pub fn is_empty(&self) -> bool {
        self.gestures.is_empty() && self.notices.is_empty() && self.status.is_none()
    }

    /// Append another output, keeping the later status.
    pub fn merge(&mut self, other: StepOutput) {
        self.gestures.extend(other.gestures);
        self.notices.extend(other.notices);
        if other.status.is_some() {
            self.status = other.status;
        }
    }
}

// ============================================================================
// PIPELINE STATE
// ============================================================================

/// Every piece of transient per-stage state, as one inspectable value.
#[derive(Debug, Clone)]
pub struct PipelineState {
    pub baseline: BaselineTracker,
    pub filter: MagnitudeFilter,
    pub noise: NoiseEstimator,
    pub polarity: PolarityClassifier,
    pub suppression: StrongFieldSuppressor,
    pub trigger: TriggerStateMachine,
    pub auto_zero: AutoZero,
    /// Thresholds used for the most recent trigger evaluation.
    pub thresholds: Thresholds,
}

impl PipelineState {
    /// Cold-start state.
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_baseline(config, BaselineTracker::new(config.baseline.clone()))
    }

    /// Fresh transient state around an existing baseline.
    pub fn with_baseline(config: &EngineConfig, baseline: BaselineTracker) -> Self {
        Self {
            baseline,
            filter: MagnitudeFilter::new(config.signal.filter_window),
            noise: NoiseEstimator::new(config.signal.noise_sample_cap),
            polarity: PolarityClassifier::new(config.polarity.clone()),
            suppression: StrongFieldSuppressor::new(config.suppression.clone()),
            trigger: TriggerStateMachine::new(config.trigger.clone()),
            auto_zero: AutoZero::new(config.auto_zero.clone()),
            thresholds: Thresholds {
                trigger: config.trigger.trigger_threshold,
                reset: config.trigger.reset_threshold,
            },
        }
    }

    pub fn phase(&self) -> TriggerPhase {
        self.trigger.phase()
    }
}

// ============================================================================
// ENGINE
// ============================================================================

/// The magnet gesture engine.
///
/// Generic over the [`SensorHost`] so the same engine runs against a phone
/// sensor service, a replayed trace or a test double.
pub struct GestureEngine<H: SensorHost> {
    config: EngineConfig,
    host: H,
    sensor: SensorKind,
    state: PipelineState,
    sampling: SamplingRateController,
    applied_delay_us: u32,
    observers: Vec<Box<dyn EngineObserver>>,
    timers: TimerQueue<TimerKind>,
    /// Pending watchdog and rate-check timers.
    timer_tokens: Vec<TimerToken>,
    activity: ActivityLog,
    last_sample_ms: Option<u64>,
    last_raw: Option<Vec3>,
    last_status: Option<StatusSnapshot>,
    pending_zero: bool,
    samples_processed: u64,
    samples_dropped: u64,
}

impl<H: SensorHost> GestureEngine<H> {
    /// Create an engine, select a sensor and request the high sampling rate.
    ///
    /// Timers are scheduled relative to `start_ms`.
    pub fn new(config: EngineConfig, mut host: H, start_ms: u64) -> Result<Self, EngineError> {
        let config = config.normalized();
        let sensor = select_sensor(&host.available_sensors())?;

        let sampling = SamplingRateController::new(
            config.sampling.clone(),
            config.high_delay_us(),
            config.low_delay_us(),
        );
        let applied_delay_us = sampling.current_delay_us();
        host.set_sampling_delay(applied_delay_us);
        info!(?sensor, delay_us = applied_delay_us, "gesture engine started");

        let mut engine = Self {
            state: PipelineState::new(&config),
            config,
            host,
            sensor,
            sampling,
            applied_delay_us,
            observers: Vec::new(),
            timers: TimerQueue::new(),
            timer_tokens: Vec::new(),
            activity: ActivityLog::default(),
            last_sample_ms: None,
            last_raw: None,
            last_status: None,
            pending_zero: false,
            samples_processed: 0,
            samples_dropped: 0,
        };
        engine.schedule_timers(start_ms);
        Ok(engine)
    }

    pub fn add_observer(&mut self, observer: Box<dyn EngineObserver>) {
        self.observers.push(observer);
    }

    /// Run one sample through the full pipeline.
    pub fn process_sample(&mut self, sample: RawSample) -> StepOutput {
        let mut out = StepOutput::default();

        if !sample.is_finite() {
            self.samples_dropped += 1;
            warn!(timestamp_ms = sample.timestamp_ms, "dropping sample with non-finite components");
            return out;
        }

        let now = match self.last_sample_ms {
            Some(last) if sample.timestamp_ms < last => {
                debug!(timestamp_ms = sample.timestamp_ms, last, "non-monotonic timestamp clamped");
                last
            }
            _ => sample.timestamp_ms,
        };
        let raw = sample.vector();
        self.last_sample_ms = Some(now);
        self.last_raw = Some(raw);
        self.samples_processed += 1;

        if self.pending_zero {
            self.pending_zero = false;
            self.apply_zero(ZeroReason::Startup, raw, now, &mut out);
        }

        // Stage 1: baseline
        let was_ready = self.state.baseline.is_ready();
        let mut compensated = self.state.baseline.compensate(raw);
        let ready = self.state.baseline.is_ready();
        if ready && !was_ready {
            // Cold-start magnitudes are raw field; drop them from the window
            self.state.filter.reset();
            compensated = self.state.baseline.compensate(raw);
            let baseline = self.state.baseline.baseline();
            info!(?baseline, "baseline ready");
            self.activity.push(now, format!("Baseline ready {}", fmt_vec(baseline)));
            out.notices.push(Notice::BaselineReady { at_ms: now, baseline });
        }

        // Stage 2: filter
        let magnitude = norm(compensated);
        let filtered = self.state.filter.filter(magnitude);

        // Stage 3: sampling rate
        let delay = self.sampling.desired_delay(filtered * filtered, now);
        self.apply_delay(delay, now, &mut out);

        if ready {
            self.run_ready_stages(raw, compensated, magnitude, filtered, now, &mut out);
        }

        let status = self.snapshot(compensated, now);
        self.last_status = Some(status);
        out.status = Some(status);
        self.publish(&out);
        out
    }

    /// Stages that need a ready baseline.
    fn run_ready_stages(
        &mut self,
        raw: Vec3,
        compensated: Vec3,
        magnitude: f32,
        filtered: f32,
        now: u64,
        out: &mut StepOutput,
    ) {
        // Stage 4: polarity
        let pole = self.state.polarity.classify(compensated, magnitude, now);

        // Stage 5: auto-zero
        let phase = self.state.phase();
        if let Some(reason) = self.state.auto_zero.observe(magnitude, phase, now) {
            self.apply_zero(reason, raw, now, out);
            self.state.auto_zero.latch();
            return;
        }

        // Stage 6: noise floor and thresholds
        let trigger_config = &self.config.trigger;
        self.state
            .noise
            .observe_quiescent(filtered, phase, trigger_config.reset_threshold);
        self.state.thresholds = Thresholds::adaptive(
            &self.state.noise,
            trigger_config.trigger_threshold,
            trigger_config.reset_threshold,
            &self.config.signal,
        );

        // Stage 7: suppression
        let suppression = self.state.suppression.evaluate(filtered, now);
        if suppression.newly_latched {
            self.state.trigger.suppress(now);
            self.activity.push(now, "Strong steady field, gesture ignored");
            out.notices.push(Notice::Suppressed {
                at_ms: now,
                magnitude: filtered,
            });
        }

        // Stage 8: trigger
        if suppression.suppressed {
            self.state.trigger.hold_suppressed();
        } else {
            let input = TriggerInput {
                filtered,
                thresholds: self.state.thresholds,
                pole,
                now_ms: now,
            };
            if let Some(event) = self.state.trigger.step(input) {
                self.handle_trigger_event(event, now, out);
            }
        }

        let phase = self.state.phase();
        self.state
            .baseline
            .adapt(raw, filtered, phase, self.config.trigger.reset_threshold);
    }

    /// Fire every timer due at or before `now_ms`.
    pub fn advance(&mut self, now_ms: u64) -> StepOutput {
        let mut out = StepOutput::default();
        while let Some((token, kind)) = self.timers.pop_due(now_ms) {
            self.timer_tokens.retain(|&t| t != token);
            self.on_timer(kind, now_ms, &mut out);
        }
        self.publish(&out);
        out
    }

    /// Earliest pending timer deadline.
    pub fn next_deadline(&mut self) -> Option<u64> {
        self.timers.next_deadline()
    }

    /// Replace the baseline with the latest raw sample and reset all
    /// transient state. Deferred to the first sample if none arrived yet.
    pub fn zero_baseline(&mut self, now_ms: u64) -> StepOutput {
        let mut out = StepOutput::default();
        match self.last_raw {
            Some(raw) => self.apply_zero(ZeroReason::Manual, raw, now_ms, &mut out),
            None => {
                info!("zero requested before first sample; deferring");
                self.pending_zero = true;
            }
        }
        self.publish(&out);
        out
    }

    /// Apply a new configuration. The learned baseline survives; every
    /// other transient state is reset.
    pub fn reload_config(&mut self, config: EngineConfig, now_ms: u64) -> StepOutput {
        let mut out = StepOutput::default();
        let config = config.normalized();

        let mut baseline = self.state.baseline.clone();
        baseline.set_config(config.baseline.clone());
        self.state = PipelineState::with_baseline(&config, baseline);

        self.sampling = SamplingRateController::new(
            config.sampling.clone(),
            config.high_delay_us(),
            config.low_delay_us(),
        );
        self.config = config;

        let delay = self.sampling.current_delay_us();
        self.apply_delay(delay, now_ms, &mut out);

        for token in self.timer_tokens.drain(..) {
            self.timers.cancel(token);
        }
        self.schedule_timers(now_ms);

        info!(at_ms = now_ms, "configuration reloaded");
        self.activity.push(now_ms, "Configuration reloaded");
        out.notices.push(Notice::ConfigReloaded { at_ms: now_ms });
        self.publish(&out);
        out
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    /// Most recent status snapshot.
    pub fn status(&self) -> Option<StatusSnapshot> {
        self.last_status
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sensor(&self) -> SensorKind {
        self.sensor
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn activity(&self) -> &ActivityLog {
        &self.activity
    }

    pub fn sampling_stats(&self) -> SamplingStats {
        self.sampling.stats()
    }

    /// Currently requested sampling delay.
    pub fn sampling_delay_us(&self) -> u32 {
        self.applied_delay_us
    }

    /// Action bound to a gesture under the current configuration.
    pub fn action_for(&self, gesture: &Gesture) -> Action {
        self.config.actions.resolve(gesture)
    }

    pub fn samples_processed(&self) -> u64 {
        self.samples_processed
    }

    pub fn samples_dropped(&self) -> u64 {
        self.samples_dropped
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    fn on_timer(&mut self, kind: TimerKind, now: u64, out: &mut StepOutput) {
        match kind {
            TimerKind::Watchdog => {
                self.schedule(now + self.config.watchdog.period_ms, TimerKind::Watchdog);
                self.check_stale(now, out);
            }
            TimerKind::RateCheck => {
                self.schedule(now + self.config.sampling.rate_check_ms, TimerKind::RateCheck);
                let delay = self.sampling.reevaluate(now);
                self.apply_delay(delay, now, out);
            }
        }
    }

    /// Release a gesture whose sensor stream went silent.
    fn check_stale(&mut self, now: u64, out: &mut StepOutput) {
        if self.state.phase() != TriggerPhase::Timing {
            return;
        }
        let Some(last) = self.last_sample_ms else {
            return;
        };
        let silent = now.saturating_sub(last);
        if silent <= self.stale_limit_ms() {
            return;
        }

        warn!(silent_ms = silent, limit_ms = self.stale_limit_ms(), "sensor stale mid-gesture; forcing release");
        if let Some(event) = self.state.trigger.stale_release(now) {
            self.handle_trigger_event(event, now, out);
        }
        self.activity
            .push(now, format!("Sensor silent for {} ms, gesture released", silent));
        out.notices.push(Notice::StaleSensor {
            at_ms: now,
            silent_ms: silent,
        });
        self.sampling.boost(now);
        let delay = self.sampling.current_delay_us();
        self.apply_delay(delay, now, out);
    }

    /// Silence after which the sensor counts as stale.
    fn stale_limit_ms(&self) -> u64 {
        let interval_ms = (self.applied_delay_us as u64 + 999) / 1000;
        let scaled = interval_ms * self.config.watchdog.stale_factor as u64;
        scaled.max(self.config.watchdog.min_stale_ms)
    }

    fn handle_trigger_event(&mut self, event: TriggerEvent, now: u64, out: &mut StepOutput) {
        match event {
            TriggerEvent::Started { .. } => {
                self.sampling.boost(now);
                let delay = self.sampling.current_delay_us();
                self.apply_delay(delay, now, out);
            }
            TriggerEvent::Gesture(gesture) => {
                let action = self.action_for(&gesture);
                self.activity.push(
                    now,
                    format!(
                        "{} {} -> {}",
                        gesture.pole.as_str(),
                        if gesture.long_press { "long press" } else { "short press" },
                        action
                    ),
                );
                out.gestures.push(gesture);
            }
            TriggerEvent::Filtered { at_ms, pole, .. } => {
                self.activity
                    .push(now, format!("{} gesture ignored by pole mode", pole.as_str()));
                out.notices.push(Notice::GestureFiltered { at_ms, pole });
            }
            TriggerEvent::Cancelled { .. } => {}
        }
    }

    /// Replace the baseline and every transient state in one assignment.
    fn apply_zero(&mut self, reason: ZeroReason, raw: Vec3, now: u64, out: &mut StepOutput) {
        let mut baseline = self.state.baseline.clone();
        baseline.zero(raw);
        self.state = PipelineState::with_baseline(&self.config, baseline);

        self.sampling.boost(now);
        let delay = self.sampling.current_delay_us();
        self.apply_delay(delay, now, out);

        info!(reason = reason.description(), baseline = ?raw, "baseline zeroed");
        self.activity
            .push(now, format!("{} {}", capitalize(reason.description()), fmt_vec(raw)));
        out.notices.push(Notice::BaselineZeroed {
            at_ms: now,
            reason,
            baseline: raw,
        });
    }

    fn apply_delay(&mut self, delay_us: u32, now: u64, out: &mut StepOutput) {
        if delay_us == self.applied_delay_us {
            return;
        }
        debug!(from = self.applied_delay_us, to = delay_us, "requesting new sampling delay");
        self.host.set_sampling_delay(delay_us);
        self.applied_delay_us = delay_us;
        out.notices.push(Notice::SamplingDelayChanged {
            at_ms: now,
            delay_us,
        });
    }

    fn schedule_timers(&mut self, now: u64) {
        self.schedule(now + self.config.watchdog.period_ms, TimerKind::Watchdog);
        self.schedule(now + self.config.sampling.rate_check_ms, TimerKind::RateCheck);
    }

    fn schedule(&mut self, fire_at_ms: u64, kind: TimerKind) {
        let token = self.timers.schedule(fire_at_ms, kind);
        self.timer_tokens.push(token);
    }

    fn snapshot(&self, compensated: Vec3, now: u64) -> StatusSnapshot {
        StatusSnapshot {
            timestamp_ms: now,
            x: compensated[0],
            y: compensated[1],
            z: compensated[2],
            magnitude: self.state.filter.mean(),
            pole: self.state.polarity.current(),
            state: self.state.phase(),
            sample_rate_hz: self.sampling.current_rate_hz(),
            baseline_ready: self.state.baseline.is_ready(),
            suppressed: self.state.suppression.is_latched(),
            adaptive_trigger: self.state.thresholds.trigger,
            adaptive_reset: self.state.thresholds.reset,
        }
    }

    fn publish(&mut self, out: &StepOutput) {
        if self.observers.is_empty() {
            return;
        }
        for observer in self.observers.iter_mut() {
            for notice in &out.notices {
                observer.on_notice(notice);
            }
            for gesture in &out.gestures {
                observer.on_gesture(gesture);
            }
            if let Some(status) = &out.status {
                observer.on_status(status);
            }
        }
    }
}

fn fmt_vec(v: Vec3) -> String {
    format!("(X={:.0}, Y={:.0}, Z={:.0})", v[0], v[1], v[2])
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
