//! Baseline tracking and automatic re-zeroing.
//!
//! The baseline is the locally learned "zero field" vector. Everything
//! downstream works on the *compensated* vector `raw - baseline`, so only the
//! deviation caused by a nearby magnet matters, not Earth's field or the
//! device's own hard-iron offset.
//!
//! Lifecycle:
//! 1. Cold start: the first N samples are averaged. Compensation is a
//!    pass-through until the average is ready.
//! 2. Drift: while the trigger is idle and the field is calm, the baseline
//!    blends toward the current raw sample with a small EMA rate.
//! 3. Zero: a manual or automatic command replaces the baseline outright.
//!
//! Design note: the tracker never decides *when* it is calm. The caller
//! passes the filtered magnitude and trigger phase in, which keeps this type a
//! pure `state × sample → state'` transition.

use tracing::debug;

use crate::config::{AutoZeroConfig, BaselineConfig};
use crate::types::{sub, TriggerPhase, Vec3, ZeroReason};

/// Slowly adapting zero-reference vector.
#[derive(Debug, Clone)]
pub struct BaselineTracker {
    config: BaselineConfig,
    baseline: Vec3,
    ready: bool,
    /// Cold-start running sum.
    sum: [f64; 3],
    collected: u32,
}

impl BaselineTracker {
    pub fn new(config: BaselineConfig) -> Self {
        Self {
            config,
            baseline: [0.0; 3],
            ready: false,
            sum: [0.0; 3],
            collected: 0,
        }
    }

    /// Create a tracker that is already ready with the given baseline.
    pub fn with_baseline(config: BaselineConfig, baseline: Vec3) -> Self {
        let mut tracker = Self::new(config);
        tracker.baseline = baseline;
        tracker.ready = true;
        tracker
    }

    /// Subtract the baseline from a raw vector.
    ///
    /// During cold start the raw vector is accumulated and returned
    /// unchanged. The sample that completes the average is also returned raw.
    pub fn compensate(&mut self, raw: Vec3) -> Vec3 {
        if self.ready {
            return sub(raw, self.baseline);
        }

        for (acc, value) in self.sum.iter_mut().zip(raw.iter()) {
            *acc += *value as f64;
        }
        self.collected += 1;

        let target = self.config.cold_start_samples.max(1);
        if self.collected >= target {
            let n = self.collected as f64;
            self.baseline = [
                (self.sum[0] / n) as f32,
                (self.sum[1] / n) as f32,
                (self.sum[2] / n) as f32,
            ];
            self.ready = true;
            debug!(samples = self.collected, baseline = ?self.baseline, "cold-start baseline ready");
        }
        raw
    }

    /// Blend toward `raw` if the system is quiescent.
    ///
    /// Returns true when the baseline moved.
    pub fn adapt(&mut self, raw: Vec3, filtered: f32, phase: TriggerPhase, reset_threshold: f32) -> bool {
        if !self.ready || phase != TriggerPhase::Idle {
            return false;
        }
        if filtered >= self.config.calm_fraction * reset_threshold {
            return false;
        }
        let rate = self.config.drift_rate;
        for (b, r) in self.baseline.iter_mut().zip(raw.iter()) {
            *b += rate * (*r - *b);
        }
        true
    }

    /// Replace the baseline with `raw` and mark the tracker ready.
    pub fn zero(&mut self, raw: Vec3) {
        self.baseline = raw;
        self.ready = true;
        self.sum = [0.0; 3];
        self.collected = 0;
    }

    pub fn baseline(&self) -> Vec3 {
        self.baseline
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Cold-start samples collected so far (0 once ready via zero).
    pub fn collected(&self) -> u32 {
        self.collected
    }

    pub fn set_config(&mut self, config: BaselineConfig) {
        self.config = config;
    }
}

/// Detects sustained low or sustained stable fields and requests a zero.
///
/// After requesting a zero the detector latches and stays quiet until the
/// field rises above `threshold + stability_band`.
#[derive(Debug, Clone)]
pub struct AutoZero {
    config: AutoZeroConfig,
    low_since_ms: Option<u64>,
    stable_since_ms: Option<u64>,
    stable_min: f32,
    stable_max: f32,
    latched: bool,
}

impl AutoZero {
    pub fn new(config: AutoZeroConfig) -> Self {
        Self {
            config,
            low_since_ms: None,
            stable_since_ms: None,
            stable_min: 0.0,
            stable_max: 0.0,
            latched: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.duration_ms > 0 || self.config.stability_duration_ms > 0
    }

    /// Feed one compensated magnitude. Returns a reason when a zero is due.
    ///
    /// Gestures in progress are never zeroed out from under the user: while
    /// `phase` is `Timing` both windows are cleared.
    pub fn observe(&mut self, magnitude: f32, phase: TriggerPhase, now_ms: u64) -> Option<ZeroReason> {
        if !self.is_enabled() {
            return None;
        }
        if phase == TriggerPhase::Timing {
            self.clear_windows();
            return None;
        }

        if self.latched {
            if magnitude > self.config.threshold + self.config.stability_band {
                debug!(magnitude, "auto-zero re-armed");
                self.latched = false;
            } else {
                return None;
            }
        }

        let mut reason = None;

        if self.config.duration_ms > 0 {
            if magnitude < self.config.threshold {
                let since = *self.low_since_ms.get_or_insert(now_ms);
                if now_ms.saturating_sub(since) >= self.config.duration_ms {
                    reason = Some(ZeroReason::SustainedLow);
                }
            } else {
                self.low_since_ms = None;
            }
        }

        if self.config.stability_duration_ms > 0 {
            match self.stable_since_ms {
                None => self.restart_stable_window(magnitude, now_ms),
                Some(_) => {
                    self.stable_min = self.stable_min.min(magnitude);
                    self.stable_max = self.stable_max.max(magnitude);
                }
            }

            if self.stable_max - self.stable_min <= self.config.stability_band {
                let since = self.stable_since_ms.unwrap_or(now_ms);
                if reason.is_none() && now_ms.saturating_sub(since) >= self.config.stability_duration_ms {
                    reason = Some(ZeroReason::SustainedStable);
                }
            } else {
                self.restart_stable_window(magnitude, now_ms);
            }
        }

        if reason.is_some() {
            self.latch();
        }
        reason
    }

    /// Latch without a zero; used to carry the latch across a state reset.
    pub fn latch(&mut self) {
        self.latched = true;
        self.clear_windows();
    }

    pub fn is_latched(&self) -> bool {
        self.latched
    }

    fn restart_stable_window(&mut self, magnitude: f32, now_ms: u64) {
        self.stable_since_ms = Some(now_ms);
        self.stable_min = magnitude;
        self.stable_max = magnitude;
    }

    fn clear_windows(&mut self) {
        self.low_since_ms = None;
        self.stable_since_ms = None;
    }
}
