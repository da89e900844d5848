//! Magnitude smoothing and noise-floor estimation.
//!
//! This module provides the low-level signal conditioning that sits between
//! baseline compensation and the trigger logic:
//! - A short moving-average filter over the compensated magnitude
//! - An online (Welford) estimate of the quiescent noise floor
//! - Adaptive trigger/reset thresholds derived from that floor
//!
//! Design note: both components are O(1) per sample. The filter is a plain
//! FIFO mean rather than an IIR so its latency is bounded by the window
//! length.
//!
//! Why this matters:
//! Motors, speakers and steel furniture raise the ambient noise floor. By
//! learning the floor only while nothing is happening, the trigger threshold
//! rises on its own in a noisy environment without user recalibration.

use std::collections::VecDeque;

use crate::config::SignalConfig;
use crate::types::TriggerPhase;

/// Bounded moving-average filter over magnitudes.
///
/// The oldest entry is evicted when the window is full (FIFO).
#[derive(Debug, Clone)]
pub struct MagnitudeFilter {
    window: VecDeque<f32>,
    capacity: usize,
}

impl MagnitudeFilter {
    /// Create a filter with the given window length (at least 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a magnitude and return the mean of the current window.
    ///
    /// While filling at startup the mean covers fewer than `capacity` entries.
    pub fn filter(&mut self, magnitude: f32) -> f32 {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(magnitude);
        self.mean()
    }

    /// Mean of the current window (0 when empty).
    pub fn mean(&self) -> f32 {
        if self.window.is_empty() {
            return 0.0;
        }
        let sum: f32 = self.window.iter().sum();
        (sum / self.window.len() as f32).max(0.0)
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Clear the window.
    pub fn reset(&mut self) {
        self.window.clear();
    }
}

/// Online estimator of the quiescent noise floor.
///
/// Uses Welford's incremental algorithm for numerical stability. When the
/// observation count exceeds the cap, count and the squared-delta sum are
/// both halved: the variance estimate is preserved while older samples lose
/// weight, so the floor keeps tracking slow environmental drift.
#[derive(Debug, Clone)]
pub struct NoiseEstimator {
    count: u64,
    mean: f64,
    sum_sq_delta: f64,
    cap: u64,
}

impl NoiseEstimator {
    /// Create an estimator that halves its accumulator past `cap` observations.
    pub fn new(cap: u64) -> Self {
        Self {
            count: 0,
            mean: 0.0,
            sum_sq_delta: 0.0,
            cap: cap.max(2),
        }
    }

    /// Add one observation.
    ///
    /// Non-finite values are ignored so a single corrupt reading cannot
    /// poison the estimate.
    pub fn observe(&mut self, magnitude: f32) {
        if !magnitude.is_finite() {
            return;
        }
        let mag = magnitude as f64;
        self.count += 1;

        let delta = mag - self.mean;
        self.mean += delta / self.count as f64;

        // Welford's update for variance
        let delta2 = mag - self.mean;
        self.sum_sq_delta += delta * delta2;

        if self.count > self.cap {
            self.count /= 2;
            self.sum_sq_delta /= 2.0;
        }
    }

    /// Observe `magnitude` only if the system is quiescent.
    ///
    /// Quiescent means the trigger is idle and the magnitude is at or below
    /// the static reset threshold. Returns true if the sample was used.
    pub fn observe_quiescent(&mut self, magnitude: f32, phase: TriggerPhase, static_reset: f32) -> bool {
        if phase != TriggerPhase::Idle || magnitude > static_reset {
            return false;
        }
        self.observe(magnitude);
        true
    }

    /// Sample standard deviation of the observations (0 with fewer than two).
    pub fn noise_std(&self) -> f32 {
        if self.count < 2 {
            return 0.0;
        }
        let variance = self.sum_sq_delta.max(0.0) / (self.count as f64 - 1.0);
        variance.sqrt() as f32
    }

    /// Mean of the observations.
    pub fn mean(&self) -> f32 {
        self.mean as f32
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// `max(static_trigger, mean + k * std)`.
    pub fn adaptive_trigger(&self, static_trigger: f32, multiplier: f32) -> f32 {
        if self.count == 0 {
            return static_trigger;
        }
        static_trigger.max(self.mean() + multiplier * self.noise_std())
    }

    /// Reset the accumulator.
    pub fn reset(&mut self) {
        self.count = 0;
        self.mean = 0.0;
        self.sum_sq_delta = 0.0;
    }
}

/// Adaptive trigger and reset thresholds for one evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub trigger: f32,
    pub reset: f32,
}

impl Thresholds {
    /// Derive both thresholds from the live noise floor.
    ///
    /// The reset threshold is always computed from the *current* adaptive
    /// trigger, so raising sensitivity raises the release point with it.
    pub fn adaptive(
        noise: &NoiseEstimator,
        static_trigger: f32,
        static_reset: f32,
        config: &SignalConfig,
    ) -> Self {
        let trigger = noise.adaptive_trigger(static_trigger, config.noise_multiplier);
        let reset = static_reset.max(trigger * config.reset_ratio);
        Self { trigger, reset }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// Deterministic uniform values in [lo, hi).
    fn lcg_uniform(seed: &mut u64, lo: f32, hi: f32) -> f32 {
        *seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let unit = ((*seed >> 33) as f64 / (1u64 << 31) as f64) as f32;
        lo + unit * (hi - lo)
    }

    #[test]
    fn test_filter_mean_while_filling() {
        let mut filter = MagnitudeFilter::new(5);
        assert_eq!(filter.filter(10.0), 10.0);
        assert_eq!(filter.filter(20.0), 15.0);
        assert_eq!(filter.filter(30.0), 20.0);
        assert_eq!(filter.len(), 3);
    }

    #[test]
    fn test_filter_evicts_oldest() {
        let mut filter = MagnitudeFilter::new(3);
        filter.filter(100.0);
        filter.filter(0.0);
        filter.filter(0.0);
        // 100 is evicted on the fourth push
        assert_eq!(filter.filter(0.0), 0.0);
        assert_eq!(filter.len(), 3);
    }

    #[test]
    fn test_filter_suppresses_single_spike() {
        let mut filter = MagnitudeFilter::new(5);
        for _ in 0..5 {
            filter.filter(10.0);
        }
        let out = filter.filter(510.0);
        assert_abs_diff_eq!(out, 110.0, epsilon = 1e-3);
    }

    #[test]
    fn test_filter_latency_bounded_by_window() {
        let mut filter = MagnitudeFilter::new(5);
        for _ in 0..10 {
            filter.filter(0.0);
        }
        let mut out = 0.0;
        for _ in 0..5 {
            out = filter.filter(700.0);
        }
        assert_abs_diff_eq!(out, 700.0, epsilon = 1e-3);
    }

    #[test]
    fn test_filter_reset() {
        let mut filter = MagnitudeFilter::new(5);
        filter.filter(42.0);
        filter.reset();
        assert!(filter.is_empty());
        assert_eq!(filter.mean(), 0.0);
    }

    #[test]
    fn test_noise_std_needs_two_samples() {
        let mut noise = NoiseEstimator::new(20_000);
        assert_eq!(noise.noise_std(), 0.0);
        noise.observe(5.0);
        assert_eq!(noise.noise_std(), 0.0);
        noise.observe(7.0);
        assert_abs_diff_eq!(noise.noise_std(), 1.41421, epsilon = 1e-4);
    }

    #[test]
    fn test_noise_steady_signal_has_zero_std() {
        let mut noise = NoiseEstimator::new(20_000);
        for _ in 0..100 {
            noise.observe(12.0);
        }
        assert_abs_diff_eq!(noise.mean(), 12.0, epsilon = 1e-5);
        assert!(noise.noise_std() < 1e-4);
    }

    #[test]
    fn test_noise_ignores_non_finite() {
        let mut noise = NoiseEstimator::new(20_000);
        noise.observe(1.0);
        noise.observe(f32::NAN);
        noise.observe(f32::INFINITY);
        noise.observe(3.0);
        assert_eq!(noise.count(), 2);
        assert_abs_diff_eq!(noise.mean(), 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_quiescent_gate() {
        let mut noise = NoiseEstimator::new(20_000);
        assert!(noise.observe_quiescent(100.0, TriggerPhase::Idle, 300.0));
        assert!(noise.observe_quiescent(300.0, TriggerPhase::Idle, 300.0));
        assert!(!noise.observe_quiescent(301.0, TriggerPhase::Idle, 300.0));
        assert!(!noise.observe_quiescent(10.0, TriggerPhase::Timing, 300.0));
        assert!(!noise.observe_quiescent(10.0, TriggerPhase::Cooldown, 300.0));
        assert_eq!(noise.count(), 2);
    }

    #[test]
    fn test_noise_cap_halves_without_losing_variance() {
        let mut noise = NoiseEstimator::new(100);
        for i in 0..101 {
            noise.observe(if i % 2 == 0 { 0.0 } else { 10.0 });
        }
        // Halved on the 101st observation
        assert_eq!(noise.count(), 50);
        let std_after_halving = noise.noise_std();
        assert!((std_after_halving - 5.0).abs() < 0.3, "std {}", std_after_halving);

        // Keeps working indefinitely
        for i in 0..10_000 {
            noise.observe(if i % 2 == 0 { 0.0 } else { 10.0 });
        }
        assert!(noise.count() <= 100);
        assert!((noise.noise_std() - 5.0).abs() < 0.3);
    }

    #[test]
    fn test_adaptive_trigger_floor_is_static_trigger() {
        let mut noise = NoiseEstimator::new(20_000);
        assert_eq!(noise.adaptive_trigger(500.0, 3.0), 500.0);
        for _ in 0..50 {
            noise.observe(10.0);
        }
        assert_eq!(noise.adaptive_trigger(500.0, 3.0), 500.0);
    }

    #[test]
    fn test_noise_floor_converges_above_static_trigger() {
        // Uniform [0, 300): mean 150, std ~86.6, mean + 3σ ~410
        let mut noise = NoiseEstimator::new(20_000);
        let mut seed = 7u64;
        let mut history = Vec::new();
        for i in 0..20_000 {
            noise.observe(lcg_uniform(&mut seed, 0.0, 300.0));
            if i % 1000 == 999 {
                history.push(noise.adaptive_trigger(200.0, 3.0));
            }
        }
        assert_abs_diff_eq!(noise.mean(), 150.0, epsilon = 5.0);
        assert_abs_diff_eq!(noise.noise_std(), 86.6, epsilon = 3.0);

        let last = *history.last().unwrap();
        assert!(last > 200.0, "adaptive trigger {} should exceed static 200", last);
        // Stabilized: late estimates barely move
        for value in &history[history.len() - 5..] {
            assert!((value - last).abs() < 10.0);
        }
    }

    #[test]
    fn test_noise_floor_below_static_trigger_keeps_static() {
        let mut noise = NoiseEstimator::new(20_000);
        let mut seed = 11u64;
        for _ in 0..5_000 {
            noise.observe(lcg_uniform(&mut seed, 0.0, 60.0));
        }
        assert_eq!(noise.adaptive_trigger(500.0, 3.0), 500.0);
    }

    #[test]
    fn test_adaptive_reset_tracks_trigger() {
        let config = SignalConfig::default();
        let mut noise = NoiseEstimator::new(20_000);
        let quiet = Thresholds::adaptive(&noise, 500.0, 300.0, &config);
        assert_eq!(quiet, Thresholds { trigger: 500.0, reset: 300.0 });

        for i in 0..1000 {
            noise.observe(if i % 2 == 0 { 0.0 } else { 300.0 });
        }
        let noisy = Thresholds::adaptive(&noise, 500.0, 300.0, &config);
        assert!(noisy.trigger > 500.0);
        assert_abs_diff_eq!(noisy.reset, noisy.trigger * 0.6, epsilon = 1e-3);
        assert!(noisy.reset < noisy.trigger);
    }

    #[test]
    fn test_noise_reset() {
        let mut noise = NoiseEstimator::new(20_000);
        noise.observe(1.0);
        noise.observe(2.0);
        noise.reset();
        assert_eq!(noise.count(), 0);
        assert_eq!(noise.mean(), 0.0);
        assert_eq!(noise.noise_std(), 0.0);
    }
}
