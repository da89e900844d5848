//! Engine configuration.
//!
//! All thresholds are bundled into a single [`EngineConfig`] snapshot that is
//! immutable between reload events. Values arriving from a host (settings
//! screen, JSON file) are never trusted as-is: [`EngineConfig::normalized`]
//! repairs invalid orderings and logs every adjustment instead of failing.
//!
//! Defaults are tuned for a phone magnetometer sampled at 50Hz with a small
//! neodymium magnet applied to the back of the device.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::actions::ActionMap;
use crate::error::ConfigError;
use crate::polarity::PolarityStrategy;

/// Shortest sampling period the engine will request (200Hz).
pub const MIN_SAMPLING_DELAY_US: u32 = 5_000;
/// Longest sampling period the engine will request (5Hz).
pub const MAX_SAMPLING_DELAY_US: u32 = 200_000;

/// Convert a rate in Hz to a sampling delay in microseconds.
///
/// Non-positive or non-finite rates yield `default_us`. The result is clamped
/// to [`MIN_SAMPLING_DELAY_US`, `MAX_SAMPLING_DELAY_US`].
pub fn hz_to_delay_us(hz: f32, default_us: u32) -> u32 {
    if !hz.is_finite() || hz <= 0.0 {
        return default_us;
    }
    let delay = (1_000_000.0 / hz).round();
    (delay as u32).clamp(MIN_SAMPLING_DELAY_US, MAX_SAMPLING_DELAY_US)
}

/// Rate in Hz implied by a sampling delay.
pub fn delay_us_to_hz(delay_us: u32) -> f32 {
    if delay_us == 0 {
        0.0
    } else {
        1_000_000.0 / delay_us as f32
    }
}

/// Which poles produce gestures, and how they are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoleMode {
    /// Every gesture reports pole `all`.
    #[default]
    Single,
    /// Gestures report the captured pole (`N`, `S` or `none`).
    Split,
    /// Only north-pole gestures fire.
    NorthOnly,
    /// Only south-pole gestures fire.
    SouthOnly,
}

/// Trigger state machine thresholds and timings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Static trigger threshold (µT). The adaptive threshold never goes below it.
    pub trigger_threshold: f32,
    /// Static reset threshold (µT). Must be strictly below the trigger threshold.
    pub reset_threshold: f32,
    /// Field must stay above the trigger threshold this long before timing starts.
    pub press_debounce_ms: u64,
    /// Field must stay below the reset threshold this long to count as a release.
    pub release_debounce_ms: u64,
    /// Hold duration that turns a press into a long press.
    pub long_press_ms: u64,
    /// Minimum gap between a completed action and the next gesture.
    pub cooldown_ms: u64,
    /// How poles are attached to gestures.
    pub pole_mode: PoleMode,
    /// Window after gesture start during which the captured pole may still change.
    pub pole_settle_ms: u64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            trigger_threshold: 500.0,
            reset_threshold: 300.0,
            press_debounce_ms: 90,
            release_debounce_ms: 110,
            long_press_ms: 1500,
            cooldown_ms: 900,
            pole_mode: PoleMode::Single,
            pole_settle_ms: 200,
        }
    }
}

/// Baseline tracker parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    /// Samples averaged at cold start before compensation begins.
    pub cold_start_samples: u32,
    /// Per-sample EMA rate used while quiescent. Range: [0.0, 1.0].
    pub drift_rate: f32,
    /// Drift blending only runs below this fraction of the reset threshold.
    pub calm_fraction: f32,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            cold_start_samples: 100,
            drift_rate: 0.02,
            calm_fraction: 0.6,
        }
    }
}

/// Automatic re-zeroing on sustained low or sustained stable fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoZeroConfig {
    /// Magnitude (µT) below which the field counts as "low".
    pub threshold: f32,
    /// How long the field must stay low. 0 disables this branch.
    pub duration_ms: u64,
    /// Maximum min/max spread (µT) that counts as "stable".
    pub stability_band: f32,
    /// How long the field must stay stable. 0 disables this branch.
    pub stability_duration_ms: u64,
}

impl Default for AutoZeroConfig {
    fn default() -> Self {
        Self {
            threshold: 80.0,
            duration_ms: 4000,
            stability_band: 20.0,
            stability_duration_ms: 4000,
        }
    }
}

/// Magnitude smoothing and noise-floor estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Moving-average window length (samples).
    pub filter_window: usize,
    /// Standard deviations above the noise mean for the adaptive trigger.
    pub noise_multiplier: f32,
    /// Observation count at which the noise accumulator is halved.
    pub noise_sample_cap: u64,
    /// Adaptive reset is at least this fraction of the adaptive trigger.
    pub reset_ratio: f32,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            filter_window: 5,
            noise_multiplier: 3.0,
            noise_sample_cap: 20_000,
            reset_ratio: 0.6,
        }
    }
}

/// Polarity classifier thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolarityConfig {
    /// Below this magnitude the pole is `none`.
    pub min_magnitude: f32,
    /// Above this magnitude the last stable pole is locked. 0 disables the lock.
    pub max_magnitude: f32,
    /// A candidate pole must persist this long to become stable.
    pub debounce_ms: u64,
    /// How compensated axes map to a pole.
    pub strategy: PolarityStrategy,
}

impl Default for PolarityConfig {
    fn default() -> Self {
        Self {
            min_magnitude: 50.0,
            max_magnitude: 1500.0,
            debounce_ms: 80,
            strategy: PolarityStrategy::DominantAxis,
        }
    }
}

/// Strong-field suppression parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuppressionConfig {
    /// Magnitude (µT) above which an excursion is tracked. 0 disables suppression.
    pub threshold: f32,
    /// How long the field must stay steady before latching.
    pub duration_ms: u64,
    /// Maximum min/max spread (µT) that still counts as steady.
    pub jitter: f32,
}

impl Default for SuppressionConfig {
    fn default() -> Self {
        Self {
            threshold: 1800.0,
            duration_ms: 400,
            jitter: 40.0,
        }
    }
}

/// Duty-cycled sampling parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Filtered magnitude (µT) below which the field counts as low-energy.
    pub energy_threshold: f32,
    /// Low-energy hold before switching to the low rate.
    pub energy_hold_ms: u64,
    pub high_rate_hz: f32,
    pub low_rate_hz: f32,
    /// High rate is forced for this long after a gesture start or a zero.
    pub boost_ms: u64,
    /// Period of the sampling-rate re-evaluation timer.
    pub rate_check_ms: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            energy_threshold: 100.0,
            energy_hold_ms: 2000,
            high_rate_hz: 50.0,
            low_rate_hz: 15.0,
            boost_ms: 2000,
            rate_check_ms: 500,
        }
    }
}

/// Stale-sensor watchdog parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Period of the watchdog timer.
    pub period_ms: u64,
    /// Sensor is stale after this many expected sample intervals without data.
    pub stale_factor: u32,
    /// Lower bound on the stale interval.
    pub min_stale_ms: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            period_ms: 100,
            stale_factor: 5,
            min_stale_ms: 100,
        }
    }
}

/// Complete configuration snapshot for the gesture engine.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub trigger: TriggerConfig,
    pub baseline: BaselineConfig,
    pub auto_zero: AutoZeroConfig,
    pub signal: SignalConfig,
    pub polarity: PolarityConfig,
    pub suppression: SuppressionConfig,
    pub sampling: SamplingConfig,
    pub watchdog: WatchdogConfig,
    pub actions: ActionMap,
}

fn sanitize_f32(field: &str, value: f32, default: f32) -> f32 {
    if !value.is_finite() {
        warn!(field, value = %value, default, "non-finite config value replaced with default");
        default
    } else if value < 0.0 {
        warn!(field, value, "negative config value clamped to 0");
        0.0
    } else {
        value
    }
}

impl EngineConfig {
    /// Parse a (possibly partial) JSON document. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        Ok(config)
    }

    /// Load a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Return a copy with every value in a safe range and relative ordering.
    ///
    /// Never fails; each repair is logged at `warn`.
    pub fn normalized(&self) -> Self {
        let d = EngineConfig::default();
        let mut c = self.clone();

        let t = &mut c.trigger;
        t.trigger_threshold = sanitize_f32(
            "trigger.trigger_threshold",
            t.trigger_threshold,
            d.trigger.trigger_threshold,
        )
        .max(1.0);
        t.reset_threshold = sanitize_f32(
            "trigger.reset_threshold",
            t.reset_threshold,
            d.trigger.reset_threshold,
        );
        if t.reset_threshold >= t.trigger_threshold {
            let repaired = t.trigger_threshold * 0.6;
            warn!(
                reset = t.reset_threshold,
                trigger = t.trigger_threshold,
                repaired,
                "reset threshold not below trigger threshold"
            );
            t.reset_threshold = repaired;
        }

        let b = &mut c.baseline;
        b.drift_rate = sanitize_f32("baseline.drift_rate", b.drift_rate, d.baseline.drift_rate).min(1.0);
        b.calm_fraction =
            sanitize_f32("baseline.calm_fraction", b.calm_fraction, d.baseline.calm_fraction).min(1.0);

        let a = &mut c.auto_zero;
        a.threshold = sanitize_f32("auto_zero.threshold", a.threshold, d.auto_zero.threshold);
        a.stability_band =
            sanitize_f32("auto_zero.stability_band", a.stability_band, d.auto_zero.stability_band);

        let s = &mut c.signal;
        if s.filter_window == 0 {
            warn!("signal.filter_window of 0 raised to 1");
            s.filter_window = 1;
        }
        s.noise_multiplier = sanitize_f32(
            "signal.noise_multiplier",
            s.noise_multiplier,
            d.signal.noise_multiplier,
        );
        if s.noise_sample_cap < 2 {
            warn!(cap = s.noise_sample_cap, "signal.noise_sample_cap raised to 2");
            s.noise_sample_cap = 2;
        }
        s.reset_ratio = sanitize_f32("signal.reset_ratio", s.reset_ratio, d.signal.reset_ratio);
        if s.reset_ratio >= 1.0 {
            warn!(ratio = s.reset_ratio, "signal.reset_ratio must be below 1; using default");
            s.reset_ratio = d.signal.reset_ratio;
        }

        let p = &mut c.polarity;
        p.min_magnitude = sanitize_f32("polarity.min_magnitude", p.min_magnitude, d.polarity.min_magnitude);
        p.max_magnitude = sanitize_f32("polarity.max_magnitude", p.max_magnitude, d.polarity.max_magnitude);
        if p.max_magnitude > 0.0 && p.max_magnitude <= p.min_magnitude {
            let repaired = p.min_magnitude * 2.0;
            warn!(
                min = p.min_magnitude,
                max = p.max_magnitude,
                repaired,
                "polarity lock ceiling not above polarity floor"
            );
            p.max_magnitude = repaired;
        }

        let trigger = c.trigger.trigger_threshold;
        let su = &mut c.suppression;
        su.threshold = sanitize_f32("suppression.threshold", su.threshold, d.suppression.threshold);
        su.jitter = sanitize_f32("suppression.jitter", su.jitter, d.suppression.jitter);
        if su.threshold > 0.0 && su.threshold <= trigger {
            let repaired = trigger + su.jitter.max(1.0);
            warn!(
                threshold = su.threshold,
                trigger,
                repaired,
                "strong suppression threshold not above trigger threshold"
            );
            su.threshold = repaired;
        }

        let sa = &mut c.sampling;
        sa.energy_threshold = sanitize_f32(
            "sampling.energy_threshold",
            sa.energy_threshold,
            d.sampling.energy_threshold,
        );
        sa.high_rate_hz = sanitize_f32("sampling.high_rate_hz", sa.high_rate_hz, d.sampling.high_rate_hz);
        sa.low_rate_hz = sanitize_f32("sampling.low_rate_hz", sa.low_rate_hz, d.sampling.low_rate_hz);
        if sa.high_rate_hz == 0.0 {
            sa.high_rate_hz = d.sampling.high_rate_hz;
        }
        if sa.low_rate_hz > sa.high_rate_hz {
            warn!(
                low = sa.low_rate_hz,
                high = sa.high_rate_hz,
                "low sampling rate above high rate; swapping"
            );
            std::mem::swap(&mut sa.low_rate_hz, &mut sa.high_rate_hz);
        } else if sa.low_rate_hz == sa.high_rate_hz {
            warn!(rate = sa.high_rate_hz, "low sampling rate equals high rate; halving low rate");
            sa.low_rate_hz = sa.high_rate_hz / 2.0;
        }
        let high_delay = hz_to_delay_us(sa.high_rate_hz, 20_000);
        let low_delay = hz_to_delay_us(sa.low_rate_hz, 66_000);
        if low_delay <= high_delay {
            let widened = high_delay.saturating_mul(2).min(MAX_SAMPLING_DELAY_US);
            if widened > high_delay {
                warn!(
                    high_delay_us = high_delay,
                    low_delay_us = low_delay,
                    "sampling rates clamp to the same delay; lengthening low delay"
                );
                sa.low_rate_hz = 1_000_000.0 / widened as f32;
            } else {
                warn!(
                    delay_us = high_delay,
                    "both sampling rates at the slowest delay; speeding up high rate"
                );
                sa.high_rate_hz = 1_000_000.0 / (MAX_SAMPLING_DELAY_US / 2) as f32;
                sa.low_rate_hz = 1_000_000.0 / MAX_SAMPLING_DELAY_US as f32;
            }
        }

        if sa.rate_check_ms == 0 {
            warn!("sampling.rate_check_ms of 0 replaced with default");
            sa.rate_check_ms = d.sampling.rate_check_ms;
        }

        let w = &mut c.watchdog;
        if w.period_ms == 0 {
            warn!("watchdog.period_ms of 0 replaced with default");
            w.period_ms = d.watchdog.period_ms;
        }
        if w.stale_factor == 0 {
            w.stale_factor = 1;
        }

        c
    }

    /// High-rate sampling delay in µs.
    pub fn high_delay_us(&self) -> u32 {
        hz_to_delay_us(self.sampling.high_rate_hz, 20_000)
    }

    /// Low-rate sampling delay in µs.
    pub fn low_delay_us(&self) -> u32 {
        hz_to_delay_us(self.sampling.low_rate_hz, 66_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hz_to_delay_conversion() {
        assert_eq!(hz_to_delay_us(50.0, 1), 20_000);
        assert_eq!(hz_to_delay_us(15.0, 1), 66_667);
        // Clamped to the safe hardware range
        assert_eq!(hz_to_delay_us(1000.0, 1), MIN_SAMPLING_DELAY_US);
        assert_eq!(hz_to_delay_us(1.0, 1), MAX_SAMPLING_DELAY_US);
        // Invalid rates fall back to the default
        assert_eq!(hz_to_delay_us(0.0, 20_000), 20_000);
        assert_eq!(hz_to_delay_us(-5.0, 20_000), 20_000);
        assert_eq!(hz_to_delay_us(f32::NAN, 20_000), 20_000);
    }

    #[test]
    fn test_default_config_is_already_normal() {
        let config = EngineConfig::default();
        assert_eq!(config.normalized(), config);
    }

    #[test]
    fn test_reset_above_trigger_is_repaired() {
        let mut config = EngineConfig::default();
        config.trigger.trigger_threshold = 400.0;
        config.trigger.reset_threshold = 450.0;
        let n = config.normalized();
        assert!(n.trigger.reset_threshold < n.trigger.trigger_threshold);
        assert_eq!(n.trigger.reset_threshold, 240.0);
    }

    #[test]
    fn test_low_rate_above_high_rate_is_swapped() {
        let mut config = EngineConfig::default();
        config.sampling.high_rate_hz = 10.0;
        config.sampling.low_rate_hz = 40.0;
        let n = config.normalized();
        assert_eq!(n.sampling.high_rate_hz, 40.0);
        assert_eq!(n.sampling.low_rate_hz, 10.0);
        assert!(n.high_delay_us() < n.low_delay_us());
    }

    #[test]
    fn test_equal_rates_halve_low_rate() {
        let mut config = EngineConfig::default();
        config.sampling.high_rate_hz = 30.0;
        config.sampling.low_rate_hz = 30.0;
        let n = config.normalized();
        assert_eq!(n.sampling.low_rate_hz, 15.0);
    }

    #[test]
    fn test_rates_clamping_to_one_delay_are_separated() {
        let mut config = EngineConfig::default();
        config.sampling.high_rate_hz = 1000.0;
        config.sampling.low_rate_hz = 400.0;
        let n = config.normalized();
        assert_eq!(n.high_delay_us(), MIN_SAMPLING_DELAY_US);
        assert_eq!(n.low_delay_us(), 2 * MIN_SAMPLING_DELAY_US);

        config.sampling.high_rate_hz = 2.0;
        config.sampling.low_rate_hz = 1.0;
        let n = config.normalized();
        assert_eq!(n.high_delay_us(), MAX_SAMPLING_DELAY_US / 2);
        assert_eq!(n.low_delay_us(), MAX_SAMPLING_DELAY_US);
    }

    #[test]
    fn test_negative_and_nan_values_are_sanitized() {
        let mut config = EngineConfig::default();
        config.trigger.trigger_threshold = f32::NAN;
        config.trigger.reset_threshold = -10.0;
        config.suppression.jitter = -1.0;
        let n = config.normalized();
        assert_eq!(n.trigger.trigger_threshold, 500.0);
        assert_eq!(n.trigger.reset_threshold, 0.0);
        assert_eq!(n.suppression.jitter, 0.0);
    }

    #[test]
    fn test_strong_threshold_below_trigger_is_raised() {
        let mut config = EngineConfig::default();
        config.suppression.threshold = 300.0;
        let n = config.normalized();
        assert_eq!(n.suppression.threshold, 540.0);

        // Zero keeps suppression disabled
        config.suppression.threshold = 0.0;
        assert_eq!(config.normalized().suppression.threshold, 0.0);
    }

    #[test]
    fn test_polarity_ceiling_repaired() {
        let mut config = EngineConfig::default();
        config.polarity.min_magnitude = 200.0;
        config.polarity.max_magnitude = 100.0;
        let n = config.normalized();
        assert_eq!(n.polarity.max_magnitude, 400.0);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "trigger": { "trigger_threshold": 650.0, "pole_mode": "split" } }"#;
        let config = EngineConfig::from_json_str(json).unwrap();
        assert_eq!(config.trigger.trigger_threshold, 650.0);
        assert_eq!(config.trigger.reset_threshold, 300.0);
        assert_eq!(config.trigger.pole_mode, PoleMode::Split);
        assert_eq!(config.sampling, SamplingConfig::default());
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        let result = EngineConfig::from_json_str("{ not json");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_missing_file_reports_path() {
        let err = EngineConfig::load("/nonexistent/magnet.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/magnet.json"));
    }
}
