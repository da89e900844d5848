//! Duty-cycled sampling-rate control.
//!
//! The magnetometer is the dominant power cost of an always-on gesture
//! listener. The controller picks between two hardware rates:
//!
//! - `High` whenever there is field energy, immediately and without debounce
//! - `Low` only after the energy stayed below the threshold for a hold period
//!
//! A boost window forces `High` after a gesture starts, after a zero, and
//! after a stale-sensor recovery, since gesture timing precision depends on
//! sample density.
//!
//! Time spent at each rate is accounted in [`SamplingStats`] so hosts can
//! report the power saved by duty cycling.

use tracing::debug;

use crate::config::{delay_us_to_hz, SamplingConfig};

/// Hardware rate currently requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SamplingMode {
    #[default]
    High,
    Low,
}

/// Time accounting per sampling mode.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SamplingStats {
    /// Milliseconds spent requesting the high rate.
    pub high_ms: u64,
    /// Milliseconds spent requesting the low rate.
    pub low_ms: u64,
    /// Number of mode switches.
    pub switches: u64,
    pub high_rate_hz: f32,
    pub low_rate_hz: f32,
}

impl SamplingStats {
    /// Fraction of accounted time spent at the low rate.
    pub fn low_rate_fraction(&self) -> f32 {
        let total = self.high_ms + self.low_ms;
        if total == 0 {
            0.0
        } else {
            self.low_ms as f32 / total as f32
        }
    }

    /// Sensor wake-ups avoided versus sampling at the high rate throughout.
    pub fn savings_percent(&self) -> f32 {
        if self.high_rate_hz <= 0.0 {
            return 0.0;
        }
        let per_low_ms = 1.0 - (self.low_rate_hz / self.high_rate_hz).clamp(0.0, 1.0);
        self.low_rate_fraction() * per_low_ms * 100.0
    }
}

#[derive(Debug, Clone)]
pub struct SamplingRateController {
    config: SamplingConfig,
    high_delay_us: u32,
    low_delay_us: u32,
    mode: SamplingMode,
    below_since_ms: Option<u64>,
    boost_until_ms: Option<u64>,
    last_energy_sq: f32,
    last_update_ms: Option<u64>,
    stats: SamplingStats,
}

impl SamplingRateController {
    /// Create a controller. Delays are expected to be pre-clamped.
    pub fn new(config: SamplingConfig, high_delay_us: u32, low_delay_us: u32) -> Self {
        let stats = SamplingStats {
            high_rate_hz: delay_us_to_hz(high_delay_us),
            low_rate_hz: delay_us_to_hz(low_delay_us),
            ..SamplingStats::default()
        };
        Self {
            config,
            high_delay_us,
            low_delay_us,
            mode: SamplingMode::High,
            below_since_ms: None,
            boost_until_ms: None,
            last_energy_sq: 0.0,
            last_update_ms: None,
            stats,
        }
    }

    /// Desired sampling delay given the filtered magnitude squared.
    pub fn desired_delay(&mut self, filtered_sq: f32, now_ms: u64) -> u32 {
        self.account(now_ms);
        self.last_energy_sq = if filtered_sq.is_finite() { filtered_sq.max(0.0) } else { 0.0 };

        let threshold_sq = self.config.energy_threshold * self.config.energy_threshold;
        let next = if self.last_energy_sq >= threshold_sq {
            self.below_since_ms = None;
            SamplingMode::High
        } else {
            let since = *self.below_since_ms.get_or_insert(now_ms);
            let held = now_ms.saturating_sub(since) >= self.config.energy_hold_ms;
            if held && !self.is_boosted(now_ms) {
                SamplingMode::Low
            } else if self.is_boosted(now_ms) {
                SamplingMode::High
            } else {
                self.mode
            }
        };

        self.switch_to(next, now_ms);
        self.current_delay_us()
    }

    /// Re-run the decision with the last seen energy. Used by the periodic
    /// rate check so a boost can expire without new samples.
    pub fn reevaluate(&mut self, now_ms: u64) -> u32 {
        let energy = self.last_energy_sq;
        self.desired_delay(energy, now_ms)
    }

    /// Force the high rate for the configured boost window.
    pub fn boost(&mut self, now_ms: u64) {
        self.account(now_ms);
        self.boost_until_ms = Some(now_ms + self.config.boost_ms);
        self.below_since_ms = None;
        self.switch_to(SamplingMode::High, now_ms);
    }

    pub fn is_boosted(&self, now_ms: u64) -> bool {
        self.boost_until_ms.map_or(false, |until| now_ms < until)
    }

    pub fn mode(&self) -> SamplingMode {
        self.mode
    }

    pub fn current_delay_us(&self) -> u32 {
        match self.mode {
            SamplingMode::High => self.high_delay_us,
            SamplingMode::Low => self.low_delay_us,
        }
    }

    /// Rate implied by the current delay.
    pub fn current_rate_hz(&self) -> f32 {
        delay_us_to_hz(self.current_delay_us())
    }

    pub fn stats(&self) -> SamplingStats {
        self.stats
    }

    fn switch_to(&mut self, next: SamplingMode, now_ms: u64) {
        if next != self.mode {
            debug!(from = ?self.mode, to = ?next, at_ms = now_ms, "sampling mode switch");
            self.mode = next;
            self.stats.switches += 1;
        }
    }

    fn account(&mut self, now_ms: u64) {
        if let Some(last) = self.last_update_ms {
            let elapsed = now_ms.saturating_sub(last);
            match self.mode {
                SamplingMode::High => self.stats.high_ms += elapsed,
                SamplingMode::Low => self.stats.low_ms += elapsed,
            }
        }
        self.last_update_ms = Some(self.last_update_ms.map_or(now_ms, |last| last.max(now_ms)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> SamplingRateController {
        SamplingRateController::new(
            SamplingConfig {
                energy_threshold: 100.0,
                energy_hold_ms: 2000,
                high_rate_hz: 50.0,
                low_rate_hz: 15.0,
                boost_ms: 2000,
                ..SamplingConfig::default()
            },
            20_000,
            66_667,
        )
    }

    #[test]
    fn test_switches_low_only_after_hold() {
        let mut c = controller();
        for t in (0..2000u64).step_by(20) {
            assert_eq!(c.desired_delay(10.0, t), 20_000, "t={}", t);
        }
        assert_eq!(c.desired_delay(10.0, 2000), 66_667);
        assert_eq!(c.mode(), SamplingMode::Low);
    }

    #[test]
    fn test_switches_high_immediately() {
        let mut c = controller();
        for t in (0..=2000u64).step_by(20) {
            c.desired_delay(10.0, t);
        }
        assert_eq!(c.mode(), SamplingMode::Low);
        // 120² is above 100²
        assert_eq!(c.desired_delay(120.0 * 120.0, 2020), 20_000);
    }

    #[test]
    fn test_energy_spike_restarts_hold() {
        let mut c = controller();
        for t in (0..1500u64).step_by(20) {
            c.desired_delay(10.0, t);
        }
        c.desired_delay(200.0 * 200.0, 1500);
        for t in (1520..3500u64).step_by(20) {
            assert_eq!(c.desired_delay(10.0, t), 20_000, "t={}", t);
        }
        assert_eq!(c.desired_delay(10.0, 3520), 66_667);
    }

    #[test]
    fn test_boost_forces_high() {
        let mut c = controller();
        for t in (0..=2000u64).step_by(20) {
            c.desired_delay(10.0, t);
        }
        assert_eq!(c.mode(), SamplingMode::Low);

        c.boost(2100);
        assert_eq!(c.current_delay_us(), 20_000);
        assert!(c.is_boosted(4099));
        assert!(!c.is_boosted(4100));

        // Quiet field during boost stays high
        assert_eq!(c.desired_delay(10.0, 3000), 20_000);
        // Boost expired and the hold (restarted at 3000) has elapsed
        assert_eq!(c.reevaluate(5000), 66_667);
    }

    #[test]
    fn test_stats_account_time_per_mode() {
        let mut c = controller();
        for t in (0..=6000u64).step_by(100) {
            c.desired_delay(10.0, t);
        }
        let stats = c.stats();
        assert_eq!(stats.high_ms, 2000);
        assert_eq!(stats.low_ms, 4000);
        assert_eq!(stats.switches, 1);
        assert!((stats.low_rate_fraction() - 0.6667).abs() < 1e-3);
        assert!(stats.savings_percent() > 40.0 && stats.savings_percent() < 50.0);
    }

    #[test]
    fn test_non_finite_energy_treated_as_quiet() {
        let mut c = controller();
        assert_eq!(c.desired_delay(f32::NAN, 0), 20_000);
        assert_eq!(c.desired_delay(f32::NAN, 2000), 66_667);
    }
}
