//! Strong-field suppression.
//!
//! A magnet stuck to the device case, a laptop speaker or a magnetic mount
//! produces a field that is both very strong and very steady. A hand-held
//! magnet is never that steady. When the filtered magnitude stays above the
//! strong threshold with a min/max spread inside the jitter tolerance for the
//! configured duration, the suppressor latches and the trigger machine stops
//! evaluating transitions until the field clearly drops away.
//!
//! Hysteresis: an excursion starts when the magnitude exceeds the threshold
//! but only ends once it falls below `threshold - jitter`. The latch clears on
//! that same condition, so a field hovering at the boundary cannot toggle it.

use tracing::{debug, info};

use crate::config::SuppressionConfig;

/// Result of one suppression evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SuppressionOutcome {
    /// Trigger transitions must be skipped for this sample.
    pub suppressed: bool,
    /// The latch engaged on this sample. True at most once per latch.
    pub newly_latched: bool,
}

/// Rolling excursion state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SuppressionState {
    pub window_start_ms: Option<u64>,
    pub window_min: f32,
    pub window_max: f32,
    pub latched: bool,
}

#[derive(Debug, Clone)]
pub struct StrongFieldSuppressor {
    config: SuppressionConfig,
    state: SuppressionState,
}

impl StrongFieldSuppressor {
    pub fn new(config: SuppressionConfig) -> Self {
        Self {
            config,
            state: SuppressionState::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.threshold > 0.0 && self.config.duration_ms > 0
    }

    /// Evaluate one filtered magnitude.
    pub fn evaluate(&mut self, magnitude: f32, now_ms: u64) -> SuppressionOutcome {
        if !self.is_enabled() {
            return SuppressionOutcome::default();
        }

        let threshold = self.config.threshold;
        let jitter = self.config.jitter;
        let floor = threshold - jitter;

        let in_excursion = match self.state.window_start_ms {
            Some(_) => magnitude >= floor,
            None => magnitude > threshold,
        };

        if !in_excursion {
            self.state.window_start_ms = None;
            if magnitude < floor && self.state.latched {
                debug!(magnitude, floor, "strong-field suppression cleared");
                self.state.latched = false;
            }
            return SuppressionOutcome {
                suppressed: self.state.latched,
                newly_latched: false,
            };
        }

        let start = match self.state.window_start_ms {
            None => {
                self.restart_window(magnitude, now_ms);
                now_ms
            }
            Some(start) => {
                self.state.window_min = self.state.window_min.min(magnitude);
                self.state.window_max = self.state.window_max.max(magnitude);
                if self.state.window_max - self.state.window_min > jitter {
                    self.restart_window(magnitude, now_ms);
                    now_ms
                } else {
                    start
                }
            }
        };

        let mut newly_latched = false;
        if !self.state.latched && now_ms.saturating_sub(start) >= self.config.duration_ms {
            self.state.latched = true;
            newly_latched = true;
            info!(
                magnitude,
                spread = self.state.window_max - self.state.window_min,
                "strong steady field; suppressing gestures"
            );
        }

        SuppressionOutcome {
            suppressed: self.state.latched,
            newly_latched,
        }
    }

    pub fn is_latched(&self) -> bool {
        self.state.latched
    }

    pub fn state(&self) -> SuppressionState {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = SuppressionState::default();
    }

    fn restart_window(&mut self, magnitude: f32, now_ms: u64) {
        self.state.window_start_ms = Some(now_ms);
        self.state.window_min = magnitude;
        self.state.window_max = magnitude;
    }
}
