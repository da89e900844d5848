//! Trigger state machine.
//!
//! The central consumer of the pipeline. Combines the filtered magnitude,
//! adaptive thresholds, the classified pole and the suppression latch into
//! `Idle → Timing → Cooldown → Idle` transitions, and is the only component
//! that produces gestures.
//!
//! ```text
//!          filtered > trigger for press_debounce
//!          and cooldown elapsed since last action
//!   Idle ───────────────────────────────────────────▶ Timing
//!    ▲                                                 │  │
//!    │ cooldown elapsed     held ≥ long_press          │  │ filtered < reset
//!    │                      (no release pending)       │  │ for release_debounce
//!    └──────────── Cooldown ◀──────────────────────────┘◀─┘
//! ```
//!
//! Suppression and the stale-sensor watchdog may send `Timing` straight back
//! to `Idle` without passing through `Cooldown`.
//!
//! Design note: one transition per evaluation. A sample that ends a cooldown
//! never also starts a gesture.

use tracing::{debug, info};

use crate::config::{PoleMode, TriggerConfig};
use crate::signal::Thresholds;
use crate::types::{Gesture, GestureKind, GesturePole, Pole, TriggerPhase};

/// Full trigger state. Mutated only by [`TriggerStateMachine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TriggerState {
    pub phase: TriggerPhase,
    /// When the field first crossed the trigger threshold for the current gesture.
    pub started_at_ms: Option<u64>,
    pub long_press_fired: bool,
    /// Pole captured for the current gesture.
    pub pole: Pole,
    /// Idle only: when the field first exceeded the trigger threshold.
    pub armed_since_ms: Option<u64>,
    /// Timing only: when the field first dropped below the reset threshold.
    pub release_since_ms: Option<u64>,
    /// Last fired, filtered or suppressed action.
    pub last_action_ms: Option<u64>,
}

/// Outcome of a trigger evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TriggerEvent {
    /// Entered `Timing`.
    Started { started_at_ms: u64, pole: Pole },
    /// A gesture completed and passes the pole mode.
    Gesture(Gesture),
    /// A gesture completed but its pole is excluded by the pole mode.
    Filtered { at_ms: u64, pole: Pole, long_press: bool },
    /// A gesture in progress was abandoned (strong-field suppression).
    Cancelled { at_ms: u64 },
}

/// Per-sample inputs to the state machine.
#[derive(Debug, Clone, Copy)]
pub struct TriggerInput {
    pub filtered: f32,
    pub thresholds: Thresholds,
    /// Stable (or locked) pole from the classifier.
    pub pole: Pole,
    pub now_ms: u64,
}

#[derive(Debug, Clone)]
pub struct TriggerStateMachine {
    config: TriggerConfig,
    state: TriggerState,
}

impl TriggerStateMachine {
    pub fn new(config: TriggerConfig) -> Self {
        Self {
            config,
            state: TriggerState::default(),
        }
    }

    pub fn phase(&self) -> TriggerPhase {
        self.state.phase
    }

    pub fn state(&self) -> TriggerState {
        self.state
    }

    pub fn last_action_ms(&self) -> Option<u64> {
        self.state.last_action_ms
    }

    /// Evaluate one unsuppressed sample.
    pub fn step(&mut self, input: TriggerInput) -> Option<TriggerEvent> {
        match self.state.phase {
            TriggerPhase::Idle => self.step_idle(input),
            TriggerPhase::Timing => self.step_timing(input),
            TriggerPhase::Cooldown => {
                if self.cooldown_elapsed(input.now_ms) {
                    debug!(at_ms = input.now_ms, "cooldown finished");
                    self.state.phase = TriggerPhase::Idle;
                }
                None
            }
        }
    }

    /// Handle a newly latched suppression: abandon any gesture in progress
    /// and record the skip as the last action.
    pub fn suppress(&mut self, now_ms: u64) -> Option<TriggerEvent> {
        let was_timing = self.state.phase == TriggerPhase::Timing;
        if was_timing {
            info!(at_ms = now_ms, "gesture cancelled by strong-field suppression");
            self.state.phase = TriggerPhase::Idle;
        }
        self.clear_gesture();
        self.state.last_action_ms = Some(now_ms);
        was_timing.then_some(TriggerEvent::Cancelled { at_ms: now_ms })
    }

    /// Clear press arming while suppression stays latched.
    pub fn hold_suppressed(&mut self) {
        self.state.armed_since_ms = None;
    }

    /// The sensor went silent mid-gesture. Treat it as a release and go back
    /// to `Idle`. Returns `None` unless a gesture was in progress.
    pub fn stale_release(&mut self, now_ms: u64) -> Option<TriggerEvent> {
        if self.state.phase != TriggerPhase::Timing {
            return None;
        }
        let event = if self.state.long_press_fired {
            None
        } else {
            Some(self.complete(GestureKind::StaleRelease, now_ms))
        };
        self.state.phase = TriggerPhase::Idle;
        self.state.last_action_ms = Some(now_ms);
        self.clear_gesture();
        event
    }

    fn step_idle(&mut self, input: TriggerInput) -> Option<TriggerEvent> {
        let now = input.now_ms;
        if input.filtered <= input.thresholds.trigger || !self.cooldown_elapsed(now) {
            self.state.armed_since_ms = None;
            return None;
        }

        let armed = *self.state.armed_since_ms.get_or_insert(now);
        if now.saturating_sub(armed) < self.config.press_debounce_ms {
            return None;
        }

        self.state.phase = TriggerPhase::Timing;
        self.state.started_at_ms = Some(armed);
        self.state.armed_since_ms = None;
        self.state.release_since_ms = None;
        self.state.long_press_fired = false;
        self.state.pole = input.pole;
        debug!(
            started_at_ms = armed,
            pole = input.pole.as_str(),
            filtered = input.filtered,
            trigger = input.thresholds.trigger,
            "gesture started"
        );
        Some(TriggerEvent::Started {
            started_at_ms: armed,
            pole: input.pole,
        })
    }

    fn step_timing(&mut self, input: TriggerInput) -> Option<TriggerEvent> {
        let now = input.now_ms;
        let started = self.state.started_at_ms.unwrap_or(now);
        let elapsed = now.saturating_sub(started);

        // Early in the gesture the pole may still settle; then it is frozen.
        if elapsed <= self.config.pole_settle_ms && input.pole.is_defined() && input.pole != self.state.pole {
            debug!(from = self.state.pole.as_str(), to = input.pole.as_str(), "captured pole updated");
            self.state.pole = input.pole;
        }

        if self.state.release_since_ms.is_none()
            && !self.state.long_press_fired
            && elapsed >= self.config.long_press_ms
        {
            let event = self.complete(GestureKind::LongPress, now);
            self.state.long_press_fired = true;
            self.enter_cooldown(now);
            return Some(event);
        }

        if input.filtered < input.thresholds.reset {
            let since = *self.state.release_since_ms.get_or_insert(now);
            if now.saturating_sub(since) >= self.config.release_debounce_ms {
                let event = if self.state.long_press_fired {
                    None
                } else {
                    Some(self.complete(GestureKind::ShortPress, now))
                };
                self.enter_cooldown(now);
                return event;
            }
        } else {
            self.state.release_since_ms = None;
        }
        None
    }

    /// Build the completion event for the captured pole under the pole mode.
    fn complete(&self, kind: GestureKind, now_ms: u64) -> TriggerEvent {
        let long_press = kind == GestureKind::LongPress;
        let pole = self.state.pole;
        let gesture_pole = match self.config.pole_mode {
            PoleMode::Single => Some(GesturePole::All),
            PoleMode::Split => Some(GesturePole::from(pole)),
            PoleMode::NorthOnly => (pole == Pole::North).then_some(GesturePole::North),
            PoleMode::SouthOnly => (pole == Pole::South).then_some(GesturePole::South),
        };

        match gesture_pole {
            Some(gesture_pole) => {
                let gesture = Gesture {
                    pole: gesture_pole,
                    long_press,
                    kind,
                    started_at_ms: self.state.started_at_ms.unwrap_or(now_ms),
                    fired_at_ms: now_ms,
                };
                info!(
                    pole = gesture_pole.as_str(),
                    kind = ?kind,
                    duration_ms = gesture.duration_ms(),
                    "gesture fired"
                );
                TriggerEvent::Gesture(gesture)
            }
            None => {
                info!(pole = pole.as_str(), mode = ?self.config.pole_mode, "gesture filtered by pole mode");
                TriggerEvent::Filtered {
                    at_ms: now_ms,
                    pole,
                    long_press,
                }
            }
        }
    }

    fn enter_cooldown(&mut self, now_ms: u64) {
        self.state.phase = TriggerPhase::Cooldown;
        self.state.last_action_ms = Some(now_ms);
        self.state.release_since_ms = None;
    }

    fn clear_gesture(&mut self) {
        self.state.started_at_ms = None;
        self.state.long_press_fired = false;
        self.state.pole = Pole::None;
        self.state.armed_since_ms = None;
        self.state.release_since_ms = None;
    }

    fn cooldown_elapsed(&self, now_ms: u64) -> bool {
        self.state
            .last_action_ms
            .map_or(true, |last| now_ms.saturating_sub(last) >= self.config.cooldown_ms)
    }
}
