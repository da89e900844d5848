//! Core data types for the magnet gesture engine.
//!
//! This module defines the values that flow through the sensor-conditioning
//! pipeline: raw magnetometer samples, classified poles, trigger phases, the
//! gesture events produced at the end of the pipeline, and the per-sample
//! status snapshot handed to UI/logging collaborators.
//!
//! Design principle: if a concept crosses a module boundary it gets a type.
//! Poles are never passed around as strings and trigger states are never
//! encoded as integers.

use serde::{Deserialize, Serialize};

/// A three-axis vector in µT.
pub type Vec3 = [f32; 3];

/// Euclidean norm of a vector.
pub fn norm(v: Vec3) -> f32 {
    norm_sq(v).sqrt()
}

/// Squared Euclidean norm of a vector.
pub fn norm_sq(v: Vec3) -> f32 {
    v[0] * v[0] + v[1] * v[1] + v[2] * v[2]
}

/// Component-wise `a - b`.
pub fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

/// A single raw magnetometer reading.
///
/// This is the minimal input contract: a monotonic timestamp and the three
/// field components as reported by the host. Samples are ephemeral; the
/// pipeline only retains the most recent one (for zero commands).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    /// Monotonic timestamp in milliseconds.
    pub timestamp_ms: u64,
    /// X component in µT.
    pub x: f32,
    /// Y component in µT.
    pub y: f32,
    /// Z component in µT.
    pub z: f32,
}

impl RawSample {
    /// Creates a new raw sample.
    pub fn new(timestamp_ms: u64, x: f32, y: f32, z: f32) -> Self {
        Self { timestamp_ms, x, y, z }
    }

    /// The field components as a vector.
    pub fn vector(&self) -> Vec3 {
        [self.x, self.y, self.z]
    }

    /// Returns true if every component is a finite number.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Instantaneous magnetic orientation reported by the polarity classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Pole {
    /// North face toward the sensor.
    #[serde(rename = "N")]
    North,
    /// South face toward the sensor.
    #[serde(rename = "S")]
    South,
    /// No reliable polarity signal.
    #[default]
    #[serde(rename = "none")]
    None,
}

impl Pole {
    /// Short label used in logs and status output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Pole::North => "N",
            Pole::South => "S",
            Pole::None => "none",
        }
    }

    /// Returns true for `North` or `South`.
    pub fn is_defined(&self) -> bool {
        !matches!(self, Pole::None)
    }
}

/// Pole attached to a gesture.
///
/// `All` is used when polarity splitting is disabled and every gesture is
/// treated the same regardless of which face of the magnet was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GesturePole {
    #[serde(rename = "N")]
    North,
    #[serde(rename = "S")]
    South,
    #[serde(rename = "all")]
    All,
    #[serde(rename = "none")]
    None,
}

impl GesturePole {
    pub fn as_str(&self) -> &'static str {
        match self {
            GesturePole::North => "N",
            GesturePole::South => "S",
            GesturePole::All => "all",
            GesturePole::None => "none",
        }
    }
}

impl From<Pole> for GesturePole {
    fn from(pole: Pole) -> Self {
        match pole {
            Pole::North => GesturePole::North,
            Pole::South => GesturePole::South,
            Pole::None => GesturePole::None,
        }
    }
}

/// Phase of the trigger state machine.
///
/// The cycle is strictly `Idle → Timing → Cooldown → Idle`. Suppression and
/// the stale-sensor watchdog may short-circuit `Timing` back to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerPhase {
    /// Waiting for the field to cross the adaptive trigger threshold.
    #[default]
    Idle,
    /// A gesture is in progress; measuring hold duration.
    Timing,
    /// A gesture just completed; new gestures are blocked.
    Cooldown,
}

impl TriggerPhase {
    /// Human-readable label for status displays.
    pub fn label(&self) -> &'static str {
        match self {
            TriggerPhase::Idle => "idle",
            TriggerPhase::Timing => "timing",
            TriggerPhase::Cooldown => "cooldown",
        }
    }
}

/// How a gesture completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureKind {
    /// Field dropped below the release threshold before the long-press duration.
    ShortPress,
    /// Field was held past the long-press duration.
    LongPress,
    /// The sensor stopped delivering samples mid-gesture; treated as a release.
    StaleRelease,
}

/// A classified gesture event.
///
/// This is the only externally visible effect of the pipeline. The core never
/// performs the mapped action itself; see [`crate::actions::ActionMap`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gesture {
    /// Pole captured for this gesture.
    pub pole: GesturePole,
    /// Whether the gesture completed as a long press.
    pub long_press: bool,
    /// How the gesture completed.
    pub kind: GestureKind,
    /// Timestamp (ms) when the field first crossed the trigger threshold.
    pub started_at_ms: u64,
    /// Timestamp (ms) when the gesture fired.
    pub fired_at_ms: u64,
}

impl Gesture {
    /// Time between gesture start and firing.
    pub fn duration_ms(&self) -> u64 {
        self.fired_at_ms.saturating_sub(self.started_at_ms)
    }
}

/// Why the baseline was replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroReason {
    /// Explicit `zero_baseline` command.
    Manual,
    /// Zero command deferred until the first sample arrived.
    Startup,
    /// Field stayed below the auto-zero threshold long enough.
    SustainedLow,
    /// Field stayed inside the stability band long enough.
    SustainedStable,
}

impl ZeroReason {
    pub fn description(&self) -> &'static str {
        match self {
            ZeroReason::Manual => "manual zero",
            ZeroReason::Startup => "startup zero",
            ZeroReason::SustainedLow => "auto-zero: sustained low field",
            ZeroReason::SustainedStable => "auto-zero: sustained stable field",
        }
    }
}

/// Noteworthy non-gesture outcomes reported to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notice {
    /// Cold-start averaging finished; compensation is now active.
    BaselineReady { at_ms: u64, baseline: Vec3 },
    /// Baseline replaced and transient state reset.
    BaselineZeroed { at_ms: u64, reason: ZeroReason, baseline: Vec3 },
    /// A strong, steady field latched suppression. Any gesture in progress was cancelled.
    Suppressed { at_ms: u64, magnitude: f32 },
    /// The sensor went quiet mid-gesture; the watchdog forced a release.
    StaleSensor { at_ms: u64, silent_ms: u64 },
    /// A gesture completed but its pole is excluded by the pole mode.
    GestureFiltered { at_ms: u64, pole: Pole },
    /// A new configuration was applied and transient state reset.
    ConfigReloaded { at_ms: u64 },
    /// The requested hardware sampling delay changed.
    SamplingDelayChanged { at_ms: u64, delay_us: u32 },
}

/// Per-sample snapshot for UI/logging collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub timestamp_ms: u64,
    /// Compensated field (raw minus baseline), µT.
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Filtered compensated magnitude, µT.
    pub magnitude: f32,
    /// Stable (or locked) pole from the classifier.
    pub pole: Pole,
    pub state: TriggerPhase,
    /// Rate implied by the currently requested sampling delay.
    pub sample_rate_hz: f32,
    pub baseline_ready: bool,
    pub suppressed: bool,
    pub adaptive_trigger: f32,
    pub adaptive_reset: f32,
}
