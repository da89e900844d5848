//! Magnetic polarity classification.
//!
//! Decides which face of the magnet ("N" or "S") is applied from the
//! baseline-compensated field vector. A raw per-sample decision is noisy near
//! zero crossings, so the classifier tracks a *candidate* pole and only
//! promotes it to *stable* after it persists for a debounce interval.
//!
//! Very strong fields push magnetometers into non-linear territory where the
//! axis relationship can flip for a sample or two. Above a configured
//! ceiling the last stable pole is locked for the rest of the excursion.
//!
//! Which axes carry the signal depends on where the sensor sits in the
//! device, so the axis rule is a configurable [`PolarityStrategy`].

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::PolarityConfig;
use crate::types::{Pole, Vec3};

/// Sensor axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn index(&self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// Rule mapping a compensated vector to a pole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolarityStrategy {
    /// The axis with the largest absolute component decides; its sign gives the pole.
    #[default]
    DominantAxis,
    /// North when `v[north] >= v[south]`, south otherwise.
    AxisPair { north: Axis, south: Axis },
    /// Sign of a single axis. Suited to a fixed mounting orientation.
    SingleAxis { axis: Axis },
}

impl PolarityStrategy {
    /// Raw (undebounced) classification of a compensated vector.
    pub fn classify(&self, v: Vec3) -> Pole {
        match *self {
            PolarityStrategy::DominantAxis => {
                let mut dominant = 0;
                for i in 1..3 {
                    if v[i].abs() > v[dominant].abs() {
                        dominant = i;
                    }
                }
                sign_to_pole(v[dominant])
            }
            PolarityStrategy::AxisPair { north, south } => {
                if v[north.index()] >= v[south.index()] {
                    Pole::North
                } else {
                    Pole::South
                }
            }
            PolarityStrategy::SingleAxis { axis } => sign_to_pole(v[axis.index()]),
        }
    }
}

fn sign_to_pole(component: f32) -> Pole {
    if component > 0.0 {
        Pole::North
    } else if component < 0.0 {
        Pole::South
    } else {
        Pole::None
    }
}

/// Inspectable classifier state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoleState {
    /// Most recent raw classification.
    pub candidate: Pole,
    /// When the current candidate was first seen.
    pub candidate_since_ms: Option<u64>,
    /// Last candidate that persisted for the debounce interval.
    pub stable: Pole,
    /// Pole held while the field is above the high-field ceiling.
    pub locked: Option<Pole>,
    /// Last sample was under the minimum magnitude.
    pub below_floor: bool,
}

/// Debounced polarity classifier with a high-field lock.
#[derive(Debug, Clone)]
pub struct PolarityClassifier {
    config: PolarityConfig,
    state: PoleState,
}

impl PolarityClassifier {
    pub fn new(config: PolarityConfig) -> Self {
        Self {
            config,
            state: PoleState::default(),
        }
    }

    /// Classify one compensated sample.
    ///
    /// Returns the locked pole while above the ceiling, `none` below the
    /// configured floor, otherwise the stable pole. Debounce state advances
    /// in every case.
    pub fn classify(&mut self, v: Vec3, magnitude: f32, now_ms: u64) -> Pole {
        let below_floor = magnitude < self.config.min_magnitude || !magnitude.is_finite();
        self.state.below_floor = below_floor;
        let raw = if below_floor {
            Pole::None
        } else {
            self.config.strategy.classify(v)
        };

        let ceiling = self.config.max_magnitude;
        if ceiling > 0.0 && magnitude > ceiling {
            let locked = match self.state.locked {
                Some(pole) => pole,
                None => {
                    let pole = if self.state.stable.is_defined() {
                        self.state.stable
                    } else if self.state.candidate.is_defined() {
                        self.state.candidate
                    } else {
                        raw
                    };
                    debug!(pole = pole.as_str(), magnitude, "polarity locked above ceiling");
                    self.state.locked = Some(pole);
                    pole
                }
            };
            return locked;
        }

        if self.state.locked.take().is_some() {
            debug!(magnitude, "polarity lock released");
            // Restart debounce so the falling edge cannot flip the pole.
            self.state.candidate = raw;
            self.state.candidate_since_ms = Some(now_ms);
        }

        if self.state.candidate_since_ms.is_none() || raw != self.state.candidate {
            self.state.candidate = raw;
            self.state.candidate_since_ms = Some(now_ms);
        }

        if let Some(since) = self.state.candidate_since_ms {
            if now_ms.saturating_sub(since) >= self.config.debounce_ms
                && self.state.stable != self.state.candidate
            {
                debug!(
                    from = self.state.stable.as_str(),
                    to = self.state.candidate.as_str(),
                    "stable pole changed"
                );
                self.state.stable = self.state.candidate;
            }
        }

        if below_floor {
            return Pole::None;
        }
        self.state.stable
    }

    /// Pole as last reported: locked if latched, `none` under the floor,
    /// else stable.
    pub fn current(&self) -> Pole {
        match self.state.locked {
            Some(pole) => pole,
            None if self.state.below_floor => Pole::None,
            None => self.state.stable,
        }
    }

    pub fn state(&self) -> PoleState {
        self.state
    }

    pub fn is_locked(&self) -> bool {
        self.state.locked.is_some()
    }

    pub fn reset(&mut self) {
        self.state = PoleState::default();
    }
}
