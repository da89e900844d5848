//! Magnet Gesture Engine Library
//!
//! Turns a continuous magnetometer stream into discrete gestures (short
//! press, long press, optionally split by magnetic pole) while rejecting
//! ambient noise, slow drift and sensor saturation.
//!
//! # Design Philosophy
//!
//! - **Relative, not absolute**: only deviation from a locally learned
//!   baseline matters. No Earth-field calibration is attempted.
//! - **Quiet until sure**: adaptive thresholds, debounced polarity and
//!   strong-field suppression all err toward "no gesture".
//! - **One owner for state**: every transient value lives in a single
//!   [`pipeline::PipelineState`] that is replaced wholesale on reset.
//! - **Host-agnostic**: hardware and actions sit behind
//!   [`pipeline::SensorHost`] and [`pipeline::EngineObserver`]; the core
//!   never touches actuators or storage.
//!
//! # Example
//!
//! ```no_run
//! use magnet_gesture::{EngineConfig, GestureEngine, RawSample, SensorHost, SensorKind};
//!
//! struct Phone;
//!
//! impl SensorHost for Phone {
//!     fn available_sensors(&self) -> Vec<SensorKind> {
//!         vec![SensorKind::Uncalibrated]
//!     }
//!     fn set_sampling_delay(&mut self, _delay_us: u32) {}
//! }
//!
//! let mut engine = GestureEngine::new(EngineConfig::default(), Phone, 0)?;
//! let out = engine.process_sample(RawSample::new(0, 12.0, -40.0, 3.0));
//! for gesture in &out.gestures {
//!     println!("{:?} -> {}", gesture, engine.action_for(gesture));
//! }
//! # Ok::<(), magnet_gesture::EngineError>(())
//! ```

pub mod actions;
pub mod activity;
pub mod baseline;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod polarity;
pub mod runtime;
pub mod sampling;
pub mod signal;
pub mod suppression;
pub mod timer;
pub mod trigger;
pub mod types;

#[cfg(test)]
mod stress_tests;

// Re-export commonly used types
pub use actions::{Action, ActionMap};
pub use config::{EngineConfig, PoleMode};
pub use error::{ConfigError, EngineError};
pub use pipeline::{EngineObserver, GestureEngine, PipelineState, SensorHost, SensorKind, StepOutput};
pub use polarity::PolarityStrategy;
pub use runtime::{Clock, Event, MonotonicClock, Runtime};
pub use types::{Gesture, GestureKind, GesturePole, Notice, Pole, RawSample, StatusSnapshot, TriggerPhase};
