//! Single-threaded event loop driving a [`GestureEngine`].
//!
//! Samples, commands and configuration reloads arrive over one
//! `std::sync::mpsc` channel. The loop waits on the channel with a timeout
//! equal to the time left until the next engine timer, so timers fire
//! between events and never preempt a sample mid-pipeline.
//!
//! The host decides which thread runs [`Runtime::run`]; the sensor callback
//! only needs a cloned [`Sender<Event>`].
//!
//! Host sample timestamps may use any epoch (boot time, uptime). The first
//! sample pins the host epoch to the runtime [`Clock`] and later samples are
//! shifted by the same offset, so the watchdog and boost windows compare
//! times from one timeline while sample spacing is preserved.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::pipeline::{GestureEngine, SensorHost, StepOutput};
use crate::types::RawSample;

/// Longest the loop sleeps when no timer is pending.
const IDLE_WAIT: Duration = Duration::from_millis(1000);

/// Inputs to the runtime.
#[derive(Debug, Clone)]
pub enum Event {
    /// Sensor reading stamped with the host's own clock.
    Sample(RawSample),
    ZeroBaseline,
    ReloadConfig(EngineConfig),
    /// Run due timers without other input.
    Tick,
    /// Stop the loop and hand the engine back.
    Shutdown,
}

/// Millisecond time source shared by samples, commands and timers.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

/// Milliseconds since construction, from [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// Create the event channel.
pub fn channel() -> (Sender<Event>, Receiver<Event>) {
    mpsc::channel()
}

pub struct Runtime<H: SensorHost, C: Clock> {
    engine: GestureEngine<H>,
    events: Receiver<Event>,
    clock: C,
    /// Runtime clock minus host clock, fixed by the first sample.
    host_offset_ms: Option<i64>,
}

impl<H: SensorHost, C: Clock> Runtime<H, C> {
    pub fn new(engine: GestureEngine<H>, events: Receiver<Event>, clock: C) -> Self {
        Self {
            engine,
            events,
            clock,
            host_offset_ms: None,
        }
    }

    pub fn engine(&self) -> &GestureEngine<H> {
        &self.engine
    }

    /// Run until [`Event::Shutdown`], returning the engine.
    ///
    /// Fails with [`EngineError::ChannelClosed`] if every sender is dropped
    /// without a shutdown.
    pub fn run(mut self) -> Result<GestureEngine<H>, EngineError> {
        info!("runtime started");
        loop {
            let now = self.clock.now_ms();
            let wait = match self.engine.next_deadline() {
                Some(deadline) => Duration::from_millis(deadline.saturating_sub(now)),
                None => IDLE_WAIT,
            };

            match self.events.recv_timeout(wait) {
                Ok(Event::Shutdown) => {
                    info!(samples = self.engine.samples_processed(), "runtime shutting down");
                    return Ok(self.engine);
                }
                Ok(event) => {
                    self.dispatch(event);
                }
                Err(RecvTimeoutError::Timeout) => {
                    self.engine.advance(self.clock.now_ms());
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(EngineError::ChannelClosed);
                }
            }
        }
    }

    /// Handle one event after firing any timers already due.
    pub fn dispatch(&mut self, event: Event) -> StepOutput {
        let now = self.clock.now_ms();
        let mut out = self.engine.advance(now);
        match event {
            Event::Sample(sample) => {
                let sample = self.to_clock_time(sample, now);
                out.merge(self.engine.process_sample(sample))
            }
            Event::ZeroBaseline => out.merge(self.engine.zero_baseline(now)),
            Event::ReloadConfig(config) => out.merge(self.engine.reload_config(config, now)),
            Event::Tick | Event::Shutdown => {}
        }
        if !out.gestures.is_empty() {
            debug!(count = out.gestures.len(), "gestures dispatched");
        }
        out
    }

    /// Shift a host-stamped sample onto the runtime clock, never past `now`.
    fn to_clock_time(&mut self, sample: RawSample, now: u64) -> RawSample {
        let offset = *self
            .host_offset_ms
            .get_or_insert(now as i64 - sample.timestamp_ms as i64);
        let mapped = (sample.timestamp_ms as i64).saturating_add(offset).clamp(0, now as i64);
        RawSample {
            timestamp_ms: mapped as u64,
            ..sample
        }
    }
}
