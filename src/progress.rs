//! Phase progress events for conversions.
//!
//! Inject an [`Arc<dyn ProgressSink>`] via
//! [`crate::config::EngineConfigBuilder::progress_sink`] to receive events as
//! the engine moves through each conversion:
//!
//! ```text
//! preprocess(0) → preprocess(100) → convert(0) → convert(100) → postprocess(0) → postprocess(100)
//! ```
//!
//! A phase's 100 % event is only emitted if the phase completed; on failure
//! the sequence stops early. Emission is fire-and-forget: with no sink it is
//! a no-op, and a panicking sink is contained.
//!
//! [`ProgressHub`] is a ready-made sink that fans events out over a
//! `tokio::sync::broadcast` channel so consumers can subscribe by
//! conversion id.
//!
//! # Example
//!
//! ```rust
//! use docshift::progress::{ProgressEvent, ProgressSink};
//! use std::sync::{Arc, Mutex};
//!
//! #[derive(Default)]
//! struct Recorder(Mutex<Vec<ProgressEvent>>);
//!
//! impl ProgressSink for Recorder {
//!     fn on_event(&self, event: &ProgressEvent) {
//!         self.0.lock().unwrap().push(event.clone());
//!     }
//! }
//!
//! let recorder = Arc::new(Recorder::default());
//! let config = docshift::EngineConfig::builder()
//!     .progress_sink(recorder.clone() as Arc<dyn ProgressSink>)
//!     .build()
//!     .unwrap();
//! ```

use futures::Stream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::warn;

/// One of the three coarse stages of a conversion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Preprocess,
    Convert,
    Postprocess,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Preprocess => "preprocess",
            Phase::Convert => "convert",
            Phase::Postprocess => "postprocess",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub conversion_id: String,
    pub phase: Phase,
    /// 0 at phase start, 100 at phase end.
    pub percent: u8,
}

/// Receives progress events.
///
/// Implementations must be `Send + Sync`: unrelated conversions run on
/// different tasks and may emit concurrently. Events for one conversion id
/// always arrive in order.
pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: &ProgressEvent);
}

/// A sink that drops everything.
pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {
    fn on_event(&self, _event: &ProgressEvent) {}
}

/// Convenience alias matching the type stored in [`crate::config::EngineConfig`].
pub type SharedProgressSink = Arc<dyn ProgressSink>;

/// Optional sink plus the never-fails emission rule.
#[derive(Clone, Default)]
pub struct ProgressEmitter {
    sink: Option<SharedProgressSink>,
}

impl ProgressEmitter {
    pub fn new(sink: Option<SharedProgressSink>) -> Self {
        Self { sink }
    }

    pub fn emit(&self, conversion_id: &str, phase: Phase, percent: u8) {
        let Some(sink) = self.sink.as_ref() else {
            return;
        };
        let event = ProgressEvent {
            conversion_id: conversion_id.to_string(),
            phase,
            percent,
        };
        if catch_unwind(AssertUnwindSafe(|| sink.on_event(&event))).is_err() {
            warn!("Progress sink panicked on {} {}({})", conversion_id, phase, percent);
        }
    }

    /// Emit the phase-start event and return a guard that emits the
    /// phase-end event when [`PhaseGuard::complete`] is called.
    pub fn start<'a>(&'a self, conversion_id: &'a str, phase: Phase) -> PhaseGuard<'a> {
        self.emit(conversion_id, phase, 0);
        PhaseGuard {
            emitter: self,
            conversion_id,
            phase,
        }
    }
}

impl fmt::Debug for ProgressEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressEmitter")
            .field("sink", &self.sink.as_ref().map(|_| "<dyn ProgressSink>"))
            .finish()
    }
}

/// An open phase. Dropping it without `complete` leaves the phase without
/// its 100 % event, which is how failures are signalled.
#[must_use = "call complete() when the phase finishes"]
pub struct PhaseGuard<'a> {
    emitter: &'a ProgressEmitter,
    conversion_id: &'a str,
    phase: Phase,
}

impl PhaseGuard<'_> {
    pub fn complete(self) {
        self.emitter.emit(self.conversion_id, self.phase, 100);
    }
}

// ── Broadcast hub ────────────────────────────────────────────────────────────

/// Broadcast fan-out keyed by conversion id.
///
/// Sending never blocks; with no subscribers the event is dropped. Slow
/// subscribers that fall more than `capacity` events behind skip the missed
/// events rather than stalling the engine.
#[derive(Clone)]
pub struct ProgressHub {
    tx: broadcast::Sender<ProgressEvent>,
}

impl ProgressHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Events for one conversion, in emission order.
    pub fn subscribe(&self, conversion_id: impl Into<String>) -> impl Stream<Item = ProgressEvent> + Send + Unpin {
        let id = conversion_id.into();
        BroadcastStream::new(self.tx.subscribe())
            .filter_map(move |item| match item {
                Ok(event) if event.conversion_id == id => Some(event),
                _ => None,
            })
    }

    /// Every event, regardless of conversion id.
    pub fn subscribe_all(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new(256)
    }
}

impl ProgressSink for ProgressHub {
    fn on_event(&self, event: &ProgressEvent) {
        let _ = self.tx.send(event.clone());
    }
}
