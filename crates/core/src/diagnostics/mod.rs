use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Severity attached to a [`DebugEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DebugLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Advisory message emitted by every component. Never affects control flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugEvent {
    pub message: String,
    pub level: DebugLevel,
}

/// Receiver for debug events, usually wired to an on-screen console.
pub type DebugSink = Arc<dyn Fn(&DebugEvent) + Send + Sync>;

/// Fans debug events out to `tracing` and to an optional user sink.
///
/// A deferred instance logs immediately but holds sink deliveries until
/// [`Diagnostics::flush`], so the sink never runs while the emitter holds a lock.
#[derive(Clone, Default)]
pub struct Diagnostics {
    sink: Option<DebugSink>,
    pending: Option<Arc<Mutex<Vec<DebugEvent>>>>,
}

impl Diagnostics {
    pub fn new(sink: Option<DebugSink>) -> Self {
        Self {
            sink,
            pending: None,
        }
    }

    pub fn deferred(sink: Option<DebugSink>) -> Self {
        Self {
            sink,
            pending: Some(Arc::default()),
        }
    }

    /// Delivers held events to the sink, oldest first.
    pub fn flush(&self) {
        let (Some(sink), Some(pending)) = (&self.sink, &self.pending) else {
            return;
        };
        let events = std::mem::take(&mut *pending.lock());
        for event in &events {
            sink(event);
        }
    }

    pub fn emit(&self, level: DebugLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            DebugLevel::Debug => tracing::debug!(target: "marker_overlay", "{message}"),
            DebugLevel::Info => tracing::info!(target: "marker_overlay", "{message}"),
            DebugLevel::Warn => tracing::warn!(target: "marker_overlay", "{message}"),
            DebugLevel::Error => tracing::error!(target: "marker_overlay", "{message}"),
        }

        let Some(sink) = &self.sink else {
            return;
        };
        let event = DebugEvent { message, level };
        match &self.pending {
            Some(pending) => pending.lock().push(event),
            None => sink(&event),
        }
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.emit(DebugLevel::Debug, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(DebugLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.emit(DebugLevel::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(DebugLevel::Error, message);
    }
}

impl std::fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Diagnostics")
            .field("sink", &self.sink.is_some())
            .field("deferred", &self.pending.is_some())
            .finish()
    }
}

/// Collects events in memory. Handy for tests and for the CLI's summary output.
#[derive(Debug, Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<DebugEvent>>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sink(&self) -> DebugSink {
        let events = self.events.clone();
        Arc::new(move |event: &DebugEvent| events.lock().push(event.clone()))
    }

    pub fn events(&self) -> Vec<DebugEvent> {
        self.events.lock().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.events
            .lock()
            .iter()
            .any(|event| event.message.contains(needle))
    }
}
