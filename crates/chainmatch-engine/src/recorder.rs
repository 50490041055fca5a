//! Append-only event log with an optional external sink.
//!
//! The recorder keeps every committed event in memory and forwards each one
//! to the configured [`EventSink`]. A sink failure is logged and counted;
//! it never fails the transaction that produced the event.

use std::io::Write;
use std::sync::{Arc, Mutex};

use chainmatch_types::{ChainmatchError, EngineEvent, Result};

/// Receives committed events.
pub trait EventSink: Send {
    fn publish(&mut self, event: &EngineEvent) -> Result<()>;
}

/// Collects events in memory; clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<EngineEvent>>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything published so far.
    #[must_use]
    pub fn events(&self) -> Vec<EngineEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl EventSink for MemorySink {
    fn publish(&mut self, event: &EngineEvent) -> Result<()> {
        self.events
            .lock()
            .map_err(|_| ChainmatchError::Internal("memory sink poisoned".into()))?
            .push(event.clone());
        Ok(())
    }
}

/// Writes one JSON document per line.
#[derive(Debug)]
pub struct JsonLinesSink<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> EventSink for JsonLinesSink<W> {
    fn publish(&mut self, event: &EngineEvent) -> Result<()> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// The engine's event log.
#[derive(Default)]
pub struct EventRecorder {
    log: Vec<EngineEvent>,
    sink: Option<Box<dyn EventSink>>,
    sink_failures: u64,
}

impl EventRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_sink(sink: Box<dyn EventSink>) -> Self {
        Self {
            sink: Some(sink),
            ..Self::default()
        }
    }

    /// Replace the sink; the log is kept.
    pub fn set_sink(&mut self, sink: Box<dyn EventSink>) {
        self.sink = Some(sink);
    }

    /// Append an event and forward it to the sink.
    pub fn record(&mut self, event: EngineEvent) {
        if let Some(sink) = self.sink.as_mut() {
            if let Err(err) = sink.publish(&event) {
                self.sink_failures += 1;
                tracing::warn!(
                    event = event.name(),
                    failures = self.sink_failures,
                    error = %err,
                    "Event sink failed"
                );
            }
        }
        self.log.push(event);
    }

    #[must_use]
    pub fn events(&self) -> &[EngineEvent] {
        &self.log
    }

    #[must_use]
    pub fn sink_failures(&self) -> u64 {
        self.sink_failures
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.log.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    /// Rebuild a recorder around a persisted log, without replaying it
    /// into any sink.
    #[must_use]
    pub fn from_events(log: Vec<EngineEvent>) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }
}

impl std::fmt::Debug for EventRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRecorder")
            .field("events", &self.log.len())
            .field("has_sink", &self.sink.is_some())
            .field("sink_failures", &self.sink_failures)
            .finish()
    }
}
