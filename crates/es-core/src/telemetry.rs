//! Event/Telemetry Channel
//!
//! Best-effort delivery of block reports to the hosting documents. Reporting
//! is fire-and-forget: sinks never return errors and never block the caller,
//! and consumers must tolerate duplicates and reordering.

use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::types::BlockCategory;
use crate::url::truncate_detail;

/// Default display length for the offending hostname/URL fragment.
pub const DEFAULT_DETAIL_CHARS: usize = 80;

/// One block report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct TelemetryEvent {
    pub category: BlockCategory,
    /// Offending hostname or truncated URL fragment. Display only.
    pub hostname: String,
}

/// Destination for block reports.
pub trait TelemetrySink: Send + Sync {
    fn report(&self, event: TelemetryEvent);
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn report(&self, _event: TelemetryEvent) {}
}

/// Writes events to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl TelemetrySink for LogSink {
    fn report(&self, event: TelemetryEvent) {
        log::info!("blocked [{}] {}", event.category.as_str(), event.hostname);
    }
}

/// Forwards events over an mpsc channel. A closed receiver is ignored.
pub struct ChannelSink {
    tx: Mutex<Sender<TelemetryEvent>>,
}

impl ChannelSink {
    pub fn new(tx: Sender<TelemetryEvent>) -> Self {
        Self { tx: Mutex::new(tx) }
    }
}

impl TelemetrySink for ChannelSink {
    fn report(&self, event: TelemetryEvent) {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = tx.send(event);
    }
}

/// Keeps every event in memory. Used by trace replay and tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn take(&self) -> Vec<TelemetryEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TelemetrySink for RecordingSink {
    fn report(&self, event: TelemetryEvent) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).push(event);
    }
}

impl<S: TelemetrySink + ?Sized> TelemetrySink for Arc<S> {
    fn report(&self, event: TelemetryEvent) {
        (**self).report(event)
    }
}

/// Shared handle used by the mediator and the hardening layer.
#[derive(Clone)]
pub struct Telemetry {
    sink: Arc<dyn TelemetrySink>,
    max_detail: usize,
}

impl Telemetry {
    pub fn new(sink: Arc<dyn TelemetrySink>, max_detail: usize) -> Self {
        Self { sink, max_detail }
    }

    pub fn null() -> Self {
        Self::new(Arc::new(NullSink), DEFAULT_DETAIL_CHARS)
    }

    /// Report a block. Never fails, never waits on the consumer.
    pub fn report(&self, category: BlockCategory, detail: &str) {
        self.sink.report(TelemetryEvent {
            category,
            hostname: truncate_detail(detail, self.max_detail),
        });
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new(Arc::new(LogSink), DEFAULT_DETAIL_CHARS)
    }
}

impl std::fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry").field("max_detail", &self.max_detail).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn report_truncates_detail() {
        let sink = Arc::new(RecordingSink::new());
        let telemetry = Telemetry::new(sink.clone(), 10);
        telemetry.report(BlockCategory::Pattern, "https://example.com/very/long/path");
        let events = sink.take();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].hostname, "https://ex...");
        assert_eq!(events[0].category, BlockCategory::Pattern);
        assert!(sink.is_empty());
    }

    #[test]
    fn channel_sink_survives_closed_receiver() {
        let (tx, rx) = mpsc::channel();
        let telemetry = Telemetry::new(Arc::new(ChannelSink::new(tx)), DEFAULT_DETAIL_CHARS);
        telemetry.report(BlockCategory::Domain, "ads.example");
        assert_eq!(rx.recv().unwrap().hostname, "ads.example");
        drop(rx);
        telemetry.report(BlockCategory::Domain, "ads.example");
    }

    #[test]
    fn event_json_shape() {
        let event = TelemetryEvent {
            category: BlockCategory::Navigation,
            hostname: "vidsrc.cc".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json, serde_json::json!({"category": "navigation", "hostname": "vidsrc.cc"}));
    }
}
