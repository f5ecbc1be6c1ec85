//! Telemetry emission for RPC handlers.
//!
//! Every terminal exit of an RPC emits exactly one [`TelemetryRecord`];
//! streaming calls additionally record their start. The sink is pluggable
//! and must not block the calling handler.

use std::sync::{Arc, Mutex};
use std::time::Instant;

/// One telemetry record per RPC exit.
#[derive(Debug, Clone)]
pub struct TelemetryRecord {
    pub method: String,
    pub client: String,
    pub latency_ms: u64,
    pub status: String,
    /// Free-form method-specific fields (topic, tool name, cache_hit, ...).
    pub fields: Vec<(String, String)>,
}

/// Destination for telemetry records.
pub trait TelemetrySink: Send + Sync {
    fn emit(&self, record: TelemetryRecord);
}

/// Sink that writes records to the `tracing` subscriber. Never blocks.
#[derive(Debug, Default)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn emit(&self, record: TelemetryRecord) {
        let fields = record
            .fields
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ");
        tracing::info!(
            target: "weft::telemetry",
            method = %record.method,
            client = %record.client,
            latency_ms = record.latency_ms,
            status = %record.status,
            %fields,
            "rpc"
        );
    }
}

/// Sink that collects records in memory for test inspection.
#[derive(Debug, Default)]
pub struct InMemorySink {
    records: Mutex<Vec<TelemetryRecord>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<TelemetryRecord> {
        self.records.lock().expect("sink lock poisoned").clone()
    }

    pub fn clear(&self) {
        self.records.lock().expect("sink lock poisoned").clear();
    }
}

impl TelemetrySink for InMemorySink {
    fn emit(&self, record: TelemetryRecord) {
        self.records.lock().expect("sink lock poisoned").push(record);
    }
}

/// Per-call helper that stamps latency and emits a single record.
///
/// Constructed at handler entry with the peer identity; `set_client`
/// upgrades it to the authenticated subject once the token verifies. A
/// timer dropped without `finish` (the handler future was aborted by a
/// deadline or cancellation) emits an `aborted` failure record, so every
/// call still produces exactly one record.
pub struct CallTimer {
    method: String,
    client: String,
    start: Instant,
    fields: Vec<(String, String)>,
    sink: Arc<dyn TelemetrySink>,
    finished: bool,
}

impl CallTimer {
    pub fn new(
        method: impl Into<String>,
        client: impl Into<String>,
        sink: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            method: method.into(),
            client: client.into(),
            start: Instant::now(),
            fields: Vec::new(),
            sink,
            finished: false,
        }
    }

    pub fn set_client(&mut self, client: impl Into<String>) {
        self.client = client.into();
    }

    pub fn push_field(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.push((key.into(), value.into()));
    }

    /// Consume the timer and emit the record.
    pub fn finish(mut self, status: impl Into<String>) {
        self.emit(status.into());
    }

    fn emit(&mut self, status: String) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.sink.emit(TelemetryRecord {
            method: self.method.clone(),
            client: self.client.clone(),
            latency_ms: self.start.elapsed().as_millis() as u64,
            status,
            fields: std::mem::take(&mut self.fields),
        });
    }
}

impl Drop for CallTimer {
    fn drop(&mut self) {
        if !self.finished {
            self.emit("aborted".to_string());
        }
    }
}
