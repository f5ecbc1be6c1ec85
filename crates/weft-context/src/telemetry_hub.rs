//! Telemetry stream fan-out.
//!
//! A hub maps `stream_id` to a set of subscriber sinks. An in-process
//! publisher injects frames; every registered sink for the stream receives
//! every frame in publication order, at-most-once. Writes are non-blocking:
//! a full sink drops the frame, a closed sink is pruned on the spot.
//! Dropping a subscription removes its sink immediately, so peer
//! disconnects never leave dangling registrations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use weft_core::Timestamp;
use weft_wire::proto::TelemetryFrame;

#[derive(Debug)]
struct StreamSink {
    id: Uuid,
    tx: mpsc::Sender<TelemetryFrame>,
}

/// Shared registry of telemetry streams and their subscriber sinks.
#[derive(Clone, Default, Debug)]
pub struct TelemetryHub {
    streams: Arc<Mutex<HashMap<String, Vec<StreamSink>>>>,
}

impl TelemetryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink under `stream_id`. The returned subscription owns
    /// the receiving end and removes the sink when dropped.
    pub fn subscribe(&self, stream_id: &str, queue_depth: usize) -> TelemetrySubscription {
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        let id = Uuid::new_v4();
        self.streams
            .lock()
            .expect("hub lock poisoned")
            .entry(stream_id.to_string())
            .or_default()
            .push(StreamSink { id, tx });
        TelemetrySubscription {
            receiver: rx,
            _guard: SinkGuard {
                hub: self.clone(),
                stream_id: stream_id.to_string(),
                sink_id: id,
            },
        }
    }

    /// Broadcast a frame to every sink registered for `stream_id`.
    /// Returns the number of sinks the frame was handed to.
    pub fn publish(&self, stream_id: &str, payload: &[u8]) -> usize {
        let frame = TelemetryFrame {
            timestamp_ms: Timestamp::now().as_millis(),
            payload: payload.to_vec(),
        };
        let mut streams = self.streams.lock().expect("hub lock poisoned");
        let sinks = match streams.get_mut(stream_id) {
            Some(sinks) => sinks,
            None => return 0,
        };
        let mut delivered = 0;
        sinks.retain(|sink| match sink.tx.try_send(frame.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            // Slow consumer: the frame is dropped, the sink survives.
            Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Closed(_)) => false,
        });
        if sinks.is_empty() {
            streams.remove(stream_id);
        }
        delivered
    }

    pub fn subscriber_count(&self, stream_id: &str) -> usize {
        self.streams
            .lock()
            .expect("hub lock poisoned")
            .get(stream_id)
            .map(Vec::len)
            .unwrap_or(0)
    }

    fn remove(&self, stream_id: &str, sink_id: Uuid) {
        let mut streams = self.streams.lock().expect("hub lock poisoned");
        if let Some(sinks) = streams.get_mut(stream_id) {
            sinks.retain(|sink| sink.id != sink_id);
            if sinks.is_empty() {
                streams.remove(stream_id);
            }
        }
    }
}

/// A live telemetry subscription; dropping it deregisters the sink.
#[derive(Debug)]
pub struct TelemetrySubscription {
    receiver: mpsc::Receiver<TelemetryFrame>,
    _guard: SinkGuard,
}

impl TelemetrySubscription {
    pub async fn next(&mut self) -> Option<TelemetryFrame> {
        self.receiver.recv().await
    }
}

#[derive(Debug)]
struct SinkGuard {
    hub: TelemetryHub,
    stream_id: String,
    sink_id: Uuid,
}

impl Drop for SinkGuard {
    fn drop(&mut self) {
        self.hub.remove(&self.stream_id, self.sink_id);
    }
}
