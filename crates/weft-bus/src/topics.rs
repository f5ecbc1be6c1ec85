//! Topic registry: subscriber sinks and per-topic sequence counters.
//!
//! Sequence counters are created lazily on first publish and strictly
//! increase per exact topic. Counter increment and sink delivery happen
//! under one lock, so any single subscriber observes a topic's envelopes
//! in publication order; the writes themselves are non-blocking
//! (`try_send`), so the lock is never held across a wait.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use weft_core::scope::pattern_matches;
use weft_wire::proto::EventEnvelope;

#[derive(Debug)]
struct TopicSink {
    id: Uuid,
    topic_filter: String,
    tx: mpsc::Sender<EventEnvelope>,
}

#[derive(Default, Debug)]
struct BusState {
    sinks: Vec<TopicSink>,
    counters: HashMap<String, u64>,
}

/// Shared pub/sub state of one event bus instance.
#[derive(Clone, Default, Debug)]
pub struct TopicRegistry {
    state: Arc<Mutex<BusState>>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink under `topic_filter`. The returned subscription owns
    /// the receiving end and removes the sink when dropped.
    pub fn subscribe(&self, topic_filter: &str, queue_depth: usize) -> EventSubscription {
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        let id = Uuid::new_v4();
        self.state
            .lock()
            .expect("bus lock poisoned")
            .sinks
            .push(TopicSink {
                id,
                topic_filter: topic_filter.to_string(),
                tx,
            });
        EventSubscription {
            receiver: rx,
            _guard: SinkGuard {
                registry: self.clone(),
                sink_id: id,
            },
        }
    }

    /// Assign the next sequence number for `topic` and deliver the envelope
    /// to every subscriber whose filter matches. Returns the sequence and
    /// the number of sinks reached. Closed sinks are dropped silently; a
    /// full sink misses this envelope but stays subscribed.
    pub fn publish(&self, topic: &str, payload: &[u8]) -> (u64, usize) {
        let mut state = self.state.lock().expect("bus lock poisoned");
        let sequence_id = {
            let counter = state.counters.entry(topic.to_string()).or_insert(0);
            *counter += 1;
            *counter
        };
        let envelope = EventEnvelope {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            sequence_id,
        };

        let mut delivered = 0;
        state.sinks.retain(|sink| {
            if !pattern_matches(&sink.topic_filter, topic) {
                return true;
            }
            match sink.tx.try_send(envelope.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => true,
                Err(TrySendError::Closed(_)) => false,
            }
        });
        (sequence_id, delivered)
    }

    /// Current sequence counter for a topic, if one exists yet.
    pub fn sequence(&self, topic: &str) -> Option<u64> {
        self.state
            .lock()
            .expect("bus lock poisoned")
            .counters
            .get(topic)
            .copied()
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().expect("bus lock poisoned").sinks.len()
    }

    fn remove(&self, sink_id: Uuid) {
        self.state
            .lock()
            .expect("bus lock poisoned")
            .sinks
            .retain(|sink| sink.id != sink_id);
    }
}

/// A live event subscription; dropping it deregisters the sink.
#[derive(Debug)]
pub struct EventSubscription {
    receiver: mpsc::Receiver<EventEnvelope>,
    _guard: SinkGuard,
}

impl EventSubscription {
    pub async fn next(&mut self) -> Option<EventEnvelope> {
        self.receiver.recv().await
    }
}

#[derive(Debug)]
struct SinkGuard {
    registry: TopicRegistry,
    sink_id: Uuid,
}

impl Drop for SinkGuard {
    fn drop(&mut self) {
        self.registry.remove(self.sink_id);
    }
}
