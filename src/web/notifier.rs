//! Push-based change notification for live clients.
//!
//! Events are liveness hints: delivery is at-most-once and best-effort with
//! no ordering across subscribers. Clients re-fetch on receipt rather than
//! trusting the payload.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::mpsc;

/// Default per-subscriber queue depth.
pub const DEFAULT_BUFFER: usize = 32;

/// The single event shape pushed to clients: `{"event":"update"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum ChangeEvent {
    Update,
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("subscriber is gone")]
    Closed,
    #[error("subscriber queue is full")]
    Full,
}

/// One live connection. `try_deliver` must not block.
pub trait EventSink: Send + Sync {
    fn try_deliver(&self, payload: &str) -> Result<(), DeliveryError>;
}

/// Sink backed by a bounded channel; the transport drains the receiver.
pub struct ChannelSink {
    tx: mpsc::Sender<String>,
}

impl EventSink for ChannelSink {
    fn try_deliver(&self, payload: &str) -> Result<(), DeliveryError> {
        self.tx.try_send(payload.to_owned()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberHandle(u64);

/// A registered channel subscription. Dropping `events` makes the next
/// broadcast remove the handle.
pub struct Subscription {
    pub handle: SubscriberHandle,
    pub events: mpsc::Receiver<String>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub dropped: usize,
}

pub struct ChangeNotifier {
    subscribers: Mutex<HashMap<SubscriberHandle, Arc<dyn EventSink>>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl ChangeNotifier {
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    /// Registers a channel-backed subscriber.
    pub fn subscribe(&self) -> Subscription {
        let (tx, events) = mpsc::channel(self.buffer);
        let handle = self.subscribe_sink(Arc::new(ChannelSink { tx }));
        Subscription { handle, events }
    }

    pub fn subscribe_sink(&self, sink: Arc<dyn EventSink>) -> SubscriberHandle {
        let handle = SubscriberHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        let count = {
            let mut subscribers = self.lock();
            subscribers.insert(handle, sink);
            subscribers.len()
        };
        tracing::info!(subscriber = handle.0, count, "subscriber connected");
        handle
    }

    /// Idempotent.
    pub fn unsubscribe(&self, handle: SubscriberHandle) {
        if self.lock().remove(&handle).is_some() {
            tracing::info!(subscriber = handle.0, "subscriber disconnected");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// Serializes `event` once and offers it to every subscriber. Failed
    /// subscribers are removed; nothing is reported back to the caller's
    /// write path beyond the counts.
    pub fn broadcast(&self, event: &ChangeEvent) -> DeliveryReport {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!("failed to serialize change event: {}", e);
                return DeliveryReport::default();
            }
        };

        // Deliver from a snapshot so no send happens under the registry lock.
        let snapshot: Vec<(SubscriberHandle, Arc<dyn EventSink>)> = self
            .lock()
            .iter()
            .map(|(handle, sink)| (*handle, sink.clone()))
            .collect();

        let mut report = DeliveryReport::default();
        let mut failed = Vec::new();
        for (handle, sink) in snapshot {
            match sink.try_deliver(&payload) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::debug!(subscriber = handle.0, "dropping subscriber: {}", e);
                    failed.push(handle);
                }
            }
        }

        if !failed.is_empty() {
            let mut subscribers = self.lock();
            for handle in &failed {
                subscribers.remove(handle);
            }
            report.dropped = failed.len();
        }
        tracing::debug!(delivered = report.delivered, dropped = report.dropped, "broadcast");
        report
    }

    /// Drops every subscriber; channel receivers then see end-of-stream.
    pub fn close_all(&self) {
        let closed = std::mem::take(&mut *self.lock()).len();
        tracing::info!(closed, "closed all subscribers");
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SubscriberHandle, Arc<dyn EventSink>>> {
        self.subscribers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER)
    }
}
