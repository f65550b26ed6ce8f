//! Cross-run event broker
//!
//! Listeners register a callback under an application-chosen event id; any
//! run may `send` to that id. A sender that wants answers opens an await
//! correlation id, delivers the payload tagged with it, and collects the
//! responses that receivers `respond` with.
//!
//! All broker state sits behind short synchronous `parking_lot` sections.
//! Collection waits on a `watch` channel per await id, never on a lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;

use crate::constants::id_prefixes;

/// Callback registered for an event id
pub type ListenerCallback = Arc<dyn Fn(EventEnvelope) + Send + Sync>;

/// A delivered event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub data: Value,
    /// Correlation id the receiver should respond to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub await_id: Option<String>,
}

impl EventEnvelope {
    pub fn new(data: Value) -> Self {
        Self { data, await_id: None }
    }

    pub fn correlated(data: Value, await_id: impl Into<String>) -> Self {
        Self {
            data,
            await_id: Some(await_id.into()),
        }
    }
}

/// Result of a deadline-bounded collection
#[derive(Debug, Clone, PartialEq)]
pub struct AwaitOutcome {
    /// Responses in arrival order
    pub responses: Vec<Value>,
    pub expected: usize,
    pub timed_out: bool,
}

impl AwaitOutcome {
    pub fn is_complete(&self) -> bool {
        self.responses.len() >= self.expected
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct AwaitProgress {
    received: usize,
    closed: bool,
}

struct AwaitSlot {
    responses: Mutex<Vec<Value>>,
    progress: watch::Sender<AwaitProgress>,
}

impl AwaitSlot {
    fn new() -> Self {
        let (progress, _) = watch::channel(AwaitProgress::default());
        Self {
            responses: Mutex::new(Vec::new()),
            progress,
        }
    }

    fn push(&self, value: Value) {
        self.responses.lock().push(value);
        self.progress.send_modify(|p| p.received += 1);
    }

    fn close(&self) {
        self.progress.send_modify(|p| p.closed = true);
    }

    fn take(&self) -> Vec<Value> {
        std::mem::take(&mut *self.responses.lock())
    }
}

/// Removes an await id when its collector finishes or is dropped.
struct AwaitGuard<'a> {
    awaits: &'a Mutex<HashMap<String, Arc<AwaitSlot>>>,
    await_id: &'a str,
}

impl Drop for AwaitGuard<'_> {
    fn drop(&mut self) {
        self.awaits.lock().remove(self.await_id);
    }
}

/// Per-session event broker
#[derive(Default)]
pub struct EventBroker {
    listeners: Mutex<HashMap<String, ListenerCallback>>,
    awaits: Mutex<HashMap<String, Arc<AwaitSlot>>>,
}

impl EventBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the callback for an event id; the last registration wins.
    pub fn register_listener(&self, event_id: impl Into<String>, callback: ListenerCallback) {
        let event_id = event_id.into();
        log::debug!("Registering listener for event '{}'", event_id);
        if self.listeners.lock().insert(event_id.clone(), callback).is_some() {
            log::debug!("Replaced existing listener for event '{}'", event_id);
        }
    }

    /// Returns whether a listener was registered
    pub fn unregister_listener(&self, event_id: &str) -> bool {
        self.listeners.lock().remove(event_id).is_some()
    }

    pub fn has_listener(&self, event_id: &str) -> bool {
        self.listeners.lock().contains_key(event_id)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Deliver `payload` to the listener for `event_id`.
    ///
    /// Returns `false` when nobody listens.
    pub fn send(&self, event_id: &str, payload: Value) -> bool {
        self.deliver(event_id, EventEnvelope::new(payload))
    }

    /// Deliver `payload` tagged with `await_id`; the await id is opened
    /// before delivery so no response can be lost.
    pub fn send_with_correlation(&self, event_id: &str, payload: Value, await_id: &str) -> bool {
        self.open_await(await_id);
        self.deliver(event_id, EventEnvelope::correlated(payload, await_id))
    }

    /// Send to several ids and return how many deliveries happened.
    ///
    /// An array payload sent to more than one id is paired positionally:
    /// id *i* receives element *i*, and ids without a (non-null) element
    /// receive nothing. Any other combination broadcasts the whole payload.
    pub fn send_many(&self, event_ids: &[String], payload: &Value, await_id: Option<&str>) -> usize {
        let deliver = |event_id: &str, data: Value| match await_id {
            Some(await_id) => self.send_with_correlation(event_id, data, await_id),
            None => self.send(event_id, data),
        };

        let mut delivered = 0;
        match payload {
            Value::Array(items) if event_ids.len() > 1 => {
                for (event_id, item) in event_ids.iter().zip(items) {
                    if !item.is_null() && deliver(event_id.as_str(), item.clone()) {
                        delivered += 1;
                    }
                }
            }
            _ => {
                for event_id in event_ids {
                    if deliver(event_id.as_str(), payload.clone()) {
                        delivered += 1;
                    }
                }
            }
        }
        delivered
    }

    fn deliver(&self, event_id: &str, envelope: EventEnvelope) -> bool {
        // Clone out of the map so the callback runs without the lock held.
        let callback = self.listeners.lock().get(event_id).cloned();
        match callback {
            Some(callback) => {
                callback(envelope);
                true
            }
            None => {
                log::debug!("No listener for event '{}'", event_id);
                false
            }
        }
    }

    /// Fresh correlation id of the form `await_{owner}_{8 hex chars}`
    pub fn new_await_id(owner: &str) -> String {
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        format!("{}_{}_{}", id_prefixes::AWAIT, owner, &uuid[..8])
    }

    fn open_await(&self, await_id: &str) -> Arc<AwaitSlot> {
        Arc::clone(
            self.awaits
                .lock()
                .entry(await_id.to_string())
                .or_insert_with(|| Arc::new(AwaitSlot::new())),
        )
    }

    /// Drop an await id nobody will collect (e.g. when no send was delivered).
    pub fn discard_await(&self, await_id: &str) {
        if let Some(slot) = self.awaits.lock().remove(await_id) {
            slot.close();
        }
    }

    pub fn is_awaiting(&self, await_id: &str) -> bool {
        self.awaits.lock().contains_key(await_id)
    }

    /// Record a response for `await_id`.
    ///
    /// Returns `false` when nobody is awaiting that id.
    pub fn respond(&self, await_id: &str, value: Value) -> bool {
        let slot = self.awaits.lock().get(await_id).cloned();
        match slot {
            Some(slot) => {
                slot.push(value);
                true
            }
            None => {
                log::warn!("Response for unknown await id '{}'", await_id);
                false
            }
        }
    }

    /// Responses accumulated so far for a pending collection
    pub fn partial_responses(&self, await_id: &str) -> Vec<Value> {
        let slot = self.awaits.lock().get(await_id).cloned();
        slot.map(|s| s.responses.lock().clone()).unwrap_or_default()
    }

    /// Wait until `expected` responses arrived for `await_id` and return
    /// them in arrival order. The await id is forgotten afterwards, also
    /// when this future is dropped.
    pub async fn collect_responses(&self, await_id: &str, expected: usize) -> Vec<Value> {
        self.collect(await_id, expected, None).await.responses
    }

    /// Like `collect_responses` but gives up after `timeout` and returns
    /// whatever arrived until then.
    pub async fn collect_responses_with_timeout(
        &self,
        await_id: &str,
        expected: usize,
        timeout: Duration,
    ) -> AwaitOutcome {
        self.collect(await_id, expected, Some(timeout)).await
    }

    async fn collect(&self, await_id: &str, expected: usize, timeout: Option<Duration>) -> AwaitOutcome {
        let slot = self.open_await(await_id);
        let _guard = AwaitGuard {
            awaits: &self.awaits,
            await_id,
        };
        let mut progress = slot.progress.subscribe();
        let ready = progress.wait_for(|p| p.closed || p.received >= expected);

        let timed_out = match timeout {
            Some(timeout) => tokio::time::timeout(timeout, ready).await.is_err(),
            None => {
                // The slot keeps its sender alive, so this cannot fail.
                let _ = ready.await;
                false
            }
        };

        let responses = slot.take();
        if timed_out {
            log::warn!(
                "Await '{}' timed out with {}/{} responses",
                await_id,
                responses.len(),
                expected
            );
        }
        AwaitOutcome {
            responses,
            expected,
            timed_out,
        }
    }

    /// Clear every listener and release all pending collections.
    pub fn shutdown(&self) {
        let listeners = std::mem::take(&mut *self.listeners.lock());
        let awaits = std::mem::take(&mut *self.awaits.lock());
        log::debug!(
            "Broker shutdown: {} listener(s), {} pending await(s)",
            listeners.len(),
            awaits.len()
        );
        for slot in awaits.values() {
            slot.close();
        }
    }
}
