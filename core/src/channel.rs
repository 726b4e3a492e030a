//! The channel capability the relay client depends on.
//!
//! A [`Channel`] is a long-lived, bidirectional, event-based connection.
//! Outbound traffic goes through [`Channel::emit`] (or the generic
//! [`Channel::send`], which uses the default `message` event). Inbound
//! traffic is consumed through [`Subscription`]s, one per event name.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::debug;

use crate::error::Result;
use crate::types::MESSAGE_EVENT;

pub trait Channel {
    /// Queues `data` on the named event. Returns once the payload is handed
    /// to the transport; delivery is not awaited.
    fn emit(&mut self, event: &str, data: Value) -> Result<()>;

    /// Generic send primitive: the transport's default event.
    fn send(&mut self, data: Value) -> Result<()> {
        self.emit(MESSAGE_EVENT, data)
    }

    /// Starts receiving payloads of the named event.
    fn subscribe(&mut self, event: &str) -> Subscription;

    fn is_connected(&self) -> bool;
}

/// Receiving end for one event name. Ends once the channel is gone.
#[derive(Debug)]
pub struct Subscription {
    event: String,
    rx: mpsc::UnboundedReceiver<Value>,
}

impl Subscription {
    pub fn event(&self) -> &str {
        &self.event
    }

    pub async fn recv(&mut self) -> Option<Value> {
        self.rx.recv().await
    }

    /// `None` when nothing is pending right now or the channel is gone.
    pub fn try_recv(&mut self) -> Option<Value> {
        match self.rx.try_recv() {
            Ok(value) => Some(value),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// For use from plain threads (UI loops); panics inside a runtime.
    pub fn blocking_recv(&mut self) -> Option<Value> {
        self.rx.blocking_recv()
    }
}

/// Routes inbound payloads to subscribers by event name. Shared between a
/// channel handle and its reader task.
#[derive(Debug, Clone, Default)]
pub struct Subscribers {
    inner: Arc<Mutex<HashMap<String, Vec<mpsc::UnboundedSender<Value>>>>>,
}

impl Subscribers {
    pub fn subscribe(&self, event: &str) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event.to_string())
            .or_default()
            .push(tx);
        Subscription {
            event: event.to_string(),
            rx,
        }
    }

    /// Hands `data` to every live subscriber of `event`. Returns how many
    /// subscribers got it; zero means the payload was dropped.
    pub fn dispatch(&self, event: &str, data: Value) -> usize {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(senders) = map.get_mut(event) else {
            debug!(event, "no subscriber for event; dropping payload");
            return 0;
        };

        senders.retain(|tx| !tx.is_closed());
        for tx in senders.iter() {
            let _ = tx.send(data.clone());
        }
        senders.len()
    }

    /// Drops every sender so all subscriptions end.
    pub fn close(&self) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
