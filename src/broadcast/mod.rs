// SPDX-License-Identifier: MIT
//! Per-session event fan-out.
//!
//! The hub keeps a session → {endpoint → sender} registry. The transport
//! collaborator subscribes on connect, drains the returned receiver into
//! its socket, and unsubscribes on disconnect. Publishing delivers to a
//! snapshot of the membership — never the live map — and a failed
//! delivery removes only that endpoint. There is no replay: a viewer
//! joining mid-build catches up via the synchronous status snapshot.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::build::events::BuildEvent;

pub struct BroadcastHub {
    /// session id → endpoint id → event sender.
    subscribers: Mutex<HashMap<String, HashMap<String, mpsc::UnboundedSender<BuildEvent>>>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    /// Register an endpoint for a session's events. Returns the receiver
    /// the transport drains; dropping it is equivalent to disconnecting.
    /// Subscribing the same endpoint id again replaces its channel.
    pub fn subscribe(
        &self,
        endpoint_id: &str,
        session_id: &str,
    ) -> mpsc::UnboundedReceiver<BuildEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscribers = self.subscribers.lock().expect("subscriber map poisoned");
        subscribers
            .entry(session_id.to_string())
            .or_default()
            .insert(endpoint_id.to_string(), tx);
        debug!(endpoint_id, session_id, "subscriber added");
        rx
    }

    pub fn unsubscribe(&self, endpoint_id: &str, session_id: &str) {
        let mut subscribers = self.subscribers.lock().expect("subscriber map poisoned");
        if let Some(session) = subscribers.get_mut(session_id) {
            session.remove(endpoint_id);
            if session.is_empty() {
                subscribers.remove(session_id);
            }
        }
        debug!(endpoint_id, session_id, "subscriber removed");
    }

    /// Deliver an event to every current subscriber of its session.
    ///
    /// Iterates a snapshot copy so concurrent subscribe/unsubscribe can't
    /// race the delivery loop. A dead endpoint (receiver dropped) is
    /// logged and evicted; the remaining endpoints still get the event.
    pub fn publish(&self, event: BuildEvent) {
        let targets: Vec<(String, mpsc::UnboundedSender<BuildEvent>)> = {
            let subscribers = self.subscribers.lock().expect("subscriber map poisoned");
            match subscribers.get(&event.session_id) {
                Some(session) => session
                    .iter()
                    .map(|(id, tx)| (id.clone(), tx.clone()))
                    .collect(),
                None => return,
            }
        };

        let mut dead: Vec<String> = Vec::new();
        for (endpoint_id, tx) in &targets {
            if tx.send(event.clone()).is_err() {
                warn!(endpoint_id, session_id = %event.session_id, "subscriber unreachable — removing");
                dead.push(endpoint_id.clone());
            }
        }

        if !dead.is_empty() {
            let mut subscribers = self.subscribers.lock().expect("subscriber map poisoned");
            if let Some(session) = subscribers.get_mut(&event.session_id) {
                for endpoint_id in dead {
                    session.remove(&endpoint_id);
                }
                if session.is_empty() {
                    subscribers.remove(&event.session_id);
                }
            }
        }
    }

    pub fn subscriber_count(&self, session_id: &str) -> usize {
        self.subscribers
            .lock()
            .expect("subscriber map poisoned")
            .get(session_id)
            .map(|s| s.len())
            .unwrap_or(0)
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

/// The dedicated broadcaster loop: drains the build event channel into
/// the hub so producers (queue, runners) never block on subscribers.
pub fn spawn_broadcaster(
    hub: Arc<BroadcastHub>,
    mut rx: mpsc::UnboundedReceiver<BuildEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            hub.publish(event);
        }
    })
}
