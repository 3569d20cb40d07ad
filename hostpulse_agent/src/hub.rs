//! Broadcast hub: the subscriber registry, partitioned by group, and the
//! fan-out path for snapshot envelopes. A failed send evicts only the
//! offending subscriber; delivery to the rest is never interrupted.

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::snapshot::Envelope;

pub const DEFAULT_GROUP: &str = "default";

pub type SubscriberId = Uuid;

/// Per-subscriber transport handle. The mpsc channel preserves envelope
/// order for that subscriber; the socket forward task drains it.
struct SubscriberHandle {
    sender: mpsc::UnboundedSender<Envelope>,
    group: String,
}

#[derive(Default)]
pub struct BroadcastHub {
    subscribers: RwLock<HashMap<SubscriberId, SubscriberHandle>>,
    groups: RwLock<HashMap<String, HashSet<SubscriberId>>>,
}

#[derive(Debug, Error)]
pub enum HubError {
    #[error("subscriber not found")]
    SubscriberNotFound,

    #[error("failed to send to subscriber")]
    SendFailed,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscriber to `group` and returns its id. No historical
    /// backlog is sent; the subscriber sees envelopes from the next
    /// broadcast on.
    pub async fn register(&self, sender: mpsc::UnboundedSender<Envelope>, group: &str) -> SubscriberId {
        let id = Uuid::new_v4();
        let handle = SubscriberHandle {
            sender,
            group: group.to_string(),
        };

        self.subscribers.write().await.insert(id, handle);
        self.groups
            .write()
            .await
            .entry(group.to_string())
            .or_default()
            .insert(id);

        tracing::info!(subscriber_id = %id, group, "subscriber registered");
        id
    }

    /// Removes a subscriber. Safe to call for ids that are already gone.
    pub async fn unregister(&self, id: SubscriberId) {
        let handle = self.subscribers.write().await.remove(&id);
        let Some(handle) = handle else { return };

        let mut groups = self.groups.write().await;
        if let Some(members) = groups.get_mut(&handle.group) {
            members.remove(&id);
            if members.is_empty() {
                groups.remove(&handle.group);
            }
        }

        tracing::info!(subscriber_id = %id, group = %handle.group, "subscriber removed");
    }

    /// Delivers `envelope` to every current member of `group`. Fire and
    /// forget: failures are contained here and the offending subscribers
    /// are evicted, nothing propagates to the caller.
    pub async fn broadcast(&self, envelope: &Envelope, group: &str) {
        // Snapshot the member list so concurrent register/unregister cannot
        // invalidate the iteration.
        let members: Vec<SubscriberId> = {
            let groups = self.groups.read().await;
            match groups.get(group) {
                Some(members) => members.iter().copied().collect(),
                None => return,
            }
        };

        let mut dead = Vec::new();
        {
            let subscribers = self.subscribers.read().await;
            for id in members {
                if let Some(handle) = subscribers.get(&id) {
                    if handle.sender.send(envelope.clone()).is_err() {
                        dead.push(id);
                    }
                }
            }
        }

        for id in dead {
            tracing::debug!(subscriber_id = %id, group, "evicting subscriber after failed send");
            self.unregister(id).await;
        }
    }

    /// Delivers `envelope` to every group. Used by the sampler, which does
    /// not care how subscribers are partitioned.
    pub async fn broadcast_all(&self, envelope: &Envelope) {
        let group_names: Vec<String> = self.groups.read().await.keys().cloned().collect();
        for group in group_names {
            self.broadcast(envelope, &group).await;
        }
    }

    /// Immediate reply to a single subscriber (heartbeat responses).
    pub async fn send_to(&self, id: SubscriberId, envelope: Envelope) -> Result<(), HubError> {
        let subscribers = self.subscribers.read().await;
        let handle = subscribers.get(&id).ok_or(HubError::SubscriberNotFound)?;
        handle.sender.send(envelope).map_err(|_| HubError::SendFailed)
    }

    pub async fn subscriber_count(&self, group: &str) -> usize {
        self.groups
            .read()
            .await
            .get(group)
            .map(|members| members.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{build_snapshot, Envelope};
    use crate::provider::{RawCpu, RawMemory};

    fn stats_envelope() -> Envelope {
        Envelope::stats(build_snapshot(
            RawCpu {
                overall: 5.0,
                temperature: None,
                cores: Vec::new(),
            },
            RawMemory {
                total: 100,
                used: 50,
                available: 50,
                cache: 0,
                buffers: 0,
            },
        ))
    }

    #[tokio::test]
    async fn register_and_unregister() {
        let hub = BroadcastHub::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        let id = hub.register(tx, DEFAULT_GROUP).await;
        assert_eq!(hub.subscriber_count(DEFAULT_GROUP).await, 1);

        hub.unregister(id).await;
        assert_eq!(hub.subscriber_count(DEFAULT_GROUP).await, 0);

        // Repeated unregister is a no-op.
        hub.unregister(id).await;
    }

    #[tokio::test]
    async fn broadcast_targets_only_the_group() {
        let hub = BroadcastHub::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();

        hub.register(tx_a, "dashboards").await;
        hub.register(tx_b, "probes").await;

        hub.broadcast(&stats_envelope(), "dashboards").await;

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_subscriber_is_evicted_without_interrupting_others() {
        let hub = BroadcastHub::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();
        let (tx_c, mut rx_c) = mpsc::unbounded_channel();

        hub.register(tx_a, DEFAULT_GROUP).await;
        hub.register(tx_b, DEFAULT_GROUP).await;
        hub.register(tx_c, DEFAULT_GROUP).await;

        // B's transport is already closed when the broadcast fires.
        drop(rx_b);

        hub.broadcast(&stats_envelope(), DEFAULT_GROUP).await;

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_c.try_recv().is_ok());
        assert_eq!(hub.subscriber_count(DEFAULT_GROUP).await, 2);
    }

    #[tokio::test]
    async fn broadcast_all_reaches_every_group() {
        let hub = BroadcastHub::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();

        hub.register(tx_a, DEFAULT_GROUP).await;
        hub.register(tx_b, "probes").await;

        hub.broadcast_all(&stats_envelope()).await;

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
    }

    #[tokio::test]
    async fn envelopes_arrive_in_broadcast_order() {
        let hub = BroadcastHub::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.register(tx, DEFAULT_GROUP).await;

        let first = stats_envelope();
        let second = Envelope::heartbeat();
        hub.broadcast(&first, DEFAULT_GROUP).await;
        hub.broadcast(&second, DEFAULT_GROUP).await;

        assert!(matches!(rx.try_recv().unwrap(), Envelope::Stats { .. }));
        assert!(matches!(rx.try_recv().unwrap(), Envelope::Heartbeat { .. }));
    }

    #[tokio::test]
    async fn send_to_unknown_subscriber_fails() {
        let hub = BroadcastHub::new();
        let result = hub.send_to(Uuid::new_v4(), Envelope::heartbeat()).await;
        assert!(matches!(result, Err(HubError::SubscriberNotFound)));
    }
}
