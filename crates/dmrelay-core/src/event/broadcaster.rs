//! Live viewer registry with per-viewer mailboxes and heartbeats.
//!
//! Each subscribed viewer gets a bounded `mpsc` mailbox keyed by a
//! connection-scoped `ViewerId`. Publishing fans an event out to every
//! mailbox; a viewer whose mailbox is closed or full is deregistered without
//! affecting delivery to the others. Every viewer also has its own heartbeat
//! task that pushes `Ping` on a fixed interval and deregisters the viewer on
//! failure.
//!
//! Dropping a [`Subscription`] deregisters the viewer and aborts its
//! heartbeat, so release happens on every exit path of the connection task.

use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use dashmap::DashMap;
use dmrelay_types::event::LiveEvent;
use futures_util::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};
use uuid::Uuid;

/// Default interval between heartbeats on a viewer connection.
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(30);

/// Default mailbox depth per viewer.
pub const DEFAULT_VIEWER_BUFFER: usize = 64;

/// Connection-scoped viewer key.
pub type ViewerId = Uuid;

struct Viewer {
    sender: mpsc::Sender<LiveEvent>,
    /// Set right after registration; `None` only while `subscribe` runs.
    heartbeat: Option<JoinHandle<()>>,
}

struct Registry {
    viewers: DashMap<ViewerId, Viewer>,
}

impl Registry {
    fn remove(&self, id: &ViewerId) -> bool {
        match self.viewers.remove(id) {
            Some((_, viewer)) => {
                if let Some(heartbeat) = viewer.heartbeat {
                    heartbeat.abort();
                }
                debug!(viewer_id = %id, "viewer deregistered");
                true
            }
            None => false,
        }
    }
}

/// Fan-out of conversation events to connected dashboard viewers.
///
/// Cloning shares the same registry.
#[derive(Clone)]
pub struct EventBroadcaster {
    registry: Arc<Registry>,
    heartbeat: Duration,
    buffer: usize,
}

impl EventBroadcaster {
    /// Create a broadcaster. A zero interval or buffer is raised to the
    /// smallest usable value.
    pub fn new(heartbeat: Duration, buffer: usize) -> Self {
        Self {
            registry: Arc::new(Registry {
                viewers: DashMap::new(),
            }),
            heartbeat: heartbeat.max(Duration::from_millis(1)),
            buffer: buffer.max(1),
        }
    }

    /// Register a new viewer.
    ///
    /// The viewer's first event is always `Connected`, sent to it alone.
    /// Must be called from within a Tokio runtime (spawns the heartbeat).
    pub fn subscribe(&self) -> Subscription {
        let id = Uuid::now_v7();
        let (sender, receiver) = mpsc::channel(self.buffer);

        // Capacity is at least 1, so the greeting always fits.
        let _ = sender.try_send(LiveEvent::Connected);

        // Register before the heartbeat starts so a failing first tick
        // always finds the viewer to remove.
        self.registry.viewers.insert(
            id,
            Viewer {
                sender: sender.clone(),
                heartbeat: None,
            },
        );
        let heartbeat = spawn_heartbeat(
            id,
            sender,
            Arc::downgrade(&self.registry),
            self.heartbeat,
        );
        match self.registry.viewers.get_mut(&id) {
            Some(mut viewer) => viewer.heartbeat = Some(heartbeat),
            None => heartbeat.abort(),
        }
        debug!(viewer_id = %id, "viewer subscribed");

        Subscription {
            id,
            receiver,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver an event to every registered viewer.
    ///
    /// Returns the number of viewers that accepted it. Viewers that fail are
    /// deregistered after the fan-out completes.
    pub fn publish(&self, event: LiveEvent) -> usize {
        let mut delivered = 0;
        let mut failed = Vec::new();

        for entry in self.registry.viewers.iter() {
            match entry.sender.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(err) => {
                    let reason = match err {
                        mpsc::error::TrySendError::Full(_) => "mailbox full",
                        mpsc::error::TrySendError::Closed(_) => "connection gone",
                    };
                    warn!(viewer_id = %entry.key(), reason, event = event.name(), "viewer delivery failed");
                    failed.push(*entry.key());
                }
            }
        }

        for id in &failed {
            self.registry.remove(id);
        }

        debug!(event = event.name(), delivered, dropped = failed.len(), "event published");
        delivered
    }

    /// Explicitly remove a viewer. Returns `true` if it was registered.
    pub fn unsubscribe(&self, id: &ViewerId) -> bool {
        self.registry.remove(id)
    }

    /// Whether a viewer is currently registered.
    pub fn is_subscribed(&self, id: &ViewerId) -> bool {
        self.registry.viewers.contains_key(id)
    }

    pub fn viewer_count(&self) -> usize {
        self.registry.viewers.len()
    }

    /// Deregister every viewer, ending their streams.
    pub fn shutdown(&self) {
        let ids: Vec<ViewerId> = self.registry.viewers.iter().map(|e| *e.key()).collect();
        for id in &ids {
            self.registry.remove(id);
        }
        debug!(count = ids.len(), "broadcaster shut down");
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_HEARTBEAT, DEFAULT_VIEWER_BUFFER)
    }
}

impl std::fmt::Debug for EventBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBroadcaster")
            .field("viewers", &self.registry.viewers.len())
            .field("heartbeat", &self.heartbeat)
            .finish()
    }
}

fn spawn_heartbeat(
    id: ViewerId,
    sender: mpsc::Sender<LiveEvent>,
    registry: Weak<Registry>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if sender.try_send(LiveEvent::Ping).is_err() {
                warn!(viewer_id = %id, "heartbeat failed");
                if let Some(registry) = registry.upgrade() {
                    registry.remove(&id);
                }
                break;
            }
        }
    })
}

/// A viewer's end of the push channel.
///
/// Yields events until the viewer is deregistered. Dropping it deregisters
/// the viewer.
pub struct Subscription {
    id: ViewerId,
    receiver: mpsc::Receiver<LiveEvent>,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn id(&self) -> ViewerId {
        self.id
    }

    /// Next event, or `None` once the viewer has been deregistered and the
    /// mailbox is drained.
    pub async fn recv(&mut self) -> Option<LiveEvent> {
        self.receiver.recv().await
    }
}

impl Stream for Subscription {
    type Item = LiveEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<LiveEvent>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dmrelay_types::conversation::MessageRecord;
    use dmrelay_types::event::NewMessagePayload;
    use dmrelay_types::timestamp::Timestamp;

    fn new_message(text: &str) -> LiveEvent {
        let msg = MessageRecord::new("42", text, Timestamp::from_millis(1).unwrap(), true);
        LiveEvent::NewMessage(NewMessagePayload::from_message("alice", &msg))
    }

    fn quiet(buffer: usize) -> EventBroadcaster {
        EventBroadcaster::new(Duration::from_secs(3600), buffer)
    }

    #[tokio::test]
    async fn subscribe_sends_connected_to_new_viewer_only() {
        let hub = quiet(8);
        let mut first = hub.subscribe();
        assert_eq!(first.recv().await, Some(LiveEvent::Connected));

        let mut second = hub.subscribe();
        assert_eq!(second.recv().await, Some(LiveEvent::Connected));
        assert!(first.receiver.try_recv().is_err(), "first viewer must not see second greeting");
        assert_eq!(hub.viewer_count(), 2);
    }

    #[tokio::test]
    async fn publish_reaches_every_viewer() {
        let hub = quiet(8);
        let mut viewers: Vec<Subscription> = (0..3).map(|_| hub.subscribe()).collect();
        for v in &mut viewers {
            assert_eq!(v.recv().await, Some(LiveEvent::Connected));
        }

        assert_eq!(hub.publish(new_message("hi")), 3);
        for v in &mut viewers {
            assert_eq!(v.recv().await, Some(new_message("hi")));
        }
    }

    #[tokio::test]
    async fn failing_viewer_is_removed_and_others_still_receive() {
        let hub = quiet(1);
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();
        // `stuck` never drains its greeting, so its mailbox stays full.
        let stuck = hub.subscribe();
        a.recv().await.unwrap();
        b.recv().await.unwrap();

        assert_eq!(hub.publish(new_message("hi")), 2);
        assert!(!hub.is_subscribed(&stuck.id()));
        assert!(hub.is_subscribed(&a.id()));
        assert_eq!(hub.viewer_count(), 2);
        assert_eq!(a.recv().await, Some(new_message("hi")));
        assert_eq!(b.recv().await, Some(new_message("hi")));
    }

    #[tokio::test]
    async fn unsubscribe_removes_viewer() {
        let hub = quiet(8);
        let sub = hub.subscribe();
        assert!(hub.unsubscribe(&sub.id()));
        assert!(!hub.unsubscribe(&sub.id()));
        assert_eq!(hub.publish(new_message("x")), 0);
    }

    #[tokio::test]
    async fn dropping_subscription_deregisters() {
        let hub = quiet(8);
        let sub = hub.subscribe();
        let id = sub.id();
        drop(sub);
        assert!(!hub.is_subscribed(&id));
        assert_eq!(hub.viewer_count(), 0);
    }

    #[tokio::test]
    async fn stream_ends_after_deregistration() {
        use futures_util::StreamExt;

        let hub = quiet(8);
        let mut sub = hub.subscribe();
        hub.unsubscribe(&sub.id());
        assert_eq!(sub.next().await, Some(LiveEvent::Connected));
        assert_eq!(sub.next().await, None);
    }

    #[tokio::test]
    async fn heartbeat_emits_ping() {
        let hub = EventBroadcaster::new(Duration::from_millis(20), 8);
        let mut sub = hub.subscribe();
        assert_eq!(sub.recv().await, Some(LiveEvent::Connected));

        let next = tokio::time::timeout(Duration::from_secs(2), sub.recv())
            .await
            .unwrap();
        assert_eq!(next, Some(LiveEvent::Ping));
    }

    #[tokio::test]
    async fn heartbeat_failure_deregisters() {
        let hub = EventBroadcaster::new(Duration::from_millis(20), 1);
        let stuck = hub.subscribe();
        let id = stuck.id();

        for _ in 0..100 {
            if !hub.is_subscribed(&id) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!hub.is_subscribed(&id));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn stalled_viewers_are_deregistered_by_fast_heartbeat() {
        let hub = EventBroadcaster::new(Duration::from_millis(1), 1);
        // Never drained: the greeting fills each mailbox, so the first
        // heartbeat tick must fail and deregister.
        let subs: Vec<Subscription> = (0..50).map(|_| hub.subscribe()).collect();

        for _ in 0..200 {
            if hub.viewer_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(hub.viewer_count(), 0);
        assert!(subs.iter().all(|s| !hub.is_subscribed(&s.id())));
    }

    #[tokio::test]
    async fn shutdown_clears_registry() {
        let hub = quiet(8);
        let _a = hub.subscribe();
        let _b = hub.subscribe();
        hub.shutdown();
        assert_eq!(hub.viewer_count(), 0);
    }

    #[tokio::test]
    async fn clone_shares_registry() {
        let hub = quiet(8);
        let hub2 = hub.clone();
        let mut sub = hub.subscribe();
        sub.recv().await.unwrap();

        assert_eq!(hub2.publish(LiveEvent::Ping), 1);
        assert_eq!(sub.recv().await, Some(LiveEvent::Ping));
    }
}
