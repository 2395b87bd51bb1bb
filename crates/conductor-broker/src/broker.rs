use crate::queue::TaskQueue;
use chrono::{DateTime, Utc};
use conductor_core::task::PRIORITY_RANGE;
use conductor_core::{ConductorError, ConductorResult, Message, Task};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A live subscription to one channel.
///
/// Messages published after the subscription was created arrive in publish
/// order; nothing published earlier is replayed. Dropping the subscription
/// (or calling [`Broker::unsubscribe`]) ends delivery.
#[derive(Debug)]
pub struct Subscription {
    id: Uuid,
    channel: String,
    receiver: mpsc::UnboundedReceiver<Message>,
}

impl Subscription {
    /// The subscriber id, needed for [`Broker::unsubscribe`].
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The channel this subscription listens on.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Waits for the next message. `None` once the broker shut down or the
    /// subscription was removed.
    pub async fn recv(&mut self) -> Option<Message> {
        self.receiver.recv().await
    }

    /// Non-blocking variant of [`Subscription::recv`].
    pub fn try_recv(&mut self) -> Option<Message> {
        self.receiver.try_recv().ok()
    }
}

struct SubscriberEntry {
    id: Uuid,
    sender: mpsc::UnboundedSender<Message>,
}

/// Pub/sub channel fan-out plus named priority task queues.
///
/// The only state in the system mutated concurrently by multiple
/// components; every mutating operation on a given queue or channel is
/// serialized through the internal locks, so two concurrent dequeues never
/// return the same task.
pub struct Broker {
    subscribers: RwLock<HashMap<String, Vec<SubscriberEntry>>>,
    queues: Mutex<HashMap<String, TaskQueue>>,
    closed: AtomicBool,
    started_at: DateTime<Utc>,
    messages_published: AtomicU64,
    messages_delivered: AtomicU64,
    tasks_enqueued: AtomicU64,
    tasks_dequeued: AtomicU64,
}

impl Broker {
    /// Creates an open broker with no channels or queues.
    pub fn new() -> Self {
        info!("Message broker initialized");
        Self {
            subscribers: RwLock::new(HashMap::new()),
            queues: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
            started_at: Utc::now(),
            messages_published: AtomicU64::new(0),
            messages_delivered: AtomicU64::new(0),
            tasks_enqueued: AtomicU64::new(0),
            tasks_dequeued: AtomicU64::new(0),
        }
    }

    /// True once [`Broker::shutdown`] ran; all operations fail closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Registers a subscriber on `channel` and returns the receiving end.
    pub fn subscribe(&self, channel: &str) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        self.subscribers
            .write()
            .entry(channel.to_string())
            .or_default()
            .push(SubscriberEntry { id, sender });
        debug!(channel, subscriber = %id, "Subscribed");
        Subscription {
            id,
            channel: channel.to_string(),
            receiver,
        }
    }

    /// Removes a subscriber from `channel`. Unknown ids are a no-op.
    pub fn unsubscribe(&self, channel: &str, subscriber_id: Uuid) {
        let mut subs = self.subscribers.write();
        if let Some(entries) = subs.get_mut(channel) {
            entries.retain(|entry| entry.id != subscriber_id);
            if entries.is_empty() {
                subs.remove(channel);
            }
        }
        debug!(channel, subscriber = %subscriber_id, "Unsubscribed");
    }

    /// Fans `message` out to every current subscriber of its channel.
    ///
    /// Returns `false` when nothing was delivered — zero subscribers or a
    /// closed broker — which is a normal condition, not a failure.
    pub fn publish(&self, message: Message) -> bool {
        if self.is_closed() {
            warn!(channel = %message.channel, "Publish on closed broker dropped");
            return false;
        }

        self.messages_published.fetch_add(1, Ordering::Relaxed);

        let mut subs = self.subscribers.write();
        let Some(entries) = subs.get_mut(&message.channel) else {
            debug!(channel = %message.channel, "No subscribers for channel");
            return false;
        };

        let mut delivered = 0u64;
        // Prune subscribers whose receiving end is gone.
        entries.retain(|entry| match entry.sender.send(message.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(_) => false,
        });
        if entries.is_empty() {
            subs.remove(&message.channel);
        }

        self.messages_delivered.fetch_add(delivered, Ordering::Relaxed);
        if delivered == 0 {
            debug!(channel = %message.channel, "No subscribers for channel");
        }
        delivered > 0
    }

    /// Inserts a task into the named priority queue.
    ///
    /// Rejects priorities outside 1..=10 with a validation error and fails
    /// closed with a transport error once the broker shut down.
    pub fn enqueue_task(&self, queue_name: &str, task: Task) -> ConductorResult<()> {
        if self.is_closed() {
            return Err(ConductorError::Transport("broker is shut down".into()));
        }
        if !PRIORITY_RANGE.contains(&task.priority) {
            return Err(ConductorError::Validation(format!(
                "priority {} outside valid range 1..=10",
                task.priority
            )));
        }
        debug!(queue = queue_name, task_id = %task.id, priority = task.priority, "Task enqueued");
        self.queues
            .lock()
            .entry(queue_name.to_string())
            .or_default()
            .push(task);
        self.tasks_enqueued.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Atomically removes and returns the highest-priority task, FIFO among
    /// equals. `None` is the normal "no work" signal.
    pub fn dequeue_task(&self, queue_name: &str) -> Option<Task> {
        if self.is_closed() {
            return None;
        }
        let task = self.queues.lock().get_mut(queue_name)?.pop();
        if let Some(ref task) = task {
            self.tasks_dequeued.fetch_add(1, Ordering::Relaxed);
            debug!(queue = queue_name, task_id = %task.id, "Task dequeued");
        }
        task
    }

    /// Number of tasks waiting in the named queue.
    pub fn queue_depth(&self, queue_name: &str) -> usize {
        self.queues
            .lock()
            .get(queue_name)
            .map_or(0, TaskQueue::len)
    }

    /// Point-in-time counters and per-queue depths.
    pub fn statistics(&self) -> BrokerStats {
        let queue_depths = self
            .queues
            .lock()
            .iter()
            .map(|(name, queue)| (name.clone(), queue.len()))
            .collect();
        BrokerStats {
            messages_published: self.messages_published.load(Ordering::Relaxed),
            messages_delivered: self.messages_delivered.load(Ordering::Relaxed),
            tasks_enqueued: self.tasks_enqueued.load(Ordering::Relaxed),
            tasks_dequeued: self.tasks_dequeued.load(Ordering::Relaxed),
            started_at: self.started_at,
            queue_depths,
        }
    }

    /// Closes the broker: drops every subscriber (their `recv` returns
    /// `None`) and makes all further operations fail closed.
    pub fn shutdown(&self) {
        info!("Shutting down message broker");
        self.closed.store(true, Ordering::SeqCst);
        self.subscribers.write().clear();
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

/// Broker counters, folded into the Manager's statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerStats {
    /// Messages accepted by `publish`.
    pub messages_published: u64,
    /// Subscriber deliveries (one message to three subscribers counts 3).
    pub messages_delivered: u64,
    /// Tasks accepted by `enqueue_task`.
    pub tasks_enqueued: u64,
    /// Tasks handed out by `dequeue_task`.
    pub tasks_dequeued: u64,
    /// When the broker was constructed.
    pub started_at: DateTime<Utc>,
    /// Current depth per named queue.
    pub queue_depths: HashMap<String, usize>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use conductor_core::MessageBody;
    use serde_json::json;

    fn status_request(channel: &str) -> Message {
        Message::new("tester", channel, MessageBody::StatusRequest)
    }

    #[test]
    fn test_publish_without_subscribers_returns_false() {
        let broker = Broker::new();
        assert!(!broker.publish(status_request("agents.nobody")));
    }

    #[tokio::test]
    async fn test_subscriber_sees_messages_in_publish_order() {
        let broker = Broker::new();
        let mut sub = broker.subscribe("agents.market");

        for label in ["a", "b", "c"] {
            let msg = Message::new(
                label,
                "agents.market",
                MessageBody::StatusRequest,
            );
            assert!(broker.publish(msg));
        }

        assert_eq!(sub.recv().await.unwrap().from_agent, "a");
        assert_eq!(sub.recv().await.unwrap().from_agent, "b");
        assert_eq!(sub.recv().await.unwrap().from_agent, "c");
    }

    #[tokio::test]
    async fn test_multiple_subscribers_each_see_all_messages() {
        let broker = Broker::new();
        let mut first = broker.subscribe("agents.global");
        let mut second = broker.subscribe("agents.global");

        broker.publish(status_request("agents.global"));

        assert!(first.recv().await.is_some());
        assert!(second.recv().await.is_some());
    }

    #[test]
    fn test_no_replay_for_late_subscriber() {
        let broker = Broker::new();
        broker.publish(status_request("agents.market"));

        let mut late = broker.subscribe("agents.market");
        assert!(late.try_recv().is_none());
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let broker = Broker::new();
        let sub = broker.subscribe("agents.market");
        broker.unsubscribe("agents.market", sub.id());

        assert!(!broker.publish(status_request("agents.market")));
    }

    #[test]
    fn test_dropped_subscription_is_pruned_on_publish() {
        let broker = Broker::new();
        let sub = broker.subscribe("agents.market");
        drop(sub);

        assert!(!broker.publish(status_request("agents.market")));
    }

    #[test]
    fn test_enqueue_rejects_out_of_range_priority() {
        let broker = Broker::new();
        let task = Task::new("market_research", json!({})).with_priority(0);
        let err = broker.enqueue_task("research", task).unwrap_err();
        assert!(matches!(err, ConductorError::Validation(_)));
    }

    #[test]
    fn test_dequeue_empty_queue_is_none() {
        let broker = Broker::new();
        assert!(broker.dequeue_task("research").is_none());
        assert_eq!(broker.queue_depth("research"), 0);
    }

    #[test]
    fn test_queue_depth_tracks_enqueue_dequeue() {
        let broker = Broker::new();
        broker
            .enqueue_task("research", Task::new("a", json!({})))
            .unwrap();
        broker
            .enqueue_task("research", Task::new("b", json!({})))
            .unwrap();
        assert_eq!(broker.queue_depth("research"), 2);

        broker.dequeue_task("research");
        assert_eq!(broker.queue_depth("research"), 1);
    }

    #[tokio::test]
    async fn test_shutdown_fails_closed() {
        let broker = Broker::new();
        let mut sub = broker.subscribe("agents.market");
        broker.shutdown();

        // Subscriber wakes with end-of-stream, not a hang.
        assert!(sub.recv().await.is_none());
        assert!(!broker.publish(status_request("agents.market")));
        assert!(broker.dequeue_task("research").is_none());
        let err = broker
            .enqueue_task("research", Task::new("a", json!({})))
            .unwrap_err();
        assert!(matches!(err, ConductorError::Transport(_)));
    }

    #[test]
    fn test_statistics_counters() {
        let broker = Broker::new();
        let _sub = broker.subscribe("agents.market");
        broker.publish(status_request("agents.market"));
        broker
            .enqueue_task("research", Task::new("a", json!({})))
            .unwrap();
        broker.dequeue_task("research");

        let stats = broker.statistics();
        assert_eq!(stats.messages_published, 1);
        assert_eq!(stats.messages_delivered, 1);
        assert_eq!(stats.tasks_enqueued, 1);
        assert_eq!(stats.tasks_dequeued, 1);
        assert_eq!(stats.queue_depths.get("research"), Some(&0));
    }
}
