//! Topic-based publish/subscribe state.
//!
//! This module owns the local side of the mesh: per-topic subscriptions,
//! message-id assignment, and duplicate suppression. Fan-out to remote
//! subscribers is driven by the node, which tracks peer interest through
//! topic pseudo-protocol ids in the peer store.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};

use crate::identity::{Cid, PeerId};

/// Capacity of each subscription's local delivery channel.
const DELIVERY_CHANNEL_CAPACITY: usize = 256;

/// A 256-bit pubsub message identifier.
pub type MessageId = Cid;

/// The pseudo-protocol id under which a topic subscription is advertised
/// in peer records.
pub fn topic_protocol(topic: &str) -> String {
    format!("/kadmesh/pubsub/{topic}")
}

/// A message delivered to local subscribers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GossipMessage {
    /// Topic the message was published on.
    pub topic: String,
    /// Unique id; the dedup key across the mesh.
    pub message_id: MessageId,
    /// Identity of the original publisher.
    pub from: PeerId,
    /// Opaque payload bytes.
    pub payload: Vec<u8>,
}

/// This node's membership in a topic.
///
/// Dropping the subscription does not leave the topic; call
/// `unsubscribe` on the facade for that.
pub struct Subscription {
    /// The subscribed topic.
    pub topic: String,
    /// Opaque token identifying this membership.
    pub handler_id: u64,
    /// Local delivery stream for inbound, deduplicated messages.
    pub receiver: broadcast::Receiver<GossipMessage>,
}

/// Bounded set of recently seen message ids with FIFO eviction.
struct SeenSet {
    window: usize,
    order: VecDeque<MessageId>,
    present: HashSet<MessageId>,
}

impl SeenSet {
    fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            order: VecDeque::new(),
            present: HashSet::new(),
        }
    }

    /// Mark an id as seen. Returns `true` when the id was not seen before.
    fn insert(&mut self, id: MessageId) -> bool {
        if !self.present.insert(id) {
            return false;
        }
        self.order.push_back(id);
        while self.order.len() > self.window {
            if let Some(evicted) = self.order.pop_front() {
                self.present.remove(&evicted);
            }
        }
        true
    }
}

struct TopicState {
    handler_id: u64,
    seen: SeenSet,
    sender: broadcast::Sender<GossipMessage>,
}

/// Local pubsub membership and dedup state.
pub struct PubSub {
    topics: Mutex<HashMap<String, TopicState>>,
    publish_counter: AtomicU64,
    next_handler_id: AtomicU64,
    seen_window: usize,
}

impl PubSub {
    /// Create pubsub state with the given dedup window capacity per topic.
    pub fn new(seen_window: usize) -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            publish_counter: AtomicU64::new(0),
            next_handler_id: AtomicU64::new(1),
            seen_window,
        }
    }

    /// Join a topic. Idempotent: a second subscribe to the same topic reuses
    /// the existing membership (same handler id) instead of duplicating it.
    pub async fn subscribe(&self, topic: &str) -> Subscription {
        let mut topics = self.topics.lock().await;
        let state = topics.entry(topic.to_owned()).or_insert_with(|| {
            let (sender, _) = broadcast::channel(DELIVERY_CHANNEL_CAPACITY);
            TopicState {
                handler_id: self.next_handler_id.fetch_add(1, Ordering::Relaxed),
                seen: SeenSet::new(self.seen_window),
                sender,
            }
        });
        Subscription {
            topic: topic.to_owned(),
            handler_id: state.handler_id,
            receiver: state.sender.subscribe(),
        }
    }

    /// Leave a topic, dropping its dedup state and any in-flight deliveries.
    ///
    /// Returns `false` when the node was not subscribed.
    pub async fn unsubscribe(&self, topic: &str) -> bool {
        let mut topics = self.topics.lock().await;
        topics.remove(topic).is_some()
    }

    /// Whether the node is currently subscribed to a topic.
    pub async fn is_subscribed(&self, topic: &str) -> bool {
        self.topics.lock().await.contains_key(topic)
    }

    /// The topics this node is currently subscribed to.
    pub async fn subscribed_topics(&self) -> Vec<String> {
        self.topics.lock().await.keys().cloned().collect()
    }

    /// Assign a fresh message id: the hash of topic, payload, and a monotonic
    /// counter, unique even for identical payloads.
    pub fn next_message_id(&self, topic: &str, payload: &[u8]) -> MessageId {
        let counter = self.publish_counter.fetch_add(1, Ordering::Relaxed);
        let mut hasher = blake3::Hasher::new();
        hasher.update(topic.as_bytes());
        hasher.update(payload);
        hasher.update(&counter.to_le_bytes());
        *hasher.finalize().as_bytes()
    }

    /// Run a message through dedup and, when fresh, deliver it to local
    /// subscribers.
    ///
    /// Returns `true` when the message was fresh and should be re-forwarded;
    /// duplicates and messages for unsubscribed topics return `false`.
    pub async fn accept(&self, message: &GossipMessage) -> bool {
        let mut topics = self.topics.lock().await;
        let Some(state) = topics.get_mut(&message.topic) else {
            return false;
        };
        if !state.seen.insert(message.message_id) {
            return false;
        }
        // Delivery failure just means no local receiver is currently polling.
        let _ = state.sender.send(message.clone());
        true
    }

    /// Mark an outbound message as seen so our own fan-out echoes are dropped.
    pub async fn mark_seen(&self, topic: &str, message_id: MessageId) {
        let mut topics = self.topics.lock().await;
        if let Some(state) = topics.get_mut(topic) {
            state.seen.insert(message_id);
        }
    }
}
