mod common;

use std::sync::Arc;

use tokio::time::{timeout, Duration};

use kadmesh::GossipMessage;

use common::{NetworkRegistry, TestNode};

const DELIVERY_WAIT: Duration = Duration::from_secs(2);
const SILENCE_WAIT: Duration = Duration::from_millis(300);

#[tokio::test]
async fn publish_reaches_interested_subscriber() {
    let registry = Arc::new(NetworkRegistry::default());
    let publisher = TestNode::new(Arc::clone(&registry), 1, 20, 3).await;
    let subscriber = TestNode::new(Arc::clone(&registry), 2, 20, 3).await;

    let mut subscription = subscriber.node.subscribe("news").await;
    publisher
        .node
        .handle_topic_interest(&subscriber.contact(), "news", true)
        .await;

    let message_id = publisher
        .node
        .publish("news", b"hello mesh".to_vec())
        .await
        .unwrap();

    let delivered = timeout(DELIVERY_WAIT, subscription.receiver.recv())
        .await
        .expect("delivery within the window")
        .expect("channel open");
    assert_eq!(delivered.message_id, message_id);
    assert_eq!(delivered.payload, b"hello mesh");
    assert_eq!(delivered.from, publisher.id());
}

#[tokio::test]
async fn duplicate_gossip_is_delivered_once() {
    let registry = Arc::new(NetworkRegistry::default());
    let origin = TestNode::new(Arc::clone(&registry), 1, 20, 3).await;
    let subscriber = TestNode::new(Arc::clone(&registry), 2, 20, 3).await;

    let mut subscription = subscriber.node.subscribe("news").await;
    let message = GossipMessage {
        topic: "news".to_owned(),
        message_id: common::make_peer_id(42),
        from: origin.id(),
        payload: b"once only".to_vec(),
    };

    let from = origin.contact();
    subscriber.node.handle_gossip(&from, message.clone()).await;
    subscriber.node.handle_gossip(&from, message).await;

    let first = timeout(DELIVERY_WAIT, subscription.receiver.recv())
        .await
        .expect("first copy delivered")
        .expect("channel open");
    assert_eq!(first.payload, b"once only");

    let second = timeout(SILENCE_WAIT, subscription.receiver.recv()).await;
    assert!(second.is_err(), "duplicate must be suppressed");
}

#[tokio::test]
async fn gossip_reforwards_to_downstream_subscribers() {
    let registry = Arc::new(NetworkRegistry::default());
    let publisher = TestNode::new(Arc::clone(&registry), 1, 20, 3).await;
    let relay = TestNode::new(Arc::clone(&registry), 2, 20, 3).await;
    let leaf = TestNode::new(Arc::clone(&registry), 3, 20, 3).await;

    let _relay_sub = relay.node.subscribe("news").await;
    let mut leaf_sub = leaf.node.subscribe("news").await;

    // The publisher only knows about the relay's interest; the relay knows
    // about the leaf. Delivery to the leaf therefore requires a re-forward.
    publisher
        .node
        .handle_topic_interest(&relay.contact(), "news", true)
        .await;
    relay
        .node
        .handle_topic_interest(&leaf.contact(), "news", true)
        .await;

    publisher
        .node
        .publish("news", b"two hops".to_vec())
        .await
        .unwrap();

    let delivered = timeout(DELIVERY_WAIT, leaf_sub.receiver.recv())
        .await
        .expect("relayed delivery within the window")
        .expect("channel open");
    assert_eq!(delivered.payload, b"two hops");
    assert_eq!(delivered.from, publisher.id());
}

#[tokio::test]
async fn publisher_never_receives_its_own_echo() {
    let registry = Arc::new(NetworkRegistry::default());
    let publisher = TestNode::new(Arc::clone(&registry), 1, 20, 3).await;
    let subscriber = TestNode::new(Arc::clone(&registry), 2, 20, 3).await;

    let mut publisher_sub = publisher.node.subscribe("news").await;
    let mut subscriber_sub = subscriber.node.subscribe("news").await;
    publisher
        .node
        .handle_topic_interest(&subscriber.contact(), "news", true)
        .await;
    subscriber
        .node
        .handle_topic_interest(&publisher.contact(), "news", true)
        .await;

    publisher
        .node
        .publish("news", b"no echo".to_vec())
        .await
        .unwrap();

    let delivered = timeout(DELIVERY_WAIT, subscriber_sub.receiver.recv())
        .await
        .expect("subscriber receives the message")
        .expect("channel open");
    assert_eq!(delivered.payload, b"no echo");

    let echo = timeout(SILENCE_WAIT, publisher_sub.receiver.recv()).await;
    assert!(echo.is_err(), "own message must not come back");
}

#[tokio::test]
async fn unsubscribed_topics_drop_gossip_silently() {
    let registry = Arc::new(NetworkRegistry::default());
    let origin = TestNode::new(Arc::clone(&registry), 1, 20, 3).await;
    let node = TestNode::new(Arc::clone(&registry), 2, 20, 3).await;
    let leaf = TestNode::new(Arc::clone(&registry), 3, 20, 3).await;

    let mut subscription = node.node.subscribe("news").await;
    let mut leaf_sub = leaf.node.subscribe("news").await;
    node.node
        .handle_topic_interest(&leaf.contact(), "news", true)
        .await;

    assert!(node.node.unsubscribe("news").await);

    let message = GossipMessage {
        topic: "news".to_owned(),
        message_id: common::make_peer_id(7),
        from: origin.id(),
        payload: b"late".to_vec(),
    };
    node.node.handle_gossip(&origin.contact(), message).await;

    // Neither delivered locally nor re-forwarded downstream.
    assert!(timeout(SILENCE_WAIT, subscription.receiver.recv())
        .await
        .map(|r| r.is_err())
        .unwrap_or(true));
    assert!(timeout(SILENCE_WAIT, leaf_sub.receiver.recv()).await.is_err());
}

#[tokio::test]
async fn resubscribing_keeps_the_same_handler_id() {
    let registry = Arc::new(NetworkRegistry::default());
    let node = TestNode::new(Arc::clone(&registry), 1, 20, 3).await;

    let first = node.node.subscribe("news").await;
    let second = node.node.subscribe("news").await;
    assert_eq!(first.handler_id, second.handler_id);
    assert_eq!(first.topic, second.topic);
}

#[tokio::test]
async fn unsubscribe_returns_false_when_not_subscribed() {
    let registry = Arc::new(NetworkRegistry::default());
    let node = TestNode::new(Arc::clone(&registry), 1, 20, 3).await;

    assert!(!node.node.unsubscribe("nothing").await);
}
