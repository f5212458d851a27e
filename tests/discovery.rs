mod common;

use std::sync::Arc;

use tokio::time::Duration;

use kadmesh::{ConnectionState, DiscoveryMethod, Error};

use common::{test_config, NetworkRegistry, TestNode};

const DISCOVER_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn bootstrap_skips_unreachable_addresses() {
    let registry = Arc::new(NetworkRegistry::default());

    // Three live bootstrap peers plus two addresses nobody answers at.
    let mut live = Vec::new();
    for index in 10..=12u32 {
        live.push(TestNode::new(Arc::clone(&registry), index, 20, 3).await);
    }
    let mut config = test_config(20, 3);
    config.bootstrap = vec![
        "node-10".to_owned(),
        "node-99".to_owned(),
        "node-11".to_owned(),
        "node-98".to_owned(),
        "node-12".to_owned(),
    ];
    let joiner = TestNode::with_config(Arc::clone(&registry), 1, config).await;

    let records = joiner
        .node
        .discover(&[DiscoveryMethod::Bootstrap], 10, DISCOVER_TIMEOUT)
        .await
        .unwrap();

    assert_eq!(records.len(), 3);
    for record in &records {
        assert_eq!(record.state, ConnectionState::Connected);
    }
}

#[tokio::test]
async fn discover_stops_at_the_limit() {
    let registry = Arc::new(NetworkRegistry::default());
    for index in 10..=14u32 {
        TestNode::new(Arc::clone(&registry), index, 20, 3).await;
    }
    let mut config = test_config(20, 3);
    config.bootstrap = (10..=14u32).map(|i| format!("node-{i}")).collect();
    let joiner = TestNode::with_config(Arc::clone(&registry), 1, config).await;

    let records = joiner
        .node
        .discover(&[DiscoveryMethod::Bootstrap], 2, DISCOVER_TIMEOUT)
        .await
        .unwrap();

    assert_eq!(records.len(), 2);
}

#[tokio::test]
async fn limit_applies_after_unreachable_addresses_are_skipped() {
    let registry = Arc::new(NetworkRegistry::default());

    for index in 10..=12u32 {
        TestNode::new(Arc::clone(&registry), index, 20, 3).await;
    }
    // Five bootstrap addresses, only three of which answer.
    let mut config = test_config(20, 3);
    config.bootstrap = vec![
        "node-99".to_owned(),
        "node-10".to_owned(),
        "node-11".to_owned(),
        "node-98".to_owned(),
        "node-12".to_owned(),
    ];
    let joiner = TestNode::with_config(Arc::clone(&registry), 1, config).await;

    let records = joiner
        .node
        .discover(&[DiscoveryMethod::Bootstrap], 2, DISCOVER_TIMEOUT)
        .await
        .unwrap();

    assert_eq!(records.len(), 2, "dead addresses must not count toward the limit");
    for record in &records {
        assert_eq!(record.state, ConnectionState::Connected);
    }
}

#[tokio::test]
async fn discover_rejects_zero_limit() {
    let registry = Arc::new(NetworkRegistry::default());
    let node = TestNode::new(Arc::clone(&registry), 1, 20, 3).await;

    let err = node
        .node
        .discover(&[DiscoveryMethod::Bootstrap], 0, DISCOVER_TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidLimit));
}

#[tokio::test]
async fn peers_found_by_multiple_methods_merge_into_one_record() {
    let registry = Arc::new(NetworkRegistry::default());
    let shared = TestNode::new(Arc::clone(&registry), 10, 20, 3).await;
    let lan_only = TestNode::new(Arc::clone(&registry), 11, 20, 3).await;

    let mut config = test_config(20, 3);
    config.bootstrap = vec!["node-10".to_owned()];
    let joiner = TestNode::with_config(Arc::clone(&registry), 1, config).await;
    // The bootstrap peer also answers the local probe.
    joiner
        .network
        .set_lan_peers(vec![shared.contact(), lan_only.contact()])
        .await;

    let records = joiner
        .node
        .discover(
            &[DiscoveryMethod::Bootstrap, DiscoveryMethod::LocalNetwork],
            10,
            DISCOVER_TIMEOUT,
        )
        .await
        .unwrap();

    assert_eq!(records.len(), 2, "shared peer must be deduplicated");
    let shared_record = records
        .iter()
        .find(|r| r.id == shared.id())
        .expect("shared peer present");
    // The bootstrap sighting marked it connected; the probe must not
    // demote it.
    assert_eq!(shared_record.state, ConnectionState::Connected);
}

#[tokio::test]
async fn random_walk_finds_peers_through_a_bootstrap_contact() {
    let registry = Arc::new(NetworkRegistry::default());
    let hub = TestNode::new(Arc::clone(&registry), 10, 20, 3).await;
    let mut spokes = Vec::new();
    for index in 20..=30u32 {
        let spoke = TestNode::new(Arc::clone(&registry), index, 20, 3).await;
        hub.node.observe_contact(spoke.contact()).await;
        spokes.push(spoke);
    }

    let joiner = TestNode::new(Arc::clone(&registry), 1, 20, 3).await;
    joiner.node.observe_contact(hub.contact()).await;

    let records = joiner
        .node
        .discover(&[DiscoveryMethod::DhtRandomWalk], 20, DISCOVER_TIMEOUT)
        .await
        .unwrap();

    assert!(
        !records.is_empty(),
        "walking random targets should surface the hub's contacts"
    );
}

#[tokio::test]
async fn discovered_peers_land_in_the_peer_store() {
    let registry = Arc::new(NetworkRegistry::default());
    let peer = TestNode::new(Arc::clone(&registry), 10, 20, 3).await;
    let mut config = test_config(20, 3);
    config.bootstrap = vec!["node-10".to_owned()];
    let joiner = TestNode::with_config(Arc::clone(&registry), 1, config).await;

    joiner
        .node
        .discover(&[DiscoveryMethod::Bootstrap], 10, DISCOVER_TIMEOUT)
        .await
        .unwrap();

    let record = joiner
        .node
        .peers()
        .get(&peer.id())
        .await
        .expect("bootstrap peer recorded");
    assert!(record.addresses.contains("node-10"));
}
