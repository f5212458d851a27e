use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{sleep, Duration};

use kadmesh::pubsub::GossipMessage;
use kadmesh::{
    Capabilities, Cid, Contact, Error, Network, Node, NodeConfig, PeerId, Result,
};

/// Configuration used across the integration tests: short timeouts, small
/// dedup window, generous cache.
pub fn test_config(k: usize, alpha: usize) -> NodeConfig {
    NodeConfig {
        listen_addrs: Vec::new(),
        bootstrap: Vec::new(),
        identity_path: None,
        k,
        alpha,
        request_timeout: Duration::from_millis(500),
        cache_budget_bytes: 1024 * 1024,
        seen_window: 64,
        peer_ttl: Duration::from_secs(600),
        local_probe_port: 0,
    }
}

/// In-memory network: requests are dispatched straight onto the target
/// node's inbound handlers, with optional latency and failure injection.
#[derive(Clone)]
pub struct TestNetwork {
    registry: Arc<NetworkRegistry>,
    self_contact: Contact,
    latencies: Arc<Mutex<HashMap<PeerId, Duration>>>,
    failures: Arc<Mutex<HashSet<PeerId>>>,
    lan_peers: Arc<Mutex<Vec<Contact>>>,
}

impl TestNetwork {
    pub fn new(registry: Arc<NetworkRegistry>, self_contact: Contact) -> Self {
        Self {
            registry,
            self_contact,
            latencies: Arc::new(Mutex::new(HashMap::new())),
            failures: Arc::new(Mutex::new(HashSet::new())),
            lan_peers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn set_latency(&self, peer: PeerId, latency: Duration) {
        self.latencies.lock().await.insert(peer, latency);
    }

    pub async fn set_failure(&self, peer: PeerId, fail: bool) {
        let mut failures = self.failures.lock().await;
        if fail {
            failures.insert(peer);
        } else {
            failures.remove(&peer);
        }
    }

    /// Peers that answer this node's local-network probe.
    pub async fn set_lan_peers(&self, peers: Vec<Contact>) {
        *self.lan_peers.lock().await = peers;
    }

    async fn check_reachable(&self, peer: &PeerId) -> Result<()> {
        if self.failures.lock().await.contains(peer) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "injected network failure",
            )));
        }
        let latency = self.latencies.lock().await.get(peer).copied();
        if let Some(delay) = latency {
            sleep(delay).await;
        }
        Ok(())
    }

    async fn target(&self, peer: &PeerId) -> Result<Arc<Node<TestNetwork>>> {
        self.registry.get(peer).await.ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "peer not registered",
            ))
        })
    }
}

/// Shared registry mapping peer ids and addresses to live test nodes.
#[derive(Default)]
pub struct NetworkRegistry {
    by_id: RwLock<HashMap<PeerId, Arc<Node<TestNetwork>>>>,
    by_addr: RwLock<HashMap<String, PeerId>>,
}

impl NetworkRegistry {
    pub async fn register(&self, node: &Arc<Node<TestNetwork>>) {
        let contact = node.self_contact.clone();
        self.by_id.write().await.insert(contact.id, Arc::clone(node));
        self.by_addr.write().await.insert(contact.addr, contact.id);
    }

    pub async fn get(&self, id: &PeerId) -> Option<Arc<Node<TestNetwork>>> {
        self.by_id.read().await.get(id).cloned()
    }

    pub async fn get_by_addr(&self, addr: &str) -> Option<Arc<Node<TestNetwork>>> {
        let id = { self.by_addr.read().await.get(addr).copied() };
        match id {
            Some(id) => self.get(&id).await,
            None => None,
        }
    }
}

#[async_trait]
impl Network for TestNetwork {
    async fn dial(&self, addr: &str, dial_timeout: Duration) -> Result<Contact> {
        let Some(node) = self.registry.get_by_addr(addr).await else {
            return Err(Error::DialRefused {
                addr: addr.to_owned(),
                source: std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "no node at address",
                ),
            });
        };
        let contact = node.self_contact.clone();
        self.check_reachable(&contact.id).await?;
        let _ = dial_timeout;
        node.handle_ping(&self.self_contact).await;
        Ok(contact)
    }

    async fn ping(&self, to: &Contact) -> Result<Contact> {
        self.check_reachable(&to.id).await?;
        let node = self.target(&to.id).await?;
        node.handle_ping(&self.self_contact).await;
        Ok(node.self_contact.clone())
    }

    async fn find_node(&self, to: &Contact, target: PeerId) -> Result<Vec<Contact>> {
        self.check_reachable(&to.id).await?;
        let node = self.target(&to.id).await?;
        Ok(node.handle_find_node(&self.self_contact, target).await)
    }

    async fn find_providers(&self, to: &Contact, cid: Cid) -> Result<(Vec<Contact>, Vec<Contact>)> {
        self.check_reachable(&to.id).await?;
        let node = self.target(&to.id).await?;
        Ok(node.handle_find_providers(&self.self_contact, cid).await)
    }

    async fn provide(&self, to: &Contact, cid: Cid) -> Result<()> {
        self.check_reachable(&to.id).await?;
        let node = self.target(&to.id).await?;
        node.handle_provide(&self.self_contact, cid).await;
        Ok(())
    }

    async fn fetch(&self, to: &Contact, cid: Cid) -> Result<Option<Vec<u8>>> {
        self.check_reachable(&to.id).await?;
        let node = self.target(&to.id).await?;
        Ok(node.handle_fetch(&self.self_contact, cid).await)
    }

    async fn gossip(&self, to: &Contact, message: GossipMessage) -> Result<()> {
        self.check_reachable(&to.id).await?;
        let node = self.target(&to.id).await?;
        node.handle_gossip(&self.self_contact, message).await;
        Ok(())
    }

    async fn topic_interest(&self, to: &Contact, topic: &str, subscribed: bool) -> Result<()> {
        self.check_reachable(&to.id).await?;
        let node = self.target(&to.id).await?;
        node.handle_topic_interest(&self.self_contact, topic, subscribed)
            .await;
        Ok(())
    }

    async fn custom(&self, to: &Contact, protocol_id: &str, payload: Vec<u8>) -> Result<()> {
        self.check_reachable(&to.id).await?;
        let node = self.target(&to.id).await?;
        node.handle_custom(&self.self_contact, protocol_id, &payload)
            .await;
        Ok(())
    }

    async fn local_probe(&self, _window: Duration) -> Result<Vec<Contact>> {
        Ok(self.lan_peers.lock().await.clone())
    }
}

/// A node wired into the shared in-memory network.
pub struct TestNode {
    pub node: Arc<Node<TestNetwork>>,
    pub network: TestNetwork,
}

impl TestNode {
    pub async fn new(registry: Arc<NetworkRegistry>, index: u32, k: usize, alpha: usize) -> Self {
        Self::with_config(registry, index, test_config(k, alpha)).await
    }

    pub async fn with_config(
        registry: Arc<NetworkRegistry>,
        index: u32,
        config: NodeConfig,
    ) -> Self {
        let contact = make_contact(index);
        let network = TestNetwork::new(Arc::clone(&registry), contact.clone());
        let node = Arc::new(Node::new(
            contact.id,
            contact,
            network.clone(),
            config,
            Capabilities::full(),
        ));
        registry.register(&node).await;
        Self { node, network }
    }

    pub fn contact(&self) -> Contact {
        self.node.self_contact.clone()
    }

    pub fn id(&self) -> PeerId {
        self.node.id
    }
}

pub fn make_peer_id(index: u32) -> PeerId {
    let mut id = [0u8; 32];
    id[..4].copy_from_slice(&index.to_be_bytes());
    id
}

pub fn make_contact(index: u32) -> Contact {
    Contact {
        id: make_peer_id(index),
        addr: format!("node-{index}"),
    }
}
