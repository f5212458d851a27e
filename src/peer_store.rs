//! Concurrent registry of known peers.
//!
//! Every component shares the peer store, so records are individually locked:
//! the outer map is only held long enough to clone an `Arc` handle, and
//! unrelated peers can be mutated concurrently.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};

use crate::identity::{Contact, PeerId};

/// Connection lifecycle of a known peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Everything this node knows about one peer.
#[derive(Clone, Debug)]
pub struct PeerRecord {
    /// The peer's identity.
    pub id: PeerId,
    /// All addresses the peer has been seen at.
    pub addresses: BTreeSet<String>,
    /// When the peer was last sighted.
    pub last_seen: Instant,
    /// Most recent round-trip latency, if any RPC has completed.
    pub latency_ms: Option<f32>,
    /// Protocol identifiers the peer advertises, including pubsub
    /// pseudo-protocols for the topics it subscribes to.
    pub protocols: BTreeSet<String>,
    /// Current connection state.
    pub state: ConnectionState,
}

impl PeerRecord {
    /// Build a fresh record from a contact sighting.
    pub fn from_contact(contact: &Contact) -> Self {
        let mut addresses = BTreeSet::new();
        if !contact.addr.is_empty() {
            addresses.insert(contact.addr.clone());
        }
        Self {
            id: contact.id,
            addresses,
            last_seen: Instant::now(),
            latency_ms: None,
            protocols: BTreeSet::new(),
            state: ConnectionState::Disconnected,
        }
    }

    /// The peer as a dialable contact, preferring the first known address.
    pub fn contact(&self) -> Contact {
        Contact {
            id: self.id,
            addr: self.addresses.iter().next().cloned().unwrap_or_default(),
        }
    }

    /// Merge another sighting of the same peer into this record.
    ///
    /// Addresses and protocols take the union; `last_seen` takes the more
    /// recent timestamp; latency takes the newer sample when present.
    fn merge(&mut self, other: &PeerRecord) {
        debug_assert_eq!(self.id, other.id);
        self.addresses.extend(other.addresses.iter().cloned());
        self.protocols.extend(other.protocols.iter().cloned());
        if other.last_seen > self.last_seen {
            self.last_seen = other.last_seen;
        }
        if other.latency_ms.is_some() {
            self.latency_ms = other.latency_ms;
        }
        // A merge never demotes an established connection.
        if other.state == ConnectionState::Connected {
            self.state = ConnectionState::Connected;
        }
    }
}

/// Shared, concurrent peer registry with per-record locking.
#[derive(Default)]
pub struct PeerStore {
    peers: RwLock<HashMap<PeerId, Arc<RwLock<PeerRecord>>>>,
}

impl PeerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, or merge it into the existing one for the same id.
    pub async fn upsert(&self, record: PeerRecord) {
        let handle = {
            let peers = self.peers.read().await;
            peers.get(&record.id).cloned()
        };
        match handle {
            Some(existing) => {
                let mut existing = existing.write().await;
                existing.merge(&record);
            }
            None => {
                let mut peers = self.peers.write().await;
                // Re-check under the write lock; another task may have won.
                match peers.get(&record.id) {
                    Some(existing) => {
                        let mut existing = existing.write().await;
                        existing.merge(&record);
                    }
                    None => {
                        peers.insert(record.id, Arc::new(RwLock::new(record)));
                    }
                }
            }
        }
    }

    /// Record a sighting of a contact, creating or refreshing its record.
    pub async fn observe(&self, contact: &Contact) {
        self.upsert(PeerRecord::from_contact(contact)).await;
    }

    /// Snapshot of a peer's record, if known.
    pub async fn get(&self, id: &PeerId) -> Option<PeerRecord> {
        let handle = {
            let peers = self.peers.read().await;
            peers.get(id).cloned()
        };
        match handle {
            Some(record) => Some(record.read().await.clone()),
            None => None,
        }
    }

    /// Delete a peer's record. Weak referents (routing table entries) simply
    /// observe it as absent on next access.
    pub async fn remove(&self, id: &PeerId) {
        let mut peers = self.peers.write().await;
        peers.remove(id);
    }

    /// Update a peer's connection state and refresh its sighting time.
    pub async fn set_state(&self, id: &PeerId, state: ConnectionState) {
        if let Some(handle) = self.handle(id).await {
            let mut record = handle.write().await;
            record.state = state;
            record.last_seen = Instant::now();
        }
    }

    /// Record an RPC round-trip latency sample for a peer.
    pub async fn record_latency(&self, id: &PeerId, rtt: Duration) {
        if let Some(handle) = self.handle(id).await {
            let mut record = handle.write().await;
            record.latency_ms = Some((rtt.as_secs_f64() * 1000.0) as f32);
            record.last_seen = Instant::now();
        }
    }

    /// Add a protocol identifier to a peer's advertised set.
    pub async fn add_protocol(&self, id: &PeerId, protocol: &str) {
        if let Some(handle) = self.handle(id).await {
            let mut record = handle.write().await;
            record.protocols.insert(protocol.to_owned());
        }
    }

    /// Remove a protocol identifier from a peer's advertised set.
    pub async fn remove_protocol(&self, id: &PeerId, protocol: &str) {
        if let Some(handle) = self.handle(id).await {
            let mut record = handle.write().await;
            record.protocols.remove(protocol);
        }
    }

    /// Snapshot of all currently connected peers.
    pub async fn list_connected(&self) -> Vec<PeerRecord> {
        self.filter(|record| record.state == ConnectionState::Connected)
            .await
    }

    /// Snapshot of all peers advertising a protocol identifier.
    pub async fn list_with_protocol(&self, protocol: &str) -> Vec<PeerRecord> {
        self.filter(|record| record.protocols.contains(protocol))
            .await
    }

    /// Number of known peers.
    pub async fn len(&self) -> usize {
        self.peers.read().await.len()
    }

    /// True when no peers are known.
    pub async fn is_empty(&self) -> bool {
        self.peers.read().await.is_empty()
    }

    /// Evict disconnected peers whose last sighting is older than `ttl`.
    ///
    /// Returns the evicted peer ids so callers can drop derived state,
    /// such as routing-table entries.
    pub async fn prune(&self, ttl: Duration) -> Vec<PeerId> {
        let now = Instant::now();
        let mut expired = Vec::new();
        {
            let peers = self.peers.read().await;
            for (id, handle) in peers.iter() {
                let record = handle.read().await;
                if record.state == ConnectionState::Disconnected
                    && now.duration_since(record.last_seen) > ttl
                {
                    expired.push(*id);
                }
            }
        }
        let mut peers = self.peers.write().await;
        let mut evicted = Vec::new();
        for id in expired {
            // A sighting may have refreshed the record between the scan and
            // taking the write lock; re-check before evicting.
            let still_expired = match peers.get(&id) {
                Some(handle) => {
                    let record = handle.read().await;
                    record.state == ConnectionState::Disconnected
                        && now.duration_since(record.last_seen) > ttl
                }
                None => false,
            };
            if still_expired && peers.remove(&id).is_some() {
                evicted.push(id);
            }
        }
        evicted
    }

    async fn handle(&self, id: &PeerId) -> Option<Arc<RwLock<PeerRecord>>> {
        let peers = self.peers.read().await;
        peers.get(id).cloned()
    }

    async fn filter(&self, keep: impl Fn(&PeerRecord) -> bool) -> Vec<PeerRecord> {
        let handles: Vec<_> = {
            let peers = self.peers.read().await;
            peers.values().cloned().collect()
        };
        let mut out = Vec::new();
        for handle in handles {
            let record = handle.read().await;
            if keep(&record) {
                out.push(record.clone());
            }
        }
        out
    }
}
