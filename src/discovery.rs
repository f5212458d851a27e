//! Multi-source peer discovery.
//!
//! Each discovery method feeds sightings through the peer store, so a peer
//! surfaced by several methods ends up as one merged record. The `limit`
//! applies after deduplication.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::time::{Duration, Instant};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::identity::fmt_id;
use crate::net::Network;
use crate::node::Node;
use crate::peer_store::{ConnectionState, PeerRecord};

/// Window for collecting local-network probe responses.
const LOCAL_PROBE_WINDOW: Duration = Duration::from_secs(2);

/// How many random-walk lookups to issue per discover call.
const RANDOM_WALK_LOOKUPS: usize = 3;

/// A source of peer sightings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DiscoveryMethod {
    /// Dial the configured bootstrap addresses.
    Bootstrap,
    /// Broadcast a probe on the local subnet.
    LocalNetwork,
    /// Look up random target ids to surface distant peers.
    DhtRandomWalk,
}

impl<N: Network> Node<N> {
    /// Discover peers through the requested methods.
    ///
    /// Per-source failures are logged and skipped; the call only fails on
    /// invalid input. Results are deduplicated by peer id before `limit`
    /// is applied.
    pub async fn discover(
        self: &Arc<Self>,
        methods: &[DiscoveryMethod],
        limit: usize,
        discover_timeout: Duration,
    ) -> Result<Vec<PeerRecord>> {
        if limit == 0 {
            return Err(Error::InvalidLimit);
        }
        let deadline = Instant::now() + discover_timeout;
        let mut found: Vec<crate::identity::PeerId> = Vec::new();
        let mut seen = HashSet::new();

        for method in methods {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let sightings = match method {
                DiscoveryMethod::Bootstrap => self.discover_bootstrap(remaining).await,
                DiscoveryMethod::LocalNetwork => self.discover_local(remaining).await,
                DiscoveryMethod::DhtRandomWalk => self.discover_random_walk(remaining).await,
            };
            for id in sightings {
                if id != self.id && seen.insert(id) {
                    found.push(id);
                }
            }
            if found.len() >= limit {
                break;
            }
        }

        found.truncate(limit);
        let mut records = Vec::with_capacity(found.len());
        for id in found {
            if let Some(record) = self.peers.get(&id).await {
                records.push(record);
            }
        }
        info!(discovered = records.len(), "discovery completed");
        Ok(records)
    }

    /// Dial every configured bootstrap address, skipping failures.
    async fn discover_bootstrap(self: &Arc<Self>, budget: Duration) -> Vec<crate::identity::PeerId> {
        let deadline = Instant::now() + budget;
        let mut found = Vec::new();
        for addr in &self.config.bootstrap {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let dial_timeout = remaining.min(self.config.request_timeout);
            match self.network.dial(addr, dial_timeout).await {
                Ok(contact) => {
                    let id = contact.id;
                    self.observe_contact(contact).await;
                    self.peers.set_state(&id, ConnectionState::Connected).await;
                    found.push(id);
                }
                Err(err) => {
                    // Unreachable bootstrap peers are expected; keep going.
                    debug!(%addr, %err, "bootstrap dial failed");
                }
            }
        }
        found
    }

    /// Broadcast a probe on the local subnet and collect responders.
    async fn discover_local(self: &Arc<Self>, budget: Duration) -> Vec<crate::identity::PeerId> {
        if !self.capabilities.local_probe {
            return Vec::new();
        }
        let window = budget.min(LOCAL_PROBE_WINDOW);
        match self.network.local_probe(window).await {
            Ok(contacts) => {
                let mut found = Vec::new();
                for contact in contacts {
                    let id = contact.id;
                    self.observe_contact(contact).await;
                    found.push(id);
                }
                found
            }
            Err(err) => {
                debug!(%err, "local-network probe failed");
                Vec::new()
            }
        }
    }

    /// Look up random targets to surface peers outside our neighborhood.
    async fn discover_random_walk(
        self: &Arc<Self>,
        budget: Duration,
    ) -> Vec<crate::identity::PeerId> {
        let deadline = Instant::now() + budget;
        let mut found = Vec::new();
        for _ in 0..RANDOM_WALK_LOOKUPS {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let target: [u8; 32] = rand::random();
            match self.find_closest_peers(target, self.config.k, remaining).await {
                Ok(contacts) => {
                    for contact in contacts {
                        found.push(contact.id);
                    }
                }
                Err(err) => {
                    debug!(target = %fmt_id(&target), %err, "random walk lookup failed");
                }
            }
        }
        found
    }
}
