//! The node: iterative lookups, content exchange, and the facade.
//!
//! [`Node`] owns the peer store, routing table, provider index, content
//! store, pubsub state, and handler registry, and drives them over the
//! [`Network`] seam. It is generic over the network so tests can use an
//! in-memory mock while production uses [`crate::net::TcpNetwork`].
//!
//! [`Facade`] wraps an `Arc<Node>` by composition and is the single entry
//! point an embedding application (HTTP layer, CLI) talks to.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use tokio::time::{timeout, Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::{Capabilities, NodeConfig};
use crate::content::{ContentIndex, ContentStore};
use crate::error::{Error, Result};
use crate::handlers::{HandlerFn, HandlerRegistry, ProtocolHandler};
use crate::identity::{cmp_by_distance, fmt_id, verify_cid, Cid, Contact, PeerId};
use crate::net::Network;
use crate::peer_store::{ConnectionState, PeerRecord, PeerStore};
use crate::pubsub::{topic_protocol, GossipMessage, MessageId, PubSub, Subscription};
use crate::routing::{PendingEviction, RoutingTable};

/// Outcome of a provide announcement.
#[derive(Clone, Copy, Debug)]
pub struct ProvideReceipt {
    /// How many peers accepted the announcement. Zero still counts as local
    /// success with degraded propagation.
    pub announce_count: usize,
}

/// Aggregated health/status snapshot for the facade.
#[derive(Clone, Debug)]
pub struct NodeStatus {
    /// Local peer id, hex-encoded.
    pub id: String,
    /// Number of currently connected peers.
    pub connected_peers: usize,
    /// Total peers in the store.
    pub known_peers: usize,
    /// Contacts held in the routing table.
    pub routing_entries: usize,
    /// Locally stored content entries.
    pub stored_content: usize,
    /// Content ids with at least one known provider.
    pub provider_records: usize,
    /// Topics this node is subscribed to.
    pub subscribed_topics: Vec<String>,
    /// Custom protocols with registered handlers.
    pub protocols: Vec<String>,
}

/// A mesh node: routing, discovery, content exchange, pubsub, and handlers
/// composed over one [`Network`].
pub struct Node<N: Network> {
    /// This node's identifier.
    pub id: PeerId,
    /// Contact info for this node.
    pub self_contact: Contact,
    pub(crate) config: NodeConfig,
    pub(crate) capabilities: Capabilities,
    pub(crate) network: Arc<N>,
    pub(crate) peers: Arc<PeerStore>,
    pub(crate) routing: RoutingTable,
    pub(crate) providers: Arc<ContentIndex>,
    pub(crate) store: Arc<ContentStore>,
    pub(crate) pubsub: Arc<PubSub>,
    pub(crate) handlers: Arc<HandlerRegistry>,
}

impl<N: Network> Node<N> {
    /// Create a node from its identity, network, and configuration snapshot.
    pub fn new(
        id: PeerId,
        self_contact: Contact,
        network: N,
        config: NodeConfig,
        capabilities: Capabilities,
    ) -> Self {
        Self {
            id,
            self_contact,
            routing: RoutingTable::new(id, config.k),
            peers: Arc::new(PeerStore::new()),
            providers: Arc::new(ContentIndex::new()),
            store: Arc::new(ContentStore::new(config.cache_budget_bytes)),
            pubsub: Arc::new(PubSub::new(config.seen_window)),
            handlers: Arc::new(HandlerRegistry::new()),
            network: Arc::new(network),
            config,
            capabilities,
        }
    }

    /// The shared peer store.
    pub fn peers(&self) -> &PeerStore {
        &self.peers
    }

    /// The provider-record index.
    pub fn providers(&self) -> &ContentIndex {
        &self.providers
    }

    /// The configuration snapshot the node was built with.
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// The capabilities probed at startup.
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// The protocol handler registry.
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    // ========================================================================
    // Routing table maintenance
    // ========================================================================

    /// Fold a contact sighting into the peer store and routing table.
    ///
    /// When the contact's bucket is full, the least-recently-seen incumbent
    /// is pinged in the background and only evicted if unresponsive.
    pub async fn observe_contact(self: &Arc<Self>, contact: Contact) {
        if contact.id == self.id {
            return;
        }
        self.peers.observe(&contact).await;
        if let Some(pending) = self.routing.update(contact).await {
            self.spawn_eviction_probe(pending);
        }
    }

    fn spawn_eviction_probe(self: &Arc<Self>, pending: PendingEviction) {
        let node = Arc::clone(self);
        tokio::spawn(async move {
            let probe = timeout(
                node.config.request_timeout,
                node.network.ping(&pending.oldest),
            )
            .await;
            let alive = matches!(probe, Ok(Ok(_)));
            if !alive {
                debug!(
                    peer = %fmt_id(&pending.oldest.id),
                    "incumbent failed liveness probe, evicting"
                );
            }
            node.routing.apply_probe_result(pending, alive).await;
        });
    }

    async fn record_rtt(&self, peer: &PeerId, elapsed: Duration) {
        self.peers.record_latency(peer, elapsed).await;
    }

    // ========================================================================
    // Iterative lookups
    // ========================================================================

    /// Iteratively find the `count` closest peers to a target id.
    ///
    /// Rounds are strictly sequential: each round queries up to `alpha` of
    /// the closest not-yet-queried candidates concurrently, folds their
    /// answers into the shortlist, and stops once a round surfaces nothing
    /// closer (convergence) or the deadline passes.
    pub async fn find_closest_peers(
        self: &Arc<Self>,
        target: [u8; 32],
        count: usize,
        lookup_timeout: Duration,
    ) -> Result<Vec<Contact>> {
        let deadline = Instant::now() + lookup_timeout;
        let mut seen: HashSet<PeerId> = HashSet::new();
        let mut queried: HashSet<PeerId> = HashSet::new();

        let mut shortlist = self.routing.closest(&target, self.config.k).await;
        for contact in &shortlist {
            seen.insert(contact.id);
        }

        let mut best_distance = shortlist
            .first()
            .map(|c| crate::identity::xor_distance(&c.id, &target))
            .unwrap_or([0xff; 32]);

        loop {
            let batch: Vec<Contact> = shortlist
                .iter()
                .filter(|c| !queried.contains(&c.id) && c.id != self.id)
                .take(self.config.alpha)
                .cloned()
                .collect();
            if batch.is_empty() {
                break; // converged: nothing left to ask
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::LookupTimedOut(lookup_timeout));
            }
            let per_rpc = remaining.min(self.config.request_timeout);

            for contact in &batch {
                queried.insert(contact.id);
            }

            let responses = join_all(batch.iter().map(|contact| {
                let network = Arc::clone(&self.network);
                let contact = contact.clone();
                async move {
                    let started = Instant::now();
                    let result = timeout(per_rpc, network.find_node(&contact, target)).await;
                    (contact, started.elapsed(), result)
                }
            }))
            .await;

            let mut any_closer = false;
            for (contact, elapsed, result) in responses {
                let nodes = match result {
                    Ok(Ok(nodes)) => {
                        self.record_rtt(&contact.id, elapsed).await;
                        self.observe_contact(contact.clone()).await;
                        nodes
                    }
                    Ok(Err(err)) => {
                        // Failed peers degrade the round, never the lookup.
                        debug!(peer = %fmt_id(&contact.id), %err, "lookup query failed");
                        continue;
                    }
                    Err(_) => {
                        debug!(peer = %fmt_id(&contact.id), "lookup query timed out");
                        continue;
                    }
                };

                for node in nodes {
                    if node.id == self.id {
                        continue;
                    }
                    if seen.insert(node.id) {
                        self.observe_contact(node.clone()).await;
                        shortlist.push(node);
                    }
                }
            }

            shortlist.sort_by(|a, b| cmp_by_distance(&a.id, &b.id, &target));
            shortlist.truncate(self.config.k.max(count));

            if let Some(first) = shortlist.first() {
                let new_best = crate::identity::xor_distance(&first.id, &target);
                if new_best < best_distance {
                    best_distance = new_best;
                    any_closer = true;
                }
            }

            if !any_closer {
                break; // converged: the round brought nothing closer
            }
        }

        shortlist.truncate(count);
        Ok(shortlist)
    }

    /// Iteratively look up a specific peer.
    ///
    /// Converging without finding the exact target is a valid outcome and
    /// returns `Ok(None)`, distinguishable from [`Error::LookupTimedOut`].
    pub async fn find_peer(
        self: &Arc<Self>,
        target: PeerId,
        lookup_timeout: Duration,
    ) -> Result<Option<PeerRecord>> {
        let closest = self
            .find_closest_peers(target, self.config.k, lookup_timeout)
            .await?;
        let Some(found) = closest.into_iter().find(|c| c.id == target) else {
            return Ok(None);
        };
        match self.peers.get(&target).await {
            Some(record) => Ok(Some(record)),
            None => Ok(Some(PeerRecord::from_contact(&found))),
        }
    }

    // ========================================================================
    // Content routing
    // ========================================================================

    /// Announce this node as a provider for a cid to the closest peers.
    ///
    /// Always succeeds locally; `announce_count` reports how far the
    /// announcement propagated so callers can detect degraded propagation.
    pub async fn provide(
        self: &Arc<Self>,
        cid: Cid,
        lookup_timeout: Duration,
    ) -> Result<ProvideReceipt> {
        self.providers.add_provider(cid, self.id).await;

        let closest = match self
            .find_closest_peers(cid, self.config.k, lookup_timeout)
            .await
        {
            Ok(contacts) => contacts,
            Err(err) if err.is_absence() => Vec::new(),
            Err(err) => return Err(err),
        };

        let announcements = join_all(closest.iter().map(|contact| {
            let network = Arc::clone(&self.network);
            let request_timeout = self.config.request_timeout;
            let contact = contact.clone();
            async move { timeout(request_timeout, network.provide(&contact, cid)).await }
        }))
        .await;

        let announce_count = announcements
            .iter()
            .filter(|outcome| matches!(outcome, Ok(Ok(()))))
            .count();
        if announce_count == 0 && !closest.is_empty() {
            warn!(cid = %fmt_id(&cid), "provide announcement reached no peers");
        }
        Ok(ProvideReceipt { announce_count })
    }

    /// Iteratively collect providers for a cid, stopping early at `limit`.
    pub async fn find_providers(
        self: &Arc<Self>,
        cid: Cid,
        lookup_timeout: Duration,
        limit: usize,
    ) -> Result<Vec<PeerId>> {
        if limit == 0 {
            return Err(Error::InvalidLimit);
        }
        let deadline = Instant::now() + lookup_timeout;

        let mut found: HashSet<PeerId> = self.providers.providers(&cid).await.into_iter().collect();
        found.remove(&self.id);

        let mut seen: HashSet<PeerId> = HashSet::new();
        let mut queried: HashSet<PeerId> = HashSet::new();
        let mut shortlist = self.routing.closest(&cid, self.config.k).await;
        for contact in &shortlist {
            seen.insert(contact.id);
        }

        if shortlist.is_empty() && found.is_empty() {
            return Err(Error::NoProviders { cid: fmt_id(&cid) });
        }

        let mut best_distance = shortlist
            .first()
            .map(|c| crate::identity::xor_distance(&c.id, &cid))
            .unwrap_or([0xff; 32]);

        while found.len() < limit {
            let batch: Vec<Contact> = shortlist
                .iter()
                .filter(|c| !queried.contains(&c.id) && c.id != self.id)
                .take(self.config.alpha)
                .cloned()
                .collect();
            if batch.is_empty() {
                break;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                if found.is_empty() {
                    return Err(Error::LookupTimedOut(lookup_timeout));
                }
                break;
            }
            let per_rpc = remaining.min(self.config.request_timeout);

            for contact in &batch {
                queried.insert(contact.id);
            }

            let responses = join_all(batch.iter().map(|contact| {
                let network = Arc::clone(&self.network);
                let contact = contact.clone();
                async move {
                    let started = Instant::now();
                    let result = timeout(per_rpc, network.find_providers(&contact, cid)).await;
                    (contact, started.elapsed(), result)
                }
            }))
            .await;

            let mut any_closer = false;
            for (contact, elapsed, result) in responses {
                let (providers, closer) = match result {
                    Ok(Ok(reply)) => {
                        self.record_rtt(&contact.id, elapsed).await;
                        self.observe_contact(contact.clone()).await;
                        reply
                    }
                    Ok(Err(err)) => {
                        debug!(peer = %fmt_id(&contact.id), %err, "provider query failed");
                        continue;
                    }
                    Err(_) => {
                        debug!(peer = %fmt_id(&contact.id), "provider query timed out");
                        continue;
                    }
                };

                for provider in providers {
                    self.observe_contact(provider.clone()).await;
                    self.providers.add_provider(cid, provider.id).await;
                    if provider.id != self.id {
                        found.insert(provider.id);
                    }
                }
                for node in closer {
                    if node.id != self.id && seen.insert(node.id) {
                        self.observe_contact(node.clone()).await;
                        shortlist.push(node);
                    }
                }
            }

            shortlist.sort_by(|a, b| cmp_by_distance(&a.id, &b.id, &cid));
            shortlist.truncate(self.config.k);

            if let Some(first) = shortlist.first() {
                let new_best = crate::identity::xor_distance(&first.id, &cid);
                if new_best < best_distance {
                    best_distance = new_best;
                    any_closer = true;
                }
            }
            if !any_closer {
                break;
            }
        }

        if found.is_empty() {
            return Err(Error::NoProviders { cid: fmt_id(&cid) });
        }
        let mut providers: Vec<PeerId> = found.into_iter().collect();
        providers.sort();
        providers.truncate(limit);
        Ok(providers)
    }

    // ========================================================================
    // Content exchange
    // ========================================================================

    /// Store content locally and announce this node as its provider.
    ///
    /// The supplied cid must equal the BLAKE3 hash of the data; mismatches
    /// are rejected rather than trusted.
    pub async fn announce(
        self: &Arc<Self>,
        cid: Cid,
        data: Vec<u8>,
        lookup_timeout: Duration,
    ) -> Result<ProvideReceipt> {
        if !verify_cid(&cid, &data) {
            return Err(Error::CidMismatch);
        }
        self.providers.set_size(cid, data.len()).await;
        self.store.put(cid, data).await;
        self.provide(cid, lookup_timeout).await
    }

    /// Retrieve content, falling back across providers.
    ///
    /// Providers are tried connected-first, then by lowest recorded latency;
    /// per-provider failures advance to the next candidate. Fails with
    /// [`Error::NoProviders`] when none are known and discovery finds none,
    /// or [`Error::ContentNotFound`] once every candidate has been tried.
    pub async fn fetch(self: &Arc<Self>, cid: Cid, fetch_timeout: Duration) -> Result<Vec<u8>> {
        if let Some(data) = self.store.get(&cid).await {
            return Ok(data);
        }
        let deadline = Instant::now() + fetch_timeout;

        let mut provider_ids: Vec<PeerId> = self
            .providers
            .providers(&cid)
            .await
            .into_iter()
            .filter(|id| *id != self.id)
            .collect();
        if provider_ids.is_empty() {
            provider_ids = self
                .find_providers(cid, fetch_timeout, self.config.k)
                .await?;
        }
        if provider_ids.is_empty() {
            return Err(Error::NoProviders { cid: fmt_id(&cid) });
        }

        let candidates = self.order_providers(provider_ids).await;
        if candidates.is_empty() {
            // Providers are known by id only; without an address there is
            // nothing to dial.
            return Err(Error::ContentNotFound { cid: fmt_id(&cid) });
        }

        for contact in candidates {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let per_rpc = remaining.min(self.config.request_timeout);
            let started = Instant::now();
            match timeout(per_rpc, self.network.fetch(&contact, cid)).await {
                Ok(Ok(Some(data))) => {
                    if !verify_cid(&cid, &data) {
                        warn!(
                            peer = %fmt_id(&contact.id),
                            cid = %fmt_id(&cid),
                            "provider returned data with mismatching hash"
                        );
                        continue;
                    }
                    self.record_rtt(&contact.id, started.elapsed()).await;
                    self.providers.set_size(cid, data.len()).await;
                    self.store.put(cid, data.clone()).await;
                    return Ok(data);
                }
                Ok(Ok(None)) => {
                    // The peer no longer holds the content.
                    self.providers.remove_provider(&cid, &contact.id).await;
                }
                Ok(Err(err)) => {
                    debug!(peer = %fmt_id(&contact.id), %err, "fetch attempt failed");
                }
                Err(_) => {
                    debug!(peer = %fmt_id(&contact.id), "fetch attempt timed out");
                }
            }
        }

        Err(Error::ContentNotFound { cid: fmt_id(&cid) })
    }

    /// Order provider candidates: connected peers first, then by lowest
    /// recorded latency, with raw id as the final deterministic key.
    async fn order_providers(&self, provider_ids: Vec<PeerId>) -> Vec<Contact> {
        let mut ranked: Vec<(bool, f32, PeerRecord)> = Vec::new();
        for id in provider_ids {
            let Some(record) = self.peers.get(&id).await else {
                continue;
            };
            if record.addresses.is_empty() {
                continue;
            }
            let connected = record.state == ConnectionState::Connected;
            let latency = record.latency_ms.unwrap_or(f32::MAX);
            ranked.push((connected, latency, record));
        }
        ranked.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then(a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| a.2.id.cmp(&b.2.id))
        });
        ranked.into_iter().map(|(_, _, record)| record.contact()).collect()
    }

    // ========================================================================
    // PubSub
    // ========================================================================

    /// Join a topic and announce interest to connected peers. Idempotent.
    pub async fn subscribe(self: &Arc<Self>, topic: &str) -> Subscription {
        let newly_joined = !self.pubsub.is_subscribed(topic).await;
        let subscription = self.pubsub.subscribe(topic).await;
        if newly_joined {
            self.broadcast_topic_interest(topic, true);
        }
        subscription
    }

    /// Leave a topic, dropping in-flight deliveries. Returns `false` when
    /// the node was not subscribed.
    pub async fn unsubscribe(self: &Arc<Self>, topic: &str) -> bool {
        let was_subscribed = self.pubsub.unsubscribe(topic).await;
        if was_subscribed {
            self.broadcast_topic_interest(topic, false);
        }
        was_subscribed
    }

    fn broadcast_topic_interest(self: &Arc<Self>, topic: &str, subscribed: bool) {
        let node = Arc::clone(self);
        let topic = topic.to_owned();
        tokio::spawn(async move {
            let connected = node.peers.list_connected().await;
            for record in connected {
                let contact = record.contact();
                let result = timeout(
                    node.config.request_timeout,
                    node.network.topic_interest(&contact, &topic, subscribed),
                )
                .await;
                if !matches!(result, Ok(Ok(()))) {
                    debug!(peer = %fmt_id(&contact.id), %topic, "topic interest announcement failed");
                }
            }
        });
    }

    /// Publish a message to a topic.
    ///
    /// Assigns a fresh message id, initiates fan-out to all peers known to
    /// subscribe to the topic, and returns without waiting for remote acks.
    pub async fn publish(self: &Arc<Self>, topic: &str, payload: Vec<u8>) -> Result<MessageId> {
        let message_id = self.pubsub.next_message_id(topic, &payload);
        // Suppress the echo when our own fan-out loops back.
        self.pubsub.mark_seen(topic, message_id).await;

        let message = GossipMessage {
            topic: topic.to_owned(),
            message_id,
            from: self.id,
            payload,
        };
        self.fan_out(message, None);
        Ok(message_id)
    }

    /// Forward a message to all known subscribers of its topic, excluding
    /// the peer it arrived from.
    fn fan_out(self: &Arc<Self>, message: GossipMessage, exclude: Option<PeerId>) {
        let node = Arc::clone(self);
        tokio::spawn(async move {
            let protocol = topic_protocol(&message.topic);
            let subscribers = node.peers.list_with_protocol(&protocol).await;
            let targets: Vec<Contact> = subscribers
                .iter()
                .filter(|record| {
                    record.id != message.from && Some(record.id) != exclude
                })
                .map(|record| record.contact())
                .collect();
            let deliveries = join_all(targets.iter().map(|contact| {
                let network = Arc::clone(&node.network);
                let message = message.clone();
                let request_timeout = node.config.request_timeout;
                async move { timeout(request_timeout, network.gossip(contact, message)).await }
            }))
            .await;
            let delivered = deliveries
                .iter()
                .filter(|outcome| matches!(outcome, Ok(Ok(()))))
                .count();
            debug!(
                topic = %message.topic,
                message = %fmt_id(&message.message_id),
                fanout = targets.len(),
                delivered,
                "gossip fan-out completed"
            );
        });
    }

    // ========================================================================
    // Inbound request handling
    // ========================================================================

    /// Handle an inbound `FindNode`: the closest known contacts to a target.
    pub async fn handle_find_node(self: &Arc<Self>, from: &Contact, target: PeerId) -> Vec<Contact> {
        self.observe_contact(from.clone()).await;
        self.routing.closest(&target, self.config.k).await
    }

    /// Handle an inbound `FindProviders`: known providers plus closer peers.
    pub async fn handle_find_providers(
        self: &Arc<Self>,
        from: &Contact,
        cid: Cid,
    ) -> (Vec<Contact>, Vec<Contact>) {
        self.observe_contact(from.clone()).await;
        let mut providers = Vec::new();
        for id in self.providers.providers(&cid).await {
            if id == self.id {
                providers.push(self.self_contact.clone());
            } else if let Some(record) = self.peers.get(&id).await {
                providers.push(record.contact());
            }
        }
        let closer = self.routing.closest(&cid, self.config.k).await;
        (providers, closer)
    }

    /// Handle an inbound `Provide` announcement.
    pub async fn handle_provide(self: &Arc<Self>, from: &Contact, cid: Cid) {
        self.observe_contact(from.clone()).await;
        self.providers.add_provider(cid, from.id).await;
    }

    /// Handle an inbound `Fetch`: local bytes, or `None` when not held.
    pub async fn handle_fetch(self: &Arc<Self>, from: &Contact, cid: Cid) -> Option<Vec<u8>> {
        self.observe_contact(from.clone()).await;
        self.store.get(&cid).await
    }

    /// Handle an inbound `Gossip`: dedup, deliver locally, re-forward.
    pub async fn handle_gossip(self: &Arc<Self>, from: &Contact, message: GossipMessage) {
        self.observe_contact(from.clone()).await;
        if self.pubsub.accept(&message).await {
            self.fan_out(message, Some(from.id));
        }
    }

    /// Handle an inbound `TopicInterest` announcement.
    pub async fn handle_topic_interest(
        self: &Arc<Self>,
        from: &Contact,
        topic: &str,
        subscribed: bool,
    ) {
        self.observe_contact(from.clone()).await;
        let protocol = topic_protocol(topic);
        if subscribed {
            self.peers.add_protocol(&from.id, &protocol).await;
        } else {
            self.peers.remove_protocol(&from.id, &protocol).await;
        }
    }

    /// Handle an inbound `Custom` payload: dispatch to registered handlers.
    pub async fn handle_custom(
        self: &Arc<Self>,
        from: &Contact,
        protocol_id: &str,
        payload: &[u8],
    ) -> usize {
        self.observe_contact(from.clone()).await;
        self.handlers.invoke(protocol_id, from, payload).await
    }

    /// Handle an inbound `Ping`.
    pub async fn handle_ping(self: &Arc<Self>, from: &Contact) {
        self.observe_contact(from.clone()).await;
    }

    // ========================================================================
    // Status
    // ========================================================================

    /// Aggregate a health/status snapshot.
    pub async fn status(&self) -> NodeStatus {
        NodeStatus {
            id: fmt_id(&self.id),
            connected_peers: self.peers.list_connected().await.len(),
            known_peers: self.peers.len().await,
            routing_entries: self.routing.len().await,
            stored_content: self.store.len().await,
            provider_records: self.providers.len().await,
            subscribed_topics: self.pubsub.subscribed_topics().await,
            protocols: self.handlers.protocols().await,
        }
    }
}

// ============================================================================
// Facade
// ============================================================================

/// Single entry point composing the node's operations for external callers.
///
/// The facade wraps the node by composition; instrumentation is a `tracing`
/// event per completed operation rather than a second override layer.
pub struct Facade<N: Network> {
    inner: Arc<Node<N>>,
}

impl<N: Network> Clone for Facade<N> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<N: Network> Facade<N> {
    /// Wrap a node.
    pub fn new(node: Node<N>) -> Self {
        Self {
            inner: Arc::new(node),
        }
    }

    /// The underlying node, for server wiring.
    pub fn node(&self) -> Arc<Node<N>> {
        Arc::clone(&self.inner)
    }

    /// This node's contact information.
    pub fn contact(&self) -> Contact {
        self.inner.self_contact.clone()
    }

    /// This node's identifier.
    pub fn peer_id(&self) -> PeerId {
        self.inner.id
    }

    /// Dial an address, learn the identity of the peer behind it, and record
    /// it as connected.
    pub async fn dial(&self, addr: &str, dial_timeout: Duration) -> Result<Contact> {
        let started = Instant::now();
        let contact = self.inner.network.dial(addr, dial_timeout).await?;
        self.inner.observe_contact(contact.clone()).await;
        self.inner
            .peers
            .set_state(&contact.id, ConnectionState::Connected)
            .await;
        info!(
            peer = %fmt_id(&contact.id),
            %addr,
            elapsed = ?started.elapsed(),
            "dial completed"
        );
        Ok(contact)
    }

    /// Mark a peer disconnected.
    pub async fn disconnect(&self, peer: &PeerId) {
        self.inner
            .peers
            .set_state(peer, ConnectionState::Disconnected)
            .await;
        info!(peer = %fmt_id(peer), "peer disconnected");
    }

    /// See [`Node::find_peer`].
    pub async fn find_peer(
        &self,
        target: PeerId,
        lookup_timeout: Duration,
    ) -> Result<Option<PeerRecord>> {
        let started = Instant::now();
        let outcome = self.inner.find_peer(target, lookup_timeout).await;
        debug!(
            target = %fmt_id(&target),
            elapsed = ?started.elapsed(),
            found = matches!(outcome, Ok(Some(_))),
            "find_peer completed"
        );
        outcome
    }

    /// See [`Node::find_closest_peers`].
    pub async fn find_closest_peers(
        &self,
        target: PeerId,
        count: usize,
        lookup_timeout: Duration,
    ) -> Result<Vec<Contact>> {
        self.inner
            .find_closest_peers(target, count, lookup_timeout)
            .await
    }

    /// See [`Node::provide`].
    pub async fn provide(&self, cid: Cid, lookup_timeout: Duration) -> Result<ProvideReceipt> {
        let started = Instant::now();
        let outcome = self.inner.provide(cid, lookup_timeout).await;
        debug!(
            cid = %fmt_id(&cid),
            elapsed = ?started.elapsed(),
            announced = outcome.as_ref().map(|r| r.announce_count).unwrap_or(0),
            "provide completed"
        );
        outcome
    }

    /// See [`Node::find_providers`].
    pub async fn find_providers(
        &self,
        cid: Cid,
        lookup_timeout: Duration,
        limit: usize,
    ) -> Result<Vec<PeerId>> {
        self.inner.find_providers(cid, lookup_timeout, limit).await
    }

    /// See [`Node::announce`].
    pub async fn announce(
        &self,
        cid: Cid,
        data: Vec<u8>,
        lookup_timeout: Duration,
    ) -> Result<ProvideReceipt> {
        self.inner.announce(cid, data, lookup_timeout).await
    }

    /// See [`Node::fetch`].
    pub async fn fetch(&self, cid: Cid, fetch_timeout: Duration) -> Result<Vec<u8>> {
        let started = Instant::now();
        let outcome = self.inner.fetch(cid, fetch_timeout).await;
        debug!(
            cid = %fmt_id(&cid),
            elapsed = ?started.elapsed(),
            ok = outcome.is_ok(),
            "fetch completed"
        );
        outcome
    }

    /// See [`Node::subscribe`].
    pub async fn subscribe(&self, topic: &str) -> Subscription {
        self.inner.subscribe(topic).await
    }

    /// See [`Node::unsubscribe`].
    pub async fn unsubscribe(&self, topic: &str) -> bool {
        self.inner.unsubscribe(topic).await
    }

    /// See [`Node::publish`].
    pub async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<MessageId> {
        self.inner.publish(topic, payload).await
    }

    /// Bind a custom protocol handler.
    pub async fn register_handler(
        &self,
        handler_id: &str,
        protocol_id: &str,
        description: &str,
        callback: HandlerFn,
    ) -> Result<()> {
        self.inner
            .handlers
            .register(handler_id, protocol_id, description, callback)
            .await
    }

    /// Remove a custom protocol handler.
    pub async fn unregister_handler(&self, handler_id: &str, protocol_id: &str) -> Result<()> {
        self.inner.handlers.unregister(handler_id, protocol_id).await
    }

    /// Registered handler metadata.
    pub async fn list_handlers(&self) -> Vec<ProtocolHandler> {
        self.inner.handlers.list().await
    }

    /// Aggregated status snapshot.
    pub async fn status(&self) -> NodeStatus {
        self.inner.status().await
    }
}
