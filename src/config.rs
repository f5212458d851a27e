//! Node configuration and startup capabilities.
//!
//! A [`NodeConfig`] is assembled once by the embedding application and treated
//! as an immutable snapshot for the process lifetime. [`Capabilities`] is
//! produced once at startup by probing the environment and is passed to the
//! components that need it; no component queries ambient global state.

use std::path::PathBuf;
use std::time::Duration;

/// Default bucket size and replication factor.
pub const K_DEFAULT: usize = 20;

/// Default parallelism for concurrent lookup rounds.
pub const ALPHA_DEFAULT: usize = 3;

/// Default per-request network timeout.
pub const REQUEST_TIMEOUT_DEFAULT: Duration = Duration::from_secs(10);

/// Default byte budget for the local content cache (64 MiB).
pub const CACHE_BUDGET_DEFAULT: usize = 64 * 1024 * 1024;

/// Default capacity of the pubsub duplicate-suppression window.
pub const SEEN_WINDOW_DEFAULT: usize = 1024;

/// Default TTL after which disconnected peers without a renewed sighting
/// are evicted from the peer store.
pub const PEER_TTL_DEFAULT: Duration = Duration::from_secs(30 * 60);

/// Default UDP port for local-network discovery probes.
pub const LOCAL_PROBE_PORT_DEFAULT: u16 = 48448;

/// Immutable configuration snapshot supplied at startup.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// TCP addresses to listen on, e.g. `0.0.0.0:4001`.
    pub listen_addrs: Vec<String>,
    /// Well-known peer addresses used to join the network.
    pub bootstrap: Vec<String>,
    /// Path to a persisted identity keypair. `None` generates a fresh one.
    pub identity_path: Option<PathBuf>,
    /// Bucket size / replication factor.
    pub k: usize,
    /// Lookup concurrency per round.
    pub alpha: usize,
    /// Timeout applied to individual peer RPCs.
    pub request_timeout: Duration,
    /// Byte budget for the local content cache.
    pub cache_budget_bytes: usize,
    /// Capacity of each subscription's message-id dedup window.
    pub seen_window: usize,
    /// TTL for disconnected peer records.
    pub peer_ttl: Duration,
    /// UDP port used for local-network discovery broadcasts.
    pub local_probe_port: u16,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addrs: vec!["0.0.0.0:4001".to_owned()],
            bootstrap: Vec::new(),
            identity_path: None,
            k: K_DEFAULT,
            alpha: ALPHA_DEFAULT,
            request_timeout: REQUEST_TIMEOUT_DEFAULT,
            cache_budget_bytes: CACHE_BUDGET_DEFAULT,
            seen_window: SEEN_WINDOW_DEFAULT,
            peer_ttl: PEER_TTL_DEFAULT,
            local_probe_port: LOCAL_PROBE_PORT_DEFAULT,
        }
    }
}

/// What the environment supports, probed once at startup.
///
/// Replaces ambient "is the stack available" flags: components receive this
/// value by reference instead of consulting globals.
#[derive(Clone, Copy, Debug)]
pub struct Capabilities {
    /// TCP transport could be initialized.
    pub transport: bool,
    /// UDP local-network probing could be initialized.
    pub local_probe: bool,
}

impl Capabilities {
    /// Capabilities for a fully functional environment.
    pub fn full() -> Self {
        Self {
            transport: true,
            local_probe: true,
        }
    }
}
