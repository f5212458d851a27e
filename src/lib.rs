//! # kadmesh
//!
//! A Kademlia-style peer discovery and content exchange mesh. The crate
//! implements the full behavioral core itself: XOR-distance routing over
//! fixed-capacity buckets, iterative lookups for peers and content
//! providers, a provider index with timeout-and-fallback content retrieval,
//! topic-based pubsub with message deduplication, and a registry for custom
//! request/response protocols.
//!
//! The crate is split into modules that can be reused independently:
//!
//! - [`identity`]: keypair identities, content addressing, and the XOR
//!   distance metric.
//! - [`peer_store`]: the concurrent registry of known peers and their
//!   liveness metadata.
//! - [`routing`]: the Kademlia routing table with ping-before-evict buckets.
//! - [`content`]: the provider index and the byte-budget LRU content store.
//! - [`pubsub`]: topic subscriptions and duplicate suppression.
//! - [`handlers`]: the custom protocol handler registry.
//! - [`discovery`]: bootstrap, local-network, and random-walk discovery.
//! - [`node`]: the [`Node`] state machine and the [`Facade`] entry point.
//! - [`net`]: the [`Network`] RPC seam and its TCP implementation.
//! - [`protocol`] / [`framing`] / [`server`]: the wire vocabulary,
//!   length-prefixed frames, and the inbound dispatch loop.
//!
//! ## Getting started
//!
//! Construct a [`NodeConfig`], an identity, and a network, then wrap the
//! node in a [`Facade`]:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use kadmesh::{
//!     Capabilities, Contact, Facade, Keypair, Node, NodeConfig, TcpNetwork,
//! };
//!
//! # async fn launch() -> kadmesh::Result<()> {
//! let config = NodeConfig::default();
//! let keypair = Keypair::generate()?;
//! let self_contact = Contact {
//!     id: keypair.peer_id(),
//!     addr: "127.0.0.1:4001".to_owned(),
//! };
//! let network = TcpNetwork::new(
//!     self_contact.clone(),
//!     config.request_timeout,
//!     config.local_probe_port,
//! );
//! let facade = Facade::new(Node::new(
//!     keypair.peer_id(),
//!     self_contact,
//!     network,
//!     config,
//!     Capabilities::full(),
//! ));
//! let runtime = kadmesh::server::start(facade.node()).await?;
//! // The node now accepts connections; drive discovery and lookups
//! // through the facade.
//! # drop(runtime);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod content;
pub mod discovery;
pub mod error;
pub mod framing;
pub mod handlers;
pub mod identity;
pub mod net;
pub mod node;
pub mod peer_store;
pub mod protocol;
pub mod pubsub;
pub mod routing;
pub mod server;

pub use config::{Capabilities, NodeConfig};
pub use content::{ContentIndex, ContentRecord, ContentStore};
pub use discovery::DiscoveryMethod;
pub use error::{Error, Result};
pub use handlers::{HandlerFn, HandlerRegistry, ProtocolHandler};
pub use identity::{
    derive_peer_id, hash_content, verify_cid, xor_distance, Cid, Contact, Keypair, PeerId,
};
pub use net::{Network, TcpNetwork};
pub use node::{Facade, Node, NodeStatus, ProvideReceipt};
pub use peer_store::{ConnectionState, PeerRecord, PeerStore};
pub use pubsub::{GossipMessage, MessageId, PubSub, Subscription};
pub use routing::RoutingTable;
