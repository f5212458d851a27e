//! Demonstration mesh node binary.
//!
//! Starts a node with TCP listeners and local-network discovery, joins the
//! network through any bootstrap addresses given on the command line, and
//! prints a status snapshot periodically.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- [bootstrap-addr ...]
//! ```

use std::path::PathBuf;

use anyhow::Result;
use tokio::time::{self, Duration};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use kadmesh::{
    Capabilities, Contact, DiscoveryMethod, Facade, Keypair, Node, NodeConfig, TcpNetwork,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut config = NodeConfig {
        bootstrap: std::env::args().skip(1).collect(),
        ..NodeConfig::default()
    };
    if let Ok(path) = std::env::var("KADMESH_IDENTITY") {
        config.identity_path = Some(PathBuf::from(path));
    }

    // A persisted identity keeps the peer id stable across restarts. The
    // first run creates the file; a corrupt file on later runs is fatal.
    let keypair = match &config.identity_path {
        Some(path) if path.exists() => Keypair::load(path)?,
        Some(path) => {
            let keypair = Keypair::generate()?;
            keypair.save(path)?;
            keypair
        }
        None => Keypair::generate()?,
    };

    let self_contact = Contact {
        id: keypair.peer_id(),
        addr: config
            .listen_addrs
            .first()
            .cloned()
            .unwrap_or_else(|| "127.0.0.1:4001".to_owned()),
    };
    info!(peer = %hex::encode(keypair.peer_id()), addr = %self_contact.addr, "starting node");

    let network = TcpNetwork::new(
        self_contact.clone(),
        config.request_timeout,
        config.local_probe_port,
    );
    let facade = Facade::new(Node::new(
        keypair.peer_id(),
        self_contact,
        network,
        config.clone(),
        Capabilities::full(),
    ));

    let runtime = kadmesh::server::start(facade.node()).await?;
    for failure in &runtime.bind_failures {
        warn!(%failure, "listen address unavailable");
    }
    for addr in runtime.listen.local_addrs() {
        info!(%addr, "listening");
    }

    // Join the network through whatever sources are available.
    let node = facade.node();
    let methods = [
        DiscoveryMethod::Bootstrap,
        DiscoveryMethod::LocalNetwork,
        DiscoveryMethod::DhtRandomWalk,
    ];
    match node
        .discover(&methods, config.k, Duration::from_secs(30))
        .await
    {
        Ok(peers) => info!(count = peers.len(), "initial discovery finished"),
        Err(err) => warn!(%err, "initial discovery failed"),
    }

    // Periodic status snapshot.
    let status_facade = facade.clone();
    let status_task = tokio::spawn(async move {
        let mut ticker = time::interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;
            let status = status_facade.status().await;
            info!(
                connected = status.connected_peers,
                known = status.known_peers,
                routing = status.routing_entries,
                content = status.stored_content,
                topics = status.subscribed_topics.len(),
                "status"
            );
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    status_task.abort();
    runtime.shutdown();
    Ok(())
}
