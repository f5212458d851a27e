//! Inbound side of the transport: TCP accept loops, the UDP probe responder,
//! and background maintenance.
//!
//! Each inbound TCP connection carries one framed request/response exchange,
//! dispatched onto the node's `handle_*` entry points.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::framing::{read_frame, write_frame};
use crate::net::Network;
use crate::node::Node;
use crate::protocol::{Envelope, MessageKind};

/// How often expired peers are pruned from the store.
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

/// Bound listener sockets; closing aborts their accept loops.
pub struct ListenHandle {
    local_addrs: Vec<SocketAddr>,
    tasks: Vec<JoinHandle<()>>,
}

impl ListenHandle {
    /// The addresses that were actually bound.
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.local_addrs
    }

    /// Stop accepting connections and release the sockets.
    pub fn close(mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for ListenHandle {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

/// Result of binding the configured listen addresses.
///
/// Binding is per address: some may succeed while others fail, and both
/// halves are reported rather than collapsing to all-or-nothing.
pub struct BindReport {
    /// Accept loops for the addresses that bound.
    pub handle: ListenHandle,
    /// One [`Error::Bind`] per address that could not be bound.
    pub failures: Vec<Error>,
}

/// Bind every listen address and spawn an accept loop per bound socket.
pub async fn bind_all<N: Network>(node: Arc<Node<N>>, addrs: &[String]) -> BindReport {
    let mut local_addrs = Vec::new();
    let mut tasks = Vec::new();
    let mut failures = Vec::new();

    for addr in addrs {
        match TcpListener::bind(addr).await {
            Ok(listener) => {
                match listener.local_addr() {
                    Ok(local) => local_addrs.push(local),
                    Err(e) => {
                        failures.push(Error::Bind {
                            addr: addr.clone(),
                            source: e,
                        });
                        continue;
                    }
                }
                let node = Arc::clone(&node);
                tasks.push(tokio::spawn(async move {
                    accept_loop(node, listener).await;
                }));
            }
            Err(e) => {
                failures.push(Error::Bind {
                    addr: addr.clone(),
                    source: e,
                });
            }
        }
    }

    info!(
        bound = local_addrs.len(),
        failed = failures.len(),
        "listeners started"
    );
    BindReport {
        handle: ListenHandle { local_addrs, tasks },
        failures,
    }
}

async fn accept_loop<N: Network>(node: Arc<Node<N>>, listener: TcpListener) {
    loop {
        match listener.accept().await {
            Ok((stream, remote)) => {
                let node = Arc::clone(&node);
                tokio::spawn(async move {
                    if let Err(err) = handle_connection(node, stream).await {
                        debug!(%remote, %err, "inbound connection failed");
                    }
                });
            }
            Err(err) => {
                warn!(%err, "accept failed");
            }
        }
    }
}

/// Serve one framed request/response exchange on an inbound connection.
pub async fn handle_connection<N: Network>(node: Arc<Node<N>>, mut stream: TcpStream) -> Result<()> {
    let Some(bytes) = read_frame(&mut stream).await? else {
        return Ok(());
    };
    let request: Envelope = serde_json::from_slice(&bytes)?;
    let from = request.from.clone();

    let reply_kind = match request.kind {
        MessageKind::Ping => {
            node.handle_ping(&from).await;
            MessageKind::Pong
        }
        MessageKind::FindNode { target } => {
            let nodes = node.handle_find_node(&from, target).await;
            MessageKind::Nodes { nodes }
        }
        MessageKind::FindProviders { cid } => {
            let (providers, closer) = node.handle_find_providers(&from, cid).await;
            MessageKind::Providers { providers, closer }
        }
        MessageKind::Provide { cid } => {
            node.handle_provide(&from, cid).await;
            MessageKind::Ack
        }
        MessageKind::Fetch { cid } => {
            let data = node.handle_fetch(&from, cid).await;
            MessageKind::Block { cid, data }
        }
        MessageKind::Gossip { message } => {
            node.handle_gossip(&from, message).await;
            MessageKind::Ack
        }
        MessageKind::TopicInterest { topic, subscribed } => {
            node.handle_topic_interest(&from, &topic, subscribed).await;
            MessageKind::Ack
        }
        MessageKind::Custom {
            protocol_id,
            payload,
        } => {
            node.handle_custom(&from, &protocol_id, &payload).await;
            MessageKind::Ack
        }
        // Response bodies arriving as requests get a bare Pong so the peer
        // learns we are alive without leaking routing state.
        MessageKind::Pong
        | MessageKind::Nodes { .. }
        | MessageKind::Providers { .. }
        | MessageKind::Block { .. }
        | MessageKind::Ack => MessageKind::Pong,
    };

    let reply = Envelope {
        from: node.self_contact.clone(),
        kind: reply_kind,
    };
    write_frame(&mut stream, &serde_json::to_vec(&reply)?).await?;
    Ok(())
}

/// Answer UDP discovery probes from the local subnet with our contact info.
pub async fn spawn_probe_responder<N: Network>(
    node: Arc<Node<N>>,
    port: u16,
) -> Result<JoinHandle<()>> {
    let socket = UdpSocket::bind(("0.0.0.0", port))
        .await
        .map_err(|e| Error::Bind {
            addr: format!("udp/0.0.0.0:{port}"),
            source: e,
        })?;

    Ok(tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        loop {
            let Ok((len, remote)) = socket.recv_from(&mut buf).await else {
                break;
            };
            let Ok(request) = serde_json::from_slice::<Envelope>(&buf[..len]) else {
                continue;
            };
            if request.from.id == node.id || !matches!(request.kind, MessageKind::Ping) {
                continue;
            }
            node.observe_contact(request.from).await;
            let reply = Envelope {
                from: node.self_contact.clone(),
                kind: MessageKind::Pong,
            };
            if let Ok(bytes) = serde_json::to_vec(&reply) {
                let _ = socket.send_to(&bytes, remote).await;
            }
        }
    }))
}

/// Periodically evict expired disconnected peers from the store and any
/// routing-table entries that point at them.
pub fn spawn_maintenance<N: Network>(node: Arc<Node<N>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(MAINTENANCE_INTERVAL);
        loop {
            ticker.tick().await;
            let evicted = node.peers().prune(node.config().peer_ttl).await;
            if !evicted.is_empty() {
                for id in &evicted {
                    node.routing.remove(id).await;
                }
                debug!(evicted = evicted.len(), "pruned expired peers");
            }
        }
    })
}

/// Everything `start` spawned; shut down by dropping or calling `shutdown`.
pub struct Runtime {
    /// Listener sockets and their accept loops.
    pub listen: ListenHandle,
    /// Per-address bind failures (partial success is expected).
    pub bind_failures: Vec<Error>,
    probe: Option<JoinHandle<()>>,
    maintenance: JoinHandle<()>,
}

impl Runtime {
    /// Stop all background tasks and release sockets.
    pub fn shutdown(self) {
        if let Some(probe) = self.probe {
            probe.abort();
        }
        self.maintenance.abort();
        self.listen.close();
    }
}

/// Start the node's inbound side: listeners, probe responder, maintenance.
///
/// Fails with [`Error::DependencyUnavailable`] when the startup capability
/// probe found no usable transport.
pub async fn start<N: Network>(node: Arc<Node<N>>) -> Result<Runtime> {
    let capabilities = node.capabilities();
    if !capabilities.transport {
        return Err(Error::DependencyUnavailable(
            "no usable transport".to_owned(),
        ));
    }

    let config = node.config().clone();
    let report = bind_all(Arc::clone(&node), &config.listen_addrs).await;
    for failure in &report.failures {
        warn!(%failure, "listen address failed to bind");
    }

    let probe = if capabilities.local_probe {
        match spawn_probe_responder(Arc::clone(&node), config.local_probe_port).await {
            Ok(task) => Some(task),
            Err(err) => {
                warn!(%err, "probe responder unavailable");
                None
            }
        }
    } else {
        None
    };

    let maintenance = spawn_maintenance(Arc::clone(&node));

    Ok(Runtime {
        listen: report.handle,
        bind_failures: report.failures,
        probe,
        maintenance,
    })
}
