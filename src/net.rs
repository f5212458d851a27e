//! Transport layer: the [`Network`] RPC seam and its TCP implementation.
//!
//! The core node logic only talks to [`Network`], so tests can drive it with
//! an in-memory mock while production uses [`TcpNetwork`]: one framed JSON
//! request/response exchange per TCP connection, plus a UDP broadcast probe
//! for local-network discovery.

use std::net::Ipv4Addr;

use async_trait::async_trait;
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::{timeout, Duration, Instant};

use crate::error::{Error, Result};
use crate::framing::{read_frame, write_frame};
use crate::identity::{Cid, Contact, PeerId};
use crate::protocol::{Envelope, MessageKind};
use crate::pubsub::GossipMessage;

/// RPC surface between peers.
///
/// Implementations must tolerate concurrent calls; the node fans out lookup
/// rounds across several peers at once.
#[async_trait]
pub trait Network: Send + Sync + 'static {
    /// Dial an address and learn the identity of whoever answers.
    ///
    /// Used for bootstrap addresses, where only the address is known up front.
    async fn dial(&self, addr: &str, dial_timeout: Duration) -> Result<Contact>;

    /// Liveness check; the reply identifies the responding peer.
    async fn ping(&self, to: &Contact) -> Result<Contact>;

    /// Ask a peer for its closest known contacts to a target id.
    async fn find_node(&self, to: &Contact, target: PeerId) -> Result<Vec<Contact>>;

    /// Ask a peer for providers of a cid. Returns (providers, closer peers).
    async fn find_providers(&self, to: &Contact, cid: Cid) -> Result<(Vec<Contact>, Vec<Contact>)>;

    /// Announce ourselves to a peer as a provider for a cid.
    async fn provide(&self, to: &Contact, cid: Cid) -> Result<()>;

    /// Request content bytes from a peer. `None` means the peer does not hold
    /// the content; that is a response, not a transport failure.
    async fn fetch(&self, to: &Contact, cid: Cid) -> Result<Option<Vec<u8>>>;

    /// Forward a pubsub message to a peer.
    async fn gossip(&self, to: &Contact, message: GossipMessage) -> Result<()>;

    /// Tell a peer about our interest (or lost interest) in a topic.
    async fn topic_interest(&self, to: &Contact, topic: &str, subscribed: bool) -> Result<()>;

    /// Send a custom-protocol payload to a peer.
    async fn custom(&self, to: &Contact, protocol_id: &str, payload: Vec<u8>) -> Result<()>;

    /// Broadcast a discovery probe on the local subnet and collect responders
    /// for the given window. Implementations without broadcast support return
    /// an empty list.
    async fn local_probe(&self, window: Duration) -> Result<Vec<Contact>>;
}

/// TCP/UDP implementation of [`Network`].
pub struct TcpNetwork {
    /// Contact info for the local node, included in every request.
    self_contact: Contact,
    /// Timeout applied to each request/response exchange.
    request_timeout: Duration,
    /// UDP port used for local-network probes.
    probe_port: u16,
}

impl TcpNetwork {
    pub fn new(self_contact: Contact, request_timeout: Duration, probe_port: u16) -> Self {
        Self {
            self_contact,
            request_timeout,
            probe_port,
        }
    }

    /// Open an outbound connection with dial-specific error mapping.
    async fn connect(&self, addr: &str, dial_timeout: Duration) -> Result<TcpStream> {
        match timeout(dial_timeout, TcpStream::connect(addr)).await {
            Err(_) => Err(Error::DialTimeout {
                addr: addr.to_owned(),
                timeout: dial_timeout,
            }),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                Err(Error::DialRefused {
                    addr: addr.to_owned(),
                    source: e,
                })
            }
            Ok(Err(e)) => Err(Error::Io(e)),
            Ok(Ok(stream)) => Ok(stream),
        }
    }

    /// One framed request/response exchange against an address.
    async fn request_addr(&self, addr: &str, kind: MessageKind) -> Result<Envelope> {
        let mut stream = self.connect(addr, self.request_timeout).await?;
        let envelope = Envelope {
            from: self.self_contact.clone(),
            kind,
        };
        let bytes = serde_json::to_vec(&envelope)?;

        let exchange = async {
            write_frame(&mut stream, &bytes).await?;
            let reply = read_frame(&mut stream).await?.ok_or_else(|| {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed before response",
                ))
            })?;
            Ok::<Envelope, Error>(serde_json::from_slice(&reply)?)
        };

        match timeout(self.request_timeout, exchange).await {
            Err(_) => Err(Error::DialTimeout {
                addr: addr.to_owned(),
                timeout: self.request_timeout,
            }),
            Ok(result) => result,
        }
    }

    async fn request(&self, to: &Contact, kind: MessageKind) -> Result<Envelope> {
        self.request_addr(&to.addr, kind).await
    }

    async fn dial_addr(&self, addr: &str, dial_timeout: Duration) -> Result<Contact> {
        let mut stream = self.connect(addr, dial_timeout).await?;
        let envelope = Envelope {
            from: self.self_contact.clone(),
            kind: MessageKind::Ping,
        };
        let bytes = serde_json::to_vec(&envelope)?;

        let exchange = async {
            write_frame(&mut stream, &bytes).await?;
            let reply = read_frame(&mut stream).await?.ok_or_else(|| {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed before handshake reply",
                ))
            })?;
            let envelope: Envelope = serde_json::from_slice(&reply)?;
            Ok::<Contact, Error>(envelope.from)
        };

        match timeout(dial_timeout, exchange).await {
            Err(_) => Err(Error::DialTimeout {
                addr: addr.to_owned(),
                timeout: dial_timeout,
            }),
            Ok(result) => result,
        }
    }

    fn unexpected_reply(kind: &MessageKind) -> Error {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("unexpected reply: {kind:?}"),
        ))
    }
}

#[async_trait]
impl Network for TcpNetwork {
    async fn dial(&self, addr: &str, dial_timeout: Duration) -> Result<Contact> {
        self.dial_addr(addr, dial_timeout).await
    }

    async fn ping(&self, to: &Contact) -> Result<Contact> {
        let reply = self.request(to, MessageKind::Ping).await?;
        match reply.kind {
            MessageKind::Pong => Ok(reply.from),
            other => Err(Self::unexpected_reply(&other)),
        }
    }

    async fn find_node(&self, to: &Contact, target: PeerId) -> Result<Vec<Contact>> {
        let reply = self.request(to, MessageKind::FindNode { target }).await?;
        match reply.kind {
            MessageKind::Nodes { nodes } => Ok(nodes),
            other => Err(Self::unexpected_reply(&other)),
        }
    }

    async fn find_providers(&self, to: &Contact, cid: Cid) -> Result<(Vec<Contact>, Vec<Contact>)> {
        let reply = self.request(to, MessageKind::FindProviders { cid }).await?;
        match reply.kind {
            MessageKind::Providers { providers, closer } => Ok((providers, closer)),
            other => Err(Self::unexpected_reply(&other)),
        }
    }

    async fn provide(&self, to: &Contact, cid: Cid) -> Result<()> {
        let reply = self.request(to, MessageKind::Provide { cid }).await?;
        match reply.kind {
            MessageKind::Ack => Ok(()),
            other => Err(Self::unexpected_reply(&other)),
        }
    }

    async fn fetch(&self, to: &Contact, cid: Cid) -> Result<Option<Vec<u8>>> {
        let reply = self.request(to, MessageKind::Fetch { cid }).await?;
        match reply.kind {
            MessageKind::Block { data, .. } => Ok(data),
            other => Err(Self::unexpected_reply(&other)),
        }
    }

    async fn gossip(&self, to: &Contact, message: GossipMessage) -> Result<()> {
        let reply = self.request(to, MessageKind::Gossip { message }).await?;
        match reply.kind {
            MessageKind::Ack => Ok(()),
            other => Err(Self::unexpected_reply(&other)),
        }
    }

    async fn topic_interest(&self, to: &Contact, topic: &str, subscribed: bool) -> Result<()> {
        let reply = self
            .request(
                to,
                MessageKind::TopicInterest {
                    topic: topic.to_owned(),
                    subscribed,
                },
            )
            .await?;
        match reply.kind {
            MessageKind::Ack => Ok(()),
            other => Err(Self::unexpected_reply(&other)),
        }
    }

    async fn custom(&self, to: &Contact, protocol_id: &str, payload: Vec<u8>) -> Result<()> {
        let reply = self
            .request(
                to,
                MessageKind::Custom {
                    protocol_id: protocol_id.to_owned(),
                    payload,
                },
            )
            .await?;
        match reply.kind {
            MessageKind::Ack => Ok(()),
            other => Err(Self::unexpected_reply(&other)),
        }
    }

    async fn local_probe(&self, window: Duration) -> Result<Vec<Contact>> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket.set_broadcast(true)?;

        let probe = serde_json::to_vec(&Envelope {
            from: self.self_contact.clone(),
            kind: MessageKind::Ping,
        })?;
        socket
            .send_to(&probe, (Ipv4Addr::BROADCAST, self.probe_port))
            .await?;

        let deadline = Instant::now() + window;
        let mut found = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match timeout(remaining, socket.recv_from(&mut buf)).await {
                Ok(Ok((len, _))) => {
                    if let Ok(envelope) = serde_json::from_slice::<Envelope>(&buf[..len]) {
                        if envelope.from.id != self.self_contact.id {
                            found.push(envelope.from);
                        }
                    }
                }
                Ok(Err(_)) | Err(_) => break,
            }
        }
        Ok(found)
    }
}
