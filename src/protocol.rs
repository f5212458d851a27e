//! Wire message vocabulary exchanged between peers.
//!
//! Every request carries the sender's [`Contact`] so the receiver can fold
//! the sighting into its routing table. The framing is one request/response
//! exchange per connection; see [`crate::framing`].

use serde::{Deserialize, Serialize};

use crate::identity::{Cid, Contact, PeerId};
use crate::pubsub::GossipMessage;

/// A framed message: the sender plus the request or response body.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    /// The sending peer.
    pub from: Contact,
    /// Request or response body.
    pub kind: MessageKind,
}

/// Request and response bodies.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum MessageKind {
    /// Liveness check and identity handshake.
    Ping,
    /// Reply to `Ping`; the envelope's `from` tells the caller who answered.
    Pong,
    /// Ask for the closest known contacts to a target id.
    FindNode { target: PeerId },
    /// Reply to `FindNode`.
    Nodes { nodes: Vec<Contact> },
    /// Ask for providers of a content id, or closer contacts.
    FindProviders { cid: Cid },
    /// Reply to `FindProviders`.
    Providers {
        providers: Vec<Contact>,
        closer: Vec<Contact>,
    },
    /// Announce the sender as a provider for a content id.
    Provide { cid: Cid },
    /// Request content bytes.
    Fetch { cid: Cid },
    /// Reply to `Fetch`; `data` is `None` when the content is not held.
    Block { cid: Cid, data: Option<Vec<u8>> },
    /// Forward a pubsub message.
    Gossip { message: GossipMessage },
    /// Announce (or retract) the sender's interest in a topic.
    TopicInterest { topic: String, subscribed: bool },
    /// Payload for a registered custom protocol.
    Custom { protocol_id: String, payload: Vec<u8> },
    /// Generic acknowledgement.
    Ack,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_survives_serialization() {
        let envelope = Envelope {
            from: Contact {
                id: [3u8; 32],
                addr: "10.0.0.3:4001".to_owned(),
            },
            kind: MessageKind::FindProviders { cid: [7u8; 32] },
        };

        let bytes = serde_json::to_vec(&envelope).expect("serialize");
        let decoded: Envelope = serde_json::from_slice(&bytes).expect("deserialize");
        assert_eq!(decoded.from, envelope.from);
        assert!(matches!(
            decoded.kind,
            MessageKind::FindProviders { cid } if cid == [7u8; 32]
        ));
    }
}
