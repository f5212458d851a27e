//! Peer identity, content addressing, and XOR distance math.
//!
//! A node's [`PeerId`] is the BLAKE3 digest of its ed25519 public key, which
//! spreads identities uniformly across the 256-bit keyspace the routing table
//! partitions. Content ids ([`Cid`]) live in the same keyspace so provider
//! records can be routed with the same distance metric.

use std::fmt;
use std::path::Path;

use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A 256-bit peer identifier derived from the node's public key.
pub type PeerId = [u8; 32];

/// A 256-bit content identifier, the BLAKE3 hash of the content bytes.
///
/// Cids are opaque byte-equal keys; no canonicalization beyond exact match.
pub type Cid = [u8; 32];

/// Compute a 32-byte BLAKE3 digest of the input data.
fn digest(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Derive a stable [`PeerId`] by hashing a public key with BLAKE3.
pub fn derive_peer_id(public_key: &[u8]) -> PeerId {
    digest(public_key)
}

/// Compute a content id as the BLAKE3 hash of content bytes.
///
/// ```
/// use kadmesh::hash_content;
///
/// let cid = hash_content(b"hello world");
/// assert_eq!(cid, hash_content(b"hello world"));
/// ```
pub fn hash_content(data: &[u8]) -> Cid {
    digest(data)
}

/// Verify that a content id matches the hash of the data it names.
pub fn verify_cid(cid: &Cid, data: &[u8]) -> bool {
    hash_content(data) == *cid
}

/// Render an id as lowercase hex for logs and error messages.
pub fn fmt_id(id: &[u8; 32]) -> String {
    hex::encode(id)
}

// ============================================================================
// Distance metric
// ============================================================================

/// Compute the XOR distance between two 256-bit identifiers.
///
/// # Properties
/// - `xor_distance(a, a) == [0; 32]`
/// - `xor_distance(a, b) == xor_distance(b, a)`
pub fn xor_distance(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let mut out = [0u8; 32];
    for i in 0..32 {
        out[i] = a[i] ^ b[i];
    }
    out
}

/// Compare two XOR distances lexicographically.
pub fn distance_cmp(a: &[u8; 32], b: &[u8; 32]) -> std::cmp::Ordering {
    a.cmp(b)
}

/// Order two contacts by distance to a target, tie-breaking on raw id bytes.
///
/// The tie-break keeps candidate ordering deterministic when two peers are
/// equidistant from the target, which reproducible tests rely on.
pub fn cmp_by_distance(a: &PeerId, b: &PeerId, target: &[u8; 32]) -> std::cmp::Ordering {
    let da = xor_distance(a, target);
    let db = xor_distance(b, target);
    distance_cmp(&da, &db).then_with(|| a.cmp(b))
}

/// Find the bucket index for an id relative to self.
///
/// The index is the position of the first differing bit (0..=255). Bucket 0
/// is the furthest range, bucket 255 the closest.
pub fn bucket_index(self_id: &PeerId, other: &PeerId) -> usize {
    let dist = xor_distance(self_id, other);
    for (byte_idx, byte) in dist.iter().enumerate() {
        if *byte != 0 {
            return byte_idx * 8 + byte.leading_zeros() as usize;
        }
    }
    // identical id: the last bucket
    255
}

// ============================================================================
// Contact
// ============================================================================

/// A peer's identity plus the address it can be reached at.
///
/// This is the unit exchanged in routing RPCs; richer liveness metadata lives
/// in the peer store.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Contact {
    /// The peer's unique identifier.
    pub id: PeerId,
    /// Dialable address string, e.g. `203.0.113.7:4001`.
    pub addr: String,
}

// ============================================================================
// Keypair
// ============================================================================

/// Persisted identity file shape: the hex-encoded ed25519 secret key.
#[derive(Serialize, Deserialize)]
struct IdentityFile {
    secret_key: String,
}

/// A node's ed25519 identity keypair.
pub struct Keypair {
    signing: SigningKey,
    peer_id: PeerId,
}

impl Keypair {
    /// Generate a fresh keypair from the OS randomness source.
    pub fn generate() -> Result<Self> {
        let mut secret = [0u8; 32];
        OsRng
            .try_fill_bytes(&mut secret)
            .map_err(|err| Error::CryptoGeneration(err.to_string()))?;
        Ok(Self::from_secret(secret))
    }

    /// Load a persisted keypair.
    ///
    /// A missing or corrupt file is a fatal startup condition; this never
    /// falls back to generating a replacement.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|err| Error::IdentityLoad {
            path: path.to_owned(),
            reason: err.to_string(),
        })?;
        let file: IdentityFile =
            serde_json::from_str(&raw).map_err(|err| Error::IdentityLoad {
                path: path.to_owned(),
                reason: format!("invalid identity file: {err}"),
            })?;
        let bytes = hex::decode(&file.secret_key).map_err(|err| Error::IdentityLoad {
            path: path.to_owned(),
            reason: format!("invalid secret key encoding: {err}"),
        })?;
        let secret: [u8; 32] = bytes.try_into().map_err(|_| Error::IdentityLoad {
            path: path.to_owned(),
            reason: "secret key must be exactly 32 bytes".to_owned(),
        })?;
        Ok(Self::from_secret(secret))
    }

    /// Persist the keypair so the node keeps its identity across restarts.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = IdentityFile {
            secret_key: hex::encode(self.signing.to_bytes()),
        };
        std::fs::write(path, serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }

    fn from_secret(secret: [u8; 32]) -> Self {
        let signing = SigningKey::from_bytes(&secret);
        let peer_id = derive_peer_id(signing.verifying_key().as_bytes());
        Self { signing, peer_id }
    }

    /// This identity's peer id.
    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// The public half of the keypair.
    pub fn public_key(&self) -> VerifyingKey {
        self.signing.verifying_key()
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("peer_id", &fmt_id(&self.peer_id))
            .finish()
    }
}
