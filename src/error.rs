//! Error taxonomy for the mesh core.
//!
//! Errors fall into three families that callers need to tell apart:
//!
//! - fatal startup conditions (`DependencyUnavailable`, `CryptoGeneration`,
//!   `IdentityLoad`),
//! - recoverable per-operation transport failures (`Bind`, `DialTimeout`,
//!   `DialRefused`),
//! - routing outcomes that are expected in normal operation and are *not*
//!   system failures (`LookupTimedOut`, `NoProviders`, `ContentNotFound`).
//!
//! Input and registry-state mistakes (`InvalidLimit`, `DuplicateHandler`,
//! `HandlerNotFound`) always surface immediately rather than defaulting.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// All errors produced by the mesh core.
#[derive(Error, Debug)]
pub enum Error {
    /// The networking stack could not initialize at all. Fatal for the node.
    #[error("networking stack unavailable: {0}")]
    DependencyUnavailable(String),

    /// The OS randomness source failed while generating an identity keypair.
    #[error("identity key generation failed: {0}")]
    CryptoGeneration(String),

    /// A persisted identity file is missing or corrupt. Fatal for startup;
    /// the node never silently generates a replacement.
    #[error("failed to load identity from {path}: {reason}")]
    IdentityLoad { path: PathBuf, reason: String },

    /// A listen address could not be bound. Reported per address.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// An outbound dial did not complete within its timeout.
    #[error("dial to {addr} timed out after {timeout:?}")]
    DialTimeout { addr: String, timeout: Duration },

    /// An outbound dial was actively refused by the remote.
    #[error("dial to {addr} refused: {source}")]
    DialRefused {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// A caller passed a limit of zero where at least one result is required.
    #[error("limit must be greater than zero")]
    InvalidLimit,

    /// A handler is already registered for this (handler id, protocol id) pair.
    #[error("handler {handler_id:?} already registered for protocol {protocol_id:?}")]
    DuplicateHandler {
        handler_id: String,
        protocol_id: String,
    },

    /// No handler is registered for this (handler id, protocol id) pair.
    #[error("handler {handler_id:?} not registered for protocol {protocol_id:?}")]
    HandlerNotFound {
        handler_id: String,
        protocol_id: String,
    },

    /// An iterative lookup hit its global deadline before converging.
    #[error("lookup timed out after {0:?}")]
    LookupTimedOut(Duration),

    /// Provider discovery finished without finding any provider.
    #[error("no providers found for content {cid}")]
    NoProviders { cid: String },

    /// Every known provider was tried and none delivered the content.
    #[error("content {cid} could not be retrieved from any provider")]
    ContentNotFound { cid: String },

    /// A caller-supplied content id does not match the hash of the data.
    #[error("content id does not match the BLAKE3 hash of the supplied data")]
    CidMismatch,

    /// A wire frame could not be decoded.
    #[error("malformed wire message: {0}")]
    Codec(#[from] serde_json::Error),

    /// Transport-level I/O failure outside the dial/bind paths.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for outcomes that mean "nothing there" rather than "something broke".
    ///
    /// Callers use this to distinguish empty routing results from transport
    /// or programming errors.
    pub fn is_absence(&self) -> bool {
        matches!(
            self,
            Error::NoProviders { .. } | Error::ContentNotFound { .. } | Error::LookupTimedOut(_)
        )
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absence_errors_are_distinguishable_from_transport_errors() {
        assert!(Error::NoProviders { cid: "ab".into() }.is_absence());
        assert!(Error::ContentNotFound { cid: "ab".into() }.is_absence());
        assert!(Error::LookupTimedOut(Duration::from_secs(1)).is_absence());

        let refused = Error::DialRefused {
            addr: "127.0.0.1:4001".into(),
            source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
        };
        assert!(!refused.is_absence());
        assert!(!Error::InvalidLimit.is_absence());
    }
}
