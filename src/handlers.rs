//! Registry of custom protocol handlers.
//!
//! Applications register handlers for protocol identifiers; inbound custom
//! requests are dispatched to every handler bound to the protocol. Handler
//! failures are isolated: one failing handler never prevents its siblings
//! from running.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::warn;

use crate::error::{Error, Result};
use crate::identity::Contact;

/// Callback invoked for inbound custom-protocol payloads.
pub type HandlerFn =
    Arc<dyn Fn(&Contact, &[u8]) -> std::result::Result<(), String> + Send + Sync>;

/// Metadata describing one registered handler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProtocolHandler {
    /// Caller-chosen handler identifier.
    pub handler_id: String,
    /// Protocol the handler is bound to, e.g. `/myapp/sync/1.0.0`.
    pub protocol_id: String,
    /// Human-readable description.
    pub description: String,
}

struct Registered {
    info: ProtocolHandler,
    callback: HandlerFn,
}

/// Maps protocol identifiers to message handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    // Keyed by (handler id, protocol id); at most one handler per pair.
    handlers: RwLock<HashMap<(String, String), Registered>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a handler to a protocol.
    ///
    /// Fails with [`Error::DuplicateHandler`] when the (handler id, protocol
    /// id) pair is already registered; the registry is left unchanged.
    pub async fn register(
        &self,
        handler_id: &str,
        protocol_id: &str,
        description: &str,
        callback: HandlerFn,
    ) -> Result<()> {
        let key = (handler_id.to_owned(), protocol_id.to_owned());
        let mut handlers = self.handlers.write().await;
        if handlers.contains_key(&key) {
            return Err(Error::DuplicateHandler {
                handler_id: handler_id.to_owned(),
                protocol_id: protocol_id.to_owned(),
            });
        }
        handlers.insert(
            key,
            Registered {
                info: ProtocolHandler {
                    handler_id: handler_id.to_owned(),
                    protocol_id: protocol_id.to_owned(),
                    description: description.to_owned(),
                },
                callback,
            },
        );
        Ok(())
    }

    /// Remove a handler binding.
    ///
    /// Fails with [`Error::HandlerNotFound`] when the pair is absent.
    pub async fn unregister(&self, handler_id: &str, protocol_id: &str) -> Result<()> {
        let key = (handler_id.to_owned(), protocol_id.to_owned());
        let mut handlers = self.handlers.write().await;
        if handlers.remove(&key).is_none() {
            return Err(Error::HandlerNotFound {
                handler_id: handler_id.to_owned(),
                protocol_id: protocol_id.to_owned(),
            });
        }
        Ok(())
    }

    /// Metadata for every registered handler.
    pub async fn list(&self) -> Vec<ProtocolHandler> {
        let handlers = self.handlers.read().await;
        let mut out: Vec<ProtocolHandler> =
            handlers.values().map(|entry| entry.info.clone()).collect();
        out.sort_by(|a, b| {
            (a.protocol_id.as_str(), a.handler_id.as_str())
                .cmp(&(b.protocol_id.as_str(), b.handler_id.as_str()))
        });
        out
    }

    /// The distinct protocol identifiers with at least one handler.
    pub async fn protocols(&self) -> Vec<String> {
        let handlers = self.handlers.read().await;
        let mut protocols: Vec<String> = handlers
            .values()
            .map(|entry| entry.info.protocol_id.clone())
            .collect();
        protocols.sort();
        protocols.dedup();
        protocols
    }

    /// Dispatch an inbound payload to all handlers bound to a protocol.
    ///
    /// Returns the number of handlers that ran successfully. Individual
    /// handler failures are logged and do not stop the remaining handlers.
    pub async fn invoke(&self, protocol_id: &str, from: &Contact, payload: &[u8]) -> usize {
        let targets: Vec<(String, HandlerFn)> = {
            let handlers = self.handlers.read().await;
            handlers
                .values()
                .filter(|entry| entry.info.protocol_id == protocol_id)
                .map(|entry| (entry.info.handler_id.clone(), entry.callback.clone()))
                .collect()
        };

        let mut succeeded = 0;
        for (handler_id, callback) in targets {
            match callback(from, payload) {
                Ok(()) => succeeded += 1,
                Err(reason) => {
                    warn!(
                        handler = %handler_id,
                        protocol = %protocol_id,
                        %reason,
                        "protocol handler failed"
                    );
                }
            }
        }
        succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn noop() -> HandlerFn {
        Arc::new(|_, _| Ok(()))
    }

    fn sender() -> Contact {
        Contact {
            id: [9u8; 32],
            addr: "10.0.0.9:4001".to_owned(),
        }
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let registry = HandlerRegistry::new();
        registry
            .register("h1", "/proto/1.0.0", "first", noop())
            .await
            .expect("first registration succeeds");

        let err = registry
            .register("h1", "/proto/1.0.0", "second", noop())
            .await
            .expect_err("duplicate registration fails");
        assert!(matches!(err, Error::DuplicateHandler { .. }));

        // The registry still holds exactly one handler for the pair,
        // with the original description.
        let listed = registry.list().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].description, "first");
    }

    #[tokio::test]
    async fn unregister_missing_handler_fails() {
        let registry = HandlerRegistry::new();
        let err = registry
            .unregister("h1", "/proto/1.0.0")
            .await
            .expect_err("unknown handler");
        assert!(matches!(err, Error::HandlerNotFound { .. }));
    }

    #[tokio::test]
    async fn invoke_isolates_handler_failures() {
        let registry = HandlerRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));

        registry
            .register(
                "failing",
                "/proto/1.0.0",
                "always fails",
                Arc::new(|_, _| Err("boom".to_owned())),
            )
            .await
            .expect("register");

        let counter = calls.clone();
        registry
            .register(
                "counting",
                "/proto/1.0.0",
                "counts invocations",
                Arc::new(move |_, _| {
                    counter.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                }),
            )
            .await
            .expect("register");

        let succeeded = registry.invoke("/proto/1.0.0", &sender(), b"data").await;
        assert_eq!(succeeded, 1);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn invoke_ignores_other_protocols() {
        let registry = HandlerRegistry::new();
        registry
            .register("h1", "/proto/1.0.0", "desc", noop())
            .await
            .expect("register");

        assert_eq!(registry.invoke("/other/1.0.0", &sender(), b"x").await, 0);
    }

    #[tokio::test]
    async fn same_handler_id_may_serve_different_protocols() {
        let registry = HandlerRegistry::new();
        registry
            .register("h1", "/proto/1.0.0", "a", noop())
            .await
            .expect("register");
        registry
            .register("h1", "/proto/2.0.0", "b", noop())
            .await
            .expect("register different protocol");

        assert_eq!(registry.list().await.len(), 2);
        assert_eq!(registry.protocols().await.len(), 2);
    }
}
