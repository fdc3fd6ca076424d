//! Error types for the sync layer.
//!
//! Remote failures are surfaced to consumers as state, never panics. Storage
//! failures are logged at the boundary and degrade to an empty or stale view.

use thiserror::Error;

/// Failure of a remote subscription or write. Non-fatal: the consumer sees it
/// as an error state and may resubscribe; the layer never retries on its own.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The subscription failed to establish or was dropped (network loss,
    /// permission denial). No further deliveries happen until a new subscribe.
    #[error("subscription lost: {0}")]
    Subscription(String),
    /// A write against the remote collection was rejected.
    #[error("remote backend failure: {0}")]
    Backend(String),
}

/// Failure inside a persistence backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage serialization failure: {0}")]
    Serde(#[from] serde_json::Error),
}
