//! Unified synchronizer error type.
//!
//! Nothing in the synchronizer is fatal: a failed operation leaves the last
//! known good state in place. The error is still returned so callers can
//! surface it; ignoring it is always safe.

use thiserror::Error;
use voltshop_core::ProductIdError;

use crate::cache::CacheError;
use crate::remote::RemoteError;

/// Error returned by synchronizer operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The remote store request or re-fetch failed; state is unchanged.
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Persisting to the durable cache failed; in-memory state was updated.
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// A product ID failed validation.
    #[error("Invalid product id: {0}")]
    InvalidProductId(#[from] ProductIdError),
}

impl SyncError {
    /// Whether the failure came from the network or the remote store.
    #[must_use]
    pub const fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}

/// Result type alias for `SyncError`.
pub type Result<T> = std::result::Result<T, SyncError>;
