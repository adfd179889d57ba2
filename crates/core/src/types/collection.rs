//! The two synchronized collections.

use serde::{Deserialize, Serialize};

/// A collection kept in sync between the local cache and the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Cart,
    Wishlist,
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cart => write!(f, "cart"),
            Self::Wishlist => write!(f, "wishlist"),
        }
    }
}
