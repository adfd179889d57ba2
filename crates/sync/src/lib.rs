//! Voltshop Sync - Cart and wishlist synchronizer.
//!
//! Keeps a shopper's cart and wishlist consistent across two backends:
//! - A durable local cache used while browsing as a guest
//! - The remote account store, authoritative once the shopper signs in
//!
//! # Architecture
//!
//! The [`Synchronizer`] is generic over a [`RemoteStore`] and a [`LocalCache`],
//! so the same state machine runs against the HTTP [`ApiClient`] and a
//! [`FileCache`] in production, and against in-memory doubles in tests.
//!
//! # Modules
//!
//! - [`cache`] - Local key/value cache and the persisted cart/wishlist layout
//! - [`config`] - Environment-based configuration
//! - [`remote`] - Account API trait, client, and wire types
//! - [`synchronizer`] - Guest/authenticated state machine

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cache;
pub mod config;
pub mod error;
pub mod remote;
pub mod synchronizer;

#[cfg(test)]
mod testing;

pub use cache::{CacheError, FileCache, LocalCache, MemoryCache};
pub use config::{ApiConfig, ConfigError, SyncConfig};
pub use error::{Result, SyncError};
pub use remote::{ApiClient, RemoteError, RemoteStore};
pub use synchronizer::{SyncState, Synchronizer};
