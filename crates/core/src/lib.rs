//! Voltshop Core - Shared types library.
//!
//! This crate provides the domain types used by the Voltshop cart/wishlist
//! synchronizer:
//! - `sync` - Reconciles the local guest cache with the remote account store
//! - `cli` - Command-line driver for the synchronizer
//!
//! # Architecture
//!
//! The core crate contains only types and pure operations - no I/O, no cache
//! access, no HTTP clients. This keeps it lightweight and allows it to be used
//! anywhere.
//!
//! # Modules
//!
//! - [`types`] - Validated product IDs, prices, cart lines, carts, and wishlists

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
