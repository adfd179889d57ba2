//! Remote account store: trait, HTTP client, and wire types.
//!
//! # Architecture
//!
//! - [`RemoteStore`] is the seam the synchronizer depends on; tests swap in a
//!   double, production uses [`ApiClient`]
//! - The remote store is the source of truth in authenticated mode; every
//!   mutation is followed by a full re-fetch rather than a local patch
//! - Wire shapes live in [`types`] and are normalized there

mod client;
pub mod types;

use std::future::Future;

use thiserror::Error;
use voltshop_core::ProductId;

pub use client::ApiClient;
pub use types::{CartEntry, RemoteCartLine, WishlistEntry};

/// Errors that can occur when talking to the account API.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API returned a non-success status code.
    #[error("API returned {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Message from the response envelope, or a body excerpt.
        message: String,
    },

    /// The API answered with `success: false`.
    #[error("request unsuccessful: {0}")]
    Unsuccessful(String),

    /// The bearer token was missing, expired, or rejected.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Rate limited by the API.
    #[error("rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// The account-scoped cart and wishlist store.
///
/// All futures are `Send` so a synchronizer can be driven from any Tokio task.
pub trait RemoteStore: Send + Sync {
    /// `GET /cart`
    fn fetch_cart(&self) -> impl Future<Output = Result<Vec<CartEntry>, RemoteError>> + Send;

    /// `POST /cart/:productId` - adds or increments a line.
    fn add_cart_item(
        &self,
        product_id: &ProductId,
        quantity: u32,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// `DELETE /cart/product/:productId`
    fn remove_cart_item(
        &self,
        product_id: &ProductId,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// `PUT /cart/product/:productId` - sets a line's quantity.
    fn update_cart_item(
        &self,
        product_id: &ProductId,
        quantity: u32,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// `DELETE /cart`
    fn clear_cart(&self) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// `GET /wishlist`
    fn fetch_wishlist(
        &self,
    ) -> impl Future<Output = Result<Vec<WishlistEntry>, RemoteError>> + Send;

    /// Add a product to the wishlist.
    fn add_wishlist_item(
        &self,
        product_id: &ProductId,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Remove a product from the wishlist.
    fn remove_wishlist_item(
        &self,
        product_id: &ProductId,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;
}
