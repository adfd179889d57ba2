//! HTTP client for the account cart and wishlist API.
//!
//! Uses `reqwest` with a bearer token. Every response is wrapped in the
//! `{success, data, message}` envelope; both the HTTP status and the
//! `success` flag are checked.

use std::sync::Arc;

use reqwest::{RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument};
use voltshop_core::ProductId;

use crate::config::ApiConfig;

use super::types::{CartData, Envelope, QuantityBody, WishlistData};
use super::{CartEntry, RemoteError, RemoteStore, WishlistEntry};

/// Longest body excerpt carried into errors and logs.
const BODY_EXCERPT_CHARS: usize = 200;

/// Client for the account API.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    client: reqwest::Client,
    base_url: String,
    token: Option<SecretString>,
}

impl ApiClient {
    /// Create a new API client.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: &ApiConfig) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(ApiClientInner {
                client,
                base_url: config.base_url.as_str().trim_end_matches('/').to_string(),
                token: config.token.clone(),
            }),
        })
    }

    /// The API base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.inner.base_url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.inner.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    /// Send a request and return the body of a successful response.
    async fn send(&self, request: RequestBuilder) -> Result<String, RemoteError> {
        let response = self.authorize(request).send().await?;
        let status = response.status();

        // Check for rate limiting
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(RemoteError::RateLimited(retry_after));
        }

        let body = response.text().await?;

        if status.is_success() {
            return Ok(body);
        }

        let message = envelope_message(&body).unwrap_or_else(|| excerpt(&body));

        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(RemoteError::Unauthorized(message));
        }

        tracing::error!(
            status = %status,
            body = %excerpt(&body),
            "Account API returned non-success status"
        );
        Err(RemoteError::Status {
            status: status.as_u16(),
            message,
        })
    }

    /// Fetch a resource and unwrap its envelope `data`.
    async fn fetch<T: DeserializeOwned>(&self, path: &str) -> Result<T, RemoteError> {
        let body = self.send(self.inner.client.get(self.url(path))).await?;

        let envelope: Envelope<T> = serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %excerpt(&body),
                "Failed to parse account API response"
            );
            RemoteError::Parse(e)
        })?;

        if !envelope.success {
            return Err(unsuccessful(envelope.message));
        }

        envelope
            .data
            .ok_or_else(|| RemoteError::Unsuccessful("response has no data".to_string()))
    }

    /// Run a mutation and check its envelope. The payload is ignored because
    /// the caller re-fetches the collection afterwards.
    async fn mutate(&self, request: RequestBuilder) -> Result<(), RemoteError> {
        let body = self.send(request).await?;

        // Some endpoints answer 204 No Content
        if body.trim().is_empty() {
            return Ok(());
        }

        let envelope: Envelope<Value> = serde_json::from_str(&body)?;
        if envelope.success {
            Ok(())
        } else {
            Err(unsuccessful(envelope.message))
        }
    }
}

impl RemoteStore for ApiClient {
    #[instrument(skip(self))]
    async fn fetch_cart(&self) -> Result<Vec<CartEntry>, RemoteError> {
        let data: CartData = self.fetch("cart").await?;
        debug!(lines = data.cart.len(), "Fetched remote cart");
        Ok(data.cart)
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    async fn add_cart_item(
        &self,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<(), RemoteError> {
        let request = self
            .inner
            .client
            .post(self.url(&format!("cart/{product_id}")))
            .json(&QuantityBody { quantity });
        self.mutate(request).await
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    async fn remove_cart_item(&self, product_id: &ProductId) -> Result<(), RemoteError> {
        let request = self
            .inner
            .client
            .delete(self.url(&format!("cart/product/{product_id}")));
        self.mutate(request).await
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    async fn update_cart_item(
        &self,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<(), RemoteError> {
        let request = self
            .inner
            .client
            .put(self.url(&format!("cart/product/{product_id}")))
            .json(&QuantityBody { quantity });
        self.mutate(request).await
    }

    #[instrument(skip(self))]
    async fn clear_cart(&self) -> Result<(), RemoteError> {
        self.mutate(self.inner.client.delete(self.url("cart"))).await
    }

    #[instrument(skip(self))]
    async fn fetch_wishlist(&self) -> Result<Vec<WishlistEntry>, RemoteError> {
        let data: WishlistData = self.fetch("wishlist").await?;
        debug!(entries = data.wishlist.len(), "Fetched remote wishlist");
        Ok(data.wishlist)
    }

    // The API toggles membership on `POST /wishlist/:productId`, so add and
    // remove share an endpoint. The synchronizer only calls each one when the
    // product's current membership says the toggle goes that way.

    #[instrument(skip(self), fields(product_id = %product_id))]
    async fn add_wishlist_item(&self, product_id: &ProductId) -> Result<(), RemoteError> {
        self.toggle_wishlist_item(product_id).await
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    async fn remove_wishlist_item(&self, product_id: &ProductId) -> Result<(), RemoteError> {
        self.toggle_wishlist_item(product_id).await
    }
}

impl ApiClient {
    async fn toggle_wishlist_item(&self, product_id: &ProductId) -> Result<(), RemoteError> {
        let request = self
            .inner
            .client
            .post(self.url(&format!("wishlist/{product_id}")));
        self.mutate(request).await
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn unsuccessful(message: Option<String>) -> RemoteError {
    RemoteError::Unsuccessful(message.unwrap_or_else(|| "(no message provided)".to_string()))
}

/// Pull `message` out of an error envelope, if the body is one.
fn envelope_message(body: &str) -> Option<String> {
    serde_json::from_str::<Envelope<Value>>(body)
        .ok()
        .and_then(|envelope| envelope.message)
}

fn excerpt(body: &str) -> String {
    body.chars().take(BODY_EXCERPT_CHARS).collect()
}
