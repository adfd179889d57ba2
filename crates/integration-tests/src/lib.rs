//! Integration test support for Voltshop.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p voltshop-integration-tests
//! ```
//!
//! No external services are needed: [`MockApi`] serves the account cart and
//! wishlist endpoints from an in-process axum server on a random local port.
//!
//! # Test Categories
//!
//! - `api_client` - `ApiClient` against the mock API (envelopes, errors, auth)
//! - `synchronizer_flow` - Full guest → sign-in → sign-out flows on a file cache

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::extract::{Path as UrlPath, Request, State};
use axum::http::{Method, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use url::Url;
use uuid::Uuid;
use voltshop_sync::ApiConfig;

/// Bearer token the mock API accepts.
pub const TEST_TOKEN: &str = "vs-test-token";

/// A catalog product the mock API embeds in cart responses.
#[derive(Debug, Clone)]
pub struct Product {
    pub id: String,
    pub title: String,
    pub price: Decimal,
    pub image: Option<String>,
}

impl Product {
    #[must_use]
    pub fn new(id: &str, title: &str, price: Decimal) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            price,
            image: Some(format!("/images/{id}.jpg")),
        }
    }
}

/// Injected failure returned instead of the real handler's response.
#[derive(Debug, Clone)]
pub enum Failure {
    /// Non-success HTTP status with an error envelope.
    Status(StatusCode, String),
    /// `429 Too Many Requests` with a `Retry-After` header.
    RateLimited(u64),
    /// `200 OK` with `success: false`.
    Unsuccessful(String),
    /// `200 OK` with a body that is not JSON.
    Malformed,
}

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        match self {
            Self::Status(status, message) => {
                (status, Json(json!({"success": false, "message": message}))).into_response()
            }
            Self::RateLimited(seconds) => (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, seconds.to_string())],
                "Too Many Requests",
            )
                .into_response(),
            Self::Unsuccessful(message) => {
                Json(json!({"success": false, "message": message})).into_response()
            }
            Self::Malformed => (StatusCode::OK, "<html>upstream hiccup</html>").into_response(),
        }
    }
}

struct StoredLine {
    line_id: String,
    product_id: String,
    quantity: u32,
    added_at: DateTime<Utc>,
}

#[derive(Default)]
struct Account {
    cart: Vec<StoredLine>,
    wishlist: Vec<String>,
    /// Raw entries appended verbatim to `GET /wishlist`.
    raw_wishlist: Vec<Value>,
}

#[derive(Default)]
struct ApiState {
    account: Mutex<Account>,
    catalog: Mutex<HashMap<String, Product>>,
    fetch_failure: Mutex<Option<Failure>>,
    mutation_failure: Mutex<Option<Failure>>,
    cart_fetches: AtomicUsize,
    wishlist_fetches: AtomicUsize,
    mutations: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ApiState {
    fn cart_json(&self) -> Value {
        let catalog = lock(&self.catalog);
        let lines: Vec<Value> = lock(&self.account)
            .cart
            .iter()
            .map(|line| {
                // Catalog products are populated; unknown ones stay as bare IDs
                let product = catalog.get(&line.product_id).map_or_else(
                    || json!(line.product_id),
                    |p| {
                        json!({
                            "_id": p.id,
                            "title": p.title,
                            "price": p.price.to_string(),
                            "backgroundImage": p.image,
                        })
                    },
                );
                json!({
                    "_id": line.line_id,
                    "product": product,
                    "quantity": line.quantity,
                    "addedAt": line.added_at,
                })
            })
            .collect();
        json!({ "cart": lines })
    }

    fn wishlist_json(&self) -> Value {
        let account = lock(&self.account);
        let mut entries: Vec<Value> = account
            .wishlist
            .iter()
            .enumerate()
            .map(|(i, id)| match i % 3 {
                0 => json!(id),
                1 => json!({ "product": { "_id": id } }),
                _ => json!({ "_id": id }),
            })
            .collect();
        entries.extend(account.raw_wishlist.iter().cloned());
        json!({ "wishlist": entries })
    }
}

fn ok(data: Value) -> Json<Value> {
    Json(json!({ "success": true, "data": data }))
}

fn not_found(message: &str) -> Response {
    Failure::Status(StatusCode::NOT_FOUND, message.to_string()).into_response()
}

#[derive(Deserialize)]
struct QuantityBody {
    quantity: u32,
}

// =============================================================================
// Middleware
// =============================================================================

async fn require_token(
    State(state): State<Arc<ApiState>>,
    request: Request,
    next: Next,
) -> Response {
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        == Some(TEST_TOKEN);

    if !authorized {
        return Failure::Status(StatusCode::UNAUTHORIZED, "Not authorized, token failed".to_string())
            .into_response();
    }

    let failure = if request.method() == Method::GET {
        lock(&state.fetch_failure).clone()
    } else {
        state.mutations.fetch_add(1, Ordering::SeqCst);
        lock(&state.mutation_failure).clone()
    };
    if let Some(failure) = failure {
        return failure.into_response();
    }

    next.run(request).await
}

// =============================================================================
// Cart Handlers
// =============================================================================

async fn get_cart(State(state): State<Arc<ApiState>>) -> Json<Value> {
    state.cart_fetches.fetch_add(1, Ordering::SeqCst);
    ok(state.cart_json())
}

async fn add_cart_item(
    State(state): State<Arc<ApiState>>,
    UrlPath(product_id): UrlPath<String>,
    Json(body): Json<QuantityBody>,
) -> Response {
    if !lock(&state.catalog).contains_key(&product_id) {
        return not_found("Product not found");
    }
    if body.quantity == 0 {
        return Failure::Status(
            StatusCode::BAD_REQUEST,
            "Quantity must be at least 1".to_string(),
        )
        .into_response();
    }

    {
        let mut account = lock(&state.account);
        if let Some(line) = account
            .cart
            .iter_mut()
            .find(|line| line.product_id == product_id)
        {
            line.quantity += body.quantity;
        } else {
            account.cart.push(StoredLine {
                line_id: Uuid::new_v4().simple().to_string(),
                product_id,
                quantity: body.quantity,
                added_at: Utc::now(),
            });
        }
    }

    ok(state.cart_json()).into_response()
}

async fn update_cart_item(
    State(state): State<Arc<ApiState>>,
    UrlPath(product_id): UrlPath<String>,
    Json(body): Json<QuantityBody>,
) -> Response {
    {
        let mut account = lock(&state.account);
        let Some(line) = account
            .cart
            .iter_mut()
            .find(|line| line.product_id == product_id)
        else {
            return not_found("Item not in cart");
        };
        line.quantity = body.quantity;
    }

    ok(state.cart_json()).into_response()
}

async fn remove_cart_item(
    State(state): State<Arc<ApiState>>,
    UrlPath(product_id): UrlPath<String>,
) -> Json<Value> {
    lock(&state.account)
        .cart
        .retain(|line| line.product_id != product_id);
    ok(state.cart_json())
}

async fn clear_cart(State(state): State<Arc<ApiState>>) -> StatusCode {
    lock(&state.account).cart.clear();
    StatusCode::NO_CONTENT
}

// =============================================================================
// Wishlist Handlers
// =============================================================================

async fn get_wishlist(State(state): State<Arc<ApiState>>) -> Json<Value> {
    state.wishlist_fetches.fetch_add(1, Ordering::SeqCst);
    ok(state.wishlist_json())
}

async fn toggle_wishlist_item(
    State(state): State<Arc<ApiState>>,
    UrlPath(product_id): UrlPath<String>,
) -> Json<Value> {
    let message = {
        let mut account = lock(&state.account);
        if let Some(index) = account.wishlist.iter().position(|id| *id == product_id) {
            account.wishlist.remove(index);
            "Removed from wishlist"
        } else {
            account.wishlist.push(product_id);
            "Added to wishlist"
        }
    };

    Json(json!({
        "success": true,
        "message": message,
        "data": state.wishlist_json(),
    }))
}

// =============================================================================
// MockApi
// =============================================================================

/// In-process mock of the account cart and wishlist API.
///
/// The server is aborted when the handle is dropped.
pub struct MockApi {
    base_url: Url,
    state: Arc<ApiState>,
    server: JoinHandle<()>,
}

impl MockApi {
    /// Start the server on a random local port.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn spawn() -> std::io::Result<Self> {
        let state = Arc::new(ApiState::default());

        let api = Router::new()
            .route("/cart", get(get_cart).delete(clear_cart))
            .route("/cart/{product_id}", post(add_cart_item))
            .route(
                "/cart/product/{product_id}",
                put(update_cart_item).delete(remove_cart_item),
            )
            .route("/wishlist", get(get_wishlist))
            .route("/wishlist/{product_id}", post(toggle_wishlist_item))
            .route_layer(middleware::from_fn_with_state(
                Arc::clone(&state),
                require_token,
            ))
            .with_state(Arc::clone(&state));
        let app = Router::new().nest("/api", api);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr: SocketAddr = listener.local_addr()?;
        let base_url = Url::parse(&format!("http://{addr}/api"))
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self {
            base_url,
            state,
            server,
        })
    }

    /// Base URL of the API, e.g. `http://127.0.0.1:PORT/api`.
    #[must_use]
    pub fn base_url(&self) -> String {
        self.base_url.to_string()
    }

    /// Client configuration pointing at this server.
    #[must_use]
    pub fn api_config(&self, token: Option<&str>) -> ApiConfig {
        ApiConfig {
            base_url: self.base_url.clone(),
            token: token.map(|t| SecretString::from(t.to_string())),
            timeout: Duration::from_secs(5),
        }
    }

    /// Add a product to the catalog.
    pub fn add_product(&self, product: Product) {
        lock(&self.state.catalog).insert(product.id.clone(), product);
    }

    /// Put a line directly into the account cart.
    pub fn seed_cart(&self, product_id: &str, quantity: u32) {
        lock(&self.state.account).cart.push(StoredLine {
            line_id: Uuid::new_v4().simple().to_string(),
            product_id: product_id.to_string(),
            quantity,
            added_at: Utc::now(),
        });
    }

    /// Put a product directly into the account wishlist.
    pub fn seed_wishlist(&self, product_id: &str) {
        lock(&self.state.account)
            .wishlist
            .push(product_id.to_string());
    }

    /// Append a raw entry to every `GET /wishlist` response.
    pub fn push_raw_wishlist_entry(&self, entry: Value) {
        lock(&self.state.account).raw_wishlist.push(entry);
    }

    /// Make every `GET` fail with `failure`, or succeed again with `None`.
    pub fn fail_fetches(&self, failure: Option<Failure>) {
        *lock(&self.state.fetch_failure) = failure;
    }

    /// Make every mutation fail with `failure`, or succeed again with `None`.
    pub fn fail_mutations(&self, failure: Option<Failure>) {
        *lock(&self.state.mutation_failure) = failure;
    }

    #[must_use]
    pub fn cart_fetches(&self) -> usize {
        self.state.cart_fetches.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn wishlist_fetches(&self) -> usize {
        self.state.wishlist_fetches.load(Ordering::SeqCst)
    }

    /// Authorized non-GET requests received, failed ones included.
    #[must_use]
    pub fn mutations(&self) -> usize {
        self.state.mutations.load(Ordering::SeqCst)
    }

    /// Quantity of a product in the account cart.
    #[must_use]
    pub fn cart_quantity(&self, product_id: &str) -> Option<u32> {
        lock(&self.state.account)
            .cart
            .iter()
            .find(|line| line.product_id == product_id)
            .map(|line| line.quantity)
    }

    /// Product IDs in the account wishlist.
    #[must_use]
    pub fn wishlist(&self) -> Vec<String> {
        lock(&self.state.account).wishlist.clone()
    }
}

impl Drop for MockApi {
    fn drop(&mut self) {
        self.server.abort();
    }
}

// =============================================================================
// Temp Directories
// =============================================================================

/// Unique directory under the system temp dir, removed on drop.
pub struct TempDir {
    path: PathBuf,
}

impl TempDir {
    #[must_use]
    pub fn new() -> Self {
        Self {
            path: std::env::temp_dir().join(format!("voltshop-it-{}", Uuid::new_v4())),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for TempDir {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}
