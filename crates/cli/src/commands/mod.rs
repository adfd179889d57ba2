//! Command implementations.
//!
//! Every invocation opens one [`Session`]: the HTTP client, the file cache in
//! `VOLTSHOP_CACHE_DIR`, and a synchronizer signed in when a token is set.

pub mod cart;
pub mod status;
pub mod sync;
pub mod wishlist;

use tracing::info;
use voltshop_core::{Cart, CurrencyCode, Price, ProductId, ProductIdError, Wishlist};
use voltshop_sync::{ApiClient, FileCache, SyncConfig, Synchronizer};

/// Synchronizer backed by the account API and the on-disk cache.
pub type Session = Synchronizer<ApiClient, FileCache>;

/// Build the session and, with a token configured, load the account
/// collections.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built or the account load
/// fails.
pub async fn open_session(config: &SyncConfig) -> Result<Session, Box<dyn std::error::Error>> {
    let client = ApiClient::new(&config.api)?;
    let cache = FileCache::new(config.cache_dir.clone());
    let session = Synchronizer::new(client, cache, config.product_id_format);

    session.set_authenticated(config.is_authenticated()).await?;
    Ok(session)
}

fn parse_product_id(session: &Session, raw: &str) -> Result<ProductId, ProductIdError> {
    session.product_id_format().parse(raw)
}

fn format_amount(amount: rust_decimal::Decimal) -> String {
    Price::new(amount, CurrencyCode::USD).display()
}

fn log_cart(cart: &Cart) {
    if cart.is_empty() {
        info!("Cart is empty");
        return;
    }

    for line in cart.lines() {
        info!(
            product_id = %line.product_id,
            quantity = line.quantity,
            title = line.cached_title.as_deref().unwrap_or("-"),
            price = %line.cached_price.map_or_else(|| "-".to_string(), format_amount),
            subtotal = %format_amount(line.subtotal()),
            "Cart line"
        );
    }

    info!(
        lines = cart.len(),
        items = cart.count(),
        total = %format_amount(cart.total()),
        "Cart total"
    );
}

fn log_wishlist(wishlist: &Wishlist) {
    if wishlist.is_empty() {
        info!("Wishlist is empty");
        return;
    }

    for product_id in wishlist.iter() {
        info!(product_id = %product_id, "Wishlist entry");
    }
    info!(entries = wishlist.len(), "Wishlist total");
}
