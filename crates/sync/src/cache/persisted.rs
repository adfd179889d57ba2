//! JSON layout of the guest cart and wishlist in the durable cache.
//!
//! `localCart` holds `[{productId, quantity, addedAt, cachedTitle?, cachedPrice?, cachedImage?}]`
//! and `localWishlist` holds `["<productId>", ...]`. The optional cached fields
//! are omitted when absent.
//!
//! Loading is forgiving: each entry is decoded on its own and anything that
//! fails the product ID format check (or has a zero quantity) is dropped. When
//! something was dropped the cleaned collection is written back, so stale data
//! from an older schema only costs one load.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use voltshop_core::{Cart, CartLine, CartLineInfo, ProductIdFormat, Wishlist};

use super::{CacheError, LOCAL_CART_KEY, LOCAL_WISHLIST_KEY, LocalCache};

/// Cart line as read from the cache. Every field is checked before use.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredCartLine {
    product_id: Option<String>,
    quantity: u32,
    #[serde(default = "Utc::now")]
    added_at: DateTime<Utc>,
    #[serde(default)]
    cached_title: Option<String>,
    #[serde(default)]
    cached_price: Option<Decimal>,
    #[serde(default)]
    cached_image: Option<String>,
}

/// Cart line as written to the cache.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StoredCartLineRef<'a> {
    product_id: &'a str,
    quantity: u32,
    added_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cached_title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cached_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cached_image: Option<&'a str>,
}

impl<'a> From<&'a CartLine> for StoredCartLineRef<'a> {
    fn from(line: &'a CartLine) -> Self {
        Self {
            product_id: line.product_id.as_str(),
            quantity: line.quantity,
            added_at: line.added_at,
            cached_title: line.cached_title.as_deref(),
            cached_price: line.cached_price,
            cached_image: line.cached_image.as_deref(),
        }
    }
}

/// Read a key and split it into JSON entries.
///
/// Returns `None` if nothing usable is stored, with `needs_rewrite` set when a
/// value exists but is not an array.
fn read_entries<C: LocalCache + ?Sized>(cache: &C, key: &str) -> (Vec<Value>, bool) {
    let raw = match cache.read(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return (Vec::new(), false),
        Err(e) => {
            warn!(key, error = %e, "Failed to read cache, starting empty");
            return (Vec::new(), false);
        }
    };

    match serde_json::from_str::<Vec<Value>>(&raw) {
        Ok(entries) => (entries, false),
        Err(e) => {
            debug!(key, error = %e, "Cached value is not a JSON array, discarding");
            (Vec::new(), true)
        }
    }
}

/// Load the guest cart, dropping malformed entries.
pub fn load_cart<C: LocalCache + ?Sized>(cache: &C, format: &ProductIdFormat) -> Cart {
    let (entries, mut needs_rewrite) = read_entries(cache, LOCAL_CART_KEY);
    let total = entries.len();

    let lines: Vec<CartLine> = entries
        .into_iter()
        .filter_map(|entry| {
            let stored: StoredCartLine = serde_json::from_value(entry)
                .map_err(|e| debug!(error = %e, "Dropping undecodable cart entry"))
                .ok()?;
            if stored.quantity == 0 {
                debug!("Dropping cart entry with zero quantity");
                return None;
            }
            let product_id = format
                .parse(stored.product_id.as_deref().unwrap_or_default())
                .map_err(|e| debug!(error = %e, "Dropping cart entry with invalid product id"))
                .ok()?;
            Some(CartLine::new(
                product_id,
                stored.quantity,
                stored.added_at,
                CartLineInfo {
                    title: stored.cached_title,
                    price: stored.cached_price,
                    image: stored.cached_image,
                },
            ))
        })
        .collect();

    needs_rewrite |= lines.len() != total;
    let cart = Cart::from_lines(lines);
    // Merged duplicates also change the stored shape
    needs_rewrite |= cart.len() != total;

    if needs_rewrite {
        debug!(
            kept = cart.len(),
            stored = total,
            "Rewriting cleaned cart cache"
        );
        if let Err(e) = store_cart(cache, &cart) {
            warn!(error = %e, "Failed to rewrite cleaned cart cache");
        }
    }

    cart
}

/// Load the guest wishlist, dropping malformed and duplicate entries.
pub fn load_wishlist<C: LocalCache + ?Sized>(cache: &C, format: &ProductIdFormat) -> Wishlist {
    let (entries, mut needs_rewrite) = read_entries(cache, LOCAL_WISHLIST_KEY);
    let total = entries.len();

    let wishlist = Wishlist::from_ids(entries.into_iter().filter_map(|entry| {
        let Value::String(id) = entry else {
            debug!("Dropping non-string wishlist entry");
            return None;
        };
        format
            .parse(&id)
            .map_err(|e| debug!(error = %e, "Dropping wishlist entry with invalid product id"))
            .ok()
    }));

    needs_rewrite |= wishlist.len() != total;

    if needs_rewrite {
        debug!(
            kept = wishlist.len(),
            stored = total,
            "Rewriting cleaned wishlist cache"
        );
        if let Err(e) = store_wishlist(cache, &wishlist) {
            warn!(error = %e, "Failed to rewrite cleaned wishlist cache");
        }
    }

    wishlist
}

/// Persist the full cart.
///
/// # Errors
///
/// Returns an error if the cart cannot be encoded or written.
pub fn store_cart<C: LocalCache + ?Sized>(cache: &C, cart: &Cart) -> Result<(), CacheError> {
    let lines: Vec<StoredCartLineRef<'_>> = cart.lines().iter().map(Into::into).collect();
    cache.write(LOCAL_CART_KEY, &serde_json::to_string(&lines)?)
}

/// Persist the full wishlist.
///
/// # Errors
///
/// Returns an error if the wishlist cannot be encoded or written.
pub fn store_wishlist<C: LocalCache + ?Sized>(
    cache: &C,
    wishlist: &Wishlist,
) -> Result<(), CacheError> {
    cache.write(LOCAL_WISHLIST_KEY, &serde_json::to_string(wishlist)?)
}

/// Remove both collections from the cache.
///
/// # Errors
///
/// Returns the first error encountered; both keys are always attempted.
pub fn clear<C: LocalCache + ?Sized>(cache: &C) -> Result<(), CacheError> {
    let cart = cache.remove(LOCAL_CART_KEY);
    let wishlist = cache.remove(LOCAL_WISHLIST_KEY);
    cart.and(wishlist)
}
