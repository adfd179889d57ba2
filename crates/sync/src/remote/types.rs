//! Wire types for the account API and their normalization into core types.
//!
//! The API is loose about shapes: cart lines may embed the product or just
//! reference it, and wishlist entries come back as plain IDs, `{product: ...}`
//! wrappers, or bare `{_id}` documents. Every shape is modelled explicitly
//! here and normalized to the same [`CartLine`] / [`ProductId`] values.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use voltshop_core::{Cart, CartLine, CartLineInfo, ProductId, ProductIdFormat, Wishlist};

// =============================================================================
// Envelope
// =============================================================================

/// Standard `{success, data, message}` response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

/// `data` payload of `GET /cart`.
#[derive(Debug, Clone, Deserialize)]
pub struct CartData {
    #[serde(default)]
    pub cart: Vec<CartEntry>,
}

/// `data` payload of `GET /wishlist`.
#[derive(Debug, Clone, Deserialize)]
pub struct WishlistData {
    #[serde(default)]
    pub wishlist: Vec<WishlistEntry>,
}

/// Body of quantity-carrying cart mutations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QuantityBody {
    pub quantity: u32,
}

// =============================================================================
// Cart Lines
// =============================================================================

/// Reference to a product: either its ID or an embedded product document.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ProductRef {
    Id(String),
    Document(ProductDocument),
}

/// Embedded product document. Only the fields the cart displays are read.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub background_image: Option<String>,
}

impl ProductRef {
    /// The referenced product's raw ID.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Id(id) => id,
            Self::Document(doc) => &doc.id,
        }
    }

    fn info(&self) -> CartLineInfo {
        match self {
            Self::Id(_) => CartLineInfo::default(),
            Self::Document(doc) => CartLineInfo {
                title: doc.title.clone(),
                price: doc.price,
                image: doc.background_image.clone(),
            },
        }
    }
}

/// A cart line as returned by `GET /cart`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCartLine {
    /// Server-side line ID; not needed locally since lines are keyed by product.
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    pub product: ProductRef,
    pub quantity: u32,
    #[serde(default)]
    pub added_at: Option<DateTime<Utc>>,
}

/// A cart entry as it arrives on the wire.
///
/// A line whose product was deleted (`product: null`) or whose quantity is not
/// a count lands in `Unrecognized` instead of failing the whole cart.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum CartEntry {
    Line(RemoteCartLine),
    Unrecognized(Value),
}

impl From<RemoteCartLine> for CartEntry {
    fn from(line: RemoteCartLine) -> Self {
        Self::Line(line)
    }
}

/// Normalize remote cart entries into a [`Cart`].
///
/// Unrecognized shapes, invalid product IDs, and zero quantities are dropped
/// with a warning; duplicate lines for one product are merged.
#[must_use]
pub fn normalize_cart(
    entries: Vec<CartEntry>,
    format: &ProductIdFormat,
    fetched_at: DateTime<Utc>,
) -> Cart {
    Cart::from_lines(entries.into_iter().filter_map(|entry| {
        let line = match entry {
            CartEntry::Line(line) => line,
            CartEntry::Unrecognized(value) => {
                warn!(entry = %value, "Ignoring remote cart line with unrecognized shape");
                return None;
            }
        };
        if line.quantity == 0 {
            warn!(product_id = %line.product.id(), "Ignoring remote cart line with zero quantity");
            return None;
        }
        match format.parse(line.product.id()) {
            Ok(product_id) => Some(CartLine::new(
                product_id,
                line.quantity,
                line.added_at.unwrap_or(fetched_at),
                line.product.info(),
            )),
            Err(e) => {
                warn!(
                    product_id = %line.product.id(),
                    error = %e,
                    "Ignoring remote cart line with invalid product id"
                );
                None
            }
        }
    }))
}

// =============================================================================
// Wishlist Entries
// =============================================================================

/// A wishlist entry in any of the shapes the API produces.
///
/// Variants are tried in order; anything else lands in `Unrecognized`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum WishlistEntry {
    /// `"<productId>"`
    Id(String),
    /// `{"product": "<productId>"}` or `{"product": {"_id": ...}}`
    Nested { product: ProductRef },
    /// `{"_id": "<productId>"}`
    Bare {
        #[serde(rename = "_id")]
        id: String,
    },
    /// Any other JSON value.
    Unrecognized(Value),
}

impl WishlistEntry {
    /// The raw product ID, if the shape carries one.
    #[must_use]
    pub fn product_id(&self) -> Option<&str> {
        match self {
            Self::Id(id) | Self::Bare { id } => Some(id),
            Self::Nested { product } => Some(product.id()),
            Self::Unrecognized(_) => None,
        }
    }
}

/// Normalize wishlist entries into a [`Wishlist`].
///
/// Unrecognized shapes and invalid IDs are rejected with a warning.
#[must_use]
pub fn normalize_wishlist(entries: Vec<WishlistEntry>, format: &ProductIdFormat) -> Wishlist {
    Wishlist::from_ids(entries.into_iter().filter_map(|entry| {
        let Some(raw) = entry.product_id() else {
            warn!(entry = ?entry, "Ignoring wishlist entry with unrecognized shape");
            return None;
        };
        format
            .parse(raw)
            .map_err(|e| {
                warn!(product_id = %raw, error = %e, "Ignoring wishlist entry with invalid product id");
            })
            .ok()
    }))
}

/// IDs of a wishlist, for callers that need owned values.
#[must_use]
pub fn wishlist_ids(wishlist: &Wishlist) -> Vec<ProductId> {
    wishlist.iter().cloned().collect()
}
