//! Cart lines and the cart collection.
//!
//! A [`Cart`] is keyed by product: adding a product that already has a line
//! increments that line instead of appending a second one.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::id::ProductId;

/// Display fields captured when a product is added to the cart.
///
/// Lets guest carts render titles and totals without a product lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CartLineInfo {
    /// Product title.
    pub title: Option<String>,
    /// Unit price.
    pub price: Option<Decimal>,
    /// Product image URL.
    pub image: Option<String>,
}

/// A single cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: ProductId,
    /// Always at least 1.
    pub quantity: u32,
    pub added_at: DateTime<Utc>,
    pub cached_title: Option<String>,
    pub cached_price: Option<Decimal>,
    pub cached_image: Option<String>,
}

impl CartLine {
    /// Create a line for `quantity` units of a product.
    #[must_use]
    pub fn new(
        product_id: ProductId,
        quantity: u32,
        added_at: DateTime<Utc>,
        info: CartLineInfo,
    ) -> Self {
        Self {
            product_id,
            quantity,
            added_at,
            cached_title: info.title,
            cached_price: info.price,
            cached_image: info.image,
        }
    }

    /// `quantity × price`, with a missing price counting as zero.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.cached_price.unwrap_or_default() * Decimal::from(self.quantity)
    }

    /// Fill in cached display fields this line does not have yet.
    fn absorb_info(&mut self, info: CartLineInfo) {
        if self.cached_title.is_none() {
            self.cached_title = info.title;
        }
        if self.cached_price.is_none() {
            self.cached_price = info.price;
        }
        if self.cached_image.is_none() {
            self.cached_image = info.image;
        }
    }

    fn info(&self) -> CartLineInfo {
        CartLineInfo {
            title: self.cached_title.clone(),
            price: self.cached_price,
            image: self.cached_image.clone(),
        }
    }
}

/// The shopping cart: ordered lines, at most one per product.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    /// Create an empty cart.
    #[must_use]
    pub const fn new() -> Self {
        Self { lines: Vec::new() }
    }

    /// Build a cart from possibly duplicated lines.
    ///
    /// Lines for the same product are merged: quantities are summed and the
    /// earliest line's position and timestamp are kept.
    #[must_use]
    pub fn from_lines(lines: impl IntoIterator<Item = CartLine>) -> Self {
        let mut cart = Self::new();
        for line in lines {
            let info = line.info();
            cart.add(line.product_id, line.quantity, info, line.added_at);
        }
        cart
    }

    /// Add `quantity` units of a product.
    ///
    /// Increments the existing line if the product is already in the cart,
    /// otherwise appends a new line. Returns `false` (and does nothing) when
    /// `quantity` is zero.
    pub fn add(
        &mut self,
        product_id: ProductId,
        quantity: u32,
        info: CartLineInfo,
        now: DateTime<Utc>,
    ) -> bool {
        if quantity == 0 {
            return false;
        }

        if let Some(line) = self.line_mut(&product_id) {
            line.quantity = line.quantity.saturating_add(quantity);
            line.absorb_info(info);
        } else {
            self.lines
                .push(CartLine::new(product_id, quantity, now, info));
        }
        true
    }

    /// Remove a product's line. Returns whether a line was removed.
    pub fn remove(&mut self, product_id: &ProductId) -> bool {
        let before = self.lines.len();
        self.lines.retain(|line| &line.product_id != product_id);
        self.lines.len() != before
    }

    /// Set a line's quantity directly.
    ///
    /// A quantity of zero or less removes the line. Unknown products are
    /// ignored. Returns whether the cart changed.
    pub fn set_quantity(&mut self, product_id: &ProductId, quantity: i64) -> bool {
        let Ok(quantity) = u32::try_from(quantity) else {
            // Negative values remove; values above u32::MAX clamp
            return if quantity <= 0 {
                self.remove(product_id)
            } else {
                self.set_quantity(product_id, i64::from(u32::MAX))
            };
        };

        if quantity == 0 {
            return self.remove(product_id);
        }

        match self.line_mut(product_id) {
            Some(line) if line.quantity != quantity => {
                line.quantity = quantity;
                true
            }
            _ => false,
        }
    }

    /// Remove every line.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Look up a product's line.
    #[must_use]
    pub fn line(&self, product_id: &ProductId) -> Option<&CartLine> {
        self.lines.iter().find(|line| &line.product_id == product_id)
    }

    fn line_mut(&mut self, product_id: &ProductId) -> Option<&mut CartLine> {
        self.lines
            .iter_mut()
            .find(|line| &line.product_id == product_id)
    }

    /// Whether the product has a line in the cart.
    #[must_use]
    pub fn contains(&self, product_id: &ProductId) -> bool {
        self.line(product_id).is_some()
    }

    /// Sum of all line quantities.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.lines.iter().map(|line| u64::from(line.quantity)).sum()
    }

    /// Sum of `quantity × price` over all lines; missing prices count as zero.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.lines.iter().map(CartLine::subtotal).sum()
    }

    /// The lines in insertion order.
    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// Number of distinct products.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
