//! Core types for Voltshop.
//!
//! This module provides type-safe wrappers for the cart and wishlist domain.

pub mod cart;
pub mod collection;
pub mod id;
pub mod price;
pub mod wishlist;

pub use cart::{Cart, CartLine, CartLineInfo};
pub use collection::Collection;
pub use id::{DEFAULT_PRODUCT_ID_LENGTH, ProductId, ProductIdError, ProductIdFormat};
pub use price::{CurrencyCode, Price};
pub use wishlist::Wishlist;
