//! Validated product identifiers.
//!
//! Product IDs arrive from two untrusted places: the guest's durable cache
//! (which may hold entries from an older schema) and the remote API. Both go
//! through [`ProductIdFormat::parse`] before they reach a cart or wishlist.

use core::fmt;

use serde::Serialize;

/// Identifier length used by the remote store (24-character document IDs).
pub const DEFAULT_PRODUCT_ID_LENGTH: usize = 24;

/// Errors that can occur when parsing a [`ProductId`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProductIdError {
    /// The input string is empty.
    #[error("product id cannot be empty")]
    Empty,
    /// The input string does not have the backend's identifier length.
    #[error("product id must be {expected} characters (got {actual})")]
    WrongLength {
        /// Expected identifier length.
        expected: usize,
        /// Actual length of the input.
        actual: usize,
    },
    /// The input contains a character that cannot appear in an identifier.
    #[error("product id contains invalid character {0:?}")]
    InvalidCharacter(char),
}

/// The identifier format expected by the remote store.
///
/// ## Constraints
///
/// - Non-empty
/// - Exactly `length` characters
/// - ASCII alphanumerics, `-` and `_` only (IDs are interpolated into URL paths)
///
/// ## Examples
///
/// ```
/// use voltshop_core::ProductIdFormat;
///
/// let format = ProductIdFormat::default();
/// assert!(format.parse("65f1a2b3c4d5e6f708192a3b").is_ok());
/// assert!(format.parse("").is_err());
/// assert!(format.parse("short").is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductIdFormat {
    length: usize,
}

impl ProductIdFormat {
    /// Create a format that accepts identifiers of exactly `length` characters.
    #[must_use]
    pub const fn new(length: usize) -> Self {
        Self { length }
    }

    /// The required identifier length.
    #[must_use]
    pub const fn length(&self) -> usize {
        self.length
    }

    /// Parse and validate a product ID.
    ///
    /// # Errors
    ///
    /// Returns [`ProductIdError`] if the input is empty, has the wrong length,
    /// or contains a character outside `[A-Za-z0-9_-]`.
    pub fn parse(&self, s: &str) -> Result<ProductId, ProductIdError> {
        if s.is_empty() {
            return Err(ProductIdError::Empty);
        }

        if let Some(c) = s
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(ProductIdError::InvalidCharacter(c));
        }

        // All characters are ASCII at this point, so byte length == char count
        if s.len() != self.length {
            return Err(ProductIdError::WrongLength {
                expected: self.length,
                actual: s.len(),
            });
        }

        Ok(ProductId(s.to_owned()))
    }
}

impl Default for ProductIdFormat {
    fn default() -> Self {
        Self::new(DEFAULT_PRODUCT_ID_LENGTH)
    }
}

/// A validated product identifier.
///
/// Only constructible through [`ProductIdFormat::parse`], so holding one means
/// the identifier passed the backend's format check.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert into the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ProductId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
