//! Cart commands.

use tracing::info;
use voltshop_core::CartLineInfo;

use super::{Session, log_cart, parse_product_id};

type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Log every cart line and the totals.
pub fn show(session: &Session) {
    log_cart(&session.snapshot().cart);
}

/// Add `quantity` units of a product.
///
/// # Errors
///
/// Returns an error if the product ID is invalid or the update fails.
pub async fn add(
    session: &Session,
    raw_id: &str,
    quantity: u32,
    info: CartLineInfo,
) -> CommandResult {
    let product_id = parse_product_id(session, raw_id)?;
    let state = session.add_to_cart(&product_id, quantity, info).await?;

    let in_cart = state.cart.line(&product_id).map_or(0, |line| line.quantity);
    info!(product_id = %product_id, added = quantity, in_cart, "Added to cart");
    Ok(())
}

/// Remove a product's line.
///
/// # Errors
///
/// Returns an error if the product ID is invalid or the update fails.
pub async fn remove(session: &Session, raw_id: &str) -> CommandResult {
    let product_id = parse_product_id(session, raw_id)?;
    let state = session.remove_from_cart(&product_id).await?;

    info!(product_id = %product_id, lines = state.cart.len(), "Removed from cart");
    Ok(())
}

/// Set a line's quantity; zero or less removes it.
///
/// # Errors
///
/// Returns an error if the product ID is invalid or the update fails.
pub async fn set_quantity(session: &Session, raw_id: &str, quantity: i64) -> CommandResult {
    let product_id = parse_product_id(session, raw_id)?;
    let state = session.update_quantity(&product_id, quantity).await?;

    match state.cart.line(&product_id) {
        Some(line) => info!(product_id = %product_id, quantity = line.quantity, "Updated quantity"),
        None => info!(product_id = %product_id, "Product not in cart"),
    }
    Ok(())
}

/// Remove every line.
///
/// # Errors
///
/// Returns an error if the update fails.
pub async fn clear(session: &Session) -> CommandResult {
    session.clear_cart().await?;
    info!("Cart cleared");
    Ok(())
}
