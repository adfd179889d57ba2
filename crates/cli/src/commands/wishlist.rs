//! Wishlist commands.

use tracing::info;

use super::{Session, log_wishlist, parse_product_id};

type CommandResult = Result<(), Box<dyn std::error::Error>>;

pub fn show(session: &Session) {
    log_wishlist(&session.snapshot().wishlist);
}

/// Add the product if absent, remove it otherwise.
///
/// # Errors
///
/// Returns an error if the product ID is invalid or the update fails.
pub async fn toggle(session: &Session, raw_id: &str) -> CommandResult {
    let product_id = parse_product_id(session, raw_id)?;
    let state = session.toggle_wishlist(&product_id).await?;

    let saved = state.wishlist.contains(&product_id);
    info!(product_id = %product_id, saved, "Toggled wishlist");
    Ok(())
}

/// # Errors
///
/// Returns an error if the product ID is invalid or the update fails.
pub async fn add(session: &Session, raw_id: &str) -> CommandResult {
    let product_id = parse_product_id(session, raw_id)?;
    let state = session.add_to_wishlist(&product_id).await?;

    info!(product_id = %product_id, entries = state.wishlist.len(), "Saved to wishlist");
    Ok(())
}

/// # Errors
///
/// Returns an error if the product ID is invalid or the update fails.
pub async fn remove(session: &Session, raw_id: &str) -> CommandResult {
    let product_id = parse_product_id(session, raw_id)?;
    let state = session.remove_from_wishlist(&product_id).await?;

    info!(product_id = %product_id, entries = state.wishlist.len(), "Removed from wishlist");
    Ok(())
}

/// # Errors
///
/// Returns an error if the update fails.
pub async fn clear(session: &Session) -> CommandResult {
    session.clear_wishlist().await?;
    info!("Wishlist cleared");
    Ok(())
}
