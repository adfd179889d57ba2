//! Show the session mode and both collections.

use tracing::info;
use voltshop_sync::SyncConfig;

use super::{Session, log_cart, log_wishlist};

/// Log where the synchronizer reads from and what it currently holds.
pub fn show(session: &Session, config: &SyncConfig) {
    let state = session.snapshot();

    let mode = if state.is_authenticated {
        "authenticated"
    } else {
        "guest"
    };
    info!(
        mode,
        api = %session.remote().base_url(),
        cache_dir = %config.cache_dir.display(),
        "Session"
    );

    log_cart(&state.cart);
    log_wishlist(&state.wishlist);
}
