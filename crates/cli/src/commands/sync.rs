//! Force a reload from the account store.

use tracing::{info, warn};
use voltshop_sync::SyncConfig;

use super::{Session, log_cart, log_wishlist};

/// Report the collections loaded from the account store.
///
/// Opening an authenticated session already fetched both collections on the
/// sign-in edge, so no second round trip is made here. Guest sessions have
/// nothing to reload.
pub fn report(session: &Session, config: &SyncConfig) {
    if !config.is_authenticated() {
        warn!("No VOLTSHOP_API_TOKEN set, guest data lives only in the local cache");
        return;
    }

    let state = session.snapshot();
    info!("Reloaded cart and wishlist from the account store");

    log_cart(&state.cart);
    log_wishlist(&state.wishlist);
}
