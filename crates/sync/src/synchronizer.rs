//! The cart/wishlist synchronizer.
//!
//! One [`Synchronizer`] is constructed per session and handed to whatever
//! needs the cart. It is the single source of truth for "what is in the cart
//! and wishlist right now" and hides which backend is authoritative:
//!
//! - **Guest mode**: mutations apply to memory synchronously and the full
//!   collection is written to the [`LocalCache`]. No network calls.
//! - **Authenticated mode**: mutations go to the [`RemoteStore`], then the whole
//!   collection is re-fetched and overwrites memory and cache. Nothing is
//!   patched optimistically, so a failed request needs no rollback.
//!
//! # Overlapping requests
//!
//! Every re-fetch takes a per-collection ticket right before it is sent. A
//! response is applied only if its ticket is newer than the last one applied,
//! so a slow response can never overwrite the result of a fetch issued after
//! it.
//!
//! Every remote operation also records the session it started in. Changing
//! mode starts a new session, and responses from an older one are dropped no
//! matter which phase they were in when the mode changed.

use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use voltshop_core::{Cart, CartLine, CartLineInfo, Collection, ProductId, ProductIdFormat, Wishlist};

use crate::cache::{LocalCache, persisted};
use crate::error::{Result, SyncError};
use crate::remote::types::{normalize_cart, normalize_wishlist, wishlist_ids};
use crate::remote::{CartEntry, RemoteError, RemoteStore, WishlistEntry};

/// Point-in-time view of the synchronizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncState {
    pub cart: Cart,
    pub wishlist: Wishlist,
    pub is_authenticated: bool,
    /// A remote cart mutation is in flight.
    pub cart_busy: bool,
    /// A remote wishlist mutation is in flight.
    pub wishlist_busy: bool,
    /// The account cart and wishlist are being loaded after sign-in.
    pub loading: bool,
}

/// Reconciles the cart and wishlist between the guest cache and the account
/// store.
///
/// Cheaply cloneable via `Arc`; clones share state.
pub struct Synchronizer<R, C> {
    inner: Arc<Inner<R, C>>,
}

impl<R, C> Clone for Synchronizer<R, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<R, C> {
    remote: R,
    cache: C,
    format: ProductIdFormat,
    state: RwLock<State>,
    cart_tickets: AtomicU64,
    wishlist_tickets: AtomicU64,
    cart_in_flight: AtomicUsize,
    wishlist_in_flight: AtomicUsize,
    refreshing: AtomicUsize,
}

struct State {
    cart: Cart,
    wishlist: Wishlist,
    authenticated: bool,
    /// Ticket of the last applied remote cart response.
    cart_applied: u64,
    /// Ticket of the last applied remote wishlist response.
    wishlist_applied: u64,
    /// Bumped on every mode change.
    session: u64,
}

/// Counts an operation as in flight until dropped, including on early return.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn issue_ticket(counter: &AtomicU64) -> u64 {
    counter.fetch_add(1, Ordering::SeqCst) + 1
}

impl<R: RemoteStore, C: LocalCache> Synchronizer<R, C> {
    /// Create a synchronizer, hydrating the guest cart and wishlist from the
    /// cache.
    ///
    /// Malformed cache entries are dropped and the cleaned collections are
    /// written back. The synchronizer starts unauthenticated; call
    /// [`set_authenticated`](Self::set_authenticated) once the session is known.
    pub fn new(remote: R, cache: C, format: ProductIdFormat) -> Self {
        let cart = persisted::load_cart(&cache, &format);
        let wishlist = persisted::load_wishlist(&cache, &format);

        debug!(
            cart_lines = cart.len(),
            wishlist_items = wishlist.len(),
            "Hydrated guest cart and wishlist"
        );

        Self {
            inner: Arc::new(Inner {
                remote,
                cache,
                format,
                state: RwLock::new(State {
                    cart,
                    wishlist,
                    authenticated: false,
                    cart_applied: 0,
                    wishlist_applied: 0,
                    session: 0,
                }),
                cart_tickets: AtomicU64::new(0),
                wishlist_tickets: AtomicU64::new(0),
                cart_in_flight: AtomicUsize::new(0),
                wishlist_in_flight: AtomicUsize::new(0),
                refreshing: AtomicUsize::new(0),
            }),
        }
    }

    /// Get a reference to the remote store.
    #[must_use]
    pub fn remote(&self) -> &R {
        &self.inner.remote
    }

    /// Get a reference to the durable cache.
    #[must_use]
    pub fn cache(&self) -> &C {
        &self.inner.cache
    }

    /// The product ID format enforced on cached and remote entries.
    #[must_use]
    pub fn product_id_format(&self) -> &ProductIdFormat {
        &self.inner.format
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.inner
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// Switch between guest and authenticated mode.
    ///
    /// Only the false→true edge loads the account cart and wishlist; setting
    /// the current value again does nothing. Signing out empties the in-memory
    /// collections and the cache, and discards responses still in flight.
    ///
    /// # Errors
    ///
    /// Returns the load error on sign-in, or a cache error on sign-out. The
    /// mode switch itself always takes effect.
    pub async fn set_authenticated(&self, authenticated: bool) -> Result<SyncState> {
        let previous = self.swap_authenticated(authenticated);

        match (previous, authenticated) {
            (false, true) => {
                info!("Signed in, loading account cart and wishlist");
                self.refresh().await
            }
            (true, false) => {
                info!("Signed out, reverting to guest cart and wishlist");
                self.reset_after_sign_out()?;
                Ok(self.snapshot())
            }
            _ => Ok(self.snapshot()),
        }
    }

    fn swap_authenticated(&self, authenticated: bool) -> bool {
        let mut state = self.write();
        let previous = std::mem::replace(&mut state.authenticated, authenticated);
        if previous != authenticated {
            state.session += 1;
        }
        previous
    }

    fn session(&self) -> u64 {
        self.read().session
    }

    fn reset_after_sign_out(&self) -> Result<()> {
        let mut state = self.write();
        state.cart.clear();
        state.wishlist.clear();
        state.cart_applied = self.inner.cart_tickets.load(Ordering::SeqCst);
        state.wishlist_applied = self.inner.wishlist_tickets.load(Ordering::SeqCst);
        persisted::clear(&self.inner.cache)?;
        Ok(())
    }

    /// Reload the cart and wishlist from the account store.
    ///
    /// Both collections are fetched concurrently; each one that succeeds
    /// overwrites memory and cache. Does nothing in guest mode.
    ///
    /// # Errors
    ///
    /// Returns the first fetch error. A collection whose fetch failed keeps
    /// its previous contents.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<SyncState> {
        if !self.is_authenticated() {
            debug!("Refresh skipped in guest mode");
            return Ok(self.snapshot());
        }

        let loaded = {
            let _loading = InFlight::enter(&self.inner.refreshing);
            let session = self.session();
            let cart_ticket = issue_ticket(&self.inner.cart_tickets);
            let wishlist_ticket = issue_ticket(&self.inner.wishlist_tickets);

            let (cart, wishlist) = tokio::join!(
                self.inner.remote.fetch_cart(),
                self.inner.remote.fetch_wishlist()
            );

            let cart = cart
                .map(|entries| self.apply_remote_cart(session, cart_ticket, entries))
                .map_err(|e| log_remote_failure(Collection::Cart, "load", e));
            let wishlist = wishlist
                .map(|entries| self.apply_remote_wishlist(session, wishlist_ticket, entries))
                .map_err(|e| log_remote_failure(Collection::Wishlist, "load", e));
            cart.and(wishlist)
        };

        // Snapshot only once the loading guard is released
        loaded?;
        Ok(self.snapshot())
    }

    // =========================================================================
    // Cart Mutations
    // =========================================================================

    /// Add `quantity` units of a product, incrementing an existing line.
    ///
    /// `info` is cached on new guest lines for display; in authenticated mode
    /// the re-fetched product data is used instead. A zero quantity is a no-op.
    ///
    /// # Errors
    ///
    /// See [`SyncError`]; on a remote error the cart is unchanged.
    #[instrument(skip(self, info), fields(product_id = %product_id))]
    pub async fn add_to_cart(
        &self,
        product_id: &ProductId,
        quantity: u32,
        info: CartLineInfo,
    ) -> Result<SyncState> {
        if quantity == 0 {
            return Ok(self.snapshot());
        }

        if !self.is_authenticated() {
            return self.guest_cart_update(|cart| {
                cart.add(product_id.clone(), quantity, info, Utc::now());
            });
        }

        self.remote_cart_mutation("add", self.inner.remote.add_cart_item(product_id, quantity))
            .await
    }

    /// Remove a product's line.
    ///
    /// # Errors
    ///
    /// See [`SyncError`]; on a remote error the cart is unchanged.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn remove_from_cart(&self, product_id: &ProductId) -> Result<SyncState> {
        if !self.is_authenticated() {
            return self.guest_cart_update(|cart| {
                cart.remove(product_id);
            });
        }

        self.remote_cart_mutation("remove", self.inner.remote.remove_cart_item(product_id))
            .await
    }

    /// Set a line's quantity directly. Zero or less removes the line.
    ///
    /// # Errors
    ///
    /// See [`SyncError`]; on a remote error the cart is unchanged.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn update_quantity(
        &self,
        product_id: &ProductId,
        quantity: i64,
    ) -> Result<SyncState> {
        if quantity <= 0 {
            return self.remove_from_cart(product_id).await;
        }

        if !self.is_authenticated() {
            return self.guest_cart_update(|cart| {
                cart.set_quantity(product_id, quantity);
            });
        }

        let quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
        self.remote_cart_mutation(
            "update",
            self.inner.remote.update_cart_item(product_id, quantity),
        )
        .await
    }

    /// Remove every cart line.
    ///
    /// # Errors
    ///
    /// See [`SyncError`]; on a remote error the cart is unchanged.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self) -> Result<SyncState> {
        if !self.is_authenticated() {
            return self.guest_cart_update(Cart::clear);
        }

        self.remote_cart_mutation("clear", self.inner.remote.clear_cart())
            .await
    }

    // =========================================================================
    // Wishlist Mutations
    // =========================================================================

    /// Add a product to the wishlist. Already-present products are left alone.
    ///
    /// # Errors
    ///
    /// See [`SyncError`]; on a remote error the wishlist is unchanged.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn add_to_wishlist(&self, product_id: &ProductId) -> Result<SyncState> {
        if self.is_in_wishlist(product_id) {
            // The remote endpoint toggles, so a repeated add would remove
            return Ok(self.snapshot());
        }

        if !self.is_authenticated() {
            return self.guest_wishlist_update(|wishlist| {
                wishlist.insert(product_id.clone());
            });
        }

        self.remote_wishlist_mutation("add", self.inner.remote.add_wishlist_item(product_id))
            .await
    }

    /// Remove a product from the wishlist. Absent products are left alone.
    ///
    /// # Errors
    ///
    /// See [`SyncError`]; on a remote error the wishlist is unchanged.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn remove_from_wishlist(&self, product_id: &ProductId) -> Result<SyncState> {
        if !self.is_in_wishlist(product_id) {
            return Ok(self.snapshot());
        }

        if !self.is_authenticated() {
            return self.guest_wishlist_update(|wishlist| {
                wishlist.remove(product_id);
            });
        }

        self.remote_wishlist_mutation(
            "remove",
            self.inner.remote.remove_wishlist_item(product_id),
        )
        .await
    }

    /// Remove the product if present, add it otherwise.
    ///
    /// # Errors
    ///
    /// See [`SyncError`]; on a remote error the wishlist is unchanged.
    pub async fn toggle_wishlist(&self, product_id: &ProductId) -> Result<SyncState> {
        if self.is_in_wishlist(product_id) {
            self.remove_from_wishlist(product_id).await
        } else {
            self.add_to_wishlist(product_id).await
        }
    }

    /// Remove every wishlist entry.
    ///
    /// The account API has no bulk endpoint, so in authenticated mode each
    /// known entry is removed in turn before the re-fetch.
    ///
    /// # Errors
    ///
    /// See [`SyncError`]. If a removal fails part-way, the wishlist keeps its
    /// previous contents until the next successful fetch.
    #[instrument(skip(self))]
    pub async fn clear_wishlist(&self) -> Result<SyncState> {
        if !self.is_authenticated() {
            return self.guest_wishlist_update(Wishlist::clear);
        }

        let ids = wishlist_ids(&self.read().wishlist);
        let remote = &self.inner.remote;
        let request = async move {
            for id in &ids {
                remote.remove_wishlist_item(id).await?;
            }
            Ok::<(), RemoteError>(())
        };

        self.remote_wishlist_mutation("clear", request).await
    }

    // =========================================================================
    // Derived Queries
    // =========================================================================

    /// Current state of both collections and all flags.
    #[must_use]
    pub fn snapshot(&self) -> SyncState {
        let state = self.read();
        SyncState {
            cart: state.cart.clone(),
            wishlist: state.wishlist.clone(),
            is_authenticated: state.authenticated,
            cart_busy: self.is_cart_busy(),
            wishlist_busy: self.is_wishlist_busy(),
            loading: self.is_loading(),
        }
    }

    #[must_use]
    pub fn is_in_cart(&self, product_id: &ProductId) -> bool {
        self.read().cart.contains(product_id)
    }

    #[must_use]
    pub fn is_in_wishlist(&self, product_id: &ProductId) -> bool {
        self.read().wishlist.contains(product_id)
    }

    /// Sum of cart line quantities.
    #[must_use]
    pub fn cart_count(&self) -> u64 {
        self.read().cart.count()
    }

    /// Sum of `quantity × price`; lines without a cached price count as zero.
    #[must_use]
    pub fn cart_total(&self) -> Decimal {
        self.read().cart.total()
    }

    #[must_use]
    pub fn cart_line(&self, product_id: &ProductId) -> Option<CartLine> {
        self.read().cart.line(product_id).cloned()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.read().authenticated
    }

    /// Whether the post-sign-in load is outstanding.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.inner.refreshing.load(Ordering::SeqCst) > 0
    }

    #[must_use]
    pub fn is_cart_busy(&self) -> bool {
        self.inner.cart_in_flight.load(Ordering::SeqCst) > 0
    }

    #[must_use]
    pub fn is_wishlist_busy(&self) -> bool {
        self.inner.wishlist_in_flight.load(Ordering::SeqCst) > 0
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn guest_cart_update(&self, update: impl FnOnce(&mut Cart)) -> Result<SyncState> {
        {
            let mut state = self.write();
            update(&mut state.cart);
            persisted::store_cart(&self.inner.cache, &state.cart)?;
        }
        Ok(self.snapshot())
    }

    fn guest_wishlist_update(&self, update: impl FnOnce(&mut Wishlist)) -> Result<SyncState> {
        {
            let mut state = self.write();
            update(&mut state.wishlist);
            persisted::store_wishlist(&self.inner.cache, &state.wishlist)?;
        }
        Ok(self.snapshot())
    }

    async fn remote_cart_mutation(
        &self,
        action: &'static str,
        request: impl Future<Output = std::result::Result<(), RemoteError>> + Send,
    ) -> Result<SyncState> {
        let _busy = InFlight::enter(&self.inner.cart_in_flight);
        let session = self.session();

        let fetched = async {
            request.await?;
            let ticket = issue_ticket(&self.inner.cart_tickets);
            self.inner
                .remote
                .fetch_cart()
                .await
                .map(|entries| (ticket, entries))
        }
        .await;

        match fetched {
            Ok((ticket, entries)) => {
                self.apply_remote_cart(session, ticket, entries);
                Ok(self.snapshot())
            }
            Err(e) => Err(log_remote_failure(Collection::Cart, action, e)),
        }
    }

    async fn remote_wishlist_mutation(
        &self,
        action: &'static str,
        request: impl Future<Output = std::result::Result<(), RemoteError>> + Send,
    ) -> Result<SyncState> {
        let _busy = InFlight::enter(&self.inner.wishlist_in_flight);
        let session = self.session();

        let fetched = async {
            request.await?;
            let ticket = issue_ticket(&self.inner.wishlist_tickets);
            self.inner
                .remote
                .fetch_wishlist()
                .await
                .map(|entries| (ticket, entries))
        }
        .await;

        match fetched {
            Ok((ticket, entries)) => {
                self.apply_remote_wishlist(session, ticket, entries);
                Ok(self.snapshot())
            }
            Err(e) => Err(log_remote_failure(Collection::Wishlist, action, e)),
        }
    }

    /// Overwrite the cart with a fetched one unless the session changed or a
    /// newer fetch already won.
    fn apply_remote_cart(&self, session: u64, ticket: u64, entries: Vec<CartEntry>) {
        let cart = normalize_cart(entries, &self.inner.format, Utc::now());

        let mut state = self.write();
        if session != state.session {
            debug!(
                session,
                current = state.session,
                "Discarding cart response from an earlier session"
            );
            return;
        }
        if ticket <= state.cart_applied {
            debug!(ticket, applied = state.cart_applied, "Discarding stale cart response");
            return;
        }
        state.cart_applied = ticket;
        state.cart = cart;

        // Written under the lock so cache and memory never disagree on order
        if let Err(e) = persisted::store_cart(&self.inner.cache, &state.cart) {
            warn!(error = %e, "Failed to mirror account cart to cache");
        }
    }

    /// Overwrite the wishlist with a fetched one unless the session changed or
    /// a newer fetch already won.
    fn apply_remote_wishlist(&self, session: u64, ticket: u64, entries: Vec<WishlistEntry>) {
        let wishlist = normalize_wishlist(entries, &self.inner.format);

        let mut state = self.write();
        if session != state.session {
            debug!(
                session,
                current = state.session,
                "Discarding wishlist response from an earlier session"
            );
            return;
        }
        if ticket <= state.wishlist_applied {
            debug!(ticket, applied = state.wishlist_applied, "Discarding stale wishlist response");
            return;
        }
        state.wishlist_applied = ticket;
        state.wishlist = wishlist;

        if let Err(e) = persisted::store_wishlist(&self.inner.cache, &state.wishlist) {
            warn!(error = %e, "Failed to mirror account wishlist to cache");
        }
    }
}

fn log_remote_failure(
    collection: Collection,
    action: &'static str,
    error: RemoteError,
) -> SyncError {
    warn!(%collection, action, error = %error, "Remote update failed, keeping last known state");
    SyncError::Remote(error)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;
    use tokio::sync::oneshot;

    use super::*;
    use crate::cache::{LOCAL_CART_KEY, LOCAL_WISHLIST_KEY, MemoryCache};
    use crate::testing::MockRemote;

    const P1: &str = "65f1a2b3c4d5e6f708192a3b";
    const P2: &str = "65f1a2b3c4d5e6f708192a3c";
    const P3: &str = "65f1a2b3c4d5e6f708192a3d";

    type TestSync = Synchronizer<MockRemote, Arc<MemoryCache>>;

    fn pid(s: &str) -> ProductId {
        ProductIdFormat::default().parse(s).unwrap()
    }

    fn priced(price: i64) -> CartLineInfo {
        CartLineInfo {
            title: None,
            price: Some(Decimal::from(price)),
            image: None,
        }
    }

    fn synchronizer(remote: MockRemote, cache: &Arc<MemoryCache>) -> TestSync {
        Synchronizer::new(remote, Arc::clone(cache), ProductIdFormat::default())
    }

    async fn signed_in(remote: MockRemote) -> (TestSync, Arc<MemoryCache>) {
        let cache = Arc::new(MemoryCache::new());
        let sync = synchronizer(remote, &cache);
        sync.set_authenticated(true).await.unwrap();
        (sync, cache)
    }

    // =========================================================================
    // Guest Mode
    // =========================================================================

    #[tokio::test]
    async fn test_guest_add_twice_yields_one_line() {
        let cache = Arc::new(MemoryCache::new());
        let sync = synchronizer(MockRemote::new(), &cache);

        sync.add_to_cart(&pid(P1), 1, CartLineInfo::default()).await.unwrap();
        let state = sync
            .add_to_cart(&pid(P1), 1, CartLineInfo::default())
            .await
            .unwrap();

        assert_eq!(state.cart.len(), 1);
        assert_eq!(sync.cart_line(&pid(P1)).unwrap().quantity, 2);
        assert_eq!(sync.remote().mutations(), 0);
        assert_eq!(sync.remote().cart_fetches(), 0);
    }

    #[tokio::test]
    async fn test_guest_cart_survives_reload() {
        let cache = Arc::new(MemoryCache::new());
        let sync = synchronizer(MockRemote::new(), &cache);

        sync.add_to_cart(&pid(P1), 2, priced(10)).await.unwrap();
        sync.add_to_cart(&pid(P2), 1, priced(5)).await.unwrap();
        sync.add_to_cart(&pid(P3), 4, CartLineInfo::default()).await.unwrap();
        sync.update_quantity(&pid(P3), 7).await.unwrap();
        sync.remove_from_cart(&pid(P2)).await.unwrap();
        sync.toggle_wishlist(&pid(P2)).await.unwrap();
        sync.toggle_wishlist(&pid(P3)).await.unwrap();
        let before = sync.snapshot();

        let reloaded = synchronizer(MockRemote::new(), &cache);
        assert_eq!(reloaded.snapshot(), before);
    }

    #[tokio::test]
    async fn test_hydrate_drops_invalid_cached_ids() {
        let cache = Arc::new(MemoryCache::new());
        cache
            .write(
                LOCAL_CART_KEY,
                &json!([
                    {"productId": P1, "quantity": 1, "addedAt": "2026-01-01T00:00:00Z"},
                    {"productId": "", "quantity": 1, "addedAt": "2026-01-01T00:00:00Z"},
                    {"productId": null, "quantity": 1, "addedAt": "2026-01-01T00:00:00Z"},
                    {"productId": "65f1a2b3", "quantity": 1, "addedAt": "2026-01-01T00:00:00Z"}
                ])
                .to_string(),
            )
            .unwrap();
        cache
            .write(LOCAL_WISHLIST_KEY, &json!(["", P2, "65f1"]).to_string())
            .unwrap();

        let sync = synchronizer(MockRemote::new(), &cache);

        assert_eq!(sync.snapshot().cart.len(), 1);
        assert!(sync.is_in_cart(&pid(P1)));
        assert_eq!(sync.snapshot().wishlist.len(), 1);

        let cart_cache: serde_json::Value =
            serde_json::from_str(&cache.read(LOCAL_CART_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(cart_cache.as_array().unwrap().len(), 1);
        assert_eq!(
            cache.read(LOCAL_WISHLIST_KEY).unwrap().unwrap(),
            json!([P2]).to_string()
        );
    }

    #[tokio::test]
    async fn test_toggle_wishlist_adds_then_removes() {
        let cache = Arc::new(MemoryCache::new());
        let sync = synchronizer(MockRemote::new(), &cache);

        let state = sync.toggle_wishlist(&pid(P1)).await.unwrap();
        assert!(state.wishlist.contains(&pid(P1)));

        let state = sync.toggle_wishlist(&pid(P1)).await.unwrap();
        assert!(state.wishlist.is_empty());
    }

    #[tokio::test]
    async fn test_derived_totals() {
        let cache = Arc::new(MemoryCache::new());
        let sync = synchronizer(MockRemote::new(), &cache);

        sync.add_to_cart(&pid(P1), 2, priced(10)).await.unwrap();
        sync.add_to_cart(&pid(P2), 1, priced(5)).await.unwrap();

        assert_eq!(sync.cart_count(), 3);
        assert_eq!(sync.cart_total(), Decimal::from(25));
        assert!(sync.cart_line(&pid(P3)).is_none());
    }

    #[tokio::test]
    async fn test_guest_update_quantity_zero_removes() {
        let cache = Arc::new(MemoryCache::new());
        let sync = synchronizer(MockRemote::new(), &cache);

        sync.add_to_cart(&pid(P1), 3, CartLineInfo::default()).await.unwrap();
        let state = sync.update_quantity(&pid(P1), 0).await.unwrap();
        assert!(state.cart.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_is_noop_in_guest_mode() {
        let cache = Arc::new(MemoryCache::new());
        let sync = synchronizer(MockRemote::new().with_cart_line(P1, 1), &cache);

        let state = sync.refresh().await.unwrap();
        assert!(state.cart.is_empty());
        assert_eq!(sync.remote().cart_fetches(), 0);
    }

    // =========================================================================
    // Authentication Transitions
    // =========================================================================

    #[tokio::test]
    async fn test_sign_in_fetches_exactly_once() {
        let cache = Arc::new(MemoryCache::new());
        let sync = synchronizer(MockRemote::new(), &cache);

        sync.set_authenticated(true).await.unwrap();
        assert_eq!(sync.remote().cart_fetches(), 1);
        assert_eq!(sync.remote().wishlist_fetches(), 1);

        sync.set_authenticated(true).await.unwrap();
        assert_eq!(sync.remote().cart_fetches(), 1);
        assert_eq!(sync.remote().wishlist_fetches(), 1);
    }

    #[tokio::test]
    async fn test_staying_signed_out_fetches_nothing() {
        let cache = Arc::new(MemoryCache::new());
        let sync = synchronizer(MockRemote::new(), &cache);

        sync.set_authenticated(false).await.unwrap();
        assert_eq!(sync.remote().cart_fetches(), 0);
        assert_eq!(sync.remote().wishlist_fetches(), 0);
    }

    #[tokio::test]
    async fn test_sign_in_overwrites_guest_state() {
        let cache = Arc::new(MemoryCache::new());
        let remote = MockRemote::new()
            .with_cart_line(P2, 3)
            .with_price(P2, Decimal::from(7))
            .with_wishlist_item(P1)
            .with_wishlist_item(P3);
        let sync = synchronizer(remote, &cache);
        sync.add_to_cart(&pid(P1), 1, CartLineInfo::default()).await.unwrap();

        let state = sync.set_authenticated(true).await.unwrap();

        assert!(state.is_authenticated);
        assert!(!state.loading);
        // Overwritten, not merged
        assert!(!sync.is_in_cart(&pid(P1)));
        assert_eq!(sync.cart_line(&pid(P2)).unwrap().quantity, 3);
        assert_eq!(sync.cart_total(), Decimal::from(21));
        assert!(sync.is_in_wishlist(&pid(P1)));
        assert!(sync.is_in_wishlist(&pid(P3)));

        // Cache mirrors the account collections
        let mirrored = persisted::load_cart(&*cache, &ProductIdFormat::default());
        assert_eq!(mirrored, state.cart);
        let mirrored = persisted::load_wishlist(&*cache, &ProductIdFormat::default());
        assert_eq!(mirrored, state.wishlist);
    }

    #[tokio::test]
    async fn test_sign_in_fetch_failure_keeps_previous_state() {
        let cache = Arc::new(MemoryCache::new());
        let remote = MockRemote::new().with_cart_line(P2, 3);
        remote.fail_fetches(true);
        let sync = synchronizer(remote, &cache);
        sync.add_to_cart(&pid(P1), 1, CartLineInfo::default()).await.unwrap();

        let err = sync.set_authenticated(true).await.unwrap_err();

        assert!(err.is_remote());
        assert!(sync.is_authenticated());
        assert!(!sync.is_loading());
        assert!(sync.is_in_cart(&pid(P1)));
    }

    #[tokio::test]
    async fn test_sign_out_reverts_to_empty_guest_state() {
        let remote = MockRemote::new().with_cart_line(P1, 2).with_wishlist_item(P2);
        let (sync, cache) = signed_in(remote).await;
        assert_eq!(sync.cart_count(), 2);

        let state = sync.set_authenticated(false).await.unwrap();

        assert!(!state.is_authenticated);
        assert!(state.cart.is_empty());
        assert!(state.wishlist.is_empty());
        assert_eq!(cache.read(LOCAL_CART_KEY).unwrap(), None);
        assert_eq!(cache.read(LOCAL_WISHLIST_KEY).unwrap(), None);

        // Guest mutations write to the cache again
        sync.add_to_cart(&pid(P3), 1, CartLineInfo::default()).await.unwrap();
        assert!(cache.read(LOCAL_CART_KEY).unwrap().is_some());
        assert_eq!(sync.remote().mutations(), 0);
    }

    #[tokio::test]
    async fn test_loading_flag_while_sign_in_fetch_outstanding() {
        let cache = Arc::new(MemoryCache::new());
        let sync = synchronizer(MockRemote::new().with_cart_line(P1, 1), &cache);
        let (release, held) = oneshot::channel();
        sync.remote().hold_next_cart_fetch(held);

        let observer = sync.clone();
        let observe = async move {
            observer.remote().cart_fetch_held().await;
            let during = observer.snapshot();
            release.send(()).unwrap();
            during
        };

        let (result, during) = tokio::join!(sync.set_authenticated(true), observe);

        assert!(during.loading);
        assert!(during.is_authenticated);
        assert!(result.unwrap().cart.contains(&pid(P1)));
        assert!(!sync.is_loading());
    }

    // =========================================================================
    // Authenticated Mode
    // =========================================================================

    #[tokio::test]
    async fn test_authenticated_add_refetches_from_remote() {
        let remote = MockRemote::new().with_price(P1, Decimal::from(12));
        let (sync, cache) = signed_in(remote).await;

        let state = sync.add_to_cart(&pid(P1), 2, priced(999)).await.unwrap();

        let line = state.cart.line(&pid(P1)).unwrap();
        assert_eq!(line.quantity, 2);
        // Price comes from the re-fetched product, not the caller's info
        assert_eq!(line.cached_price, Some(Decimal::from(12)));
        assert_eq!(sync.remote().mutations(), 1);
        assert_eq!(sync.remote().cart_fetches(), 2);
        assert_eq!(
            persisted::load_cart(&*cache, &ProductIdFormat::default()),
            state.cart
        );
    }

    #[tokio::test]
    async fn test_authenticated_update_and_remove() {
        let remote = MockRemote::new().with_cart_line(P1, 1).with_cart_line(P2, 1);
        let (sync, _cache) = signed_in(remote).await;

        let state = sync.update_quantity(&pid(P1), 5).await.unwrap();
        assert_eq!(state.cart.line(&pid(P1)).unwrap().quantity, 5);

        let state = sync.update_quantity(&pid(P2), -1).await.unwrap();
        assert!(!state.cart.contains(&pid(P2)));

        let state = sync.clear_cart().await.unwrap();
        assert!(state.cart.is_empty());
    }

    #[tokio::test]
    async fn test_authenticated_wishlist_toggle_and_clear() {
        let (sync, _cache) = signed_in(MockRemote::new().with_wishlist_item(P1)).await;

        let state = sync.toggle_wishlist(&pid(P2)).await.unwrap();
        assert!(state.wishlist.contains(&pid(P2)));

        let state = sync.toggle_wishlist(&pid(P1)).await.unwrap();
        assert!(!state.wishlist.contains(&pid(P1)));

        sync.toggle_wishlist(&pid(P3)).await.unwrap();
        let state = sync.clear_wishlist().await.unwrap();
        assert!(state.wishlist.is_empty());
    }

    #[tokio::test]
    async fn test_repeated_wishlist_add_does_not_toggle_off() {
        let (sync, _cache) = signed_in(MockRemote::new().with_wishlist_item(P1)).await;
        let mutations = sync.remote().mutations();

        let state = sync.add_to_wishlist(&pid(P1)).await.unwrap();

        assert!(state.wishlist.contains(&pid(P1)));
        assert_eq!(sync.remote().mutations(), mutations);
    }

    #[tokio::test]
    async fn test_remote_failure_leaves_state_unchanged() {
        let remote = MockRemote::new().with_cart_line(P1, 1).with_wishlist_item(P2);
        let (sync, _cache) = signed_in(remote).await;
        let before = sync.snapshot();
        sync.remote().fail_mutations(true);

        let err = sync
            .add_to_cart(&pid(P3), 1, CartLineInfo::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Remote(RemoteError::Status { status: 503, .. })));
        assert!(sync.update_quantity(&pid(P1), 4).await.is_err());
        assert!(sync.toggle_wishlist(&pid(P2)).await.is_err());

        let after = sync.snapshot();
        assert_eq!(after, before);
        assert!(!after.cart_busy);
        assert!(!after.wishlist_busy);
    }

    #[tokio::test]
    async fn test_busy_flag_raised_while_mutation_in_flight() {
        let (sync, _cache) = signed_in(MockRemote::new()).await;
        let (release, held) = oneshot::channel();
        sync.remote().hold_next_cart_fetch(held);

        let observer = sync.clone();
        let observe = async move {
            observer.remote().cart_fetch_held().await;
            let during = (observer.is_cart_busy(), observer.is_wishlist_busy());
            release.send(()).unwrap();
            during
        };

        let product = pid(P1);
        let (result, (cart_busy, wishlist_busy)) =
            tokio::join!(sync.add_to_cart(&product, 1, CartLineInfo::default()), observe);

        result.unwrap();
        assert!(cart_busy);
        assert!(!wishlist_busy);
        assert!(!sync.is_cart_busy());
    }

    /// Two overlapping adds where the first re-fetch resolves last. The slow
    /// response describes an older server state and must not win.
    #[tokio::test]
    async fn test_stale_refetch_is_discarded() {
        let (sync, _cache) = signed_in(MockRemote::new()).await;
        let (release, held) = oneshot::channel();
        sync.remote().hold_next_cart_fetch(held);

        let product = pid(P1);
        let second = sync.clone();
        let second_product = product.clone();
        let overtake = async move {
            second.remote().cart_fetch_held().await;
            let result = second
                .add_to_cart(&second_product, 1, CartLineInfo::default())
                .await;
            release.send(()).unwrap();
            result
        };

        let (first, second) = tokio::join!(
            sync.add_to_cart(&product, 1, CartLineInfo::default()),
            overtake
        );

        assert_eq!(second.unwrap().cart.line(&product).unwrap().quantity, 2);
        // The held response saw quantity 1 and was dropped
        assert_eq!(first.unwrap().cart.line(&product).unwrap().quantity, 2);
        assert_eq!(sync.cart_line(&product).unwrap().quantity, 2);
    }

    #[tokio::test]
    async fn test_sign_out_discards_in_flight_response() {
        let (sync, cache) = signed_in(MockRemote::new()).await;
        let (release, held) = oneshot::channel();
        sync.remote().hold_next_cart_fetch(held);

        let other = sync.clone();
        let sign_out = async move {
            other.remote().cart_fetch_held().await;
            let state = other.set_authenticated(false).await;
            release.send(()).unwrap();
            state
        };

        let product = pid(P1);
        let (added, signed_out) = tokio::join!(
            sync.add_to_cart(&product, 1, CartLineInfo::default()),
            sign_out
        );

        signed_out.unwrap();
        assert!(added.unwrap().cart.is_empty());
        assert!(!sync.is_in_cart(&product));
        assert_eq!(cache.read(LOCAL_CART_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_sign_out_during_cart_request_discards_response() {
        let (sync, cache) = signed_in(MockRemote::new()).await;
        let (release, held) = oneshot::channel();
        sync.remote().hold_next_mutation(held);

        let other = sync.clone();
        let sign_out = async move {
            other.remote().mutation_held().await;
            let state = other.set_authenticated(false).await;
            release.send(()).unwrap();
            state
        };

        let product = pid(P1);
        let (added, signed_out) = tokio::join!(
            sync.add_to_cart(&product, 1, CartLineInfo::default()),
            sign_out
        );

        signed_out.unwrap();
        assert!(added.unwrap().cart.is_empty());
        assert!(!sync.is_in_cart(&product));
        assert!(!sync.is_authenticated());
        assert_eq!(cache.read(LOCAL_CART_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_sign_out_during_wishlist_request_discards_response() {
        let (sync, cache) = signed_in(MockRemote::new()).await;
        let (release, held) = oneshot::channel();
        sync.remote().hold_next_mutation(held);

        let other = sync.clone();
        let sign_out = async move {
            other.remote().mutation_held().await;
            let state = other.set_authenticated(false).await;
            release.send(()).unwrap();
            state
        };

        let product = pid(P2);
        let (toggled, signed_out) = tokio::join!(sync.toggle_wishlist(&product), sign_out);

        signed_out.unwrap();
        assert!(toggled.unwrap().wishlist.is_empty());
        assert!(!sync.is_in_wishlist(&product));
        assert_eq!(cache.read(LOCAL_WISHLIST_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_returned_state_is_not_loading() {
        let remote = MockRemote::new().with_cart_line(P1, 1).with_wishlist_item(P2);
        let cache = Arc::new(MemoryCache::new());
        let sync = synchronizer(remote, &cache);

        let signed_in = sync.set_authenticated(true).await.unwrap();
        assert!(!signed_in.loading);
        assert_eq!(signed_in.cart.len(), 1);

        let refreshed = sync.refresh().await.unwrap();
        assert!(!refreshed.loading);
        assert!(!sync.is_loading());
        assert_eq!(refreshed.wishlist.len(), 1);
    }
}
