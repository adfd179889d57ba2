//! In-memory [`RemoteStore`] double for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use rust_decimal::Decimal;
use tokio::sync::{Notify, oneshot};
use voltshop_core::ProductId;

use crate::remote::types::{ProductDocument, ProductRef};
use crate::remote::{CartEntry, RemoteCartLine, RemoteError, RemoteStore, WishlistEntry};

#[derive(Default)]
struct Account {
    cart: Vec<(String, u32)>,
    wishlist: Vec<String>,
}

/// Account store that keeps one cart and wishlist in memory.
///
/// Counts fetches, can be told to fail, and can hold a cart fetch or a
/// mutation open to reproduce overlapping requests.
#[derive(Default)]
pub struct MockRemote {
    account: Mutex<Account>,
    prices: Mutex<HashMap<String, Decimal>>,
    fail_mutations: AtomicBool,
    fail_fetches: AtomicBool,
    cart_fetches: AtomicUsize,
    wishlist_fetches: AtomicUsize,
    mutations: AtomicUsize,
    held_cart_fetch: Mutex<Option<oneshot::Receiver<()>>>,
    fetch_held: Notify,
    held_mutation: Mutex<Option<oneshot::Receiver<()>>>,
    mutation_held: Notify,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn account(&self) -> std::sync::MutexGuard<'_, Account> {
        self.account.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed the account cart.
    pub fn with_cart_line(self, product_id: &str, quantity: u32) -> Self {
        self.account().cart.push((product_id.to_string(), quantity));
        self
    }

    /// Seed the account wishlist.
    pub fn with_wishlist_item(self, product_id: &str) -> Self {
        self.account().wishlist.push(product_id.to_string());
        self
    }

    /// Set the catalog price returned inside embedded product documents.
    pub fn with_price(self, product_id: &str, price: Decimal) -> Self {
        self.prices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(product_id.to_string(), price);
        self
    }

    pub fn fail_mutations(&self, fail: bool) {
        self.fail_mutations.store(fail, Ordering::SeqCst);
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.fail_fetches.store(fail, Ordering::SeqCst);
    }

    pub fn cart_fetches(&self) -> usize {
        self.cart_fetches.load(Ordering::SeqCst)
    }

    pub fn wishlist_fetches(&self) -> usize {
        self.wishlist_fetches.load(Ordering::SeqCst)
    }

    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    /// Make the next cart fetch capture its response, then wait for `release`
    /// before returning it.
    pub fn hold_next_cart_fetch(&self, release: oneshot::Receiver<()>) {
        *self
            .held_cart_fetch
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(release);
    }

    /// Resolves once a held cart fetch has captured its response.
    pub async fn cart_fetch_held(&self) {
        self.fetch_held.notified().await;
    }

    /// Make the next mutation wait for `release` before it touches the
    /// account.
    pub fn hold_next_mutation(&self, release: oneshot::Receiver<()>) {
        *self
            .held_mutation
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(release);
    }

    /// Resolves once a held mutation has started waiting.
    pub async fn mutation_held(&self) {
        self.mutation_held.notified().await;
    }

    async fn begin_mutation(&self) -> Result<(), RemoteError> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        let held = self
            .held_mutation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(release) = held {
            self.mutation_held.notify_one();
            let _ = release.await;
        }
        if self.fail_mutations.load(Ordering::SeqCst) {
            return Err(RemoteError::Status {
                status: 503,
                message: "Service unavailable".to_string(),
            });
        }
        Ok(())
    }

    fn check_fetch(&self) -> Result<(), RemoteError> {
        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(RemoteError::Unsuccessful("Account store offline".to_string()));
        }
        Ok(())
    }

    fn cart_lines(&self) -> Vec<RemoteCartLine> {
        let prices = self
            .prices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        self.account()
            .cart
            .iter()
            .map(|(id, quantity)| RemoteCartLine {
                id: None,
                product: ProductRef::Document(ProductDocument {
                    id: id.clone(),
                    title: Some(format!("Product {id}")),
                    price: prices.get(id).copied(),
                    background_image: None,
                }),
                quantity: *quantity,
                added_at: None,
            })
            .collect()
    }
}

impl RemoteStore for MockRemote {
    async fn fetch_cart(&self) -> Result<Vec<CartEntry>, RemoteError> {
        self.cart_fetches.fetch_add(1, Ordering::SeqCst);
        self.check_fetch()?;

        let lines = self.cart_lines();
        let held = self
            .held_cart_fetch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(release) = held {
            self.fetch_held.notify_one();
            let _ = release.await;
        }
        Ok(lines.into_iter().map(CartEntry::from).collect())
    }

    async fn add_cart_item(
        &self,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<(), RemoteError> {
        self.begin_mutation().await?;
        let mut account = self.account();
        let position = account
            .cart
            .iter()
            .position(|(id, _)| id == product_id.as_str());
        match position.and_then(|i| account.cart.get_mut(i)) {
            Some((_, existing)) => *existing += quantity,
            None => account.cart.push((product_id.to_string(), quantity)),
        }
        Ok(())
    }

    async fn remove_cart_item(&self, product_id: &ProductId) -> Result<(), RemoteError> {
        self.begin_mutation().await?;
        self.account()
            .cart
            .retain(|(id, _)| id != product_id.as_str());
        Ok(())
    }

    async fn update_cart_item(
        &self,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<(), RemoteError> {
        self.begin_mutation().await?;
        if let Some((_, existing)) = self
            .account()
            .cart
            .iter_mut()
            .find(|(id, _)| id == product_id.as_str())
        {
            *existing = quantity;
        }
        Ok(())
    }

    async fn clear_cart(&self) -> Result<(), RemoteError> {
        self.begin_mutation().await?;
        self.account().cart.clear();
        Ok(())
    }

    async fn fetch_wishlist(&self) -> Result<Vec<WishlistEntry>, RemoteError> {
        self.wishlist_fetches.fetch_add(1, Ordering::SeqCst);
        self.check_fetch()?;

        // Mix the shapes the real API produces
        Ok(self
            .account()
            .wishlist
            .iter()
            .enumerate()
            .map(|(i, id)| match i % 3 {
                0 => WishlistEntry::Id(id.clone()),
                1 => WishlistEntry::Nested {
                    product: ProductRef::Id(id.clone()),
                },
                _ => WishlistEntry::Bare { id: id.clone() },
            })
            .collect())
    }

    async fn add_wishlist_item(&self, product_id: &ProductId) -> Result<(), RemoteError> {
        self.begin_mutation().await?;
        let mut account = self.account();
        if !account.wishlist.iter().any(|id| id == product_id.as_str()) {
            account.wishlist.push(product_id.to_string());
        }
        Ok(())
    }

    async fn remove_wishlist_item(&self, product_id: &ProductId) -> Result<(), RemoteError> {
        self.begin_mutation().await?;
        self.account()
            .wishlist
            .retain(|id| id != product_id.as_str());
        Ok(())
    }
}
