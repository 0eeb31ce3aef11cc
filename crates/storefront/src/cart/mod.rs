//! Cart store: a local mirror of the server-side cart.
//!
//! Every mutation is a server call followed by a local reconciliation with
//! the server's answer. A failed call leaves the local lines untouched.
//!
//! # Ordering
//!
//! Mutations of the same product are serialized through a per-product async
//! lock, so two quick "+" presses become two sequential `PUT`s with the
//! second based on the first one's result. Different products proceed
//! concurrently.
//!
//! # Stale results
//!
//! [`CartStore::reset`] bumps an epoch. Operations started under an older
//! epoch finish their server call but do not touch local state and return
//! [`CartError::Discarded`].

mod error;

pub use error::CartError;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bazaar_core::{CartLineId, Price, ProductId};
use dashmap::DashMap;
use futures::{StreamExt, TryStreamExt, stream};
use tokio::sync::{Mutex, OwnedMutexGuard, watch};
use tracing::{debug, instrument, warn};

use crate::api::ApiClient;
use crate::models::{Product, WireCartLine};
use crate::session::SessionStore;
use crate::telemetry;

/// One cart line with the product snapshot it was loaded with.
///
/// Quantity is always at least 1; a line that would drop to 0 is deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartLine {
    pub id: CartLineId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub product: Product,
}

impl CartLine {
    fn from_wire(wire: WireCartLine, product: Product) -> Self {
        Self {
            id: wire.id,
            product_id: wire.product_id,
            quantity: wire.quantity,
            product,
        }
    }

    /// Unit price from the snapshot.
    #[must_use]
    pub const fn unit_price(&self) -> Price {
        self.product.price
    }

    /// Unit price times quantity.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.product.price.times(self.quantity)
    }
}

/// Shared handle to the cart.
#[derive(Clone)]
pub struct CartStore {
    inner: Arc<CartStoreInner>,
}

struct CartStoreInner {
    client: ApiClient,
    session: SessionStore,
    lines: watch::Sender<Vec<CartLine>>,
    line_locks: DashMap<ProductId, Arc<Mutex<()>>>,
    epoch: AtomicU64,
    fetch_concurrency: usize,
}

impl CartStore {
    /// Create an empty cart bound to `session`.
    ///
    /// `fetch_concurrency` bounds parallel product fetches during
    /// [`load`](Self::load).
    #[must_use]
    pub fn new(client: ApiClient, session: SessionStore, fetch_concurrency: usize) -> Self {
        let (lines, _) = watch::channel(Vec::new());
        Self {
            inner: Arc::new(CartStoreInner {
                client,
                session,
                lines,
                line_locks: DashMap::new(),
                epoch: AtomicU64::new(0),
                fetch_concurrency: fetch_concurrency.max(1),
            }),
        }
    }

    // =========================================================================
    // State Access
    // =========================================================================

    /// Snapshot of all lines.
    #[must_use]
    pub fn lines(&self) -> Vec<CartLine> {
        self.inner.lines.borrow().clone()
    }

    /// The line for `product_id`, if present.
    #[must_use]
    pub fn line_for(&self, product_id: ProductId) -> Option<CartLine> {
        self.inner
            .lines
            .borrow()
            .iter()
            .find(|line| line.product_id == product_id)
            .cloned()
    }

    /// Total number of units.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.inner.lines.borrow().iter().map(|l| l.quantity).sum()
    }

    /// Sum of line totals at snapshot prices.
    #[must_use]
    pub fn subtotal(&self) -> Price {
        self.inner
            .lines
            .borrow()
            .iter()
            .map(CartLine::line_total)
            .sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lines.borrow().is_empty()
    }

    /// Observe line changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Vec<CartLine>> {
        self.inner.lines.subscribe()
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Replace local lines with the server's cart.
    ///
    /// Without a signed-in user the cart is simply emptied. Product snapshots
    /// are fetched with bounded concurrency; if any fetch fails (including a
    /// product that no longer exists) the whole load fails and the local
    /// lines stay as they were.
    ///
    /// # Errors
    ///
    /// Returns the first API error, or `CartError::Discarded` if the cart was
    /// reset during the load.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<(), CartError> {
        if !self.inner.session.can_use_cart() {
            self.inner.lines.send_replace(Vec::new());
            return Ok(());
        }

        let epoch = self.current_epoch();
        let client = &self.inner.client;

        let wire = client
            .cart_lines()
            .await
            .inspect_err(|e| telemetry::report_api_error("cart.load", e))?;

        let lines: Vec<CartLine> = stream::iter(wire)
            .map(|line| async move {
                let product = client.fetch_product(line.product_id).await?;
                Ok::<_, crate::api::ApiError>(CartLine::from_wire(line, product))
            })
            .buffered(self.inner.fetch_concurrency)
            .try_collect()
            .await
            .inspect_err(|e| telemetry::report_api_error("cart.load", e))?;

        self.apply(epoch, |current| *current = lines)?;
        debug!(lines = self.inner.lines.borrow().len(), "Cart loaded");
        Ok(())
    }

    /// Add `quantity` units of a product.
    ///
    /// The backend merges into an existing line; the local quantity is set to
    /// the server-confirmed value.
    ///
    /// # Errors
    ///
    /// Returns `CartError::InvalidQuantity` for zero (no network call),
    /// `CartError::NotAuthenticated` without a session, or the API error.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn add(&self, product_id: ProductId, quantity: u32) -> Result<CartLine, CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity);
        }
        self.require_session()?;

        let epoch = self.current_epoch();
        let _guard = self.lock_line(product_id).await;

        // Fetch the snapshot first so a missing product never reaches the cart.
        let product = match self.line_for(product_id) {
            Some(line) => line.product,
            None => self.inner.client.fetch_product(product_id).await?,
        };

        let wire = self
            .inner
            .client
            .add_cart_line(product_id, quantity)
            .await
            .inspect_err(|e| telemetry::report_api_error("cart.add", e))?;

        let line = CartLine::from_wire(wire, product);
        let applied = line.clone();
        self.apply(epoch, move |lines| upsert(lines, applied))?;

        telemetry::add_breadcrumb(
            "cart",
            "Added to cart",
            Some(&[("product_id", &product_id.to_string())]),
        );
        Ok(line)
    }

    /// Raise a line's quantity by one. No-op without a line for the product.
    ///
    /// # Errors
    ///
    /// Returns `CartError::NotAuthenticated` without a session, or the API
    /// error.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn increment(&self, product_id: ProductId) -> Result<Option<CartLine>, CartError> {
        self.require_session()?;
        let epoch = self.current_epoch();
        let _guard = self.lock_line(product_id).await;

        let Some(line) = self.line_for(product_id) else {
            debug!("No cart line to increment");
            return Ok(None);
        };

        let quantity = line.quantity.saturating_add(1);
        self.set_quantity(epoch, line, quantity).await.map(Some)
    }

    /// Lower a line's quantity by one; at quantity 1 the line is deleted.
    /// No-op without a line for the product.
    ///
    /// Returns the updated line, or `None` when the line was deleted or did
    /// not exist.
    ///
    /// # Errors
    ///
    /// Returns `CartError::NotAuthenticated` without a session, or the API
    /// error.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn decrement(&self, product_id: ProductId) -> Result<Option<CartLine>, CartError> {
        self.require_session()?;
        let epoch = self.current_epoch();
        let _guard = self.lock_line(product_id).await;

        let Some(line) = self.line_for(product_id) else {
            debug!("No cart line to decrement");
            return Ok(None);
        };

        if line.quantity <= 1 {
            self.delete_line(epoch, line.id).await?;
            return Ok(None);
        }

        let quantity = line.quantity - 1;
        self.set_quantity(epoch, line, quantity).await.map(Some)
    }

    /// Delete a line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::NotAuthenticated` without a session, or the API
    /// error.
    #[instrument(skip(self), fields(line_id = %line_id))]
    pub async fn remove(&self, line_id: CartLineId) -> Result<(), CartError> {
        self.require_session()?;
        let epoch = self.current_epoch();

        let product_id = self
            .inner
            .lines
            .borrow()
            .iter()
            .find(|line| line.id == line_id)
            .map(|line| line.product_id);
        let _guard = match product_id {
            Some(product_id) => Some(self.lock_line(product_id).await),
            None => None,
        };

        self.delete_line(epoch, line_id).await
    }

    /// Forget all lines and discard results of in-flight operations.
    ///
    /// Called on sign-out and when the session is invalidated.
    pub fn reset(&self) {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        self.inner.lines.send_replace(Vec::new());
        debug!("Cart reset");
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn require_session(&self) -> Result<(), CartError> {
        if self.inner.session.can_use_cart() {
            Ok(())
        } else {
            Err(CartError::NotAuthenticated)
        }
    }

    fn current_epoch(&self) -> u64 {
        self.inner.epoch.load(Ordering::SeqCst)
    }

    /// Serialize mutations of one product.
    async fn lock_line(&self, product_id: ProductId) -> LineGuard<'_> {
        // Clone the Arc so no DashMap reference is held across the await.
        let lock = self
            .inner
            .line_locks
            .entry(product_id)
            .or_default()
            .clone();
        LineGuard {
            locks: &self.inner.line_locks,
            product_id,
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Apply `update` to the lines unless the cart was reset since `epoch`.
    fn apply(
        &self,
        epoch: u64,
        update: impl FnOnce(&mut Vec<CartLine>),
    ) -> Result<(), CartError> {
        let mut update = Some(update);
        let applied = self.inner.lines.send_if_modified(|lines| {
            if self.current_epoch() != epoch {
                return false;
            }
            if let Some(update) = update.take() {
                update(lines);
            }
            true
        });

        if applied {
            Ok(())
        } else {
            warn!("Cart was reset during the operation, discarding result");
            Err(CartError::Discarded)
        }
    }

    async fn set_quantity(
        &self,
        epoch: u64,
        line: CartLine,
        quantity: u32,
    ) -> Result<CartLine, CartError> {
        let wire = self
            .inner
            .client
            .update_cart_line(line.id, quantity)
            .await
            .inspect_err(|e| telemetry::report_api_error("cart.update", e))?;

        let updated = CartLine {
            id: wire.id,
            quantity: wire.quantity,
            ..line
        };
        let applied = updated.clone();
        self.apply(epoch, move |lines| upsert(lines, applied))?;
        Ok(updated)
    }

    async fn delete_line(&self, epoch: u64, line_id: CartLineId) -> Result<(), CartError> {
        self.inner
            .client
            .delete_cart_line(line_id)
            .await
            .inspect_err(|e| telemetry::report_api_error("cart.remove", e))?;

        self.apply(epoch, |lines| lines.retain(|line| line.id != line_id))
    }
}

/// Holds a product's mutation lock and drops the map entry once nobody else
/// is waiting on it.
struct LineGuard<'a> {
    locks: &'a DashMap<ProductId, Arc<Mutex<()>>>,
    product_id: ProductId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for LineGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters hold a clone, so a count of 1 means only the map is left.
        self.locks
            .remove_if(&self.product_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Replace the line for the same product, or append.
fn upsert(lines: &mut Vec<CartLine>, line: CartLine) {
    match lines.iter_mut().find(|l| l.product_id == line.product_id) {
        Some(existing) => *existing = line,
        None => lines.push(line),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bazaar_core::{CategoryId, UserId};

    use super::*;
    use crate::api::ApiError;
    use crate::config::StorefrontConfig;
    use crate::models::User;

    fn product(id: i64, price_minor: i64) -> Product {
        Product {
            id: ProductId::new(id),
            name: format!("Product {id}"),
            description: String::new(),
            price: Price::from_minor(price_minor),
            category_id: CategoryId::new(1),
            stock: 10,
            image_url: String::new(),
        }
    }

    fn line(id: i64, product_id: i64, quantity: u32, price_minor: i64) -> CartLine {
        CartLine {
            id: CartLineId::new(id),
            product_id: ProductId::new(product_id),
            quantity,
            product: product(product_id, price_minor),
        }
    }

    fn offline_store() -> (CartStore, SessionStore) {
        let config = StorefrontConfig::for_api_url("http://127.0.0.1:9").unwrap();
        let client = ApiClient::new(&config).unwrap();
        let session = SessionStore::new(client.clone());
        (CartStore::new(client, session.clone(), 4), session)
    }

    fn sign_in(session: &SessionStore) {
        session.login(User {
            id: UserId::new(1),
            login: "ivan".to_string(),
            username: "Ivan".to_string(),
            email: "ivan@example.com".to_string(),
            is_admin: false,
        });
    }

    #[test]
    fn test_upsert_replaces_by_product() {
        let mut lines = vec![line(1, 10, 1, 100), line(2, 20, 1, 100)];
        upsert(&mut lines, line(1, 10, 5, 100));
        upsert(&mut lines, line(3, 30, 2, 100));
        assert_eq!(
            lines.iter().map(|l| (l.product_id.as_i64(), l.quantity)).collect::<Vec<_>>(),
            vec![(10, 5), (20, 1), (30, 2)]
        );
    }

    #[test]
    fn test_totals() {
        let (store, _) = offline_store();
        store
            .inner
            .lines
            .send_replace(vec![line(1, 10, 2, 10_000), line(2, 20, 3, 250)]);
        assert_eq!(store.item_count(), 5);
        assert_eq!(store.subtotal(), Price::from_minor(20_750));
        assert_eq!(store.line_for(ProductId::new(20)).unwrap().line_total(), Price::from_minor(750));
    }

    #[tokio::test]
    async fn test_add_zero_is_rejected_locally() {
        let (store, session) = offline_store();
        sign_in(&session);
        let err = store.add(ProductId::new(1), 0).await.unwrap_err();
        assert!(matches!(err, CartError::InvalidQuantity));
    }

    #[tokio::test]
    async fn test_mutations_require_session() {
        let (store, _) = offline_store();
        let err = store.add(ProductId::new(1), 1).await.unwrap_err();
        assert!(matches!(err, CartError::NotAuthenticated));
    }

    #[tokio::test]
    async fn test_load_without_session_empties_cart() {
        let (store, _) = offline_store();
        store.inner.lines.send_replace(vec![line(1, 10, 1, 100)]);
        store.load().await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_decrement_missing_line_is_noop() {
        let (store, session) = offline_store();
        sign_in(&session);
        assert!(store.decrement(ProductId::new(99)).await.unwrap().is_none());
        assert!(store.increment(ProductId::new(99)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_offline_failure_leaves_lines_untouched() {
        let (store, session) = offline_store();
        sign_in(&session);
        store.inner.lines.send_replace(vec![line(1, 10, 2, 100)]);

        let err = store.increment(ProductId::new(10)).await.unwrap_err();
        assert!(matches!(err.api_error(), Some(ApiError::Network(_))));
        assert_eq!(store.line_for(ProductId::new(10)).unwrap().quantity, 2);
    }

    #[tokio::test]
    async fn test_line_locks_are_released_after_use() {
        let (store, session) = offline_store();
        sign_in(&session);
        store
            .inner
            .lines
            .send_replace(vec![line(1, 10, 2, 100), line(2, 20, 1, 100)]);

        let _ = store.increment(ProductId::new(10)).await;
        let _ = store.decrement(ProductId::new(20)).await;
        let _ = store.add(ProductId::new(30), 1).await;
        assert!(store.inner.line_locks.is_empty());

        let held = store.lock_line(ProductId::new(10)).await;
        assert_eq!(store.inner.line_locks.len(), 1);
        drop(held);
        assert!(store.inner.line_locks.is_empty());
    }

    #[test]
    fn test_apply_after_reset_is_discarded() {
        let (store, _) = offline_store();
        let epoch = store.current_epoch();
        store.reset();
        let result = store.apply(epoch, |lines| lines.push(line(1, 10, 1, 100)));
        assert!(matches!(result, Err(CartError::Discarded)));
        assert!(store.is_empty());
    }
}
