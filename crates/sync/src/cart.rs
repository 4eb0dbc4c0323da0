//! Session-scoped in-memory cart.
//!
//! The store is the single authority for cart contents. Mutations are
//! synchronous and observable by every reader as soon as they return; the
//! derived [`CartAggregate`] is republished on a watch channel after each
//! successful mutation. Cart state is never written back to the remote store.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use giftshop_core::{CartAggregate, CartLine, CartLineKey, CurrencyCode};
use tokio::sync::watch;
use tracing::instrument;

use crate::error::CartError;

/// In-memory cart with merge-on-add semantics.
///
/// Cheaply cloneable; clones share the same lines.
#[derive(Clone)]
pub struct CartStore {
    inner: Arc<CartStoreInner>,
}

struct CartStoreInner {
    currency: CurrencyCode,
    lines: RwLock<Vec<CartLine>>,
    aggregate_tx: watch::Sender<CartAggregate>,
}

impl CartStore {
    /// Create an empty cart priced in `currency`.
    #[must_use]
    pub fn new(currency: CurrencyCode) -> Self {
        let (aggregate_tx, _) = watch::channel(CartAggregate::empty(currency));
        Self {
            inner: Arc::new(CartStoreInner {
                currency,
                lines: RwLock::new(Vec::new()),
                aggregate_tx,
            }),
        }
    }

    /// Currency every line must be priced in.
    #[must_use]
    pub fn currency(&self) -> CurrencyCode {
        self.inner.currency
    }

    /// Add a line, merging quantities into an existing line with the same key.
    ///
    /// # Errors
    ///
    /// Returns `CartError::InvalidQuantity` if `line.quantity` is 0, or
    /// `CartError::CurrencyMismatch` if the line is priced in another currency.
    #[instrument(skip(self, line), fields(product_id = %line.product_id, quantity = line.quantity))]
    pub fn add_or_merge(&self, line: CartLine) -> Result<CartAggregate, CartError> {
        if line.quantity < 1 {
            return Err(CartError::InvalidQuantity {
                requested: i64::from(line.quantity),
            });
        }
        if line.unit_price.currency_code != self.inner.currency {
            return Err(CartError::CurrencyMismatch {
                expected: self.inner.currency,
                found: line.unit_price.currency_code,
            });
        }

        let mut lines = self.write();
        let key = line.key();
        if let Some(existing) = lines.iter_mut().find(|l| l.matches(&key)) {
            let requested = i64::from(existing.quantity) + i64::from(line.quantity);
            let merged = existing
                .quantity
                .checked_add(line.quantity)
                .ok_or(CartError::InvalidQuantity { requested })?;
            existing.quantity = merged;
            tracing::debug!(quantity = merged, "Merged into existing cart line");
        } else {
            lines.push(line);
            tracing::debug!("Appended cart line");
        }
        Ok(self.publish(&lines))
    }

    /// Set a line's quantity in place.
    ///
    /// # Errors
    ///
    /// Returns `CartError::InvalidQuantity` if `quantity < 1` (the cart is
    /// left untouched), or `CartError::LineNotFound` if no line has `key`.
    #[instrument(skip(self, key), fields(product_id = %key.product_id))]
    pub fn set_quantity(
        &self,
        key: &CartLineKey,
        quantity: i64,
    ) -> Result<CartAggregate, CartError> {
        let valid = u32::try_from(quantity)
            .ok()
            .filter(|q| *q >= 1)
            .ok_or(CartError::InvalidQuantity {
                requested: quantity,
            })?;

        let mut lines = self.write();
        let line = lines
            .iter_mut()
            .find(|l| l.matches(key))
            .ok_or(CartError::LineNotFound)?;
        line.quantity = valid;
        Ok(self.publish(&lines))
    }

    /// Increase a line's quantity by one.
    ///
    /// # Errors
    ///
    /// Returns `CartError::LineNotFound` if no line has `key`.
    pub fn increment(&self, key: &CartLineKey) -> Result<CartAggregate, CartError> {
        let mut lines = self.write();
        let line = lines
            .iter_mut()
            .find(|l| l.matches(key))
            .ok_or(CartError::LineNotFound)?;
        line.quantity = line.quantity.saturating_add(1);
        Ok(self.publish(&lines))
    }

    /// Decrease a line's quantity by one, removing the line when it reaches zero.
    ///
    /// # Errors
    ///
    /// Returns `CartError::LineNotFound` if no line has `key`.
    pub fn decrement(&self, key: &CartLineKey) -> Result<CartAggregate, CartError> {
        let mut lines = self.write();
        let index = lines
            .iter()
            .position(|l| l.matches(key))
            .ok_or(CartError::LineNotFound)?;
        match lines.get_mut(index) {
            Some(line) if line.quantity > 1 => line.quantity -= 1,
            _ => {
                lines.remove(index);
            }
        }
        Ok(self.publish(&lines))
    }

    /// Delete a line. Absent keys are a no-op.
    pub fn remove(&self, key: &CartLineKey) -> CartAggregate {
        let mut lines = self.write();
        let before = lines.len();
        lines.retain(|l| !l.matches(key));
        if lines.len() == before {
            return CartAggregate::from_lines(lines.iter(), self.inner.currency);
        }
        self.publish(&lines)
    }

    /// Empty the cart (after checkout completes).
    pub fn clear(&self) {
        let mut lines = self.write();
        lines.clear();
        self.publish(&lines);
        tracing::info!("Cart cleared");
    }

    /// Current totals. Pure derivation over the lines.
    #[must_use]
    pub fn aggregate(&self) -> CartAggregate {
        CartAggregate::from_lines(self.read().iter(), self.inner.currency)
    }

    /// Snapshot of the lines in insertion order.
    #[must_use]
    pub fn lines(&self) -> Vec<CartLine> {
        self.read().clone()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Receiver that always holds the latest aggregate (header badge, checkout).
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CartAggregate> {
        self.inner.aggregate_tx.subscribe()
    }

    /// Publish while the write guard is still held so observers see
    /// aggregates in mutation order.
    fn publish(&self, lines: &[CartLine]) -> CartAggregate {
        let aggregate = CartAggregate::from_lines(lines, self.inner.currency);
        self.inner.aggregate_tx.send_if_modified(|current| {
            if *current == aggregate {
                false
            } else {
                *current = aggregate;
                true
            }
        });
        aggregate
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<CartLine>> {
        self.inner
            .lines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<CartLine>> {
        self.inner
            .lines
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for CartStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartStore")
            .field("currency", &self.inner.currency)
            .field("lines", &self.read().len())
            .finish()
    }
}
