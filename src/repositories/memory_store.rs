//! Process-local backend used by tests and single-node demos.
//!
//! A transaction holds the store lock for its whole lifetime and restores a
//! snapshot on rollback. The store can also be built without transaction
//! support to exercise the degraded checkout path.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::db::{TransactionContext, TransactionalStorage};
use crate::errors::{StorageError, UniqueConstraint};
use crate::models::{CartLine, CatalogEntry, Order, OrderStatus, Product, StockRecord, Variant};
use crate::repositories::{CartStore, CatalogStore, OrderStore};

#[derive(Debug, Clone, Default)]
struct State {
    products: HashMap<Uuid, Product>,
    variants: HashMap<Uuid, Variant>,
    cart_lines: Vec<CartLine>,
    orders: Vec<Order>,
}

impl State {
    fn decrement(
        &mut self,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        quantity: i32,
    ) -> Option<StockRecord> {
        if quantity <= 0 {
            return None;
        }
        let parent_active = self
            .products
            .get(&product_id)
            .map(|p| p.status.is_active())
            .unwrap_or(false);
        if !parent_active {
            return None;
        }

        let stock = match variant_id {
            None => {
                let product = self.products.get_mut(&product_id)?;
                if product.stock < quantity {
                    return None;
                }
                product.stock -= quantity;
                product.updated_at = Utc::now();
                product.stock
            }
            Some(variant_id) => {
                let variant = self.variants.get_mut(&variant_id)?;
                if variant.product_id != product_id
                    || !variant.status.is_active()
                    || variant.stock < quantity
                {
                    return None;
                }
                variant.stock -= quantity;
                variant.updated_at = Utc::now();
                variant.stock
            }
        };

        Some(StockRecord {
            product_id,
            variant_id,
            stock,
        })
    }

    fn increment(
        &mut self,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        quantity: i32,
    ) -> Option<StockRecord> {
        if quantity <= 0 {
            return None;
        }
        let stock = match variant_id {
            None => {
                let product = self.products.get_mut(&product_id)?;
                product.stock += quantity;
                product.updated_at = Utc::now();
                product.stock
            }
            Some(variant_id) => {
                let variant = self
                    .variants
                    .get_mut(&variant_id)
                    .filter(|v| v.product_id == product_id)?;
                variant.stock += quantity;
                variant.updated_at = Utc::now();
                variant.stock
            }
        };

        Some(StockRecord {
            product_id,
            variant_id,
            stock,
        })
    }

    fn entry(&self, product: &Product) -> CatalogEntry {
        let mut variants: Vec<Variant> = self
            .variants
            .values()
            .filter(|v| v.product_id == product.id)
            .cloned()
            .collect();
        variants.sort_by_key(|v| v.id);
        CatalogEntry::new(product.clone(), variants)
    }

    fn insert_order(&mut self, order: Order) -> Result<Order, StorageError> {
        for existing in &self.orders {
            if order.idempotency_key.is_some()
                && existing.user_id == order.user_id
                && existing.idempotency_key == order.idempotency_key
            {
                return Err(unique_violation(
                    UniqueConstraint::IdempotencyKey,
                    "orders.user_id, orders.idempotency_key",
                ));
            }
            if order.transaction_id.is_some() && existing.transaction_id == order.transaction_id {
                return Err(unique_violation(
                    UniqueConstraint::TransactionId,
                    "orders.transaction_id",
                ));
            }
            if existing.order_number == order.order_number {
                return Err(unique_violation(
                    UniqueConstraint::Other,
                    "orders.order_number",
                ));
            }
        }
        self.orders.push(order.clone());
        Ok(order)
    }
}

fn unique_violation(constraint: UniqueConstraint, columns: &str) -> StorageError {
    StorageError::UniqueViolation {
        constraint,
        message: format!("UNIQUE constraint failed: {}", columns),
    }
}

/// Open transaction: exclusive access plus the state to restore on rollback.
#[derive(Debug)]
pub struct MemorySession {
    guard: OwnedMutexGuard<State>,
    snapshot: State,
}

#[derive(Debug, Clone)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
    supports_transactions: bool,
    injected_conflicts: Arc<AtomicU32>,
    stale_key_lookups: Arc<AtomicU32>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            supports_transactions: true,
            injected_conflicts: Arc::new(AtomicU32::new(0)),
            stale_key_lookups: Arc::new(AtomicU32::new(0)),
        }
    }

    /// A store whose `begin` always reports missing transaction support,
    /// like a standalone document database.
    pub fn without_transactions() -> Self {
        Self {
            supports_transactions: false,
            ..Self::new()
        }
    }

    /// Makes the next `count` order inserts fail with a write conflict.
    pub fn inject_insert_conflicts(&self, count: u32) {
        self.injected_conflicts.store(count, Ordering::SeqCst);
    }

    /// Makes the next `count` idempotency-key lookups miss, like a read that
    /// ran just before a concurrent commit.
    pub fn serve_stale_key_lookups(&self, count: u32) {
        self.stale_key_lookups.store(count, Ordering::SeqCst);
    }

    pub async fn put_product(&self, product: Product) {
        self.state.lock().await.products.insert(product.id, product);
    }

    pub async fn put_variant(&self, variant: Variant) {
        self.state.lock().await.variants.insert(variant.id, variant);
    }

    /// Applies `change` to a stored product. Returns `false` if it does not exist.
    pub async fn update_product<F>(&self, product_id: Uuid, change: F) -> bool
    where
        F: FnOnce(&mut Product),
    {
        match self.state.lock().await.products.get_mut(&product_id) {
            Some(product) => {
                change(product);
                true
            }
            None => false,
        }
    }

    pub async fn add_cart_line(&self, line: CartLine) {
        self.state.lock().await.cart_lines.push(line);
    }

    pub async fn cart_lines(&self, user_id: Uuid) -> Vec<CartLine> {
        self.state
            .lock()
            .await
            .cart_lines
            .iter()
            .filter(|l| l.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Current stock of a product or one of its variants.
    pub async fn stock_of(&self, product_id: Uuid, variant_id: Option<Uuid>) -> Option<i32> {
        let state = self.state.lock().await;
        match variant_id {
            None => state.products.get(&product_id).map(|p| p.stock),
            Some(id) => state.variants.get(&id).map(|v| v.stock),
        }
    }

    pub async fn orders(&self) -> Vec<Order> {
        self.state.lock().await.orders.clone()
    }

    async fn with_state<R, F>(&self, ctx: &mut TransactionContext<'_, MemorySession>, f: F) -> R
    where
        F: FnOnce(&mut State) -> R + Send,
        R: Send,
    {
        match ctx {
            TransactionContext::Session(session) => f(&mut session.guard),
            TransactionContext::Detached => {
                let mut guard = self.state.lock().await;
                f(&mut guard)
            }
        }
    }

    fn take_injected_conflict(&self) -> bool {
        take_one(&self.injected_conflicts)
    }
}

#[async_trait]
impl TransactionalStorage for InMemoryStore {
    type Session = MemorySession;

    async fn begin(&self) -> Result<Self::Session, StorageError> {
        if !self.supports_transactions {
            return Err(StorageError::TransactionUnsupported(
                "in-memory store is running without transaction support".to_string(),
            ));
        }
        let guard = self.state.clone().lock_owned().await;
        let snapshot = guard.clone();
        Ok(MemorySession { guard, snapshot })
    }

    async fn commit(&self, session: Self::Session) -> Result<(), StorageError> {
        drop(session);
        Ok(())
    }

    async fn rollback(&self, session: Self::Session) -> Result<(), StorageError> {
        let MemorySession {
            mut guard,
            snapshot,
        } = session;
        *guard = snapshot;
        Ok(())
    }
}

#[async_trait]
impl CartStore for InMemoryStore {
    async fn list_lines(
        &self,
        ctx: &mut TransactionContext<'_, Self::Session>,
        user_id: Uuid,
    ) -> Result<Vec<CartLine>, StorageError> {
        let mut lines = self
            .with_state(ctx, |state| {
                state
                    .cart_lines
                    .iter()
                    .filter(|l| l.user_id == user_id)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .await;
        lines.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(lines)
    }

    async fn delete_all(
        &self,
        ctx: &mut TransactionContext<'_, Self::Session>,
        user_id: Uuid,
    ) -> Result<u64, StorageError> {
        let removed = self
            .with_state(ctx, |state| {
                let before = state.cart_lines.len();
                state.cart_lines.retain(|l| l.user_id != user_id);
                before - state.cart_lines.len()
            })
            .await;
        Ok(removed as u64)
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn find_products(
        &self,
        ctx: &mut TransactionContext<'_, Self::Session>,
        product_ids: &[Uuid],
    ) -> Result<Vec<CatalogEntry>, StorageError> {
        let entries = self
            .with_state(ctx, |state| {
                product_ids
                    .iter()
                    .filter_map(|id| state.products.get(id))
                    .map(|p| state.entry(p))
                    .collect::<Vec<_>>()
            })
            .await;
        Ok(entries)
    }

    async fn get_active_by_id(
        &self,
        ctx: &mut TransactionContext<'_, Self::Session>,
        product_id: Uuid,
    ) -> Result<Option<CatalogEntry>, StorageError> {
        let entry = self
            .with_state(ctx, |state| {
                state
                    .products
                    .get(&product_id)
                    .filter(|p| p.status.is_active())
                    .map(|p| state.entry(p))
            })
            .await;
        Ok(entry)
    }

    async fn conditional_decrement(
        &self,
        ctx: &mut TransactionContext<'_, Self::Session>,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        quantity: i32,
    ) -> Result<Option<StockRecord>, StorageError> {
        Ok(self
            .with_state(ctx, |state| state.decrement(product_id, variant_id, quantity))
            .await)
    }

    async fn conditional_increment(
        &self,
        ctx: &mut TransactionContext<'_, Self::Session>,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        quantity: i32,
    ) -> Result<Option<StockRecord>, StorageError> {
        Ok(self
            .with_state(ctx, |state| state.increment(product_id, variant_id, quantity))
            .await)
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn find_by_id(
        &self,
        ctx: &mut TransactionContext<'_, Self::Session>,
        order_id: Uuid,
    ) -> Result<Option<Order>, StorageError> {
        Ok(self
            .with_state(ctx, |state| {
                state.orders.iter().find(|o| o.id == order_id).cloned()
            })
            .await)
    }

    async fn find_by_idempotency_key(
        &self,
        ctx: &mut TransactionContext<'_, Self::Session>,
        user_id: Uuid,
        key: &str,
    ) -> Result<Option<Order>, StorageError> {
        if take_one(&self.stale_key_lookups) {
            return Ok(None);
        }
        Ok(self
            .with_state(ctx, |state| {
                state
                    .orders
                    .iter()
                    .find(|o| o.user_id == user_id && o.idempotency_key.as_deref() == Some(key))
                    .cloned()
            })
            .await)
    }

    async fn find_by_transaction_id(
        &self,
        ctx: &mut TransactionContext<'_, Self::Session>,
        transaction_id: &str,
    ) -> Result<Option<Order>, StorageError> {
        Ok(self
            .with_state(ctx, |state| {
                state
                    .orders
                    .iter()
                    .find(|o| o.transaction_id.as_deref() == Some(transaction_id))
                    .cloned()
            })
            .await)
    }

    async fn insert(
        &self,
        ctx: &mut TransactionContext<'_, Self::Session>,
        order: Order,
    ) -> Result<Order, StorageError> {
        if self.take_injected_conflict() {
            return Err(StorageError::Conflict(
                "could not serialize access due to concurrent update".to_string(),
            ));
        }
        self.with_state(ctx, |state| state.insert_order(order)).await
    }

    async fn transition_status(
        &self,
        ctx: &mut TransactionContext<'_, Self::Session>,
        order_id: Uuid,
        from: &[OrderStatus],
        to: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        Ok(self
            .with_state(ctx, |state| {
                match state
                    .orders
                    .iter_mut()
                    .find(|o| o.id == order_id && from.contains(&o.status))
                {
                    Some(order) => {
                        order.status = to;
                        order.updated_at = at;
                        if to == OrderStatus::Cancelled {
                            order.cancelled_at = Some(at);
                        }
                        true
                    }
                    None => false,
                }
            })
            .await)
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}
