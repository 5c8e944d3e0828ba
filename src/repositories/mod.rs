//! Storage seams consumed by checkout.
//!
//! Every method takes the [`TransactionContext`] it must run in, so the same
//! call sites serve both the transactional and the degraded path.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::{TransactionContext, TransactionalStorage};
use crate::errors::StorageError;
use crate::models::{CartLine, CatalogEntry, Order, OrderStatus, StockRecord};

pub mod memory_store;
pub mod sea_orm_store;

pub use memory_store::InMemoryStore;
pub use sea_orm_store::SeaOrmStore;

#[async_trait]
pub trait CartStore: TransactionalStorage {
    /// Lines for a user in insertion order.
    async fn list_lines(
        &self,
        ctx: &mut TransactionContext<'_, Self::Session>,
        user_id: Uuid,
    ) -> Result<Vec<CartLine>, StorageError>;

    async fn delete_all(
        &self,
        ctx: &mut TransactionContext<'_, Self::Session>,
        user_id: Uuid,
    ) -> Result<u64, StorageError>;
}

#[async_trait]
pub trait CatalogStore: TransactionalStorage {
    /// Loads the given products and their variants in one pass. Missing ids are skipped.
    async fn find_products(
        &self,
        ctx: &mut TransactionContext<'_, Self::Session>,
        product_ids: &[Uuid],
    ) -> Result<Vec<CatalogEntry>, StorageError>;

    async fn get_active_by_id(
        &self,
        ctx: &mut TransactionContext<'_, Self::Session>,
        product_id: Uuid,
    ) -> Result<Option<CatalogEntry>, StorageError>;

    /// Atomically subtracts `quantity` when the record is active and holds at
    /// least that much stock. `None` when the condition did not match.
    async fn conditional_decrement(
        &self,
        ctx: &mut TransactionContext<'_, Self::Session>,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        quantity: i32,
    ) -> Result<Option<StockRecord>, StorageError>;

    /// Atomically adds `quantity` back. `None` when the record no longer exists.
    async fn conditional_increment(
        &self,
        ctx: &mut TransactionContext<'_, Self::Session>,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        quantity: i32,
    ) -> Result<Option<StockRecord>, StorageError>;
}

#[async_trait]
pub trait OrderStore: TransactionalStorage {
    async fn find_by_id(
        &self,
        ctx: &mut TransactionContext<'_, Self::Session>,
        order_id: Uuid,
    ) -> Result<Option<Order>, StorageError>;

    async fn find_by_idempotency_key(
        &self,
        ctx: &mut TransactionContext<'_, Self::Session>,
        user_id: Uuid,
        key: &str,
    ) -> Result<Option<Order>, StorageError>;

    async fn find_by_transaction_id(
        &self,
        ctx: &mut TransactionContext<'_, Self::Session>,
        transaction_id: &str,
    ) -> Result<Option<Order>, StorageError>;

    /// Persists a new order. Violations of the `(user_id, idempotency_key)` and
    /// `transaction_id` uniqueness rules surface as [`StorageError::UniqueViolation`].
    async fn insert(
        &self,
        ctx: &mut TransactionContext<'_, Self::Session>,
        order: Order,
    ) -> Result<Order, StorageError>;

    /// Compare-and-swap on order status. Returns `false` when the current
    /// status is not one of `from`.
    async fn transition_status(
        &self,
        ctx: &mut TransactionContext<'_, Self::Session>,
        order_id: Uuid,
        from: &[OrderStatus],
        to: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, StorageError>;
}

/// Everything checkout needs from one backend.
pub trait CheckoutStorage: CartStore + CatalogStore + OrderStore + 'static {}

impl<T> CheckoutStorage for T where T: CartStore + CatalogStore + OrderStore + 'static {}
