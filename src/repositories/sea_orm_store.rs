//! Relational backend built on sea-orm.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, Query};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::db::{TransactionContext, TransactionalStorage};
use crate::entities::commerce::{cart_line, product, product_variant, ProductStatus};
use crate::entities::order;
use crate::errors::StorageError;
use crate::models::{CartLine, CatalogEntry, Order, OrderStatus, StockRecord};
use crate::repositories::{CartStore, CatalogStore, OrderStore};

/// Runs `$body` against the open transaction or the pool, binding the connection to `$conn`.
macro_rules! with_conn {
    ($store:expr, $ctx:expr, |$conn:ident| $body:expr) => {
        match $ctx {
            TransactionContext::Session(txn) => {
                let $conn: &DatabaseTransaction = &**txn;
                $body
            }
            TransactionContext::Detached => {
                let $conn: &DatabaseConnection = &$store.db;
                $body
            }
        }
    };
}

/// Store for Postgres and SQLite deployments.
#[derive(Debug, Clone)]
pub struct SeaOrmStore {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

#[async_trait]
impl TransactionalStorage for SeaOrmStore {
    type Session = DatabaseTransaction;

    async fn begin(&self) -> Result<Self::Session, StorageError> {
        self.db.begin().await.map_err(StorageError::from_db)
    }

    async fn commit(&self, session: Self::Session) -> Result<(), StorageError> {
        session.commit().await.map_err(StorageError::from_db)
    }

    async fn rollback(&self, session: Self::Session) -> Result<(), StorageError> {
        session.rollback().await.map_err(StorageError::from_db)
    }
}

#[async_trait]
impl CartStore for SeaOrmStore {
    async fn list_lines(
        &self,
        ctx: &mut TransactionContext<'_, Self::Session>,
        user_id: Uuid,
    ) -> Result<Vec<CartLine>, StorageError> {
        with_conn!(self, ctx, |conn| {
            cart_line::Entity::find()
                .filter(cart_line::Column::UserId.eq(user_id))
                .order_by_asc(cart_line::Column::CreatedAt)
                .order_by_asc(cart_line::Column::Id)
                .all(conn)
                .await
                .map_err(StorageError::from_db)
        })
    }

    async fn delete_all(
        &self,
        ctx: &mut TransactionContext<'_, Self::Session>,
        user_id: Uuid,
    ) -> Result<u64, StorageError> {
        with_conn!(self, ctx, |conn| {
            let result = cart_line::Entity::delete_many()
                .filter(cart_line::Column::UserId.eq(user_id))
                .exec(conn)
                .await
                .map_err(StorageError::from_db)?;
            Ok(result.rows_affected)
        })
    }
}

#[async_trait]
impl CatalogStore for SeaOrmStore {
    async fn find_products(
        &self,
        ctx: &mut TransactionContext<'_, Self::Session>,
        product_ids: &[Uuid],
    ) -> Result<Vec<CatalogEntry>, StorageError> {
        if product_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = with_conn!(self, ctx, |conn| {
            product::Entity::find()
                .filter(product::Column::Id.is_in(product_ids.iter().copied()))
                .find_with_related(product_variant::Entity)
                .all(conn)
                .await
                .map_err(StorageError::from_db)
        })?;

        Ok(rows
            .into_iter()
            .map(|(product, variants)| CatalogEntry::new(product, variants))
            .collect())
    }

    async fn get_active_by_id(
        &self,
        ctx: &mut TransactionContext<'_, Self::Session>,
        product_id: Uuid,
    ) -> Result<Option<CatalogEntry>, StorageError> {
        let rows = with_conn!(self, ctx, |conn| {
            product::Entity::find()
                .filter(product::Column::Id.eq(product_id))
                .filter(product::Column::Status.eq(ProductStatus::Active))
                .find_with_related(product_variant::Entity)
                .all(conn)
                .await
                .map_err(StorageError::from_db)
        })?;

        Ok(rows
            .into_iter()
            .next()
            .map(|(product, variants)| CatalogEntry::new(product, variants)))
    }

    async fn conditional_decrement(
        &self,
        ctx: &mut TransactionContext<'_, Self::Session>,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        quantity: i32,
    ) -> Result<Option<StockRecord>, StorageError> {
        if quantity <= 0 {
            return Ok(None);
        }
        with_conn!(self, ctx, |conn| {
            let matched = decrement_stock(conn, product_id, variant_id, quantity).await?;
            if matched == 0 {
                debug!(%product_id, ?variant_id, quantity, "Conditional decrement did not match");
                return Ok(None);
            }
            read_stock(conn, product_id, variant_id).await
        })
    }

    async fn conditional_increment(
        &self,
        ctx: &mut TransactionContext<'_, Self::Session>,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        quantity: i32,
    ) -> Result<Option<StockRecord>, StorageError> {
        if quantity <= 0 {
            return Ok(None);
        }
        with_conn!(self, ctx, |conn| {
            let matched = increment_stock(conn, product_id, variant_id, quantity).await?;
            if matched == 0 {
                return Ok(None);
            }
            read_stock(conn, product_id, variant_id).await
        })
    }
}

/// Single-statement compare-and-swap: `stock = stock - qty WHERE stock >= qty AND active`.
async fn decrement_stock<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    variant_id: Option<Uuid>,
    quantity: i32,
) -> Result<u64, StorageError> {
    let now = Utc::now();
    let result = match variant_id {
        None => {
            product::Entity::update_many()
                .col_expr(
                    product::Column::Stock,
                    Expr::col(product::Column::Stock).sub(quantity),
                )
                .col_expr(product::Column::UpdatedAt, Expr::value(now))
                .filter(product::Column::Id.eq(product_id))
                .filter(product::Column::Status.eq(ProductStatus::Active))
                .filter(product::Column::Stock.gte(quantity))
                .exec(conn)
                .await
        }
        Some(variant_id) => {
            let active_parent = Query::select()
                .column(product::Column::Id)
                .from(product::Entity)
                .and_where(product::Column::Id.eq(product_id))
                .and_where(product::Column::Status.eq(ProductStatus::Active))
                .to_owned();

            product_variant::Entity::update_many()
                .col_expr(
                    product_variant::Column::Stock,
                    Expr::col(product_variant::Column::Stock).sub(quantity),
                )
                .col_expr(product_variant::Column::UpdatedAt, Expr::value(now))
                .filter(product_variant::Column::Id.eq(variant_id))
                .filter(product_variant::Column::ProductId.in_subquery(active_parent))
                .filter(product_variant::Column::Status.eq(ProductStatus::Active))
                .filter(product_variant::Column::Stock.gte(quantity))
                .exec(conn)
                .await
        }
    };

    Ok(result.map_err(StorageError::from_db)?.rows_affected)
}

async fn increment_stock<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    variant_id: Option<Uuid>,
    quantity: i32,
) -> Result<u64, StorageError> {
    let now = Utc::now();
    let result = match variant_id {
        None => {
            product::Entity::update_many()
                .col_expr(
                    product::Column::Stock,
                    Expr::col(product::Column::Stock).add(quantity),
                )
                .col_expr(product::Column::UpdatedAt, Expr::value(now))
                .filter(product::Column::Id.eq(product_id))
                .exec(conn)
                .await
        }
        Some(variant_id) => {
            product_variant::Entity::update_many()
                .col_expr(
                    product_variant::Column::Stock,
                    Expr::col(product_variant::Column::Stock).add(quantity),
                )
                .col_expr(product_variant::Column::UpdatedAt, Expr::value(now))
                .filter(product_variant::Column::Id.eq(variant_id))
                .filter(product_variant::Column::ProductId.eq(product_id))
                .exec(conn)
                .await
        }
    };

    Ok(result.map_err(StorageError::from_db)?.rows_affected)
}

async fn read_stock<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    variant_id: Option<Uuid>,
) -> Result<Option<StockRecord>, StorageError> {
    let stock = match variant_id {
        None => product::Entity::find_by_id(product_id)
            .one(conn)
            .await
            .map_err(StorageError::from_db)?
            .map(|p| p.stock),
        Some(variant_id) => product_variant::Entity::find_by_id(variant_id)
            .one(conn)
            .await
            .map_err(StorageError::from_db)?
            .map(|v| v.stock),
    };

    Ok(stock.map(|stock| StockRecord {
        product_id,
        variant_id,
        stock,
    }))
}

#[async_trait]
impl OrderStore for SeaOrmStore {
    async fn find_by_id(
        &self,
        ctx: &mut TransactionContext<'_, Self::Session>,
        order_id: Uuid,
    ) -> Result<Option<Order>, StorageError> {
        let model = with_conn!(self, ctx, |conn| {
            order::Entity::find_by_id(order_id)
                .one(conn)
                .await
                .map_err(StorageError::from_db)
        })?;
        model.map(Order::try_from).transpose().map_err(Into::into)
    }

    async fn find_by_idempotency_key(
        &self,
        ctx: &mut TransactionContext<'_, Self::Session>,
        user_id: Uuid,
        key: &str,
    ) -> Result<Option<Order>, StorageError> {
        let model = with_conn!(self, ctx, |conn| {
            order::Entity::find()
                .filter(order::Column::UserId.eq(user_id))
                .filter(order::Column::IdempotencyKey.eq(key))
                .one(conn)
                .await
                .map_err(StorageError::from_db)
        })?;
        model.map(Order::try_from).transpose().map_err(Into::into)
    }

    async fn find_by_transaction_id(
        &self,
        ctx: &mut TransactionContext<'_, Self::Session>,
        transaction_id: &str,
    ) -> Result<Option<Order>, StorageError> {
        let model = with_conn!(self, ctx, |conn| {
            order::Entity::find()
                .filter(order::Column::TransactionId.eq(transaction_id))
                .one(conn)
                .await
                .map_err(StorageError::from_db)
        })?;
        model.map(Order::try_from).transpose().map_err(Into::into)
    }

    async fn insert(
        &self,
        ctx: &mut TransactionContext<'_, Self::Session>,
        order: Order,
    ) -> Result<Order, StorageError> {
        let active = order.into_active_model()?;
        let model = with_conn!(self, ctx, |conn| {
            active.insert(conn).await.map_err(StorageError::from_db)
        })?;
        Ok(Order::try_from(model)?)
    }

    async fn transition_status(
        &self,
        ctx: &mut TransactionContext<'_, Self::Session>,
        order_id: Uuid,
        from: &[OrderStatus],
        to: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let mut update = order::Entity::update_many()
            .col_expr(order::Column::Status, Expr::value(to))
            .col_expr(order::Column::UpdatedAt, Expr::value(at));
        if to == OrderStatus::Cancelled {
            update = update.col_expr(order::Column::CancelledAt, Expr::value(Some(at)));
        }
        let update = update
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.is_in(from.iter().copied()));

        let result = with_conn!(self, ctx, |conn| {
            update.exec(conn).await.map_err(StorageError::from_db)
        })?;
        Ok(result.rows_affected == 1)
    }
}
