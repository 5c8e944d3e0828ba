/*!
 * Transaction orchestration for checkout writes
 *
 * A [`UnitOfWork`] is run inside one storage transaction when the backend
 * provides one. When it does not, or when configuration turns transactions
 * off, the same unit runs against a detached context and the result is
 * tagged [`CheckoutMode::Degraded`].
 *
 * States: Idle -> Reserving -> Materializing -> Committed, or
 * Idle -> Reserving -> Aborted.
 */

use async_trait::async_trait;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::config::TransactionPolicy;
use crate::db::{TransactionContext, TransactionalStorage};
use crate::errors::{CheckoutError, StorageError};

/// Whether a unit of work ran inside a storage transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckoutMode {
    Transactional,
    Degraded,
}

impl CheckoutMode {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckoutMode::Transactional => "transactional",
            CheckoutMode::Degraded => "degraded",
        }
    }
}

/// A group of storage writes that should succeed or fail together.
#[async_trait]
pub trait UnitOfWork<S: TransactionalStorage>: Send + Sync {
    type Output: Send;

    async fn run(
        &self,
        storage: &S,
        ctx: &mut TransactionContext<'_, S::Session>,
    ) -> Result<Self::Output, CheckoutError>;
}

#[derive(Debug)]
pub struct Completed<T> {
    pub value: T,
    pub mode: CheckoutMode,
}

enum AttemptFailure {
    /// The backend cannot open transactions.
    Unsupported(String),
    /// Failed before commit and was rolled back; safe to start over.
    Retryable(CheckoutError),
    Fatal(CheckoutError),
}

#[derive(Debug)]
pub struct TransactionOrchestrator<S> {
    storage: Arc<S>,
    policy: TransactionPolicy,
}

impl<S> Clone for TransactionOrchestrator<S> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            policy: self.policy,
        }
    }
}

impl<S> TransactionOrchestrator<S>
where
    S: TransactionalStorage + 'static,
{
    pub fn new(storage: Arc<S>, policy: TransactionPolicy) -> Self {
        Self { storage, policy }
    }

    pub fn policy(&self) -> TransactionPolicy {
        self.policy
    }

    /// Runs `unit`, retrying once from `begin` when a storage failure
    /// happened before commit.
    pub async fn execute<U>(&self, unit: &U) -> Result<Completed<U::Output>, CheckoutError>
    where
        U: UnitOfWork<S>,
    {
        if self.policy == TransactionPolicy::Disabled {
            return self.run_degraded(unit, "transactions disabled by configuration").await;
        }

        let mut retried = false;
        loop {
            match self.run_transactional(unit).await {
                Ok(value) => {
                    counter!("stateset_checkout.units", 1, "mode" => "transactional");
                    return Ok(Completed {
                        value,
                        mode: CheckoutMode::Transactional,
                    });
                }
                Err(AttemptFailure::Unsupported(reason)) => {
                    if self.policy == TransactionPolicy::Required {
                        error!(%reason, "Storage transactions are required but unavailable");
                        return Err(CheckoutError::TransactionUnsupported(reason));
                    }
                    return self.run_degraded(unit, &reason).await;
                }
                Err(AttemptFailure::Retryable(err)) if !retried => {
                    warn!(error = %err, "Unit of work rolled back, retrying once");
                    counter!("stateset_checkout.retries", 1);
                    retried = true;
                }
                Err(AttemptFailure::Retryable(err)) | Err(AttemptFailure::Fatal(err)) => {
                    return Err(err)
                }
            }
        }
    }

    async fn run_transactional<U>(&self, unit: &U) -> Result<U::Output, AttemptFailure>
    where
        U: UnitOfWork<S>,
    {
        debug!(state = "idle", "Opening storage transaction");
        let mut session = match self.storage.begin().await {
            Ok(session) => session,
            Err(StorageError::TransactionUnsupported(reason)) => {
                return Err(AttemptFailure::Unsupported(reason))
            }
            Err(err) => return Err(AttemptFailure::Retryable(err.into())),
        };

        let outcome = {
            let mut ctx = TransactionContext::Session(&mut session);
            unit.run(&self.storage, &mut ctx).await
        };

        match outcome {
            Ok(value) => match self.storage.commit(session).await {
                Ok(()) => {
                    debug!(state = "committed", "Storage transaction committed");
                    Ok(value)
                }
                Err(err) => {
                    error!(error = %err, "Commit failed");
                    Err(AttemptFailure::Fatal(err.into()))
                }
            },
            Err(err) => {
                debug!(state = "aborted", error = %err, "Rolling back storage transaction");
                if let Err(rollback_err) = self.storage.rollback(session).await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                Err(match err {
                    CheckoutError::TransactionUnsupported(reason) => {
                        AttemptFailure::Unsupported(reason)
                    }
                    CheckoutError::StorageFailure(ref storage_err) => {
                        debug!(transient = storage_err.is_transient(), "Storage failure before commit");
                        AttemptFailure::Retryable(err)
                    }
                    other => AttemptFailure::Fatal(other),
                })
            }
        }
    }

    async fn run_degraded<U>(
        &self,
        unit: &U,
        reason: &str,
    ) -> Result<Completed<U::Output>, CheckoutError>
    where
        U: UnitOfWork<S>,
    {
        warn!(
            category = "inventory_drift",
            %reason,
            "Running checkout writes without a storage transaction"
        );
        counter!("stateset_checkout.units", 1, "mode" => "degraded");

        let mut ctx = TransactionContext::Detached;
        let value = unit.run(&self.storage, &mut ctx).await?;
        Ok(Completed {
            value,
            mode: CheckoutMode::Degraded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Product, ProductStatus};
    use crate::repositories::{CatalogStore, InMemoryStore};
    use assert_matches::assert_matches;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU32, Ordering};
    use uuid::Uuid;

    struct TakeStock {
        product_id: Uuid,
        quantity: i32,
        fail_after: bool,
    }

    #[async_trait]
    impl UnitOfWork<InMemoryStore> for TakeStock {
        type Output = i32;

        async fn run(
            &self,
            storage: &InMemoryStore,
            ctx: &mut TransactionContext<'_, <InMemoryStore as TransactionalStorage>::Session>,
        ) -> Result<i32, CheckoutError> {
            let record = storage
                .conditional_decrement(ctx, self.product_id, None, self.quantity)
                .await?
                .ok_or_else(|| CheckoutError::InsufficientStock {
                    product_title: "Mug".into(),
                })?;
            if self.fail_after {
                return Err(CheckoutError::Validation("late failure".into()));
            }
            Ok(record.stock)
        }
    }

    struct FlakyUnit {
        attempts: AtomicU32,
    }

    #[async_trait]
    impl UnitOfWork<InMemoryStore> for FlakyUnit {
        type Output = u32;

        async fn run(
            &self,
            _storage: &InMemoryStore,
            _ctx: &mut TransactionContext<'_, <InMemoryStore as TransactionalStorage>::Session>,
        ) -> Result<u32, CheckoutError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt < 3 {
                return Err(StorageError::Conflict("deadlock detected".into()).into());
            }
            Ok(attempt)
        }
    }

    async fn store_with_mug(stock: i32, transactions: bool) -> (Arc<InMemoryStore>, Uuid) {
        let store = if transactions {
            InMemoryStore::new()
        } else {
            InMemoryStore::without_transactions()
        };
        let now = Utc::now();
        let id = Uuid::new_v4();
        store
            .put_product(Product {
                id,
                title: "Mug".into(),
                sku: "MUG".into(),
                image: None,
                status: ProductStatus::Active,
                stock,
                base_price: dec!(10.00),
                discount_percent: dec!(0),
                has_variants: false,
                created_at: now,
                updated_at: now,
            })
            .await;
        (Arc::new(store), id)
    }

    #[tokio::test]
    async fn failure_rolls_back_in_transactional_mode() {
        let (store, id) = store_with_mug(5, true).await;
        let orchestrator = TransactionOrchestrator::new(store.clone(), TransactionPolicy::Auto);

        let result = orchestrator
            .execute(&TakeStock {
                product_id: id,
                quantity: 2,
                fail_after: true,
            })
            .await;
        assert_matches!(result, Err(CheckoutError::Validation(_)));
        assert_eq!(store.stock_of(id, None).await, Some(5));
    }

    #[tokio::test]
    async fn falls_back_to_degraded_when_unsupported() {
        let (store, id) = store_with_mug(5, false).await;
        let orchestrator = TransactionOrchestrator::new(store.clone(), TransactionPolicy::Auto);

        let completed = orchestrator
            .execute(&TakeStock {
                product_id: id,
                quantity: 2,
                fail_after: false,
            })
            .await
            .unwrap();
        assert_eq!(completed.mode, CheckoutMode::Degraded);
        assert_eq!(completed.value, 3);
    }

    #[tokio::test]
    async fn required_policy_refuses_degraded_mode() {
        let (store, id) = store_with_mug(5, false).await;
        let orchestrator =
            TransactionOrchestrator::new(store.clone(), TransactionPolicy::Required);

        let result = orchestrator
            .execute(&TakeStock {
                product_id: id,
                quantity: 2,
                fail_after: false,
            })
            .await;
        assert_matches!(result, Err(CheckoutError::TransactionUnsupported(_)));
        assert_eq!(store.stock_of(id, None).await, Some(5));
    }

    #[tokio::test]
    async fn disabled_policy_skips_transactions() {
        let (store, id) = store_with_mug(5, true).await;
        let orchestrator =
            TransactionOrchestrator::new(store.clone(), TransactionPolicy::Disabled);

        let completed = orchestrator
            .execute(&TakeStock {
                product_id: id,
                quantity: 1,
                fail_after: false,
            })
            .await
            .unwrap();
        assert_eq!(completed.mode, CheckoutMode::Degraded);
    }

    #[tokio::test]
    async fn storage_failures_are_retried_only_once() {
        let (store, _) = store_with_mug(1, true).await;
        let orchestrator = TransactionOrchestrator::new(store, TransactionPolicy::Auto);
        let unit = FlakyUnit {
            attempts: AtomicU32::new(0),
        };

        let result = orchestrator.execute(&unit).await;
        assert_matches!(result, Err(CheckoutError::StorageFailure(_)));
        assert_eq!(unit.attempts.load(Ordering::SeqCst), 2);
    }
}
