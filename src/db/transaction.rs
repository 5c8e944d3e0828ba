/*!
 * Transaction context threaded through every storage call
 *
 * A checkout runs the same code whether or not the backend can open a
 * multi-document transaction. The difference is carried explicitly by the
 * [`TransactionContext`] handed to each store method instead of an ambient
 * session.
 */

use async_trait::async_trait;

use crate::errors::StorageError;

/// Storage backends that may be able to group writes atomically.
#[async_trait]
pub trait TransactionalStorage: Send + Sync {
    /// Live transaction handle owned by one unit of work.
    type Session: Send;

    /// Opens a transaction. Backends that cannot provide one return
    /// [`StorageError::TransactionUnsupported`].
    async fn begin(&self) -> Result<Self::Session, StorageError>;

    async fn commit(&self, session: Self::Session) -> Result<(), StorageError>;

    /// Discards every write made through the session.
    async fn rollback(&self, session: Self::Session) -> Result<(), StorageError>;
}

/// Where a storage call executes.
#[derive(Debug)]
pub enum TransactionContext<'s, S> {
    /// Inside an open transaction; writes become visible on commit.
    Session(&'s mut S),
    /// Directly against the backend; every write is applied immediately.
    Detached,
}

impl<'s, S> TransactionContext<'s, S> {
    pub fn is_transactional(&self) -> bool {
        matches!(self, TransactionContext::Session(_))
    }
}
