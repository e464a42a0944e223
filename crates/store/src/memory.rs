// Rust guideline compliant 2026-10-11

//! In-memory [`TransactionRepository`] adapter.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use domain::{
    NewTransaction, StoreError, Transaction, TransactionId, TransactionRepository,
    TransactionStatus,
};

#[derive(Debug, Default)]
struct Rows {
    last_id: TransactionId,
    by_id: BTreeMap<TransactionId, Transaction>,
}

/// Repository backed by a mutex-protected map; ids start at 1.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    rows: Mutex<Rows>,
}

impl InMemoryRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn rows(&self) -> MutexGuard<'_, Rows> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TransactionRepository for InMemoryRepository {
    async fn insert(
        &self,
        new: NewTransaction,
        created_at: DateTime<Utc>,
    ) -> Result<Transaction, StoreError> {
        let mut rows = self.rows();
        rows.last_id += 1;
        let tx = Transaction {
            id: rows.last_id,
            origin_account: new.origin_account,
            destination_account: new.destination_account,
            amount: new.amount,
            location: new.location,
            created_at,
            status: TransactionStatus::Pending,
        };
        rows.by_id.insert(tx.id, tx.clone());
        Ok(tx)
    }

    async fn find(&self, id: TransactionId) -> Result<Option<Transaction>, StoreError> {
        Ok(self.rows().by_id.get(&id).cloned())
    }

    async fn set_status_if_pending(
        &self,
        id: TransactionId,
        status: TransactionStatus,
    ) -> Result<bool, StoreError> {
        let mut rows = self.rows();
        match rows.by_id.get_mut(&id) {
            Some(tx) if tx.status == TransactionStatus::Pending => {
                tx.status = status;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn pending_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, StoreError> {
        let mut pending: Vec<Transaction> = self
            .rows()
            .by_id
            .values()
            .filter(|tx| tx.status == TransactionStatus::Pending && tx.created_at < cutoff)
            .cloned()
            .collect();
        pending.sort_by_key(|tx| (tx.created_at, tx.id));
        Ok(pending)
    }
}
