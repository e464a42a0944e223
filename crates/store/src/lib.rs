// Rust guideline compliant 2026-10-11

//! Transaction store: validation and the PENDING → terminal lifecycle on top
//! of a [`TransactionRepository`] port.
//!
//! Entry points: [`TransactionService::create`], [`TransactionService::find`],
//! [`TransactionService::update_status`],
//! [`TransactionService::pending_older_than`].

pub mod memory;

use std::time::Duration;

use chrono::{TimeDelta, Utc};
use domain::{NewTransaction, StoreError, Transaction, TransactionId, TransactionRepository, TransactionStatus};

/// Application service over a transaction repository.
#[derive(Debug)]
pub struct TransactionService<R> {
    repo: R,
}

impl<R: TransactionRepository> TransactionService<R> {
    /// Wrap a repository.
    #[must_use]
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// The underlying repository.
    #[must_use]
    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Validate and persist a new PENDING transaction stamped with the
    /// current UTC time.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Invalid`] for a negative or non-finite amount, or a
    ///   blank account.
    /// - [`StoreError::Backend`] on storage failure.
    pub async fn create(&self, new: NewTransaction) -> Result<Transaction, StoreError> {
        validate(&new)?;
        let tx = self.repo.insert(new, Utc::now()).await?;
        tracing::info!(id = tx.id, amount = tx.amount, location = %tx.location, "store.transaction.created");
        Ok(tx)
    }

    /// Look up a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown id.
    pub async fn find(&self, id: TransactionId) -> Result<Transaction, StoreError> {
        self.repo.find(id).await?.ok_or(StoreError::NotFound { id })
    }

    /// Move a PENDING transaction to a terminal status.
    ///
    /// Repeating the transition that already happened is a no-op returning
    /// the stored record, so callers may retry freely.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] for an unknown id.
    /// - [`StoreError::InvalidTransition`] when `status` is PENDING or the
    ///   record already holds the other terminal status.
    pub async fn update_status(
        &self,
        id: TransactionId,
        status: TransactionStatus,
    ) -> Result<Transaction, StoreError> {
        let current = self.find(id).await?;
        if !status.is_terminal() {
            return Err(StoreError::InvalidTransition { from: current.status, to: status });
        }
        if current.status == status {
            tracing::debug!(id, %status, "store.status.unchanged");
            return Ok(current);
        }
        if current.status.is_terminal() {
            return Err(StoreError::InvalidTransition { from: current.status, to: status });
        }

        if !self.repo.set_status_if_pending(id, status).await? {
            // Settled concurrently between the read and the write.
            let now = self.find(id).await?;
            return if now.status == status {
                Ok(now)
            } else {
                Err(StoreError::InvalidTransition { from: now.status, to: status })
            };
        }

        tracing::info!(id, %status, "store.status.updated");
        self.find(id).await
    }

    /// PENDING transactions created more than `age` ago, oldest first.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Invalid`] if `age` is out of range.
    /// - [`StoreError::Backend`] on storage failure.
    pub async fn pending_older_than(&self, age: Duration) -> Result<Vec<Transaction>, StoreError> {
        let age = TimeDelta::from_std(age).map_err(|e| StoreError::Invalid { reason: e.to_string() })?;
        let cutoff = Utc::now()
            .checked_sub_signed(age)
            .ok_or_else(|| StoreError::Invalid { reason: "age out of range".to_owned() })?;
        self.repo.pending_created_before(cutoff).await
    }
}

fn validate(new: &NewTransaction) -> Result<(), StoreError> {
    if !new.amount.is_finite() || new.amount < 0.0 {
        return Err(StoreError::Invalid {
            reason: format!("amount must be a non-negative number, got {}", new.amount),
        });
    }
    if new.origin_account.trim().is_empty() || new.destination_account.trim().is_empty() {
        return Err(StoreError::Invalid { reason: "accounts must not be empty".to_owned() });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::TransactionService;
    use crate::memory::InMemoryRepository;
    use chrono::{TimeDelta, Utc};
    use domain::{NewTransaction, StoreError, TransactionRepository as _, TransactionStatus};
    use std::time::Duration;

    fn make_new(amount: f64) -> NewTransaction {
        NewTransaction {
            origin_account: "ES01".to_owned(),
            destination_account: "ES02".to_owned(),
            amount,
            location: "Madrid".to_owned(),
        }
    }

    fn make_service() -> TransactionService<InMemoryRepository> {
        TransactionService::new(InMemoryRepository::new())
    }

    #[tokio::test]
    async fn create_assigns_id_and_pending_status() {
        let service = make_service();
        let first = service.create(make_new(10.0)).await.unwrap();
        let second = service.create(make_new(20.0)).await.unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(first.status, TransactionStatus::Pending);
        assert_eq!(service.find(1).await.unwrap(), first);
    }

    #[tokio::test]
    async fn create_rejects_bad_input() {
        let service = make_service();
        for amount in [-1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                service.create(make_new(amount)).await,
                Err(StoreError::Invalid { .. })
            ));
        }
        let mut blank = make_new(1.0);
        blank.origin_account = "  ".to_owned();
        assert!(matches!(service.create(blank).await, Err(StoreError::Invalid { .. })));
    }

    #[tokio::test]
    async fn zero_amount_is_accepted() {
        assert!(make_service().create(make_new(0.0)).await.is_ok());
    }

    #[tokio::test]
    async fn find_unknown_is_not_found() {
        assert_eq!(make_service().find(99).await, Err(StoreError::NotFound { id: 99 }));
    }

    #[tokio::test]
    async fn pending_moves_to_terminal_once() {
        let service = make_service();
        let tx = service.create(make_new(10.0)).await.unwrap();
        let updated = service.update_status(tx.id, TransactionStatus::Approved).await.unwrap();
        assert_eq!(updated.status, TransactionStatus::Approved);
        assert_eq!(updated.created_at, tx.created_at);
    }

    #[tokio::test]
    async fn repeated_update_is_idempotent() {
        let service = make_service();
        let tx = service.create(make_new(10.0)).await.unwrap();
        service.update_status(tx.id, TransactionStatus::Rejected).await.unwrap();
        let again = service.update_status(tx.id, TransactionStatus::Rejected).await.unwrap();
        assert_eq!(again.status, TransactionStatus::Rejected);
    }

    #[tokio::test]
    async fn terminal_status_is_final() {
        let service = make_service();
        let tx = service.create(make_new(10.0)).await.unwrap();
        service.update_status(tx.id, TransactionStatus::Rejected).await.unwrap();
        assert_eq!(
            service.update_status(tx.id, TransactionStatus::Approved).await,
            Err(StoreError::InvalidTransition {
                from: TransactionStatus::Rejected,
                to: TransactionStatus::Approved,
            })
        );
    }

    #[tokio::test]
    async fn pending_is_not_a_valid_target() {
        let service = make_service();
        let tx = service.create(make_new(10.0)).await.unwrap();
        assert!(matches!(
            service.update_status(tx.id, TransactionStatus::Pending).await,
            Err(StoreError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn update_unknown_is_not_found() {
        assert_eq!(
            make_service().update_status(5, TransactionStatus::Approved).await,
            Err(StoreError::NotFound { id: 5 })
        );
    }

    #[tokio::test]
    async fn pending_older_than_filters_by_age_and_status() {
        let service = make_service();
        let repo = service.repository();
        let old = Utc::now() - TimeDelta::minutes(10);
        let stale = repo.insert(make_new(1.0), old).await.unwrap();
        let settled = repo.insert(make_new(2.0), old).await.unwrap();
        repo.set_status_if_pending(settled.id, TransactionStatus::Approved).await.unwrap();
        service.create(make_new(3.0)).await.unwrap();

        let pending = service.pending_older_than(Duration::from_secs(60)).await.unwrap();
        assert_eq!(pending, vec![stale]);
    }
}
