//! Append-only record of money moving for orders.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, StudentId};
use store::{CanteenStore, StoreError, StoreTx, TransactionRecord};

use crate::error::{DomainError, Result};

/// Appends and reads transaction records.
///
/// At most one record exists per `(student, order)` pair. There is no update
/// or delete.
pub struct TransactionRecorder<S: CanteenStore> {
    store: S,
}

impl<S: CanteenStore> TransactionRecorder<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Appends a record in its own unit of work.
    pub async fn append(
        &self,
        student_id: StudentId,
        order_id: OrderId,
        amount: Money,
    ) -> Result<TransactionRecord> {
        let mut tx = self.store.begin().await?;
        let record = self.append_in(&mut tx, student_id, order_id, amount).await?;
        tx.commit().await?;
        Ok(record)
    }

    /// Appends a record inside the caller's unit of work.
    pub async fn append_in(
        &self,
        tx: &mut S::Tx,
        student_id: StudentId,
        order_id: OrderId,
        amount: Money,
    ) -> Result<TransactionRecord> {
        let record = TransactionRecord {
            student_id,
            order_id,
            amount,
            created_at: Utc::now(),
        };
        match tx.insert_transaction(&record).await {
            Ok(()) => Ok(record),
            Err(StoreError::DuplicateKey {
                table: "transactions",
                ..
            }) => Err(DomainError::DuplicateTransaction {
                student_id,
                order_id,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Lists every record, oldest first.
    pub async fn list_all(&self) -> Result<Vec<TransactionRecord>> {
        Ok(self.store.list_transactions(None).await?)
    }

    /// Lists one student's records, oldest first.
    pub async fn list_for_student(&self, student_id: StudentId) -> Result<Vec<TransactionRecord>> {
        Ok(self.store.list_transactions(Some(student_id)).await?)
    }

    /// Sums amounts recorded in `[start, end)`. Zero when nothing matches.
    pub async fn sum_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Money> {
        if end < start {
            return Err(DomainError::bad_input("interval end precedes start"));
        }
        Ok(self.store.sum_transactions_between(start, end).await?)
    }
}
