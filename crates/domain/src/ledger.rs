//! Prepaid student balances.

use chrono::Utc;
use common::{Money, StudentId};
use store::{Balance, CanteenStore, StoreTx};
use tracing::info;

use crate::error::{DomainError, Result};

/// Owns per-student prepaid balances.
///
/// Balances are provisioned out of band; every operation fails with
/// `NotFound` when the student has no balance row. No operation lets an
/// amount drop below zero.
pub struct BalanceLedger<S: CanteenStore> {
    store: S,
}

impl<S: CanteenStore> BalanceLedger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the current balance.
    pub async fn get(&self, student_id: StudentId) -> Result<Balance> {
        self.store
            .get_balance(student_id)
            .await?
            .ok_or_else(|| DomainError::not_found("balance", student_id))
    }

    /// Debits `amount` in its own unit of work.
    #[tracing::instrument(skip(self))]
    pub async fn debit(&self, student_id: StudentId, amount: Money) -> Result<Balance> {
        let mut tx = self.store.begin().await?;
        let balance = self.debit_in(&mut tx, student_id, amount).await?;
        tx.commit().await?;
        Ok(balance)
    }

    /// Credits `amount` in its own unit of work.
    #[tracing::instrument(skip(self))]
    pub async fn credit(&self, student_id: StudentId, amount: Money) -> Result<Balance> {
        let mut tx = self.store.begin().await?;
        let balance = self.credit_in(&mut tx, student_id, amount).await?;
        tx.commit().await?;
        info!(student_id = %student_id, amount = %amount, "Balance credited");
        Ok(balance)
    }

    /// Overwrites the balance with an absolute amount.
    #[tracing::instrument(skip(self))]
    pub async fn set(&self, student_id: StudentId, amount: Money) -> Result<Balance> {
        if amount.is_negative() {
            return Err(DomainError::bad_input("balance cannot be negative"));
        }
        let mut tx = self.store.begin().await?;
        let mut balance = Self::lock(&mut tx, student_id).await?;
        balance.amount = amount;
        balance.updated_at = Utc::now();
        tx.update_balance(student_id, balance.amount, balance.updated_at)
            .await?;
        tx.commit().await?;
        info!(student_id = %student_id, amount = %amount, "Balance set");
        Ok(balance)
    }

    /// Debits inside the caller's unit of work.
    pub async fn debit_in(
        &self,
        tx: &mut S::Tx,
        student_id: StudentId,
        amount: Money,
    ) -> Result<Balance> {
        if !amount.is_positive() {
            return Err(DomainError::bad_input("debit amount must be positive"));
        }
        let mut balance = Self::lock(tx, student_id).await?;
        if balance.amount < amount {
            return Err(DomainError::InsufficientBalance {
                required: amount,
                available: balance.amount,
            });
        }
        balance.amount = balance.amount - amount;
        balance.updated_at = Utc::now();
        tx.update_balance(student_id, balance.amount, balance.updated_at)
            .await?;
        Ok(balance)
    }

    /// Credits inside the caller's unit of work.
    pub async fn credit_in(
        &self,
        tx: &mut S::Tx,
        student_id: StudentId,
        amount: Money,
    ) -> Result<Balance> {
        if !amount.is_positive() {
            return Err(DomainError::bad_input("credit amount must be positive"));
        }
        let mut balance = Self::lock(tx, student_id).await?;
        balance.amount = balance
            .amount
            .checked_add(amount)
            .ok_or_else(|| DomainError::bad_input("balance out of range"))?;
        balance.updated_at = Utc::now();
        tx.update_balance(student_id, balance.amount, balance.updated_at)
            .await?;
        Ok(balance)
    }

    async fn lock(tx: &mut S::Tx, student_id: StudentId) -> Result<Balance> {
        tx.lock_balance(student_id)
            .await?
            .ok_or_else(|| DomainError::not_found("balance", student_id))
    }
}
