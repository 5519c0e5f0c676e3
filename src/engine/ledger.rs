use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::engine::locks::acquire;
use crate::error::AppError;
use crate::models::wallet::{Transaction, Wallet, WalletRecord};

/// Driver balances and their append-only transaction logs, keyed by driver id.
/// The only place a balance is ever written.
pub struct Ledger {
    accounts: DashMap<Uuid, Arc<Mutex<WalletRecord>>>,
    lock_timeout: Duration,
}

impl Ledger {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            accounts: DashMap::new(),
            lock_timeout,
        }
    }

    pub fn restore(lock_timeout: Duration, records: Vec<WalletRecord>) -> Self {
        let ledger = Self::new(lock_timeout);
        for record in records {
            ledger
                .accounts
                .insert(record.wallet.driver_id, Arc::new(Mutex::new(record)));
        }
        ledger
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn has_wallet(&self, driver_id: Uuid) -> bool {
        self.accounts.contains_key(&driver_id)
    }

    /// Provisioning hook for driver account creation. Idempotent.
    pub async fn open_wallet(&self, driver_id: Uuid) -> Result<Wallet, AppError> {
        let slot = match self.accounts.entry(driver_id) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let now = Utc::now();
                let wallet = Wallet {
                    id: Uuid::new_v4(),
                    driver_id,
                    balance: 0.0,
                    created_at: now,
                    updated_at: now,
                };
                entry.insert(Arc::new(Mutex::new(WalletRecord {
                    wallet: wallet.clone(),
                    transactions: Vec::new(),
                })));

                info!(driver_id = %driver_id, wallet_id = %wallet.id, "wallet opened");
                return Ok(wallet);
            }
        };

        let record = acquire(slot, self.lock_timeout, "wallet", driver_id).await?;
        Ok(record.wallet.clone())
    }

    /// Appends a transaction and moves the balance by the same amount under the
    /// wallet lock. The sign of `amount` is the caller's business.
    pub async fn credit(
        &self,
        driver_id: Uuid,
        amount: f64,
        description: impl Into<String>,
    ) -> Result<Transaction, AppError> {
        if !amount.is_finite() {
            return Err(AppError::InvalidInput(format!(
                "credit amount must be finite, got {amount}"
            )));
        }

        let slot = self.slot(driver_id).ok_or_else(|| {
            AppError::DependencyUnavailable(format!("driver {driver_id} has no wallet"))
        })?;
        let mut record = acquire(slot, self.lock_timeout, "wallet", driver_id).await?;

        let now = Utc::now();
        let transaction = Transaction {
            id: Uuid::new_v4(),
            wallet_id: record.wallet.id,
            amount,
            description: description.into(),
            created_at: now,
        };

        record.transactions.push(transaction.clone());
        record.wallet.balance += amount;
        record.wallet.updated_at = now;

        info!(
            driver_id = %driver_id,
            transaction_id = %transaction.id,
            amount,
            balance = record.wallet.balance,
            "wallet credited"
        );

        Ok(transaction)
    }

    pub async fn wallet(&self, driver_id: Uuid) -> Result<Wallet, AppError> {
        let record = self.record(driver_id).await?;
        Ok(record.wallet.clone())
    }

    /// Newest first.
    pub async fn transactions(&self, driver_id: Uuid) -> Result<Vec<Transaction>, AppError> {
        let record = self.record(driver_id).await?;
        Ok(record.transactions.iter().rev().cloned().collect())
    }

    /// Whether the balance still equals the sum of the log.
    pub async fn audit(&self, driver_id: Uuid) -> Result<bool, AppError> {
        let record = self.record(driver_id).await?;
        Ok(record.wallet.balance == record.transaction_sum())
    }

    pub async fn snapshot(&self) -> Result<Vec<WalletRecord>, AppError> {
        let slots: Vec<(Uuid, Arc<Mutex<WalletRecord>>)> = self
            .accounts
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        let mut records = Vec::with_capacity(slots.len());
        for (driver_id, slot) in slots {
            let record = acquire(slot, self.lock_timeout, "wallet", driver_id).await?;
            records.push(record.clone());
        }
        Ok(records)
    }

    fn slot(&self, driver_id: Uuid) -> Option<Arc<Mutex<WalletRecord>>> {
        self.accounts
            .get(&driver_id)
            .map(|entry| entry.value().clone())
    }

    /// Keeps the wallet locked for as long as the guard lives.
    #[cfg(test)]
    pub(crate) async fn hold(
        &self,
        driver_id: Uuid,
    ) -> Result<tokio::sync::OwnedMutexGuard<WalletRecord>, AppError> {
        self.record(driver_id).await
    }

    async fn record(
        &self,
        driver_id: Uuid,
    ) -> Result<tokio::sync::OwnedMutexGuard<WalletRecord>, AppError> {
        let slot = self
            .slot(driver_id)
            .ok_or_else(|| AppError::NotFound(format!("wallet for driver {driver_id} not found")))?;
        acquire(slot, self.lock_timeout, "wallet", driver_id).await
    }
}
