use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub id: Uuid,
    pub driver_id: Uuid,
    pub balance: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub amount: f64,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// A wallet together with its full transaction log, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletRecord {
    pub wallet: Wallet,
    pub transactions: Vec<Transaction>,
}

impl WalletRecord {
    pub fn transaction_sum(&self) -> f64 {
        self.transactions
            .iter()
            .fold(0.0, |sum, transaction| sum + transaction.amount)
    }
}
