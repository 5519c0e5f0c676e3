use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::error::AppError;
use crate::models::driver::DriverLocation;
use crate::models::order::Order;
use crate::models::pricing::PricingConfig;
use crate::models::wallet::WalletRecord;
use crate::state::AppState;

/// Everything needed to rebuild [`crate::state::AppState`] after a restart.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub orders: Vec<Order>,
    pub wallets: Vec<WalletRecord>,
    pub pricing: Option<PricingConfig>,
    #[serde(default)]
    pub driver_locations: Vec<DriverLocation>,
}

impl Snapshot {
    /// A missing file is an empty snapshot; a corrupt one is an error.
    pub async fn load(path: &Path) -> Result<Self, AppError> {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no snapshot found, starting empty");
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(AppError::Internal(format!(
                    "failed to read snapshot {}: {err}",
                    path.display()
                )));
            }
        };

        let snapshot: Self = serde_json::from_slice(&raw).map_err(|err| {
            AppError::Internal(format!("invalid snapshot {}: {err}", path.display()))
        })?;

        info!(
            path = %path.display(),
            orders = snapshot.orders.len(),
            wallets = snapshot.wallets.len(),
            "snapshot loaded"
        );
        Ok(snapshot)
    }

    /// Writes to a sibling temp file first so a crash never leaves a torn snapshot.
    pub async fn save(&self, path: &Path) -> Result<(), AppError> {
        let body = serde_json::to_vec_pretty(self)
            .map_err(|err| AppError::Internal(format!("failed to encode snapshot: {err}")))?;

        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, body).await.map_err(|err| {
            AppError::Internal(format!("failed to write {}: {err}", tmp.display()))
        })?;
        tokio::fs::rename(&tmp, path).await.map_err(|err| {
            AppError::Internal(format!("failed to replace {}: {err}", path.display()))
        })?;

        info!(
            path = %path.display(),
            orders = self.orders.len(),
            wallets = self.wallets.len(),
            "snapshot saved"
        );
        Ok(())
    }
}

/// Persists the state every `every`, so a crash loses at most one interval of changes.
pub async fn run_snapshot_flusher(state: Arc<AppState>, path: PathBuf, every: Duration) {
    info!(path = %path.display(), interval_secs = every.as_secs(), "snapshot flusher started");

    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let result = match state.snapshot().await {
            Ok(snapshot) => snapshot.save(&path).await,
            Err(err) => Err(err),
        };
        state.metrics.record_contention("snapshot", &result);

        if let Err(err) = result {
            warn!(error = %err, path = %path.display(), "snapshot flush failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    use uuid::Uuid;

    use super::{Snapshot, run_snapshot_flusher};
    use crate::config::Config;
    use crate::engine::dispatch::{self, CompleteOrder, StopInput, SubmitOrder};
    use crate::models::driver::GeoPoint;
    use crate::models::order::{OrderStatus, OrderType};
    use crate::models::principal::{Principal, Role};
    use crate::state::AppState;

    fn delivery(distance_km: f64) -> SubmitOrder {
        SubmitOrder {
            order_type: OrderType::Delivery,
            pickup: StopInput {
                lat: 30.0444,
                lng: 31.2357,
                address: Some("Zamalek".to_string()),
            },
            dropoff: StopInput {
                lat: 30.0131,
                lng: 31.2089,
                address: None,
            },
            distance_km,
            estimated_price: None,
        }
    }

    fn temp_path() -> PathBuf {
        std::env::temp_dir().join(format!("ride-dispatch-{}.json", Uuid::new_v4()))
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let snapshot = Snapshot::load(&temp_path()).await.unwrap();
        assert!(snapshot.orders.is_empty());
        assert!(snapshot.pricing.is_none());
    }

    #[tokio::test]
    async fn wallets_and_pricing_survive_restart() {
        let config = Config::default();
        let state = AppState::new(&config);
        let driver = Uuid::new_v4();
        state.ledger.open_wallet(driver).await.unwrap();
        state.ledger.credit(driver, 30.0, "earnings").await.unwrap();
        let pricing = state.pricing.get_or_create_default().await;

        let path = temp_path();
        state.snapshot().await.unwrap().save(&path).await.unwrap();

        let restored = AppState::restore(&config, Snapshot::load(&path).await.unwrap());
        let _ = tokio::fs::remove_file(&path).await;

        assert_eq!(restored.ledger.wallet(driver).await.unwrap().balance, 30.0);
        assert!(restored.ledger.audit(driver).await.unwrap());
        assert_eq!(restored.pricing.get_or_create_default().await, pricing);
    }

    #[tokio::test]
    async fn orders_in_every_state_survive_restart() {
        let config = Config::default();
        let state = AppState::new(&config);
        let customer = Principal::new(Uuid::new_v4(), Role::Customer);
        let driver = Principal::new(Uuid::new_v4(), Role::Driver);
        state.ledger.open_wallet(driver.id).await.unwrap();

        let pending = dispatch::submit_order(&state, &customer, delivery(1.0)).await.unwrap();
        let accepted = dispatch::submit_order(&state, &customer, delivery(2.0)).await.unwrap();
        let completed = dispatch::submit_order(&state, &customer, delivery(3.0)).await.unwrap();
        let cancelled = dispatch::submit_order(&state, &customer, delivery(4.0)).await.unwrap();

        dispatch::accept_order(&state, &driver, accepted.id).await.unwrap();
        dispatch::accept_order(&state, &driver, completed.id).await.unwrap();
        dispatch::complete_order(&state, &driver, completed.id, CompleteOrder::default())
            .await
            .unwrap();
        dispatch::cancel_order(&state, &customer, cancelled.id).await.unwrap();
        dispatch::update_driver_location(&state, &driver, GeoPoint { lat: 30.05, lng: 31.24 })
            .await
            .unwrap();

        let path = temp_path();
        state.snapshot().await.unwrap().save(&path).await.unwrap();
        let restored = AppState::restore(&config, Snapshot::load(&path).await.unwrap());
        let _ = tokio::fs::remove_file(&path).await;

        let expected = [
            (pending.id, OrderStatus::Pending),
            (accepted.id, OrderStatus::Accepted),
            (completed.id, OrderStatus::Completed),
            (cancelled.id, OrderStatus::Cancelled),
        ];
        for (id, status) in expected {
            let order = restored.orders.get(id).unwrap();
            assert_eq!(order.status, status);
            assert!(order.lifecycle_invariants_hold());
        }

        let settled = restored.orders.get(completed.id).unwrap();
        assert_eq!(settled.actual_price, Some(22.5));
        assert_eq!(settled.pickup.address.as_deref(), Some("Zamalek"));
        assert_eq!(restored.ledger.wallet(driver.id).await.unwrap().balance, 22.5);
        assert!(restored.driver_locations.contains_key(&driver.id));

        // Restored orders keep enforcing the lifecycle.
        dispatch::accept_order(&restored, &driver, pending.id).await.unwrap();
        assert!(dispatch::cancel_order(&restored, &customer, completed.id).await.is_err());
    }

    #[tokio::test]
    async fn flusher_writes_state_without_a_shutdown() {
        let state = Arc::new(AppState::new(&Config::default()));
        let driver = Uuid::new_v4();
        state.ledger.open_wallet(driver).await.unwrap();
        state.ledger.credit(driver, 12.0, "earnings").await.unwrap();

        let path = temp_path();
        let flusher = tokio::spawn(run_snapshot_flusher(
            state.clone(),
            path.clone(),
            Duration::from_millis(20),
        ));

        tokio::time::sleep(Duration::from_millis(200)).await;
        flusher.abort();

        let snapshot = Snapshot::load(&path).await.unwrap();
        let _ = tokio::fs::remove_file(&path).await;

        assert_eq!(snapshot.wallets.len(), 1);
        assert_eq!(snapshot.wallets[0].wallet.balance, 12.0);
    }
}
