use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::Config;
use crate::engine::ledger::Ledger;
use crate::engine::orders::OrderStore;
use crate::engine::pricing::PricingTable;
use crate::error::AppError;
use crate::models::driver::DriverLocation;
use crate::models::order::OrderEvent;
use crate::observability::metrics::Metrics;
use crate::snapshot::Snapshot;

pub struct AppState {
    pub pricing: PricingTable,
    pub orders: OrderStore,
    pub ledger: Ledger,
    pub driver_locations: DashMap<Uuid, DriverLocation>,
    pub order_events_tx: broadcast::Sender<OrderEvent>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        Self::restore(config, Snapshot::default())
    }

    pub fn restore(config: &Config, snapshot: Snapshot) -> Self {
        let (order_events_tx, _unused_rx) = broadcast::channel(config.event_buffer_size);

        let driver_locations = DashMap::new();
        for location in snapshot.driver_locations {
            driver_locations.insert(location.driver_id, location);
        }

        Self {
            pricing: PricingTable::restore(config.default_rates, snapshot.pricing),
            orders: OrderStore::restore(config.lock_timeout, snapshot.orders),
            ledger: Ledger::restore(config.lock_timeout, snapshot.wallets),
            driver_locations,
            order_events_tx,
            metrics: Metrics::new(),
        }
    }

    pub async fn snapshot(&self) -> Result<Snapshot, AppError> {
        Ok(Snapshot {
            orders: self.orders.select(|_| true),
            wallets: self.ledger.snapshot().await?,
            pricing: self.pricing.snapshot().await,
            driver_locations: self
                .driver_locations
                .iter()
                .map(|entry| entry.value().clone())
                .collect(),
        })
    }
}
