use chrono::Utc;
use tokio::sync::RwLock;
use tracing::info;

use crate::error::AppError;
use crate::models::order::OrderType;
use crate::models::pricing::{PricingConfig, PricingRates};

/// Holds the singleton pricing configuration. Reads and writes go through its
/// own lock, independent of order and wallet locks.
pub struct PricingTable {
    current: RwLock<Option<PricingConfig>>,
    defaults: PricingRates,
}

impl PricingTable {
    pub fn new(defaults: PricingRates) -> Self {
        Self::restore(defaults, None)
    }

    pub fn restore(defaults: PricingRates, config: Option<PricingConfig>) -> Self {
        Self {
            current: RwLock::new(config),
            defaults,
        }
    }

    /// Returns the current configuration, materializing the defaults on first use.
    pub async fn get_or_create_default(&self) -> PricingConfig {
        if let Some(config) = self.current.read().await.as_ref() {
            return config.clone();
        }

        let mut current = self.current.write().await;
        current
            .get_or_insert_with(|| {
                info!(version = 1, "materialized default pricing config");
                PricingConfig {
                    version: 1,
                    rates: self.defaults,
                    updated_at: Utc::now(),
                }
            })
            .clone()
    }

    /// Full replace of all four rates.
    pub async fn update(&self, rates: PricingRates) -> Result<PricingConfig, AppError> {
        rates.validate().map_err(AppError::InvalidInput)?;

        let mut current = self.current.write().await;
        let version = current.as_ref().map_or(1, |config| config.version + 1);
        let config = PricingConfig {
            version,
            rates,
            updated_at: Utc::now(),
        };
        *current = Some(config.clone());

        info!(version, "pricing config updated");
        Ok(config)
    }

    pub async fn snapshot(&self) -> Option<PricingConfig> {
        self.current.read().await.clone()
    }
}

pub fn quote(config: &PricingConfig, order_type: OrderType, distance_km: f64) -> f64 {
    let rates = config.rates.for_type(order_type);
    rates.base_price + distance_km * rates.price_per_km
}

/// [`quote`] that refuses to produce a price the ledger could never settle.
pub fn checked_quote(
    config: &PricingConfig,
    order_type: OrderType,
    distance_km: f64,
) -> Result<f64, AppError> {
    validate_distance(distance_km)?;

    let price = quote(config, order_type, distance_km);
    if !price.is_finite() {
        return Err(AppError::InvalidInput(format!(
            "distance_km {distance_km} is too large to price"
        )));
    }
    Ok(price)
}

pub fn validate_distance(distance_km: f64) -> Result<(), AppError> {
    if !distance_km.is_finite() || distance_km < 0.0 {
        return Err(AppError::InvalidInput(format!(
            "distance_km must be a non-negative number, got {distance_km}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{PricingTable, checked_quote, quote, validate_distance};
    use crate::error::AppError;
    use crate::models::order::OrderType;
    use crate::models::pricing::{PricingRates, Rates};

    fn rates(taxi_base: f64, taxi_km: f64) -> PricingRates {
        PricingRates {
            taxi: Rates {
                base_price: taxi_base,
                price_per_km: taxi_km,
            },
            delivery: Rates {
                base_price: 15.0,
                price_per_km: 2.5,
            },
        }
    }

    #[tokio::test]
    async fn first_read_materializes_defaults_once() {
        let table = PricingTable::new(PricingRates::default());
        assert!(table.snapshot().await.is_none());

        let first = table.get_or_create_default().await;
        let second = table.get_or_create_default().await;

        assert_eq!(first.version, 1);
        assert_eq!(first, second);
        assert_eq!(first.rates, PricingRates::default());
    }

    #[tokio::test]
    async fn taxi_quote_for_ten_km_is_thirty() {
        let table = PricingTable::new(rates(10.0, 2.0));
        let config = table.get_or_create_default().await;

        assert_eq!(quote(&config, OrderType::Taxi, 10.0), 30.0);
        assert_eq!(quote(&config, OrderType::Delivery, 0.0), 15.0);
    }

    #[tokio::test]
    async fn quote_difference_is_linear_in_distance() {
        let table = PricingTable::new(rates(10.0, 2.0));
        let config = table.get_or_create_default().await;

        for (d1, d2) in [(0.0, 1.0), (3.0, 7.5), (12.25, 40.0)] {
            for order_type in [OrderType::Taxi, OrderType::Delivery] {
                let per_km = config.rates.for_type(order_type).price_per_km;
                let delta = quote(&config, order_type, d2) - quote(&config, order_type, d1);
                assert!((delta - (d2 - d1) * per_km).abs() < 1e-9);
            }
        }
    }

    #[tokio::test]
    async fn update_replaces_rates_and_bumps_version() {
        let table = PricingTable::new(PricingRates::default());
        table.get_or_create_default().await;

        let updated = table.update(rates(5.0, 1.0)).await.unwrap();

        assert_eq!(updated.version, 2);
        assert_eq!(quote(&updated, OrderType::Taxi, 10.0), 15.0);
        assert_eq!(table.get_or_create_default().await, updated);
    }

    #[tokio::test]
    async fn negative_rate_is_rejected_and_config_kept() {
        let table = PricingTable::new(PricingRates::default());
        let before = table.get_or_create_default().await;

        let err = table.update(rates(-1.0, 2.0)).await.unwrap_err();

        assert!(matches!(err, AppError::InvalidInput(_)));
        assert_eq!(table.get_or_create_default().await, before);
    }

    #[tokio::test]
    async fn overflowing_distance_is_not_priced() {
        let table = PricingTable::new(rates(10.0, 2.0));
        let config = table.get_or_create_default().await;

        let err = checked_quote(&config, OrderType::Taxi, 1e308).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert_eq!(checked_quote(&config, OrderType::Taxi, 10.0).unwrap(), 30.0);
    }

    #[test]
    fn negative_or_nan_distance_is_invalid() {
        assert!(validate_distance(0.0).is_ok());
        assert!(validate_distance(-0.5).is_err());
        assert!(validate_distance(f64::NAN).is_err());
    }
}
