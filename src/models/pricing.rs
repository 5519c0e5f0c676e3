use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::order::OrderType;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Rates {
    pub base_price: f64,
    pub price_per_km: f64,
}

/// The four rate fields that make up a complete pricing update.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PricingRates {
    pub taxi: Rates,
    pub delivery: Rates,
}

impl Default for PricingRates {
    fn default() -> Self {
        Self {
            taxi: Rates {
                base_price: 10.0,
                price_per_km: 2.0,
            },
            delivery: Rates {
                base_price: 15.0,
                price_per_km: 2.5,
            },
        }
    }
}

impl PricingRates {
    pub fn for_type(&self, order_type: OrderType) -> Rates {
        match order_type {
            OrderType::Taxi => self.taxi,
            OrderType::Delivery => self.delivery,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let fields = [
            ("taxi.base_price", self.taxi.base_price),
            ("taxi.price_per_km", self.taxi.price_per_km),
            ("delivery.base_price", self.delivery.base_price),
            ("delivery.price_per_km", self.delivery.price_per_km),
        ];

        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("{name} must be a non-negative number, got {value}"));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PricingConfig {
    pub version: u64,
    pub rates: PricingRates,
    pub updated_at: DateTime<Utc>,
}
