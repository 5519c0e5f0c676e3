use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;
use crate::models::pricing::{PricingRates, Rates};

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    pub lock_timeout: Duration,
    pub data_file: Option<PathBuf>,
    pub snapshot_interval: Duration,
    pub default_rates: PricingRates,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let default_rates = PricingRates {
            taxi: Rates {
                base_price: parse_or_default("DEFAULT_TAXI_BASE_PRICE", 10.0)?,
                price_per_km: parse_or_default("DEFAULT_TAXI_PRICE_PER_KM", 2.0)?,
            },
            delivery: Rates {
                base_price: parse_or_default("DEFAULT_DELIVERY_BASE_PRICE", 15.0)?,
                price_per_km: parse_or_default("DEFAULT_DELIVERY_PRICE_PER_KM", 2.5)?,
            },
        };
        default_rates
            .validate()
            .map_err(|err| AppError::Internal(format!("invalid default pricing: {err}")))?;

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            lock_timeout: Duration::from_millis(parse_or_default("LOCK_TIMEOUT_MS", 2000)?),
            data_file: env::var("DATA_FILE")
                .ok()
                .filter(|raw| !raw.trim().is_empty())
                .map(PathBuf::from),
            snapshot_interval: Duration::from_secs(
                parse_or_default::<u64>("SNAPSHOT_INTERVAL_SECS", 30)?.max(1),
            ),
            default_rates,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            event_buffer_size: 1024,
            lock_timeout: Duration::from_millis(2000),
            data_file: None,
            snapshot_interval: Duration::from_secs(30),
            default_rates: PricingRates::default(),
        }
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
