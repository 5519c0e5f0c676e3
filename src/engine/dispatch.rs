use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::pricing::{checked_quote, validate_distance};
use crate::error::AppError;
use crate::geo::{haversine_km, validate_point};
use crate::models::driver::{DriverLocation, DriverStats, GeoPoint};
use crate::models::order::{Order, OrderEvent, OrderStatus, OrderType, Stop};
use crate::models::pricing::{PricingConfig, PricingRates};
use crate::models::principal::{Principal, Role};
use crate::models::wallet::{Transaction, Wallet};
use crate::state::AppState;

const ADMIN_TOP_UP_DESCRIPTION: &str = "Admin top-up";

#[derive(Debug, Clone, Deserialize)]
pub struct StopInput {
    pub lat: f64,
    pub lng: f64,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitOrder {
    pub order_type: OrderType,
    pub pickup: StopInput,
    pub dropoff: StopInput,
    pub distance_km: f64,
    /// Client-side estimate. Informational only, the server quote wins.
    pub estimated_price: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompleteOrder {
    pub actual_price: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreditWallet {
    pub amount: f64,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Quote {
    pub order_type: OrderType,
    pub distance_km: f64,
    pub price: f64,
    pub pricing_version: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Settlement {
    pub order: Order,
    pub transaction: Transaction,
}

fn require_role(principal: &Principal, role: Role) -> Result<(), AppError> {
    if principal.role != role {
        return Err(AppError::Unauthorized(format!(
            "{} {} is not allowed here, {role} access only",
            principal.role, principal.id
        )));
    }
    Ok(())
}

fn validate_price(field: &str, value: f64) -> Result<(), AppError> {
    if !value.is_finite() || value < 0.0 {
        return Err(AppError::InvalidInput(format!(
            "{field} must be a non-negative number, got {value}"
        )));
    }
    Ok(())
}

fn to_stop(field: &str, input: StopInput) -> Result<Stop, AppError> {
    let point = GeoPoint {
        lat: input.lat,
        lng: input.lng,
    };
    validate_point(field, &point).map_err(AppError::InvalidInput)?;

    let address = input
        .address
        .map(|raw| raw.trim().to_string())
        .filter(|address| !address.is_empty());

    Ok(Stop { point, address })
}

fn publish(state: &AppState, order: &Order) {
    // No subscribers is not an error.
    let _ = state.order_events_tx.send(OrderEvent::from(order));
}

pub async fn quote_price(
    state: &AppState,
    order_type: OrderType,
    distance_km: f64,
) -> Result<Quote, AppError> {
    validate_distance(distance_km)?;
    let config = state.pricing.get_or_create_default().await;
    let price = checked_quote(&config, order_type, distance_km)?;

    Ok(Quote {
        order_type,
        distance_km,
        price,
        pricing_version: config.version,
    })
}

pub async fn submit_order(
    state: &AppState,
    principal: &Principal,
    request: SubmitOrder,
) -> Result<Order, AppError> {
    require_role(principal, Role::Customer)?;
    validate_distance(request.distance_km)?;
    let pickup = to_stop("pickup", request.pickup)?;
    let dropoff = to_stop("dropoff", request.dropoff)?;

    let config = state.pricing.get_or_create_default().await;
    let estimated_price = checked_quote(&config, request.order_type, request.distance_km)?;

    if let Some(client_estimate) = request.estimated_price {
        if client_estimate != estimated_price {
            debug!(
                client_estimate,
                estimated_price, "client estimate overridden by server quote"
            );
        }
    }

    let order = Order {
        id: Uuid::new_v4(),
        customer_id: principal.id,
        driver_id: None,
        order_type: request.order_type,
        status: OrderStatus::Pending,
        pickup,
        dropoff,
        distance_km: request.distance_km,
        estimated_price,
        actual_price: None,
        created_at: Utc::now(),
        completed_at: None,
    };

    state.orders.insert(order.clone());
    state
        .metrics
        .orders_created_total
        .with_label_values(&[order.order_type.as_str()])
        .inc();
    publish(state, &order);

    info!(
        order_id = %order.id,
        customer_id = %order.customer_id,
        order_type = %order.order_type,
        estimated_price,
        pricing_version = config.version,
        "order submitted"
    );

    Ok(order)
}

pub async fn accept_order(
    state: &AppState,
    principal: &Principal,
    order_id: Uuid,
) -> Result<Order, AppError> {
    require_role(principal, Role::Driver)?;

    let result = state.orders.accept(order_id, principal.id).await;
    state.metrics.record_transition("accept", &result);

    match &result {
        Ok(order) => {
            publish(state, order);
            info!(order_id = %order_id, driver_id = %principal.id, "order accepted");
        }
        Err(err) => warn!(order_id = %order_id, driver_id = %principal.id, error = %err, "accept rejected"),
    }

    result
}

pub async fn complete_order(
    state: &AppState,
    principal: &Principal,
    order_id: Uuid,
    request: CompleteOrder,
) -> Result<Settlement, AppError> {
    require_role(principal, Role::Driver)?;
    if let Some(actual_price) = request.actual_price {
        validate_price("actual_price", actual_price)?;
    }

    let start = Instant::now();
    let result = settle(state, principal.id, order_id, request.actual_price).await;
    let outcome = if result.is_ok() { "success" } else { "error" };

    state
        .metrics
        .settlement_latency_seconds
        .with_label_values(&[outcome])
        .observe(start.elapsed().as_secs_f64());
    state.metrics.record_transition("complete", &result);

    match &result {
        Ok(settlement) => {
            state.metrics.settled_amount_total.inc_by(settlement.transaction.amount);
            state
                .metrics
                .wallet_credits_total
                .with_label_values(&["settlement"])
                .inc();
            publish(state, &settlement.order);
            info!(
                order_id = %order_id,
                driver_id = %principal.id,
                amount = settlement.transaction.amount,
                transaction_id = %settlement.transaction.id,
                "order completed and settled"
            );
        }
        Err(err) => warn!(order_id = %order_id, driver_id = %principal.id, error = %err, "completion rejected"),
    }

    result
}

/// Holds the order lock across the wallet credit, so the status change is only
/// written once the transaction exists.
async fn settle(
    state: &AppState,
    driver_id: Uuid,
    order_id: Uuid,
    actual_price: Option<f64>,
) -> Result<Settlement, AppError> {
    let mut order = state.orders.lock(order_id).await?;
    let price = order.settlement_price(driver_id, actual_price)?;

    let transaction = state
        .ledger
        .credit(driver_id, price, format!("Earnings for order {order_id}"))
        .await?;

    order.mark_completed(price, Utc::now());

    Ok(Settlement {
        order: order.clone(),
        transaction,
    })
}

pub async fn cancel_order(
    state: &AppState,
    principal: &Principal,
    order_id: Uuid,
) -> Result<Order, AppError> {
    require_role(principal, Role::Customer)?;

    let result = state.orders.cancel(order_id, principal.id).await;
    state.metrics.record_transition("cancel", &result);

    match &result {
        Ok(order) => {
            publish(state, order);
            info!(order_id = %order_id, customer_id = %principal.id, "order cancelled");
        }
        Err(err) => warn!(order_id = %order_id, customer_id = %principal.id, error = %err, "cancel rejected"),
    }

    result
}

pub async fn get_order(
    state: &AppState,
    principal: &Principal,
    order_id: Uuid,
) -> Result<Order, AppError> {
    let order = state.orders.get(order_id)?;

    let is_owner = order.customer_id == principal.id;
    let is_driver = order.driver_id == Some(principal.id);
    if !is_owner && !is_driver {
        return Err(AppError::Unauthorized(format!(
            "order {order_id} is not visible to {} {}",
            principal.role, principal.id
        )));
    }

    Ok(order)
}

/// Customers see the orders they placed, drivers the orders they took. Newest first.
pub async fn list_my_orders(state: &AppState, principal: &Principal) -> Result<Vec<Order>, AppError> {
    let me = principal.id;
    match principal.role {
        Role::Customer => Ok(state.orders.select(|order| order.customer_id == me)),
        Role::Driver => Ok(state.orders.select(|order| order.driver_id == Some(me))),
        Role::Admin => Err(AppError::Unauthorized(
            "admins have no orders of their own".to_string(),
        )),
    }
}

/// Pending orders, nearest pickup first when the driver has reported a location.
pub async fn list_available_orders(
    state: &AppState,
    principal: &Principal,
) -> Result<Vec<Order>, AppError> {
    require_role(principal, Role::Driver)?;

    let mut orders = state
        .orders
        .select(|order| order.status == OrderStatus::Pending);

    let here = state
        .driver_locations
        .get(&principal.id)
        .map(|entry| entry.value().location);

    if let Some(here) = here {
        orders.sort_by(|a, b| {
            haversine_km(&here, &a.pickup.point).total_cmp(&haversine_km(&here, &b.pickup.point))
        });
    }

    Ok(orders)
}

pub async fn update_driver_location(
    state: &AppState,
    principal: &Principal,
    location: GeoPoint,
) -> Result<DriverLocation, AppError> {
    require_role(principal, Role::Driver)?;
    validate_point("location", &location).map_err(AppError::InvalidInput)?;

    let latest = DriverLocation {
        driver_id: principal.id,
        location,
        updated_at: Utc::now(),
    };
    state.driver_locations.insert(principal.id, latest.clone());

    debug!(driver_id = %principal.id, lat = location.lat, lng = location.lng, "driver location updated");
    Ok(latest)
}

pub async fn driver_stats(state: &AppState, principal: &Principal) -> Result<DriverStats, AppError> {
    require_role(principal, Role::Driver)?;

    let me = principal.id;
    let completed = state
        .orders
        .select(|order| order.driver_id == Some(me) && order.status == OrderStatus::Completed);

    Ok(DriverStats {
        completed_orders: completed.len(),
        total_earnings: completed
            .iter()
            .filter_map(|order| order.actual_price)
            .sum(),
    })
}

pub async fn get_pricing_config(state: &AppState) -> PricingConfig {
    state.pricing.get_or_create_default().await
}

pub async fn update_pricing_config(
    state: &AppState,
    principal: &Principal,
    rates: PricingRates,
) -> Result<PricingConfig, AppError> {
    require_role(principal, Role::Admin)?;
    state.pricing.update(rates).await
}

pub async fn provision_wallet(
    state: &AppState,
    principal: &Principal,
    driver_id: Uuid,
) -> Result<Wallet, AppError> {
    require_role(principal, Role::Admin)?;

    let result = state.ledger.open_wallet(driver_id).await;
    state.metrics.record_contention("provision_wallet", &result);
    result
}

pub async fn credit_wallet(
    state: &AppState,
    principal: &Principal,
    driver_id: Uuid,
    request: CreditWallet,
) -> Result<Transaction, AppError> {
    require_role(principal, Role::Admin)?;

    if !request.amount.is_finite() || request.amount == 0.0 {
        return Err(AppError::InvalidInput(format!(
            "amount must be a non-zero number, got {}",
            request.amount
        )));
    }
    if !state.ledger.has_wallet(driver_id) {
        return Err(AppError::NotFound(format!(
            "wallet for driver {driver_id} not found"
        )));
    }

    let description = request
        .description
        .map(|raw| raw.trim().to_string())
        .filter(|description| !description.is_empty())
        .unwrap_or_else(|| ADMIN_TOP_UP_DESCRIPTION.to_string());

    let result = state
        .ledger
        .credit(driver_id, request.amount, description)
        .await;
    state.metrics.record_contention("credit_wallet", &result);
    let transaction = result?;

    state
        .metrics
        .wallet_credits_total
        .with_label_values(&["admin"])
        .inc();
    info!(
        driver_id = %driver_id,
        admin_id = %principal.id,
        amount = request.amount,
        "wallet credited by admin"
    );

    Ok(transaction)
}

pub async fn get_wallet(state: &AppState, principal: &Principal) -> Result<Wallet, AppError> {
    require_role(principal, Role::Driver)?;

    let result = state.ledger.wallet(principal.id).await;
    state.metrics.record_contention("get_wallet", &result);
    result
}

pub async fn list_transactions(
    state: &AppState,
    principal: &Principal,
) -> Result<Vec<Transaction>, AppError> {
    require_role(principal, Role::Driver)?;

    let result = state.ledger.transactions(principal.id).await;
    state.metrics.record_contention("list_transactions", &result);
    result
}
