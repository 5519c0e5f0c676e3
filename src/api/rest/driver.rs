use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use uuid::Uuid;

use crate::engine::dispatch::{self, CompleteOrder, Settlement};
use crate::error::AppError;
use crate::models::driver::{DriverLocation, DriverStats, GeoPoint};
use crate::models::order::Order;
use crate::models::principal::Principal;
use crate::models::wallet::{Transaction, Wallet};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/driver/orders", get(list_available_orders))
        .route("/driver/orders/:id/accept", put(accept_order))
        .route("/driver/orders/:id/complete", put(complete_order))
        .route("/driver/location", post(update_location))
        .route("/driver/stats", get(driver_stats))
        .route("/driver/wallet", get(get_wallet))
        .route("/driver/transactions", get(list_transactions))
}

async fn list_available_orders(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<Vec<Order>>, AppError> {
    dispatch::list_available_orders(&state, &principal)
        .await
        .map(Json)
}

async fn accept_order(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    dispatch::accept_order(&state, &principal, id).await.map(Json)
}

/// The body is optional; an empty one settles at the estimated price.
async fn complete_order(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<Settlement>, AppError> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        CompleteOrder::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|err| AppError::InvalidInput(format!("invalid completion body: {err}")))?
    };

    dispatch::complete_order(&state, &principal, id, request)
        .await
        .map(Json)
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Json(payload): Json<GeoPoint>,
) -> Result<Json<DriverLocation>, AppError> {
    dispatch::update_driver_location(&state, &principal, payload)
        .await
        .map(Json)
}

async fn driver_stats(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<DriverStats>, AppError> {
    dispatch::driver_stats(&state, &principal).await.map(Json)
}

async fn get_wallet(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<Wallet>, AppError> {
    dispatch::get_wallet(&state, &principal).await.map(Json)
}

async fn list_transactions(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<Vec<Transaction>>, AppError> {
    dispatch::list_transactions(&state, &principal)
        .await
        .map(Json)
}
