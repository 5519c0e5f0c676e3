use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::dispatch::{self, Quote, SubmitOrder};
use crate::error::AppError;
use crate::models::order::{Order, OrderType};
use crate::models::pricing::{PricingConfig, PricingRates};
use crate::models::principal::Principal;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(submit_order))
        .route("/orders/mine", get(list_my_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/cancel", post(cancel_order))
        .route("/pricing", get(get_pricing).put(update_pricing))
        .route("/pricing/quote", get(quote_price))
}

#[derive(Deserialize)]
pub struct QuoteParams {
    pub order_type: OrderType,
    pub distance_km: f64,
}

async fn submit_order(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Json(payload): Json<SubmitOrder>,
) -> Result<Json<Order>, AppError> {
    dispatch::submit_order(&state, &principal, payload)
        .await
        .map(Json)
}

async fn list_my_orders(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<Vec<Order>>, AppError> {
    dispatch::list_my_orders(&state, &principal).await.map(Json)
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    dispatch::get_order(&state, &principal, id).await.map(Json)
}

async fn cancel_order(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    dispatch::cancel_order(&state, &principal, id).await.map(Json)
}

async fn quote_price(
    State(state): State<Arc<AppState>>,
    _principal: Principal,
    Query(params): Query<QuoteParams>,
) -> Result<Json<Quote>, AppError> {
    dispatch::quote_price(&state, params.order_type, params.distance_km)
        .await
        .map(Json)
}

async fn get_pricing(
    State(state): State<Arc<AppState>>,
    _principal: Principal,
) -> Json<PricingConfig> {
    Json(dispatch::get_pricing_config(&state).await)
}

async fn update_pricing(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Json(payload): Json<PricingRates>,
) -> Result<Json<PricingConfig>, AppError> {
    dispatch::update_pricing_config(&state, &principal, payload)
        .await
        .map(Json)
}
