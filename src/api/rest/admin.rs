use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::post;
use uuid::Uuid;

use crate::engine::dispatch::{self, CreditWallet};
use crate::error::AppError;
use crate::models::principal::Principal;
use crate::models::wallet::{Transaction, Wallet};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/wallets/:driver_id", post(provision_wallet))
        .route("/admin/wallets/:driver_id/credit", post(credit_wallet))
}

async fn provision_wallet(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(driver_id): Path<Uuid>,
) -> Result<Json<Wallet>, AppError> {
    dispatch::provision_wallet(&state, &principal, driver_id)
        .await
        .map(Json)
}

async fn credit_wallet(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(driver_id): Path<Uuid>,
    Json(payload): Json<CreditWallet>,
) -> Result<Json<Transaction>, AppError> {
    dispatch::credit_wallet(&state, &principal, driver_id, payload)
        .await
        .map(Json)
}
