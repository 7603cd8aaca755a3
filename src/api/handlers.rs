//! Request Handlers
//!
//! Thin adapters from HTTP to [`CasinoService`]; no game logic lives here.

use super::{errors::ApiError, middleware::RequestId, models::*};
use crate::games::round::Round;
use crate::games::types::{BetPlaced, BetRequest, BetsCleared, SpinResult};
use crate::service::CasinoService;
use crate::stats::{GlobalStats, PlayerStats};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Extension, Json,
};
use std::sync::Arc;

const DEFAULT_TRANSACTIONS: usize = 50;
const DEFAULT_LEADERBOARD: usize = 10;
const HOUSE_LOG_PREVIEW: usize = 20;

/// Shared application state
pub struct AppState {
    pub service: Arc<CasinoService>,
    pub version: String,
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// GET /health
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "Running".to_string(),
        version: state.version.clone(),
        service: state.service.status(),
    })
}

/// GET /round/:address
pub async fn get_round_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> ApiResult<Round> {
    state
        .service
        .get_round(&address)
        .await
        .map(Json)
        .map_err(|e| ApiError::game(&request_id, e))
}

/// POST /round/:address/open
pub async fn open_round_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> ApiResult<Round> {
    state
        .service
        .open_round(&address)
        .await
        .map(Json)
        .map_err(|e| ApiError::game(&request_id, e))
}

/// POST /round/:address/bet
pub async fn place_bet_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    payload: Result<Json<BetRequest>, JsonRejection>,
) -> ApiResult<BetPlaced> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(&request_id, e.body_text()))?;

    state
        .service
        .place_bet(&address, request)
        .await
        .map(Json)
        .map_err(|e| ApiError::game(&request_id, e))
}

/// POST /round/:address/clear
pub async fn clear_bets_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> ApiResult<BetsCleared> {
    state
        .service
        .clear_bets(&address)
        .await
        .map(Json)
        .map_err(|e| ApiError::game(&request_id, e))
}

/// POST /round/:address/spin
pub async fn spin_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> ApiResult<SpinResult> {
    state
        .service
        .spin(&address)
        .await
        .map(Json)
        .map_err(|e| ApiError::game(&request_id, e))
}

/// POST /round/:address/new
pub async fn new_round_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> ApiResult<Round> {
    state
        .service
        .new_round(&address)
        .await
        .map(Json)
        .map_err(|e| ApiError::game(&request_id, e))
}

/// GET /balance/:address
pub async fn balance_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> ApiResult<BalanceResponse> {
    let balance = state
        .service
        .balance(&address)
        .await
        .map_err(|e| ApiError::game(&request_id, e))?;

    Ok(Json(BalanceResponse { address, balance }))
}

/// GET /transactions/:address?limit=N
pub async fn transactions_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<TransactionsResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_TRANSACTIONS);
    let transactions = state
        .service
        .transactions(&address, limit)
        .await
        .map_err(|e| ApiError::game(&request_id, e))?;

    Ok(Json(TransactionsResponse { address, transactions }))
}

/// GET /stats/:address
pub async fn player_stats_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> ApiResult<PlayerStats> {
    state
        .service
        .get_stats(&address)
        .map(Json)
        .map_err(|e| ApiError::game(&request_id, e))
}

/// GET /leaderboard?limit=N
pub async fn leaderboard_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> Json<LeaderboardResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_LEADERBOARD);
    Json(LeaderboardResponse {
        players: state.service.leaderboard(limit),
    })
}

/// GET /stats
pub async fn global_stats_handler(State(state): State<Arc<AppState>>) -> Json<GlobalStats> {
    Json(state.service.global_stats())
}

/// GET /house
pub async fn house_handler(State(state): State<Arc<AppState>>) -> Json<HouseResponse> {
    Json(HouseResponse {
        summary: state.service.house_summary().await,
        recent_transactions: state.service.house_transactions(HOUSE_LOG_PREVIEW).await,
    })
}

/// POST /admin/reset/:address
pub async fn reset_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> ApiResult<ResetResponse> {
    state
        .service
        .reset_account(&address)
        .await
        .map_err(|e| ApiError::game(&request_id, e))?;

    Ok(Json(ResetResponse { address, reset: true }))
}

/// POST /admin/deposit/:address
pub async fn deposit_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    payload: Result<Json<AmountRequest>, JsonRejection>,
) -> ApiResult<BalanceResponse> {
    let Json(body) = payload.map_err(|e| ApiError::bad_request(&request_id, e.body_text()))?;
    let balance = state
        .service
        .deposit(&address, body.amount)
        .await
        .map_err(|e| ApiError::game(&request_id, e))?;

    Ok(Json(BalanceResponse { address, balance }))
}

/// POST /admin/withdraw/:address
pub async fn withdraw_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    payload: Result<Json<AmountRequest>, JsonRejection>,
) -> ApiResult<BalanceResponse> {
    let Json(body) = payload.map_err(|e| ApiError::bad_request(&request_id, e.body_text()))?;
    let balance = state
        .service
        .withdraw(&address, body.amount)
        .await
        .map_err(|e| ApiError::game(&request_id, e))?;

    Ok(Json(BalanceResponse { address, balance }))
}

/// POST /admin/backup
pub async fn backup_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<BackupResponse> {
    let receipt = state
        .service
        .backup_ledger()
        .await
        .map_err(|e| ApiError::internal(&request_id, e))?;

    Ok(Json(BackupResponse {
        path: receipt.path,
        sha256: receipt.sha256,
        accounts: receipt.accounts,
        bytes: receipt.bytes,
    }))
}
