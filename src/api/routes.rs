//! Route Definitions

use super::handlers::*;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Build the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        // Round lifecycle
        .route("/round/:address", get(get_round_handler))
        .route("/round/:address/open", post(open_round_handler))
        .route("/round/:address/bet", post(place_bet_handler))
        .route("/round/:address/clear", post(clear_bets_handler))
        .route("/round/:address/spin", post(spin_handler))
        .route("/round/:address/new", post(new_round_handler))
        // Ledger and stats
        .route("/balance/:address", get(balance_handler))
        .route("/transactions/:address", get(transactions_handler))
        .route("/stats/:address", get(player_stats_handler))
        .route("/stats", get(global_stats_handler))
        .route("/leaderboard", get(leaderboard_handler))
        .route("/house", get(house_handler))
        // Admin
        .route("/admin/reset/:address", post(reset_handler))
        .route("/admin/deposit/:address", post(deposit_handler))
        .route("/admin/withdraw/:address", post(withdraw_handler))
        .route("/admin/backup", post(backup_handler))
        .with_state(state)
}
