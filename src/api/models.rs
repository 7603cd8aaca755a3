//! API Request/Response Models
//!
//! Round, bet, spin and stats types are serialized as-is from the game
//! modules; these are the wrappers around them.

use crate::ledger::{HouseSummary, HouseTransaction, LedgerTransaction};
use crate::service::ServiceStatus;
use crate::stats::PlayerStats;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub service: ServiceStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub address: String,
    pub balance: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionsResponse {
    pub address: String,
    pub transactions: Vec<LedgerTransaction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardResponse {
    pub players: Vec<PlayerStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HouseResponse {
    #[serde(flatten)]
    pub summary: HouseSummary,
    pub recent_transactions: Vec<HouseTransaction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetResponse {
    pub address: String,
    pub reset: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupResponse {
    pub path: PathBuf,
    pub sha256: String,
    pub accounts: usize,
    pub bytes: usize,
}

/// Body of admin deposit/withdraw calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmountRequest {
    pub amount: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LimitQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}
