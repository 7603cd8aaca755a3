//! Wheelhouse - European roulette tables over a player/house credit ledger
//!
//! One round per address moves through betting, spinning and result. Every
//! stake is escrowed from the player's ledger before the round changes, and
//! every settlement is mirrored on the house account. State lives in memory
//! and is flushed to a [`storage::LedgerStore`] in the background.

pub mod api;
pub mod config;
pub mod errors;
pub mod games;
pub mod ledger;
pub mod service;
pub mod stats;
pub mod storage;

pub use config::{ConfigLoader, WheelhouseConfig};
pub use errors::{GameError, GameResult, WheelhouseError, WheelhouseResult};
pub use games::{BetRequest, BetType, BetValue, Phase, Round, SpinResult};
pub use service::{CasinoService, ServiceBuilder};
