//! Credit ledgers: per-player accounts, the house counterparty and the
//! address-keyed book that owns the per-account locks.

pub mod book;
pub mod house;
pub mod player;
pub mod ring;

pub use book::{AccountBook, AccountSlot};
pub use house::{HouseAccount, HouseSummary, HouseTransaction, HouseTransactionKind};
pub use player::{LedgerTransaction, PlayerAccount, TransactionKind};
pub use ring::RingLog;

use crate::errors::GameResult;
use async_trait::async_trait;

/// Ledger capability over a single, already-locked account.
///
/// The round state machine only ever sees this trait. `debit` is the one
/// place a balance can be refused; on error nothing has changed.
pub trait AccountLedger: Send {
    fn balance_of(&self) -> u64;

    /// Returns the new balance
    fn credit(&mut self, amount: u64, description: &str) -> GameResult<u64>;

    /// Returns the new balance, or `InsufficientBalance` without mutation
    fn debit(&mut self, amount: u64, description: &str) -> GameResult<u64>;
}

/// Address-level ledger. Accounts are created on first reference.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn balance_of(&self, address: &str) -> GameResult<u64>;

    async fn credit(&self, address: &str, amount: u64, description: &str) -> GameResult<u64>;

    async fn debit(&self, address: &str, amount: u64, description: &str) -> GameResult<u64>;

    /// Debit `from` then credit `to`. A failed debit leaves both untouched.
    /// Returns `(from_balance, to_balance)`.
    async fn transfer(&self, from: &str, to: &str, amount: u64) -> GameResult<(u64, u64)>;
}
