use crate::errors::{GameError, GameResult};
use crate::ledger::{ring::RingLog, AccountLedger};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Earn,
    Spend,
    Deposit,
    Withdraw,
}

impl TransactionKind {
    fn is_credit(self) -> bool {
        matches!(self, TransactionKind::Earn | TransactionKind::Deposit)
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionKind::Earn => write!(f, "earn"),
            TransactionKind::Spend => write!(f, "spend"),
            TransactionKind::Deposit => write!(f, "deposit"),
            TransactionKind::Withdraw => write!(f, "withdraw"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerTransaction {
    pub id: String,
    pub kind: TransactionKind,
    pub amount: u64,
    pub timestamp: DateTime<Utc>,
    pub description: String,
}

/// Per-player credit account.
///
/// `balance == total_earned - total_spent` holds after every call; deposits
/// count as earned and withdrawals as spent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerAccount {
    pub address: String,
    pub balance: u64,
    pub total_earned: u64,
    pub total_spent: u64,
    pub transactions: RingLog<LedgerTransaction>,
    /// Highest round number handed out, survives round eviction
    #[serde(default)]
    pub round_counter: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PlayerAccount {
    /// New account funded with the starting grant
    pub fn open(address: &str, starting_grant: u64, log_capacity: usize) -> Self {
        let now = Utc::now();
        let mut account = Self {
            address: address.to_string(),
            balance: 0,
            total_earned: 0,
            total_spent: 0,
            transactions: RingLog::with_capacity(log_capacity),
            round_counter: 0,
            created_at: now,
            updated_at: now,
        };

        if starting_grant > 0 {
            // Cannot fail: the amount is positive and the balance starts at zero
            let _ = account.apply(TransactionKind::Deposit, starting_grant, "Starting balance");
        }
        account
    }

    pub fn deposit(&mut self, amount: u64, description: &str) -> GameResult<u64> {
        self.apply(TransactionKind::Deposit, amount, description)
    }

    pub fn withdraw(&mut self, amount: u64, description: &str) -> GameResult<u64> {
        self.apply(TransactionKind::Withdraw, amount, description)
    }

    pub fn is_consistent(&self) -> bool {
        self.total_earned.checked_sub(self.total_spent) == Some(self.balance)
    }

    /// Newest first
    pub fn recent_transactions(&self, limit: usize) -> Vec<LedgerTransaction> {
        self.transactions.recent(limit)
    }

    pub(crate) fn next_round_number(&mut self) -> u64 {
        self.round_counter += 1;
        self.round_counter
    }

    fn apply(&mut self, kind: TransactionKind, amount: u64, description: &str) -> GameResult<u64> {
        if amount == 0 {
            return Err(GameError::validation("amount must be positive"));
        }

        if kind.is_credit() {
            let balance = self
                .balance
                .checked_add(amount)
                .ok_or_else(|| GameError::validation("balance overflow"))?;
            self.balance = balance;
            self.total_earned += amount;
        } else {
            if self.balance < amount {
                return Err(GameError::InsufficientBalance {
                    required: amount,
                    available: self.balance,
                });
            }
            self.balance -= amount;
            self.total_spent += amount;
        }

        let now = Utc::now();
        self.transactions.push(LedgerTransaction {
            id: Uuid::new_v4().to_string(),
            kind,
            amount,
            timestamp: now,
            description: description.to_string(),
        });
        self.updated_at = now;

        Ok(self.balance)
    }
}

impl AccountLedger for PlayerAccount {
    fn balance_of(&self) -> u64 {
        self.balance
    }

    fn credit(&mut self, amount: u64, description: &str) -> GameResult<u64> {
        self.apply(TransactionKind::Earn, amount, description)
    }

    fn debit(&mut self, amount: u64, description: &str) -> GameResult<u64> {
        self.apply(TransactionKind::Spend, amount, description)
    }
}
