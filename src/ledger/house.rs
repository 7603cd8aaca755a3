//! House counterparty ledger
//!
//! The house balance is allowed to go negative ("house credit"): payouts are
//! never blocked by the bankroll. Whether a bankroll/risk limit should exist
//! is a product decision; until then large wins simply push the balance
//! below zero.

use crate::ledger::ring::RingLog;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HouseTransactionKind {
    Collection,
    Payout,
    Maintenance,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HouseTransaction {
    pub id: String,
    pub kind: HouseTransactionKind,
    pub amount: u64,
    /// Signed effect on the house balance
    pub delta: i64,
    pub balance_after: i64,
    pub timestamp: DateTime<Utc>,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HouseAccount {
    pub balance: i64,
    pub total_collected: u64,
    pub total_paid_out: u64,
    pub transactions: RingLog<HouseTransaction>,
    pub updated_at: DateTime<Utc>,
}

/// Read-only view returned to callers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HouseSummary {
    pub balance: i64,
    pub total_collected: u64,
    pub total_paid_out: u64,
    pub profit: i64,
    pub transaction_count: usize,
}

impl HouseAccount {
    pub fn new(starting_balance: u64, log_capacity: usize) -> Self {
        let mut house = Self {
            balance: 0,
            total_collected: 0,
            total_paid_out: 0,
            transactions: RingLog::with_capacity(log_capacity),
            updated_at: Utc::now(),
        };
        if starting_balance > 0 {
            house.add_funds(starting_balance, "Initial bankroll");
        }
        house
    }

    /// Stake kept by the house on a losing (or partly losing) round
    pub fn collect(&mut self, amount: u64, description: &str) {
        if amount == 0 {
            return;
        }
        self.total_collected = self.total_collected.saturating_add(amount);
        self.record(HouseTransactionKind::Collection, amount, to_delta(amount), description);
    }

    /// Net winnings paid beyond the stakes the house already held
    pub fn pay_out(&mut self, amount: u64, description: &str) {
        if amount == 0 {
            return;
        }
        self.total_paid_out = self.total_paid_out.saturating_add(amount);
        self.record(HouseTransactionKind::Payout, amount, -to_delta(amount), description);
    }

    pub fn add_funds(&mut self, amount: u64, description: &str) {
        if amount == 0 {
            return;
        }
        self.record(HouseTransactionKind::Maintenance, amount, to_delta(amount), description);
    }

    /// Unconditional; the balance may go negative
    pub fn deduct_funds(&mut self, amount: u64, description: &str) {
        if amount == 0 {
            return;
        }
        self.record(HouseTransactionKind::Maintenance, amount, -to_delta(amount), description);
    }

    pub fn profit(&self) -> i64 {
        self.total_collected as i64 - self.total_paid_out as i64
    }

    pub fn summary(&self) -> HouseSummary {
        HouseSummary {
            balance: self.balance,
            total_collected: self.total_collected,
            total_paid_out: self.total_paid_out,
            profit: self.profit(),
            transaction_count: self.transactions.len(),
        }
    }

    fn record(&mut self, kind: HouseTransactionKind, amount: u64, delta: i64, description: &str) {
        self.balance = self.balance.saturating_add(delta);
        let now = Utc::now();
        self.transactions.push(HouseTransaction {
            id: Uuid::new_v4().to_string(),
            kind,
            amount,
            delta,
            balance_after: self.balance,
            timestamp: now,
            description: description.to_string(),
        });
        self.updated_at = now;
    }
}

fn to_delta(amount: u64) -> i64 {
    i64::try_from(amount).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_and_pay_out_track_profit() {
        let mut house = HouseAccount::new(1_000, 1000);
        house.collect(50, "red lost");
        house.pay_out(3_500, "17 hit");

        assert_eq!(house.total_collected, 50);
        assert_eq!(house.total_paid_out, 3_500);
        assert_eq!(house.profit(), -3_450);
        assert_eq!(house.balance, 1_000 + 50 - 3_500);
    }

    #[test]
    fn test_house_balance_may_go_negative() {
        // Policy: payouts are never blocked by the bankroll.
        let mut house = HouseAccount::new(0, 1000);
        house.pay_out(10_000, "big win");
        house.deduct_funds(5, "fee");

        assert_eq!(house.balance, -10_005);
        assert_eq!(house.transactions.last().unwrap().balance_after, -10_005);
    }

    #[test]
    fn test_maintenance_does_not_touch_profit() {
        let mut house = HouseAccount::new(100, 1000);
        house.add_funds(900, "top up");
        house.deduct_funds(500, "withdrawal");

        assert_eq!(house.balance, 500);
        assert_eq!(house.profit(), 0);
        assert!(house
            .transactions
            .iter()
            .all(|t| t.kind == HouseTransactionKind::Maintenance));
    }

    #[test]
    fn test_log_caps_at_capacity() {
        let mut house = HouseAccount::new(0, 1000);
        for _ in 0..1_200 {
            house.collect(1, "tick");
        }

        assert_eq!(house.transactions.len(), 1000);
        assert_eq!(house.total_collected, 1_200);
        assert_eq!(house.summary().transaction_count, 1000);
    }

    #[test]
    fn test_zero_amounts_are_ignored() {
        let mut house = HouseAccount::new(0, 10);
        house.collect(0, "nothing");
        house.pay_out(0, "nothing");
        assert!(house.transactions.is_empty());
    }
}
