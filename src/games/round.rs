//! Per-account round state machine
//!
//! `betting -> spinning -> result -> betting`. Every transition that moves
//! credits goes through an [`AccountLedger`] first and only then mutates the
//! round, so a refused debit or credit leaves the round exactly as it was.

use crate::errors::{GameError, GameResult};
use crate::games::types::{Bet, BetPlaced, BetsCleared, Phase, Settlement};
use crate::games::wheel::{is_winner, payout_for, MAX_SLOT};
use crate::ledger::{AccountLedger, HouseAccount};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-table bet limits applied when a bet joins the pending set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableLimits {
    pub min_bet: u64,
    pub max_bet: u64,
    pub max_positions: usize,
}

impl Default for TableLimits {
    fn default() -> Self {
        Self {
            min_bet: 1,
            max_bet: 100_000,
            max_positions: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Round {
    pub id: String,
    pub address: String,
    pub phase: Phase,
    pub pending_bets: Vec<Bet>,
    pub pending_total: u64,
    pub winning_slot: Option<u8>,
    /// Winning bets of the last settlement
    pub settled_bets: Vec<Bet>,
    pub last_payout: u64,
    pub round_number: u64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub last_activity: DateTime<Utc>,
}

impl Round {
    /// Fresh round, open for bets
    pub fn new(address: &str, round_number: u64, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            address: address.to_string(),
            phase: Phase::Betting,
            pending_bets: Vec::new(),
            pending_total: 0,
            winning_slot: None,
            settled_bets: Vec::new(),
            last_payout: 0,
            round_number,
            started_at: now,
            ended_at: None,
            last_activity: now,
        }
    }

    /// Escrow the stake, then add the bet to the pending set. A bet on a
    /// position already held is merged into it.
    pub fn place_bet(
        &mut self,
        bet: Bet,
        limits: &TableLimits,
        ledger: &mut dyn AccountLedger,
        now: DateTime<Utc>,
    ) -> GameResult<BetPlaced> {
        self.expect_phase(Phase::Betting)?;

        let existing = self.pending_bets.iter().position(|b| b.same_position(&bet));
        let position_total = existing
            .map(|i| self.pending_bets[i].amount)
            .unwrap_or(0)
            .saturating_add(bet.amount);

        if bet.amount < limits.min_bet {
            return Err(GameError::validation(format!(
                "minimum bet is {}, got {}",
                limits.min_bet, bet.amount
            )));
        }
        if position_total > limits.max_bet {
            return Err(GameError::validation(format!(
                "maximum bet per position is {}, would be {}",
                limits.max_bet, position_total
            )));
        }
        if existing.is_none() && self.pending_bets.len() >= limits.max_positions {
            return Err(GameError::validation(format!(
                "at most {} positions per round",
                limits.max_positions
            )));
        }

        let description = format!("Bet {} {} (round {})", bet.bet_type, bet.value, self.round_number);
        let new_balance = ledger.debit(bet.amount, &description)?;

        match existing {
            Some(i) => self.pending_bets[i].amount = position_total,
            None => self.pending_bets.push(bet),
        }
        self.pending_total = self.pending_bets.iter().map(|b| b.amount).sum();
        self.last_activity = now;

        Ok(BetPlaced {
            new_balance,
            bet_count: self.pending_bets.len(),
            pending_total: self.pending_total,
        })
    }

    /// Refund the whole pending set
    pub fn clear_bets(&mut self, ledger: &mut dyn AccountLedger, now: DateTime<Utc>) -> GameResult<BetsCleared> {
        self.expect_phase(Phase::Betting)?;

        let refunded = self.refund_pending(ledger, "Bets cleared")?;
        self.last_activity = now;

        Ok(BetsCleared {
            refunded,
            new_balance: ledger.balance_of(),
        })
    }

    pub fn start_spin(&mut self, now: DateTime<Utc>) -> GameResult<()> {
        self.expect_phase(Phase::Betting)?;
        if self.pending_bets.is_empty() {
            return Err(GameError::NoBets);
        }

        self.phase = Phase::Spinning;
        self.last_activity = now;
        Ok(())
    }

    /// Resolve the spin against `slot`.
    ///
    /// The player is credited the gross payout. The house absorbs the
    /// difference between stake and payout: a collection when the player
    /// lost money on the round, a payout when they won more than they staked.
    pub fn settle(
        &mut self,
        slot: u8,
        ledger: &mut dyn AccountLedger,
        house: &mut HouseAccount,
        now: DateTime<Utc>,
    ) -> GameResult<Settlement> {
        self.expect_phase(Phase::Spinning)?;
        if slot > MAX_SLOT {
            return Err(GameError::validation(format!("winning slot {} is off the wheel", slot)));
        }

        let winners: Vec<Bet> = self
            .pending_bets
            .iter()
            .filter(|bet| is_winner(bet, slot))
            .cloned()
            .collect();
        let payout = winners
            .iter()
            .fold(0u64, |total, bet| total.saturating_add(payout_for(bet)));
        let stake = self.pending_total;

        if payout > 0 {
            ledger.credit(payout, &format!("Round {} won on {}", self.round_number, slot))?;
        }

        let memo = format!("{} round {} slot {}", self.address, self.round_number, slot);
        if payout > stake {
            house.pay_out(payout - stake, &memo);
        } else if payout < stake {
            house.collect(stake - payout, &memo);
        }

        self.phase = Phase::Result;
        self.winning_slot = Some(slot);
        self.settled_bets = winners.clone();
        self.last_payout = payout;
        self.ended_at = Some(now);
        self.last_activity = now;

        Ok(Settlement {
            winning_slot: slot,
            winners,
            stake,
            payout,
            round_number: self.round_number,
        })
    }

    /// Reset for the next round. Bets still pending in `betting` are refunded
    /// first; a round mid-spin cannot be restarted. Returns the refund.
    pub fn start_new(&mut self, ledger: &mut dyn AccountLedger, now: DateTime<Utc>) -> GameResult<u64> {
        if self.phase == Phase::Spinning {
            return Err(GameError::InvalidPhase {
                expected: Phase::Result,
                actual: self.phase,
            });
        }

        let refunded = if self.phase == Phase::Betting {
            self.refund_pending(ledger, "Round restarted")?
        } else {
            0
        };

        self.id = Uuid::new_v4().to_string();
        self.phase = Phase::Betting;
        self.pending_bets.clear();
        self.pending_total = 0;
        self.winning_slot = None;
        self.settled_bets.clear();
        self.last_payout = 0;
        self.round_number += 1;
        self.started_at = now;
        self.ended_at = None;
        self.last_activity = now;

        Ok(refunded)
    }

    /// Settled and untouched for longer than `idle_secs`
    pub fn is_stale(&self, now: DateTime<Utc>, idle_secs: u64) -> bool {
        self.phase == Phase::Result && (now - self.last_activity).num_seconds() > idle_secs as i64
    }

    fn refund_pending(&mut self, ledger: &mut dyn AccountLedger, reason: &str) -> GameResult<u64> {
        let refunded = self.pending_total;
        if refunded > 0 {
            ledger.credit(refunded, &format!("{} (round {})", reason, self.round_number))?;
        }
        self.pending_bets.clear();
        self.pending_total = 0;
        Ok(refunded)
    }

    fn expect_phase(&self, expected: Phase) -> GameResult<()> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(GameError::InvalidPhase {
                expected,
                actual: self.phase,
            })
        }
    }
}
