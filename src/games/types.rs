use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of a round. Only `Betting` allows the pending set to change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Waiting,
    Betting,
    Spinning,
    Result,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Waiting => write!(f, "waiting"),
            Phase::Betting => write!(f, "betting"),
            Phase::Spinning => write!(f, "spinning"),
            Phase::Result => write!(f, "result"),
        }
    }
}

/// Supported bet types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BetType {
    Number,
    Color,
    OddsEvens,
    Dozen,
    Column,
    HighLow,
}

impl fmt::Display for BetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BetType::Number => write!(f, "number"),
            BetType::Color => write!(f, "color"),
            BetType::OddsEvens => write!(f, "odds_evens"),
            BetType::Dozen => write!(f, "dozen"),
            BetType::Column => write!(f, "column"),
            BetType::HighLow => write!(f, "high_low"),
        }
    }
}

/// What a bet is placed on: a slot/dozen/column index, or a label such as
/// `red`, `odd` or `high`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum BetValue {
    Number(u8),
    Label(String),
}

impl BetValue {
    pub fn as_number(&self) -> Option<u8> {
        match self {
            BetValue::Number(n) => Some(*n),
            BetValue::Label(_) => None,
        }
    }

    pub fn as_label(&self) -> Option<&str> {
        match self {
            BetValue::Number(_) => None,
            BetValue::Label(label) => Some(label.as_str()),
        }
    }
}

impl fmt::Display for BetValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BetValue::Number(n) => write!(f, "{}", n),
            BetValue::Label(label) => write!(f, "{}", label),
        }
    }
}

/// A validated bet held in a round's pending set
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bet {
    pub id: String,
    pub bet_type: BetType,
    pub value: BetValue,
    pub amount: u64,
    pub payout_multiplier: u32,
    pub placed_at: DateTime<Utc>,
}

impl Bet {
    /// Two bets with the same key in one round are merged
    pub fn same_position(&self, other: &Bet) -> bool {
        self.bet_type == other.bet_type && self.value == other.value
    }
}

/// Incoming bet as submitted by a caller, before validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetRequest {
    pub bet_type: BetType,
    pub value: BetValue,
    pub amount: u64,
    /// Falls back to the standard table multiplier when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payout_multiplier: Option<u32>,
}

impl BetRequest {
    pub fn new(bet_type: BetType, value: BetValue, amount: u64) -> Self {
        Self {
            bet_type,
            value,
            amount,
            payout_multiplier: None,
        }
    }

    pub fn number(slot: u8, amount: u64) -> Self {
        Self::new(BetType::Number, BetValue::Number(slot), amount)
    }

    pub fn color(color: &str, amount: u64) -> Self {
        Self::new(BetType::Color, BetValue::Label(color.to_string()), amount)
    }

    pub fn with_multiplier(mut self, multiplier: u32) -> Self {
        self.payout_multiplier = Some(multiplier);
        self
    }
}

/// Result of a successful bet placement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BetPlaced {
    pub new_balance: u64,
    pub bet_count: usize,
    pub pending_total: u64,
}

/// Result of clearing the pending set
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BetsCleared {
    pub refunded: u64,
    pub new_balance: u64,
}

/// What a settlement did to the round and ledgers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settlement {
    pub winning_slot: u8,
    pub winners: Vec<Bet>,
    pub stake: u64,
    pub payout: u64,
    pub round_number: u64,
}

impl Settlement {
    /// Net effect on the player: positive when the round paid more than it took
    pub fn net(&self) -> i64 {
        self.payout as i64 - self.stake as i64
    }
}

/// Result of a spin as returned to callers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpinResult {
    pub winning_slot: u8,
    pub winners: Vec<Bet>,
    pub stake: u64,
    pub payout: u64,
    pub new_balance: u64,
    pub round_number: u64,
}

/// Emitted once per settled round for presentation layers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundEvent {
    pub address: String,
    pub round_id: String,
    pub round_number: u64,
    pub winning_slot: u8,
    pub stake: u64,
    pub payout: u64,
    pub settled_at: DateTime<Utc>,
}
