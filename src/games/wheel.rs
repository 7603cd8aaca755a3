//! European wheel layout and payout rules
//!
//! Everything here is pure: no state, no side effects. Settlement calls
//! [`is_winner`] and [`payout_for`] for each pending bet.

use crate::errors::{GameError, GameResult};
use crate::games::types::{Bet, BetRequest, BetType, BetValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Number of pockets on a single-zero wheel
pub const SLOT_COUNT: u8 = 37;

/// Highest pocket number
pub const MAX_SLOT: u8 = 36;

/// Standard red pockets; every other non-zero pocket is black
pub const RED_NUMBERS: [u8; 18] = [1, 3, 5, 7, 9, 12, 14, 16, 18, 19, 21, 23, 25, 27, 30, 32, 34, 36];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Red,
    Black,
    Green,
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::Red => write!(f, "red"),
            Color::Black => write!(f, "black"),
            Color::Green => write!(f, "green"),
        }
    }
}

/// Fixed color of a pocket
pub fn color_of(slot: u8) -> Color {
    if slot == 0 {
        Color::Green
    } else if RED_NUMBERS.contains(&slot) {
        Color::Red
    } else {
        Color::Black
    }
}

/// Table multiplier (net winnings per unit staked)
pub fn standard_multiplier(bet_type: BetType) -> u32 {
    match bet_type {
        BetType::Number => 35,
        BetType::Dozen | BetType::Column => 2,
        BetType::Color | BetType::OddsEvens | BetType::HighLow => 1,
    }
}

/// Whether `bet` wins against `slot`. Zero loses everything except a
/// straight bet on zero; values that do not fit the bet type always lose.
pub fn is_winner(bet: &Bet, slot: u8) -> bool {
    if slot > MAX_SLOT {
        return false;
    }

    if bet.bet_type == BetType::Number {
        return bet.value.as_number() == Some(slot);
    }

    if slot == 0 {
        return false;
    }

    match bet.bet_type {
        BetType::Color => match bet.value.as_label() {
            Some("red") => color_of(slot) == Color::Red,
            Some("black") => color_of(slot) == Color::Black,
            _ => false,
        },
        BetType::OddsEvens => match bet.value.as_label() {
            Some("odd") => slot % 2 == 1,
            Some("even") => slot % 2 == 0,
            _ => false,
        },
        BetType::Dozen => bet.value.as_number() == Some(slot.div_ceil(12)),
        BetType::Column => bet.value.as_number() == Some((slot - 1) % 3 + 1),
        BetType::HighLow => match bet.value.as_label() {
            Some("low") => slot <= 18,
            Some("high") => slot >= 19,
            _ => false,
        },
        BetType::Number => false,
    }
}

/// Amount returned on a win: stake plus net winnings at the multiplier
pub fn payout_for(bet: &Bet) -> u64 {
    bet.amount
        .saturating_mul(u64::from(bet.payout_multiplier).saturating_add(1))
}

/// Validate a request and turn it into a pending bet.
///
/// Labels are lower-cased and numeric strings are parsed so that `"Red"` and
/// `"red"`, or `"5"` and `5`, merge into the same position.
pub fn validate_bet(request: BetRequest, now: DateTime<Utc>) -> GameResult<Bet> {
    if request.amount == 0 {
        return Err(GameError::validation("bet amount must be positive"));
    }

    let value = normalize_value(request.bet_type, request.value)?;

    let payout_multiplier = match request.payout_multiplier {
        Some(0) => {
            return Err(GameError::validation("payout multiplier must be at least 1"));
        }
        Some(multiplier) => multiplier,
        None => standard_multiplier(request.bet_type),
    };

    Ok(Bet {
        id: Uuid::new_v4().to_string(),
        bet_type: request.bet_type,
        value,
        amount: request.amount,
        payout_multiplier,
        placed_at: now,
    })
}

fn normalize_value(bet_type: BetType, value: BetValue) -> GameResult<BetValue> {
    match bet_type {
        BetType::Number => {
            let n = numeric(&value, bet_type)?;
            if n > MAX_SLOT {
                return Err(GameError::validation(format!("number must be 0-{}, got {}", MAX_SLOT, n)));
            }
            Ok(BetValue::Number(n))
        }
        BetType::Dozen | BetType::Column => {
            let n = numeric(&value, bet_type)?;
            if !(1..=3).contains(&n) {
                return Err(GameError::validation(format!("{} must be 1-3, got {}", bet_type, n)));
            }
            Ok(BetValue::Number(n))
        }
        BetType::Color => labelled(value, bet_type, &["red", "black"]),
        BetType::OddsEvens => labelled(value, bet_type, &["odd", "even"]),
        BetType::HighLow => labelled(value, bet_type, &["high", "low"]),
    }
}

fn numeric(value: &BetValue, bet_type: BetType) -> GameResult<u8> {
    match value {
        BetValue::Number(n) => Ok(*n),
        BetValue::Label(label) => label.trim().parse::<u8>().map_err(|_| {
            GameError::validation(format!("{} bet needs a numeric value, got '{}'", bet_type, label))
        }),
    }
}

fn labelled(value: BetValue, bet_type: BetType, allowed: &[&str]) -> GameResult<BetValue> {
    let label = match value {
        BetValue::Label(label) => label.trim().to_ascii_lowercase(),
        BetValue::Number(n) => {
            return Err(GameError::validation(format!(
                "{} bet needs one of {:?}, got {}",
                bet_type, allowed, n
            )));
        }
    };

    if allowed.contains(&label.as_str()) {
        Ok(BetValue::Label(label))
    } else {
        Err(GameError::validation(format!(
            "{} bet needs one of {:?}, got '{}'",
            bet_type, allowed, label
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bet(bet_type: BetType, value: BetValue, amount: u64) -> Bet {
        validate_bet(BetRequest::new(bet_type, value, amount), Utc::now()).expect("valid bet")
    }

    fn label(s: &str) -> BetValue {
        BetValue::Label(s.to_string())
    }

    #[test]
    fn test_wheel_has_eighteen_of_each_color() {
        let reds = (1..=MAX_SLOT).filter(|s| color_of(*s) == Color::Red).count();
        let blacks = (1..=MAX_SLOT).filter(|s| color_of(*s) == Color::Black).count();

        assert_eq!(reds, 18);
        assert_eq!(blacks, 18);
        assert_eq!(color_of(0), Color::Green);
    }

    #[test]
    fn test_straight_bet() {
        let on_17 = bet(BetType::Number, BetValue::Number(17), 10);
        assert!(is_winner(&on_17, 17));
        assert!(!is_winner(&on_17, 18));

        let on_zero = bet(BetType::Number, BetValue::Number(0), 10);
        assert!(is_winner(&on_zero, 0));
    }

    #[test]
    fn test_zero_loses_outside_bets() {
        let outside = [
            bet(BetType::Color, label("red"), 10),
            bet(BetType::Color, label("black"), 10),
            bet(BetType::OddsEvens, label("even"), 10),
            bet(BetType::OddsEvens, label("odd"), 10),
            bet(BetType::Dozen, BetValue::Number(1), 10),
            bet(BetType::Column, BetValue::Number(3), 10),
            bet(BetType::HighLow, label("low"), 10),
        ];

        for b in &outside {
            assert!(!is_winner(b, 0), "{} {} should lose on zero", b.bet_type, b.value);
        }
    }

    #[test]
    fn test_color_and_parity() {
        let red = bet(BetType::Color, label("red"), 10);
        assert!(is_winner(&red, 1));
        assert!(!is_winner(&red, 2));

        let even = bet(BetType::OddsEvens, label("even"), 10);
        assert!(is_winner(&even, 36));
        assert!(!is_winner(&even, 35));
    }

    #[test]
    fn test_dozens_and_columns() {
        let first = bet(BetType::Dozen, BetValue::Number(1), 10);
        let second = bet(BetType::Dozen, BetValue::Number(2), 10);
        let third = bet(BetType::Dozen, BetValue::Number(3), 10);
        assert!(is_winner(&first, 12));
        assert!(is_winner(&second, 13));
        assert!(is_winner(&second, 24));
        assert!(is_winner(&third, 25));
        assert!(!is_winner(&first, 13));

        let col1 = bet(BetType::Column, BetValue::Number(1), 10);
        let col2 = bet(BetType::Column, BetValue::Number(2), 10);
        let col3 = bet(BetType::Column, BetValue::Number(3), 10);
        assert!(is_winner(&col1, 34));
        assert!(is_winner(&col2, 35));
        assert!(is_winner(&col3, 36));
        assert!(!is_winner(&col1, 36));
    }

    #[test]
    fn test_high_low() {
        let low = bet(BetType::HighLow, label("low"), 10);
        let high = bet(BetType::HighLow, label("high"), 10);
        assert!(is_winner(&low, 18));
        assert!(!is_winner(&low, 19));
        assert!(is_winner(&high, 19));
    }

    #[test]
    fn test_payout_includes_stake() {
        let straight = bet(BetType::Number, BetValue::Number(17), 100);
        assert_eq!(straight.payout_multiplier, 35);
        assert_eq!(payout_for(&straight), 3600);

        let red = bet(BetType::Color, label("red"), 50);
        assert_eq!(payout_for(&red), 100);
    }

    #[test]
    fn test_mismatched_value_loses_instead_of_failing() {
        let odd_bet = Bet {
            id: "x".to_string(),
            bet_type: BetType::Color,
            value: BetValue::Label("purple".to_string()),
            amount: 10,
            payout_multiplier: 1,
            placed_at: Utc::now(),
        };
        for slot in 0..SLOT_COUNT {
            assert!(!is_winner(&odd_bet, slot));
        }
    }

    #[test]
    fn test_validation_rejects_malformed_bets() {
        let now = Utc::now();
        assert!(validate_bet(BetRequest::number(37, 10), now).is_err());
        assert!(validate_bet(BetRequest::number(5, 0), now).is_err());
        assert!(validate_bet(BetRequest::color("green", 10), now).is_err());
        assert!(validate_bet(BetRequest::new(BetType::Dozen, BetValue::Number(4), 10), now).is_err());
        assert!(validate_bet(BetRequest::number(5, 10).with_multiplier(0), now).is_err());
    }

    #[test]
    fn test_validation_normalizes_values() {
        let now = Utc::now();
        let red = validate_bet(BetRequest::color(" Red ", 10), now).unwrap();
        assert_eq!(red.value, label("red"));

        let five = validate_bet(BetRequest::new(BetType::Number, label("5"), 10), now).unwrap();
        assert_eq!(five.value, BetValue::Number(5));
    }
}
