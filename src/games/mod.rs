pub mod outcome;
pub mod round;
pub mod settlement;
pub mod types;
pub mod wheel;

pub use outcome::{OsRngOutcome, OutcomeGenerator, ScriptedOutcome};
pub use round::{Round, TableLimits};
pub use settlement::{ChainSettlement, LoggingSettlement, SettlementError, SettlementIntent};
pub use types::*;
pub use wheel::{color_of, is_winner, payout_for, validate_bet, Color};
