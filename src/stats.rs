//! Player and table statistics
//!
//! Per-player stats are updated incrementally from each settlement while the
//! player's account lock is held, so two updates for one address never
//! interleave. Global counters are lock-free atomics.

use crate::games::types::{Bet, BetType, Settlement};
use chrono::{DateTime, TimeZone, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use tracing::{debug, info};

/// Favorite numbers kept per player
pub const MAX_FAVORITE_NUMBERS: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerStats {
    pub address: String,
    pub total_rounds: u64,
    pub total_wins: u64,
    pub total_losses: u64,
    /// Net over all rounds: payouts minus stakes
    pub total_winnings: i64,
    /// Largest gross payout of a single round
    pub biggest_win: u64,
    pub total_wagered: u64,
    pub favorite_numbers: Vec<u8>,
    pub win_rate: f64,
    pub average_bet: f64,
    pub last_played: Option<DateTime<Utc>>,
    /// Insertion order, breaks leaderboard ties
    #[serde(default)]
    pub first_seen: u64,
}

impl PlayerStats {
    pub fn new(address: &str, first_seen: u64) -> Self {
        Self {
            address: address.to_string(),
            total_rounds: 0,
            total_wins: 0,
            total_losses: 0,
            total_winnings: 0,
            biggest_win: 0,
            total_wagered: 0,
            favorite_numbers: Vec::new(),
            win_rate: 0.0,
            average_bet: 0.0,
            last_played: None,
            first_seen,
        }
    }

    /// Fold one settled round in. A round counts as a win when it paid
    /// anything back.
    pub fn record(&mut self, settlement: &Settlement, bets: &[Bet], at: DateTime<Utc>) {
        self.total_rounds += 1;
        if settlement.payout > 0 {
            self.total_wins += 1;
        } else {
            self.total_losses += 1;
        }
        self.total_winnings = self.total_winnings.saturating_add(settlement.net());
        self.biggest_win = self.biggest_win.max(settlement.payout);
        self.total_wagered = self.total_wagered.saturating_add(settlement.stake);

        for bet in bets.iter().filter(|b| b.bet_type == BetType::Number) {
            if self.favorite_numbers.len() >= MAX_FAVORITE_NUMBERS {
                break;
            }
            if let Some(n) = bet.value.as_number() {
                if !self.favorite_numbers.contains(&n) {
                    self.favorite_numbers.push(n);
                }
            }
        }

        self.win_rate = self.total_wins as f64 / self.total_rounds as f64 * 100.0;
        self.average_bet = self.total_wagered as f64 / self.total_rounds as f64;
        self.last_played = Some(at);
    }
}

/// Serializable snapshot of the table-wide counters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalStats {
    pub total_rounds: u64,
    pub total_wagered: u64,
    pub total_paid_out: u64,
    pub total_players: u64,
    pub biggest_payout: u64,
    pub rounds_24h: u64,
    pub wagered_24h: u64,
    pub wins_24h: u64,
    pub window_started_at: DateTime<Utc>,
}

impl Default for GlobalStats {
    fn default() -> Self {
        Self {
            total_rounds: 0,
            total_wagered: 0,
            total_paid_out: 0,
            total_players: 0,
            biggest_payout: 0,
            rounds_24h: 0,
            wagered_24h: 0,
            wins_24h: 0,
            window_started_at: Utc::now(),
        }
    }
}

#[derive(Debug, Default)]
struct GlobalCounters {
    total_rounds: AtomicU64,
    total_wagered: AtomicU64,
    total_paid_out: AtomicU64,
    total_players: AtomicU64,
    biggest_payout: AtomicU64,
    rounds_24h: AtomicU64,
    wagered_24h: AtomicU64,
    wins_24h: AtomicU64,
    window_started_at: AtomicI64,
}

pub struct StatsAggregator {
    players: DashMap<String, PlayerStats>,
    global: GlobalCounters,
    sequence: AtomicU64,
    window_secs: i64,
}

impl StatsAggregator {
    pub fn new(window_secs: u64) -> Self {
        let global = GlobalCounters::default();
        global
            .window_started_at
            .store(Utc::now().timestamp(), Ordering::Relaxed);
        Self {
            players: DashMap::new(),
            global,
            sequence: AtomicU64::new(0),
            window_secs: i64::try_from(window_secs).unwrap_or(i64::MAX),
        }
    }

    /// Record a settled round for `address`
    pub fn record_settlement(&self, address: &str, settlement: &Settlement, bets: &[Bet], at: DateTime<Utc>) {
        self.roll_window(at);

        let mut entry = self.players.entry(address.to_string()).or_insert_with(|| {
            self.global.total_players.fetch_add(1, Ordering::Relaxed);
            PlayerStats::new(address, self.sequence.fetch_add(1, Ordering::Relaxed))
        });
        entry.record(settlement, bets, at);
        drop(entry);

        let g = &self.global;
        g.total_rounds.fetch_add(1, Ordering::Relaxed);
        g.total_wagered.fetch_add(settlement.stake, Ordering::Relaxed);
        g.total_paid_out.fetch_add(settlement.payout, Ordering::Relaxed);
        g.biggest_payout.fetch_max(settlement.payout, Ordering::Relaxed);
        g.rounds_24h.fetch_add(1, Ordering::Relaxed);
        g.wagered_24h.fetch_add(settlement.stake, Ordering::Relaxed);
        if settlement.payout > 0 {
            g.wins_24h.fetch_add(1, Ordering::Relaxed);
        }

        debug!(
            address = %address,
            round = settlement.round_number,
            stake = settlement.stake,
            payout = settlement.payout,
            "stats updated"
        );
    }

    /// Reset the rolling counters once the window has elapsed. Returns
    /// whether a reset happened.
    pub fn roll_window(&self, now: DateTime<Utc>) -> bool {
        let started = self.global.window_started_at.load(Ordering::Relaxed);
        let now_secs = now.timestamp();
        if now_secs - started < self.window_secs {
            return false;
        }
        // Only the caller that wins the swap resets
        if self
            .global
            .window_started_at
            .compare_exchange(started, now_secs, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return false;
        }

        let rounds = self.global.rounds_24h.swap(0, Ordering::Relaxed);
        self.global.wagered_24h.store(0, Ordering::Relaxed);
        self.global.wins_24h.store(0, Ordering::Relaxed);
        info!(rounds_in_window = rounds, "stats window rolled");
        true
    }

    pub fn player(&self, address: &str) -> Option<PlayerStats> {
        self.players.get(address).map(|s| s.value().clone())
    }

    /// Top `limit` players by net winnings; ties keep first-seen order
    pub fn leaderboard(&self, limit: usize) -> Vec<PlayerStats> {
        let mut all: Vec<PlayerStats> = self.players.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|s| s.first_seen);
        all.sort_by(|a, b| b.total_winnings.cmp(&a.total_winnings));
        all.truncate(limit);
        all
    }

    pub fn global(&self) -> GlobalStats {
        let g = &self.global;
        let started = g.window_started_at.load(Ordering::Relaxed);
        GlobalStats {
            total_rounds: g.total_rounds.load(Ordering::Relaxed),
            total_wagered: g.total_wagered.load(Ordering::Relaxed),
            total_paid_out: g.total_paid_out.load(Ordering::Relaxed),
            total_players: g.total_players.load(Ordering::Relaxed),
            biggest_payout: g.biggest_payout.load(Ordering::Relaxed),
            rounds_24h: g.rounds_24h.load(Ordering::Relaxed),
            wagered_24h: g.wagered_24h.load(Ordering::Relaxed),
            wins_24h: g.wins_24h.load(Ordering::Relaxed),
            window_started_at: Utc.timestamp_opt(started, 0).single().unwrap_or_else(Utc::now),
        }
    }

    pub fn players(&self) -> Vec<PlayerStats> {
        self.players.iter().map(|e| e.value().clone()).collect()
    }

    pub fn remove(&self, address: &str) -> bool {
        self.players.remove(address).is_some()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Replace everything with persisted state
    pub fn restore(&self, players: Vec<PlayerStats>, global: GlobalStats) {
        self.players.clear();
        let mut next = 0;
        for stats in players {
            next = next.max(stats.first_seen + 1);
            self.players.insert(stats.address.clone(), stats);
        }
        self.sequence.store(next, Ordering::Relaxed);

        let g = &self.global;
        g.total_rounds.store(global.total_rounds, Ordering::Relaxed);
        g.total_wagered.store(global.total_wagered, Ordering::Relaxed);
        g.total_paid_out.store(global.total_paid_out, Ordering::Relaxed);
        g.total_players.store(global.total_players, Ordering::Relaxed);
        g.biggest_payout.store(global.biggest_payout, Ordering::Relaxed);
        g.rounds_24h.store(global.rounds_24h, Ordering::Relaxed);
        g.wagered_24h.store(global.wagered_24h, Ordering::Relaxed);
        g.wins_24h.store(global.wins_24h, Ordering::Relaxed);
        g.window_started_at
            .store(global.window_started_at.timestamp(), Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::types::{BetRequest, BetType, BetValue};
    use crate::games::wheel::validate_bet;

    fn settlement(stake: u64, payout: u64) -> Settlement {
        Settlement {
            winning_slot: 0,
            winners: Vec::new(),
            stake,
            payout,
            round_number: 1,
        }
    }

    fn number_bets(numbers: &[u8]) -> Vec<Bet> {
        numbers
            .iter()
            .map(|n| validate_bet(BetRequest::number(*n, 1), Utc::now()).unwrap())
            .collect()
    }

    #[test]
    fn test_player_stats_accumulate() {
        let stats = StatsAggregator::new(86_400);
        let now = Utc::now();

        stats.record_settlement("alice", &settlement(100, 3600), &number_bets(&[17]), now);
        stats.record_settlement("alice", &settlement(50, 0), &[], now);

        let alice = stats.player("alice").unwrap();
        assert_eq!(alice.total_rounds, 2);
        assert_eq!(alice.total_wins, 1);
        assert_eq!(alice.total_losses, 1);
        assert_eq!(alice.total_winnings, 3500 - 50);
        assert_eq!(alice.biggest_win, 3600);
        assert_eq!(alice.win_rate, 50.0);
        assert_eq!(alice.average_bet, 75.0);
        assert_eq!(alice.favorite_numbers, vec![17]);
        assert_eq!(alice.last_played, Some(now));
    }

    #[test]
    fn test_favorites_first_ten_without_duplicates() {
        let stats = StatsAggregator::new(86_400);
        let now = Utc::now();

        stats.record_settlement("alice", &settlement(1, 0), &number_bets(&[5, 5, 7]), now);
        stats.record_settlement("alice", &settlement(1, 0), &number_bets(&(10..30).collect::<Vec<_>>()), now);

        let favorites = stats.player("alice").unwrap().favorite_numbers;
        assert_eq!(favorites.len(), MAX_FAVORITE_NUMBERS);
        assert_eq!(&favorites[..3], &[5, 7, 10]);
        assert_eq!(*favorites.last().unwrap(), 17);
    }

    #[test]
    fn test_non_number_bets_are_not_favorites() {
        let stats = StatsAggregator::new(86_400);
        let dozen = validate_bet(BetRequest::new(BetType::Dozen, BetValue::Number(2), 5), Utc::now()).unwrap();

        stats.record_settlement("alice", &settlement(5, 0), &[dozen], Utc::now());

        assert!(stats.player("alice").unwrap().favorite_numbers.is_empty());
    }

    #[test]
    fn test_leaderboard_is_stable_descending() {
        let stats = StatsAggregator::new(86_400);
        let now = Utc::now();

        stats.record_settlement("first", &settlement(10, 20), &[], now);
        stats.record_settlement("second", &settlement(10, 0), &[], now);
        stats.record_settlement("third", &settlement(10, 20), &[], now);
        stats.record_settlement("fourth", &settlement(10, 360), &[], now);

        let board: Vec<String> = stats.leaderboard(10).into_iter().map(|s| s.address).collect();
        assert_eq!(board, vec!["fourth", "first", "third", "second"]);
        assert_eq!(stats.leaderboard(2).len(), 2);
    }

    #[test]
    fn test_global_counters_and_window() {
        let stats = StatsAggregator::new(60);
        let now = Utc::now();

        stats.record_settlement("alice", &settlement(100, 0), &[], now);
        stats.record_settlement("bob", &settlement(20, 40), &[], now);

        let global = stats.global();
        assert_eq!(global.total_rounds, 2);
        assert_eq!(global.total_wagered, 120);
        assert_eq!(global.total_paid_out, 40);
        assert_eq!(global.total_players, 2);
        assert_eq!(global.biggest_payout, 40);
        assert_eq!(global.wins_24h, 1);

        assert!(!stats.roll_window(now));
        assert!(stats.roll_window(now + chrono::Duration::seconds(61)));

        let rolled = stats.global();
        assert_eq!(rolled.rounds_24h, 0);
        assert_eq!(rolled.wagered_24h, 0);
        assert_eq!(rolled.total_rounds, 2);
    }

    #[test]
    fn test_restore_continues_sequence() {
        let stats = StatsAggregator::new(86_400);
        stats.record_settlement("alice", &settlement(10, 0), &[], Utc::now());
        let players = stats.players();
        let global = stats.global();

        let restored = StatsAggregator::new(86_400);
        restored.restore(players, global.clone());
        restored.record_settlement("bob", &settlement(10, 0), &[], Utc::now());

        assert_eq!(restored.player("bob").unwrap().first_seen, 1);
        assert_eq!(restored.global().total_rounds, global.total_rounds + 1);
    }
}
