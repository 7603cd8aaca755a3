//! The casino service object
//!
//! [`CasinoService`] owns every map: accounts and rounds (one lock per
//! address), the house ledger, stats, the store handle and the background
//! workers. It is built once through [`ServiceBuilder`] and shared behind an
//! `Arc`.
//!
//! Lock order is always account, then house. Stats and events are updated
//! while the account lock is still held so one address sees a consistent
//! sequence.

use crate::config::{StorageBackend, WheelhouseConfig};
use crate::errors::{GameError, GameResult, StorageError, WheelhouseResult};
use crate::games::outcome::{OsRngOutcome, OutcomeGenerator};
use crate::games::round::{Round, TableLimits};
use crate::games::settlement::{
    spawn_settlement_worker, ChainSettlement, LoggingSettlement, SettlementCounters, SettlementIntent,
};
use crate::games::types::{BetPlaced, BetRequest, BetsCleared, RoundEvent, SpinResult};
use crate::games::wheel::validate_bet;
use crate::ledger::book::SlotHandle;
use crate::ledger::{
    AccountBook, AccountSlot, HouseAccount, HouseSummary, HouseTransaction, Ledger, LedgerTransaction,
};
use crate::stats::{GlobalStats, PlayerStats, StatsAggregator};
use crate::storage::{write_backup, BackupReceipt, LedgerSnapshot, LedgerStore, MemoryStore, RocksStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 256;
const MAX_LEADERBOARD: usize = 100;

#[derive(Debug, Default)]
struct ServiceCounters {
    rounds_settled: AtomicU64,
    flushes: AtomicU64,
    flush_failures: AtomicU64,
    rounds_evicted: AtomicU64,
}

/// Health view for operators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub running: bool,
    pub store: String,
    pub accounts: usize,
    pub rounds_settled: u64,
    pub flushes: u64,
    pub flush_failures: u64,
    pub rounds_evicted: u64,
    pub settlements_submitted: u64,
    pub settlements_failed: u64,
}

/// What one lifecycle sweep did
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SweepReport {
    pub evicted: usize,
    pub busy: usize,
    pub window_rolled: bool,
}

pub struct CasinoService {
    config: WheelhouseConfig,
    limits: TableLimits,
    accounts: AccountBook,
    house: Mutex<HouseAccount>,
    stats: StatsAggregator,
    outcome: Arc<dyn OutcomeGenerator>,
    store: Arc<dyn LedgerStore>,
    chain: Arc<dyn ChainSettlement>,
    intents: mpsc::UnboundedSender<SettlementIntent>,
    intent_queue: std::sync::Mutex<Option<mpsc::UnboundedReceiver<SettlementIntent>>>,
    settlement_counters: Arc<SettlementCounters>,
    events: broadcast::Sender<RoundEvent>,
    counters: ServiceCounters,
    dirty: AtomicBool,
    running: AtomicBool,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl CasinoService {
    pub fn config(&self) -> &WheelhouseConfig {
        &self.config
    }

    // ---- rounds ----

    /// Open a round for `address`, or return the one it already has
    pub async fn open_round(&self, address: &str) -> GameResult<Round> {
        let mut slot = self.accounts.lock(address).await?;
        if let Some(round) = &slot.round {
            return Ok(round.clone());
        }

        let number = slot.account.next_round_number();
        let round = Round::new(address, number, Utc::now());
        slot.round = Some(round.clone());
        self.mark_dirty();

        debug!(address = %address, round = number, "round opened");
        Ok(round)
    }

    /// Current round; never creates an account
    pub async fn get_round(&self, address: &str) -> GameResult<Round> {
        AccountBook::validate_address(address)?;
        let slot = self
            .accounts
            .lock_existing(address)
            .await
            .ok_or_else(|| no_round(address))?;
        slot.round.clone().ok_or_else(|| no_round(address))
    }

    pub async fn place_bet(&self, address: &str, request: BetRequest) -> GameResult<BetPlaced> {
        let now = Utc::now();
        let bet = validate_bet(request, now)?;

        let mut guard = self.accounts.lock(address).await?;
        let slot = &mut *guard;
        let round = slot.round.as_mut().ok_or_else(|| no_round(address))?;
        let placed = round.place_bet(bet, &self.limits, &mut slot.account, now)?;
        self.mark_dirty();

        debug!(
            address = %address,
            bets = placed.bet_count,
            pending = placed.pending_total,
            balance = placed.new_balance,
            "bet placed"
        );
        Ok(placed)
    }

    pub async fn clear_bets(&self, address: &str) -> GameResult<BetsCleared> {
        let mut guard = self.accounts.lock(address).await?;
        let slot = &mut *guard;
        let round = slot.round.as_mut().ok_or_else(|| no_round(address))?;
        let cleared = round.clear_bets(&mut slot.account, Utc::now())?;
        self.mark_dirty();

        debug!(address = %address, refunded = cleared.refunded, "bets cleared");
        Ok(cleared)
    }

    /// Close betting; the round waits in `spinning` for [`settle`](Self::settle)
    pub async fn start_spin(&self, address: &str) -> GameResult<Round> {
        let mut guard = self.accounts.lock(address).await?;
        let round = guard.round.as_mut().ok_or_else(|| no_round(address))?;
        round.start_spin(Utc::now())?;
        let round = round.clone();
        self.mark_dirty();
        Ok(round)
    }

    /// Settle a spinning round against an externally chosen slot
    pub async fn settle(&self, address: &str, winning_slot: u8) -> GameResult<SpinResult> {
        let mut guard = self.accounts.lock(address).await?;
        self.settle_locked(&mut guard, address, winning_slot).await
    }

    /// Close betting, draw a slot and settle, all under one lock
    pub async fn spin(&self, address: &str) -> GameResult<SpinResult> {
        let mut guard = self.accounts.lock(address).await?;
        guard
            .round
            .as_mut()
            .ok_or_else(|| no_round(address))?
            .start_spin(Utc::now())?;

        let winning_slot = self.outcome.next_slot();
        self.settle_locked(&mut guard, address, winning_slot).await
    }

    /// Start the next round; opens one if the account has none
    pub async fn new_round(&self, address: &str) -> GameResult<Round> {
        let mut guard = self.accounts.lock(address).await?;
        let slot = &mut *guard;
        let now = Utc::now();

        let round = match slot.round.as_mut() {
            Some(round) => {
                let refunded = round.start_new(&mut slot.account, now)?;
                if refunded > 0 {
                    debug!(address = %address, refunded, "pending bets refunded on new round");
                }
                slot.account.round_counter = slot.account.round_counter.max(round.round_number);
                round.clone()
            }
            None => {
                let round = Round::new(address, slot.account.next_round_number(), now);
                slot.round = Some(round.clone());
                round
            }
        };
        self.mark_dirty();

        debug!(address = %address, round = round.round_number, "new round");
        Ok(round)
    }

    async fn settle_locked(&self, slot: &mut AccountSlot, address: &str, winning_slot: u8) -> GameResult<SpinResult> {
        let now = Utc::now();
        let round = slot.round.as_mut().ok_or_else(|| no_round(address))?;

        let settlement = {
            let mut house = self.house.lock().await;
            round.settle(winning_slot, &mut slot.account, &mut house, now)?
        };

        self.stats
            .record_settlement(address, &settlement, &round.pending_bets, now);
        self.counters.rounds_settled.fetch_add(1, Ordering::Relaxed);
        self.mark_dirty();

        let net = settlement.net();
        let reference = format!("round:{}:{}", address, settlement.round_number);
        if net > 0 {
            self.enqueue(SettlementIntent::credit(address, net.unsigned_abs(), reference));
        } else if net < 0 {
            self.enqueue(SettlementIntent::debit(address, net.unsigned_abs(), reference));
        }

        // No subscribers is fine
        let _ = self.events.send(RoundEvent {
            address: address.to_string(),
            round_id: round.id.clone(),
            round_number: settlement.round_number,
            winning_slot,
            stake: settlement.stake,
            payout: settlement.payout,
            settled_at: now,
        });

        info!(
            address = %address,
            round = settlement.round_number,
            slot = winning_slot,
            stake = settlement.stake,
            payout = settlement.payout,
            "round settled"
        );

        Ok(SpinResult {
            winning_slot,
            winners: settlement.winners,
            stake: settlement.stake,
            payout: settlement.payout,
            new_balance: slot.account.balance,
            round_number: settlement.round_number,
        })
    }

    // ---- ledger ----

    pub async fn balance(&self, address: &str) -> GameResult<u64> {
        self.accounts.balance_of(address).await
    }

    /// Newest first
    pub async fn transactions(&self, address: &str, limit: usize) -> GameResult<Vec<LedgerTransaction>> {
        let slot = self.accounts.lock(address).await?;
        Ok(slot.account.recent_transactions(limit))
    }

    pub async fn deposit(&self, address: &str, amount: u64) -> GameResult<u64> {
        let balance = {
            let mut slot = self.accounts.lock(address).await?;
            slot.account.deposit(amount, "Deposit")?
        };
        self.mark_dirty();
        self.enqueue(SettlementIntent::credit(address, amount, "deposit"));
        info!(address = %address, amount, balance, "deposit");
        Ok(balance)
    }

    pub async fn withdraw(&self, address: &str, amount: u64) -> GameResult<u64> {
        let balance = {
            let mut slot = self.accounts.lock(address).await?;
            slot.account.withdraw(amount, "Withdrawal")?
        };
        self.mark_dirty();
        self.enqueue(SettlementIntent::debit(address, amount, "withdrawal"));
        info!(address = %address, amount, balance, "withdrawal");
        Ok(balance)
    }

    pub async fn transfer(&self, from: &str, to: &str, amount: u64) -> GameResult<(u64, u64)> {
        let balances = self.accounts.transfer(from, to, amount).await?;
        self.mark_dirty();
        Ok(balances)
    }

    pub async fn house_summary(&self) -> HouseSummary {
        self.house.lock().await.summary()
    }

    /// Newest first
    pub async fn house_transactions(&self, limit: usize) -> Vec<HouseTransaction> {
        self.house.lock().await.transactions.recent(limit)
    }

    /// Destroy the account, its round and its stats
    pub async fn reset_account(&self, address: &str) -> GameResult<()> {
        AccountBook::validate_address(address)?;
        let had_account = self.accounts.remove(address).await;
        let had_stats = self.stats.remove(address);
        if !had_account && !had_stats {
            return Err(GameError::not_found(format!("account {}", address)));
        }
        self.mark_dirty();
        warn!(address = %address, "account reset");
        Ok(())
    }

    // ---- stats ----

    /// `NotFound` until the address has settled a round
    pub fn get_stats(&self, address: &str) -> GameResult<PlayerStats> {
        AccountBook::validate_address(address)?;
        self.stats
            .player(address)
            .ok_or_else(|| GameError::not_found(format!("no stats for {}", address)))
    }

    pub fn leaderboard(&self, limit: usize) -> Vec<PlayerStats> {
        self.stats.leaderboard(limit.clamp(1, MAX_LEADERBOARD))
    }

    pub fn global_stats(&self) -> GlobalStats {
        self.stats.global()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoundEvent> {
        self.events.subscribe()
    }

    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            running: self.running.load(Ordering::SeqCst),
            store: self.store.describe(),
            accounts: self.accounts.len(),
            rounds_settled: self.counters.rounds_settled.load(Ordering::Relaxed),
            flushes: self.counters.flushes.load(Ordering::Relaxed),
            flush_failures: self.counters.flush_failures.load(Ordering::Relaxed),
            rounds_evicted: self.counters.rounds_evicted.load(Ordering::Relaxed),
            settlements_submitted: self.settlement_counters.submitted.load(Ordering::Relaxed),
            settlements_failed: self.settlement_counters.failed.load(Ordering::Relaxed),
        }
    }

    // ---- persistence ----

    /// Point-in-time copy of everything the store keeps.
    ///
    /// Every account lock is held (in address order, like `transfer`) while
    /// the house, stats and accounts are copied, so no settlement can land
    /// half inside the snapshot. If an account appears while the locks are
    /// being taken, the pass is retried.
    pub async fn snapshot(&self) -> LedgerSnapshot {
        loop {
            let mut handles = self.accounts.handles();
            handles.sort_by(|a, b| a.0.cmp(&b.0));

            let mut guards = Vec::with_capacity(handles.len());
            for (address, handle) in &handles {
                guards.push((address.clone(), Arc::clone(handle).lock_owned().await));
            }
            let house = self.house.lock().await;

            let locked: HashMap<&str, &SlotHandle> =
                handles.iter().map(|(a, h)| (a.as_str(), h)).collect();
            let complete = self.accounts.handles().iter().all(|(address, handle)| {
                locked
                    .get(address.as_str())
                    .is_some_and(|held| Arc::ptr_eq(held, handle))
            });
            if !complete {
                debug!("account opened during snapshot; retrying");
                continue;
            }

            let mut snapshot = LedgerSnapshot::empty();
            for (address, slot) in &guards {
                if slot.is_retired() {
                    continue;
                }
                snapshot.accounts.insert(address.clone(), slot.account.clone());
                if let Some(round) = &slot.round {
                    snapshot.rounds.insert(address.clone(), round.clone());
                }
            }
            snapshot.stats = self
                .stats
                .players()
                .into_iter()
                .map(|s| (s.address.clone(), s))
                .collect();
            snapshot.house = Some(house.clone());
            snapshot.global = Some(self.stats.global());
            snapshot.taken_at = Utc::now();
            return snapshot;
        }
    }

    /// Persist if anything changed since the last successful flush
    pub async fn flush(&self) -> WheelhouseResult<bool> {
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(false);
        }

        let snapshot = self.snapshot().await;
        let store = self.store.clone();
        let result = tokio::task::spawn_blocking(move || store.persist(&snapshot))
            .await
            .map_err(|e| StorageError::WriteFailed(format!("flush task failed: {}", e)))
            .and_then(|r| r);

        match result {
            Ok(()) => {
                self.counters.flushes.fetch_add(1, Ordering::Relaxed);
                debug!(store = %self.store.describe(), "ledger flushed");
                Ok(true)
            }
            Err(e) => {
                self.dirty.store(true, Ordering::SeqCst);
                self.counters.flush_failures.fetch_add(1, Ordering::Relaxed);
                error!(error = %e, "ledger flush failed");
                Err(e.into())
            }
        }
    }

    pub async fn backup_ledger(&self) -> WheelhouseResult<BackupReceipt> {
        let snapshot = self.snapshot().await;
        let dir = self.config.storage.backup_directory.clone();
        let receipt = tokio::task::spawn_blocking(move || write_backup(&dir, &snapshot))
            .await
            .map_err(|e| StorageError::BackupFailed(format!("backup task failed: {}", e)))??;
        Ok(receipt)
    }

    /// Evict stale settled rounds and roll the stats window.
    ///
    /// Accounts whose lock is held are skipped until the next sweep.
    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let idle = self.config.lifecycle.round_idle_secs;
        let mut report = SweepReport::default();

        for (address, handle) in self.accounts.handles() {
            let Ok(mut slot) = handle.try_lock() else {
                report.busy += 1;
                continue;
            };
            if slot.round.as_ref().is_some_and(|r| r.is_stale(now, idle)) {
                slot.round = None;
                report.evicted += 1;
                debug!(address = %address, "stale round evicted");
            }
        }

        if report.evicted > 0 {
            self.counters
                .rounds_evicted
                .fetch_add(report.evicted as u64, Ordering::Relaxed);
            self.mark_dirty();
        }
        report.window_rolled = self.stats.roll_window(now);

        if self.config.monitoring.summary_on_sweep {
            let house = self.house_summary().await;
            let global = self.stats.global();
            info!(
                accounts = self.accounts.len(),
                evicted = report.evicted,
                rounds_24h = global.rounds_24h,
                house_balance = house.balance,
                house_profit = house.profit,
                "sweep complete"
            );
        }
        report
    }

    // ---- lifecycle ----

    /// Spawn the flush, sweep and settlement workers
    pub async fn start(self: &Arc<Self>) -> WheelhouseResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut tasks = self.tasks.lock().await;

        let queue = self.intent_queue.lock().ok().and_then(|mut q| q.take());
        match queue {
            Some(queue) => tasks.push(spawn_settlement_worker(
                self.chain.clone(),
                queue,
                self.config.lifecycle.settlement_timeout(),
                self.settlement_counters.clone(),
                self.shutdown.subscribe(),
            )),
            None => warn!("settlement queue already consumed; worker not restarted"),
        }

        let service = Arc::clone(self);
        let mut shutdown = self.shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            let mut ticker = interval(service.config.lifecycle.flush_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        // Failures are logged and counted inside flush
                        let _ = service.flush().await;
                    }
                    _ = shutdown.changed() => break,
                }
            }
        }));

        let service = Arc::clone(self);
        let mut shutdown = self.shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            let mut ticker = interval(service.config.lifecycle.sweep_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        service.sweep(Utc::now()).await;
                    }
                    _ = shutdown.changed() => break,
                }
            }
        }));

        info!(
            store = %self.store.describe(),
            flush_secs = self.config.lifecycle.flush_interval_secs,
            sweep_secs = self.config.lifecycle.sweep_interval_secs,
            "casino service started"
        );
        Ok(())
    }

    /// Stop the workers, then flush whatever is left
    pub async fn stop(&self) -> WheelhouseResult<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let _ = self.shutdown.send(true);

        let handles: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                warn!(error = %e, "background task ended abnormally");
            }
        }

        self.flush().await?;
        info!("casino service stopped");
        Ok(())
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    fn enqueue(&self, intent: SettlementIntent) {
        if self.intents.send(intent).is_err() {
            warn!("settlement queue closed; intent dropped");
        }
    }
}

fn no_round(address: &str) -> GameError {
    GameError::not_found(format!("no round for {}", address))
}

/// Builds a [`CasinoService`], restoring persisted state from the store
pub struct ServiceBuilder {
    config: WheelhouseConfig,
    store: Option<Arc<dyn LedgerStore>>,
    outcome: Option<Arc<dyn OutcomeGenerator>>,
    chain: Option<Arc<dyn ChainSettlement>>,
}

impl ServiceBuilder {
    pub fn new(config: WheelhouseConfig) -> Self {
        Self {
            config,
            store: None,
            outcome: None,
            chain: None,
        }
    }

    /// Override the store selected by `storage.backend`
    pub fn with_store(mut self, store: Arc<dyn LedgerStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_outcome(mut self, outcome: Arc<dyn OutcomeGenerator>) -> Self {
        self.outcome = Some(outcome);
        self
    }

    pub fn with_chain_settlement(mut self, chain: Arc<dyn ChainSettlement>) -> Self {
        self.chain = Some(chain);
        self
    }

    pub async fn build(self) -> WheelhouseResult<Arc<CasinoService>> {
        let config = self.config;
        config.validate()?;

        let store: Arc<dyn LedgerStore> = match self.store {
            Some(store) => store,
            None => match config.storage.backend {
                StorageBackend::RocksDb => Arc::new(RocksStore::open(&config.storage.data_directory)?),
                StorageBackend::Memory => Arc::new(MemoryStore::new()),
            },
        };

        let loader = store.clone();
        let mut snapshot = tokio::task::spawn_blocking(move || loader.load())
            .await
            .map_err(|e| StorageError::ReadFailed(format!("load task failed: {}", e)))??;

        let game = &config.game;
        let accounts = AccountBook::new(game.starting_balance, game.player_log_capacity);
        let restored = snapshot.accounts.len();
        for (address, account) in std::mem::take(&mut snapshot.accounts) {
            let round = snapshot.rounds.remove(&address);
            accounts.restore(account, round);
        }
        if !snapshot.rounds.is_empty() {
            warn!(orphans = snapshot.rounds.len(), "persisted rounds without an account ignored");
        }

        let stats = StatsAggregator::new(config.lifecycle.stats_window_secs);
        stats.restore(
            snapshot.stats.into_values().collect(),
            snapshot.global.unwrap_or_default(),
        );

        let house = snapshot
            .house
            .unwrap_or_else(|| HouseAccount::new(game.house_starting_balance, game.house_log_capacity));

        let (intents, intent_queue) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (shutdown, _) = watch::channel(false);

        info!(store = %store.describe(), accounts = restored, "ledger restored");

        Ok(Arc::new(CasinoService {
            limits: game.limits(),
            accounts,
            house: Mutex::new(house),
            stats,
            outcome: self.outcome.unwrap_or_else(|| Arc::new(OsRngOutcome::new())),
            store,
            chain: self.chain.unwrap_or_else(|| Arc::new(LoggingSettlement::new())),
            intents,
            intent_queue: std::sync::Mutex::new(Some(intent_queue)),
            settlement_counters: Arc::new(SettlementCounters::default()),
            events,
            counters: ServiceCounters::default(),
            dirty: AtomicBool::new(false),
            running: AtomicBool::new(false),
            shutdown,
            tasks: Mutex::new(Vec::new()),
            config,
        }))
    }
}
