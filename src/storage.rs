//! Durable ledger storage
//!
//! The service keeps everything in memory and periodically hands a full
//! [`LedgerSnapshot`] to a [`LedgerStore`]. Records are JSON under
//! prefixed keys:
//!
//! - `balance:<address>` player account
//! - `round:<address>` current round, if any
//! - `stats:<address>` player stats
//! - `global:stats` table counters
//! - `house:stats` house account
//!
//! Singleton records sit outside the per-address prefixes so no address can
//! collide with them.

use crate::errors::{StorageError, StorageResult};
use crate::games::round::Round;
use crate::ledger::{HouseAccount, PlayerAccount};
use crate::stats::{GlobalStats, PlayerStats};
use chrono::{DateTime, Utc};
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

const BALANCE_PREFIX: &str = "balance:";
const ROUND_PREFIX: &str = "round:";
const STATS_PREFIX: &str = "stats:";
const GLOBAL_STATS_KEY: &str = "global:stats";
const HOUSE_KEY: &str = "house:stats";

/// Everything needed to rebuild the service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerSnapshot {
    pub accounts: BTreeMap<String, PlayerAccount>,
    pub rounds: BTreeMap<String, Round>,
    pub stats: BTreeMap<String, PlayerStats>,
    pub house: Option<HouseAccount>,
    pub global: Option<GlobalStats>,
    pub taken_at: DateTime<Utc>,
}

impl LedgerSnapshot {
    pub fn empty() -> Self {
        Self {
            accounts: BTreeMap::new(),
            rounds: BTreeMap::new(),
            stats: BTreeMap::new(),
            house: None,
            global: None,
            taken_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty() && self.house.is_none()
    }
}

/// Blocking persistence backend; callers run it on the blocking pool
pub trait LedgerStore: Send + Sync {
    fn load(&self) -> StorageResult<LedgerSnapshot>;

    /// Replace the stored state with `snapshot`
    fn persist(&self, snapshot: &LedgerSnapshot) -> StorageResult<()>;

    fn describe(&self) -> String;
}

/// RocksDB-backed store
#[derive(Clone)]
pub struct RocksStore {
    db: Arc<DB>,
    path: PathBuf,
}

impl RocksStore {
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = DB::open(&opts, path.as_ref())
            .map_err(|e| StorageError::DatabaseOpenFailed(format!("{}: {}", path.as_ref().display(), e)))?;
        info!(path = %path.as_ref().display(), "ledger store opened");

        Ok(Self {
            db: Arc::new(db),
            path: path.as_ref().to_path_buf(),
        })
    }

    fn get_record<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        match self.db.get(key.as_bytes()).map_err(|e| StorageError::ReadFailed(e.to_string()))? {
            Some(bytes) => decode(key, &bytes).map(Some),
            None => Ok(None),
        }
    }

    /// All `(key, value)` pairs under `prefix`
    fn scan(&self, prefix: &str) -> StorageResult<Vec<(String, Vec<u8>)>> {
        let mut out = Vec::new();
        let iter = self
            .db
            .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward));
        for item in iter {
            let (key, value) = item.map_err(|e| StorageError::ReadFailed(e.to_string()))?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            let key = String::from_utf8(key.to_vec())
                .map_err(|e| StorageError::CorruptedData(format!("non-utf8 key: {}", e)))?;
            out.push((key, value.to_vec()));
        }
        Ok(out)
    }
}

impl LedgerStore for RocksStore {
    fn load(&self) -> StorageResult<LedgerSnapshot> {
        let mut snapshot = LedgerSnapshot::empty();

        for (key, bytes) in self.scan(BALANCE_PREFIX)? {
            let account: PlayerAccount = decode(&key, &bytes)?;
            snapshot.accounts.insert(account.address.clone(), account);
        }
        for (key, bytes) in self.scan(ROUND_PREFIX)? {
            let round: Round = decode(&key, &bytes)?;
            snapshot.rounds.insert(round.address.clone(), round);
        }
        for (key, bytes) in self.scan(STATS_PREFIX)? {
            let stats: PlayerStats = decode(&key, &bytes)?;
            snapshot.stats.insert(stats.address.clone(), stats);
        }
        snapshot.house = self.get_record(HOUSE_KEY)?;
        snapshot.global = self.get_record(GLOBAL_STATS_KEY)?;

        debug!(
            accounts = snapshot.accounts.len(),
            rounds = snapshot.rounds.len(),
            "ledger loaded"
        );
        Ok(snapshot)
    }

    fn persist(&self, snapshot: &LedgerSnapshot) -> StorageResult<()> {
        let mut batch = WriteBatch::default();
        let mut live = HashSet::new();

        for (address, account) in &snapshot.accounts {
            let key = format!("{}{}", BALANCE_PREFIX, address);
            batch.put(key.as_bytes(), encode(&key, account)?);
            live.insert(key);
        }
        for (address, round) in &snapshot.rounds {
            let key = format!("{}{}", ROUND_PREFIX, address);
            batch.put(key.as_bytes(), encode(&key, round)?);
            live.insert(key);
        }
        for (address, stats) in &snapshot.stats {
            let key = format!("{}{}", STATS_PREFIX, address);
            batch.put(key.as_bytes(), encode(&key, stats)?);
            live.insert(key);
        }
        if let Some(house) = &snapshot.house {
            batch.put(HOUSE_KEY.as_bytes(), encode(HOUSE_KEY, house)?);
        }
        if let Some(global) = &snapshot.global {
            batch.put(GLOBAL_STATS_KEY.as_bytes(), encode(GLOBAL_STATS_KEY, global)?);
        }

        // Drop records for evicted rounds and reset accounts
        let mut stale = 0usize;
        for prefix in [BALANCE_PREFIX, ROUND_PREFIX, STATS_PREFIX] {
            for (key, _) in self.scan(prefix)? {
                if !live.contains(&key) {
                    batch.delete(key.as_bytes());
                    stale += 1;
                }
            }
        }

        self.db
            .write(batch)
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        debug!(accounts = snapshot.accounts.len(), stale, "ledger persisted");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("rocksdb:{}", self.path.display())
    }
}

/// In-process store for tests and ephemeral tables
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<Option<LedgerSnapshot>>,
    fail_writes: AtomicBool,
    writes: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `persist` fail until turned off again
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn stored(&self) -> Option<LedgerSnapshot> {
        self.state.lock().ok().and_then(|s| s.clone())
    }
}

impl LedgerStore for MemoryStore {
    fn load(&self) -> StorageResult<LedgerSnapshot> {
        let state = self
            .state
            .lock()
            .map_err(|_| StorageError::ReadFailed("memory store poisoned".to_string()))?;
        Ok(state.clone().unwrap_or_else(LedgerSnapshot::empty))
    }

    fn persist(&self, snapshot: &LedgerSnapshot) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::WriteFailed("memory store rejecting writes".to_string()));
        }
        let mut state = self
            .state
            .lock()
            .map_err(|_| StorageError::WriteFailed("memory store poisoned".to_string()))?;
        *state = Some(snapshot.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Where a backup landed and what it contains
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupReceipt {
    pub path: PathBuf,
    pub sha256: String,
    pub accounts: usize,
    pub bytes: usize,
}

/// Write `snapshot` as pretty JSON into `dir`, named by UTC timestamp
pub fn write_backup(dir: &Path, snapshot: &LedgerSnapshot) -> StorageResult<BackupReceipt> {
    std::fs::create_dir_all(dir)
        .map_err(|e| StorageError::BackupFailed(format!("{}: {}", dir.display(), e)))?;

    let json = serde_json::to_vec_pretty(snapshot)
        .map_err(|e| StorageError::BackupFailed(format!("encode: {}", e)))?;
    let sha256 = hex::encode(Sha256::digest(&json));

    let stamp = snapshot.taken_at.format("%Y%m%dT%H%M%S%.3fZ");
    let mut path = dir.join(format!("ledger-{}.json", stamp));
    let mut suffix = 1;
    while path.exists() {
        path = dir.join(format!("ledger-{}-{}.json", stamp, suffix));
        suffix += 1;
    }

    std::fs::write(&path, &json)
        .map_err(|e| StorageError::BackupFailed(format!("{}: {}", path.display(), e)))?;
    info!(path = %path.display(), accounts = snapshot.accounts.len(), "ledger backup written");

    Ok(BackupReceipt {
        path,
        sha256,
        accounts: snapshot.accounts.len(),
        bytes: json.len(),
    })
}

/// Read a backup file back into a snapshot
pub fn read_backup(path: &Path) -> StorageResult<LedgerSnapshot> {
    let bytes = std::fs::read(path)
        .map_err(|e| StorageError::ReadFailed(format!("{}: {}", path.display(), e)))?;
    decode(&path.display().to_string(), &bytes)
}

fn encode<T: Serialize>(key: &str, value: &T) -> StorageResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| StorageError::WriteFailed(format!("encode {}: {}", key, e)))
}

fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> StorageResult<T> {
    serde_json::from_slice(bytes).map_err(|e| StorageError::CorruptedData(format!("{}: {}", key, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> LedgerSnapshot {
        let mut snapshot = LedgerSnapshot::empty();
        for address in ["alice", "bob"] {
            snapshot
                .accounts
                .insert(address.to_string(), PlayerAccount::open(address, 1000, 100));
        }
        snapshot
            .rounds
            .insert("alice".to_string(), Round::new("alice", 3, Utc::now()));
        snapshot
            .stats
            .insert("alice".to_string(), PlayerStats::new("alice", 0));
        snapshot.house = Some(HouseAccount::new(1_000_000, 1000));
        snapshot.global = Some(GlobalStats::default());
        snapshot
    }

    #[test]
    fn test_rocks_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path().join("db")).unwrap();
        let snapshot = sample();

        store.persist(&snapshot).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(loaded.accounts, snapshot.accounts);
        assert_eq!(loaded.rounds, snapshot.rounds);
        assert_eq!(loaded.stats, snapshot.stats);
        assert_eq!(loaded.house, snapshot.house);
        assert_eq!(loaded.global, snapshot.global);
    }

    #[test]
    fn test_rocks_store_drops_stale_records() {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path().join("db")).unwrap();
        let mut snapshot = sample();
        store.persist(&snapshot).unwrap();

        snapshot.accounts.remove("bob");
        snapshot.rounds.clear();
        store.persist(&snapshot).unwrap();
        let loaded = store.load().unwrap();

        assert!(loaded.accounts.contains_key("alice"));
        assert!(!loaded.accounts.contains_key("bob"));
        assert!(loaded.rounds.is_empty());
        assert!(loaded.global.is_some());
    }

    #[test]
    fn test_player_named_global_keeps_its_stats() {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path().join("db")).unwrap();
        let mut snapshot = sample();
        let mut stats = PlayerStats::new("global", 1);
        stats.total_rounds = 4;
        stats.total_winnings = -120;
        snapshot.stats.insert("global".to_string(), stats.clone());
        let mut global = GlobalStats::default();
        global.total_rounds = 9;
        snapshot.global = Some(global.clone());

        store.persist(&snapshot).unwrap();
        store.persist(&snapshot).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(loaded.stats.get("global"), Some(&stats));
        assert_eq!(loaded.stats.len(), 2);
        assert_eq!(loaded.global, Some(global));
    }

    #[test]
    fn test_empty_rocks_store_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path().join("db")).unwrap();
        let loaded = store.load().unwrap();
        assert!(loaded.is_empty());
        assert!(store.describe().starts_with("rocksdb:"));
    }

    #[test]
    fn test_memory_store_failure_toggle() {
        let store = MemoryStore::new();
        let snapshot = sample();

        store.set_fail_writes(true);
        assert!(matches!(store.persist(&snapshot), Err(StorageError::WriteFailed(_))));
        assert!(store.stored().is_none());

        store.set_fail_writes(false);
        store.persist(&snapshot).unwrap();
        assert_eq!(store.write_count(), 1);
        assert_eq!(store.load().unwrap(), snapshot);
    }

    #[test]
    fn test_backup_file_matches_digest() {
        let dir = TempDir::new().unwrap();
        let snapshot = sample();

        let first = write_backup(dir.path(), &snapshot).unwrap();
        let second = write_backup(dir.path(), &snapshot).unwrap();

        assert_ne!(first.path, second.path);
        assert_eq!(first.accounts, 2);
        let bytes = std::fs::read(&first.path).unwrap();
        assert_eq!(hex::encode(Sha256::digest(&bytes)), first.sha256);
        assert_eq!(read_backup(&first.path).unwrap(), snapshot);
    }
}
