//! External settlement seam
//!
//! Ledger changes that have an on-chain counterpart (deposits, withdrawals
//! and round results) are queued as [`SettlementIntent`]s and drained by a
//! background worker. The in-game ledger is authoritative: a failed or slow
//! settlement is logged and counted, never rolled back into the ledger.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IntentDirection {
    /// Units flow to the address
    Credit,
    /// Units flow from the address
    Debit,
}

/// "Move N units to/from address A" as a logical operation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SettlementIntent {
    pub id: String,
    pub direction: IntentDirection,
    pub address: String,
    pub amount: u64,
    pub reference: String,
    pub created_at: DateTime<Utc>,
}

impl SettlementIntent {
    pub fn credit(address: &str, amount: u64, reference: impl Into<String>) -> Self {
        Self::new(IntentDirection::Credit, address, amount, reference.into())
    }

    pub fn debit(address: &str, amount: u64, reference: impl Into<String>) -> Self {
        Self::new(IntentDirection::Debit, address, amount, reference.into())
    }

    fn new(direction: IntentDirection, address: &str, amount: u64, reference: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            direction,
            address: address.to_string(),
            amount,
            reference,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("Settlement rejected: {0}")]
    Rejected(String),

    #[error("Settlement timed out after {0:?}")]
    Timeout(Duration),

    #[error("Settlement backend unavailable: {0}")]
    Unavailable(String),
}

/// Executes intents against an external system
#[async_trait]
pub trait ChainSettlement: Send + Sync {
    /// Returns a backend reference (e.g. a transaction id)
    async fn submit(&self, intent: &SettlementIntent) -> Result<String, SettlementError>;
}

/// Records intents through `tracing` and keeps them in memory.
///
/// Default backend when no wallet is wired in.
#[derive(Debug, Default)]
pub struct LoggingSettlement {
    submitted: Mutex<Vec<SettlementIntent>>,
}

impl LoggingSettlement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submitted(&self) -> Vec<SettlementIntent> {
        self.submitted
            .lock()
            .map(|list| list.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChainSettlement for LoggingSettlement {
    async fn submit(&self, intent: &SettlementIntent) -> Result<String, SettlementError> {
        info!(
            intent_id = %intent.id,
            direction = ?intent.direction,
            address = %intent.address,
            amount = intent.amount,
            reference = %intent.reference,
            "settlement intent"
        );
        if let Ok(mut list) = self.submitted.lock() {
            list.push(intent.clone());
        }
        Ok(format!("log:{}", intent.id))
    }
}

/// Worker counters shared with the service
#[derive(Debug, Default)]
pub struct SettlementCounters {
    pub submitted: AtomicU64,
    pub failed: AtomicU64,
}

/// Drain `queue` into `backend` until shutdown or until every sender is
/// gone. Intents still queued at shutdown are drained before exiting.
pub fn spawn_settlement_worker(
    backend: Arc<dyn ChainSettlement>,
    mut queue: mpsc::UnboundedReceiver<SettlementIntent>,
    submit_timeout: Duration,
    counters: Arc<SettlementCounters>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("settlement worker started");
        loop {
            tokio::select! {
                maybe = queue.recv() => match maybe {
                    Some(intent) => submit_one(backend.as_ref(), &intent, submit_timeout, &counters).await,
                    None => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        while let Ok(intent) = queue.try_recv() {
                            submit_one(backend.as_ref(), &intent, submit_timeout, &counters).await;
                        }
                        break;
                    }
                }
            }
        }
        info!("settlement worker stopped");
    })
}

async fn submit_one(
    backend: &dyn ChainSettlement,
    intent: &SettlementIntent,
    submit_timeout: Duration,
    counters: &SettlementCounters,
) {
    let outcome = match tokio::time::timeout(submit_timeout, backend.submit(intent)).await {
        Ok(result) => result,
        Err(_) => Err(SettlementError::Timeout(submit_timeout)),
    };

    match outcome {
        Ok(reference) => {
            counters.submitted.fetch_add(1, Ordering::Relaxed);
            debug!(intent_id = %intent.id, reference = %reference, "settlement accepted");
        }
        Err(e) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            warn!(intent_id = %intent.id, address = %intent.address, error = %e, "settlement failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StuckBackend;

    #[async_trait]
    impl ChainSettlement for StuckBackend {
        async fn submit(&self, _intent: &SettlementIntent) -> Result<String, SettlementError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("never".to_string())
        }
    }

    /// Refuses large amounts and reports itself down for small ones
    struct RefusingBackend;

    #[async_trait]
    impl ChainSettlement for RefusingBackend {
        async fn submit(&self, intent: &SettlementIntent) -> Result<String, SettlementError> {
            if intent.amount > 1_000 {
                Err(SettlementError::Rejected(format!("amount {} over wallet limit", intent.amount)))
            } else {
                Err(SettlementError::Unavailable("wallet offline".to_string()))
            }
        }
    }

    #[tokio::test]
    async fn test_backend_errors_are_counted_not_retried() {
        let counters = Arc::new(SettlementCounters::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let (_stop_tx, stop_rx) = watch::channel(false);

        let handle = spawn_settlement_worker(
            Arc::new(RefusingBackend),
            rx,
            Duration::from_secs(1),
            counters.clone(),
            stop_rx,
        );

        tx.send(SettlementIntent::credit("alice", 5_000, "round:alice:1")).unwrap();
        tx.send(SettlementIntent::debit("bob", 10, "withdrawal")).unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(counters.failed.load(Ordering::Relaxed), 2);
        assert_eq!(counters.submitted.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_error_messages() {
        assert!(SettlementError::Rejected("limit".into()).to_string().contains("rejected"));
        assert!(SettlementError::Unavailable("down".into()).to_string().contains("unavailable"));
        assert!(SettlementError::Timeout(Duration::from_millis(5)).to_string().contains("5ms"));
    }

    #[tokio::test]
    async fn test_worker_drains_queue_on_shutdown() {
        let backend = Arc::new(LoggingSettlement::new());
        let counters = Arc::new(SettlementCounters::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);

        let handle = spawn_settlement_worker(
            backend.clone(),
            rx,
            Duration::from_secs(1),
            counters.clone(),
            stop_rx,
        );

        tx.send(SettlementIntent::debit("alice", 100, "withdrawal")).unwrap();
        tx.send(SettlementIntent::credit("alice", 40, "deposit")).unwrap();
        stop_tx.send(true).unwrap();
        handle.await.unwrap();

        let submitted = backend.submitted();
        assert_eq!(submitted.len(), 2);
        assert_eq!(submitted[0].direction, IntentDirection::Debit);
        assert_eq!(counters.submitted.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_slow_backend_times_out() {
        let counters = Arc::new(SettlementCounters::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let (_stop_tx, stop_rx) = watch::channel(false);

        let handle = spawn_settlement_worker(
            Arc::new(StuckBackend),
            rx,
            Duration::from_millis(20),
            counters.clone(),
            stop_rx,
        );

        tx.send(SettlementIntent::credit("bob", 5, "win")).unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(counters.failed.load(Ordering::Relaxed), 1);
        assert_eq!(counters.submitted.load(Ordering::Relaxed), 0);
    }
}
