//! Ledger state survives a service restart on RocksDB

use std::sync::Arc;
use tempfile::TempDir;
use wheelhouse::config::{StorageBackend, WheelhouseConfig};
use wheelhouse::games::{BetRequest, Phase, ScriptedOutcome};
use wheelhouse::service::{CasinoService, ServiceBuilder};
use wheelhouse::storage::read_backup;

fn rocks_config(dir: &TempDir) -> WheelhouseConfig {
    let mut config = WheelhouseConfig::development();
    config.storage.backend = StorageBackend::RocksDb;
    config.storage.data_directory = dir.path().join("db");
    config.storage.backup_directory = dir.path().join("backups");
    config
}

async fn build(config: WheelhouseConfig, slot: u8) -> Arc<CasinoService> {
    ServiceBuilder::new(config)
        .with_outcome(Arc::new(ScriptedOutcome::always(slot)))
        .build()
        .await
        .expect("service should build")
}

#[tokio::test]
async fn test_ledger_survives_restart() {
    let dir = TempDir::new().unwrap();
    let config = rocks_config(&dir);

    {
        let service = build(config.clone(), 17).await;
        service.start().await.unwrap();

        service.open_round("alice").await.unwrap();
        service
            .place_bet("alice", BetRequest::number(17, 100))
            .await
            .unwrap();
        let result = service.spin("alice").await.unwrap();
        assert_eq!(result.new_balance, 4500);

        service.open_round("bob").await.unwrap();
        service
            .place_bet("bob", BetRequest::color("black", 50))
            .await
            .unwrap();

        service.stop().await.unwrap();
    }

    let service = build(config, 0).await;

    assert_eq!(service.balance("alice").await.unwrap(), 4500);
    let round = service.get_round("alice").await.unwrap();
    assert_eq!(round.phase, Phase::Result);
    assert_eq!(round.winning_slot, Some(17));
    assert_eq!(round.round_number, 1);

    let bob = service.get_round("bob").await.unwrap();
    assert_eq!(bob.phase, Phase::Betting);
    assert_eq!(bob.pending_total, 50);
    assert_eq!(service.balance("bob").await.unwrap(), 950);

    let stats = service.get_stats("alice").unwrap();
    assert_eq!(stats.total_rounds, 1);
    assert_eq!(stats.total_wins, 1);
    assert_eq!(stats.total_winnings, 3500);

    let house = service.house_summary().await;
    assert_eq!(house.balance, 1_000_000 - 3500);
    assert_eq!(house.total_paid_out, 3500);

    // Round numbering continues from the persisted counter
    let next = service.new_round("alice").await.unwrap();
    assert_eq!(next.round_number, 2);
}

#[tokio::test]
async fn test_reset_account_is_persisted() {
    let dir = TempDir::new().unwrap();
    let config = rocks_config(&dir);

    {
        let service = build(config.clone(), 0).await;
        service.deposit("carol", 250).await.unwrap();
        service.open_round("dave").await.unwrap();
        assert!(service.flush().await.unwrap());

        service.reset_account("carol").await.unwrap();
        assert!(service.flush().await.unwrap());
    }

    let service = build(config, 0).await;
    assert_eq!(service.status().accounts, 1);
    assert!(service.get_round("dave").await.is_ok());
    // A fresh account gets the starting grant again
    assert_eq!(service.balance("carol").await.unwrap(), 1000);
}

#[tokio::test]
async fn test_backup_matches_live_state() {
    let dir = TempDir::new().unwrap();
    let service = build(rocks_config(&dir), 5).await;

    service.open_round("erin").await.unwrap();
    service
        .place_bet("erin", BetRequest::color("red", 200))
        .await
        .unwrap();
    service.spin("erin").await.unwrap();

    let receipt = service.backup_ledger().await.unwrap();
    assert_eq!(receipt.accounts, 1);
    assert_eq!(receipt.sha256.len(), 64);
    assert!(receipt.path.starts_with(dir.path().join("backups")));

    let snapshot = read_backup(&receipt.path).unwrap();
    assert_eq!(snapshot.accounts["erin"].balance, 1200);
    assert_eq!(snapshot.rounds["erin"].winning_slot, Some(5));
    assert_eq!(snapshot.house.unwrap().total_paid_out, 200);
}
