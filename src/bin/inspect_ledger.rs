//! Ledger inspection binary
//!
//! Prints accounts, open rounds, the house ledger and table counters from
//! either a RocksDB directory or a JSON backup file.

use clap::Parser;
use std::path::PathBuf;
use wheelhouse::ledger::HouseAccount;
use wheelhouse::storage::{read_backup, LedgerSnapshot, LedgerStore, RocksStore};

#[derive(Parser, Debug)]
#[command(name = "inspect_ledger")]
#[command(about = "Inspect a wheelhouse ledger", long_about = None)]
struct Args {
    /// Database directory
    #[arg(long, default_value = "./DB/wheelhouse")]
    db_path: PathBuf,

    /// Read a JSON backup instead of the database
    #[arg(long)]
    backup: Option<PathBuf>,

    /// Only show this address
    #[arg(long)]
    address: Option<String>,

    /// Transactions to print per account
    #[arg(long, default_value = "5")]
    transactions: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let (source, snapshot) = match &args.backup {
        Some(path) => (format!("backup:{}", path.display()), read_backup(path)?),
        None => {
            if !args.db_path.exists() {
                println!("No ledger found at {}", args.db_path.display());
                return Ok(());
            }
            let store = RocksStore::open(&args.db_path)?;
            (store.describe(), store.load()?)
        }
    };

    println!("Wheelhouse Ledger Inspector");
    println!("===========================");
    println!("Source: {}", source);
    println!("Snapshot taken: {}", snapshot.taken_at.to_rfc3339());
    println!();

    print_accounts(&snapshot, &args);
    if let Some(house) = &snapshot.house {
        print_house(house, args.transactions);
    }
    if let Some(global) = &snapshot.global {
        println!("Table");
        println!("   Rounds: {}", global.total_rounds);
        println!("   Wagered: {}", global.total_wagered);
        println!("   Paid out: {}", global.total_paid_out);
        println!("   Players: {}", global.total_players);
        println!("   Biggest payout: {}", global.biggest_payout);
    }

    Ok(())
}

fn print_accounts(snapshot: &LedgerSnapshot, args: &Args) {
    let mut inconsistent = 0;
    let mut total_balance: u64 = 0;

    for (address, account) in &snapshot.accounts {
        total_balance = total_balance.saturating_add(account.balance);
        if !account.is_consistent() {
            inconsistent += 1;
        }
        if args.address.as_deref().is_some_and(|wanted| wanted != address) {
            continue;
        }

        println!("Account {}", address);
        println!("   Balance: {}", account.balance);
        println!("   Earned: {}  Spent: {}", account.total_earned, account.total_spent);
        println!("   Rounds played: {}", account.round_counter);
        println!("   Consistent: {}", account.is_consistent());

        if let Some(round) = snapshot.rounds.get(address) {
            println!(
                "   Round #{} {:?}: {} bet(s), {} pending",
                round.round_number,
                round.phase,
                round.pending_bets.len(),
                round.pending_total
            );
        }
        if let Some(stats) = snapshot.stats.get(address) {
            println!(
                "   Stats: {} rounds, {} wins, net {}",
                stats.total_rounds, stats.total_wins, stats.total_winnings
            );
        }
        for tx in account.recent_transactions(args.transactions) {
            println!(
                "     {} {:?} {} {}",
                tx.timestamp.to_rfc3339(),
                tx.kind,
                tx.amount,
                tx.description
            );
        }
        println!();
    }

    println!("Accounts: {}", snapshot.accounts.len());
    println!("Total player balance: {}", total_balance);
    if inconsistent > 0 {
        println!("Inconsistent accounts: {}", inconsistent);
    }
    println!();
}

fn print_house(house: &HouseAccount, limit: usize) {
    let summary = house.summary();
    println!("House");
    println!("   Balance: {}", summary.balance);
    println!("   Collected: {}", summary.total_collected);
    println!("   Paid out: {}", summary.total_paid_out);
    println!("   Profit: {}", summary.profit);
    for tx in house.transactions.recent(limit) {
        println!(
            "     {} {:?} {:+} -> {} {}",
            tx.timestamp.to_rfc3339(),
            tx.kind,
            tx.delta,
            tx.balance_after,
            tx.description
        );
    }
    println!();
}
