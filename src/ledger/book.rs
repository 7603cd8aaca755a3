use crate::errors::{GameError, GameResult};
use crate::games::round::Round;
use crate::ledger::{AccountLedger, Ledger, PlayerAccount};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

const MAX_ADDRESS_LEN: usize = 128;

/// Everything owned by one address, guarded by a single mutex
#[derive(Debug)]
pub struct AccountSlot {
    pub account: PlayerAccount,
    pub round: Option<Round>,
    retired: bool,
}

impl AccountSlot {
    fn new(account: PlayerAccount, round: Option<Round>) -> Self {
        Self {
            account,
            round,
            retired: false,
        }
    }

    /// Set once the slot has been removed from the book
    pub fn is_retired(&self) -> bool {
        self.retired
    }
}

pub type SlotHandle = Arc<Mutex<AccountSlot>>;

/// Address-keyed account map.
///
/// Operations on one address serialize on that address's mutex; different
/// addresses proceed in parallel. A removed slot is marked retired so a
/// caller that raced the removal re-fetches instead of writing to a dead
/// entry.
pub struct AccountBook {
    slots: DashMap<String, SlotHandle>,
    starting_balance: u64,
    log_capacity: usize,
}

impl AccountBook {
    pub fn new(starting_balance: u64, log_capacity: usize) -> Self {
        Self {
            slots: DashMap::new(),
            starting_balance,
            log_capacity,
        }
    }

    pub fn validate_address(address: &str) -> GameResult<()> {
        if address.trim().is_empty() {
            return Err(GameError::validation("address must not be empty"));
        }
        if address.len() > MAX_ADDRESS_LEN {
            return Err(GameError::validation(format!(
                "address longer than {} bytes",
                MAX_ADDRESS_LEN
            )));
        }
        if address.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(GameError::validation("address contains whitespace"));
        }
        Ok(())
    }

    /// Lock the slot for `address`, creating a funded account if absent
    pub async fn lock(&self, address: &str) -> GameResult<OwnedMutexGuard<AccountSlot>> {
        Self::validate_address(address)?;

        loop {
            let handle = self
                .slots
                .entry(address.to_string())
                .or_insert_with(|| {
                    debug!(address = %address, grant = self.starting_balance, "opening account");
                    let account = PlayerAccount::open(address, self.starting_balance, self.log_capacity);
                    Arc::new(Mutex::new(AccountSlot::new(account, None)))
                })
                .value()
                .clone();

            let guard = handle.lock_owned().await;
            if !guard.retired {
                return Ok(guard);
            }
        }
    }

    /// Lock the slot for `address` only if the account already exists
    pub async fn lock_existing(&self, address: &str) -> Option<OwnedMutexGuard<AccountSlot>> {
        loop {
            let handle = self.slots.get(address)?.value().clone();
            let guard = handle.lock_owned().await;
            if !guard.retired {
                return Some(guard);
            }
        }
    }

    /// Drop the account and its round. Returns whether anything existed.
    pub async fn remove(&self, address: &str) -> bool {
        let Some(mut guard) = self.lock_existing(address).await else {
            return false;
        };
        guard.retired = true;
        self.slots.remove(address);
        true
    }

    /// Insert a persisted account, replacing any live one
    pub fn restore(&self, account: PlayerAccount, round: Option<Round>) {
        let address = account.address.clone();
        self.slots
            .insert(address, Arc::new(Mutex::new(AccountSlot::new(account, round))));
    }

    pub fn contains(&self, address: &str) -> bool {
        self.slots.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Point-in-time list of handles; the map itself is not held
    pub fn handles(&self) -> Vec<(String, SlotHandle)> {
        self.slots
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

#[async_trait]
impl Ledger for AccountBook {
    async fn balance_of(&self, address: &str) -> GameResult<u64> {
        let slot = self.lock(address).await?;
        Ok(slot.account.balance_of())
    }

    async fn credit(&self, address: &str, amount: u64, description: &str) -> GameResult<u64> {
        let mut slot = self.lock(address).await?;
        slot.account.credit(amount, description)
    }

    async fn debit(&self, address: &str, amount: u64, description: &str) -> GameResult<u64> {
        let mut slot = self.lock(address).await?;
        slot.account.debit(amount, description)
    }

    async fn transfer(&self, from: &str, to: &str, amount: u64) -> GameResult<(u64, u64)> {
        if from == to {
            return Err(GameError::validation("cannot transfer to the same account"));
        }

        // Address order, so two opposing transfers cannot deadlock
        let (low, high) = if from < to { (from, to) } else { (to, from) };
        let mut low_slot = self.lock(low).await?;
        let mut high_slot = self.lock(high).await?;
        let (source, target) = if from < to {
            (&mut low_slot, &mut high_slot)
        } else {
            (&mut high_slot, &mut low_slot)
        };

        source
            .account
            .debit(amount, &format!("Transfer to {}", to))?;

        match target.account.credit(amount, &format!("Transfer from {}", from)) {
            Ok(to_balance) => Ok((source.account.balance, to_balance)),
            Err(e) => {
                // Hand the funds back so the debit does not leak
                source
                    .account
                    .credit(amount, &format!("Transfer to {} reversed", to))?;
                Err(e)
            }
        }
    }
}
