use crate::games::wheel::SLOT_COUNT;
use rand::{rngs::OsRng, Rng};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Source of winning slots, one per spin
pub trait OutcomeGenerator: Send + Sync {
    /// Next winning slot in `0..SLOT_COUNT`
    fn next_slot(&self) -> u8;
}

/// Uniform outcomes drawn from the operating system's CSPRNG
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRngOutcome;

impl OsRngOutcome {
    pub fn new() -> Self {
        Self
    }
}

impl OutcomeGenerator for OsRngOutcome {
    fn next_slot(&self) -> u8 {
        OsRng.gen_range(0..SLOT_COUNT)
    }
}

/// Replays a fixed sequence of slots, cycling when exhausted.
///
/// Used by tests and table simulations where the outcome has to be known.
#[derive(Debug)]
pub struct ScriptedOutcome {
    slots: Vec<u8>,
    cursor: AtomicUsize,
}

impl ScriptedOutcome {
    /// Slots above the wheel's range are folded back into it
    pub fn new(slots: Vec<u8>) -> Self {
        let slots = if slots.is_empty() {
            vec![0]
        } else {
            slots.into_iter().map(|s| s % SLOT_COUNT).collect()
        };
        Self {
            slots,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn always(slot: u8) -> Self {
        Self::new(vec![slot])
    }
}

impl OutcomeGenerator for ScriptedOutcome {
    fn next_slot(&self) -> u8 {
        let index = self.cursor.fetch_add(1, Ordering::SeqCst);
        self.slots[index % self.slots.len()]
    }
}
