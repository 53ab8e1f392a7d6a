//! Per-key serialization of run creation.
//!
//! Requests that carry the same idempotency key are processed one at a time.
//! A key is bound to the request that first created a run under it; later
//! requests must ask for the same task and overrides and get that run back.
//! A failed creation leaves nothing behind, and only the most recent
//! `capacity` keys are remembered.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex;

use runhub_core::{RunExecRequest, RunId, SpecDocument, TaskId};

/// Keys remembered by [`IdempotencyLedger::new`].
pub const DEFAULT_CAPACITY: usize = 10_000;

/// The request a key was first used for and the run it produced.
#[derive(Debug, Clone, PartialEq)]
pub struct IdempotencyRecord {
    pub task_id: TaskId,
    pub spec_overrides: SpecDocument,
    pub run_id: RunId,
}

impl IdempotencyRecord {
    pub fn new(request: &RunExecRequest, run_id: RunId) -> Self {
        Self {
            task_id: request.task_id.clone(),
            spec_overrides: request.spec_overrides.clone(),
            run_id,
        }
    }

    /// True if `request` asks for the run this record was created for.
    pub fn matches(&self, request: &RunExecRequest) -> bool {
        self.task_id == request.task_id && self.spec_overrides == request.spec_overrides
    }
}

/// Slot holding the outcome for one key, if any.
pub type IdempotencySlot = Arc<Mutex<Option<IdempotencyRecord>>>;

#[derive(Default)]
struct Slots {
    by_key: HashMap<String, IdempotencySlot>,
    /// Keys, oldest first.
    order: VecDeque<String>,
}

/// Idempotency key -> recorded outcome.
pub struct IdempotencyLedger {
    slots: StdMutex<Slots>,
    capacity: usize,
}

impl Default for IdempotencyLedger {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl IdempotencyLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger remembering at most `capacity` keys (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: StdMutex::new(Slots::default()),
            capacity: capacity.max(1),
        }
    }

    /// Slot for `key`, created on first use.
    ///
    /// Holders must check [`is_current`](Self::is_current) once they hold
    /// the slot lock: a slot can be released or evicted while they wait.
    pub fn slot(&self, key: &str) -> IdempotencySlot {
        let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(slot) = slots.by_key.get(key) {
            return slot.clone();
        }

        let slot = IdempotencySlot::default();
        slots.by_key.insert(key.to_string(), slot.clone());
        slots.order.push_back(key.to_string());
        self.evict(&mut slots, key);
        slot
    }

    /// True while `slot` is the one registered for `key`.
    pub fn is_current(&self, key: &str, slot: &IdempotencySlot) -> bool {
        let slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        slots
            .by_key
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
    }

    /// Forget `key` if it still maps to `slot`.
    pub fn release(&self, key: &str, slot: &IdempotencySlot) {
        let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        let current = slots
            .by_key
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, slot));
        if current {
            slots.by_key.remove(key);
            slots.order.retain(|k| k != key);
        }
    }

    /// Drop the oldest settled keys until the ledger fits its capacity.
    /// Keys with a creation in flight (slot locked) and `keep` are skipped.
    fn evict(&self, slots: &mut Slots, keep: &str) {
        let mut skipped = 0;
        while slots.by_key.len() > self.capacity && skipped < slots.order.len() {
            let Some(key) = slots.order.pop_front() else {
                break;
            };
            let settled = key != keep
                && slots
                    .by_key
                    .get(&key)
                    .map_or(true, |slot| slot.try_lock().is_ok());
            if settled {
                slots.by_key.remove(&key);
            } else {
                slots.order.push_back(key);
                skipped += 1;
            }
        }
    }

    /// Number of keys remembered.
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .by_key
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
