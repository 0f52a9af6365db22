//! In-process lock arbitration.

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::{LockArbiter, LockSlot, SlotMode};

#[derive(Debug, Default)]
struct SlotState {
    readers: HashSet<u64>,
    writer: Option<u64>,
}

impl SlotState {
    fn is_free(&self) -> bool {
        self.readers.is_empty() && self.writer.is_none()
    }

    fn try_acquire(&mut self, owner: u64, mode: SlotMode) -> bool {
        match mode {
            SlotMode::Shared => match self.writer {
                Some(writer) if writer != owner => false,
                _ => {
                    self.writer = None;
                    self.readers.insert(owner);
                    true
                }
            },
            SlotMode::Exclusive => {
                if self.writer == Some(owner) {
                    return true;
                }
                if self.writer.is_some() || self.readers.iter().any(|r| *r != owner) {
                    return false;
                }
                self.readers.remove(&owner);
                self.writer = Some(owner);
                true
            }
        }
    }

    fn release(&mut self, owner: u64) {
        self.readers.remove(&owner);
        if self.writer == Some(owner) {
            self.writer = None;
        }
    }
}

type Resources = HashMap<String, [SlotState; 3]>;

/// Lock table shared by every handle of one in-process backend.
///
/// Resources are identified by name; each [`arbiter`](Self::arbiter) call
/// creates a new holder. Cloning the table shares it.
///
/// # Example
///
/// ```rust
/// use dbvfs::{LockArbiter, LockSlot, MemoryLockTable, SlotMode};
///
/// let table = MemoryLockTable::new();
/// let mut a = table.arbiter("db");
/// let mut b = table.arbiter("db");
/// assert!(a.try_acquire(LockSlot::Reserved, SlotMode::Exclusive).unwrap());
/// assert!(b.held_elsewhere(LockSlot::Reserved).unwrap());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryLockTable {
    resources: Arc<Mutex<Resources>>,
    next_owner: Arc<AtomicU64>,
}

impl MemoryLockTable {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A new holder for `resource`.
    #[must_use]
    pub fn arbiter(&self, resource: &str) -> MemoryArbiter {
        MemoryArbiter {
            resources: Arc::clone(&self.resources),
            resource: resource.to_owned(),
            owner: self.next_owner.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Returns `true` if any holder has any slot of `resource`.
    pub fn is_locked(&self, resource: &str) -> bool {
        self.resources.lock().contains_key(resource)
    }
}

/// One holder's view of a [`MemoryLockTable`] resource.
///
/// Dropping the arbiter releases every slot it holds.
#[derive(Debug)]
pub struct MemoryArbiter {
    resources: Arc<Mutex<Resources>>,
    resource: String,
    owner: u64,
}

impl MemoryArbiter {
    fn with_slot<R>(&self, slot: LockSlot, f: impl FnOnce(&mut SlotState) -> R) -> R {
        let mut resources = self.resources.lock();
        let slots = resources.entry(self.resource.clone()).or_default();
        let out = f(&mut slots[slot.index()]);
        if slots.iter().all(SlotState::is_free) {
            resources.remove(&self.resource);
        }
        out
    }
}

impl LockArbiter for MemoryArbiter {
    fn try_acquire(&mut self, slot: LockSlot, mode: SlotMode) -> io::Result<bool> {
        let owner = self.owner;
        Ok(self.with_slot(slot, |state| state.try_acquire(owner, mode)))
    }

    fn release(&mut self, slot: LockSlot) -> io::Result<()> {
        let owner = self.owner;
        self.with_slot(slot, |state| state.release(owner));
        Ok(())
    }

    fn held_elsewhere(&mut self, slot: LockSlot) -> io::Result<bool> {
        let owner = self.owner;
        Ok(self.with_slot(slot, |state| {
            state.writer.is_some_and(|writer| writer != owner)
        }))
    }
}

impl Drop for MemoryArbiter {
    fn drop(&mut self) {
        for slot in LockSlot::ALL {
            let owner = self.owner;
            self.with_slot(slot, |state| state.release(owner));
        }
    }
}
