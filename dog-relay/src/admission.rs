//! Global and per-owner admission control.
//!
//! The global gate is a blocking capacity limiter: callers queue for a
//! slot. The per-owner gate is a non-blocking fairness limiter: an owner
//! at its cap is refused at once so it can never starve other owners.
//!
//! Slots are RAII guards. Dropping a guard (including when the task that
//! holds it is cancelled) releases the slot, so a slot is released exactly
//! once by construction.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio::sync::futures::Notified;
use tracing::debug;

use crate::{OwnerId, RelayError, RelayResult};

/// Read-only snapshot of the global gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionStats {
    pub capacity: usize,
    pub active: usize,
    pub waiting: usize,
    pub available: usize,
}

struct AdmissionState {
    capacity: usize,
    global: Arc<Semaphore>,
    waiting: AtomicUsize,
    owners: Mutex<HashMap<OwnerId, usize>>,
    owner_released: Notify,
}

/// Process-wide admission controller
#[derive(Clone)]
pub struct AdmissionController {
    state: Arc<AdmissionState>,
}

impl AdmissionController {
    /// Create a controller with `capacity` global slots
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Arc::new(AdmissionState {
                capacity,
                global: Arc::new(Semaphore::new(capacity)),
                waiting: AtomicUsize::new(0),
                owners: Mutex::new(HashMap::new()),
                owner_released: Notify::new(),
            }),
        }
    }

    /// Wait for a free global slot and take it
    ///
    /// Only fails once the controller has been closed for shutdown.
    pub async fn reserve_global(&self) -> RelayResult<GlobalSlot> {
        let _waiting = WaitingGuard::enter(&self.state.waiting);
        let permit = self
            .state
            .global
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| RelayError::WorkerShutdown)?;

        Ok(GlobalSlot { _permit: permit })
    }

    /// Take a global slot only if one is free right now
    pub fn try_reserve_global(&self) -> Option<GlobalSlot> {
        self.state
            .global
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| GlobalSlot { _permit: permit })
    }

    /// Take one of `owner`'s slots, or refuse immediately at the cap
    pub fn reserve_owner(&self, owner: OwnerId, per_owner_limit: usize) -> Option<OwnerSlot> {
        let mut owners = self.state.owners.lock();
        let held = owners.get(&owner).copied().unwrap_or(0);

        if held >= per_owner_limit {
            debug!("Owner {} denied: holds {}/{}", owner, held, per_owner_limit);
            return None;
        }

        *owners.entry(owner).or_insert(0) += 1;
        Some(OwnerSlot {
            owner,
            state: self.state.clone(),
        })
    }

    /// Slots currently held by `owner`
    pub fn held(&self, owner: OwnerId) -> usize {
        self.state.owners.lock().get(&owner).copied().unwrap_or(0)
    }

    /// Number of owners holding at least one slot
    pub fn active_owners(&self) -> usize {
        self.state.owners.lock().len()
    }

    /// Future resolved the next time any owner slot is released
    ///
    /// Pin it and call `enable()` before checking the owner gate so a
    /// release that races the check is not missed.
    pub fn owner_released(&self) -> Notified<'_> {
        self.state.owner_released.notified()
    }

    /// Refuse every further global reservation and wake all waiters
    pub fn close(&self) {
        self.state.global.close();
    }

    pub fn capacity(&self) -> usize {
        self.state.capacity
    }

    /// Snapshot for observability
    pub fn stats(&self) -> AdmissionStats {
        let available = self.state.global.available_permits().min(self.state.capacity);
        AdmissionStats {
            capacity: self.state.capacity,
            active: self.state.capacity - available,
            waiting: self.state.waiting.load(Ordering::SeqCst),
            available,
        }
    }
}

/// A held global slot; released on drop
#[derive(Debug)]
pub struct GlobalSlot {
    _permit: OwnedSemaphorePermit,
}

impl GlobalSlot {
    /// Release the slot now
    pub fn release(self) {}
}

/// A held per-owner slot; released on drop
pub struct OwnerSlot {
    owner: OwnerId,
    state: Arc<AdmissionState>,
}

impl OwnerSlot {
    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    /// Release the slot now
    pub fn release(self) {}
}

impl Drop for OwnerSlot {
    fn drop(&mut self) {
        {
            let mut owners = self.state.owners.lock();
            if let Some(held) = owners.get_mut(&self.owner) {
                *held = held.saturating_sub(1);
                if *held == 0 {
                    owners.remove(&self.owner);
                }
            }
        }
        self.state.owner_released.notify_waiters();
    }
}

impl std::fmt::Debug for OwnerSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnerSlot").field("owner", &self.owner).finish()
    }
}

/// Counts a caller as waiting until it leaves, even when cancelled
struct WaitingGuard<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> WaitingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self { counter }
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}
