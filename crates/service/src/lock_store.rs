//! In-memory lease registry keyed by resource id.
//!
//! Every operation goes through [`LockStore::resolve`], which runs while the
//! map shard for the key is locked. The check and the mutation that follows it
//! therefore happen atomically per resource id, and unrelated ids on other
//! shards proceed in parallel.

use std::sync::Arc;
use std::time::SystemTime;

use dashmap::mapref::entry::{Entry, OccupiedEntry, VacantEntry};
use dashmap::DashMap;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::errors::LockError;
use crate::lease::{Lease, LeaseDuration};

/// Operations the HTTP layer needs from a lock backend.
/// The in-memory [`LockStore`] is the only implementation today; a persistent
/// or distributed one would slot in behind the same calls.
pub trait LockBackend: Send + Sync {
    /// Take the lease on `resource_id` for `duration`. Not reentrant: an
    /// effective lease fails the call even when `owner_id` already holds it.
    fn acquire(
        &self,
        resource_id: &str,
        owner_id: &str,
        duration: LeaseDuration,
    ) -> Result<(), LockError>;

    /// Drop the lease on `resource_id` if `owner_id` holds it.
    fn release(&self, resource_id: &str, owner_id: &str) -> Result<(), LockError>;

    /// Whether `resource_id` has an effective lease. An empty id is never locked.
    fn status(&self, resource_id: &str) -> bool;

    /// Remove every expired lease, returning how many were dropped.
    fn purge_expired(&self) -> usize;
}

#[derive(Debug)]
pub struct LockStore {
    leases: DashMap<String, Lease>,
    clock: Arc<dyn Clock>,
}

type Slot<'a> = OccupiedEntry<'a, String, Lease>;

/// A resource id as seen by one operation, with its shard still locked.
enum Resolved<'a> {
    Held(Slot<'a>),
    Free(FreeSlot<'a>),
}

/// No effective lease. A stale entry may still sit in the map until the
/// caller either reclaims the slot or evicts it.
enum FreeSlot<'a> {
    Vacant(VacantEntry<'a, String, Lease>),
    Expired(Slot<'a>),
}

impl FreeSlot<'_> {
    fn claim(self, lease: Lease) {
        match self {
            FreeSlot::Vacant(v) => {
                v.insert(lease);
            }
            // evict + insert under the same guard
            FreeSlot::Expired(mut o) => {
                o.insert(lease);
            }
        }
    }

    fn evict(self) {
        if let FreeSlot::Expired(o) = self {
            let (resource_id, _) = o.remove_entry();
            debug!(%resource_id, "evicted expired lease");
        }
    }
}

impl LockStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { leases: DashMap::new(), clock }
    }

    /// Effective-lease lookup shared by all operations.
    fn resolve(&self, resource_id: &str, now: SystemTime) -> Resolved<'_> {
        match self.leases.entry(resource_id.to_owned()) {
            Entry::Occupied(o) if o.get().is_effective_at(now) => Resolved::Held(o),
            Entry::Occupied(o) => Resolved::Free(FreeSlot::Expired(o)),
            Entry::Vacant(v) => Resolved::Free(FreeSlot::Vacant(v)),
        }
    }

    /// Number of leases that are currently effective.
    pub fn active_leases(&self) -> usize {
        let now = self.clock.now();
        self.leases.iter().filter(|l| l.is_effective_at(now)).count()
    }
}

impl Default for LockStore {
    fn default() -> Self {
        Self::new()
    }
}

fn require_id(value: &str, reason: &'static str) -> Result<(), LockError> {
    if value.is_empty() {
        return Err(LockError::invalid(reason));
    }
    Ok(())
}

impl LockBackend for LockStore {
    fn acquire(
        &self,
        resource_id: &str,
        owner_id: &str,
        duration: LeaseDuration,
    ) -> Result<(), LockError> {
        require_id(resource_id, "resource id must be non-empty")?;
        require_id(owner_id, "owner id must be non-empty")?;

        let now = self.clock.now();
        let lease = Lease::new(owner_id, now, duration)?;
        match self.resolve(resource_id, now) {
            Resolved::Held(held) => {
                debug!(
                    resource_id,
                    owner_id,
                    holder = %held.get().owner_id,
                    "acquire rejected: already locked"
                );
                Err(LockError::AlreadyLocked)
            }
            Resolved::Free(slot) => {
                slot.claim(lease);
                let duration_ms = duration.as_duration().as_millis() as u64;
                debug!(resource_id, owner_id, duration_ms, "lease granted");
                Ok(())
            }
        }
    }

    fn release(&self, resource_id: &str, owner_id: &str) -> Result<(), LockError> {
        require_id(resource_id, "resource id must be non-empty")?;
        require_id(owner_id, "owner id must be non-empty")?;

        match self.resolve(resource_id, self.clock.now()) {
            Resolved::Free(slot) => {
                slot.evict();
                debug!(resource_id, owner_id, "release rejected: not locked");
                Err(LockError::NotLocked)
            }
            Resolved::Held(held) if held.get().owner_id != owner_id => {
                debug!(
                    resource_id,
                    owner_id,
                    holder = %held.get().owner_id,
                    "release rejected: wrong owner"
                );
                Err(LockError::WrongOwner)
            }
            Resolved::Held(held) => {
                held.remove();
                debug!(resource_id, owner_id, "lease released");
                Ok(())
            }
        }
    }

    fn status(&self, resource_id: &str) -> bool {
        if resource_id.is_empty() {
            return false;
        }
        match self.resolve(resource_id, self.clock.now()) {
            Resolved::Held(_) => true,
            Resolved::Free(slot) => {
                slot.evict();
                false
            }
        }
    }

    fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.leases.len();
        self.leases.retain(|_, lease| lease.is_effective_at(now));
        before.saturating_sub(self.leases.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Barrier;
    use std::time::Duration;

    fn secs(s: f64) -> LeaseDuration {
        LeaseDuration::from_secs_f64(s).unwrap()
    }

    fn store_with_clock() -> (LockStore, ManualClock) {
        let clock = ManualClock::default();
        (LockStore::with_clock(Arc::new(clock.clone())), clock)
    }

    #[test]
    fn acquire_then_status_reports_locked() {
        let (store, _) = store_with_clock();
        assert!(!store.status("t1"));
        store.acquire("t1", "alice", secs(30.0)).unwrap();
        assert!(store.status("t1"));
        assert!(!store.status("t2"));
    }

    #[test]
    fn acquire_is_not_reentrant() {
        let (store, _) = store_with_clock();
        store.acquire("t1", "alice", secs(30.0)).unwrap();
        assert_eq!(store.acquire("t1", "bob", secs(30.0)), Err(LockError::AlreadyLocked));
        assert_eq!(store.acquire("t1", "alice", secs(30.0)), Err(LockError::AlreadyLocked));
    }

    #[test]
    fn lease_expires_and_stays_expired() {
        let (store, clock) = store_with_clock();
        store.acquire("t1", "alice", secs(10.0)).unwrap();

        clock.advance(Duration::from_millis(9_999));
        assert!(store.status("t1"));

        clock.advance(Duration::from_millis(1));
        assert!(!store.status("t1"));
        assert!(!store.status("t1"));
        assert_eq!(store.leases.len(), 0, "status evicts the stale entry");
    }

    #[test]
    fn expired_lease_can_be_taken_by_anyone() {
        let (store, clock) = store_with_clock();
        store.acquire("t1", "alice", secs(1.0)).unwrap();
        clock.advance(Duration::from_secs(2));

        store.acquire("t1", "bob", secs(5.0)).unwrap();
        assert_eq!(store.release("t1", "alice"), Err(LockError::WrongOwner));
        store.release("t1", "bob").unwrap();
    }

    #[test]
    fn release_by_owner_frees_the_resource() {
        let (store, _) = store_with_clock();
        store.acquire("t1", "alice", secs(30.0)).unwrap();
        store.release("t1", "alice").unwrap();
        assert!(!store.status("t1"));

        store.acquire("t1", "bob", secs(30.0)).unwrap();
        assert!(store.status("t1"));
    }

    #[test]
    fn release_by_other_owner_keeps_lease() {
        let (store, _) = store_with_clock();
        store.acquire("t1", "alice", secs(30.0)).unwrap();
        assert_eq!(store.release("t1", "mallory"), Err(LockError::WrongOwner));
        assert!(store.status("t1"));
        store.release("t1", "alice").unwrap();
    }

    #[test]
    fn release_without_effective_lease_is_not_locked() {
        let (store, clock) = store_with_clock();
        assert_eq!(store.release("never", "alice"), Err(LockError::NotLocked));

        store.acquire("t1", "alice", secs(1.0)).unwrap();
        clock.advance(Duration::from_secs(1));
        assert_eq!(store.release("t1", "alice"), Err(LockError::NotLocked));
        assert_eq!(store.leases.len(), 0);

        store.acquire("t2", "alice", secs(1.0)).unwrap();
        store.release("t2", "alice").unwrap();
        assert_eq!(store.release("t2", "alice"), Err(LockError::NotLocked));
    }

    #[test]
    fn empty_ids_are_invalid() {
        let (store, _) = store_with_clock();
        assert!(matches!(store.acquire("", "alice", secs(1.0)), Err(LockError::InvalidRequest(_))));
        assert!(matches!(store.acquire("t1", "", secs(1.0)), Err(LockError::InvalidRequest(_))));
        assert!(matches!(store.release("", "alice"), Err(LockError::InvalidRequest(_))));
        assert!(matches!(store.release("t1", ""), Err(LockError::InvalidRequest(_))));
        assert!(!store.status(""));
        assert_eq!(store.leases.len(), 0);
    }

    #[test]
    fn purge_drops_only_expired_leases() {
        let (store, clock) = store_with_clock();
        store.acquire("short", "alice", secs(1.0)).unwrap();
        store.acquire("long", "bob", secs(60.0)).unwrap();
        assert_eq!(store.active_leases(), 2);

        clock.advance(Duration::from_secs(5));
        assert_eq!(store.active_leases(), 1);
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.purge_expired(), 0);
        assert!(store.status("long"));
    }

    #[test]
    fn concurrent_acquires_grant_exactly_one() {
        const RACERS: usize = 16;
        let store = LockStore::new();
        let barrier = Barrier::new(RACERS);

        let wins = std::thread::scope(|s| {
            let handles: Vec<_> = (0..RACERS)
                .map(|i| {
                    let store = &store;
                    let barrier = &barrier;
                    s.spawn(move || {
                        barrier.wait();
                        store.acquire("contested", &format!("user-{i}"), secs(60.0))
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect::<Vec<_>>()
        });

        assert_eq!(wins.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(wins.iter().filter(|r| r.is_err()).all(|r| *r == Err(LockError::AlreadyLocked)));
    }

    #[test]
    fn distinct_resources_are_independent() {
        let store = Arc::new(LockStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store.acquire(&format!("table-{i}"), "alice", secs(60.0))
                })
            })
            .collect();
        for h in handles {
            assert!(h.join().unwrap().is_ok());
        }
        assert_eq!(store.active_leases(), 8);
    }
}
