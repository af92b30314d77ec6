//! Short-lived read cache for list queries.
//!
//! Each key owns a slot that moves through
//! `Vacant -> Fresh -> Stale -> Fresh -> ...`:
//! a fill makes it `Fresh`, an invalidation or an expiry makes it `Stale`.
//! Every invalidation also bumps the slot's generation. A reader that missed
//! receives a [`FillTicket`] carrying the generation it saw, and
//! [`ResultCache::fill`] refuses the value if a write invalidated the slot in
//! between, so a slow read can never put pre-write data back.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Default time-to-live for cached list results.
pub const DEFAULT_TTL: Duration = Duration::from_millis(60_000);

/// Keys for cacheable query shapes. Only parameterless queries get a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// The unfiltered task list.
    TaskList,
}

impl CacheKey {
    /// Keys whose cached result may change after any task write.
    pub const TASK_WRITES: &'static [CacheKey] = &[CacheKey::TaskList];
}

/// Observable state of a key's slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotPhase {
    Vacant,
    Fresh,
    Stale,
}

/// Proof that a reader missed at a given generation.
#[derive(Debug, Clone)]
#[must_use]
pub struct FillTicket<K> {
    key: K,
    generation: u64,
}

impl<K> FillTicket<K> {
    pub fn key(&self) -> &K {
        &self.key
    }
}

pub enum Lookup<K, V> {
    Hit(V),
    Miss(FillTicket<K>),
}

enum SlotState<V> {
    Fresh { value: V, expires_at: Instant },
    Stale,
}

struct Slot<V> {
    generation: u64,
    state: SlotState<V>,
}

pub struct ResultCache<K = CacheKey, V = serde_json::Value> {
    slots: Mutex<HashMap<K, Slot<V>>>,
}

impl<K, V> ResultCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone,
{
    pub fn new() -> Self {
        Self { slots: Mutex::new(HashMap::new()) }
    }

    /// Returns the value if present and unexpired, otherwise `None`.
    pub fn get(&self, key: &K) -> Option<V> {
        match self.lookup(key) {
            Lookup::Hit(value) => Some(value),
            Lookup::Miss(_) => None,
        }
    }

    /// Like [`get`](Self::get), but a miss hands back a ticket for [`fill`](Self::fill).
    pub fn lookup(&self, key: &K) -> Lookup<K, V> {
        let mut slots = self.lock();
        let now = Instant::now();
        let generation = match slots.get_mut(key) {
            Some(slot) => {
                if let SlotState::Fresh { value, expires_at } = &slot.state {
                    if now < *expires_at {
                        tracing::debug!(?key, "cache hit");
                        return Lookup::Hit(value.clone());
                    }
                    tracing::debug!(?key, "cache entry expired");
                    slot.state = SlotState::Stale;
                }
                slot.generation
            }
            None => 0,
        };
        tracing::debug!(?key, "cache miss");
        Lookup::Miss(FillTicket { key: key.clone(), generation })
    }

    /// Stores `value` unconditionally with expiry `now + ttl`.
    pub fn set(&self, key: K, value: V, ttl: Duration) {
        let mut slots = self.lock();
        let expires_at = Instant::now() + ttl;
        let slot = slots.entry(key).or_insert(Slot { generation: 0, state: SlotState::Stale });
        slot.state = SlotState::Fresh { value, expires_at };
    }

    /// Stores `value` only if the key was not invalidated since `ticket` was
    /// issued. Returns whether the value was stored.
    pub fn fill(&self, ticket: FillTicket<K>, value: V, ttl: Duration) -> bool {
        let mut slots = self.lock();
        let current = slots.get(&ticket.key).map_or(0, |slot| slot.generation);
        if current != ticket.generation {
            tracing::debug!(key = ?ticket.key, "discarding fill raced by a write");
            return false;
        }
        let expires_at = Instant::now() + ttl;
        let slot = slots
            .entry(ticket.key)
            .or_insert(Slot { generation: current, state: SlotState::Stale });
        slot.state = SlotState::Fresh { value, expires_at };
        true
    }

    /// Drops the value for `key` regardless of expiry.
    pub fn invalidate(&self, key: &K) {
        let mut slots = self.lock();
        let slot = slots
            .entry(key.clone())
            .or_insert(Slot { generation: 0, state: SlotState::Stale });
        slot.generation += 1;
        slot.state = SlotState::Stale;
        tracing::debug!(?key, generation = slot.generation, "cache invalidated");
    }

    pub fn invalidate_all(&self, keys: &[K]) {
        for key in keys {
            self.invalidate(key);
        }
    }

    pub fn phase(&self, key: &K) -> SlotPhase {
        match self.lock().get(key).map(|slot| &slot.state) {
            None => SlotPhase::Vacant,
            Some(SlotState::Fresh { expires_at, .. }) if Instant::now() < *expires_at => {
                SlotPhase::Fresh
            }
            Some(_) => SlotPhase::Stale,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, Slot<V>>> {
        // Slots stay consistent across a panic; every write is a single assignment.
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<K, V> Default for ResultCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
