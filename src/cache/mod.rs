//! Optional read-through cache for the set of held seats per travel date.
//!
//! Entries are keyed by a per-date generation. Every reservation or
//! cancellation commit bumps the generation, so a reader that computed its
//! entry from a pre-commit snapshot can only store it under a generation that
//! no later reader asks for. The booking engine never consults the cache for
//! its own commit-time checks.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::clock::Clock;

pub mod seats;

pub use seats::RedisAvailabilityCache;

#[async_trait]
pub trait AvailabilityCache: Send + Sync {
    /// Current generation for `date`, `None` when the cache is unusable.
    async fn generation(&self, date: NaiveDate) -> Option<u64>;

    async fn get_held(&self, date: NaiveDate, generation: u64) -> Option<HashSet<i64>>;

    async fn put_held(&self, date: NaiveDate, generation: u64, held: &HashSet<i64>);

    /// Must be called after every commit that changes holdings on `date`.
    async fn invalidate(&self, date: NaiveDate);
}

/// Cache that never holds anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

#[async_trait]
impl AvailabilityCache for NoopCache {
    async fn generation(&self, _date: NaiveDate) -> Option<u64> {
        None
    }

    async fn get_held(&self, _date: NaiveDate, _generation: u64) -> Option<HashSet<i64>> {
        None
    }

    async fn put_held(&self, _date: NaiveDate, _generation: u64, _held: &HashSet<i64>) {}

    async fn invalidate(&self, _date: NaiveDate) {}
}

struct Slot {
    generation: u64,
    held: Option<(HashSet<i64>, Instant)>,
    touched: Instant,
}

#[derive(Default)]
struct LocalEntries {
    dates: HashMap<NaiveDate, Slot>,
    // generations come from one counter so a date evicted and seen again
    // never gets back a number an old reader may still hold
    issued: u64,
}

impl LocalEntries {
    fn slot(&mut self, date: NaiveDate, today: NaiveDate, capacity: usize) -> Option<&mut Slot> {
        if date < today {
            return None;
        }

        if !self.dates.contains_key(&date) {
            self.dates.retain(|d, _| *d >= today);
            if self.dates.len() >= capacity {
                let oldest = self
                    .dates
                    .iter()
                    .min_by_key(|(_, slot)| (slot.touched, slot.generation))
                    .map(|(d, _)| *d);
                if let Some(oldest) = oldest {
                    self.dates.remove(&oldest);
                }
            }

            self.issued += 1;
            let slot = Slot {
                generation: self.issued,
                held: None,
                touched: Instant::now(),
            };
            self.dates.insert(date, slot);
        }

        let slot = self.dates.get_mut(&date)?;
        slot.touched = Instant::now();
        Some(slot)
    }
}

/// Single-process cache used when seat caching is on but Redis is not configured.
///
/// Holds at most `capacity` travel dates, least recently used first out. Past
/// dates are dropped and held sets expire after `ttl`, same as the Redis keys.
pub struct InMemoryAvailabilityCache {
    entries: Mutex<LocalEntries>,
    ttl: Duration,
    capacity: usize,
    clock: Arc<dyn Clock>,
}

impl InMemoryAvailabilityCache {
    pub const DEFAULT_CAPACITY: usize = 512;

    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(LocalEntries::default()),
            ttl,
            capacity: Self::DEFAULT_CAPACITY,
            clock,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Number of travel dates currently tracked.
    pub fn cached_dates(&self) -> usize {
        self.entries().dates.len()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, LocalEntries> {
        self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl AvailabilityCache for InMemoryAvailabilityCache {
    async fn generation(&self, date: NaiveDate) -> Option<u64> {
        let today = self.clock.today();
        self.entries()
            .slot(date, today, self.capacity)
            .map(|slot| slot.generation)
    }

    async fn get_held(&self, date: NaiveDate, generation: u64) -> Option<HashSet<i64>> {
        let mut entries = self.entries();
        let slot = entries.dates.get_mut(&date)?;
        if slot.generation != generation {
            return None;
        }

        let fresh = matches!(&slot.held, Some((_, stored_at)) if stored_at.elapsed() < self.ttl);
        if !fresh {
            slot.held = None;
            return None;
        }
        slot.touched = Instant::now();
        slot.held.as_ref().map(|(held, _)| held.clone())
    }

    async fn put_held(&self, date: NaiveDate, generation: u64, held: &HashSet<i64>) {
        let mut entries = self.entries();
        // a stale writer, or one whose date was evicted, has nothing useful to add
        if let Some(slot) = entries.dates.get_mut(&date) {
            if slot.generation == generation {
                slot.held = Some((held.clone(), Instant::now()));
                slot.touched = Instant::now();
            }
        }
    }

    async fn invalidate(&self, date: NaiveDate) {
        let mut entries = self.entries();
        entries.issued += 1;
        let next = entries.issued;
        if let Some(slot) = entries.dates.get_mut(&date) {
            slot.generation = next;
            slot.held = None;
        }
    }
}
