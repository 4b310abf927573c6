use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::{Datelike, NaiveDate};
use dashmap::DashMap;
use serde::Serialize;
use ulid::Ulid;

/// Calendar extent a cached answer depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheScope {
    Day(NaiveDate),
    Month { year: i32, month: u32 },
}

impl CacheScope {
    fn touched_by(&self, date: NaiveDate) -> bool {
        match *self {
            CacheScope::Day(d) => d == date,
            CacheScope::Month { year, month } => date.year() == year && date.month() == month,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub venue_id: Ulid,
    pub scope: CacheScope,
    /// Distinguishes queries over the same scope, e.g. `slots:60`.
    pub query: String,
}

impl CacheKey {
    pub fn day(venue_id: Ulid, date: NaiveDate, query: impl Into<String>) -> Self {
        Self {
            venue_id,
            scope: CacheScope::Day(date),
            query: query.into(),
        }
    }

    pub fn month(venue_id: Ulid, year: i32, month: u32, query: impl Into<String>) -> Self {
        Self {
            venue_id,
            scope: CacheScope::Month { year, month },
            query: query.into(),
        }
    }
}

struct CacheEntry {
    value: serde_json::Value,
    created_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() > ttl
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicUsize,
    misses: AtomicUsize,
    evictions: AtomicUsize,
    expired: AtomicUsize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: usize,
    pub hits: usize,
    pub misses: usize,
    pub evictions: usize,
    pub expired: usize,
}

/// Bounded TTL cache of rendered availability answers.
///
/// Readers note the venue's generation before computing an answer and hand
/// it back on insert; an invalidation in between bumps the generation and the
/// stale answer is dropped instead of cached.
pub struct AvailabilityCache {
    entries: DashMap<CacheKey, CacheEntry>,
    generations: DashMap<Ulid, u64>,
    ttl: Duration,
    capacity: usize,
    counters: Counters,
}

impl AvailabilityCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            generations: DashMap::new(),
            ttl,
            capacity,
            counters: Counters::default(),
        }
    }

    pub fn generation(&self, venue_id: Ulid) -> u64 {
        self.generations.get(&venue_id).map(|g| *g).unwrap_or(0)
    }

    pub fn get(&self, key: &CacheKey) -> Option<serde_json::Value> {
        let fresh = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(self.ttl) => Some(entry.value.clone()),
            Some(_) => None,
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };
        match fresh {
            Some(value) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            None => {
                self.entries.remove_if(key, |_, e| e.is_expired(self.ttl));
                self.counters.expired.fetch_add(1, Ordering::Relaxed);
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store `value` unless the venue was invalidated since `generation` was read.
    pub fn insert(&self, key: CacheKey, value: serde_json::Value, generation: u64) -> bool {
        if self.capacity == 0 || self.generation(key.venue_id) != generation {
            return false;
        }
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.make_room();
        }
        self.entries.insert(
            key,
            CacheEntry {
                value,
                created_at: Instant::now(),
            },
        );
        true
    }

    /// Drop expired entries; if still full, drop the oldest one.
    fn make_room(&self) {
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired(self.ttl));
        let dropped = before.saturating_sub(self.entries.len());
        self.counters.expired.fetch_add(dropped, Ordering::Relaxed);
        if self.entries.len() < self.capacity {
            return;
        }
        let oldest = self
            .entries
            .iter()
            .min_by_key(|e| e.value().created_at)
            .map(|e| e.key().clone());
        if let Some(key) = oldest
            && self.entries.remove(&key).is_some()
        {
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Forget every answer for `venue_id` that covers `date`: its day entries
    /// and the month containing it.
    pub fn invalidate(&self, venue_id: Ulid, date: NaiveDate) -> usize {
        self.bump(venue_id);
        self.remove_matching(|k| k.venue_id == venue_id && k.scope.touched_by(date))
    }

    /// Forget everything cached for a venue (directory changes such as hours).
    pub fn invalidate_venue(&self, venue_id: Ulid) -> usize {
        self.bump(venue_id);
        self.remove_matching(|k| k.venue_id == venue_id)
    }

    fn bump(&self, venue_id: Ulid) {
        *self.generations.entry(venue_id).or_insert(0) += 1;
    }

    fn remove_matching(&self, pred: impl Fn(&CacheKey) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|k, _| !pred(k));
        before.saturating_sub(self.entries.len())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            expired: self.counters.expired.load(Ordering::Relaxed),
        }
    }
}
