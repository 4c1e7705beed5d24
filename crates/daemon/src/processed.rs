//! Bounded record of paths the watch daemon has already watermarked.
//!
//! Entries expire after a TTL and the oldest completed entry is evicted when
//! the capacity is reached, so a long-running daemon does not grow without
//! bound. Claiming is an atomic check-and-insert: two near-simultaneous
//! events for the same path cannot both win.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    InFlight,
    Done,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    state: EntryState,
    at: Instant,
}

/// Outcome of [`ProcessedSet::try_claim`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// Caller owns the path and must `complete` or `release` it.
    Acquired,
    /// Another task is processing it right now.
    InFlight,
    /// Processed within the retention window.
    AlreadyProcessed,
}

#[derive(Debug)]
pub struct ProcessedSet {
    ttl: Duration,
    capacity: usize,
    entries: Mutex<HashMap<PathBuf, Entry>>,
}

impl ProcessedSet {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Atomically check the record and mark `path` in flight if absent.
    pub fn try_claim(&self, path: &Path) -> Claim {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        Self::purge_expired(&mut entries, now, self.ttl);

        if let Some(entry) = entries.get(path) {
            return match entry.state {
                EntryState::InFlight => Claim::InFlight,
                EntryState::Done => Claim::AlreadyProcessed,
            };
        }

        if entries.len() >= self.capacity {
            Self::evict_oldest_done(&mut entries);
        }

        entries.insert(
            path.to_path_buf(),
            Entry {
                state: EntryState::InFlight,
                at: now,
            },
        );
        Claim::Acquired
    }

    /// Record a successful run; the retention window starts now.
    pub fn complete(&self, path: &Path) {
        self.entries.lock().insert(
            path.to_path_buf(),
            Entry {
                state: EntryState::Done,
                at: Instant::now(),
            },
        );
    }

    /// Drop a claim after a failed run so a later event can retry.
    pub fn release(&self, path: &Path) {
        let mut entries = self.entries.lock();
        if matches!(entries.get(path), Some(e) if e.state == EntryState::InFlight) {
            entries.remove(path);
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        let entries = self.entries.lock();
        entries
            .get(path)
            .is_some_and(|e| e.state == EntryState::InFlight || e.at.elapsed() < self.ttl)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn purge_expired(entries: &mut HashMap<PathBuf, Entry>, now: Instant, ttl: Duration) {
        // In-flight entries are never expired: the owner will resolve them.
        entries.retain(|_, e| e.state == EntryState::InFlight || now.duration_since(e.at) < ttl);
    }

    fn evict_oldest_done(entries: &mut HashMap<PathBuf, Entry>) {
        let oldest = entries
            .iter()
            .filter(|(_, e)| e.state == EntryState::Done)
            .min_by_key(|(_, e)| e.at)
            .map(|(p, _)| p.clone());
        if let Some(path) = oldest {
            tracing::debug!(path = %path.display(), "evicting oldest processed entry");
            entries.remove(&path);
        }
    }
}
