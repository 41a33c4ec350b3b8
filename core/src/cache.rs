//! Keyed client-side cache for fetched preference records.
//!
//! One entry per user identity. An entry is served without a backend request
//! while fresh, marked stale afterwards, and evicted entirely once the
//! retention window passes. Snapshots capture an entry (or its absence) so
//! an optimistic writer can restore exactly what it overwrote.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::models::StylePrefs;

#[derive(Debug, Clone, Copy)]
pub struct CachePolicy {
    /// Window during which a cached entry is served without a request.
    pub fresh_for: Duration,
    /// Window after which an entry is evicted on access.
    pub retain_for: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            fresh_for: Duration::from_secs(30),
            retain_for: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Option<StylePrefs>,
    stored_at: Instant,
}

/// Result of a keyed lookup. `Fresh`/`Stale` both carry the cached value —
/// a cached `None` means "we know there is no row yet".
#[derive(Debug, Clone)]
pub enum CacheLookup {
    Fresh(Option<StylePrefs>),
    Stale(Option<StylePrefs>),
    Miss,
}

/// Captured pre-mutation state for one key, restorable after a failed
/// optimistic update. Opaque outside this module.
#[derive(Debug, Clone)]
pub struct CacheSnapshot {
    user_id: String,
    entry: Option<Entry>,
}

#[derive(Debug, Default)]
pub struct PrefsCache {
    policy: CachePolicy,
    entries: HashMap<String, Entry>,
}

impl PrefsCache {
    #[must_use]
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            policy,
            entries: HashMap::new(),
        }
    }

    pub fn lookup(&mut self, user_id: &str) -> CacheLookup {
        let (age, value) = match self.entries.get(user_id) {
            None => return CacheLookup::Miss,
            Some(entry) => (entry.stored_at.elapsed(), entry.value.clone()),
        };
        if age >= self.policy.retain_for {
            self.entries.remove(user_id);
            return CacheLookup::Miss;
        }
        if age < self.policy.fresh_for {
            CacheLookup::Fresh(value)
        } else {
            CacheLookup::Stale(value)
        }
    }

    pub fn put(&mut self, user_id: &str, value: Option<StylePrefs>) {
        self.entries.insert(
            user_id.to_string(),
            Entry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&mut self, user_id: &str) {
        self.entries.remove(user_id);
    }

    /// Capture the current entry (or its absence) for later restore.
    #[must_use]
    pub fn snapshot(&self, user_id: &str) -> CacheSnapshot {
        CacheSnapshot {
            user_id: user_id.to_string(),
            entry: self.entries.get(user_id).cloned(),
        }
    }

    /// Put back exactly what [`snapshot`](Self::snapshot) captured,
    /// including the original timestamp.
    pub fn restore(&mut self, snapshot: CacheSnapshot) {
        match snapshot.entry {
            Some(entry) => {
                self.entries.insert(snapshot.user_id, entry);
            }
            None => {
                self.entries.remove(&snapshot.user_id);
            }
        }
    }
}
