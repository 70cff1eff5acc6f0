//! In-memory JWT cache keyed by the digest of the opaque token.
//!
//! Provides:
//! - TTL enforcement on read and write (with clock skew applied once, at write)
//! - Background reclamation of expired entries
//! - Best-effort capacity bound, evicting the soonest-to-expire entries first

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::janitor::spawn_janitor_task;
use super::types::{CacheEntry, CacheKey, Clock, SystemClock};

/// Entries this close to their deadline are evicted first under capacity pressure.
pub const NEARLY_EXPIRED_GRACE_SECS: i64 = 120;

/// Outcome of one reclamation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReclaimStats {
    /// Entries removed because their deadline had passed.
    pub expired: usize,
    /// Entries removed to get back under the capacity bound.
    pub evicted: usize,
    /// Entries left after the pass.
    pub remaining: usize,
}

/// Concurrency-safe JWT cache.
pub struct JwtCache {
    /// Cached JWTs: key -> entry.
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,

    /// Subtracted from every token expiry before it is stored.
    clock_skew: Duration,

    /// Capacity bound enforced by reclamation. `None` disables it.
    max_entries: Option<usize>,

    clock: Arc<dyn Clock>,

    /// Reclamation task, when running.
    janitor: Mutex<Option<JoinHandle<()>>>,
}

impl JwtCache {
    /// Create a cache reading the wall clock.
    pub fn new(max_entries: Option<usize>, clock_skew: Duration) -> Self {
        Self::with_clock(max_entries, clock_skew, Arc::new(SystemClock))
    }

    /// Create a cache with an explicit time source.
    pub fn with_clock(
        max_entries: Option<usize>,
        clock_skew: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            entries: RwLock::new(HashMap::with_capacity(1024)),
            clock_skew,
            max_entries,
            clock,
            janitor: Mutex::new(None),
        }
    }

    /// Clock skew margin applied on insert.
    pub fn clock_skew(&self) -> Duration {
        self.clock_skew
    }

    /// Look up a JWT. Expired entries are reported as missing and removed.
    pub fn get(&self, key: &CacheKey) -> Option<String> {
        let now = self.clock.now();

        {
            let entries = match self.entries.read() {
                Ok(e) => e,
                Err(_) => {
                    warn!("JWT cache lock poisoned, treating lookup as miss");
                    return None;
                }
            };
            match entries.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired_at(now) => return Some(entry.jwt.clone()),
                Some(_) => {}
            }
        }

        // Expired. Re-check under the write lock, a concurrent set may have refreshed it.
        if let Ok(mut entries) = self.entries.write() {
            if entries.get(key).is_some_and(|e| e.is_expired_at(now)) {
                entries.remove(key);
                debug!(key = %key.fingerprint(), "Removed expired JWT on lookup");
            }
        }

        None
    }

    /// Store a JWT until `expires_at - clock_skew`.
    ///
    /// Does nothing if that instant is not strictly in the future or not
    /// representable.
    /// Returns whether the entry was stored.
    pub fn set(&self, key: CacheKey, jwt: String, expires_at: DateTime<Utc>) -> bool {
        let Some(deadline) = expires_at.checked_sub_signed(self.clock_skew) else {
            debug!(
                key = %key.fingerprint(),
                expires_at = %expires_at,
                "JWT expiry out of range under clock skew, not caching"
            );
            return false;
        };

        let mut entries = match self.entries.write() {
            Ok(e) => e,
            Err(_) => {
                warn!("JWT cache lock poisoned, skipping insert");
                return false;
            }
        };

        let now = self.clock.now();
        if deadline <= now {
            debug!(
                key = %key.fingerprint(),
                expires_at = %expires_at,
                "JWT already expired under clock skew, not caching"
            );
            return false;
        }

        entries.insert(
            key,
            CacheEntry {
                jwt,
                expires_at: deadline,
            },
        );
        true
    }

    /// Number of entries currently held, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every expired entry. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        match self.entries.write() {
            Ok(mut entries) => Self::sweep_expired(&mut entries, now),
            Err(_) => {
                warn!("JWT cache lock poisoned, skipping sweep");
                0
            }
        }
    }

    /// Evict entries until the capacity bound holds. Returns the number evicted.
    pub fn enforce_capacity(&self) -> usize {
        let Some(max) = self.max_entries else {
            return 0;
        };
        let now = self.clock.now();
        match self.entries.write() {
            Ok(mut entries) => Self::evict_over_capacity(&mut entries, max, now),
            Err(_) => {
                warn!("JWT cache lock poisoned, skipping capacity enforcement");
                0
            }
        }
    }

    /// One reclamation pass: expired sweep, then capacity enforcement.
    ///
    /// Each step holds the write lock only for its own duration.
    pub fn reclaim(&self) -> ReclaimStats {
        let expired = self.purge_expired();
        let evicted = self.enforce_capacity();

        ReclaimStats {
            expired,
            evicted,
            remaining: self.len(),
        }
    }

    /// Start the background reclamation task. Replaces a running one.
    pub fn start_janitor(self: &Arc<Self>, every: std::time::Duration) {
        let handle = spawn_janitor_task(Arc::downgrade(self), every);
        if let Ok(mut slot) = self.janitor.lock() {
            if let Some(previous) = slot.replace(handle) {
                previous.abort();
            }
        }
    }

    /// Stop the background reclamation task, if running.
    pub fn stop_janitor(&self) {
        if let Ok(mut slot) = self.janitor.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
                debug!("JWT cache janitor stopped");
            }
        }
    }

    /// Whether a reclamation task is attached and still alive.
    pub fn janitor_running(&self) -> bool {
        self.janitor
            .lock()
            .map(|slot| slot.as_ref().is_some_and(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    fn sweep_expired(entries: &mut HashMap<CacheKey, CacheEntry>, now: DateTime<Utc>) -> usize {
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now));
        before - entries.len()
    }

    /// Evict in ascending deadline order (ties by key): nearly-expired entries
    /// go first, then whatever is next in line.
    fn evict_over_capacity(
        entries: &mut HashMap<CacheKey, CacheEntry>,
        max: usize,
        now: DateTime<Utc>,
    ) -> usize {
        if entries.len() <= max {
            return 0;
        }
        let to_drop = entries.len() - max;

        let mut candidates: Vec<(DateTime<Utc>, CacheKey)> = entries
            .iter()
            .map(|(key, entry)| (entry.expires_at, *key))
            .collect();
        candidates.sort_unstable();

        let grace_cutoff = now + Duration::seconds(NEARLY_EXPIRED_GRACE_SECS);
        let mut nearly_expired = 0;
        let mut forced = 0;
        for (deadline, key) in candidates.into_iter().take(to_drop) {
            entries.remove(&key);
            if deadline <= grace_cutoff {
                nearly_expired += 1;
            } else {
                forced += 1;
            }
        }

        info!(
            nearly_expired,
            forced,
            max_entries = max,
            "JWT cache over capacity, evicted entries"
        );

        nearly_expired + forced
    }
}

impl Drop for JwtCache {
    fn drop(&mut self) {
        self.stop_janitor();
    }
}
