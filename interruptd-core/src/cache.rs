//! Unavailable offerings cache
//!
//! Process-wide record of (capacity type, instance type, zone) offerings that
//! recently lost capacity. Shared by every interruption handler and by the
//! scheduling side, which skips offerings marked here until the entry expires.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// Default time an offering stays unavailable
pub const DEFAULT_UNAVAILABLE_OFFERINGS_TTL: Duration = Duration::from_secs(3 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct OfferingKey {
    capacity_type: String,
    instance_type: String,
    zone: String,
}

impl OfferingKey {
    fn new(instance_type: &str, zone: &str, capacity_type: &str) -> Self {
        Self {
            capacity_type: capacity_type.to_string(),
            instance_type: instance_type.to_string(),
            zone: zone.to_string(),
        }
    }
}

/// Concurrent TTL cache of unavailable offerings
pub struct UnavailableOfferings {
    entries: RwLock<HashMap<OfferingKey, Instant>>,
    ttl: Duration,
    seq_num: AtomicU64,
}

impl UnavailableOfferings {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_UNAVAILABLE_OFFERINGS_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            seq_num: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Incremented on every change, lets readers detect staleness cheaply
    pub fn seq_num(&self) -> u64 {
        self.seq_num.load(Ordering::SeqCst)
    }

    /// Mark an offering unavailable for the cache TTL. Best effort.
    pub fn mark_unavailable(
        &self,
        reason: &str,
        instance_type: &str,
        zone: &str,
        capacity_type: &str,
    ) {
        debug!(
            reason = reason,
            instance_type = instance_type,
            zone = zone,
            capacity_type = capacity_type,
            ttl = %humantime::format_duration(self.ttl),
            "Removing offering from offerings"
        );

        let expires_at = Instant::now() + self.ttl;
        match self.entries.write() {
            Ok(mut entries) => {
                entries.insert(OfferingKey::new(instance_type, zone, capacity_type), expires_at);
                self.seq_num.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => {
                warn!(error = %e, "Failed to mark offering unavailable");
            }
        }
    }

    /// Whether an offering is currently marked unavailable
    pub fn is_unavailable(&self, instance_type: &str, zone: &str, capacity_type: &str) -> bool {
        let key = OfferingKey::new(instance_type, zone, capacity_type);
        self.entries
            .read()
            .map(|entries| {
                entries
                    .get(&key)
                    .map_or(false, |expires_at| *expires_at > Instant::now())
            })
            .unwrap_or(false)
    }

    /// Make an offering available again
    pub fn delete(&self, instance_type: &str, zone: &str, capacity_type: &str) {
        let key = OfferingKey::new(instance_type, zone, capacity_type);
        if let Ok(mut entries) = self.entries.write() {
            if entries.remove(&key).is_some() {
                self.seq_num.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    /// Drop expired entries, returning how many were removed
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let Ok(mut entries) = self.entries.write() else {
            return 0;
        };
        let before = entries.len();
        entries.retain(|_, expires_at| *expires_at > now);
        let removed = before - entries.len();
        if removed > 0 {
            self.seq_num.fetch_add(1, Ordering::SeqCst);
        }
        removed
    }

    /// Number of entries, including expired ones not yet evicted
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for UnavailableOfferings {
    fn default() -> Self {
        Self::new()
    }
}
