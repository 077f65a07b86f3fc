// Process-wide response deduplication
//
// The host proxy delivers post-call callbacks at-least-once, and more than
// one guardrail instance may observe what is logically the same callback.
// A single `ResponseDedup` is therefore constructed by the embedder and
// shared across instances via `Arc`, instead of living in ambient global
// state. Capacity-bounded: eviction can readmit very old duplicates, which
// is the accepted trade against unbounded growth.

use moka::sync::Cache;

/// Default number of dedup keys kept live
pub const DEFAULT_CAPACITY: u64 = 10_000;

/// Bounded set of already-seen response identities and content fingerprints
pub struct ResponseDedup {
    seen: Cache<String, ()>,
}

impl ResponseDedup {
    pub fn new(capacity: u64) -> Self {
        Self {
            seen: Cache::builder().max_capacity(capacity).build(),
        }
    }

    /// Record `key` as seen. Returns true on first sight, false if the key
    /// was already present. The check-and-insert is atomic, so two
    /// concurrent deliveries of the same key cannot both observe "fresh".
    pub fn check_and_insert(&self, key: &str) -> bool {
        self.seen.entry(key.to_string()).or_insert(()).is_fresh()
    }

    /// Whether `key` has been seen, without recording it
    pub fn contains(&self, key: &str) -> bool {
        self.seen.contains_key(key)
    }
}

impl Default for ResponseDedup {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
