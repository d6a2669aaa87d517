//! Periodic pruning of expired entries within the store document
//!
//! Runs at the head of a scheduled tick, at most once per interval. The sweep
//! is safe to cut short: deleting an expired entry is idempotent, and
//! whatever survives is picked up next time.

use serde_json::Value;

use super::{keys, CacheTtl, Store};

/// Minimum gap between sweeps
pub const CLEANUP_INTERVAL_SECS: i64 = 6 * 60 * 60; // 6 h

/// TTL for a cache-bearing key, classified by prefix. Keys outside the cache
/// namespace (watchlist, job, partials, markers) return `None` and are never
/// swept by age.
fn ttl_for_key(key: &str) -> Option<i64> {
    if key.starts_with("member:") {
        Some(CacheTtl::MEMBER)
    } else if key.starts_with("rating:") {
        Some(CacheTtl::RATING)
    } else if key.starts_with("division:") {
        Some(CacheTtl::DIVISION)
    } else if key.starts_with("membermeta:") {
        Some(CacheTtl::MEMBER_META)
    } else if key.starts_with("audit:visiting:") || key.starts_with("audit:local:") {
        Some(CacheTtl::AUDIT_ARCHIVE)
    } else {
        None
    }
}

fn is_expired(key: &str, entry: &Value, now: i64) -> bool {
    if let Some(expires) = entry.get("expiresAt").and_then(Value::as_i64) {
        return expires < now;
    }
    if let Some(ttl) = ttl_for_key(key) {
        if let Some(cached_at) = entry.get("cached_at").and_then(Value::as_i64) {
            // Entries linger for a grace period beyond their read TTL so a
            // stale-but-present value can still seed a refresh comparison
            return cached_at + 2 * ttl < now;
        }
    }
    false
}

/// Sweep expired entries if the interval has elapsed. Returns the number of
/// entries removed (0 when the sweep was skipped).
pub fn run_cleanup(store: &mut Store, now: i64) -> usize {
    let last = store
        .get(keys::LAST_CLEANUP)
        .and_then(Value::as_i64)
        .unwrap_or(0);
    if now - last < CLEANUP_INTERVAL_SECS {
        return 0;
    }

    let mut removed = 0;
    for key in store.keys() {
        let expired = store
            .get(&key)
            .map(|entry| is_expired(&key, entry, now))
            .unwrap_or(false);
        if expired {
            store.del(&key);
            removed += 1;
        }
    }

    store.set(keys::LAST_CLEANUP, Value::from(now));
    if removed > 0 {
        log::info!("cleanup removed {} expired entries", removed);
    }
    removed
}
