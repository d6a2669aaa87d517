//! Progress-event throttle
//!
//! Externally observable progress (the `audit:progress` entry polled by the
//! dashboard, and its log line) is rationed: at most a fixed number of events
//! per tick, with a minimum gap between them. Events past the cap or inside
//! the gap are coalesced into the next eligible one; the cursor itself is
//! never throttled.

use tokio::time::Instant;

use super::AuditJob;
use crate::store::Store;

/// Observable progress events allowed per tick
pub const MAX_PROG_EDITS_PER_TICK: usize = 15;

/// Minimum spacing between observable progress events
pub const PROG_EDIT_MIN_GAP_MS: u64 = 600;

/// Store key for the externally polled progress entry
pub const PROGRESS_KEY: &str = "audit:progress";

pub struct ProgressThrottle {
    emitted: usize,
    last_emit: Option<Instant>,
}

impl ProgressThrottle {
    pub fn new() -> Self {
        Self {
            emitted: 0,
            last_emit: None,
        }
    }

    pub fn events_emitted(&self) -> usize {
        self.emitted
    }

    /// Surface progress if the throttle allows it.
    pub fn emit(&mut self, store: &mut Store, job: &AuditJob, now: i64) -> bool {
        if self.emitted >= MAX_PROG_EDITS_PER_TICK {
            return false;
        }
        if let Some(last) = self.last_emit {
            if last.elapsed() < std::time::Duration::from_millis(PROG_EDIT_MIN_GAP_MS) {
                return false;
            }
        }

        self.emitted += 1;
        self.last_emit = Some(Instant::now());

        store.set(
            PROGRESS_KEY,
            serde_json::json!({
                "scope": job.scope.as_str(),
                "cursor": job.cursor,
                "total": job.total,
                "percent": job.progress_percent(),
                "updated_at": now,
            }),
        );
        log::info!(
            "audit {} progress {}/{} ({}%)",
            job.scope,
            job.cursor,
            job.total,
            job.progress_percent()
        );
        true
    }
}

impl Default for ProgressThrottle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::Scope;
    use crate::store::mock::MemoryContentStore;
    use std::sync::Arc;
    use std::time::Duration;

    async fn store() -> Store {
        let mut s = Store::new(Arc::new(MemoryContentStore::new()));
        s.load().await.unwrap();
        s
    }

    fn job(cursor: usize) -> AuditJob {
        let mut j = AuditJob::new(
            Scope::Visiting,
            (100..150).map(|n| n.to_string()).collect(),
            0,
        );
        j.cursor = cursor;
        j
    }

    #[tokio::test(start_paused = true)]
    async fn test_min_gap_coalesces_events() {
        let mut s = store().await;
        let mut throttle = ProgressThrottle::new();

        assert!(throttle.emit(&mut s, &job(10), 1_000));
        // Immediately again: inside the gap
        assert!(!throttle.emit(&mut s, &job(20), 1_000));

        tokio::time::advance(Duration::from_millis(PROG_EDIT_MIN_GAP_MS + 1)).await;
        assert!(throttle.emit(&mut s, &job(20), 1_001));
        assert_eq!(throttle.events_emitted(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_tick_cap() {
        let mut s = store().await;
        let mut throttle = ProgressThrottle::new();

        for i in 0..MAX_PROG_EDITS_PER_TICK {
            tokio::time::advance(Duration::from_millis(PROG_EDIT_MIN_GAP_MS + 1)).await;
            assert!(throttle.emit(&mut s, &job(i), 1_000), "event {} refused", i);
        }

        tokio::time::advance(Duration::from_millis(PROG_EDIT_MIN_GAP_MS + 1)).await;
        assert!(!throttle.emit(&mut s, &job(49), 1_000));
        assert_eq!(throttle.events_emitted(), MAX_PROG_EDITS_PER_TICK);
    }

    #[tokio::test(start_paused = true)]
    async fn test_emit_writes_progress_entry() {
        let mut s = store().await;
        let mut throttle = ProgressThrottle::new();

        throttle.emit(&mut s, &job(20), 1_234);
        let entry = s.get(PROGRESS_KEY).unwrap();
        assert_eq!(entry["cursor"], 20);
        assert_eq!(entry["total"], 50);
        assert_eq!(entry["percent"], 40);
        assert_eq!(entry["updated_at"], 1_234);
    }
}
