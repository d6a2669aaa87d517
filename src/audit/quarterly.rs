//! Quarterly auto-scheduling of the visiting-scope audit
//!
//! At a quarter-start instant (00:xx UTC on 1 Jan / 1 Apr / 1 Jul / 1 Oct)
//! the trigger enqueues a visiting sweep over the current watchlist, once per
//! quarter. The idempotency marker is checked before anything is written, so
//! every tick within the hour after the first one is a no-op.

use chrono::{DateTime, Datelike, Timelike, Utc};

use super::{clear_partials, load_job, save_job, AuditJob, Scope};
use crate::store::{keys, Store};

/// Whether `now` falls inside a quarter-start instant.
pub fn is_quarter_start(now: DateTime<Utc>) -> bool {
    matches!(now.month(), 1 | 4 | 7 | 10) && now.day() == 1 && now.hour() == 0
}

/// Key of the quarter that ends at the given quarter-start instant,
/// e.g. 2025-04-01T00:xxZ -> "2025Q1".
pub fn previous_quarter_key(now: DateTime<Utc>) -> String {
    match now.month() {
        1 => format!("{}Q4", now.year() - 1),
        4 => format!("{}Q1", now.year()),
        7 => format!("{}Q2", now.year()),
        _ => format!("{}Q3", now.year()),
    }
}

/// Outcome of the quarterly check
#[derive(Debug, PartialEq, Eq)]
pub enum QuarterlyOutcome {
    NotDue,
    AlreadyRan,
    /// A job was still active at the quarter boundary; retried next tick
    Deferred,
    Enqueued,
}

/// Enqueue the quarterly visiting audit if this instant calls for one.
pub fn run_quarterly(store: &mut Store, now: DateTime<Utc>) -> QuarterlyOutcome {
    if !is_quarter_start(now) {
        return QuarterlyOutcome::NotDue;
    }

    let marker_key = keys::quarter_auto(&previous_quarter_key(now));
    if store.get(&marker_key).is_some() {
        return QuarterlyOutcome::AlreadyRan;
    }

    // A sweep still in flight keeps the single-job invariant; the marker is
    // left unset so the next tick inside the instant retries.
    if load_job(store).is_some() {
        log::warn!("quarterly audit due but a job is active, deferring");
        return QuarterlyOutcome::Deferred;
    }

    let watchlist: Vec<String> = store.get_as(keys::WATCHLIST).unwrap_or_default();
    let job = AuditJob::new(Scope::Visiting, watchlist, now.timestamp());
    log::info!(
        "quarterly visiting audit enqueued for {} controllers",
        job.total
    );

    clear_partials(store, Scope::Visiting);
    save_job(store, &job);
    store.set(
        &marker_key,
        serde_json::json!({ "done": true, "at": now.timestamp() }),
    );
    QuarterlyOutcome::Enqueued
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::mock::MemoryContentStore;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::Arc;

    async fn store_with_watchlist(cids: &[&str]) -> Store {
        let mut store = Store::new(Arc::new(MemoryContentStore::new()));
        store.load().await.unwrap();
        store.set(keys::WATCHLIST, json!(cids));
        store
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_quarter_start_detection() {
        assert!(is_quarter_start(at(2025, 4, 1, 0, 0)));
        assert!(is_quarter_start(at(2025, 4, 1, 0, 55)));
        assert!(is_quarter_start(at(2026, 1, 1, 0, 5)));

        assert!(!is_quarter_start(at(2025, 4, 1, 1, 0)));
        assert!(!is_quarter_start(at(2025, 4, 2, 0, 0)));
        assert!(!is_quarter_start(at(2025, 5, 1, 0, 0)));
    }

    #[test]
    fn test_previous_quarter_key() {
        assert_eq!(previous_quarter_key(at(2025, 4, 1, 0, 0)), "2025Q1");
        assert_eq!(previous_quarter_key(at(2025, 7, 1, 0, 0)), "2025Q2");
        assert_eq!(previous_quarter_key(at(2025, 10, 1, 0, 0)), "2025Q3");
        assert_eq!(previous_quarter_key(at(2026, 1, 1, 0, 0)), "2025Q4");
    }

    #[tokio::test]
    async fn test_enqueue_at_quarter_start() {
        let mut store = store_with_watchlist(&["1234567", "999999"]).await;

        let outcome = run_quarterly(&mut store, at(2025, 4, 1, 0, 0));
        assert_eq!(outcome, QuarterlyOutcome::Enqueued);

        let job = load_job(&store).unwrap();
        assert_eq!(job.scope, Scope::Visiting);
        assert_eq!(job.total, 2);
        assert_eq!(job.cursor, 0);
        assert!(store.get("quarter:auto:2025Q1").is_some());
    }

    #[tokio::test]
    async fn test_at_most_once_per_quarter() {
        let mut store = store_with_watchlist(&["1234567"]).await;

        assert_eq!(
            run_quarterly(&mut store, at(2025, 4, 1, 0, 0)),
            QuarterlyOutcome::Enqueued
        );
        // Later ticks within the same instant
        assert_eq!(
            run_quarterly(&mut store, at(2025, 4, 1, 0, 5)),
            QuarterlyOutcome::AlreadyRan
        );
        assert_eq!(
            run_quarterly(&mut store, at(2025, 4, 1, 0, 55)),
            QuarterlyOutcome::AlreadyRan
        );
    }

    #[tokio::test]
    async fn test_outside_quarter_start_is_noop() {
        let mut store = store_with_watchlist(&["1234567"]).await;
        assert_eq!(
            run_quarterly(&mut store, at(2025, 3, 31, 23, 55)),
            QuarterlyOutcome::NotDue
        );
        assert!(load_job(&store).is_none());
    }

    #[tokio::test]
    async fn test_active_job_defers_without_marker() {
        let mut store = store_with_watchlist(&["1234567"]).await;
        save_job(
            &mut store,
            &AuditJob::new(Scope::Local, vec!["555555".to_string()], 0),
        );

        let outcome = run_quarterly(&mut store, at(2025, 7, 1, 0, 0));
        assert_eq!(outcome, QuarterlyOutcome::Deferred);
        // Marker unset so a later tick can still fire
        assert!(store.get("quarter:auto:2025Q2").is_none());
        // The active job was not replaced
        assert_eq!(load_job(&store).unwrap().scope, Scope::Local);
    }

    #[tokio::test]
    async fn test_enqueue_clears_stale_partials() {
        let mut store = store_with_watchlist(&["1234567"]).await;
        store.set("audit:partial:visiting", json!([{"cid": "old", "computed_at": 1}]));

        run_quarterly(&mut store, at(2025, 10, 1, 0, 30));
        assert!(store.get("audit:partial:visiting").is_none());
    }
}
