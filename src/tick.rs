//! Scheduled tick orchestration
//!
//! One tick = one short-lived invocation: load the store, sweep expired
//! cache entries, sync presence, advance the audit job, and check the
//! quarterly trigger, all against a single shared budget. Errors are logged
//! and swallowed; the next tick recomputes from the last flushed state.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::audit::engine::{run_audit_tick, EngineReport};
use crate::audit::progress::ProgressThrottle;
use crate::audit::quarterly::{run_quarterly, QuarterlyOutcome};
use crate::client::budget::{BudgetedClient, TickBudget};
use crate::client::NetworkApi;
use crate::presence::{run_presence, PresenceReport};
use crate::store::cleanup::run_cleanup;
use crate::store::{ContentStore, Store};

/// Nominal spacing between scheduled ticks
pub const TICK_INTERVAL_SECS: u64 = 5 * 60;

/// Summary of one scheduled invocation
#[derive(Debug, Default)]
pub struct TickReport {
    /// Store could not be loaded; nothing ran
    pub aborted: bool,
    pub cleaned: usize,
    pub presence: Option<PresenceReport>,
    pub engine: Option<EngineReport>,
    pub quarterly_enqueued: bool,
    pub flushes_failed: usize,
}

/// Run one scheduled tick at `now`.
pub async fn run_scheduled_tick(
    transport: Arc<dyn ContentStore>,
    network: &dyn NetworkApi,
    now: DateTime<Utc>,
) -> TickReport {
    let mut report = TickReport::default();
    let budget = TickBudget::new();
    let client = BudgetedClient::new(network, &budget);

    let mut store = Store::new(transport);
    if let Err(e) = store.load().await {
        // No state was touched; the next tick starts clean
        log::error!("tick aborted, store load failed: {}", e);
        report.aborted = true;
        return report;
    }

    let now_s = now.timestamp();
    report.cleaned = run_cleanup(&mut store, now_s);

    let presence = run_presence(&mut store, &client, now_s).await;
    if presence.skipped {
        log::debug!("presence skipped: live feed unavailable this tick");
    }
    if presence.came_online > 0 || presence.went_offline > 0 {
        log::info!(
            "presence: {} came online, {} went offline",
            presence.came_online,
            presence.went_offline
        );
    }
    report.presence = Some(presence);
    flush_logged(&mut store, "presence sync", &mut report).await;

    let mut progress = ProgressThrottle::new();
    let engine = run_audit_tick(&mut store, &client, &mut progress, now).await;
    let engine_flushed = flush_logged(&mut store, "audit tick", &mut report).await;
    if !engine_flushed && engine.processed > 0 {
        log::warn!(
            "audit progress for {} controllers discarded by failed flush",
            engine.processed
        );
    }
    report.engine = Some(engine);

    let quarterly = run_quarterly(&mut store, now);
    report.quarterly_enqueued = quarterly == QuarterlyOutcome::Enqueued;
    flush_logged(&mut store, "quarterly audit enqueue", &mut report).await;

    log::debug!(
        "tick done: cleaned={} engine_stop={:?} quarterly={} subreqs={}",
        report.cleaned,
        report.engine.as_ref().map(|e| e.stop),
        report.quarterly_enqueued,
        budget.used()
    );
    report
}

/// Flush with the scheduled-path policy: conflicts and transport failures are
/// logged, never propagated. Returns whether the dirty state (if any) made it
/// to the store.
async fn flush_logged(store: &mut Store, message: &str, report: &mut TickReport) -> bool {
    match store.flush(message).await {
        Ok(_) => true,
        Err(e) => {
            log::error!("flush '{}' failed: {}", message, e);
            report.flushes_failed += 1;
            false
        }
    }
}

/// Long-running tick loop for `serve` mode.
pub async fn tick_loop(transport: Arc<dyn ContentStore>, network: Arc<dyn NetworkApi>) {
    let mut interval =
        tokio::time::interval(std::time::Duration::from_secs(TICK_INTERVAL_SECS));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        let report = run_scheduled_tick(transport.clone(), network.as_ref(), Utc::now()).await;
        if report.aborted {
            log::warn!("scheduled tick aborted; retrying on next interval");
        }
    }
}
