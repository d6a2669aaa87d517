//! Tick-driven audit engine
//!
//! Advances the active job through its frozen CID list in slices, computing a
//! verdict per controller and persisting partial results as it goes. The
//! engine never throws out of a tick: budget and deadline exhaustion are
//! ordinary stop reasons, and a controller whose activity cannot be fetched
//! is recorded as incomplete and left for the next sweep.

use chrono::{DateTime, Months, Utc};
use serde_json::json;

use super::progress::{ProgressThrottle, PROGRESS_KEY};
use super::{
    clear_job, load_job, load_partials, save_job, save_partials, upsert_partial, AuditJob,
    PartialResult, Scope, BLOCK_SIZE, FLAG_COOLDOWN_SECS, S1_EXEMPT_DAYS, S1_RATING, SLICE_SIZE,
};
use crate::client::budget::BudgetedClient;
use crate::store::{keys, CacheTtl, Store};

/// Estimated outbound calls per controller in a slice (existence and profile
/// usually come from cache; sessions rarely do)
const CALLS_PER_CID_ESTIMATE: u32 = 2;

/// Why the engine stopped this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    NoJob,
    Finished,
    BlockLimit,
    BudgetExhausted,
    DeadlineReached,
}

/// Outcome of one engine tick
#[derive(Debug)]
pub struct EngineReport {
    pub processed: usize,
    pub slices: usize,
    pub cursor: usize,
    pub total: usize,
    pub stop: StopReason,
}

impl EngineReport {
    fn idle(stop: StopReason) -> Self {
        Self {
            processed: 0,
            slices: 0,
            cursor: 0,
            total: 0,
            stop,
        }
    }
}

/// Advance the active job by at most one block, within budget.
pub async fn run_audit_tick(
    store: &mut Store,
    client: &BudgetedClient<'_>,
    progress: &mut ProgressThrottle,
    now: DateTime<Utc>,
) -> EngineReport {
    let Some(mut job) = load_job(store) else {
        return EngineReport::idle(StopReason::NoJob);
    };

    if job.is_complete() {
        finalize(store, &job, now.timestamp());
        return EngineReport {
            processed: 0,
            slices: 0,
            cursor: job.cursor,
            total: job.total,
            stop: StopReason::Finished,
        };
    }

    let mut partials = load_partials(store, job.scope);
    let mut processed = 0;
    let mut slices = 0;

    let stop = loop {
        if job.is_complete() {
            finalize(store, &job, now.timestamp());
            break StopReason::Finished;
        }
        if slices >= BLOCK_SIZE {
            break StopReason::BlockLimit;
        }
        if client.budget().expired() {
            break StopReason::DeadlineReached;
        }

        let end = (job.cursor + SLICE_SIZE).min(job.total);
        let slice: Vec<String> = job.cids[job.cursor..end].to_vec();
        if !client
            .budget()
            .has_room_for(slice.len() as u32 * CALLS_PER_CID_ESTIMATE)
        {
            break StopReason::BudgetExhausted;
        }

        for cid in &slice {
            let verdict = audit_controller(store, client, job.scope, cid, now).await;
            maybe_notify_flagged(store, &verdict, now.timestamp());
            upsert_partial(&mut partials, verdict);
            processed += 1;
        }

        job.cursor = end;
        slices += 1;
        save_job(store, &job);
        save_partials(store, job.scope, &partials);
        progress.emit(store, &job, now.timestamp());
    };

    EngineReport {
        processed,
        slices,
        cursor: job.cursor,
        total: job.total,
        stop,
    }
}

/// Compute the verdict for one controller, reading through the lookup caches.
async fn audit_controller(
    store: &mut Store,
    client: &BudgetedClient<'_>,
    scope: Scope,
    cid: &str,
    now: DateTime<Utc>,
) -> PartialResult {
    let now_s = now.timestamp();

    let Some(exists) = member_exists_cached(store, client, cid, now_s).await else {
        return PartialResult::incomplete(cid, now_s);
    };
    if !exists {
        return PartialResult::missing(cid, now_s);
    }

    let Some((rating, reg_date)) = rating_cached(store, client, cid, now_s).await else {
        return PartialResult::incomplete(cid, now_s);
    };
    if rating == S1_RATING && within_exempt_window(reg_date.as_deref(), now) {
        return PartialResult::exempt(cid, now_s);
    }

    let window_start = now
        .checked_sub_months(Months::new(scope.lookback_months()))
        .unwrap_or(now)
        .date_naive();
    let Some(sessions) = client.atc_sessions(cid, window_start).await else {
        return PartialResult::incomplete(cid, now_s);
    };

    let hours: f64 = sessions.iter().map(|s| s.minutes()).sum::<f64>() / 60.0;
    let last_session = sessions
        .iter()
        .filter_map(|s| s.end.clone().or_else(|| Some(s.start.clone())))
        .max();

    PartialResult {
        cid: cid.to_string(),
        hours,
        flagged: hours < scope.required_hours(),
        exempt: false,
        missing: false,
        incomplete: false,
        last_session,
        computed_at: now_s,
    }
}

async fn member_exists_cached(
    store: &mut Store,
    client: &BudgetedClient<'_>,
    cid: &str,
    now_s: i64,
) -> Option<bool> {
    let key = keys::member(cid);
    if let Some(entry) = store.cache_get(&key, CacheTtl::MEMBER, now_s) {
        return entry.get("exists").and_then(serde_json::Value::as_bool);
    }
    let exists = client.member_exists(cid).await?;
    store.cache_put(&key, json!({ "exists": exists }), now_s);
    Some(exists)
}

/// Rating plus registration date, from cache or one profile fetch. The fetch
/// also warms the division and profile caches consumed by the API layer.
async fn rating_cached(
    store: &mut Store,
    client: &BudgetedClient<'_>,
    cid: &str,
    now_s: i64,
) -> Option<(i32, Option<String>)> {
    let rating_key = keys::rating(cid);
    if let Some(entry) = store.cache_get(&rating_key, CacheTtl::RATING, now_s) {
        let rating = entry.get("rating").and_then(serde_json::Value::as_i64)? as i32;
        let reg_date = store
            .cache_get(&keys::membermeta(cid), CacheTtl::MEMBER_META, now_s)
            .and_then(|m| m.get("reg_date"))
            .and_then(serde_json::Value::as_str)
            .map(String::from);
        return Some((rating, reg_date));
    }

    let profile = client.member_profile(cid).await?;
    let Some(profile) = profile else {
        // Exists but carries no rating record; never exempt
        return Some((0, None));
    };

    store.cache_put(&rating_key, json!({ "rating": profile.rating }), now_s);
    store.cache_put(
        &keys::membermeta(cid),
        json!({ "name": profile.name, "reg_date": profile.reg_date }),
        now_s,
    );
    if let Some(division) = &profile.division {
        store.cache_put(&keys::division(cid), json!({ "value": division }), now_s);
    }
    Some((profile.rating, profile.reg_date))
}

/// S1 controllers get a grace period from their registration date.
fn within_exempt_window(reg_date: Option<&str>, now: DateTime<Utc>) -> bool {
    let Some(raw) = reg_date else {
        return false;
    };
    let Some(registered) = parse_timestamp(raw) else {
        return false;
    };
    (now - registered).num_days() < S1_EXEMPT_DAYS
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(parsed.and_utc());
    }
    if let Ok(parsed) = chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(parsed.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}

/// Emit a below-hours alert, debounced per CID.
fn maybe_notify_flagged(store: &mut Store, verdict: &PartialResult, now_s: i64) {
    if !verdict.flagged {
        return;
    }
    let key = keys::cooldown_flag(&verdict.cid);
    if store.cooldown_active(&key, now_s) {
        return;
    }
    store.arm_cooldown(&key, now_s, FLAG_COOLDOWN_SECS);
    log::warn!(
        "controller {} below activity requirement: {:.1} h logged",
        verdict.cid,
        verdict.hours
    );
}

/// Archive the finished sweep's verdicts and clear the job.
fn finalize(store: &mut Store, job: &AuditJob, now_s: i64) {
    let partials = load_partials(store, job.scope);
    for partial in &partials {
        match serde_json::to_value(partial) {
            Ok(value) => {
                store.cache_put(&keys::audit_archive(job.scope.as_str(), &partial.cid), value, now_s);
            }
            Err(e) => log::error!("failed to archive verdict for {}: {}", partial.cid, e),
        }
    }
    clear_job(store);
    store.del(PROGRESS_KEY);
    log::info!(
        "audit {} complete: {} controllers, {} flagged",
        job.scope,
        partials.len(),
        partials.iter().filter(|p| p.flagged).count()
    );
}
