//! Audit job model
//!
//! A job is one scoped sweep over a frozen CID list. Progress is purely
//! cursor-based: the engine advances the cursor in slices, persisting the
//! latest verdict per controller as it goes, and the job is cleared once the
//! cursor reaches the end.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::cid::cid_sort_key;
use crate::store::{keys, Store};

pub mod engine;
pub mod progress;
pub mod quarterly;

/// Controllers per slice
pub const SLICE_SIZE: usize = 10;

/// Slices per tick
pub const BLOCK_SIZE: usize = 4;

/// S1 rating value on the network
pub const S1_RATING: i32 = 2;

/// Grace period for newly rated S1 controllers
pub const S1_EXEMPT_DAYS: i64 = 90;

/// Debounce window for below-hours alerts, per CID
pub const FLAG_COOLDOWN_SECS: i64 = 24 * 60 * 60;

/// Audit scope, selecting the activity threshold and result bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Visiting,
    Local,
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Visiting => "visiting",
            Scope::Local => "local",
        }
    }

    /// Controlling hours required within the lookback window
    pub fn required_hours(self) -> f64 {
        match self {
            Scope::Visiting => 10.0,
            Scope::Local => 15.0,
        }
    }

    /// Rolling window the hours are counted over
    pub fn lookback_months(self) -> u32 {
        match self {
            Scope::Visiting => 3,
            Scope::Local => 3,
        }
    }
}

impl FromStr for Scope {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "visiting" => Ok(Scope::Visiting),
            "local" => Ok(Scope::Local),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single active audit job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditJob {
    pub scope: Scope,

    /// Frozen CID list, ascending; slice progress is the sole mutation
    pub cids: Vec<String>,

    /// Next unprocessed index, `0 ≤ cursor ≤ total`
    pub cursor: usize,

    /// Always `cids.len()`; persisted for observability
    pub total: usize,

    pub created_at: i64,
}

impl AuditJob {
    pub fn new(scope: Scope, mut cids: Vec<String>, created_at: i64) -> Self {
        cids.sort_by_key(|c| cid_sort_key(c));
        cids.dedup();
        let total = cids.len();
        Self {
            scope,
            cids,
            cursor: 0,
            total,
            created_at,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.cursor >= self.total
    }

    pub fn progress_percent(&self) -> u32 {
        if self.total == 0 {
            return 100;
        }
        (self.cursor * 100 / self.total) as u32
    }

    /// Ticks left at the full per-tick throughput of one block
    pub fn ticks_remaining(&self) -> usize {
        let per_tick = SLICE_SIZE * BLOCK_SIZE;
        self.total.saturating_sub(self.cursor).div_ceil(per_tick)
    }
}

/// The latest audit verdict for one controller within a scope
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PartialResult {
    pub cid: String,

    pub hours: f64,

    pub flagged: bool,

    /// S1 within the new-controller grace period; hours were not counted
    #[serde(default, skip_serializing_if = "is_false")]
    pub exempt: bool,

    /// Member does not exist on the network
    #[serde(default, skip_serializing_if = "is_false")]
    pub missing: bool,

    /// Activity could not be fetched this sweep; re-evaluated next quarter
    #[serde(default, skip_serializing_if = "is_false")]
    pub incomplete: bool,

    /// End of the most recent session in the window, ISO 8601
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_session: Option<String>,

    pub computed_at: i64,
}

fn is_false(b: &bool) -> bool {
    !b
}

impl PartialResult {
    pub fn incomplete(cid: &str, computed_at: i64) -> Self {
        Self {
            cid: cid.to_string(),
            hours: 0.0,
            flagged: false,
            exempt: false,
            missing: false,
            incomplete: true,
            last_session: None,
            computed_at,
        }
    }

    pub fn missing(cid: &str, computed_at: i64) -> Self {
        Self {
            missing: true,
            incomplete: false,
            ..Self::incomplete(cid, computed_at)
        }
    }

    pub fn exempt(cid: &str, computed_at: i64) -> Self {
        Self {
            exempt: true,
            incomplete: false,
            ..Self::incomplete(cid, computed_at)
        }
    }
}

/// Read the active job, if any.
pub fn load_job(store: &Store) -> Option<AuditJob> {
    store.get_as(keys::AUDIT_JOB)
}

pub fn save_job(store: &mut Store, job: &AuditJob) {
    store.set_as(keys::AUDIT_JOB, job);
}

pub fn clear_job(store: &mut Store) {
    store.del(keys::AUDIT_JOB);
}

pub fn load_partials(store: &Store, scope: Scope) -> Vec<PartialResult> {
    store
        .get_as(&keys::audit_partial(scope.as_str()))
        .unwrap_or_default()
}

pub fn save_partials(store: &mut Store, scope: Scope, partials: &[PartialResult]) {
    store.set_as(&keys::audit_partial(scope.as_str()), &partials);
}

pub fn clear_partials(store: &mut Store, scope: Scope) {
    store.del(&keys::audit_partial(scope.as_str()));
}

/// Upsert a verdict, keyed by CID. A stale verdict never overwrites a newer
/// one. Returns whether the list changed.
pub fn upsert_partial(partials: &mut Vec<PartialResult>, verdict: PartialResult) -> bool {
    match partials.iter_mut().find(|p| p.cid == verdict.cid) {
        Some(existing) => {
            if existing.computed_at > verdict.computed_at {
                return false;
            }
            *existing = verdict;
            true
        }
        None => {
            partials.push(verdict);
            true
        }
    }
}
