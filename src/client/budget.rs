//! Per-tick budget accounting for outbound calls
//!
//! A scheduled invocation runs inside a short-lived context with hard limits
//! on wall clock and outbound call count. Every data-plane call goes through
//! [`BudgetedClient`], which acquires from the shared [`TickBudget`]
//! pre-flight and converts refusals and transient failures into `None`: a
//! miss this tick, retried by a later one.

use std::sync::atomic::{AtomicU32, Ordering};

use chrono::NaiveDate;
use tokio::time::Instant;

use super::{AtcSession, MemberProfile, NetworkApi, OnlineController};
use crate::error::FetchError;

/// Outbound-call quota for one scheduled invocation
pub const SUBREQ_BUDGET_PER_TICK: u32 = 120;

/// Wall-clock budget for one scheduled invocation
pub const MAX_TICK_MS: u64 = 12_000;

/// Call and wall-clock budget for one tick
pub struct TickBudget {
    deadline: Instant,
    cap: u32,
    used: AtomicU32,
}

impl TickBudget {
    pub fn new() -> Self {
        Self::with_limits(SUBREQ_BUDGET_PER_TICK, MAX_TICK_MS)
    }

    pub fn with_limits(cap: u32, max_ms: u64) -> Self {
        Self {
            deadline: Instant::now() + std::time::Duration::from_millis(max_ms),
            cap,
            used: AtomicU32::new(0),
        }
    }

    /// Reserve one outbound call. Refuses once the cap is reached or the
    /// deadline has passed; a refused call must not be launched.
    pub fn try_acquire(&self) -> bool {
        if self.expired() {
            return false;
        }
        // Optimistically take a slot, give it back on overflow
        let prior = self.used.fetch_add(1, Ordering::SeqCst);
        if prior >= self.cap {
            self.used.fetch_sub(1, Ordering::SeqCst);
            return false;
        }
        true
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    pub fn used(&self) -> u32 {
        self.used.load(Ordering::SeqCst).min(self.cap)
    }

    pub fn remaining(&self) -> u32 {
        self.cap.saturating_sub(self.used())
    }

    /// Whether `calls` more outbound calls fit in the budget. Used to decide
    /// if a whole slice is worth starting.
    pub fn has_room_for(&self, calls: u32) -> bool {
        !self.expired() && self.remaining() >= calls
    }
}

impl Default for TickBudget {
    fn default() -> Self {
        Self::new()
    }
}

/// Network client bound to a tick budget
///
/// Every accessor returns `Option`: `None` uniformly covers budget refusal
/// and transient fetch failure, and callers treat both as "no data this
/// tick".
pub struct BudgetedClient<'a> {
    api: &'a dyn NetworkApi,
    budget: &'a TickBudget,
}

impl<'a> BudgetedClient<'a> {
    pub fn new(api: &'a dyn NetworkApi, budget: &'a TickBudget) -> Self {
        Self { api, budget }
    }

    pub fn budget(&self) -> &TickBudget {
        self.budget
    }

    fn miss<T>(&self, what: &str, err: &FetchError) -> Option<T> {
        log::warn!("{} unavailable this tick: {}", what, err);
        None
    }

    pub async fn online_controllers(&self) -> Option<Vec<OnlineController>> {
        if !self.budget.try_acquire() {
            return None;
        }
        match self.api.online_controllers().await {
            Ok(controllers) => Some(controllers),
            Err(e) => self.miss("live feed", &e),
        }
    }

    pub async fn member_exists(&self, cid: &str) -> Option<bool> {
        if !self.budget.try_acquire() {
            return None;
        }
        match self.api.member_exists(cid).await {
            Ok(exists) => Some(exists),
            Err(e) => self.miss("member existence", &e),
        }
    }

    pub async fn member_profile(&self, cid: &str) -> Option<Option<MemberProfile>> {
        if !self.budget.try_acquire() {
            return None;
        }
        match self.api.member_profile(cid).await {
            Ok(profile) => Some(profile),
            Err(e) => self.miss("member profile", &e),
        }
    }

    pub async fn atc_sessions(&self, cid: &str, start: NaiveDate) -> Option<Vec<AtcSession>> {
        if !self.budget.try_acquire() {
            return None;
        }
        match self.api.atc_sessions(cid, start).await {
            Ok(sessions) => Some(sessions),
            Err(e) => self.miss("atc sessions", &e),
        }
    }
}
