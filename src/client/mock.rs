//! Mock network client for testing
//!
//! Scripted responses plus call counters, so engine and presence tests can
//! assert both behaviour and outbound-call discipline without touching the
//! live network.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;

use super::{AtcSession, MemberProfile, NetworkApi, OnlineController};
use crate::error::FetchError;

/// Tracks API call counts for test verification
#[derive(Default, Debug, Clone)]
pub struct CallCounts {
    pub online_controllers: usize,
    pub member_exists: usize,
    pub member_profile: usize,
    pub atc_sessions: usize,
}

#[derive(Default)]
struct MockState {
    controllers: Vec<OnlineController>,
    members: HashMap<String, MemberProfile>,
    sessions: HashMap<String, Vec<AtcSession>>,
    // Consumed on the next call, whatever it is
    error: Option<FetchError>,
    counts: CallCounts,
}

/// Mock network client with scripted responses
#[derive(Default)]
pub struct MockNetworkClient {
    state: Mutex<MockState>,
}

impl MockNetworkClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_controllers(self, controllers: Vec<OnlineController>) -> Self {
        self.state.lock().unwrap().controllers = controllers;
        self
    }

    /// Register a member; existence, profile, and (empty) session lookups
    /// resolve from here.
    pub fn with_member(self, profile: MemberProfile) -> Self {
        let cid = profile.id.to_string();
        self.state.lock().unwrap().members.insert(cid, profile);
        self
    }

    pub fn with_sessions(self, cid: &str, sessions: Vec<AtcSession>) -> Self {
        self.state.lock().unwrap().sessions.insert(cid.to_string(), sessions);
        self
    }

    /// Fail the next call with the given error.
    pub fn with_error(self, error: FetchError) -> Self {
        self.state.lock().unwrap().error = Some(error);
        self
    }

    pub fn set_controllers(&self, controllers: Vec<OnlineController>) {
        self.state.lock().unwrap().controllers = controllers;
    }

    pub fn fail_next(&self, error: FetchError) {
        self.state.lock().unwrap().error = Some(error);
    }

    pub fn call_counts(&self) -> CallCounts {
        self.state.lock().unwrap().counts.clone()
    }

    fn take_error(state: &mut MockState) -> Option<FetchError> {
        state.error.take()
    }
}

#[async_trait]
impl NetworkApi for MockNetworkClient {
    async fn online_controllers(&self) -> Result<Vec<OnlineController>, FetchError> {
        let mut state = self.state.lock().unwrap();
        state.counts.online_controllers += 1;
        if let Some(err) = Self::take_error(&mut state) {
            return Err(err);
        }
        Ok(state.controllers.clone())
    }

    async fn member_exists(&self, cid: &str) -> Result<bool, FetchError> {
        let mut state = self.state.lock().unwrap();
        state.counts.member_exists += 1;
        if let Some(err) = Self::take_error(&mut state) {
            return Err(err);
        }
        Ok(state.members.contains_key(cid))
    }

    async fn member_profile(&self, cid: &str) -> Result<Option<MemberProfile>, FetchError> {
        let mut state = self.state.lock().unwrap();
        state.counts.member_profile += 1;
        if let Some(err) = Self::take_error(&mut state) {
            return Err(err);
        }
        Ok(state.members.get(cid).cloned())
    }

    async fn atc_sessions(
        &self,
        cid: &str,
        _start: NaiveDate,
    ) -> Result<Vec<AtcSession>, FetchError> {
        let mut state = self.state.lock().unwrap();
        state.counts.atc_sessions += 1;
        if let Some(err) = Self::take_error(&mut state) {
            return Err(err);
        }
        Ok(state.sessions.get(cid).cloned().unwrap_or_default())
    }
}

/// Build an online controller for tests
pub fn online(cid: u64, callsign: &str) -> OnlineController {
    OnlineController {
        cid,
        callsign: callsign.to_string(),
        frequency: Some("129.400".to_string()),
        name: Some(format!("Controller {}", cid)),
    }
}

/// Build a member profile for tests
pub fn member(cid: u64, rating: i32, reg_date: &str) -> MemberProfile {
    MemberProfile {
        id: cid,
        rating,
        name: Some(format!("Controller {}", cid)),
        reg_date: Some(reg_date.to_string()),
        division: Some("PAC".to_string()),
    }
}

/// Build a closed ATC session of `minutes` length for tests
pub fn session(callsign: &str, start: &str, end: &str, minutes: f64) -> AtcSession {
    AtcSession {
        callsign: callsign.to_string(),
        start: start.to_string(),
        end: Some(end.to_string()),
        minutes_on_callsign: format!("{}", minutes),
    }
}
