//! Presence tracker
//!
//! Diffs the live-feed snapshot against the persisted online map and writes
//! state transitions. Only watched controllers are tracked; the full network
//! feed is never persisted. Cooldown markers debounce the notification
//! side-effect and are never consulted for state correctness.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::client::budget::BudgetedClient;
use crate::store::{keys, Store};

/// Debounce window for "came online" notifications, per CID + callsign
pub const ONLINE_COOLDOWN_SECS: i64 = 15 * 60;

/// Debounce window for "went offline" notifications, per CID
pub const OFFLINE_COOLDOWN_SECS: i64 = 15 * 60;

/// Last-known connection details for a controller
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControllerInfo {
    pub callsign: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// When this info was captured (epoch seconds)
    pub last_seen: i64,
}

/// Persisted presence state for one controller
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OnlineEntry {
    pub online: bool,

    /// When the online flag last flipped (epoch seconds)
    pub last_change: i64,

    /// Info from the most recent sighting; preserved across the offline
    /// transition so the dashboard can show where they last controlled
    pub last_info: ControllerInfo,
}

/// Outcome of one presence pass
#[derive(Debug, Default)]
pub struct PresenceReport {
    /// Feed was unavailable (budget or transient); state untouched
    pub skipped: bool,
    pub came_online: usize,
    pub went_offline: usize,
}

/// Poll the feed and persist presence transitions for watched controllers.
pub async fn run_presence(
    store: &mut Store,
    client: &BudgetedClient<'_>,
    now: i64,
) -> PresenceReport {
    let Some(feed) = client.online_controllers().await else {
        return PresenceReport {
            skipped: true,
            ..Default::default()
        };
    };

    let watchlist: BTreeSet<String> = store
        .get_as::<Vec<String>>(keys::WATCHLIST)
        .unwrap_or_default()
        .into_iter()
        .collect();

    let mut now_online: BTreeMap<String, ControllerInfo> = BTreeMap::new();
    for controller in feed {
        if controller.is_atis() {
            continue;
        }
        let cid = controller.cid.to_string();
        if !watchlist.contains(&cid) {
            continue;
        }
        now_online.insert(
            cid,
            ControllerInfo {
                callsign: controller.callsign,
                frequency: controller.frequency,
                name: controller.name,
                last_seen: now,
            },
        );
    }

    let mut state: BTreeMap<String, OnlineEntry> =
        store.get_as(keys::ONLINE_STATE).unwrap_or_default();

    let mut report = PresenceReport::default();
    let all_cids: BTreeSet<String> = state.keys().cloned().chain(now_online.keys().cloned()).collect();

    for cid in all_cids {
        let was_online = state.get(&cid).map(|e| e.online).unwrap_or(false);
        match (was_online, now_online.get(&cid)) {
            (false, Some(info)) => {
                state.insert(
                    cid.clone(),
                    OnlineEntry {
                        online: true,
                        last_change: now,
                        last_info: info.clone(),
                    },
                );
                report.came_online += 1;
                notify_online(store, &cid, info, now);
            }
            (true, None) => {
                // Preserve the last-known info for display
                if let Some(entry) = state.get_mut(&cid) {
                    entry.online = false;
                    entry.last_change = now;
                }
                report.went_offline += 1;
                notify_offline(store, &cid, now);
            }
            // Steady state: no write
            (true, Some(_)) | (false, None) => {}
        }
    }

    if report.came_online > 0 || report.went_offline > 0 {
        store.set_as(keys::ONLINE_STATE, &state);
    }
    report
}

fn notify_online(store: &mut Store, cid: &str, info: &ControllerInfo, now: i64) {
    let key = keys::cooldown_online(cid, &info.callsign);
    if store.cooldown_active(&key, now) {
        return;
    }
    store.arm_cooldown(&key, now, ONLINE_COOLDOWN_SECS);
    log::info!(
        "controller {} online as {}{}",
        cid,
        info.callsign,
        info.frequency
            .as_deref()
            .map(|f| format!(" on {}", f))
            .unwrap_or_default()
    );
}

fn notify_offline(store: &mut Store, cid: &str, now: i64) {
    let key = keys::cooldown_offline(cid);
    if store.cooldown_active(&key, now) {
        return;
    }
    store.arm_cooldown(&key, now, OFFLINE_COOLDOWN_SECS);
    log::info!("controller {} went offline", cid);
}
