//! API endpoint handlers
//!
//! Handlers are thin: load a store, read or mutate typed state, serialise
//! pure data at the edge. Wire field names are camelCase; persisted state
//! stays snake_case.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{open_store, ApiFailure, AppState};
use crate::audit::{
    clear_partials, load_job, load_partials, save_job, AuditJob, Scope,
};
use crate::cid::canonical_cid;
use crate::presence::OnlineEntry;
use crate::store::{keys, Store};

/// Per-CID watchlist bookkeeping (authoritative insertion time)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchMeta {
    pub added_at: i64,
}

fn iso(epoch: i64) -> Value {
    match DateTime::from_timestamp(epoch, 0) {
        Some(dt) => Value::String(dt.to_rfc3339_opts(SecondsFormat::Secs, true)),
        None => Value::Null,
    }
}

fn round2(hours: f64) -> f64 {
    (hours * 100.0).round() / 100.0
}

/// Display name from the cached profile, stale-tolerant; the cache may
/// legitimately have nothing for a controller yet.
fn display_name(store: &Store, cid: &str) -> String {
    store
        .get(&keys::membermeta(cid))
        .and_then(|m| m.get("name"))
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .map(String::from)
        .unwrap_or_else(|| format!("Controller {}", cid))
}

pub async fn list_watchlist(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, ApiFailure> {
    let store = open_store(&state).await?;

    let watchlist: Vec<String> = store.get_as(keys::WATCHLIST).unwrap_or_default();
    let meta: BTreeMap<String, WatchMeta> = store.get_as(keys::WATCHLIST_META).unwrap_or_default();
    let online: BTreeMap<String, OnlineEntry> =
        store.get_as(keys::ONLINE_STATE).unwrap_or_default();

    let users: Vec<Value> = watchlist
        .iter()
        .map(|cid| {
            json!({
                "cid": cid,
                "name": display_name(&store, cid),
                "addedAt": meta.get(cid).map(|m| iso(m.added_at)).unwrap_or(Value::Null),
                "isOnline": online.get(cid).map(|e| e.online).unwrap_or(false),
            })
        })
        .collect();

    Ok(Json(json!({ "users": users })))
}

pub async fn add_watchlist(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiFailure> {
    let raw = match body.get("cid") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(ApiFailure::bad_request("Invalid CID format")),
    };
    let cid =
        canonical_cid(&raw).ok_or_else(|| ApiFailure::bad_request("Invalid CID format"))?;

    let mut store = open_store(&state).await?;
    let watchlist: Vec<String> = store.get_as(keys::WATCHLIST).unwrap_or_default();
    if watchlist.contains(&cid) {
        return Err(ApiFailure::conflict("Already on watchlist"));
    }

    match state.network.member_exists(&cid).await {
        Ok(true) => {}
        Ok(false) => return Err(ApiFailure::not_found("Controller not found")),
        Err(e) => {
            log::warn!("existence check for {} failed: {}", cid, e);
            return Err(ApiFailure::bad_gateway("Unable to verify controller"));
        }
    }

    let now = Utc::now().timestamp();

    // Warm the profile caches so the first list render has a name
    if let Ok(Some(profile)) = state.network.member_profile(&cid).await {
        store.cache_put(&keys::rating(&cid), json!({ "rating": profile.rating }), now);
        store.cache_put(
            &keys::membermeta(&cid),
            json!({ "name": profile.name, "reg_date": profile.reg_date }),
            now,
        );
        if let Some(division) = &profile.division {
            store.cache_put(&keys::division(&cid), json!({ "value": division }), now);
        }
    }

    store.list_insert(keys::WATCHLIST, &cid);
    store.map_insert(keys::WATCHLIST_META, &cid, json!({ "added_at": now }));
    store.flush(&format!("watchlist add {}", cid)).await?;

    Ok(Json(json!({
        "success": true,
        "user": {
            "cid": cid,
            "name": display_name(&store, &cid),
            "addedAt": iso(now),
        },
    })))
}

pub async fn remove_watchlist(
    State(state): State<Arc<AppState>>,
    Path(raw_cid): Path<String>,
) -> Result<Json<Value>, ApiFailure> {
    let cid =
        canonical_cid(&raw_cid).ok_or_else(|| ApiFailure::bad_request("Invalid CID format"))?;

    let mut store = open_store(&state).await?;
    let watchlist: Vec<String> = store.get_as(keys::WATCHLIST).unwrap_or_default();
    if !watchlist.contains(&cid) {
        return Err(ApiFailure::not_found("Not on watchlist"));
    }

    store.list_remove(keys::WATCHLIST, &cid);
    store.map_remove(keys::WATCHLIST_META, &cid);
    store.flush(&format!("watchlist remove {}", cid)).await?;

    Ok(Json(json!({ "success": true })))
}

pub async fn audit_view(
    State(state): State<Arc<AppState>>,
    Path(raw_scope): Path<String>,
) -> Result<Json<Value>, ApiFailure> {
    let scope: Scope = raw_scope
        .parse()
        .map_err(|_| ApiFailure::bad_request("Unknown audit scope"))?;

    let store = open_store(&state).await?;
    let job = load_job(&store).filter(|j| j.scope == scope && !j.is_complete());

    let active: Vec<Value> = job
        .iter()
        .map(|j| {
            json!({
                "id": format!("audit_job_{}", j.created_at),
                "type": scope.as_str(),
                "status": "active",
                "progress": j.progress_percent(),
                "ticksRemaining": j.ticks_remaining(),
                "startedAt": iso(j.created_at),
                "completedAt": Value::Null,
            })
        })
        .collect();

    let partials = load_partials(&store, scope);
    let completed: Vec<Value> = partials
        .iter()
        .map(|p| {
            json!({
                "id": format!("audit_{}", p.cid),
                "cid": p.cid,
                "name": display_name(&store, &p.cid),
                "type": scope.as_str(),
                "status": "completed",
                "hoursLogged": round2(p.hours),
                "ticksRemaining": 0,
                "startedAt": iso(job.as_ref().map(|j| j.created_at).unwrap_or(p.computed_at)),
                "completedAt": iso(p.computed_at),
            })
        })
        .collect();

    let average = if partials.is_empty() {
        0.0
    } else {
        round2(partials.iter().map(|p| p.hours).sum::<f64>() / partials.len() as f64)
    };

    Ok(Json(json!({
        "active": active,
        "completed": completed,
        "stats": {
            "totalActive": active.len(),
            "totalCompleted": completed.len(),
            "averageHours": average,
        },
    })))
}

pub async fn run_audit(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiFailure> {
    let scope: Scope = body
        .get("scope")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .parse()
        .map_err(|_| ApiFailure::bad_request("Unknown audit scope"))?;

    let mut store = open_store(&state).await?;
    if load_job(&store).is_some_and(|j| !j.is_complete()) {
        return Err(ApiFailure::conflict("An audit is already running"));
    }

    let watchlist: Vec<String> = store.get_as(keys::WATCHLIST).unwrap_or_default();
    if watchlist.is_empty() {
        return Err(ApiFailure::bad_request("Watchlist is empty"));
    }

    let job = AuditJob::new(scope, watchlist, Utc::now().timestamp());
    clear_partials(&mut store, scope);
    save_job(&mut store, &job);
    store
        .flush(&format!("manual {} audit enqueued", scope))
        .await?;

    Ok(Json(json!({
        "success": true,
        "job": {
            "type": scope.as_str(),
            "total": job.total,
            "startedAt": iso(job.created_at),
        },
    })))
}

pub async fn presence_view(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, ApiFailure> {
    let feed = state.network.online_controllers().await.map_err(|e| {
        log::warn!("live feed fetch failed: {}", e);
        ApiFailure::bad_gateway("Unable to load live feed")
    })?;

    let store = open_store(&state).await?;
    let watchlist: Vec<String> = store.get_as(keys::WATCHLIST).unwrap_or_default();

    let online: Vec<Value> = feed
        .into_iter()
        .filter(|c| !c.is_atis())
        .filter(|c| watchlist.iter().any(|cid| cid == &c.cid.to_string()))
        .map(|c| {
            let cid = c.cid.to_string();
            let name = c.name.clone().unwrap_or_else(|| display_name(&store, &cid));
            json!({
                "cid": cid,
                "callsign": c.callsign,
                "frequency": c.frequency,
                "name": name,
            })
        })
        .collect();

    Ok(Json(json!({ "online": online })))
}

pub async fn stats_view(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiFailure> {
    let store = open_store(&state).await?;

    let watchlist: Vec<String> = store.get_as(keys::WATCHLIST).unwrap_or_default();
    let online: BTreeMap<String, OnlineEntry> =
        store.get_as(keys::ONLINE_STATE).unwrap_or_default();
    let online_count = online.values().filter(|e| e.online).count();

    let active_job = load_job(&store)
        .filter(|j| !j.is_complete())
        .map(|j| {
            json!({
                "type": j.scope.as_str(),
                "progress": j.progress_percent(),
                "ticksRemaining": j.ticks_remaining(),
            })
        })
        .unwrap_or(Value::Null);

    let mut audits = serde_json::Map::new();
    for scope in [Scope::Visiting, Scope::Local] {
        let partials = load_partials(&store, scope);
        audits.insert(
            scope.as_str().to_string(),
            json!({
                "completed": partials.len(),
                "flagged": partials.iter().filter(|p| p.flagged).count(),
            }),
        );
    }

    Ok(Json(json!({
        "watchlistCount": watchlist.len(),
        "onlineCount": online_count,
        "activeJob": active_job,
        "audits": audits,
    })))
}
