//! Key namespace of the store document
//!
//! Every durable fact has a structured string key. Helpers here are the only
//! place key strings are assembled, so prefix classification (cleanup, typed
//! accessors) cannot drift from the writers.

pub const WATCHLIST: &str = "watchlist";
pub const WATCHLIST_META: &str = "watchlist:meta";
pub const ONLINE_STATE: &str = "online_state";
pub const AUDIT_JOB: &str = "audit:job";
pub const LAST_CLEANUP: &str = "_last_cleanup";

pub fn audit_partial(scope: &str) -> String {
    format!("audit:partial:{}", scope)
}

pub fn audit_archive(scope: &str, cid: &str) -> String {
    format!("audit:{}:{}", scope, cid)
}

pub fn rating(cid: &str) -> String {
    format!("rating:{}", cid)
}

pub fn division(cid: &str) -> String {
    format!("division:{}", cid)
}

pub fn member(cid: &str) -> String {
    format!("member:{}", cid)
}

pub fn membermeta(cid: &str) -> String {
    format!("membermeta:{}", cid)
}

pub fn cooldown_online(cid: &str, callsign: &str) -> String {
    format!("cooldown:online:{}:{}", cid, callsign.to_uppercase())
}

pub fn cooldown_offline(cid: &str) -> String {
    format!("cooldown:offline:{}", cid)
}

pub fn cooldown_flag(cid: &str) -> String {
    format!("cooldown:flag:{}", cid)
}

pub fn quarter_auto(quarter: &str) -> String {
    format!("quarter:auto:{}", quarter)
}
