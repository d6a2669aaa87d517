//! Persistent store facade
//!
//! All durable state lives in one JSON document held by a [`ContentStore`].
//! A `Store` value is created at the start of every invocation (scheduled
//! tick or HTTP request), carries the in-memory copy plus a journal of local
//! edits, and flushes once under the transport's SHA precondition. Nothing is
//! ambient: when the invocation ends, the value is gone.
//!
//! Local edits are journaled as operations, not snapshots. When a flush loses
//! the SHA race, the remote document is re-fetched and the journal is
//! replayed over it: whole-value writes win per key, while list and map
//! membership ops (watchlist add/remove, per-CID metadata) re-apply against
//! the remote value, so two writers touching different members both survive.

pub mod cleanup;
pub mod content;
pub mod keys;
#[cfg(test)]
pub mod mock;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

pub use content::{ContentStore, DocumentRevision, GithubContentStore};

use crate::cid::cid_sort_key;
use crate::error::StoreError;

/// Cache TTL configuration per key prefix, in seconds
///
/// Entries carry `cached_at`; a read through [`Store::cache_get`] only
/// returns entries younger than the prefix TTL. The cleanup sweep deletes
/// entries older than twice their TTL.
pub struct CacheTtl;

impl CacheTtl {
    // Member existence is nearly immutable
    pub const MEMBER: i64 = 7 * 24 * 60 * 60; // 7 d

    // Profile-shaped lookups drift slowly
    pub const RATING: i64 = 24 * 60 * 60; // 24 h
    pub const DIVISION: i64 = 24 * 60 * 60; // 24 h
    pub const MEMBER_META: i64 = 24 * 60 * 60; // 24 h

    // Archived per-controller audit verdicts
    pub const AUDIT_ARCHIVE: i64 = 24 * 60 * 60; // 24 h
}

/// One journaled local edit
#[derive(Debug, Clone)]
enum Edit {
    Set(Value),
    Delete,
    /// Insert into a string list, keeping numeric order and uniqueness
    ListInsert(String),
    ListRemove(String),
    /// Insert a field into an object value
    MapInsert(String, Value),
    MapRemove(String),
}

/// The store document with journaled local edits
pub struct Store {
    transport: Arc<dyn ContentStore>,
    doc: Map<String, Value>,
    sha: Option<String>,
    loaded: bool,
    journal: BTreeMap<String, Vec<Edit>>,
}

impl Store {
    pub fn new(transport: Arc<dyn ContentStore>) -> Self {
        Self {
            transport,
            doc: Map::new(),
            sha: None,
            loaded: false,
            journal: BTreeMap::new(),
        }
    }

    /// Fetch the document. Idempotent within an invocation: the first call
    /// does the network round-trip, later calls are free.
    pub async fn load(&mut self) -> Result<(), StoreError> {
        if self.loaded {
            return Ok(());
        }
        match self.transport.fetch().await? {
            Some(revision) => {
                self.doc = revision.doc;
                self.sha = Some(revision.sha);
            }
            None => {
                self.doc = Map::new();
                self.sha = None;
            }
        }
        self.loaded = true;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.doc.get(key)
    }

    /// Typed read. A value that no longer matches its schema is treated as
    /// absent rather than poisoning the invocation.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.doc.get(key)?;
        match serde_json::from_value(value.clone()) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                log::warn!("store key '{}' has unexpected shape: {}", key, e);
                None
            }
        }
    }

    fn record(&mut self, key: &str, edit: Edit) {
        apply_edit(&mut self.doc, key, &edit);
        self.journal.entry(key.to_string()).or_default().push(edit);
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.record(key, Edit::Set(value));
    }

    pub fn set_as<T: Serialize>(&mut self, key: &str, value: &T) {
        match serde_json::to_value(value) {
            Ok(v) => self.set(key, v),
            Err(e) => log::error!("failed to serialize value for key '{}': {}", key, e),
        }
    }

    pub fn del(&mut self, key: &str) {
        self.record(key, Edit::Delete);
    }

    /// Add an item to a string-list key. Membership is set-like and the list
    /// stays in numeric order; on a conflicted flush the insert re-applies
    /// against the remote list, so concurrent inserts of different items all
    /// survive.
    pub fn list_insert(&mut self, key: &str, item: &str) {
        self.record(key, Edit::ListInsert(item.to_string()));
    }

    pub fn list_remove(&mut self, key: &str, item: &str) {
        self.record(key, Edit::ListRemove(item.to_string()));
    }

    /// Set one field of an object key, preserving sibling fields written by
    /// concurrent invocations.
    pub fn map_insert(&mut self, key: &str, field: &str, value: Value) {
        self.record(key, Edit::MapInsert(field.to_string(), value));
    }

    pub fn map_remove(&mut self, key: &str, field: &str) {
        self.record(key, Edit::MapRemove(field.to_string()));
    }

    pub fn keys(&self) -> Vec<String> {
        self.doc.keys().cloned().collect()
    }

    pub fn is_dirty(&self) -> bool {
        !self.journal.is_empty()
    }

    /// Write the document back under the SHA precondition.
    ///
    /// Returns `Ok(false)` when there was nothing to write. On a conflict the
    /// remote document is re-fetched, the journal is replayed over it, and
    /// the put is retried once; a second conflict is surfaced to the caller.
    pub async fn flush(&mut self, message: &str) -> Result<bool, StoreError> {
        if self.journal.is_empty() {
            return Ok(false);
        }

        match self
            .transport
            .put(&self.doc, self.sha.as_deref(), message)
            .await
        {
            Ok(new_sha) => {
                self.sha = Some(new_sha);
                self.journal.clear();
                Ok(true)
            }
            Err(StoreError::Conflict) => {
                log::warn!("store flush conflict, merging remote and retrying once");
                let remote = self.transport.fetch().await?;
                let (mut base, sha) = match remote {
                    Some(revision) => (revision.doc, Some(revision.sha)),
                    None => (Map::new(), None),
                };
                for (key, edits) in &self.journal {
                    for edit in edits {
                        apply_edit(&mut base, key, edit);
                    }
                }
                self.doc = base;
                self.sha = sha;

                let new_sha = self
                    .transport
                    .put(&self.doc, self.sha.as_deref(), message)
                    .await?;
                self.sha = Some(new_sha);
                self.journal.clear();
                Ok(true)
            }
            Err(other) => Err(other),
        }
    }

    /// Read a cached entry iff its `cached_at` is within `max_age_secs`.
    pub fn cache_get(&self, key: &str, max_age_secs: i64, now: i64) -> Option<&Value> {
        let entry = self.doc.get(key)?;
        let cached_at = entry.get("cached_at")?.as_i64()?;
        if cached_at <= now && now - cached_at <= max_age_secs {
            Some(entry)
        } else {
            None
        }
    }

    /// Write a cache entry, stamping `cached_at`.
    pub fn cache_put(&mut self, key: &str, value: Value, now: i64) {
        let mut entry = match value {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        entry.insert("cached_at".to_string(), Value::from(now));
        self.set(key, Value::Object(entry));
    }

    /// Whether a cooldown marker is still holding.
    pub fn cooldown_active(&self, key: &str, now: i64) -> bool {
        self.doc
            .get(key)
            .and_then(|v| v.get("expiresAt"))
            .and_then(Value::as_i64)
            .is_some_and(|expires| expires > now)
    }

    /// Arm a cooldown marker for `window_secs` from now.
    pub fn arm_cooldown(&mut self, key: &str, now: i64, window_secs: i64) {
        self.set(key, serde_json::json!({ "expiresAt": now + window_secs }));
    }
}

fn apply_edit(doc: &mut Map<String, Value>, key: &str, edit: &Edit) {
    match edit {
        Edit::Set(value) => {
            doc.insert(key.to_string(), value.clone());
        }
        Edit::Delete => {
            doc.remove(key);
        }
        Edit::ListInsert(item) => {
            if !matches!(doc.get(key), Some(Value::Array(_))) {
                doc.insert(key.to_string(), Value::Array(vec![]));
            }
            if let Some(Value::Array(list)) = doc.get_mut(key) {
                if !list.iter().any(|v| v.as_str() == Some(item)) {
                    list.push(Value::String(item.clone()));
                    list.sort_by_key(|v| v.as_str().map(cid_sort_key).unwrap_or(u64::MAX));
                }
            }
        }
        Edit::ListRemove(item) => {
            if let Some(Value::Array(list)) = doc.get_mut(key) {
                list.retain(|v| v.as_str() != Some(item.as_str()));
            }
        }
        Edit::MapInsert(field, value) => {
            if !matches!(doc.get(key), Some(Value::Object(_))) {
                doc.insert(key.to_string(), Value::Object(Map::new()));
            }
            if let Some(Value::Object(map)) = doc.get_mut(key) {
                map.insert(field.clone(), value.clone());
            }
        }
        Edit::MapRemove(field) => {
            if let Some(Value::Object(map)) = doc.get_mut(key) {
                map.remove(field);
            }
        }
    }
}
