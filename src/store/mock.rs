//! In-memory content store for testing
//!
//! Implements the same precondition semantics as the real transport: a put
//! whose `prev_sha` does not match the current head fails with `Conflict`.
//! Tests can interpose an external writer between any fetch/put pair to
//! exercise the merge path.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::content::{ContentStore, DocumentRevision};
use crate::error::StoreError;

#[derive(Default)]
struct MemoryState {
    doc: Option<Map<String, Value>>,
    revision: u64,
}

/// Mock content store with scripted conflicts and call counters
#[derive(Default)]
pub struct MemoryContentStore {
    state: Mutex<MemoryState>,
    fetches: AtomicU32,
    puts: AtomicU32,
    // Number of upcoming puts that an "external writer" beats to the head,
    // bumping the revision so the precondition fails
    interposed: AtomicU32,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store whose document already exists with the given content.
    pub fn seeded(doc: Map<String, Value>) -> Self {
        let store = Self::default();
        {
            let mut state = store.state.lock().unwrap();
            state.doc = Some(doc);
            state.revision = 1;
        }
        store
    }

    /// Make the next `n` puts lose the race to a concurrent writer.
    pub fn interpose_writes(&self, n: u32) {
        self.interposed.store(n, Ordering::SeqCst);
    }

    /// Directly mutate the document, bumping the revision (simulates another
    /// invocation committing between our fetch and put).
    pub fn external_write(&self, key: &str, value: Value) {
        let mut state = self.state.lock().unwrap();
        state.doc.get_or_insert_with(Map::new).insert(key.to_string(), value);
        state.revision += 1;
    }

    pub fn fetch_count(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn put_count(&self) -> u32 {
        self.puts.load(Ordering::SeqCst)
    }

    /// Snapshot of the committed document (empty if never written).
    pub fn committed(&self) -> Map<String, Value> {
        self.state.lock().unwrap().doc.clone().unwrap_or_default()
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn fetch(&self) -> Result<Option<DocumentRevision>, StoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        Ok(state.doc.as_ref().map(|doc| DocumentRevision {
            doc: doc.clone(),
            sha: state.revision.to_string(),
        }))
    }

    async fn put(
        &self,
        doc: &Map<String, Value>,
        prev_sha: Option<&str>,
        _message: &str,
    ) -> Result<String, StoreError> {
        self.puts.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state.lock().unwrap();

        if self.interposed.load(Ordering::SeqCst) > 0 {
            self.interposed.fetch_sub(1, Ordering::SeqCst);
            state.revision += 1;
            return Err(StoreError::Conflict);
        }

        let head = if state.doc.is_some() {
            Some(state.revision.to_string())
        } else {
            None
        };
        if prev_sha != head.as_deref() {
            return Err(StoreError::Conflict);
        }

        state.doc = Some(doc.clone());
        state.revision += 1;
        Ok(state.revision.to_string())
    }
}
