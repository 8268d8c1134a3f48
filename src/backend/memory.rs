//! In-process backend for tests and demo setups.
//!
//! Behaves like the real store: inserts assign ids, updates merge object
//! keys, and every write publishes a change event on the table's broadcast
//! channel. Failure and latency injection hooks make the cache layer's
//! error and timeout paths testable.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::utils::lock;

use super::{Backend, BackendError, BackendResult, ChangeAction, ChangeEvent};

/// Capacity of the per-table change-event channel.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

pub struct MemoryBackend {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    channels: Mutex<HashMap<String, broadcast::Sender<ChangeEvent>>>,
    next_id: AtomicI64,
    reads: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    read_delay: Mutex<Option<Duration>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            channels: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            reads: AtomicUsize::new(0),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            read_delay: Mutex::new(None),
        }
    }

    /// Replace a table's contents wholesale. Seeded ids advance the id
    /// counter so later inserts do not collide.
    pub fn seed(&self, table: &str, rows: Vec<Value>) {
        let max_id = rows
            .iter()
            .filter_map(|r| r.get("id").and_then(Value::as_i64))
            .max()
            .unwrap_or(0);
        if max_id >= self.next_id.load(Ordering::SeqCst) {
            self.next_id.store(max_id + 1, Ordering::SeqCst);
        }
        lock(&self.tables).insert(table.to_string(), rows);
    }

    /// Number of read calls issued so far, across all tables.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Make subsequent reads fail with a server error.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent writes fail with a server error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Delay every read by the given duration (simulates a slow backend).
    pub fn set_read_delay(&self, delay: Option<Duration>) {
        *lock(&self.read_delay) = delay;
    }

    /// Raw rows of a table, for assertions.
    pub fn rows(&self, table: &str) -> Vec<Value> {
        lock(&self.tables).get(table).cloned().unwrap_or_default()
    }

    fn sender_for(&self, table: &str) -> broadcast::Sender<ChangeEvent> {
        let mut channels = lock(&self.channels);
        channels
            .entry(table.to_string())
            .or_insert_with(|| broadcast::channel(CHANGE_CHANNEL_CAPACITY).0)
            .clone()
    }

    fn emit(&self, table: &str, action: ChangeAction, record_id: Option<i64>) {
        // No subscribers is expected and fine.
        let _ = self.sender_for(table).send(ChangeEvent {
            table: table.to_string(),
            action,
            record_id,
        });
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn read_collection(&self, table: &str) -> BackendResult<Vec<Value>> {
        let delay = *lock(&self.read_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(BackendError::ServerError("injected read failure".to_string()));
        }
        Ok(lock(&self.tables).get(table).cloned().unwrap_or_default())
    }

    async fn insert_record(&self, table: &str, payload: Value) -> BackendResult<Value> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BackendError::ServerError("injected write failure".to_string()));
        }
        let mut record = payload;
        let Some(map) = record.as_object_mut() else {
            return Err(BackendError::InvalidResponse(
                "insert payload must be a JSON object".to_string(),
            ));
        };
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        map.insert("id".to_string(), Value::from(id));

        lock(&self.tables)
            .entry(table.to_string())
            .or_default()
            .push(record.clone());
        self.emit(table, ChangeAction::Insert, Some(id));
        Ok(record)
    }

    async fn update_record(&self, table: &str, id: i64, payload: Value) -> BackendResult<Value> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BackendError::ServerError("injected write failure".to_string()));
        }
        let updated = {
            let mut tables = lock(&self.tables);
            let rows = tables.get_mut(table).ok_or(BackendError::MissingRecord {
                table: table.to_string(),
                id,
            })?;
            let row = rows
                .iter_mut()
                .find(|r| r.get("id").and_then(Value::as_i64) == Some(id))
                .ok_or(BackendError::MissingRecord {
                    table: table.to_string(),
                    id,
                })?;
            if let (Some(target), Some(patch)) = (row.as_object_mut(), payload.as_object()) {
                for (key, value) in patch {
                    target.insert(key.clone(), value.clone());
                }
            }
            row.clone()
        };
        self.emit(table, ChangeAction::Update, Some(id));
        Ok(updated)
    }

    fn subscribe(&self, table: &str) -> BackendResult<broadcast::Receiver<ChangeEvent>> {
        Ok(self.sender_for(table).subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_insert_assigns_id_and_emits() {
        let backend = MemoryBackend::new();
        let mut rx = backend.subscribe("projects").expect("subscribe");

        let created = backend
            .insert_record("projects", json!({ "name": "Harbour warehouse" }))
            .await
            .expect("insert");
        assert_eq!(created.get("id").and_then(Value::as_i64), Some(1));

        let event = rx.try_recv().expect("change event");
        assert_eq!(event.table, "projects");
        assert_eq!(event.action, ChangeAction::Insert);
        assert_eq!(event.record_id, Some(1));
    }

    #[tokio::test]
    async fn test_update_merges_keys() {
        let backend = MemoryBackend::new();
        backend.seed(
            "projects",
            vec![json!({ "id": 7, "name": "Depot", "pinned": false })],
        );

        let updated = backend
            .update_record("projects", 7, json!({ "pinned": true }))
            .await
            .expect("update");
        assert_eq!(updated.get("pinned"), Some(&json!(true)));
        assert_eq!(updated.get("name"), Some(&json!("Depot")));

        assert!(matches!(
            backend.update_record("projects", 99, json!({})).await,
            Err(BackendError::MissingRecord { id: 99, .. })
        ));
    }

    #[tokio::test]
    async fn test_seed_advances_id_counter() {
        let backend = MemoryBackend::new();
        backend.seed("projects", vec![json!({ "id": 40 })]);
        let created = backend
            .insert_record("projects", json!({ "name": "New" }))
            .await
            .expect("insert");
        assert_eq!(created.get("id").and_then(Value::as_i64), Some(41));
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let backend = MemoryBackend::new();
        backend.set_fail_reads(true);
        assert!(backend.read_collection("projects").await.is_err());
        backend.set_fail_reads(false);
        assert!(backend.read_collection("projects").await.is_ok());
        assert_eq!(backend.read_count(), 2);

        backend.set_fail_writes(true);
        assert!(backend
            .insert_record("projects", json!({ "name": "x" }))
            .await
            .is_err());
    }
}
