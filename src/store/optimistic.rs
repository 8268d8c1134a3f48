//! Optimistic writes.
//!
//! A mutation patches the cached record immediately, then runs the
//! backend write. Confirmation triggers the usual resync; failure rolls
//! the record back to its pre-mutation snapshot. When a newer mutation
//! touches the same record before an older one fails, the older rollback
//! is discarded so the newest write wins.

use std::sync::atomic::Ordering;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::models::Entity;
use crate::utils::lock;

use super::EntityCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    Pending,
    Confirmed,
    Failed,
}

/// An in-flight optimistic write against one cached record.
#[derive(Debug, Clone)]
pub struct PendingMutation {
    pub record_id: i64,
    pub description: String,
    pub state: MutationState,
    pub started_at: DateTime<Utc>,
    /// Ownership token; a newer mutation on the same record takes over
    /// and disarms the older one's rollback.
    token: u64,
}

impl<T: Entity> EntityCache<T> {
    /// Flip a record's pinned flag optimistically.
    pub async fn toggle_pin(&self, id: i64) -> Result<T> {
        let pinned = self
            .record(id)
            .ok_or_else(|| anyhow!("no cached {} record with id {id}", T::KIND.label()))?
            .pinned();
        let target = !pinned;
        self.optimistic_update(id, "toggle pin", json!({ "pinned": target }), move |record| {
            record.set_pinned(target)
        })
        .await
    }

    /// Apply `patch_local` to the cached record immediately, then send
    /// `payload` to the backend. On success the cache resyncs; on
    /// failure the record reverts to its pre-mutation state unless a
    /// newer mutation has taken the record over in the meantime.
    pub async fn optimistic_update<F>(
        &self,
        id: i64,
        description: &str,
        payload: Value,
        patch_local: F,
    ) -> Result<T>
    where
        F: FnOnce(&mut T),
    {
        let token = self.mutation_counter.fetch_add(1, Ordering::SeqCst) + 1;

        let snapshot = {
            let mut entry = lock(&self.state);
            let record = entry
                .records
                .iter_mut()
                .find(|r| r.id() == id)
                .ok_or_else(|| anyhow!("no cached {} record with id {id}", T::KIND.label()))?;
            let snapshot = record.clone();
            patch_local(record);
            entry.revision += 1;
            snapshot
        };

        lock(&self.pending).insert(
            id,
            PendingMutation {
                record_id: id,
                description: description.to_string(),
                state: MutationState::Pending,
                started_at: Utc::now(),
                token,
            },
        );
        debug!(entity = %T::KIND, id, token, description, "optimistic patch applied");

        match self.backend.update_record(T::KIND.table(), id, payload).await {
            Ok(value) => {
                let confirmed: T = serde_json::from_value(value)?;
                self.settle(id, token, MutationState::Confirmed);
                self.resync_after_write().await;
                Ok(confirmed)
            }
            Err(error) => {
                self.roll_back(id, token, snapshot);
                self.notifier.error(format!(
                    "Could not save changes to {}: {error}",
                    T::KIND.label()
                ));
                Err(error.into())
            }
        }
    }

    /// Mutations still waiting on the backend, for status displays.
    pub fn pending_mutations(&self) -> Vec<PendingMutation> {
        lock(&self.pending).values().cloned().collect()
    }

    fn settle(&self, id: i64, token: u64, state: MutationState) {
        let mut pending = lock(&self.pending);
        if pending.get(&id).map(|m| m.token) == Some(token) {
            pending.remove(&id);
            debug!(entity = %T::KIND, id, token, ?state, "mutation settled");
        }
    }

    fn roll_back(&self, id: i64, token: u64, snapshot: T) {
        {
            let mut pending = lock(&self.pending);
            match pending.get(&id) {
                Some(mutation) if mutation.token == token => {
                    pending.remove(&id);
                }
                // A newer mutation owns the record now; its outcome
                // decides the final state.
                _ => {
                    debug!(entity = %T::KIND, id, token, "rollback superseded");
                    return;
                }
            }
        }

        let mut entry = lock(&self.state);
        if let Some(record) = entry.records.iter_mut().find(|r| r.id() == id) {
            *record = snapshot;
            entry.revision += 1;
        }
        warn!(entity = %T::KIND, id, token, "optimistic mutation rolled back");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::models::Project;
    use std::sync::Arc;

    fn seeded_cache() -> (Arc<MemoryBackend>, EntityCache<Project>) {
        let backend = Arc::new(MemoryBackend::new());
        backend.seed(
            "projects",
            vec![json!({ "id": 1, "project_id": "P-A", "name": "Harbour warehouse" })],
        );
        (backend.clone(), EntityCache::with_backend(backend))
    }

    #[tokio::test]
    async fn test_toggle_pin_confirms_and_resyncs() {
        let (backend, cache) = seeded_cache();
        cache.fetch(false).await.expect("fetch");

        let confirmed = cache.toggle_pin(1).await.expect("toggle");
        assert!(confirmed.pinned);

        assert!(cache.record(1).expect("record").pinned);
        assert_eq!(
            backend.rows("projects")[0].get("pinned"),
            Some(&json!(true))
        );
        assert!(cache.pending_mutations().is_empty());
    }

    #[tokio::test]
    async fn test_failed_toggle_rolls_back_and_notifies() {
        let (backend, cache) = seeded_cache();
        cache.fetch(false).await.expect("fetch");
        let (_, revision_before) = cache.snapshot_with_revision();

        backend.set_fail_writes(true);
        assert!(cache.toggle_pin(1).await.is_err());

        let record = cache.record(1).expect("record");
        assert!(!record.pinned);
        assert!(cache.pending_mutations().is_empty());

        // Both the patch and the rollback are visible changes.
        let (_, revision_after) = cache.snapshot_with_revision();
        assert!(revision_after > revision_before);

        let drained = cache.notifier.drain();
        assert_eq!(drained.len(), 1);
        assert!(drained[0].message.contains("Could not save changes to projects"));
    }

    #[tokio::test]
    async fn test_superseded_rollback_is_discarded() {
        let (_, cache) = seeded_cache();
        cache.fetch(false).await.expect("fetch");

        let stale_snapshot = cache.record(1).expect("record");

        // A newer mutation takes ownership of the record.
        lock(&cache.pending).insert(
            1,
            PendingMutation {
                record_id: 1,
                description: "rename".to_string(),
                state: MutationState::Pending,
                started_at: Utc::now(),
                token: 5,
            },
        );
        {
            let mut entry = lock(&cache.state);
            entry.records[0].name = "Renamed".to_string();
        }

        // An older mutation failing must not clobber the newer patch.
        cache.roll_back(1, 4, stale_snapshot);
        assert_eq!(cache.record(1).expect("record").name, "Renamed");
        assert_eq!(cache.pending_mutations().len(), 1);
    }

    #[tokio::test]
    async fn test_update_on_unknown_id_errors_without_pending_entry() {
        let (_, cache) = seeded_cache();
        cache.fetch(false).await.expect("fetch");

        let result = cache
            .optimistic_update(99, "rename", json!({ "name": "x" }), |record| {
                record.name = "x".to_string();
            })
            .await;
        assert!(result.is_err());
        assert!(cache.pending_mutations().is_empty());
    }
}
