//! Realtime reconciliation.
//!
//! One background task per entity kind listens on the backend's change
//! stream and refetches the affected collection. Events carry no record
//! payload; the authoritative state always comes from a full refetch, so
//! a burst of events simply collapses into the refetches that happen to
//! run. Missed events (a lagging receiver) are handled the same way.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::models::EntityKind;
use crate::store::Store;
use crate::utils::lock;

pub struct Reconciler {
    tasks: Mutex<Vec<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl Reconciler {
    /// Subscribe to every entity table and start the listener tasks.
    ///
    /// A failed subscription is logged and that entity type skipped; the
    /// staleness refresh timer covers it instead.
    pub fn spawn(store: &Arc<Store>) -> Self {
        let mut tasks = Vec::new();
        for kind in EntityKind::ALL {
            let mut receiver = match store.backend().subscribe(kind.table()) {
                Ok(receiver) => receiver,
                Err(error) => {
                    warn!(entity = %kind, %error, "subscription failed, relying on refresh timer");
                    continue;
                }
            };
            let store = Arc::clone(store);
            tasks.push(tokio::spawn(async move {
                loop {
                    match receiver.recv().await {
                        Ok(event) => {
                            debug!(
                                entity = %kind,
                                action = ?event.action,
                                record_id = ?event.record_id,
                                "change event"
                            );
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            debug!(entity = %kind, skipped, "missed change events, refetching");
                        }
                        Err(RecvError::Closed) => {
                            warn!(entity = %kind, "change stream closed");
                            break;
                        }
                    }
                    if let Err(error) = store.refetch(kind).await {
                        warn!(entity = %kind, %error, "reconcile refetch failed");
                    }
                }
            }));
        }
        info!(subscriptions = tasks.len(), "reconciler started");
        Self {
            tasks: Mutex::new(tasks),
            stopped: AtomicBool::new(false),
        }
    }

    /// Stop the listener tasks. Safe to call more than once.
    pub fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        for handle in lock(&self.tasks).drain(..) {
            handle.abort();
        }
        debug!("reconciler shut down");
    }
}

impl Drop for Reconciler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{
        Backend, BackendError, BackendResult, ChangeEvent, MemoryBackend,
    };
    use crate::config::Config;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio::sync::broadcast;

    /// Delegates to a [`MemoryBackend`] but refuses subscriptions on one
    /// table.
    struct PartialSubscribeBackend {
        inner: Arc<MemoryBackend>,
        refused_table: &'static str,
    }

    #[async_trait::async_trait]
    impl Backend for PartialSubscribeBackend {
        async fn read_collection(&self, table: &str) -> BackendResult<Vec<Value>> {
            self.inner.read_collection(table).await
        }

        async fn insert_record(&self, table: &str, payload: Value) -> BackendResult<Value> {
            self.inner.insert_record(table, payload).await
        }

        async fn update_record(&self, table: &str, id: i64, payload: Value) -> BackendResult<Value> {
            self.inner.update_record(table, id, payload).await
        }

        fn subscribe(&self, table: &str) -> BackendResult<broadcast::Receiver<ChangeEvent>> {
            if table == self.refused_table {
                return Err(BackendError::SubscriptionsUnsupported);
            }
            self.inner.subscribe(table)
        }
    }

    fn seeded_backend() -> Arc<MemoryBackend> {
        let backend = Arc::new(MemoryBackend::new());
        backend.seed(
            "projects",
            vec![json!({ "id": 1, "project_id": "P-A", "name": "Harbour warehouse" })],
        );
        backend
    }

    #[tokio::test]
    async fn test_change_event_triggers_refetch() {
        let backend = seeded_backend();
        let store = Store::new(backend.clone(), &Config::default());
        store.fetch_all().await;
        assert_eq!(store.projects.snapshot().len(), 1);

        let reconciler = Reconciler::spawn(&store);

        backend
            .insert_record("projects", json!({ "name": "School extension" }))
            .await
            .expect("insert");

        for _ in 0..100 {
            if store.projects.snapshot().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(store.projects.snapshot().len(), 2);

        reconciler.shutdown();
    }

    #[tokio::test]
    async fn test_failed_subscription_is_skipped_not_fatal() {
        let inner = seeded_backend();
        inner.seed(
            "customers",
            vec![json!({ "id": 1, "customer_id": "CUS-A", "name": "Nordhavn Ejendomme" })],
        );
        let backend = Arc::new(PartialSubscribeBackend {
            inner: inner.clone(),
            refused_table: "projects",
        });
        let store = Store::new(backend, &Config::default());
        store.fetch_all().await;

        let reconciler = Reconciler::spawn(&store);
        // Five of the six tables subscribed; every spawned task is held.
        assert_eq!(lock(&reconciler.tasks).len(), 5);

        inner
            .insert_record("customers", json!({ "name": "Vestkyst Byg" }))
            .await
            .expect("insert");
        for _ in 0..100 {
            if store.customers.snapshot().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(store.customers.snapshot().len(), 2);

        reconciler.shutdown();
    }

    #[tokio::test]
    async fn test_shutdown_stops_listeners_and_is_idempotent() {
        let backend = seeded_backend();
        let store = Store::new(backend.clone(), &Config::default());
        store.fetch_all().await;

        let reconciler = Reconciler::spawn(&store);
        reconciler.shutdown();
        reconciler.shutdown();

        let reads_before = backend.read_count();
        backend
            .insert_record("projects", json!({ "name": "Ignored" }))
            .await
            .expect("insert");
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(backend.read_count(), reads_before);
    }
}
