//! Entity cache store.
//!
//! One [`EntityCache`] per entity kind holds the last known collection,
//! its fetch timestamp and a revision counter. Reads are served from the
//! cache when fresh; stale or forced reads go to the backend with
//! single-flight deduplication. Writes go through the backend and then
//! force a resync so the cache reflects what the server actually stored.

pub mod optimistic;

pub use optimistic::{MutationState, PendingMutation};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::config::Config;
use crate::ids::generate_id;
use crate::models::{
    AdditionalTask, Customer, Deviation, Drawing, Employee, Entity, EntityKind, Project,
};
use crate::notify::Notifier;
use crate::utils::lock;

/// Freshness and timeout knobs shared by all entity caches.
#[derive(Debug, Clone, Copy)]
pub struct CachePolicy {
    /// Age beyond which a cached collection is refetched on read.
    pub stale_after: Duration,
    /// Per-fetch deadline before falling back to placeholder data.
    pub fetch_timeout: StdDuration,
}

impl From<&Config> for CachePolicy {
    fn from(config: &Config) -> Self {
        Self {
            stale_after: config.stale_after(),
            fetch_timeout: config.fetch_timeout(),
        }
    }
}

struct CacheEntry<T> {
    records: Vec<T>,
    loading: bool,
    last_fetched_at: Option<DateTime<Utc>>,
    /// Set when `records` holds the placeholder collection after a
    /// fetch timeout.
    fallback: bool,
    /// Bumped on every visible change to `records`; views memoize on it.
    revision: u64,
    /// Ticket dispenser for in-flight fetches.
    next_seq: u64,
    /// Ticket of the newest fetch whose result was applied. Older
    /// results arriving late are discarded.
    applied_seq: u64,
}

impl<T> CacheEntry<T> {
    fn new() -> Self {
        Self {
            records: Vec::new(),
            loading: false,
            last_fetched_at: None,
            fallback: false,
            revision: 0,
            next_seq: 0,
            applied_seq: 0,
        }
    }

    fn is_stale(&self, stale_after: Duration) -> bool {
        match self.last_fetched_at {
            Some(at) => Utc::now() - at > stale_after,
            None => true,
        }
    }
}

/// Cache for one entity collection.
pub struct EntityCache<T: Entity> {
    backend: Arc<dyn Backend>,
    notifier: Notifier,
    policy: CachePolicy,
    state: Mutex<CacheEntry<T>>,
    fetch_done: Notify,
    pending: Mutex<HashMap<i64, PendingMutation>>,
    mutation_counter: AtomicU64,
}

impl<T: Entity> EntityCache<T> {
    pub(crate) fn new(backend: Arc<dyn Backend>, notifier: Notifier, policy: CachePolicy) -> Self {
        Self {
            backend,
            notifier,
            policy,
            state: Mutex::new(CacheEntry::new()),
            fetch_done: Notify::new(),
            pending: Mutex::new(HashMap::new()),
            mutation_counter: AtomicU64::new(0),
        }
    }

    /// Current records, fresh or not.
    pub fn snapshot(&self) -> Vec<T> {
        lock(&self.state).records.clone()
    }

    /// Current records plus the revision they belong to.
    pub fn snapshot_with_revision(&self) -> (Vec<T>, u64) {
        let entry = lock(&self.state);
        (entry.records.clone(), entry.revision)
    }

    pub fn record(&self, id: i64) -> Option<T> {
        lock(&self.state).records.iter().find(|r| r.id() == id).cloned()
    }

    pub fn is_stale(&self) -> bool {
        lock(&self.state).is_stale(self.policy.stale_after)
    }

    pub fn loading(&self) -> bool {
        lock(&self.state).loading
    }

    /// Whether the current records are the placeholder collection.
    pub fn is_fallback(&self) -> bool {
        lock(&self.state).fallback
    }

    pub fn last_fetched_at(&self) -> Option<DateTime<Utc>> {
        lock(&self.state).last_fetched_at
    }

    /// Read the collection.
    ///
    /// Serves the cached records when they are fresh and `force` is not
    /// set. Otherwise fetches from the backend, with concurrent callers
    /// collapsing onto one in-flight request: non-forced callers take
    /// the result of the fetch already running, forced callers queue
    /// behind it and then issue their own.
    pub async fn fetch(&self, force: bool) -> Result<Vec<T>> {
        let ticket = loop {
            let notified = self.fetch_done.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut entry = lock(&self.state);
                if !force
                    && !entry.records.is_empty()
                    && !entry.fallback
                    && !entry.is_stale(self.policy.stale_after)
                {
                    return Ok(entry.records.clone());
                }
                if !entry.loading {
                    entry.loading = true;
                    entry.next_seq += 1;
                    break entry.next_seq;
                }
            }

            debug!(entity = %T::KIND, "awaiting in-flight fetch");
            notified.as_mut().await;
            if !force {
                return Ok(lock(&self.state).records.clone());
            }
        };

        debug!(entity = %T::KIND, force, "fetching from backend");
        let outcome = tokio::time::timeout(
            self.policy.fetch_timeout,
            self.backend.read_collection(T::KIND.table()),
        )
        .await;
        self.apply_fetch_outcome(ticket, outcome)
    }

    fn apply_fetch_outcome(
        &self,
        ticket: u64,
        outcome: Result<crate::backend::BackendResult<Vec<Value>>, tokio::time::error::Elapsed>,
    ) -> Result<Vec<T>> {
        let result = {
            let mut entry = lock(&self.state);
            entry.loading = false;

            match outcome {
                Ok(Ok(rows)) => match parse_rows::<T>(rows) {
                    Ok(records) => {
                        if ticket >= entry.applied_seq {
                            entry.applied_seq = ticket;
                            entry.records = records.clone();
                            entry.last_fetched_at = Some(Utc::now());
                            entry.fallback = false;
                            entry.revision += 1;
                            debug!(
                                entity = %T::KIND,
                                count = records.len(),
                                revision = entry.revision,
                                "cache updated"
                            );
                            Ok(records)
                        } else {
                            debug!(entity = %T::KIND, ticket, "discarding superseded fetch result");
                            Ok(entry.records.clone())
                        }
                    }
                    Err(error) => {
                        self.notifier
                            .error(format!("Could not load {}: {error}", T::KIND.label()));
                        Err(error.into())
                    }
                },
                Ok(Err(error)) => {
                    warn!(entity = %T::KIND, %error, "fetch failed");
                    self.notifier
                        .error(format!("Could not load {}: {error}", T::KIND.label()));
                    Err(error.into())
                }
                Err(_elapsed) => {
                    warn!(entity = %T::KIND, "fetch timed out");
                    if entry.records.is_empty() {
                        entry.records = T::demo_collection();
                        entry.fallback = true;
                        entry.revision += 1;
                        info!(entity = %T::KIND, "serving placeholder collection");
                    }
                    Ok(entry.records.clone())
                }
            }
        };
        self.fetch_done.notify_waiters();
        result
    }

    /// Create a record through the backend and resync.
    ///
    /// An empty business id is assigned client-side before the insert.
    /// Returns the record as the backend stored it.
    pub async fn create(&self, mut record: T) -> Result<T> {
        if record.business_id().is_empty() {
            record.set_business_id(generate_id(T::KIND.id_prefix()));
        }

        let mut payload = serde_json::to_value(&record)?;
        if let Some(object) = payload.as_object_mut() {
            // The backend assigns the numeric id.
            object.remove("id");
        }

        let created = match self.backend.insert_record(T::KIND.table(), payload).await {
            Ok(value) => value,
            Err(error) => {
                self.notifier.error(format!(
                    "Could not create {}: {error}",
                    T::KIND.label()
                ));
                return Err(error.into());
            }
        };
        let created: T = serde_json::from_value(created)?;
        info!(entity = %T::KIND, id = created.id(), "record created");

        self.resync_after_write().await;
        Ok(created)
    }

    /// Patch a record through the backend and resync.
    pub async fn update(&self, id: i64, patch: Value) -> Result<T> {
        let updated = match self.backend.update_record(T::KIND.table(), id, patch).await {
            Ok(value) => value,
            Err(error) => {
                self.notifier.error(format!(
                    "Could not save changes to {}: {error}",
                    T::KIND.label()
                ));
                return Err(error.into());
            }
        };
        let updated: T = serde_json::from_value(updated)?;

        self.resync_after_write().await;
        Ok(updated)
    }

    async fn resync_after_write(&self) {
        if let Err(error) = self.fetch(true).await {
            warn!(entity = %T::KIND, %error, "resync after write failed");
        }
    }
}

fn parse_rows<T: Entity>(rows: Vec<Value>) -> serde_json::Result<Vec<T>> {
    rows.into_iter().map(serde_json::from_value).collect()
}

/// The six entity caches plus the background refresh timer.
pub struct Store {
    backend: Arc<dyn Backend>,
    notifier: Notifier,
    refresh_interval: StdDuration,
    pub projects: EntityCache<Project>,
    pub deviations: EntityCache<Deviation>,
    pub additional_tasks: EntityCache<AdditionalTask>,
    pub drawings: EntityCache<Drawing>,
    pub employees: EntityCache<Employee>,
    pub customers: EntityCache<Customer>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl Store {
    pub fn new(backend: Arc<dyn Backend>, config: &Config) -> Arc<Self> {
        let notifier = Notifier::default();
        let policy = CachePolicy::from(config);

        Arc::new(Self {
            projects: EntityCache::new(Arc::clone(&backend), notifier.clone(), policy),
            deviations: EntityCache::new(Arc::clone(&backend), notifier.clone(), policy),
            additional_tasks: EntityCache::new(Arc::clone(&backend), notifier.clone(), policy),
            drawings: EntityCache::new(Arc::clone(&backend), notifier.clone(), policy),
            employees: EntityCache::new(Arc::clone(&backend), notifier.clone(), policy),
            customers: EntityCache::new(Arc::clone(&backend), notifier.clone(), policy),
            refresh_interval: config.refresh_interval(),
            backend,
            notifier,
            tasks: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Warm every cache. Individual failures are logged and surfaced as
    /// notifications by the caches themselves; warm-up itself never
    /// fails.
    pub async fn fetch_all(&self) {
        let (projects, deviations, tasks, drawings, employees, customers) = tokio::join!(
            self.projects.fetch(false),
            self.deviations.fetch(false),
            self.additional_tasks.fetch(false),
            self.drawings.fetch(false),
            self.employees.fetch(false),
            self.customers.fetch(false),
        );
        log_warmup(EntityKind::Project, &projects);
        log_warmup(EntityKind::Deviation, &deviations);
        log_warmup(EntityKind::AdditionalTask, &tasks);
        log_warmup(EntityKind::Drawing, &drawings);
        log_warmup(EntityKind::Employee, &employees);
        log_warmup(EntityKind::Customer, &customers);
    }

    /// Force a refetch of one collection.
    pub async fn refetch(&self, kind: EntityKind) -> Result<()> {
        match kind {
            EntityKind::Project => self.projects.fetch(true).await.map(|_| ()),
            EntityKind::Deviation => self.deviations.fetch(true).await.map(|_| ()),
            EntityKind::AdditionalTask => self.additional_tasks.fetch(true).await.map(|_| ()),
            EntityKind::Drawing => self.drawings.fetch(true).await.map(|_| ()),
            EntityKind::Employee => self.employees.fetch(true).await.map(|_| ()),
            EntityKind::Customer => self.customers.fetch(true).await.map(|_| ()),
        }
    }

    pub fn is_stale(&self, kind: EntityKind) -> bool {
        match kind {
            EntityKind::Project => self.projects.is_stale(),
            EntityKind::Deviation => self.deviations.is_stale(),
            EntityKind::AdditionalTask => self.additional_tasks.is_stale(),
            EntityKind::Drawing => self.drawings.is_stale(),
            EntityKind::Employee => self.employees.is_stale(),
            EntityKind::Customer => self.customers.is_stale(),
        }
    }

    pub fn loading(&self, kind: EntityKind) -> bool {
        match kind {
            EntityKind::Project => self.projects.loading(),
            EntityKind::Deviation => self.deviations.loading(),
            EntityKind::AdditionalTask => self.additional_tasks.loading(),
            EntityKind::Drawing => self.drawings.loading(),
            EntityKind::Employee => self.employees.loading(),
            EntityKind::Customer => self.customers.loading(),
        }
    }

    /// Start the background timer that refetches stale collections.
    pub fn start_refresh_timer(self: &Arc<Self>) {
        let store = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(store.refresh_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately; warm-up already ran.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                for kind in EntityKind::ALL {
                    if store.is_stale(kind) {
                        debug!(entity = %kind, "background refresh");
                        if let Err(error) = store.refetch(kind).await {
                            warn!(entity = %kind, %error, "background refresh failed");
                        }
                    }
                }
            }
        });
        lock(&self.tasks).push(handle);
    }

    /// Stop background tasks. Safe to call more than once.
    pub fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        for handle in lock(&self.tasks).drain(..) {
            handle.abort();
        }
        debug!("store shut down");
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn log_warmup<T>(kind: EntityKind, result: &Result<Vec<T>>) {
    match result {
        Ok(records) => debug!(entity = %kind, count = records.len(), "warmed"),
        Err(error) => warn!(entity = %kind, %error, "warm-up fetch failed"),
    }
}

#[cfg(test)]
impl<T: Entity> EntityCache<T> {
    pub(crate) fn for_tests() -> Self {
        Self::with_backend(Arc::new(crate::backend::MemoryBackend::new()))
    }

    pub(crate) fn with_backend(backend: Arc<dyn Backend>) -> Self {
        Self::new(
            backend,
            Notifier::default(),
            CachePolicy {
                stale_after: Duration::minutes(5),
                fetch_timeout: StdDuration::from_secs(1),
            },
        )
    }

    pub(crate) fn install_records(&self, records: Vec<T>) {
        let mut entry = lock(&self.state);
        entry.records = records;
        entry.last_fetched_at = Some(Utc::now());
        entry.revision += 1;
    }

    /// Backdate the last fetch so the entry reads as stale.
    pub(crate) fn age_last_fetch(&self, by: Duration) {
        let mut entry = lock(&self.state);
        if let Some(at) = entry.last_fetched_at {
            entry.last_fetched_at = Some(at - by);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use serde_json::json;

    fn seeded_backend() -> Arc<MemoryBackend> {
        let backend = Arc::new(MemoryBackend::new());
        backend.seed(
            "projects",
            vec![
                json!({ "id": 1, "project_id": "P-A", "name": "Harbour warehouse" }),
                json!({ "id": 2, "project_id": "P-B", "name": "School extension" }),
            ],
        );
        backend
    }

    #[tokio::test]
    async fn test_fresh_cache_serves_without_backend_call() {
        let backend = seeded_backend();
        let cache: EntityCache<Project> = EntityCache::with_backend(backend.clone());

        let first = cache.fetch(false).await.expect("fetch");
        assert_eq!(first.len(), 2);
        let second = cache.fetch(false).await.expect("fetch");
        assert_eq!(second.len(), 2);
        assert_eq!(backend.read_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_fetches_collapse_to_one_request() {
        let backend = seeded_backend();
        backend.set_read_delay(Some(StdDuration::from_millis(10)));
        let cache: EntityCache<Project> = EntityCache::with_backend(backend.clone());

        let (a, b) = tokio::join!(cache.fetch(false), cache.fetch(false));
        assert_eq!(a.expect("fetch").len(), 2);
        assert_eq!(b.expect("fetch").len(), 2);
        assert_eq!(backend.read_count(), 1);
    }

    #[tokio::test]
    async fn test_stale_entry_refetches() {
        let backend = seeded_backend();
        let cache: EntityCache<Project> = EntityCache::with_backend(backend.clone());

        cache.fetch(false).await.expect("fetch");
        assert!(!cache.is_stale());

        cache.age_last_fetch(Duration::minutes(10));
        assert!(cache.is_stale());

        cache.fetch(false).await.expect("fetch");
        assert_eq!(backend.read_count(), 2);
        assert!(!cache.is_stale());
    }

    #[tokio::test]
    async fn test_force_bypasses_fresh_cache() {
        let backend = seeded_backend();
        let cache: EntityCache<Project> = EntityCache::with_backend(backend.clone());

        cache.fetch(false).await.expect("fetch");
        cache.fetch(true).await.expect("fetch");
        assert_eq!(backend.read_count(), 2);
    }

    #[tokio::test]
    async fn test_create_assigns_business_id_and_resyncs_once() {
        let backend = seeded_backend();
        let cache: EntityCache<Project> = EntityCache::with_backend(backend.clone());
        cache.fetch(false).await.expect("fetch");

        let created = cache
            .create(Project::new("Office refurbishment"))
            .await
            .expect("create");
        assert!(created.project_id.starts_with("P-"));
        assert!(created.id > 0);

        // One warm-up read plus exactly one resync after the insert.
        assert_eq!(backend.read_count(), 2);
        assert_eq!(cache.snapshot().len(), 3);
    }

    #[tokio::test]
    async fn test_create_keeps_existing_business_id() {
        let backend = Arc::new(MemoryBackend::new());
        let cache: EntityCache<Project> = EntityCache::with_backend(backend.clone());

        let mut record = Project::new("Depot");
        record.project_id = "P-KEEP-1".to_string();
        let created = cache.create(record).await.expect("create");
        assert_eq!(created.project_id, "P-KEEP-1");
    }

    #[tokio::test]
    async fn test_update_resyncs() {
        let backend = seeded_backend();
        let cache: EntityCache<Project> = EntityCache::with_backend(backend.clone());
        cache.fetch(false).await.expect("fetch");

        let updated = cache
            .update(1, json!({ "name": "Harbour warehouse phase 2" }))
            .await
            .expect("update");
        assert_eq!(updated.name, "Harbour warehouse phase 2");

        let names: Vec<String> = cache.snapshot().iter().map(|p| p.name.clone()).collect();
        assert!(names.contains(&"Harbour warehouse phase 2".to_string()));
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_records_and_notifies() {
        let backend = seeded_backend();
        let cache: EntityCache<Project> = EntityCache::with_backend(backend.clone());
        cache.fetch(false).await.expect("fetch");

        backend.set_fail_reads(true);
        assert!(cache.fetch(true).await.is_err());
        assert_eq!(cache.snapshot().len(), 2);
        assert!(!cache.loading());

        let drained = cache.notifier.drain();
        assert_eq!(drained.len(), 1);
        assert!(drained[0].message.contains("Could not load projects"));

        // The failure did not stamp freshness, so the next read retries.
        backend.set_fail_reads(false);
        cache.age_last_fetch(Duration::minutes(10));
        cache.fetch(false).await.expect("fetch");
        assert_eq!(backend.read_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_installs_demo_fallback() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_read_delay(Some(StdDuration::from_secs(30)));
        let cache: EntityCache<Project> = EntityCache::with_backend(backend.clone());

        let records = cache.fetch(false).await.expect("fetch");
        assert!(!records.is_empty());
        assert!(records.iter().all(|p| p.name.starts_with("Demo:")));
        assert!(cache.is_fallback());
        assert!(!cache.loading());

        // A timeout is not an error the user needs to act on.
        assert!(cache.notifier.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_is_replaced_by_real_data() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_read_delay(Some(StdDuration::from_secs(30)));
        let cache: EntityCache<Project> = EntityCache::with_backend(backend.clone());

        cache.fetch(false).await.expect("fetch");
        assert!(cache.is_fallback());

        backend.set_read_delay(None);
        backend.seed("projects", vec![json!({ "id": 1, "name": "Real" })]);

        let records = cache.fetch(false).await.expect("fetch");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Real");
        assert!(!cache.is_fallback());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_keeps_populated_cache() {
        let backend = seeded_backend();
        let cache: EntityCache<Project> = EntityCache::with_backend(backend.clone());
        cache.fetch(false).await.expect("fetch");

        backend.set_read_delay(Some(StdDuration::from_secs(30)));
        cache.age_last_fetch(Duration::minutes(10));

        // Last-known-good rows beat the placeholder collection.
        let records = cache.fetch(false).await.expect("fetch");
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|p| !p.name.starts_with("Demo:")));
        assert!(!cache.is_fallback());
        assert!(!cache.loading());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_timer_refetches_stale_entries() {
        let backend = seeded_backend();
        let store = Store::new(backend.clone(), &Config::default());
        store.fetch_all().await;
        assert_eq!(backend.read_count(), 6);

        store.projects.age_last_fetch(Duration::minutes(10));
        store.start_refresh_timer();

        // Past one refresh interval only the backdated entry refetches.
        tokio::time::sleep(StdDuration::from_secs(61)).await;
        assert_eq!(backend.read_count(), 7);
        assert!(!store.projects.is_stale());

        store.shutdown();
    }

    #[tokio::test]
    async fn test_store_warms_all_collections() {
        let backend: Arc<MemoryBackend> = seeded_backend();
        let store = Store::new(backend.clone(), &Config::default());

        store.fetch_all().await;
        assert_eq!(backend.read_count(), 6);
        assert_eq!(store.projects.snapshot().len(), 2);
        assert!(!store.is_stale(EntityKind::Project));

        store.shutdown();
        store.shutdown();
    }

    #[tokio::test]
    async fn test_store_refetch_dispatches_by_kind() {
        let backend = seeded_backend();
        let store = Store::new(backend.clone(), &Config::default());

        store.refetch(EntityKind::Project).await.expect("refetch");
        assert_eq!(backend.read_count(), 1);
        assert_eq!(store.projects.snapshot().len(), 2);
    }
}
