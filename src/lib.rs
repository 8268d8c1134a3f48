//! sitesync - client-side data synchronization for a construction dashboard.
//!
//! The crate keeps a local cache of the dashboard's entity collections
//! (projects, deviations, additional tasks, drawings, employees,
//! customers) in sync with a remote store, and derives filtered, sorted
//! views from that cache. The pieces:
//!
//! - [`backend`]: the remote store boundary ([`backend::Backend`]), with
//!   a REST implementation and an in-memory one
//! - [`store`]: per-entity caches with staleness, single-flight fetches,
//!   write-then-resync and optimistic mutations
//! - [`views`]: pure filter/sort derivation with memoization
//! - [`reconciler`]: change-stream listeners that refetch on remote edits
//! - [`notify`]: the user-facing notification queue
//!
//! Typical setup:
//!
//! ```no_run
//! use std::sync::Arc;
//! use sitesync::{Config, Reconciler, RestBackend, Store};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let backend = Arc::new(RestBackend::from_config(&config)?);
//! let store = Store::new(backend, &config);
//! store.fetch_all().await;
//! store.start_refresh_timer();
//! let reconciler = Reconciler::spawn(&store);
//! # let _ = reconciler;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod ids;
pub mod models;
pub mod notify;
pub mod reconciler;
pub mod store;
pub mod utils;
pub mod views;

pub use backend::{Backend, BackendError, ChangeAction, ChangeEvent, MemoryBackend, RestBackend};
pub use config::Config;
pub use models::{
    AdditionalTask, Customer, Deviation, Drawing, Employee, Entity, EntityKind, Project,
};
pub use notify::{Level, Notification, Notifier};
pub use reconciler::Reconciler;
pub use store::{EntityCache, MutationState, PendingMutation, Store};
pub use views::{FilterState, SortDirection, SortKey, SortState, ViewState, Viewable};

use std::io;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the tracing subscriber for logging.
///
/// Use the RUST_LOG env var to control log level (e.g., RUST_LOG=debug).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}
