//! Remote store boundary.
//!
//! The cache layer talks to the backend exclusively through the [`Backend`]
//! trait: a request/response call to read a collection, request/response
//! calls to write records, and a subscribe call delivering change
//! notifications for a table. Two implementations ship with the crate:
//!
//! - [`RestBackend`]: a PostgREST-style HTTP API over reqwest
//! - [`MemoryBackend`]: an in-process store for tests and demo setups

pub mod error;
pub mod memory;
pub mod rest;

pub use error::BackendError;
pub use memory::MemoryBackend;
pub use rest::RestBackend;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

pub type BackendResult<T> = Result<T, BackendError>;

/// Kind of remote mutation observed on a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    Insert,
    Update,
    Delete,
}

/// A change notification for one backing table.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub table: String,
    pub action: ChangeAction,
    /// Absent when the source cannot attribute the change to one record
    /// (e.g. a coalesced poll-based notification).
    pub record_id: Option<i64>,
}

/// Opaque request/response and subscribe/publish interface to the remote
/// data store. Records cross this boundary as raw JSON values; the cache
/// layer owns the typed view.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Read the full collection behind `table`.
    async fn read_collection(&self, table: &str) -> BackendResult<Vec<Value>>;

    /// Insert a record; the backend assigns the numeric id.
    async fn insert_record(&self, table: &str, payload: Value) -> BackendResult<Value>;

    /// Partially update the record with the given id.
    async fn update_record(&self, table: &str, id: i64, payload: Value) -> BackendResult<Value>;

    /// Open a change-notification stream for one table. Dropping the
    /// receiver releases the subscription.
    fn subscribe(&self, table: &str) -> BackendResult<broadcast::Receiver<ChangeEvent>>;
}
