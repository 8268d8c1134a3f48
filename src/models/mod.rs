//! Domain records for the construction dashboard entities.
//!
//! One file per entity type:
//!
//! - `Project`: construction projects with status, progress and pinning
//! - `Deviation`: deviation reports raised against projects
//! - `AdditionalTask`: extra work agreed outside the original contract
//! - `Drawing`: drawing revisions linked to projects
//! - `Employee`, `Customer`: directory records
//!
//! All records implement [`Entity`], the contract the cache store and the
//! derived views are generic over.

pub mod customer;
pub mod deviation;
pub mod drawing;
pub mod employee;
pub mod project;
pub mod task;

pub use customer::{Customer, CustomerStatus};
pub use deviation::{Deviation, DeviationStatus};
pub use drawing::{Drawing, DrawingStatus};
pub use employee::Employee;
pub use project::{Priority, Project, ProjectStatus};
pub use task::{AdditionalTask, TaskStatus};

use std::fmt;

use serde::{de::DeserializeOwned, Serialize};

/// Entity types handled by the cache store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Project,
    Deviation,
    AdditionalTask,
    Drawing,
    Employee,
    Customer,
}

impl EntityKind {
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Project,
        EntityKind::Deviation,
        EntityKind::AdditionalTask,
        EntityKind::Drawing,
        EntityKind::Employee,
        EntityKind::Customer,
    ];

    /// Backing table name.
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Project => "projects",
            EntityKind::Deviation => "deviations",
            EntityKind::AdditionalTask => "additional_tasks",
            EntityKind::Drawing => "drawings",
            EntityKind::Employee => "employees",
            EntityKind::Customer => "customers",
        }
    }

    /// Prefix for client-assigned business identifiers.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            EntityKind::Project => "P-",
            EntityKind::Deviation => "AFV-",
            EntityKind::AdditionalTask => "AT-",
            EntityKind::Drawing => "DWG-",
            EntityKind::Employee => "EMP-",
            EntityKind::Customer => "CUS-",
        }
    }

    /// Human-facing plural label for notifications.
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Project => "projects",
            EntityKind::Deviation => "deviations",
            EntityKind::AdditionalTask => "additional tasks",
            EntityKind::Drawing => "drawings",
            EntityKind::Employee => "employees",
            EntityKind::Customer => "customers",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Behaviour shared by all cached entity records.
pub trait Entity: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    const KIND: EntityKind;

    /// Backend-assigned unique identifier.
    fn id(&self) -> i64;

    /// Human-facing business identifier ("P-...", "AFV-...").
    fn business_id(&self) -> &str;

    fn set_business_id(&mut self, id: String);

    /// Whether the record is pinned to the top of derived views.
    fn pinned(&self) -> bool {
        false
    }

    fn set_pinned(&mut self, _pinned: bool) {}

    /// Placeholder collection shown when a fetch times out.
    fn demo_collection() -> Vec<Self> {
        Vec::new()
    }
}
