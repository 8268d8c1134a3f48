//! Additional tasks: extra work agreed outside the original contract.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::cmp_ignore_case;
use crate::views::{SortKey, Viewable};

use super::{Entity, EntityKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Proposed,
    Approved,
    InProgress,
    Done,
    #[serde(other)]
    Unknown,
}

impl TaskStatus {
    pub fn rank(&self) -> u8 {
        match self {
            TaskStatus::Proposed => 0,
            TaskStatus::Approved => 1,
            TaskStatus::InProgress => 2,
            TaskStatus::Done => 3,
            TaskStatus::Unknown => u8::MAX,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Proposed => "proposed",
            TaskStatus::Approved => "approved",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
            TaskStatus::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdditionalTask {
    #[serde(default)]
    pub id: i64,
    /// Business identifier, e.g. "AT-M1PX-lzq81v".
    #[serde(default)]
    pub task_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    /// Agreed price for the extra work, if quoted.
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub pinned: bool,
    /// Business id of the project this task belongs to.
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub assigned_to: Vec<i64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl AdditionalTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

impl Entity for AdditionalTask {
    const KIND: EntityKind = EntityKind::AdditionalTask;

    fn id(&self) -> i64 {
        self.id
    }

    fn business_id(&self) -> &str {
        &self.task_id
    }

    fn set_business_id(&mut self, id: String) {
        self.task_id = id;
    }

    fn pinned(&self) -> bool {
        self.pinned
    }

    fn set_pinned(&mut self, pinned: bool) {
        self.pinned = pinned;
    }
}

impl Viewable for AdditionalTask {
    fn search_haystack(&self) -> Vec<&str> {
        vec![self.title.as_str(), self.task_id.as_str()]
    }

    fn status_key(&self) -> &'static str {
        self.status.as_str()
    }

    fn status_rank(&self) -> u8 {
        self.status.rank()
    }

    fn team(&self) -> &[i64] {
        &self.assigned_to
    }

    fn cmp_by(&self, other: &Self, key: SortKey) -> Ordering {
        match key {
            SortKey::Name => cmp_ignore_case(&self.title, &other.title),
            SortKey::BusinessId => self.task_id.cmp(&other.task_id),
            SortKey::Created => self.created_at.cmp(&other.created_at),
            SortKey::Progress | SortKey::StartDate | SortKey::EndDate => {
                cmp_ignore_case(&self.title, &other.title)
            }
        }
    }
}
