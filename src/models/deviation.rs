//! Deviation reports raised against projects.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::cmp_ignore_case;
use crate::views::{SortKey, Viewable};

use super::{Entity, EntityKind, Priority};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviationStatus {
    #[default]
    Open,
    InProgress,
    Resolved,
    Closed,
    #[serde(other)]
    Unknown,
}

impl DeviationStatus {
    /// Open issues surface before resolved ones in the default sort.
    pub fn rank(&self) -> u8 {
        match self {
            DeviationStatus::Open => 0,
            DeviationStatus::InProgress => 1,
            DeviationStatus::Resolved => 2,
            DeviationStatus::Closed => 3,
            DeviationStatus::Unknown => u8::MAX,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviationStatus::Open => "open",
            DeviationStatus::InProgress => "in_progress",
            DeviationStatus::Resolved => "resolved",
            DeviationStatus::Closed => "closed",
            DeviationStatus::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Deviation {
    #[serde(default)]
    pub id: i64,
    /// Business identifier, e.g. "AFV-K2QX-lzq81v".
    #[serde(default)]
    pub deviation_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: DeviationStatus,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub pinned: bool,
    /// Business id of the project this deviation belongs to.
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub assigned_to: Vec<i64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Deviation {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

impl Entity for Deviation {
    const KIND: EntityKind = EntityKind::Deviation;

    fn id(&self) -> i64 {
        self.id
    }

    fn business_id(&self) -> &str {
        &self.deviation_id
    }

    fn set_business_id(&mut self, id: String) {
        self.deviation_id = id;
    }

    fn pinned(&self) -> bool {
        self.pinned
    }

    fn set_pinned(&mut self, pinned: bool) {
        self.pinned = pinned;
    }
}

impl Viewable for Deviation {
    fn search_haystack(&self) -> Vec<&str> {
        let mut fields = vec![self.title.as_str(), self.deviation_id.as_str()];
        if let Some(ref category) = self.category {
            fields.push(category);
        }
        fields
    }

    fn status_key(&self) -> &'static str {
        self.status.as_str()
    }

    fn status_rank(&self) -> u8 {
        self.status.rank()
    }

    fn category_key(&self) -> Option<&str> {
        self.category.as_deref()
    }

    fn priority_key(&self) -> Option<&'static str> {
        self.priority.map(|p| p.as_str())
    }

    fn team(&self) -> &[i64] {
        &self.assigned_to
    }

    fn cmp_by(&self, other: &Self, key: SortKey) -> Ordering {
        match key {
            SortKey::Name => cmp_ignore_case(&self.title, &other.title),
            SortKey::BusinessId => self.deviation_id.cmp(&other.deviation_id),
            SortKey::Created => self.created_at.cmp(&other.created_at),
            // Deviations carry no progress or schedule fields.
            SortKey::Progress | SortKey::StartDate | SortKey::EndDate => {
                cmp_ignore_case(&self.title, &other.title)
            }
        }
    }
}
