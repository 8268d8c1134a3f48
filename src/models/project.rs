//! Project records.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::cmp_ignore_case;
use crate::views::{SortKey, Viewable};

use super::{Entity, EntityKind};

/// Project lifecycle status.
///
/// The declaration order carries the fixed ranking used by the default
/// view sort: problems surface first, completed work sinks last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Problem,
    #[default]
    Active,
    Challenge,
    Completed,
    #[serde(other)]
    Unknown,
}

impl ProjectStatus {
    /// Position in the fixed status ordering; unranked statuses sort last.
    pub fn rank(&self) -> u8 {
        match self {
            ProjectStatus::Problem => 0,
            ProjectStatus::Active => 1,
            ProjectStatus::Challenge => 2,
            ProjectStatus::Completed => 3,
            ProjectStatus::Unknown => u8::MAX,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Problem => "problem",
            ProjectStatus::Active => "active",
            ProjectStatus::Challenge => "challenge",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Unknown => "unknown",
        }
    }
}

/// Priority shared by projects and deviations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    #[serde(other)]
    Unknown,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub id: i64,
    /// Business identifier, e.g. "P-X4K9-lzq81v". Assigned client-side.
    #[serde(default)]
    pub project_id: String,
    pub name: String,
    #[serde(default)]
    pub status: ProjectStatus,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub category: Option<String>,
    /// Completion percentage, 0 to 100.
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub customer_id: Option<i64>,
    #[serde(default)]
    pub team_member_ids: Vec<i64>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl Entity for Project {
    const KIND: EntityKind = EntityKind::Project;

    fn id(&self) -> i64 {
        self.id
    }

    fn business_id(&self) -> &str {
        &self.project_id
    }

    fn set_business_id(&mut self, id: String) {
        self.project_id = id;
    }

    fn pinned(&self) -> bool {
        self.pinned
    }

    fn set_pinned(&mut self, pinned: bool) {
        self.pinned = pinned;
    }

    fn demo_collection() -> Vec<Self> {
        vec![
            Project {
                id: -1,
                project_id: "P-DEMO-1".to_string(),
                name: "Demo: Harbour warehouse".to_string(),
                status: ProjectStatus::Active,
                progress: 45,
                ..Project::default()
            },
            Project {
                id: -2,
                project_id: "P-DEMO-2".to_string(),
                name: "Demo: School extension".to_string(),
                status: ProjectStatus::Problem,
                progress: 70,
                ..Project::default()
            },
            Project {
                id: -3,
                project_id: "P-DEMO-3".to_string(),
                name: "Demo: Office refurbishment".to_string(),
                status: ProjectStatus::Completed,
                progress: 100,
                ..Project::default()
            },
        ]
    }
}

impl Viewable for Project {
    fn search_haystack(&self) -> Vec<&str> {
        let mut fields = vec![self.name.as_str(), self.project_id.as_str()];
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

    fn progress(&self) -> Option<u8> {
        Some(self.progress)
    }

    fn team(&self) -> &[i64] {
        &self.team_member_ids
    }

    fn cmp_by(&self, other: &Self, key: SortKey) -> Ordering {
        match key {
            SortKey::Name => cmp_ignore_case(&self.name, &other.name),
            SortKey::BusinessId => self.project_id.cmp(&other.project_id),
            SortKey::Progress => self.progress.cmp(&other.progress),
            SortKey::StartDate => self.start_date.cmp(&other.start_date),
            SortKey::EndDate => self.end_date.cmp(&other.end_date),
            SortKey::Created => self.created_at.cmp(&other.created_at),
        }
    }
}
