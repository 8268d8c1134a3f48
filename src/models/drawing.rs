//! Drawing revisions linked to projects.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::cmp_ignore_case;
use crate::views::{SortKey, Viewable};

use super::{Entity, EntityKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawingStatus {
    #[default]
    Draft,
    Review,
    Approved,
    Superseded,
    #[serde(other)]
    Unknown,
}

impl DrawingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DrawingStatus::Draft => "draft",
            DrawingStatus::Review => "review",
            DrawingStatus::Approved => "approved",
            DrawingStatus::Superseded => "superseded",
            DrawingStatus::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Drawing {
    #[serde(default)]
    pub id: i64,
    /// Business identifier, e.g. "DWG-R7TQ-lzq81v".
    #[serde(default)]
    pub drawing_id: String,
    pub title: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub status: DrawingStatus,
    /// Link to the stored file; upload handling lives elsewhere.
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub pinned: bool,
    /// Business id of the project this drawing belongs to.
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Drawing {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

impl Entity for Drawing {
    const KIND: EntityKind = EntityKind::Drawing;

    fn id(&self) -> i64 {
        self.id
    }

    fn business_id(&self) -> &str {
        &self.drawing_id
    }

    fn set_business_id(&mut self, id: String) {
        self.drawing_id = id;
    }

    fn pinned(&self) -> bool {
        self.pinned
    }

    fn set_pinned(&mut self, pinned: bool) {
        self.pinned = pinned;
    }
}

impl Viewable for Drawing {
    fn search_haystack(&self) -> Vec<&str> {
        let mut fields = vec![self.title.as_str(), self.drawing_id.as_str()];
        if let Some(ref version) = self.version {
            fields.push(version);
        }
        fields
    }

    fn status_key(&self) -> &'static str {
        self.status.as_str()
    }

    fn cmp_by(&self, other: &Self, key: SortKey) -> Ordering {
        match key {
            SortKey::Name => cmp_ignore_case(&self.title, &other.title),
            SortKey::BusinessId => self.drawing_id.cmp(&other.drawing_id),
            SortKey::Created => self.created_at.cmp(&other.created_at),
            SortKey::Progress | SortKey::StartDate | SortKey::EndDate => {
                cmp_ignore_case(&self.title, &other.title)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_drawing() {
        let drawing: Drawing = serde_json::from_str(
            r#"{ "title": "Foundation plan", "version": "C", "status": "review" }"#,
        )
        .expect("parse");
        assert_eq!(drawing.status, DrawingStatus::Review);
        assert_eq!(drawing.version.as_deref(), Some("C"));
    }
}
