//! Employee directory records.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::utils::cmp_ignore_case;
use crate::views::{SortKey, Viewable};

use super::{Entity, EntityKind};

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Employee {
    #[serde(default)]
    pub id: i64,
    /// Business identifier, e.g. "EMP-B3WN-lzq81v".
    #[serde(default)]
    pub employee_id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

impl Employee {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            employee_id: String::new(),
            name: name.into(),
            email: None,
            phone: None,
            role: None,
            active: true,
        }
    }
}

impl Entity for Employee {
    const KIND: EntityKind = EntityKind::Employee;

    fn id(&self) -> i64 {
        self.id
    }

    fn business_id(&self) -> &str {
        &self.employee_id
    }

    fn set_business_id(&mut self, id: String) {
        self.employee_id = id;
    }
}

impl Viewable for Employee {
    fn search_haystack(&self) -> Vec<&str> {
        let mut fields = vec![self.name.as_str(), self.employee_id.as_str()];
        if let Some(ref role) = self.role {
            fields.push(role);
        }
        fields
    }

    fn status_key(&self) -> &'static str {
        if self.active {
            "active"
        } else {
            "inactive"
        }
    }

    fn cmp_by(&self, other: &Self, key: SortKey) -> Ordering {
        match key {
            SortKey::BusinessId => self.employee_id.cmp(&other.employee_id),
            _ => cmp_ignore_case(&self.name, &other.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_defaults_true() {
        let employee: Employee =
            serde_json::from_str(r#"{ "name": "Jonas Berg" }"#).expect("parse");
        assert!(employee.active);
        assert_eq!(employee.status_key(), "active");
    }
}
