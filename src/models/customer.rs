//! Customer directory records.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::cmp_ignore_case;
use crate::views::{SortKey, Viewable};

use super::{Entity, EntityKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomerStatus {
    #[default]
    Active,
    Prospect,
    Inactive,
    #[serde(other)]
    Unknown,
}

impl CustomerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CustomerStatus::Active => "active",
            CustomerStatus::Prospect => "prospect",
            CustomerStatus::Inactive => "inactive",
            CustomerStatus::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Customer {
    #[serde(default)]
    pub id: i64,
    /// Business identifier, e.g. "CUS-F8JD-lzq81v".
    #[serde(default)]
    pub customer_id: String,
    pub name: String,
    #[serde(default)]
    pub contact_person: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub status: CustomerStatus,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Customer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl Entity for Customer {
    const KIND: EntityKind = EntityKind::Customer;

    fn id(&self) -> i64 {
        self.id
    }

    fn business_id(&self) -> &str {
        &self.customer_id
    }

    fn set_business_id(&mut self, id: String) {
        self.customer_id = id;
    }

    fn pinned(&self) -> bool {
        self.pinned
    }

    fn set_pinned(&mut self, pinned: bool) {
        self.pinned = pinned;
    }

    fn demo_collection() -> Vec<Self> {
        vec![
            Customer {
                id: -1,
                customer_id: "CUS-DEMO-1".to_string(),
                name: "Demo: Nordhavn Ejendomme".to_string(),
                status: CustomerStatus::Active,
                ..Customer::default()
            },
            Customer {
                id: -2,
                customer_id: "CUS-DEMO-2".to_string(),
                name: "Demo: Vestkyst Byg".to_string(),
                status: CustomerStatus::Prospect,
                ..Customer::default()
            },
        ]
    }
}

impl Viewable for Customer {
    fn search_haystack(&self) -> Vec<&str> {
        let mut fields = vec![self.name.as_str(), self.customer_id.as_str()];
        if let Some(ref contact) = self.contact_person {
            fields.push(contact);
        }
        fields
    }

    fn status_key(&self) -> &'static str {
        self.status.as_str()
    }

    fn cmp_by(&self, other: &Self, key: SortKey) -> Ordering {
        match key {
            SortKey::BusinessId => self.customer_id.cmp(&other.customer_id),
            SortKey::Created => self.created_at.cmp(&other.created_at),
            _ => cmp_ignore_case(&self.name, &other.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_customer() {
        let customer: Customer = serde_json::from_str(
            r#"{ "id": 4, "name": "Nordhavn Ejendomme", "status": "prospect" }"#,
        )
        .expect("parse");
        assert_eq!(customer.status, CustomerStatus::Prospect);
        assert!(!customer.pinned);
    }
}
