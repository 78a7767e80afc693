//! Row change notifications

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Table whose rows are announced on the change feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChangeTable {
    Books,
    Categories,
    Borrowings,
    Profiles,
    Settings,
}

impl ChangeTable {
    pub const ALL: [ChangeTable; 5] = [
        ChangeTable::Books,
        ChangeTable::Categories,
        ChangeTable::Borrowings,
        ChangeTable::Profiles,
        ChangeTable::Settings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeTable::Books => "books",
            ChangeTable::Categories => "categories",
            ChangeTable::Borrowings => "borrowings",
            ChangeTable::Profiles => "profiles",
            ChangeTable::Settings => "settings",
        }
    }
}

impl std::str::FromStr for ChangeTable {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChangeTable::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| format!("Unknown table: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Insert,
    Update,
    Delete,
}

/// One committed write
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChangeEvent {
    pub table: ChangeTable,
    pub action: ChangeAction,
    /// Primary key of the changed row
    pub id: String,
    /// New row, absent for deletes
    #[schema(value_type = Option<Object>)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<serde_json::Value>,
    pub at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new<T: Serialize>(table: ChangeTable, action: ChangeAction, id: impl ToString, record: Option<&T>) -> Self {
        Self {
            table,
            action,
            id: id.to_string(),
            record: record.and_then(|r| serde_json::to_value(r).ok()),
            at: Utc::now(),
        }
    }

    pub fn deleted(table: ChangeTable, id: impl ToString) -> Self {
        Self::new::<()>(table, ChangeAction::Delete, id, None)
    }
}
