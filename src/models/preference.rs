//! Per-user preferences and bookmarks

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Prefix of preference keys holding a saved search state
pub const SEARCH_PREFIX: &str = "search.";

/// Dotted lowercase identifiers, e.g. `theme` or `search.books`
pub static PREFERENCE_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_]*(\.[a-z0-9_]+)*$").expect("valid key regex"));

/// Upper bound on a serialized preference value
pub const MAX_VALUE_BYTES: usize = 16 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Preference {
    pub key: String,
    #[schema(value_type = Object)]
    pub value: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetPreference {
    #[schema(value_type = Object)]
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Bookmark {
    pub user_id: Uuid,
    pub book_id: Uuid,
    pub created_at: DateTime<Utc>,
}
