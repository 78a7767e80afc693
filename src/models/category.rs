//! Book category model

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use crate::query::{FieldDef, FieldKind, Queryable, Schema, SortKey, Value};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Category {
    pub id: i32,
    pub name: String,
    pub name_arabic: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Number of books in this category
    pub book_count: i64,
}

static CATEGORY_SCHEMA: Lazy<Schema> = Lazy::new(|| {
    Schema::new("categories", "c.id")
        .with(FieldDef::new("id", "c.id", FieldKind::Integer).sortable())
        .with(FieldDef::new("name", "c.name", FieldKind::Text).sortable().searchable())
        .with(FieldDef::new("name_arabic", "c.name_arabic", FieldKind::Text).sortable().searchable())
        .with(FieldDef::new("description", "c.description", FieldKind::Text).searchable())
        .with(FieldDef::new("created_at", "c.created_at", FieldKind::Timestamp).sortable())
        .with(FieldDef::new("book_count", "book_count", FieldKind::Integer).sortable())
        .search_by_default(&["name", "name_arabic", "description"])
        .sort_by_default(vec![SortKey::asc("name")])
});

impl Queryable for Category {
    fn schema() -> &'static Schema {
        &CATEGORY_SCHEMA
    }

    fn field(&self, name: &str) -> Value {
        match name {
            "id" => self.id.into(),
            "name" => self.name.clone().into(),
            "name_arabic" => self.name_arabic.clone().into(),
            "description" => self.description.clone().into(),
            "created_at" => self.created_at.into(),
            "book_count" => self.book_count.into(),
            _ => Value::Null,
        }
    }
}

/// Create or replace category request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CategoryInput {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
    #[validate(length(max = 100, message = "Arabic name must be at most 100 characters"))]
    pub name_arabic: Option<String>,
    pub description: Option<String>,
}
