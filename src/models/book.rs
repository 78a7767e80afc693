//! Book (catalog entry) model and related types

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::query::{
    value::normalize_text, FieldDef, FieldKind, Queryable, Schema, SortKey, Value,
};

/// ISBN-10 or ISBN-13 once hyphens and spaces are removed
static ISBN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(97[89])?\d{9}[\dXx]$").expect("valid isbn regex"));

/// Strip hyphens and spaces from an ISBN
pub fn clean_isbn(isbn: &str) -> String {
    isbn.chars().filter(|c| !matches!(c, '-' | ' ')).collect()
}

pub fn validate_isbn(isbn: &str) -> Result<(), ValidationError> {
    if ISBN_RE.is_match(&clean_isbn(isbn)) {
        Ok(())
    } else {
        let mut err = ValidationError::new("isbn");
        err.message = Some("Invalid ISBN format".into());
        Err(err)
    }
}

/// Available copies once `total` becomes `new_total`; `None` when loans exceed the new total.
///
/// The book UPDATE applies the same arithmetic in its WHERE clause.
pub fn available_after_resize(total: i32, available: i32, new_total: i32) -> Option<i32> {
    let available = available + (new_total - total);
    (available >= 0).then_some(available)
}

/// Book from database, joined with its category name
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: Uuid,
    pub title: String,
    pub title_arabic: Option<String>,
    pub author: String,
    pub author_arabic: Option<String>,
    pub isbn: Option<String>,
    pub publisher: Option<String>,
    pub publication_year: Option<i32>,
    /// ISO 639-1 code
    pub language: String,
    pub category_id: Option<i32>,
    pub category_name: Option<String>,
    pub description: Option<String>,
    pub cover_url: Option<String>,
    pub pages: Option<i32>,
    pub total_copies: i32,
    pub available_copies: i32,
    pub is_digital: bool,
    pub digital_url: Option<String>,
    pub tags: Vec<String>,
    /// Shelf location
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

static BOOK_SCHEMA: Lazy<Schema> = Lazy::new(|| {
    Schema::new("books", "b.id")
        .with(FieldDef::new("id", "b.id", FieldKind::Uuid))
        .with(FieldDef::new("title", "b.title", FieldKind::Text).sortable().searchable())
        .with(FieldDef::new("title_arabic", "b.title_arabic", FieldKind::Text).sortable().searchable())
        .with(FieldDef::new("author", "b.author", FieldKind::Text).sortable().searchable())
        .with(FieldDef::new("author_arabic", "b.author_arabic", FieldKind::Text).sortable().searchable())
        .with(FieldDef::new("isbn", "b.isbn", FieldKind::Text).searchable())
        .with(FieldDef::new("publisher", "b.publisher", FieldKind::Text).sortable().searchable())
        .with(FieldDef::new("publication_year", "b.publication_year", FieldKind::Integer).sortable())
        .with(FieldDef::new("language", "b.language", FieldKind::Text).sortable())
        .with(FieldDef::new("category_id", "b.category_id", FieldKind::Integer).sortable())
        .with(FieldDef::new("category_name", "c.name", FieldKind::Text).sortable().searchable())
        .with(FieldDef::new("description", "b.description", FieldKind::Text).searchable())
        .with(FieldDef::new("pages", "b.pages", FieldKind::Integer).sortable())
        .with(FieldDef::new("total_copies", "b.total_copies", FieldKind::Integer).sortable())
        .with(FieldDef::new("available_copies", "b.available_copies", FieldKind::Integer).sortable())
        .with(FieldDef::new("is_digital", "b.is_digital", FieldKind::Boolean).sortable())
        .with(FieldDef::new("tags", "b.tags", FieldKind::TextArray).searchable())
        .with(FieldDef::new("location", "b.location", FieldKind::Text).sortable())
        .with(FieldDef::new("created_at", "b.created_at", FieldKind::Timestamp).sortable())
        .with(FieldDef::new("updated_at", "b.updated_at", FieldKind::Timestamp).sortable())
        .search_by_default(&["title", "title_arabic", "author", "author_arabic", "isbn", "tags"])
        .sort_by_default(vec![SortKey::asc("title")])
});

impl Queryable for Book {
    fn schema() -> &'static Schema {
        &BOOK_SCHEMA
    }

    fn field(&self, name: &str) -> Value {
        match name {
            "id" => self.id.into(),
            "title" => self.title.clone().into(),
            "title_arabic" => self.title_arabic.clone().into(),
            "author" => self.author.clone().into(),
            "author_arabic" => self.author_arabic.clone().into(),
            "isbn" => self.isbn.clone().into(),
            "publisher" => self.publisher.clone().into(),
            "publication_year" => self.publication_year.into(),
            "language" => self.language.clone().into(),
            "category_id" => self.category_id.into(),
            "category_name" => self.category_name.clone().into(),
            "description" => self.description.clone().into(),
            "pages" => self.pages.into(),
            "total_copies" => self.total_copies.into(),
            "available_copies" => self.available_copies.into(),
            "is_digital" => self.is_digital.into(),
            "tags" => self.tags.clone().into(),
            "location" => self.location.clone().into(),
            "created_at" => self.created_at.into(),
            "updated_at" => self.updated_at.into(),
            _ => Value::Null,
        }
    }
}

/// Create book request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    #[validate(length(min = 1, max = 300, message = "Title must be 1-300 characters"))]
    pub title: String,
    pub title_arabic: Option<String>,
    #[validate(length(min = 1, max = 200, message = "Author must be 1-200 characters"))]
    pub author: String,
    pub author_arabic: Option<String>,
    #[validate(custom(function = "validate_isbn"))]
    pub isbn: Option<String>,
    pub publisher: Option<String>,
    #[validate(range(min = 600, max = 2100, message = "Publication year out of range"))]
    pub publication_year: Option<i32>,
    #[validate(length(min = 2, max = 5, message = "Language code must be 2-5 characters"))]
    pub language: Option<String>,
    pub category_id: Option<i32>,
    pub description: Option<String>,
    #[validate(url(message = "Invalid cover URL"))]
    pub cover_url: Option<String>,
    #[validate(range(min = 1, message = "Pages must be positive"))]
    pub pages: Option<i32>,
    #[validate(range(min = 0, max = 10000, message = "Copies must be 0-10000"))]
    pub total_copies: Option<i32>,
    pub is_digital: Option<bool>,
    #[validate(url(message = "Invalid digital URL"))]
    pub digital_url: Option<String>,
    pub tags: Option<Vec<String>>,
    pub location: Option<String>,
}

impl CreateBook {
    /// NFC-normalize text fields, clean the ISBN and lowercase tags
    pub fn normalized(mut self) -> Self {
        self.title = normalize_text(self.title.trim());
        self.author = normalize_text(self.author.trim());
        self.title_arabic = self.title_arabic.map(|s| normalize_text(s.trim()));
        self.author_arabic = self.author_arabic.map(|s| normalize_text(s.trim()));
        self.isbn = self.isbn.map(|s| clean_isbn(&s).to_uppercase());
        self.tags = self.tags.map(normalize_tags);
        self
    }
}

/// Update book request: absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateBook {
    #[validate(length(min = 1, max = 300, message = "Title must be 1-300 characters"))]
    pub title: Option<String>,
    pub title_arabic: Option<String>,
    #[validate(length(min = 1, max = 200, message = "Author must be 1-200 characters"))]
    pub author: Option<String>,
    pub author_arabic: Option<String>,
    #[validate(custom(function = "validate_isbn"))]
    pub isbn: Option<String>,
    pub publisher: Option<String>,
    #[validate(range(min = 600, max = 2100, message = "Publication year out of range"))]
    pub publication_year: Option<i32>,
    #[validate(length(min = 2, max = 5, message = "Language code must be 2-5 characters"))]
    pub language: Option<String>,
    pub category_id: Option<i32>,
    pub description: Option<String>,
    #[validate(url(message = "Invalid cover URL"))]
    pub cover_url: Option<String>,
    #[validate(range(min = 1, message = "Pages must be positive"))]
    pub pages: Option<i32>,
    #[validate(range(min = 0, max = 10000, message = "Copies must be 0-10000"))]
    pub total_copies: Option<i32>,
    pub is_digital: Option<bool>,
    #[validate(url(message = "Invalid digital URL"))]
    pub digital_url: Option<String>,
    pub tags: Option<Vec<String>>,
    pub location: Option<String>,
}

impl UpdateBook {
    pub fn normalized(mut self) -> Self {
        self.title = self.title.map(|s| normalize_text(s.trim()));
        self.author = self.author.map(|s| normalize_text(s.trim()));
        self.title_arabic = self.title_arabic.map(|s| normalize_text(s.trim()));
        self.author_arabic = self.author_arabic.map(|s| normalize_text(s.trim()));
        self.isbn = self.isbn.map(|s| clean_isbn(&s).to_uppercase());
        self.tags = self.tags.map(normalize_tags);
        self
    }
}

fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = normalize_text(tag.trim()).to_lowercase();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}
