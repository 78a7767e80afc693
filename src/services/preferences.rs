//! User preferences and bookmarks

use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::Book,
        borrowing::BorrowingDetails,
        category::Category,
        preference::{Bookmark, Preference, MAX_VALUE_BYTES, PREFERENCE_KEY_RE, SEARCH_PREFIX},
        user::Profile,
    },
    query::{memory, PageLimits, Page, QueryState, Queryable, Schema, SearchRequest},
    repository::Repository,
};

#[derive(Clone)]
pub struct PreferencesService {
    repository: Repository,
    limits: PageLimits,
}

impl PreferencesService {
    pub fn new(repository: Repository, limits: PageLimits) -> Self {
        Self { repository, limits }
    }

    // =========================================================================
    // PREFERENCES
    // =========================================================================

    pub async fn list(&self, user_id: Uuid) -> AppResult<Vec<Preference>> {
        self.repository.preferences.list(user_id).await
    }

    pub async fn get(&self, user_id: Uuid, key: &str) -> AppResult<Preference> {
        self.repository.preferences.get(user_id, key).await
    }

    /// Store a preference; `search.*` keys must hold a valid query state
    pub async fn set(&self, user_id: Uuid, key: &str, value: serde_json::Value) -> AppResult<Preference> {
        check_preference(key, &value, &self.limits)?;
        self.repository.preferences.set(user_id, key, &value).await
    }

    pub async fn delete(&self, user_id: Uuid, key: &str) -> AppResult<()> {
        self.repository.preferences.delete(user_id, key).await
    }

    // =========================================================================
    // BOOKMARKS
    // =========================================================================

    /// Bookmarked books, filtered and sorted in memory
    pub async fn bookmarks(&self, user_id: Uuid, request: &SearchRequest) -> AppResult<Page<Book>> {
        let ids = self.repository.preferences.bookmarked_ids(user_id).await?;
        let books = self.repository.books.get_many(&ids).await?;
        Ok(memory::apply(&books, request)?)
    }

    pub async fn add_bookmark(&self, user_id: Uuid, book_id: Uuid) -> AppResult<Bookmark> {
        self.repository.books.get_by_id(book_id).await?;
        self.repository.preferences.add_bookmark(user_id, book_id).await
    }

    pub async fn remove_bookmark(&self, user_id: Uuid, book_id: Uuid) -> AppResult<()> {
        self.repository.preferences.remove_bookmark(user_id, book_id).await
    }
}

/// Validate a preference key and value before it is stored
pub fn check_preference(key: &str, value: &serde_json::Value, limits: &PageLimits) -> AppResult<()> {
    if !PREFERENCE_KEY_RE.is_match(key) {
        return Err(AppError::Validation(format!("Invalid preference key '{}'", key)));
    }

    let size = serde_json::to_vec(value)
        .map_err(|e| AppError::Internal(e.to_string()))?
        .len();
    if size > MAX_VALUE_BYTES {
        return Err(AppError::Validation(format!(
            "Preference value too large ({} bytes, max {})",
            size, MAX_VALUE_BYTES
        )));
    }

    if let Some(entity) = key.strip_prefix(SEARCH_PREFIX) {
        let state: QueryState = serde_json::from_value(value.clone())
            .map_err(|e| AppError::Validation(format!("Invalid saved search: {}", e)))?;
        if let Some(schema) = search_schema(entity) {
            state.into_request(schema, limits)?;
        }
    }
    Ok(())
}

/// Schema a saved search applies to, by the key suffix after `search.`
fn search_schema(entity: &str) -> Option<&'static Schema> {
    match entity {
        "books" | "bookmarks" => Some(Book::schema()),
        "categories" => Some(Category::schema()),
        "users" => Some(Profile::schema()),
        "borrowings" | "my_borrowings" => Some(BorrowingDetails::schema()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_search_schema_lookup() {
        assert_eq!(search_schema("books").map(|s| s.entity), Some("books"));
        assert_eq!(search_schema("my_borrowings").map(|s| s.entity), Some("borrowings"));
        assert!(search_schema("theme").is_none());
    }

    #[test]
    fn test_plain_preferences() {
        let limits = PageLimits::default();
        assert!(check_preference("theme", &json!("dark"), &limits).is_ok());
        assert!(check_preference("ui.language", &json!({"code": "ar"}), &limits).is_ok());
        assert!(matches!(
            check_preference("Theme", &json!("dark"), &limits),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_saved_search_must_be_valid() {
        let limits = PageLimits::default();
        let ok = json!({
            "search": "fiqh",
            "filters": [{"field": "publication_year", "operator": "gte", "value": 1900}],
            "sort": [{"field": "title", "direction": "asc"}]
        });
        assert!(check_preference("search.books", &ok, &limits).is_ok());

        let unknown_field = json!({"filters": [{"field": "colour", "operator": "eq", "value": "red"}]});
        assert!(matches!(
            check_preference("search.books", &unknown_field, &limits),
            Err(AppError::Query(_))
        ));

        assert!(matches!(
            check_preference("search.books", &json!("title=x"), &limits),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_value_size_limit() {
        let big = json!("x".repeat(MAX_VALUE_BYTES));
        assert!(check_preference("notes", &big, &PageLimits::default()).is_err());
    }
}
