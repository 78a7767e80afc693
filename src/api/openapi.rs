//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{
    auth, books, borrowings, categories, events, health, preferences, settings, stats, users,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Maktaba API",
        version = "0.4.0",
        description = "School library REST API: catalog, borrowing, users and declarative search",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        auth::login,
        auth::register,
        auth::me,
        auth::update_my_profile,
        // Books
        books::list_books,
        books::search_books,
        books::get_book,
        books::create_book,
        books::update_book,
        books::delete_book,
        // Categories
        categories::list_categories,
        categories::get_category,
        categories::create_category,
        categories::update_category,
        categories::delete_category,
        // Users
        users::list_users,
        users::get_user,
        users::create_user,
        users::update_user,
        users::update_role,
        users::deactivate_user,
        // Borrowings
        borrowings::list_borrowings,
        borrowings::my_borrowings,
        borrowings::user_borrowings,
        borrowings::get_borrowing,
        borrowings::create_borrowing,
        borrowings::return_borrowing,
        borrowings::renew_borrowing,
        borrowings::pay_fine,
        borrowings::sweep_overdue,
        // Preferences
        preferences::list_preferences,
        preferences::get_preference,
        preferences::set_preference,
        preferences::delete_preference,
        preferences::list_bookmarks,
        preferences::add_bookmark,
        preferences::remove_bookmark,
        // Settings
        settings::get_settings,
        settings::update_settings,
        // Stats
        stats::get_stats,
        // Events
        events::stream_events,
    ),
    components(
        schemas(
            // Search
            crate::query::SearchRequest,
            crate::query::FilterCondition,
            crate::query::SortKey,
            crate::query::SortDirection,
            crate::query::TextSearch,
            crate::query::Pagination,
            crate::query::QueryState,
            crate::query::BookPage,
            crate::query::CategoryPage,
            crate::query::ProfilePage,
            crate::query::BorrowingPage,
            // Books
            crate::models::book::Book,
            crate::models::book::CreateBook,
            crate::models::book::UpdateBook,
            crate::models::category::Category,
            crate::models::category::CategoryInput,
            // Users
            crate::models::user::Role,
            crate::models::user::Profile,
            crate::models::user::RegisterRequest,
            crate::models::user::CreateUser,
            crate::models::user::UpdateUser,
            crate::models::user::UpdateProfile,
            crate::models::user::UpdateRole,
            crate::models::user::LoginRequest,
            crate::models::user::LoginResponse,
            // Borrowings
            crate::models::borrowing::BorrowingStatus,
            crate::models::borrowing::BorrowingRecord,
            crate::models::borrowing::BorrowingDetails,
            crate::models::borrowing::BorrowingPolicy,
            crate::models::borrowing::CreateBorrowing,
            borrowings::SweepResponse,
            // Preferences
            crate::models::preference::Preference,
            crate::models::preference::SetPreference,
            crate::models::preference::Bookmark,
            // Settings
            crate::models::settings::LibraryInfo,
            crate::models::settings::SettingsResponse,
            crate::models::settings::UpdateSettingsRequest,
            // Stats
            crate::models::stats::DashboardStats,
            crate::models::stats::BookStats,
            crate::models::stats::BorrowingStats,
            crate::models::stats::UserStats,
            crate::models::stats::StatEntry,
            // Events
            crate::models::event::ChangeEvent,
            crate::models::event::ChangeTable,
            crate::models::event::ChangeAction,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Authentication endpoints"),
        (name = "books", description = "Book catalog"),
        (name = "categories", description = "Book categories"),
        (name = "users", description = "User management"),
        (name = "borrowings", description = "Borrowing, returns, renewals and fines"),
        (name = "preferences", description = "User preferences, saved searches and bookmarks"),
        (name = "settings", description = "Library information and borrowing policies"),
        (name = "stats", description = "Statistics"),
        (name = "events", description = "Live change notifications")
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_search_endpoints() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/books"));
        assert!(doc.paths.paths.contains_key("/books/search"));
        assert!(doc.paths.paths.contains_key("/borrowings/{id}/renew"));
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
        assert!(components.schemas.contains_key("BookPage"));
    }
}
