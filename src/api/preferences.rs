//! Preference and bookmark endpoints

use axum::{
    extract::{Path, RawQuery, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        book::Book,
        preference::{Bookmark, Preference, SetPreference},
    },
    query::{BookPage, Page},
};

use super::{search_request, AuthenticatedUser, SearchParams};

#[utoipa::path(
    get,
    path = "/preferences",
    tag = "preferences",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "All preferences of the current user", body = Vec<Preference>)
    )
)]
pub async fn list_preferences(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<Preference>>> {
    let prefs = state.services.preferences.list(claims.user_id()).await?;
    Ok(Json(prefs))
}

#[utoipa::path(
    get,
    path = "/preferences/{key}",
    tag = "preferences",
    security(("bearer_auth" = [])),
    params(
        ("key" = String, Path, description = "Preference key, e.g. `theme` or `search.books`")
    ),
    responses(
        (status = 200, description = "Preference", body = Preference),
        (status = 404, description = "Preference not set")
    )
)]
pub async fn get_preference(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(key): Path<String>,
) -> AppResult<Json<Preference>> {
    let pref = state.services.preferences.get(claims.user_id(), &key).await?;
    Ok(Json(pref))
}

/// Set a preference; `search.*` keys hold a saved search state
#[utoipa::path(
    put,
    path = "/preferences/{key}",
    tag = "preferences",
    security(("bearer_auth" = [])),
    params(
        ("key" = String, Path, description = "Preference key")
    ),
    request_body = SetPreference,
    responses(
        (status = 200, description = "Preference stored", body = Preference),
        (status = 400, description = "Invalid key or value")
    )
)]
pub async fn set_preference(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(key): Path<String>,
    Json(request): Json<SetPreference>,
) -> AppResult<Json<Preference>> {
    let pref = state
        .services
        .preferences
        .set(claims.user_id(), &key, request.value)
        .await?;
    Ok(Json(pref))
}

#[utoipa::path(
    delete,
    path = "/preferences/{key}",
    tag = "preferences",
    security(("bearer_auth" = [])),
    params(
        ("key" = String, Path, description = "Preference key")
    ),
    responses(
        (status = 204, description = "Preference removed"),
        (status = 404, description = "Preference not set")
    )
)]
pub async fn delete_preference(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(key): Path<String>,
) -> AppResult<StatusCode> {
    state.services.preferences.delete(claims.user_id(), &key).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Bookmarked books of the current user
#[utoipa::path(
    get,
    path = "/bookmarks",
    tag = "preferences",
    security(("bearer_auth" = [])),
    params(SearchParams),
    responses(
        (status = 200, description = "Page of bookmarked books", body = BookPage),
        (status = 400, description = "Invalid query")
    )
)]
pub async fn list_bookmarks(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    RawQuery(raw): RawQuery,
) -> AppResult<Json<Page<Book>>> {
    let (request, canonical) = search_request::<Book>(raw.as_deref(), &state)?;
    let page = state
        .services
        .preferences
        .bookmarks(claims.user_id(), &request)
        .await?;
    Ok(Json(page.with_query(canonical)))
}

#[utoipa::path(
    put,
    path = "/bookmarks/{book_id}",
    tag = "preferences",
    security(("bearer_auth" = [])),
    params(
        ("book_id" = Uuid, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book bookmarked", body = Bookmark),
        (status = 404, description = "Book not found")
    )
)]
pub async fn add_bookmark(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(book_id): Path<Uuid>,
) -> AppResult<Json<Bookmark>> {
    let bookmark = state
        .services
        .preferences
        .add_bookmark(claims.user_id(), book_id)
        .await?;
    Ok(Json(bookmark))
}

#[utoipa::path(
    delete,
    path = "/bookmarks/{book_id}",
    tag = "preferences",
    security(("bearer_auth" = [])),
    params(
        ("book_id" = Uuid, Path, description = "Book ID")
    ),
    responses(
        (status = 204, description = "Bookmark removed"),
        (status = 404, description = "Book is not bookmarked")
    )
)]
pub async fn remove_bookmark(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(book_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state
        .services
        .preferences
        .remove_bookmark(claims.user_id(), book_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
