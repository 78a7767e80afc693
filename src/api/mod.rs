//! API handlers for Maktaba REST endpoints

pub mod auth;
pub mod books;
pub mod borrowings;
pub mod categories;
pub mod events;
pub mod health;
pub mod openapi;
pub mod preferences;
pub mod settings;
pub mod stats;
pub mod users;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{
    error::{AppError, AppResult},
    models::user::UserClaims,
    query::{PageLimits, QueryState, Queryable, SearchRequest},
    AppState,
};

/// Extractor for authenticated user from JWT token
pub struct AuthenticatedUser(pub UserClaims);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Authentication("Missing authorization header".to_string()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Authentication("Invalid authorization header format".to_string()))?;

        authenticate(token, state).map(AuthenticatedUser)
    }
}

/// Validate a JWT with the configured secret
pub(crate) fn authenticate(token: &str, state: &AppState) -> AppResult<UserClaims> {
    UserClaims::from_token(token, &state.config.auth.jwt_secret)
        .map_err(|e| AppError::Authentication(e.to_string()))
}

/// URL search parameters shared by every list endpoint
#[derive(Debug, IntoParams)]
#[into_params(parameter_in = Query)]
#[allow(dead_code)]
pub struct SearchParams {
    /// Free-text search term
    q: Option<String>,
    /// Comma-separated fields the term is matched against
    fields: Option<String>,
    /// Repeatable `field:operator:value`, e.g. `publication_year:gte:1990`
    filter: Option<Vec<String>>,
    /// Comma-separated sort keys, `-` prefix for descending, e.g. `-publication_year,title`
    sort: Option<String>,
    /// Page number (default: 1)
    page: Option<i64>,
    /// Items per page
    per_page: Option<i64>,
}

/// `?force=true` overrides the active-borrowing check of destructive operations
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ForceQuery {
    #[serde(default)]
    pub force: bool,
}

/// Parse a raw URL query string into a validated request for `T`.
///
/// Also returns the canonical form of the query string, which clients echo
/// back into the address bar.
pub(crate) fn search_request<T: Queryable>(
    raw: Option<&str>,
    state: &AppState,
) -> AppResult<(SearchRequest, String)> {
    let query = QueryState::from_query_string(raw.unwrap_or_default())?;
    let request = query.clone().into_request(T::schema(), &page_limits(state))?;
    let canonical = query.with_pagination(&request.pagination).to_query_string();
    Ok((request, canonical))
}

pub(crate) fn page_limits(state: &AppState) -> PageLimits {
    PageLimits::from(&state.config.search)
}
