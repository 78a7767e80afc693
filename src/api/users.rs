//! User management endpoints

use axum::{
    extract::{Path, Query, RawQuery, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::user::{CreateUser, Profile, UpdateRole, UpdateUser},
    query::{Page, ProfilePage},
};

use super::{search_request, AuthenticatedUser, ForceQuery, SearchParams};

/// List users with search and pagination
#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    security(("bearer_auth" = [])),
    params(SearchParams),
    responses(
        (status = 200, description = "Page of users", body = ProfilePage),
        (status = 400, description = "Invalid query"),
        (status = 403, description = "Staff only")
    )
)]
pub async fn list_users(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    RawQuery(raw): RawQuery,
) -> AppResult<Json<Page<Profile>>> {
    claims.require_staff()?;

    let (request, canonical) = search_request::<Profile>(raw.as_deref(), &state)?;
    let page = state.services.users.search(&request).await?;
    Ok(Json(page.with_query(canonical)))
}

/// Get user details by ID
#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "users",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User details", body = Profile),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Profile>> {
    claims.require_self_or_staff(id)?;

    let user = state.services.users.get_by_id(id).await?;
    Ok(Json(user))
}

/// Create a new user
#[utoipa::path(
    post,
    path = "/users",
    tag = "users",
    security(("bearer_auth" = [])),
    request_body = CreateUser,
    responses(
        (status = 201, description = "User created", body = Profile),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Email already exists")
    )
)]
pub async fn create_user(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(user): Json<CreateUser>,
) -> AppResult<(StatusCode, Json<Profile>)> {
    claims.require_admin()?;

    let created = state.services.users.create_user(user).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Update an existing user
#[utoipa::path(
    put,
    path = "/users/{id}",
    tag = "users",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "User ID")
    ),
    request_body = UpdateUser,
    responses(
        (status = 200, description = "User updated", body = Profile),
        (status = 404, description = "User not found"),
        (status = 409, description = "Email already exists"),
        (status = 422, description = "Cannot deactivate own account or a user holding books")
    )
)]
pub async fn update_user(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(user): Json<UpdateUser>,
) -> AppResult<Json<Profile>> {
    claims.require_admin()?;

    let updated = state
        .services
        .users
        .update_user(claims.user_id(), id, user)
        .await?;
    Ok(Json(updated))
}

/// Change a user's role (admin only)
#[utoipa::path(
    put,
    path = "/users/{id}/role",
    tag = "users",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "User ID")
    ),
    request_body = UpdateRole,
    responses(
        (status = 200, description = "Role updated", body = Profile),
        (status = 403, description = "Admin privileges required"),
        (status = 404, description = "User not found")
    )
)]
pub async fn update_role(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateRole>,
) -> AppResult<Json<Profile>> {
    claims.require_admin()?;

    let updated = state
        .services
        .users
        .update_role(claims.user_id(), id, request.role)
        .await?;
    Ok(Json(updated))
}

/// Deactivate a user account
#[utoipa::path(
    delete,
    path = "/users/{id}",
    tag = "users",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "User ID"),
        ForceQuery
    ),
    responses(
        (status = 200, description = "User deactivated", body = Profile),
        (status = 404, description = "User not found"),
        (status = 422, description = "User still holds borrowed books")
    )
)]
pub async fn deactivate_user(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
    Query(params): Query<ForceQuery>,
) -> AppResult<Json<Profile>> {
    claims.require_admin()?;

    let updated = state
        .services
        .users
        .deactivate(claims.user_id(), id, params.force)
        .await?;
    Ok(Json(updated))
}
