//! Borrowing endpoints

use axum::{
    extract::{Path, RawQuery, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::borrowing::{BorrowingDetails, BorrowingRecord, CreateBorrowing},
    query::{BorrowingPage, Page},
};

use super::{search_request, AuthenticatedUser, SearchParams};

/// Result of an overdue sweep
#[derive(Serialize, ToSchema)]
pub struct SweepResponse {
    /// Number of borrowings newly marked overdue
    pub marked_overdue: usize,
}

/// Search all borrowing records (staff)
#[utoipa::path(
    get,
    path = "/borrowings",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(SearchParams),
    responses(
        (status = 200, description = "Page of borrowings", body = BorrowingPage),
        (status = 400, description = "Invalid query"),
        (status = 403, description = "Staff only")
    )
)]
pub async fn list_borrowings(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    RawQuery(raw): RawQuery,
) -> AppResult<Json<Page<BorrowingDetails>>> {
    claims.require_staff()?;

    let (request, canonical) = search_request::<BorrowingDetails>(raw.as_deref(), &state)?;
    let page = state.services.borrowings.search(&request).await?;
    Ok(Json(page.with_query(canonical)))
}

/// Borrowing history of the current user
#[utoipa::path(
    get,
    path = "/borrowings/me",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(SearchParams),
    responses(
        (status = 200, description = "Page of borrowings", body = BorrowingPage),
        (status = 400, description = "Invalid query")
    )
)]
pub async fn my_borrowings(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    RawQuery(raw): RawQuery,
) -> AppResult<Json<Page<BorrowingDetails>>> {
    let (request, canonical) = search_request::<BorrowingDetails>(raw.as_deref(), &state)?;
    let page = state
        .services
        .borrowings
        .history(claims.user_id(), &request)
        .await?;
    Ok(Json(page.with_query(canonical)))
}

/// Borrowing history of a user
#[utoipa::path(
    get,
    path = "/users/{id}/borrowings",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "User ID"),
        SearchParams
    ),
    responses(
        (status = 200, description = "Page of borrowings", body = BorrowingPage),
        (status = 403, description = "Not your account")
    )
)]
pub async fn user_borrowings(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(user_id): Path<Uuid>,
    RawQuery(raw): RawQuery,
) -> AppResult<Json<Page<BorrowingDetails>>> {
    claims.require_self_or_staff(user_id)?;

    let (request, canonical) = search_request::<BorrowingDetails>(raw.as_deref(), &state)?;
    let page = state.services.borrowings.history(user_id, &request).await?;
    Ok(Json(page.with_query(canonical)))
}

#[utoipa::path(
    get,
    path = "/borrowings/{id}",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Borrowing ID")
    ),
    responses(
        (status = 200, description = "Borrowing details", body = BorrowingDetails),
        (status = 404, description = "Borrowing not found")
    )
)]
pub async fn get_borrowing(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<BorrowingDetails>> {
    let details = state.services.borrowings.get(&claims, id).await?;
    Ok(Json(details))
}

/// Borrow a book
#[utoipa::path(
    post,
    path = "/borrowings",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    request_body = CreateBorrowing,
    responses(
        (status = 201, description = "Book borrowed", body = BorrowingRecord),
        (status = 403, description = "Students borrow for themselves only"),
        (status = 404, description = "Book or user not found"),
        (status = 422, description = "No copy available, limit reached or already borrowed")
    )
)]
pub async fn create_borrowing(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<CreateBorrowing>,
) -> AppResult<(StatusCode, Json<BorrowingRecord>)> {
    let record = state.services.borrowings.borrow(&claims, request).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// Return a borrowed book
#[utoipa::path(
    post,
    path = "/borrowings/{id}/return",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Borrowing ID")
    ),
    responses(
        (status = 200, description = "Book returned, fine computed", body = BorrowingRecord),
        (status = 404, description = "Borrowing not found"),
        (status = 422, description = "Already returned")
    )
)]
pub async fn return_borrowing(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<BorrowingRecord>> {
    let record = state.services.borrowings.return_book(&claims, id).await?;
    Ok(Json(record))
}

/// Renew a borrowing
#[utoipa::path(
    post,
    path = "/borrowings/{id}/renew",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Borrowing ID")
    ),
    responses(
        (status = 200, description = "Borrowing renewed", body = BorrowingRecord),
        (status = 404, description = "Borrowing not found"),
        (status = 422, description = "Returned, overdue or renewal limit reached")
    )
)]
pub async fn renew_borrowing(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<BorrowingRecord>> {
    let record = state.services.borrowings.renew(&claims, id).await?;
    Ok(Json(record))
}

/// Mark the fine of a returned borrowing as paid (staff)
#[utoipa::path(
    post,
    path = "/borrowings/{id}/pay",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Borrowing ID")
    ),
    responses(
        (status = 200, description = "Fine paid", body = BorrowingRecord),
        (status = 422, description = "No outstanding fine")
    )
)]
pub async fn pay_fine(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<BorrowingRecord>> {
    claims.require_staff()?;

    let record = state.services.borrowings.pay_fine(id).await?;
    Ok(Json(record))
}

/// Run the overdue sweep now (admin)
#[utoipa::path(
    post,
    path = "/borrowings/sweep-overdue",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Sweep done", body = SweepResponse)
    )
)]
pub async fn sweep_overdue(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<SweepResponse>> {
    claims.require_admin()?;

    let marked_overdue = state.services.borrowings.sweep_overdue().await?;
    Ok(Json(SweepResponse { marked_overdue }))
}
