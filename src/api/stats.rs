//! Statistics endpoints

use axum::{extract::State, Json};

use crate::{error::AppResult, models::stats::DashboardStats};

use super::AuthenticatedUser;

/// Dashboard counts (staff)
#[utoipa::path(
    get,
    path = "/stats",
    tag = "stats",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Library statistics", body = DashboardStats),
        (status = 403, description = "Staff only")
    )
)]
pub async fn get_stats(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<DashboardStats>> {
    claims.require_staff()?;

    let stats = state.services.stats.dashboard().await?;
    Ok(Json(stats))
}
