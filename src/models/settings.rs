//! Library information and settings payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use super::borrowing::BorrowingPolicy;
use super::user::PHONE_RE;

/// Library information shown to every user
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, Validate, ToSchema)]
pub struct LibraryInfo {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,
    pub name_arabic: Option<String>,
    pub address: Option<String>,
    #[validate(regex(path = *PHONE_RE, message = "Invalid phone number"))]
    pub phone: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    pub opening_hours: Option<String>,
    /// Banner text shown on the dashboard
    pub announcement: Option<String>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

/// Settings response
#[derive(Debug, Serialize, ToSchema)]
pub struct SettingsResponse {
    pub library: LibraryInfo,
    pub policies: Vec<BorrowingPolicy>,
}

/// Update settings request (admin); absent sections are left unchanged
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateSettingsRequest {
    #[validate(nested)]
    pub library: Option<LibraryInfo>,
    #[validate(nested)]
    pub policies: Option<Vec<BorrowingPolicy>>,
}
