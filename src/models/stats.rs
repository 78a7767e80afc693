//! Dashboard statistics

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct DashboardStats {
    pub books: BookStats,
    pub borrowings: BorrowingStats,
    pub users: UserStats,
}

#[derive(Debug, Serialize, FromRow, ToSchema)]
pub struct BookStats {
    /// Number of titles
    pub titles: i64,
    pub total_copies: i64,
    pub available_copies: i64,
    pub digital: i64,
    /// Titles per category
    #[sqlx(skip)]
    pub by_category: Vec<StatEntry>,
}

#[derive(Debug, Serialize, FromRow, ToSchema)]
pub struct BorrowingStats {
    pub active: i64,
    pub overdue: i64,
    pub returned_today: i64,
    /// Sum of fines charged on returned books and not yet paid
    pub unpaid_fines: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserStats {
    pub total: i64,
    /// Users holding at least one unreturned book
    pub borrowing: i64,
    pub by_role: Vec<StatEntry>,
}

#[derive(Debug, Serialize, FromRow, ToSchema)]
pub struct StatEntry {
    pub label: String,
    pub value: i64,
}
