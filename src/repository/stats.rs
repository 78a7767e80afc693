//! Aggregate counts for the dashboard

use sqlx::{Pool, Postgres};

use crate::{
    error::AppResult,
    models::stats::{BookStats, BorrowingStats, StatEntry, UserStats},
};

#[derive(Clone)]
pub struct StatsRepository {
    pool: Pool<Postgres>,
}

impl StatsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn books(&self) -> AppResult<BookStats> {
        let mut stats = sqlx::query_as::<_, BookStats>(
            r#"
            SELECT COUNT(*) AS titles,
                   COALESCE(SUM(total_copies), 0)::BIGINT AS total_copies,
                   COALESCE(SUM(available_copies), 0)::BIGINT AS available_copies,
                   COUNT(*) FILTER (WHERE is_digital) AS digital
            FROM books
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        stats.by_category = sqlx::query_as::<_, StatEntry>(
            r#"
            SELECT COALESCE(c.name, 'uncategorized') AS label, COUNT(*) AS value
            FROM books b
            LEFT JOIN categories c ON c.id = b.category_id
            GROUP BY c.name
            ORDER BY value DESC, label
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(stats)
    }

    pub async fn borrowings(&self) -> AppResult<BorrowingStats> {
        let stats = sqlx::query_as::<_, BorrowingStats>(
            r#"
            SELECT COUNT(*) FILTER (WHERE status = 'active') AS active,
                   COUNT(*) FILTER (WHERE status = 'overdue') AS overdue,
                   COUNT(*) FILTER (WHERE returned_at >= date_trunc('day', NOW())) AS returned_today,
                   COALESCE(SUM(fine_amount) FILTER (WHERE returned_at IS NOT NULL AND NOT fine_paid), 0) AS unpaid_fines
            FROM borrowing_records
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(stats)
    }

    pub async fn users(&self) -> AppResult<UserStats> {
        let by_role = sqlx::query_as::<_, StatEntry>(
            r#"
            SELECT role AS label, COUNT(*) AS value
            FROM profiles
            WHERE is_active
            GROUP BY role
            ORDER BY role
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let borrowing: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT user_id) FROM borrowing_records WHERE returned_at IS NULL",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(UserStats {
            total: by_role.iter().map(|e| e.value).sum(),
            borrowing,
            by_role,
        })
    }
}
