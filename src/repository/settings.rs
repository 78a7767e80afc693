//! Library information and borrowing policies

use chrono::Utc;
use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::{
        borrowing::BorrowingPolicy,
        settings::{LibraryInfo, UpdateSettingsRequest},
        user::Role,
    },
};

#[derive(Clone)]
pub struct SettingsRepository {
    pool: Pool<Postgres>,
}

impl SettingsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn library_info(&self) -> AppResult<LibraryInfo> {
        sqlx::query_as::<_, LibraryInfo>(
            r#"
            SELECT name, name_arabic, address, phone, email, opening_hours, announcement, updated_at
            FROM library_info
            "#,
        )
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::Internal("Library information is missing".to_string()))
    }

    pub async fn policies(&self) -> AppResult<Vec<BorrowingPolicy>> {
        let policies = sqlx::query_as::<_, BorrowingPolicy>(
            r#"
            SELECT role, max_books, loan_days, max_renewals, fine_per_day, grace_days, max_fine
            FROM borrowing_policies
            ORDER BY CASE role WHEN 'student' THEN 0 WHEN 'teacher' THEN 1 ELSE 2 END
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(policies)
    }

    /// Borrowing policy applying to a role
    pub async fn policy_for(&self, role: Role) -> AppResult<BorrowingPolicy> {
        sqlx::query_as::<_, BorrowingPolicy>(
            r#"
            SELECT role, max_books, loan_days, max_renewals, fine_per_day, grace_days, max_fine
            FROM borrowing_policies
            WHERE role = $1
            "#,
        )
        .bind(role)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::Internal(format!("No borrowing policy for role {}", role)))
    }

    /// Apply an update; all sections are written in one transaction
    pub async fn update(&self, request: &UpdateSettingsRequest) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        if let Some(library) = &request.library {
            sqlx::query(
                r#"
                UPDATE library_info SET
                    name = $1, name_arabic = $2, address = $3, phone = $4, email = $5,
                    opening_hours = $6, announcement = $7, updated_at = $8
                "#,
            )
            .bind(&library.name)
            .bind(&library.name_arabic)
            .bind(&library.address)
            .bind(&library.phone)
            .bind(&library.email)
            .bind(&library.opening_hours)
            .bind(&library.announcement)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
        }

        for policy in request.policies.iter().flatten() {
            sqlx::query(
                r#"
                INSERT INTO borrowing_policies (role, max_books, loan_days, max_renewals, fine_per_day, grace_days, max_fine)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (role) DO UPDATE SET
                    max_books = EXCLUDED.max_books,
                    loan_days = EXCLUDED.loan_days,
                    max_renewals = EXCLUDED.max_renewals,
                    fine_per_day = EXCLUDED.fine_per_day,
                    grace_days = EXCLUDED.grace_days,
                    max_fine = EXCLUDED.max_fine
                "#,
            )
            .bind(policy.role)
            .bind(policy.max_books)
            .bind(policy.loan_days)
            .bind(policy.max_renewals)
            .bind(policy.fine_per_day)
            .bind(policy.grace_days)
            .bind(policy.max_fine)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
