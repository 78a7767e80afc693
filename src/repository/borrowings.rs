//! Borrowing records repository for database operations
//!
//! Borrow, return and renew run in a transaction: the borrower row and the
//! record are locked, and copies are counted with conditional updates so
//! concurrent requests cannot drive `available_copies` out of range.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sqlx::{Pool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::borrowing::{BorrowingDetails, BorrowingPolicy, BorrowingRecord, BorrowingStatus},
    query::{Queryable, SearchRequest, SqlTranslator},
};

const DETAILS_COLUMNS: &str = r#"
    SELECT br.id, br.user_id, p.full_name AS user_name, br.book_id,
           b.title AS book_title, b.author AS book_author,
           br.borrowed_at, br.due_date, br.returned_at, br.status,
           br.renewal_count, br.fine_amount, br.fine_paid, br.notes
    FROM borrowing_records br
    JOIN profiles p ON p.id = br.user_id
    JOIN books b ON b.id = br.book_id
"#;

const RECORD_COLUMNS: &str = r#"
    SELECT id, user_id, book_id, borrowed_at, due_date, returned_at, status,
           renewal_count, fine_amount, fine_paid, notes
    FROM borrowing_records
"#;

#[derive(Clone)]
pub struct BorrowingsRepository {
    pool: Pool<Postgres>,
}

impl BorrowingsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    // =========================================================================
    // READ
    // =========================================================================

    pub async fn get_by_id(&self, id: Uuid) -> AppResult<BorrowingRecord> {
        sqlx::query_as::<_, BorrowingRecord>(&format!("{} WHERE id = $1", RECORD_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Borrowing with id {} not found", id)))
    }

    pub async fn get_details(&self, id: Uuid) -> AppResult<BorrowingDetails> {
        sqlx::query_as::<_, BorrowingDetails>(&format!("{} WHERE br.id = $1", DETAILS_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Borrowing with id {} not found", id)))
    }

    /// Whole borrowing history of a user, newest first
    pub async fn list_for_user(&self, user_id: Uuid) -> AppResult<Vec<BorrowingDetails>> {
        let records = sqlx::query_as::<_, BorrowingDetails>(&format!(
            "{} WHERE br.user_id = $1 ORDER BY br.borrowed_at DESC",
            DETAILS_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    /// Search all records with pagination
    pub async fn search(&self, request: &SearchRequest) -> AppResult<(Vec<BorrowingDetails>, i64)> {
        let translator = SqlTranslator::new(BorrowingDetails::schema());

        let mut count = QueryBuilder::<Postgres>::new(
            r#"
            SELECT COUNT(*) FROM borrowing_records br
            JOIN profiles p ON p.id = br.user_id
            JOIN books b ON b.id = br.book_id
            WHERE 1=1
            "#,
        );
        translator.push_conditions(&mut count, request)?;
        let total = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut query = QueryBuilder::<Postgres>::new(DETAILS_COLUMNS);
        query.push(" WHERE 1=1");
        translator.push_conditions(&mut query, request)?;
        translator.push_order_by(&mut query, request)?;
        translator.push_pagination(&mut query, &request.pagination);

        let records = query
            .build_query_as::<BorrowingDetails>()
            .fetch_all(&self.pool)
            .await?;
        Ok((records, total))
    }

    /// Count unreturned borrowings of a user
    pub async fn count_open_for_user(&self, user_id: Uuid) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM borrowing_records WHERE user_id = $1 AND returned_at IS NULL",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Count unreturned borrowings of a book
    pub async fn count_open_for_book(&self, book_id: Uuid) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM borrowing_records WHERE book_id = $1 AND returned_at IS NULL",
        )
        .bind(book_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    // =========================================================================
    // WORKFLOW
    // =========================================================================

    /// Borrow one copy of a book
    pub async fn borrow(
        &self,
        user_id: Uuid,
        book_id: Uuid,
        policy: &BorrowingPolicy,
        notes: Option<&str>,
    ) -> AppResult<BorrowingRecord> {
        let mut tx = self.pool.begin().await?;

        // Serialize borrows of the same user
        let active: bool = sqlx::query_scalar("SELECT is_active FROM profiles WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", user_id)))?;

        if !active {
            return Err(AppError::BusinessRule("Account is deactivated".to_string()));
        }

        let open: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM borrowing_records WHERE user_id = $1 AND returned_at IS NULL",
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        if open >= policy.max_books as i64 {
            return Err(AppError::BusinessRule(format!(
                "Maximum borrowings reached ({}/{})",
                open, policy.max_books
            )));
        }

        let already: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM borrowing_records WHERE user_id = $1 AND book_id = $2 AND returned_at IS NULL)",
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_one(&mut *tx)
        .await?;

        if already {
            return Err(AppError::BusinessRule("Book is already borrowed by this user".to_string()));
        }

        let taken = sqlx::query(
            "UPDATE books SET available_copies = available_copies - 1, updated_at = NOW() WHERE id = $1 AND available_copies > 0",
        )
        .bind(book_id)
        .execute(&mut *tx)
        .await?;

        if taken.rows_affected() == 0 {
            let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM books WHERE id = $1)")
                .bind(book_id)
                .fetch_one(&mut *tx)
                .await?;
            return Err(if exists {
                AppError::BusinessRule("No copy of this book is available".to_string())
            } else {
                AppError::NotFound(format!("Book with id {} not found", book_id))
            });
        }

        let now = Utc::now();
        let record = sqlx::query_as::<_, BorrowingRecord>(
            r#"
            INSERT INTO borrowing_records (id, user_id, book_id, borrowed_at, due_date, status, renewal_count, fine_amount, fine_paid, notes)
            VALUES ($1, $2, $3, $4, $5, $6, 0, 0, FALSE, $7)
            RETURNING id, user_id, book_id, borrowed_at, due_date, returned_at, status,
                      renewal_count, fine_amount, fine_paid, notes
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(book_id)
        .bind(now)
        .bind(policy.due_date(now))
        .bind(BorrowingStatus::Active)
        .bind(notes)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(record)
    }

    /// Close a borrowing, charge the fine and put the copy back
    pub async fn return_book(&self, id: Uuid, policy: &BorrowingPolicy) -> AppResult<BorrowingRecord> {
        let mut tx = self.pool.begin().await?;

        let record = sqlx::query_as::<_, BorrowingRecord>(&format!("{} WHERE id = $1 FOR UPDATE", RECORD_COLUMNS))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Borrowing with id {} not found", id)))?;

        if !record.is_open() {
            return Err(AppError::BusinessRule("Book has already been returned".to_string()));
        }

        let now = Utc::now();
        let fine = policy.accrued_fine(record.due_date, now);

        let record = sqlx::query_as::<_, BorrowingRecord>(
            r#"
            UPDATE borrowing_records
            SET returned_at = $2, status = $3, fine_amount = $4, fine_paid = ($4 = 0)
            WHERE id = $1
            RETURNING id, user_id, book_id, borrowed_at, due_date, returned_at, status,
                      renewal_count, fine_amount, fine_paid, notes
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(BorrowingStatus::Returned)
        .bind(fine)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE books SET available_copies = available_copies + 1, updated_at = NOW() WHERE id = $1 AND available_copies < total_copies",
        )
        .bind(record.book_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(record)
    }

    /// Extend the due date of an open, non-overdue borrowing by the loan period
    pub async fn renew(&self, id: Uuid, policy: &BorrowingPolicy) -> AppResult<BorrowingRecord> {
        let mut tx = self.pool.begin().await?;

        let record = sqlx::query_as::<_, BorrowingRecord>(&format!("{} WHERE id = $1 FOR UPDATE", RECORD_COLUMNS))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Borrowing with id {} not found", id)))?;

        if !record.is_open() {
            return Err(AppError::BusinessRule("Book has already been returned".to_string()));
        }
        if record.status == BorrowingStatus::Overdue || record.due_date < Utc::now() {
            return Err(AppError::BusinessRule("Overdue borrowings cannot be renewed".to_string()));
        }
        if record.renewal_count >= policy.max_renewals {
            return Err(AppError::BusinessRule(format!(
                "Maximum renewals reached ({}/{})",
                record.renewal_count, policy.max_renewals
            )));
        }

        let due_date = record.due_date + Duration::days(policy.loan_days as i64);
        let record = sqlx::query_as::<_, BorrowingRecord>(
            r#"
            UPDATE borrowing_records
            SET due_date = $2, renewal_count = renewal_count + 1
            WHERE id = $1
            RETURNING id, user_id, book_id, borrowed_at, due_date, returned_at, status,
                      renewal_count, fine_amount, fine_paid, notes
            "#,
        )
        .bind(id)
        .bind(due_date)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(record)
    }

    /// Mark active borrowings past their due date as overdue
    pub async fn mark_overdue(&self) -> AppResult<Vec<BorrowingRecord>> {
        let records = sqlx::query_as::<_, BorrowingRecord>(
            r#"
            UPDATE borrowing_records SET status = 'overdue'
            WHERE status = 'active' AND returned_at IS NULL AND due_date < NOW()
            RETURNING id, user_id, book_id, borrowed_at, due_date, returned_at, status,
                      renewal_count, fine_amount, fine_paid, notes
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    /// Record payment of a returned borrowing's fine
    pub async fn pay_fine(&self, id: Uuid) -> AppResult<BorrowingRecord> {
        let record = self.get_by_id(id).await?;
        if record.is_open() {
            return Err(AppError::BusinessRule("Fine is settled when the book is returned".to_string()));
        }
        if record.fine_amount <= Decimal::ZERO || record.fine_paid {
            return Err(AppError::BusinessRule("No outstanding fine".to_string()));
        }

        let record = sqlx::query_as::<_, BorrowingRecord>(
            r#"
            UPDATE borrowing_records SET fine_paid = TRUE
            WHERE id = $1
            RETURNING id, user_id, book_id, borrowed_at, due_date, returned_at, status,
                      renewal_count, fine_amount, fine_paid, notes
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(record)
    }
}
