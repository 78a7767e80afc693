//! Borrowing record model, borrowing policies and fine computation

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, FromRow, Postgres};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::user::Role;
use crate::query::{FieldDef, FieldKind, Queryable, Schema, SortKey, Value};

/// Borrowing status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BorrowingStatus {
    Active,
    Overdue,
    Returned,
}

impl BorrowingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BorrowingStatus::Active => "active",
            BorrowingStatus::Overdue => "overdue",
            BorrowingStatus::Returned => "returned",
        }
    }
}

impl std::fmt::Display for BorrowingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BorrowingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(BorrowingStatus::Active),
            "overdue" => Ok(BorrowingStatus::Overdue),
            "returned" => Ok(BorrowingStatus::Returned),
            _ => Err(format!("Invalid borrowing status: {}", s)),
        }
    }
}

// SQLx conversion for BorrowingStatus (stored as TEXT)
impl sqlx::Type<Postgres> for BorrowingStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<Postgres>>::type_info()
    }
}

impl<'r> Decode<'r, Postgres> for BorrowingStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s: String = Decode::<Postgres>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl Encode<'_, Postgres> for BorrowingStatus {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        <&str as Encode<Postgres>>::encode(self.as_str(), buf)
    }
}

/// Borrowing record from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BorrowingRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub book_id: Uuid,
    pub borrowed_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub status: BorrowingStatus,
    pub renewal_count: i32,
    pub fine_amount: Decimal,
    pub fine_paid: bool,
    pub notes: Option<String>,
}

impl BorrowingRecord {
    pub fn is_open(&self) -> bool {
        self.returned_at.is_none()
    }
}

/// Borrowing record joined with book and borrower names
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BorrowingDetails {
    pub id: Uuid,
    pub user_id: Uuid,
    pub user_name: String,
    pub book_id: Uuid,
    pub book_title: String,
    pub book_author: String,
    pub borrowed_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub status: BorrowingStatus,
    pub renewal_count: i32,
    pub fine_amount: Decimal,
    pub fine_paid: bool,
    pub notes: Option<String>,
}

static BORROWING_SCHEMA: Lazy<Schema> = Lazy::new(|| {
    Schema::new("borrowings", "br.id")
        .with(FieldDef::new("id", "br.id", FieldKind::Uuid))
        .with(FieldDef::new("user_id", "br.user_id", FieldKind::Uuid))
        .with(FieldDef::new("user_name", "p.full_name", FieldKind::Text).sortable().searchable())
        .with(FieldDef::new("book_id", "br.book_id", FieldKind::Uuid))
        .with(FieldDef::new("book_title", "b.title", FieldKind::Text).sortable().searchable())
        .with(FieldDef::new("book_author", "b.author", FieldKind::Text).sortable().searchable())
        .with(FieldDef::new("borrowed_at", "br.borrowed_at", FieldKind::Timestamp).sortable())
        .with(FieldDef::new("due_date", "br.due_date", FieldKind::Timestamp).sortable())
        .with(FieldDef::new("returned_at", "br.returned_at", FieldKind::Timestamp).sortable())
        .with(FieldDef::new("status", "br.status", FieldKind::Text).sortable())
        .with(FieldDef::new("renewal_count", "br.renewal_count", FieldKind::Integer).sortable())
        .with(FieldDef::new("fine_amount", "br.fine_amount", FieldKind::Decimal).sortable())
        .with(FieldDef::new("fine_paid", "br.fine_paid", FieldKind::Boolean).sortable())
        .with(FieldDef::new("notes", "br.notes", FieldKind::Text).searchable())
        .search_by_default(&["book_title", "book_author", "user_name"])
        .sort_by_default(vec![SortKey::desc("borrowed_at")])
});

impl Queryable for BorrowingDetails {
    fn schema() -> &'static Schema {
        &BORROWING_SCHEMA
    }

    fn field(&self, name: &str) -> Value {
        match name {
            "id" => self.id.into(),
            "user_id" => self.user_id.into(),
            "user_name" => self.user_name.clone().into(),
            "book_id" => self.book_id.into(),
            "book_title" => self.book_title.clone().into(),
            "book_author" => self.book_author.clone().into(),
            "borrowed_at" => self.borrowed_at.into(),
            "due_date" => self.due_date.into(),
            "returned_at" => self.returned_at.into(),
            "status" => self.status.as_str().into(),
            "renewal_count" => self.renewal_count.into(),
            "fine_amount" => self.fine_amount.into(),
            "fine_paid" => self.fine_paid.into(),
            "notes" => self.notes.clone().into(),
            _ => Value::Null,
        }
    }
}

/// Borrowing rules for one role
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, Validate, ToSchema)]
pub struct BorrowingPolicy {
    pub role: Role,
    #[validate(range(min = 0, max = 100))]
    pub max_books: i32,
    #[validate(range(min = 1, max = 365))]
    pub loan_days: i32,
    #[validate(range(min = 0, max = 20))]
    pub max_renewals: i32,
    /// Fine per day late, in the library currency
    pub fine_per_day: Decimal,
    /// Days after the due date before fines accrue
    #[validate(range(min = 0, max = 60))]
    pub grace_days: i32,
    /// Upper bound of a single fine
    pub max_fine: Decimal,
}

impl BorrowingPolicy {
    /// Due date of a loan starting at `from`
    pub fn due_date(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        from + Duration::days(self.loan_days as i64)
    }

    /// Whole days late, counted from the due date
    pub fn days_late(due_date: DateTime<Utc>, at: DateTime<Utc>) -> i64 {
        (at - due_date).num_days().max(0)
    }

    /// `max(0, days_late - grace_days) * fine_per_day`, capped at `max_fine`
    pub fn accrued_fine(&self, due_date: DateTime<Utc>, returned_at: DateTime<Utc>) -> Decimal {
        let chargeable = (Self::days_late(due_date, returned_at) - self.grace_days as i64).max(0);
        let fine = self.fine_per_day * Decimal::from(chargeable);
        fine.min(self.max_fine).max(Decimal::ZERO)
    }

    /// Fines are non-negative amounts
    pub fn check_amounts(&self) -> Result<(), String> {
        if self.fine_per_day.is_sign_negative() || self.max_fine.is_sign_negative() {
            return Err("Fine amounts must not be negative".to_string());
        }
        Ok(())
    }
}

/// Borrow request; `user_id` defaults to the caller
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateBorrowing {
    pub book_id: Uuid,
    pub user_id: Option<Uuid>,
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn policy() -> BorrowingPolicy {
        BorrowingPolicy {
            role: Role::Student,
            max_books: 3,
            loan_days: 14,
            max_renewals: 2,
            fine_per_day: Decimal::new(50, 2),
            grace_days: 2,
            max_fine: Decimal::new(1000, 2),
        }
    }

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_no_fine_within_grace() {
        let p = policy();
        assert_eq!(p.accrued_fine(day(1), day(1)), Decimal::ZERO);
        assert_eq!(p.accrued_fine(day(10), day(3)), Decimal::ZERO);
        assert_eq!(p.accrued_fine(day(1), day(3)), Decimal::ZERO);
    }

    #[test]
    fn test_fine_after_grace() {
        let p = policy();
        // 5 days late, 2 grace days: 3 chargeable days at 0.50
        assert_eq!(p.accrued_fine(day(1), day(6)), Decimal::new(150, 2));
    }

    #[test]
    fn test_fine_is_capped() {
        let p = policy();
        assert_eq!(p.accrued_fine(day(1), day(31)), Decimal::new(1000, 2));
    }

    #[test]
    fn test_partial_days_do_not_count() {
        let p = BorrowingPolicy { grace_days: 0, ..policy() };
        let due = day(1);
        assert_eq!(p.accrued_fine(due, due + Duration::hours(23)), Decimal::ZERO);
        assert_eq!(p.accrued_fine(due, due + Duration::hours(25)), Decimal::new(50, 2));
    }

    #[test]
    fn test_due_date() {
        assert_eq!(policy().due_date(day(1)), day(15));
    }

    #[test]
    fn test_status_round_trip() {
        for s in [BorrowingStatus::Active, BorrowingStatus::Overdue, BorrowingStatus::Returned] {
            assert_eq!(s.as_str().parse::<BorrowingStatus>().unwrap(), s);
        }
    }
}
