//! Borrowing workflow: borrow, return, renew, fines and overdue sweep

use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        borrowing::{BorrowingDetails, BorrowingRecord, CreateBorrowing},
        event::{ChangeAction, ChangeEvent, ChangeTable},
        user::UserClaims,
    },
    query::{memory, Page, SearchRequest},
    repository::Repository,
    services::events::ChangeFeed,
};

#[derive(Clone)]
pub struct BorrowingsService {
    repository: Repository,
    events: ChangeFeed,
}

impl BorrowingsService {
    pub fn new(repository: Repository, events: ChangeFeed) -> Self {
        Self { repository, events }
    }

    /// Borrow a book for the caller, or for another user when the caller is staff
    pub async fn borrow(&self, claims: &UserClaims, request: CreateBorrowing) -> AppResult<BorrowingRecord> {
        let user_id = request.user_id.unwrap_or_else(|| claims.user_id());
        claims.require_self_or_staff(user_id)?;

        let user = self.repository.users.get_by_id(user_id).await?;
        let policy = self.repository.settings.policy_for(user.role).await?;

        let record = self
            .repository
            .borrowings
            .borrow(user_id, request.book_id, &policy, request.notes.as_deref())
            .await?;

        tracing::info!(
            borrowing_id = %record.id,
            user_id = %user_id,
            book_id = %record.book_id,
            due_date = %record.due_date,
            "book borrowed"
        );
        self.publish_change(ChangeAction::Insert, &record).await;
        Ok(record)
    }

    /// Return a borrowed book, charging the fine of the borrower's role
    pub async fn return_book(&self, claims: &UserClaims, id: Uuid) -> AppResult<BorrowingRecord> {
        let record = self.repository.borrowings.get_by_id(id).await?;
        claims.require_self_or_staff(record.user_id)?;

        let user = self.repository.users.get_by_id(record.user_id).await?;
        let policy = self.repository.settings.policy_for(user.role).await?;

        let record = self.repository.borrowings.return_book(id, &policy).await?;

        tracing::info!(borrowing_id = %id, fine = %record.fine_amount, "book returned");
        self.publish_change(ChangeAction::Update, &record).await;
        Ok(record)
    }

    pub async fn renew(&self, claims: &UserClaims, id: Uuid) -> AppResult<BorrowingRecord> {
        let record = self.repository.borrowings.get_by_id(id).await?;
        claims.require_self_or_staff(record.user_id)?;

        let user = self.repository.users.get_by_id(record.user_id).await?;
        let policy = self.repository.settings.policy_for(user.role).await?;

        let record = self.repository.borrowings.renew(id, &policy).await?;

        tracing::info!(borrowing_id = %id, due_date = %record.due_date, "borrowing renewed");
        self.events.publish(ChangeEvent::new(
            ChangeTable::Borrowings,
            ChangeAction::Update,
            record.id,
            Some(&record),
        ));
        Ok(record)
    }

    pub async fn pay_fine(&self, id: Uuid) -> AppResult<BorrowingRecord> {
        let record = self.repository.borrowings.pay_fine(id).await?;
        tracing::info!(borrowing_id = %id, amount = %record.fine_amount, "fine paid");
        self.events.publish(ChangeEvent::new(
            ChangeTable::Borrowings,
            ChangeAction::Update,
            record.id,
            Some(&record),
        ));
        Ok(record)
    }

    pub async fn get(&self, claims: &UserClaims, id: Uuid) -> AppResult<BorrowingDetails> {
        let details = self.repository.borrowings.get_details(id).await?;
        claims.require_self_or_staff(details.user_id)?;
        Ok(details)
    }

    /// Search across every borrowing record (staff)
    pub async fn search(&self, request: &SearchRequest) -> AppResult<Page<BorrowingDetails>> {
        let (records, total) = self.repository.borrowings.search(request).await?;
        Ok(Page::new(records, total, &request.pagination))
    }

    /// Query one user's history in memory
    pub async fn history(&self, user_id: Uuid, request: &SearchRequest) -> AppResult<Page<BorrowingDetails>> {
        let records = self.repository.borrowings.list_for_user(user_id).await?;
        Ok(memory::apply(&records, request)?)
    }

    /// Mark past-due borrowings as overdue; returns how many changed
    pub async fn sweep_overdue(&self) -> AppResult<usize> {
        let records = self.repository.borrowings.mark_overdue().await?;
        for record in &records {
            self.events.publish(ChangeEvent::new(
                ChangeTable::Borrowings,
                ChangeAction::Update,
                record.id,
                Some(record),
            ));
        }
        if !records.is_empty() {
            tracing::info!(count = records.len(), "borrowings marked overdue");
        }
        Ok(records.len())
    }

    /// Announce a borrowing change and the availability change of its book
    async fn publish_change(&self, action: ChangeAction, record: &BorrowingRecord) {
        self.events.publish(ChangeEvent::new(
            ChangeTable::Borrowings,
            action,
            record.id,
            Some(record),
        ));
        match self.repository.books.get_by_id(record.book_id).await {
            Ok(book) => self.events.publish(ChangeEvent::new(
                ChangeTable::Books,
                ChangeAction::Update,
                book.id,
                Some(&book),
            )),
            Err(AppError::NotFound(_)) => {}
            Err(e) => tracing::warn!(book_id = %record.book_id, error = %e, "could not load book for change event"),
        }
    }
}
