//! Catalog service: books and categories

use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{available_after_resize, Book, CreateBook, UpdateBook},
        category::{Category, CategoryInput},
        event::{ChangeAction, ChangeEvent, ChangeTable},
    },
    query::{memory, Page, SearchRequest},
    repository::Repository,
    services::events::ChangeFeed,
};

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
    events: ChangeFeed,
    /// Categories are few and read on every catalog page
    categories: Arc<RwLock<Option<Arc<Vec<Category>>>>>,
}

impl CatalogService {
    pub fn new(repository: Repository, events: ChangeFeed) -> Self {
        Self {
            repository,
            events,
            categories: Arc::new(RwLock::new(None)),
        }
    }

    // =========================================================================
    // CATEGORIES
    // =========================================================================

    async fn cached_categories(&self) -> AppResult<Arc<Vec<Category>>> {
        if let Some(list) = self.categories.read().await.as_ref() {
            return Ok(list.clone());
        }

        let mut guard = self.categories.write().await;
        if let Some(list) = guard.as_ref() {
            return Ok(list.clone());
        }
        let list = Arc::new(self.repository.categories.list().await?);
        *guard = Some(list.clone());
        Ok(list)
    }

    async fn invalidate_categories(&self) {
        *self.categories.write().await = None;
    }

    /// Filter, sort and page the category list in memory
    pub async fn list_categories(&self, request: &SearchRequest) -> AppResult<Page<Category>> {
        let categories = self.cached_categories().await?;
        Ok(memory::apply(&categories, request)?)
    }

    pub async fn get_category(&self, id: i32) -> AppResult<Category> {
        self.repository.categories.get_by_id(id).await
    }

    pub async fn create_category(&self, input: CategoryInput) -> AppResult<Category> {
        input.validate()?;

        if self.repository.categories.name_exists(&input.name, None).await? {
            return Err(AppError::Conflict(format!("Category '{}' already exists", input.name)));
        }

        let category = self.repository.categories.create(&input).await?;
        self.invalidate_categories().await;
        self.events.publish(ChangeEvent::new(
            ChangeTable::Categories,
            ChangeAction::Insert,
            category.id,
            Some(&category),
        ));
        Ok(category)
    }

    pub async fn update_category(&self, id: i32, input: CategoryInput) -> AppResult<Category> {
        input.validate()?;

        if self.repository.categories.name_exists(&input.name, Some(id)).await? {
            return Err(AppError::Conflict(format!("Category '{}' already exists", input.name)));
        }

        let category = self.repository.categories.update(id, &input).await?;
        self.invalidate_categories().await;
        self.events.publish(ChangeEvent::new(
            ChangeTable::Categories,
            ChangeAction::Update,
            category.id,
            Some(&category),
        ));
        Ok(category)
    }

    /// Delete a category that no book references
    pub async fn delete_category(&self, id: i32) -> AppResult<()> {
        let category = self.repository.categories.get_by_id(id).await?;
        if category.book_count > 0 {
            return Err(AppError::BusinessRule(format!(
                "Category '{}' still holds {} book(s)",
                category.name, category.book_count
            )));
        }

        self.repository.categories.delete(id).await?;
        self.invalidate_categories().await;
        self.events.publish(ChangeEvent::deleted(ChangeTable::Categories, id));
        Ok(())
    }

    // =========================================================================
    // BOOKS
    // =========================================================================

    pub async fn search_books(&self, request: &SearchRequest) -> AppResult<Page<Book>> {
        let (books, total) = self.repository.books.search(request).await?;
        Ok(Page::new(books, total, &request.pagination))
    }

    pub async fn get_book(&self, id: Uuid) -> AppResult<Book> {
        self.repository.books.get_by_id(id).await
    }

    pub async fn create_book(&self, book: CreateBook) -> AppResult<Book> {
        book.validate()?;
        let book = book.normalized();

        self.check_isbn(book.isbn.as_deref(), None).await?;
        self.check_category(book.category_id).await?;

        let created = self.repository.books.create(&book).await?;
        self.invalidate_categories().await;
        self.events.publish(ChangeEvent::new(
            ChangeTable::Books,
            ChangeAction::Insert,
            created.id,
            Some(&created),
        ));
        Ok(created)
    }

    /// Update a book; total copies cannot drop below the copies on loan
    pub async fn update_book(&self, id: Uuid, book: UpdateBook) -> AppResult<Book> {
        book.validate()?;
        let book = book.normalized();

        let current = self.repository.books.get_by_id(id).await?;

        self.check_isbn(book.isbn.as_deref(), Some(id)).await?;
        self.check_category(book.category_id).await?;

        if let Some(total) = book.total_copies {
            if available_after_resize(current.total_copies, current.available_copies, total).is_none() {
                return Err(AppError::BusinessRule(format!(
                    "{} cop(ies) are on loan, total copies cannot be {}",
                    current.total_copies - current.available_copies,
                    total
                )));
            }
        }

        let updated = self.repository.books.update(id, &book).await?;
        if book.category_id.is_some() {
            self.invalidate_categories().await;
        }
        self.events.publish(ChangeEvent::new(
            ChangeTable::Books,
            ChangeAction::Update,
            updated.id,
            Some(&updated),
        ));
        Ok(updated)
    }

    /// Delete a book, refused while copies are borrowed unless `force`
    pub async fn delete_book(&self, id: Uuid, force: bool) -> AppResult<()> {
        self.repository.books.get_by_id(id).await?;

        let open = self.repository.borrowings.count_open_for_book(id).await?;
        if open > 0 && !force {
            return Err(AppError::BusinessRule(format!(
                "Book has {} active borrowing(s)",
                open
            )));
        }

        self.repository.books.delete(id).await?;
        self.invalidate_categories().await;
        self.events.publish(ChangeEvent::deleted(ChangeTable::Books, id));
        if open > 0 {
            tracing::warn!(book_id = %id, open, "book deleted with active borrowings");
        }
        Ok(())
    }

    async fn check_isbn(&self, isbn: Option<&str>, exclude: Option<Uuid>) -> AppResult<()> {
        if let Some(isbn) = isbn {
            if self.repository.books.isbn_exists(isbn, exclude).await? {
                return Err(AppError::Conflict(format!("ISBN {} already exists", isbn)));
            }
        }
        Ok(())
    }

    async fn check_category(&self, category_id: Option<i32>) -> AppResult<()> {
        if let Some(id) = category_id {
            self.repository.categories.get_by_id(id).await.map_err(|e| match e {
                AppError::NotFound(msg) => AppError::Validation(msg),
                other => other,
            })?;
        }
        Ok(())
    }
}
