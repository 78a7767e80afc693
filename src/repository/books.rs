//! Books repository for database operations

use chrono::Utc;
use sqlx::{Pool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::book::{Book, CreateBook, UpdateBook},
    query::{Queryable, SearchRequest, SqlTranslator},
};

const BOOK_COLUMNS: &str = r#"
    SELECT b.id, b.title, b.title_arabic, b.author, b.author_arabic, b.isbn,
           b.publisher, b.publication_year, b.language, b.category_id,
           c.name AS category_name, b.description, b.cover_url, b.pages,
           b.total_copies, b.available_copies, b.is_digital, b.digital_url,
           b.tags, b.location, b.created_at, b.updated_at
    FROM books b
    LEFT JOIN categories c ON c.id = b.category_id
"#;

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    // =========================================================================
    // READ
    // =========================================================================

    /// Get book by ID
    pub async fn get_by_id(&self, id: Uuid) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(&format!("{} WHERE b.id = $1", BOOK_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Get several books, in no particular order
    pub async fn get_many(&self, ids: &[Uuid]) -> AppResult<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>(&format!("{} WHERE b.id = ANY($1)", BOOK_COLUMNS))
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(books)
    }

    /// Check if an ISBN is already catalogued
    pub async fn isbn_exists(&self, isbn: &str, exclude_id: Option<Uuid>) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM books WHERE isbn = $1 AND ($2::uuid IS NULL OR id <> $2))",
        )
        .bind(isbn)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    // =========================================================================
    // SEARCH
    // =========================================================================

    /// Filtered, sorted page of books and the total match count
    pub async fn search(&self, request: &SearchRequest) -> AppResult<(Vec<Book>, i64)> {
        let translator = SqlTranslator::new(Book::schema());

        let mut count = QueryBuilder::<Postgres>::new(
            "SELECT COUNT(*) FROM books b LEFT JOIN categories c ON c.id = b.category_id WHERE 1=1",
        );
        translator.push_conditions(&mut count, request)?;
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut query = QueryBuilder::<Postgres>::new(BOOK_COLUMNS);
        query.push(" WHERE 1=1");
        translator.push_conditions(&mut query, request)?;
        translator.push_order_by(&mut query, request)?;
        translator.push_pagination(&mut query, &request.pagination);

        tracing::debug!(sql = query.sql(), "book search");

        let books = query.build_query_as::<Book>().fetch_all(&self.pool).await?;
        Ok((books, total))
    }

    // =========================================================================
    // WRITE
    // =========================================================================

    /// Create a new book; all copies start available
    pub async fn create(&self, book: &CreateBook) -> AppResult<Book> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let copies = book.total_copies.unwrap_or(1);

        sqlx::query(
            r#"
            INSERT INTO books (
                id, title, title_arabic, author, author_arabic, isbn, publisher,
                publication_year, language, category_id, description, cover_url, pages,
                total_copies, available_copies, is_digital, digital_url, tags, location,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $14, $15, $16, $17, $18, $19, $19)
            "#,
        )
        .bind(id)
        .bind(&book.title)
        .bind(&book.title_arabic)
        .bind(&book.author)
        .bind(&book.author_arabic)
        .bind(&book.isbn)
        .bind(&book.publisher)
        .bind(book.publication_year)
        .bind(book.language.as_deref().unwrap_or("ar"))
        .bind(book.category_id)
        .bind(&book.description)
        .bind(&book.cover_url)
        .bind(book.pages)
        .bind(copies)
        .bind(book.is_digital.unwrap_or(false))
        .bind(&book.digital_url)
        .bind(book.tags.clone().unwrap_or_default())
        .bind(&book.location)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_by_id(id).await
    }

    /// Update a book; a change of `total_copies` shifts `available_copies` by the same amount
    pub async fn update(&self, id: Uuid, book: &UpdateBook) -> AppResult<Book> {
        let result = sqlx::query(
            r#"
            UPDATE books SET
                title = COALESCE($2, title),
                title_arabic = COALESCE($3, title_arabic),
                author = COALESCE($4, author),
                author_arabic = COALESCE($5, author_arabic),
                isbn = COALESCE($6, isbn),
                publisher = COALESCE($7, publisher),
                publication_year = COALESCE($8, publication_year),
                language = COALESCE($9, language),
                category_id = COALESCE($10, category_id),
                description = COALESCE($11, description),
                cover_url = COALESCE($12, cover_url),
                pages = COALESCE($13, pages),
                available_copies = available_copies + (COALESCE($14, total_copies) - total_copies),
                total_copies = COALESCE($14, total_copies),
                is_digital = COALESCE($15, is_digital),
                digital_url = COALESCE($16, digital_url),
                tags = COALESCE($17, tags),
                location = COALESCE($18, location),
                updated_at = $19
            WHERE id = $1
              AND available_copies + (COALESCE($14, total_copies) - total_copies) >= 0
            "#,
        )
        .bind(id)
        .bind(&book.title)
        .bind(&book.title_arabic)
        .bind(&book.author)
        .bind(&book.author_arabic)
        .bind(&book.isbn)
        .bind(&book.publisher)
        .bind(book.publication_year)
        .bind(&book.language)
        .bind(book.category_id)
        .bind(&book.description)
        .bind(&book.cover_url)
        .bind(book.pages)
        .bind(book.total_copies)
        .bind(book.is_digital)
        .bind(&book.digital_url)
        .bind(&book.tags)
        .bind(&book.location)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Missing book surfaces as NotFound; otherwise loans outgrew the new total
            self.get_by_id(id).await?;
            return Err(AppError::BusinessRule(
                "Total copies cannot drop below the copies on loan".to_string(),
            ));
        }

        self.get_by_id(id).await
    }

    /// Delete a book (borrowing history is removed with it)
    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Book with id {} not found", id)));
        }

        Ok(())
    }
}
