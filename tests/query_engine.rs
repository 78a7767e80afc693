//! Query engine tests over the real catalog schema: URL parsing, in-memory
//! evaluation and SQL translation of the same request.

use chrono::{TimeZone, Utc};
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use maktaba_server::{
    models::book::Book,
    query::{memory, PageLimits, QueryError, QueryState, Queryable, SearchRequest, SqlTranslator},
};

fn book(title: &str, language: &str, year: Option<i32>, available: i32, tags: &[&str]) -> Book {
    let created = Utc.with_ymd_and_hms(2024, 9, 1, 8, 0, 0).unwrap();
    Book {
        id: Uuid::new_v4(),
        title: title.to_string(),
        title_arabic: None,
        author: "Various".to_string(),
        author_arabic: None,
        isbn: None,
        publisher: None,
        publication_year: year,
        language: language.to_string(),
        category_id: None,
        category_name: None,
        description: None,
        cover_url: None,
        pages: None,
        total_copies: available.max(1),
        available_copies: available,
        is_digital: false,
        digital_url: None,
        tags: tags.iter().map(|t| t.to_string()).collect(),
        location: None,
        created_at: created,
        updated_at: created,
    }
}

fn catalog() -> Vec<Book> {
    vec![
        book("Umdat al-Fiqh", "ar", Some(1200), 2, &["fiqh", "hanbali"]),
        book("Fiqh us-Sunnah", "en", Some(1946), 0, &["fiqh"]),
        book("Al-Ajurrumiyyah", "ar", None, 3, &["nahw"]),
        book("Mukhtasar al-Quduri", "ar", Some(1037), 1, &["fiqh", "hanafi"]),
    ]
}

fn parse_query(query: &str) -> Result<SearchRequest, QueryError> {
    QueryState::from_query_string(query)?.into_request(Book::schema(), &PageLimits::default())
}

fn titles(items: &[Book]) -> Vec<&str> {
    items.iter().map(|b| b.title.as_str()).collect()
}

#[test]
fn test_url_query_filters_and_sorts_catalog() {
    let request = parse_query("filter=language:eq:ar&filter=tags:cs:fiqh&sort=-publication_year").unwrap();
    let page = memory::apply(&catalog(), &request).unwrap();

    assert_eq!(page.total, 2);
    assert_eq!(titles(&page.items), vec!["Umdat al-Fiqh", "Mukhtasar al-Quduri"]);
}

#[test]
fn test_text_search_matches_title_or_tags() {
    let request = parse_query("q=HANAFI").unwrap();
    let page = memory::apply(&catalog(), &request).unwrap();
    assert_eq!(titles(&page.items), vec!["Mukhtasar al-Quduri"]);

    let request = parse_query("q=fiqh&filter=available_copies:gt:0").unwrap();
    let page = memory::apply(&catalog(), &request).unwrap();
    assert_eq!(titles(&page.items), vec!["Mukhtasar al-Quduri", "Umdat al-Fiqh"]);
}

#[test]
fn test_missing_year_sorts_last_ascending() {
    let request = parse_query("sort=publication_year").unwrap();
    let page = memory::apply(&catalog(), &request).unwrap();
    assert_eq!(page.items.last().map(|b| b.title.as_str()), Some("Al-Ajurrumiyyah"));
}

#[test]
fn test_pages_report_totals() {
    let request = parse_query("per_page=3&page=2").unwrap();
    let page = memory::apply(&catalog(), &request).unwrap();

    assert_eq!(page.total, 4);
    assert_eq!(page.total_pages, 2);
    assert_eq!(page.items.len(), 1);
}

#[test]
fn test_page_far_past_the_end_is_empty() {
    let request = parse_query("page=9223372036854775807").unwrap();
    assert!(request.pagination.offset() >= 0);

    let page = memory::apply(&catalog(), &request).unwrap();
    assert_eq!(page.total, 4);
    assert!(page.items.is_empty());

    let translator = SqlTranslator::new(Book::schema());
    let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new("SELECT b.* FROM books b WHERE 1=1");
    translator.push_pagination(&mut qb, &request.pagination);
    assert!(qb.sql().ends_with("LIMIT $1 OFFSET $2"));
}

#[test]
fn test_unknown_or_mistyped_input_is_rejected() {
    assert!(matches!(parse_query("filter=secret:eq:1"), Err(QueryError::UnknownField(_))));
    assert!(parse_query("filter=pages:gt:many").is_err());
    assert!(parse_query("sort=description").is_err());
    assert!(parse_query("page=first").is_err());
}

#[test]
fn test_same_request_translates_to_bound_sql() {
    let request = parse_query("q=fiqh&filter=language:in:ar,en&sort=-created_at").unwrap();
    let translator = SqlTranslator::new(Book::schema());

    let mut qb: QueryBuilder<'_, Postgres> =
        QueryBuilder::new("SELECT b.* FROM books b LEFT JOIN categories c ON c.id = b.category_id WHERE 1=1");
    translator.push_conditions(&mut qb, &request).unwrap();
    translator.push_order_by(&mut qb, &request).unwrap();
    translator.push_pagination(&mut qb, &request.pagination);
    let sql = qb.sql().to_string();

    assert!(sql.contains("b.language IN ($1, $2)"));
    assert!(sql.contains("b.title ILIKE $3"));
    assert!(sql.contains("array_to_string(b.tags, ' ') ILIKE"));
    assert!(sql.contains("ORDER BY b.created_at DESC NULLS FIRST, b.id ASC"));
    assert!(!sql.contains("fiqh"));
}

#[test]
fn test_canonical_query_survives_reparse() {
    let state = QueryState::from_query_string("sort=title&q=%D9%81%D9%82%D9%87&filter=language:eq:ar").unwrap();
    let canonical = state.to_query_string();

    let reparsed = QueryState::from_query_string(&canonical).unwrap();
    assert_eq!(reparsed, state);
    assert_eq!(reparsed.to_query_string(), canonical);
}
