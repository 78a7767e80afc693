//! Declarative search: filters, multi-key sort and pagination.
//!
//! A [`SearchRequest`] describes *what* to fetch. It is validated against the
//! [`Schema`] of the queried entity and then either translated into SQL by
//! [`sql::SqlTranslator`] or evaluated over a slice by [`memory::apply`].
//! Both paths share the same semantics; [`url::QueryState`] keeps the request
//! in sync with URL query parameters.

pub mod memory;
pub mod schema;
pub mod sql;
pub mod url;
pub mod value;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

pub use schema::{FieldDef, FieldKind, Queryable, Schema};
pub use sql::SqlTranslator;
pub use url::QueryState;
pub use value::Value;

/// Errors raised while parsing or validating a search request
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("unknown filter operator '{0}'")]
    UnknownOperator(String),

    #[error("operator '{operator}' cannot be applied to field '{field}'")]
    UnsupportedOperator { field: String, operator: FilterOperator },

    #[error("field '{0}' is not sortable")]
    NotSortable(String),

    #[error("field '{0}' is not searchable")]
    NotSearchable(String),

    #[error("range filter on '{0}' requires value_to")]
    MissingRangeEnd(String),

    #[error("invalid value for field '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("malformed query parameter: {0}")]
    MalformedParameter(String),
}

/// Filter operators, serialized by their short codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FilterOperator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Case-sensitive substring
    Like,
    /// Case-insensitive substring
    ILike,
    In,
    /// Inclusive range `value..=value_to`
    Between,
    StartsWith,
    EndsWith,
    /// Array field contains every element of the value
    Contains,
}

impl FilterOperator {
    pub const ALL: [FilterOperator; 13] = [
        FilterOperator::Eq,
        FilterOperator::Neq,
        FilterOperator::Gt,
        FilterOperator::Gte,
        FilterOperator::Lt,
        FilterOperator::Lte,
        FilterOperator::Like,
        FilterOperator::ILike,
        FilterOperator::In,
        FilterOperator::Between,
        FilterOperator::StartsWith,
        FilterOperator::EndsWith,
        FilterOperator::Contains,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "eq",
            FilterOperator::Neq => "neq",
            FilterOperator::Gt => "gt",
            FilterOperator::Gte => "gte",
            FilterOperator::Lt => "lt",
            FilterOperator::Lte => "lte",
            FilterOperator::Like => "like",
            FilterOperator::ILike => "ilike",
            FilterOperator::In => "in",
            FilterOperator::Between => "between",
            FilterOperator::StartsWith => "sw",
            FilterOperator::EndsWith => "ew",
            FilterOperator::Contains => "cs",
        }
    }

    /// Operators whose value is a list
    pub fn takes_list(&self) -> bool {
        matches!(self, FilterOperator::In | FilterOperator::Contains)
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for FilterOperator {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FilterOperator::ALL
            .iter()
            .copied()
            .find(|op| op.code() == s.trim().to_lowercase())
            .ok_or_else(|| QueryError::UnknownOperator(s.to_string()))
    }
}

impl TryFrom<String> for FilterOperator {
    type Error = QueryError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<FilterOperator> for String {
    fn from(op: FilterOperator) -> Self {
        op.code().to_string()
    }
}

/// A single predicate: `field operator value [value_to]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FilterCondition {
    pub field: String,
    #[schema(value_type = String, example = "eq")]
    pub operator: FilterOperator,
    #[schema(value_type = Object)]
    #[serde(default = "null_value")]
    pub value: Value,
    /// Upper bound for `between`
    #[schema(value_type = Option<Object>)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_to: Option<Value>,
}

fn null_value() -> Value {
    Value::Null
}

impl FilterCondition {
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
            value_to: None,
        }
    }

    pub fn between(field: impl Into<String>, from: impl Into<Value>, to: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator: FilterOperator::Between,
            value: from.into(),
            value_to: Some(to.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SortKey {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self { field: field.into(), direction: SortDirection::Asc }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self { field: field.into(), direction: SortDirection::Desc }
    }
}

/// Free-text search: the term must appear (case-insensitively) in at least one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TextSearch {
    pub term: String,
    /// Empty means the schema's default search fields
    #[serde(default)]
    pub fields: Vec<String>,
}

/// Page selection, 1-indexed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Pagination {
    pub page: i64,
    pub per_page: i64,
}

impl Pagination {
    pub fn new(page: i64, per_page: i64) -> Self {
        Self { page, per_page }
    }

    /// Clamp to `1 <= page <= max_page` and `1 <= per_page <= limits.max_per_page`
    pub fn normalized(page: Option<i64>, per_page: Option<i64>, limits: &PageLimits) -> Self {
        let per_page = match per_page {
            Some(n) if n >= 1 => n.min(limits.max_per_page),
            _ => limits.default_per_page.min(limits.max_per_page),
        }
        .max(1);
        let max_page = i64::MAX / per_page;
        let page = page.filter(|p| *p >= 1).unwrap_or(1).min(max_page);
        Self { page, per_page }
    }

    pub fn offset(&self) -> i64 {
        (self.page.max(1) - 1).saturating_mul(self.limit())
    }

    pub fn limit(&self) -> i64 {
        self.per_page.max(1)
    }

    pub fn total_pages(&self, total: i64) -> i64 {
        if total <= 0 {
            0
        } else {
            let limit = self.limit();
            total / limit + i64::from(total % limit != 0)
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 1, per_page: PageLimits::default().default_per_page }
    }
}

/// Page size defaults and bounds, taken from the `search` configuration section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default_per_page: i64,
    pub max_per_page: i64,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self { default_per_page: 20, max_per_page: 100 }
    }
}

impl From<&crate::config::SearchConfig> for PageLimits {
    fn from(c: &crate::config::SearchConfig) -> Self {
        let max_per_page = c.max_per_page.max(1);
        Self {
            default_per_page: c.default_per_page.clamp(1, max_per_page),
            max_per_page,
        }
    }
}

/// Complete declarative search description
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct SearchRequest {
    #[serde(default)]
    pub search: Option<TextSearch>,
    #[serde(default)]
    pub filters: Vec<FilterCondition>,
    #[serde(default)]
    pub sort: Vec<SortKey>,
    #[serde(default)]
    pub pagination: Pagination,
}

impl SearchRequest {
    /// Check every field, operator and value against the schema
    pub fn validate(&self, schema: &Schema) -> Result<(), QueryError> {
        for filter in &self.filters {
            schema.check_filter(filter)?;
        }
        for key in &self.sort {
            let def = schema.field(&key.field)?;
            if !def.sortable {
                return Err(QueryError::NotSortable(key.field.clone()));
            }
        }
        if let Some(search) = &self.search {
            for name in &search.fields {
                let def = schema.field(name)?;
                if !def.searchable {
                    return Err(QueryError::NotSearchable(name.clone()));
                }
            }
        }
        Ok(())
    }

    /// Search fields to use, falling back to the schema defaults
    pub fn search_fields<'a>(&'a self, schema: &'a Schema) -> Vec<&'a str> {
        match &self.search {
            Some(s) if !s.fields.is_empty() => s.fields.iter().map(String::as_str).collect(),
            _ => schema.default_search().to_vec(),
        }
    }

    /// The search term, if present and non-blank
    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_ref()
            .map(|s| s.term.trim())
            .filter(|t| !t.is_empty())
    }

    /// Sort keys to use, falling back to the schema default sort
    pub fn effective_sort<'a>(&'a self, schema: &'a Schema) -> &'a [SortKey] {
        if self.sort.is_empty() {
            schema.default_sort()
        } else {
            &self.sort
        }
    }

    /// Clamp pagination to the configured limits
    pub fn with_limits(mut self, limits: &PageLimits) -> Self {
        self.pagination = Pagination::normalized(
            Some(self.pagination.page),
            Some(self.pagination.per_page),
            limits,
        );
        self
    }
}

/// One page of results
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[aliases(
    BookPage = Page<crate::models::book::Book>,
    CategoryPage = Page<crate::models::category::Category>,
    ProfilePage = Page<crate::models::user::Profile>,
    BorrowingPage = Page<crate::models::borrowing::BorrowingDetails>
)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
    /// Canonical URL query string for this result set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, pagination: &Pagination) -> Self {
        Self {
            items,
            total,
            page: pagination.page,
            per_page: pagination.per_page,
            total_pages: pagination.total_pages(total),
            query: None,
        }
    }

    pub fn with_query(mut self, query: String) -> Self {
        self.query = Some(query);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_codes_round_trip() {
        for op in FilterOperator::ALL {
            assert_eq!(op.code().parse::<FilterOperator>().unwrap(), op);
        }
        assert_eq!("EW".parse::<FilterOperator>().unwrap(), FilterOperator::EndsWith);
    }

    #[test]
    fn test_unknown_operator_is_rejected() {
        assert_eq!(
            "regex".parse::<FilterOperator>(),
            Err(QueryError::UnknownOperator("regex".to_string()))
        );
        let parsed: Result<FilterCondition, _> =
            serde_json::from_str(r#"{"field":"title","operator":"regex","value":"x"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_pagination_arithmetic() {
        let p = Pagination::new(3, 20);
        assert_eq!(p.offset(), 40);
        assert_eq!(p.limit(), 20);
        assert_eq!(p.total_pages(41), 3);
        assert_eq!(p.total_pages(40), 2);
        assert_eq!(p.total_pages(0), 0);
    }

    #[test]
    fn test_pagination_normalization() {
        let limits = PageLimits { default_per_page: 25, max_per_page: 50 };
        assert_eq!(Pagination::normalized(Some(0), None, &limits), Pagination::new(1, 25));
        assert_eq!(Pagination::normalized(Some(-4), Some(0), &limits), Pagination::new(1, 25));
        assert_eq!(Pagination::normalized(Some(2), Some(500), &limits), Pagination::new(2, 50));
    }

    #[test]
    fn test_huge_page_number_keeps_offset_in_range() {
        let p = Pagination::normalized(Some(i64::MAX), Some(20), &PageLimits::default());
        assert!(p.page < i64::MAX);
        assert!(p.offset() >= 0);
        assert_eq!(p.total_pages(i64::MAX), i64::MAX / 20 + 1);

        // Unnormalized values from a JSON body must not overflow either
        let raw = Pagination::new(i64::MAX, i64::MAX);
        assert_eq!(raw.offset(), i64::MAX);
    }

    #[test]
    fn test_default_page_size_never_exceeds_maximum() {
        let limits = PageLimits::from(&crate::config::SearchConfig {
            default_per_page: 500,
            max_per_page: 50,
        });
        assert_eq!(limits.default_per_page, 50);
        assert_eq!(Pagination::normalized(None, None, &limits).per_page, 50);
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let req: SearchRequest = serde_json::from_str(
            r#"{"filters":[{"field":"publication_year","operator":"between","value":1990,"value_to":2000}]}"#,
        )
        .unwrap();
        assert_eq!(req.filters[0].operator, FilterOperator::Between);
        assert_eq!(req.filters[0].value_to, Some(Value::Int(2000)));
        assert_eq!(req.pagination, Pagination::default());
        assert!(req.sort.is_empty());
    }
}
