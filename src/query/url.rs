//! Search state as URL query parameters.
//!
//! ```text
//! ?q=fiqh&fields=title,tags&filter=publication_year:between:1990,2000
//!  &filter=language:in:ar,en&sort=-publication_year,title&page=2&per_page=10
//! ```
//!
//! `filter` repeats; its value is `field:operator:value`. Lists (`in`, `cs`)
//! and ranges (`between`) are comma separated and `null` stands for a null
//! value. Unknown keys are ignored so clients can add their own parameters.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{
    FilterCondition, FilterOperator, PageLimits, Pagination, QueryError, Schema, SearchRequest,
    SortDirection, SortKey, TextSearch, Value,
};

const NULL_LITERAL: &str = "null";
const ESCAPE: char = '\\';

/// Client-side search state, as kept in the address bar or a saved preference
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct QueryState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub search_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<FilterCondition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<SortKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_page: Option<i64>,
}

impl QueryState {
    pub fn from_query_string(query: &str) -> Result<Self, QueryError> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query.trim_start_matches('?'))
            .map_err(|e| QueryError::MalformedParameter(e.to_string()))?;

        let mut state = QueryState::default();
        for (key, value) in pairs {
            match key.as_str() {
                "q" => {
                    let term = value.trim();
                    state.search = (!term.is_empty()).then(|| term.to_string());
                }
                "fields" => state.search_fields = split_list(&value),
                "filter" => state.filters.push(parse_filter(&value)?),
                "sort" => state.sort = parse_sort(&value),
                "page" => state.page = Some(parse_number("page", &value)?),
                "per_page" => state.per_page = Some(parse_number("per_page", &value)?),
                _ => {}
            }
        }
        Ok(state)
    }

    /// Canonical query string: fixed key order, defaults omitted
    pub fn to_query_string(&self) -> String {
        let mut pairs: Vec<(&str, String)> = Vec::new();
        if let Some(term) = &self.search {
            pairs.push(("q", term.clone()));
        }
        if !self.search_fields.is_empty() {
            pairs.push(("fields", self.search_fields.join(",")));
        }
        for filter in &self.filters {
            pairs.push(("filter", format_filter(filter)));
        }
        if !self.sort.is_empty() {
            pairs.push(("sort", format_sort(&self.sort)));
        }
        if let Some(page) = self.page.filter(|p| *p > 1) {
            pairs.push(("page", page.to_string()));
        }
        if let Some(per_page) = self.per_page {
            pairs.push(("per_page", per_page.to_string()));
        }
        serde_urlencoded::to_string(&pairs).unwrap_or_default()
    }

    /// The same state with explicit paging replaced by the values actually served
    pub fn with_pagination(mut self, pagination: &Pagination) -> Self {
        self.page = self.page.map(|_| pagination.page);
        self.per_page = self.per_page.map(|_| pagination.per_page);
        self
    }

    /// Build a validated request, filling schema defaults and clamping pagination
    pub fn into_request(self, schema: &Schema, limits: &PageLimits) -> Result<SearchRequest, QueryError> {
        let search = self.search.map(|term| TextSearch {
            term,
            fields: if self.search_fields.is_empty() {
                schema.default_search().iter().map(|f| f.to_string()).collect()
            } else {
                self.search_fields
            },
        });
        let sort = if self.sort.is_empty() {
            schema.default_sort().to_vec()
        } else {
            self.sort
        };
        let request = SearchRequest {
            search,
            filters: self.filters,
            sort,
            pagination: Pagination::normalized(self.page, self.per_page, limits),
        };
        request.validate(schema)?;
        Ok(request)
    }
}

impl From<&SearchRequest> for QueryState {
    fn from(request: &SearchRequest) -> Self {
        Self {
            search: request.search.as_ref().map(|s| s.term.clone()),
            search_fields: request
                .search
                .as_ref()
                .map(|s| s.fields.clone())
                .unwrap_or_default(),
            filters: request.filters.clone(),
            sort: request.sort.clone(),
            page: Some(request.pagination.page),
            per_page: Some(request.pagination.per_page),
        }
    }
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_number(key: &str, value: &str) -> Result<i64, QueryError> {
    value
        .trim()
        .parse()
        .map_err(|_| QueryError::MalformedParameter(format!("{}={}", key, value)))
}

/// Split a filter operand on commas not preceded by the escape character.
///
/// Escapes are kept in the returned tokens; [`literal`] removes them.
fn split_operands(raw: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in raw.char_indices() {
        match c {
            _ if escaped => escaped = false,
            ESCAPE => escaped = true,
            ',' => {
                tokens.push(&raw[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    tokens.push(&raw[start..]);
    tokens
}

/// A bare `null` token is the null operand; `\` escapes the next character
fn literal(token: &str) -> Value {
    if token == NULL_LITERAL {
        return Value::Null;
    }
    let mut text = String::with_capacity(token.len());
    let mut chars = token.chars();
    while let Some(c) = chars.next() {
        if c == ESCAPE {
            text.push(chars.next().unwrap_or(ESCAPE));
        } else {
            text.push(c);
        }
    }
    Value::Text(text)
}

/// Inverse of [`literal`] and [`split_operands`]
fn format_operand(value: &Value) -> String {
    match value {
        Value::Null => NULL_LITERAL.to_string(),
        Value::List(items) => items.iter().map(format_operand).collect::<Vec<_>>().join(","),
        other => {
            let text = other.to_text();
            if text == NULL_LITERAL {
                return format!("{}{}", ESCAPE, text);
            }
            let mut out = String::with_capacity(text.len());
            for c in text.chars() {
                if c == ESCAPE || c == ',' {
                    out.push(ESCAPE);
                }
                out.push(c);
            }
            out
        }
    }
}

fn parse_filter(raw: &str) -> Result<FilterCondition, QueryError> {
    let mut parts = raw.splitn(3, ':');
    let (Some(field), Some(op), Some(value)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(QueryError::MalformedParameter(format!(
            "filter '{}' must be field:operator:value",
            raw
        )));
    };
    let field = field.trim();
    if field.is_empty() {
        return Err(QueryError::MalformedParameter(format!("filter '{}' has no field", raw)));
    }
    let operator: FilterOperator = op.parse()?;

    Ok(match operator {
        FilterOperator::Between => match split_operands(value).as_slice() {
            [from, to] => FilterCondition::between(field, literal(from), literal(to)),
            _ => {
                return Err(QueryError::MalformedParameter(format!(
                    "between filter '{}' needs from,to",
                    raw
                )))
            }
        },
        op if op.takes_list() => FilterCondition::new(
            field,
            op,
            Value::List(
                split_operands(value)
                    .into_iter()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(literal)
                    .collect(),
            ),
        ),
        op => FilterCondition::new(field, op, literal(value)),
    })
}

fn format_filter(filter: &FilterCondition) -> String {
    let value = match (&filter.operator, &filter.value_to) {
        (FilterOperator::Between, Some(to)) => {
            format!("{},{}", format_operand(&filter.value), format_operand(to))
        }
        _ => format_operand(&filter.value),
    };
    format!("{}:{}:{}", filter.field, filter.operator, value)
}

/// `-field` sorts descending
fn parse_sort(raw: &str) -> Vec<SortKey> {
    split_list(raw)
        .into_iter()
        .map(|key| match key.strip_prefix('-') {
            Some(field) => SortKey::desc(field),
            None => SortKey::asc(key.trim_start_matches('+')),
        })
        .collect()
}

fn format_sort(keys: &[SortKey]) -> String {
    keys.iter()
        .map(|k| match k.direction {
            SortDirection::Asc => k.field.clone(),
            SortDirection::Desc => format!("-{}", k.field),
        })
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::schema::tests::sample_schema;

    #[test]
    fn test_parse_full_state() {
        let state = QueryState::from_query_string(
            "?q=fiqh&filter=year:between:1990,2000&filter=id:in:1,2,3&sort=-year,name&page=2&per_page=10&utm=x",
        )
        .unwrap();
        assert_eq!(state.search.as_deref(), Some("fiqh"));
        assert_eq!(state.filters[0], FilterCondition::between("year", "1990", "2000"));
        assert_eq!(
            state.filters[1].value,
            Value::List(vec![Value::from("1"), Value::from("2"), Value::from("3")])
        );
        assert_eq!(state.sort, vec![SortKey::desc("year"), SortKey::asc("name")]);
        assert_eq!(state.page, Some(2));
        assert_eq!(state.per_page, Some(10));
    }

    #[test]
    fn test_filter_value_may_contain_colons() {
        let state = QueryState::from_query_string("filter=note:eq:10:30").unwrap();
        assert_eq!(state.filters[0].value, Value::from("10:30"));
    }

    #[test]
    fn test_null_literal() {
        let state = QueryState::from_query_string("filter=note:eq:null").unwrap();
        assert!(state.filters[0].value.is_null());
        assert_eq!(state.to_query_string(), "filter=note%3Aeq%3Anull");
    }

    #[test]
    fn test_escaped_operands_round_trip() {
        let state = QueryState {
            filters: vec![
                FilterCondition::new("note", FilterOperator::Eq, "null"),
                FilterCondition::new("tags", FilterOperator::In, vec!["a,b".to_string(), "c\\d".to_string()]),
                FilterCondition::between("name", "Ibn Kathir, Ismail", "Ibn Taymiyyah"),
                FilterCondition::new("year", FilterOperator::Neq, Value::Null),
            ],
            ..Default::default()
        };
        let reparsed = QueryState::from_query_string(&state.to_query_string()).unwrap();
        assert_eq!(reparsed, state);
        assert_eq!(reparsed.filters[0].value, Value::from("null"));
    }

    #[test]
    fn test_malformed_parameters() {
        assert!(matches!(
            QueryState::from_query_string("filter=year:gt"),
            Err(QueryError::MalformedParameter(_))
        ));
        assert_eq!(
            QueryState::from_query_string("filter=year:near:2000"),
            Err(QueryError::UnknownOperator("near".to_string()))
        );
        assert!(QueryState::from_query_string("page=two").is_err());
        assert!(QueryState::from_query_string("filter=year:between:1990").is_err());
    }

    #[test]
    fn test_canonical_string_is_stable() {
        let raw = "per_page=10&sort=-year&q=%D8%AD%D8%AF%D9%8A%D8%AB&page=1&filter=name:sw:Al";
        let state = QueryState::from_query_string(raw).unwrap();
        assert_eq!(state.search.as_deref(), Some("حديث"));
        let canonical = state.to_query_string();
        assert_eq!(
            canonical,
            "q=%D8%AD%D8%AF%D9%8A%D8%AB&filter=name%3Asw%3AAl&sort=-year&per_page=10"
        );
        assert_eq!(QueryState::from_query_string(&canonical).unwrap().to_query_string(), canonical);
    }

    #[test]
    fn test_into_request_fills_defaults() {
        let schema = sample_schema();
        let limits = PageLimits { default_per_page: 15, max_per_page: 40 };
        let state = QueryState::from_query_string("q=abc&page=0&per_page=500").unwrap();
        let request = state.into_request(&schema, &limits).unwrap();
        let search = request.search.unwrap();
        assert_eq!(search.fields, vec!["name".to_string(), "note".to_string()]);
        assert_eq!(request.sort, vec![SortKey::asc("name")]);
        assert_eq!(request.pagination, Pagination::new(1, 40));
    }

    #[test]
    fn test_canonical_string_reports_served_page_size() {
        let limits = PageLimits { default_per_page: 20, max_per_page: 100 };
        let state = QueryState::from_query_string("q=sirah&per_page=500&page=0").unwrap();
        let request = state.clone().into_request(&sample_schema(), &limits).unwrap();
        assert_eq!(
            state.with_pagination(&request.pagination).to_query_string(),
            "q=sirah&per_page=100"
        );
    }

    #[test]
    fn test_into_request_validates() {
        let schema = sample_schema();
        let state = QueryState::from_query_string("sort=note").unwrap();
        assert_eq!(
            state.into_request(&schema, &PageLimits::default()),
            Err(QueryError::NotSortable("note".to_string()))
        );
    }
}
