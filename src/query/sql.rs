//! Translation of a [`SearchRequest`] into PostgreSQL.
//!
//! Column expressions come only from the [`Schema`]; every operand is bound
//! with `push_bind` after being coerced to the field kind.

use sqlx::{Postgres, QueryBuilder};

use super::value::{fold_case, normalize_text, Scalar};
use super::{
    FieldDef, FieldKind, FilterCondition, FilterOperator, Pagination, QueryError, Schema,
    SearchRequest, SortDirection,
};

pub struct SqlTranslator {
    schema: &'static Schema,
}

impl SqlTranslator {
    pub fn new(schema: &'static Schema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &'static Schema {
        self.schema
    }

    /// Append ` AND ...` for every filter and the text search.
    ///
    /// The builder must already end inside a `WHERE` clause (e.g. `WHERE 1=1`).
    pub fn push_conditions(
        &self,
        qb: &mut QueryBuilder<'_, Postgres>,
        request: &SearchRequest,
    ) -> Result<(), QueryError> {
        request.validate(self.schema)?;

        for filter in &request.filters {
            let def = self.schema.field(&filter.field)?;
            qb.push(" AND ");
            push_filter(qb, def, filter)?;
        }

        if let Some(term) = request.search_term() {
            let pattern = format!("%{}%", escape_like(&fold_case(term)));
            qb.push(" AND (");
            for (i, name) in request.search_fields(self.schema).into_iter().enumerate() {
                let def = self.schema.field(name)?;
                if i > 0 {
                    qb.push(" OR ");
                }
                match def.kind {
                    FieldKind::TextArray => {
                        qb.push(format!("array_to_string({}, ' ') ILIKE ", def.column));
                    }
                    FieldKind::Text => {
                        qb.push(format!("{} ILIKE ", def.column));
                    }
                    _ => {
                        qb.push(format!("{}::text ILIKE ", def.column));
                    }
                }
                qb.push_bind(pattern.clone());
            }
            qb.push(")");
        }

        Ok(())
    }

    /// Append ` ORDER BY ...`, ending with the primary key so pages never overlap
    pub fn push_order_by(
        &self,
        qb: &mut QueryBuilder<'_, Postgres>,
        request: &SearchRequest,
    ) -> Result<(), QueryError> {
        let mut terms = Vec::new();
        let mut has_primary_key = false;
        for key in request.effective_sort(self.schema) {
            let def = self.schema.field(&key.field)?;
            if !def.sortable {
                return Err(QueryError::NotSortable(key.field.clone()));
            }
            has_primary_key |= def.column == self.schema.primary_key;
            let direction = match key.direction {
                SortDirection::Asc => "ASC NULLS LAST",
                SortDirection::Desc => "DESC NULLS FIRST",
            };
            terms.push(format!("{} {}", def.column, direction));
        }
        if !has_primary_key {
            terms.push(format!("{} ASC", self.schema.primary_key));
        }
        qb.push(" ORDER BY ");
        qb.push(terms.join(", "));
        Ok(())
    }

    /// Append bound `LIMIT` and `OFFSET`
    pub fn push_pagination(&self, qb: &mut QueryBuilder<'_, Postgres>, pagination: &Pagination) {
        qb.push(" LIMIT ");
        qb.push_bind(pagination.limit());
        qb.push(" OFFSET ");
        qb.push_bind(pagination.offset());
    }
}

fn push_filter(
    qb: &mut QueryBuilder<'_, Postgres>,
    def: &FieldDef,
    filter: &FilterCondition,
) -> Result<(), QueryError> {
    let column = def.column;
    let field = filter.field.as_str();

    if filter.value.is_null() {
        let sql = match filter.operator {
            FilterOperator::Eq => format!("{} IS NULL", column),
            _ => format!("{} IS NOT NULL", column),
        };
        qb.push(sql);
        return Ok(());
    }

    match filter.operator {
        FilterOperator::Eq
        | FilterOperator::Neq
        | FilterOperator::Gt
        | FilterOperator::Gte
        | FilterOperator::Lt
        | FilterOperator::Lte => {
            let op = match filter.operator {
                FilterOperator::Eq => "=",
                FilterOperator::Neq => "<>",
                FilterOperator::Gt => ">",
                FilterOperator::Gte => ">=",
                FilterOperator::Lt => "<",
                _ => "<=",
            };
            qb.push(format!("{} {} ", column, op));
            push_scalar(qb, filter.value.expect_scalar(def.kind, field)?);
        }
        FilterOperator::Between => {
            let to = filter
                .value_to
                .as_ref()
                .ok_or_else(|| QueryError::MissingRangeEnd(field.to_string()))?;
            qb.push(format!("{} BETWEEN ", column));
            push_scalar(qb, filter.value.expect_scalar(def.kind, field)?);
            qb.push(" AND ");
            push_scalar(qb, to.expect_scalar(def.kind, field)?);
        }
        FilterOperator::In => {
            let operands = filter
                .value
                .as_list()
                .into_iter()
                .map(|v| v.expect_scalar(def.kind, field))
                .collect::<Result<Vec<_>, _>>()?;
            if operands.is_empty() {
                qb.push("FALSE");
            } else {
                qb.push(format!("{} IN (", column));
                for (i, operand) in operands.into_iter().enumerate() {
                    if i > 0 {
                        qb.push(", ");
                    }
                    push_scalar(qb, operand);
                }
                qb.push(")");
            }
        }
        FilterOperator::Like
        | FilterOperator::ILike
        | FilterOperator::StartsWith
        | FilterOperator::EndsWith => {
            let Scalar::Text(text) = filter.value.expect_scalar(FieldKind::Text, field)? else {
                return Err(QueryError::InvalidValue {
                    field: field.to_string(),
                    reason: "expected text".to_string(),
                });
            };
            let escaped = escape_like(&text);
            let (keyword, pattern) = match filter.operator {
                FilterOperator::Like => ("LIKE", format!("%{}%", escaped)),
                FilterOperator::ILike => ("ILIKE", format!("%{}%", escaped)),
                FilterOperator::StartsWith => ("LIKE", format!("{}%", escaped)),
                _ => ("LIKE", format!("%{}", escaped)),
            };
            qb.push(format!("{} {} ", column, keyword));
            qb.push_bind(pattern);
        }
        FilterOperator::Contains => {
            let elements: Vec<String> = filter
                .value
                .as_list()
                .into_iter()
                .filter(|v| !v.is_null())
                .map(|v| normalize_text(&v.to_text()))
                .collect();
            qb.push(format!("{} @> ", column));
            qb.push_bind(elements);
        }
    }

    Ok(())
}

fn push_scalar(qb: &mut QueryBuilder<'_, Postgres>, scalar: Scalar) {
    match scalar {
        Scalar::Text(v) => qb.push_bind(v),
        Scalar::Int(v) => qb.push_bind(v),
        Scalar::Decimal(v) => qb.push_bind(v),
        Scalar::Bool(v) => qb.push_bind(v),
        Scalar::Timestamp(v) => qb.push_bind(v),
        Scalar::Uuid(v) => qb.push_bind(v),
    };
}

/// Escape `\`, `%` and `_` so user text matches literally inside a LIKE pattern
pub fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::schema::tests::sample_schema;
    use crate::query::{SortKey, TextSearch, Value};
    use once_cell::sync::Lazy;

    static SCHEMA: Lazy<Schema> = Lazy::new(sample_schema);

    fn translate(request: &SearchRequest) -> Result<String, QueryError> {
        let translator = SqlTranslator::new(&SCHEMA);
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM samples s WHERE 1=1");
        translator.push_conditions(&mut qb, request)?;
        translator.push_order_by(&mut qb, request)?;
        translator.push_pagination(&mut qb, &request.pagination);
        Ok(qb.sql().to_string())
    }

    fn with_filters(filters: Vec<FilterCondition>) -> SearchRequest {
        SearchRequest { filters, ..Default::default() }
    }

    #[test]
    fn test_comparison_filters_are_bound() {
        let sql = translate(&with_filters(vec![
            FilterCondition::new("year", FilterOperator::Gte, "1990"),
            FilterCondition::new("name", FilterOperator::Neq, "x"),
        ]))
        .unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM samples s WHERE 1=1 AND s.year >= $1 AND s.name <> $2 \
             ORDER BY s.name ASC NULLS LAST, s.id ASC LIMIT $3 OFFSET $4"
        );
    }

    #[test]
    fn test_null_equality() {
        let sql = translate(&with_filters(vec![
            FilterCondition::new("note", FilterOperator::Eq, Value::Null),
            FilterCondition::new("year", FilterOperator::Neq, Value::Null),
        ]))
        .unwrap();
        assert!(sql.contains("s.note IS NULL AND s.year IS NOT NULL"));
    }

    #[test]
    fn test_in_between_and_contains() {
        let sql = translate(&with_filters(vec![
            FilterCondition::new("id", FilterOperator::In, Value::List(vec![Value::Int(1), Value::Int(2)])),
            FilterCondition::between("created_at", "2024-01-01", "2024-12-31"),
            FilterCondition::new("tags", FilterOperator::Contains, vec!["fiqh".to_string()]),
        ]))
        .unwrap();
        assert!(sql.contains("s.id IN ($1, $2)"));
        assert!(sql.contains("s.created_at BETWEEN $3 AND $4"));
        assert!(sql.contains("s.tags @> $5"));
    }

    #[test]
    fn test_empty_in_matches_nothing() {
        let sql = translate(&with_filters(vec![FilterCondition::new(
            "id",
            FilterOperator::In,
            Value::List(vec![]),
        )]))
        .unwrap();
        assert!(sql.contains("WHERE 1=1 AND FALSE ORDER BY"));
    }

    #[test]
    fn test_text_search_ors_fields() {
        let request = SearchRequest {
            search: Some(TextSearch { term: "  hadith ".to_string(), fields: vec![] }),
            ..Default::default()
        };
        let sql = translate(&request).unwrap();
        assert!(sql.contains("AND (s.name ILIKE $1 OR s.note ILIKE $2)"));

        let request = SearchRequest {
            search: Some(TextSearch { term: "fiqh".to_string(), fields: vec!["tags".to_string()] }),
            ..Default::default()
        };
        assert!(translate(&request).unwrap().contains("(array_to_string(s.tags, ' ') ILIKE $1)"));

        let blank = SearchRequest {
            search: Some(TextSearch { term: "   ".to_string(), fields: vec![] }),
            ..Default::default()
        };
        assert!(!translate(&blank).unwrap().contains("ILIKE"));
    }

    #[test]
    fn test_order_by_with_tie_breaker() {
        let request = SearchRequest {
            sort: vec![SortKey::desc("year"), SortKey::asc("created_at")],
            ..Default::default()
        };
        let sql = translate(&request).unwrap();
        assert!(sql.contains("ORDER BY s.year DESC NULLS FIRST, s.created_at ASC NULLS LAST, s.id ASC"));

        let by_id = SearchRequest { sort: vec![SortKey::desc("id")], ..Default::default() };
        assert!(translate(&by_id).unwrap().contains("ORDER BY s.id DESC NULLS FIRST LIMIT"));
    }

    #[test]
    fn test_rejects_invalid_requests() {
        let unsortable = SearchRequest { sort: vec![SortKey::asc("note")], ..Default::default() };
        assert_eq!(translate(&unsortable).unwrap_err(), QueryError::NotSortable("note".to_string()));

        let bad = with_filters(vec![FilterCondition::new("password_hash", FilterOperator::Eq, "x")]);
        assert_eq!(translate(&bad).unwrap_err(), QueryError::UnknownField("password_hash".to_string()));
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like(r"100%_a\b"), r"100\%\_a\\b");
    }
}
