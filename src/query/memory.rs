//! In-memory evaluation of a [`SearchRequest`].
//!
//! Mirrors the SQL translation: same operators, same null handling, nulls
//! last when ascending and first when descending. Ties keep the input order.

use std::cmp::Ordering;

use super::value::{fold_case, normalize_text, Scalar};
use super::{
    FieldKind, FilterCondition, FilterOperator, Page, QueryError, Queryable, Schema,
    SearchRequest, SortDirection, SortKey, Value,
};

/// Filter, search, sort and paginate `items`
pub fn apply<T: Queryable + Clone>(items: &[T], request: &SearchRequest) -> Result<Page<T>, QueryError> {
    let schema = T::schema();
    request.validate(schema)?;

    let matching = select(items, request, schema)?;
    let sorted = sort(matching, request.effective_sort(schema), schema)?;

    let total = sorted.len() as i64;
    let pagination = request.pagination;
    let page = sorted
        .into_iter()
        .skip(usize::try_from(pagination.offset()).unwrap_or(usize::MAX))
        .take(usize::try_from(pagination.limit()).unwrap_or(usize::MAX))
        .cloned()
        .collect();

    Ok(Page::new(page, total, &pagination))
}

/// Items matching every filter and, when a term is given, the text search
fn select<'a, T: Queryable>(
    items: &'a [T],
    request: &SearchRequest,
    schema: &Schema,
) -> Result<Vec<&'a T>, QueryError> {
    let search_fields = request
        .search_fields(schema)
        .into_iter()
        .map(|name| schema.field(name).map(|def| (name, def.kind)))
        .collect::<Result<Vec<_>, _>>()?;
    let term = request.search_term().map(fold_case);

    Ok(items
        .iter()
        .filter(|item| {
            request
                .filters
                .iter()
                .all(|f| schema.field(&f.field).map_or(false, |def| matches_filter(*item, f, def.kind)))
        })
        .filter(|item| match &term {
            Some(term) => search_fields
                .iter()
                .any(|(name, _)| field_text(&item.field(name)).map_or(false, |text| text.contains(term))),
            None => true,
        })
        .collect())
}

/// Lowercased text of a field for free-text search; arrays are joined with spaces
fn field_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::List(items) => Some(fold_case(
            &items.iter().map(Value::to_text).collect::<Vec<_>>().join(" "),
        )),
        other => Some(fold_case(&other.to_text())),
    }
}

/// Evaluate one filter against one item
pub fn matches_filter<T: Queryable>(item: &T, filter: &FilterCondition, kind: FieldKind) -> bool {
    let raw = item.field(&filter.field);

    if filter.value.is_null() {
        return match filter.operator {
            FilterOperator::Eq => raw.is_null(),
            FilterOperator::Neq => !raw.is_null(),
            _ => false,
        };
    }

    if filter.operator == FilterOperator::Contains {
        if raw.is_null() {
            return false;
        }
        let present: Vec<Scalar> = raw
            .as_list()
            .into_iter()
            .filter_map(|v| v.to_scalar(FieldKind::Text))
            .collect();
        return filter
            .value
            .as_list()
            .into_iter()
            .filter_map(|v| v.to_scalar(FieldKind::Text))
            .all(|wanted| present.contains(&wanted));
    }

    let Some(actual) = raw.to_scalar(kind) else {
        return false;
    };
    let operand = |v: &Value| v.to_scalar(kind);

    match filter.operator {
        FilterOperator::Eq => operand(&filter.value).map_or(false, |v| actual == v),
        FilterOperator::Neq => operand(&filter.value).map_or(false, |v| actual != v),
        FilterOperator::Gt => cmp(&actual, &filter.value, kind) == Some(Ordering::Greater),
        FilterOperator::Gte => matches!(cmp(&actual, &filter.value, kind), Some(Ordering::Greater | Ordering::Equal)),
        FilterOperator::Lt => cmp(&actual, &filter.value, kind) == Some(Ordering::Less),
        FilterOperator::Lte => matches!(cmp(&actual, &filter.value, kind), Some(Ordering::Less | Ordering::Equal)),
        FilterOperator::Between => {
            let lower = cmp(&actual, &filter.value, kind);
            let upper = filter.value_to.as_ref().and_then(|to| cmp(&actual, to, kind));
            matches!(lower, Some(Ordering::Greater | Ordering::Equal))
                && matches!(upper, Some(Ordering::Less | Ordering::Equal))
        }
        FilterOperator::In => filter
            .value
            .as_list()
            .into_iter()
            .filter_map(operand)
            .any(|v| actual == v),
        FilterOperator::Like
        | FilterOperator::ILike
        | FilterOperator::StartsWith
        | FilterOperator::EndsWith => {
            let Scalar::Text(haystack) = &actual else {
                return false;
            };
            let needle = normalize_text(&filter.value.to_text());
            match filter.operator {
                FilterOperator::Like => haystack.contains(&needle),
                FilterOperator::ILike => fold_case(haystack).contains(&fold_case(&needle)),
                FilterOperator::StartsWith => haystack.starts_with(&needle),
                _ => haystack.ends_with(&needle),
            }
        }
        FilterOperator::Contains => false,
    }
}

fn cmp(actual: &Scalar, operand: &Value, kind: FieldKind) -> Option<Ordering> {
    actual.partial_cmp(&operand.to_scalar(kind)?)
}

/// Stable multi-key sort: the first non-equal key decides
fn sort<'a, T: Queryable>(
    mut items: Vec<&'a T>,
    keys: &[SortKey],
    schema: &Schema,
) -> Result<Vec<&'a T>, QueryError> {
    if keys.is_empty() {
        return Ok(items);
    }
    let kinds = keys
        .iter()
        .map(|k| schema.field(&k.field).map(|def| def.kind))
        .collect::<Result<Vec<_>, _>>()?;

    let mut keyed: Vec<(Vec<Option<Scalar>>, &'a T)> = items
        .drain(..)
        .map(|item| {
            let values = keys
                .iter()
                .zip(&kinds)
                .map(|(key, kind)| item.field(&key.field).to_scalar(*kind))
                .collect();
            (values, item)
        })
        .collect();

    keyed.sort_by(|(a, _), (b, _)| {
        keys.iter()
            .enumerate()
            .map(|(i, key)| compare_nullable(a[i].as_ref(), b[i].as_ref(), key.direction))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });

    Ok(keyed.into_iter().map(|(_, item)| item).collect())
}

/// PostgreSQL default null placement: last for ascending, first for descending
fn compare_nullable(a: Option<&Scalar>, b: Option<&Scalar>, direction: SortDirection) -> Ordering {
    let ordering = match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
    };
    match direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::schema::tests::sample_schema;
    use crate::query::{FilterCondition, Pagination, TextSearch};
    use chrono::{DateTime, TimeZone, Utc};
    use once_cell::sync::Lazy;

    #[derive(Debug, Clone, PartialEq)]
    struct Sample {
        id: i64,
        name: &'static str,
        note: Option<&'static str>,
        year: Option<i64>,
        active: bool,
        tags: Vec<&'static str>,
        created_at: DateTime<Utc>,
    }

    static SCHEMA: Lazy<Schema> = Lazy::new(sample_schema);

    impl Queryable for Sample {
        fn schema() -> &'static Schema {
            &SCHEMA
        }

        fn field(&self, name: &str) -> Value {
            match name {
                "id" => Value::Int(self.id),
                "name" => Value::from(self.name),
                "note" => self.note.map(Value::from).unwrap_or(Value::Null),
                "year" => self.year.map(Value::Int).unwrap_or(Value::Null),
                "active" => Value::Bool(self.active),
                "tags" => Value::List(self.tags.iter().map(|t| Value::from(*t)).collect()),
                "created_at" => Value::Timestamp(self.created_at),
                _ => Value::Null,
            }
        }
    }

    fn sample(id: i64, name: &'static str, year: Option<i64>, tags: Vec<&'static str>) -> Sample {
        Sample {
            id,
            name,
            note: None,
            year,
            active: id % 2 == 0,
            tags,
            created_at: Utc.with_ymd_and_hms(2024, 1, id as u32, 9, 0, 0).unwrap(),
        }
    }

    fn shelf() -> Vec<Sample> {
        vec![
            sample(1, "Riyad as-Salihin", Some(1277), vec!["hadith"]),
            sample(2, "Al-Muwatta", Some(795), vec!["hadith", "fiqh"]),
            sample(3, "Tafsir Ibn Kathir", None, vec!["tafsir"]),
            sample(4, "Al-Ajurrumiyya", Some(1323), vec!["nahw"]),
            sample(5, "Bulugh al-Maram", Some(1448), vec!["hadith", "fiqh"]),
        ]
    }

    fn request(filters: Vec<FilterCondition>) -> SearchRequest {
        SearchRequest {
            filters,
            pagination: Pagination::new(1, 50),
            ..Default::default()
        }
    }

    fn ids(page: &Page<Sample>) -> Vec<i64> {
        page.items.iter().map(|s| s.id).collect()
    }

    #[test]
    fn test_comparison_operators() {
        let items = shelf();
        let page = apply(&items, &request(vec![FilterCondition::new("year", FilterOperator::Gt, 1300)])).unwrap();
        assert_eq!(ids(&page), vec![4, 5]);

        let page = apply(&items, &request(vec![FilterCondition::new("year", FilterOperator::Lte, "1277")])).unwrap();
        assert_eq!(ids(&page), vec![2, 1]);
    }

    #[test]
    fn test_null_fields_never_match_comparisons() {
        let items = shelf();
        let page = apply(&items, &request(vec![FilterCondition::new("year", FilterOperator::Neq, 795)])).unwrap();
        assert!(!ids(&page).contains(&3));

        let page = apply(&items, &request(vec![FilterCondition::new("year", FilterOperator::Eq, Value::Null)])).unwrap();
        assert_eq!(ids(&page), vec![3]);
    }

    #[test]
    fn test_substring_operators() {
        let items = shelf();
        let page = apply(&items, &request(vec![FilterCondition::new("name", FilterOperator::Like, "al-")])).unwrap();
        assert_eq!(ids(&page), vec![5]);

        let page = apply(&items, &request(vec![FilterCondition::new("name", FilterOperator::ILike, "al-")])).unwrap();
        assert_eq!(ids(&page), vec![4, 2, 5]);

        let page = apply(&items, &request(vec![FilterCondition::new("name", FilterOperator::StartsWith, "Al-")])).unwrap();
        assert_eq!(ids(&page), vec![4, 2]);

        let page = apply(&items, &request(vec![FilterCondition::new("name", FilterOperator::EndsWith, "Kathir")])).unwrap();
        assert_eq!(ids(&page), vec![3]);
    }

    #[test]
    fn test_set_and_range_operators() {
        let items = shelf();
        let in_list = FilterCondition::new(
            "id",
            FilterOperator::In,
            Value::List(vec![Value::Int(2), Value::from("4")]),
        );
        assert_eq!(ids(&apply(&items, &request(vec![in_list])).unwrap()), vec![4, 2]);

        let empty_in = FilterCondition::new("id", FilterOperator::In, Value::List(vec![]));
        assert!(apply(&items, &request(vec![empty_in])).unwrap().items.is_empty());

        let range = FilterCondition::between("year", 795, 1323);
        assert_eq!(ids(&apply(&items, &request(vec![range])).unwrap()), vec![4, 2, 1]);

        let dates = FilterCondition::between("created_at", "2024-01-02", "2024-01-03T23:59:59Z");
        assert_eq!(ids(&apply(&items, &request(vec![dates])).unwrap()), vec![2, 3]);
    }

    #[test]
    fn test_array_containment() {
        let items = shelf();
        let f = FilterCondition::new("tags", FilterOperator::Contains, vec!["hadith".to_string(), "fiqh".to_string()]);
        assert_eq!(ids(&apply(&items, &request(vec![f])).unwrap()), vec![2, 5]);
    }

    #[test]
    fn test_text_search_is_or_across_fields() {
        let items = shelf();
        let mut req = request(vec![]);
        req.search = Some(TextSearch {
            term: "FIQH".to_string(),
            fields: vec!["name".to_string(), "tags".to_string()],
        });
        assert_eq!(ids(&apply(&items, &req).unwrap()), vec![2, 5]);

        req.search = Some(TextSearch { term: "tafsir".to_string(), fields: vec![] });
        assert_eq!(ids(&apply(&items, &req).unwrap()), vec![3]);
    }

    #[test]
    fn test_multi_key_sort_is_stable() {
        let items = shelf();
        let mut req = request(vec![]);
        req.sort = vec![SortKey::desc("active"), SortKey::asc("year")];
        // "active" is not sortable in the sample schema
        assert_eq!(apply(&items, &req).unwrap_err(), QueryError::NotSortable("active".to_string()));

        req.sort = vec![SortKey::asc("year")];
        assert_eq!(ids(&apply(&items, &req).unwrap()), vec![2, 1, 4, 5, 3]);

        req.sort = vec![SortKey::desc("year")];
        assert_eq!(ids(&apply(&items, &req).unwrap()), vec![3, 5, 4, 1, 2]);
    }

    #[test]
    fn test_sort_ties_keep_input_order() {
        let mut items = shelf();
        items[0].name = "Same";
        items[3].name = "Same";
        let mut req = request(vec![]);
        req.sort = vec![SortKey::asc("name")];
        let page = apply(&items, &req).unwrap();
        let same: Vec<i64> = page.items.iter().filter(|s| s.name == "Same").map(|s| s.id).collect();
        assert_eq!(same, vec![1, 4]);
    }

    #[test]
    fn test_pagination_window() {
        let items = shelf();
        let mut req = request(vec![]);
        req.sort = vec![SortKey::asc("id")];
        req.pagination = Pagination::new(2, 2);
        let page = apply(&items, &req).unwrap();
        assert_eq!(ids(&page), vec![3, 4]);
        assert_eq!(page.total, 5);
        assert_eq!(page.total_pages, 3);

        req.pagination = Pagination::new(9, 2);
        assert!(apply(&items, &req).unwrap().items.is_empty());
    }

    #[test]
    fn test_invalid_request_is_rejected() {
        let items = shelf();
        let req = request(vec![FilterCondition::new("missing", FilterOperator::Eq, 1)]);
        assert_eq!(apply(&items, &req).unwrap_err(), QueryError::UnknownField("missing".to_string()));
    }
}
