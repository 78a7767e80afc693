//! Per-entity field whitelists.
//!
//! A [`Schema`] lists the fields a client may filter, sort or search on, the
//! SQL expression each maps to and its [`FieldKind`]. Anything not listed is
//! rejected, so column names in generated SQL never come from user input.

use indexmap::IndexMap;

use super::{FilterCondition, FilterOperator, QueryError, SortKey, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Decimal,
    Boolean,
    Timestamp,
    Uuid,
    TextArray,
}

impl FieldKind {
    pub fn supports(&self, op: FilterOperator) -> bool {
        use FilterOperator::*;
        match self {
            FieldKind::Text => !matches!(op, Contains),
            FieldKind::Integer | FieldKind::Decimal | FieldKind::Timestamp => {
                matches!(op, Eq | Neq | Gt | Gte | Lt | Lte | In | Between)
            }
            FieldKind::Boolean | FieldKind::Uuid => matches!(op, Eq | Neq | In),
            FieldKind::TextArray => matches!(op, Contains),
        }
    }

    /// Kind of a single operand: array fields are compared element-wise as text
    pub fn element(&self) -> FieldKind {
        match self {
            FieldKind::TextArray => FieldKind::Text,
            other => *other,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: &'static str,
    /// SQL expression, e.g. `b.title`
    pub column: &'static str,
    pub kind: FieldKind,
    pub sortable: bool,
    pub searchable: bool,
}

impl FieldDef {
    pub fn new(name: &'static str, column: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            column,
            kind,
            sortable: false,
            searchable: false,
        }
    }

    pub fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }

    pub fn searchable(mut self) -> Self {
        self.searchable = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Schema {
    pub entity: &'static str,
    /// Column used as the final sort key so SQL pagination is deterministic
    pub primary_key: &'static str,
    fields: IndexMap<&'static str, FieldDef>,
    default_search: Vec<&'static str>,
    default_sort: Vec<SortKey>,
}

impl Schema {
    pub fn new(entity: &'static str, primary_key: &'static str) -> Self {
        Self {
            entity,
            primary_key,
            fields: IndexMap::new(),
            default_search: Vec::new(),
            default_sort: Vec::new(),
        }
    }

    pub fn with(mut self, def: FieldDef) -> Self {
        self.fields.insert(def.name, def);
        self
    }

    pub fn search_by_default(mut self, names: &[&'static str]) -> Self {
        self.default_search = names.to_vec();
        self
    }

    pub fn sort_by_default(mut self, keys: Vec<SortKey>) -> Self {
        self.default_sort = keys;
        self
    }

    pub fn field(&self, name: &str) -> Result<&FieldDef, QueryError> {
        self.fields
            .get(name)
            .ok_or_else(|| QueryError::UnknownField(name.to_string()))
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.values()
    }

    pub fn default_search(&self) -> &[&'static str] {
        &self.default_search
    }

    pub fn default_sort(&self) -> &[SortKey] {
        &self.default_sort
    }

    /// Validate one filter condition against this schema
    pub fn check_filter(&self, filter: &FilterCondition) -> Result<(), QueryError> {
        let def = self.field(&filter.field)?;
        let op = filter.operator;

        if !def.kind.supports(op) {
            return Err(QueryError::UnsupportedOperator {
                field: filter.field.clone(),
                operator: op,
            });
        }

        if filter.value.is_null() && !matches!(op, FilterOperator::Eq | FilterOperator::Neq) {
            return Err(QueryError::InvalidValue {
                field: filter.field.clone(),
                reason: format!("null is only valid with eq or neq, not {}", op),
            });
        }

        if op == FilterOperator::Between {
            match &filter.value_to {
                None | Some(Value::Null) => {
                    return Err(QueryError::MissingRangeEnd(filter.field.clone()))
                }
                Some(_) => {}
            }
        }

        if !op.takes_list() && matches!(filter.value, Value::List(_)) {
            return Err(QueryError::InvalidValue {
                field: filter.field.clone(),
                reason: format!("operator {} expects a single value", op),
            });
        }

        if !filter.value.is_null() {
            for operand in filter.value.as_list() {
                operand.expect_scalar(def.kind.element(), &filter.field)?;
            }
        }
        if let (FilterOperator::Between, Some(to)) = (op, &filter.value_to) {
            to.expect_scalar(def.kind, &filter.field)?;
        }

        Ok(())
    }
}

/// Entities that can be searched through a [`Schema`].
///
/// `field` returns the value of a schema field for in-memory evaluation;
/// names outside the schema yield `Value::Null`.
pub trait Queryable {
    fn schema() -> &'static Schema;

    fn field(&self, name: &str) -> Value;
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::query::FilterCondition;

    pub fn sample_schema() -> Schema {
        Schema::new("samples", "s.id")
            .with(FieldDef::new("id", "s.id", FieldKind::Integer).sortable())
            .with(FieldDef::new("name", "s.name", FieldKind::Text).sortable().searchable())
            .with(FieldDef::new("note", "s.note", FieldKind::Text).searchable())
            .with(FieldDef::new("year", "s.year", FieldKind::Integer).sortable())
            .with(FieldDef::new("active", "s.active", FieldKind::Boolean))
            .with(FieldDef::new("tags", "s.tags", FieldKind::TextArray).searchable())
            .with(FieldDef::new("created_at", "s.created_at", FieldKind::Timestamp).sortable())
            .search_by_default(&["name", "note"])
            .sort_by_default(vec![SortKey::asc("name")])
    }

    #[test]
    fn test_unknown_field() {
        let schema = sample_schema();
        let f = FilterCondition::new("secret", FilterOperator::Eq, "x");
        assert_eq!(schema.check_filter(&f), Err(QueryError::UnknownField("secret".to_string())));
    }

    #[test]
    fn test_operator_kind_compatibility() {
        let schema = sample_schema();
        assert!(schema.check_filter(&FilterCondition::new("name", FilterOperator::ILike, "a")).is_ok());
        assert!(schema.check_filter(&FilterCondition::new("year", FilterOperator::Like, "19")).is_err());
        assert!(schema.check_filter(&FilterCondition::new("active", FilterOperator::Gt, true)).is_err());
        assert!(schema
            .check_filter(&FilterCondition::new("tags", FilterOperator::Contains, vec!["fiqh".to_string()]))
            .is_ok());
        assert!(schema.check_filter(&FilterCondition::new("tags", FilterOperator::Eq, "fiqh")).is_err());
    }

    #[test]
    fn test_between_requires_upper_bound() {
        let schema = sample_schema();
        let f = FilterCondition::new("year", FilterOperator::Between, 1990);
        assert_eq!(schema.check_filter(&f), Err(QueryError::MissingRangeEnd("year".to_string())));
        assert!(schema.check_filter(&FilterCondition::between("year", 1990, 2000)).is_ok());
    }

    #[test]
    fn test_operand_must_coerce() {
        let schema = sample_schema();
        assert!(schema.check_filter(&FilterCondition::new("year", FilterOperator::Gte, "1999")).is_ok());
        assert!(matches!(
            schema.check_filter(&FilterCondition::new("year", FilterOperator::Gte, "last year")),
            Err(QueryError::InvalidValue { .. })
        ));
        assert!(matches!(
            schema.check_filter(&FilterCondition::new("year", FilterOperator::Eq, Value::Float(1e300))),
            Err(QueryError::InvalidValue { .. })
        ));
        let bad_range = FilterCondition::between("created_at", "2024-01-01", "tomorrow");
        assert!(schema.check_filter(&bad_range).is_err());
    }

    #[test]
    fn test_null_only_with_equality() {
        let schema = sample_schema();
        assert!(schema.check_filter(&FilterCondition::new("note", FilterOperator::Eq, Value::Null)).is_ok());
        assert!(schema.check_filter(&FilterCondition::new("note", FilterOperator::Gt, Value::Null)).is_err());
    }
}
