//! The resolved, schema-valid query sent to the analytics backend.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::catalog::SchemaCatalog;
use crate::error::QueryViolation;

/// Comparison applied by a filter predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
}

impl FilterOperator {
    /// Parse a loosely-written operator. Returns `None` when unrecognized.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "=" | "==" | "eq" | "is" | "equals" | "in" => Some(FilterOperator::Eq),
            "!=" | "<>" | "ne" | "neq" | "not" | "is not" | "not_eq" => {
                Some(FilterOperator::NotEq)
            }
            ">" | "gt" => Some(FilterOperator::Gt),
            ">=" | "gte" => Some(FilterOperator::Gte),
            "<" | "lt" => Some(FilterOperator::Lt),
            "<=" | "lte" => Some(FilterOperator::Lte),
            "contains" | "like" => Some(FilterOperator::Contains),
            _ => None,
        }
    }
}

/// A filter on one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterPredicate {
    pub operator: FilterOperator,
    /// Value in backend filter syntax; comma-separated values mean any-of.
    pub value: String,
}

impl FilterPredicate {
    pub fn new(operator: FilterOperator, value: impl Into<String>) -> Self {
        Self {
            operator,
            value: value.into(),
        }
    }

    pub fn eq(value: impl Into<String>) -> Self {
        Self::new(FilterOperator::Eq, value)
    }

    /// Render as a backend filter expression, e.g. `US`, `-US`, `>100`, `%mobile%`.
    pub fn expression(&self) -> String {
        match self.operator {
            FilterOperator::Eq => self.value.clone(),
            FilterOperator::NotEq => self
                .value
                .split(',')
                .map(|v| format!("-{}", v.trim()))
                .collect::<Vec<_>>()
                .join(","),
            FilterOperator::Gt => format!(">{}", self.value),
            FilterOperator::Gte => format!(">={}", self.value),
            FilterOperator::Lt => format!("<{}", self.value),
            FilterOperator::Lte => format!("<={}", self.value),
            FilterOperator::Contains => format!("%{}%", self.value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" | "up" => Some(SortDirection::Asc),
            "desc" | "descending" | "down" => Some(SortDirection::Desc),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    /// Backend sort syntax: `field` or `field desc`.
    pub fn expression(&self) -> String {
        match self.direction {
            SortDirection::Asc => self.field.clone(),
            SortDirection::Desc => format!("{} desc", self.field),
        }
    }
}

/// A fully resolved query.
///
/// Filters are keyed in a `BTreeMap` so equal inputs always serialize the
/// same way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub model: String,
    pub view: String,
    pub fields: Vec<String>,
    #[serde(default)]
    pub filters: BTreeMap<String, FilterPredicate>,
    #[serde(default)]
    pub sorts: Vec<SortSpec>,
    pub limit: u32,
}

impl Query {
    /// Check the schema contract: model, view, at least one field, a
    /// positive limit, and every referenced key known to the catalog.
    pub fn validate(&self, catalog: &SchemaCatalog) -> Result<(), QueryViolation> {
        if self.model.trim().is_empty() {
            return Err(QueryViolation::MissingModel);
        }
        if self.view.trim().is_empty() {
            return Err(QueryViolation::MissingView);
        }
        if self.fields.is_empty() {
            return Err(QueryViolation::EmptyFields);
        }
        if self.limit == 0 {
            return Err(QueryViolation::ZeroLimit);
        }

        let unknown = |location: &'static str, field: &str| QueryViolation::UnknownField {
            location,
            field: field.to_string(),
        };

        if let Some(f) = self.fields.iter().find(|f| !catalog.contains(f)) {
            return Err(unknown("fields", f));
        }
        if let Some(f) = self.filters.keys().find(|f| !catalog.contains(f)) {
            return Err(unknown("filters", f));
        }
        if let Some(s) = self.sorts.iter().find(|s| !catalog.contains(&s.field)) {
            return Err(unknown("sorts", &s.field));
        }
        Ok(())
    }

    /// Render the inline-query request body the backend expects.
    pub fn to_wire(&self) -> Value {
        let filters: serde_json::Map<String, Value> = self
            .filters
            .iter()
            .map(|(field, predicate)| (field.clone(), Value::String(predicate.expression())))
            .collect();
        let sorts: Vec<String> = self.sorts.iter().map(SortSpec::expression).collect();

        json!({
            "model": self.model,
            "view": self.view,
            "fields": self.fields,
            "filters": filters,
            "sorts": sorts,
            "limit": self.limit.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FieldDescriptor;

    fn catalog() -> SchemaCatalog {
        SchemaCatalog::new(
            "analytics",
            "sessions_explore",
            vec![FieldDescriptor::new("country"), FieldDescriptor::new("device")],
            vec![FieldDescriptor::new("sessions")],
        )
        .unwrap()
    }

    fn query() -> Query {
        Query {
            model: "analytics".to_string(),
            view: "sessions_explore".to_string(),
            fields: vec!["sessions".to_string()],
            filters: BTreeMap::new(),
            sorts: vec![],
            limit: 10,
        }
    }

    // ---- Operators ----

    #[test]
    fn test_operator_parse_variants() {
        assert_eq!(FilterOperator::parse("="), Some(FilterOperator::Eq));
        assert_eq!(FilterOperator::parse("equals"), Some(FilterOperator::Eq));
        assert_eq!(FilterOperator::parse("!="), Some(FilterOperator::NotEq));
        assert_eq!(FilterOperator::parse("NOT"), Some(FilterOperator::NotEq));
        assert_eq!(FilterOperator::parse(">="), Some(FilterOperator::Gte));
        assert_eq!(FilterOperator::parse("lt"), Some(FilterOperator::Lt));
        assert_eq!(FilterOperator::parse("like"), Some(FilterOperator::Contains));
        assert_eq!(FilterOperator::parse("between"), None);
    }

    #[test]
    fn test_filter_expressions() {
        assert_eq!(FilterPredicate::eq("US").expression(), "US");
        assert_eq!(
            FilterPredicate::new(FilterOperator::NotEq, "US,CA").expression(),
            "-US,-CA"
        );
        assert_eq!(FilterPredicate::new(FilterOperator::Gt, "100").expression(), ">100");
        assert_eq!(FilterPredicate::new(FilterOperator::Lte, "5").expression(), "<=5");
        assert_eq!(
            FilterPredicate::new(FilterOperator::Contains, "mobile").expression(),
            "%mobile%"
        );
    }

    #[test]
    fn test_sort_direction_parse() {
        assert_eq!(SortDirection::parse("DESC"), Some(SortDirection::Desc));
        assert_eq!(SortDirection::parse("ascending"), Some(SortDirection::Asc));
        assert_eq!(SortDirection::parse("sideways"), None);
    }

    // ---- Validation ----

    #[test]
    fn test_valid_query_passes() {
        let mut q = query();
        q.filters.insert("country".to_string(), FilterPredicate::eq("US"));
        q.sorts.push(SortSpec::new("sessions", SortDirection::Desc));
        assert!(q.validate(&catalog()).is_ok());
    }

    #[test]
    fn test_empty_fields_rejected() {
        let mut q = query();
        q.fields.clear();
        assert_eq!(q.validate(&catalog()), Err(QueryViolation::EmptyFields));
    }

    #[test]
    fn test_missing_view_rejected() {
        let mut q = query();
        q.view = " ".to_string();
        assert_eq!(q.validate(&catalog()), Err(QueryViolation::MissingView));
    }

    #[test]
    fn test_zero_limit_rejected() {
        let mut q = query();
        q.limit = 0;
        assert_eq!(q.validate(&catalog()), Err(QueryViolation::ZeroLimit));
    }

    #[test]
    fn test_unknown_filter_field_rejected() {
        let mut q = query();
        q.filters.insert("bogus".to_string(), FilterPredicate::eq("x"));
        assert_eq!(
            q.validate(&catalog()),
            Err(QueryViolation::UnknownField {
                location: "filters",
                field: "bogus".to_string()
            })
        );
    }

    #[test]
    fn test_unknown_sort_field_rejected() {
        let mut q = query();
        q.sorts.push(SortSpec::new("bogus", SortDirection::Asc));
        assert!(matches!(
            q.validate(&catalog()),
            Err(QueryViolation::UnknownField { location: "sorts", .. })
        ));
    }

    // ---- Wire format ----

    #[test]
    fn test_to_wire_shape() {
        let mut q = query();
        q.fields.push("country".to_string());
        q.filters.insert(
            "device".to_string(),
            FilterPredicate::new(FilterOperator::NotEq, "tablet"),
        );
        q.sorts.push(SortSpec::new("sessions", SortDirection::Desc));

        let wire = q.to_wire();
        assert_eq!(wire["model"], "analytics");
        assert_eq!(wire["view"], "sessions_explore");
        assert_eq!(wire["fields"], json!(["sessions", "country"]));
        assert_eq!(wire["filters"]["device"], "-tablet");
        assert_eq!(wire["sorts"], json!(["sessions desc"]));
        assert_eq!(wire["limit"], "10");
    }
}
