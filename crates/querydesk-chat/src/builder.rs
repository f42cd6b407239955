//! Query construction: classifier entities in, schema-valid query out.
//!
//! Resolution is lenient. Anything that does not resolve against the
//! catalog is dropped and reported as a [`BuildWarning`]; an empty field
//! list falls back to the catalog's first measure. The builder never fails.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{FixedOffset, NaiveDate, Offset, Utc};
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};

use querydesk_core::config::QueryConfig;

use crate::catalog::SchemaCatalog;
use crate::dates::TimeIntent;
use crate::query::{FilterOperator, FilterPredicate, Query, SortDirection, SortSpec};
use crate::types::{Entities, FilterEntity, Intent, SortEntity};

/// Trailing direction on a sort field, e.g. `"revenue desc"`.
static SORT_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(.+?)\s+(asc|ascending|desc|descending)$").expect("valid regex")
});

/// First integer in a free-form limit, e.g. `"top 5"` or `"top 1,000"`.
static LIMIT_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d[\d,]*").expect("valid regex"));

/// A non-fatal problem met while building a query.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildWarning {
    #[error("field '{0}' is not in the schema and was ignored")]
    UnresolvedField(String),
    #[error("filter field '{0}' is not in the schema; filter dropped")]
    UnresolvedFilterField(String),
    #[error("sort field '{0}' is not in the schema; sort dropped")]
    UnresolvedSortField(String),
    #[error("filter on '{field}' has no usable value; filter dropped")]
    EmptyFilterValue { field: String },
    #[error("unknown operator '{operator}' on '{field}'; using equality")]
    UnknownOperator { field: String, operator: String },
    #[error("unknown sort direction '{direction}' on '{field}'; sorting ascending")]
    UnknownDirection { field: String, direction: String },
    #[error("limit '{raw}' is not a positive number; using {default}")]
    InvalidLimit { raw: String, default: u32 },
    #[error("limit {requested} exceeds the maximum; using {max}")]
    LimitClamped { requested: String, max: u32 },
    #[error("'{value}' is not Yes/No for yes/no field '{field}'")]
    YesNoValue { field: String, value: String },
    #[error("time field '{0}' is not in the schema; date filter dropped")]
    UnresolvedTimeField(String),
    #[error("'{0}' is not a date field; date filter dropped")]
    NotADateField(String),
    #[error("timeframe given but the schema has no date dimension; date filter dropped")]
    NoDateField,
    #[error("invalid timeframe on '{field}': {reason}; date filter dropped")]
    InvalidTimeIntent { field: String, reason: String },
}

/// A built query plus what the builder had to do to get there.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildOutcome {
    pub query: Query,
    pub warnings: Vec<BuildWarning>,
    /// True when no field resolved and the fallback field was used.
    pub used_fallback: bool,
}

/// Builds [`Query`] values from classifier entities.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    default_limit: u32,
    max_limit: u32,
    /// Offset used to decide what "today" is for relative timeframes.
    utc_offset: FixedOffset,
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self::from_config(&QueryConfig::default())
    }
}

impl QueryBuilder {
    /// A zero default is raised to 1 and the maximum is never below the
    /// default, so every built limit is positive and bounded.
    pub fn new(default_limit: u32, max_limit: u32) -> Self {
        let default_limit = default_limit.max(1);
        Self {
            default_limit,
            max_limit: max_limit.max(default_limit),
            utc_offset: Utc.fix(),
        }
    }

    pub fn from_config(config: &QueryConfig) -> Self {
        let offset = config
            .utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| {
                warn!(
                    minutes = config.utc_offset_minutes,
                    "UTC offset out of range; using UTC"
                );
                Utc.fix()
            });
        Self::new(config.default_limit, config.max_limit).with_utc_offset(offset)
    }

    pub fn with_utc_offset(mut self, offset: FixedOffset) -> Self {
        self.utc_offset = offset;
        self
    }

    /// The current date at the configured offset.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.utc_offset).date_naive()
    }

    pub fn default_limit(&self) -> u32 {
        self.default_limit
    }

    pub fn max_limit(&self) -> u32 {
        self.max_limit
    }

    /// Build a query for `intent`.
    ///
    /// `prior` is merged only for [`Intent::DrillDown`]: prior fields come
    /// first, new filters override prior ones on the same key, new sorts
    /// replace prior sorts, and the prior limit applies when none is given.
    pub fn build(
        &self,
        intent: Intent,
        entities: &Entities,
        catalog: &SchemaCatalog,
        prior: Option<&Query>,
    ) -> BuildOutcome {
        self.build_on(intent, entities, catalog, prior, self.today())
    }

    /// [`QueryBuilder::build`] with relative timeframes anchored at `today`.
    pub fn build_on(
        &self,
        intent: Intent,
        entities: &Entities,
        catalog: &SchemaCatalog,
        prior: Option<&Query>,
        today: NaiveDate,
    ) -> BuildOutcome {
        let prior = prior.filter(|_| intent == Intent::DrillDown);
        let mut warnings = Vec::new();

        // Fields
        let mut fields: Vec<String> = Vec::new();
        if let Some(p) = prior {
            for f in p.fields.iter().filter(|f| catalog.contains(f)) {
                push_unique(&mut fields, f);
            }
        }
        for candidate in &entities.fields {
            match catalog.resolve(candidate) {
                Some(key) => push_unique(&mut fields, key),
                None => warnings.push(BuildWarning::UnresolvedField(candidate.clone())),
            }
        }

        let used_fallback = fields.is_empty();
        if used_fallback {
            let fallback = catalog.fallback_field();
            info!(field = %fallback, intent = %intent, "No field resolved; using fallback");
            fields.push(fallback.to_string());
        }

        // Filters
        let mut filters: BTreeMap<String, FilterPredicate> = prior
            .map(|p| {
                p.filters
                    .iter()
                    .filter(|(k, _)| catalog.contains(k))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default();
        for entity in &entities.filters {
            if let Some((key, predicate)) = self.resolve_filter(entity, catalog, &mut warnings) {
                filters.insert(key, predicate);
            }
        }
        if let Some(time_intent) = &entities.time_intent {
            if let Some((key, predicate)) =
                self.resolve_time_intent(time_intent, catalog, today, &mut warnings)
            {
                filters.insert(key, predicate);
            }
        }

        // Sorts
        let mut sorts: Vec<SortSpec> = Vec::new();
        for entity in &entities.sorts {
            if let Some(spec) = self.resolve_sort(entity, catalog, &mut warnings) {
                match sorts.iter_mut().find(|s| s.field == spec.field) {
                    Some(existing) => *existing = spec,
                    None => sorts.push(spec),
                }
            }
        }
        if sorts.is_empty() {
            if let Some(p) = prior {
                sorts = p
                    .sorts
                    .iter()
                    .filter(|s| catalog.contains(&s.field))
                    .cloned()
                    .collect();
            }
        }

        // Limit
        let limit = match entities.limit.as_ref().filter(|v| !v.is_null()) {
            Some(raw) => self.resolve_limit(raw, &mut warnings),
            None => prior
                .map(|p| p.limit.clamp(1, self.max_limit))
                .unwrap_or(self.default_limit),
        };

        for w in &warnings {
            warn!(intent = %intent, "{}", w);
        }

        let query = Query {
            model: catalog.model().to_string(),
            view: catalog.view().to_string(),
            fields,
            filters,
            sorts,
            limit,
        };
        debug_assert!(query.validate(catalog).is_ok(), "builder emitted invalid query");
        debug!(
            fields = query.fields.len(),
            filters = query.filters.len(),
            sorts = query.sorts.len(),
            limit = query.limit,
            merged = prior.is_some(),
            "Query built"
        );

        BuildOutcome {
            query,
            warnings,
            used_fallback,
        }
    }

    fn resolve_filter(
        &self,
        entity: &FilterEntity,
        catalog: &SchemaCatalog,
        warnings: &mut Vec<BuildWarning>,
    ) -> Option<(String, FilterPredicate)> {
        let Some(key) = catalog.resolve(&entity.field) else {
            warnings.push(BuildWarning::UnresolvedFilterField(entity.field.clone()));
            return None;
        };

        let Some(mut value) = filter_value(&entity.value) else {
            warnings.push(BuildWarning::EmptyFilterValue {
                field: key.to_string(),
            });
            return None;
        };

        let operator = match entity.operator.as_deref() {
            None => FilterOperator::Eq,
            Some(raw) => FilterOperator::parse(raw).unwrap_or_else(|| {
                warnings.push(BuildWarning::UnknownOperator {
                    field: key.to_string(),
                    operator: raw.to_string(),
                });
                FilterOperator::Eq
            }),
        };

        if catalog.is_yesno(key) {
            match value.to_ascii_lowercase().as_str() {
                "yes" => value = "Yes".to_string(),
                "no" => value = "No".to_string(),
                _ => warnings.push(BuildWarning::YesNoValue {
                    field: key.to_string(),
                    value: value.clone(),
                }),
            }
        }

        Some((key.to_string(), FilterPredicate::new(operator, value)))
    }

    fn resolve_time_intent(
        &self,
        time_intent: &TimeIntent,
        catalog: &SchemaCatalog,
        today: NaiveDate,
        warnings: &mut Vec<BuildWarning>,
    ) -> Option<(String, FilterPredicate)> {
        let named = time_intent
            .field
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty());
        let key = match named {
            Some(candidate) => match catalog.resolve(candidate) {
                Some(key) => key,
                None => {
                    warnings.push(BuildWarning::UnresolvedTimeField(candidate.to_string()));
                    return None;
                }
            },
            None => match catalog.first_date_dimension() {
                Some(key) => key,
                None => {
                    warnings.push(BuildWarning::NoDateField);
                    return None;
                }
            },
        };
        if !catalog.is_date(key) {
            warnings.push(BuildWarning::NotADateField(key.to_string()));
            return None;
        }

        match time_intent.resolve(today) {
            Ok(range) => {
                debug!(field = %key, range = %range, "Timeframe resolved");
                Some((key.to_string(), FilterPredicate::eq(range.filter_value())))
            }
            Err(e) => {
                warnings.push(BuildWarning::InvalidTimeIntent {
                    field: key.to_string(),
                    reason: e.to_string(),
                });
                None
            }
        }
    }

    fn resolve_sort(
        &self,
        entity: &SortEntity,
        catalog: &SchemaCatalog,
        warnings: &mut Vec<BuildWarning>,
    ) -> Option<SortSpec> {
        let (candidate, direction) = match entity.direction.as_deref() {
            Some(d) if !d.trim().is_empty() => (entity.field.trim(), Some(d)),
            _ => match SORT_SUFFIX.captures(entity.field.trim()) {
                // Only split when the whole text is not itself a field.
                Some(caps) if catalog.resolve(&entity.field).is_none() => (
                    caps.get(1).map_or("", |m| m.as_str()),
                    caps.get(2).map(|m| m.as_str()),
                ),
                _ => (entity.field.trim(), None),
            },
        };

        let Some(key) = catalog.resolve(candidate) else {
            warnings.push(BuildWarning::UnresolvedSortField(entity.field.clone()));
            return None;
        };

        let direction = match direction {
            None => SortDirection::Asc,
            Some(raw) => SortDirection::parse(raw).unwrap_or_else(|| {
                warnings.push(BuildWarning::UnknownDirection {
                    field: key.to_string(),
                    direction: raw.to_string(),
                });
                SortDirection::Asc
            }),
        };

        Some(SortSpec::new(key, direction))
    }

    fn resolve_limit(&self, raw: &Value, warnings: &mut Vec<BuildWarning>) -> u32 {
        match requested_limit(raw) {
            Some((n, written)) if n > 0 => {
                if n > u64::from(self.max_limit) {
                    warnings.push(BuildWarning::LimitClamped {
                        requested: written,
                        max: self.max_limit,
                    });
                    self.max_limit
                } else {
                    n as u32
                }
            }
            _ => {
                let raw = match raw {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                warnings.push(BuildWarning::InvalidLimit {
                    raw,
                    default: self.default_limit,
                });
                self.default_limit
            }
        }
    }
}

/// A requested limit, saturated to `u64`, plus the number as written.
///
/// `None` for negative or non-numeric input.
fn requested_limit(raw: &Value) -> Option<(u64, String)> {
    match raw {
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                return Some((u, u.to_string()));
            }
            // Float-to-int casts saturate, so huge floats still clamp.
            let f = n.as_f64().filter(|f| f.is_finite() && *f >= 0.0)?;
            Some((f.trunc() as u64, n.to_string()))
        }
        Value::String(s) => {
            let found = LIMIT_NUMBER.find(s)?.as_str();
            if found.starts_with('-') {
                return None;
            }
            let digits: String = found.chars().filter(char::is_ascii_digit).collect();
            let n = digits.parse::<u64>().unwrap_or(u64::MAX);
            Some((n, digits))
        }
        _ => None,
    }
}

fn push_unique(fields: &mut Vec<String>, key: &str) {
    if !fields.iter().any(|f| f == key) {
        fields.push(key.to_string());
    }
}

/// Render an entity value in filter syntax. `None` means no usable value.
fn filter_value(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(scalar_value).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(","))
            }
        }
        other => scalar_value(other),
    }
}

fn scalar_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(true) => Some("Yes".to_string()),
        Value::Bool(false) => Some("No".to_string()),
        _ => None,
    }
}
