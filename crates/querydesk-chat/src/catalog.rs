//! Schema catalog: the queryable fields of one explorable view.
//!
//! Built once from the parsed schema document and read-only afterwards, so
//! it can be shared behind an `Arc` without locking.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use querydesk_core::config::QueryConfig;

use crate::error::CatalogError;
use crate::types::FieldSummary;

// =============================================================================
// Field descriptors
// =============================================================================

/// Whether a field groups rows or aggregates them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Dimension,
    Measure,
}

/// Value type of a field, as declared by the schema document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    String,
    Number,
    Date,
    YesNo,
    #[default]
    Other,
}

impl From<String> for FieldType {
    fn from(raw: String) -> Self {
        let raw = raw.trim().to_ascii_lowercase();
        match raw.as_str() {
            "string" | "text" | "zipcode" | "location" | "tier" => FieldType::String,
            "yesno" | "yes_no" | "bool" | "boolean" => FieldType::YesNo,
            "number" | "int" | "integer" | "count" | "count_distinct" | "sum" | "average"
            | "avg" | "min" | "max" | "median" | "percent" => FieldType::Number,
            _ if raw.starts_with("date") || raw.starts_with("time") => FieldType::Date,
            _ => FieldType::Other,
        }
    }
}

impl From<FieldType> for String {
    fn from(ty: FieldType) -> Self {
        match ty {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Date => "date",
            FieldType::YesNo => "yesno",
            FieldType::Other => "other",
        }
        .to_string()
    }
}

/// One queryable field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    #[serde(rename = "name", alias = "field_name", alias = "key")]
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub synonyms: Vec<String>,
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
}

impl FieldDescriptor {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            label: None,
            synonyms: Vec::new(),
            field_type: FieldType::Other,
        }
    }

    pub fn label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn synonyms(mut self, synonyms: &[&str]) -> Self {
        self.synonyms = synonyms.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn field_type(mut self, field_type: FieldType) -> Self {
        self.field_type = field_type;
        self
    }

    /// Label if declared, key otherwise.
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.key)
    }
}

/// The declarative schema document, as parsed from JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaDocument {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default, alias = "explore")]
    pub view: Option<String>,
    #[serde(default)]
    pub dimensions: Vec<FieldDescriptor>,
    #[serde(default)]
    pub measures: Vec<FieldDescriptor>,
}

// =============================================================================
// SchemaCatalog
// =============================================================================

/// Lookup structure over a schema document.
///
/// Field order is declaration order, dimensions before measures.
#[derive(Debug, Clone)]
pub struct SchemaCatalog {
    model: String,
    view: String,
    dimensions: Vec<FieldDescriptor>,
    measures: Vec<FieldDescriptor>,
    kinds: HashMap<String, (FieldKind, usize)>,
    normalized_keys: HashMap<String, String>,
    aliases: HashMap<String, String>,
    tails: HashMap<String, String>,
}

impl SchemaCatalog {
    /// Build a catalog from explicit identifiers and field lists.
    pub fn new(
        model: impl Into<String>,
        view: impl Into<String>,
        dimensions: Vec<FieldDescriptor>,
        measures: Vec<FieldDescriptor>,
    ) -> Result<Self, CatalogError> {
        if dimensions.is_empty() && measures.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut catalog = Self {
            model: model.into(),
            view: view.into(),
            dimensions,
            measures,
            kinds: HashMap::new(),
            normalized_keys: HashMap::new(),
            aliases: HashMap::new(),
            tails: HashMap::new(),
        };
        catalog.index()?;
        Ok(catalog)
    }

    /// Build a catalog from a parsed document.
    ///
    /// Identifiers declared by the document win; the configured fallbacks
    /// are used only when the document omits them.
    pub fn from_document(doc: SchemaDocument, config: &QueryConfig) -> Result<Self, CatalogError> {
        let model = match doc.model.filter(|m| !m.trim().is_empty()) {
            Some(m) => m,
            None => {
                warn!(fallback = %config.fallback_model, "Schema declares no model; using fallback");
                config.fallback_model.clone()
            }
        };
        let view = match doc.view.filter(|v| !v.trim().is_empty()) {
            Some(v) => v,
            None => {
                warn!(fallback = %config.fallback_view, "Schema declares no view; using fallback");
                config.fallback_view.clone()
            }
        };

        let catalog = Self::new(model, view, doc.dimensions, doc.measures)?;
        info!(
            model = %catalog.model,
            view = %catalog.view,
            dimensions = catalog.dimensions.len(),
            measures = catalog.measures.len(),
            "Schema catalog built"
        );
        Ok(catalog)
    }

    /// Parse a JSON schema document and build the catalog.
    pub fn from_json_str(json: &str, config: &QueryConfig) -> Result<Self, CatalogError> {
        let doc: SchemaDocument = serde_json::from_str(json)?;
        Self::from_document(doc, config)
    }

    /// Read a JSON schema document from disk and build the catalog.
    pub fn load(path: &Path, config: &QueryConfig) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content, config)
    }

    fn index(&mut self) -> Result<(), CatalogError> {
        let fields = self
            .dimensions
            .iter()
            .enumerate()
            .map(|(i, f)| (FieldKind::Dimension, i, f))
            .chain(
                self.measures
                    .iter()
                    .enumerate()
                    .map(|(i, f)| (FieldKind::Measure, i, f)),
            );

        for (kind, idx, field) in fields {
            let key = field.key.trim();
            if key.is_empty() {
                return Err(CatalogError::EmptyFieldKey);
            }
            if self
                .kinds
                .insert(field.key.clone(), (kind, idx))
                .is_some()
            {
                return Err(CatalogError::DuplicateField(field.key.clone()));
            }

            // First declaration wins on every ambiguous lookup.
            self.normalized_keys
                .entry(normalize(key))
                .or_insert_with(|| field.key.clone());
            for alias in field.label.iter().chain(field.synonyms.iter()) {
                let alias = normalize(alias);
                if !alias.is_empty() {
                    self.aliases
                        .entry(alias)
                        .or_insert_with(|| field.key.clone());
                }
            }
            if let Some((_, tail)) = key.rsplit_once('.') {
                let tail = normalize(tail);
                if !tail.is_empty() {
                    self.tails.entry(tail).or_insert_with(|| field.key.clone());
                }
            }
        }
        Ok(())
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn view(&self) -> &str {
        &self.view
    }

    /// Resolve a candidate reference to a field key.
    ///
    /// Tries, in order: exact key, key ignoring case and `_`/`-`/space
    /// differences, label or synonym, and the unqualified part of a dotted
    /// key (`sessions` for `consumer_sessions.sessions`).
    pub fn resolve(&self, candidate: &str) -> Option<&str> {
        if let Some((key, _)) = self.kinds.get_key_value(candidate) {
            return Some(key.as_str());
        }
        let normalized = normalize(candidate);
        if normalized.is_empty() {
            return None;
        }
        self.normalized_keys
            .get(&normalized)
            .or_else(|| self.aliases.get(&normalized))
            .or_else(|| self.tails.get(&normalized))
            .map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.kinds.contains_key(key)
    }

    pub fn kind(&self, key: &str) -> Option<FieldKind> {
        self.kinds.get(key).map(|(kind, _)| *kind)
    }

    pub fn field(&self, key: &str) -> Option<&FieldDescriptor> {
        self.kinds.get(key).map(|(kind, idx)| match kind {
            FieldKind::Dimension => &self.dimensions[*idx],
            FieldKind::Measure => &self.measures[*idx],
        })
    }

    pub fn is_yesno(&self, key: &str) -> bool {
        self.field(key)
            .is_some_and(|f| f.field_type == FieldType::YesNo)
    }

    /// Measure keys in declaration order.
    pub fn all_measure_keys(&self) -> Vec<&str> {
        self.measures.iter().map(|f| f.key.as_str()).collect()
    }

    /// Dimension keys in declaration order.
    pub fn all_dimension_keys(&self) -> Vec<&str> {
        self.dimensions.iter().map(|f| f.key.as_str()).collect()
    }

    /// The field used when nothing else resolves: the first measure, or the
    /// first dimension when the schema has no measures.
    pub fn fallback_field(&self) -> &str {
        self.measures
            .first()
            .or_else(|| self.dimensions.first())
            .map(|f| f.key.as_str())
            // Construction rejects catalogs without fields.
            .unwrap_or_default()
    }

    /// The first dimension typed as a date, if any.
    pub fn first_date_dimension(&self) -> Option<&str> {
        self.dimensions
            .iter()
            .find(|f| f.field_type == FieldType::Date)
            .map(|f| f.key.as_str())
    }

    pub fn is_date(&self, key: &str) -> bool {
        self.field(key)
            .is_some_and(|f| f.field_type == FieldType::Date)
    }

    /// Up to `limit` labelled dimensions and measures.
    pub fn describe(&self, limit: usize) -> (Vec<FieldSummary>, Vec<FieldSummary>) {
        let summarize = |fields: &[FieldDescriptor]| {
            fields
                .iter()
                .take(limit)
                .map(|f| FieldSummary {
                    key: f.key.clone(),
                    label: f.display_label().to_string(),
                })
                .collect::<Vec<_>>()
        };
        (summarize(&self.dimensions), summarize(&self.measures))
    }
}

/// Lowercase, treat `_` and `-` as spaces, collapse whitespace.
fn normalize(raw: &str) -> String {
    raw.to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
