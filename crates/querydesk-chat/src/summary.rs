//! Compact description of a query result, kept in conversation memory.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::{QueryResult, Row};
use crate::catalog::{FieldKind, SchemaCatalog};
use crate::query::Query;

/// What a summary or drill-down follow-up needs to know about a result.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResultSummary {
    pub row_count: usize,
    /// Column keys in query field order.
    pub columns: Vec<String>,
    /// The first few rows, untouched.
    #[serde(default)]
    pub preview: Vec<Row>,
    /// Column totals for measure columns with numeric values.
    #[serde(default)]
    pub totals: BTreeMap<String, f64>,
}

impl ResultSummary {
    pub fn from_result(
        query: &Query,
        result: &QueryResult,
        catalog: &SchemaCatalog,
        preview_rows: usize,
    ) -> Self {
        let mut totals = BTreeMap::new();
        for field in &query.fields {
            if catalog.kind(field) != Some(FieldKind::Measure) {
                continue;
            }
            let mut seen = false;
            let mut sum = 0.0;
            for value in result.rows.iter().filter_map(|row| row.get(field)) {
                if let Some(n) = numeric(value) {
                    sum += n;
                    seen = true;
                }
            }
            if seen {
                totals.insert(field.clone(), sum);
            }
        }

        Self {
            row_count: result.rows.len(),
            columns: query.fields.clone(),
            preview: result.rows.iter().take(preview_rows).cloned().collect(),
            totals,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
