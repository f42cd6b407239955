//! The analytics backend boundary.
//!
//! The router only knows the [`AnalyticsBackend`] trait. The real HTTP client
//! lives outside this crate; [`MockAnalyticsBackend`] produces deterministic
//! rows for demos and tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::catalog::{FieldKind, SchemaCatalog};
use crate::error::BackendError;
use crate::query::{FilterOperator, Query};

/// One result row, keyed by field key.
pub type Row = serde_json::Map<String, Value>;

/// Rows returned by a backend for one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub rows: Vec<Row>,
}

impl QueryResult {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    /// Parse a raw backend response body: a JSON array of objects.
    pub fn from_json(body: Value) -> Result<Self, BackendError> {
        let Value::Array(items) = body else {
            return Err(BackendError::Malformed {
                message: "expected a JSON array of rows".to_string(),
            });
        };

        let rows = items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Object(row) => Ok(row),
                other => Err(BackendError::Malformed {
                    message: format!("row {} is not an object: {}", i, other),
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rows })
    }
}

/// Executes validated queries.
///
/// Implementations must be safe to share across users; the router calls
/// `run_query` concurrently for different users.
#[async_trait]
pub trait AnalyticsBackend: Send + Sync {
    async fn run_query(&self, query: &Query) -> Result<QueryResult, BackendError>;
}

// =============================================================================
// MockAnalyticsBackend
// =============================================================================

/// Upper bound on rows produced by the mock, whatever the query limit.
const MOCK_MAX_ROWS: u32 = 10;

/// Deterministic in-process backend.
///
/// Produces `min(limit, 10)` rows. Dimension columns cycle through three
/// synthetic values, or echo an equality filter on that column; measure
/// columns hold `(row + 1) * 100`.
pub struct MockAnalyticsBackend {
    catalog: Arc<SchemaCatalog>,
    delay: Option<Duration>,
    failure: Option<BackendError>,
    calls: AtomicUsize,
}

impl MockAnalyticsBackend {
    pub fn new(catalog: Arc<SchemaCatalog>) -> Self {
        Self {
            catalog,
            delay: None,
            failure: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Sleep before answering every query.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every query with `error`.
    pub fn failing_with(mut self, error: BackendError) -> Self {
        self.failure = Some(error);
        self
    }

    /// Number of `run_query` calls so far, including failed ones.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn cell(&self, query: &Query, field: &str, row: usize) -> Value {
        match self.catalog.kind(field) {
            Some(FieldKind::Measure) => Value::from((row as u64 + 1) * 100),
            _ => match query.filters.get(field) {
                Some(p) if p.operator == FilterOperator::Eq => {
                    let choices: Vec<&str> = p.value.split(',').collect();
                    Value::from(choices[row % choices.len()].trim())
                }
                _ => {
                    let tail = field.rsplit('.').next().unwrap_or(field);
                    Value::from(format!("{}_{}", tail, row % 3 + 1))
                }
            },
        }
    }
}

#[async_trait]
impl AnalyticsBackend for MockAnalyticsBackend {
    async fn run_query(&self, query: &Query) -> Result<QueryResult, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(ref error) = self.failure {
            return Err(error.clone());
        }

        let count = query.limit.min(MOCK_MAX_ROWS) as usize;
        let rows = (0..count)
            .map(|i| {
                query
                    .fields
                    .iter()
                    .map(|field| (field.clone(), self.cell(query, field, i)))
                    .collect::<Row>()
            })
            .collect::<Vec<_>>();

        debug!(rows = rows.len(), view = %query.view, "Mock backend answered query");
        Ok(QueryResult { rows })
    }
}
