//! Shared types: intents, classifier entities, turns and turn outcomes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::dates::TimeIntent;
use crate::error::BackendError;
use crate::query::Query;
use crate::summary::ResultSummary;

// =============================================================================
// Intent
// =============================================================================

/// The closed set of intents the classifier can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Intent {
    /// Fetch a new slice of data.
    DataFetch,
    /// Summarize the previous result.
    Summary,
    /// Refine the previous query.
    DrillDown,
    Capabilities,
    DataSourceInfo,
    FriendlyConversation,
    /// Reset the conversation.
    ManageConversation,
    /// Anything the classifier could not place.
    Other,
}

impl Intent {
    pub const ALL: [Intent; 8] = [
        Intent::DataFetch,
        Intent::Summary,
        Intent::DrillDown,
        Intent::Capabilities,
        Intent::DataSourceInfo,
        Intent::FriendlyConversation,
        Intent::ManageConversation,
        Intent::Other,
    ];

    /// Parse a classifier label.
    ///
    /// Accepts the classifier's upper-case labels and the snake-case names
    /// used by [`Intent::as_str`], case-insensitively. Unknown labels map to
    /// [`Intent::Other`].
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_uppercase().replace(['-', ' '], "_").as_str() {
            "GATHER_DATA_FROM_LOOKER" | "DATA_FETCH" => Intent::DataFetch,
            "GET_EXECUTIVE_SUMMARY" | "SUMMARY" => Intent::Summary,
            "DRILL_DOWN_ANALYSIS" | "DRILL_DOWN" => Intent::DrillDown,
            "AGENT_CAPABILITIES" | "CAPABILITIES" => Intent::Capabilities,
            "DATA_SOURCE_INFO" => Intent::DataSourceInfo,
            "FRIENDLY_CONVERSATION" => Intent::FriendlyConversation,
            "MANAGE_CONVERSATION" => Intent::ManageConversation,
            _ => Intent::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::DataFetch => "data_fetch",
            Intent::Summary => "summary",
            Intent::DrillDown => "drill_down",
            Intent::Capabilities => "capabilities",
            Intent::DataSourceInfo => "data_source_info",
            Intent::FriendlyConversation => "friendly_conversation",
            Intent::ManageConversation => "manage_conversation",
            Intent::Other => "other",
        }
    }

    /// Whether this intent goes through the query builder.
    pub fn builds_query(&self) -> bool {
        matches!(self, Intent::DataFetch | Intent::DrillDown)
    }
}

impl From<String> for Intent {
    fn from(label: String) -> Self {
        Intent::from_label(&label)
    }
}

impl From<Intent> for String {
    fn from(intent: Intent) -> Self {
        intent.as_str().to_string()
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Entities
// =============================================================================

/// Loosely-typed entities extracted by the classifier.
///
/// Nothing in here has been checked against the schema yet. `filters` may
/// also arrive as a `{"field": value}` map and `sorts` as `"field desc"`
/// strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Entities {
    pub fields: Vec<String>,
    #[serde(deserialize_with = "filters_from_list_or_map")]
    pub filters: Vec<FilterEntity>,
    pub sorts: Vec<SortEntity>,
    pub limit: Option<Value>,
    /// Relative or absolute timeframe, turned into a date-range filter.
    pub time_intent: Option<TimeIntent>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FilterList {
    List(Vec<FilterEntity>),
    Map(serde_json::Map<String, Value>),
    Null,
}

fn filters_from_list_or_map<'de, D>(deserializer: D) -> Result<Vec<FilterEntity>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match FilterList::deserialize(deserializer)? {
        FilterList::List(filters) => filters,
        FilterList::Map(map) => map
            .into_iter()
            .map(|(field, value)| FilterEntity::eq(&field, value))
            .collect(),
        FilterList::Null => Vec::new(),
    })
}

/// A candidate filter predicate.
///
/// Deserializes from `{"field": .., "operator": .., "value": ..}` or from the
/// shorthand `{"device": "mobile"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FilterEntityRepr")]
pub struct FilterEntity {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(default)]
    pub value: Value,
}

impl FilterEntity {
    /// Equality filter shorthand.
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self {
            field: field.to_string(),
            operator: None,
            value: value.into(),
        }
    }

    pub fn with_operator(field: &str, operator: &str, value: impl Into<Value>) -> Self {
        Self {
            field: field.to_string(),
            operator: Some(operator.to_string()),
            value: value.into(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FilterEntityRepr {
    Full {
        field: String,
        #[serde(default)]
        operator: Option<String>,
        #[serde(default)]
        value: Value,
    },
    Shorthand(BTreeMap<String, Value>),
}

impl TryFrom<FilterEntityRepr> for FilterEntity {
    type Error = String;

    fn try_from(repr: FilterEntityRepr) -> Result<Self, Self::Error> {
        match repr {
            FilterEntityRepr::Full {
                field,
                operator,
                value,
            } => Ok(FilterEntity {
                field,
                operator,
                value,
            }),
            FilterEntityRepr::Shorthand(map) => {
                if map.len() != 1 {
                    return Err(format!(
                        "shorthand filter must have exactly one entry, got {}",
                        map.len()
                    ));
                }
                let (field, value) = map.into_iter().next().ok_or("empty filter")?;
                Ok(FilterEntity {
                    field,
                    operator: None,
                    value,
                })
            }
        }
    }
}

/// A candidate sort request.
///
/// Deserializes from `{"field": .., "direction": ..}` or from a bare string
/// such as `"revenue desc"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SortEntityRepr")]
pub struct SortEntity {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
}

impl SortEntity {
    pub fn new(field: &str, direction: Option<&str>) -> Self {
        Self {
            field: field.to_string(),
            direction: direction.map(str::to_string),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SortEntityRepr {
    Text(String),
    Full {
        field: String,
        #[serde(default)]
        direction: Option<String>,
    },
}

impl From<SortEntityRepr> for SortEntity {
    fn from(repr: SortEntityRepr) -> Self {
        match repr {
            SortEntityRepr::Text(field) => SortEntity {
                field,
                direction: None,
            },
            SortEntityRepr::Full { field, direction } => SortEntity { field, direction },
        }
    }
}

/// Classifier output for one inbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedMessage {
    pub intent: Intent,
    #[serde(default)]
    pub entities: Entities,
}

impl ClassifiedMessage {
    pub fn new(intent: Intent, entities: Entities) -> Self {
        Self { intent, entities }
    }
}

// =============================================================================
// Conversation turns
// =============================================================================

/// One completed turn in a user's conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub intent: Intent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Query>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_summary: Option<ResultSummary>,
    /// Set when the backend call for this turn failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl ConversationTurn {
    pub fn new(intent: Intent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            intent,
            query: None,
            result_summary: None,
            failure: None,
        }
    }

    pub fn with_query(mut self, query: Query) -> Self {
        self.query = Some(query);
        self
    }

    pub fn with_summary(mut self, summary: ResultSummary) -> Self {
        self.result_summary = Some(summary);
        self
    }

    pub fn failed(mut self, reason: impl Into<String>) -> Self {
        self.failure = Some(reason.into());
        self
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }
}

// =============================================================================
// Turn outcomes
// =============================================================================

/// Label and key of one schema field, for data-source descriptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSummary {
    pub key: String,
    pub label: String,
}

/// Descriptor for intents that never touch the query builder.
///
/// The response layer turns these into prose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FixedResponse {
    Capabilities { capabilities: Vec<String> },
    DataSourceInfo {
        model: String,
        view: String,
        dimensions: Vec<FieldSummary>,
        measures: Vec<FieldSummary>,
    },
    Greeting,
    ConversationCleared,
    Unrecognized,
}

/// What happened during a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TurnStatus {
    /// A query ran and its result was recorded.
    Answered,
    /// The previous result summary was returned.
    Summarized,
    /// Summary requested with no prior result.
    NothingToSummarize,
    Fixed { response: FixedResponse },
    /// The backend failed; memory was not updated.
    BackendFailed { error: BackendError },
}

/// Everything the response generator needs to answer a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub intent: Intent,
    #[serde(flatten)]
    pub status: TurnStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Query>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_summary: Option<ResultSummary>,
    #[serde(default)]
    pub warnings: Vec<String>,
    /// True when the query was the deterministic fallback.
    #[serde(default)]
    pub used_fallback: bool,
}

impl TurnOutcome {
    pub fn new(intent: Intent, status: TurnStatus) -> Self {
        Self {
            intent,
            status,
            query: None,
            result_summary: None,
            warnings: Vec::new(),
            used_fallback: false,
        }
    }

    pub fn fixed(intent: Intent, response: FixedResponse) -> Self {
        Self::new(intent, TurnStatus::Fixed { response })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.status, TurnStatus::BackendFailed { .. })
    }
}
