//! End-to-end tests for the intent router.
//!
//! Each test loads a schema document and a config file from disk, wires a
//! router around an in-test backend, and drives whole conversations through
//! `IntentRouter::handle`.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::NamedTempFile;

use querydesk_chat::{
    AnalyticsBackend, BackendError, ClassifiedMessage, FixedResponse, Intent, IntentRouter, Query,
    QueryResult, SchemaCatalog, TurnOutcome, TurnStatus,
};
use querydesk_core::config::QuerydeskConfig;

// =============================================================================
// Helpers
// =============================================================================

const SCHEMA: &str = r#"{
    "model": "bg",
    "explore": "consumer_sessions",
    "dimensions": [
        {"field_name": "consumer_sessions.user_location_country", "label": "Country", "type": "string"},
        {"field_name": "consumer_sessions.device_category", "label": "Device Category", "synonyms": ["device"]},
        {"field_name": "consumer_sessions.is_new_user", "label": "New User", "type": "yesno"},
        {"field_name": "consumer_sessions.visit_day_date", "label": "Visit Day", "type": "date_date"}
    ],
    "measures": [
        {"name": "consumer_sessions.sessions", "label": "Sessions", "type": "count"},
        {"name": "consumer_sessions.revenue", "label": "Revenue", "synonyms": ["sales"], "type": "sum"}
    ]
}"#;

const CONFIG: &str = r#"
[query]
default_limit = 10
max_limit = 50

[memory]
capacity = 3

[router]
summary_preview_rows = 2
"#;

fn temp_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

/// Backend that records every wire request and replays scripted responses.
///
/// When the script runs out it answers with two fixed rows.
#[derive(Default)]
struct ScriptedBackend {
    script: Mutex<VecDeque<Result<Value, BackendError>>>,
    requests: Mutex<Vec<Value>>,
}

impl ScriptedBackend {
    fn push(&self, response: Result<Value, BackendError>) {
        self.script.lock().unwrap().push_back(response);
    }

    fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnalyticsBackend for ScriptedBackend {
    async fn run_query(&self, query: &Query) -> Result<QueryResult, BackendError> {
        self.requests.lock().unwrap().push(query.to_wire());
        let next = self.script.lock().unwrap().pop_front();
        let body = match next {
            Some(response) => response?,
            None => json!([
                {"consumer_sessions.sessions": 10, "consumer_sessions.revenue": 1.5},
                {"consumer_sessions.sessions": 20, "consumer_sessions.revenue": 2.5}
            ]),
        };
        QueryResult::from_json(body)
    }
}

fn make_router() -> (IntentRouter, Arc<ScriptedBackend>) {
    let config_file = temp_file(CONFIG);
    let schema_file = temp_file(SCHEMA);
    let config = QuerydeskConfig::load(config_file.path()).unwrap();
    let catalog = Arc::new(SchemaCatalog::load(schema_file.path(), &config.query).unwrap());
    let backend = Arc::new(ScriptedBackend::default());
    let router = IntentRouter::from_config(catalog, Arc::clone(&backend) as Arc<dyn AnalyticsBackend>, &config);
    (router, backend)
}

fn message(value: Value) -> ClassifiedMessage {
    serde_json::from_value(value).unwrap()
}

async fn send(router: &IntentRouter, user: &str, value: Value) -> TurnOutcome {
    router.handle(user, message(value)).await.unwrap()
}

// =============================================================================
// Conversations
// =============================================================================

#[tokio::test]
async fn test_fetch_summarize_drill_down_conversation() {
    let (router, backend) = make_router();

    let fetched = send(
        &router,
        "U123",
        json!({
            "intent": "GATHER_DATA_FROM_LOOKER",
            "entities": {
                "fields": ["country", "sessions"],
                "filters": [{"field": "country", "operator": "=", "value": "US"}],
                "sorts": [{"field": "sessions", "direction": "desc"}],
                "limit": "top 5"
            }
        }),
    )
    .await;
    assert_eq!(fetched.status, TurnStatus::Answered);
    assert!(fetched.warnings.is_empty());

    let summary = send(&router, "U123", json!({"intent": "GET_EXECUTIVE_SUMMARY"})).await;
    assert_eq!(summary.status, TurnStatus::Summarized);
    let result = summary.result_summary.unwrap();
    assert_eq!(result.row_count, 2);
    assert_eq!(result.preview.len(), 2);
    assert_eq!(result.totals["consumer_sessions.sessions"], 30.0);

    let drilled = send(
        &router,
        "U123",
        json!({
            "intent": "DRILL_DOWN_ANALYSIS",
            "entities": {"filters": [{"device": "mobile"}], "fields": ["revenue"]}
        }),
    )
    .await;
    assert_eq!(drilled.status, TurnStatus::Answered);

    let requests = backend.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(
        requests[0],
        json!({
            "model": "bg",
            "view": "consumer_sessions",
            "fields": ["consumer_sessions.user_location_country", "consumer_sessions.sessions"],
            "filters": {"consumer_sessions.user_location_country": "US"},
            "sorts": ["consumer_sessions.sessions desc"],
            "limit": "5"
        })
    );
    assert_eq!(
        requests[1],
        json!({
            "model": "bg",
            "view": "consumer_sessions",
            "fields": [
                "consumer_sessions.user_location_country",
                "consumer_sessions.sessions",
                "consumer_sessions.revenue"
            ],
            "filters": {
                "consumer_sessions.device_category": "mobile",
                "consumer_sessions.user_location_country": "US"
            },
            "sorts": ["consumer_sessions.sessions desc"],
            "limit": "5"
        })
    );
}

#[tokio::test]
async fn test_extractor_shaped_entities_with_timeframe() {
    let (router, backend) = make_router();
    let outcome = send(
        &router,
        "U7",
        json!({
            "intent": "GATHER_DATA_FROM_LOOKER",
            "entities": {
                "fields": ["consumer_sessions.device_category", "consumer_sessions.sessions"],
                "filters": {"consumer_sessions.user_location_country": "US"},
                "sorts": ["consumer_sessions.sessions desc"],
                "limit": "top 1,000",
                "time_intent": {
                    "preset": "absolute",
                    "start": "2025-09-30",
                    "end": "2025-09-01",
                    "field": "consumer_sessions.visit_day_date"
                }
            }
        }),
    )
    .await;

    assert_eq!(outcome.status, TurnStatus::Answered);
    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(
        backend.requests()[0],
        json!({
            "model": "bg",
            "view": "consumer_sessions",
            "fields": ["consumer_sessions.device_category", "consumer_sessions.sessions"],
            "filters": {
                "consumer_sessions.user_location_country": "US",
                "consumer_sessions.visit_day_date": "2025-09-01 to 2025-09-30"
            },
            "sorts": ["consumer_sessions.sessions desc"],
            "limit": "50"
        })
    );
}

#[tokio::test]
async fn test_fallback_query_for_vague_request() {
    let (router, backend) = make_router();
    let outcome = send(
        &router,
        "U1",
        json!({"intent": "data_fetch", "entities": {"fields": ["bogus_field"], "limit": 900}}),
    )
    .await;

    assert!(outcome.used_fallback);
    assert_eq!(outcome.warnings.len(), 2);
    let query = outcome.query.unwrap();
    assert_eq!(query.fields, vec!["consumer_sessions.sessions"]);
    assert_eq!(query.limit, 50);
    assert_eq!(backend.requests()[0]["limit"], "50");
}

#[tokio::test]
async fn test_failures_degrade_to_outcomes() {
    let (router, backend) = make_router();
    backend.push(Err(BackendError::Rejected {
        status: 404,
        message: "explore not found".to_string(),
    }));
    backend.push(Ok(json!({"error": "unexpected shape"})));

    let rejected = send(&router, "U1", json!({"intent": "GATHER_DATA_FROM_LOOKER"})).await;
    assert!(matches!(
        rejected.status,
        TurnStatus::BackendFailed {
            error: BackendError::Rejected { status: 404, .. }
        }
    ));

    let malformed = send(&router, "U1", json!({"intent": "GATHER_DATA_FROM_LOOKER"})).await;
    assert!(matches!(
        malformed.status,
        TurnStatus::BackendFailed {
            error: BackendError::Malformed { .. }
        }
    ));

    // Neither failure left anything to summarize
    let summary = send(&router, "U1", json!({"intent": "GET_EXECUTIVE_SUMMARY"})).await;
    assert_eq!(summary.status, TurnStatus::NothingToSummarize);

    let stats = router.store().stats("U1").await.unwrap().unwrap();
    assert_eq!(stats.total_turns, 2);
    assert_eq!(stats.failed_turns, 2);
}

#[tokio::test]
async fn test_memory_capacity_from_config() {
    let (router, _) = make_router();
    for _ in 0..5 {
        send(&router, "U1", json!({"intent": "FRIENDLY_CONVERSATION"})).await;
    }
    assert_eq!(router.store().turns("U1").await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_non_data_intents() {
    let (router, backend) = make_router();

    let caps = send(&router, "U1", json!({"intent": "AGENT_CAPABILITIES"})).await;
    assert!(matches!(
        caps.status,
        TurnStatus::Fixed {
            response: FixedResponse::Capabilities { .. }
        }
    ));

    let info = send(&router, "U1", json!({"intent": "DATA_SOURCE_INFO"})).await;
    let TurnStatus::Fixed {
        response: FixedResponse::DataSourceInfo { model, view, dimensions, .. },
    } = info.status
    else {
        panic!("expected data source info, got {:?}", info.status);
    };
    assert_eq!(model, "bg");
    assert_eq!(view, "consumer_sessions");
    assert_eq!(dimensions[1].label, "Device Category");

    let unknown = send(&router, "U1", json!({"intent": "ORDER_PIZZA"})).await;
    assert_eq!(unknown.intent, Intent::Other);
    assert_eq!(
        unknown.status,
        TurnStatus::Fixed {
            response: FixedResponse::Unrecognized
        }
    );

    assert!(backend.requests().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_users_are_isolated() {
    let (router, _) = make_router();
    let router = Arc::new(router);

    let mut handles = Vec::new();
    for i in 0..6 {
        let router = Arc::clone(&router);
        handles.push(tokio::spawn(async move {
            let user = format!("user-{}", i);
            let country = format!("C{}", i);
            for _ in 0..10 {
                send(
                    &router,
                    &user,
                    json!({
                        "intent": "GATHER_DATA_FROM_LOOKER",
                        "entities": {"filters": [{"country": &country}]}
                    }),
                )
                .await;
                let drilled = send(&router, &user, json!({"intent": "DRILL_DOWN_ANALYSIS"})).await;
                let filters = drilled.query.unwrap().filters;
                assert_eq!(
                    filters["consumer_sessions.user_location_country"].value,
                    country
                );
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(router.store().users().unwrap().len(), 6);
}
