//! Intent router: the entry point for one classified message.
//!
//! Dispatches on the intent, consults and updates the user's conversation
//! memory, and calls the backend for data intents. The user's memory lock
//! is held for the whole turn, so turns from the same user never overlap.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use querydesk_core::config::{QuerydeskConfig, RouterConfig};

use crate::backend::{AnalyticsBackend, QueryResult};
use crate::builder::QueryBuilder;
use crate::catalog::SchemaCatalog;
use crate::error::{BackendError, ChatError};
use crate::memory::{ConversationMemory, ConversationStore};
use crate::query::Query;
use crate::summary::ResultSummary;
use crate::types::{
    ClassifiedMessage, ConversationTurn, Entities, FixedResponse, Intent, TurnOutcome, TurnStatus,
};

/// Number of labels of each kind listed by a data-source description.
const DESCRIBE_FIELDS: usize = 5;

/// What the assistant tells users it can do.
const CAPABILITIES: &[&str] = &[
    "Fetch metrics from the connected analytics model",
    "Filter, sort and limit results by any field in the schema",
    "Restrict results to a timeframe such as the last 7 days or month to date",
    "Summarize the most recent result",
    "Drill down into the previous query with extra filters or fields",
    "Describe the available dimensions and measures",
    "Start the conversation over",
];

/// Routes classified messages for all users.
pub struct IntentRouter {
    catalog: Arc<SchemaCatalog>,
    store: Arc<ConversationStore>,
    backend: Arc<dyn AnalyticsBackend>,
    builder: QueryBuilder,
    config: RouterConfig,
}

impl IntentRouter {
    pub fn new(
        catalog: Arc<SchemaCatalog>,
        store: Arc<ConversationStore>,
        backend: Arc<dyn AnalyticsBackend>,
        builder: QueryBuilder,
        config: RouterConfig,
    ) -> Self {
        Self {
            catalog,
            store,
            backend,
            builder,
            config,
        }
    }

    /// Wire a router from the application config.
    pub fn from_config(
        catalog: Arc<SchemaCatalog>,
        backend: Arc<dyn AnalyticsBackend>,
        config: &QuerydeskConfig,
    ) -> Self {
        Self::new(
            catalog,
            Arc::new(ConversationStore::from_config(&config.memory)),
            backend,
            QueryBuilder::from_config(&config.query),
            config.router.clone(),
        )
    }

    pub fn catalog(&self) -> &Arc<SchemaCatalog> {
        &self.catalog
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    /// Handle one classified message for `user_id`.
    ///
    /// Backend failures come back as a [`TurnStatus::BackendFailed`]
    /// outcome, not as an error.
    pub async fn handle(
        &self,
        user_id: &str,
        message: ClassifiedMessage,
    ) -> Result<TurnOutcome, ChatError> {
        if !self.config.enabled {
            return Err(ChatError::Disabled);
        }

        let mut memory = self.store.lock(user_id).await?;
        let intent = message.intent;
        info!(user_id = %user_id, intent = %intent, "Routing turn");

        let outcome = match intent {
            Intent::DataFetch | Intent::DrillDown => {
                self.data_turn(&mut memory, intent, &message.entities)
                    .await?
            }
            Intent::Summary => Self::summary_turn(&mut memory),
            Intent::ManageConversation => {
                memory.clear();
                info!(user_id = %user_id, "Conversation cleared");
                TurnOutcome::fixed(intent, FixedResponse::ConversationCleared)
            }
            Intent::Capabilities | Intent::DataSourceInfo | Intent::FriendlyConversation
            | Intent::Other => {
                memory.append(ConversationTurn::new(intent));
                TurnOutcome::fixed(intent, self.fixed_response(intent))
            }
        };

        debug!(
            user_id = %user_id,
            intent = %intent,
            failed = outcome.is_failure(),
            warnings = outcome.warnings.len(),
            "Turn complete"
        );
        Ok(outcome)
    }

    async fn data_turn(
        &self,
        memory: &mut ConversationMemory,
        intent: Intent,
        entities: &Entities,
    ) -> Result<TurnOutcome, ChatError> {
        let prior = match intent {
            Intent::DrillDown => {
                let prior = memory.last_query().cloned();
                if prior.is_none() {
                    info!("Drill-down without a previous query; building a fresh one");
                }
                prior
            }
            _ => None,
        };

        let built = self
            .builder
            .build(intent, entities, &self.catalog, prior.as_ref());
        built.query.validate(&self.catalog)?;

        let mut outcome = TurnOutcome::new(intent, TurnStatus::Answered);
        outcome.warnings = built.warnings.iter().map(ToString::to_string).collect();
        outcome.used_fallback = built.used_fallback;
        let query = built.query;

        match self.run_query(&query).await {
            Ok(result) => {
                let summary = ResultSummary::from_result(
                    &query,
                    &result,
                    &self.catalog,
                    self.config.summary_preview_rows,
                );
                memory.append(
                    ConversationTurn::new(intent)
                        .with_query(query.clone())
                        .with_summary(summary.clone()),
                );
                outcome.result_summary = Some(summary);
            }
            Err(error) => {
                warn!(intent = %intent, error = %error, "Backend call failed");
                memory.append(
                    ConversationTurn::new(intent)
                        .with_query(query.clone())
                        .failed(error.to_string()),
                );
                outcome.status = TurnStatus::BackendFailed { error };
            }
        }
        outcome.query = Some(query);
        Ok(outcome)
    }

    fn summary_turn(memory: &mut ConversationMemory) -> TurnOutcome {
        let Some(summary) = memory.last_result_summary().cloned() else {
            info!("Summary requested with no previous result");
            return TurnOutcome::new(Intent::Summary, TurnStatus::NothingToSummarize);
        };

        memory.append(ConversationTurn::new(Intent::Summary).with_summary(summary.clone()));
        let mut outcome = TurnOutcome::new(Intent::Summary, TurnStatus::Summarized);
        outcome.query = memory.last_query().cloned();
        outcome.result_summary = Some(summary);
        outcome
    }

    async fn run_query(&self, query: &Query) -> Result<QueryResult, BackendError> {
        let limit = Duration::from_secs(self.config.backend_timeout_secs);
        match tokio::time::timeout(limit, self.backend.run_query(query)).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout {
                after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    fn fixed_response(&self, intent: Intent) -> FixedResponse {
        match intent {
            Intent::Capabilities => FixedResponse::Capabilities {
                capabilities: CAPABILITIES.iter().map(|c| c.to_string()).collect(),
            },
            Intent::DataSourceInfo => {
                let (dimensions, measures) = self.catalog.describe(DESCRIBE_FIELDS);
                FixedResponse::DataSourceInfo {
                    model: self.catalog.model().to_string(),
                    view: self.catalog.view().to_string(),
                    dimensions,
                    measures,
                }
            }
            Intent::FriendlyConversation => FixedResponse::Greeting,
            Intent::ManageConversation => FixedResponse::ConversationCleared,
            _ => FixedResponse::Unrecognized,
        }
    }
}
