//! Query construction and conversation routing for querydesk.
//!
//! Turns a classified intent plus loosely-typed entities into a query that
//! is valid against the loaded schema, and keeps per-user conversation
//! memory so summary and drill-down follow-ups can build on earlier turns.

pub mod backend;
pub mod builder;
pub mod catalog;
pub mod dates;
pub mod error;
pub mod memory;
pub mod query;
pub mod router;
pub mod summary;
pub mod types;

pub use backend::{AnalyticsBackend, MockAnalyticsBackend, QueryResult, Row};
pub use builder::{BuildOutcome, BuildWarning, QueryBuilder};
pub use catalog::{FieldDescriptor, FieldKind, FieldType, SchemaCatalog, SchemaDocument};
pub use dates::{DateRange, DateRangeError, TimeIntent};
pub use error::{BackendError, CatalogError, ChatError, QueryViolation};
pub use memory::{ConversationMemory, ConversationStore, MemoryStats};
pub use query::{FilterOperator, FilterPredicate, Query, SortDirection, SortSpec};
pub use router::IntentRouter;
pub use summary::ResultSummary;
pub use types::{
    ClassifiedMessage, ConversationTurn, Entities, FieldSummary, FilterEntity, FixedResponse,
    Intent, SortEntity, TurnOutcome, TurnStatus,
};
