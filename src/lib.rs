//! Conversational text-to-SQL orchestration
//!
//! Turns a user utterance in an ongoing conversation into a SQL query, a
//! confidence score, an optional ambiguity hint and an intent label, with every
//! expensive stage memoized per conversational context.

pub mod analysis;
pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod intent_router;
pub mod key;
pub mod orchestrator;
pub mod query_resolver;
pub mod response;
pub mod schema;
pub mod services;
pub mod session;
pub mod table2text;
pub mod user_intent;
pub mod value_filler;

pub use config::OrchestratorConfig;
pub use error::{OrchestratorError, Result};
pub use orchestrator::{Orchestrator, PipelinePolicy, Services};
pub use response::{TurnRequest, TurnResponse};
