//! Natural-language questions over a relational database.
//!
//! The pipeline introspects the schema once, then for each question
//! generates SQL with a language model (falling back to fixed keyword
//! queries), checks it is read-only, executes it and phrases the result,
//! keeping a short per-session conversation memory for context.

pub mod assistant;
pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod memory;
pub mod response;
pub mod schema;
pub mod session;
pub mod sql_generator;
pub mod validator;

pub use assistant::{AssistantReply, ReplyOutcome, SqlAssistant, EXAMPLE_QUESTIONS};
pub use config::Config;
pub use db::{QueryResult, RowSet, SqlBackend};
pub use error::{AssistantError, Result};
pub use llm::{LanguageModel, LlmClient};
pub use memory::{ConversationMemory, Exchange, ExchangeResult, SessionId};
pub use schema::{SchemaDescriber, SchemaDescription, SchemaSnapshot};
pub use session::SessionRegistry;
pub use sql_generator::GeneratedQuery;
pub use validator::QueryValidator;
