//! Question-answering pipeline
//!
//! `SqlAssistant` owns one running instance: the database handle, the
//! schema snapshot taken at startup, both model-backed generators and the
//! conversation memory. Per question it runs
//! context -> generate -> validate -> execute -> respond -> record.

use crate::config::Config;
use crate::db::executor::{QueryExecutor, SqlBackend};
use crate::db::introspect::SchemaIntrospector;
use crate::db::result::QueryResult;
use crate::error::{AssistantError, Result};
use crate::llm::{LanguageModel, LlmClient};
use crate::memory::{ConversationMemory, ExchangeResult, SessionId};
use crate::response::ResponseGenerator;
use crate::schema::{SchemaDescriber, SchemaDescription, SchemaSnapshot};
use crate::sql_generator::{GeneratedQuery, QueryGenerator};
use crate::validator::QueryValidator;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

pub const REPHRASE_MESSAGE: &str =
    "I apologize, but I couldn't generate a safe query for your question. Could you please rephrase it?";

pub const FAILURE_MESSAGE: &str =
    "I encountered an issue while processing your question. Please try rephrasing it or ask something else.";

pub const EXAMPLE_QUESTIONS: &[&str] = &[
    "How many students are in the school?",
    "Show me all available classes",
    "Which students have scholarships?",
    "What subjects are taught here?",
    "Who are the top performing students?",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyOutcome {
    Answered,
    /// The generated SQL failed validation and was never executed.
    Rejected,
    /// The SQL passed validation but failed at execution time.
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssistantReply {
    pub answer: String,
    pub outcome: ReplyOutcome,
    pub sql: String,
    pub confidence: f32,
    pub result: Option<QueryResult>,
}

impl AssistantReply {
    pub fn is_error(&self) -> bool {
        self.outcome != ReplyOutcome::Answered
    }
}

pub struct SqlAssistant {
    executor: QueryExecutor,
    schema_name: String,
    snapshot: SchemaSnapshot,
    description: SchemaDescription,
    generator: QueryGenerator,
    responder: ResponseGenerator,
    memory: ConversationMemory,
}

impl SqlAssistant {
    /// Connect with `config`, introspect the schema and build every
    /// component. Fails with `Connectivity` when the database is unreachable.
    pub async fn connect(config: &Config) -> Result<Self> {
        let pool = crate::db::connection::init_pool(&config.database).await?;
        let model = LlmClient::from_config(&config.llm)?;
        if !model.has_credentials() {
            warn!("No model API key configured; answers will use fallbacks");
        }
        Self::start(Arc::new(pool), Arc::new(model), &config.database.schema).await
    }

    /// Build from an existing backend and model.
    pub async fn start(
        backend: Arc<dyn SqlBackend>,
        model: Arc<dyn LanguageModel>,
        schema_name: &str,
    ) -> Result<Self> {
        let snapshot = SchemaIntrospector::new(backend.clone(), schema_name)
            .get_schema()
            .await?;
        let description = SchemaDescriber::describe(&snapshot);

        Ok(Self {
            executor: QueryExecutor::new(backend),
            schema_name: schema_name.to_string(),
            snapshot,
            description,
            generator: QueryGenerator::new(model.clone()),
            responder: ResponseGenerator::new(model),
            memory: ConversationMemory::new(),
        })
    }

    pub fn snapshot(&self) -> &SchemaSnapshot {
        &self.snapshot
    }

    pub fn description(&self) -> &SchemaDescription {
        &self.description
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    pub fn create_session(&self) -> SessionId {
        self.memory.create_session()
    }

    /// Start over with an empty history; the new session becomes current.
    pub fn reset_session(&self) -> SessionId {
        let session = self.memory.create_session();
        info!("Started new conversation session {}", session);
        session
    }

    pub async fn generate_sql(&self, question: &str) -> GeneratedQuery {
        self.generator.generate(question, &self.description).await
    }

    pub fn validate_sql(&self, sql: &str) -> bool {
        QueryValidator::is_safe(sql)
    }

    pub async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        self.executor.execute(sql).await
    }

    pub fn get_context(&self, session: &SessionId, question: &str) -> String {
        self.memory.get_context_text(session, question)
    }

    pub fn add_exchange(
        &self,
        session: &SessionId,
        question: &str,
        sql: &str,
        result: ExchangeResult,
        explanation: &str,
    ) {
        self.memory.add_exchange(session, question, sql, result, explanation);
    }

    pub async fn generate_response(
        &self,
        question: &str,
        sql: &str,
        results: &QueryResult,
        context: &str,
    ) -> String {
        self.responder.respond(question, sql, results, context).await
    }

    /// Run one question end to end. Only friendly text reaches `answer`;
    /// raw errors are logged.
    pub async fn ask(&self, session: &SessionId, question: &str) -> AssistantReply {
        let context = self.get_context(session, question);
        let generated = self.generate_sql(question).await;

        if !self.validate_sql(&generated.query) {
            warn!("Generated SQL failed validation for question: {}", question);
            return AssistantReply {
                answer: REPHRASE_MESSAGE.to_string(),
                outcome: ReplyOutcome::Rejected,
                sql: generated.query,
                confidence: generated.confidence,
                result: None,
            };
        }

        let result = match self.execute_query(&generated.query).await {
            Ok(result) => result,
            Err(e) => {
                error!("Execution failed for '{}': {}", generated.query, e);
                self.add_exchange(
                    session,
                    question,
                    &generated.query,
                    ExchangeResult::Failed { error: e.to_string() },
                    FAILURE_MESSAGE,
                );
                return AssistantReply {
                    answer: e.user_message().to_string(),
                    outcome: ReplyOutcome::Failed,
                    sql: generated.query,
                    confidence: generated.confidence,
                    result: None,
                };
            }
        };

        let answer = self
            .generate_response(question, &generated.query, &result, &context)
            .await;

        self.add_exchange(session, question, &generated.query, result.clone().into(), &answer);

        AssistantReply {
            answer,
            outcome: ReplyOutcome::Answered,
            sql: generated.query,
            confidence: generated.confidence,
            result: Some(result),
        }
    }

    /// Up to `limit` rows of a described table.
    pub async fn sample_rows(&self, table: &str, limit: u32) -> Result<QueryResult> {
        let table = self
            .snapshot
            .table(table)
            .ok_or_else(|| AssistantError::UnknownTable(table.to_string()))?;
        let sql = format!(
            "SELECT * FROM {}.{} LIMIT {}",
            quote_ident(&self.schema_name),
            quote_ident(&table.name),
            limit
        );
        self.executor.execute(&sql).await
    }

    /// Row count per described table; a table that cannot be counted reports 0.
    pub async fn table_row_counts(&self) -> Vec<(String, i64)> {
        let mut counts = Vec::with_capacity(self.snapshot.tables().len());
        for table in self.snapshot.tables() {
            let sql = format!(
                "SELECT COUNT(*) AS count FROM {}.{}",
                quote_ident(&self.schema_name),
                quote_ident(&table.name)
            );
            let count = match self.executor.execute(&sql).await {
                Ok(result) => result
                    .rows()
                    .and_then(|rows| rows.get(0, "count"))
                    .and_then(|v| v.as_i64())
                    .unwrap_or(0),
                Err(e) => {
                    warn!("Could not count rows of {}: {}", table.name, e);
                    0
                }
            };
            counts.push((table.name.clone(), count));
        }
        counts
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
