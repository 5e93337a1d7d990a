//! Conversation memory
//!
//! Per-session exchange logs held in process. Nothing is persisted; a
//! restart starts every session from scratch.

use crate::db::result::QueryResult;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::RwLock;
use uuid::Uuid;

/// How many recent exchanges are considered for prompt context.
const CONTEXT_WINDOW: usize = 5;
/// How many of those are actually rendered.
const CONTEXT_EXCHANGES: usize = 3;

/// Opaque session token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the executed query produced, or why it did not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExchangeResult {
    Completed { result: QueryResult },
    Failed { error: String },
}

impl ExchangeResult {
    pub fn is_error(&self) -> bool {
        matches!(self, ExchangeResult::Failed { .. })
    }
}

impl From<QueryResult> for ExchangeResult {
    fn from(result: QueryResult) -> Self {
        ExchangeResult::Completed { result }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    pub timestamp: DateTime<Utc>,
    pub question: String,
    pub sql: String,
    pub result: ExchangeResult,
    pub explanation: String,
}

pub struct ConversationMemory {
    conversations: DashMap<SessionId, Vec<Exchange>>,
    current: RwLock<Option<SessionId>>,
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self {
            conversations: DashMap::new(),
            current: RwLock::new(None),
        }
    }

    /// Allocate an empty log and make it the current session.
    pub fn create_session(&self) -> SessionId {
        let id = SessionId::new();
        self.conversations.insert(id.clone(), Vec::new());
        if let Ok(mut current) = self.current.write() {
            *current = Some(id.clone());
        }
        id
    }

    pub fn current_session(&self) -> Option<SessionId> {
        self.current.read().ok().and_then(|c| c.clone())
    }

    /// Append an exchange. An unknown id gets a fresh log.
    pub fn add_exchange(
        &self,
        session: &SessionId,
        question: &str,
        sql: &str,
        result: ExchangeResult,
        explanation: &str,
    ) {
        let exchange = Exchange {
            timestamp: Utc::now(),
            question: question.to_string(),
            sql: sql.to_string(),
            result,
            explanation: explanation.to_string(),
        };
        self.conversations
            .entry(session.clone())
            .or_default()
            .push(exchange);
    }

    /// The most recent `limit` exchanges, oldest first.
    pub fn get_history(&self, session: &SessionId, limit: usize) -> Vec<Exchange> {
        self.conversations
            .get(session)
            .map(|log| {
                let start = log.len().saturating_sub(limit);
                log[start..].to_vec()
            })
            .unwrap_or_default()
    }

    /// Recent exchanges rendered as `Q:`/`A:` pairs for a prompt. Always
    /// the latest ones; `_question` does not rank or filter.
    pub fn get_context_text(&self, session: &SessionId, _question: &str) -> String {
        let history = self.get_history(session, CONTEXT_WINDOW);
        if history.is_empty() {
            return String::new();
        }

        let start = history.len().saturating_sub(CONTEXT_EXCHANGES);
        let mut context = String::from("Previous conversation context:\n");
        for exchange in &history[start..] {
            context.push_str(&format!("Q: {}\n", exchange.question));
            context.push_str(&format!("A: {}\n\n", exchange.explanation));
        }
        context
    }

    pub fn exchange_count(&self, session: &SessionId) -> usize {
        self.conversations.get(session).map(|log| log.len()).unwrap_or(0)
    }

    pub fn session_count(&self) -> usize {
        self.conversations.len()
    }
}
