//! SQL generation from natural-language questions
//!
//! The model is asked for one JSON object `{query, explanation, confidence}`.
//! Output is parsed strictly; anything that does not parse, or a failed
//! model call, drops to a fixed keyword ladder. `generate` never errors.

use crate::config::SQL_TEMPERATURE;
use crate::error::{AssistantError, Result};
use crate::llm::LanguageModel;
use crate::schema::SchemaDescription;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Confidence when the model omits or garbles its own score.
pub const DEFAULT_MODEL_CONFIDENCE: f32 = 0.8;
/// Confidence of a keyword-matched fallback query.
pub const FALLBACK_CONFIDENCE: f32 = 0.7;
/// Row cap the prompt asks for when the question names none.
pub const DEFAULT_ROW_LIMIT: u32 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedQuery {
    pub query: String,
    pub explanation: String,
    /// Heuristic in [0.0, 1.0], not a calibrated probability.
    pub confidence: f32,
}

/// Shape of the model's JSON reply. `query` is mandatory; the other two
/// fields degrade to defaults.
#[derive(Debug, Deserialize)]
struct ModelReply {
    query: String,
    #[serde(default)]
    explanation: Option<String>,
    #[serde(default)]
    confidence: Option<serde_json::Value>,
}

struct FallbackRule {
    /// Every group must match; a group matches when any of its phrases occurs.
    keywords: &'static [&'static [&'static str]],
    query: &'static str,
    explanation: &'static str,
}

/// Tried in order, first match wins.
const FALLBACK_LADDER: &[FallbackRule] = &[
    FallbackRule {
        keywords: &[&["class"], &["all"]],
        query: "SELECT class_id, class_name FROM classes LIMIT 100",
        explanation: "Showing all classes from the database",
    },
    FallbackRule {
        keywords: &[&["student"], &["count", "how many"]],
        query: "SELECT COUNT(*) as total_students FROM students",
        explanation: "Counting total number of students",
    },
    FallbackRule {
        keywords: &[&["student"], &["all"]],
        query: "SELECT roll_no, first_name, last_name, age FROM students LIMIT 100",
        explanation: "Showing all students in the database",
    },
];

const UNANSWERABLE_QUERY: &str = "SELECT 'Error: Could not generate query' as error_message";

pub struct QueryGenerator {
    model: Arc<dyn LanguageModel>,
    temperature: f32,
}

impl QueryGenerator {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            temperature: SQL_TEMPERATURE,
        }
    }

    pub async fn generate(&self, question: &str, schema: &SchemaDescription) -> GeneratedQuery {
        let prompt = build_prompt(question, schema);

        let reply = match self.model.complete(&prompt, self.temperature).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("SQL generation model call failed, using fallback: {}", e);
                return fallback_query(question, &e.to_string());
            }
        };

        match parse_reply(&reply) {
            Ok(generated) => {
                info!("Generated SQL (confidence {:.2})", generated.confidence);
                generated
            }
            Err(e) => {
                warn!("Could not parse model SQL reply, using fallback: {}", e);
                fallback_query(question, "")
            }
        }
    }
}

pub fn build_prompt(question: &str, schema: &SchemaDescription) -> String {
    format!(
        r#"You are an expert SQL query generator for a relational database.

Database Schema:
{schema_text}
Table Relationships:
{tables_json}

User Question: {question}

Generate a PostgreSQL query that answers the user's question. Follow these guidelines:
1. Use explicit JOIN statements when accessing multiple tables
2. Use appropriate WHERE clauses for filtering
3. Use meaningful column aliases for readability
4. Add LIMIT {limit} unless the question asks for a specific number of rows
5. Handle NULL values appropriately
6. Use aggregate functions (COUNT, SUM, AVG) when the question implies aggregation
7. Format the query for readability

Only generate SELECT queries. Do not generate INSERT, UPDATE, DELETE or any schema changes.

Respond in this exact JSON format:
{{
    "query": "your SQL query here",
    "explanation": "explanation of what the query does",
    "confidence": 0.8
}}"#,
        schema_text = schema.text,
        tables_json = schema.tables_json(),
        question = question,
        limit = DEFAULT_ROW_LIMIT,
    )
}

/// Remove a fenced-code wrapper, with or without a `json` tag.
pub fn strip_code_fences(reply: &str) -> &str {
    let trimmed = reply.trim();
    let inner = if let Some((_, rest)) = trimmed.split_once("```json") {
        rest.split("```").next().unwrap_or(rest)
    } else if let Some((_, rest)) = trimmed.split_once("```") {
        rest.split("```").next().unwrap_or(rest)
    } else {
        trimmed
    };
    inner.trim()
}

fn parse_reply(reply: &str) -> Result<GeneratedQuery> {
    let parsed: ModelReply = serde_json::from_str(strip_code_fences(reply))?;
    if parsed.query.trim().is_empty() {
        return Err(AssistantError::Llm("model returned an empty query".to_string()));
    }
    Ok(GeneratedQuery {
        query: parsed.query.trim().to_string(),
        explanation: parsed
            .explanation
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| "Generated SQL query".to_string()),
        confidence: coerce_confidence(parsed.confidence.as_ref()),
    })
}

/// Numbers and numeric strings are accepted and clamped to [0, 1];
/// anything else becomes the default.
fn coerce_confidence(value: Option<&serde_json::Value>) -> f32 {
    let raw = match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match raw {
        Some(c) if c.is_finite() => c.clamp(0.0, 1.0) as f32,
        _ => DEFAULT_MODEL_CONFIDENCE,
    }
}

/// Deterministic answer when the model path fails.
pub fn fallback_query(question: &str, error: &str) -> GeneratedQuery {
    let lowered = question.to_lowercase();

    FALLBACK_LADDER
        .iter()
        .find(|rule| {
            rule.keywords
                .iter()
                .all(|group| group.iter().any(|phrase| lowered.contains(phrase)))
        })
        .map(|rule| GeneratedQuery {
            query: rule.query.to_string(),
            explanation: rule.explanation.to_string(),
            confidence: FALLBACK_CONFIDENCE,
        })
        .unwrap_or_else(|| GeneratedQuery {
            query: UNANSWERABLE_QUERY.to_string(),
            explanation: format!("Failed to generate query for: {}. Error: {}", question, error),
            confidence: 0.0,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::tests::ScriptedModel;
    use crate::schema::tests::school_snapshot;
    use crate::schema::SchemaDescriber;

    fn description() -> SchemaDescription {
        SchemaDescriber::describe(&school_snapshot())
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("Here you go:\n```json{\"a\":1}```\nthanks"), "{\"a\":1}");
        assert_eq!(strip_code_fences("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[test]
    fn test_parse_reply_full() {
        let parsed = parse_reply(
            r#"{"query": "SELECT * FROM classes", "explanation": "All classes", "confidence": 0.95}"#,
        )
        .unwrap();
        assert_eq!(parsed.query, "SELECT * FROM classes");
        assert_eq!(parsed.explanation, "All classes");
        assert!((parsed.confidence - 0.95).abs() < 1e-6);
    }

    #[test]
    fn test_parse_reply_defaults_confidence() {
        let missing = parse_reply(r#"{"query": "SELECT 1", "explanation": "x"}"#).unwrap();
        assert_eq!(missing.confidence, DEFAULT_MODEL_CONFIDENCE);

        let garbled = parse_reply(r#"{"query": "SELECT 1", "confidence": "high"}"#).unwrap();
        assert_eq!(garbled.confidence, DEFAULT_MODEL_CONFIDENCE);
        assert_eq!(garbled.explanation, "Generated SQL query");

        let textual = parse_reply(r#"{"query": "SELECT 1", "confidence": "0.6"}"#).unwrap();
        assert!((textual.confidence - 0.6).abs() < 1e-6);

        let too_high = parse_reply(r#"{"query": "SELECT 1", "confidence": 7}"#).unwrap();
        assert_eq!(too_high.confidence, 1.0);
    }

    #[test]
    fn test_parse_reply_rejects_missing_query() {
        assert!(parse_reply(r#"{"explanation": "no query here"}"#).is_err());
        assert!(parse_reply(r#"{"query": "   "}"#).is_err());
        assert!(parse_reply("SELECT * FROM students").is_err());
        assert!(parse_reply(r#"{"query": 42}"#).is_err());
    }

    #[test]
    fn test_fallback_ladder_order() {
        let classes = fallback_query("Show me all available classes", "");
        assert!(classes.query.contains("FROM classes"));
        assert_eq!(classes.confidence, FALLBACK_CONFIDENCE);

        let count = fallback_query("Count the students please", "");
        assert_eq!(count.query, "SELECT COUNT(*) as total_students FROM students");
        assert_eq!(count.confidence, FALLBACK_CONFIDENCE);

        let all_students = fallback_query("List ALL students", "");
        assert!(all_students.query.starts_with("SELECT roll_no, first_name"));

        // "class" + "all" outranks "student" + "all"
        let both = fallback_query("all students in each class", "");
        assert!(both.query.contains("FROM classes"));
    }

    #[test]
    fn test_fallback_without_match_surfaces_error() {
        let none = fallback_query("Who teaches physics?", "quota exceeded");
        assert_eq!(none.query, UNANSWERABLE_QUERY);
        assert_eq!(none.confidence, 0.0);
        assert!(none.explanation.contains("Who teaches physics?"));
        assert!(none.explanation.contains("quota exceeded"));
    }

    #[test]
    fn test_prompt_embeds_schema_and_rules() {
        let prompt = build_prompt("How many classes?", &description());
        assert!(prompt.contains("Table: students"));
        assert!(prompt.contains("\"references_table\": \"classes\""));
        assert!(prompt.contains("User Question: How many classes?"));
        assert!(prompt.contains("LIMIT 100"));
        assert!(prompt.contains("Only generate SELECT queries"));
    }

    #[tokio::test]
    async fn test_generate_uses_model_reply() {
        let model = Arc::new(ScriptedModel::new(vec![Ok(
            "```json\n{\"query\": \"SELECT class_name FROM classes LIMIT 100\", \"explanation\": \"Class names\", \"confidence\": 0.9}\n```".to_string(),
        )]));
        let generator = QueryGenerator::new(model.clone());
        let generated = generator.generate("What classes exist?", &description()).await;
        assert_eq!(generated.query, "SELECT class_name FROM classes LIMIT 100");
        assert!((generated.confidence - 0.9).abs() < 1e-6);

        let prompts = model.prompts.lock().unwrap();
        assert_eq!(prompts[0].1, SQL_TEMPERATURE);
    }

    #[tokio::test]
    async fn test_generate_falls_back_on_model_failure() {
        let generator = QueryGenerator::new(Arc::new(ScriptedModel::failing()));
        let generated = generator
            .generate("How many students are in the school?", &description())
            .await;
        assert_eq!(generated.query, "SELECT COUNT(*) as total_students FROM students");
        assert_eq!(generated.confidence, FALLBACK_CONFIDENCE);
    }

    #[tokio::test]
    async fn test_generate_falls_back_on_prose_reply() {
        let model = Arc::new(ScriptedModel::new(vec![Ok(
            "Sure! You could run SELECT * FROM classes.".to_string(),
        )]));
        let generated = QueryGenerator::new(model)
            .generate("show all classes", &description())
            .await;
        assert_eq!(generated.query, "SELECT class_id, class_name FROM classes LIMIT 100");
    }
}
