//! Natural-language answers from query results

use crate::config::RESPONSE_TEMPERATURE;
use crate::db::result::QueryResult;
use crate::llm::LanguageModel;
use std::sync::Arc;
use tracing::warn;

/// Rows shown in full before the results are summarized.
pub const MAX_RENDERED_ROWS: usize = 10;

pub const NO_DATA: &str = "No data found.";

pub struct ResponseGenerator {
    model: Arc<dyn LanguageModel>,
    temperature: f32,
}

impl ResponseGenerator {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            temperature: RESPONSE_TEMPERATURE,
        }
    }

    /// Answer in prose. Falls back to a templated sentence when the model
    /// is unavailable; never fails.
    pub async fn respond(&self, question: &str, sql: &str, results: &QueryResult, context: &str) -> String {
        let results_text = format_results(results);
        let prompt = build_prompt(question, sql, &results_text, context);

        match self.model.complete(&prompt, self.temperature).await {
            Ok(answer) if !answer.trim().is_empty() => answer.trim().to_string(),
            Ok(_) => {
                warn!("Response model returned empty text, using fallback");
                fallback_response(question, &results_text)
            }
            Err(e) => {
                warn!("Response generation failed, using fallback: {}", e);
                fallback_response(question, &results_text)
            }
        }
    }
}

/// Render results for the prompt: "No data found." for an empty row set,
/// the first ten rows plus a total for larger ones, everything otherwise.
pub fn format_results(results: &QueryResult) -> String {
    match results {
        QueryResult::Rows(set) if set.is_empty() => NO_DATA.to_string(),
        QueryResult::Rows(set) if set.len() > MAX_RENDERED_ROWS => format!(
            "Found {} records. Here are the first {}:\n{}",
            set.len(),
            MAX_RENDERED_ROWS,
            set.render_table(Some(MAX_RENDERED_ROWS))
        ),
        QueryResult::Rows(set) => set.render_table(None),
        ack @ QueryResult::Acknowledged { .. } => ack.to_string(),
    }
}

pub fn build_prompt(question: &str, sql: &str, results_text: &str, context: &str) -> String {
    format!(
        r#"You are a helpful assistant for a database question-answering system.
Generate a natural, conversational response based on the query results.

Original Question: {question}
SQL Query Used: {sql}
Query Results: {results_text}

Context from previous conversation:
{context}

Guidelines:
1. Provide a clear, friendly response in plain English
2. If results are empty, explain that no data was found
3. If there are many results, summarize key insights
4. Include relevant numbers and statistics
5. Suggest follow-up questions if appropriate
6. Be conversational and helpful
7. If the data shows interesting patterns, mention them

Response:"#
    )
}

pub fn fallback_response(question: &str, results_text: &str) -> String {
    format!(
        "I found some results for your question '{}'. Here's what I discovered: {}",
        question, results_text
    )
}
