use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    #[error("Query execution error: {0}")]
    QueryExecution(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AssistantError {
    /// Text safe to show an end user. The raw error only goes to the log.
    pub fn user_message(&self) -> &'static str {
        match self {
            AssistantError::Connectivity(_) => {
                "I can't reach the database right now. Please check that it is running and try again."
            }
            AssistantError::QueryExecution(_) => {
                "I encountered an issue while processing your question. Please try rephrasing it or ask something else."
            }
            AssistantError::UnknownTable(_) => "That table doesn't exist in this database.",
            AssistantError::Config(_) => "The assistant is not configured correctly.",
            _ => "Something went wrong while answering. Please try again.",
        }
    }
}

pub type Result<T> = std::result::Result<T, AssistantError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_keeps_inner_message() {
        let err = AssistantError::QueryExecution("column \"agee\" does not exist".to_string());
        assert_eq!(
            err.to_string(),
            "Query execution error: column \"agee\" does not exist"
        );
    }

    #[test]
    fn test_user_message_hides_raw_text() {
        let err = AssistantError::QueryExecution("relation \"studnts\" does not exist".to_string());
        assert!(!err.user_message().contains("studnts"));
        assert!(err.user_message().contains("rephrasing"));

        let err = AssistantError::Connectivity("password authentication failed".to_string());
        assert!(!err.user_message().contains("password"));
    }

    #[test]
    fn test_json_error_converts() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: AssistantError = parse.unwrap_err().into();
        assert!(matches!(err, AssistantError::Json(_)));
    }
}
