//! Query execution against the live connection
//!
//! `SqlBackend` is the seam between the pipeline and the database driver.
//! The Postgres pool implements it; tests substitute in-memory fakes.

use crate::db::result::{QueryResult, RowSet};
use crate::error::{AssistantError, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgPool, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Executor, Postgres, Row, Statement, TypeInfo};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// A SQL-executing connection: runs one statement with positional
/// parameters and returns rows or an acknowledgement.
#[async_trait]
pub trait SqlBackend: Send + Sync {
    async fn run(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;
}

#[async_trait]
impl SqlBackend for PgPool {
    async fn run(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let started = Instant::now();

        // Prepare first: the output columns decide rows vs acknowledgement,
        // and a row-returning statement keeps its header even with no rows.
        // This costs one extra round trip per statement.
        let prepared = self
            .prepare(sql)
            .await
            .map_err(|e| AssistantError::QueryExecution(e.to_string()))?;
        let columns: Vec<String> = prepared
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let query = bind_params(sqlx::query(sql), params);

        let result = if columns.is_empty() {
            let done = query
                .execute(self)
                .await
                .map_err(|e| AssistantError::QueryExecution(e.to_string()))?;
            QueryResult::Acknowledged {
                rows_affected: done.rows_affected(),
            }
        } else {
            let rows = query
                .fetch_all(self)
                .await
                .map_err(|e| AssistantError::QueryExecution(e.to_string()))?;
            let values = rows.iter().map(decode_row).collect();
            QueryResult::Rows(RowSet::new(columns, values))
        };

        debug!(
            "Executed statement in {}ms ({} rows)",
            started.elapsed().as_millis(),
            result.row_count()
        );
        Ok(result)
    }
}

fn bind_params<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &[Value],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            Value::Null => query.bind(Option::<String>::None),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => query.bind(i),
                None => query.bind(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => query.bind(s.clone()),
            other => query.bind(other.clone()),
        };
    }
    query
}

/// Decode every column of a row into a JSON value by its Postgres type.
fn decode_row(row: &PgRow) -> Vec<Value> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| decode_column(row, idx, col.type_info().name()))
        .collect()
}

fn decode_column(row: &PgRow, idx: usize, type_name: &str) -> Value {
    fn opt<T: Into<Value>>(v: std::result::Result<Option<T>, sqlx::Error>) -> Option<Value> {
        v.ok().map(|o| o.map(Into::into).unwrap_or(Value::Null))
    }

    let decoded = match type_name {
        "BOOL" => opt(row.try_get::<Option<bool>, _>(idx)),
        "INT2" => opt(row.try_get::<Option<i16>, _>(idx)),
        "INT4" => opt(row.try_get::<Option<i32>, _>(idx)),
        "INT8" => opt(row.try_get::<Option<i64>, _>(idx)),
        "FLOAT4" => opt(row.try_get::<Option<f32>, _>(idx)),
        "FLOAT8" => opt(row.try_get::<Option<f64>, _>(idx)),
        "NUMERIC" => row
            .try_get::<Option<rust_decimal::Decimal>, _>(idx)
            .ok()
            .map(|o| o.map(decimal_value).unwrap_or(Value::Null)),
        "DATE" => opt(row
            .try_get::<Option<chrono::NaiveDate>, _>(idx)
            .map(|o| o.map(|d| d.to_string()))),
        "TIME" => opt(row
            .try_get::<Option<chrono::NaiveTime>, _>(idx)
            .map(|o| o.map(|t| t.to_string()))),
        "TIMESTAMP" => opt(row
            .try_get::<Option<chrono::NaiveDateTime>, _>(idx)
            .map(|o| o.map(|t| t.to_string()))),
        "TIMESTAMPTZ" => opt(row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx)
            .map(|o| o.map(|t| t.to_rfc3339()))),
        "UUID" => opt(row
            .try_get::<Option<uuid::Uuid>, _>(idx)
            .map(|o| o.map(|u| u.to_string()))),
        "JSON" | "JSONB" => row.try_get::<Option<Value>, _>(idx).ok().map(|o| o.unwrap_or(Value::Null)),
        _ => opt(row.try_get::<Option<String>, _>(idx)),
    };

    decoded.unwrap_or_else(|| {
        warn!("Unsupported column type {} at position {}", type_name, idx);
        Value::String(format!("<{}>", type_name.to_lowercase()))
    })
}

fn decimal_value(d: rust_decimal::Decimal) -> Value {
    if d.fract().is_zero() {
        if let Ok(i) = i64::try_from(d) {
            return Value::from(i);
        }
    }
    f64::try_from(d)
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(d.to_string()))
}

/// Runs validated statements for the pipeline.
#[derive(Clone)]
pub struct QueryExecutor {
    backend: Arc<dyn SqlBackend>,
}

impl QueryExecutor {
    pub fn new(backend: Arc<dyn SqlBackend>) -> Self {
        Self { backend }
    }

    pub async fn execute(&self, sql: &str) -> Result<QueryResult> {
        self.execute_with(sql, &[]).await
    }

    pub async fn execute_with(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.backend.run(sql, params).await.map_err(|e| {
            warn!("Query execution failed: {}", e);
            match e {
                AssistantError::QueryExecution(_) => e,
                other => AssistantError::QueryExecution(other.to_string()),
            }
        })
    }

    pub fn backend(&self) -> &Arc<dyn SqlBackend> {
        &self.backend
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    /// Fake backend: answers statements by substring match, records what ran.
    pub(crate) struct ScriptedBackend {
        pub(crate) answers: Vec<(String, Result<QueryResult>)>,
        pub(crate) seen: Mutex<Vec<(String, Vec<Value>)>>,
    }

    impl ScriptedBackend {
        pub(crate) fn new() -> Self {
            Self {
                answers: Vec::new(),
                seen: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn on(mut self, needle: &str, answer: Result<QueryResult>) -> Self {
            self.answers.push((needle.to_string(), answer));
            self
        }
    }

    fn copy(answer: &Result<QueryResult>) -> Result<QueryResult> {
        match answer {
            Ok(r) => Ok(r.clone()),
            Err(e) => Err(AssistantError::QueryExecution(e.to_string())),
        }
    }

    #[async_trait]
    impl SqlBackend for ScriptedBackend {
        async fn run(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
            self.seen.lock().unwrap().push((sql.to_string(), params.to_vec()));
            self.answers
                .iter()
                .find(|(needle, _)| sql.contains(needle.as_str()))
                .map(|(_, answer)| copy(answer))
                .unwrap_or_else(|| Err(AssistantError::QueryExecution(format!("no answer for: {}", sql))))
        }
    }

    #[tokio::test]
    async fn test_executor_returns_rows() {
        let backend = ScriptedBackend::new().on(
            "COUNT(*)",
            Ok(QueryResult::Rows(RowSet::new(
                vec!["total_students".to_string()],
                vec![vec![json!(42)]],
            ))),
        );
        let executor = QueryExecutor::new(Arc::new(backend));
        let result = executor
            .execute("SELECT COUNT(*) as total_students FROM students")
            .await
            .unwrap();
        assert_eq!(result.rows().unwrap().get(0, "total_students"), Some(&json!(42)));
    }

    #[tokio::test]
    async fn test_executor_empty_match_is_empty_rowset() {
        let backend = ScriptedBackend::new().on(
            "WHERE age > 99",
            Ok(QueryResult::Rows(RowSet::new(vec!["roll_no".to_string()], vec![]))),
        );
        let executor = QueryExecutor::new(Arc::new(backend));
        let result = executor
            .execute("SELECT roll_no FROM students WHERE age > 99")
            .await
            .unwrap();
        assert!(matches!(result, QueryResult::Rows(ref set) if set.is_empty()));
    }

    #[tokio::test]
    async fn test_executor_maps_failures_to_execution_error() {
        let backend = ScriptedBackend::new().on(
            "agee",
            Err(AssistantError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "column \"agee\" does not exist",
            ))),
        );
        let executor = QueryExecutor::new(Arc::new(backend));
        let err = executor.execute("SELECT agee FROM students").await.unwrap_err();
        assert!(matches!(err, AssistantError::QueryExecution(_)));
    }

    #[tokio::test]
    async fn test_params_are_forwarded() {
        let backend = Arc::new(ScriptedBackend::new().on(
            "$1",
            Ok(QueryResult::Rows(RowSet::default())),
        ));
        let executor = QueryExecutor::new(backend.clone());
        executor
            .execute_with("SELECT * FROM students WHERE age > $1", &[json!(10)])
            .await
            .unwrap();
        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen[0].1, vec![json!(10)]);
    }

    #[test]
    fn test_decimal_value_prefers_integers() {
        use rust_decimal::Decimal;
        assert_eq!(decimal_value(Decimal::new(42, 0)), json!(42));
        assert_eq!(decimal_value(Decimal::new(155, 1)), json!(15.5));
    }
}
