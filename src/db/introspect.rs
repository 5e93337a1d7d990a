//! Schema introspection from `pg_catalog`
//!
//! The `information_schema` constraint views only list constraints on
//! tables the current role owns, so a read-only role would see no keys and
//! no relationships there. `pg_constraint` is readable by any role that can
//! connect.

use crate::db::executor::SqlBackend;
use crate::db::result::{QueryResult, RowSet};
use crate::error::{AssistantError, Result};
use crate::schema::{ColumnDescriptor, ForeignKeyEdge, KeyRole, SchemaSnapshot};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// One row per column the current role may select, ordered by table then
/// column position. The key role is the strongest constraint the column
/// takes part in.
pub const COLUMNS_QUERY: &str = r#"
SELECT
    c.relname::text AS table_name,
    a.attname::text AS column_name,
    format_type(a.atttypid, a.atttypmod) AS data_type,
    CASE WHEN a.attnotnull THEN 'NO' ELSE 'YES' END AS is_nullable,
    pg_get_expr(d.adbin, d.adrelid) AS column_default,
    COALESCE((
        SELECT CASE MIN(CASE k.contype
                            WHEN 'p' THEN 1
                            WHEN 'f' THEN 2
                            WHEN 'u' THEN 3
                        END)
                   WHEN 1 THEN 'PRI'
                   WHEN 2 THEN 'FK'
                   WHEN 3 THEN 'UNI'
               END
        FROM pg_catalog.pg_constraint k
        WHERE k.conrelid = c.oid
          AND k.contype IN ('p', 'f', 'u')
          AND a.attnum = ANY (k.conkey)
    ), '') AS column_key
FROM pg_catalog.pg_attribute a
JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
LEFT JOIN pg_catalog.pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
WHERE n.nspname = $1
  AND c.relkind IN ('r', 'p', 'v', 'm', 'f')
  AND a.attnum > 0
  AND NOT a.attisdropped
  AND has_column_privilege(c.oid, a.attnum, 'SELECT')
ORDER BY c.relname, a.attnum
"#;

/// One row per referencing column. Composite keys are paired by position
/// within the constraint, never crossed.
pub const FOREIGN_KEYS_QUERY: &str = r#"
SELECT
    src.relname::text AS table_name,
    sa.attname::text AS column_name,
    k.conname::text AS constraint_name,
    tgt.relname::text AS referenced_table_name,
    ta.attname::text AS referenced_column_name
FROM pg_catalog.pg_constraint k
JOIN pg_catalog.pg_class src ON src.oid = k.conrelid
JOIN pg_catalog.pg_namespace n ON n.oid = src.relnamespace
JOIN pg_catalog.pg_class tgt ON tgt.oid = k.confrelid
CROSS JOIN LATERAL unnest(k.conkey, k.confkey) WITH ORDINALITY AS cols(src_attnum, tgt_attnum, ord)
JOIN pg_catalog.pg_attribute sa ON sa.attrelid = k.conrelid AND sa.attnum = cols.src_attnum
JOIN pg_catalog.pg_attribute ta ON ta.attrelid = k.confrelid AND ta.attnum = cols.tgt_attnum
WHERE k.contype = 'f'
  AND n.nspname = $1
ORDER BY src.relname, k.conname, cols.ord
"#;

pub struct SchemaIntrospector {
    backend: Arc<dyn SqlBackend>,
    schema: String,
}

impl SchemaIntrospector {
    pub fn new(backend: Arc<dyn SqlBackend>, schema: impl Into<String>) -> Self {
        Self {
            backend,
            schema: schema.into(),
        }
    }

    /// Read the catalog and build a snapshot. Any catalog failure is a
    /// connectivity failure: the session cannot start without a schema.
    pub async fn get_schema(&self) -> Result<SchemaSnapshot> {
        let columns = self.load_columns().await?;
        let foreign_keys = self.load_foreign_keys().await?;
        let snapshot = SchemaSnapshot::new(columns, foreign_keys);

        info!(
            "Introspected schema '{}': {} tables, {} foreign keys",
            self.schema,
            snapshot.tables().len(),
            snapshot.foreign_keys().len()
        );
        if snapshot.is_empty() {
            warn!("Schema '{}' has no tables", self.schema);
        }
        for fk in snapshot.dangling_edges() {
            warn!(
                "Foreign key {} on {}.{} targets undescribed table {}",
                fk.constraint, fk.table, fk.column, fk.target_table
            );
        }

        Ok(snapshot)
    }

    async fn load_columns(&self) -> Result<Vec<ColumnDescriptor>> {
        let rows = self.catalog_rows(COLUMNS_QUERY, "columns").await?;
        (0..rows.len())
            .map(|i| {
                Ok(ColumnDescriptor {
                    table: required(&rows, i, "table_name")?,
                    name: required(&rows, i, "column_name")?,
                    data_type: required(&rows, i, "data_type")?,
                    nullable: rows
                        .get_str(i, "is_nullable")
                        .map_or(true, |v| v.eq_ignore_ascii_case("YES")),
                    key: KeyRole::from_label(&rows.get_str(i, "column_key").unwrap_or_default()),
                    default: rows.get_str(i, "column_default"),
                })
            })
            .collect()
    }

    async fn load_foreign_keys(&self) -> Result<Vec<ForeignKeyEdge>> {
        let rows = self.catalog_rows(FOREIGN_KEYS_QUERY, "foreign keys").await?;
        let mut edges = Vec::with_capacity(rows.len());
        for i in 0..rows.len() {
            // Edges without a target table are not relationships.
            let Some(target_table) = rows.get_str(i, "referenced_table_name") else {
                continue;
            };
            edges.push(ForeignKeyEdge {
                table: required(&rows, i, "table_name")?,
                column: required(&rows, i, "column_name")?,
                constraint: rows.get_str(i, "constraint_name").unwrap_or_default(),
                target_table,
                target_column: rows.get_str(i, "referenced_column_name").unwrap_or_default(),
            });
        }
        Ok(edges)
    }

    async fn catalog_rows(&self, sql: &str, what: &str) -> Result<RowSet> {
        let result = self
            .backend
            .run(sql, &[Value::String(self.schema.clone())])
            .await
            .map_err(|e| AssistantError::Connectivity(format!("failed to read {} metadata: {}", what, e)))?;
        match result {
            QueryResult::Rows(rows) => Ok(rows),
            QueryResult::Acknowledged { .. } => Err(AssistantError::Connectivity(format!(
                "{} metadata query returned no row set",
                what
            ))),
        }
    }
}

fn required(rows: &RowSet, row: usize, column: &str) -> Result<String> {
    rows.get_str(row, column).ok_or_else(|| {
        AssistantError::Connectivity(format!("metadata row {} is missing {}", row, column))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::executor::tests::ScriptedBackend;
    use serde_json::json;

    fn columns_result() -> QueryResult {
        let names = ["table_name", "column_name", "data_type", "is_nullable", "column_default", "column_key"];
        QueryResult::Rows(RowSet::new(
            names.iter().map(|s| s.to_string()).collect(),
            vec![
                vec![json!("classes"), json!("class_id"), json!("integer"), json!("NO"), Value::Null, json!("PRI")],
                vec![json!("classes"), json!("class_name"), json!("text"), json!("NO"), Value::Null, json!("")],
                vec![json!("students"), json!("roll_no"), json!("integer"), json!("NO"), json!("nextval('students_roll_no_seq'::regclass)"), json!("PRI")],
                vec![json!("students"), json!("class_id"), json!("integer"), json!("YES"), Value::Null, json!("FK")],
            ],
        ))
    }

    fn fk_result() -> QueryResult {
        let names = ["table_name", "column_name", "constraint_name", "referenced_table_name", "referenced_column_name"];
        QueryResult::Rows(RowSet::new(
            names.iter().map(|s| s.to_string()).collect(),
            vec![vec![
                json!("students"),
                json!("class_id"),
                json!("students_class_id_fkey"),
                json!("classes"),
                json!("class_id"),
            ]],
        ))
    }

    #[tokio::test]
    async fn test_get_schema_builds_snapshot() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .on("AS column_key", Ok(columns_result()))
                .on("confkey", Ok(fk_result())),
        );
        let introspector = SchemaIntrospector::new(backend.clone(), "public");
        let snapshot = introspector.get_schema().await.unwrap();

        assert_eq!(snapshot.table_names(), vec!["classes", "students"]);
        let students = snapshot.table("students").unwrap();
        assert_eq!(students.columns[0].key, KeyRole::Primary);
        assert!(students.columns[1].nullable);
        assert_eq!(students.columns[1].key, KeyRole::Foreign);
        assert!(students.columns[0].default.as_deref().unwrap().starts_with("nextval"));
        assert_eq!(snapshot.foreign_keys()[0].target_table, "classes");
        assert!(snapshot.dangling_edges().is_empty());

        let seen = backend.seen.lock().unwrap();
        assert!(seen.iter().all(|(_, params)| params == &vec![json!("public")]));
    }

    #[test]
    fn test_catalog_queries_avoid_owner_only_views() {
        for query in [COLUMNS_QUERY, FOREIGN_KEYS_QUERY] {
            assert!(!query.contains("information_schema"));
            assert!(query.contains("pg_catalog.pg_constraint"));
        }
        assert!(FOREIGN_KEYS_QUERY.contains("unnest(k.conkey, k.confkey) WITH ORDINALITY"));
    }

    #[tokio::test]
    async fn test_composite_foreign_key_keeps_column_pairs() {
        let names = ["table_name", "column_name", "data_type", "is_nullable", "column_default", "column_key"];
        let columns = QueryResult::Rows(RowSet::new(
            names.iter().map(|s| s.to_string()).collect(),
            vec![
                vec![json!("marks"), json!("year"), json!("integer"), json!("NO"), Value::Null, json!("FK")],
                vec![json!("marks"), json!("term"), json!("text"), json!("NO"), Value::Null, json!("FK")],
                vec![json!("terms"), json!("year"), json!("integer"), json!("NO"), Value::Null, json!("PRI")],
                vec![json!("terms"), json!("term"), json!("text"), json!("NO"), Value::Null, json!("PRI")],
            ],
        ));
        let fk_names = ["table_name", "column_name", "constraint_name", "referenced_table_name", "referenced_column_name"];
        let fks = QueryResult::Rows(RowSet::new(
            fk_names.iter().map(|s| s.to_string()).collect(),
            vec![
                vec![json!("marks"), json!("year"), json!("marks_term_fkey"), json!("terms"), json!("year")],
                vec![json!("marks"), json!("term"), json!("marks_term_fkey"), json!("terms"), json!("term")],
            ],
        ));
        let backend = Arc::new(
            ScriptedBackend::new()
                .on("AS column_key", Ok(columns))
                .on("confkey", Ok(fks)),
        );
        let snapshot = SchemaIntrospector::new(backend, "public").get_schema().await.unwrap();

        let pairs: Vec<(&str, &str)> = snapshot
            .edges_from("marks")
            .map(|fk| (fk.column.as_str(), fk.target_column.as_str()))
            .collect();
        assert_eq!(pairs, vec![("year", "year"), ("term", "term")]);

        let text = crate::schema::SchemaDescriber::describe_text(&snapshot);
        assert!(text.contains("  - year references terms.year\n"));
        assert!(text.contains("  - term references terms.term\n"));
        assert!(!text.contains("year references terms.term"));
    }

    #[tokio::test]
    async fn test_catalog_failure_is_connectivity_error() {
        let backend = Arc::new(ScriptedBackend::new().on(
            "AS column_key",
            Err(AssistantError::QueryExecution("connection refused".to_string())),
        ));
        let err = SchemaIntrospector::new(backend, "public")
            .get_schema()
            .await
            .unwrap_err();
        assert!(matches!(err, AssistantError::Connectivity(_)));
    }

    #[tokio::test]
    async fn test_null_target_rows_are_skipped() {
        let fk = QueryResult::Rows(RowSet::new(
            vec![
                "table_name".to_string(),
                "column_name".to_string(),
                "constraint_name".to_string(),
                "referenced_table_name".to_string(),
                "referenced_column_name".to_string(),
            ],
            vec![vec![json!("students"), json!("class_id"), json!("fk"), Value::Null, Value::Null]],
        ));
        let backend = Arc::new(
            ScriptedBackend::new()
                .on("AS column_key", Ok(columns_result()))
                .on("confkey", Ok(fk)),
        );
        let snapshot = SchemaIntrospector::new(backend, "public").get_schema().await.unwrap();
        assert!(snapshot.foreign_keys().is_empty());
    }
}
