//! Schema snapshot and description
//!
//! A `SchemaSnapshot` is the point-in-time capture of the target database's
//! tables, columns and foreign keys. `SchemaDescriber` renders it twice:
//! once as prose for the prompt, once as a structured table map that is
//! serialized into the prompt next to it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Role a column plays in the table's key constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum KeyRole {
    #[default]
    None,
    Primary,
    Foreign,
    Unique,
}

impl KeyRole {
    /// Short catalog-style label, empty for `None`.
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyRole::None => "",
            KeyRole::Primary => "PRI",
            KeyRole::Foreign => "FK",
            KeyRole::Unique => "UNI",
        }
    }

    pub fn from_label(label: &str) -> Self {
        match label.trim().to_uppercase().as_str() {
            "PRI" | "PRIMARY" | "PRIMARY KEY" => KeyRole::Primary,
            "FK" | "MUL" | "FOREIGN" | "FOREIGN KEY" => KeyRole::Foreign,
            "UNI" | "UNIQUE" => KeyRole::Unique,
            _ => KeyRole::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub table: String,
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub key: KeyRole,
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeyEdge {
    pub table: String,
    pub column: String,
    pub constraint: String,
    pub target_table: String,
    pub target_column: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
}

/// Immutable capture of the database structure, taken once at startup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    tables: Vec<TableSchema>,
    foreign_keys: Vec<ForeignKeyEdge>,
}

impl SchemaSnapshot {
    /// Group columns by table. Tables keep the order in which they first
    /// appear, columns keep their input (ordinal) order.
    pub fn new(columns: Vec<ColumnDescriptor>, foreign_keys: Vec<ForeignKeyEdge>) -> Self {
        let mut tables: Vec<TableSchema> = Vec::new();
        for column in columns {
            match tables.iter_mut().find(|t| t.name == column.table) {
                Some(table) => table.columns.push(column),
                None => tables.push(TableSchema {
                    name: column.table.clone(),
                    columns: vec![column],
                }),
            }
        }
        Self {
            tables,
            foreign_keys,
        }
    }

    pub fn tables(&self) -> &[TableSchema] {
        &self.tables
    }

    pub fn foreign_keys(&self) -> &[ForeignKeyEdge] {
        &self.foreign_keys
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn edges_from<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a ForeignKeyEdge> + 'a {
        self.foreign_keys.iter().filter(move |fk| fk.table == table)
    }

    /// Edges whose target table is not among the described tables.
    pub fn dangling_edges(&self) -> Vec<&ForeignKeyEdge> {
        let known: HashSet<&str> = self.tables.iter().map(|t| t.name.as_str()).collect();
        self.foreign_keys
            .iter()
            .filter(|fk| !known.contains(fk.target_table.as_str()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Column entry of the structured table map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    pub key: String,
    pub default: Option<String>,
}

/// Relationship entry of the structured table map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipInfo {
    pub column: String,
    pub references_table: String,
    pub references_column: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub columns: Vec<ColumnInfo>,
    pub relationships: Vec<RelationshipInfo>,
}

pub type TableMap = BTreeMap<String, TableInfo>;

/// Both renderings of a snapshot, computed together.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDescription {
    pub text: String,
    pub tables: TableMap,
}

impl SchemaDescription {
    /// Pretty JSON of the table map, as embedded in prompts.
    pub fn tables_json(&self) -> String {
        serde_json::to_string_pretty(&self.tables).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Stateless renderer: the same snapshot always yields the same description.
pub struct SchemaDescriber;

impl SchemaDescriber {
    pub fn describe(snapshot: &SchemaSnapshot) -> SchemaDescription {
        SchemaDescription {
            text: Self::describe_text(snapshot),
            tables: Self::table_map(snapshot),
        }
    }

    pub fn describe_text(snapshot: &SchemaSnapshot) -> String {
        let mut description = String::from("Database Schema Description:\n\n");

        for table in snapshot.tables() {
            description.push_str(&format!("Table: {}\n", table.name));
            description.push_str("Columns:\n");
            for col in &table.columns {
                let nullable = if col.nullable { "Optional" } else { "Required" };
                let key_info = match col.key {
                    KeyRole::None => String::new(),
                    role => format!(" ({})", role.as_str()),
                };
                description.push_str(&format!(
                    "  - {}: {}{} - {}\n",
                    col.name, col.data_type, key_info, nullable
                ));
            }

            let mut edges = snapshot.edges_from(&table.name).peekable();
            if edges.peek().is_some() {
                description.push_str("Relationships:\n");
                for fk in edges {
                    description.push_str(&format!(
                        "  - {} references {}.{}\n",
                        fk.column, fk.target_table, fk.target_column
                    ));
                }
            }

            description.push('\n');
        }

        description
    }

    pub fn table_map(snapshot: &SchemaSnapshot) -> TableMap {
        snapshot
            .tables()
            .iter()
            .map(|table| {
                let columns = table
                    .columns
                    .iter()
                    .map(|col| ColumnInfo {
                        name: col.name.clone(),
                        data_type: col.data_type.clone(),
                        nullable: col.nullable,
                        key: col.key.as_str().to_string(),
                        default: col.default.clone(),
                    })
                    .collect();
                let relationships = snapshot
                    .edges_from(&table.name)
                    .map(|fk| RelationshipInfo {
                        column: fk.column.clone(),
                        references_table: fk.target_table.clone(),
                        references_column: fk.target_column.clone(),
                    })
                    .collect();
                (
                    table.name.clone(),
                    TableInfo {
                        columns,
                        relationships,
                    },
                )
            })
            .collect()
    }
}
