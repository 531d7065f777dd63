//! Declarative table descriptors for the analysis database.
//!
//! Each table is a static [`TableSpec`] that generates its own `CREATE
//! TABLE` DDL and `INSERT OR REPLACE` statement, so the schema lives in one
//! place and the writer never hand-assembles SQL. All tables are STRICT
//! with `ON CONFLICT REPLACE` primary keys, which is what makes re-runs
//! idempotent upserts instead of constraint failures.

use rusqlite::types::Value;

use crate::model::{ModuleRecord, ReflectedEntity};

#[derive(Debug)]
pub struct Column {
    pub name: &'static str,
    pub sql_type: &'static str,
    pub nullable: bool,
}

#[derive(Debug)]
pub struct ForeignKey {
    pub columns: &'static [&'static str],
    pub ref_table: &'static str,
    pub ref_columns: &'static [&'static str],
}

#[derive(Debug)]
pub struct TableSpec {
    pub name: &'static str,
    pub columns: &'static [Column],
    pub primary_key: &'static [&'static str],
    pub foreign_keys: &'static [ForeignKey],
}

impl TableSpec {
    pub fn create_ddl(&self) -> String {
        let mut lines: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let constraint = if c.nullable { "DEFAULT NULL" } else { "NOT NULL" };
                format!("    {} {} {}", c.name, c.sql_type, constraint)
            })
            .collect();
        lines.push(format!(
            "    PRIMARY KEY ({}) ON CONFLICT REPLACE",
            self.primary_key.join(", ")
        ));
        for fk in self.foreign_keys {
            lines.push(format!(
                "    FOREIGN KEY ({}) REFERENCES {}({})",
                fk.columns.join(", "),
                fk.ref_table,
                fk.ref_columns.join(", ")
            ));
        }
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n) STRICT",
            self.name,
            lines.join(",\n")
        )
    }

    pub fn insert_sql(&self) -> String {
        let names: Vec<&str> = self.columns.iter().map(|c| c.name).collect();
        let placeholders = vec!["?"; names.len()].join(", ");
        format!(
            "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
            self.name,
            names.join(", "),
            placeholders
        )
    }
}

/// Per-module bookkeeping: one row per import root, upserted by name.
pub static MODULES: TableSpec = TableSpec {
    name: "modules",
    columns: &[
        Column { name: "name", sql_type: "TEXT", nullable: false },
        Column { name: "directory", sql_type: "TEXT", nullable: true },
        Column { name: "file", sql_type: "TEXT", nullable: true },
        Column { name: "count", sql_type: "INTEGER", nullable: true },
        Column { name: "status", sql_type: "TEXT", nullable: true },
        Column { name: "reason", sql_type: "TEXT", nullable: true },
    ],
    primary_key: &["name"],
    foreign_keys: &[],
};

/// The reflected entity graph. Self-referential: every parented row points
/// at an existing `(name, kind)` row.
pub static MODULE_DATA: TableSpec = TableSpec {
    name: "module_data",
    columns: &[
        Column { name: "name", sql_type: "TEXT", nullable: false },
        Column { name: "kind", sql_type: "TEXT", nullable: false },
        Column { name: "value_type", sql_type: "TEXT", nullable: false },
        Column { name: "doc", sql_type: "TEXT", nullable: true },
        Column { name: "parent_name", sql_type: "TEXT", nullable: true },
        Column { name: "parent_kind", sql_type: "TEXT", nullable: true },
    ],
    primary_key: &["name", "kind"],
    foreign_keys: &[ForeignKey {
        columns: &["parent_name", "parent_kind"],
        ref_table: "module_data",
        ref_columns: &["name", "kind"],
    }],
};

pub static CATEGORIES: TableSpec = TableSpec {
    name: "categories",
    columns: &[Column { name: "name", sql_type: "TEXT", nullable: false }],
    primary_key: &["name"],
    foreign_keys: &[],
};

pub static NODE_TYPES: TableSpec = TableSpec {
    name: "node_types",
    columns: &[
        Column { name: "name", sql_type: "TEXT", nullable: false },
        Column { name: "category", sql_type: "TEXT", nullable: false },
        Column { name: "doc", sql_type: "TEXT", nullable: true },
    ],
    primary_key: &["name", "category"],
    foreign_keys: &[ForeignKey {
        columns: &["category"],
        ref_table: "categories",
        ref_columns: &["name"],
    }],
};

pub static NODE_TYPE_PARAMS: TableSpec = TableSpec {
    name: "node_type_params",
    columns: &[
        Column { name: "node_type_name", sql_type: "TEXT", nullable: false },
        Column { name: "node_type_category", sql_type: "TEXT", nullable: false },
        Column { name: "param_name", sql_type: "TEXT", nullable: false },
        Column { name: "param_type", sql_type: "TEXT", nullable: false },
        Column { name: "param_label", sql_type: "TEXT", nullable: true },
        Column { name: "param_default", sql_type: "TEXT", nullable: true },
        Column { name: "param_doc", sql_type: "TEXT", nullable: true },
    ],
    primary_key: &["node_type_name", "node_type_category", "param_name"],
    foreign_keys: &[ForeignKey {
        columns: &["node_type_name", "node_type_category"],
        ref_table: "node_types",
        ref_columns: &["name", "category"],
    }],
};

/// Every table, in creation order (referenced tables first).
pub static ALL_TABLES: &[&TableSpec] = &[
    &MODULES,
    &MODULE_DATA,
    &CATEGORIES,
    &NODE_TYPES,
    &NODE_TYPE_PARAMS,
];

/// A model value that knows its table and its column values, in the spec's
/// column order.
pub trait Record {
    fn spec(&self) -> &'static TableSpec;
    fn values(&self) -> Vec<Value>;
}

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

fn opt_text(s: Option<&str>) -> Value {
    s.map(text).unwrap_or(Value::Null)
}

impl Record for ModuleRecord {
    fn spec(&self) -> &'static TableSpec {
        &MODULES
    }

    fn values(&self) -> Vec<Value> {
        vec![
            text(&self.name),
            opt_text(self.directory.as_ref().and_then(|p| p.to_str())),
            opt_text(self.file.as_ref().and_then(|p| p.to_str())),
            self.item_count.map(Value::Integer).unwrap_or(Value::Null),
            opt_text(self.status.as_ref().map(|s| s.as_str())),
            opt_text(self.reason.as_deref()),
        ]
    }
}

impl Record for ReflectedEntity {
    fn spec(&self) -> &'static TableSpec {
        &MODULE_DATA
    }

    fn values(&self) -> Vec<Value> {
        vec![
            text(&self.name),
            text(self.kind.as_str()),
            text(&self.value_type),
            opt_text(self.doc.as_deref()),
            opt_text(self.parent_name.as_deref()),
            opt_text(self.parent_kind.map(|k| k.as_str())),
        ]
    }
}
