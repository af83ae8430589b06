//! Semantic column types for the relational table abstraction.
//!
//! This is a small closed enumeration of storage types, distinct from the
//! OLAP-level attribute semantics. Each type knows its SQLite declaration
//! and how to parse itself from common SQL declaration strings (used when
//! introspecting an existing schema).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Storage type of a relational column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    String,
    Float,
    Boolean,
    /// Integer surrogate key generated by the backend.
    AutoIncrement,
    Date,
    Time,
    DateTime,
    Binary,
}

impl ColumnType {
    /// Parse a type from a SQL declaration string.
    ///
    /// Accepts common names across dialects; parameterized forms like
    /// `varchar(255)` or `decimal(18,2)` are matched on their base name.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        let base = s.split('(').next().unwrap_or("").trim();
        match base {
            "int" | "integer" | "bigint" | "smallint" | "tinyint" | "int2" | "int4" | "int8" => {
                Some(ColumnType::Integer)
            }
            "text" | "string" | "varchar" | "char" | "character" | "clob" | "nvarchar" => {
                Some(ColumnType::String)
            }
            "real" | "float" | "double" | "decimal" | "numeric" | "number" => {
                Some(ColumnType::Float)
            }
            "bool" | "boolean" | "bit" => Some(ColumnType::Boolean),
            "serial" | "autoincrement" | "bigserial" => Some(ColumnType::AutoIncrement),
            "date" => Some(ColumnType::Date),
            "time" => Some(ColumnType::Time),
            "datetime" | "timestamp" | "timestamptz" | "datetime2" => Some(ColumnType::DateTime),
            "blob" | "binary" | "varbinary" | "bytea" => Some(ColumnType::Binary),
            _ => None,
        }
    }

    /// Like [`parse`](Self::parse), but falls back to `String` for unknown
    /// declarations, since SQLite column affinity is advisory anyway.
    pub fn from_decl(s: &str) -> Self {
        Self::parse(s).unwrap_or(ColumnType::String)
    }

    /// The SQLite storage declaration for this type. `AutoIncrement`
    /// renders as `INTEGER`; its key clause is emitted by the DDL builder.
    pub fn sql_decl(&self) -> &'static str {
        match self {
            ColumnType::Integer | ColumnType::AutoIncrement => "INTEGER",
            ColumnType::String => "TEXT",
            ColumnType::Float => "REAL",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Date => "DATE",
            ColumnType::Time => "TIME",
            ColumnType::DateTime => "DATETIME",
            ColumnType::Binary => "BLOB",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ColumnType::Integer | ColumnType::Float | ColumnType::AutoIncrement
        )
    }

    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            ColumnType::Date | ColumnType::Time | ColumnType::DateTime
        )
    }

    pub fn is_auto_increment(&self) -> bool {
        matches!(self, ColumnType::AutoIncrement)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Integer => "integer",
            ColumnType::String => "string",
            ColumnType::Float => "float",
            ColumnType::Boolean => "boolean",
            ColumnType::AutoIncrement => "autoincrement",
            ColumnType::Date => "date",
            ColumnType::Time => "time",
            ColumnType::DateTime => "datetime",
            ColumnType::Binary => "binary",
        };
        write!(f, "{}", name)
    }
}
