//! Relational store layer.
//!
//! - [`types`] - semantic column types
//! - [`backend`] - lazily opened SQLite backend plus catalog introspection
//! - [`table`] - schema-described tables with find/lookup/insert/update/upsert

pub mod backend;
pub mod table;
pub mod types;

pub use backend::{quote_ident, ForeignKey, IntrospectedColumn, SqlBackend, Transaction};
pub use table::{Criteria, Criterion, SqlColumn, SqlTable, StatsCollector, TableStats};
pub use types::ColumnType;
