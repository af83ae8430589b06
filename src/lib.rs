//! # Starlift
//!
//! A configuration-driven ETL toolkit built around a star-schema mapping
//! engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │           Model Configuration (TOML declarations)        │
//! │   (dimensions, hierarchies, facts, mappers)              │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [registry: two-pass build]
//! ┌─────────────────────────────────────────────────────────┐
//! │           Entity Model + Mapper Scope                    │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [mapper: star-schema compile]
//! ┌─────────────────────────────────────────────────────────┐
//! │   Column Mappings + Join Paths + Backing Tables          │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [runtime: lazy message flow]
//! ┌─────────────────────────────────────────────────────────┐
//! │   Pipeline Nodes (chain/filter/multiplier/union/store)   │
//! │   + Relational Store + OLAP Model Export                 │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Messages are key-value records pulled lazily through node graphs; the
//! `Store` node resolves each message against the mapped star schema
//! (lookup-or-insert for dimensions, insert for facts) and attaches the
//! resolved surrogate keys. The same mapper contract also drives schema
//! inference from an existing catalog and export to an external OLAP
//! server's model format.

pub mod config;
pub mod error;
pub mod expr;
pub mod olap;
pub mod runtime;
pub mod sql;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::config::ModelConfig;
    pub use crate::error::{EtlError, EtlResult, ModelError, ModelResult};
    pub use crate::olap::{
        Attribute, DatePart, Dimension, DimensionRef, Entity, EntityMapper, Fact, FactDimension,
        Hierarchy, HierarchyDimension, MappingDecl, Measure, ModelExporter, ModelRegistry,
        OlapMapper, SchemaInference, Store, StoreMode,
    };
    pub use crate::runtime::{
        message, Chain, Component, Context, Filter, Message, Multiplier, Node, SetFields, Union,
        Value, ValuesSource,
    };
    pub use crate::sql::{
        ColumnType, SqlBackend, SqlColumn, SqlTable, StatsCollector, Transaction,
    };
}

pub use error::{EtlError, EtlResult, ModelError, ModelResult};
pub use runtime::{Context, Message, Value};
