//! The OLAP star-schema compiler.
//!
//! - [`entity`] - the dimension/fact entity model
//! - [`registry`] - two-pass declaration registry with cycle detection
//! - [`mapper`] - entity-to-relational mapping and storage
//! - [`schema`] - OLAP-to-SQL star layout lowering
//! - [`infer`] - SQL-to-OLAP model inference from an existing catalog
//! - [`store`] - the `Store` pipeline node
//! - [`export`] - external OLAP-server model document

pub mod entity;
pub mod export;
pub mod infer;
pub mod mapper;
pub mod registry;
pub mod schema;
pub mod store;

pub use entity::{
    Attribute, Dimension, DimensionRef, Entity, Fact, FactDimension, Hierarchy,
    HierarchyDimension, Measure,
};
pub use export::ModelExporter;
pub use infer::{ColumnOverride, InferredModel, InferredRole, SchemaInference};
pub use mapper::{
    pk_of, DatePart, EntityMapper, MapperKind, MappingDecl, OlapMapper, SqlJoin, SqlMapping,
    StoreMode,
};
pub use registry::{FlatDimensionRef, ModelRegistry, RegistryBuilder};
pub use store::Store;
