//! SQL-to-OLAP schema inference.
//!
//! Introspects an existing relational catalog and synthesizes an entity
//! model plus a mapper scope for it: one fact per table, with columns
//! classified by a priority-ordered rule set. Explicit per-column
//! overrides beat every heuristic.
//!
//! Classification priority: override, then primary key, then foreign key
//! (fact-dimension reference; a self-referencing key is skipped with a
//! warning), then by type: strings become single-attribute embedded
//! dimensions, integers and floats become measures, date-like columns
//! become embedded date dimensions whose derived year/month/day/week
//! mappings come out of the generic mapping generation.

use std::rc::Rc;

use inflector::Inflector;
use log::{info, warn};

use crate::error::EtlResult;
use crate::olap::entity::{Attribute, Dimension, DimensionRef, Fact, FactDimension, Measure};
use crate::olap::mapper::{EntityMapper, MappingDecl, OlapMapper};
use crate::olap::registry::ModelRegistry;
use crate::sql::backend::SqlBackend;
use crate::sql::table::StatsCollector;
use crate::sql::types::ColumnType;

/// Forced classification of a column, overriding the heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferredRole {
    Key,
    Attribute,
    Dimension,
    Measure,
    Ignore,
}

/// A `table.column` (or wildcard `*.column`) override pattern.
#[derive(Debug, Clone)]
pub struct ColumnOverride {
    pub pattern: String,
    pub role: InferredRole,
}

/// The synthesized model: a registry and a mapper scope over it.
pub struct InferredModel {
    pub registry: Rc<ModelRegistry>,
    pub mapper: Rc<OlapMapper>,
}

pub struct SchemaInference {
    backend: Rc<SqlBackend>,
    stats: Rc<StatsCollector>,
    overrides: Vec<ColumnOverride>,
}

impl SchemaInference {
    pub fn new(backend: Rc<SqlBackend>, stats: Rc<StatsCollector>) -> Self {
        Self {
            backend,
            stats,
            overrides: Vec::new(),
        }
    }

    /// Force a column's classification; `pattern` is `table.column` or
    /// `*.column`. Exact patterns beat wildcards.
    pub fn with_override(mut self, pattern: impl Into<String>, role: InferredRole) -> Self {
        self.overrides.push(ColumnOverride {
            pattern: pattern.into(),
            role,
        });
        self
    }

    fn override_for(&self, table: &str, column: &str) -> Option<InferredRole> {
        let exact = format!("{}.{}", table, column);
        let wildcard = format!("*.{}", column);
        self.overrides
            .iter()
            .find(|o| o.pattern == exact)
            .or_else(|| self.overrides.iter().find(|o| o.pattern == wildcard))
            .map(|o| o.role)
    }

    /// Infer a model from every user table in the catalog.
    pub fn infer(&self, scope_name: impl Into<String>) -> EtlResult<InferredModel> {
        let mut builder = ModelRegistry::builder();
        let mut mappers: Vec<EntityMapper> = Vec::new();

        for table in self.backend.tables()? {
            let columns = self.backend.table_info(&table)?;
            let fks = self.backend.foreign_keys(&table)?;

            let mut fact = Fact::new(table.clone()).with_label(table.to_title_case());
            let mut decls: Vec<MappingDecl> = Vec::new();
            let mut dimensions: Vec<DimensionRef> = Vec::new();

            for col in &columns {
                let fk = fks.iter().find(|fk| fk.from_column == col.name);
                let role = self.override_for(&table, &col.name).unwrap_or({
                    if col.pk {
                        InferredRole::Key
                    } else if fk.is_some() {
                        InferredRole::Dimension
                    } else {
                        match col.column_type {
                            ColumnType::String => InferredRole::Dimension,
                            ColumnType::Integer | ColumnType::Float => InferredRole::Measure,
                            ColumnType::Date | ColumnType::DateTime => InferredRole::Dimension,
                            _ => InferredRole::Attribute,
                        }
                    }
                });

                match role {
                    InferredRole::Ignore => {}
                    InferredRole::Key => {
                        let column_type = if col.column_type == ColumnType::Integer {
                            ColumnType::AutoIncrement
                        } else {
                            col.column_type
                        };
                        decls.push(
                            MappingDecl::new([col.name.clone()])
                                .with_column(col.name.clone())
                                .with_type(column_type)
                                .with_pk(true),
                        );
                    }
                    InferredRole::Attribute => {
                        fact.attributes.push(
                            Attribute::new(col.name.clone(), col.column_type)
                                .with_label(col.name.to_title_case()),
                        );
                    }
                    InferredRole::Measure => {
                        fact.measures.push(
                            Measure::new(col.name.clone(), col.column_type)
                                .with_label(col.name.to_title_case()),
                        );
                    }
                    InferredRole::Dimension => match fk {
                        Some(fk) if fk.ref_table == table => {
                            warn!(
                                "table '{}': skipping self-referencing foreign key '{}'",
                                table, col.name
                            );
                        }
                        Some(fk) => {
                            let alias = col
                                .name
                                .strip_suffix("_id")
                                .unwrap_or(&col.name)
                                .to_string();
                            let fd_name = format!("{}_{}", table, alias);
                            builder = builder.add(
                                FactDimension::new(fd_name.clone(), fk.ref_table.clone())
                                    .with_label(alias.to_title_case()),
                            );
                            mappers.push(EntityMapper::fact_dimension(fd_name.clone()));
                            dimensions.push(
                                DimensionRef::new(fd_name)
                                    .with_name(alias.clone())
                                    .with_label(alias.to_title_case()),
                            );
                            // Keep the catalog's column name when it
                            // doesn't follow the `<alias>_id` convention.
                            if col.name != format!("{}_id", alias) {
                                decls.push(
                                    MappingDecl::new([alias])
                                        .with_column(col.name.clone())
                                        .with_type(col.column_type),
                                );
                            }
                        }
                        None => {
                            let dim_name = format!("{}_{}", table, col.name);
                            let attr = Attribute::new(col.name.clone(), col.column_type)
                                .with_label(col.name.to_title_case());
                            let attr = match col.column_type {
                                ColumnType::Date | ColumnType::DateTime => attr.with_role("date"),
                                _ => attr,
                            };
                            builder = builder.add(
                                Dimension::new(dim_name.clone())
                                    .with_label(col.name.to_title_case())
                                    .with_attributes(vec![attr]),
                            );
                            mappers.push(EntityMapper::embedded(dim_name.clone()));
                            dimensions.push(
                                DimensionRef::new(dim_name).with_name(col.name.clone()),
                            );
                        }
                    },
                }
            }

            info!(
                "inferred fact '{}': {} dimensions, {} measures, {} attributes",
                table,
                dimensions.len(),
                fact.measures.len(),
                fact.attributes.len()
            );
            fact = fact.with_dimensions(dimensions);
            builder = builder.add(fact);
            mappers.push(EntityMapper::table(table.clone(), table.clone()).with_mappings(decls));
        }

        let registry = Rc::new(builder.build()?);
        let mapper = Rc::new(
            OlapMapper::new(
                scope_name,
                registry.clone(),
                self.backend.clone(),
                self.stats.clone(),
            )
            .with_mappers(mappers),
        );
        Ok(InferredModel { registry, mapper })
    }
}
