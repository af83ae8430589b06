//! TOML-based model configuration.
//!
//! The declarative entry surface of the toolkit: dimensions, hierarchy
//! dimensions, facts, fact dimensions and their mappers are declared in a
//! TOML document and compiled into a registry plus a mapper scope through
//! the two-pass build.
//!
//! Example configuration:
//! ```toml
//! [[dimension]]
//! name = "country"
//! label = "Country"
//! attribute = [
//!     { name = "country_code", type = "string" },
//!     { name = "country_name", type = "string" },
//! ]
//!
//! [[fact]]
//! name = "sales"
//! dimension = [{ entity = "country" }]
//! measure = [{ name = "amount", type = "float" }]
//!
//! [[mapper]]
//! entity = "country"
//! kind = "table"
//! table = "country"
//! mapping = [{ path = ["country_code"], pk = true }]
//!
//! [[mapper]]
//! entity = "sales"
//! kind = "table"
//! table = "sales"
//! ```

use std::fs;
use std::path::Path;
use std::rc::Rc;

use serde::Deserialize;

use crate::error::{EtlResult, ModelError};
use crate::olap::entity::{
    Attribute, Dimension, DimensionRef, Fact, FactDimension, Hierarchy, HierarchyDimension,
};
use crate::olap::mapper::{EntityMapper, MappingDecl, OlapMapper, StoreMode};
use crate::olap::registry::ModelRegistry;
use crate::sql::backend::SqlBackend;
use crate::sql::table::StatsCollector;

#[derive(Debug, Clone, Deserialize)]
struct DimensionDecl {
    name: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(default, rename = "attribute")]
    attributes: Vec<Attribute>,
    #[serde(default)]
    role: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct HierarchyDimensionDecl {
    name: String,
    #[serde(default)]
    label: Option<String>,
    levels: Vec<String>,
    #[serde(default, rename = "hierarchy")]
    hierarchies: Vec<Hierarchy>,
    #[serde(default)]
    role: Option<String>,
    /// Present only to reject misconfiguration with a clear error.
    #[serde(default, rename = "attribute")]
    attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, Deserialize)]
struct FactDecl {
    name: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(default, rename = "dimension")]
    dimensions: Vec<DimensionRef>,
    #[serde(default, rename = "measure")]
    measures: Vec<crate::olap::entity::Measure>,
    #[serde(default, rename = "attribute")]
    attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, Deserialize)]
struct FactDimensionDecl {
    name: String,
    #[serde(default)]
    label: Option<String>,
    fact: String,
    #[serde(default, rename = "attribute")]
    attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum MapperKindDecl {
    Table,
    Embedded,
    FactDimension,
}

#[derive(Debug, Clone, Deserialize)]
struct MapperDecl {
    entity: String,
    kind: MapperKindDecl,
    #[serde(default)]
    table: Option<String>,
    #[serde(default)]
    store_mode: Option<StoreMode>,
    #[serde(default, rename = "mapping")]
    mappings: Vec<MappingDecl>,
}

/// A parsed model configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "dimension")]
    dimensions: Vec<DimensionDecl>,
    #[serde(default, rename = "hierarchy_dimension")]
    hierarchy_dimensions: Vec<HierarchyDimensionDecl>,
    #[serde(default, rename = "fact")]
    facts: Vec<FactDecl>,
    #[serde(default, rename = "fact_dimension")]
    fact_dimensions: Vec<FactDimensionDecl>,
    #[serde(default, rename = "mapper")]
    mappers: Vec<MapperDecl>,
}

impl ModelConfig {
    pub fn parse(text: &str) -> EtlResult<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> EtlResult<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Compile the declarations into a validated registry and mapper
    /// scope over the given backend.
    pub fn build(
        &self,
        backend: Rc<SqlBackend>,
        stats: Rc<StatsCollector>,
    ) -> EtlResult<(Rc<ModelRegistry>, Rc<OlapMapper>)> {
        let mut builder = ModelRegistry::builder();

        for d in &self.dimensions {
            let mut dim = Dimension::new(d.name.clone())
                .with_attributes(d.attributes.clone());
            if let Some(label) = &d.label {
                dim = dim.with_label(label.clone());
            }
            if let Some(role) = &d.role {
                dim = dim.with_role(role.clone());
            }
            builder = builder.add(dim);
        }

        for d in &self.hierarchy_dimensions {
            if !d.attributes.is_empty() {
                return Err(ModelError::IllegalAttributes {
                    entity: d.name.clone(),
                    reason: "hierarchy dimensions declare levels, not attributes".to_string(),
                }
                .into());
            }
            let mut dim = HierarchyDimension::new(d.name.clone(), d.levels.clone())
                .with_hierarchies(d.hierarchies.clone());
            if let Some(label) = &d.label {
                dim = dim.with_label(label.clone());
            }
            if let Some(role) = &d.role {
                dim = dim.with_role(role.clone());
            }
            builder = builder.add(dim);
        }

        for f in &self.facts {
            let mut fact = Fact::new(f.name.clone())
                .with_dimensions(f.dimensions.clone())
                .with_measures(f.measures.clone())
                .with_attributes(f.attributes.clone());
            if let Some(label) = &f.label {
                fact = fact.with_label(label.clone());
            }
            builder = builder.add(fact);
        }

        for d in &self.fact_dimensions {
            if !d.attributes.is_empty() {
                return Err(ModelError::IllegalAttributes {
                    entity: d.name.clone(),
                    reason: "fact dimensions expose the referenced fact's attributes".to_string(),
                }
                .into());
            }
            let mut dim = FactDimension::new(d.name.clone(), d.fact.clone());
            if let Some(label) = &d.label {
                dim = dim.with_label(label.clone());
            }
            builder = builder.add(dim);
        }

        let registry = Rc::new(builder.build()?);

        let mut mappers = Vec::with_capacity(self.mappers.len());
        for m in &self.mappers {
            let mapper = match m.kind {
                MapperKindDecl::Table => {
                    let table = m.table.clone().ok_or_else(|| {
                        ModelError::InvalidReference(format!(
                            "table mapper for '{}' declares no table",
                            m.entity
                        ))
                    })?;
                    EntityMapper::table(m.entity.clone(), table)
                        .with_mappings(m.mappings.clone())
                }
                MapperKindDecl::Embedded => EntityMapper::embedded(m.entity.clone()),
                MapperKindDecl::FactDimension => EntityMapper::fact_dimension(m.entity.clone()),
            };
            // Every mapped entity must exist in the registry.
            registry.get(&m.entity)?;
            let mapper = match m.store_mode {
                Some(mode) => mapper.with_store_mode(mode),
                None => mapper,
            };
            mappers.push(mapper);
        }

        let scope = self.name.clone().unwrap_or_else(|| "main".to_string());
        let mapper = Rc::new(
            OlapMapper::new(scope, registry.clone(), backend, stats).with_mappers(mappers),
        );
        Ok((registry, mapper))
    }
}
