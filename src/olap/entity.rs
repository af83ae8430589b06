//! The OLAP entity model: dimensions, hierarchy dimensions, facts and
//! fact dimensions.
//!
//! Entities are pure data built with `with_*` constructors during
//! configuration load; validation that needs cross-entity knowledge lives
//! in the registry's build pass. Labels default lazily: an unset label
//! renders as the entity (or attribute) name, and a single-attribute
//! dimension whose attribute shares the dimension's name lends its own
//! label to that attribute.

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::sql::types::ColumnType;

/// A descriptive attribute of a dimension or fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    #[serde(rename = "type", default = "default_attribute_type")]
    pub data_type: ColumnType,
    #[serde(default)]
    pub label: Option<String>,
    /// Semantic role tag such as "year" or "date", consumed by exporters.
    #[serde(default)]
    pub role: Option<String>,
}

fn default_attribute_type() -> ColumnType {
    ColumnType::String
}

impl Attribute {
    pub fn new(name: impl Into<String>, data_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            data_type,
            label: None,
            role: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }
}

/// An aggregatable numeric measure on a fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    pub name: String,
    #[serde(rename = "type", default = "default_measure_type")]
    pub data_type: ColumnType,
    #[serde(default)]
    pub label: Option<String>,
}

fn default_measure_type() -> ColumnType {
    ColumnType::Float
}

impl Measure {
    pub fn new(name: impl Into<String>, data_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            data_type,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }
}

/// A named drill-down order over a hierarchy dimension's levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hierarchy {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    pub levels: Vec<String>,
}

impl Hierarchy {
    pub fn new(name: impl Into<String>, levels: Vec<String>) -> Self {
        Self {
            name: name.into(),
            label: None,
            levels,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }
}

/// A fact's reference to a dimension entity, with an optional alias so
/// the same dimension can be used at several logical positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionRef {
    /// Name of the referenced entity.
    pub entity: String,
    /// Alias at this position; defaults to the entity name.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
}

impl DimensionRef {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            name: None,
            label: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// The alias this reference goes by on the fact.
    pub fn alias(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.entity)
    }

    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or_else(|| self.alias())
    }
}

/// A classification axis with an ordered attribute list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    #[serde(default)]
    pub role: Option<String>,
}

impl Dimension {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: None,
            attributes: Vec::new(),
            role: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_attributes(mut self, attributes: Vec<Attribute>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }

    /// The effective label of one of this dimension's attributes.
    ///
    /// A sole attribute named after the dimension inherits the dimension's
    /// label; any other attribute falls back to its own name.
    pub fn attribute_label<'a>(&'a self, attr: &'a Attribute) -> &'a str {
        if attr.label.is_none() && self.attributes.len() == 1 && attr.name == self.name {
            self.label()
        } else {
            attr.label()
        }
    }
}

/// A dimension composed of named levels (sub-dimensions) and drill
/// hierarchies over them, with no direct attributes of its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyDimension {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    /// Names of the level entities, finest declaration order.
    pub levels: Vec<String>,
    #[serde(default)]
    pub hierarchies: Vec<Hierarchy>,
    #[serde(default)]
    pub role: Option<String>,
}

impl HierarchyDimension {
    pub fn new(name: impl Into<String>, levels: Vec<String>) -> Self {
        Self {
            name: name.into(),
            label: None,
            levels,
            hierarchies: Vec::new(),
            role: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_hierarchies(mut self, hierarchies: Vec<Hierarchy>) -> Self {
        self.hierarchies = hierarchies;
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }

    /// Every hierarchy may only reference declared levels.
    pub fn validate(&self) -> ModelResult<()> {
        for hierarchy in &self.hierarchies {
            for level in &hierarchy.levels {
                if !self.levels.contains(level) {
                    return Err(ModelError::UnknownLevel {
                        dimension: self.name.clone(),
                        hierarchy: hierarchy.name.clone(),
                        level: level.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// The hierarchy with the most levels, used as the default drill
    /// order by single-hierarchy consumers.
    pub fn finest_hierarchy(&self) -> Option<&Hierarchy> {
        self.hierarchies.iter().max_by_key(|h| h.levels.len())
    }
}

/// A measured event record referencing dimensions and holding measures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub dimensions: Vec<DimensionRef>,
    #[serde(default)]
    pub measures: Vec<Measure>,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

impl Fact {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: None,
            dimensions: Vec::new(),
            measures: Vec::new(),
            attributes: Vec::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_dimensions(mut self, dimensions: Vec<DimensionRef>) -> Self {
        self.dimensions = dimensions;
        self
    }

    pub fn with_measures(mut self, measures: Vec<Measure>) -> Self {
        self.measures = measures;
        self
    }

    pub fn with_attributes(mut self, attributes: Vec<Attribute>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }
}

/// A dimension backed by another fact (fact-to-fact drill-through).
///
/// Its apparent attributes are the referenced fact's attributes; it can
/// never declare its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactDimension {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    /// Name of the backing fact entity.
    pub fact: String,
}

impl FactDimension {
    pub fn new(name: impl Into<String>, fact: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: None,
            fact: fact.into(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }
}

/// Closed set of model entity kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity {
    Dimension(Dimension),
    HierarchyDimension(HierarchyDimension),
    Fact(Fact),
    FactDimension(FactDimension),
}

impl Entity {
    pub fn name(&self) -> &str {
        match self {
            Entity::Dimension(d) => &d.name,
            Entity::HierarchyDimension(d) => &d.name,
            Entity::Fact(f) => &f.name,
            Entity::FactDimension(d) => &d.name,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Entity::Dimension(d) => d.label(),
            Entity::HierarchyDimension(d) => d.label(),
            Entity::Fact(f) => f.label(),
            Entity::FactDimension(d) => d.label(),
        }
    }

    pub fn is_fact(&self) -> bool {
        matches!(self, Entity::Fact(_))
    }

    /// Names of the entities this entity references directly.
    pub fn references(&self) -> Vec<&str> {
        match self {
            Entity::Dimension(_) => Vec::new(),
            Entity::HierarchyDimension(d) => d.levels.iter().map(String::as_str).collect(),
            Entity::Fact(f) => f.dimensions.iter().map(|r| r.entity.as_str()).collect(),
            Entity::FactDimension(d) => vec![d.fact.as_str()],
        }
    }
}

impl From<Dimension> for Entity {
    fn from(d: Dimension) -> Self {
        Entity::Dimension(d)
    }
}

impl From<HierarchyDimension> for Entity {
    fn from(d: HierarchyDimension) -> Self {
        Entity::HierarchyDimension(d)
    }
}

impl From<Fact> for Entity {
    fn from(f: Fact) -> Self {
        Entity::Fact(f)
    }
}

impl From<FactDimension> for Entity {
    fn from(d: FactDimension) -> Self {
        Entity::FactDimension(d)
    }
}
