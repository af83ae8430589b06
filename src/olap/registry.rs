//! Two-pass model registry.
//!
//! Pass one collects entity declarations keyed by name, rejecting
//! duplicates. Pass two resolves every cross-reference, validates
//! hierarchies, and runs cycle detection over the reference graph so that
//! later recursive algorithms (mapping generation, store) can assume a
//! finite DAG without runtime guards.

use std::collections::HashMap;

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::error::{ModelError, ModelResult};
use crate::olap::entity::{Dimension, Entity, Fact};

/// A flattened, path-qualified dimension reference.
///
/// Hierarchy levels surface as `[alias, level]` paths because downstream
/// export formats have no notion of nested dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatDimensionRef {
    pub path: Vec<String>,
    pub entity: String,
    pub label: String,
}

impl FlatDimensionRef {
    /// Dotted form of the path, used as a stable identifier.
    pub fn urn(&self) -> String {
        self.path.join(".")
    }
}

/// Collects entity declarations before resolution.
#[derive(Default)]
pub struct RegistryBuilder {
    entities: Vec<Entity>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, entity: impl Into<Entity>) -> Self {
        self.entities.push(entity.into());
        self
    }

    /// Resolve and validate the collected declarations.
    pub fn build(self) -> ModelResult<ModelRegistry> {
        let mut by_name: HashMap<String, Entity> = HashMap::new();
        let mut order = Vec::with_capacity(self.entities.len());
        for entity in self.entities {
            let name = entity.name().to_string();
            if by_name.contains_key(&name) {
                return Err(ModelError::DuplicateEntity(name));
            }
            order.push(name.clone());
            by_name.insert(name, entity);
        }

        let registry = ModelRegistry { by_name, order };
        registry.resolve_references()?;
        registry.detect_cycles()?;
        Ok(registry)
    }
}

/// Resolved, validated entity registry.
#[derive(Debug)]
pub struct ModelRegistry {
    by_name: HashMap<String, Entity>,
    order: Vec<String>,
}

impl ModelRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn get(&self, name: &str) -> ModelResult<&Entity> {
        self.by_name
            .get(name)
            .ok_or_else(|| ModelError::UnknownEntity(name.to_string()))
    }

    /// Entity names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.order.iter().map(|n| &self.by_name[n])
    }

    pub fn fact(&self, name: &str) -> ModelResult<&Fact> {
        match self.get(name)? {
            Entity::Fact(f) => Ok(f),
            other => Err(ModelError::InvalidReference(format!(
                "'{}' is not a fact",
                other.name()
            ))),
        }
    }

    pub fn dimension(&self, name: &str) -> ModelResult<&Dimension> {
        match self.get(name)? {
            Entity::Dimension(d) => Ok(d),
            other => Err(ModelError::InvalidReference(format!(
                "'{}' is not a plain dimension",
                other.name()
            ))),
        }
    }

    /// The fact ultimately backing an entity: the fact itself, or the
    /// target of a fact-dimension.
    pub fn backing_fact(&self, name: &str) -> ModelResult<&Fact> {
        match self.get(name)? {
            Entity::Fact(f) => Ok(f),
            Entity::FactDimension(fd) => self.fact(&fd.fact),
            other => Err(ModelError::InvalidReference(format!(
                "'{}' is not backed by a fact",
                other.name()
            ))),
        }
    }

    /// Flattened dimension list of a fact, hierarchy levels expanded to
    /// path-qualified entries.
    pub fn dimensions_recursively(&self, fact: &Fact) -> ModelResult<Vec<FlatDimensionRef>> {
        let mut out = Vec::new();
        for dref in &fact.dimensions {
            match self.get(&dref.entity)? {
                Entity::HierarchyDimension(hd) => {
                    for level in &hd.levels {
                        let level_entity = self.get(level)?;
                        out.push(FlatDimensionRef {
                            path: vec![dref.alias().to_string(), level.clone()],
                            entity: level.clone(),
                            label: level_entity.label().to_string(),
                        });
                    }
                }
                entity => out.push(FlatDimensionRef {
                    path: vec![dref.alias().to_string()],
                    entity: dref.entity.clone(),
                    label: if dref.label.is_some() {
                        dref.label().to_string()
                    } else {
                        entity.label().to_string()
                    },
                }),
            }
        }
        Ok(out)
    }

    fn resolve_references(&self) -> ModelResult<()> {
        for entity in self.entities() {
            match entity {
                Entity::Dimension(_) => {}
                Entity::HierarchyDimension(hd) => {
                    hd.validate()?;
                    for level in &hd.levels {
                        match self.get(level)? {
                            Entity::Dimension(_) => {}
                            other => {
                                return Err(ModelError::InvalidReference(format!(
                                    "level '{}' of hierarchy dimension '{}' must be a plain dimension, found '{}'",
                                    level,
                                    hd.name,
                                    other.name()
                                )))
                            }
                        }
                    }
                }
                Entity::Fact(f) => {
                    for dref in &f.dimensions {
                        match self.get(&dref.entity)? {
                            Entity::Fact(other) => {
                                return Err(ModelError::InvalidReference(format!(
                                    "fact '{}' references fact '{}' directly; use a fact dimension",
                                    f.name, other.name
                                )))
                            }
                            _ => {}
                        }
                    }
                }
                Entity::FactDimension(fd) => {
                    self.fact(&fd.fact)?;
                }
            }
        }
        Ok(())
    }

    fn detect_cycles(&self) -> ModelResult<()> {
        let mut graph: DiGraph<String, ()> = DiGraph::new();
        let mut index: HashMap<&str, NodeIndex> = HashMap::new();
        for name in &self.order {
            index.insert(name, graph.add_node(name.clone()));
        }
        for entity in self.entities() {
            let from = index[entity.name()];
            for referenced in entity.references() {
                // Unknown names were already rejected by reference resolution.
                if let Some(&to) = index.get(referenced) {
                    graph.add_edge(from, to, ());
                }
            }
        }

        for scc in tarjan_scc(&graph) {
            let cyclic = scc.len() > 1
                || (scc.len() == 1 && graph.contains_edge(scc[0], scc[0]));
            if cyclic {
                let mut names: Vec<String> = scc.iter().map(|&n| graph[n].clone()).collect();
                names.reverse();
                // Repeat the entry node so the rendered chain closes.
                if let Some(first) = names.first().cloned() {
                    names.push(first);
                }
                return Err(ModelError::ModelCycle(names));
            }
        }
        Ok(())
    }
}
