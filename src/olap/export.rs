//! External OLAP-server model export.
//!
//! Walks a mapper scope through its public contract only (`sql_mappings`,
//! `sql_joins`, `pk_of`, the registry's flattened dimension queries) and
//! emits a `{"dimensions": [...], "cubes": [...]}` document. The target
//! format forbids nested dimensions, so hierarchy dimensions flatten to
//! two logical levels (dimension and level); deeper structure is lost.
//! Each measure carries the four synthesized aggregations plus a
//! cube-wide `record_count`.

use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

use log::{debug, info};
use serde_json::{json, Value as Json};

use crate::error::EtlResult;
use crate::olap::entity::{Dimension, Entity};
use crate::olap::mapper::{pk_of, OlapMapper};
use crate::runtime::context::Context;
use crate::runtime::message::Message;
use crate::runtime::node::{once_stream, Component, MessageStream, Node};

pub struct ModelExporter {
    name: String,
    mapper: Rc<OlapMapper>,
    path: Option<PathBuf>,
}

impl ModelExporter {
    pub fn new(name: impl Into<String>, mapper: Rc<OlapMapper>) -> Self {
        Self {
            name: name.into(),
            mapper,
            path: None,
        }
    }

    /// Also write the document to a file when processing.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    fn level_document(&self, dim: &Dimension) -> Json {
        let attributes: Vec<Json> = dim
            .attributes
            .iter()
            .map(|a| {
                json!({
                    "name": a.name,
                    "label": dim.attribute_label(a),
                    "type": a.data_type.to_string(),
                })
            })
            .collect();
        json!({
            "name": dim.name,
            "label": dim.label(),
            "attributes": attributes,
        })
    }

    fn dimension_documents(&self) -> EtlResult<Vec<Json>> {
        let registry = self.mapper.registry();
        let mut out = Vec::new();
        for entity in registry.entities() {
            match entity {
                Entity::Dimension(d) => {
                    let mut doc = self.level_document(d);
                    doc["levels"] = json!([self.level_document(d)]);
                    out.push(doc);
                }
                Entity::HierarchyDimension(hd) => {
                    let mut levels = Vec::new();
                    for level in &hd.levels {
                        levels.push(self.level_document(registry.dimension(level)?));
                    }
                    let hierarchies: Vec<Json> = hd
                        .hierarchies
                        .iter()
                        .map(|h| {
                            json!({
                                "name": h.name,
                                "label": h.label(),
                                "levels": h.levels,
                            })
                        })
                        .collect();
                    let mut doc = json!({
                        "name": hd.name,
                        "label": hd.label(),
                        "levels": levels,
                        "hierarchies": hierarchies,
                    });
                    // Date-role dimensions carry filter metadata; the
                    // finest hierarchy drives the filter's drill order.
                    if hd.role.as_deref() == Some("date") {
                        let mut info = json!({ "datefilter": true });
                        if let Some(finest) = hd.finest_hierarchy() {
                            info["datefilter_hierarchy"] = json!(finest.name);
                        }
                        doc["role"] = json!("date");
                        doc["info"] = info;
                    }
                    out.push(doc);
                }
                Entity::Fact(_) | Entity::FactDimension(_) => {}
            }
        }
        Ok(out)
    }

    fn cube_documents(&self) -> EtlResult<Vec<Json>> {
        let registry = self.mapper.registry();
        let mut out = Vec::new();
        for entity_mapper in self.mapper.mappers() {
            let table = match entity_mapper.table_name() {
                Some(t) => t.to_string(),
                None => continue,
            };
            let fact = match registry.get(entity_mapper.entity())? {
                Entity::Fact(f) => f,
                _ => continue,
            };

            let flat = registry.dimensions_recursively(fact)?;
            let dimension_names: Vec<String> = flat.iter().map(|f| f.urn()).collect();

            let mut measures: Vec<Json> = fact
                .measures
                .iter()
                .map(|m| {
                    json!({
                        "name": m.name,
                        "label": m.label(),
                        "aggregations": ["sum", "avg", "max", "min"],
                    })
                })
                .collect();
            measures.push(json!({
                "name": "record_count",
                "label": "Record Count",
                "aggregations": ["count"],
            }));

            let details: Vec<Json> = fact
                .attributes
                .iter()
                .map(|a| json!({ "name": a.name, "label": a.label() }))
                .collect();

            let joins: Vec<Json> = self
                .mapper
                .sql_joins(&fact.name)?
                .iter()
                .map(|j| {
                    json!({
                        "master": format!("{}.{}", j.master_table, j.master_column),
                        "detail": format!("{}.{}", j.detail_table, j.detail_column),
                        "alias": j.alias,
                    })
                })
                .collect();

            let mappings = self.mapper.sql_mappings(&fact.name)?;
            let key = pk_of(&fact.name, &mappings)?.map(|m| m.urn());
            let mut mapping_doc = serde_json::Map::new();
            for m in &mappings {
                let mut target = format!("{}.{}", m.table, m.column);
                if let Some(function) = m.function {
                    target = format!("{}({})", function.tag(), target);
                }
                mapping_doc.insert(m.urn(), json!(target));
            }

            out.push(json!({
                "name": fact.name,
                "label": fact.label(),
                "table": table,
                "key": key,
                "dimensions": dimension_names,
                "measures": measures,
                "details": details,
                "joins": joins,
                "mappings": mapping_doc,
            }));
        }
        Ok(out)
    }

    /// The full export document.
    pub fn model_document(&self) -> EtlResult<Json> {
        Ok(json!({
            "dimensions": self.dimension_documents()?,
            "cubes": self.cube_documents()?,
        }))
    }
}

impl Component for ModelExporter {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&self, ctx: &Context) -> EtlResult<()> {
        ctx.initialize(self.mapper.as_ref())
    }

    fn finalize(&self, ctx: &Context) -> EtlResult<()> {
        ctx.finalize(self.mapper.as_ref())
    }
}

impl Node for ModelExporter {
    fn process<'a>(&'a self, _ctx: &'a Context, msg: Message) -> EtlResult<MessageStream<'a>> {
        let doc = self.model_document()?;
        debug!("olap model document: {}", doc);
        if let Some(path) = &self.path {
            fs::write(path, serde_json::to_string_pretty(&doc)?)?;
            info!("olap model written to {}", path.display());
        }
        Ok(once_stream(msg))
    }
}
