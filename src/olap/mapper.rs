//! Entity-to-relational mapping.
//!
//! An [`OlapMapper`] is a named scope of per-entity mappers (plus nested
//! included scopes) that compiles the entity model into relational terms:
//! column mappings (`sql_mappings`), join paths (`sql_joins`), primary-key
//! resolution (`pk_of`) and the storage operation (`store`).
//!
//! Mapper kinds form a closed set:
//!
//! - [`MapperKind::Table`]: entity rows live in their own table.
//! - [`MapperKind::Embedded`]: the entity's attributes are folded into the
//!   referencing table's row, avoiding a join.
//! - [`MapperKind::FactDimension`]: the entity resolves through a
//!   foreign-key column into another fact's table.
//!
//! Recursion through embedded and fact-dimension references terminates
//! because the registry rejects reference cycles at build time.

use std::collections::HashSet;
use std::rc::Rc;

use chrono::Datelike;
use log::debug;
use once_cell::unsync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::error::{EtlError, EtlResult, ModelError, ModelResult};
use crate::olap::registry::ModelRegistry;
use crate::olap::entity::Entity;
use crate::olap::schema;
use crate::runtime::context::Context;
use crate::runtime::message::{Message, Value};
use crate::runtime::node::Component;
use crate::sql::table::{Criteria, Criterion, SqlTable};
use crate::sql::backend::SqlBackend;
use crate::sql::table::StatsCollector;
use crate::sql::types::ColumnType;

/// Named date-part extraction function for derived mappings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatePart {
    Year,
    Month,
    Day,
    Week,
}

impl DatePart {
    pub const ALL: [DatePart; 4] = [DatePart::Year, DatePart::Month, DatePart::Day, DatePart::Week];

    pub fn tag(&self) -> &'static str {
        match self {
            DatePart::Year => "year",
            DatePart::Month => "month",
            DatePart::Day => "day",
            DatePart::Week => "week",
        }
    }

    /// Extract this part from a date or datetime value.
    pub fn extract(&self, value: &Value) -> EtlResult<Value> {
        let date = match value {
            Value::Date(d) => *d,
            Value::DateTime(dt) => dt.date(),
            other => {
                return Err(EtlError::Type(format!(
                    "cannot extract {} from {} value",
                    self.tag(),
                    other.type_name()
                )))
            }
        };
        let part = match self {
            DatePart::Year => date.year() as i64,
            DatePart::Month => date.month() as i64,
            DatePart::Day => date.day() as i64,
            DatePart::Week => date.iso_week().week() as i64,
        };
        Ok(Value::Int(part))
    }
}

/// How a table mapper writes rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreMode {
    /// Lookup by key, insert when absent, never update. Default for
    /// dimensions; divergence on a hit warns once per column.
    LookupOrInsert,
    /// Always insert a new row. Default for facts.
    Insert,
    /// Insert-or-update with the table's last-write-wins policy.
    Upsert,
}

/// An explicit column mapping declaration on a table mapper.
///
/// Declared mappings take precedence over generated ones for the same
/// path; undeclared fields are inherited from the entity's attribute.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MappingDecl {
    pub path: Vec<String>,
    #[serde(default)]
    pub column: Option<String>,
    #[serde(rename = "type", default)]
    pub column_type: Option<ColumnType>,
    #[serde(default)]
    pub pk: bool,
    #[serde(default)]
    pub function: Option<DatePart>,
    /// Expression template producing the stored value instead of a
    /// direct message-field read.
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
}

impl MappingDecl {
    pub fn new<I, S>(path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: path.into_iter().map(Into::into).collect(),
            column: None,
            column_type: None,
            pk: false,
            function: None,
            value: None,
            label: None,
        }
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn with_type(mut self, column_type: ColumnType) -> Self {
        self.column_type = Some(column_type);
        self
    }

    pub fn with_pk(mut self, pk: bool) -> Self {
        self.pk = pk;
        self
    }

    pub fn with_function(mut self, function: DatePart) -> Self {
        self.function = Some(function);
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

/// A resolved column mapping: one entity-attribute path bound to one
/// relational column.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlMapping {
    /// Entity-attribute path, alias-qualified through references.
    pub path: Vec<String>,
    /// Entity the mapped attribute belongs to.
    pub entity: String,
    /// Table (or join alias) the column lives on.
    pub table: String,
    pub column: String,
    pub column_type: ColumnType,
    pub pk: bool,
    /// Extraction function for derived mappings; derived mappings share
    /// their source column and are never stored or DDL'd.
    pub function: Option<DatePart>,
    /// Expression template overriding the message-field read.
    pub value: Option<String>,
    pub label: String,
}

impl SqlMapping {
    /// Dotted path, unique per table mapper.
    pub fn urn(&self) -> String {
        self.path.join(".")
    }
}

/// A join step between a master table (fact side) and a detail table
/// (dimension side).
#[derive(Debug, Clone, PartialEq)]
pub struct SqlJoin {
    pub master_entity: String,
    /// Table name or accumulated alias of the master side.
    pub master_table: String,
    pub master_column: String,
    pub detail_entity: String,
    pub detail_table: String,
    pub detail_column: String,
    /// Accumulated alias; repeated use of one physical table at
    /// different logical positions stays distinct.
    pub alias: String,
}

/// Storage strategy of one entity.
#[derive(Debug)]
pub enum MapperKind {
    Table {
        table: String,
        declared: Vec<MappingDecl>,
    },
    Embedded,
    FactDimension,
}

/// Binds one entity to a storage strategy within an [`OlapMapper`] scope.
#[derive(Debug)]
pub struct EntityMapper {
    entity: String,
    kind: MapperKind,
    store_mode: Option<StoreMode>,
    mappings: OnceCell<Rc<Vec<SqlMapping>>>,
    table: OnceCell<SqlTable>,
}

impl EntityMapper {
    pub fn table(entity: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            kind: MapperKind::Table {
                table: table.into(),
                declared: Vec::new(),
            },
            store_mode: None,
            mappings: OnceCell::new(),
            table: OnceCell::new(),
        }
    }

    pub fn embedded(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            kind: MapperKind::Embedded,
            store_mode: None,
            mappings: OnceCell::new(),
            table: OnceCell::new(),
        }
    }

    pub fn fact_dimension(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            kind: MapperKind::FactDimension,
            store_mode: None,
            mappings: OnceCell::new(),
            table: OnceCell::new(),
        }
    }

    pub fn with_mappings(mut self, decls: Vec<MappingDecl>) -> Self {
        if let MapperKind::Table { declared, .. } = &mut self.kind {
            *declared = decls;
        }
        self
    }

    pub fn with_store_mode(mut self, mode: StoreMode) -> Self {
        self.store_mode = Some(mode);
        self
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn kind(&self) -> &MapperKind {
        &self.kind
    }

    pub fn table_name(&self) -> Option<&str> {
        match &self.kind {
            MapperKind::Table { table, .. } => Some(table),
            _ => None,
        }
    }

    /// Resolved mappings, available after the owning scope initialized.
    pub fn mappings(&self) -> Option<Rc<Vec<SqlMapping>>> {
        self.mappings.get().cloned()
    }

    pub fn sql_table(&self) -> Option<&SqlTable> {
        self.table.get()
    }

    fn effective_store_mode(&self, entity: &Entity) -> StoreMode {
        self.store_mode.unwrap_or(match entity {
            Entity::Fact(_) => StoreMode::Insert,
            _ => StoreMode::LookupOrInsert,
        })
    }
}

/// Resolve the single primary-key mapping of a mapping list.
///
/// Zero is legal (no natural key enforced); two or more is a
/// configuration error raised immediately.
pub fn pk_of<'a>(entity: &str, mappings: &'a [SqlMapping]) -> ModelResult<Option<&'a SqlMapping>> {
    let mut found: Option<&SqlMapping> = None;
    for m in mappings {
        if !m.pk {
            continue;
        }
        match found {
            None => found = Some(m),
            Some(first) => {
                return Err(ModelError::DuplicatePrimaryKey {
                    entity: entity.to_string(),
                    first: first.urn(),
                    second: m.urn(),
                })
            }
        }
    }
    Ok(found)
}

/// Resolve the foreign-key column a fact's mappings use for a dimension
/// alias. Declared mappings may rename it away from `<alias>_id`, so
/// joins and key attachment both read the compiled mapping instead of
/// assuming the convention.
fn fk_column(mappings: &[SqlMapping], alias: &str) -> String {
    mappings
        .iter()
        .find(|m| m.function.is_none() && m.path.len() == 1 && m.path[0] == alias)
        .map(|m| m.column.clone())
        .unwrap_or_else(|| format!("{}_id", alias))
}

/// Join path segments into a column name, collapsing adjacent repeats so
/// a single-attribute dimension named after itself maps to one clean
/// column (`status.status` -> `status`).
fn splice(segments: &[String]) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for s in segments {
        if parts.last() != Some(&s.as_str()) {
            parts.push(s);
        }
    }
    parts.join("_")
}

/// Intermediate attribute mapping before table/column binding.
struct ProtoMapping {
    path: Vec<String>,
    /// Path the column name is derived from; differs from `path` for
    /// derived date-part mappings, which share their source column.
    column_path: Vec<String>,
    entity: String,
    column_type: ColumnType,
    label: String,
    function: Option<DatePart>,
}

/// A named scope of entity mappers.
///
/// Resolution is depth-first through included scopes, local mappers
/// first; the same entity reachable through two distinct mappers is a
/// configuration error.
#[derive(Debug)]
pub struct OlapMapper {
    name: String,
    component_name: String,
    registry: Rc<ModelRegistry>,
    backend: Rc<SqlBackend>,
    stats: Rc<StatsCollector>,
    mappers: Vec<Rc<EntityMapper>>,
    includes: Vec<Rc<OlapMapper>>,
}

impl OlapMapper {
    pub fn new(
        name: impl Into<String>,
        registry: Rc<ModelRegistry>,
        backend: Rc<SqlBackend>,
        stats: Rc<StatsCollector>,
    ) -> Self {
        let name = name.into();
        Self {
            component_name: format!("olapmapper.{}", name),
            name,
            registry,
            backend,
            stats,
            mappers: Vec::new(),
            includes: Vec::new(),
        }
    }

    pub fn with_mappers(mut self, mappers: Vec<EntityMapper>) -> Self {
        self.mappers = mappers.into_iter().map(Rc::new).collect();
        self
    }

    pub fn with_includes(mut self, includes: Vec<Rc<OlapMapper>>) -> Self {
        self.includes = includes;
        self
    }

    pub fn scope_name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn mappers(&self) -> &[Rc<EntityMapper>] {
        &self.mappers
    }

    pub fn includes(&self) -> &[Rc<OlapMapper>] {
        &self.includes
    }

    /// Resolve the mapper for an entity in this scope.
    pub fn resolve(&self, entity: &str) -> ModelResult<Rc<EntityMapper>> {
        self.try_resolve(entity)?
            .ok_or_else(|| ModelError::UnknownMapper(entity.to_string()))
    }

    fn try_resolve(&self, entity: &str) -> ModelResult<Option<Rc<EntityMapper>>> {
        let mut locals = self.mappers.iter().filter(|m| m.entity == entity);
        if let Some(found) = locals.next() {
            if locals.next().is_some() {
                return Err(ModelError::DuplicateMapper {
                    entity: entity.to_string(),
                    scope: self.name.clone(),
                });
            }
            return Ok(Some(found.clone()));
        }
        let mut found: Option<Rc<EntityMapper>> = None;
        for include in &self.includes {
            if let Some(m) = include.try_resolve(entity)? {
                match &found {
                    None => found = Some(m),
                    // A diamond include of the same mapper instance is fine.
                    Some(prev) if Rc::ptr_eq(prev, &m) => {}
                    Some(_) => {
                        return Err(ModelError::DuplicateMapper {
                            entity: entity.to_string(),
                            scope: self.name.clone(),
                        })
                    }
                }
            }
        }
        Ok(found)
    }

    /// Attribute mappings of an entity, unbound to any table.
    fn attribute_protos(&self, entity_name: &str) -> ModelResult<Vec<ProtoMapping>> {
        let mut out = Vec::new();
        match self.registry.get(entity_name)? {
            Entity::Dimension(d) => {
                for attr in &d.attributes {
                    out.push(ProtoMapping {
                        path: vec![attr.name.clone()],
                        column_path: vec![attr.name.clone()],
                        entity: d.name.clone(),
                        column_type: attr.data_type,
                        label: d.attribute_label(attr).to_string(),
                        function: None,
                    });
                    if attr.data_type.is_temporal() && attr.data_type != ColumnType::Time {
                        for part in DatePart::ALL {
                            out.push(ProtoMapping {
                                path: vec![attr.name.clone(), part.tag().to_string()],
                                column_path: vec![attr.name.clone()],
                                entity: d.name.clone(),
                                column_type: ColumnType::Integer,
                                label: format!("{} {}", d.attribute_label(attr), part.tag()),
                                function: Some(part),
                            });
                        }
                    }
                }
            }
            Entity::HierarchyDimension(hd) => {
                for level in &hd.levels {
                    for mut proto in self.attribute_protos(level)? {
                        proto.path.insert(0, level.clone());
                        proto.column_path.insert(0, level.clone());
                        out.push(proto);
                    }
                }
            }
            Entity::Fact(f) => {
                for attr in &f.attributes {
                    out.push(ProtoMapping {
                        path: vec![attr.name.clone()],
                        column_path: vec![attr.name.clone()],
                        entity: f.name.clone(),
                        column_type: attr.data_type,
                        label: attr.label().to_string(),
                        function: None,
                    });
                }
                for measure in &f.measures {
                    out.push(ProtoMapping {
                        path: vec![measure.name.clone()],
                        column_path: vec![measure.name.clone()],
                        entity: f.name.clone(),
                        column_type: measure.data_type,
                        label: measure.label().to_string(),
                        function: None,
                    });
                }
            }
            Entity::FactDimension(fd) => {
                return self.attribute_protos(&fd.fact);
            }
        }
        Ok(out)
    }

    /// The column type of a foreign key pointing at an entity's primary
    /// key. Generated surrogate keys reference as plain integers.
    fn fk_type(&self, target: &str) -> ModelResult<ColumnType> {
        let mappings = self.sql_mappings(target)?;
        Ok(match pk_of(target, &mappings)? {
            Some(pk) if pk.column_type.is_auto_increment() => ColumnType::Integer,
            Some(pk) => pk.column_type,
            None => ColumnType::Integer,
        })
    }

    fn resolve_decl(
        &self,
        entity: &str,
        table: &str,
        decl: &MappingDecl,
        protos: &[ProtoMapping],
    ) -> SqlMapping {
        let inherited = protos.iter().find(|p| p.path == decl.path);
        let column = decl
            .column
            .clone()
            .unwrap_or_else(|| splice(&decl.path));
        let column_type = decl
            .column_type
            .or_else(|| inherited.map(|p| p.column_type))
            .unwrap_or(ColumnType::String);
        let label = decl
            .label
            .clone()
            .or_else(|| inherited.map(|p| p.label.clone()))
            .unwrap_or_else(|| decl.path.join(" "));
        SqlMapping {
            path: decl.path.clone(),
            entity: entity.to_string(),
            table: table.to_string(),
            column,
            column_type,
            pk: decl.pk,
            function: decl.function.or_else(|| inherited.and_then(|p| p.function)),
            value: decl.value.clone(),
            label,
        }
    }

    /// Compile the full column-mapping list of an entity.
    ///
    /// Declared mappings come first and shadow generated ones for the
    /// same path (first definition wins); a surrogate auto-increment `id`
    /// primary key is generated when no mapping declares one.
    pub fn sql_mappings(&self, entity_name: &str) -> ModelResult<Vec<SqlMapping>> {
        let mapper = self.resolve(entity_name)?;
        match &mapper.kind {
            MapperKind::FactDimension => {
                let fact = self.registry.backing_fact(entity_name)?.name.clone();
                self.sql_mappings(&fact)
            }
            MapperKind::Embedded => {
                // Only meaningful spliced into a parent; standalone
                // resolution yields unbound (table-less) mappings.
                let protos = self.attribute_protos(entity_name)?;
                Ok(protos
                    .into_iter()
                    .map(|p| self.proto_to_mapping(p, ""))
                    .collect())
            }
            MapperKind::Table { table, declared } => {
                self.table_mappings(entity_name, table, declared)
            }
        }
    }

    fn proto_to_mapping(&self, proto: ProtoMapping, table: &str) -> SqlMapping {
        SqlMapping {
            column: splice(&proto.column_path),
            path: proto.path,
            entity: proto.entity,
            table: table.to_string(),
            column_type: proto.column_type,
            pk: false,
            function: proto.function,
            value: None,
            label: proto.label,
        }
    }

    fn table_mappings(
        &self,
        entity_name: &str,
        table: &str,
        declared: &[MappingDecl],
    ) -> ModelResult<Vec<SqlMapping>> {
        let entity = self.registry.get(entity_name)?;
        let protos = self.attribute_protos(entity_name)?;

        let mut out: Vec<SqlMapping> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for decl in declared {
            let mapping = self.resolve_decl(entity_name, table, decl, &protos);
            if !seen.insert(mapping.urn()) {
                return Err(ModelError::DuplicateUrn {
                    entity: entity_name.to_string(),
                    urn: mapping.urn(),
                });
            }
            out.push(mapping);
        }

        if !out.iter().any(|m| m.pk) {
            let surrogate = SqlMapping {
                path: vec!["id".to_string()],
                entity: entity_name.to_string(),
                table: table.to_string(),
                column: "id".to_string(),
                column_type: ColumnType::AutoIncrement,
                pk: true,
                function: None,
                value: None,
                label: "Id".to_string(),
            };
            if seen.insert(surrogate.urn()) {
                out.push(surrogate);
            }
        }

        for proto in protos {
            let mapping = self.proto_to_mapping(proto, table);
            if seen.insert(mapping.urn()) {
                out.push(mapping);
            }
        }

        if let Entity::Fact(fact) = entity {
            for dref in &fact.dimensions {
                let alias = dref.alias().to_string();
                let dim_mapper = self.resolve(&dref.entity)?;
                match &dim_mapper.kind {
                    MapperKind::Embedded => {
                        for mut proto in self.attribute_protos(&dref.entity)? {
                            proto.path.insert(0, alias.clone());
                            proto.column_path.insert(0, alias.clone());
                            let mapping = self.proto_to_mapping(proto, table);
                            if seen.insert(mapping.urn()) {
                                out.push(mapping);
                            }
                        }
                    }
                    MapperKind::Table { .. } => {
                        let fk = SqlMapping {
                            path: vec![alias.clone()],
                            entity: dref.entity.clone(),
                            table: table.to_string(),
                            column: format!("{}_id", alias),
                            column_type: self.fk_type(&dref.entity)?,
                            pk: false,
                            function: None,
                            value: None,
                            label: dref.label().to_string(),
                        };
                        if seen.insert(fk.urn()) {
                            out.push(fk);
                        }
                    }
                    MapperKind::FactDimension => {
                        let target = self.registry.backing_fact(&dref.entity)?.name.clone();
                        let target_mapper = self.resolve(&target)?;
                        let target_table = target_mapper.table_name().ok_or_else(|| {
                            ModelError::InvalidReference(format!(
                                "fact '{}' backing fact dimension '{}' has no table mapper",
                                target, dref.entity
                            ))
                        })?;
                        let target_mappings = self.sql_mappings(&target)?;

                        let fk = SqlMapping {
                            path: vec![alias.clone()],
                            entity: dref.entity.clone(),
                            table: table.to_string(),
                            column: format!("{}_id", alias),
                            column_type: match pk_of(&target, &target_mappings)? {
                                Some(pk) if pk.column_type.is_auto_increment() => {
                                    ColumnType::Integer
                                }
                                Some(pk) => pk.column_type,
                                None => ColumnType::Integer,
                            },
                            pk: false,
                            function: None,
                            value: None,
                            label: dref.label().to_string(),
                        };
                        if seen.insert(fk.urn()) {
                            out.push(fk);
                        }

                        // Splice the target fact's mappings, path-prefixed
                        // through this alias, tables rewritten to the
                        // accumulated join alias.
                        for m in target_mappings {
                            let mut spliced = m.clone();
                            spliced.path.insert(0, alias.clone());
                            spliced.pk = false;
                            spliced.value = None;
                            spliced.table = if m.table == target_table {
                                alias.clone()
                            } else {
                                format!("{}_{}", alias, m.table)
                            };
                            if seen.insert(spliced.urn()) {
                                out.push(spliced);
                            }
                        }
                    }
                }
            }
        }

        Ok(out)
    }

    /// Compile the join-path list of an entity, dependency ordered: the
    /// join introducing an alias precedes every join referencing it.
    pub fn sql_joins(&self, entity_name: &str) -> ModelResult<Vec<SqlJoin>> {
        let mapper = self.resolve(entity_name)?;
        let table = match mapper.table_name() {
            Some(t) => t.to_string(),
            None => return Ok(Vec::new()),
        };
        let mut out = Vec::new();
        self.joins_into(entity_name, &table, None, &mut out)?;
        Ok(out)
    }

    fn joins_into(
        &self,
        entity_name: &str,
        master_table: &str,
        alias_prefix: Option<&str>,
        out: &mut Vec<SqlJoin>,
    ) -> ModelResult<()> {
        let fact = match self.registry.get(entity_name)? {
            Entity::Fact(f) => f,
            _ => return Ok(()),
        };
        let master_mappings = self.sql_mappings(entity_name)?;
        for dref in &fact.dimensions {
            let local_alias = dref.alias();
            let alias = match alias_prefix {
                Some(prefix) => format!("{}_{}", prefix, local_alias),
                None => local_alias.to_string(),
            };
            let dim_mapper = self.resolve(&dref.entity)?;
            match &dim_mapper.kind {
                MapperKind::Embedded => {}
                MapperKind::Table { table: detail, .. } => {
                    let mappings = self.sql_mappings(&dref.entity)?;
                    let detail_column = pk_of(&dref.entity, &mappings)?
                        .map(|m| m.column.clone())
                        .unwrap_or_else(|| "id".to_string());
                    out.push(SqlJoin {
                        master_entity: entity_name.to_string(),
                        master_table: master_table.to_string(),
                        master_column: fk_column(&master_mappings, local_alias),
                        detail_entity: dref.entity.clone(),
                        detail_table: detail.clone(),
                        detail_column,
                        alias,
                    });
                }
                MapperKind::FactDimension => {
                    let target = self.registry.backing_fact(&dref.entity)?.name.clone();
                    let target_mapper = self.resolve(&target)?;
                    let detail_table = target_mapper.table_name().ok_or_else(|| {
                        ModelError::InvalidReference(format!(
                            "fact '{}' backing fact dimension '{}' has no table mapper",
                            target, dref.entity
                        ))
                    })?;
                    let target_mappings = self.sql_mappings(&target)?;
                    let detail_column = pk_of(&target, &target_mappings)?
                        .map(|m| m.column.clone())
                        .unwrap_or_else(|| "id".to_string());
                    out.push(SqlJoin {
                        master_entity: entity_name.to_string(),
                        master_table: master_table.to_string(),
                        master_column: fk_column(&master_mappings, local_alias),
                        detail_entity: dref.entity.clone(),
                        detail_table: detail_table.to_string(),
                        detail_column,
                        alias: alias.clone(),
                    });
                    self.joins_into(&target, &alias, Some(&alias), out)?;
                }
            }
        }
        Ok(())
    }

    fn validate_columns(&self, table: &str, mappings: &[SqlMapping]) -> ModelResult<()> {
        let mut seen = HashSet::new();
        for m in mappings {
            if m.table != table || m.function.is_some() {
                continue;
            }
            if !seen.insert(m.column.as_str()) {
                return Err(ModelError::DuplicateColumn {
                    table: table.to_string(),
                    column: m.column.clone(),
                });
            }
        }
        Ok(())
    }

    fn initialized_mapper(&self, entity: &str) -> EtlResult<Rc<EntityMapper>> {
        let mapper = self.resolve(entity)?;
        // Embedded and fact-dimension mappers compile no state of their
        // own; storage delegates through them to a table mapper.
        if matches!(mapper.kind, MapperKind::Table { .. }) && mapper.mappings.get().is_none() {
            return Err(EtlError::lifecycle(
                format!("mapper.{}", entity),
                "used before initialize",
            ));
        }
        Ok(mapper)
    }

    /// Store a message's row for an entity; returns the looked-up or
    /// generated primary-key value.
    ///
    /// For facts, every referenced non-embedded dimension is stored first
    /// and its key attached to the message under the fact's foreign-key
    /// column (`<alias>_id` unless a declared mapping renames it), so the
    /// fact's own foreign-key columns resolve from the message.
    pub fn store(&self, ctx: &Context, entity_name: &str, msg: &mut Message) -> EtlResult<Value> {
        let mapper = self.initialized_mapper(entity_name)?;
        match &mapper.kind {
            MapperKind::Embedded => Err(EtlError::Type(format!(
                "entity '{}' is embedded and stores through its parent",
                entity_name
            ))),
            MapperKind::FactDimension => {
                let fact = self.registry.backing_fact(entity_name)?.name.clone();
                self.store(ctx, &fact, msg)
            }
            MapperKind::Table { table, .. } => {
                let entity = self.registry.get(entity_name)?.clone();
                let table_name = table.clone();
                let mappings = mapper.mappings().ok_or_else(|| {
                    EtlError::lifecycle(format!("mapper.{}", entity_name), "used before initialize")
                })?;
                let sql_table = mapper.sql_table().ok_or_else(|| {
                    EtlError::lifecycle(format!("mapper.{}", entity_name), "used before initialize")
                })?;

                if let Entity::Fact(fact) = &entity {
                    for dref in &fact.dimensions {
                        let dim_mapper = self.resolve(&dref.entity)?;
                        if matches!(dim_mapper.kind, MapperKind::Embedded) {
                            continue;
                        }
                        let key = self.store(ctx, &dref.entity, msg)?;
                        // Attach under the compiled fk column so renamed
                        // foreign keys resolve from the message.
                        msg.insert(fk_column(&mappings, dref.alias()), key);
                    }
                }

                let storable: Vec<&SqlMapping> = mappings
                    .iter()
                    .filter(|m| m.table == table_name && m.function.is_none())
                    .collect();
                let pk = pk_of(entity_name, &mappings)?;

                let key_columns: Vec<&SqlMapping> = match pk {
                    Some(p) if !p.column_type.is_auto_increment() => vec![p],
                    _ => storable
                        .iter()
                        .copied()
                        .filter(|m| !m.column_type.is_auto_increment())
                        .collect(),
                };

                let mut key_row = Message::new();
                for m in &key_columns {
                    let value = self.mapping_value(ctx, entity_name, m, msg)?.ok_or_else(|| {
                        EtlError::MissingField {
                            field: m.column.clone(),
                            mapping: format!("{}.{}", entity_name, m.urn()),
                        }
                    })?;
                    key_row.insert(m.column.clone(), value);
                }

                match mapper.effective_store_mode(&entity) {
                    StoreMode::LookupOrInsert => {
                        let criteria: Criteria = key_row
                            .iter()
                            .map(|(k, v)| (k.clone(), Criterion::Eq(v.clone())))
                            .collect();
                        if let Some(existing) = sql_table.lookup(&criteria)? {
                            debug!(
                                "entity '{}' hit existing row on '{}'",
                                entity_name, table_name
                            );
                            let partial =
                                self.assemble_row(ctx, entity_name, &storable, msg, false)?;
                            sql_table.warn_divergent(&existing, &partial);
                            return Ok(self.key_value(pk, &existing));
                        }
                        let row = self.assemble_row(ctx, entity_name, &storable, msg, true)?;
                        let merged = sql_table.insert(&row)?;
                        Ok(self.key_value(pk, &merged))
                    }
                    StoreMode::Insert => {
                        let row = self.assemble_row(ctx, entity_name, &storable, msg, true)?;
                        let merged = sql_table.insert(&row)?;
                        Ok(self.key_value(pk, &merged))
                    }
                    StoreMode::Upsert => {
                        let row = self.assemble_row(ctx, entity_name, &storable, msg, true)?;
                        let keys: Vec<String> =
                            key_columns.iter().map(|m| m.column.clone()).collect();
                        let merged = sql_table.upsert(&row, &keys)?;
                        Ok(self.key_value(pk, &merged))
                    }
                }
            }
        }
    }

    fn key_value(&self, pk: Option<&SqlMapping>, row: &Message) -> Value {
        pk.and_then(|p| row.get(&p.column).cloned())
            .unwrap_or(Value::Null)
    }

    /// Resolve a mapping's value: the `value` expression when declared,
    /// otherwise the message field named after the column.
    fn mapping_value(
        &self,
        ctx: &Context,
        entity: &str,
        mapping: &SqlMapping,
        msg: &Message,
    ) -> EtlResult<Option<Value>> {
        if let Some(template) = &mapping.value {
            let component = format!("mapper.{}", entity);
            return Ok(Some(ctx.eval(template, msg, &component)?));
        }
        Ok(msg.get(&mapping.column).cloned())
    }

    /// Assemble a row from the message. With `required` set, a missing
    /// non-auto-increment column is an error naming the mapping;
    /// otherwise missing columns are left out (divergence comparison).
    fn assemble_row(
        &self,
        ctx: &Context,
        entity: &str,
        storable: &[&SqlMapping],
        msg: &Message,
        required: bool,
    ) -> EtlResult<Message> {
        let mut row = Message::new();
        for m in storable {
            if m.column_type.is_auto_increment() {
                continue;
            }
            match self.mapping_value(ctx, entity, m, msg)? {
                Some(value) => {
                    row.insert(m.column.clone(), value);
                }
                None if required => {
                    return Err(EtlError::MissingField {
                        field: m.column.clone(),
                        mapping: format!("{}.{}", entity, m.urn()),
                    })
                }
                None => {}
            }
        }
        Ok(row)
    }
}

impl Component for OlapMapper {
    fn name(&self) -> &str {
        &self.component_name
    }

    /// Compile and validate every local table mapper, creating its
    /// backing table; included scopes initialize first.
    fn initialize(&self, ctx: &Context) -> EtlResult<()> {
        for include in &self.includes {
            ctx.initialize(include.as_ref())?;
        }
        for mapper in &self.mappers {
            let table_name = match mapper.table_name() {
                Some(t) => t.to_string(),
                None => continue,
            };
            let mappings = self.sql_mappings(&mapper.entity)?;
            pk_of(&mapper.entity, &mappings)?;
            self.validate_columns(&table_name, &mappings)?;

            let columns = schema::columns_for(&table_name, &mappings);
            let table = SqlTable::new(
                table_name,
                columns,
                self.backend.clone(),
                self.stats.clone(),
            );
            let _ = mapper.mappings.set(Rc::new(mappings));
            let _ = mapper.table.set(table);
            if let Some(table) = mapper.table.get() {
                ctx.initialize(table)?;
            }
        }
        Ok(())
    }

    fn finalize(&self, ctx: &Context) -> EtlResult<()> {
        for mapper in self.mappers.iter().rev() {
            if let Some(table) = mapper.table.get() {
                ctx.finalize(table)?;
            }
        }
        for include in self.includes.iter().rev() {
            ctx.finalize(include.as_ref())?;
        }
        self.stats.report();
        Ok(())
    }
}
