//! Schema-described relational tables.
//!
//! A [`SqlTable`] is declared with an explicit ordered column list and
//! created in the backing store on initialize (no migration support;
//! schema drift is out of scope). Operations are exact-match `find`,
//! unique `lookup`, `insert` with generated-key read-back, `update` and
//! `upsert`.
//!
//! Upsert conflicts follow a named policy: **last-write-wins,
//! warn-once-per-column**. Every diverging column is logged as a warning
//! exactly once for the table's lifetime, then the row is updated.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use chrono::{NaiveDate, NaiveDateTime};
use log::{info, warn};
use rusqlite::types::{ToSqlOutput, Value as SqliteValue, ValueRef};
use rusqlite::ToSql;

use crate::error::{EtlError, EtlResult, ModelError};
use crate::runtime::context::Context;
use crate::runtime::message::{Message, Value};
use crate::runtime::node::Component;
use crate::sql::backend::{quote_ident, SqlBackend};
use crate::sql::types::ColumnType;

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqliteValue::Null),
            Value::Bool(b) => ToSqlOutput::Owned(SqliteValue::Integer(*b as i64)),
            Value::Int(i) => ToSqlOutput::Owned(SqliteValue::Integer(*i)),
            Value::Float(f) => ToSqlOutput::Owned(SqliteValue::Real(*f)),
            Value::String(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Date(d) => {
                ToSqlOutput::Owned(SqliteValue::Text(d.format("%Y-%m-%d").to_string()))
            }
            Value::DateTime(dt) => {
                ToSqlOutput::Owned(SqliteValue::Text(dt.format("%Y-%m-%d %H:%M:%S").to_string()))
            }
            Value::Bytes(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
            Value::List(_) => {
                return Err(rusqlite::Error::ToSqlConversionFailure(
                    "cannot bind a list value to a SQL parameter".into(),
                ))
            }
        })
    }
}

/// Decode a SQLite value into a message value, guided by the declared
/// column type.
fn decode(raw: ValueRef<'_>, column_type: ColumnType) -> Value {
    match raw {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => match column_type {
            ColumnType::Boolean => Value::Bool(i != 0),
            ColumnType::Float => Value::Float(i as f64),
            _ => Value::Int(i),
        },
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes).to_string();
            match column_type {
                ColumnType::Date => NaiveDate::parse_from_str(&text, "%Y-%m-%d")
                    .map(Value::Date)
                    .unwrap_or(Value::String(text)),
                ColumnType::DateTime => {
                    NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S")
                        .map(Value::DateTime)
                        .unwrap_or(Value::String(text))
                }
                _ => Value::String(text),
            }
        }
        ValueRef::Blob(bytes) => Value::Bytes(bytes.to_vec()),
    }
}

/// Declaration of one table column.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlColumn {
    pub name: String,
    pub column_type: ColumnType,
    pub pk: bool,
    pub nullable: bool,
    pub label: String,
}

impl SqlColumn {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            column_type,
            pk: false,
            nullable: true,
        }
    }

    pub fn with_pk(mut self, pk: bool) -> Self {
        self.pk = pk;
        if pk {
            self.nullable = false;
        }
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

/// Per-table operation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableStats {
    pub selects: u64,
    pub inserts: u64,
    pub updates: u64,
}

/// Run-scoped statistics collector shared by every table of a run.
///
/// Passed by handle into each table instance and aggregated by the caller
/// at run end; nothing leaks across runs.
#[derive(Debug, Default)]
pub struct StatsCollector {
    tables: RefCell<HashMap<String, TableStats>>,
}

impl StatsCollector {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    fn bump(&self, table: &str, f: impl FnOnce(&mut TableStats)) {
        let mut tables = self.tables.borrow_mut();
        f(tables.entry(table.to_string()).or_default());
    }

    pub fn record_select(&self, table: &str) {
        self.bump(table, |s| s.selects += 1);
    }

    pub fn record_insert(&self, table: &str) {
        self.bump(table, |s| s.inserts += 1);
    }

    pub fn record_update(&self, table: &str) {
        self.bump(table, |s| s.updates += 1);
    }

    pub fn table(&self, table: &str) -> TableStats {
        self.tables.borrow().get(table).copied().unwrap_or_default()
    }

    /// Aggregate counters across every table of the run.
    pub fn totals(&self) -> TableStats {
        let tables = self.tables.borrow();
        let mut total = TableStats::default();
        for s in tables.values() {
            total.selects += s.selects;
            total.inserts += s.inserts;
            total.updates += s.updates;
        }
        total
    }

    /// Log per-table and aggregate counters.
    pub fn report(&self) {
        let tables = self.tables.borrow();
        let mut names: Vec<_> = tables.keys().collect();
        names.sort();
        for name in names {
            let s = tables[name.as_str()];
            info!(
                "table '{}': {} selects, {} inserts, {} updates",
                name, s.selects, s.inserts, s.updates
            );
        }
        drop(tables);
        let t = self.totals();
        info!(
            "run totals: {} selects, {} inserts, {} updates",
            t.selects, t.inserts, t.updates
        );
    }
}

/// One term of an exact-match criteria set.
#[derive(Debug, Clone, PartialEq)]
pub enum Criterion {
    Eq(Value),
    In(Vec<Value>),
}

/// AND-of-terms criteria, column name to term.
pub type Criteria = Vec<(String, Criterion)>;

fn criteria_summary(criteria: &Criteria) -> String {
    let parts: Vec<String> = criteria
        .iter()
        .map(|(col, term)| match term {
            Criterion::Eq(v) => format!("{} = {}", col, v),
            Criterion::In(vs) => format!("{} in [{} values]", col, vs.len()),
        })
        .collect();
    parts.join(" and ")
}

/// A schema-described table backed by the relational engine.
pub struct SqlTable {
    component_name: String,
    table_name: String,
    columns: Vec<SqlColumn>,
    backend: Rc<SqlBackend>,
    stats: Rc<StatsCollector>,
    warned_columns: RefCell<HashSet<String>>,
}

impl fmt::Debug for SqlTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlTable")
            .field("table", &self.table_name)
            .field("columns", &self.columns.len())
            .finish()
    }
}

impl SqlTable {
    pub fn new(
        table_name: impl Into<String>,
        columns: Vec<SqlColumn>,
        backend: Rc<SqlBackend>,
        stats: Rc<StatsCollector>,
    ) -> Self {
        let table_name = table_name.into();
        Self {
            component_name: format!("table.{}", table_name),
            table_name,
            columns,
            backend,
            stats,
            warned_columns: RefCell::new(HashSet::new()),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn columns(&self) -> &[SqlColumn] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&SqlColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Columns flagged as primary key.
    pub fn pk_columns(&self) -> Vec<&SqlColumn> {
        self.columns.iter().filter(|c| c.pk).collect()
    }

    /// The single auto-increment primary key, when the table has one.
    pub fn auto_pk(&self) -> Option<&SqlColumn> {
        let pks = self.pk_columns();
        match pks.as_slice() {
            [only] if only.column_type.is_auto_increment() => Some(only),
            _ => None,
        }
    }

    fn ddl(&self) -> String {
        let mut defs = Vec::with_capacity(self.columns.len());
        let pks = self.pk_columns();
        let inline_pk = pks.len() == 1;
        for col in &self.columns {
            let mut def = format!("{} {}", quote_ident(&col.name), col.column_type.sql_decl());
            if col.pk && inline_pk {
                def.push_str(" PRIMARY KEY");
                if col.column_type.is_auto_increment() {
                    def.push_str(" AUTOINCREMENT");
                }
            } else if !col.nullable {
                def.push_str(" NOT NULL");
            }
            defs.push(def);
        }
        if pks.len() > 1 {
            let names: Vec<String> = pks.iter().map(|c| quote_ident(&c.name)).collect();
            defs.push(format!("PRIMARY KEY ({})", names.join(", ")));
        }
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
            quote_ident(&self.table_name),
            defs.join(",\n  ")
        )
    }

    fn validate(&self) -> EtlResult<()> {
        let mut seen = HashSet::new();
        for col in &self.columns {
            if !seen.insert(col.name.as_str()) {
                return Err(ModelError::DuplicateColumn {
                    table: self.table_name.clone(),
                    column: col.name.clone(),
                }
                .into());
            }
        }
        Ok(())
    }

    fn select_list(&self) -> String {
        let names: Vec<String> = self.columns.iter().map(|c| quote_ident(&c.name)).collect();
        names.join(", ")
    }

    fn where_clause(criteria: &Criteria) -> (String, Vec<Value>) {
        if criteria.is_empty() {
            return (String::new(), Vec::new());
        }
        let mut terms = Vec::with_capacity(criteria.len());
        let mut params = Vec::new();
        for (col, term) in criteria {
            match term {
                Criterion::Eq(Value::Null) => {
                    terms.push(format!("{} IS NULL", quote_ident(col)));
                }
                Criterion::Eq(v) => {
                    terms.push(format!("{} = ?", quote_ident(col)));
                    params.push(v.clone());
                }
                Criterion::In(vs) => {
                    let marks = vec!["?"; vs.len()].join(", ");
                    terms.push(format!("{} IN ({})", quote_ident(col), marks));
                    params.extend(vs.iter().cloned());
                }
            }
        }
        (format!(" WHERE {}", terms.join(" AND ")), params)
    }

    fn query(&self, criteria: &Criteria, limit: Option<usize>) -> EtlResult<Vec<Message>> {
        let (where_sql, params) = Self::where_clause(criteria);
        let mut sql = format!(
            "SELECT {} FROM {}{}",
            self.select_list(),
            quote_ident(&self.table_name),
            where_sql
        );
        if let Some(n) = limit {
            sql.push_str(&format!(" LIMIT {}", n));
        }
        self.stats.record_select(&self.table_name);
        let conn = self.backend.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut msg = Message::new();
            for (i, col) in self.columns.iter().enumerate() {
                msg.insert(col.name.clone(), decode(row.get_ref(i)?, col.column_type));
            }
            out.push(msg);
        }
        Ok(out)
    }

    /// Rows matching an exact-match AND of all criteria.
    pub fn find(&self, criteria: &Criteria) -> EtlResult<Vec<Message>> {
        self.query(criteria, None)
    }

    /// Like find, but ambiguous matches are a hard error and zero matches
    /// return `None`.
    pub fn lookup(&self, criteria: &Criteria) -> EtlResult<Option<Message>> {
        let mut rows = self.query(criteria, Some(2))?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop()),
            _ => Err(EtlError::AmbiguousLookup {
                table: self.table_name.clone(),
                criteria: criteria_summary(criteria),
            }),
        }
    }

    /// Insert a full row; a generated surrogate key is read back and
    /// merged into the returned row.
    pub fn insert(&self, data: &Message) -> EtlResult<Message> {
        let mut names = Vec::new();
        let mut params: Vec<&Value> = Vec::new();
        for col in &self.columns {
            if col.column_type.is_auto_increment() && !data.contains_key(&col.name) {
                continue;
            }
            let value = data.get(&col.name).ok_or_else(|| EtlError::MissingField {
                field: col.name.clone(),
                mapping: self.table_name.clone(),
            })?;
            names.push(quote_ident(&col.name));
            params.push(value);
        }
        let sql = if names.is_empty() {
            // only an auto-increment column to fill
            format!("INSERT INTO {} DEFAULT VALUES", quote_ident(&self.table_name))
        } else {
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote_ident(&self.table_name),
                names.join(", "),
                vec!["?"; names.len()].join(", ")
            )
        };
        self.stats.record_insert(&self.table_name);
        let conn = self.backend.conn()?;
        conn.execute(&sql, rusqlite::params_from_iter(params.iter()))?;

        let mut merged = data.clone();
        if let Some(pk) = self.auto_pk() {
            if !merged.contains_key(&pk.name) {
                merged.insert(pk.name.clone(), Value::Int(conn.last_insert_rowid()));
            }
        }
        Ok(merged)
    }

    /// Update the rows matching `keys` (primary key columns when empty)
    /// with the non-key columns of `data`. Returns the affected row count.
    pub fn update(&self, data: &Message, keys: &[String]) -> EtlResult<usize> {
        let keys = self.effective_keys(keys);
        let mut sets = Vec::new();
        let mut params: Vec<&Value> = Vec::new();
        for col in &self.columns {
            if keys.contains(&col.name) || col.column_type.is_auto_increment() {
                continue;
            }
            if let Some(value) = data.get(&col.name) {
                sets.push(format!("{} = ?", quote_ident(&col.name)));
                params.push(value);
            }
        }
        if sets.is_empty() {
            // Nothing beyond the key columns to write.
            return Ok(0);
        }
        let mut wheres = Vec::new();
        for key in &keys {
            let value = data.get(key).ok_or_else(|| EtlError::MissingField {
                field: key.clone(),
                mapping: self.table_name.clone(),
            })?;
            wheres.push(format!("{} = ?", quote_ident(key)));
            params.push(value);
        }
        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            quote_ident(&self.table_name),
            sets.join(", "),
            wheres.join(" AND ")
        );
        self.stats.record_update(&self.table_name);
        let conn = self.backend.conn()?;
        let count = conn.execute(&sql, rusqlite::params_from_iter(params.iter()))?;
        Ok(count)
    }

    /// Insert-or-update by `keys` (primary key columns when empty).
    ///
    /// On a hit, every diverging non-auto column is warned once per table
    /// lifetime, then the row is updated (last-write-wins).
    pub fn upsert(&self, data: &Message, keys: &[String]) -> EtlResult<Message> {
        let keys = self.effective_keys(keys);
        let mut criteria = Criteria::new();
        for key in &keys {
            let value = data.get(key).ok_or_else(|| EtlError::MissingField {
                field: key.clone(),
                mapping: self.table_name.clone(),
            })?;
            criteria.push((key.clone(), Criterion::Eq(value.clone())));
        }
        match self.lookup(&criteria)? {
            Some(existing) => {
                self.warn_divergent(&existing, data);
                self.update(data, &keys)?;
                let mut merged = existing;
                for (k, v) in data {
                    merged.insert(k.clone(), v.clone());
                }
                Ok(merged)
            }
            None => self.insert(data),
        }
    }

    fn effective_keys(&self, keys: &[String]) -> Vec<String> {
        if keys.is_empty() {
            self.pk_columns().iter().map(|c| c.name.clone()).collect()
        } else {
            keys.to_vec()
        }
    }

    /// Compare incoming data against an existing row and warn, once per
    /// column, about any divergence. Does not modify anything.
    pub fn warn_divergent(&self, existing: &Message, data: &Message) {
        for col in &self.columns {
            if col.column_type.is_auto_increment() {
                continue;
            }
            let (Some(new), Some(old)) = (data.get(&col.name), existing.get(&col.name)) else {
                continue;
            };
            if new == old {
                continue;
            }
            if self.warned_columns.borrow_mut().insert(col.name.clone()) {
                warn!(
                    "table '{}': column '{}' diverges on matching row (existing: {}, incoming: {}); keeping policy for this table, further divergence on this column will not be re-warned",
                    self.table_name, col.name, old, new
                );
            }
        }
    }
}

impl Component for SqlTable {
    fn name(&self) -> &str {
        &self.component_name
    }

    fn initialize(&self, _ctx: &Context) -> EtlResult<()> {
        self.validate()?;
        if !self.backend.table_exists(&self.table_name)? {
            self.backend.execute_ddl(&self.ddl())?;
        }
        Ok(())
    }

    fn finalize(&self, _ctx: &Context) -> EtlResult<()> {
        let s = self.stats.table(&self.table_name);
        info!(
            "table '{}' finalized: {} selects, {} inserts, {} updates",
            self.table_name, s.selects, s.inserts, s.updates
        );
        Ok(())
    }
}
