//! Embedded relational backend.
//!
//! Wraps a SQLite connection behind the four primitives the table
//! abstraction needs: table-exists, table-create, parameterized select and
//! parameterized insert/update. The connection opens lazily on first use
//! and is reused for the remainder of the run.

use std::path::PathBuf;
use std::rc::Rc;

use log::debug;
use once_cell::unsync::OnceCell;
use rusqlite::Connection;

use crate::error::{EtlError, EtlResult};
use crate::runtime::context::Context;
use crate::runtime::message::Message;
use crate::runtime::node::{Component, MessageStream, Node};
use crate::sql::types::ColumnType;

/// Quote an identifier for SQLite, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// A column discovered by catalog introspection.
#[derive(Debug, Clone)]
pub struct IntrospectedColumn {
    pub name: String,
    pub column_type: ColumnType,
    pub pk: bool,
    pub not_null: bool,
}

/// A foreign key discovered by catalog introspection.
#[derive(Debug, Clone)]
pub struct ForeignKey {
    pub from_column: String,
    pub ref_table: String,
    pub ref_column: Option<String>,
}

/// Lazily opened SQLite backend shared by the tables of a run.
#[derive(Debug)]
pub struct SqlBackend {
    path: Option<PathBuf>,
    conn: OnceCell<Connection>,
}

impl SqlBackend {
    /// Backend over a database file. The file is created on first use.
    pub fn open(path: impl Into<PathBuf>) -> Rc<Self> {
        Rc::new(Self {
            path: Some(path.into()),
            conn: OnceCell::new(),
        })
    }

    /// In-memory backend, used by tests and throwaway runs.
    pub fn in_memory() -> Rc<Self> {
        Rc::new(Self {
            path: None,
            conn: OnceCell::new(),
        })
    }

    /// The live connection, opened on first call.
    pub(crate) fn conn(&self) -> EtlResult<&Connection> {
        self.conn
            .get_or_try_init(|| {
                debug!(
                    "opening SQLite connection ({})",
                    self.path
                        .as_ref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "in-memory".to_string())
                );
                match &self.path {
                    Some(p) => Connection::open(p),
                    None => Connection::open_in_memory(),
                }
            })
            .map_err(EtlError::from)
    }

    pub fn table_exists(&self, name: &str) -> EtlResult<bool> {
        let count: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
            [name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn execute_ddl(&self, sql: &str) -> EtlResult<()> {
        debug!("ddl: {}", sql);
        self.conn()?.execute_batch(sql)?;
        Ok(())
    }

    /// All user tables in the catalog.
    pub fn tables(&self) -> EtlResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// Column metadata for a table, in declaration order.
    pub fn table_info(&self, table: &str) -> EtlResult<Vec<IntrospectedColumn>> {
        let conn = self.conn()?;
        let sql = format!("PRAGMA table_info({})", quote_ident(table));
        let mut stmt = conn.prepare(&sql)?;
        let cols = stmt
            .query_map([], |row| {
                let name: String = row.get("name")?;
                let decl: String = row.get("type")?;
                let not_null: i64 = row.get("notnull")?;
                let pk: i64 = row.get("pk")?;
                Ok(IntrospectedColumn {
                    name,
                    column_type: ColumnType::from_decl(&decl),
                    pk: pk > 0,
                    not_null: not_null != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(cols)
    }

    /// Foreign keys declared on a table.
    pub fn foreign_keys(&self, table: &str) -> EtlResult<Vec<ForeignKey>> {
        let conn = self.conn()?;
        let sql = format!("PRAGMA foreign_key_list({})", quote_ident(table));
        let mut stmt = conn.prepare(&sql)?;
        let fks = stmt
            .query_map([], |row| {
                Ok(ForeignKey {
                    from_column: row.get("from")?,
                    ref_table: row.get("table")?,
                    ref_column: row.get("to")?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(fks)
    }

    pub fn begin(&self) -> EtlResult<()> {
        self.execute_ddl("BEGIN")
    }

    pub fn commit(&self) -> EtlResult<()> {
        self.execute_ddl("COMMIT")
    }
}

/// Demarcates a single database transaction around a step sequence.
///
/// BEGIN on entry, COMMIT after the inner stream has been fully drained.
/// An error propagates past the node without an explicit rollback call;
/// recovery is left to the backend's own disconnect behavior.
pub struct Transaction {
    name: String,
    backend: Rc<SqlBackend>,
    steps: Vec<Rc<dyn Node>>,
}

impl Transaction {
    pub fn new(
        name: impl Into<String>,
        backend: Rc<SqlBackend>,
        steps: Vec<Rc<dyn Node>>,
    ) -> Self {
        Self {
            name: name.into(),
            backend,
            steps,
        }
    }
}

impl Component for Transaction {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&self, ctx: &Context) -> EtlResult<()> {
        for step in &self.steps {
            ctx.initialize(step.as_ref())?;
        }
        Ok(())
    }

    fn finalize(&self, ctx: &Context) -> EtlResult<()> {
        for step in self.steps.iter().rev() {
            ctx.finalize(step.as_ref())?;
        }
        Ok(())
    }
}

impl Node for Transaction {
    fn process<'a>(&'a self, ctx: &'a Context, msg: Message) -> EtlResult<MessageStream<'a>> {
        self.backend.begin()?;
        // The commit point requires the inner work to be complete, so the
        // stream is drained here rather than lazily.
        let mut pending: Vec<EtlResult<Message>> = vec![Ok(msg)];
        for step in &self.steps {
            let mut next = Vec::new();
            for item in pending {
                let m = item?;
                for out in ctx.process(step.as_ref(), m)? {
                    next.push(out);
                }
            }
            pending = next;
        }
        let outputs = pending.into_iter().collect::<EtlResult<Vec<_>>>()?;
        self.backend.commit()?;
        Ok(Box::new(outputs.into_iter().map(Ok)))
    }
}
