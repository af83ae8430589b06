//! Error types for the toolkit.
//!
//! Two layers mirror the two phases of a pipeline's life:
//!
//! - [`ModelError`]: configuration errors, raised while building the model
//!   registry or initializing mappers. These are always programmer/config
//!   mistakes and never silently defaulted.
//! - [`EtlError`]: runtime errors, raised per message while processing or
//!   storing. Wraps [`ModelError`] and backend errors so node code can use a
//!   single `?` chain.

use thiserror::Error;

/// Result type for model construction and validation.
pub type ModelResult<T> = Result<T, ModelError>;

/// Result type for pipeline runtime operations.
pub type EtlResult<T> = Result<T, EtlError>;

/// Configuration errors, detected at registry build or mapper initialize.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    /// Two entities declared with the same name.
    #[error("duplicate entity '{0}' in model registry")]
    DuplicateEntity(String),

    /// Referenced an entity that doesn't exist.
    #[error("unknown entity '{0}'")]
    UnknownEntity(String),

    /// An entity reference points at the wrong kind of entity.
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    /// A hierarchy names a level the dimension never declared.
    #[error("hierarchy '{hierarchy}' on dimension '{dimension}' references undeclared level '{level}'")]
    UnknownLevel {
        dimension: String,
        hierarchy: String,
        level: String,
    },

    /// Attributes declared on an entity kind that cannot carry them
    /// (hierarchy dimensions and fact dimensions).
    #[error("entity '{entity}' cannot declare attributes: {reason}")]
    IllegalAttributes { entity: String, reason: String },

    /// The entity reference graph contains a cycle.
    #[error("entity reference cycle: {}", .0.join(" -> "))]
    ModelCycle(Vec<String>),

    /// The same entity resolves through more than one mapper in scope.
    #[error("entity '{entity}' is mapped more than once in scope '{scope}'")]
    DuplicateMapper { entity: String, scope: String },

    /// No mapper found for an entity in the resolution scope.
    #[error("no mapper found for entity '{0}'")]
    UnknownMapper(String),

    /// More than one column mapping is flagged as primary key.
    #[error("entity '{entity}' has more than one primary key mapping ('{first}' and '{second}')")]
    DuplicatePrimaryKey {
        entity: String,
        first: String,
        second: String,
    },

    /// Two mappings resolve to the same column on the same table.
    #[error("duplicate column '{column}' on table '{table}'")]
    DuplicateColumn { table: String, column: String },

    /// Two mappings declare the same logical path.
    #[error("duplicate mapping path '{urn}' on entity '{entity}'")]
    DuplicateUrn { entity: String, urn: String },
}

/// Runtime errors, raised per message or at component lifecycle edges.
#[derive(Error, Debug)]
pub enum EtlError {
    /// Configuration error surfaced at runtime (e.g. lazy mapper resolution).
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Backend error from the relational layer, surfaced unchanged.
    #[error("SQL backend error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// An embedded expression failed to compile or evaluate.
    #[error("expression error in component '{component}': {source} (expression: {expression})")]
    Expr {
        expression: String,
        component: String,
        #[source]
        source: mlua::Error,
    },

    /// A message lacks a field a mapping needs to assemble a row.
    #[error("missing field '{field}' required by mapping '{mapping}'")]
    MissingField { field: String, mapping: String },

    /// A supposedly unique lookup matched more than one row.
    #[error("ambiguous lookup on table '{table}' ({criteria}): more than one row matched")]
    AmbiguousLookup { table: String, criteria: String },

    /// A component was used outside its initialize/finalize window.
    #[error("component '{component}' {problem}")]
    Lifecycle { component: String, problem: String },

    /// A value had the wrong shape for the operation.
    #[error("type error: {0}")]
    Type(String),

    /// Configuration file could not be parsed.
    #[error("configuration parse error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EtlError {
    /// Shorthand for a lifecycle violation.
    pub fn lifecycle(component: impl Into<String>, problem: impl Into<String>) -> Self {
        Self::Lifecycle {
            component: component.into(),
            problem: problem.into(),
        }
    }
}
