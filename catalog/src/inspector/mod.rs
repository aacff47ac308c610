use std::fmt;

use async_trait::async_trait;

use crate::config::InspectorSettings;
use crate::model::{ConnectionConfig, Dialect};

pub mod mysql;
pub mod postgres;
pub mod sqlite;

pub use mysql::MySqlInspector;
pub use postgres::PostgresInspector;
pub use sqlite::SqliteInspector;

// ---------- raw catalog shapes ----------

#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    pub table_name: String,
    /// Engine spelling: "BASE TABLE", "VIEW", "table", "MATERIALIZED VIEW", ...
    pub table_type: String,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawColumn {
    pub table_name: String,
    pub column_name: String,
    /// As reported by the engine; may be absent, gapped or duplicated.
    pub ordinal_position: Option<i32>,
    /// Native type text, e.g. "character varying", "varchar(255)", "_int4".
    pub data_type: String,
    pub is_nullable: bool,
    pub column_default: Option<String>,
    pub max_length: Option<i32>,
    pub precision: Option<i32>,
    pub scale: Option<i32>,
}

/// A primary key or unique key: ordered column names under one constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct RawKey {
    pub table_name: String,
    pub constraint_name: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawForeignKey {
    pub table_name: String,
    pub constraint_name: String,
    pub columns: Vec<String>,
    /// None = same namespace as the owning table.
    pub referenced_schema: Option<String>,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
    pub on_delete: String,
    pub on_update: String,
}

/// How an engine matches the identifiers written inside a constraint
/// definition against the catalog's own spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameFolding {
    pub tables: bool,
    pub columns: bool,
}

impl NameFolding {
    pub const EXACT: NameFolding = NameFolding {
        tables: false,
        columns: false,
    };

    /// Engine defaults. MySQL table folding depends on
    /// `lower_case_table_names` and is settled by the inspector.
    pub fn for_dialect(dialect: Dialect) -> Self {
        match dialect {
            Dialect::Postgres => NameFolding::EXACT,
            Dialect::MySql => NameFolding {
                tables: false,
                columns: true,
            },
            Dialect::Sqlite => NameFolding {
                tables: true,
                columns: true,
            },
        }
    }
}

/// Everything one inspection pulled from a single namespace.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCatalog {
    pub dialect: Dialect,
    pub namespace: String,
    pub folding: NameFolding,
    pub tables: Vec<RawTable>,
    pub columns: Vec<RawColumn>,
    pub primary_keys: Vec<RawKey>,
    pub unique_keys: Vec<RawKey>,
    pub foreign_keys: Vec<RawForeignKey>,
}

impl RawCatalog {
    pub fn empty(dialect: Dialect, namespace: impl Into<String>) -> Self {
        Self {
            dialect,
            namespace: namespace.into(),
            folding: NameFolding::for_dialect(dialect),
            tables: vec![],
            columns: vec![],
            primary_keys: vec![],
            unique_keys: vec![],
            foreign_keys: vec![],
        }
    }
}

/// One row of a foreign-key listing: a single column pair of a constraint.
#[derive(Debug, Clone)]
pub(crate) struct ForeignKeyColumn {
    pub table_name: String,
    pub constraint_name: String,
    pub column: String,
    pub referenced_schema: Option<String>,
    pub referenced_table: String,
    pub referenced_column: String,
    pub on_delete: String,
    pub on_update: String,
}

/// Fold per-column FK rows (ordered by table, constraint, position) into
/// constraints. Rows of one constraint must be adjacent.
pub(crate) fn group_foreign_keys(rows: Vec<ForeignKeyColumn>) -> Vec<RawForeignKey> {
    let mut out: Vec<RawForeignKey> = Vec::new();
    for row in rows {
        match out.last_mut() {
            Some(fk)
                if fk.table_name == row.table_name
                    && fk.constraint_name == row.constraint_name =>
            {
                fk.columns.push(row.column);
                fk.referenced_columns.push(row.referenced_column);
            }
            _ => out.push(RawForeignKey {
                table_name: row.table_name,
                constraint_name: row.constraint_name,
                columns: vec![row.column],
                referenced_schema: row.referenced_schema,
                referenced_table: row.referenced_table,
                referenced_columns: vec![row.referenced_column],
                on_delete: row.on_delete,
                on_update: row.on_update,
            }),
        }
    }
    out
}

/// Fold (table, key name, column) rows into keys. A `None` column marks an
/// expression key part; such keys are skipped because their column list
/// would overstate uniqueness.
pub(crate) fn group_keys(rows: Vec<(String, String, Option<String>)>) -> Vec<RawKey> {
    let mut out: Vec<(RawKey, bool)> = Vec::new();
    for (table_name, constraint_name, column) in rows {
        let same = out.last().is_some_and(|(k, _)| {
            k.table_name == table_name && k.constraint_name == constraint_name
        });
        if !same {
            out.push((
                RawKey {
                    table_name,
                    constraint_name,
                    columns: vec![],
                },
                true,
            ));
        }
        if let Some((key, complete)) = out.last_mut() {
            match column {
                Some(c) => key.columns.push(c),
                None => *complete = false,
            }
        }
    }
    out.into_iter()
        .filter(|(k, complete)| *complete && !k.columns.is_empty())
        .map(|(k, _)| k)
        .collect()
}

// ---------- errors ----------

#[derive(Debug, Clone, PartialEq)]
pub enum InspectError {
    /// The source database could not be reached or refused the login.
    Connectivity { dialect: Dialect, message: String },
    /// The engine rejected a catalog query (privileges, unknown namespace, ...).
    CatalogQuery { dialect: Dialect, message: String },
}

impl InspectError {
    pub fn connectivity(dialect: Dialect, e: impl fmt::Display) -> Self {
        InspectError::Connectivity {
            dialect,
            message: e.to_string(),
        }
    }

    pub fn query(dialect: Dialect, e: impl fmt::Display) -> Self {
        InspectError::CatalogQuery {
            dialect,
            message: e.to_string(),
        }
    }

    pub fn unknown_namespace(dialect: Dialect, namespace: &str) -> Self {
        InspectError::CatalogQuery {
            dialect,
            message: format!("unknown namespace: {namespace}"),
        }
    }
}

impl fmt::Display for InspectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InspectError::Connectivity { dialect, message } => {
                write!(f, "Connection error ({dialect}): {message}")
            }
            InspectError::CatalogQuery { dialect, message } => {
                write!(f, "Catalog query error ({dialect}): {message}")
            }
        }
    }
}

impl std::error::Error for InspectError {}

/// Errors raised by the engine or while decoding its answer are query
/// failures; anything else (I/O, TLS, pool, protocol) means the session is gone.
pub(crate) fn classify_sqlx_error(dialect: Dialect, e: sqlx::Error) -> InspectError {
    match e {
        sqlx::Error::Database(_)
        | sqlx::Error::RowNotFound
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_) => InspectError::query(dialect, e),
        other => InspectError::connectivity(dialect, other),
    }
}

// ---------- trait ----------

/// Catalog access for one database engine. Every query runs against a
/// session that the caller opened with [`DialectInspector::open`] and owns.
#[async_trait]
pub trait DialectInspector: Send + Sync {
    type Session: Send;

    fn dialect(&self) -> Dialect;

    async fn open(&self, cfg: &ConnectionConfig) -> Result<Self::Session, InspectError>;

    /// Errors with `CatalogQuery` when the namespace does not exist, so an
    /// absent namespace is never reported as an empty one.
    async fn check_namespace(
        &self,
        session: &mut Self::Session,
        namespace: &str,
    ) -> Result<(), InspectError>;

    async fn list_tables(
        &self,
        session: &mut Self::Session,
        namespace: &str,
    ) -> Result<Vec<RawTable>, InspectError>;

    async fn list_columns(
        &self,
        session: &mut Self::Session,
        namespace: &str,
    ) -> Result<Vec<RawColumn>, InspectError>;

    async fn list_primary_keys(
        &self,
        session: &mut Self::Session,
        namespace: &str,
    ) -> Result<Vec<RawKey>, InspectError>;

    async fn list_unique_keys(
        &self,
        session: &mut Self::Session,
        namespace: &str,
    ) -> Result<Vec<RawKey>, InspectError>;

    async fn list_foreign_keys(
        &self,
        session: &mut Self::Session,
        namespace: &str,
    ) -> Result<Vec<RawForeignKey>, InspectError>;

    /// Identifier matching rules of the connected server.
    async fn name_folding(&self, _session: &mut Self::Session) -> Result<NameFolding, InspectError> {
        Ok(NameFolding::for_dialect(self.dialect()))
    }

    async fn close(&self, session: Self::Session);
}

/// Open a session, read the whole namespace, and close the session on every
/// exit path before returning.
pub async fn pull_catalog<I: DialectInspector>(
    inspector: &I,
    cfg: &ConnectionConfig,
) -> Result<RawCatalog, InspectError> {
    let namespace = cfg.effective_namespace();
    let mut session = inspector.open(cfg).await?;
    tracing::debug!(
        connection_id = %cfg.id,
        dialect = %inspector.dialect(),
        namespace = %namespace,
        "catalog session opened"
    );

    let result = read_namespace(inspector, &mut session, &namespace).await;

    inspector.close(session).await;
    tracing::debug!(connection_id = %cfg.id, "catalog session closed");
    result
}

async fn read_namespace<I: DialectInspector>(
    inspector: &I,
    session: &mut I::Session,
    namespace: &str,
) -> Result<RawCatalog, InspectError> {
    inspector.check_namespace(session, namespace).await?;

    let tables = inspector.list_tables(session, namespace).await?;
    let columns = inspector.list_columns(session, namespace).await?;
    let primary_keys = inspector.list_primary_keys(session, namespace).await?;
    let unique_keys = inspector.list_unique_keys(session, namespace).await?;
    let foreign_keys = inspector.list_foreign_keys(session, namespace).await?;
    let folding = inspector.name_folding(session).await?;

    Ok(RawCatalog {
        dialect: inspector.dialect(),
        namespace: namespace.to_string(),
        folding,
        tables,
        columns,
        primary_keys,
        unique_keys,
        foreign_keys,
    })
}

// ---------- source seam ----------

/// Where the orchestrator gets raw catalogs from.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn read_catalog(&self, cfg: &ConnectionConfig) -> Result<RawCatalog, InspectError>;
}

/// Reads live databases, dispatching on the connection's dialect.
pub struct LiveCatalogSource {
    settings: InspectorSettings,
}

impl LiveCatalogSource {
    pub fn new(settings: InspectorSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl CatalogSource for LiveCatalogSource {
    async fn read_catalog(&self, cfg: &ConnectionConfig) -> Result<RawCatalog, InspectError> {
        match cfg.dialect {
            Dialect::Postgres => {
                pull_catalog(&PostgresInspector::new(self.settings.clone()), cfg).await
            }
            Dialect::MySql => pull_catalog(&MySqlInspector::new(self.settings.clone()), cfg).await,
            Dialect::Sqlite => {
                pull_catalog(&SqliteInspector::new(self.settings.clone()), cfg).await
            }
        }
    }
}
