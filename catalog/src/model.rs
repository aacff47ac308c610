//! Canonical, engine-agnostic catalog entities.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::Serialize;
use uuid::Uuid;

// ---------- dialect ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    Postgres,
    MySql,
    Sqlite,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Postgres => "postgresql",
            Dialect::MySql => "mysql",
            Dialect::Sqlite => "sqlite",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Dialect::Postgres => 5432,
            Dialect::MySql => 3306,
            Dialect::Sqlite => 0,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgresql" | "postgres" => Ok(Dialect::Postgres),
            "mysql" => Ok(Dialect::MySql),
            "sqlite" => Ok(Dialect::Sqlite),
            other => Err(format!(
                "Unsupported dialect: {other}. Supported: postgresql, mysql, sqlite"
            )),
        }
    }
}

// ---------- connection ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Inactive,
    Active,
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Inactive => "inactive",
            ConnectionStatus::Active => "active",
            ConnectionStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "inactive" => Some(ConnectionStatus::Inactive),
            "active" => Some(ConnectionStatus::Active),
            "error" => Some(ConnectionStatus::Error),
            _ => None,
        }
    }
}

/// What an inspector needs to reach a source database.
#[derive(Clone)]
pub struct ConnectionConfig {
    pub id: Uuid,
    pub name: String,
    pub dialect: Dialect,
    pub host: String,
    pub port: u16,
    /// Database name; the file path for SQLite.
    pub database: String,
    pub namespace: Option<String>,
    pub username: String,
    pub password: String,
}

impl ConnectionConfig {
    /// Namespace to inspect: the explicit one, or the engine's default.
    pub fn effective_namespace(&self) -> String {
        match self.namespace.as_deref().map(str::trim) {
            Some(ns) if !ns.is_empty() => ns.to_string(),
            _ => match self.dialect {
                Dialect::Postgres => "public".to_string(),
                Dialect::MySql => self.database.clone(),
                Dialect::Sqlite => "main".to_string(),
            },
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("dialect", &self.dialect)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("namespace", &self.namespace)
            .field("username", &self.username)
            .field("password", &"****")
            .finish()
    }
}

// ---------- tags ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Table,
    View,
}

impl TableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableKind::Table => "table",
            TableKind::View => "view",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "view" => TableKind::View,
            _ => TableKind::Table,
        }
    }
}

/// Normalized column type tag shared by every dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    SmallInt,
    Integer,
    BigInt,
    Decimal,
    Float,
    Double,
    Boolean,
    Char,
    Varchar,
    Text,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Interval,
    Uuid,
    Json,
    Binary,
    Enum,
    Array,
    Unknown,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::SmallInt => "smallint",
            DataType::Integer => "integer",
            DataType::BigInt => "bigint",
            DataType::Decimal => "decimal",
            DataType::Float => "float",
            DataType::Double => "double",
            DataType::Boolean => "boolean",
            DataType::Char => "char",
            DataType::Varchar => "varchar",
            DataType::Text => "text",
            DataType::Date => "date",
            DataType::Time => "time",
            DataType::Timestamp => "timestamp",
            DataType::TimestampTz => "timestamptz",
            DataType::Interval => "interval",
            DataType::Uuid => "uuid",
            DataType::Json => "json",
            DataType::Binary => "binary",
            DataType::Enum => "enum",
            DataType::Array => "array",
            DataType::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "smallint" => DataType::SmallInt,
            "integer" => DataType::Integer,
            "bigint" => DataType::BigInt,
            "decimal" => DataType::Decimal,
            "float" => DataType::Float,
            "double" => DataType::Double,
            "boolean" => DataType::Boolean,
            "char" => DataType::Char,
            "varchar" => DataType::Varchar,
            "text" => DataType::Text,
            "date" => DataType::Date,
            "time" => DataType::Time,
            "timestamp" => DataType::Timestamp,
            "timestamptz" => DataType::TimestampTz,
            "interval" => DataType::Interval,
            "uuid" => DataType::Uuid,
            "json" => DataType::Json,
            "binary" => DataType::Binary,
            "enum" => DataType::Enum,
            "array" => DataType::Array,
            _ => DataType::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl RelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::OneToOne => "one_to_one",
            RelationType::OneToMany => "one_to_many",
            RelationType::ManyToOne => "many_to_one",
            RelationType::ManyToMany => "many_to_many",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "one_to_one" => RelationType::OneToOne,
            "one_to_many" => RelationType::OneToMany,
            "many_to_many" => RelationType::ManyToMany,
            _ => RelationType::ManyToOne,
        }
    }

    /// The same edge seen from the referenced side.
    pub fn inverse(&self) -> Self {
        match self {
            RelationType::OneToMany => RelationType::ManyToOne,
            RelationType::ManyToOne => RelationType::OneToMany,
            other => *other,
        }
    }
}

/// Declared ON DELETE / ON UPDATE behaviour of a foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferentialAction {
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl ReferentialAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferentialAction::NoAction => "no_action",
            ReferentialAction::Restrict => "restrict",
            ReferentialAction::Cascade => "cascade",
            ReferentialAction::SetNull => "set_null",
            ReferentialAction::SetDefault => "set_default",
        }
    }

    /// Accepts catalog spellings ("SET NULL", "set_null", "CASCADE", ...).
    /// Anything unrecognised, including an absent rule, is NO ACTION.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "restrict" => ReferentialAction::Restrict,
            "cascade" => ReferentialAction::Cascade,
            "set_null" => ReferentialAction::SetNull,
            "set_default" => ReferentialAction::SetDefault,
            _ => ReferentialAction::NoAction,
        }
    }
}

// ---------- entities ----------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveredTable {
    pub id: Uuid,
    pub connection_id: Uuid,
    pub schema_name: String,
    pub table_name: String,
    pub table_type: TableKind,
    pub comment: Option<String>,
    /// Ordered by `ordinal_position`.
    pub columns: Vec<DiscoveredColumn>,
}

impl DiscoveredTable {
    pub fn column(&self, name: &str) -> Option<&DiscoveredColumn> {
        self.columns.iter().find(|c| c.column_name == name)
    }

    pub fn primary_key(&self) -> impl Iterator<Item = &DiscoveredColumn> {
        self.columns.iter().filter(|c| c.is_primary_key)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveredColumn {
    pub id: Uuid,
    pub table_id: Uuid,
    pub column_name: String,
    pub data_type: DataType,
    pub native_type: String,
    pub is_nullable: bool,
    pub is_primary_key: bool,
    pub is_foreign_key: bool,
    /// Referenced table and column when `is_foreign_key` is set.
    pub foreign_key_table: Option<String>,
    pub foreign_key_column: Option<String>,
    /// The column is unique on its own (single-column PK or unique key).
    pub is_unique: bool,
    pub default_value: Option<String>,
    pub max_length: Option<i32>,
    pub precision: Option<i32>,
    pub scale: Option<i32>,
    /// 1-based, dense within the table.
    pub ordinal_position: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveredRelation {
    pub id: Uuid,
    pub connection_id: Uuid,
    pub source_table_id: Uuid,
    pub target_table_id: Uuid,
    pub source_column_id: Uuid,
    pub target_column_id: Uuid,
    pub relation_type: RelationType,
    pub constraint_name: String,
    pub on_delete: ReferentialAction,
    pub on_update: ReferentialAction,
}

/// Everything stored for one connection.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Catalog {
    pub tables: Vec<DiscoveredTable>,
    pub relations: Vec<DiscoveredRelation>,
}

impl Catalog {
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.relations.is_empty()
    }

    /// Relations in stored order with their endpoints spelled out.
    pub fn named_relations(&self) -> Vec<NamedRelation> {
        let tables: HashMap<Uuid, &DiscoveredTable> =
            self.tables.iter().map(|t| (t.id, t)).collect();
        let endpoint = |table_id: Uuid, column_id: Uuid| {
            let table = tables.get(&table_id)?;
            let column = table.columns.iter().find(|c| c.id == column_id)?;
            Some((table.table_name.clone(), column.column_name.clone()))
        };

        self.relations
            .iter()
            .filter_map(|r| {
                let (source_table_name, source_column_name) =
                    endpoint(r.source_table_id, r.source_column_id)?;
                let (target_table_name, target_column_name) =
                    endpoint(r.target_table_id, r.target_column_id)?;
                Some(NamedRelation {
                    relation: r.clone(),
                    source_table_name,
                    source_column_name,
                    target_table_name,
                    target_column_name,
                })
            })
            .collect()
    }
}

/// A stored relation with table and column names next to the ids.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedRelation {
    #[serde(flatten)]
    pub relation: DiscoveredRelation,
    pub source_table_name: String,
    pub source_column_name: String,
    pub target_table_name: String,
    pub target_column_name: String,
}

/// Result of one successful introspection run.
#[derive(Debug, Clone, Serialize)]
pub struct IntrospectionSummary {
    pub connection_id: Uuid,
    pub tables_count: usize,
    pub relations_count: usize,
    pub warnings: Vec<crate::inference::Warning>,
    pub completed_at: NaiveDateTime,
}

impl IntrospectionSummary {
    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dialect: Dialect, namespace: Option<&str>) -> ConnectionConfig {
        ConnectionConfig {
            id: Uuid::nil(),
            name: "src".to_string(),
            dialect,
            host: "localhost".to_string(),
            port: dialect.default_port(),
            database: "shop".to_string(),
            namespace: namespace.map(str::to_string),
            username: "alice".to_string(),
            password: "hunter2".to_string(),
        }
    }

    #[test]
    fn test_default_namespace_per_dialect() {
        assert_eq!(config(Dialect::Postgres, None).effective_namespace(), "public");
        assert_eq!(config(Dialect::MySql, None).effective_namespace(), "shop");
        assert_eq!(config(Dialect::Sqlite, None).effective_namespace(), "main");
        assert_eq!(config(Dialect::Sqlite, Some("  ")).effective_namespace(), "main");
        assert_eq!(
            config(Dialect::Postgres, Some("billing")).effective_namespace(),
            "billing"
        );
    }

    #[test]
    fn test_debug_redacts_password() {
        let rendered = format!("{:?}", config(Dialect::Postgres, None));
        assert!(!rendered.contains("hunter2"), "{rendered}");
        assert!(rendered.contains("****"));
    }

    #[test]
    fn test_dialect_parse() {
        assert_eq!("postgres".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert_eq!("PostgreSQL".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert_eq!("mysql".parse::<Dialect>().unwrap(), Dialect::MySql);
        assert!("oracle".parse::<Dialect>().is_err());
    }

    #[test]
    fn test_referential_action_spellings() {
        assert_eq!(ReferentialAction::parse("SET NULL"), ReferentialAction::SetNull);
        assert_eq!(ReferentialAction::parse("set_default"), ReferentialAction::SetDefault);
        assert_eq!(ReferentialAction::parse("CASCADE"), ReferentialAction::Cascade);
        assert_eq!(ReferentialAction::parse(""), ReferentialAction::NoAction);
        assert_eq!(ReferentialAction::parse("NO ACTION"), ReferentialAction::NoAction);
    }

    #[test]
    fn test_relation_type_inverse() {
        assert_eq!(RelationType::ManyToOne.inverse(), RelationType::OneToMany);
        assert_eq!(RelationType::OneToOne.inverse(), RelationType::OneToOne);
    }
}
