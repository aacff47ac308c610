//! Raw engine catalogs → canonical tables and columns.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use uuid::Uuid;

use crate::inference::{Warning, WarningKind};
use crate::inspector::{RawCatalog, RawColumn};
use crate::model::{DataType, Dialect, DiscoveredColumn, DiscoveredTable, TableKind};

// ---------- UUID v5 helpers for deterministic catalog IDs ----------

/// Namespace UUID for catalog fingerprints (UUID v5).
pub(crate) const CATALOG_NS: Uuid = Uuid::from_bytes([
    0x8a, 0x1b, 0x9c, 0x4e, 0x3d, 0x7f, 0x5a, 0x21, 0xb6, 0x0e, 0xf4, 0x12, 0x7c, 0x8d, 0x9e, 0x03,
]);

pub fn table_id(connection_id: Uuid, schema_name: &str, table_name: &str) -> Uuid {
    let key = format!("{connection_id}:{schema_name}:{table_name}");
    Uuid::new_v5(&CATALOG_NS, key.as_bytes())
}

pub fn column_id(table_id: Uuid, column_name: &str) -> Uuid {
    let key = format!("{table_id}:{column_name}");
    Uuid::new_v5(&CATALOG_NS, key.as_bytes())
}

// ---------- type mapping ----------

static TYPE_PARAMS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(\s*(\d+)\s*(?:,\s*(\d+)\s*)?\)").unwrap());

static PAREN_GROUP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\([^)]*\)").unwrap());

/// Lowercased type name with parameters removed, so
/// "timestamp(3) without time zone" reduces to "timestamp without time zone".
fn base_type(native: &str) -> String {
    let lower = native.trim().to_ascii_lowercase();
    PAREN_GROUP
        .replace_all(&lower, "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Map a native type name to its normalized tag.
pub fn map_type(dialect: Dialect, native: &str) -> DataType {
    let base = base_type(native);
    match dialect {
        Dialect::Postgres => postgres_type(&base),
        Dialect::MySql => {
            let lower = native.trim().to_ascii_lowercase();
            if lower.starts_with("tinyint(1)") || lower == "bit(1)" {
                return DataType::Boolean;
            }
            // "int(10) unsigned zerofill" -> "int"
            let words: Vec<&str> = base
                .split(' ')
                .filter(|w| !matches!(*w, "unsigned" | "signed" | "zerofill"))
                .collect();
            mysql_type(&words.join(" "))
        }
        Dialect::Sqlite => sqlite_type(&base),
    }
}

fn postgres_type(base: &str) -> DataType {
    if base.starts_with('_') || base.ends_with("[]") {
        return DataType::Array;
    }
    match base {
        "smallint" | "int2" | "smallserial" | "serial2" => DataType::SmallInt,
        "integer" | "int" | "int4" | "serial" | "serial4" => DataType::Integer,
        "bigint" | "int8" | "bigserial" | "serial8" => DataType::BigInt,
        "numeric" | "decimal" | "money" => DataType::Decimal,
        "real" | "float4" => DataType::Float,
        "double precision" | "float8" => DataType::Double,
        "boolean" | "bool" => DataType::Boolean,
        "character" | "char" | "bpchar" => DataType::Char,
        "character varying" | "varchar" => DataType::Varchar,
        "text" | "citext" | "name" => DataType::Text,
        "date" => DataType::Date,
        "time" | "time without time zone" | "time with time zone" | "timetz" => DataType::Time,
        "timestamp" | "timestamp without time zone" => DataType::Timestamp,
        "timestamp with time zone" | "timestamptz" => DataType::TimestampTz,
        "interval" => DataType::Interval,
        "uuid" => DataType::Uuid,
        "json" | "jsonb" => DataType::Json,
        "bytea" => DataType::Binary,
        _ => DataType::Unknown,
    }
}

fn mysql_type(base: &str) -> DataType {
    match base {
        "tinyint" | "smallint" | "year" => DataType::SmallInt,
        "mediumint" | "int" | "integer" => DataType::Integer,
        "bigint" => DataType::BigInt,
        "decimal" | "numeric" | "dec" | "fixed" => DataType::Decimal,
        "float" => DataType::Float,
        "double" | "double precision" | "real" => DataType::Double,
        "bool" | "boolean" => DataType::Boolean,
        "char" => DataType::Char,
        "varchar" => DataType::Varchar,
        "tinytext" | "text" | "mediumtext" | "longtext" => DataType::Text,
        "date" => DataType::Date,
        "time" => DataType::Time,
        "datetime" | "timestamp" => DataType::Timestamp,
        "json" => DataType::Json,
        "binary" | "varbinary" | "bit" | "tinyblob" | "blob" | "mediumblob" | "longblob" => {
            DataType::Binary
        }
        _ if base.starts_with("enum") || base.starts_with("set") => DataType::Enum,
        _ => DataType::Unknown,
    }
}

/// Well-known declared names first, then SQLite's column affinity rules.
fn sqlite_type(base: &str) -> DataType {
    match base {
        "" => DataType::Unknown,
        "boolean" | "bool" => DataType::Boolean,
        "tinyint" | "smallint" | "int2" => DataType::SmallInt,
        "int" | "integer" | "mediumint" | "int4" => DataType::Integer,
        "bigint" | "int8" | "unsigned big int" => DataType::BigInt,
        "char" | "character" | "nchar" | "native character" => DataType::Char,
        "varchar" | "character varying" | "varying character" | "nvarchar" => DataType::Varchar,
        "text" | "clob" => DataType::Text,
        "float" => DataType::Float,
        "real" | "double" | "double precision" => DataType::Double,
        "decimal" | "numeric" => DataType::Decimal,
        "date" => DataType::Date,
        "time" => DataType::Time,
        "datetime" | "timestamp" => DataType::Timestamp,
        "uuid" => DataType::Uuid,
        "json" | "jsonb" => DataType::Json,
        "blob" => DataType::Binary,
        _ if base.contains("int") => DataType::Integer,
        _ if base.contains("char") || base.contains("clob") || base.contains("text") => {
            DataType::Text
        }
        _ if base.contains("blob") => DataType::Binary,
        _ if base.contains("real") || base.contains("floa") || base.contains("doub") => {
            DataType::Double
        }
        _ => DataType::Decimal,
    }
}

/// Fill length/precision/scale from "varchar(255)" / "decimal(10,2)" when the
/// catalog left them empty.
fn type_params(
    data_type: DataType,
    native: &str,
    column: &RawColumn,
) -> (Option<i32>, Option<i32>, Option<i32>) {
    let mut max_length = column.max_length;
    let mut precision = column.precision;
    let mut scale = column.scale;

    if let Some(caps) = TYPE_PARAMS.captures(native) {
        let first = caps.get(1).and_then(|m| m.as_str().parse::<i32>().ok());
        let second = caps.get(2).and_then(|m| m.as_str().parse::<i32>().ok());
        match data_type {
            DataType::Char | DataType::Varchar | DataType::Binary if max_length.is_none() => {
                max_length = first;
            }
            DataType::Decimal if precision.is_none() => {
                precision = first;
                if scale.is_none() {
                    scale = second.or(Some(0));
                }
            }
            _ => {}
        }
    }
    (max_length, precision, scale)
}

fn table_kind(raw_type: &str) -> TableKind {
    if raw_type.to_ascii_lowercase().contains("view") {
        TableKind::View
    } else {
        TableKind::Table
    }
}

// ---------- normalization ----------

#[derive(Debug, Clone, Default)]
pub struct NormalizedCatalog {
    pub tables: Vec<DiscoveredTable>,
    pub warnings: Vec<Warning>,
}

/// Turn one raw namespace listing into canonical tables. Pure: the same input
/// always yields the same tables, ids included.
pub fn normalize(connection_id: Uuid, raw: &RawCatalog) -> NormalizedCatalog {
    let mut warnings = Vec::new();

    let mut columns_by_table: HashMap<&str, Vec<&RawColumn>> = HashMap::new();
    for column in &raw.columns {
        columns_by_table
            .entry(column.table_name.as_str())
            .or_default()
            .push(column);
    }

    let primary_keys: HashMap<&str, &[String]> = raw
        .primary_keys
        .iter()
        .map(|k| (k.table_name.as_str(), k.columns.as_slice()))
        .collect();

    // Columns that are unique on their own.
    let single_unique: HashSet<(&str, &str)> = raw
        .primary_keys
        .iter()
        .chain(raw.unique_keys.iter())
        .filter(|k| k.columns.len() == 1)
        .map(|k| (k.table_name.as_str(), k.columns[0].as_str()))
        .collect();

    let fk_sources: HashSet<(&str, &str)> = raw
        .foreign_keys
        .iter()
        .flat_map(|fk| {
            fk.columns
                .iter()
                .map(move |c| (fk.table_name.as_str(), c.as_str()))
        })
        .collect();

    let mut seen_tables = HashSet::new();
    let mut tables = Vec::with_capacity(raw.tables.len());

    for raw_table in &raw.tables {
        let name = raw_table.table_name.as_str();
        if !seen_tables.insert(name) {
            warnings.push(Warning::new(
                WarningKind::DuplicateTable,
                name,
                format!("table {name} listed more than once; keeping the first"),
            ));
            continue;
        }

        let tid = table_id(connection_id, &raw.namespace, name);
        let pk: &[String] = primary_keys.get(name).copied().unwrap_or(&[]);

        let mut seen_columns = HashSet::new();
        let mut source: Vec<&RawColumn> = Vec::new();
        for &column in columns_by_table.get(name).map(Vec::as_slice).unwrap_or(&[]) {
            if seen_columns.insert(column.column_name.as_str()) {
                source.push(column);
            } else {
                warnings.push(Warning::new(
                    WarningKind::DuplicateColumn,
                    name,
                    format!(
                        "column {name}.{} reported more than once; keeping the first",
                        column.column_name
                    ),
                ));
            }
        }

        let ordinals: Vec<i32> = source.iter().filter_map(|c| c.ordinal_position).collect();
        let distinct: HashSet<i32> = ordinals.iter().copied().collect();
        if ordinals.len() == source.len() && distinct.len() == ordinals.len() {
            source.sort_by_key(|c| c.ordinal_position);
        }

        let columns = source
            .into_iter()
            .enumerate()
            .map(|(idx, raw_col)| {
                let col = raw_col.column_name.as_str();
                let data_type = map_type(raw.dialect, &raw_col.data_type);
                let (max_length, precision, scale) =
                    type_params(data_type, &raw_col.data_type, raw_col);
                DiscoveredColumn {
                    id: column_id(tid, col),
                    table_id: tid,
                    column_name: col.to_string(),
                    data_type,
                    native_type: raw_col.data_type.clone(),
                    is_nullable: raw_col.is_nullable,
                    is_primary_key: pk.iter().any(|p| p == col),
                    is_foreign_key: fk_sources.contains(&(name, col)),
                    foreign_key_table: None,
                    foreign_key_column: None,
                    is_unique: single_unique.contains(&(name, col)),
                    default_value: raw_col.column_default.clone(),
                    max_length,
                    precision,
                    scale,
                    ordinal_position: (idx + 1) as i32,
                }
            })
            .collect();

        tables.push(DiscoveredTable {
            id: tid,
            connection_id,
            schema_name: raw.namespace.clone(),
            table_name: name.to_string(),
            table_type: table_kind(&raw_table.table_type),
            comment: raw_table.comment.clone(),
            columns,
        });
    }

    NormalizedCatalog { tables, warnings }
}
