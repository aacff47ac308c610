use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{ConnectOptions, Connection};

use std::time::Duration;

use super::{
    DialectInspector, ForeignKeyColumn, InspectError, NameFolding, RawColumn, RawForeignKey,
    RawKey, RawTable, classify_sqlx_error, group_foreign_keys, group_keys,
};
use crate::config::InspectorSettings;
use crate::model::{ConnectionConfig, Dialect};

const DIALECT: Dialect = Dialect::MySql;

pub struct MySqlInspector {
    settings: InspectorSettings,
}

type ColumnRow = (
    String,
    String,
    Option<i64>,
    String,
    String,
    Option<String>,
    Option<i64>,
    Option<i64>,
    Option<i64>,
);

type FkRow = (
    String,
    String,
    String,
    Option<String>,
    String,
    String,
    String,
    String,
);

impl MySqlInspector {
    pub fn new(settings: InspectorSettings) -> Self {
        Self { settings }
    }

    async fn index_keys(
        session: &mut MySqlConnection,
        namespace: &str,
        primary: bool,
    ) -> Result<Vec<RawKey>, InspectError> {
        // Prefix parts (SUB_PART) and functional parts (no COLUMN_NAME) come
        // back as NULL so the whole key is skipped.
        let sql = format!(
            "SELECT CAST(TABLE_NAME AS CHAR), CAST(INDEX_NAME AS CHAR), \
                    CASE WHEN SUB_PART IS NULL THEN CAST(COLUMN_NAME AS CHAR) END \
             FROM information_schema.STATISTICS \
             WHERE TABLE_SCHEMA = ? AND NON_UNIQUE = 0 AND INDEX_NAME {} 'PRIMARY' \
             ORDER BY TABLE_NAME, INDEX_NAME, SEQ_IN_INDEX",
            if primary { "=" } else { "<>" }
        );
        let rows: Vec<(String, String, Option<String>)> = sqlx::query_as(&sql)
            .bind(namespace)
            .fetch_all(&mut *session)
            .await
            .map_err(|e| classify_sqlx_error(DIALECT, e))?;

        Ok(group_keys(rows))
    }
}

/// MariaDB has no MAX_EXECUTION_TIME; its equivalent takes seconds.
fn statement_timeout_sql(server_version: &str, timeout: Duration) -> String {
    if server_version.to_ascii_lowercase().contains("mariadb") {
        format!("SET SESSION max_statement_time = {:.3}", timeout.as_secs_f64())
    } else {
        format!("SET SESSION MAX_EXECUTION_TIME = {}", timeout.as_millis())
    }
}

/// Views report the literal comment "VIEW"; an unset comment is empty.
fn table_comment(table_type: &str, comment: Option<String>) -> Option<String> {
    comment.filter(|c| !c.is_empty() && !(table_type.contains("VIEW") && c == "VIEW"))
}

/// Unsigned catalog counters arrive as BIGINT; longtext lengths overflow i32.
fn narrow(v: Option<i64>) -> Option<i32> {
    v.and_then(|v| i32::try_from(v).ok())
}

#[async_trait]
impl DialectInspector for MySqlInspector {
    type Session = MySqlConnection;

    fn dialect(&self) -> Dialect {
        DIALECT
    }

    async fn open(&self, cfg: &ConnectionConfig) -> Result<MySqlConnection, InspectError> {
        let options = MySqlConnectOptions::new()
            .host(&cfg.host)
            .port(cfg.port)
            .username(&cfg.username)
            .password(&cfg.password)
            .database(&cfg.database);

        let mut conn = tokio::time::timeout(self.settings.connect_timeout, options.connect())
            .await
            .map_err(|_| {
                InspectError::connectivity(
                    DIALECT,
                    format!(
                        "timed out after {}s connecting to {}:{}",
                        self.settings.connect_timeout.as_secs(),
                        cfg.host,
                        cfg.port
                    ),
                )
            })?
            .map_err(|e| InspectError::connectivity(DIALECT, e))?;

        let version: (String,) = match sqlx::query_as("SELECT VERSION()").fetch_one(&mut conn).await {
            Ok(v) => v,
            Err(e) => {
                self.close(conn).await;
                return Err(classify_sqlx_error(DIALECT, e));
            }
        };
        tracing::debug!(server_version = %version.0, "MySQL introspection session opened");

        let setup = [
            statement_timeout_sql(&version.0, self.settings.statement_timeout),
            "SET SESSION TRANSACTION READ ONLY".to_string(),
        ];
        for stmt in &setup {
            if let Err(e) = sqlx::query(stmt).execute(&mut conn).await {
                self.close(conn).await;
                return Err(classify_sqlx_error(DIALECT, e));
            }
        }

        Ok(conn)
    }

    async fn check_namespace(
        &self,
        session: &mut MySqlConnection,
        namespace: &str,
    ) -> Result<(), InspectError> {
        let found: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM information_schema.SCHEMATA WHERE SCHEMA_NAME = ?")
                .bind(namespace)
                .fetch_optional(&mut *session)
                .await
                .map_err(|e| classify_sqlx_error(DIALECT, e))?;

        match found {
            Some(_) => Ok(()),
            None => Err(InspectError::unknown_namespace(DIALECT, namespace)),
        }
    }

    async fn list_tables(
        &self,
        session: &mut MySqlConnection,
        namespace: &str,
    ) -> Result<Vec<RawTable>, InspectError> {
        let rows: Vec<(String, String, Option<String>)> = sqlx::query_as(
            "SELECT CAST(TABLE_NAME AS CHAR), CAST(TABLE_TYPE AS CHAR), \
                    CAST(TABLE_COMMENT AS CHAR) \
             FROM information_schema.TABLES \
             WHERE TABLE_SCHEMA = ? \
             ORDER BY TABLE_NAME",
        )
        .bind(namespace)
        .fetch_all(&mut *session)
        .await
        .map_err(|e| classify_sqlx_error(DIALECT, e))?;

        Ok(rows
            .into_iter()
            .map(|(table_name, table_type, comment)| RawTable {
                comment: table_comment(&table_type, comment),
                table_name,
                table_type,
            })
            .collect())
    }

    async fn list_columns(
        &self,
        session: &mut MySqlConnection,
        namespace: &str,
    ) -> Result<Vec<RawColumn>, InspectError> {
        // COLUMN_TYPE keeps display width and sign ("tinyint(1)", "int unsigned").
        let rows: Vec<ColumnRow> = sqlx::query_as(
            "SELECT CAST(TABLE_NAME AS CHAR), CAST(COLUMN_NAME AS CHAR), \
                    CAST(ORDINAL_POSITION AS SIGNED), CAST(COLUMN_TYPE AS CHAR), \
                    CAST(IS_NULLABLE AS CHAR), CAST(COLUMN_DEFAULT AS CHAR), \
                    CAST(CHARACTER_MAXIMUM_LENGTH AS SIGNED), \
                    CAST(NUMERIC_PRECISION AS SIGNED), CAST(NUMERIC_SCALE AS SIGNED) \
             FROM information_schema.COLUMNS \
             WHERE TABLE_SCHEMA = ? \
             ORDER BY TABLE_NAME, ORDINAL_POSITION",
        )
        .bind(namespace)
        .fetch_all(&mut *session)
        .await
        .map_err(|e| classify_sqlx_error(DIALECT, e))?;

        Ok(rows
            .into_iter()
            .map(
                |(table_name, column_name, ordinal, column_type, nullable, default, len, prec, scale)| {
                    RawColumn {
                        table_name,
                        column_name,
                        ordinal_position: narrow(ordinal),
                        data_type: column_type,
                        is_nullable: nullable.eq_ignore_ascii_case("YES"),
                        column_default: default,
                        max_length: narrow(len),
                        precision: narrow(prec),
                        scale: narrow(scale),
                    }
                },
            )
            .collect())
    }

    async fn list_primary_keys(
        &self,
        session: &mut MySqlConnection,
        namespace: &str,
    ) -> Result<Vec<RawKey>, InspectError> {
        Self::index_keys(session, namespace, true).await
    }

    async fn list_unique_keys(
        &self,
        session: &mut MySqlConnection,
        namespace: &str,
    ) -> Result<Vec<RawKey>, InspectError> {
        Self::index_keys(session, namespace, false).await
    }

    async fn list_foreign_keys(
        &self,
        session: &mut MySqlConnection,
        namespace: &str,
    ) -> Result<Vec<RawForeignKey>, InspectError> {
        let rows: Vec<FkRow> = sqlx::query_as(
            "SELECT CAST(k.TABLE_NAME AS CHAR), CAST(k.CONSTRAINT_NAME AS CHAR), \
                    CAST(k.COLUMN_NAME AS CHAR), CAST(k.REFERENCED_TABLE_SCHEMA AS CHAR), \
                    CAST(k.REFERENCED_TABLE_NAME AS CHAR), CAST(k.REFERENCED_COLUMN_NAME AS CHAR), \
                    CAST(r.DELETE_RULE AS CHAR), CAST(r.UPDATE_RULE AS CHAR) \
             FROM information_schema.KEY_COLUMN_USAGE k \
             JOIN information_schema.REFERENTIAL_CONSTRAINTS r \
               ON r.CONSTRAINT_SCHEMA = k.CONSTRAINT_SCHEMA \
              AND r.TABLE_NAME = k.TABLE_NAME \
              AND r.CONSTRAINT_NAME = k.CONSTRAINT_NAME \
             WHERE k.TABLE_SCHEMA = ? AND k.REFERENCED_TABLE_NAME IS NOT NULL \
             ORDER BY k.TABLE_NAME, k.CONSTRAINT_NAME, k.ORDINAL_POSITION",
        )
        .bind(namespace)
        .fetch_all(&mut *session)
        .await
        .map_err(|e| classify_sqlx_error(DIALECT, e))?;

        let fk_rows = rows
            .into_iter()
            .map(
                |(table_name, constraint_name, column, ref_schema, ref_table, ref_column, on_delete, on_update)| {
                    ForeignKeyColumn {
                        table_name,
                        constraint_name,
                        column,
                        referenced_schema: ref_schema.filter(|s| s != namespace),
                        referenced_table: ref_table,
                        referenced_column: ref_column,
                        on_delete,
                        on_update,
                    }
                },
            )
            .collect();

        Ok(group_foreign_keys(fk_rows))
    }

    async fn name_folding(&self, session: &mut MySqlConnection) -> Result<NameFolding, InspectError> {
        // 0 = case-sensitive table names; 1 and 2 compare them lowercased.
        let (mode,): (i64,) = sqlx::query_as("SELECT CAST(@@lower_case_table_names AS SIGNED)")
            .fetch_one(&mut *session)
            .await
            .map_err(|e| classify_sqlx_error(DIALECT, e))?;
        Ok(NameFolding {
            tables: mode != 0,
            ..NameFolding::for_dialect(DIALECT)
        })
    }

    async fn close(&self, session: MySqlConnection) {
        if let Err(e) = session.close().await {
            tracing::warn!(error = %e, "Failed to close MySQL introspection session");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_narrow_drops_overflowing_lengths() {
        assert_eq!(narrow(Some(255)), Some(255));
        assert_eq!(narrow(Some(4_294_967_295)), None);
        assert_eq!(narrow(None), None);
    }

    #[test]
    fn test_statement_timeout_per_server() {
        let timeout = Duration::from_millis(2500);
        assert_eq!(
            statement_timeout_sql("8.0.36", timeout),
            "SET SESSION MAX_EXECUTION_TIME = 2500"
        );
        assert_eq!(
            statement_timeout_sql("10.11.6-MariaDB-1:10.11.6+maria~ubu2204", timeout),
            "SET SESSION max_statement_time = 2.500"
        );
    }

    #[test]
    fn test_table_comment_filters_placeholders() {
        assert_eq!(table_comment("BASE TABLE", Some(String::new())), None);
        assert_eq!(table_comment("VIEW", Some("VIEW".to_string())), None);
        assert_eq!(
            table_comment("BASE TABLE", Some("customer master".to_string())).as_deref(),
            Some("customer master")
        );
        assert_eq!(table_comment("BASE TABLE", None), None);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_connectivity_error() {
        let cfg = ConnectionConfig {
            id: uuid::Uuid::now_v7(),
            name: "nowhere".to_string(),
            dialect: Dialect::MySql,
            host: "127.0.0.1".to_string(),
            // Port 1 is reserved and closed on any sane test host.
            port: 1,
            database: "shop".to_string(),
            namespace: None,
            username: "root".to_string(),
            password: "root".to_string(),
        };
        let settings = InspectorSettings {
            connect_timeout: std::time::Duration::from_secs(2),
            ..InspectorSettings::default()
        };

        let err = super::super::pull_catalog(&MySqlInspector::new(settings), &cfg)
            .await
            .unwrap_err();
        assert!(matches!(err, InspectError::Connectivity { dialect: Dialect::MySql, .. }), "{err}");
    }

    /// Requires CATALOG_TEST_MYSQL_HOST / _PORT / _USER / _PASSWORD / _DB.
    #[tokio::test]
    #[ignore]
    async fn test_live_read_namespace() {
        let env = |k: &str, d: &str| std::env::var(k).unwrap_or_else(|_| d.to_string());
        let cfg = ConnectionConfig {
            id: uuid::Uuid::now_v7(),
            name: "live".to_string(),
            dialect: Dialect::MySql,
            host: env("CATALOG_TEST_MYSQL_HOST", "127.0.0.1"),
            port: env("CATALOG_TEST_MYSQL_PORT", "3306").parse().unwrap(),
            database: env("CATALOG_TEST_MYSQL_DB", "mysql"),
            namespace: None,
            username: env("CATALOG_TEST_MYSQL_USER", "root"),
            password: env("CATALOG_TEST_MYSQL_PASSWORD", "root"),
        };

        let raw = super::super::pull_catalog(&MySqlInspector::new(InspectorSettings::default()), &cfg)
            .await
            .unwrap();
        assert_eq!(raw.namespace, cfg.database);
        assert!(!raw.tables.is_empty());
    }
}
