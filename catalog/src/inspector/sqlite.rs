use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions, Connection};

use super::{
    DialectInspector, ForeignKeyColumn, InspectError, RawColumn, RawForeignKey, RawKey, RawTable,
    classify_sqlx_error, group_foreign_keys, group_keys,
};
use crate::config::InspectorSettings;
use crate::model::{ConnectionConfig, Dialect};

const DIALECT: Dialect = Dialect::Sqlite;

/// Reads a SQLite file. `ConnectionConfig::database` is the file path.
pub struct SqliteInspector {
    settings: InspectorSettings,
}

type ColumnRow = (i64, String, String, i64, Option<String>, i64);

type FkRow = (i64, i64, String, String, Option<String>, String, String);

impl SqliteInspector {
    pub fn new(settings: InspectorSettings) -> Self {
        Self { settings }
    }

    async fn table_names(
        session: &mut SqliteConnection,
        namespace: &str,
    ) -> Result<Vec<String>, InspectError> {
        let rows: Vec<(String,)> = sqlx::query_as(&format!(
            "SELECT name FROM {}.sqlite_master \
             WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' \
             ORDER BY name",
            quote_ident(namespace)
        ))
        .fetch_all(&mut *session)
        .await
        .map_err(|e| classify_sqlx_error(DIALECT, e))?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn table_info(
        session: &mut SqliteConnection,
        namespace: &str,
        table: &str,
    ) -> Result<Vec<ColumnRow>, InspectError> {
        sqlx::query_as(
            "SELECT cid, name, type, \"notnull\", dflt_value, pk \
             FROM pragma_table_info(?1, ?2) \
             ORDER BY cid",
        )
        .bind(table)
        .bind(namespace)
        .fetch_all(&mut *session)
        .await
        .map_err(|e| classify_sqlx_error(DIALECT, e))
    }

    async fn without_rowid(
        session: &mut SqliteConnection,
        namespace: &str,
        table: &str,
    ) -> Result<bool, InspectError> {
        let wr: Option<(i64,)> =
            sqlx::query_as("SELECT wr FROM pragma_table_list WHERE schema = ?1 AND name = ?2")
                .bind(namespace)
                .bind(table)
                .fetch_optional(&mut *session)
                .await
                .map_err(|e| classify_sqlx_error(DIALECT, e))?;
        Ok(wr.is_some_and(|(wr,)| wr != 0))
    }

    /// Primary-key column names in key order.
    async fn primary_key_columns(
        session: &mut SqliteConnection,
        namespace: &str,
        table: &str,
    ) -> Result<Vec<String>, InspectError> {
        let mut pk: Vec<(i64, String)> = Self::table_info(session, namespace, table)
            .await?
            .into_iter()
            .filter(|c| c.5 > 0)
            .map(|c| (c.5, c.1))
            .collect();
        pk.sort_by_key(|(pos, _)| *pos);
        Ok(pk.into_iter().map(|(_, name)| name).collect())
    }
}

/// Double-quote an identifier for interpolation where binding is impossible.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// SQLite only forbids NULL in a key column that aliases the rowid (a lone
/// `INTEGER PRIMARY KEY`) or belongs to a WITHOUT ROWID table. Other key
/// columns accept NULL unless declared NOT NULL.
fn key_forbids_null(declared: &str, pk_width: usize, without_rowid: bool) -> bool {
    without_rowid || (pk_width == 1 && declared.trim().eq_ignore_ascii_case("INTEGER"))
}

fn foreign_key_name(table: &str, id: i64) -> String {
    format!("fk_{table}_{id}")
}

#[async_trait]
impl DialectInspector for SqliteInspector {
    type Session = SqliteConnection;

    fn dialect(&self) -> Dialect {
        DIALECT
    }

    async fn open(&self, cfg: &ConnectionConfig) -> Result<SqliteConnection, InspectError> {
        let path = cfg
            .database
            .strip_prefix("sqlite://")
            .unwrap_or(&cfg.database);

        let options = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true)
            .create_if_missing(false)
            .busy_timeout(self.settings.statement_timeout);

        tokio::time::timeout(self.settings.connect_timeout, options.connect())
            .await
            .map_err(|_| {
                InspectError::connectivity(DIALECT, format!("timed out opening {path}"))
            })?
            .map_err(|e| InspectError::connectivity(DIALECT, e))
    }

    async fn check_namespace(
        &self,
        session: &mut SqliteConnection,
        namespace: &str,
    ) -> Result<(), InspectError> {
        let found: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM pragma_database_list WHERE name = ?1")
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
        session: &mut SqliteConnection,
        namespace: &str,
    ) -> Result<Vec<RawTable>, InspectError> {
        let rows: Vec<(String, String)> = sqlx::query_as(&format!(
            "SELECT name, type FROM {}.sqlite_master \
             WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' \
             ORDER BY name",
            quote_ident(namespace)
        ))
        .fetch_all(&mut *session)
        .await
        .map_err(|e| classify_sqlx_error(DIALECT, e))?;

        Ok(rows
            .into_iter()
            .map(|(table_name, table_type)| RawTable {
                table_name,
                table_type,
                comment: None,
            })
            .collect())
    }

    async fn list_columns(
        &self,
        session: &mut SqliteConnection,
        namespace: &str,
    ) -> Result<Vec<RawColumn>, InspectError> {
        let mut columns = Vec::new();
        for table in Self::table_names(session, namespace).await? {
            let info = Self::table_info(session, namespace, &table).await?;
            let pk_width = info.iter().filter(|c| c.5 > 0).count();
            let without_rowid = pk_width > 0 && Self::without_rowid(session, namespace, &table).await?;

            for (cid, name, declared, notnull, default, pk) in info {
                let not_null =
                    notnull != 0 || (pk > 0 && key_forbids_null(&declared, pk_width, without_rowid));
                columns.push(RawColumn {
                    table_name: table.clone(),
                    column_name: name,
                    ordinal_position: i32::try_from(cid + 1).ok(),
                    is_nullable: !not_null,
                    data_type: declared,
                    column_default: default,
                    max_length: None,
                    precision: None,
                    scale: None,
                });
            }
        }
        Ok(columns)
    }

    async fn list_primary_keys(
        &self,
        session: &mut SqliteConnection,
        namespace: &str,
    ) -> Result<Vec<RawKey>, InspectError> {
        let mut keys = Vec::new();
        for table in Self::table_names(session, namespace).await? {
            let columns = Self::primary_key_columns(session, namespace, &table).await?;
            if !columns.is_empty() {
                keys.push(RawKey {
                    constraint_name: format!("pk_{table}"),
                    table_name: table,
                    columns,
                });
            }
        }
        Ok(keys)
    }

    async fn list_unique_keys(
        &self,
        session: &mut SqliteConnection,
        namespace: &str,
    ) -> Result<Vec<RawKey>, InspectError> {
        let mut rows: Vec<(String, String, Option<String>)> = Vec::new();
        for table in Self::table_names(session, namespace).await? {
            // origin 'pk' duplicates the primary key; partial indexes are not
            // unique over the whole table.
            let indexes: Vec<(String,)> = sqlx::query_as(
                "SELECT name FROM pragma_index_list(?1, ?2) \
                 WHERE \"unique\" = 1 AND origin <> 'pk' AND partial = 0 \
                 ORDER BY name",
            )
            .bind(&table)
            .bind(namespace)
            .fetch_all(&mut *session)
            .await
            .map_err(|e| classify_sqlx_error(DIALECT, e))?;

            for (index,) in indexes {
                // Expression parts report a NULL name.
                let parts: Vec<(Option<String>,)> = sqlx::query_as(
                    "SELECT name FROM pragma_index_info(?1, ?2) ORDER BY seqno",
                )
                .bind(&index)
                .bind(namespace)
                .fetch_all(&mut *session)
                .await
                .map_err(|e| classify_sqlx_error(DIALECT, e))?;

                rows.extend(
                    parts
                        .into_iter()
                        .map(|(column,)| (table.clone(), index.clone(), column)),
                );
            }
        }
        Ok(group_keys(rows))
    }

    async fn list_foreign_keys(
        &self,
        session: &mut SqliteConnection,
        namespace: &str,
    ) -> Result<Vec<RawForeignKey>, InspectError> {
        let mut fk_rows = Vec::new();
        for table in Self::table_names(session, namespace).await? {
            let rows: Vec<FkRow> = sqlx::query_as(
                "SELECT id, seq, \"table\", \"from\", \"to\", on_delete, on_update \
                 FROM pragma_foreign_key_list(?1, ?2) \
                 ORDER BY id, seq",
            )
            .bind(&table)
            .bind(namespace)
            .fetch_all(&mut *session)
            .await
            .map_err(|e| classify_sqlx_error(DIALECT, e))?;

            for (id, seq, ref_table, from, to, on_delete, on_update) in rows {
                // `REFERENCES parent` without a column list targets the parent's PK.
                let referenced_column = match to {
                    Some(to) => to,
                    None => Self::primary_key_columns(session, namespace, &ref_table)
                        .await?
                        .into_iter()
                        .nth(usize::try_from(seq).unwrap_or(usize::MAX))
                        .unwrap_or_default(),
                };
                fk_rows.push(ForeignKeyColumn {
                    table_name: table.clone(),
                    constraint_name: foreign_key_name(&table, id),
                    column: from,
                    referenced_schema: None,
                    referenced_table: ref_table,
                    referenced_column,
                    on_delete,
                    on_update,
                });
            }
        }
        Ok(group_foreign_keys(fk_rows))
    }

    async fn close(&self, session: SqliteConnection) {
        if let Err(e) = session.close().await {
            tracing::warn!(error = %e, "Failed to close SQLite introspection session");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspector::pull_catalog;
    use sqlx::Executor;

    async fn fixture(sql: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("catalog-inspect-{}.db", uuid::Uuid::now_v7()));
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true);
        let mut conn = options.connect().await.unwrap();
        conn.execute(sql).await.unwrap();
        conn.close().await.unwrap();
        path
    }

    fn config(path: &std::path::Path, namespace: Option<&str>) -> ConnectionConfig {
        ConnectionConfig {
            id: uuid::Uuid::now_v7(),
            name: "fixture".to_string(),
            dialect: Dialect::Sqlite,
            host: String::new(),
            port: 0,
            database: path.to_string_lossy().into_owned(),
            namespace: namespace.map(str::to_string),
            username: String::new(),
            password: String::new(),
        }
    }

    #[tokio::test]
    async fn test_reads_keys_and_foreign_keys() {
        let path = fixture(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, email VARCHAR(255) NOT NULL UNIQUE);
             CREATE TABLE posts (
                 id INTEGER PRIMARY KEY,
                 user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                 title TEXT
             );
             CREATE TABLE profiles (user_id INTEGER PRIMARY KEY REFERENCES users);
             CREATE UNIQUE INDEX posts_title_lower ON posts(lower(title));
             CREATE VIEW recent_posts AS SELECT id, title FROM posts;",
        )
        .await;

        let inspector = SqliteInspector::new(InspectorSettings::default());
        let raw = pull_catalog(&inspector, &config(&path, None)).await.unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(raw.namespace, "main");
        let names: Vec<&str> = raw.tables.iter().map(|t| t.table_name.as_str()).collect();
        assert_eq!(names, vec!["posts", "profiles", "recent_posts", "users"]);
        assert_eq!(raw.tables[2].table_type, "view");

        let email = raw
            .columns
            .iter()
            .find(|c| c.table_name == "users" && c.column_name == "email")
            .unwrap();
        assert_eq!(email.data_type, "VARCHAR(255)");
        assert_eq!(email.ordinal_position, Some(2));
        assert!(!email.is_nullable);

        // Expression index is skipped; the inline UNIQUE survives.
        assert_eq!(raw.unique_keys.len(), 1);
        assert_eq!(raw.unique_keys[0].table_name, "users");
        assert_eq!(raw.unique_keys[0].columns, vec!["email"]);

        let posts_fk = raw.foreign_keys.iter().find(|f| f.table_name == "posts").unwrap();
        assert_eq!(posts_fk.constraint_name, "fk_posts_0");
        assert_eq!(posts_fk.on_delete, "CASCADE");
        assert_eq!(posts_fk.referenced_columns, vec!["id"]);

        // Column-less REFERENCES resolves to the parent's primary key.
        let profile_fk = raw.foreign_keys.iter().find(|f| f.table_name == "profiles").unwrap();
        assert_eq!(profile_fk.referenced_table, "users");
        assert_eq!(profile_fk.referenced_columns, vec!["id"]);
    }

    #[tokio::test]
    async fn test_unknown_namespace_is_catalog_query_error() {
        let path = fixture("CREATE TABLE t (id INTEGER PRIMARY KEY);").await;
        let inspector = SqliteInspector::new(InspectorSettings::default());
        let err = pull_catalog(&inspector, &config(&path, Some("archive")))
            .await
            .unwrap_err();
        std::fs::remove_file(&path).ok();

        assert_eq!(err, InspectError::unknown_namespace(Dialect::Sqlite, "archive"));
    }

    #[tokio::test]
    async fn test_missing_file_is_connectivity_error_and_not_created() {
        let path = std::env::temp_dir().join(format!("catalog-missing-{}.db", uuid::Uuid::now_v7()));
        let inspector = SqliteInspector::new(InspectorSettings::default());
        let err = pull_catalog(&inspector, &config(&path, None)).await.unwrap_err();

        assert!(matches!(err, InspectError::Connectivity { .. }), "{err}");
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_key_column_nullability() {
        let path = fixture(
            "CREATE TABLE alias (id INTEGER PRIMARY KEY, note TEXT);
             CREATE TABLE pair (a INT, b TEXT NOT NULL, PRIMARY KEY (a, b));
             CREATE TABLE keyed (code TEXT PRIMARY KEY, label TEXT) WITHOUT ROWID;",
        )
        .await;

        let inspector = SqliteInspector::new(InspectorSettings::default());
        let raw = pull_catalog(&inspector, &config(&path, None)).await.unwrap();
        std::fs::remove_file(&path).ok();

        let nullable = |table: &str, column: &str| {
            raw.columns
                .iter()
                .find(|c| c.table_name == table && c.column_name == column)
                .unwrap()
                .is_nullable
        };
        assert!(!nullable("alias", "id"));
        assert!(nullable("alias", "note"));
        // Composite keys of rowid tables take NULL unless declared otherwise.
        assert!(nullable("pair", "a"));
        assert!(!nullable("pair", "b"));
        assert!(!nullable("keyed", "code"));
        assert!(nullable("keyed", "label"));
    }

    #[test]
    fn test_key_forbids_null_rules() {
        assert!(key_forbids_null("INTEGER", 1, false));
        assert!(key_forbids_null("integer", 1, false));
        assert!(!key_forbids_null("INT", 1, false));
        assert!(!key_forbids_null("INTEGER", 2, false));
        assert!(key_forbids_null("TEXT", 2, true));
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("main"), "\"main\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
