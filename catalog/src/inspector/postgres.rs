use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_postgres::NoTls;
use tokio_postgres::types::ToSql;

use super::{
    DialectInspector, ForeignKeyColumn, InspectError, RawColumn, RawForeignKey, RawKey, RawTable,
    group_foreign_keys, group_keys,
};
use crate::config::InspectorSettings;
use crate::model::{ConnectionConfig, Dialect};

const DIALECT: Dialect = Dialect::Postgres;

pub struct PostgresInspector {
    settings: InspectorSettings,
}

/// A client plus the task driving its connection. Closing drops the client
/// and waits for the connection task to finish.
pub struct PgSession {
    client: tokio_postgres::Client,
    driver: JoinHandle<()>,
}

impl PostgresInspector {
    pub fn new(settings: InspectorSettings) -> Self {
        Self { settings }
    }

    async fn query(
        session: &PgSession,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<tokio_postgres::Row>, InspectError> {
        session
            .client
            .query(sql, params)
            .await
            .map_err(classify_query_error)
    }

    async fn index_keys(
        session: &PgSession,
        namespace: &str,
        primary: bool,
    ) -> Result<Vec<RawKey>, InspectError> {
        // Partial indexes and expression indexes do not make a column set unique.
        // INCLUDE columns sit after the first indnkeyatts entries of indkey.
        let rows = Self::query(
            session,
            "SELECT t.relname::text, i.relname::text, a.attname::text \
             FROM pg_index ix \
             JOIN pg_class t ON t.oid = ix.indrelid \
             JOIN pg_class i ON i.oid = ix.indexrelid \
             JOIN pg_namespace n ON n.oid = t.relnamespace \
             CROSS JOIN LATERAL unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord) \
             JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum \
             WHERE n.nspname = $1 \
               AND k.ord <= ix.indnkeyatts \
               AND ix.indisunique \
               AND ix.indisprimary = $2 \
               AND ix.indpred IS NULL \
               AND NOT (0 = ANY(ix.indkey::int2[])) \
             ORDER BY t.relname, i.relname, k.ord",
            &[&namespace, &primary],
        )
        .await?;

        Ok(group_keys(
            rows.into_iter()
                .map(|row| (row.get(0), row.get(1), Some(row.get(2))))
                .collect(),
        ))
    }
}

fn classify_query_error(e: tokio_postgres::Error) -> InspectError {
    if e.as_db_error().is_some() {
        InspectError::query(DIALECT, e)
    } else {
        // Closed socket, protocol or I/O failure mid-query.
        InspectError::connectivity(DIALECT, e)
    }
}

/// Foreign-key action codes from `pg_constraint.confdeltype` / `confupdtype`.
fn action_name(code: &str) -> &'static str {
    match code {
        "r" => "RESTRICT",
        "c" => "CASCADE",
        "n" => "SET NULL",
        "d" => "SET DEFAULT",
        _ => "NO ACTION",
    }
}

/// information_schema reports enums and extension types as "USER-DEFINED"
/// and arrays as "ARRAY"; the udt name is the informative part in both cases.
fn native_type(data_type: String, udt_name: String) -> String {
    match data_type.as_str() {
        "USER-DEFINED" | "ARRAY" => udt_name,
        _ => data_type,
    }
}

#[async_trait]
impl DialectInspector for PostgresInspector {
    type Session = PgSession;

    fn dialect(&self) -> Dialect {
        DIALECT
    }

    async fn open(&self, cfg: &ConnectionConfig) -> Result<PgSession, InspectError> {
        let mut pg = tokio_postgres::Config::new();
        pg.host(&cfg.host)
            .port(cfg.port)
            .dbname(&cfg.database)
            .user(&cfg.username)
            .password(&cfg.password)
            .application_name("catalog-introspection")
            .connect_timeout(self.settings.connect_timeout);

        let (client, connection) = pg
            .connect(NoTls)
            .await
            .map_err(|e| InspectError::connectivity(DIALECT, e))?;

        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::warn!("Introspection connection error: {e}");
            }
        });

        let session = PgSession { client, driver };

        // Read-only, and bounded so a slow catalog cannot hang the run.
        let setup = format!(
            "SET statement_timeout = '{}ms'; SET default_transaction_read_only = on",
            self.settings.statement_timeout.as_millis()
        );
        if let Err(e) = session.client.batch_execute(&setup).await {
            self.close(session).await;
            return Err(classify_query_error(e));
        }

        Ok(session)
    }

    async fn check_namespace(
        &self,
        session: &mut PgSession,
        namespace: &str,
    ) -> Result<(), InspectError> {
        let rows = Self::query(
            session,
            "SELECT 1 FROM pg_namespace WHERE nspname = $1",
            &[&namespace],
        )
        .await?;
        if rows.is_empty() {
            return Err(InspectError::unknown_namespace(DIALECT, namespace));
        }
        Ok(())
    }

    async fn list_tables(
        &self,
        session: &mut PgSession,
        namespace: &str,
    ) -> Result<Vec<RawTable>, InspectError> {
        let rows = Self::query(
            session,
            "SELECT table_name::text, table_type::text, \
                    obj_description(format('%I.%I', table_schema, table_name)::regclass, 'pg_class') \
             FROM information_schema.tables \
             WHERE table_schema::text = $1 \
             ORDER BY table_name",
            &[&namespace],
        )
        .await?;

        let mut tables: Vec<RawTable> = rows
            .into_iter()
            .map(|row| RawTable {
                table_name: row.get(0),
                table_type: row.get(1),
                comment: row.get(2),
            })
            .collect();

        // Materialized views are not in information_schema.tables
        let matviews = Self::query(
            session,
            "SELECT matviewname::text, \
                    obj_description(format('%I.%I', schemaname, matviewname)::regclass, 'pg_class') \
             FROM pg_matviews \
             WHERE schemaname = $1 \
             ORDER BY matviewname",
            &[&namespace],
        )
        .await?;

        tables.extend(matviews.into_iter().map(|row| RawTable {
            table_name: row.get(0),
            table_type: "MATERIALIZED VIEW".to_string(),
            comment: row.get(1),
        }));

        Ok(tables)
    }

    async fn list_columns(
        &self,
        session: &mut PgSession,
        namespace: &str,
    ) -> Result<Vec<RawColumn>, InspectError> {
        let rows = Self::query(
            session,
            "SELECT table_name::text, column_name::text, ordinal_position::int4, \
                    data_type::text, udt_name::text, is_nullable::text, column_default::text, \
                    character_maximum_length::int4, numeric_precision::int4, numeric_scale::int4 \
             FROM information_schema.columns \
             WHERE table_schema::text = $1 \
             ORDER BY table_name, ordinal_position",
            &[&namespace],
        )
        .await?;

        let mut columns: Vec<RawColumn> = rows
            .into_iter()
            .map(|row| {
                let is_nullable: String = row.get(5);
                RawColumn {
                    table_name: row.get(0),
                    column_name: row.get(1),
                    ordinal_position: row.get(2),
                    data_type: native_type(row.get(3), row.get(4)),
                    is_nullable: is_nullable.eq_ignore_ascii_case("YES"),
                    column_default: row.get(6),
                    max_length: row.get(7),
                    precision: row.get(8),
                    scale: row.get(9),
                }
            })
            .collect();

        // Materialized view columns only live in pg_attribute.
        let matview_rows = Self::query(
            session,
            "SELECT c.relname::text, a.attname::text, a.attnum::int4, \
                    format_type(a.atttypid, a.atttypmod), NOT a.attnotnull \
             FROM pg_attribute a \
             JOIN pg_class c ON c.oid = a.attrelid \
             JOIN pg_namespace n ON n.oid = c.relnamespace \
             WHERE n.nspname = $1 AND c.relkind = 'm' \
               AND a.attnum > 0 AND NOT a.attisdropped \
             ORDER BY c.relname, a.attnum",
            &[&namespace],
        )
        .await?;

        columns.extend(matview_rows.into_iter().map(|row| RawColumn {
            table_name: row.get(0),
            column_name: row.get(1),
            ordinal_position: row.get(2),
            data_type: row.get(3),
            is_nullable: row.get(4),
            column_default: None,
            max_length: None,
            precision: None,
            scale: None,
        }));

        Ok(columns)
    }

    async fn list_primary_keys(
        &self,
        session: &mut PgSession,
        namespace: &str,
    ) -> Result<Vec<RawKey>, InspectError> {
        Self::index_keys(session, namespace, true).await
    }

    async fn list_unique_keys(
        &self,
        session: &mut PgSession,
        namespace: &str,
    ) -> Result<Vec<RawKey>, InspectError> {
        Self::index_keys(session, namespace, false).await
    }

    async fn list_foreign_keys(
        &self,
        session: &mut PgSession,
        namespace: &str,
    ) -> Result<Vec<RawForeignKey>, InspectError> {
        // conkey/confkey are parallel arrays; unnesting them together keeps
        // composite keys paired column by column.
        let rows = Self::query(
            session,
            "SELECT src.relname::text, con.conname::text, a.attname::text, \
                    tns.nspname::text, tgt.relname::text, af.attname::text, \
                    con.confdeltype::text, con.confupdtype::text \
             FROM pg_constraint con \
             JOIN pg_class src ON src.oid = con.conrelid \
             JOIN pg_namespace ns ON ns.oid = src.relnamespace \
             JOIN pg_class tgt ON tgt.oid = con.confrelid \
             JOIN pg_namespace tns ON tns.oid = tgt.relnamespace \
             CROSS JOIN LATERAL unnest(con.conkey, con.confkey) WITH ORDINALITY AS k(src_att, ref_att, ord) \
             JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.src_att \
             JOIN pg_attribute af ON af.attrelid = con.confrelid AND af.attnum = k.ref_att \
             WHERE con.contype = 'f' AND ns.nspname = $1 \
             ORDER BY src.relname, con.conname, k.ord",
            &[&namespace],
        )
        .await?;

        let fk_rows = rows
            .into_iter()
            .map(|row| {
                let ref_schema: String = row.get(3);
                let on_delete: String = row.get(6);
                let on_update: String = row.get(7);
                ForeignKeyColumn {
                    table_name: row.get(0),
                    constraint_name: row.get(1),
                    column: row.get(2),
                    referenced_schema: (ref_schema != namespace).then_some(ref_schema),
                    referenced_table: row.get(4),
                    referenced_column: row.get(5),
                    on_delete: action_name(&on_delete).to_string(),
                    on_update: action_name(&on_update).to_string(),
                }
            })
            .collect();

        Ok(group_foreign_keys(fk_rows))
    }

    async fn close(&self, session: PgSession) {
        let PgSession { client, driver } = session;
        drop(client);
        if let Err(e) = driver.await {
            tracing::warn!(error = %e, "Introspection connection task failed");
        }
    }
}
