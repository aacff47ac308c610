use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::entity::{discovered_column, discovered_relation, discovered_table};
use crate::model::{
    Catalog, DataType, DiscoveredColumn, DiscoveredRelation, DiscoveredTable, ReferentialAction,
    RelationType, TableKind,
};

/// Rows per INSERT statement; keeps bind counts under SQLite's variable limit.
const INSERT_BATCH: usize = 50;

#[derive(Debug)]
pub enum StoreError {
    Database(DbErr),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Database(e) => write!(f, "Metadata store error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<DbErr> for StoreError {
    fn from(e: DbErr) -> Self {
        StoreError::Database(e)
    }
}

/// Persisted catalogs, one per connection.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Swap the stored catalog for `connection_id` in one transaction. On
    /// error nothing changes.
    async fn replace(
        &self,
        connection_id: Uuid,
        tables: &[DiscoveredTable],
        relations: &[DiscoveredRelation],
    ) -> Result<(), StoreError>;

    /// Empty when the connection was never introspected.
    async fn get(&self, connection_id: Uuid) -> Result<Catalog, StoreError>;

    async fn get_table(&self, table_id: Uuid) -> Result<Option<DiscoveredTable>, StoreError>;

    async fn get_relations(&self, connection_id: Uuid)
    -> Result<Vec<DiscoveredRelation>, StoreError>;

    /// Returns the number of tables removed.
    async fn delete(&self, connection_id: Uuid) -> Result<u64, StoreError>;
}

#[derive(Clone)]
pub struct SeaOrmMetadataStore {
    db: DatabaseConnection,
}

impl SeaOrmMetadataStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

async fn table_ids<C: ConnectionTrait>(db: &C, connection_id: Uuid) -> Result<Vec<Uuid>, DbErr> {
    discovered_table::Entity::find()
        .select_only()
        .column(discovered_table::Column::Id)
        .filter(discovered_table::Column::ConnectionId.eq(connection_id))
        .into_tuple()
        .all(db)
        .await
}

/// Delete relations, columns and tables in dependency order. Cascades are not
/// relied on since SQLite may run with foreign keys off.
async fn delete_catalog<C: ConnectionTrait>(db: &C, connection_id: Uuid) -> Result<u64, DbErr> {
    discovered_relation::Entity::delete_many()
        .filter(discovered_relation::Column::ConnectionId.eq(connection_id))
        .exec(db)
        .await?;

    let ids = table_ids(db, connection_id).await?;
    for chunk in ids.chunks(INSERT_BATCH) {
        discovered_column::Entity::delete_many()
            .filter(discovered_column::Column::DiscoveredTableId.is_in(chunk.to_vec()))
            .exec(db)
            .await?;
    }

    let res = discovered_table::Entity::delete_many()
        .filter(discovered_table::Column::ConnectionId.eq(connection_id))
        .exec(db)
        .await?;
    Ok(res.rows_affected)
}

fn table_row(t: &DiscoveredTable, now: NaiveDateTime) -> discovered_table::ActiveModel {
    discovered_table::ActiveModel {
        id: Set(t.id),
        connection_id: Set(t.connection_id),
        schema_name: Set(t.schema_name.clone()),
        table_name: Set(t.table_name.clone()),
        table_type: Set(t.table_type.as_str().to_string()),
        comment: Set(t.comment.clone()),
        discovered_at: Set(now),
    }
}

fn column_row(c: &DiscoveredColumn, now: NaiveDateTime) -> discovered_column::ActiveModel {
    discovered_column::ActiveModel {
        id: Set(c.id),
        discovered_table_id: Set(c.table_id),
        column_name: Set(c.column_name.clone()),
        ordinal_position: Set(c.ordinal_position),
        data_type: Set(c.data_type.as_str().to_string()),
        native_type: Set(c.native_type.clone()),
        is_nullable: Set(c.is_nullable),
        is_primary_key: Set(c.is_primary_key),
        is_foreign_key: Set(c.is_foreign_key),
        foreign_key_table: Set(c.foreign_key_table.clone()),
        foreign_key_column: Set(c.foreign_key_column.clone()),
        is_unique: Set(c.is_unique),
        column_default: Set(c.default_value.clone()),
        max_length: Set(c.max_length),
        numeric_precision: Set(c.precision),
        numeric_scale: Set(c.scale),
        discovered_at: Set(now),
    }
}

fn relation_row(r: &DiscoveredRelation, now: NaiveDateTime) -> discovered_relation::ActiveModel {
    discovered_relation::ActiveModel {
        id: Set(r.id),
        connection_id: Set(r.connection_id),
        source_table_id: Set(r.source_table_id),
        target_table_id: Set(r.target_table_id),
        source_column_id: Set(r.source_column_id),
        target_column_id: Set(r.target_column_id),
        relation_type: Set(r.relation_type.as_str().to_string()),
        constraint_name: Set(r.constraint_name.clone()),
        on_delete: Set(r.on_delete.as_str().to_string()),
        on_update: Set(r.on_update.as_str().to_string()),
        discovered_at: Set(now),
    }
}

fn column_from_model(m: discovered_column::Model) -> DiscoveredColumn {
    DiscoveredColumn {
        id: m.id,
        table_id: m.discovered_table_id,
        column_name: m.column_name,
        data_type: DataType::parse(&m.data_type),
        native_type: m.native_type,
        is_nullable: m.is_nullable,
        is_primary_key: m.is_primary_key,
        is_foreign_key: m.is_foreign_key,
        foreign_key_table: m.foreign_key_table,
        foreign_key_column: m.foreign_key_column,
        is_unique: m.is_unique,
        default_value: m.column_default,
        max_length: m.max_length,
        precision: m.numeric_precision,
        scale: m.numeric_scale,
        ordinal_position: m.ordinal_position,
    }
}

fn table_from_model(m: discovered_table::Model, columns: Vec<DiscoveredColumn>) -> DiscoveredTable {
    DiscoveredTable {
        id: m.id,
        connection_id: m.connection_id,
        schema_name: m.schema_name,
        table_name: m.table_name,
        table_type: TableKind::parse(&m.table_type),
        comment: m.comment,
        columns,
    }
}

fn relation_from_model(m: discovered_relation::Model) -> DiscoveredRelation {
    DiscoveredRelation {
        id: m.id,
        connection_id: m.connection_id,
        source_table_id: m.source_table_id,
        target_table_id: m.target_table_id,
        source_column_id: m.source_column_id,
        target_column_id: m.target_column_id,
        relation_type: RelationType::parse(&m.relation_type),
        constraint_name: m.constraint_name,
        on_delete: ReferentialAction::parse(&m.on_delete),
        on_update: ReferentialAction::parse(&m.on_update),
    }
}

#[async_trait]
impl MetadataStore for SeaOrmMetadataStore {
    async fn replace(
        &self,
        connection_id: Uuid,
        tables: &[DiscoveredTable],
        relations: &[DiscoveredRelation],
    ) -> Result<(), StoreError> {
        let txn = self.db.begin().await?;
        let now = Utc::now().naive_utc();

        let removed = delete_catalog(&txn, connection_id).await?;

        for chunk in tables.chunks(INSERT_BATCH) {
            discovered_table::Entity::insert_many(chunk.iter().map(|t| table_row(t, now)))
                .exec_without_returning(&txn)
                .await?;
        }

        let columns: Vec<&DiscoveredColumn> = tables.iter().flat_map(|t| t.columns.iter()).collect();
        for chunk in columns.chunks(INSERT_BATCH) {
            discovered_column::Entity::insert_many(chunk.iter().map(|c| column_row(c, now)))
                .exec_without_returning(&txn)
                .await?;
        }

        for chunk in relations.chunks(INSERT_BATCH) {
            discovered_relation::Entity::insert_many(chunk.iter().map(|r| relation_row(r, now)))
                .exec_without_returning(&txn)
                .await?;
        }

        txn.commit().await?;

        tracing::debug!(
            %connection_id,
            removed_tables = removed,
            tables = tables.len(),
            columns = columns.len(),
            relations = relations.len(),
            "catalog replaced"
        );
        Ok(())
    }

    async fn get(&self, connection_id: Uuid) -> Result<Catalog, StoreError> {
        let table_models = discovered_table::Entity::find()
            .filter(discovered_table::Column::ConnectionId.eq(connection_id))
            .order_by_asc(discovered_table::Column::SchemaName)
            .order_by_asc(discovered_table::Column::TableName)
            .all(&self.db)
            .await?;

        let mut columns_by_table: HashMap<Uuid, Vec<DiscoveredColumn>> = HashMap::new();
        let ids: Vec<Uuid> = table_models.iter().map(|t| t.id).collect();
        for chunk in ids.chunks(INSERT_BATCH) {
            let column_models = discovered_column::Entity::find()
                .filter(discovered_column::Column::DiscoveredTableId.is_in(chunk.to_vec()))
                .order_by_asc(discovered_column::Column::DiscoveredTableId)
                .order_by_asc(discovered_column::Column::OrdinalPosition)
                .all(&self.db)
                .await?;
            for m in column_models {
                columns_by_table
                    .entry(m.discovered_table_id)
                    .or_default()
                    .push(column_from_model(m));
            }
        }

        let tables = table_models
            .into_iter()
            .map(|m| {
                let columns = columns_by_table.remove(&m.id).unwrap_or_default();
                table_from_model(m, columns)
            })
            .collect();

        Ok(Catalog {
            tables,
            relations: self.get_relations(connection_id).await?,
        })
    }

    async fn get_table(&self, table_id: Uuid) -> Result<Option<DiscoveredTable>, StoreError> {
        let Some(model) = discovered_table::Entity::find_by_id(table_id)
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };

        let columns = discovered_column::Entity::find()
            .filter(discovered_column::Column::DiscoveredTableId.eq(table_id))
            .order_by_asc(discovered_column::Column::OrdinalPosition)
            .all(&self.db)
            .await?
            .into_iter()
            .map(column_from_model)
            .collect();

        Ok(Some(table_from_model(model, columns)))
    }

    async fn get_relations(
        &self,
        connection_id: Uuid,
    ) -> Result<Vec<DiscoveredRelation>, StoreError> {
        let models = discovered_relation::Entity::find()
            .filter(discovered_relation::Column::ConnectionId.eq(connection_id))
            .order_by_asc(discovered_relation::Column::ConstraintName)
            .order_by_asc(discovered_relation::Column::Id)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(relation_from_model).collect())
    }

    async fn delete(&self, connection_id: Uuid) -> Result<u64, StoreError> {
        let txn = self.db.begin().await?;
        let removed = delete_catalog(&txn, connection_id).await?;
        txn.commit().await?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::connection;
    use crate::inference::infer;
    use crate::inspector::{RawCatalog, RawColumn, RawForeignKey, RawKey, RawTable};
    use crate::model::Dialect;
    use crate::normalizer::normalize;
    use migration::MigratorTrait as _;
    use sea_orm::{ActiveModelTrait, Database};

    async fn setup_db() -> DatabaseConnection {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        migration::Migrator::up(&db, None).await.unwrap();
        db
    }

    async fn add_connection(db: &DatabaseConnection, name: &str) -> Uuid {
        let id = Uuid::now_v7();
        let now = Utc::now().naive_utc();
        connection::ActiveModel {
            id: Set(id),
            name: Set(name.to_string()),
            dialect: Set("sqlite".to_string()),
            host: Set(String::new()),
            port: Set(0),
            database_name: Set(format!("{name}.db")),
            namespace: Set(None),
            username: Set(String::new()),
            password: Set(String::new()),
            status: Set("inactive".to_string()),
            last_introspection_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await
        .unwrap();
        id
    }

    fn raw_column(table: &str, name: &str, pos: i32, ty: &str) -> RawColumn {
        RawColumn {
            table_name: table.to_string(),
            column_name: name.to_string(),
            ordinal_position: Some(pos),
            data_type: ty.to_string(),
            is_nullable: pos > 1,
            column_default: None,
            max_length: None,
            precision: None,
            scale: None,
        }
    }

    /// users <- posts, normalized and inferred.
    fn catalog(connection_id: Uuid, with_posts: bool) -> (Vec<DiscoveredTable>, Vec<DiscoveredRelation>) {
        let mut raw = RawCatalog::empty(Dialect::Sqlite, "main");
        raw.tables.push(RawTable {
            table_name: "users".to_string(),
            table_type: "table".to_string(),
            comment: None,
        });
        raw.columns.push(raw_column("users", "id", 1, "INTEGER"));
        raw.columns.push(raw_column("users", "email", 2, "VARCHAR(255)"));
        raw.primary_keys.push(RawKey {
            table_name: "users".to_string(),
            constraint_name: "pk_users".to_string(),
            columns: vec!["id".to_string()],
        });
        if with_posts {
            raw.tables.push(RawTable {
                table_name: "posts".to_string(),
                table_type: "table".to_string(),
                comment: None,
            });
            raw.columns.push(raw_column("posts", "id", 1, "INTEGER"));
            raw.columns.push(raw_column("posts", "user_id", 2, "INTEGER"));
            raw.foreign_keys.push(RawForeignKey {
                table_name: "posts".to_string(),
                constraint_name: "fk_posts_0".to_string(),
                columns: vec!["user_id".to_string()],
                referenced_schema: None,
                referenced_table: "users".to_string(),
                referenced_columns: vec!["id".to_string()],
                on_delete: "CASCADE".to_string(),
                on_update: "NO ACTION".to_string(),
            });
        }
        let mut tables = normalize(connection_id, &raw).tables;
        let relations = infer(&mut tables, &raw).relations;
        (tables, relations)
    }

    #[tokio::test]
    async fn test_get_is_empty_before_first_replace() {
        let db = setup_db().await;
        let store = SeaOrmMetadataStore::new(db.clone());
        let conn = add_connection(&db, "fresh").await;

        let catalog = store.get(conn).await.unwrap();
        assert!(catalog.is_empty());
    }

    #[tokio::test]
    async fn test_replace_round_trips_and_replaces() {
        let db = setup_db().await;
        let store = SeaOrmMetadataStore::new(db.clone());
        let conn = add_connection(&db, "blog").await;

        let (tables, relations) = catalog(conn, true);
        store.replace(conn, &tables, &relations).await.unwrap();

        let stored = store.get(conn).await.unwrap();
        // Stored order is by name: posts, users.
        let mut expected = tables.clone();
        expected.sort_by(|a, b| a.table_name.cmp(&b.table_name));
        assert_eq!(stored.tables, expected);
        assert_eq!(stored.relations, relations);

        let users = store.get_table(expected[1].id).await.unwrap().unwrap();
        assert_eq!(users.columns[1].max_length, Some(255));

        // Refresh drops what disappeared from the source.
        let (tables, relations) = catalog(conn, false);
        store.replace(conn, &tables, &relations).await.unwrap();
        let stored = store.get(conn).await.unwrap();
        assert_eq!(stored.tables.len(), 1);
        assert!(stored.relations.is_empty());
        assert!(store.get_table(expected[0].id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_replace_keeps_previous_catalog() {
        let db = setup_db().await;
        let store = SeaOrmMetadataStore::new(db.clone());
        let conn = add_connection(&db, "atomic").await;

        let (tables, relations) = catalog(conn, true);
        store.replace(conn, &tables, &relations).await.unwrap();
        let before = store.get(conn).await.unwrap();

        // Same (connection, schema, table) twice violates the unique index
        // after the old rows were already deleted inside the transaction.
        let (mut broken, _) = catalog(conn, false);
        let mut dup = broken[0].clone();
        dup.id = Uuid::now_v7();
        dup.columns.clear();
        broken.push(dup);

        assert!(store.replace(conn, &broken, &[]).await.is_err());
        let after = store.get(conn).await.unwrap();
        assert_eq!(after.tables, before.tables);
        assert_eq!(after.relations, before.relations);
    }

    #[tokio::test]
    async fn test_delete_only_touches_one_connection() {
        let db = setup_db().await;
        let store = SeaOrmMetadataStore::new(db.clone());
        let a = add_connection(&db, "a").await;
        let b = add_connection(&db, "b").await;

        let (tables, relations) = catalog(a, true);
        store.replace(a, &tables, &relations).await.unwrap();
        let (tables, relations) = catalog(b, true);
        store.replace(b, &tables, &relations).await.unwrap();

        assert_eq!(store.delete(a).await.unwrap(), 2);
        assert!(store.get(a).await.unwrap().is_empty());
        assert_eq!(store.get(b).await.unwrap().tables.len(), 2);
        assert_eq!(store.delete(a).await.unwrap(), 0);
    }
}
