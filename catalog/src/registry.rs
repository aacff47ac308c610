use std::fmt;

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, DbErr, EntityTrait, QueryOrder, Set};
use serde::Serialize;
use uuid::Uuid;

use crate::entity::connection;
use crate::model::{ConnectionConfig, ConnectionStatus, Dialect};

#[derive(Debug)]
pub enum RegistryError {
    Database(DbErr),
    /// A stored row that cannot be turned into a usable connection.
    InvalidRecord { id: Uuid, reason: String },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::Database(e) => write!(f, "Connection registry error: {e}"),
            RegistryError::InvalidRecord { id, reason } => {
                write!(f, "Invalid connection record {id}: {reason}")
            }
        }
    }
}

impl std::error::Error for RegistryError {}

impl From<DbErr> for RegistryError {
    fn from(e: DbErr) -> Self {
        RegistryError::Database(e)
    }
}

/// Where connection settings live and where run outcomes are recorded.
#[async_trait]
pub trait ConnectionRegistry: Send + Sync {
    async fn connection_config(&self, id: Uuid) -> Result<Option<ConnectionConfig>, RegistryError>;

    /// Set the status; `last_introspection_at` of `None` leaves the stored
    /// timestamp as it was.
    async fn record_outcome(
        &self,
        id: Uuid,
        status: ConnectionStatus,
        last_introspection_at: Option<NaiveDateTime>,
    ) -> Result<(), RegistryError>;
}

/// Input for [`SeaOrmConnectionRegistry::register`].
#[derive(Debug, Clone)]
pub struct NewConnection {
    pub name: String,
    pub dialect: Dialect,
    pub host: String,
    /// Defaults to the dialect's standard port.
    pub port: Option<u16>,
    pub database: String,
    pub namespace: Option<String>,
    pub username: String,
    pub password: String,
}

/// Connection row as shown to operators (no password).
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionRecord {
    pub id: Uuid,
    pub name: String,
    pub dialect: String,
    pub host: String,
    pub port: i32,
    pub database: String,
    pub namespace: Option<String>,
    pub username: String,
    pub status: String,
    pub last_introspection_at: Option<NaiveDateTime>,
}

impl From<connection::Model> for ConnectionRecord {
    fn from(m: connection::Model) -> Self {
        Self {
            id: m.id,
            name: m.name,
            dialect: m.dialect,
            host: m.host,
            port: m.port,
            database: m.database_name,
            namespace: m.namespace,
            username: m.username,
            status: m.status,
            last_introspection_at: m.last_introspection_at,
        }
    }
}

fn config_from_model(m: connection::Model) -> Result<ConnectionConfig, RegistryError> {
    let id = m.id;
    let invalid = move |reason: String| RegistryError::InvalidRecord { id, reason };
    let dialect: Dialect = m.dialect.parse().map_err(invalid)?;
    let port = u16::try_from(m.port).map_err(|_| invalid(format!("port {} out of range", m.port)))?;

    Ok(ConnectionConfig {
        id: m.id,
        name: m.name,
        dialect,
        host: m.host,
        port,
        database: m.database_name,
        namespace: m.namespace.filter(|n| !n.trim().is_empty()),
        username: m.username,
        password: m.password,
    })
}

#[derive(Clone)]
pub struct SeaOrmConnectionRegistry {
    db: DatabaseConnection,
}

impl SeaOrmConnectionRegistry {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn register(&self, new: NewConnection) -> Result<ConnectionRecord, RegistryError> {
        let now = Utc::now().naive_utc();
        let model = connection::ActiveModel {
            id: Set(Uuid::now_v7()),
            name: Set(new.name),
            dialect: Set(new.dialect.as_str().to_string()),
            host: Set(new.host),
            port: Set(i32::from(new.port.unwrap_or(new.dialect.default_port()))),
            database_name: Set(new.database),
            namespace: Set(new.namespace),
            username: Set(new.username),
            password: Set(new.password),
            status: Set(ConnectionStatus::Inactive.as_str().to_string()),
            last_introspection_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&self.db)
        .await?;

        tracing::info!(connection_id = %model.id, name = %model.name, dialect = %model.dialect, "Connection registered");
        Ok(model.into())
    }

    pub async fn list(&self) -> Result<Vec<ConnectionRecord>, RegistryError> {
        let models = connection::Entity::find()
            .order_by_asc(connection::Column::Name)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(ConnectionRecord::from).collect())
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<ConnectionRecord>, RegistryError> {
        let model = connection::Entity::find_by_id(id).one(&self.db).await?;
        Ok(model.map(ConnectionRecord::from))
    }
}

#[async_trait]
impl ConnectionRegistry for SeaOrmConnectionRegistry {
    async fn connection_config(&self, id: Uuid) -> Result<Option<ConnectionConfig>, RegistryError> {
        connection::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(config_from_model)
            .transpose()
    }

    async fn record_outcome(
        &self,
        id: Uuid,
        status: ConnectionStatus,
        last_introspection_at: Option<NaiveDateTime>,
    ) -> Result<(), RegistryError> {
        let Some(model) = connection::Entity::find_by_id(id).one(&self.db).await? else {
            return Err(RegistryError::Database(DbErr::RecordNotFound(format!(
                "connection {id}"
            ))));
        };

        let mut active: connection::ActiveModel = model.into();
        active.status = Set(status.as_str().to_string());
        if let Some(at) = last_introspection_at {
            active.last_introspection_at = Set(Some(at));
        }
        active.updated_at = Set(Utc::now().naive_utc());
        active.update(&self.db).await?;
        Ok(())
    }
}
