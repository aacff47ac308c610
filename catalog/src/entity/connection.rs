use sea_orm::entity::prelude::*;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "connection")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub name: String,
    /// "postgresql", "mysql" or "sqlite"
    pub dialect: String,
    pub host: String,
    pub port: i32,
    /// Database name, or the file path for SQLite.
    pub database_name: String,
    pub namespace: Option<String>,
    pub username: String,
    pub password: String,
    /// "inactive", "active" or "error". Written only by the introspection run.
    pub status: String,
    pub last_introspection_at: Option<DateTime>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::discovered_table::Entity")]
    DiscoveredTable,
}

impl Related<super::discovered_table::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DiscoveredTable.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
