use sea_orm::entity::prelude::*;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "discovered_table")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub connection_id: Uuid,
    pub schema_name: String,
    pub table_name: String,
    /// "table" or "view"
    pub table_type: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub comment: Option<String>,
    pub discovered_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::connection::Entity",
        from = "Column::ConnectionId",
        to = "super::connection::Column::Id",
        on_delete = "Cascade"
    )]
    Connection,
    #[sea_orm(has_many = "super::discovered_column::Entity")]
    DiscoveredColumn,
}

impl Related<super::connection::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Connection.def()
    }
}

impl Related<super::discovered_column::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DiscoveredColumn.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
