use sea_orm::entity::prelude::*;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "discovered_column")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub discovered_table_id: Uuid,
    pub column_name: String,
    pub ordinal_position: i32,
    /// Normalized type tag (e.g. "varchar", "bigint", "unknown").
    pub data_type: String,
    /// Type text exactly as the source catalog reported it.
    pub native_type: String,
    pub is_nullable: bool,
    pub is_primary_key: bool,
    pub is_foreign_key: bool,
    pub foreign_key_table: Option<String>,
    pub foreign_key_column: Option<String>,
    pub is_unique: bool,
    pub column_default: Option<String>,
    pub max_length: Option<i32>,
    pub numeric_precision: Option<i32>,
    pub numeric_scale: Option<i32>,
    pub discovered_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::discovered_table::Entity",
        from = "Column::DiscoveredTableId",
        to = "super::discovered_table::Column::Id",
        on_delete = "Cascade"
    )]
    DiscoveredTable,
}

impl Related<super::discovered_table::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DiscoveredTable.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
