use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // discovered_table
        manager
            .create_table(
                Table::create()
                    .table(DiscoveredTable::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DiscoveredTable::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(DiscoveredTable::ConnectionId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DiscoveredTable::SchemaName)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DiscoveredTable::TableName)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DiscoveredTable::TableType)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DiscoveredTable::DiscoveredAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(DiscoveredTable::Table, DiscoveredTable::ConnectionId)
                            .to(Connection::Table, Connection::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .unique()
                    .name("uq_discovered_table_conn_schema_name")
                    .table(DiscoveredTable::Table)
                    .col(DiscoveredTable::ConnectionId)
                    .col(DiscoveredTable::SchemaName)
                    .col(DiscoveredTable::TableName)
                    .to_owned(),
            )
            .await?;

        // discovered_column
        manager
            .create_table(
                Table::create()
                    .table(DiscoveredColumn::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DiscoveredColumn::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(DiscoveredColumn::DiscoveredTableId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DiscoveredColumn::ColumnName)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DiscoveredColumn::OrdinalPosition)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DiscoveredColumn::DataType)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DiscoveredColumn::NativeType)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DiscoveredColumn::IsNullable)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(DiscoveredColumn::IsPrimaryKey)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(DiscoveredColumn::IsForeignKey)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(DiscoveredColumn::IsUnique)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(DiscoveredColumn::ColumnDefault)
                            .text()
                            .null(),
                    )
                    .col(ColumnDef::new(DiscoveredColumn::MaxLength).integer().null())
                    .col(
                        ColumnDef::new(DiscoveredColumn::NumericPrecision)
                            .integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(DiscoveredColumn::NumericScale)
                            .integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(DiscoveredColumn::DiscoveredAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(DiscoveredColumn::Table, DiscoveredColumn::DiscoveredTableId)
                            .to(DiscoveredTable::Table, DiscoveredTable::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .unique()
                    .name("uq_discovered_column_table_name")
                    .table(DiscoveredColumn::Table)
                    .col(DiscoveredColumn::DiscoveredTableId)
                    .col(DiscoveredColumn::ColumnName)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .unique()
                    .name("uq_discovered_column_table_ordinal")
                    .table(DiscoveredColumn::Table)
                    .col(DiscoveredColumn::DiscoveredTableId)
                    .col(DiscoveredColumn::OrdinalPosition)
                    .to_owned(),
            )
            .await?;

        // discovered_relation
        manager
            .create_table(
                Table::create()
                    .table(DiscoveredRelation::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DiscoveredRelation::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(DiscoveredRelation::ConnectionId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DiscoveredRelation::SourceTableId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DiscoveredRelation::TargetTableId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DiscoveredRelation::SourceColumnId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DiscoveredRelation::TargetColumnId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DiscoveredRelation::RelationType)
                            .string()
                            .not_null()
                            .default("many_to_one"),
                    )
                    .col(
                        ColumnDef::new(DiscoveredRelation::ConstraintName)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DiscoveredRelation::OnDelete)
                            .string()
                            .not_null()
                            .default("no_action"),
                    )
                    .col(
                        ColumnDef::new(DiscoveredRelation::OnUpdate)
                            .string()
                            .not_null()
                            .default("no_action"),
                    )
                    .col(
                        ColumnDef::new(DiscoveredRelation::DiscoveredAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(DiscoveredRelation::Table, DiscoveredRelation::ConnectionId)
                            .to(Connection::Table, Connection::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(DiscoveredRelation::Table, DiscoveredRelation::SourceTableId)
                            .to(DiscoveredTable::Table, DiscoveredTable::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(DiscoveredRelation::Table, DiscoveredRelation::TargetTableId)
                            .to(DiscoveredTable::Table, DiscoveredTable::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(DiscoveredRelation::Table, DiscoveredRelation::SourceColumnId)
                            .to(DiscoveredColumn::Table, DiscoveredColumn::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(DiscoveredRelation::Table, DiscoveredRelation::TargetColumnId)
                            .to(DiscoveredColumn::Table, DiscoveredColumn::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // One relation per FK source column.
        manager
            .create_index(
                Index::create()
                    .unique()
                    .name("uq_discovered_relation_source_column")
                    .table(DiscoveredRelation::Table)
                    .col(DiscoveredRelation::SourceColumnId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DiscoveredRelation::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(DiscoveredColumn::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(DiscoveredTable::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Connection {
    Table,
    Id,
}

#[derive(Iden)]
enum DiscoveredTable {
    Table,
    Id,
    ConnectionId,
    SchemaName,
    TableName,
    TableType,
    DiscoveredAt,
}

#[derive(Iden)]
enum DiscoveredColumn {
    Table,
    Id,
    DiscoveredTableId,
    ColumnName,
    OrdinalPosition,
    DataType,
    NativeType,
    IsNullable,
    IsPrimaryKey,
    IsForeignKey,
    IsUnique,
    ColumnDefault,
    MaxLength,
    NumericPrecision,
    NumericScale,
    DiscoveredAt,
}

#[derive(Iden)]
enum DiscoveredRelation {
    Table,
    Id,
    ConnectionId,
    SourceTableId,
    TargetTableId,
    SourceColumnId,
    TargetColumnId,
    RelationType,
    ConstraintName,
    OnDelete,
    OnUpdate,
    DiscoveredAt,
}
