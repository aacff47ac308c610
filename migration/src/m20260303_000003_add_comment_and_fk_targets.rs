use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // SQLite takes one column per ALTER TABLE.
        manager
            .alter_table(
                Table::alter()
                    .table(DiscoveredTable::Table)
                    .add_column(ColumnDef::new(DiscoveredTable::Comment).text().null())
                    .to_owned(),
            )
            .await?;
        manager
            .alter_table(
                Table::alter()
                    .table(DiscoveredColumn::Table)
                    .add_column(ColumnDef::new(DiscoveredColumn::ForeignKeyTable).string().null())
                    .to_owned(),
            )
            .await?;
        manager
            .alter_table(
                Table::alter()
                    .table(DiscoveredColumn::Table)
                    .add_column(ColumnDef::new(DiscoveredColumn::ForeignKeyColumn).string().null())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .alter_table(
                Table::alter()
                    .table(DiscoveredColumn::Table)
                    .drop_column(DiscoveredColumn::ForeignKeyColumn)
                    .to_owned(),
            )
            .await?;
        manager
            .alter_table(
                Table::alter()
                    .table(DiscoveredColumn::Table)
                    .drop_column(DiscoveredColumn::ForeignKeyTable)
                    .to_owned(),
            )
            .await?;
        manager
            .alter_table(
                Table::alter()
                    .table(DiscoveredTable::Table)
                    .drop_column(DiscoveredTable::Comment)
                    .to_owned(),
            )
            .await
    }
}

#[derive(Iden)]
enum DiscoveredTable {
    Table,
    Comment,
}

#[derive(Iden)]
enum DiscoveredColumn {
    Table,
    ForeignKeyTable,
    ForeignKeyColumn,
}
