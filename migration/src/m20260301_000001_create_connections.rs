use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Connection::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Connection::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Connection::Name)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Connection::Dialect).string().not_null())
                    .col(
                        ColumnDef::new(Connection::Host)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(Connection::Port)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Connection::DatabaseName).string().not_null())
                    .col(ColumnDef::new(Connection::Namespace).string().null())
                    .col(
                        ColumnDef::new(Connection::Username)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(Connection::Password)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(Connection::Status)
                            .string()
                            .not_null()
                            .default("inactive"),
                    )
                    .col(
                        ColumnDef::new(Connection::LastIntrospectionAt)
                            .timestamp()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Connection::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Connection::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Connection::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Connection {
    Table,
    Id,
    Name,
    Dialect,
    Host,
    Port,
    DatabaseName,
    Namespace,
    Username,
    Password,
    Status,
    LastIntrospectionAt,
    CreatedAt,
    UpdatedAt,
}
