pub use sea_orm_migration::prelude::*;

mod m20260301_000001_create_connections;
mod m20260302_000002_create_catalog_tables;
mod m20260303_000003_add_comment_and_fk_targets;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260301_000001_create_connections::Migration),
            Box::new(m20260302_000002_create_catalog_tables::Migration),
            Box::new(m20260303_000003_add_comment_and_fk_targets::Migration),
        ]
    }
}
