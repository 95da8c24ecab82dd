//! Database migrations.
//!
//! Migration names follow the pattern: m{YYYYMMDD}_{NNNNNN}_{description}

use sea_orm_migration::prelude::*;

mod m20241101_000001_create_fiscal_tables;
mod m20241101_000002_add_fiscal_indexes;
mod m20241101_000003_add_document_guards;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20241101_000001_create_fiscal_tables::Migration),
            Box::new(m20241101_000002_add_fiscal_indexes::Migration),
            Box::new(m20241101_000003_add_document_guards::Migration),
        ]
    }
}
