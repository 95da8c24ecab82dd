//! Migration: Indexes for order lookup, listings, the receipt poller and
//! number range checks.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

const DOCUMENT_INDEXES: [(&str, &[FiscalDocuments]); 4] = [
    (
        "idx_fiscal_documents_order",
        &[FiscalDocuments::TenantId, FiscalDocuments::Model, FiscalDocuments::OrderRef],
    ),
    (
        "idx_fiscal_documents_listing",
        &[FiscalDocuments::TenantId, FiscalDocuments::CreatedAt],
    ),
    (
        "idx_fiscal_documents_due",
        &[FiscalDocuments::Status, FiscalDocuments::NextAttemptAt],
    ),
    (
        "idx_fiscal_documents_number",
        &[
            FiscalDocuments::TenantId,
            FiscalDocuments::Model,
            FiscalDocuments::Series,
            FiscalDocuments::Number,
        ],
    ),
];

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for (name, columns) in DOCUMENT_INDEXES {
            let mut index = Index::create();
            index.name(name).table(FiscalDocuments::Table);
            for column in columns {
                index.col(*column);
            }
            manager.create_index(index.to_owned()).await?;
        }

        manager
            .create_index(
                Index::create()
                    .name("idx_fiscal_events_document")
                    .table(FiscalEvents::Table)
                    .col(FiscalEvents::DocumentId)
                    .col(FiscalEvents::EventType)
                    .col(FiscalEvents::Sequence)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_fiscal_inutilizations_range")
                    .table(FiscalInutilizations::Table)
                    .col(FiscalInutilizations::TenantId)
                    .col(FiscalInutilizations::Model)
                    .col(FiscalInutilizations::Series)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_fiscal_inutilizations_range")
                    .table(FiscalInutilizations::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_fiscal_events_document")
                    .table(FiscalEvents::Table)
                    .to_owned(),
            )
            .await?;

        for (name, _) in DOCUMENT_INDEXES {
            manager
                .drop_index(
                    Index::drop()
                        .name(name)
                        .table(FiscalDocuments::Table)
                        .to_owned(),
                )
                .await?;
        }
        Ok(())
    }
}

#[derive(Iden, Clone, Copy)]
enum FiscalDocuments {
    Table,
    TenantId,
    Model,
    OrderRef,
    Series,
    Number,
    Status,
    NextAttemptAt,
    CreatedAt,
}

#[derive(Iden)]
enum FiscalEvents {
    Table,
    DocumentId,
    EventType,
    Sequence,
}

#[derive(Iden)]
enum FiscalInutilizations {
    Table,
    TenantId,
    Model,
    Series,
}
