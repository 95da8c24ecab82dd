//! Migration: One live document per order, one event per sequence, and the
//! replaced signing of contingency documents.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

// Partial indexes are not expressible through the index builder.
const CREATE_ORDER_INDEX: &str = "CREATE UNIQUE INDEX uq_fiscal_documents_order \
     ON fiscal_documents (tenant_id, model, order_ref) WHERE status <> 'rejected'";

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .alter_table(
                Table::alter()
                    .table(FiscalDocuments::Table)
                    .add_column(ColumnDef::new(FiscalDocuments::ReplacedIssue).json_binary().null())
                    .to_owned(),
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(CREATE_ORDER_INDEX)
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_fiscal_documents_order")
                    .table(FiscalDocuments::Table)
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
        manager
            .create_index(
                Index::create()
                    .name("uq_fiscal_events_sequence")
                    .table(FiscalEvents::Table)
                    .col(FiscalEvents::DocumentId)
                    .col(FiscalEvents::EventType)
                    .col(FiscalEvents::Sequence)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("uq_fiscal_events_sequence")
                    .table(FiscalEvents::Table)
                    .to_owned(),
            )
            .await?;
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
                    .name("idx_fiscal_documents_order")
                    .table(FiscalDocuments::Table)
                    .col(FiscalDocuments::TenantId)
                    .col(FiscalDocuments::Model)
                    .col(FiscalDocuments::OrderRef)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("uq_fiscal_documents_order")
                    .table(FiscalDocuments::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .alter_table(
                Table::alter()
                    .table(FiscalDocuments::Table)
                    .drop_column(FiscalDocuments::ReplacedIssue)
                    .to_owned(),
            )
            .await
    }
}

#[derive(Iden)]
enum FiscalDocuments {
    Table,
    TenantId,
    Model,
    OrderRef,
    ReplacedIssue,
}

#[derive(Iden)]
enum FiscalEvents {
    Table,
    DocumentId,
    EventType,
    Sequence,
}
