//! Migration: Create fiscal profile, sequence, document, event and
//! inutilization tables.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(FiscalProfiles::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(FiscalProfiles::TenantId).uuid().not_null().primary_key())
                    .col(ColumnDef::new(FiscalProfiles::Issuer).json_binary().not_null())
                    .col(ColumnDef::new(FiscalProfiles::Uf).string_len(2).not_null())
                    .col(ColumnDef::new(FiscalProfiles::Environment).string_len(16).not_null())
                    .col(ColumnDef::new(FiscalProfiles::NfeSeries).integer().not_null())
                    .col(ColumnDef::new(FiscalProfiles::NfceSeries).integer().not_null())
                    .col(ColumnDef::new(FiscalProfiles::CscId).string_len(6).null())
                    .col(ColumnDef::new(FiscalProfiles::CscToken).string_len(36).null())
                    .col(ColumnDef::new(FiscalProfiles::CertificatePath).string().not_null())
                    .col(ColumnDef::new(FiscalProfiles::PrivateKeyPath).string().not_null())
                    .col(
                        ColumnDef::new(FiscalProfiles::AllowOfflineContingency)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(FiscalProfiles::CancelWindowHours)
                            .integer()
                            .not_null()
                            .default(24),
                    )
                    .col(
                        ColumnDef::new(FiscalProfiles::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(FiscalProfiles::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FiscalSequences::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(FiscalSequences::TenantId).uuid().not_null())
                    .col(ColumnDef::new(FiscalSequences::Model).string_len(8).not_null())
                    .col(ColumnDef::new(FiscalSequences::Series).integer().not_null())
                    .col(ColumnDef::new(FiscalSequences::NextNumber).big_integer().not_null())
                    .col(
                        ColumnDef::new(FiscalSequences::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .primary_key(
                        Index::create()
                            .col(FiscalSequences::TenantId)
                            .col(FiscalSequences::Model)
                            .col(FiscalSequences::Series),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FiscalDocuments::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(FiscalDocuments::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(FiscalDocuments::TenantId).uuid().not_null())
                    .col(ColumnDef::new(FiscalDocuments::OrderRef).string_len(60).not_null())
                    .col(ColumnDef::new(FiscalDocuments::Model).string_len(8).not_null())
                    .col(ColumnDef::new(FiscalDocuments::Series).integer().not_null())
                    .col(ColumnDef::new(FiscalDocuments::Number).big_integer().not_null())
                    .col(
                        ColumnDef::new(FiscalDocuments::AccessKey)
                            .string_len(44)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(FiscalDocuments::Environment).string_len(16).not_null())
                    .col(ColumnDef::new(FiscalDocuments::EmissionType).string_len(16).not_null())
                    .col(ColumnDef::new(FiscalDocuments::Status).string_len(16).not_null())
                    .col(ColumnDef::new(FiscalDocuments::Total).decimal_len(15, 2).not_null())
                    .col(ColumnDef::new(FiscalDocuments::Draft).json_binary().not_null())
                    .col(ColumnDef::new(FiscalDocuments::Totals).json_binary().not_null())
                    .col(ColumnDef::new(FiscalDocuments::SignedXml).text().not_null())
                    .col(ColumnDef::new(FiscalDocuments::AuthorizedXml).text().null())
                    .col(ColumnDef::new(FiscalDocuments::QrCode).text().null())
                    .col(ColumnDef::new(FiscalDocuments::ReceiptNumber).string_len(15).null())
                    .col(ColumnDef::new(FiscalDocuments::Protocol).string_len(15).null())
                    .col(ColumnDef::new(FiscalDocuments::StatusCode).integer().null())
                    .col(ColumnDef::new(FiscalDocuments::StatusMessage).string().null())
                    .col(
                        ColumnDef::new(FiscalDocuments::Attempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(FiscalDocuments::NextAttemptAt).timestamp_with_time_zone().null())
                    .col(ColumnDef::new(FiscalDocuments::IssuedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(FiscalDocuments::AuthorizedAt).timestamp_with_time_zone().null())
                    .col(ColumnDef::new(FiscalDocuments::CancelledAt).timestamp_with_time_zone().null())
                    .col(
                        ColumnDef::new(FiscalDocuments::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(FiscalDocuments::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FiscalEvents::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(FiscalEvents::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(FiscalEvents::TenantId).uuid().not_null())
                    .col(ColumnDef::new(FiscalEvents::DocumentId).uuid().not_null())
                    .col(ColumnDef::new(FiscalEvents::EventType).string_len(32).not_null())
                    .col(ColumnDef::new(FiscalEvents::Sequence).integer().not_null())
                    .col(ColumnDef::new(FiscalEvents::Payload).json_binary().not_null())
                    .col(ColumnDef::new(FiscalEvents::StatusCode).integer().not_null())
                    .col(ColumnDef::new(FiscalEvents::StatusMessage).string().not_null())
                    .col(ColumnDef::new(FiscalEvents::Protocol).string_len(15).null())
                    .col(ColumnDef::new(FiscalEvents::Xml).text().not_null())
                    .col(
                        ColumnDef::new(FiscalEvents::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_fiscal_events_document")
                            .from(FiscalEvents::Table, FiscalEvents::DocumentId)
                            .to(FiscalDocuments::Table, FiscalDocuments::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FiscalInutilizations::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(FiscalInutilizations::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(FiscalInutilizations::TenantId).uuid().not_null())
                    .col(ColumnDef::new(FiscalInutilizations::Model).string_len(8).not_null())
                    .col(ColumnDef::new(FiscalInutilizations::Series).integer().not_null())
                    .col(ColumnDef::new(FiscalInutilizations::StartNumber).big_integer().not_null())
                    .col(ColumnDef::new(FiscalInutilizations::EndNumber).big_integer().not_null())
                    .col(ColumnDef::new(FiscalInutilizations::Justification).string_len(255).not_null())
                    .col(ColumnDef::new(FiscalInutilizations::StatusCode).integer().not_null())
                    .col(ColumnDef::new(FiscalInutilizations::StatusMessage).string().not_null())
                    .col(ColumnDef::new(FiscalInutilizations::Protocol).string_len(15).null())
                    .col(ColumnDef::new(FiscalInutilizations::Xml).text().not_null())
                    .col(
                        ColumnDef::new(FiscalInutilizations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(FiscalInutilizations::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(FiscalEvents::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(FiscalDocuments::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(FiscalSequences::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(FiscalProfiles::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum FiscalProfiles {
    Table,
    TenantId,
    Issuer,
    Uf,
    Environment,
    NfeSeries,
    NfceSeries,
    CscId,
    CscToken,
    CertificatePath,
    PrivateKeyPath,
    AllowOfflineContingency,
    CancelWindowHours,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum FiscalSequences {
    Table,
    TenantId,
    Model,
    Series,
    NextNumber,
    UpdatedAt,
}

#[derive(Iden)]
enum FiscalDocuments {
    Table,
    Id,
    TenantId,
    OrderRef,
    Model,
    Series,
    Number,
    AccessKey,
    Environment,
    EmissionType,
    Status,
    Total,
    Draft,
    Totals,
    SignedXml,
    AuthorizedXml,
    QrCode,
    ReceiptNumber,
    Protocol,
    StatusCode,
    StatusMessage,
    Attempts,
    NextAttemptAt,
    IssuedAt,
    AuthorizedAt,
    CancelledAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum FiscalEvents {
    Table,
    Id,
    TenantId,
    DocumentId,
    EventType,
    Sequence,
    Payload,
    StatusCode,
    StatusMessage,
    Protocol,
    Xml,
    CreatedAt,
}

#[derive(Iden)]
enum FiscalInutilizations {
    Table,
    Id,
    TenantId,
    Model,
    Series,
    StartNumber,
    EndNumber,
    Justification,
    StatusCode,
    StatusMessage,
    Protocol,
    Xml,
    CreatedAt,
}
