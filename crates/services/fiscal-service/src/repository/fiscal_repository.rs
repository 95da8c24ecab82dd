//! Fiscal repository: profiles, numbering, documents, events and
//! inutilizations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, LockBehavior, LockType, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, SqlErr, TransactionTrait,
};
use uuid::Uuid;

use super::entities::fiscal_document::{self, Entity as DocumentEntity};
use super::entities::fiscal_event::{self, Entity as EventEntity};
use super::entities::fiscal_inutilization::{self, Entity as InutilizationEntity};
use super::entities::fiscal_profile::{self, Entity as ProfileEntity};
use super::entities::fiscal_sequence::{self, Entity as SequenceEntity};
use common::{AppError, AppResult};
use domain::{
    DocumentFilter, DocumentStatus, EventKind, EventRecord, FiscalDocument, FiscalModel,
    FiscalProfile, InutilizationRecord, MAX_DOCUMENT_NUMBER,
};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// Storage of everything the fiscal service persists.
///
/// Queries are always scoped by tenant, except the poller's
/// `claim_due`.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait FiscalRepository: Send + Sync {
    /// Check the store is reachable
    async fn ping(&self) -> AppResult<()>;

    async fn find_profile(&self, tenant_id: Uuid) -> AppResult<Option<FiscalProfile>>;

    /// Insert or replace the tenant's profile
    async fn save_profile(&self, profile: &FiscalProfile) -> AppResult<()>;

    /// Allocate the next number of a series; never hands out a number twice
    async fn next_number(&self, tenant_id: Uuid, model: FiscalModel, series: u16) -> AppResult<u32>;

    /// Make sure numbers up to `last` are never allocated
    async fn reserve_through(
        &self,
        tenant_id: Uuid,
        model: FiscalModel,
        series: u16,
        last: u32,
    ) -> AppResult<()>;

    async fn find_document(&self, tenant_id: Uuid, id: Uuid) -> AppResult<Option<FiscalDocument>>;

    /// Latest document for the order that was not rejected
    async fn find_by_order(
        &self,
        tenant_id: Uuid,
        model: FiscalModel,
        order_ref: &str,
    ) -> AppResult<Option<FiscalDocument>>;

    /// Fails with `Conflict` when the order already has a live document
    async fn insert_document(&self, doc: &FiscalDocument) -> AppResult<()>;

    async fn update_document(&self, doc: &FiscalDocument) -> AppResult<()>;

    /// Page of documents, newest first, with the total count
    async fn list_documents(
        &self,
        tenant_id: Uuid,
        filter: &DocumentFilter,
        offset: u64,
        limit: u64,
    ) -> AppResult<(Vec<FiscalDocument>, u64)>;

    /// Pending documents whose next attempt is due, oldest first.
    ///
    /// Claimed rows get `next_attempt_at = lease_until`, so concurrent
    /// pollers skip them until the holder stores its result or the lease runs
    /// out.
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: u64,
    ) -> AppResult<Vec<FiscalDocument>>;

    /// Numbers in `start..=end` held by non-rejected documents
    async fn numbers_in_use(
        &self,
        tenant_id: Uuid,
        model: FiscalModel,
        series: u16,
        start: u32,
        end: u32,
    ) -> AppResult<Vec<u32>>;

    /// Highest registered sequence of an event kind, 0 when none
    async fn last_event_sequence(&self, document_id: Uuid, kind: EventKind) -> AppResult<u32>;

    /// Fails with `Conflict` when the sequence is already registered
    async fn insert_event(&self, event: &EventRecord) -> AppResult<()>;

    async fn list_events(&self, tenant_id: Uuid, document_id: Uuid) -> AppResult<Vec<EventRecord>>;

    async fn insert_inutilization(&self, record: &InutilizationRecord) -> AppResult<()>;

    /// Homologated inutilizations whose range intersects `start..=end`
    async fn overlapping_inutilizations(
        &self,
        tenant_id: Uuid,
        model: FiscalModel,
        series: u16,
        start: u32,
        end: u32,
    ) -> AppResult<Vec<InutilizationRecord>>;
}

/// Concrete implementation of FiscalRepository
pub struct FiscalStore {
    db: DatabaseConnection,
}

impl FiscalStore {
    /// Create new repository instance
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

const PENDING: [DocumentStatus; 4] = [
    DocumentStatus::Signed,
    DocumentStatus::Processing,
    DocumentStatus::Unconfirmed,
    DocumentStatus::Contingency,
];

/// Unique violations become `Conflict`, anything else stays a database error.
fn unique_violation(err: DbErr, entity: impl FnOnce() -> String) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => AppError::Conflict(entity()),
        _ => AppError::from(err),
    }
}

fn sequence_key(
    tenant_id: Uuid,
    model: FiscalModel,
    series: u16,
    next_number: i64,
) -> fiscal_sequence::ActiveModel {
    fiscal_sequence::ActiveModel {
        tenant_id: Set(tenant_id),
        model: Set(model.as_str().to_string()),
        series: Set(series.into()),
        next_number: Set(next_number),
        updated_at: Set(Utc::now()),
    }
}

#[async_trait]
impl FiscalRepository for FiscalStore {
    async fn ping(&self) -> AppResult<()> {
        self.db.ping().await?;
        Ok(())
    }

    async fn find_profile(&self, tenant_id: Uuid) -> AppResult<Option<FiscalProfile>> {
        ProfileEntity::find_by_id(tenant_id)
            .one(&self.db)
            .await
            .map_err(AppError::from)?
            .map(FiscalProfile::try_from)
            .transpose()
    }

    async fn save_profile(&self, profile: &FiscalProfile) -> AppResult<()> {
        let model = fiscal_profile::ActiveModel::from_domain(profile)?;
        ProfileEntity::insert(model)
            .on_conflict(
                OnConflict::column(fiscal_profile::Column::TenantId)
                    .update_columns([
                        fiscal_profile::Column::Issuer,
                        fiscal_profile::Column::Uf,
                        fiscal_profile::Column::Environment,
                        fiscal_profile::Column::NfeSeries,
                        fiscal_profile::Column::NfceSeries,
                        fiscal_profile::Column::CscId,
                        fiscal_profile::Column::CscToken,
                        fiscal_profile::Column::CertificatePath,
                        fiscal_profile::Column::PrivateKeyPath,
                        fiscal_profile::Column::AllowOfflineContingency,
                        fiscal_profile::Column::CancelWindowHours,
                        fiscal_profile::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await
            .map_err(AppError::from)?;
        Ok(())
    }

    async fn next_number(&self, tenant_id: Uuid, model: FiscalModel, series: u16) -> AppResult<u32> {
        let txn = self.db.begin().await.map_err(AppError::from)?;

        SequenceEntity::insert(sequence_key(tenant_id, model, series, 1))
            .on_conflict(
                OnConflict::columns([
                    fiscal_sequence::Column::TenantId,
                    fiscal_sequence::Column::Model,
                    fiscal_sequence::Column::Series,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(&txn)
            .await
            .map_err(AppError::from)?;

        let row = SequenceEntity::find_by_id((tenant_id, model.as_str().to_string(), i32::from(series)))
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(AppError::from)?
            .ok_or_else(|| AppError::Internal("Sequence row vanished inside its transaction".into()))?;

        let number = row.next_number;
        if number > i64::from(MAX_DOCUMENT_NUMBER) {
            txn.rollback().await.map_err(AppError::from)?;
            return Err(AppError::Validation(format!(
                "Series {} of model {} is exhausted",
                series, model
            )));
        }

        let mut active: fiscal_sequence::ActiveModel = row.into();
        active.next_number = Set(number + 1);
        active.updated_at = Set(Utc::now());
        active.update(&txn).await.map_err(AppError::from)?;
        txn.commit().await.map_err(AppError::from)?;

        Ok(number as u32)
    }

    async fn reserve_through(
        &self,
        tenant_id: Uuid,
        model: FiscalModel,
        series: u16,
        last: u32,
    ) -> AppResult<()> {
        let txn = self.db.begin().await.map_err(AppError::from)?;
        let after = i64::from(last) + 1;

        let existing = SequenceEntity::find_by_id((tenant_id, model.as_str().to_string(), i32::from(series)))
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(AppError::from)?;

        match existing {
            Some(row) if row.next_number >= after => {}
            Some(row) => {
                let mut active: fiscal_sequence::ActiveModel = row.into();
                active.next_number = Set(after);
                active.updated_at = Set(Utc::now());
                active.update(&txn).await.map_err(AppError::from)?;
            }
            None => {
                sequence_key(tenant_id, model, series, after)
                    .insert(&txn)
                    .await
                    .map_err(AppError::from)?;
            }
        }

        txn.commit().await.map_err(AppError::from)?;
        Ok(())
    }

    async fn find_document(&self, tenant_id: Uuid, id: Uuid) -> AppResult<Option<FiscalDocument>> {
        DocumentEntity::find_by_id(id)
            .filter(fiscal_document::Column::TenantId.eq(tenant_id))
            .one(&self.db)
            .await
            .map_err(AppError::from)?
            .map(FiscalDocument::try_from)
            .transpose()
    }

    async fn find_by_order(
        &self,
        tenant_id: Uuid,
        model: FiscalModel,
        order_ref: &str,
    ) -> AppResult<Option<FiscalDocument>> {
        DocumentEntity::find()
            .filter(fiscal_document::Column::TenantId.eq(tenant_id))
            .filter(fiscal_document::Column::Model.eq(model.as_str()))
            .filter(fiscal_document::Column::OrderRef.eq(order_ref))
            .filter(fiscal_document::Column::Status.ne(DocumentStatus::Rejected.as_str()))
            .order_by_desc(fiscal_document::Column::CreatedAt)
            .one(&self.db)
            .await
            .map_err(AppError::from)?
            .map(FiscalDocument::try_from)
            .transpose()
    }

    async fn insert_document(&self, doc: &FiscalDocument) -> AppResult<()> {
        DocumentEntity::insert(fiscal_document::ActiveModel::from_domain(doc)?)
            .exec_without_returning(&self.db)
            .await
            .map_err(|e| unique_violation(e, || format!("Document for order {}", doc.order_ref)))?;
        Ok(())
    }

    async fn update_document(&self, doc: &FiscalDocument) -> AppResult<()> {
        let mut model = fiscal_document::ActiveModel::from_domain(doc)?;
        model.updated_at = Set(Utc::now());
        model.update(&self.db).await.map_err(AppError::from)?;
        Ok(())
    }

    async fn list_documents(
        &self,
        tenant_id: Uuid,
        filter: &DocumentFilter,
        offset: u64,
        limit: u64,
    ) -> AppResult<(Vec<FiscalDocument>, u64)> {
        let mut query = DocumentEntity::find().filter(fiscal_document::Column::TenantId.eq(tenant_id));
        if let Some(status) = filter.status {
            query = query.filter(fiscal_document::Column::Status.eq(status.as_str()));
        }
        if let Some(model) = filter.model {
            query = query.filter(fiscal_document::Column::Model.eq(model.as_str()));
        }

        let total = query.clone().count(&self.db).await.map_err(AppError::from)?;
        let rows = query
            .order_by_desc(fiscal_document::Column::CreatedAt)
            .offset(offset)
            .limit(limit)
            .all(&self.db)
            .await
            .map_err(AppError::from)?;

        let docs = rows
            .into_iter()
            .map(FiscalDocument::try_from)
            .collect::<AppResult<Vec<_>>>()?;
        Ok((docs, total))
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: u64,
    ) -> AppResult<Vec<FiscalDocument>> {
        let txn = self.db.begin().await.map_err(AppError::from)?;

        let rows = DocumentEntity::find()
            .filter(fiscal_document::Column::Status.is_in(PENDING.iter().map(|s| s.as_str())))
            .filter(fiscal_document::Column::NextAttemptAt.lte(now))
            .order_by_asc(fiscal_document::Column::NextAttemptAt)
            .limit(limit)
            .lock_with_behavior(LockType::Update, LockBehavior::SkipLocked)
            .all(&txn)
            .await
            .map_err(AppError::from)?;

        if !rows.is_empty() {
            DocumentEntity::update_many()
                .col_expr(fiscal_document::Column::NextAttemptAt, Expr::value(lease_until))
                .filter(fiscal_document::Column::Id.is_in(rows.iter().map(|r| r.id)))
                .exec(&txn)
                .await
                .map_err(AppError::from)?;
        }
        txn.commit().await.map_err(AppError::from)?;

        rows.into_iter().map(FiscalDocument::try_from).collect()
    }

    async fn numbers_in_use(
        &self,
        tenant_id: Uuid,
        model: FiscalModel,
        series: u16,
        start: u32,
        end: u32,
    ) -> AppResult<Vec<u32>> {
        let rows = DocumentEntity::find()
            .filter(fiscal_document::Column::TenantId.eq(tenant_id))
            .filter(fiscal_document::Column::Model.eq(model.as_str()))
            .filter(fiscal_document::Column::Series.eq(i32::from(series)))
            .filter(fiscal_document::Column::Number.between(i64::from(start), i64::from(end)))
            .filter(fiscal_document::Column::Status.ne(DocumentStatus::Rejected.as_str()))
            .order_by_asc(fiscal_document::Column::Number)
            .all(&self.db)
            .await
            .map_err(AppError::from)?;
        Ok(rows.into_iter().map(|r| r.number as u32).collect())
    }

    async fn last_event_sequence(&self, document_id: Uuid, kind: EventKind) -> AppResult<u32> {
        let last = EventEntity::find()
            .filter(fiscal_event::Column::DocumentId.eq(document_id))
            .filter(fiscal_event::Column::EventType.eq(kind.as_str()))
            .order_by_desc(fiscal_event::Column::Sequence)
            .one(&self.db)
            .await
            .map_err(AppError::from)?;
        Ok(last.map(|e| e.sequence as u32).unwrap_or(0))
    }

    async fn insert_event(&self, event: &EventRecord) -> AppResult<()> {
        EventEntity::insert(fiscal_event::ActiveModel::from_domain(event)?)
            .exec_without_returning(&self.db)
            .await
            .map_err(|e| {
                unique_violation(e, || format!("Event {} sequence {}", event.kind, event.sequence))
            })?;
        Ok(())
    }

    async fn list_events(&self, tenant_id: Uuid, document_id: Uuid) -> AppResult<Vec<EventRecord>> {
        EventEntity::find()
            .filter(fiscal_event::Column::TenantId.eq(tenant_id))
            .filter(fiscal_event::Column::DocumentId.eq(document_id))
            .order_by_asc(fiscal_event::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(AppError::from)?
            .into_iter()
            .map(EventRecord::try_from)
            .collect()
    }

    async fn insert_inutilization(&self, record: &InutilizationRecord) -> AppResult<()> {
        InutilizationEntity::insert(fiscal_inutilization::ActiveModel::from_domain(record))
            .exec_without_returning(&self.db)
            .await
            .map_err(AppError::from)?;
        Ok(())
    }

    async fn overlapping_inutilizations(
        &self,
        tenant_id: Uuid,
        model: FiscalModel,
        series: u16,
        start: u32,
        end: u32,
    ) -> AppResult<Vec<InutilizationRecord>> {
        InutilizationEntity::find()
            .filter(fiscal_inutilization::Column::TenantId.eq(tenant_id))
            .filter(fiscal_inutilization::Column::Model.eq(model.as_str()))
            .filter(fiscal_inutilization::Column::Series.eq(i32::from(series)))
            .filter(
                Condition::all()
                    .add(fiscal_inutilization::Column::StartNumber.lte(i64::from(end)))
                    .add(fiscal_inutilization::Column::EndNumber.gte(i64::from(start))),
            )
            .all(&self.db)
            .await
            .map_err(AppError::from)?
            .into_iter()
            .map(InutilizationRecord::try_from)
            .collect()
    }
}
