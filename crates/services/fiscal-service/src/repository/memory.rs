use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use common::{AppError, AppResult, OptionExt};
use domain::{
    DocumentFilter, DocumentStatus, EventKind, EventRecord, FiscalDocument, FiscalModel,
    FiscalProfile, InutilizationRecord, MAX_DOCUMENT_NUMBER,
};

use super::FiscalRepository;

#[derive(Default)]
struct State {
    profiles: HashMap<Uuid, FiscalProfile>,
    sequences: HashMap<(Uuid, FiscalModel, u16), u32>,
    documents: Vec<FiscalDocument>,
    events: Vec<EventRecord>,
    inutilizations: Vec<InutilizationRecord>,
}

/// A thread-safe in-memory fiscal store.
///
/// Mirrors the constraints of the database schema (unique access key, one
/// live document per order, unique event sequence, tenant scoping) so
/// service tests exercise the same failure paths.
#[derive(Default, Clone)]
pub struct InMemoryFiscalStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryFiscalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored document, in insertion order.
    pub async fn documents(&self) -> Vec<FiscalDocument> {
        self.state.read().await.documents.clone()
    }

    pub async fn events(&self) -> Vec<EventRecord> {
        self.state.read().await.events.clone()
    }
}

#[async_trait]
impl FiscalRepository for InMemoryFiscalStore {
    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn find_profile(&self, tenant_id: Uuid) -> AppResult<Option<FiscalProfile>> {
        Ok(self.state.read().await.profiles.get(&tenant_id).cloned())
    }

    async fn save_profile(&self, profile: &FiscalProfile) -> AppResult<()> {
        let mut state = self.state.write().await;
        state.profiles.insert(profile.tenant_id, profile.clone());
        Ok(())
    }

    async fn next_number(&self, tenant_id: Uuid, model: FiscalModel, series: u16) -> AppResult<u32> {
        let mut state = self.state.write().await;
        let next = state.sequences.entry((tenant_id, model, series)).or_insert(1);
        if *next > MAX_DOCUMENT_NUMBER {
            return Err(AppError::Validation(format!(
                "Series {} of model {} is exhausted",
                series, model
            )));
        }
        let number = *next;
        *next += 1;
        Ok(number)
    }

    async fn reserve_through(
        &self,
        tenant_id: Uuid,
        model: FiscalModel,
        series: u16,
        last: u32,
    ) -> AppResult<()> {
        let mut state = self.state.write().await;
        let next = state.sequences.entry((tenant_id, model, series)).or_insert(1);
        *next = (*next).max(last.saturating_add(1));
        Ok(())
    }

    async fn find_document(&self, tenant_id: Uuid, id: Uuid) -> AppResult<Option<FiscalDocument>> {
        let state = self.state.read().await;
        Ok(state
            .documents
            .iter()
            .find(|d| d.id == id && d.tenant_id == tenant_id)
            .cloned())
    }

    async fn find_by_order(
        &self,
        tenant_id: Uuid,
        model: FiscalModel,
        order_ref: &str,
    ) -> AppResult<Option<FiscalDocument>> {
        let state = self.state.read().await;
        Ok(state
            .documents
            .iter()
            .rev()
            .find(|d| {
                d.tenant_id == tenant_id
                    && d.model == model
                    && d.order_ref == order_ref
                    && d.status != DocumentStatus::Rejected
            })
            .cloned())
    }

    async fn insert_document(&self, doc: &FiscalDocument) -> AppResult<()> {
        let mut state = self.state.write().await;
        if state.documents.iter().any(|d| d.access_key == doc.access_key) {
            return Err(AppError::Conflict(format!("Document {}", doc.access_key)));
        }
        let same_order = |d: &FiscalDocument| {
            d.tenant_id == doc.tenant_id && d.model == doc.model && d.order_ref == doc.order_ref
        };
        if doc.status != DocumentStatus::Rejected
            && state
                .documents
                .iter()
                .any(|d| d.status != DocumentStatus::Rejected && same_order(d))
        {
            return Err(AppError::Conflict(format!("Document for order {}", doc.order_ref)));
        }
        state.documents.push(doc.clone());
        Ok(())
    }

    async fn update_document(&self, doc: &FiscalDocument) -> AppResult<()> {
        let mut state = self.state.write().await;
        let slot = state
            .documents
            .iter_mut()
            .find(|d| d.id == doc.id)
            .ok_or_not_found()?;
        *slot = doc.clone();
        slot.updated_at = Utc::now();
        Ok(())
    }

    async fn list_documents(
        &self,
        tenant_id: Uuid,
        filter: &DocumentFilter,
        offset: u64,
        limit: u64,
    ) -> AppResult<(Vec<FiscalDocument>, u64)> {
        let state = self.state.read().await;
        let mut matching: Vec<&FiscalDocument> = state
            .documents
            .iter()
            .filter(|d| d.tenant_id == tenant_id)
            .filter(|d| filter.status.map_or(true, |s| d.status == s))
            .filter(|d| filter.model.map_or(true, |m| d.model == m))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: u64,
    ) -> AppResult<Vec<FiscalDocument>> {
        let mut state = self.state.write().await;
        let mut due: Vec<&mut FiscalDocument> = state
            .documents
            .iter_mut()
            .filter(|d| d.status.is_pending())
            .filter(|d| d.next_attempt_at.is_some_and(|at| at <= now))
            .collect();
        due.sort_by_key(|d| d.next_attempt_at);
        due.truncate(limit as usize);

        Ok(due
            .into_iter()
            .map(|slot| {
                let claimed = slot.clone();
                slot.next_attempt_at = Some(lease_until);
                claimed
            })
            .collect())
    }

    async fn numbers_in_use(
        &self,
        tenant_id: Uuid,
        model: FiscalModel,
        series: u16,
        start: u32,
        end: u32,
    ) -> AppResult<Vec<u32>> {
        let state = self.state.read().await;
        let mut numbers: Vec<u32> = state
            .documents
            .iter()
            .filter(|d| d.tenant_id == tenant_id && d.model == model && d.series == series)
            .filter(|d| d.status.holds_number() && (start..=end).contains(&d.number))
            .map(|d| d.number)
            .collect();
        numbers.sort_unstable();
        Ok(numbers)
    }

    async fn last_event_sequence(&self, document_id: Uuid, kind: EventKind) -> AppResult<u32> {
        let state = self.state.read().await;
        Ok(state
            .events
            .iter()
            .filter(|e| e.document_id == document_id && e.kind == kind)
            .map(|e| e.sequence)
            .max()
            .unwrap_or(0))
    }

    async fn insert_event(&self, event: &EventRecord) -> AppResult<()> {
        let mut state = self.state.write().await;
        if state.events.iter().any(|e| {
            e.document_id == event.document_id && e.kind == event.kind && e.sequence == event.sequence
        }) {
            return Err(AppError::Conflict(format!(
                "Event {} sequence {}",
                event.kind, event.sequence
            )));
        }
        state.events.push(event.clone());
        Ok(())
    }

    async fn list_events(&self, tenant_id: Uuid, document_id: Uuid) -> AppResult<Vec<EventRecord>> {
        let state = self.state.read().await;
        Ok(state
            .events
            .iter()
            .filter(|e| e.tenant_id == tenant_id && e.document_id == document_id)
            .cloned()
            .collect())
    }

    async fn insert_inutilization(&self, record: &InutilizationRecord) -> AppResult<()> {
        self.state.write().await.inutilizations.push(record.clone());
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
        let state = self.state.read().await;
        Ok(state
            .inutilizations
            .iter()
            .filter(|r| r.tenant_id == tenant_id)
            .filter(|r| r.request.model == model && r.request.series == series)
            .filter(|r| r.request.start <= end && r.request.end >= start)
            .cloned()
            .collect())
    }
}
