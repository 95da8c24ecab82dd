//! Fiscal service - emission, SEFAZ orchestration and events.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, Utc};
use uuid::Uuid;

use common::{AppError, AppResult, OptionExt, Paginated, PaginationParams, SefazClientConfig};
use domain::access_key::random_numeric_code;
use domain::event::{cancellation, correction_letter};
use domain::{
    is_authorized, is_denied, is_duplicate, is_retryable, AccessKey, DocumentDraft,
    DocumentFilter, DocumentStatus, EmissionType, EventKind, EventRecord, FiscalDocument,
    FiscalEvent, FiscalModel, FiscalProfile, Inutilization, InutilizationRecord, ProfileInput,
    SefazStatus, SignedIssue, STATUS_BATCH_NOT_FOUND, STATUS_BATCH_RECEIVED,
    STATUS_DUPLICATE_DIFFERENT_KEY, STATUS_INUTILIZATION_HOMOLOGATED, STATUS_KEY_NOT_FOUND,
};

use super::builder::{self, BuildRequest};
use crate::repository::FiscalRepository;
use crate::sefaz::{SefazClient, SefazContext, SefazError};
use crate::signing::{Credential, CredentialProvider, RsaSha1Signer, XmlSigner};
use crate::xml::format::to_brasilia;
use crate::xml::messages;
use crate::xml::nfe::ContingencyInfo;
use crate::xml::response::{AuthorizationReply, EventInfo, ProtocolInfo, ProtocolReply};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

const CONTINGENCY_REASON: &str = "Falha na comunicacao com o web service da SEFAZ autorizadora";

/// Outcome of an emission request.
#[derive(Debug, Clone)]
pub struct Emission {
    pub document: FiscalDocument,
    /// `false` when an earlier document for the same order was returned
    pub created: bool,
}

/// A registered event and the document it applies to.
#[derive(Debug, Clone)]
pub struct EventOutcome {
    pub document: FiscalDocument,
    pub event: EventRecord,
}

/// Counters of one poller batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub processed: usize,
    pub authorized: usize,
    pub rejected: usize,
    pub waiting: usize,
    /// Documents whose SEFAZ call did not complete
    pub failed: usize,
}

/// Fiscal service trait for dependency injection.
///
/// Every operation is scoped by the caller's tenant.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait FiscalService: Send + Sync {
    /// Create or replace the tenant's fiscal profile
    async fn upsert_profile(&self, tenant_id: Uuid, input: ProfileInput) -> AppResult<FiscalProfile>;

    async fn get_profile(&self, tenant_id: Uuid) -> AppResult<FiscalProfile>;

    /// Build, sign and transmit a document for an order
    async fn emit(&self, tenant_id: Uuid, draft: DocumentDraft) -> AppResult<Emission>;

    async fn get(&self, tenant_id: Uuid, id: Uuid) -> AppResult<FiscalDocument>;

    async fn list(
        &self,
        tenant_id: Uuid,
        filter: DocumentFilter,
        page: PaginationParams,
    ) -> AppResult<Paginated<FiscalDocument>>;

    /// nfeProc when authorized, signed NFe otherwise
    async fn xml(&self, tenant_id: Uuid, id: Uuid) -> AppResult<String>;

    /// Ask SEFAZ about a pending document now
    async fn refresh(&self, tenant_id: Uuid, id: Uuid) -> AppResult<FiscalDocument>;

    async fn cancel(&self, tenant_id: Uuid, id: Uuid, justification: String) -> AppResult<EventOutcome>;

    async fn correct(&self, tenant_id: Uuid, id: Uuid, text: String) -> AppResult<EventOutcome>;

    async fn events(&self, tenant_id: Uuid, id: Uuid) -> AppResult<Vec<EventRecord>>;

    async fn inutilize(&self, tenant_id: Uuid, request: Inutilization) -> AppResult<InutilizationRecord>;

    async fn service_status(&self, tenant_id: Uuid, model: FiscalModel) -> AppResult<SefazStatus>;

    /// Advance up to `batch` documents whose next attempt is due
    async fn process_pending(&self, batch: u64) -> AppResult<PollSummary>;

    /// Database reachability, for health checks
    async fn ping(&self) -> AppResult<()>;
}

/// Concrete implementation of FiscalService.
pub struct FiscalManager {
    repo: Arc<dyn FiscalRepository>,
    sefaz: SefazClient,
    credentials: Arc<dyn CredentialProvider>,
    config: SefazClientConfig,
}

impl FiscalManager {
    pub fn new(
        repo: Arc<dyn FiscalRepository>,
        sefaz: SefazClient,
        credentials: Arc<dyn CredentialProvider>,
        config: SefazClientConfig,
    ) -> Self {
        Self {
            repo,
            sefaz,
            credentials,
            config,
        }
    }

    async fn profile(&self, tenant_id: Uuid) -> AppResult<FiscalProfile> {
        self.repo
            .find_profile(tenant_id)
            .await?
            .ok_or_else(|| AppError::validation("Fiscal profile is not configured for this tenant"))
    }

    async fn document(&self, tenant_id: Uuid, id: Uuid) -> AppResult<FiscalDocument> {
        self.repo
            .find_document(tenant_id, id)
            .await?
            .ok_or_not_found()
    }

    async fn credential(&self, profile: &FiscalProfile) -> AppResult<Arc<Credential>> {
        Ok(self.credentials.credential(profile).await?)
    }

    fn backoff_base(&self) -> Duration {
        Duration::milliseconds(self.config.poll_backoff_base_ms as i64)
    }

    fn reschedule(&self, doc: &mut FiscalDocument) {
        let scheduled = doc.schedule_retry(
            Utc::now(),
            self.config.poll_backoff_base_ms,
            self.config.max_poll_attempts,
        );
        if !scheduled {
            tracing::warn!(
                document_id = %doc.id,
                access_key = %doc.access_key,
                status = %doc.status,
                attempts = doc.attempts,
                "Document left for manual refresh after max attempts"
            );
        }
    }

    /// Send a signed document and apply the answer.
    ///
    /// Returns the SEFAZ failure when the call did not complete.
    async fn transmit(
        &self,
        profile: &FiscalProfile,
        credential: &Arc<Credential>,
        doc: &mut FiscalDocument,
    ) -> AppResult<Option<SefazError>> {
        let ctx = context(profile, doc.model, credential);
        match self.sefaz.authorize(&ctx, lot_id(Utc::now()), &doc.signed_xml).await {
            Ok(reply) => {
                self.apply_authorization(doc, reply)?;
                Ok(None)
            }
            Err(err) => {
                tracing::warn!(
                    document_id = %doc.id,
                    access_key = %doc.access_key,
                    error = %err,
                    "Document transmission failed"
                );
                if err.is_outcome_unknown() && doc.status == DocumentStatus::Signed {
                    if can_enter_contingency(profile, doc) {
                        self.enter_contingency(profile, credential, doc)?;
                        return Ok(Some(err));
                    }
                    doc.apply(DocumentStatus::Unconfirmed, None, None)?;
                }
                self.reschedule(doc);
                Ok(Some(err))
            }
        }
    }

    /// Re-sign an NFC-e for offline emission (tpEmis 9), keeping its number
    /// and series. The normal issue is kept as the replaced rendition.
    fn enter_contingency(
        &self,
        profile: &FiscalProfile,
        credential: &Arc<Credential>,
        doc: &mut FiscalDocument,
    ) -> AppResult<()> {
        let now = Utc::now();
        let issued_at = to_brasilia(now);
        let info = ContingencyInfo {
            entered_at: issued_at,
            reason: CONTINGENCY_REASON.to_string(),
        };
        let built = builder::build(
            &BuildRequest {
                profile,
                draft: &doc.draft,
                totals: &doc.totals,
                series: doc.series,
                number: doc.number,
                numeric_code: doc.access_key.numeric_code(),
                emission_type: EmissionType::OfflineNfce,
                issued_at,
                contingency: Some(&info),
            },
            &RsaSha1Signer::new(credential.clone()),
        )?;

        doc.apply(DocumentStatus::Contingency, None, None)?;
        tracing::warn!(
            document_id = %doc.id,
            previous_key = %doc.access_key,
            access_key = %built.access_key,
            "NFC-e re-signed for offline contingency"
        );
        doc.reissue(SignedIssue {
            access_key: built.access_key,
            emission_type: EmissionType::OfflineNfce,
            signed_xml: built.signed_xml,
            qr_code: built.qr_code,
            issued_at: now,
        });
        doc.attempts = 0;
        doc.next_attempt_at = Some(now + self.backoff_base());
        Ok(())
    }

    fn apply_authorization(&self, doc: &mut FiscalDocument, reply: AuthorizationReply) -> AppResult<()> {
        if let Some(prot) = reply.protocol {
            if answers(doc, &prot) {
                return self.apply_protocol(doc, &prot);
            }
            tracing::warn!(
                document_id = %doc.id,
                access_key = %doc.access_key,
                protocol_key = ?prot.access_key,
                "Protocol does not answer the transmitted key"
            );
            doc.apply(DocumentStatus::Unconfirmed, None, None)?;
            self.reschedule(doc);
            return Ok(());
        }
        let code = reply.status_code;
        if code == STATUS_BATCH_RECEIVED {
            doc.receipt_number = reply.receipt;
            doc.apply(DocumentStatus::Processing, Some(code), Some(reply.status_message))?;
            self.reschedule(doc);
            return Ok(());
        }
        self.apply_code(doc, code, reply.status_message)
    }

    /// Apply a `protNFe`.
    fn apply_protocol(&self, doc: &mut FiscalDocument, prot: &ProtocolInfo) -> AppResult<()> {
        let code = prot.status_code;
        if !is_authorized(code) && !is_denied(code) {
            return self.apply_code(doc, code, prot.status_message.clone());
        }

        let next = if is_authorized(code) {
            DocumentStatus::Authorized
        } else {
            DocumentStatus::Denied
        };
        let authorized_xml = messages::nfe_proc(&doc.signed_xml, &prot.raw)?;
        doc.apply(next, Some(code), Some(prot.status_message.clone()))?;
        doc.protocol = prot.protocol.clone();
        doc.authorized_xml = Some(authorized_xml);
        if next == DocumentStatus::Authorized {
            doc.authorized_at = Some(
                prot.received_at
                    .map(|at| at.with_timezone(&Utc))
                    .unwrap_or_else(Utc::now),
            );
        }
        tracing::info!(
            document_id = %doc.id,
            access_key = %doc.access_key,
            status = %doc.status,
            status_code = code,
            "Document settled by SEFAZ"
        );
        Ok(())
    }

    /// Apply a status code that came without a protocol.
    fn apply_code(&self, doc: &mut FiscalDocument, code: u16, message: String) -> AppResult<()> {
        if is_duplicate(code) || is_authorized(code) {
            // SEFAZ knows the key; the protocol query recovers the outcome
            doc.apply(DocumentStatus::Unconfirmed, Some(code), Some(message))?;
            self.reschedule(doc);
        } else if is_retryable(code) {
            doc.status_code = Some(code);
            doc.status_message = Some(message);
            self.reschedule(doc);
        } else if is_denied(code) {
            doc.apply(DocumentStatus::Denied, Some(code), Some(message))?;
        } else {
            tracing::info!(
                document_id = %doc.id,
                access_key = %doc.access_key,
                status_code = code,
                status_message = %message,
                "Document rejected by SEFAZ"
            );
            doc.apply(DocumentStatus::Rejected, Some(code), Some(message))?;
        }
        Ok(())
    }

    async fn poll_receipt(
        &self,
        profile: &FiscalProfile,
        credential: &Arc<Credential>,
        doc: &mut FiscalDocument,
    ) -> AppResult<Option<SefazError>> {
        let Some(receipt) = doc.receipt_number.clone() else {
            doc.apply(DocumentStatus::Unconfirmed, None, None)?;
            doc.next_attempt_at = Some(Utc::now());
            return Ok(None);
        };

        let ctx = context(profile, doc.model, credential);
        match self.sefaz.query_receipt(&ctx, &receipt).await {
            Ok(reply) => {
                if let Some(prot) = reply.protocol_for(doc.access_key.as_str()) {
                    self.apply_protocol(doc, prot)?;
                } else if reply.status_code == STATUS_BATCH_NOT_FOUND {
                    doc.apply(
                        DocumentStatus::Unconfirmed,
                        Some(reply.status_code),
                        Some(reply.status_message),
                    )?;
                    self.reschedule(doc);
                } else {
                    doc.status_code = Some(reply.status_code);
                    doc.status_message = Some(reply.status_message);
                    self.reschedule(doc);
                }
                Ok(None)
            }
            Err(err) => {
                self.reschedule(doc);
                Ok(Some(err))
            }
        }
    }

    /// Find out what happened to a document whose outcome is unknown.
    async fn reconcile(
        &self,
        profile: &FiscalProfile,
        credential: &Arc<Credential>,
        doc: &mut FiscalDocument,
    ) -> AppResult<Option<SefazError>> {
        if doc.status_code == Some(STATUS_DUPLICATE_DIFFERENT_KEY) {
            let normal = doc
                .replaced
                .as_ref()
                .filter(|r| r.emission_type == EmissionType::Normal)
                .map(|r| r.access_key.clone());
            if let Some(normal) = normal {
                return self.recover_normal_issue(profile, credential, doc, normal).await;
            }
        }

        let ctx = context(profile, doc.model, credential);
        let reply = match self.sefaz.query_protocol(&ctx, &doc.access_key).await {
            Ok(reply) => reply,
            Err(err) => {
                self.reschedule(doc);
                return Ok(Some(err));
            }
        };

        if reply.status_code == STATUS_KEY_NOT_FOUND && doc.status_code == Some(STATUS_DUPLICATE_DIFFERENT_KEY) {
            // the number belongs to a key this document never had
            let message = doc.status_message.clone();
            doc.apply(DocumentStatus::Rejected, Some(STATUS_DUPLICATE_DIFFERENT_KEY), message)?;
            return Ok(None);
        }
        if reply.status_code == STATUS_KEY_NOT_FOUND {
            tracing::info!(
                document_id = %doc.id,
                access_key = %doc.access_key,
                "SEFAZ does not know the key, sending again"
            );
            doc.apply(
                DocumentStatus::Signed,
                Some(reply.status_code),
                Some(reply.status_message),
            )?;
            return self.transmit(profile, credential, doc).await;
        }

        match reply.protocol.as_ref().filter(|p| answers(doc, p)) {
            Some(prot) => {
                self.apply_protocol(doc, prot)?;
                self.apply_remote_cancellation(doc, &reply)?;
            }
            None => {
                doc.status_code = Some(reply.status_code);
                doc.status_message = Some(reply.status_message);
                self.reschedule(doc);
            }
        }
        Ok(None)
    }

    /// An offline copy refused with 539: the number is already used by the
    /// normal issue, whose transmission timed out after reaching SEFAZ.
    async fn recover_normal_issue(
        &self,
        profile: &FiscalProfile,
        credential: &Arc<Credential>,
        doc: &mut FiscalDocument,
        normal: AccessKey,
    ) -> AppResult<Option<SefazError>> {
        let ctx = context(profile, doc.model, credential);
        let reply = match self.sefaz.query_protocol(&ctx, &normal).await {
            Ok(reply) => reply,
            Err(err) => {
                self.reschedule(doc);
                return Ok(Some(err));
            }
        };

        let settled = reply
            .protocol
            .as_ref()
            .filter(|p| p.access_key.as_deref() == Some(normal.as_str()))
            .filter(|p| is_authorized(p.status_code) || is_denied(p.status_code));
        match settled {
            Some(prot) => {
                let superseded = doc.access_key.clone();
                doc.swap_issue();
                tracing::warn!(
                    document_id = %doc.id,
                    access_key = %doc.access_key,
                    superseded_key = %superseded,
                    "Normal issue was settled, offline copy superseded"
                );
                self.apply_protocol(doc, prot)?;
                self.apply_remote_cancellation(doc, &reply)?;
            }
            None if reply.status_code == STATUS_KEY_NOT_FOUND => {
                let message = doc.status_message.clone();
                doc.apply(DocumentStatus::Rejected, Some(STATUS_DUPLICATE_DIFFERENT_KEY), message)?;
            }
            None => self.reschedule(doc),
        }
        Ok(None)
    }

    /// A reconciled document may already carry a cancellation.
    fn apply_remote_cancellation(&self, doc: &mut FiscalDocument, reply: &ProtocolReply) -> AppResult<()> {
        if doc.status != DocumentStatus::Authorized {
            return Ok(());
        }
        if let Some(event) = reply.cancellation() {
            doc.apply(
                DocumentStatus::Cancelled,
                Some(event.status_code),
                Some(event.status_message.clone()),
            )?;
            doc.cancelled_at = Some(
                event
                    .registered_at
                    .map(|at| at.with_timezone(&Utc))
                    .unwrap_or_else(Utc::now),
            );
        }
        Ok(())
    }

    /// One step of the pending-document state machine.
    async fn advance(&self, doc: &mut FiscalDocument) -> AppResult<Option<SefazError>> {
        let profile = self.profile(doc.tenant_id).await?;
        let credential = self.credential(&profile).await?;
        match doc.status {
            DocumentStatus::Signed | DocumentStatus::Contingency => {
                self.transmit(&profile, &credential, doc).await
            }
            DocumentStatus::Processing => self.poll_receipt(&profile, &credential, doc).await,
            DocumentStatus::Unconfirmed => self.reconcile(&profile, &credential, doc).await,
            _ => Ok(None),
        }
    }

    /// Sign and send an event; only accepted events come back.
    async fn register_event(
        &self,
        profile: &FiscalProfile,
        doc: &FiscalDocument,
        event: &FiscalEvent,
    ) -> AppResult<EventRecord> {
        let credential = self.credential(profile).await?;
        let now = Utc::now();
        let inf = messages::inf_evento(event, profile.environment, &profile.issuer.cnpj, &to_brasilia(now))?;
        let signature = RsaSha1Signer::new(credential.clone()).sign(inf.id(), &inf.canonical()?)?;
        let signed = messages::evento(&inf, &signature.to_xml()?)?;

        let ctx = context(profile, doc.model, &credential);
        let reply = self.sefaz.send_event(&ctx, lot_id(now), &signed).await?;
        let info: EventInfo = match reply.events.into_iter().next() {
            Some(info) if info.is_accepted() => info,
            Some(info) => return Err(refused("event", info.status_code, &info.status_message)),
            None => return Err(refused("event", reply.status_code, &reply.status_message)),
        };

        Ok(EventRecord {
            id: Uuid::new_v4(),
            tenant_id: doc.tenant_id,
            document_id: doc.id,
            kind: event.detail.kind(),
            sequence: event.sequence,
            detail: event.detail.clone(),
            status_code: info.status_code,
            status_message: info.status_message.clone(),
            protocol: info.protocol.clone(),
            xml: messages::proc_evento_nfe(&signed, &info.raw)?,
            created_at: info
                .registered_at
                .map(|at| at.with_timezone(&Utc))
                .unwrap_or(now),
        })
    }
}

fn context(profile: &FiscalProfile, model: FiscalModel, credential: &Arc<Credential>) -> SefazContext {
    SefazContext {
        tenant_id: profile.tenant_id,
        uf: profile.uf(),
        model,
        environment: profile.environment,
        credential: credential.clone(),
    }
}

/// Whether a `protNFe` is about the document's current key.
fn answers(doc: &FiscalDocument, prot: &ProtocolInfo) -> bool {
    prot.access_key.as_deref() == Some(doc.access_key.as_str())
}

fn can_enter_contingency(profile: &FiscalProfile, doc: &FiscalDocument) -> bool {
    profile.allow_offline_contingency
        && doc.model == FiscalModel::Nfce
        && doc.emission_type == EmissionType::Normal
}

/// idLote: at most 15 digits.
fn lot_id(now: DateTime<Utc>) -> u64 {
    (now.timestamp_millis().max(0) as u64) % 1_000_000_000_000_000
}

fn refused(what: &str, code: u16, message: &str) -> AppError {
    AppError::validation(format!("SEFAZ refused the {}: {} - {}", what, code, message))
}

#[async_trait]
impl FiscalService for FiscalManager {
    async fn upsert_profile(&self, tenant_id: Uuid, input: ProfileInput) -> AppResult<FiscalProfile> {
        let profile = match self.repo.find_profile(tenant_id).await? {
            Some(mut existing) => {
                existing.update(input)?;
                existing
            }
            None => FiscalProfile::new(tenant_id, input)?,
        };
        // the certificate must be usable before documents depend on it
        self.credential(&profile).await?;
        self.repo.save_profile(&profile).await?;

        tracing::info!(
            tenant_id = %tenant_id,
            uf = %profile.uf(),
            environment = %profile.environment,
            "Fiscal profile saved"
        );
        Ok(profile)
    }

    async fn get_profile(&self, tenant_id: Uuid) -> AppResult<FiscalProfile> {
        self.repo
            .find_profile(tenant_id)
            .await?
            .ok_or_not_found()
    }

    async fn emit(&self, tenant_id: Uuid, draft: DocumentDraft) -> AppResult<Emission> {
        if let Some(existing) = self
            .repo
            .find_by_order(tenant_id, draft.model, &draft.order_ref)
            .await?
        {
            tracing::debug!(
                tenant_id = %tenant_id,
                order_ref = %draft.order_ref,
                document_id = %existing.id,
                "Order already has a document"
            );
            return Ok(Emission {
                document: existing,
                created: false,
            });
        }

        let totals = draft.validate()?;
        let profile = self.profile(tenant_id).await?;
        let credential = self.credential(&profile).await?;
        let series = profile.series_for(draft.model);
        let number = self.repo.next_number(tenant_id, draft.model, series).await?;

        let now = Utc::now();
        let built = builder::build(
            &BuildRequest {
                profile: &profile,
                draft: &draft,
                totals: &totals,
                series,
                number,
                numeric_code: random_numeric_code(number),
                emission_type: EmissionType::Normal,
                issued_at: to_brasilia(now),
                contingency: None,
            },
            &RsaSha1Signer::new(credential.clone()),
        )?;

        let mut doc = FiscalDocument {
            id: Uuid::new_v4(),
            tenant_id,
            order_ref: draft.order_ref.clone(),
            model: draft.model,
            series,
            number,
            access_key: built.access_key,
            environment: profile.environment,
            emission_type: EmissionType::Normal,
            status: DocumentStatus::Signed,
            draft,
            totals,
            signed_xml: built.signed_xml,
            authorized_xml: None,
            qr_code: built.qr_code,
            replaced: None,
            receipt_number: None,
            protocol: None,
            status_code: None,
            status_message: None,
            attempts: 0,
            // picked up by the poller if the process dies before transmitting
            next_attempt_at: Some(now + self.backoff_base()),
            issued_at: now,
            authorized_at: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        };
        match self.repo.insert_document(&doc).await {
            Ok(()) => {}
            Err(AppError::Conflict(reason)) => {
                // a concurrent request stored the order's document first
                let existing = self
                    .repo
                    .find_by_order(tenant_id, doc.model, &doc.order_ref)
                    .await?
                    .ok_or(AppError::Conflict(reason))?;
                tracing::warn!(
                    tenant_id = %tenant_id,
                    order_ref = %doc.order_ref,
                    document_id = %existing.id,
                    series = doc.series,
                    unused_number = doc.number,
                    "Concurrent emission for the order, number left for inutilization"
                );
                return Ok(Emission {
                    document: existing,
                    created: false,
                });
            }
            Err(err) => return Err(err),
        }
        tracing::info!(
            tenant_id = %tenant_id,
            document_id = %doc.id,
            model = %doc.model,
            series = doc.series,
            number = doc.number,
            access_key = %doc.access_key,
            "Document signed"
        );

        self.transmit(&profile, &credential, &mut doc).await?;
        self.repo.update_document(&doc).await?;

        Ok(Emission {
            document: doc,
            created: true,
        })
    }

    async fn get(&self, tenant_id: Uuid, id: Uuid) -> AppResult<FiscalDocument> {
        self.document(tenant_id, id).await
    }

    async fn list(
        &self,
        tenant_id: Uuid,
        filter: DocumentFilter,
        page: PaginationParams,
    ) -> AppResult<Paginated<FiscalDocument>> {
        let (data, total) = self
            .repo
            .list_documents(tenant_id, &filter, page.offset(), page.limit())
            .await?;
        Ok(Paginated::new(data, page, total))
    }

    async fn xml(&self, tenant_id: Uuid, id: Uuid) -> AppResult<String> {
        Ok(self.document(tenant_id, id).await?.xml().to_string())
    }

    async fn refresh(&self, tenant_id: Uuid, id: Uuid) -> AppResult<FiscalDocument> {
        let mut doc = self.document(tenant_id, id).await?;
        if !doc.status.is_pending() {
            return Ok(doc);
        }

        let failure = self.advance(&mut doc).await?;
        self.repo.update_document(&doc).await?;
        match failure {
            Some(err) => Err(err.into()),
            None => Ok(doc),
        }
    }

    async fn cancel(&self, tenant_id: Uuid, id: Uuid, justification: String) -> AppResult<EventOutcome> {
        let mut doc = self.document(tenant_id, id).await?;
        let profile = self.profile(tenant_id).await?;
        let event = cancellation(
            &doc.event_target(),
            &justification,
            profile.cancel_window_hours,
            Utc::now(),
        )?;

        let record = self.register_event(&profile, &doc, &event).await?;
        doc.apply(
            DocumentStatus::Cancelled,
            Some(record.status_code),
            Some(record.status_message.clone()),
        )?;
        doc.cancelled_at = Some(record.created_at);
        self.repo.insert_event(&record).await?;
        self.repo.update_document(&doc).await?;

        tracing::info!(
            tenant_id = %tenant_id,
            document_id = %doc.id,
            access_key = %doc.access_key,
            protocol = ?record.protocol,
            "Document cancelled"
        );
        Ok(EventOutcome {
            document: doc,
            event: record,
        })
    }

    async fn correct(&self, tenant_id: Uuid, id: Uuid, text: String) -> AppResult<EventOutcome> {
        let doc = self.document(tenant_id, id).await?;
        let profile = self.profile(tenant_id).await?;
        let last = self
            .repo
            .last_event_sequence(doc.id, EventKind::CorrectionLetter)
            .await?;
        let event = correction_letter(&doc.event_target(), &text, last)?;

        let record = self.register_event(&profile, &doc, &event).await?;
        self.repo.insert_event(&record).await?;

        tracing::info!(
            tenant_id = %tenant_id,
            document_id = %doc.id,
            sequence = record.sequence,
            "Correction letter registered"
        );
        Ok(EventOutcome {
            document: doc,
            event: record,
        })
    }

    async fn events(&self, tenant_id: Uuid, id: Uuid) -> AppResult<Vec<EventRecord>> {
        let doc = self.document(tenant_id, id).await?;
        self.repo.list_events(tenant_id, doc.id).await
    }

    async fn inutilize(&self, tenant_id: Uuid, request: Inutilization) -> AppResult<InutilizationRecord> {
        let request = request.validated()?;
        let profile = self.profile(tenant_id).await?;

        let used = self
            .repo
            .numbers_in_use(tenant_id, request.model, request.series, request.start, request.end)
            .await?;
        if !used.is_empty() {
            let listed: Vec<String> = used.iter().take(10).map(u32::to_string).collect();
            return Err(AppError::validation(format!(
                "Numbers already issued in this range: {}",
                listed.join(", ")
            )));
        }
        let overlapping = self
            .repo
            .overlapping_inutilizations(tenant_id, request.model, request.series, request.start, request.end)
            .await?;
        if !overlapping.is_empty() {
            return Err(AppError::conflict("Inutilization covering this range"));
        }

        let credential = self.credential(&profile).await?;
        let now = Utc::now();
        let inf = messages::inf_inut(
            &request,
            profile.environment,
            profile.uf(),
            &profile.issuer.cnpj,
            to_brasilia(now).year(),
        )?;
        let signature = RsaSha1Signer::new(credential.clone()).sign(inf.id(), &inf.canonical()?)?;
        let signed = messages::inut_nfe(&inf, &signature.to_xml()?)?;

        let ctx = context(&profile, request.model, &credential);
        let reply = self.sefaz.inutilize(&ctx, &signed).await?;
        if reply.status_code != STATUS_INUTILIZATION_HOMOLOGATED {
            return Err(refused("inutilization", reply.status_code, &reply.status_message));
        }

        let record = InutilizationRecord {
            id: Uuid::new_v4(),
            tenant_id,
            xml: messages::proc_inut_nfe(&signed, &reply.raw)?,
            request,
            status_code: reply.status_code,
            status_message: reply.status_message,
            protocol: reply.protocol,
            created_at: now,
        };
        self.repo.insert_inutilization(&record).await?;
        self.repo
            .reserve_through(tenant_id, record.request.model, record.request.series, record.request.end)
            .await?;

        tracing::info!(
            tenant_id = %tenant_id,
            model = %record.request.model,
            series = record.request.series,
            start = record.request.start,
            end = record.request.end,
            "Number range inutilized"
        );
        Ok(record)
    }

    async fn service_status(&self, tenant_id: Uuid, model: FiscalModel) -> AppResult<SefazStatus> {
        let profile = self.profile(tenant_id).await?;
        let credential = self.credential(&profile).await?;
        let reply = self
            .sefaz
            .service_status(&context(&profile, model, &credential))
            .await?;

        Ok(SefazStatus {
            uf: profile.uf(),
            model,
            environment: profile.environment,
            status_code: reply.status_code,
            status_message: reply.status_message,
            received_at: reply.received_at,
            average_seconds: reply.average_seconds,
            observation: reply.observation,
            checked_at: Utc::now(),
        })
    }

    async fn process_pending(&self, batch: u64) -> AppResult<PollSummary> {
        let now = Utc::now();
        let lease_until = now + Duration::seconds(self.config.claim_lease_secs as i64);
        let due = self.repo.claim_due(now, lease_until, batch).await?;
        let mut summary = PollSummary::default();

        for mut doc in due {
            summary.processed += 1;
            match self.advance(&mut doc).await {
                Ok(None) => {}
                Ok(Some(_)) => summary.failed += 1,
                Err(err) => {
                    summary.failed += 1;
                    tracing::error!(
                        document_id = %doc.id,
                        error = %err,
                        "Failed to advance pending document"
                    );
                    self.reschedule(&mut doc);
                }
            }
            if let Err(err) = self.repo.update_document(&doc).await {
                tracing::error!(document_id = %doc.id, error = %err, "Failed to store document");
                continue;
            }

            match doc.status {
                DocumentStatus::Authorized => summary.authorized += 1,
                DocumentStatus::Rejected | DocumentStatus::Denied => summary.rejected += 1,
                status if status.is_pending() => summary.waiting += 1,
                _ => {}
            }
        }
        Ok(summary)
    }

    async fn ping(&self) -> AppResult<()> {
        self.repo.ping().await
    }
}
