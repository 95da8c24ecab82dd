//! Persisted fiscal records and their API views.

use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::access_key::AccessKey;
use crate::codes::{EmissionType, Environment, FiscalModel};
use crate::document::DocumentDraft;
use crate::error::DomainResult;
use crate::event::{EventDetail, EventKind, EventTarget, Inutilization};
use crate::status::DocumentStatus;
use crate::totals::Totals;
use crate::uf::Uf;

/// Longest wait between two polls of the same document.
pub const MAX_BACKOFF_SECS: i64 = 3600;

/// One signed rendition of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedIssue {
    pub access_key: AccessKey,
    pub emission_type: EmissionType,
    pub signed_xml: String,
    pub qr_code: Option<String>,
    pub issued_at: DateTime<Utc>,
}

/// An emitted NF-e / NFC-e.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiscalDocument {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub order_ref: String,
    pub model: FiscalModel,
    pub series: u16,
    pub number: u32,
    pub access_key: AccessKey,
    pub environment: Environment,
    pub emission_type: EmissionType,
    pub status: DocumentStatus,
    pub draft: DocumentDraft,
    pub totals: Totals,
    pub signed_xml: String,
    pub authorized_xml: Option<String>,
    pub qr_code: Option<String>,
    /// The other signed rendition under the same number: the normal issue
    /// while in offline contingency, or the superseded contingency copy.
    pub replaced: Option<SignedIssue>,
    pub receipt_number: Option<String>,
    pub protocol: Option<String>,
    pub status_code: Option<u16>,
    pub status_message: Option<String>,
    pub attempts: u32,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub issued_at: DateTime<Utc>,
    pub authorized_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FiscalDocument {
    /// Move to `next`, recording the SEFAZ answer that caused it.
    pub fn apply(
        &mut self,
        next: DocumentStatus,
        code: Option<u16>,
        message: Option<String>,
    ) -> DomainResult<()> {
        self.status = self.status.transition(next)?;
        if code.is_some() {
            self.status_code = code;
            self.status_message = message;
        }
        self.updated_at = Utc::now();
        if !self.status.is_pending() {
            self.next_attempt_at = None;
        }
        Ok(())
    }

    /// Schedule the next poll with exponential backoff.
    ///
    /// Returns `false` once `max_attempts` is reached; the document is then
    /// left for manual refresh.
    pub fn schedule_retry(&mut self, now: DateTime<Utc>, base_ms: u64, max_attempts: u32) -> bool {
        self.attempts += 1;
        if self.attempts >= max_attempts {
            self.next_attempt_at = None;
            return false;
        }
        let factor = 1i64.checked_shl(self.attempts.min(30)).unwrap_or(i64::MAX);
        let delay_ms = (base_ms as i64).saturating_mul(factor);
        let delay = Duration::milliseconds(delay_ms.min(MAX_BACKOFF_SECS * 1000));
        self.next_attempt_at = Some(now + delay);
        true
    }

    /// Make `issue` current, keeping the rendition it replaces.
    pub fn reissue(&mut self, issue: SignedIssue) {
        self.replaced = Some(issue);
        self.swap_issue();
    }

    /// Exchange the current rendition with the replaced one.
    ///
    /// Returns `false` when there is nothing to swap with.
    pub fn swap_issue(&mut self) -> bool {
        let Some(other) = self.replaced.take() else {
            return false;
        };
        let current = SignedIssue {
            access_key: std::mem::replace(&mut self.access_key, other.access_key),
            emission_type: std::mem::replace(&mut self.emission_type, other.emission_type),
            signed_xml: std::mem::replace(&mut self.signed_xml, other.signed_xml),
            qr_code: std::mem::replace(&mut self.qr_code, other.qr_code),
            issued_at: std::mem::replace(&mut self.issued_at, other.issued_at),
        };
        self.replaced = Some(current);
        self.updated_at = Utc::now();
        true
    }

    /// Facts needed to validate an event against this document.
    pub fn event_target(&self) -> EventTarget<'_> {
        EventTarget {
            status: self.status,
            model: self.model,
            access_key: &self.access_key,
            protocol: self.protocol.as_deref(),
            authorized_at: self.authorized_at,
        }
    }

    /// Best XML available: nfeProc once authorized, signed NFe otherwise.
    pub fn xml(&self) -> &str {
        self.authorized_xml.as_deref().unwrap_or(&self.signed_xml)
    }
}

/// Document response (safe to return to client)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct DocumentResponse {
    pub id: Uuid,
    pub order_ref: String,
    pub model: FiscalModel,
    pub series: u16,
    pub number: u32,
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub access_key: AccessKey,
    pub environment: Environment,
    pub emission_type: EmissionType,
    pub status: DocumentStatus,
    pub totals: Totals,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_code: Option<String>,
    /// Key of the other signed rendition under the same number
    #[serde(skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>))]
    pub replaced_access_key: Option<AccessKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    pub issued_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorized_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl From<FiscalDocument> for DocumentResponse {
    fn from(doc: FiscalDocument) -> Self {
        Self {
            id: doc.id,
            order_ref: doc.order_ref,
            model: doc.model,
            series: doc.series,
            number: doc.number,
            access_key: doc.access_key,
            environment: doc.environment,
            emission_type: doc.emission_type,
            status: doc.status,
            totals: doc.totals,
            qr_code: doc.qr_code,
            replaced_access_key: doc.replaced.map(|r| r.access_key),
            protocol: doc.protocol,
            status_code: doc.status_code,
            status_message: doc.status_message,
            issued_at: doc.issued_at,
            authorized_at: doc.authorized_at,
            cancelled_at: doc.cancelled_at,
            updated_at: doc.updated_at,
        }
    }
}

/// SEFAZ service status for the tenant's authorizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SefazStatus {
    pub uf: Uf,
    pub model: FiscalModel,
    pub environment: Environment,
    pub status_code: u16,
    pub status_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_at: Option<DateTime<FixedOffset>>,
    /// Average processing time in seconds (tMed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_seconds: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observation: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl SefazStatus {
    pub fn is_running(&self) -> bool {
        self.status_code == crate::constants::STATUS_SERVICE_RUNNING
    }
}

/// Filter for document listings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentFilter {
    pub status: Option<DocumentStatus>,
    pub model: Option<FiscalModel>,
}

/// A registered (or refused) event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct EventRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub document_id: Uuid,
    pub kind: EventKind,
    pub sequence: u32,
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub detail: EventDetail,
    pub status_code: u16,
    pub status_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(skip)]
    pub xml: String,
    pub created_at: DateTime<Utc>,
}

/// Result of an inutilization request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct InutilizationRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub request: Inutilization,
    pub status_code: u16,
    pub status_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(skip)]
    pub xml: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::access_key::AccessKeyParts;
    use crate::document::fixtures::nfce_draft;
    use crate::tax_id::Cnpj;
    use chrono::TimeZone;

    pub fn key(emission_type: EmissionType) -> AccessKey {
        let cnpj = Cnpj::parse("11222333000181").unwrap();
        AccessKey::generate(&AccessKeyParts {
            uf: Uf::SP,
            issued_at: issued(),
            cnpj: &cnpj,
            model: FiscalModel::Nfce,
            series: 2,
            number: 7,
            emission_type,
            numeric_code: 12345678,
        })
        .unwrap()
    }

    fn issued() -> DateTime<FixedOffset> {
        FixedOffset::west_opt(3 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 11, 5, 10, 0, 0)
            .unwrap()
    }

    pub fn document(status: DocumentStatus) -> FiscalDocument {
        let draft = nfce_draft();
        let totals = draft.validate().unwrap();
        let now = Utc::now();
        FiscalDocument {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            order_ref: draft.order_ref.clone(),
            model: FiscalModel::Nfce,
            series: 2,
            number: 7,
            access_key: key(EmissionType::Normal),
            environment: Environment::Homologation,
            emission_type: EmissionType::Normal,
            status,
            draft,
            totals,
            signed_xml: "<NFe/>".to_string(),
            authorized_xml: None,
            qr_code: None,
            replaced: None,
            receipt_number: None,
            protocol: None,
            status_code: None,
            status_message: None,
            attempts: 0,
            next_attempt_at: None,
            issued_at: issued().with_timezone(&Utc),
            authorized_at: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}
