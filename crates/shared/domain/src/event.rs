//! Fiscal events (cancellation, correction letter) and number inutilization.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::access_key::AccessKey;
use crate::codes::FiscalModel;
use crate::constants::{
    EVENT_CANCELLATION, EVENT_CORRECTION_LETTER, MAX_CORRECTION_LENGTH, MAX_CORRECTION_SEQUENCE,
    MAX_DOCUMENT_NUMBER, MAX_JUSTIFICATION_LENGTH, MAX_SERIES, MIN_CORRECTION_LENGTH,
    MIN_JUSTIFICATION_LENGTH,
};
use crate::error::{DomainError, DomainResult};
use crate::status::DocumentStatus;
use crate::tax_id::Cnpj;
use crate::uf::Uf;

/// Trim and collapse internal whitespace, as SEFAZ rejects leading/trailing
/// and repeated blanks in free-text fields.
pub fn normalize_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn check_len(field: &str, value: &str, min: usize, max: usize) -> DomainResult<()> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(DomainError::validation(format!(
            "{} must have between {} and {} characters",
            field, min, max
        )));
    }
    Ok(())
}

/// Event kinds handled by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum EventKind {
    Cancellation,
    CorrectionLetter,
}

impl EventKind {
    /// tpEvento code
    pub fn code(self) -> &'static str {
        match self {
            EventKind::Cancellation => EVENT_CANCELLATION,
            EventKind::CorrectionLetter => EVENT_CORRECTION_LETTER,
        }
    }

    /// descEvento text
    pub fn description(self) -> &'static str {
        match self {
            EventKind::Cancellation => "Cancelamento",
            EventKind::CorrectionLetter => "Carta de Correcao",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Cancellation => "cancellation",
            EventKind::CorrectionLetter => "correction_letter",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cancellation" => Ok(EventKind::Cancellation),
            "correction_letter" => Ok(EventKind::CorrectionLetter),
            other => Err(DomainError::validation(format!("Unknown event kind '{}'", other))),
        }
    }
}

/// Event detail (detEvento).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventDetail {
    Cancellation { protocol: String, justification: String },
    CorrectionLetter { text: String },
}

impl EventDetail {
    pub fn kind(&self) -> EventKind {
        match self {
            EventDetail::Cancellation { .. } => EventKind::Cancellation,
            EventDetail::CorrectionLetter { .. } => EventKind::CorrectionLetter,
        }
    }
}

/// Event ready to be rendered and signed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiscalEvent {
    pub access_key: AccessKey,
    pub sequence: u32,
    pub detail: EventDetail,
}

impl FiscalEvent {
    /// Id attribute of infEvento: `ID` + tpEvento + chave + nSeqEvento(2).
    pub fn id(&self) -> String {
        format!(
            "ID{}{}{:02}",
            self.detail.kind().code(),
            self.access_key.as_str(),
            self.sequence
        )
    }
}

/// Facts about a document needed to decide whether an event is allowed.
#[derive(Debug, Clone)]
pub struct EventTarget<'a> {
    pub status: DocumentStatus,
    pub model: FiscalModel,
    pub access_key: &'a AccessKey,
    pub protocol: Option<&'a str>,
    pub authorized_at: Option<DateTime<Utc>>,
}

/// Build a cancellation event.
pub fn cancellation(
    target: &EventTarget<'_>,
    justification: &str,
    cancel_window_hours: i64,
    now: DateTime<Utc>,
) -> DomainResult<FiscalEvent> {
    if target.status != DocumentStatus::Authorized {
        return Err(DomainError::invalid_state(format!(
            "Only authorized documents can be cancelled (status: {})",
            target.status
        )));
    }
    let protocol = target
        .protocol
        .ok_or_else(|| DomainError::invalid_state("Authorized document has no protocol"))?;
    let authorized_at = target
        .authorized_at
        .ok_or_else(|| DomainError::invalid_state("Authorized document has no authorization time"))?;
    if now - authorized_at > Duration::hours(cancel_window_hours) {
        return Err(DomainError::invalid_state(format!(
            "Cancellation window of {} hours has expired",
            cancel_window_hours
        )));
    }

    let justification = normalize_text(justification);
    check_len(
        "justification",
        &justification,
        MIN_JUSTIFICATION_LENGTH,
        MAX_JUSTIFICATION_LENGTH,
    )?;

    Ok(FiscalEvent {
        access_key: target.access_key.clone(),
        sequence: 1,
        detail: EventDetail::Cancellation {
            protocol: protocol.to_string(),
            justification,
        },
    })
}

/// Build the next correction letter; `last_sequence` is 0 when none exists.
pub fn correction_letter(
    target: &EventTarget<'_>,
    text: &str,
    last_sequence: u32,
) -> DomainResult<FiscalEvent> {
    if target.model != FiscalModel::Nfe {
        return Err(DomainError::validation("Correction letters only apply to NF-e (model 55)"));
    }
    if target.status != DocumentStatus::Authorized {
        return Err(DomainError::invalid_state(format!(
            "Only authorized documents accept correction letters (status: {})",
            target.status
        )));
    }
    let sequence = last_sequence + 1;
    if sequence > MAX_CORRECTION_SEQUENCE {
        return Err(DomainError::invalid_state(format!(
            "A document accepts at most {} correction letters",
            MAX_CORRECTION_SEQUENCE
        )));
    }

    let text = normalize_text(text);
    check_len("correction", &text, MIN_CORRECTION_LENGTH, MAX_CORRECTION_LENGTH)?;

    Ok(FiscalEvent {
        access_key: target.access_key.clone(),
        sequence,
        detail: EventDetail::CorrectionLetter { text },
    })
}

/// Request to inutilize a range of unused numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Inutilization {
    pub model: FiscalModel,
    pub series: u16,
    pub start: u32,
    pub end: u32,
    pub justification: String,
}

impl Inutilization {
    /// Normalize the justification and check the range.
    pub fn validated(mut self) -> DomainResult<Self> {
        if self.series > MAX_SERIES {
            return Err(DomainError::validation("Series must be between 0 and 999"));
        }
        if self.start == 0 || self.end > MAX_DOCUMENT_NUMBER {
            return Err(DomainError::validation("Numbers must be between 1 and 999999999"));
        }
        if self.start > self.end {
            return Err(DomainError::validation("start must not be greater than end"));
        }
        self.justification = normalize_text(&self.justification);
        check_len(
            "justification",
            &self.justification,
            MIN_JUSTIFICATION_LENGTH,
            MAX_JUSTIFICATION_LENGTH,
        )?;
        Ok(self)
    }

    /// Id attribute of infInut.
    pub fn id(&self, uf: Uf, year: i32, cnpj: &Cnpj) -> String {
        format!(
            "ID{:02}{:02}{}{:02}{:03}{:09}{:09}",
            uf.code(),
            year % 100,
            cnpj.as_str(),
            self.model.code(),
            self.series,
            self.start,
            self.end
        )
    }

    pub fn contains(&self, number: u32) -> bool {
        (self.start..=self.end).contains(&number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access_key::AccessKeyParts;
    use crate::codes::EmissionType;
    use chrono::{FixedOffset, TimeZone};

    fn key() -> AccessKey {
        let cnpj = Cnpj::parse("11222333000181").unwrap();
        AccessKey::generate(&AccessKeyParts {
            uf: Uf::SP,
            issued_at: FixedOffset::west_opt(3 * 3600)
                .unwrap()
                .with_ymd_and_hms(2024, 5, 2, 9, 0, 0)
                .unwrap(),
            cnpj: &cnpj,
            model: FiscalModel::Nfe,
            series: 1,
            number: 7,
            emission_type: EmissionType::Normal,
            numeric_code: 31415926,
        })
        .unwrap()
    }

    fn authorized<'a>(key: &'a AccessKey, at: DateTime<Utc>) -> EventTarget<'a> {
        EventTarget {
            status: DocumentStatus::Authorized,
            model: FiscalModel::Nfe,
            access_key: key,
            protocol: Some("135240000000001"),
            authorized_at: Some(at),
        }
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  erro   no\tpedido \n"), "erro no pedido");
    }

    #[test]
    fn test_cancellation_within_window() {
        let key = key();
        let now = Utc::now();
        let event = cancellation(
            &authorized(&key, now - Duration::hours(2)),
            "Cliente desistiu   da compra",
            24,
            now,
        )
        .unwrap();

        assert_eq!(event.sequence, 1);
        assert_eq!(event.id(), format!("ID110111{}01", key.as_str()));
        assert_eq!(event.id().len(), 54);
        match event.detail {
            EventDetail::Cancellation { justification, protocol } => {
                assert_eq!(justification, "Cliente desistiu da compra");
                assert_eq!(protocol, "135240000000001");
            }
            _ => panic!("expected cancellation"),
        }
    }

    #[test]
    fn test_cancellation_after_window_fails() {
        let key = key();
        let now = Utc::now();
        let result = cancellation(
            &authorized(&key, now - Duration::hours(25)),
            "Cliente desistiu da compra",
            24,
            now,
        );
        assert!(matches!(result, Err(DomainError::InvalidState(_))));
    }

    #[test]
    fn test_cancellation_requires_authorized() {
        let key = key();
        let mut target = authorized(&key, Utc::now());
        target.status = DocumentStatus::Processing;
        assert!(cancellation(&target, "Cliente desistiu da compra", 24, Utc::now()).is_err());
    }

    #[test]
    fn test_short_justification_rejected() {
        let key = key();
        let now = Utc::now();
        let result = cancellation(&authorized(&key, now), "curta", 24, now);
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_correction_letter_sequence() {
        let key = key();
        let target = authorized(&key, Utc::now());
        let event = correction_letter(&target, "Endereco de entrega: Rua B, 12", 3).unwrap();
        assert_eq!(event.sequence, 4);
        assert!(event.id().ends_with("04"));

        assert!(correction_letter(&target, "Endereco de entrega: Rua B, 12", 20).is_err());
    }

    #[test]
    fn test_correction_letter_not_for_nfce() {
        let key = key();
        let mut target = authorized(&key, Utc::now());
        target.model = FiscalModel::Nfce;
        assert!(correction_letter(&target, "Endereco de entrega: Rua B, 12", 0).is_err());
    }

    #[test]
    fn test_inutilization_validation_and_id() {
        let inut = Inutilization {
            model: FiscalModel::Nfce,
            series: 1,
            start: 10,
            end: 15,
            justification: "  Falha no sistema de numeracao  ".to_string(),
        }
        .validated()
        .unwrap();

        assert_eq!(inut.justification, "Falha no sistema de numeracao");
        let cnpj = Cnpj::parse("11222333000181").unwrap();
        assert_eq!(
            inut.id(Uf::SP, 2024, &cnpj),
            "ID35241122233300018165001000000010000000015"
        );
        assert!(inut.contains(12));
        assert!(!inut.contains(16));

        let reversed = Inutilization { start: 20, end: 10, ..inut };
        assert!(reversed.validated().is_err());
    }
}
