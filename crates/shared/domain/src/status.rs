//! Document lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{DomainError, DomainResult};

/// Lifecycle status of an emitted document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum DocumentStatus {
    /// Built and signed, not yet acknowledged by SEFAZ
    Signed,
    /// Batch received, waiting on the receipt number
    Processing,
    /// Sent but the outcome is unknown (transport failure, duplicate)
    Unconfirmed,
    /// NFC-e signed in offline contingency, must still be transmitted
    Contingency,
    Authorized,
    Rejected,
    /// Uso denegado
    Denied,
    Cancelled,
}

impl DocumentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentStatus::Signed => "signed",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Unconfirmed => "unconfirmed",
            DocumentStatus::Contingency => "contingency",
            DocumentStatus::Authorized => "authorized",
            DocumentStatus::Rejected => "rejected",
            DocumentStatus::Denied => "denied",
            DocumentStatus::Cancelled => "cancelled",
        }
    }

    /// Whether the poller still has work to do for this document.
    pub fn is_pending(self) -> bool {
        matches!(
            self,
            DocumentStatus::Signed
                | DocumentStatus::Processing
                | DocumentStatus::Unconfirmed
                | DocumentStatus::Contingency
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DocumentStatus::Rejected | DocumentStatus::Denied | DocumentStatus::Cancelled
        )
    }

    /// Whether the document number is consumed (cannot be inutilized or reused).
    pub fn holds_number(self) -> bool {
        !matches!(self, DocumentStatus::Rejected)
    }

    pub fn can_transition_to(self, next: DocumentStatus) -> bool {
        use DocumentStatus::*;
        match self {
            Signed => matches!(
                next,
                Processing | Authorized | Rejected | Denied | Unconfirmed | Contingency
            ),
            Processing => matches!(next, Processing | Authorized | Rejected | Denied | Unconfirmed),
            Unconfirmed => matches!(
                next,
                Processing | Authorized | Rejected | Denied | Unconfirmed | Signed
            ),
            Contingency => matches!(next, Authorized | Rejected | Denied | Processing | Unconfirmed),
            Authorized => matches!(next, Cancelled),
            Rejected | Denied | Cancelled => false,
        }
    }

    /// Validate a transition, returning the new status.
    pub fn transition(self, next: DocumentStatus) -> DomainResult<DocumentStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "signed" => Ok(DocumentStatus::Signed),
            "processing" => Ok(DocumentStatus::Processing),
            "unconfirmed" => Ok(DocumentStatus::Unconfirmed),
            "contingency" => Ok(DocumentStatus::Contingency),
            "authorized" => Ok(DocumentStatus::Authorized),
            "rejected" => Ok(DocumentStatus::Rejected),
            "denied" => Ok(DocumentStatus::Denied),
            "cancelled" => Ok(DocumentStatus::Cancelled),
            other => Err(DomainError::validation(format!("Unknown document status '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use DocumentStatus::*;

    #[test]
    fn test_terminal_states_do_not_move() {
        for from in [Rejected, Denied, Cancelled] {
            for to in [Signed, Processing, Authorized, Cancelled] {
                assert!(!from.can_transition_to(to), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_authorized_only_cancels() {
        assert!(Authorized.can_transition_to(Cancelled));
        assert!(!Authorized.can_transition_to(Rejected));
        assert_eq!(
            Authorized.transition(Processing),
            Err(DomainError::InvalidTransition {
                from: Authorized,
                to: Processing,
            })
        );
    }

    #[test]
    fn test_unconfirmed_may_resend() {
        assert_eq!(Unconfirmed.transition(Signed).unwrap(), Signed);
        assert!(!Processing.can_transition_to(Signed));
    }

    #[test]
    fn test_only_fresh_documents_enter_contingency() {
        assert!(Signed.can_transition_to(Contingency));
        assert!(!Processing.can_transition_to(Contingency));
        assert!(!Contingency.can_transition_to(Signed));
    }

    #[test]
    fn test_pending_and_number_holding() {
        assert!(Contingency.is_pending());
        assert!(!Authorized.is_pending());
        assert!(!Rejected.holds_number());
        assert!(Cancelled.holds_number());
    }

    #[test]
    fn test_parse_round_trip() {
        for s in [Signed, Processing, Unconfirmed, Contingency, Authorized, Rejected, Denied, Cancelled] {
            assert_eq!(s.as_str().parse::<DocumentStatus>().unwrap(), s);
        }
    }
}
