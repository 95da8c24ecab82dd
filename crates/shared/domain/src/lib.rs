//! Domain layer - fiscal documents, events and value objects.
//!
//! This crate contains pure domain logic with no infrastructure dependencies.
//! XML, signing, SEFAZ transport and persistence live in `fiscal-service`.

pub mod access_key;
pub mod codes;
pub mod constants;
pub mod document;
pub mod error;
pub mod event;
pub mod profile;
pub mod record;
pub mod role;
pub mod status;
pub mod tax_id;
pub mod totals;
pub mod uf;

pub use access_key::{AccessKey, AccessKeyParts};
pub use codes::{
    Destination, EmissionType, Environment, FiscalModel, FreightMode, IeIndicator, OperationType,
    PaymentMethod, PresenceIndicator, Purpose, TaxRegime,
};
pub use constants::*;
pub use document::{
    Address, CardInfo, Contribution, DocumentDraft, IcmsTax, Issuer, Item, ItemTax, Payment,
    Recipient,
};
pub use error::{DomainError, DomainResult};
pub use event::{EventDetail, EventKind, EventTarget, FiscalEvent, Inutilization};
pub use profile::{FiscalProfile, ProfileInput, ProfileResponse};
pub use record::{
    DocumentFilter, DocumentResponse, EventRecord, FiscalDocument, InutilizationRecord, SefazStatus,
    SignedIssue,
};
pub use role::Role;
pub use status::DocumentStatus;
pub use tax_id::{Cnpj, Cpf, TaxId};
pub use totals::{ItemAmounts, Totals};
pub use uf::Uf;
