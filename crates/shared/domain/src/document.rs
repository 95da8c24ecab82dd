//! Document draft: everything an issuer sends to emit an NF-e / NFC-e.

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::codes::{
    Destination, FiscalModel, FreightMode, IeIndicator, OperationType, PaymentMethod,
    PresenceIndicator, Purpose, TaxRegime,
};
use crate::constants::{MAX_AMOUNT, MAX_ITEMS, MAX_ITEM_FACTOR, MAX_PAYMENTS};
use crate::error::{DomainError, DomainResult};
use crate::tax_id::{Cnpj, TaxId};
use crate::totals::{change_due, Totals};
use crate::uf::Uf;

static NCM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{8}$").expect("valid regex"));
static CFOP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[1-7]\d{3}$").expect("valid regex"));
static CEST_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{7}$").expect("valid regex"));
static GTIN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{8}|\d{12}|\d{13}|\d{14})$").expect("valid regex"));
static ZIP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{8}$").expect("valid regex"));
static CITY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{7}$").expect("valid regex"));

/// Postal address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Address {
    pub street: String,
    pub number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complement: Option<String>,
    pub district: String,
    /// IBGE municipality code, 7 digits
    pub city_code: String,
    pub city_name: String,
    pub uf: Uf,
    /// CEP, 8 digits
    pub zip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl Address {
    pub fn validate(&self) -> DomainResult<()> {
        require_len("street", &self.street, 2, 60)?;
        require_len("number", &self.number, 1, 60)?;
        require_len("district", &self.district, 2, 60)?;
        require_len("city_name", &self.city_name, 2, 60)?;
        if !CITY_RE.is_match(&self.city_code) {
            return Err(DomainError::validation("city_code must be the 7-digit IBGE code"));
        }
        if !ZIP_RE.is_match(&self.zip) {
            return Err(DomainError::validation("zip must have 8 digits"));
        }
        // The first two digits of the IBGE municipality code are the state code
        if !self.city_code.starts_with(&format!("{:02}", self.uf.code())) {
            return Err(DomainError::validation("city_code does not belong to uf"));
        }
        Ok(())
    }
}

/// Issuer identification, stored on the tenant's fiscal profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Issuer {
    #[cfg_attr(feature = "openapi", schema(value_type = String, example = "11222333000181"))]
    pub cnpj: Cnpj,
    /// State registration (IE)
    pub ie: String,
    pub legal_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trade_name: Option<String>,
    pub address: Address,
    pub tax_regime: TaxRegime,
}

impl Issuer {
    pub fn validate(&self) -> DomainResult<()> {
        require_len("legal_name", &self.legal_name, 2, 60)?;
        if self.ie.is_empty() || self.ie.len() > 14 || !self.ie.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DomainError::validation("ie must have up to 14 digits"));
        }
        self.address.validate()
    }
}

/// Recipient (destinatário).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Recipient {
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub tax_id: TaxId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default = "default_ie_indicator")]
    pub ie_indicator: IeIndicator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ie: Option<String>,
}

fn default_ie_indicator() -> IeIndicator {
    IeIndicator::NonContributor
}

/// ICMS treatment of an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "regime", rename_all = "snake_case")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum IcmsTax {
    /// Simples Nacional, identified by CSOSN
    Simples { csosn: u16 },
    /// Normal regime, identified by CST with the ICMS rate in percent
    Normal { cst: u8, rate: Decimal },
}

/// PIS or COFINS treatment of an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Contribution {
    pub cst: u8,
    #[serde(default)]
    pub rate: Decimal,
}

impl Contribution {
    /// CSTs taxed by rate over the item base (`PISAliq` / `PISOutr`).
    pub fn is_taxed(&self) -> bool {
        matches!(self.cst, 1 | 2 | 49 | 50..=56 | 60..=67 | 70..=75 | 98 | 99)
    }

    /// CSTs rendered in the non-taxed group (`PISNT`).
    pub fn is_non_taxed(&self) -> bool {
        matches!(self.cst, 4..=9)
    }

    fn validate(&self, label: &str) -> DomainResult<()> {
        if !self.is_taxed() && !self.is_non_taxed() {
            return Err(DomainError::validation(format!("{} CST {:02} is not supported", label, self.cst)));
        }
        if self.rate < Decimal::ZERO || self.rate > Decimal::ONE_HUNDRED {
            return Err(DomainError::validation(format!("{} rate must be between 0 and 100", label)));
        }
        Ok(())
    }
}

/// Tax information of one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ItemTax {
    /// Goods origin (orig), 0 = national
    #[serde(default)]
    pub origin: u8,
    pub icms: IcmsTax,
    pub pis: Contribution,
    pub cofins: Contribution,
    /// Approximate total tax burden in percent (Lei 12.741)
    #[serde(default)]
    pub approx_rate: Decimal,
}

const SUPPORTED_CSOSN: &[u16] = &[102, 103, 300, 400, 500, 900];
const SUPPORTED_CST: &[u8] = &[0, 40, 41, 50, 60];

impl ItemTax {
    fn validate(&self) -> DomainResult<()> {
        if self.origin > 8 {
            return Err(DomainError::validation("origin must be between 0 and 8"));
        }
        match &self.icms {
            IcmsTax::Simples { csosn } if !SUPPORTED_CSOSN.contains(csosn) => {
                return Err(DomainError::validation(format!("CSOSN {} is not supported", csosn)));
            }
            IcmsTax::Normal { cst, rate } => {
                if !SUPPORTED_CST.contains(cst) {
                    return Err(DomainError::validation(format!("ICMS CST {:02} is not supported", cst)));
                }
                if *rate < Decimal::ZERO || *rate > Decimal::ONE_HUNDRED {
                    return Err(DomainError::validation("ICMS rate must be between 0 and 100"));
                }
            }
            _ => {}
        }
        self.pis.validate("PIS")?;
        self.cofins.validate("COFINS")?;
        if self.approx_rate < Decimal::ZERO || self.approx_rate > Decimal::ONE_HUNDRED {
            return Err(DomainError::validation("approx_rate must be between 0 and 100"));
        }
        Ok(())
    }
}

/// Line item (det).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Item {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gtin: Option<String>,
    pub description: String,
    pub ncm: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cest: Option<String>,
    pub cfop: String,
    pub unit: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    #[serde(default)]
    pub discount: Decimal,
    #[serde(default)]
    pub freight: Decimal,
    pub tax: ItemTax,
}

impl Item {
    fn validate(&self, index: usize, model: FiscalModel, operation: OperationType) -> DomainResult<()> {
        let at = |msg: &str| DomainError::validation(format!("item {}: {}", index + 1, msg));

        require_len("code", &self.code, 1, 60).map_err(|_| at("code must have 1 to 60 characters"))?;
        require_len("description", &self.description, 1, 120)
            .map_err(|_| at("description must have 1 to 120 characters"))?;
        require_len("unit", &self.unit, 1, 6).map_err(|_| at("unit must have 1 to 6 characters"))?;

        if !NCM_RE.is_match(&self.ncm) {
            return Err(at("ncm must have 8 digits"));
        }
        if let Some(cest) = &self.cest {
            if !CEST_RE.is_match(cest) {
                return Err(at("cest must have 7 digits"));
            }
        }
        if let Some(gtin) = &self.gtin {
            if !GTIN_RE.is_match(gtin) {
                return Err(at("gtin must have 8, 12, 13 or 14 digits"));
            }
        }
        if !CFOP_RE.is_match(&self.cfop) {
            return Err(at("cfop must have 4 digits"));
        }
        let first = self.cfop.as_bytes()[0];
        let direction_ok = match operation {
            OperationType::Outbound => matches!(first, b'5' | b'6' | b'7'),
            OperationType::Inbound => matches!(first, b'1' | b'2' | b'3'),
        };
        if !direction_ok {
            return Err(at("cfop does not match the operation direction"));
        }
        if model == FiscalModel::Nfce && first != b'5' {
            return Err(at("NFC-e only accepts internal outbound CFOPs (5xxx)"));
        }

        let factor_limit = Decimal::from(MAX_ITEM_FACTOR);
        let amount_limit = Decimal::from(MAX_AMOUNT);
        if self.quantity <= Decimal::ZERO || self.quantity >= factor_limit {
            return Err(at("quantity must be positive and below 10^11"));
        }
        if self.unit_price < Decimal::ZERO || self.unit_price >= factor_limit {
            return Err(at("unit_price must be between zero and 10^11"));
        }
        if self.freight < Decimal::ZERO || self.freight >= amount_limit {
            return Err(at("freight must be between zero and 10^13"));
        }
        let gross = self.gross().map_err(|_| at("gross value is out of range"))?;
        if gross >= amount_limit {
            return Err(at("gross value must be below 10^13"));
        }
        if self.discount < Decimal::ZERO || self.discount > gross {
            return Err(at("discount must be between zero and the item gross value"));
        }
        self.tax.validate().map_err(|e| match e {
            DomainError::Validation(msg) => at(&msg),
            other => other,
        })
    }

    /// Gross value (vProd), rounded to cents.
    pub fn gross(&self) -> DomainResult<Decimal> {
        self.quantity
            .checked_mul(self.unit_price)
            .map(crate::totals::round2)
            .ok_or_else(crate::totals::out_of_range)
    }
}

/// Card integration data for card payments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CardInfo {
    /// true = integrated TEF/POS (tpIntegra 1)
    pub integrated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acquirer_cnpj: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_code: Option<String>,
}

/// Payment entry (detPag).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Payment {
    pub method: PaymentMethod,
    pub amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card: Option<CardInfo>,
}

/// Everything needed to emit a document for an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct DocumentDraft {
    /// External order reference, unique per tenant and model
    pub order_ref: String,
    pub model: FiscalModel,
    /// Nature of the operation (natOp)
    #[serde(default = "default_nature")]
    pub nature: String,
    #[serde(default = "default_operation")]
    pub operation: OperationType,
    #[serde(default = "default_purpose")]
    pub purpose: Purpose,
    #[serde(default = "default_destination")]
    pub destination: Destination,
    #[serde(default = "default_presence")]
    pub presence: PresenceIndicator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<Recipient>,
    pub items: Vec<Item>,
    pub payments: Vec<Payment>,
    #[serde(default = "default_freight_mode")]
    pub freight_mode: FreightMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<String>,
}

fn default_nature() -> String {
    "VENDA".to_string()
}

fn default_operation() -> OperationType {
    OperationType::Outbound
}

fn default_purpose() -> Purpose {
    Purpose::Normal
}

fn default_destination() -> Destination {
    Destination::Internal
}

fn default_presence() -> PresenceIndicator {
    PresenceIndicator::Internet
}

fn default_freight_mode() -> FreightMode {
    FreightMode::NoFreight
}

impl DocumentDraft {
    /// Validate the draft and return its totals.
    pub fn validate(&self) -> DomainResult<Totals> {
        require_len("order_ref", &self.order_ref, 1, 60)?;
        require_len("nature", &self.nature, 1, 60)?;

        if self.items.is_empty() {
            return Err(DomainError::validation("At least one item is required"));
        }
        if self.items.len() > MAX_ITEMS {
            return Err(DomainError::validation(format!("At most {} items are allowed", MAX_ITEMS)));
        }
        if self.payments.is_empty() {
            return Err(DomainError::validation("At least one payment is required"));
        }
        if self.payments.len() > MAX_PAYMENTS {
            return Err(DomainError::validation(format!("At most {} payments are allowed", MAX_PAYMENTS)));
        }

        match self.model {
            FiscalModel::Nfe => {
                let recipient = self
                    .recipient
                    .as_ref()
                    .ok_or_else(|| DomainError::validation("NF-e requires a recipient"))?;
                let address = recipient
                    .address
                    .as_ref()
                    .ok_or_else(|| DomainError::validation("NF-e recipient requires an address"))?;
                address.validate()?;
            }
            FiscalModel::Nfce => {
                if self.destination != Destination::Internal {
                    return Err(DomainError::validation("NFC-e only supports internal operations"));
                }
                if self.operation != OperationType::Outbound {
                    return Err(DomainError::validation("NFC-e only supports outbound operations"));
                }
                if !matches!(
                    self.presence,
                    PresenceIndicator::InPerson | PresenceIndicator::Delivery
                ) {
                    return Err(DomainError::validation(
                        "NFC-e presence must be in_person or delivery",
                    ));
                }
                if let Some(address) = self.recipient.as_ref().and_then(|r| r.address.as_ref()) {
                    address.validate()?;
                }
            }
        }

        if let Some(recipient) = &self.recipient {
            require_len("recipient name", &recipient.name, 2, 60)?;
            if recipient.ie_indicator == IeIndicator::Contributor && recipient.ie.is_none() {
                return Err(DomainError::validation("Contributor recipient requires ie"));
            }
        }

        for (index, item) in self.items.iter().enumerate() {
            item.validate(index, self.model, self.operation)?;
        }

        for payment in &self.payments {
            if payment.amount < Decimal::ZERO {
                return Err(DomainError::validation("Payment amount cannot be negative"));
            }
            if payment.amount >= Decimal::from(MAX_AMOUNT) {
                return Err(DomainError::validation("Payment amount must be below 10^13"));
            }
            if payment.card.is_some() && !payment.method.is_card() {
                return Err(DomainError::validation("Card data given for a non-card payment"));
            }
        }

        if let Some(info) = &self.additional_info {
            if info.chars().count() > 5000 {
                return Err(DomainError::validation("additional_info is limited to 5000 characters"));
            }
        }

        let totals = Totals::compute(&self.items)?;
        if totals.v_nf >= Decimal::from(MAX_AMOUNT) {
            return Err(DomainError::validation("Document total must be below 10^13"));
        }
        change_due(&totals, &self.payments)?;
        Ok(totals)
    }
}

fn require_len(field: &str, value: &str, min: usize, max: usize) -> DomainResult<()> {
    let len = value.trim().chars().count();
    if len < min || len > max {
        return Err(DomainError::validation(format!(
            "{} must have between {} and {} characters",
            field, min, max
        )));
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_valid_nfce_draft_returns_totals() {
        let totals = nfce_draft().validate().unwrap();
        assert_eq!(totals.v_prod, dec!(91.80));
        assert_eq!(totals.v_nf, dec!(91.80));
    }

    #[test]
    fn test_nfe_requires_recipient_address() {
        let mut draft = nfe_draft();
        assert!(draft.validate().is_ok());

        draft.recipient.as_mut().unwrap().address = None;
        let err = draft.validate().unwrap_err();
        assert_eq!(err, DomainError::validation("NF-e recipient requires an address"));
    }

    #[test]
    fn test_nfce_rejects_interstate_cfop() {
        let mut draft = nfce_draft();
        draft.items[0].cfop = "6102".to_string();
        assert!(draft.validate().is_err());
    }

    #[test]
    fn test_item_errors_are_positioned() {
        let mut draft = nfce_draft();
        draft.items.push(item(dec!(1), dec!(10)));
        draft.items[1].ncm = "0901".to_string();
        draft.payments[0].amount = dec!(101.80);
        let err = draft.validate().unwrap_err();
        assert_eq!(err, DomainError::validation("item 2: ncm must have 8 digits"));
    }

    #[test]
    fn test_discount_cannot_exceed_gross() {
        let mut draft = nfce_draft();
        draft.items[0].discount = dec!(100);
        assert!(draft.validate().is_err());
    }

    #[test]
    fn test_huge_amounts_are_rejected_without_overflow() {
        let mut draft = nfce_draft();
        draft.items[0].quantity = dec!(1000000000000000);
        draft.items[0].unit_price = dec!(1000000000000000);
        assert_eq!(
            draft.validate().unwrap_err(),
            DomainError::validation("item 1: quantity must be positive and below 10^11")
        );

        // both factors in range, product beyond vProd
        let mut draft = nfce_draft();
        draft.items[0].quantity = dec!(99999999999);
        draft.items[0].unit_price = dec!(99999999999);
        assert_eq!(
            draft.validate().unwrap_err(),
            DomainError::validation("item 1: gross value must be below 10^13")
        );
    }

    #[test]
    fn test_document_total_is_bounded() {
        let mut draft = nfce_draft();
        draft.items = vec![item(dec!(60), dec!(99999999999)); 2];
        draft.payments[0].amount = dec!(9999999999999);
        assert_eq!(
            draft.validate().unwrap_err(),
            DomainError::validation("Document total must be below 10^13")
        );
    }

    #[test]
    fn test_gross_overflow_is_an_error() {
        let it = item(Decimal::MAX, dec!(2));
        assert!(it.gross().is_err());
    }

    #[test]
    fn test_payments_must_cover_total() {
        let mut draft = nfce_draft();
        draft.payments[0].amount = dec!(50);
        assert!(draft.validate().is_err());
    }

    #[test]
    fn test_empty_items_rejected() {
        let mut draft = nfce_draft();
        draft.items.clear();
        assert_eq!(
            draft.validate().unwrap_err(),
            DomainError::validation("At least one item is required")
        );
    }

    #[test]
    fn test_address_city_must_match_uf() {
        let addr = address(Uf::RS, "3550308");
        assert!(addr.validate().is_err());
        assert!(address(Uf::SP, "3550308").validate().is_ok());
    }

    #[test]
    fn test_draft_deserializes_with_defaults() {
        let json = r#"{
            "order_ref": "PED-9",
            "model": "nfce",
            "presence": "in_person",
            "items": [{
                "code": "X1", "description": "Coado", "ncm": "21011110", "cfop": "5102",
                "unit": "UN", "quantity": "1", "unit_price": "8.50",
                "tax": {
                    "icms": {"regime": "simples", "csosn": 102},
                    "pis": {"cst": 49}, "cofins": {"cst": 49}
                }
            }],
            "payments": [{"method": "cash", "amount": "10.00"}]
        }"#;
        let draft: DocumentDraft = serde_json::from_str(json).unwrap();
        assert_eq!(draft.nature, "VENDA");
        assert_eq!(draft.freight_mode, FreightMode::NoFreight);
        let totals = draft.validate().unwrap();
        assert_eq!(totals.v_nf, dec!(8.50));
    }
}
