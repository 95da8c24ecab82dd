//! Enumerations carried on the wire with numeric codes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{DomainError, DomainResult};

/// Declares a fiscal enumeration with its layout code and a stable
/// snake_case name used in JSON and in the database.
macro_rules! coded_enum {
    (
        $(#[$meta:meta])*
        $name:ident : $repr:ty {
            $($variant:ident = $code:literal => $label:literal),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        #[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
        pub enum $name {
            $($variant),*
        }

        impl $name {
            /// Layout code.
            pub fn code(self) -> $repr {
                match self {
                    $($name::$variant => $code),*
                }
            }

            /// Look up by layout code.
            pub fn from_code(code: $repr) -> DomainResult<Self> {
                match code {
                    $($code => Ok($name::$variant),)*
                    other => Err(DomainError::validation(format!(
                        "Invalid {} code {}",
                        stringify!($name),
                        other
                    ))),
                }
            }

            /// Stable name used for persistence.
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $label),*
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($label => Ok($name::$variant),)*
                    other => Err(DomainError::validation(format!(
                        "Invalid {} '{}'",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

coded_enum! {
    /// Document model (mod).
    FiscalModel: u8 {
        Nfe = 55 => "nfe",
        Nfce = 65 => "nfce",
    }
}

coded_enum! {
    /// SEFAZ environment (tpAmb).
    Environment: u8 {
        Production = 1 => "production",
        Homologation = 2 => "homologation",
    }
}

coded_enum! {
    /// Emission type (tpEmis).
    EmissionType: u8 {
        Normal = 1 => "normal",
        SvcAn = 6 => "svc_an",
        SvcRs = 7 => "svc_rs",
        OfflineNfce = 9 => "offline_nfce",
    }
}

coded_enum! {
    /// Operation direction (tpNF).
    OperationType: u8 {
        Inbound = 0 => "inbound",
        Outbound = 1 => "outbound",
    }
}

coded_enum! {
    /// Issuing purpose (finNFe).
    Purpose: u8 {
        Normal = 1 => "normal",
        Complementary = 2 => "complementary",
        Adjustment = 3 => "adjustment",
        Return = 4 => "return",
    }
}

coded_enum! {
    /// Operation destination (idDest).
    Destination: u8 {
        Internal = 1 => "internal",
        Interstate = 2 => "interstate",
        Foreign = 3 => "foreign",
    }
}

coded_enum! {
    /// Buyer presence indicator (indPres).
    PresenceIndicator: u8 {
        NotApplicable = 0 => "not_applicable",
        InPerson = 1 => "in_person",
        Internet = 2 => "internet",
        Telemarketing = 3 => "telemarketing",
        Delivery = 4 => "delivery",
        Other = 9 => "other",
    }
}

coded_enum! {
    /// Issuer tax regime (CRT).
    TaxRegime: u8 {
        SimplesNacional = 1 => "simples_nacional",
        SimplesExcess = 2 => "simples_excess",
        Normal = 3 => "normal",
    }
}

coded_enum! {
    /// Payment method (tPag).
    PaymentMethod: u8 {
        Cash = 1 => "cash",
        Check = 2 => "check",
        CreditCard = 3 => "credit_card",
        DebitCard = 4 => "debit_card",
        StoreCredit = 5 => "store_credit",
        FoodVoucher = 10 => "food_voucher",
        MealVoucher = 11 => "meal_voucher",
        GiftVoucher = 12 => "gift_voucher",
        FuelVoucher = 13 => "fuel_voucher",
        BankSlip = 15 => "bank_slip",
        BankDeposit = 16 => "bank_deposit",
        Pix = 17 => "pix",
        Transfer = 18 => "transfer",
        Loyalty = 19 => "loyalty",
        NoPayment = 90 => "no_payment",
        Other = 99 => "other",
    }
}

coded_enum! {
    /// Freight responsibility (modFrete).
    FreightMode: u8 {
        Issuer = 0 => "issuer",
        Recipient = 1 => "recipient",
        ThirdParty = 2 => "third_party",
        NoFreight = 9 => "no_freight",
    }
}

coded_enum! {
    /// Recipient state registration indicator (indIEDest).
    IeIndicator: u8 {
        Contributor = 1 => "contributor",
        Exempt = 2 => "exempt",
        NonContributor = 9 => "non_contributor",
    }
}

impl PaymentMethod {
    /// Card payments carry a `card` group with the integration type.
    pub fn is_card(self) -> bool {
        matches!(self, PaymentMethod::CreditCard | PaymentMethod::DebitCard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(FiscalModel::Nfce.code(), 65);
        assert_eq!(EmissionType::from_code(9).unwrap(), EmissionType::OfflineNfce);
        assert!(EmissionType::from_code(3).is_err());
        assert_eq!(PaymentMethod::Pix.code(), 17);
    }

    #[test]
    fn test_names_parse_back() {
        assert_eq!("homologation".parse::<Environment>().unwrap(), Environment::Homologation);
        assert_eq!(FreightMode::NoFreight.to_string(), "no_freight");
        assert!("bogus".parse::<FiscalModel>().is_err());
    }
}
