//! Access key (chave de acesso) of NF-e / NFC-e documents.
//!
//! Layout, 44 digits:
//!
//! | field  | digits | meaning                         |
//! |--------|--------|---------------------------------|
//! | cUF    | 2      | IBGE code of the issuer's state |
//! | AAMM   | 4      | year and month of emission      |
//! | CNPJ   | 14     | issuer                          |
//! | mod    | 2      | 55 or 65                        |
//! | serie  | 3      | series                          |
//! | nNF    | 9      | document number                 |
//! | tpEmis | 1      | emission type                   |
//! | cNF    | 8      | random numeric code             |
//! | cDV    | 1      | mod-11 check digit              |

use chrono::{DateTime, Datelike, FixedOffset};
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::codes::{EmissionType, FiscalModel};
use crate::constants::{MAX_DOCUMENT_NUMBER, MAX_SERIES};
use crate::error::{DomainError, DomainResult};
use crate::tax_id::Cnpj;
use crate::uf::Uf;

/// Number of digits in a complete access key.
pub const ACCESS_KEY_LENGTH: usize = 44;

/// Components used to compose a key.
#[derive(Debug, Clone)]
pub struct AccessKeyParts<'a> {
    pub uf: Uf,
    pub issued_at: DateTime<FixedOffset>,
    pub cnpj: &'a Cnpj,
    pub model: FiscalModel,
    pub series: u16,
    pub number: u32,
    pub emission_type: EmissionType,
    pub numeric_code: u32,
}

/// Validated 44-digit access key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccessKey(String);

impl AccessKey {
    /// Compose a key and append its check digit.
    pub fn generate(parts: &AccessKeyParts<'_>) -> DomainResult<Self> {
        if parts.series > MAX_SERIES {
            return Err(DomainError::validation("Series must be between 0 and 999"));
        }
        if parts.number == 0 || parts.number > MAX_DOCUMENT_NUMBER {
            return Err(DomainError::validation("Document number must be between 1 and 999999999"));
        }
        if parts.numeric_code > 99_999_999 {
            return Err(DomainError::validation("Numeric code must have at most 8 digits"));
        }

        let body = format!(
            "{:02}{:02}{:02}{}{:02}{:03}{:09}{}{:08}",
            parts.uf.code(),
            parts.issued_at.year() % 100,
            parts.issued_at.month(),
            parts.cnpj.as_str(),
            parts.model.code(),
            parts.series,
            parts.number,
            parts.emission_type.code(),
            parts.numeric_code,
        );
        let dv = check_digit(&body);
        Ok(Self(format!("{}{}", body, dv)))
    }

    /// Parse and verify an existing key.
    pub fn parse(input: &str) -> DomainResult<Self> {
        let key = input.trim();
        if key.len() != ACCESS_KEY_LENGTH || !key.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DomainError::validation("Access key must have 44 digits"));
        }
        let expected = check_digit(&key[..43]);
        if key.as_bytes()[43] - b'0' != expected {
            return Err(DomainError::validation("Access key check digit does not match"));
        }
        Ok(Self(key.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn uf_code(&self) -> u8 {
        self.field(0, 2) as u8
    }

    /// `AAMM` as written in the key.
    pub fn year_month(&self) -> &str {
        &self.0[2..6]
    }

    pub fn cnpj(&self) -> &str {
        &self.0[6..20]
    }

    pub fn model(&self) -> DomainResult<FiscalModel> {
        FiscalModel::from_code(self.field(20, 22) as u8)
    }

    pub fn series(&self) -> u16 {
        self.field(22, 25) as u16
    }

    pub fn number(&self) -> u32 {
        self.field(25, 34) as u32
    }

    pub fn emission_type(&self) -> DomainResult<EmissionType> {
        EmissionType::from_code(self.field(34, 35) as u8)
    }

    pub fn numeric_code(&self) -> u32 {
        self.field(35, 43) as u32
    }

    pub fn check_digit(&self) -> u8 {
        self.0.as_bytes()[43] - b'0'
    }

    fn field(&self, start: usize, end: usize) -> u64 {
        self.0[start..end]
            .bytes()
            .fold(0u64, |acc, b| acc * 10 + (b - b'0') as u64)
    }
}

/// Mod-11 check digit with weights 2..=9 cycling from the rightmost digit.
pub fn check_digit(digits: &str) -> u8 {
    let sum: u32 = digits
        .bytes()
        .rev()
        .enumerate()
        .map(|(i, b)| (b - b'0') as u32 * (2 + (i as u32 % 8)))
        .sum();
    let r = sum % 11;
    if r < 2 {
        0
    } else {
        (11 - r) as u8
    }
}

/// Draw the random `cNF`, never equal to the document number.
pub fn random_numeric_code(number: u32) -> u32 {
    let mut rng = rand::thread_rng();
    loop {
        let code = rng.gen_range(10_000_000..=99_999_999);
        if code != number {
            return code;
        }
    }
}

impl fmt::Display for AccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for AccessKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for AccessKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        AccessKey::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn issued_at() -> DateTime<FixedOffset> {
        FixedOffset::west_opt(3 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 3, 15, 10, 30, 0)
            .unwrap()
    }

    #[test]
    fn test_check_digit_known_value() {
        // 43 digits of the key printed in the integration manual example
        assert_eq!(check_digit("5206043300991100250655012000000780026730161"), 5);
    }

    #[test]
    fn test_generate_layout() {
        let cnpj = Cnpj::parse("11222333000181").unwrap();
        let key = AccessKey::generate(&AccessKeyParts {
            uf: Uf::SP,
            issued_at: issued_at(),
            cnpj: &cnpj,
            model: FiscalModel::Nfce,
            series: 1,
            number: 42,
            emission_type: EmissionType::Normal,
            numeric_code: 12345678,
        })
        .unwrap();

        assert_eq!(key.as_str().len(), 44);
        assert!(key.as_str().starts_with("352403112223330001816500100000004211234567"));
        assert_eq!(key.uf_code(), 35);
        assert_eq!(key.year_month(), "2403");
        assert_eq!(key.cnpj(), "11222333000181");
        assert_eq!(key.model().unwrap(), FiscalModel::Nfce);
        assert_eq!(key.series(), 1);
        assert_eq!(key.number(), 42);
        assert_eq!(key.emission_type().unwrap(), EmissionType::Normal);
        assert_eq!(key.numeric_code(), 12345678);

        let reparsed = AccessKey::parse(key.as_str()).unwrap();
        assert_eq!(reparsed, key);
    }

    #[test]
    fn test_parse_rejects_tampered_key() {
        let cnpj = Cnpj::parse("11222333000181").unwrap();
        let key = AccessKey::generate(&AccessKeyParts {
            uf: Uf::RS,
            issued_at: issued_at(),
            cnpj: &cnpj,
            model: FiscalModel::Nfe,
            series: 2,
            number: 1000,
            emission_type: EmissionType::Normal,
            numeric_code: 55555555,
        })
        .unwrap();

        let mut tampered = key.as_str().to_string();
        let last = tampered.pop().unwrap();
        let wrong = if last == '0' { '1' } else { '0' };
        tampered.push(wrong);

        assert!(AccessKey::parse(&tampered).is_err());
        assert!(AccessKey::parse("123").is_err());
        assert!(AccessKey::parse(&"a".repeat(44)).is_err());
    }

    #[test]
    fn test_generate_rejects_out_of_range_number() {
        let cnpj = Cnpj::parse("11222333000181").unwrap();
        let result = AccessKey::generate(&AccessKeyParts {
            uf: Uf::SP,
            issued_at: issued_at(),
            cnpj: &cnpj,
            model: FiscalModel::Nfe,
            series: 1,
            number: 0,
            emission_type: EmissionType::Normal,
            numeric_code: 1,
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_random_numeric_code_differs_from_number() {
        for _ in 0..100 {
            let code = random_numeric_code(12_345_678);
            assert_ne!(code, 12_345_678);
            assert!((10_000_000..=99_999_999).contains(&code));
        }
    }
}
