//! Brazilian taxpayer identifiers (CNPJ and CPF).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{DomainError, DomainResult};

/// Company taxpayer id, 14 digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cnpj(String);

/// Individual taxpayer id, 11 digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cpf(String);

/// Recipient identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum TaxId {
    Cnpj(Cnpj),
    Cpf(Cpf),
}

impl Cnpj {
    /// Parse a CNPJ, accepting the usual punctuation.
    pub fn parse(input: &str) -> DomainResult<Self> {
        let digits = only_digits(input, 14, "CNPJ")?;
        let (d1, d2) = cnpj_check_digits(&digits[..12]);
        if digits[12] != d1 || digits[13] != d2 {
            return Err(DomainError::validation("CNPJ check digits do not match"));
        }
        Ok(Self(to_string(&digits)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `00.000.000/0000-00`
    pub fn formatted(&self) -> String {
        let s = &self.0;
        format!("{}.{}.{}/{}-{}", &s[..2], &s[2..5], &s[5..8], &s[8..12], &s[12..])
    }
}

impl Cpf {
    /// Parse a CPF, accepting the usual punctuation.
    pub fn parse(input: &str) -> DomainResult<Self> {
        let digits = only_digits(input, 11, "CPF")?;
        let d1 = cpf_check_digit(&digits[..9]);
        let d2 = cpf_check_digit(&digits[..10]);
        if digits[9] != d1 || digits[10] != d2 {
            return Err(DomainError::validation("CPF check digits do not match"));
        }
        Ok(Self(to_string(&digits)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `000.000.000-00`
    pub fn formatted(&self) -> String {
        let s = &self.0;
        format!("{}.{}.{}-{}", &s[..3], &s[3..6], &s[6..9], &s[9..])
    }
}

impl TaxId {
    /// Parse either a CPF or a CNPJ depending on the digit count.
    pub fn parse(input: &str) -> DomainResult<Self> {
        let count = input.chars().filter(char::is_ascii_digit).count();
        match count {
            11 => Cpf::parse(input).map(TaxId::Cpf),
            14 => Cnpj::parse(input).map(TaxId::Cnpj),
            _ => Err(DomainError::validation("Tax id must have 11 (CPF) or 14 (CNPJ) digits")),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TaxId::Cnpj(c) => c.as_str(),
            TaxId::Cpf(c) => c.as_str(),
        }
    }
}

fn only_digits(input: &str, expected: usize, label: &str) -> DomainResult<Vec<u8>> {
    let mut digits = Vec::with_capacity(expected);
    for c in input.chars() {
        match c {
            '0'..='9' => digits.push(c as u8 - b'0'),
            '.' | '/' | '-' | ' ' => {}
            _ => return Err(DomainError::validation(format!("{} contains invalid characters", label))),
        }
    }
    if digits.len() != expected {
        return Err(DomainError::validation(format!("{} must have {} digits", label, expected)));
    }
    if digits.iter().all(|d| *d == digits[0]) {
        return Err(DomainError::validation(format!("{} cannot repeat a single digit", label)));
    }
    Ok(digits)
}

fn to_string(digits: &[u8]) -> String {
    digits.iter().map(|d| char::from(b'0' + d)).collect()
}

fn mod11_digit(sum: u32) -> u8 {
    let r = sum % 11;
    if r < 2 {
        0
    } else {
        (11 - r) as u8
    }
}

fn cnpj_check_digits(base: &[u8]) -> (u8, u8) {
    const W1: [u32; 12] = [5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];
    const W2: [u32; 13] = [6, 5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];

    let s1: u32 = base.iter().zip(W1).map(|(d, w)| *d as u32 * w).sum();
    let d1 = mod11_digit(s1);
    let s2: u32 = base
        .iter()
        .chain(std::iter::once(&d1))
        .zip(W2)
        .map(|(d, w)| *d as u32 * w)
        .sum();
    (d1, mod11_digit(s2))
}

fn cpf_check_digit(base: &[u8]) -> u8 {
    let top = base.len() as u32 + 1;
    let sum: u32 = base
        .iter()
        .enumerate()
        .map(|(i, d)| *d as u32 * (top - i as u32))
        .sum();
    mod11_digit(sum)
}

impl fmt::Display for Cnpj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for Cpf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Cnpj {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Cnpj::parse(s)
    }
}

impl FromStr for Cpf {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Cpf::parse(s)
    }
}

macro_rules! string_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                <$ty>::parse(&raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

string_serde!(Cnpj);
string_serde!(Cpf);
