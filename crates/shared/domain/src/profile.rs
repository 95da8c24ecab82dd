//! Tenant fiscal profile: issuer data, series, CSC and certificate location.

use std::path::{Component, Path};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codes::{Environment, FiscalModel};
use crate::constants::{DEFAULT_CANCEL_WINDOW_HOURS, MAX_SERIES};
use crate::document::Issuer;
use crate::error::{DomainError, DomainResult};
use crate::uf::Uf;

/// Issuer configuration of one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiscalProfile {
    pub tenant_id: Uuid,
    pub issuer: Issuer,
    pub environment: Environment,
    pub nfe_series: u16,
    pub nfce_series: u16,
    /// NFC-e security code id (idCSC)
    pub csc_id: Option<String>,
    /// NFC-e security code token (CSC)
    #[serde(skip_serializing)]
    pub csc_token: Option<String>,
    pub certificate_path: String,
    pub private_key_path: String,
    pub allow_offline_contingency: bool,
    pub cancel_window_hours: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FiscalProfile {
    /// Build a profile from validated input.
    pub fn new(tenant_id: Uuid, input: ProfileInput) -> DomainResult<Self> {
        input.validate()?;
        let now = Utc::now();
        Ok(Self {
            tenant_id,
            issuer: input.issuer,
            environment: input.environment,
            nfe_series: input.nfe_series,
            nfce_series: input.nfce_series,
            csc_id: input.csc_id,
            csc_token: input.csc_token,
            certificate_path: input.certificate_path,
            private_key_path: input.private_key_path,
            allow_offline_contingency: input.allow_offline_contingency,
            cancel_window_hours: input.cancel_window_hours.unwrap_or(DEFAULT_CANCEL_WINDOW_HOURS),
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply new input, keeping the creation time.
    pub fn update(&mut self, input: ProfileInput) -> DomainResult<()> {
        let updated = FiscalProfile::new(self.tenant_id, input)?;
        *self = FiscalProfile {
            created_at: self.created_at,
            ..updated
        };
        Ok(())
    }

    /// Issuer state, which selects the SEFAZ authorizer.
    pub fn uf(&self) -> Uf {
        self.issuer.address.uf
    }

    pub fn series_for(&self, model: FiscalModel) -> u16 {
        match model {
            FiscalModel::Nfe => self.nfe_series,
            FiscalModel::Nfce => self.nfce_series,
        }
    }

    /// CSC pair needed for NFC-e QR codes.
    pub fn csc(&self) -> DomainResult<(&str, &str)> {
        match (self.csc_id.as_deref(), self.csc_token.as_deref()) {
            (Some(id), Some(token)) => Ok((id, token)),
            _ => Err(DomainError::validation("NFC-e emission requires csc_id and csc_token on the fiscal profile")),
        }
    }
}

/// Profile creation / replacement input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ProfileInput {
    pub issuer: Issuer,
    pub environment: Environment,
    #[serde(default = "default_series")]
    pub nfe_series: u16,
    #[serde(default = "default_series")]
    pub nfce_series: u16,
    #[serde(default)]
    pub csc_id: Option<String>,
    #[serde(default)]
    pub csc_token: Option<String>,
    /// PEM file, relative to the tenant's certificate directory
    pub certificate_path: String,
    pub private_key_path: String,
    #[serde(default)]
    pub allow_offline_contingency: bool,
    #[serde(default)]
    pub cancel_window_hours: Option<i64>,
}

fn default_series() -> u16 {
    1
}

impl ProfileInput {
    pub fn validate(&self) -> DomainResult<()> {
        self.issuer.validate()?;
        if self.nfe_series > MAX_SERIES || self.nfce_series > MAX_SERIES {
            return Err(DomainError::validation("Series must be between 0 and 999"));
        }
        if let Some(id) = &self.csc_id {
            if id.is_empty() || id.len() > 6 || !id.bytes().all(|b| b.is_ascii_digit()) {
                return Err(DomainError::validation("csc_id must have 1 to 6 digits"));
            }
        }
        if let Some(token) = &self.csc_token {
            if token.len() < 16 || token.len() > 36 {
                return Err(DomainError::validation("csc_token must have 16 to 36 characters"));
            }
        }
        if self.csc_id.is_some() != self.csc_token.is_some() {
            return Err(DomainError::validation("csc_id and csc_token must be given together"));
        }
        if self.certificate_path.trim().is_empty() || self.private_key_path.trim().is_empty() {
            return Err(DomainError::validation("certificate_path and private_key_path are required"));
        }
        if !is_confined(&self.certificate_path) || !is_confined(&self.private_key_path) {
            return Err(DomainError::validation(
                "certificate_path and private_key_path must be relative paths inside the tenant's certificate directory",
            ));
        }
        if let Some(hours) = self.cancel_window_hours {
            if !(1..=168).contains(&hours) {
                return Err(DomainError::validation("cancel_window_hours must be between 1 and 168"));
            }
        }
        Ok(())
    }
}

/// Whether `path` stays below the directory it is joined to: relative, and
/// without `..` components.
pub fn is_confined(path: &str) -> bool {
    let path = Path::new(path);
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Profile response (safe to return to client)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ProfileResponse {
    pub tenant_id: Uuid,
    pub issuer: Issuer,
    pub environment: Environment,
    pub nfe_series: u16,
    pub nfce_series: u16,
    pub csc_configured: bool,
    pub allow_offline_contingency: bool,
    pub cancel_window_hours: i64,
    pub updated_at: DateTime<Utc>,
}

impl From<&FiscalProfile> for ProfileResponse {
    fn from(profile: &FiscalProfile) -> Self {
        Self {
            tenant_id: profile.tenant_id,
            issuer: profile.issuer.clone(),
            environment: profile.environment,
            nfe_series: profile.nfe_series,
            nfce_series: profile.nfce_series,
            csc_configured: profile.csc_id.is_some() && profile.csc_token.is_some(),
            allow_offline_contingency: profile.allow_offline_contingency,
            cancel_window_hours: profile.cancel_window_hours,
            updated_at: profile.updated_at,
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::codes::TaxRegime;
    use crate::document::fixtures::address;
    use crate::tax_id::Cnpj;

    pub fn profile_input() -> ProfileInput {
        ProfileInput {
            issuer: Issuer {
                cnpj: Cnpj::parse("11222333000181").unwrap(),
                ie: "111222333444".to_string(),
                legal_name: "Mestres do Cafe Comercio LTDA".to_string(),
                trade_name: Some("Mestres do Cafe".to_string()),
                address: address(Uf::SP, "3550308"),
                tax_regime: TaxRegime::SimplesNacional,
            },
            environment: Environment::Homologation,
            nfe_series: 1,
            nfce_series: 2,
            csc_id: Some("000001".to_string()),
            csc_token: Some("0123456789ABCDEF0123".to_string()),
            certificate_path: "cert.pem".to_string(),
            private_key_path: "keys/key.pem".to_string(),
            allow_offline_contingency: true,
            cancel_window_hours: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::profile_input;
    use super::*;

    #[test]
    fn test_new_profile_defaults_cancel_window() {
        let profile = FiscalProfile::new(Uuid::new_v4(), profile_input()).unwrap();
        assert_eq!(profile.cancel_window_hours, DEFAULT_CANCEL_WINDOW_HOURS);
        assert_eq!(profile.uf(), Uf::SP);
        assert_eq!(profile.series_for(FiscalModel::Nfce), 2);
        assert_eq!(profile.csc().unwrap(), ("000001", "0123456789ABCDEF0123"));
    }

    #[test]
    fn test_csc_must_come_in_pairs() {
        let mut input = profile_input();
        input.csc_token = None;
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_certificate_paths_stay_in_the_tenant_directory() {
        for path in ["/etc/fiscal/cert.pem", "../other-tenant/cert.pem", "certs/../../cert.pem"] {
            let mut input = profile_input();
            input.certificate_path = path.to_string();
            assert!(input.validate().is_err(), "{} was accepted", path);
        }

        let mut input = profile_input();
        input.private_key_path = "./2024/key.pem".to_string();
        assert!(input.validate().is_ok());
    }

    #[test]
    fn test_update_keeps_created_at() {
        let mut profile = FiscalProfile::new(Uuid::new_v4(), profile_input()).unwrap();
        let created = profile.created_at;
        let mut input = profile_input();
        input.nfe_series = 5;
        profile.update(input).unwrap();
        assert_eq!(profile.nfe_series, 5);
        assert_eq!(profile.created_at, created);
    }

    #[test]
    fn test_response_hides_token() {
        let profile = FiscalProfile::new(Uuid::new_v4(), profile_input()).unwrap();
        let json = serde_json::to_string(&ProfileResponse::from(&profile)).unwrap();
        assert!(!json.contains("0123456789ABCDEF0123"));
        assert!(json.contains("\"csc_configured\":true"));
    }
}
