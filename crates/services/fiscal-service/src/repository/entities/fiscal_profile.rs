//! Fiscal profile entity.

use sea_orm::entity::prelude::*;
use sea_orm::Set;

use common::AppError;
use domain::FiscalProfile;

use super::{corrupt, narrow};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "fiscal_profiles")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub tenant_id: Uuid,
    #[sea_orm(column_type = "JsonBinary")]
    pub issuer: Json,
    pub uf: String,
    pub environment: String,
    pub nfe_series: i32,
    pub nfce_series: i32,
    pub csc_id: Option<String>,
    pub csc_token: Option<String>,
    pub certificate_path: String,
    pub private_key_path: String,
    pub allow_offline_contingency: bool,
    pub cancel_window_hours: i32,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

const TABLE: &str = "fiscal_profiles";

impl TryFrom<Model> for FiscalProfile {
    type Error = AppError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(FiscalProfile {
            tenant_id: model.tenant_id,
            issuer: serde_json::from_value(model.issuer).map_err(|e| corrupt(TABLE, e))?,
            environment: model.environment.parse().map_err(|e| corrupt(TABLE, e))?,
            nfe_series: narrow(TABLE, model.nfe_series.into())?,
            nfce_series: narrow(TABLE, model.nfce_series.into())?,
            csc_id: model.csc_id,
            csc_token: model.csc_token,
            certificate_path: model.certificate_path,
            private_key_path: model.private_key_path,
            allow_offline_contingency: model.allow_offline_contingency,
            cancel_window_hours: model.cancel_window_hours.into(),
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

impl ActiveModel {
    pub fn from_domain(profile: &FiscalProfile) -> Result<Self, AppError> {
        Ok(Self {
            tenant_id: Set(profile.tenant_id),
            issuer: Set(serde_json::to_value(&profile.issuer).map_err(|e| AppError::Internal(e.to_string()))?),
            uf: Set(profile.uf().acronym().to_string()),
            environment: Set(profile.environment.as_str().to_string()),
            nfe_series: Set(profile.nfe_series.into()),
            nfce_series: Set(profile.nfce_series.into()),
            csc_id: Set(profile.csc_id.clone()),
            csc_token: Set(profile.csc_token.clone()),
            certificate_path: Set(profile.certificate_path.clone()),
            private_key_path: Set(profile.private_key_path.clone()),
            allow_offline_contingency: Set(profile.allow_offline_contingency),
            cancel_window_hours: Set(profile.cancel_window_hours as i32),
            created_at: Set(profile.created_at),
            updated_at: Set(profile.updated_at),
        })
    }
}
