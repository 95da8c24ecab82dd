//! Fiscal document entity.

use sea_orm::entity::prelude::*;
use sea_orm::Set;

use common::AppError;
use domain::{AccessKey, FiscalDocument};

use super::{corrupt, narrow};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "fiscal_documents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub order_ref: String,
    pub model: String,
    pub series: i32,
    pub number: i64,
    #[sea_orm(unique)]
    pub access_key: String,
    pub environment: String,
    pub emission_type: String,
    pub status: String,
    #[sea_orm(column_type = "Decimal(Some((15, 2)))")]
    pub total: Decimal,
    #[sea_orm(column_type = "JsonBinary")]
    pub draft: Json,
    #[sea_orm(column_type = "JsonBinary")]
    pub totals: Json,
    #[sea_orm(column_type = "Text")]
    pub signed_xml: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub authorized_xml: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub qr_code: Option<String>,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub replaced_issue: Option<Json>,
    pub receipt_number: Option<String>,
    pub protocol: Option<String>,
    pub status_code: Option<i32>,
    pub status_message: Option<String>,
    pub attempts: i32,
    pub next_attempt_at: Option<DateTimeUtc>,
    pub issued_at: DateTimeUtc,
    pub authorized_at: Option<DateTimeUtc>,
    pub cancelled_at: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::fiscal_event::Entity")]
    Events,
}

impl Related<super::fiscal_event::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Events.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

const TABLE: &str = "fiscal_documents";

impl TryFrom<Model> for FiscalDocument {
    type Error = AppError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(FiscalDocument {
            id: model.id,
            tenant_id: model.tenant_id,
            order_ref: model.order_ref,
            model: model.model.parse().map_err(|e| corrupt(TABLE, e))?,
            series: narrow(TABLE, model.series.into())?,
            number: narrow(TABLE, model.number)?,
            access_key: AccessKey::parse(&model.access_key).map_err(|e| corrupt(TABLE, e))?,
            environment: model.environment.parse().map_err(|e| corrupt(TABLE, e))?,
            emission_type: model.emission_type.parse().map_err(|e| corrupt(TABLE, e))?,
            status: model.status.parse().map_err(|e| corrupt(TABLE, e))?,
            draft: serde_json::from_value(model.draft).map_err(|e| corrupt(TABLE, e))?,
            totals: serde_json::from_value(model.totals).map_err(|e| corrupt(TABLE, e))?,
            signed_xml: model.signed_xml,
            authorized_xml: model.authorized_xml,
            qr_code: model.qr_code,
            replaced: model
                .replaced_issue
                .map(serde_json::from_value)
                .transpose()
                .map_err(|e| corrupt(TABLE, e))?,
            receipt_number: model.receipt_number,
            protocol: model.protocol,
            status_code: model
                .status_code
                .map(|c| narrow(TABLE, c.into()))
                .transpose()?,
            status_message: model.status_message,
            attempts: narrow(TABLE, model.attempts.into())?,
            next_attempt_at: model.next_attempt_at,
            issued_at: model.issued_at,
            authorized_at: model.authorized_at,
            cancelled_at: model.cancelled_at,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

impl ActiveModel {
    pub fn from_domain(doc: &FiscalDocument) -> Result<Self, AppError> {
        let json = |e: serde_json::Error| AppError::Internal(e.to_string());
        Ok(Self {
            id: Set(doc.id),
            tenant_id: Set(doc.tenant_id),
            order_ref: Set(doc.order_ref.clone()),
            model: Set(doc.model.as_str().to_string()),
            series: Set(doc.series.into()),
            number: Set(doc.number.into()),
            access_key: Set(doc.access_key.as_str().to_string()),
            environment: Set(doc.environment.as_str().to_string()),
            emission_type: Set(doc.emission_type.as_str().to_string()),
            status: Set(doc.status.as_str().to_string()),
            total: Set(doc.totals.v_nf),
            draft: Set(serde_json::to_value(&doc.draft).map_err(json)?),
            totals: Set(serde_json::to_value(&doc.totals).map_err(json)?),
            signed_xml: Set(doc.signed_xml.clone()),
            authorized_xml: Set(doc.authorized_xml.clone()),
            qr_code: Set(doc.qr_code.clone()),
            replaced_issue: Set(doc
                .replaced
                .as_ref()
                .map(serde_json::to_value)
                .transpose()
                .map_err(json)?),
            receipt_number: Set(doc.receipt_number.clone()),
            protocol: Set(doc.protocol.clone()),
            status_code: Set(doc.status_code.map(i32::from)),
            status_message: Set(doc.status_message.clone()),
            attempts: Set(doc.attempts as i32),
            next_attempt_at: Set(doc.next_attempt_at),
            issued_at: Set(doc.issued_at),
            authorized_at: Set(doc.authorized_at),
            cancelled_at: Set(doc.cancelled_at),
            created_at: Set(doc.created_at),
            updated_at: Set(doc.updated_at),
        })
    }
}
