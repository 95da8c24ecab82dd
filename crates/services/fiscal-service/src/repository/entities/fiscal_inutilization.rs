//! Inutilized number ranges.

use sea_orm::entity::prelude::*;
use sea_orm::Set;

use common::AppError;
use domain::{Inutilization, InutilizationRecord};

use super::{corrupt, narrow};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "fiscal_inutilizations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub model: String,
    pub series: i32,
    pub start_number: i64,
    pub end_number: i64,
    pub justification: String,
    pub status_code: i32,
    pub status_message: String,
    pub protocol: Option<String>,
    #[sea_orm(column_type = "Text")]
    pub xml: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

const TABLE: &str = "fiscal_inutilizations";

impl TryFrom<Model> for InutilizationRecord {
    type Error = AppError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(InutilizationRecord {
            id: model.id,
            tenant_id: model.tenant_id,
            request: Inutilization {
                model: model.model.parse().map_err(|e| corrupt(TABLE, e))?,
                series: narrow(TABLE, model.series.into())?,
                start: narrow(TABLE, model.start_number)?,
                end: narrow(TABLE, model.end_number)?,
                justification: model.justification,
            },
            status_code: narrow(TABLE, model.status_code.into())?,
            status_message: model.status_message,
            protocol: model.protocol,
            xml: model.xml,
            created_at: model.created_at,
        })
    }
}

impl ActiveModel {
    pub fn from_domain(record: &InutilizationRecord) -> Self {
        Self {
            id: Set(record.id),
            tenant_id: Set(record.tenant_id),
            model: Set(record.request.model.as_str().to_string()),
            series: Set(record.request.series.into()),
            start_number: Set(record.request.start.into()),
            end_number: Set(record.request.end.into()),
            justification: Set(record.request.justification.clone()),
            status_code: Set(record.status_code.into()),
            status_message: Set(record.status_message.clone()),
            protocol: Set(record.protocol.clone()),
            xml: Set(record.xml.clone()),
            created_at: Set(record.created_at),
        }
    }
}
