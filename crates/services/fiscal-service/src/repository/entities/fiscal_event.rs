//! Registered events (cancellation, correction letter).

use sea_orm::entity::prelude::*;
use sea_orm::Set;

use common::AppError;
use domain::EventRecord;

use super::{corrupt, narrow};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "fiscal_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub document_id: Uuid,
    pub event_type: String,
    pub sequence: i32,
    #[sea_orm(column_type = "JsonBinary")]
    pub payload: Json,
    pub status_code: i32,
    pub status_message: String,
    pub protocol: Option<String>,
    #[sea_orm(column_type = "Text")]
    pub xml: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::fiscal_document::Entity",
        from = "Column::DocumentId",
        to = "super::fiscal_document::Column::Id"
    )]
    Document,
}

impl Related<super::fiscal_document::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Document.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

const TABLE: &str = "fiscal_events";

impl TryFrom<Model> for EventRecord {
    type Error = AppError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(EventRecord {
            id: model.id,
            tenant_id: model.tenant_id,
            document_id: model.document_id,
            kind: model.event_type.parse().map_err(|e| corrupt(TABLE, e))?,
            sequence: narrow(TABLE, model.sequence.into())?,
            detail: serde_json::from_value(model.payload).map_err(|e| corrupt(TABLE, e))?,
            status_code: narrow(TABLE, model.status_code.into())?,
            status_message: model.status_message,
            protocol: model.protocol,
            xml: model.xml,
            created_at: model.created_at,
        })
    }
}

impl ActiveModel {
    pub fn from_domain(event: &EventRecord) -> Result<Self, AppError> {
        Ok(Self {
            id: Set(event.id),
            tenant_id: Set(event.tenant_id),
            document_id: Set(event.document_id),
            event_type: Set(event.kind.as_str().to_string()),
            sequence: Set(event.sequence as i32),
            payload: Set(serde_json::to_value(&event.detail).map_err(|e| AppError::Internal(e.to_string()))?),
            status_code: Set(event.status_code.into()),
            status_message: Set(event.status_message.clone()),
            protocol: Set(event.protocol.clone()),
            xml: Set(event.xml.clone()),
            created_at: Set(event.created_at),
        })
    }
}
