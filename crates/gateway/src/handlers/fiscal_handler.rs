//! Fiscal document handlers.

use axum::{
    extract::{Extension, Path, Query, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use common::{AppResult, Paginated, PaginationParams};
use domain::{
    DocumentDraft, DocumentFilter, DocumentResponse, DocumentStatus, EventRecord, FiscalModel,
    Inutilization, InutilizationRecord, SefazStatus,
};
use fiscal_service_lib::service::EventOutcome;

use crate::extractors::{JsonBody, ValidatedJson};
use crate::middleware::{require_admin, CurrentUser};
use crate::state::AppState;

/// Cancellation request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CancelRequest {
    #[validate(length(min = 15, max = 255, message = "Justification must have between 15 and 255 characters"))]
    #[schema(example = "Cliente desistiu da compra")]
    pub justification: String,
}

/// Correction letter request (NF-e only)
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CorrectionRequest {
    #[validate(length(min = 15, max = 1000, message = "Correction text must have between 15 and 1000 characters"))]
    #[schema(example = "Corrigir o complemento do endereco do destinatario")]
    pub text: String,
}

/// Number range inutilization request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct InutilizationRequest {
    pub model: FiscalModel,
    #[validate(range(max = 999, message = "Series must be between 0 and 999"))]
    pub series: u16,
    #[validate(range(min = 1, message = "Numbers start at 1"))]
    pub start: u32,
    #[validate(range(min = 1, message = "Numbers start at 1"))]
    pub end: u32,
    #[validate(length(min = 15, max = 255, message = "Justification must have between 15 and 255 characters"))]
    pub justification: String,
}

impl From<InutilizationRequest> for Inutilization {
    fn from(req: InutilizationRequest) -> Self {
        Inutilization {
            model: req.model,
            series: req.series,
            start: req.start,
            end: req.end,
            justification: req.justification,
        }
    }
}

/// Document listing filters
#[derive(Debug, Deserialize, IntoParams)]
pub struct DocumentQuery {
    pub status: Option<DocumentStatus>,
    pub model: Option<FiscalModel>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

impl DocumentQuery {
    fn split(self) -> (DocumentFilter, PaginationParams) {
        let defaults = PaginationParams::default();
        (
            DocumentFilter {
                status: self.status,
                model: self.model,
            },
            PaginationParams::new(
                self.page.unwrap_or(defaults.page),
                self.per_page.unwrap_or(defaults.per_page),
            ),
        )
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct StatusQuery {
    /// Defaults to NFC-e
    pub model: Option<FiscalModel>,
}

/// A registered event with the document it changed
#[derive(Debug, Serialize, ToSchema)]
pub struct EventResponse {
    pub document: DocumentResponse,
    pub event: EventRecord,
}

impl From<EventOutcome> for EventResponse {
    fn from(outcome: EventOutcome) -> Self {
        Self {
            document: outcome.document.into(),
            event: outcome.event,
        }
    }
}

/// Create fiscal routes
pub fn fiscal_routes() -> Router<AppState> {
    Router::new()
        .route("/documents", get(list_documents).post(emit_document))
        .route("/documents/:id", get(get_document))
        .route("/documents/:id/xml", get(get_document_xml))
        .route("/documents/:id/refresh", post(refresh_document))
        .route("/documents/:id/cancel", post(cancel_document))
        .route("/documents/:id/corrections", post(correct_document))
        .route("/documents/:id/events", get(list_events))
        .route("/inutilizations", post(inutilize))
        .route("/sefaz/status", get(sefaz_status))
}

/// Emit an NF-e / NFC-e for an order
///
/// Returns 201 for a new document, 200 when the order already has one.
#[utoipa::path(
    post,
    path = "/fiscal/documents",
    tag = "Fiscal",
    security(("bearer_auth" = [])),
    request_body = DocumentDraft,
    responses(
        (status = 201, description = "Document created", body = DocumentResponse),
        (status = 200, description = "Existing document for this order", body = DocumentResponse),
        (status = 401, description = "Unauthorized"),
        (status = 422, description = "Invalid draft or missing fiscal profile")
    )
)]
pub async fn emit_document(
    Extension(current_user): Extension<CurrentUser>,
    State(state): State<AppState>,
    JsonBody(draft): JsonBody<DocumentDraft>,
) -> AppResult<(StatusCode, Json<DocumentResponse>)> {
    let emission = state.fiscal.emit(current_user.tenant_id, draft).await?;
    let status = if emission.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(emission.document.into())))
}

/// List the tenant's documents
#[utoipa::path(
    get,
    path = "/fiscal/documents",
    tag = "Fiscal",
    security(("bearer_auth" = [])),
    params(DocumentQuery),
    responses(
        (status = 200, description = "Page of documents"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn list_documents(
    Extension(current_user): Extension<CurrentUser>,
    State(state): State<AppState>,
    Query(query): Query<DocumentQuery>,
) -> AppResult<Json<Paginated<DocumentResponse>>> {
    let (filter, page) = query.split();
    let documents = state.fiscal.list(current_user.tenant_id, filter, page).await?;
    Ok(Json(Paginated {
        data: documents.data.into_iter().map(DocumentResponse::from).collect(),
        meta: documents.meta,
    }))
}

/// Get a document
#[utoipa::path(
    get,
    path = "/fiscal/documents/{id}",
    tag = "Fiscal",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Document ID")),
    responses(
        (status = 200, description = "Document", body = DocumentResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Document not found")
    )
)]
pub async fn get_document(
    Extension(current_user): Extension<CurrentUser>,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<DocumentResponse>> {
    let doc = state.fiscal.get(current_user.tenant_id, id).await?;
    Ok(Json(doc.into()))
}

/// Download the document XML
///
/// `nfeProc` once SEFAZ answered, the signed `NFe` before that.
#[utoipa::path(
    get,
    path = "/fiscal/documents/{id}/xml",
    tag = "Fiscal",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Document ID")),
    responses(
        (status = 200, description = "Document XML", content_type = "application/xml", body = String),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Document not found")
    )
)]
pub async fn get_document_xml(
    Extension(current_user): Extension<CurrentUser>,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let xml = state.fiscal.xml(current_user.tenant_id, id).await?;
    Ok(([(CONTENT_TYPE, "application/xml; charset=utf-8")], xml).into_response())
}

/// Ask SEFAZ about a pending document now
#[utoipa::path(
    post,
    path = "/fiscal/documents/{id}/refresh",
    tag = "Fiscal",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Document ID")),
    responses(
        (status = 200, description = "Document after the SEFAZ answer", body = DocumentResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Document not found"),
        (status = 502, description = "SEFAZ did not answer")
    )
)]
pub async fn refresh_document(
    Extension(current_user): Extension<CurrentUser>,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<DocumentResponse>> {
    let doc = state.fiscal.refresh(current_user.tenant_id, id).await?;
    Ok(Json(doc.into()))
}

/// Cancel an authorized document (admin only)
#[utoipa::path(
    post,
    path = "/fiscal/documents/{id}/cancel",
    tag = "Fiscal",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Document ID")),
    request_body = CancelRequest,
    responses(
        (status = 200, description = "Cancellation registered", body = EventResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - Admin only"),
        (status = 404, description = "Document not found"),
        (status = 409, description = "Document not cancellable"),
        (status = 422, description = "Invalid justification or refused by SEFAZ")
    )
)]
pub async fn cancel_document(
    Extension(current_user): Extension<CurrentUser>,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<CancelRequest>,
) -> AppResult<Json<EventResponse>> {
    require_admin(&current_user)?;
    let outcome = state
        .fiscal
        .cancel(current_user.tenant_id, id, payload.justification)
        .await?;
    Ok(Json(outcome.into()))
}

/// Register a correction letter
#[utoipa::path(
    post,
    path = "/fiscal/documents/{id}/corrections",
    tag = "Fiscal",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Document ID")),
    request_body = CorrectionRequest,
    responses(
        (status = 200, description = "Correction letter registered", body = EventResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Document not found"),
        (status = 409, description = "Document does not accept corrections"),
        (status = 422, description = "Invalid text or refused by SEFAZ")
    )
)]
pub async fn correct_document(
    Extension(current_user): Extension<CurrentUser>,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<CorrectionRequest>,
) -> AppResult<Json<EventResponse>> {
    let outcome = state
        .fiscal
        .correct(current_user.tenant_id, id, payload.text)
        .await?;
    Ok(Json(outcome.into()))
}

/// Events registered for a document
#[utoipa::path(
    get,
    path = "/fiscal/documents/{id}/events",
    tag = "Fiscal",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Document ID")),
    responses(
        (status = 200, description = "Registered events", body = Vec<EventRecord>),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Document not found")
    )
)]
pub async fn list_events(
    Extension(current_user): Extension<CurrentUser>,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<EventRecord>>> {
    let events = state.fiscal.events(current_user.tenant_id, id).await?;
    Ok(Json(events))
}

/// Inutilize a range of unused numbers (admin only)
#[utoipa::path(
    post,
    path = "/fiscal/inutilizations",
    tag = "Fiscal",
    security(("bearer_auth" = [])),
    request_body = InutilizationRequest,
    responses(
        (status = 201, description = "Range inutilized", body = InutilizationRecord),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - Admin only"),
        (status = 409, description = "Range already inutilized"),
        (status = 422, description = "Numbers in use or refused by SEFAZ")
    )
)]
pub async fn inutilize(
    Extension(current_user): Extension<CurrentUser>,
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<InutilizationRequest>,
) -> AppResult<(StatusCode, Json<InutilizationRecord>)> {
    require_admin(&current_user)?;
    let record = state
        .fiscal
        .inutilize(current_user.tenant_id, payload.into())
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// SEFAZ service status for the tenant's authorizer
#[utoipa::path(
    get,
    path = "/fiscal/sefaz/status",
    tag = "Fiscal",
    security(("bearer_auth" = [])),
    params(StatusQuery),
    responses(
        (status = 200, description = "Service status", body = SefazStatus),
        (status = 401, description = "Unauthorized"),
        (status = 502, description = "SEFAZ did not answer")
    )
)]
pub async fn sefaz_status(
    Extension(current_user): Extension<CurrentUser>,
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> AppResult<Json<SefazStatus>> {
    let tenant_id = current_user.tenant_id;
    let model = query.model.unwrap_or(FiscalModel::Nfce);

    // cache failures fall through to SEFAZ
    match state.cache.get_sefaz_status(&tenant_id, model).await {
        Ok(Some(status)) => return Ok(Json(status)),
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "SEFAZ status cache unavailable"),
    }

    let status = state.fiscal.service_status(tenant_id, model).await?;
    if let Err(e) = state
        .cache
        .set_sefaz_status(&tenant_id, &status, state.config.sefaz_status_ttl_seconds)
        .await
    {
        tracing::warn!(error = %e, "Failed to cache SEFAZ status");
    }
    Ok(Json(status))
}
