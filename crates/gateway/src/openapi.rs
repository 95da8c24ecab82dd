//! OpenAPI documentation.

use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::handlers::fiscal_handler::{
    CancelRequest, CorrectionRequest, EventResponse, InutilizationRequest,
};
use domain::{
    DocumentDraft, DocumentResponse, EventRecord, Inutilization, InutilizationRecord,
    ProfileInput, ProfileResponse, SefazStatus,
};

/// API documentation struct.
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::profile_handler::get_profile,
        crate::handlers::profile_handler::put_profile,
        crate::handlers::fiscal_handler::emit_document,
        crate::handlers::fiscal_handler::list_documents,
        crate::handlers::fiscal_handler::get_document,
        crate::handlers::fiscal_handler::get_document_xml,
        crate::handlers::fiscal_handler::refresh_document,
        crate::handlers::fiscal_handler::cancel_document,
        crate::handlers::fiscal_handler::correct_document,
        crate::handlers::fiscal_handler::list_events,
        crate::handlers::fiscal_handler::inutilize,
        crate::handlers::fiscal_handler::sefaz_status,
    ),
    components(
        schemas(
            ProfileInput,
            ProfileResponse,
            DocumentDraft,
            DocumentResponse,
            CancelRequest,
            CorrectionRequest,
            EventRecord,
            EventResponse,
            Inutilization,
            InutilizationRequest,
            InutilizationRecord,
            SefazStatus,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Fiscal profile", description = "Issuer configuration per tenant"),
        (name = "Fiscal", description = "NF-e / NFC-e emission, events and SEFAZ status"),
    )
)]
pub struct ApiDoc;

/// Security scheme modifier.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
