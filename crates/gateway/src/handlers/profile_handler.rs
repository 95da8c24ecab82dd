//! Fiscal profile handlers.

use axum::{
    extract::{Extension, State},
    response::Json,
    routing::get,
    Router,
};

use common::AppResult;
use domain::{ProfileInput, ProfileResponse};

use crate::extractors::JsonBody;
use crate::middleware::{require_admin, CurrentUser};
use crate::state::AppState;

/// Create profile routes
pub fn profile_routes() -> Router<AppState> {
    Router::new().route("/", get(get_profile).put(put_profile))
}

/// Get the tenant's fiscal profile
#[utoipa::path(
    get,
    path = "/fiscal/profile",
    tag = "Fiscal profile",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Fiscal profile", body = ProfileResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "No profile configured")
    )
)]
pub async fn get_profile(
    Extension(current_user): Extension<CurrentUser>,
    State(state): State<AppState>,
) -> AppResult<Json<ProfileResponse>> {
    let profile = state.fiscal.get_profile(current_user.tenant_id).await?;
    Ok(Json(ProfileResponse::from(&profile)))
}

/// Create or replace the tenant's fiscal profile (admin only)
#[utoipa::path(
    put,
    path = "/fiscal/profile",
    tag = "Fiscal profile",
    security(("bearer_auth" = [])),
    request_body = ProfileInput,
    responses(
        (status = 200, description = "Profile saved", body = ProfileResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - Admin only"),
        (status = 422, description = "Invalid profile or unusable certificate")
    )
)]
pub async fn put_profile(
    Extension(current_user): Extension<CurrentUser>,
    State(state): State<AppState>,
    JsonBody(input): JsonBody<ProfileInput>,
) -> AppResult<Json<ProfileResponse>> {
    require_admin(&current_user)?;
    let profile = state
        .fiscal
        .upsert_profile(current_user.tenant_id, input)
        .await?;

    // environment or UF may have changed
    if let Err(e) = state.cache.invalidate_sefaz_status(&current_user.tenant_id).await {
        tracing::warn!(error = %e, "Failed to invalidate SEFAZ status cache");
    }
    Ok(Json(ProfileResponse::from(&profile)))
}
