//! Route configuration.

use axum::{middleware, Router};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers::{fiscal_routes, health_routes, profile_routes};
use crate::middleware::{auth_middleware, rate_limit_middleware};
use crate::openapi::ApiDoc;
use crate::state::AppState;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check (no auth, no rate limit)
        .nest("/health", health_routes())
        // Swagger UI
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Fiscal routes (auth required, rate limited)
        .nest(
            "/fiscal",
            Router::new()
                .nest("/profile", profile_routes())
                .merge(fiscal_routes())
                .route_layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth_middleware,
                ))
                .route_layer(middleware::from_fn_with_state(
                    state.clone(),
                    rate_limit_middleware,
                )),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::response::Response;
    use chrono::{Duration, Utc};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::config::GatewayConfig;
    use crate::middleware::testing::{token, SECRET};
    use crate::middleware::{Cache, MemoryBackend};
    use common::{AppError, JwtConfig, Paginated, RateLimitConfig};
    use domain::{
        DocumentStatus, Environment, FiscalModel, Inutilization, InutilizationRecord, SefazStatus,
        Uf,
    };
    use fiscal_service_lib::service::MockFiscalService;

    fn config(rate_limit: u64) -> GatewayConfig {
        GatewayConfig {
            jwt: JwtConfig {
                secret: SECRET.to_string(),
                leeway_seconds: 0,
            },
            rate_limit: RateLimitConfig {
                max_requests: rate_limit,
                window_seconds: 60,
            },
            ..Default::default()
        }
    }

    fn app_with(service: MockFiscalService, backend: MemoryBackend, rate_limit: u64) -> Router {
        create_router(AppState::new(
            Arc::new(service),
            Arc::new(Cache::with_backend(backend)),
            config(rate_limit),
        ))
    }

    fn app(service: MockFiscalService) -> Router {
        app_with(service, MemoryBackend::default(), 100)
    }

    fn bearer(tenant: Uuid, role: &str) -> String {
        format!("Bearer {}", token(tenant, role, Duration::hours(1)))
    }

    fn get(uri: &str, auth: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(header::AUTHORIZATION, auth)
            .body(Body::empty())
            .unwrap()
    }

    fn post_json(method: &str, uri: &str, auth: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, auth)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn sefaz_status() -> SefazStatus {
        SefazStatus {
            uf: Uf::SP,
            model: FiscalModel::Nfce,
            environment: Environment::Homologation,
            status_code: 107,
            status_message: "Servico em Operacao".to_string(),
            received_at: None,
            average_seconds: Some(1),
            observation: None,
            checked_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_health() {
        let mut service = MockFiscalService::new();
        service.expect_ping().returning(|| Ok(()));

        let response = app(service)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn test_health_reports_database_outage() {
        let mut service = MockFiscalService::new();
        service
            .expect_ping()
            .returning(|| Err(AppError::service_unavailable("database")));

        let response = app(service)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = json_body(response).await;
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["services"]["database"]["status"], "unhealthy");
        assert_eq!(body["services"]["redis"]["status"], "healthy");
    }

    #[tokio::test]
    async fn test_fiscal_routes_require_token() {
        let response = app(MockFiscalService::new())
            .oneshot(Request::builder().uri("/fiscal/documents").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error"]["code"], "UNAUTHORIZED");

        let expired = format!("Bearer {}", token(Uuid::new_v4(), "admin", Duration::hours(-1)));
        let response = app(MockFiscalService::new())
            .oneshot(get("/fiscal/documents", &expired))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_list_is_scoped_to_token_tenant() {
        let tenant = Uuid::new_v4();
        let mut service = MockFiscalService::new();
        service
            .expect_list()
            .withf(move |t, filter, page| {
                *t == tenant
                    && filter.status == Some(DocumentStatus::Authorized)
                    && filter.model == Some(FiscalModel::Nfe)
                    && page.page == 2
                    && page.per_page == 5
            })
            .returning(|_, _, page| Ok(Paginated::new(vec![], page, 7)));

        let response = app(service)
            .oneshot(get(
                "/fiscal/documents?status=authorized&model=nfe&page=2&per_page=5",
                &bearer(tenant, "operator"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("X-RateLimit-Remaining"));
        let body = json_body(response).await;
        assert_eq!(body["meta"]["total"], 7);
        assert_eq!(body["meta"]["total_pages"], 2);
    }

    #[tokio::test]
    async fn test_unknown_document_is_404() {
        let mut service = MockFiscalService::new();
        service.expect_get().returning(|_, _| Err(AppError::NotFound));

        let uri = format!("/fiscal/documents/{}", Uuid::new_v4());
        let response = app(service)
            .oneshot(get(&uri, &bearer(Uuid::new_v4(), "operator")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_xml_download() {
        let mut service = MockFiscalService::new();
        service
            .expect_xml()
            .returning(|_, _| Ok("<nfeProc versao=\"4.00\"></nfeProc>".to_string()));

        let uri = format!("/fiscal/documents/{}/xml", Uuid::new_v4());
        let response = app(service)
            .oneshot(get(&uri, &bearer(Uuid::new_v4(), "operator")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("application/xml"));
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.starts_with(b"<nfeProc"));
    }

    #[tokio::test]
    async fn test_malformed_draft_is_422() {
        let response = app(MockFiscalService::new())
            .oneshot(post_json(
                "POST",
                "/fiscal/documents",
                &bearer(Uuid::new_v4(), "operator"),
                json!({"model": "nfce"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json_body(response).await["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_cancel_requires_admin() {
        let uri = format!("/fiscal/documents/{}/cancel", Uuid::new_v4());
        let response = app(MockFiscalService::new())
            .oneshot(post_json(
                "POST",
                &uri,
                &bearer(Uuid::new_v4(), "operator"),
                json!({"justification": "Cliente desistiu da compra"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_cancel_validates_justification() {
        let uri = format!("/fiscal/documents/{}/cancel", Uuid::new_v4());
        let response = app(MockFiscalService::new())
            .oneshot(post_json(
                "POST",
                &uri,
                &bearer(Uuid::new_v4(), "admin"),
                json!({"justification": "curta"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json_body(response).await;
        assert!(body["error"]["message"].as_str().unwrap().contains("15"));
    }

    #[tokio::test]
    async fn test_profile_endpoints() {
        let response = app(MockFiscalService::new())
            .oneshot(post_json(
                "PUT",
                "/fiscal/profile",
                &bearer(Uuid::new_v4(), "operator"),
                json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let mut service = MockFiscalService::new();
        service.expect_get_profile().returning(|_| Err(AppError::NotFound));
        let response = app(service)
            .oneshot(get("/fiscal/profile", &bearer(Uuid::new_v4(), "operator")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_operator_cannot_replace_profile() {
        let profile = json!({
            "issuer": {
                "cnpj": "11222333000181",
                "ie": "111222333444",
                "legal_name": "Mestres do Cafe Comercio LTDA",
                "address": {
                    "street": "Rua das Torrefacoes",
                    "number": "100",
                    "district": "Centro",
                    "city_code": "3550308",
                    "city_name": "Sao Paulo",
                    "uf": "SP",
                    "zip": "01001000"
                },
                "tax_regime": "simples_nacional"
            },
            "environment": "homologation",
            "certificate_path": "cert.pem",
            "private_key_path": "key.pem"
        });

        // no service expectation: the call must not reach it
        let response = app(MockFiscalService::new())
            .oneshot(post_json(
                "PUT",
                "/fiscal/profile",
                &bearer(Uuid::new_v4(), "operator"),
                profile,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_inutilize() {
        let tenant = Uuid::new_v4();
        let mut service = MockFiscalService::new();
        service
            .expect_inutilize()
            .withf(move |t, req| *t == tenant && req.start == 10 && req.end == 12)
            .returning(|tenant_id, request: Inutilization| {
                Ok(InutilizationRecord {
                    id: Uuid::new_v4(),
                    tenant_id,
                    request,
                    status_code: 102,
                    status_message: "Inutilizacao de numero homologado".to_string(),
                    protocol: Some("135240000000777".to_string()),
                    xml: String::new(),
                    created_at: Utc::now(),
                })
            });

        let response = app(service)
            .oneshot(post_json(
                "POST",
                "/fiscal/inutilizations",
                &bearer(tenant, "admin"),
                json!({
                    "model": "nfce",
                    "series": 2,
                    "start": 10,
                    "end": 12,
                    "justification": "Falha no sistema de numeracao"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await;
        assert_eq!(body["status_code"], 102);
        assert!(body.get("xml").is_none());
    }

    #[tokio::test]
    async fn test_sefaz_status_is_cached() {
        let tenant = Uuid::new_v4();
        let mut service = MockFiscalService::new();
        service
            .expect_service_status()
            .withf(move |t, model| *t == tenant && *model == FiscalModel::Nfce)
            .times(1)
            .returning(|_, _| Ok(sefaz_status()));
        let app = app(service);

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(get("/fiscal/sefaz/status", &bearer(tenant, "operator")))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(json_body(response).await["status_code"], 107);
        }
    }

    #[tokio::test]
    async fn test_rate_limit() {
        let tenant = Uuid::new_v4();
        let mut service = MockFiscalService::new();
        service
            .expect_list()
            .times(1)
            .returning(|_, _, page| Ok(Paginated::new(vec![], page, 0)));
        let app = app_with(service, MemoryBackend::default(), 1);

        let first = app
            .clone()
            .oneshot(get("/fiscal/documents", &bearer(tenant, "operator")))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .oneshot(get("/fiscal/documents", &bearer(tenant, "operator")))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(second.headers()["Retry-After"], "60");
        let body = json_body(second).await;
        assert_eq!(body["error"]["code"], "TOO_MANY_REQUESTS");
    }

    #[tokio::test]
    async fn test_rate_limit_fails_closed() {
        let backend = MemoryBackend::default();
        backend.down.store(true, Ordering::SeqCst);

        let response = app_with(MockFiscalService::new(), backend, 100)
            .oneshot(get("/fiscal/documents", &bearer(Uuid::new_v4(), "operator")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
