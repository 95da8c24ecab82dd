//! HTTP transport for SOAP requests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Identity};
use tokio::sync::RwLock;
use uuid::Uuid;

use common::SefazClientConfig;

use super::SefazError;
use crate::signing::Credential;

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// One SOAP call.
#[derive(Debug, Clone)]
pub struct SoapRequest {
    pub tenant_id: Uuid,
    pub url: String,
    pub action: String,
    pub envelope: String,
    /// Client certificate for mutual TLS
    pub credential: Arc<Credential>,
}

/// Sends SOAP envelopes and returns the raw reply body.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait SefazTransport: Send + Sync {
    async fn send(&self, request: SoapRequest) -> Result<String, SefazError>;
}

type ClientKey = (Uuid, String, bool);

/// `reqwest` transport with one client per tenant certificate.
pub struct HttpTransport {
    connect_timeout: Duration,
    request_timeout: Duration,
    clients: RwLock<HashMap<ClientKey, Client>>,
}

impl HttpTransport {
    pub fn new(config: &SefazClientConfig) -> Self {
        Self {
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            clients: RwLock::new(HashMap::new()),
        }
    }

    async fn client(&self, request: &SoapRequest) -> Result<Client, SefazError> {
        let https = request.url.starts_with("https://");
        let key = (
            request.tenant_id,
            request.credential.fingerprint().to_string(),
            https,
        );
        if let Some(client) = self.clients.read().await.get(&key) {
            return Ok(client.clone());
        }

        let mut builder = Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout);
        let identity_pem = request.credential.identity_pem();
        if https && !identity_pem.is_empty() {
            let identity = Identity::from_pem(identity_pem)
                .map_err(|e| SefazError::Transport(format!("client certificate: {}", e)))?;
            builder = builder.identity(identity);
        }
        let client = builder.build()?;

        self.clients.write().await.insert(key, client.clone());
        Ok(client)
    }
}

#[async_trait]
impl SefazTransport for HttpTransport {
    async fn send(&self, request: SoapRequest) -> Result<String, SefazError> {
        let client = self.client(&request).await?;
        let content_type = format!(
            "application/soap+xml; charset=utf-8; action=\"{}\"",
            request.action
        );

        let started = std::time::Instant::now();
        let response = client
            .post(&request.url)
            .header(CONTENT_TYPE, content_type)
            .body(request.envelope)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        tracing::debug!(
            tenant_id = %request.tenant_id,
            url = %request.url,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "SEFAZ call finished"
        );

        if !status.is_success() {
            return Err(SefazError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::credential::fixtures::credential;
    use httpmock::prelude::*;

    fn config(request_timeout_ms: u64) -> SefazClientConfig {
        SefazClientConfig {
            request_timeout_ms,
            ..Default::default()
        }
    }

    fn request(url: String) -> SoapRequest {
        SoapRequest {
            tenant_id: Uuid::nil(),
            url,
            action: "urn:action".to_string(),
            envelope: "<env></env>".to_string(),
            credential: credential(),
        }
    }

    #[tokio::test]
    async fn test_posts_soap_with_action() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/ws/status")
                    .header("content-type", "application/soap+xml; charset=utf-8; action=\"urn:action\"")
                    .body("<env></env>");
                then.status(200).body("<reply></reply>");
            })
            .await;

        let transport = HttpTransport::new(&config(5000));
        let body = transport.send(request(server.url("/ws/status"))).await.unwrap();

        assert_eq!(body, "<reply></reply>");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_error_keeps_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(503).body("down");
            })
            .await;

        let err = HttpTransport::new(&config(5000))
            .send(request(server.url("/ws")))
            .await
            .unwrap_err();
        assert_eq!(err, SefazError::Http { status: 503, body: "down".into() });
        assert!(err.is_outcome_unknown());
    }

    #[tokio::test]
    async fn test_timeout() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200).delay(Duration::from_millis(500)).body("late");
            })
            .await;

        let err = HttpTransport::new(&config(50))
            .send(request(server.url("/ws")))
            .await
            .unwrap_err();
        assert_eq!(err, SefazError::Timeout);
    }

    #[tokio::test]
    async fn test_client_is_reused() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200).body("ok");
            })
            .await;

        let transport = HttpTransport::new(&config(5000));
        transport.send(request(server.url("/a"))).await.unwrap();
        transport.send(request(server.url("/b"))).await.unwrap();
        assert_eq!(transport.clients.read().await.len(), 1);
    }
}
