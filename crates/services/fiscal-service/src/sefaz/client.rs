//! High-level SEFAZ operations.

use std::sync::Arc;

use uuid::Uuid;

use domain::{AccessKey, Environment, FiscalModel, Uf};

use super::endpoints::{EndpointCatalog, SefazService};
use super::transport::{SefazTransport, SoapRequest};
use super::SefazError;
use crate::signing::Credential;
use crate::xml::response::{
    AuthorizationReply, EventReply, InutilizationReply, ProtocolReply, ReceiptReply, StatusReply,
};
use crate::xml::{messages, soap};

/// Who is calling and which authorizer answers.
#[derive(Debug, Clone)]
pub struct SefazContext {
    pub tenant_id: Uuid,
    pub uf: Uf,
    pub model: FiscalModel,
    pub environment: Environment,
    pub credential: Arc<Credential>,
}

#[derive(Clone)]
pub struct SefazClient {
    catalog: EndpointCatalog,
    transport: Arc<dyn SefazTransport>,
}

impl SefazClient {
    pub fn new(catalog: EndpointCatalog, transport: Arc<dyn SefazTransport>) -> Self {
        Self { catalog, transport }
    }

    async fn call(&self, ctx: &SefazContext, service: SefazService, body: &str) -> Result<String, SefazError> {
        let url = self.catalog.url(ctx.uf, ctx.model, ctx.environment, service);
        let envelope = soap::envelope(&service.namespace(), body)?;
        tracing::debug!(tenant_id = %ctx.tenant_id, service = service.wsdl_name(), url = %url, "Calling SEFAZ");

        self.transport
            .send(SoapRequest {
                tenant_id: ctx.tenant_id,
                url,
                action: service.action(),
                envelope,
                credential: ctx.credential.clone(),
            })
            .await
    }

    /// Submit one signed NF-e (`enviNFe`, synchronous).
    pub async fn authorize(
        &self,
        ctx: &SefazContext,
        lot_id: u64,
        signed_nfe: &str,
    ) -> Result<AuthorizationReply, SefazError> {
        let body = messages::envi_nfe(lot_id, signed_nfe)?;
        let reply = self.call(ctx, SefazService::Authorization, &body).await?;
        Ok(AuthorizationReply::from_xml(&reply)?)
    }

    pub async fn query_receipt(&self, ctx: &SefazContext, receipt: &str) -> Result<ReceiptReply, SefazError> {
        let body = messages::cons_reci_nfe(ctx.environment, receipt)?;
        let reply = self.call(ctx, SefazService::ReturnAuthorization, &body).await?;
        Ok(ReceiptReply::from_xml(&reply)?)
    }

    pub async fn query_protocol(&self, ctx: &SefazContext, key: &AccessKey) -> Result<ProtocolReply, SefazError> {
        let body = messages::cons_sit_nfe(ctx.environment, key)?;
        let reply = self.call(ctx, SefazService::ProtocolQuery, &body).await?;
        Ok(ProtocolReply::from_xml(&reply)?)
    }

    pub async fn service_status(&self, ctx: &SefazContext) -> Result<StatusReply, SefazError> {
        let body = messages::cons_stat_serv(ctx.environment, ctx.uf)?;
        let reply = self.call(ctx, SefazService::StatusService, &body).await?;
        Ok(StatusReply::from_xml(&reply)?)
    }

    /// Submit one signed `evento`.
    pub async fn send_event(
        &self,
        ctx: &SefazContext,
        lot_id: u64,
        signed_event: &str,
    ) -> Result<EventReply, SefazError> {
        let body = messages::env_evento(lot_id, signed_event)?;
        let reply = self.call(ctx, SefazService::EventReception, &body).await?;
        Ok(EventReply::from_xml(&reply)?)
    }

    /// Submit a signed `inutNFe`.
    pub async fn inutilize(&self, ctx: &SefazContext, signed_inut: &str) -> Result<InutilizationReply, SefazError> {
        let reply = self.call(ctx, SefazService::Inutilization, signed_inut).await?;
        Ok(InutilizationReply::from_xml(&reply)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sefaz::transport::MockSefazTransport;
    use crate::signing::credential::fixtures::credential;
    use crate::xml::response::fixtures::*;
    use mockall::predicate::*;

    fn ctx() -> SefazContext {
        SefazContext {
            tenant_id: Uuid::nil(),
            uf: Uf::SP,
            model: FiscalModel::Nfce,
            environment: Environment::Homologation,
            credential: credential(),
        }
    }

    fn client(transport: MockSefazTransport) -> SefazClient {
        SefazClient::new(EndpointCatalog::default(), Arc::new(transport))
    }

    #[tokio::test]
    async fn test_status_call_shape() {
        let mut transport = MockSefazTransport::new();
        transport
            .expect_send()
            .withf(|req| {
                req.url == "https://homologacao.nfce.fazenda.sp.gov.br/ws/NFeStatusServico4.asmx"
                    && req.action.ends_with("NFeStatusServico4/nfeStatusServicoNF")
                    && req.envelope.contains("<consStatServ ")
                    && req.envelope.contains("<cUF>35</cUF>")
            })
            .times(1)
            .returning(|_| Ok(ret_cons_stat(107)));

        let reply = client(transport).service_status(&ctx()).await.unwrap();
        assert_eq!(reply.status_code, 107);
    }

    #[tokio::test]
    async fn test_authorize_wraps_nfe_in_batch() {
        let mut transport = MockSefazTransport::new();
        transport
            .expect_send()
            .withf(|req| req.envelope.contains("<idLote>99</idLote><indSinc>1</indSinc><NFe>"))
            .returning(|_| Ok(ret_envi_nfe(103, Some("351000000000001"), None)));

        let reply = client(transport).authorize(&ctx(), 99, "<NFe></NFe>").await.unwrap();
        assert_eq!(reply.receipt.as_deref(), Some("351000000000001"));
    }

    #[tokio::test]
    async fn test_transport_error_passes_through() {
        let mut transport = MockSefazTransport::new();
        transport.expect_send().returning(|_| Err(SefazError::Timeout));

        let err = client(transport).query_receipt(&ctx(), "1").await.unwrap_err();
        assert_eq!(err, SefazError::Timeout);
    }

    #[tokio::test]
    async fn test_unexpected_reply_is_parse_error() {
        let mut transport = MockSefazTransport::new();
        transport
            .expect_send()
            .with(always())
            .returning(|_| Ok("<html>maintenance</html>".to_string()));

        let err = client(transport).inutilize(&ctx(), "<inutNFe></inutNFe>").await.unwrap_err();
        assert!(matches!(err, SefazError::Parse(_)));
    }
}
