//! Web service catalog: which authorizer serves a state, and where.

use domain::{Environment, FiscalModel, Uf};

const WSDL_BASE: &str = "http://www.portalfiscal.inf.br/nfe/wsdl";

/// NF-e 4.00 web services used by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SefazService {
    Authorization,
    ReturnAuthorization,
    ProtocolQuery,
    StatusService,
    EventReception,
    Inutilization,
}

impl SefazService {
    /// WSDL name, also the last segment of `nfeDadosMsg`'s namespace.
    pub fn wsdl_name(self) -> &'static str {
        match self {
            SefazService::Authorization => "NFeAutorizacao4",
            SefazService::ReturnAuthorization => "NFeRetAutorizacao4",
            SefazService::ProtocolQuery => "NFeConsultaProtocolo4",
            SefazService::StatusService => "NFeStatusServico4",
            SefazService::EventReception => "NFeRecepcaoEvento4",
            SefazService::Inutilization => "NFeInutilizacao4",
        }
    }

    fn operation(self) -> &'static str {
        match self {
            SefazService::Authorization => "nfeAutorizacaoLote",
            SefazService::ReturnAuthorization => "nfeRetAutorizacaoLote",
            SefazService::ProtocolQuery => "nfeConsultaNF",
            SefazService::StatusService => "nfeStatusServicoNF",
            SefazService::EventReception => "nfeRecepcaoEvento",
            SefazService::Inutilization => "nfeInutilizacaoNF",
        }
    }

    pub fn namespace(self) -> String {
        format!("{}/{}", WSDL_BASE, self.wsdl_name())
    }

    /// SOAP 1.2 action.
    pub fn action(self) -> String {
        format!("{}/{}", self.namespace(), self.operation())
    }
}

/// State or shared authorizer (SVRS) that processes a state's documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Authorizer {
    Am,
    Ba,
    Go,
    Mg,
    Ms,
    Mt,
    Pe,
    Pr,
    Rs,
    Sp,
    Svrs,
}

/// How an authorizer lays out its service paths.
enum PathStyle {
    /// `{prefix}{file}.asmx`, file name lower case when `lower`
    Asmx { prefix: &'static str, lower: bool },
    /// `{prefix}{WsdlName}`
    Plain(&'static str),
    /// `/webservices/{WsdlName}/{WsdlName}.asmx`
    Nested,
    /// RS and SVRS layout
    Rs,
}

impl Authorizer {
    pub fn for_uf(uf: Uf, model: FiscalModel) -> Self {
        match (uf, model) {
            (Uf::AM, _) => Authorizer::Am,
            (Uf::GO, _) => Authorizer::Go,
            (Uf::MG, _) => Authorizer::Mg,
            (Uf::MS, _) => Authorizer::Ms,
            (Uf::MT, _) => Authorizer::Mt,
            (Uf::PR, _) => Authorizer::Pr,
            (Uf::RS, _) => Authorizer::Rs,
            (Uf::SP, _) => Authorizer::Sp,
            (Uf::BA, FiscalModel::Nfe) => Authorizer::Ba,
            (Uf::PE, FiscalModel::Nfe) => Authorizer::Pe,
            _ => Authorizer::Svrs,
        }
    }

    /// (production, homologation) origins.
    fn hosts(self, model: FiscalModel) -> (&'static str, &'static str) {
        use FiscalModel::*;
        match (self, model) {
            (Authorizer::Am, Nfe) => ("https://nfe.sefaz.am.gov.br", "https://homnfe.sefaz.am.gov.br"),
            (Authorizer::Am, Nfce) => ("https://nfce.sefaz.am.gov.br", "https://homnfce.sefaz.am.gov.br"),
            (Authorizer::Ba, _) => ("https://nfe.sefaz.ba.gov.br", "https://hnfe.sefaz.ba.gov.br"),
            (Authorizer::Go, _) => ("https://nfe.sefaz.go.gov.br", "https://homolog.sefaz.go.gov.br"),
            (Authorizer::Mg, Nfe) => ("https://nfe.fazenda.mg.gov.br", "https://hnfe.fazenda.mg.gov.br"),
            (Authorizer::Mg, Nfce) => ("https://nfce.fazenda.mg.gov.br", "https://hnfce.fazenda.mg.gov.br"),
            (Authorizer::Ms, Nfe) => ("https://nfe.sefaz.ms.gov.br", "https://hom.nfe.sefaz.ms.gov.br"),
            (Authorizer::Ms, Nfce) => ("https://nfce.sefaz.ms.gov.br", "https://hom.nfce.sefaz.ms.gov.br"),
            (Authorizer::Mt, Nfe) => ("https://nfe.sefaz.mt.gov.br", "https://homologacao.sefaz.mt.gov.br"),
            (Authorizer::Mt, Nfce) => ("https://nfce.sefaz.mt.gov.br", "https://homologacao.sefaz.mt.gov.br"),
            (Authorizer::Pe, _) => ("https://nfe.sefaz.pe.gov.br", "https://nfehomolog.sefaz.pe.gov.br"),
            (Authorizer::Pr, Nfe) => ("https://nfe.sefa.pr.gov.br", "https://homologacao.nfe.sefa.pr.gov.br"),
            (Authorizer::Pr, Nfce) => ("https://nfce.sefa.pr.gov.br", "https://homologacao.nfce.sefa.pr.gov.br"),
            (Authorizer::Rs, Nfe) => ("https://nfe.sefazrs.rs.gov.br", "https://nfe-homologacao.sefazrs.rs.gov.br"),
            (Authorizer::Rs, Nfce) => ("https://nfce.sefazrs.rs.gov.br", "https://nfce-homologacao.sefazrs.rs.gov.br"),
            (Authorizer::Sp, Nfe) => ("https://nfe.fazenda.sp.gov.br", "https://homologacao.nfe.fazenda.sp.gov.br"),
            (Authorizer::Sp, Nfce) => ("https://nfce.fazenda.sp.gov.br", "https://homologacao.nfce.fazenda.sp.gov.br"),
            (Authorizer::Svrs, Nfe) => ("https://nfe.svrs.rs.gov.br", "https://nfe-homologacao.svrs.rs.gov.br"),
            (Authorizer::Svrs, Nfce) => ("https://nfce.svrs.rs.gov.br", "https://nfce-homologacao.svrs.rs.gov.br"),
        }
    }

    fn style(self, model: FiscalModel) -> PathStyle {
        use FiscalModel::*;
        match (self, model) {
            (Authorizer::Sp, Nfe) => PathStyle::Asmx { prefix: "/ws/", lower: true },
            (Authorizer::Sp, Nfce) => PathStyle::Asmx { prefix: "/ws/", lower: false },
            (Authorizer::Rs | Authorizer::Svrs, _) => PathStyle::Rs,
            (Authorizer::Ba, _) => PathStyle::Nested,
            (Authorizer::Am, Nfe) => PathStyle::Plain("/services2/services/"),
            (Authorizer::Am, Nfce) => PathStyle::Plain("/nfce-services/services/"),
            (Authorizer::Go, _) => PathStyle::Plain("/nfe/services/"),
            (Authorizer::Mg, Nfe) => PathStyle::Plain("/nfe2/services/"),
            (Authorizer::Mg, Nfce) => PathStyle::Plain("/nfce/services/"),
            (Authorizer::Ms, _) => PathStyle::Plain("/ws/"),
            (Authorizer::Mt, Nfe) => PathStyle::Plain("/nfews/v2/services/"),
            (Authorizer::Mt, Nfce) => PathStyle::Plain("/nfcews/services/"),
            (Authorizer::Pe, _) => PathStyle::Plain("/nfe-service/services/"),
            (Authorizer::Pr, Nfe) => PathStyle::Plain("/nfe/"),
            (Authorizer::Pr, Nfce) => PathStyle::Plain("/nfce/"),
        }
    }

    fn path(self, model: FiscalModel, service: SefazService) -> String {
        let name = service.wsdl_name();
        match self.style(model) {
            PathStyle::Asmx { prefix, lower } => {
                let file = if lower { name.to_lowercase() } else { name.to_string() };
                format!("{}{}.asmx", prefix, file)
            }
            PathStyle::Plain(prefix) => format!("{}{}", prefix, name),
            PathStyle::Nested => format!("/webservices/{}/{}.asmx", name, name),
            PathStyle::Rs => match service {
                SefazService::Authorization => "/ws/NfeAutorizacao/NFeAutorizacao4.asmx",
                SefazService::ReturnAuthorization => "/ws/NfeRetAutorizacao/NFeRetAutorizacao4.asmx",
                SefazService::ProtocolQuery => "/ws/NfeConsulta/NfeConsulta4.asmx",
                SefazService::StatusService => "/ws/NfeStatusServico/NfeStatusServico4.asmx",
                SefazService::EventReception => "/ws/recepcaoevento/recepcaoevento4.asmx",
                SefazService::Inutilization => "/ws/nfeinutilizacao/nfeinutilizacao4.asmx",
            }
            .to_string(),
        }
    }
}

/// Resolves service URLs, optionally against a fixed base URL.
#[derive(Debug, Clone, Default)]
pub struct EndpointCatalog {
    base_url_override: Option<String>,
}

impl EndpointCatalog {
    pub fn new(base_url_override: Option<String>) -> Self {
        Self { base_url_override }
    }

    pub fn url(&self, uf: Uf, model: FiscalModel, environment: Environment, service: SefazService) -> String {
        let authorizer = Authorizer::for_uf(uf, model);
        let path = authorizer.path(model, service);
        let origin = match &self.base_url_override {
            Some(base) => base.trim_end_matches('/'),
            None => {
                let (production, homologation) = authorizer.hosts(model);
                match environment {
                    Environment::Production => production,
                    Environment::Homologation => homologation,
                }
            }
        };
        format!("{}{}", origin, path)
    }
}
