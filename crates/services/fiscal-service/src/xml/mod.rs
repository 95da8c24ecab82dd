//! XML layer: canonical rendering of NF-e documents and SEFAZ messages,
//! SOAP envelopes and reply parsing.

pub mod format;
pub mod messages;
pub mod nfe;
pub mod response;
pub mod soap;
mod writer;

use thiserror::Error;

use common::AppError;
use domain::NFE_NAMESPACE;

pub use writer::XmlWriter;

/// XML rendering and parsing errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum XmlError {
    #[error("XML write failed: {0}")]
    Write(String),

    #[error("XML parse failed: {0}")]
    Parse(String),

    #[error("Missing element <{0}>")]
    Missing(String),

    #[error("Invalid value in <{0}>: {1}")]
    Invalid(String, String),
}

pub type XmlResult<T> = Result<T, XmlError>;

impl From<XmlError> for AppError {
    fn from(err: XmlError) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Element referenced by a signature through its `Id` attribute
/// (`infNFe`, `infEvento`, `infInut`).
#[derive(Debug, Clone, PartialEq)]
pub struct SignableElement {
    name: &'static str,
    id: String,
    version: &'static str,
    body: String,
}

impl SignableElement {
    pub fn new(name: &'static str, id: String, version: &'static str, body: String) -> Self {
        Self {
            name,
            id,
            version,
            body,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Canonical form of the subtree. C14N renders the default namespace
    /// inherited from the parent on the apex element.
    pub fn canonical(&self) -> XmlResult<String> {
        self.render(true)
    }

    /// Form placed inside the parent that declares the namespace.
    pub fn embedded(&self) -> XmlResult<String> {
        self.render(false)
    }

    fn render(&self, with_namespace: bool) -> XmlResult<String> {
        let mut attrs = Vec::with_capacity(3);
        if with_namespace {
            attrs.push(("xmlns", NFE_NAMESPACE));
        }
        attrs.push(("Id", self.id.as_str()));
        attrs.push(("versao", self.version));

        let mut w = XmlWriter::new();
        w.open(self.name, &attrs)?;
        w.raw(&self.body);
        w.close(self.name)?;
        w.finish()
    }
}
