//! SEFAZ web services: endpoint catalog, SOAP transport and typed calls.

mod client;
pub mod endpoints;
mod error;
mod transport;

pub use client::{SefazClient, SefazContext};
pub use endpoints::{Authorizer, EndpointCatalog, SefazService};
pub use error::SefazError;
pub use transport::{HttpTransport, SefazTransport, SoapRequest};

#[cfg(any(test, feature = "test-utils"))]
pub use transport::MockSefazTransport;
