//! SOAP 1.2 envelope used by every NF-e 4.00 web service.

use super::{XmlResult, XmlWriter};

pub const SOAP12_NAMESPACE: &str = "http://www.w3.org/2003/05/soap-envelope";
const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";
const XSD_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";
const DECLARATION: &str = r#"<?xml version="1.0" encoding="utf-8"?>"#;

/// Wrap `body` in `soap12:Body/nfeDadosMsg` of the service `wsdl_namespace`.
pub fn envelope(wsdl_namespace: &str, body: &str) -> XmlResult<String> {
    let mut w = XmlWriter::new();
    w.raw(DECLARATION);
    w.group(
        "soap12:Envelope",
        &[
            ("xmlns:xsi", XSI_NAMESPACE),
            ("xmlns:xsd", XSD_NAMESPACE),
            ("xmlns:soap12", SOAP12_NAMESPACE),
        ],
        |w| {
            w.group("soap12:Body", &[], |w| {
                w.group("nfeDadosMsg", &[("xmlns", wsdl_namespace)], |w| {
                    w.raw(body);
                    Ok(())
                })
            })
        },
    )?;
    w.finish()
}
