//! NFC-e QR code, version 2.

use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use sha1::{Digest, Sha1};

use domain::{AccessKey, DomainError, DomainResult, Environment, Uf};

use crate::xml::format::money;

const QR_VERSION: &str = "2";

/// `qrCode` and `urlChave` of `infNFeSupl`.
#[derive(Debug, Clone, PartialEq)]
pub struct NfceQrCode {
    pub url: String,
    pub consult_url: String,
}

/// Data that only offline (tpEmis 9) codes carry.
#[derive(Debug, Clone, Copy)]
pub struct OfflineData<'a> {
    pub issued_at: &'a DateTime<FixedOffset>,
    pub total: Decimal,
    /// DigestValue of the document signature, base64
    pub digest_value: &'a str,
}

/// QR code and key lookup URLs of the state's consultation portal.
pub fn portal_urls(uf: Uf, environment: Environment) -> DomainResult<(&'static str, &'static str)> {
    use Environment::*;
    let urls = match (uf, environment) {
        (Uf::SP, Production) => (
            "https://www.nfce.fazenda.sp.gov.br/NFCeConsultaPublica/Paginas/ConsultaQRCode.aspx",
            "https://www.nfce.fazenda.sp.gov.br/consulta",
        ),
        (Uf::SP, Homologation) => (
            "https://www.homologacao.nfce.fazenda.sp.gov.br/NFCeConsultaPublica/Paginas/ConsultaQRCode.aspx",
            "https://www.homologacao.nfce.fazenda.sp.gov.br/consulta",
        ),
        (Uf::RS, _) => (
            "https://www.sefaz.rs.gov.br/NFCE/NFCE-COM.aspx",
            "www.sefaz.rs.gov.br/nfce/consulta",
        ),
        (Uf::MG, Production) => (
            "https://portalsped.fazenda.mg.gov.br/portalnfce/sistema/qrcode.xhtml",
            "https://portalsped.fazenda.mg.gov.br/portalnfce",
        ),
        (Uf::MG, Homologation) => (
            "https://hportalsped.fazenda.mg.gov.br/portalnfce/sistema/qrcode.xhtml",
            "https://hportalsped.fazenda.mg.gov.br/portalnfce",
        ),
        (Uf::PR, Production) => (
            "http://www.fazenda.pr.gov.br/nfce/qrcode",
            "http://www.fazenda.pr.gov.br/nfce/consulta",
        ),
        (Uf::PR, Homologation) => (
            "http://www.homologacao.fazenda.pr.gov.br/nfce/qrcode",
            "http://www.fazenda.pr.gov.br/nfce/consulta",
        ),
        (other, _) => {
            return Err(DomainError::validation(format!(
                "NFC-e consultation portal for {} is not configured",
                other.acronym()
            )))
        }
    };
    Ok(urls)
}

fn hash(payload: &str, csc_token: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(payload.as_bytes());
    hasher.update(csc_token.as_bytes());
    hex::encode_upper(hasher.finalize())
}

/// Build the QR code of an NFC-e.
pub fn build(
    key: &AccessKey,
    uf: Uf,
    environment: Environment,
    csc_id: &str,
    csc_token: &str,
    offline: Option<OfflineData<'_>>,
) -> DomainResult<NfceQrCode> {
    let (qr_url, consult_url) = portal_urls(uf, environment)?;
    let csc_id: u32 = csc_id
        .parse()
        .map_err(|_| DomainError::validation("csc_id must be numeric"))?;

    let payload = match offline {
        None => format!(
            "{}|{}|{}|{}",
            key.as_str(),
            QR_VERSION,
            environment.code(),
            csc_id
        ),
        Some(data) => format!(
            "{}|{}|{}|{}|{}|{}|{}",
            key.as_str(),
            QR_VERSION,
            environment.code(),
            data.issued_at.format("%d"),
            money(data.total),
            hex::encode(data.digest_value.as_bytes()),
            csc_id
        ),
    };
    let signature = hash(&payload, csc_token);

    Ok(NfceQrCode {
        url: format!("{}?p={}|{}", qr_url, payload, signature),
        consult_url: consult_url.to_string(),
    })
}
