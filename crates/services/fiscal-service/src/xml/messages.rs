//! Bodies of the SEFAZ web service requests and the `*Proc` distribution
//! wrappers.

use chrono::{DateTime, FixedOffset};

use domain::{
    AccessKey, Cnpj, Environment, EventDetail, FiscalEvent, Inutilization, Uf,
    CORRECTION_USAGE_CONDITIONS, EVENT_LAYOUT_VERSION, NFE_LAYOUT_VERSION, NFE_NAMESPACE,
};

use super::format::datetime;
use super::{SignableElement, XmlResult, XmlWriter};

/// Root element in the NF-e namespace around already canonical parts.
fn rooted(name: &str, version: &str, build: impl FnOnce(&mut XmlWriter) -> XmlResult<()>) -> XmlResult<String> {
    let mut w = XmlWriter::new();
    w.group(name, &[("xmlns", NFE_NAMESPACE), ("versao", version)], build)?;
    w.finish()
}

/// `enviNFe` with a single signed NF-e, synchronous processing requested.
pub fn envi_nfe(lot_id: u64, signed_nfe: &str) -> XmlResult<String> {
    rooted("enviNFe", NFE_LAYOUT_VERSION, |w| {
        w.leaf("idLote", lot_id.to_string())?;
        w.leaf("indSinc", "1")?;
        w.raw(signed_nfe);
        Ok(())
    })
}

pub fn cons_reci_nfe(environment: Environment, receipt: &str) -> XmlResult<String> {
    rooted("consReciNFe", NFE_LAYOUT_VERSION, |w| {
        w.leaf("tpAmb", environment.code().to_string())?;
        w.leaf("nRec", receipt)
    })
}

pub fn cons_sit_nfe(environment: Environment, key: &AccessKey) -> XmlResult<String> {
    rooted("consSitNFe", NFE_LAYOUT_VERSION, |w| {
        w.leaf("tpAmb", environment.code().to_string())?;
        w.leaf("xServ", "CONSULTAR")?;
        w.leaf("chNFe", key.as_str())
    })
}

pub fn cons_stat_serv(environment: Environment, uf: Uf) -> XmlResult<String> {
    rooted("consStatServ", NFE_LAYOUT_VERSION, |w| {
        w.leaf("tpAmb", environment.code().to_string())?;
        w.leaf("cUF", format!("{:02}", uf.code()))?;
        w.leaf("xServ", "STATUS")
    })
}

/// `infEvento`, the signed part of an event.
pub fn inf_evento(
    event: &FiscalEvent,
    environment: Environment,
    cnpj: &Cnpj,
    at: &DateTime<FixedOffset>,
) -> XmlResult<SignableElement> {
    let kind = event.detail.kind();
    let mut w = XmlWriter::new();
    w.leaf("cOrgao", format!("{:02}", event.access_key.uf_code()))?;
    w.leaf("tpAmb", environment.code().to_string())?;
    w.leaf("CNPJ", cnpj.as_str())?;
    w.leaf("chNFe", event.access_key.as_str())?;
    w.leaf("dhEvento", datetime(at))?;
    w.leaf("tpEvento", kind.code())?;
    w.leaf("nSeqEvento", event.sequence.to_string())?;
    w.leaf("verEvento", EVENT_LAYOUT_VERSION)?;
    w.group("detEvento", &[("versao", EVENT_LAYOUT_VERSION)], |w| {
        w.leaf("descEvento", kind.description())?;
        match &event.detail {
            EventDetail::Cancellation {
                protocol,
                justification,
            } => {
                w.leaf("nProt", protocol)?;
                w.leaf("xJust", justification)
            }
            EventDetail::CorrectionLetter { text } => {
                w.leaf("xCorrecao", text)?;
                w.leaf("xCondUso", CORRECTION_USAGE_CONDITIONS)
            }
        }
    })?;

    Ok(SignableElement::new(
        "infEvento",
        event.id(),
        EVENT_LAYOUT_VERSION,
        w.finish()?,
    ))
}

/// Signed `evento`.
pub fn evento(inf: &SignableElement, signature: &str) -> XmlResult<String> {
    let body = inf.embedded()?;
    rooted("evento", EVENT_LAYOUT_VERSION, |w| {
        w.raw(&body);
        w.raw(signature);
        Ok(())
    })
}

pub fn env_evento(lot_id: u64, signed_event: &str) -> XmlResult<String> {
    rooted("envEvento", EVENT_LAYOUT_VERSION, |w| {
        w.leaf("idLote", lot_id.to_string())?;
        w.raw(signed_event);
        Ok(())
    })
}

/// `infInut`, the signed part of an inutilization request.
pub fn inf_inut(
    request: &Inutilization,
    environment: Environment,
    uf: Uf,
    cnpj: &Cnpj,
    year: i32,
) -> XmlResult<SignableElement> {
    let mut w = XmlWriter::new();
    w.leaf("tpAmb", environment.code().to_string())?;
    w.leaf("xServ", "INUTILIZAR")?;
    w.leaf("cUF", format!("{:02}", uf.code()))?;
    w.leaf("ano", format!("{:02}", year % 100))?;
    w.leaf("CNPJ", cnpj.as_str())?;
    w.leaf("mod", request.model.code().to_string())?;
    w.leaf("serie", request.series.to_string())?;
    w.leaf("nNFIni", request.start.to_string())?;
    w.leaf("nNFFin", request.end.to_string())?;
    w.leaf("xJust", &request.justification)?;

    Ok(SignableElement::new(
        "infInut",
        request.id(uf, year, cnpj),
        NFE_LAYOUT_VERSION,
        w.finish()?,
    ))
}

pub fn inut_nfe(inf: &SignableElement, signature: &str) -> XmlResult<String> {
    let body = inf.embedded()?;
    rooted("inutNFe", NFE_LAYOUT_VERSION, |w| {
        w.raw(&body);
        w.raw(signature);
        Ok(())
    })
}

/// Authorized document for distribution: signed `NFe` plus `protNFe`.
pub fn nfe_proc(signed_nfe: &str, prot_nfe: &str) -> XmlResult<String> {
    rooted("nfeProc", NFE_LAYOUT_VERSION, |w| {
        w.raw(signed_nfe);
        w.raw(prot_nfe);
        Ok(())
    })
}

/// Registered event for distribution: signed `evento` plus `retEvento`.
pub fn proc_evento_nfe(signed_event: &str, ret_evento: &str) -> XmlResult<String> {
    rooted("procEventoNFe", EVENT_LAYOUT_VERSION, |w| {
        w.raw(signed_event);
        w.raw(ret_evento);
        Ok(())
    })
}

/// Homologated inutilization: signed `inutNFe` plus `retInutNFe`.
pub fn proc_inut_nfe(signed_inut: &str, ret_inut: &str) -> XmlResult<String> {
    rooted("procInutNFe", NFE_LAYOUT_VERSION, |w| {
        w.raw(signed_inut);
        w.raw(ret_inut);
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::nfe::fixtures::{issued_at, key_for, profile};
    use domain::event::{cancellation, correction_letter};
    use domain::{DocumentStatus, EmissionType, EventTarget, FiscalModel};
    use chrono::Utc;

    fn target(key: &AccessKey) -> EventTarget<'_> {
        EventTarget {
            status: DocumentStatus::Authorized,
            model: FiscalModel::Nfe,
            access_key: key,
            protocol: Some("135240000000001"),
            authorized_at: Some(issued_at().with_timezone(&Utc)),
        }
    }

    #[test]
    fn test_envi_nfe() {
        let xml = envi_nfe(123, "<NFe></NFe>").unwrap();
        assert_eq!(
            xml,
            format!(
                r#"<enviNFe xmlns="{}" versao="4.00"><idLote>123</idLote><indSinc>1</indSinc><NFe></NFe></enviNFe>"#,
                NFE_NAMESPACE
            )
        );
    }

    #[test]
    fn test_query_messages() {
        let p = profile(Environment::Homologation);
        let key = key_for(&p, FiscalModel::Nfe, EmissionType::Normal);

        let sit = cons_sit_nfe(Environment::Homologation, &key).unwrap();
        assert!(sit.ends_with(&format!(
            "<tpAmb>2</tpAmb><xServ>CONSULTAR</xServ><chNFe>{}</chNFe></consSitNFe>",
            key.as_str()
        )));

        let stat = cons_stat_serv(Environment::Production, Uf::SP).unwrap();
        assert!(stat.ends_with("<tpAmb>1</tpAmb><cUF>35</cUF><xServ>STATUS</xServ></consStatServ>"));

        let reci = cons_reci_nfe(Environment::Homologation, "351000012345678").unwrap();
        assert!(reci.contains("<nRec>351000012345678</nRec>"));
    }

    #[test]
    fn test_cancellation_event() {
        let p = profile(Environment::Homologation);
        let key = key_for(&p, FiscalModel::Nfe, EmissionType::Normal);
        let event = cancellation(
            &target(&key),
            "Pedido cancelado pelo cliente",
            24,
            issued_at().with_timezone(&Utc),
        )
        .unwrap();

        let inf = inf_evento(&event, Environment::Homologation, &p.issuer.cnpj, &issued_at()).unwrap();
        assert_eq!(inf.id(), format!("ID110111{}01", key.as_str()));

        let xml = inf.embedded().unwrap();
        assert!(xml.starts_with(&format!(
            r#"<infEvento Id="ID110111{}01" versao="1.00"><cOrgao>35</cOrgao><tpAmb>2</tpAmb><CNPJ>11222333000181</CNPJ>"#,
            key.as_str()
        )));
        assert!(xml.contains("<dhEvento>2024-11-05T10:30:00-03:00</dhEvento><tpEvento>110111</tpEvento><nSeqEvento>1</nSeqEvento><verEvento>1.00</verEvento>"));
        assert!(xml.contains(r#"<detEvento versao="1.00"><descEvento>Cancelamento</descEvento><nProt>135240000000001</nProt><xJust>Pedido cancelado pelo cliente</xJust></detEvento>"#));
    }

    #[test]
    fn test_correction_letter_event() {
        let p = profile(Environment::Homologation);
        let key = key_for(&p, FiscalModel::Nfe, EmissionType::Normal);
        let event = correction_letter(&target(&key), "Corrigir complemento do endereco", 1).unwrap();

        let xml = inf_evento(&event, Environment::Homologation, &p.issuer.cnpj, &issued_at())
            .unwrap()
            .embedded()
            .unwrap();
        assert!(xml.contains("<tpEvento>110110</tpEvento><nSeqEvento>2</nSeqEvento>"));
        assert!(xml.contains("<descEvento>Carta de Correcao</descEvento><xCorrecao>Corrigir complemento do endereco</xCorrecao><xCondUso>A Carta de Correcao e disciplinada"));
    }

    #[test]
    fn test_event_envelope() {
        let inf = SignableElement::new("infEvento", "ID1".into(), "1.00", "<tpAmb>2</tpAmb>".into());
        let signed = evento(&inf, "<Signature></Signature>").unwrap();
        assert_eq!(
            signed,
            format!(
                r#"<evento xmlns="{}" versao="1.00"><infEvento Id="ID1" versao="1.00"><tpAmb>2</tpAmb></infEvento><Signature></Signature></evento>"#,
                NFE_NAMESPACE
            )
        );
        let batch = env_evento(7, &signed).unwrap();
        assert!(batch.contains(r#"versao="1.00"><idLote>7</idLote><evento "#));
    }

    #[test]
    fn test_inutilization() {
        let p = profile(Environment::Homologation);
        let request = Inutilization {
            model: FiscalModel::Nfce,
            series: 2,
            start: 10,
            end: 12,
            justification: "Falha no sistema de numeracao".to_string(),
        };
        let inf = inf_inut(&request, Environment::Homologation, Uf::SP, &p.issuer.cnpj, 2024).unwrap();
        assert_eq!(inf.id(), "ID35241122233300018165002000000010000000012");
        assert_eq!(
            inf.embedded().unwrap(),
            r#"<infInut Id="ID35241122233300018165002000000010000000012" versao="4.00"><tpAmb>2</tpAmb><xServ>INUTILIZAR</xServ><cUF>35</cUF><ano>24</ano><CNPJ>11222333000181</CNPJ><mod>65</mod><serie>2</serie><nNFIni>10</nNFIni><nNFFin>12</nNFFin><xJust>Falha no sistema de numeracao</xJust></infInut>"#
        );
        let signed = inut_nfe(&inf, "<Signature></Signature>").unwrap();
        assert!(signed.starts_with(r#"<inutNFe xmlns="http://www.portalfiscal.inf.br/nfe" versao="4.00"><infInut Id="#));
    }

    #[test]
    fn test_proc_wrappers() {
        let proc = nfe_proc("<NFe></NFe>", "<protNFe></protNFe>").unwrap();
        assert_eq!(
            proc,
            r#"<nfeProc xmlns="http://www.portalfiscal.inf.br/nfe" versao="4.00"><NFe></NFe><protNFe></protNFe></nfeProc>"#
        );
        let ev = proc_evento_nfe("<evento></evento>", "<retEvento></retEvento>").unwrap();
        assert!(ev.starts_with(r#"<procEventoNFe xmlns="http://www.portalfiscal.inf.br/nfe" versao="1.00">"#));
        let inut = proc_inut_nfe("<inutNFe></inutNFe>", "<retInutNFe></retInutNFe>").unwrap();
        assert!(inut.ends_with("<inutNFe></inutNFe><retInutNFe></retInutNFe></procInutNFe>"));
    }
}
