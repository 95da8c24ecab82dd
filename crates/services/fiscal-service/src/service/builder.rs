//! Build and sign one NF-e / NFC-e.

use chrono::{DateTime, FixedOffset};

use common::AppResult;
use domain::{
    AccessKey, AccessKeyParts, DocumentDraft, EmissionType, FiscalModel, FiscalProfile, Totals,
};

use crate::qrcode::{self, OfflineData};
use crate::signing::XmlSigner;
use crate::xml::nfe::{assemble_nfe, render_inf_nfe, render_supplement, ContingencyInfo, NfeInput};

/// What to build.
#[derive(Debug, Clone)]
pub struct BuildRequest<'a> {
    pub profile: &'a FiscalProfile,
    pub draft: &'a DocumentDraft,
    pub totals: &'a Totals,
    pub series: u16,
    pub number: u32,
    pub numeric_code: u32,
    pub emission_type: EmissionType,
    pub issued_at: DateTime<FixedOffset>,
    pub contingency: Option<&'a ContingencyInfo>,
}

/// A signed `<NFe>` ready for transmission.
#[derive(Debug, Clone)]
pub struct BuiltDocument {
    pub access_key: AccessKey,
    pub signed_xml: String,
    pub qr_code: Option<String>,
}

pub fn build(request: &BuildRequest<'_>, signer: &dyn XmlSigner) -> AppResult<BuiltDocument> {
    let profile = request.profile;
    let model = request.draft.model;
    if model == FiscalModel::Nfce {
        profile.csc()?;
    }

    let access_key = AccessKey::generate(&AccessKeyParts {
        uf: profile.uf(),
        issued_at: request.issued_at,
        cnpj: &profile.issuer.cnpj,
        model,
        series: request.series,
        number: request.number,
        emission_type: request.emission_type,
        numeric_code: request.numeric_code,
    })?;

    let inf_nfe = render_inf_nfe(&NfeInput {
        profile,
        draft: request.draft,
        totals: request.totals,
        key: &access_key,
        emission_type: request.emission_type,
        issued_at: request.issued_at,
        contingency: request.contingency,
    })?;
    let signature = signer.sign(inf_nfe.id(), &inf_nfe.canonical()?)?;

    let qr = match model {
        FiscalModel::Nfe => None,
        FiscalModel::Nfce => {
            let (csc_id, csc_token) = profile.csc()?;
            let offline = (request.emission_type == EmissionType::OfflineNfce).then(|| OfflineData {
                issued_at: &request.issued_at,
                total: request.totals.v_nf,
                digest_value: &signature.digest_value,
            });
            Some(qrcode::build(
                &access_key,
                profile.uf(),
                profile.environment,
                csc_id,
                csc_token,
                offline,
            )?)
        }
    };
    let supplement = qr
        .as_ref()
        .map(|qr| render_supplement(&qr.url, &qr.consult_url))
        .transpose()?;

    let signed_xml = assemble_nfe(&inf_nfe, supplement.as_deref(), &signature.to_xml()?)?;

    Ok(BuiltDocument {
        access_key,
        signed_xml,
        qr_code: qr.map(|qr| qr.url),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::credential::fixtures::credential;
    use crate::signing::RsaSha1Signer;
    use crate::xml::nfe::fixtures::{issued_at, nfce_draft, nfe_draft, profile};
    use common::AppError;
    use domain::Environment;

    fn built(draft: &DocumentDraft, emission_type: EmissionType, contingency: Option<&ContingencyInfo>) -> AppResult<BuiltDocument> {
        let profile = profile(Environment::Homologation);
        let totals = draft.validate().unwrap();
        build(
            &BuildRequest {
                profile: &profile,
                draft,
                totals: &totals,
                series: profile.series_for(draft.model),
                number: 42,
                numeric_code: 12345678,
                emission_type,
                issued_at: issued_at(),
                contingency,
            },
            &RsaSha1Signer::new(credential()),
        )
    }

    #[test]
    fn test_nfce_carries_qr_code_and_signature() {
        let doc = built(&nfce_draft(), EmissionType::Normal, None).unwrap();

        assert_eq!(doc.access_key.number(), 42);
        assert_eq!(doc.access_key.series(), 2);
        let qr = doc.qr_code.as_deref().unwrap();
        assert!(qr.contains(&format!("?p={}|2|2|1|", doc.access_key.as_str())));

        let xml = &doc.signed_xml;
        assert!(xml.starts_with(r#"<NFe xmlns="http://www.portalfiscal.inf.br/nfe"><infNFe Id="NFe"#));
        let supl = xml.find("<infNFeSupl>").unwrap();
        let sig = xml.find("<Signature ").unwrap();
        assert!(supl < sig);
        assert!(xml.contains(&format!(r##"<Reference URI="#NFe{}">"##, doc.access_key.as_str())));
        assert!(xml.ends_with("</Signature></NFe>"));
    }

    #[test]
    fn test_series_comes_from_the_request() {
        let profile = profile(Environment::Homologation);
        let draft = nfe_draft();
        let totals = draft.validate().unwrap();
        let doc = build(
            &BuildRequest {
                profile: &profile,
                draft: &draft,
                totals: &totals,
                series: 7,
                number: 42,
                numeric_code: 12345678,
                emission_type: EmissionType::Normal,
                issued_at: issued_at(),
                contingency: None,
            },
            &RsaSha1Signer::new(credential()),
        )
        .unwrap();

        assert_ne!(profile.series_for(FiscalModel::Nfe), 7);
        assert_eq!(doc.access_key.series(), 7);
        assert!(doc.signed_xml.contains("<serie>7</serie>"));
    }

    #[test]
    fn test_nfe_has_no_supplement() {
        let doc = built(&nfe_draft(), EmissionType::Normal, None).unwrap();
        assert!(doc.qr_code.is_none());
        assert!(!doc.signed_xml.contains("infNFeSupl"));
        assert_eq!(doc.access_key.as_str()[20..22].to_string(), "55");
    }

    #[test]
    fn test_offline_contingency_changes_key_and_qr() {
        let info = ContingencyInfo {
            entered_at: issued_at(),
            reason: "Falha na comunicacao com a SEFAZ".to_string(),
        };
        let online = built(&nfce_draft(), EmissionType::Normal, None).unwrap();
        let offline = built(&nfce_draft(), EmissionType::OfflineNfce, Some(&info)).unwrap();

        assert_ne!(online.access_key, offline.access_key);
        assert_eq!(offline.access_key.emission_type().unwrap(), EmissionType::OfflineNfce);
        assert!(offline.signed_xml.contains("<tpEmis>9</tpEmis>"));
        // offline codes carry day, total and digest
        let payload = offline.qr_code.unwrap();
        assert_eq!(payload.split('|').count(), 8);
    }

    #[test]
    fn test_nfce_without_csc() {
        let mut profile = profile(Environment::Homologation);
        profile.csc_token = None;
        let draft = nfce_draft();
        let totals = draft.validate().unwrap();

        let err = build(
            &BuildRequest {
                profile: &profile,
                draft: &draft,
                totals: &totals,
                series: profile.series_for(FiscalModel::Nfce),
                number: 1,
                numeric_code: 12345678,
                emission_type: EmissionType::Normal,
                issued_at: issued_at(),
                contingency: None,
            },
            &RsaSha1Signer::new(credential()),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
