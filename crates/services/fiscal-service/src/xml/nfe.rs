//! `infNFe` rendering for layout 4.00 (models 55 and 65).

use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;

use domain::totals::{change_due, ItemAmounts};
use domain::{
    AccessKey, Address, DocumentDraft, EmissionType, Environment, FiscalModel, FiscalProfile,
    IcmsTax, IeIndicator, Item, Payment, Recipient, TaxId, Totals, HOMOLOGATION_NOTICE,
    NFE_LAYOUT_VERSION, NFE_NAMESPACE, PROCESS_VERSION,
};

use super::format::{datetime, four, money, unit_value};
use super::{SignableElement, XmlError, XmlResult, XmlWriter};

const COUNTRY_CODE: &str = "1058";
const COUNTRY_NAME: &str = "BRASIL";
const NO_GTIN: &str = "SEM GTIN";

/// Contingency entry data (`dhCont`, `xJust`).
#[derive(Debug, Clone)]
pub struct ContingencyInfo {
    pub entered_at: DateTime<FixedOffset>,
    pub reason: String,
}

/// Everything needed to render one document.
#[derive(Debug, Clone)]
pub struct NfeInput<'a> {
    pub profile: &'a FiscalProfile,
    pub draft: &'a DocumentDraft,
    pub totals: &'a Totals,
    pub key: &'a AccessKey,
    pub emission_type: EmissionType,
    pub issued_at: DateTime<FixedOffset>,
    pub contingency: Option<&'a ContingencyInfo>,
}

impl NfeInput<'_> {
    fn homologation(&self) -> bool {
        self.profile.environment == Environment::Homologation
    }
}

/// Render `infNFe`.
pub fn render_inf_nfe(input: &NfeInput<'_>) -> XmlResult<SignableElement> {
    if input.emission_type != EmissionType::Normal && input.contingency.is_none() {
        return Err(XmlError::Invalid(
            "ide".into(),
            "contingency emission requires dhCont and xJust".into(),
        ));
    }

    let mut w = XmlWriter::new();
    ide(&mut w, input)?;
    emit(&mut w, input)?;
    if let Some(recipient) = &input.draft.recipient {
        dest(&mut w, input, recipient)?;
    }
    for (index, item) in input.draft.items.iter().enumerate() {
        det(&mut w, input, index, item)?;
    }
    total(&mut w, input.totals)?;
    w.group("transp", &[], |w| {
        w.leaf("modFrete", input.draft.freight_mode.code().to_string())
    })?;
    pag(&mut w, input)?;
    if let Some(info) = &input.draft.additional_info {
        w.group("infAdic", &[], |w| w.leaf("infCpl", info))?;
    }

    Ok(SignableElement::new(
        "infNFe",
        format!("NFe{}", input.key.as_str()),
        NFE_LAYOUT_VERSION,
        w.finish()?,
    ))
}

fn ide(w: &mut XmlWriter, input: &NfeInput<'_>) -> XmlResult<()> {
    let draft = input.draft;
    let key = input.key;
    let is_nfce = draft.model == FiscalModel::Nfce;
    let final_consumer = is_nfce
        || draft
            .recipient
            .as_ref()
            .map_or(true, |r| r.ie_indicator == IeIndicator::NonContributor);

    w.group("ide", &[], |w| {
        w.leaf("cUF", format!("{:02}", key.uf_code()))?;
        w.leaf("cNF", format!("{:08}", key.numeric_code()))?;
        w.leaf("natOp", &draft.nature)?;
        w.leaf("mod", draft.model.code().to_string())?;
        w.leaf("serie", key.series().to_string())?;
        w.leaf("nNF", key.number().to_string())?;
        w.leaf("dhEmi", datetime(&input.issued_at))?;
        w.leaf("tpNF", draft.operation.code().to_string())?;
        w.leaf("idDest", draft.destination.code().to_string())?;
        w.leaf("cMunFG", &input.profile.issuer.address.city_code)?;
        // 1 = DANFE portrait, 4 = DANFE NFC-e
        w.leaf("tpImp", if is_nfce { "4" } else { "1" })?;
        w.leaf("tpEmis", input.emission_type.code().to_string())?;
        w.leaf("cDV", key.check_digit().to_string())?;
        w.leaf("tpAmb", input.profile.environment.code().to_string())?;
        w.leaf("finNFe", draft.purpose.code().to_string())?;
        w.leaf("indFinal", if final_consumer { "1" } else { "0" })?;
        w.leaf("indPres", draft.presence.code().to_string())?;
        if matches!(draft.presence.code(), 2 | 3 | 4 | 9) {
            // Sale on the issuer's own channel, no intermediary
            w.leaf("indIntermed", "0")?;
        }
        w.leaf("procEmi", "0")?;
        w.leaf("verProc", PROCESS_VERSION)?;
        if let Some(cont) = input.contingency {
            w.leaf("dhCont", datetime(&cont.entered_at))?;
            w.leaf("xJust", &cont.reason)?;
        }
        Ok(())
    })
}

fn address(w: &mut XmlWriter, tag: &str, addr: &Address) -> XmlResult<()> {
    w.group(tag, &[], |w| {
        w.leaf("xLgr", &addr.street)?;
        w.leaf("nro", &addr.number)?;
        w.opt_leaf("xCpl", addr.complement.as_deref())?;
        w.leaf("xBairro", &addr.district)?;
        w.leaf("cMun", &addr.city_code)?;
        w.leaf("xMun", &addr.city_name)?;
        w.leaf("UF", addr.uf.acronym())?;
        w.leaf("CEP", &addr.zip)?;
        w.leaf("cPais", COUNTRY_CODE)?;
        w.leaf("xPais", COUNTRY_NAME)?;
        w.opt_leaf("fone", addr.phone.as_deref())
    })
}

fn emit(w: &mut XmlWriter, input: &NfeInput<'_>) -> XmlResult<()> {
    let issuer = &input.profile.issuer;
    w.group("emit", &[], |w| {
        w.leaf("CNPJ", issuer.cnpj.as_str())?;
        w.leaf("xNome", &issuer.legal_name)?;
        w.opt_leaf("xFant", issuer.trade_name.as_deref())?;
        address(w, "enderEmit", &issuer.address)?;
        w.leaf("IE", &issuer.ie)?;
        w.leaf("CRT", issuer.tax_regime.code().to_string())
    })
}

fn dest(w: &mut XmlWriter, input: &NfeInput<'_>, recipient: &Recipient) -> XmlResult<()> {
    let is_nfce = input.draft.model == FiscalModel::Nfce;
    w.group("dest", &[], |w| {
        match &recipient.tax_id {
            TaxId::Cnpj(cnpj) => w.leaf("CNPJ", cnpj.as_str())?,
            TaxId::Cpf(cpf) => w.leaf("CPF", cpf.as_str())?,
        }
        if input.homologation() {
            w.leaf("xNome", HOMOLOGATION_NOTICE)?;
        } else {
            w.leaf("xNome", &recipient.name)?;
        }
        if let Some(addr) = &recipient.address {
            address(w, "enderDest", addr)?;
        }
        let indicator = if is_nfce {
            IeIndicator::NonContributor
        } else {
            recipient.ie_indicator
        };
        w.leaf("indIEDest", indicator.code().to_string())?;
        if indicator == IeIndicator::Contributor {
            w.opt_leaf("IE", recipient.ie.as_deref())?;
        }
        w.opt_leaf("email", recipient.email.as_deref())
    })
}

fn det(w: &mut XmlWriter, input: &NfeInput<'_>, index: usize, item: &Item) -> XmlResult<()> {
    let amounts =
        ItemAmounts::compute(item).map_err(|e| XmlError::Invalid("det".into(), e.to_string()))?;
    let n_item = (index + 1).to_string();
    let gtin = item.gtin.as_deref().unwrap_or(NO_GTIN);
    let description = if index == 0 && input.homologation() {
        HOMOLOGATION_NOTICE
    } else {
        item.description.as_str()
    };

    w.group("det", &[("nItem", n_item.as_str())], |w| {
        w.group("prod", &[], |w| {
            w.leaf("cProd", &item.code)?;
            w.leaf("cEAN", gtin)?;
            w.leaf("xProd", description)?;
            w.leaf("NCM", &item.ncm)?;
            w.opt_leaf("CEST", item.cest.as_deref())?;
            w.leaf("CFOP", &item.cfop)?;
            w.leaf("uCom", &item.unit)?;
            w.leaf("qCom", four(item.quantity))?;
            w.leaf("vUnCom", unit_value(item.unit_price))?;
            w.leaf("vProd", money(amounts.gross))?;
            w.leaf("cEANTrib", gtin)?;
            w.leaf("uTrib", &item.unit)?;
            w.leaf("qTrib", four(item.quantity))?;
            w.leaf("vUnTrib", unit_value(item.unit_price))?;
            if item.freight > Decimal::ZERO {
                w.leaf("vFrete", money(item.freight))?;
            }
            if item.discount > Decimal::ZERO {
                w.leaf("vDesc", money(item.discount))?;
            }
            w.leaf("indTot", "1")
        })?;
        w.group("imposto", &[], |w| {
            if amounts.approx_tax > Decimal::ZERO {
                w.leaf("vTotTrib", money(amounts.approx_tax))?;
            }
            icms(w, item, &amounts)?;
            contribution(w, "PIS", item.tax.pis.cst, item.tax.pis.rate, amounts.pis_base, amounts.pis_value)?;
            contribution(
                w,
                "COFINS",
                item.tax.cofins.cst,
                item.tax.cofins.rate,
                amounts.cofins_base,
                amounts.cofins_value,
            )
        })
    })
}

fn icms(w: &mut XmlWriter, item: &Item, amounts: &ItemAmounts) -> XmlResult<()> {
    let origin = item.tax.origin.to_string();
    w.group("ICMS", &[], |w| match &item.tax.icms {
        IcmsTax::Simples { csosn } => {
            let group = match csosn {
                102 | 103 | 300 | 400 => "ICMSSN102",
                500 => "ICMSSN500",
                900 => "ICMSSN900",
                other => {
                    return Err(XmlError::Invalid("CSOSN".into(), other.to_string()));
                }
            };
            w.group(group, &[], |w| {
                w.leaf("orig", &origin)?;
                w.leaf("CSOSN", csosn.to_string())
            })
        }
        IcmsTax::Normal { cst: 0, rate } => w.group("ICMS00", &[], |w| {
            w.leaf("orig", &origin)?;
            w.leaf("CST", "00")?;
            // 3 = operation value
            w.leaf("modBC", "3")?;
            w.leaf("vBC", money(amounts.icms_base))?;
            w.leaf("pICMS", four(*rate))?;
            w.leaf("vICMS", money(amounts.icms_value))
        }),
        IcmsTax::Normal { cst, .. } => {
            let group = match cst {
                40 | 41 | 50 => "ICMS40",
                60 => "ICMS60",
                other => {
                    return Err(XmlError::Invalid("CST".into(), other.to_string()));
                }
            };
            w.group(group, &[], |w| {
                w.leaf("orig", &origin)?;
                w.leaf("CST", format!("{:02}", cst))
            })
        }
    })
}

fn contribution(
    w: &mut XmlWriter,
    tax: &str,
    cst: u8,
    rate: Decimal,
    base: Decimal,
    value: Decimal,
) -> XmlResult<()> {
    let cst_text = format!("{:02}", cst);
    let group = match cst {
        1 | 2 => format!("{}Aliq", tax),
        4..=9 => format!("{}NT", tax),
        _ => format!("{}Outr", tax),
    };
    w.group(tax, &[], |w| {
        w.group(&group, &[], |w| {
            w.leaf("CST", &cst_text)?;
            if matches!(cst, 4..=9) {
                return Ok(());
            }
            w.leaf("vBC", money(base))?;
            w.leaf(&format!("p{}", tax), four(rate))?;
            w.leaf(&format!("v{}", tax), money(value))
        })
    })
}

fn total(w: &mut XmlWriter, t: &Totals) -> XmlResult<()> {
    let zero = money(Decimal::ZERO);
    w.group("total", &[], |w| {
        w.group("ICMSTot", &[], |w| {
            w.leaf("vBC", money(t.v_bc))?;
            w.leaf("vICMS", money(t.v_icms))?;
            w.leaf("vICMSDeson", &zero)?;
            w.leaf("vFCP", &zero)?;
            w.leaf("vBCST", &zero)?;
            w.leaf("vST", &zero)?;
            w.leaf("vFCPST", &zero)?;
            w.leaf("vFCPSTRet", &zero)?;
            w.leaf("vProd", money(t.v_prod))?;
            w.leaf("vFrete", money(t.v_frete))?;
            w.leaf("vSeg", money(t.v_seg))?;
            w.leaf("vDesc", money(t.v_desc))?;
            w.leaf("vII", &zero)?;
            w.leaf("vIPI", &zero)?;
            w.leaf("vIPIDevol", &zero)?;
            w.leaf("vPIS", money(t.v_pis))?;
            w.leaf("vCOFINS", money(t.v_cofins))?;
            w.leaf("vOutro", money(t.v_outro))?;
            w.leaf("vNF", money(t.v_nf))?;
            if t.v_tot_trib > Decimal::ZERO {
                w.leaf("vTotTrib", money(t.v_tot_trib))?;
            }
            Ok(())
        })
    })
}

fn pag(w: &mut XmlWriter, input: &NfeInput<'_>) -> XmlResult<()> {
    let change = change_due(input.totals, &input.draft.payments)
        .map_err(|e| XmlError::Invalid("pag".into(), e.to_string()))?;
    w.group("pag", &[], |w| {
        for payment in &input.draft.payments {
            det_pag(w, payment)?;
        }
        if change > Decimal::ZERO {
            w.leaf("vTroco", money(change))?;
        }
        Ok(())
    })
}

fn det_pag(w: &mut XmlWriter, payment: &Payment) -> XmlResult<()> {
    w.group("detPag", &[], |w| {
        w.leaf("tPag", format!("{:02}", payment.method.code()))?;
        w.leaf("vPag", money(payment.amount))?;
        if let Some(card) = &payment.card {
            w.group("card", &[], |w| {
                w.leaf("tpIntegra", if card.integrated { "1" } else { "2" })?;
                w.opt_leaf("CNPJ", card.acquirer_cnpj.as_deref())?;
                w.opt_leaf("cAut", card.authorization_code.as_deref())
            })?;
        }
        Ok(())
    })
}

/// NFC-e supplementary data (`infNFeSupl`).
pub fn render_supplement(qr_code: &str, consult_url: &str) -> XmlResult<String> {
    let mut w = XmlWriter::new();
    w.group("infNFeSupl", &[], |w| {
        w.leaf_exact("qrCode", qr_code)?;
        w.leaf_exact("urlChave", consult_url)
    })?;
    w.finish()
}

/// `<NFe>` with the signed `infNFe`, the optional supplement and the signature.
pub fn assemble_nfe(
    inf_nfe: &SignableElement,
    supplement: Option<&str>,
    signature: &str,
) -> XmlResult<String> {
    let mut w = XmlWriter::new();
    w.open("NFe", &[("xmlns", NFE_NAMESPACE)])?;
    w.raw(&inf_nfe.embedded()?);
    if let Some(supl) = supplement {
        w.raw(supl);
    }
    w.raw(signature);
    w.close("NFe")?;
    w.finish()
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;
    use domain::{
        AccessKeyParts, CardInfo, Cnpj, Contribution, Destination, FreightMode, Issuer, ItemTax,
        OperationType, PaymentMethod, PresenceIndicator, ProfileInput, Purpose, TaxRegime, Uf,
    };
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    pub fn address() -> Address {
        Address {
            street: "Rua das Torrefacoes".to_string(),
            number: "100".to_string(),
            complement: None,
            district: "Centro".to_string(),
            city_code: "3550308".to_string(),
            city_name: "Sao Paulo".to_string(),
            uf: Uf::SP,
            zip: "01001000".to_string(),
            phone: None,
        }
    }

    pub fn profile_input(environment: Environment) -> ProfileInput {
        ProfileInput {
            issuer: Issuer {
                cnpj: Cnpj::parse("11222333000181").unwrap(),
                ie: "111222333444".to_string(),
                legal_name: "Mestres do Cafe Comercio LTDA".to_string(),
                trade_name: Some("Mestres do Cafe".to_string()),
                address: address(),
                tax_regime: TaxRegime::SimplesNacional,
            },
            environment,
            nfe_series: 1,
            nfce_series: 2,
            csc_id: Some("000001".to_string()),
            csc_token: Some("0123456789ABCDEF0123".to_string()),
            certificate_path: "cert.pem".to_string(),
            private_key_path: "key.pem".to_string(),
            allow_offline_contingency: true,
            cancel_window_hours: None,
        }
    }

    pub fn profile(environment: Environment) -> FiscalProfile {
        FiscalProfile::new(Uuid::nil(), profile_input(environment)).unwrap()
    }

    pub fn item() -> Item {
        Item {
            code: "CAFE-500".to_string(),
            gtin: None,
            description: "Cafe especial torrado 500g".to_string(),
            ncm: "09012100".to_string(),
            cest: None,
            cfop: "5102".to_string(),
            unit: "UN".to_string(),
            quantity: dec!(2),
            unit_price: dec!(45.90),
            discount: Decimal::ZERO,
            freight: Decimal::ZERO,
            tax: ItemTax {
                origin: 0,
                icms: IcmsTax::Simples { csosn: 102 },
                pis: Contribution { cst: 49, rate: Decimal::ZERO },
                cofins: Contribution { cst: 49, rate: Decimal::ZERO },
                approx_rate: dec!(10),
            },
        }
    }

    pub fn nfce_draft() -> DocumentDraft {
        DocumentDraft {
            order_ref: "PED-1001".to_string(),
            model: FiscalModel::Nfce,
            nature: "VENDA".to_string(),
            operation: OperationType::Outbound,
            purpose: Purpose::Normal,
            destination: Destination::Internal,
            presence: PresenceIndicator::InPerson,
            recipient: None,
            items: vec![item()],
            payments: vec![Payment {
                method: PaymentMethod::Cash,
                amount: dec!(100.00),
                card: None,
            }],
            freight_mode: FreightMode::NoFreight,
            additional_info: None,
        }
    }

    pub fn nfe_draft() -> DocumentDraft {
        DocumentDraft {
            order_ref: "PED-2001".to_string(),
            model: FiscalModel::Nfe,
            presence: PresenceIndicator::Internet,
            recipient: Some(Recipient {
                tax_id: TaxId::parse("52998224725").unwrap(),
                name: "Maria da Silva".to_string(),
                address: Some(address()),
                email: Some("maria@example.com".to_string()),
                ie_indicator: IeIndicator::NonContributor,
                ie: None,
            }),
            payments: vec![Payment {
                method: PaymentMethod::CreditCard,
                amount: dec!(91.80),
                card: Some(CardInfo {
                    integrated: false,
                    acquirer_cnpj: None,
                    authorization_code: Some("A1B2C3".to_string()),
                }),
            }],
            ..nfce_draft()
        }
    }

    pub fn issued_at() -> DateTime<FixedOffset> {
        FixedOffset::west_opt(3 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 11, 5, 10, 30, 0)
            .unwrap()
    }

    pub fn key_for(profile: &FiscalProfile, model: FiscalModel, emission_type: EmissionType) -> AccessKey {
        AccessKey::generate(&AccessKeyParts {
            uf: profile.uf(),
            issued_at: issued_at(),
            cnpj: &profile.issuer.cnpj,
            model,
            series: profile.series_for(model),
            number: 42,
            emission_type,
            numeric_code: 12345678,
        })
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn render(profile: &FiscalProfile, draft: &DocumentDraft) -> String {
        let totals = draft.validate().unwrap();
        let key = key_for(profile, draft.model, EmissionType::Normal);
        let input = NfeInput {
            profile,
            draft,
            totals: &totals,
            key: &key,
            emission_type: EmissionType::Normal,
            issued_at: issued_at(),
            contingency: None,
        };
        render_inf_nfe(&input).unwrap().canonical().unwrap()
    }

    #[test]
    fn test_nfce_ide_and_totals() {
        let profile = profile(Environment::Production);
        let xml = render(&profile, &nfce_draft());

        assert!(xml.starts_with(&format!(
            r#"<infNFe xmlns="{}" Id="NFe35"#,
            NFE_NAMESPACE
        )));
        assert!(xml.contains("<cNF>12345678</cNF><natOp>VENDA</natOp><mod>65</mod><serie>2</serie><nNF>42</nNF>"));
        assert!(xml.contains("<dhEmi>2024-11-05T10:30:00-03:00</dhEmi>"));
        assert!(xml.contains("<tpImp>4</tpImp><tpEmis>1</tpEmis>"));
        assert!(xml.contains("<indFinal>1</indFinal><indPres>1</indPres><procEmi>0</procEmi>"));
        assert!(xml.contains("<xProd>Cafe especial torrado 500g</xProd>"));
        assert!(xml.contains("<qCom>2.0000</qCom><vUnCom>45.90</vUnCom><vProd>91.80</vProd>"));
        assert!(xml.contains("<ICMSSN102><orig>0</orig><CSOSN>102</CSOSN></ICMSSN102>"));
        assert!(xml.contains("<PISOutr><CST>49</CST><vBC>91.80</vBC><pPIS>0.0000</pPIS><vPIS>0.00</vPIS></PISOutr>"));
        assert!(xml.contains("<vNF>91.80</vNF><vTotTrib>9.18</vTotTrib>"));
        assert!(xml.contains("<detPag><tPag>01</tPag><vPag>100.00</vPag></detPag><vTroco>8.20</vTroco>"));
        assert!(!xml.contains("<dest>"));
        assert!(!xml.contains("/>"));
    }

    #[test]
    fn test_homologation_replaces_names() {
        let profile = profile(Environment::Homologation);
        let xml = render(&profile, &nfe_draft());

        assert!(xml.contains(&format!("<xProd>{}</xProd>", HOMOLOGATION_NOTICE)));
        assert!(xml.contains(&format!("<CPF>52998224725</CPF><xNome>{}</xNome>", HOMOLOGATION_NOTICE)));
        assert!(xml.contains("<tpImp>1</tpImp>"));
        assert!(xml.contains("<indPres>2</indPres><indIntermed>0</indIntermed>"));
        assert!(xml.contains("<indIEDest>9</indIEDest><email>maria@example.com</email>"));
        assert!(xml.contains("<card><tpIntegra>2</tpIntegra><cAut>A1B2C3</cAut></card>"));
    }

    #[test]
    fn test_normal_regime_groups() {
        let profile = profile(Environment::Production);
        let mut draft = nfe_draft();
        draft.items[0].tax.icms = IcmsTax::Normal { cst: 0, rate: dec!(18) };
        draft.items[0].tax.pis = domain::Contribution { cst: 1, rate: dec!(1.65) };
        draft.items[0].tax.cofins = domain::Contribution { cst: 7, rate: Decimal::ZERO };
        let xml = render(&profile, &draft);

        assert!(xml.contains("<ICMS00><orig>0</orig><CST>00</CST><modBC>3</modBC><vBC>91.80</vBC><pICMS>18.0000</pICMS><vICMS>16.52</vICMS></ICMS00>"));
        assert!(xml.contains("<PISAliq><CST>01</CST><vBC>91.80</vBC><pPIS>1.6500</pPIS><vPIS>1.51</vPIS></PISAliq>"));
        assert!(xml.contains("<COFINSNT><CST>07</CST></COFINSNT>"));
        assert!(xml.contains("<vBC>91.80</vBC><vICMS>16.52</vICMS><vICMSDeson>0.00</vICMSDeson>"));
    }

    #[test]
    fn test_contingency_requires_justification() {
        let profile = profile(Environment::Production);
        let draft = nfce_draft();
        let totals = draft.validate().unwrap();
        let key = key_for(&profile, FiscalModel::Nfce, EmissionType::OfflineNfce);
        let mut input = NfeInput {
            profile: &profile,
            draft: &draft,
            totals: &totals,
            key: &key,
            emission_type: EmissionType::OfflineNfce,
            issued_at: issued_at(),
            contingency: None,
        };
        assert!(render_inf_nfe(&input).is_err());

        let cont = ContingencyInfo {
            entered_at: issued_at() + Duration::minutes(1),
            reason: "SEFAZ indisponivel para autorizacao".to_string(),
        };
        input.contingency = Some(&cont);
        let xml = render_inf_nfe(&input).unwrap().embedded().unwrap();
        assert!(xml.contains("<tpEmis>9</tpEmis>"));
        assert!(xml.contains(
            "<dhCont>2024-11-05T10:31:00-03:00</dhCont><xJust>SEFAZ indisponivel para autorizacao</xJust></ide>"
        ));
    }

    #[test]
    fn test_assemble_places_supplement_before_signature() {
        let el = SignableElement::new("infNFe", "NFe1".into(), "4.00", "<ide></ide>".into());
        let nfe = assemble_nfe(&el, Some("<infNFeSupl></infNFeSupl>"), "<Signature></Signature>").unwrap();
        assert_eq!(
            nfe,
            format!(
                r#"<NFe xmlns="{}"><infNFe Id="NFe1" versao="4.00"><ide></ide></infNFe><infNFeSupl></infNFeSupl><Signature></Signature></NFe>"#,
                NFE_NAMESPACE
            )
        );
    }
}
