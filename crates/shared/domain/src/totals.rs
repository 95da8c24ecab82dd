//! Item amounts and document totals (ICMSTot).

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::codes::PaymentMethod;
use crate::document::{IcmsTax, Item, Payment};
use crate::error::{DomainError, DomainResult};

/// Round half away from zero to two decimal places.
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub(crate) fn out_of_range() -> DomainError {
    DomainError::validation("Amounts exceed the supported range")
}

fn add(a: Decimal, b: Decimal) -> DomainResult<Decimal> {
    a.checked_add(b).ok_or_else(out_of_range)
}

fn percent_of(base: Decimal, rate: Decimal) -> DomainResult<Decimal> {
    base.checked_mul(rate)
        .map(|v| round2(v / Decimal::ONE_HUNDRED))
        .ok_or_else(out_of_range)
}

/// Computed amounts for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemAmounts {
    pub gross: Decimal,
    pub icms_base: Decimal,
    pub icms_value: Decimal,
    pub pis_base: Decimal,
    pub pis_value: Decimal,
    pub cofins_base: Decimal,
    pub cofins_value: Decimal,
    pub approx_tax: Decimal,
}

impl ItemAmounts {
    pub fn compute(item: &Item) -> DomainResult<Self> {
        let gross = item.gross()?;
        let net = gross.checked_sub(item.discount).ok_or_else(out_of_range)?;

        let (icms_base, icms_value) = match &item.tax.icms {
            IcmsTax::Normal { cst: 0, rate } => (net, percent_of(net, *rate)?),
            _ => (Decimal::ZERO, Decimal::ZERO),
        };

        let (pis_base, pis_value) = if item.tax.pis.is_taxed() {
            (net, percent_of(net, item.tax.pis.rate)?)
        } else {
            (Decimal::ZERO, Decimal::ZERO)
        };

        let (cofins_base, cofins_value) = if item.tax.cofins.is_taxed() {
            (net, percent_of(net, item.tax.cofins.rate)?)
        } else {
            (Decimal::ZERO, Decimal::ZERO)
        };

        Ok(Self {
            gross,
            icms_base,
            icms_value,
            pis_base,
            pis_value,
            cofins_base,
            cofins_value,
            approx_tax: percent_of(net, item.tax.approx_rate)?,
        })
    }
}

/// Document totals.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Totals {
    pub v_bc: Decimal,
    pub v_icms: Decimal,
    pub v_prod: Decimal,
    pub v_frete: Decimal,
    pub v_seg: Decimal,
    pub v_desc: Decimal,
    pub v_outro: Decimal,
    pub v_pis: Decimal,
    pub v_cofins: Decimal,
    pub v_tot_trib: Decimal,
    pub v_nf: Decimal,
}

impl Totals {
    /// Sum item amounts; `v_nf = v_prod - v_desc + v_frete + v_seg + v_outro`.
    pub fn compute(items: &[Item]) -> DomainResult<Self> {
        let mut totals = Totals::default();
        for item in items {
            let amounts = ItemAmounts::compute(item)?;
            totals.v_prod = add(totals.v_prod, amounts.gross)?;
            totals.v_desc = add(totals.v_desc, item.discount)?;
            totals.v_frete = add(totals.v_frete, item.freight)?;
            totals.v_bc = add(totals.v_bc, amounts.icms_base)?;
            totals.v_icms = add(totals.v_icms, amounts.icms_value)?;
            totals.v_pis = add(totals.v_pis, amounts.pis_value)?;
            totals.v_cofins = add(totals.v_cofins, amounts.cofins_value)?;
            totals.v_tot_trib = add(totals.v_tot_trib, amounts.approx_tax)?;
        }
        let net = totals.v_prod.checked_sub(totals.v_desc).ok_or_else(out_of_range)?;
        totals.v_nf = [totals.v_frete, totals.v_seg, totals.v_outro]
            .into_iter()
            .try_fold(net, add)?;
        Ok(totals)
    }
}

/// Change (vTroco) owed to the buyer; only cash payments can produce change.
pub fn change_due(totals: &Totals, payments: &[Payment]) -> DomainResult<Decimal> {
    let paid = payments.iter().map(|p| p.amount).try_fold(Decimal::ZERO, add)?;
    if paid < totals.v_nf {
        return Err(DomainError::validation(format!(
            "Payments ({}) do not cover the document total ({})",
            paid, totals.v_nf
        )));
    }
    let change = paid - totals.v_nf;
    if change > Decimal::ZERO && !payments.iter().any(|p| p.method == PaymentMethod::Cash) {
        return Err(DomainError::validation("Change is only allowed with a cash payment"));
    }
    Ok(change)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::fixtures::item;
    use crate::document::Contribution;
    use rust_decimal_macros::dec;

    #[test]
    fn test_round_half_away_from_zero() {
        assert_eq!(round2(dec!(1.005)), dec!(1.01));
        assert_eq!(round2(dec!(2.004)), dec!(2.00));
    }

    #[test]
    fn test_totals_with_discount_and_freight() {
        let mut a = item(dec!(3), dec!(10.333));
        a.discount = dec!(1.00);
        let mut b = item(dec!(1), dec!(20));
        b.freight = dec!(5.50);

        let totals = Totals::compute(&[a, b]).unwrap();
        assert_eq!(totals.v_prod, dec!(51.00));
        assert_eq!(totals.v_desc, dec!(1.00));
        assert_eq!(totals.v_frete, dec!(5.50));
        assert_eq!(totals.v_nf, dec!(55.50));
    }

    #[test]
    fn test_normal_regime_taxes() {
        let mut it = item(dec!(1), dec!(100));
        it.discount = dec!(10);
        it.tax.icms = IcmsTax::Normal { cst: 0, rate: dec!(18) };
        it.tax.pis = Contribution { cst: 1, rate: dec!(1.65) };
        it.tax.cofins = Contribution { cst: 1, rate: dec!(7.6) };

        let amounts = ItemAmounts::compute(&it).unwrap();
        assert_eq!(amounts.icms_base, dec!(90));
        assert_eq!(amounts.icms_value, dec!(16.20));
        assert_eq!(amounts.pis_value, dec!(1.49));
        assert_eq!(amounts.cofins_value, dec!(6.84));
        assert_eq!(amounts.approx_tax, dec!(9.00));
    }

    #[test]
    fn test_sums_report_overflow() {
        let huge = item(dec!(1), Decimal::MAX);
        assert_eq!(Totals::compute(&[huge.clone(), huge]), Err(out_of_range()));

        let mut it = item(dec!(1), dec!(100));
        it.tax.approx_rate = Decimal::MAX;
        assert!(ItemAmounts::compute(&it).is_err());
    }

    #[test]
    fn test_change_only_with_cash() {
        let totals = Totals::compute(&[item(dec!(1), dec!(8.50))]).unwrap();
        let pix = Payment { method: PaymentMethod::Pix, amount: dec!(10), card: None };
        assert!(change_due(&totals, &[pix]).is_err());

        let cash = Payment { method: PaymentMethod::Cash, amount: dec!(10), card: None };
        assert_eq!(change_due(&totals, &[cash]).unwrap(), dec!(1.50));
    }
}
