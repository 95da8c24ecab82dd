//! Layout number and date formats.

use chrono::{DateTime, FixedOffset, Offset, Utc};
use rust_decimal::Decimal;

use domain::totals::round2;

/// UTC-3, used for every timestamp sent to SEFAZ.
pub const BRASILIA_OFFSET_SECS: i32 = 3 * 3600;

pub fn brasilia() -> FixedOffset {
    FixedOffset::west_opt(BRASILIA_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

pub fn to_brasilia(at: DateTime<Utc>) -> DateTime<FixedOffset> {
    at.with_timezone(&brasilia())
}

/// `YYYY-MM-DDThh:mm:ss-03:00`
pub fn datetime(at: &DateTime<FixedOffset>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%:z").to_string()
}

/// Two decimal places (`TDec_1302`).
pub fn money(value: Decimal) -> String {
    fixed(round2(value), 2)
}

/// Four decimal places (quantities, rates).
pub fn four(value: Decimal) -> String {
    fixed(value.round_dp(4), 4)
}

/// Unit value: at least two and at most ten decimal places.
pub fn unit_value(value: Decimal) -> String {
    let value = value.round_dp(10).normalize();
    let scale = value.scale().max(2);
    fixed(value, scale)
}

fn fixed(mut value: Decimal, scale: u32) -> String {
    value.rescale(scale);
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn test_money_and_quantities() {
        assert_eq!(money(dec!(91.8)), "91.80");
        assert_eq!(money(dec!(0)), "0.00");
        assert_eq!(money(dec!(1.005)), "1.01");
        assert_eq!(four(dec!(2)), "2.0000");
        assert_eq!(four(dec!(1.65)), "1.6500");
    }

    #[test]
    fn test_unit_value_keeps_precision() {
        assert_eq!(unit_value(dec!(45.9)), "45.90");
        assert_eq!(unit_value(dec!(10.333)), "10.333");
        assert_eq!(unit_value(dec!(8)), "8.00");
    }

    #[test]
    fn test_datetime_in_brasilia() {
        let at = Utc.with_ymd_and_hms(2024, 11, 5, 13, 0, 0).unwrap();
        assert_eq!(datetime(&to_brasilia(at)), "2024-11-05T10:00:00-03:00");
    }
}
