//! Invoice numbers: `{prefix}-{outlet}-{YYYY}-{seq}` or `{prefix}-{outlet}-{seq}`.

use chrono::{DateTime, Datelike, Utc};

use spadesk_accounts::{NumberingPolicy, SequenceReset};

/// Key of the counter an invoice number is drawn from.
///
/// Yearly policies get one counter per outlet and calendar year.
pub fn invoice_sequence_key(policy: &NumberingPolicy, outlet_code: &str, at: DateTime<Utc>) -> String {
    match policy.reset {
        SequenceReset::Yearly => format!("invoice:{outlet_code}:{}", at.year()),
        SequenceReset::Never => format!("invoice:{outlet_code}"),
    }
}

pub fn format_invoice_number(
    policy: &NumberingPolicy,
    outlet_code: &str,
    at: DateTime<Utc>,
    seq: u64,
) -> String {
    let width = usize::from(policy.padding);
    match policy.reset {
        SequenceReset::Yearly => format!(
            "{}-{outlet_code}-{}-{seq:0width$}",
            policy.prefix,
            at.year()
        ),
        SequenceReset::Never => format!("{}-{outlet_code}-{seq:0width$}", policy.prefix),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn yearly_numbers_carry_the_year() {
        let policy = NumberingPolicy::default();
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();
        assert_eq!(format_invoice_number(&policy, "MAIN", at, 7), "INV-MAIN-2026-00007");
        assert_eq!(invoice_sequence_key(&policy, "MAIN", at), "invoice:MAIN:2026");
    }

    #[test]
    fn never_reset_numbers_share_one_counter() {
        let policy = NumberingPolicy {
            prefix: "SPA".into(),
            padding: 3,
            reset: SequenceReset::Never,
        };
        let at = Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(format_invoice_number(&policy, "DT", at, 1234), "SPA-DT-1234");
        assert_eq!(invoice_sequence_key(&policy, "DT", at), "invoice:DT");
    }
}
