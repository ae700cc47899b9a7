//! Level-payment amortization math.

use crate::domain::charges::Charges;
use crate::domain::money::Money;
use rust_decimal::{Decimal, MathematicalOps, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::Serialize;

/// Annual percent to a monthly fraction: `15` becomes `0.0125`.
fn monthly_rate(annual_rate_percent: Decimal) -> Decimal {
    annual_rate_percent / dec!(1200)
}

fn growth_factor(monthly_rate: Decimal, tenure: u32) -> Decimal {
    (Decimal::ONE + monthly_rate).powu(u64::from(tenure))
}

/// Equated monthly installment. Zero rate degrades to straight-line repayment.
pub fn emi(principal: Decimal, annual_rate_percent: Decimal, tenure: u32) -> Money {
    if tenure == 0 || principal <= Decimal::ZERO {
        return Money::ZERO;
    }
    let r = monthly_rate(annual_rate_percent);
    if r.is_zero() {
        return Money::new(principal / Decimal::from(tenure));
    }
    let factor = growth_factor(r, tenure);
    Money::new(principal * r * factor / (factor - Decimal::ONE))
}

/// The largest principal whose installment does not exceed `target_emi`.
///
/// Rounded down to the cent so the result is always affordable.
pub fn max_principal_from_emi(target_emi: Decimal, annual_rate_percent: Decimal, tenure: u32) -> Money {
    if tenure == 0 || target_emi <= Decimal::ZERO {
        return Money::ZERO;
    }
    let r = monthly_rate(annual_rate_percent);
    let principal = if r.is_zero() {
        target_emi * Decimal::from(tenure)
    } else {
        let factor = growth_factor(r, tenure);
        target_emi * (factor - Decimal::ONE) / (r * factor)
    };
    Money::new(principal.round_dp_with_strategy(2, RoundingStrategy::ToZero))
}

pub fn total_interest(principal: Decimal, annual_rate_percent: Decimal, tenure: u32) -> Money {
    let installment = emi(principal, annual_rate_percent, tenure);
    installment * Decimal::from(tenure) - Money::new(principal)
}

/// Percentage fees on `principal` plus a fixed other charge.
pub fn charges(
    principal: Decimal,
    processing_fee_rate: Decimal,
    insurance_rate: Decimal,
    other_charges: Decimal,
) -> Charges {
    Charges {
        processing_fee: Money::new(principal * processing_fee_rate),
        insurance: Money::new(principal * insurance_rate),
        other_charges: Money::new(other_charges),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleRow {
    pub period: u32,
    pub opening_balance: Money,
    pub interest: Money,
    pub principal: Money,
    pub installment: Money,
    pub closing_balance: Money,
}

/// One row per month. The last row takes whatever balance is left, so it closes at zero.
pub fn amortization_schedule(principal: Decimal, annual_rate_percent: Decimal, tenure: u32) -> Vec<ScheduleRow> {
    let installment = emi(principal, annual_rate_percent, tenure);
    let r = monthly_rate(annual_rate_percent);
    let mut balance = Money::new(principal);
    let mut rows = Vec::with_capacity(tenure as usize);

    for period in 1..=tenure {
        let interest = Money::new(balance.value() * r);
        let (principal_part, payment) = if period == tenure {
            (balance, balance + interest)
        } else {
            let part = (installment - interest).min(balance);
            (part, part + interest)
        };
        let closing = balance - principal_part;
        rows.push(ScheduleRow {
            period,
            opening_balance: balance,
            interest,
            principal: principal_part,
            installment: payment,
            closing_balance: closing,
        });
        balance = closing;
    }
    rows
}

/// Balance still owed after `installments_paid` scheduled payments.
pub fn outstanding_balance(
    principal: Decimal,
    annual_rate_percent: Decimal,
    tenure: u32,
    installments_paid: u32,
) -> Money {
    if installments_paid == 0 {
        return Money::new(principal);
    }
    if installments_paid >= tenure {
        return Money::ZERO;
    }
    amortization_schedule(principal, annual_rate_percent, tenure)
        .get(installments_paid as usize - 1)
        .map(|row| row.closing_balance)
        .unwrap_or(Money::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emi_standard() {
        // 1,000,000 at 12% over 12 months
        assert_eq!(emi(dec!(1000000), dec!(12), 12), Money::new(dec!(88848.79)));
    }

    #[test]
    fn test_emi_zero_rate() {
        assert_eq!(emi(dec!(1200), dec!(0), 12), Money::new(dec!(100)));
        assert_eq!(emi(dec!(1000), dec!(0), 3), Money::new(dec!(333.33)));
    }

    #[test]
    fn test_emi_degenerate_inputs() {
        assert_eq!(emi(dec!(1000), dec!(15), 0), Money::ZERO);
        assert_eq!(emi(dec!(0), dec!(15), 12), Money::ZERO);
    }

    #[test]
    fn test_inverse_within_tolerance() {
        for (p, r, t) in [
            (dec!(1000000), dec!(15), 96),
            (dec!(14859903.99), dec!(15), 96),
            (dec!(500000), dec!(0), 24),
            (dec!(2500000), dec!(18.5), 36),
            (dec!(150000), dec!(9), 12),
        ] {
            let installment = emi(p, r, t);
            let back = max_principal_from_emi(installment.value(), r, t);
            let diff = (back.value() - p).abs();
            assert!(diff <= dec!(1.5), "P={p} r={r} t={t} back={back} diff={diff}");
        }
    }

    #[test]
    fn test_max_principal_is_affordable() {
        let p = max_principal_from_emi(dec!(266667), dec!(15), 96);
        assert!(emi(p.value(), dec!(15), 96).value() <= dec!(266667));
    }

    #[test]
    fn test_total_interest() {
        let interest = total_interest(dec!(1200), dec!(0), 12);
        assert_eq!(interest, Money::ZERO);
        let interest = total_interest(dec!(1000000), dec!(12), 12);
        assert_eq!(interest, Money::new(dec!(66185.48)));
    }

    #[test]
    fn test_charges_breakdown() {
        let c = charges(dec!(1000000), dec!(0.02), dec!(0.01), dec!(5000));
        assert_eq!(c.processing_fee, Money::new(dec!(20000)));
        assert_eq!(c.insurance, Money::new(dec!(10000)));
        assert_eq!(c.other_charges, Money::new(dec!(5000)));
    }

    #[test]
    fn test_schedule_shape() {
        for (p, r, t) in [
            (dec!(1000000), dec!(15), 96),
            (dec!(333333.33), dec!(12), 7),
            (dec!(1000), dec!(0), 3),
        ] {
            let rows = amortization_schedule(p, r, t);
            assert_eq!(rows.len(), t as usize);
            assert_eq!(rows.last().unwrap().closing_balance, Money::ZERO);
            let principal_sum: Decimal = rows.iter().map(|row| row.principal.value()).sum();
            assert!((principal_sum - p).abs() <= dec!(2));
            for pair in rows.windows(2) {
                assert_eq!(pair[0].closing_balance, pair[1].opening_balance);
            }
        }
    }

    #[test]
    fn test_outstanding_balance() {
        assert_eq!(
            outstanding_balance(dec!(1000), dec!(0), 4, 0),
            Money::new(dec!(1000))
        );
        assert_eq!(
            outstanding_balance(dec!(1000), dec!(0), 4, 2),
            Money::new(dec!(500))
        );
        assert_eq!(outstanding_balance(dec!(1000), dec!(0), 4, 9), Money::ZERO);
    }
}
