use super::money::Money;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Up-front fees deducted from a loan at disbursement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Charges {
    pub processing_fee: Money,
    pub insurance: Money,
    pub other_charges: Money,
}

impl Charges {
    pub fn total(&self) -> Money {
        self.processing_fee + self.insurance + self.other_charges
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AffordabilityMode {
    /// Driven by the amount the employee asked for.
    Forward,
    /// Driven by the deduction the employee can afford each month.
    Reverse,
}

/// The outcome of an affordability calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanQuote {
    pub mode: AffordabilityMode,
    pub tenure: u32,
    pub annual_rate: Decimal,
    pub eligible_amount: Money,
    pub monthly_installment: Money,
    pub total_interest: Money,
    pub total_amount_to_pay: Money,
    pub charges: Charges,
    pub net_loan_amount: Money,
    pub deduction_capacity: Money,
}

/// The last quote produced for an employee, reused by later offer steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeCalculationSnapshot {
    pub check_number: String,
    pub quote: LoanQuote,
    pub requested_amount: Option<Money>,
    pub requested_tenure: Option<u32>,
    pub calculated_at: DateTime<Utc>,
}

impl ChargeCalculationSnapshot {
    /// Whether an offer asking for `amount` over `tenure` with a monthly deduction `capacity`
    /// can reuse this snapshot as-is. An offer with an amount is priced FORWARD, one without
    /// REVERSE; the snapshot must have been priced the same way.
    pub fn matches_offer(&self, amount: Option<Money>, tenure: Option<u32>, capacity: Money) -> bool {
        let mode = if amount.is_some() {
            AffordabilityMode::Forward
        } else {
            AffordabilityMode::Reverse
        };
        if mode != self.quote.mode || capacity != self.quote.deduction_capacity {
            return false;
        }
        let amount_matches = match amount {
            None => true,
            Some(a) => a == self.quote.eligible_amount || Some(a) == self.requested_amount,
        };
        let tenure_matches = match tenure {
            None => true,
            Some(t) => t == self.quote.tenure || Some(t) == self.requested_tenure,
        };
        amount_matches && tenure_matches
    }
}
