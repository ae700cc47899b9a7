use super::emi;
use crate::config::LoanProductConfig;
use crate::domain::charges::{AffordabilityMode, Charges, LoanQuote};
use crate::domain::money::{Money, validate_amount};
use crate::error::{GatewayError, Result};
use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;

/// Tenures tried when the request leaves the tenure open.
pub const CANDIDATE_TENURES: [u32; 8] = [12, 24, 36, 48, 60, 72, 84, 96];

/// Inputs to one affordability calculation.
#[derive(Debug, Clone, Default)]
pub struct AffordabilityRequest {
    pub requested_amount: Option<Decimal>,
    pub deductible_amount: Option<Decimal>,
    pub desired_deductible_amount: Option<Decimal>,
    pub tenure: Option<u32>,
    pub retirement_date: Option<NaiveDate>,
    pub as_of: Option<NaiveDate>,
}

impl AffordabilityRequest {
    /// Monthly deduction the employee can carry: the desired amount when given, else the
    /// deductible amount.
    pub fn deduction_capacity(&self) -> Money {
        self.desired_deductible_amount
            .filter(|d| *d > Decimal::ZERO)
            .or(self.deductible_amount)
            .map(Money::new)
            .unwrap_or(Money::ZERO)
            .non_negative()
    }

    /// Every amount must be non-negative and within the accepted range.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("RequestedAmount", self.requested_amount),
            ("DeductibleAmount", self.deductible_amount),
            ("DesiredDeductibleAmount", self.desired_deductible_amount),
        ] {
            if let Some(value) = value {
                validate_amount(name, value)?;
            }
        }
        Ok(())
    }

    pub fn mode(&self) -> AffordabilityMode {
        match self.requested_amount {
            Some(amount) if amount > Decimal::ZERO => AffordabilityMode::Forward,
            _ => AffordabilityMode::Reverse,
        }
    }
}

/// Whole calendar months from `from` until `to`, zero when `to` is not in the future.
pub fn months_between(from: NaiveDate, to: NaiveDate) -> u32 {
    let months = (to.year() - from.year()) * 12 + to.month() as i32 - from.month() as i32
        - i32::from(to.day() < from.day());
    months.max(0) as u32
}

/// Prices loans for the configured product.
#[derive(Debug, Clone)]
pub struct LoanCalculator {
    product: LoanProductConfig,
}

impl LoanCalculator {
    pub fn new(product: LoanProductConfig) -> Self {
        Self { product }
    }

    pub fn product(&self) -> &LoanProductConfig {
        &self.product
    }

    pub fn annual_rate(&self) -> Decimal {
        self.product.annual_interest_rate
    }

    pub fn min_loan_amount(&self) -> Money {
        Money::new(self.product.min_loan_amount)
    }

    pub fn emi(&self, principal: Money, tenure: u32) -> Money {
        emi::emi(principal.value(), self.annual_rate(), tenure)
    }

    /// Inverse of [`Self::emi`], never below the product minimum.
    pub fn max_principal(&self, target_emi: Money, tenure: u32) -> Money {
        emi::max_principal_from_emi(target_emi.value(), self.annual_rate(), tenure)
            .max(self.min_loan_amount())
    }

    pub fn charges(&self, principal: Money) -> Charges {
        emi::charges(
            principal.value(),
            self.product.processing_fee_rate,
            self.product.insurance_rate,
            self.product.other_charges,
        )
    }

    /// Upper bound on tenure: months to retirement, or the default tenure when the retirement
    /// date is unknown, never above the product maximum.
    pub fn tenure_limit(&self, retirement_date: Option<NaiveDate>, as_of: Option<NaiveDate>) -> u32 {
        let limit = match (retirement_date, as_of) {
            (Some(retirement), Some(as_of)) => months_between(as_of, retirement),
            _ => self.product.default_tenure,
        };
        limit.min(self.product.max_tenure)
    }

    /// Computes a full quote.
    ///
    /// FORWARD (an amount was requested) caps the amount at what the deduction capacity can
    /// carry over the chosen tenure. REVERSE (no amount) returns the largest principal the
    /// capacity supports, searching [`CANDIDATE_TENURES`] when no tenure was given. Either way
    /// the product minimum is the floor.
    pub fn quote(&self, request: &AffordabilityRequest) -> Result<LoanQuote> {
        request.validate()?;
        let capacity = request.deduction_capacity();
        let mode = request.mode();
        let limit = self.tenure_limit(request.retirement_date, request.as_of);
        let requested_tenure = request.tenure.filter(|t| *t > 0);

        let tenure = match (mode, requested_tenure) {
            (_, Some(t)) => t.min(limit),
            (AffordabilityMode::Forward, None) => self.product.default_tenure.min(limit),
            (AffordabilityMode::Reverse, None) => self.best_tenure(capacity, limit),
        };
        if tenure == 0 {
            return Err(GatewayError::ValidationError(
                "no repayment period left before retirement".to_string(),
            ));
        }

        let ceiling = emi::max_principal_from_emi(capacity.value(), self.annual_rate(), tenure);
        let principal = match mode {
            AffordabilityMode::Forward => {
                let requested = Money::new(request.requested_amount.unwrap_or_default());
                let capped = requested.min(ceiling);
                if self.emi(capped, tenure) > capacity {
                    ceiling
                } else {
                    capped
                }
            }
            AffordabilityMode::Reverse => ceiling,
        };
        let eligible = principal.max(self.min_loan_amount());

        let monthly_installment = self.emi(eligible, tenure);
        let total_amount_to_pay = monthly_installment * Decimal::from(tenure);
        let charges = self.charges(eligible);

        Ok(LoanQuote {
            mode,
            tenure,
            annual_rate: self.annual_rate(),
            eligible_amount: eligible,
            monthly_installment,
            total_interest: (total_amount_to_pay - eligible).non_negative(),
            total_amount_to_pay,
            charges,
            net_loan_amount: (eligible - charges.total()).non_negative(),
            deduction_capacity: capacity,
        })
    }

    /// Candidate tenure (after capping) giving the largest principal; ties go to the shorter one.
    fn best_tenure(&self, capacity: Money, limit: u32) -> u32 {
        let mut best: Option<(u32, Money)> = None;
        for candidate in CANDIDATE_TENURES {
            let tenure = candidate.min(limit);
            if tenure == 0 {
                continue;
            }
            let principal = emi::max_principal_from_emi(capacity.value(), self.annual_rate(), tenure);
            match best {
                Some((_, current)) if principal <= current => {}
                _ => best = Some((tenure, principal)),
            }
        }
        best.map(|(tenure, _)| tenure).unwrap_or(0)
    }

    /// Balance still owed on a loan after `installments_paid` payments.
    pub fn outstanding_balance(&self, principal: Money, tenure: u32, installments_paid: u32) -> Money {
        emi::outstanding_balance(principal.value(), self.annual_rate(), tenure, installments_paid)
    }
}

impl Default for LoanCalculator {
    fn default() -> Self {
        Self::new(LoanProductConfig::default())
    }
}
