//! Loan pricing: installment math and the affordability engine built on it.

pub mod affordability;
pub mod emi;

pub use affordability::{AffordabilityRequest, CANDIDATE_TENURES, LoanCalculator, months_between};
pub use emi::{ScheduleRow, amortization_schedule};
