use super::{Reply, Services};
use crate::application::delivery::correlation_for;
use crate::application::inbound::PayOffBalanceRequest;
use crate::application::notifications::{PayOffBalance, top_up_balance_details};
use crate::calculation::{emi, months_between};
use crate::domain::loan::{BalanceRequest, LoanMapping};
use crate::domain::message::MessageType;
use crate::domain::money::Money;
use crate::error::{GatewayError, Result};
use chrono::{Months, NaiveDate, Utc};
use rust_decimal::Decimal;

/// Installments counted as paid: as reported, else whole months since disbursement.
fn installments_paid(mapping: &LoanMapping, reported: Option<u32>, today: NaiveDate) -> u32 {
    reported
        .unwrap_or_else(|| {
            mapping
                .metadata
                .disbursed_at
                .map(|at| months_between(at.date_naive(), today))
                .unwrap_or(0)
        })
        .min(mapping.tenure)
}

fn add_months(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_add_months(Months::new(months)).unwrap_or(date)
}

/// Figures needed to settle `mapping` early, `paid` installments in.
///
/// The pay-off amount is the outstanding principal plus one month of interest on it.
pub fn pay_off_balance(mapping: &LoanMapping, paid: u32, today: NaiveDate, reference: String) -> PayOffBalance {
    let outstanding = emi::outstanding_balance(
        mapping.eligible_amount.value(),
        mapping.interest_rate,
        mapping.tenure,
        paid,
    );
    let accrued = outstanding * (mapping.interest_rate / Decimal::from(1200));
    let start = mapping
        .metadata
        .disbursed_at
        .map(|at| at.date_naive())
        .unwrap_or(today);

    PayOffBalance {
        payment_reference: reference,
        outstanding_balance: outstanding,
        total_payoff_amount: if outstanding.is_positive() {
            outstanding + accrued
        } else {
            Money::ZERO
        },
        last_deduction_date: (paid > 0).then(|| add_months(start, paid)),
        final_payment_date: today,
        end_date: add_months(start, mapping.tenure),
    }
}

/// Answers a top-up pay-off balance inquiry for an existing loan.
pub async fn handle(services: &Services, request: PayOffBalanceRequest, request_msg_id: &str) -> Result<Reply> {
    let mapping = services
        .lifecycle
        .store()
        .find_by_loan_number(&request.loan_number)
        .await?
        .ok_or_else(|| GatewayError::NotFound(request.loan_number.clone()))?;
    if let Some(check_number) = &request.check_number
        && *check_number != mapping.check_number
    {
        return Err(GatewayError::ValidationError(format!(
            "CheckNumber {check_number} does not own loan {}",
            request.loan_number
        )));
    }

    let today = Utc::now().date_naive();
    let paid = installments_paid(&mapping, request.installments_paid, today);
    let balance = pay_off_balance(&mapping, paid, today, services.ids.fsp_reference());

    let entry = BalanceRequest {
        message_id: request_msg_id.to_string(),
        requested_at: Utc::now(),
        installments_paid: paid,
        outstanding_balance: balance.outstanding_balance,
    };
    let mapping = services
        .lifecycle
        .update(&mapping.application_number, |m| {
            m.metadata.balance_requests.push(entry.clone());
            Ok(())
        })
        .await?;
    tracing::info!(
        application_number = %mapping.application_number,
        installments_paid = paid,
        outstanding_balance = %balance.outstanding_balance,
        "pay-off balance computed"
    );

    Ok(Reply::new(
        MessageType::LoanTopUpBalanceResponse,
        top_up_balance_details(&mapping, &balance),
        correlation_for(&mapping),
    ))
}
