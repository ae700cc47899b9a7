use super::{Reply, Services};
use crate::application::delivery::correlation_for;
use crate::application::inbound::OfferRequest;
use crate::domain::charges::LoanQuote;
use crate::domain::loan::{LoanMapping, LoanStatus};
use crate::domain::message::{MessageType, OfferVariant};
use crate::domain::money::Money;
use crate::error::{GatewayError, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use std::time::Duration;

fn original_message_type(variant: OfferVariant) -> MessageType {
    match variant {
        OfferVariant::NewLoan => MessageType::LoanOfferRequest,
        OfferVariant::TopUp => MessageType::TopUpOfferRequest,
        OfferVariant::Takeover => MessageType::LoanTakeoverOfferRequest,
    }
}

fn delay_for(services: &Services, variant: OfferVariant) -> Duration {
    match variant {
        OfferVariant::NewLoan => services.delays.loan_offer(),
        OfferVariant::TopUp => services.delays.top_up_offer(),
        OfferVariant::Takeover => services.delays.takeover_offer(),
    }
}

/// Reuses the employee's last charges quote when it still describes this offer.
async fn quote_for(services: &Services, offer: &OfferRequest) -> Result<LoanQuote> {
    let request = offer.affordability(Utc::now().date_naive());
    request.validate()?;
    let requested = offer
        .requested_amount
        .filter(|a| *a > Decimal::ZERO)
        .map(Money::new);
    if let Some(snapshot) = services.snapshots.get(offer.check_number()).await?
        && snapshot.matches_offer(requested, offer.tenure, request.deduction_capacity())
    {
        tracing::debug!(check_number = offer.check_number(), "offer priced from charges snapshot");
        return Ok(snapshot.quote);
    }
    services.calculator.quote(&request)
}

/// Records the offer against its application and promises an initial approval.
///
/// A repeated offer updates the same mapping; its loan number and reference are minted once.
pub async fn handle(services: &Services, offer: OfferRequest) -> Result<Reply> {
    let quote = quote_for(services, &offer).await?;
    let message_type = original_message_type(offer.variant);
    let requested = offer
        .requested_amount
        .filter(|a| *a > Decimal::ZERO)
        .map(Money::new)
        .unwrap_or(quote.eligible_amount);

    let ids = services.ids.clone();
    let mapping = services
        .lifecycle
        .upsert(
            &offer.application_number,
            || {
                let mut mapping =
                    LoanMapping::new(&offer.application_number, offer.check_number(), message_type);
                mapping.loan_number_alias = ids.loan_number();
                mapping.fsp_reference_number = ids.fsp_reference();
                mapping
            },
            |m| {
                if !matches!(
                    m.status,
                    LoanStatus::InitialOffer | LoanStatus::InitialApprovalSent
                ) {
                    return Err(GatewayError::Precondition(format!(
                        "application {} is already {}",
                        m.application_number, m.status
                    )));
                }
                m.check_number = offer.check_number().to_string();
                m.original_message_type = message_type;
                m.requested_amount = requested;
                m.eligible_amount = quote.eligible_amount;
                m.tenure = quote.tenure;
                m.interest_rate = quote.annual_rate;
                m.monthly_installment = quote.monthly_installment;
                m.charges = quote.charges;
                m.total_amount_to_pay = quote.total_amount_to_pay;
                m.metadata.client = Some(offer.client.clone());
                m.metadata.employment = Some(offer.employment.clone());
                m.metadata.loan = Some(offer.loan.clone());
                Ok(())
            },
        )
        .await?;

    tracing::info!(
        application_number = %mapping.application_number,
        variant = ?offer.variant,
        eligible_amount = %mapping.eligible_amount,
        tenure = mapping.tenure,
        "offer recorded"
    );

    services
        .scheduler
        .schedule(
            &mapping.application_number,
            MessageType::LoanInitialApprovalNotification,
            delay_for(services, offer.variant),
        )
        .await?;

    Ok(Reply::ack("Loan offer received", correlation_for(&mapping)))
}
