use super::{Reply, Services};
use crate::application::inbound::ChargesInquiry;
use crate::application::notifications::charges_response_details;
use crate::domain::charges::ChargeCalculationSnapshot;
use crate::domain::message::MessageType;
use crate::domain::message_log::Correlation;
use crate::domain::money::Money;
use crate::error::Result;
use chrono::Utc;
use rust_decimal::Decimal;

/// Prices the inquiry and remembers the result for the employee's next offer.
pub async fn handle(services: &Services, inquiry: ChargesInquiry) -> Result<Reply> {
    let now = Utc::now();
    let quote = services
        .calculator
        .quote(&inquiry.affordability(now.date_naive()))?;

    tracing::info!(
        check_number = %inquiry.employment.check_number,
        mode = ?quote.mode,
        tenure = quote.tenure,
        eligible_amount = %quote.eligible_amount,
        "charges calculated"
    );

    services
        .snapshots
        .put(ChargeCalculationSnapshot {
            check_number: inquiry.employment.check_number.clone(),
            quote: quote.clone(),
            requested_amount: inquiry
                .requested_amount
                .filter(|a| *a > Decimal::ZERO)
                .map(Money::new),
            requested_tenure: inquiry.tenure,
            calculated_at: now,
        })
        .await?;

    Ok(Reply::new(
        MessageType::LoanChargesResponse,
        charges_response_details(&quote),
        Correlation::default(),
    ))
}
