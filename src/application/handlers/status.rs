//! Status inquiry, cancellation and liquidation.

use super::{Reply, Services};
use crate::application::delivery::correlation_for;
use crate::application::inbound::{Cancellation, Liquidation};
use crate::application::lifecycle::advance;
use crate::application::notifications::status_response_details;
use crate::domain::loan::LoanStatus;
use crate::domain::message::MessageType;
use crate::error::Result;
use chrono::Utc;

pub async fn status(services: &Services, application_number: &str) -> Result<Reply> {
    let mapping = services.lifecycle.require(application_number).await?;
    Ok(Reply::new(
        MessageType::LoanStatusResponse,
        status_response_details(&mapping),
        correlation_for(&mapping),
    ))
}

/// Cancels the application. Cancelling twice is accepted; cancelling another terminal
/// application is an invalid transition.
pub async fn cancel(services: &Services, cancellation: Cancellation) -> Result<Reply> {
    let reason = cancellation.reason.clone();
    let mapping = services
        .lifecycle
        .update(&cancellation.application_number, |m| {
            advance(m, LoanStatus::Cancelled)?;
            if m.metadata.cancellation_reason.is_none() {
                m.metadata.cancellation_reason = reason.clone();
            }
            Ok(())
        })
        .await?;
    tracing::info!(
        application_number = %mapping.application_number,
        reason = ?cancellation.reason,
        "loan cancelled"
    );
    Ok(Reply::ack("Loan cancellation recorded", correlation_for(&mapping)))
}

/// Marks the loan as liquidated. The first liquidation date is kept.
pub async fn liquidate(services: &Services, liquidation: Liquidation) -> Result<Reply> {
    let mapping = services
        .lifecycle
        .update(&liquidation.application_number, |m| {
            m.metadata.liquidated_at.get_or_insert_with(Utc::now);
            Ok(())
        })
        .await?;
    tracing::info!(
        application_number = %mapping.application_number,
        loan_number = ?liquidation.loan_number,
        remarks = ?liquidation.remarks,
        "loan liquidated"
    );
    Ok(Reply::ack("Loan liquidation recorded", correlation_for(&mapping)))
}
