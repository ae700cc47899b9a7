//! Restructure: re-prices an active loan and re-enters the main line through a fresh initial
//! approval notification.

use super::{Reply, Services};
use crate::application::delivery::correlation_for;
use crate::application::inbound::RestructureRequest;
use crate::application::lifecycle::advance;
use crate::domain::loan::{LoanMapping, LoanStatus, RestructureDetails};
use crate::domain::message::MessageType;
use crate::error::{GatewayError, Result};
use chrono::Utc;
use rust_decimal::Decimal;

pub async fn handle(services: &Services, request: RestructureRequest) -> Result<Reply> {
    let app = request.application_number.as_str();
    let current = services.lifecycle.require(app).await?;
    if current.check_number != request.check_number {
        return Err(GatewayError::ValidationError(format!(
            "CheckNumber {} does not belong to application {app}",
            request.check_number
        )));
    }
    if let Some(tenure) = request.requested_tenure
        && tenure > services.calculator.product().max_tenure
    {
        return Err(GatewayError::ValidationError(format!(
            "Tenure {tenure} exceeds the product maximum of {}",
            services.calculator.product().max_tenure
        )));
    }

    let details = RestructureDetails {
        requested_tenure: request.requested_tenure,
        requested_amount: request.requested_amount,
        requested_at: Utc::now(),
    };
    let mapping = services
        .lifecycle
        .update(app, |m| {
            advance(m, LoanStatus::RestructurePending)?;
            m.metadata.restructure = Some(details.clone());
            Ok(())
        })
        .await?;
    tracing::info!(
        application_number = app,
        requested_tenure = ?request.requested_tenure,
        "restructure pending"
    );

    let background = services.clone();
    let application_number = request.application_number.clone();
    tokio::spawn(async move {
        if let Err(e) = complete(&background, &application_number).await {
            tracing::error!(application_number = %application_number, error = %e, "restructure failed");
        }
    });

    Ok(Reply::ack("Loan restructure request received", correlation_for(&mapping)))
}

/// Extends the banking schedule, re-prices the mapping and schedules the initial approval.
pub async fn complete(services: &Services, application_number: &str) -> Result<LoanMapping> {
    let mapping = services.lifecycle.require(application_number).await?;
    let Some(restructure) = mapping.metadata.restructure.clone() else {
        return Err(GatewayError::Precondition(format!(
            "application {application_number} has no restructure request"
        )));
    };
    let tenure = restructure.requested_tenure.unwrap_or(mapping.tenure);
    let principal = restructure.requested_amount.unwrap_or(mapping.eligible_amount);

    if let Some(loan_id) = mapping.mifos_loan_id {
        let extra_terms = tenure.saturating_sub(mapping.tenure);
        if extra_terms > 0
            && let Err(e) = services
                .banking
                .reschedule_loan(loan_id, extra_terms, Utc::now().date_naive())
                .await
        {
            services
                .lifecycle
                .record_failure(application_number, "reschedule_loan", &e.to_string())
                .await?;
            return Err(e);
        }
    }

    let monthly_installment = services.calculator.emi(principal, tenure);
    let mapping = services
        .lifecycle
        .update(application_number, |m| {
            advance(m, LoanStatus::RestructureApproved)?;
            m.eligible_amount = principal;
            m.tenure = tenure;
            m.monthly_installment = monthly_installment;
            m.total_amount_to_pay = monthly_installment * Decimal::from(tenure);
            Ok(())
        })
        .await?;
    tracing::info!(
        application_number,
        tenure,
        monthly_installment = %monthly_installment,
        "restructure approved"
    );

    services
        .scheduler
        .schedule(
            application_number,
            MessageType::LoanInitialApprovalNotification,
            services.delays.restructure(),
        )
        .await?;
    Ok(mapping)
}
