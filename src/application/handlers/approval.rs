//! Final approval: provisions the loan in the banking engine once the counterparty confirms.

use super::{Reply, Services};
use crate::application::delivery::correlation_for;
use crate::application::inbound::FinalApproval;
use crate::application::lifecycle::advance;
use crate::domain::loan::{LoanMapping, LoanStatus};
use crate::domain::message::MessageType;
use crate::domain::ports::{NewClient, NewLoan};
use crate::error::{GatewayError, Result};
use chrono::{NaiveDate, Utc};
use std::sync::atomic::{AtomicBool, Ordering};

pub async fn handle(services: &Services, approval: FinalApproval) -> Result<Reply> {
    let app = approval.application_number.as_str();

    if !approval.approved {
        let reason = approval.reason.clone();
        let mapping = services
            .lifecycle
            .update(app, |m| {
                advance(m, LoanStatus::Rejected)?;
                m.metadata.rejection_reason = reason.clone();
                Ok(())
            })
            .await?;
        tracing::info!(application_number = app, reason = ?approval.reason, "loan rejected by employer");
        return Ok(Reply::ack("Final approval rejection recorded", correlation_for(&mapping)));
    }

    // Only the approval that sets the claim provisions; a repeat of it is acknowledged as is.
    let claimed = AtomicBool::new(false);
    let mapping = services
        .lifecycle
        .update(app, |m| {
            claimed.store(false, Ordering::Relaxed);
            if m.metadata.provisioning_started_at.is_some() && !m.status.is_terminal() {
                return Ok(());
            }
            if m.status != LoanStatus::InitialApprovalSent {
                return Err(GatewayError::Precondition(format!(
                    "application {app} is {}, final approval needs {}",
                    m.status,
                    LoanStatus::InitialApprovalSent
                )));
            }
            m.metadata.provisioning_started_at = Some(Utc::now());
            claimed.store(true, Ordering::Relaxed);
            Ok(())
        })
        .await?;

    if !claimed.load(Ordering::Relaxed) {
        tracing::info!(application_number = app, status = %mapping.status, "final approval repeated, provisioning already started");
        return Ok(Reply::ack("Final approval already received", correlation_for(&mapping)));
    }

    let background = services.clone();
    let application_number = approval.application_number.clone();
    tokio::spawn(async move {
        if let Err(e) = provision(&background, &application_number).await {
            tracing::error!(application_number = %application_number, error = %e, "loan provisioning failed");
        }
    });

    Ok(Reply::ack("Final approval received", correlation_for(&mapping)))
}

/// Stages that run once the money has left; their failures must not undo `DISBURSED`.
const AFTER_DISBURSEMENT: &[&str] = &["schedule_disbursement"];

/// Creates the client and loan, approves it and, when configured, disburses it.
///
/// Steps already completed on an earlier run (ids present, status advanced) are skipped. A
/// failing step before disbursement marks the application `FAILED` with the stage that broke.
pub async fn provision(services: &Services, application_number: &str) -> Result<LoanMapping> {
    match provision_steps(services, application_number).await {
        Ok(mapping) => Ok(mapping),
        Err((stage, e)) => {
            settle_failure(services, application_number, stage, &e).await?;
            Err(e)
        }
    }
}

async fn settle_failure(services: &Services, app: &str, stage: &str, error: &GatewayError) -> Result<LoanMapping> {
    if AFTER_DISBURSEMENT.contains(&stage) {
        services.lifecycle.record_error(app, stage, &error.to_string()).await
    } else {
        services.lifecycle.record_failure(app, stage, &error.to_string()).await
    }
}

type StepResult<T> = std::result::Result<T, (&'static str, GatewayError)>;

fn at(stage: &'static str) -> impl FnOnce(GatewayError) -> (&'static str, GatewayError) {
    move |e| (stage, e)
}

fn new_client(mapping: &LoanMapping, today: NaiveDate) -> NewClient {
    let client = mapping.metadata.client.clone().unwrap_or_default();
    NewClient {
        external_id: mapping.check_number.clone(),
        full_name: client.full_name(),
        first_name: client.first_name.clone().unwrap_or_else(|| mapping.check_number.clone()),
        last_name: client.last_name.clone().unwrap_or_else(|| mapping.check_number.clone()),
        mobile_number: client.mobile_number.clone(),
        date_of_birth: client.date_of_birth,
        activation_date: today,
    }
}

async fn provision_steps(services: &Services, app: &str) -> StepResult<LoanMapping> {
    let lifecycle = &services.lifecycle;
    let banking = &services.banking;
    let today = Utc::now().date_naive();
    let mut mapping = lifecycle.require(app).await.map_err(at("load"))?;
    if !matches!(
        mapping.status,
        LoanStatus::InitialApprovalSent | LoanStatus::LoanCreated
    ) {
        tracing::info!(application_number = app, status = %mapping.status, "nothing left to provision");
        return Ok(mapping);
    }

    let client_id = match mapping.mifos_client_id {
        Some(id) => id,
        None => {
            let id = banking
                .create_client(&new_client(&mapping, today))
                .await
                .map_err(at("create_client"))?;
            mapping = lifecycle
                .update(app, |m| {
                    m.mifos_client_id = Some(id);
                    Ok(())
                })
                .await
                .map_err(at("create_client"))?;
            id
        }
    };

    let loan_id = match mapping.mifos_loan_id {
        Some(id) => id,
        None => {
            let loan = NewLoan {
                client_id,
                external_id: mapping.application_number.clone(),
                principal: mapping.eligible_amount,
                tenure: mapping.tenure,
                annual_rate: mapping.interest_rate,
                submitted_on: today,
            };
            let id = banking.create_loan(&loan).await.map_err(at("create_loan"))?;
            mapping = lifecycle
                .update(app, |m| {
                    m.mifos_loan_id = Some(id);
                    Ok(())
                })
                .await
                .map_err(at("create_loan"))?;
            id
        }
    };

    if mapping.status == LoanStatus::InitialApprovalSent {
        banking
            .approve_loan(loan_id, today)
            .await
            .map_err(at("approve_loan"))?;
        mapping = lifecycle
            .transition(app, LoanStatus::LoanCreated)
            .await
            .map_err(at("approve_loan"))?;
    }

    if services.auto_disburse && mapping.status == LoanStatus::LoanCreated {
        banking
            .disburse_loan(loan_id, mapping.eligible_amount, today)
            .await
            .map_err(at("disburse_loan"))?;
        mapping = lifecycle
            .update(app, |m| {
                advance(m, LoanStatus::Disbursed)?;
                m.metadata.disbursed_at.get_or_insert_with(Utc::now);
                Ok(())
            })
            .await
            .map_err(at("disburse_loan"))?;
        services
            .scheduler
            .schedule(
                app,
                MessageType::LoanDisbursementNotification,
                services.delays.disbursement(),
            )
            .await
            .map_err(at("schedule_disbursement"))?;
    }

    tracing::info!(
        application_number = app,
        client_id,
        loan_id,
        status = %mapping.status,
        "loan provisioned"
    );
    Ok(mapping)
}
