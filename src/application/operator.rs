//! Notifications an operator sends by hand once the loan exists in the banking engine.

use super::delivery::{DeliveryOutcome, NotificationSender};
use super::lifecycle::{LoanLifecycle, advance};
use super::notifications::{DocumentComposer, disbursement_details, disbursement_failure_details};
use crate::domain::loan::{LoanMapping, LoanStatus};
use crate::domain::message::MessageType;
use crate::error::{GatewayError, Result};
use chrono::Utc;

#[derive(Clone)]
pub struct OperatorTriggers {
    lifecycle: LoanLifecycle,
    composer: DocumentComposer,
    sender: NotificationSender,
}

impl OperatorTriggers {
    pub fn new(lifecycle: LoanLifecycle, composer: DocumentComposer, sender: NotificationSender) -> Self {
        Self {
            lifecycle,
            composer,
            sender,
        }
    }

    /// Loads the application and checks it sits in `LOAN_CREATED`; nothing is sent otherwise.
    async fn loan_created(&self, application_number: &str) -> Result<LoanMapping> {
        let mapping = self.lifecycle.require(application_number).await?;
        if mapping.status != LoanStatus::LoanCreated {
            return Err(GatewayError::Precondition(format!(
                "application {application_number} is {}, expected {}",
                mapping.status,
                LoanStatus::LoanCreated
            )));
        }
        Ok(mapping)
    }

    /// Sends the disbursement notification; a delivered one moves the loan to `DISBURSED`.
    pub async fn disbursement_notification(&self, application_number: &str) -> Result<DeliveryOutcome> {
        let mapping = self.loan_created(application_number).await?;
        let disbursed_at = mapping.metadata.disbursed_at.unwrap_or_else(Utc::now);
        let outcome = self
            .sender
            .deliver(
                &self.composer,
                &mapping,
                MessageType::LoanDisbursementNotification,
                disbursement_details(&mapping, disbursed_at),
            )
            .await?;
        if outcome.is_delivered() {
            self.lifecycle
                .update(application_number, |m| {
                    advance(m, LoanStatus::Disbursed)?;
                    m.metadata.disbursed_at.get_or_insert(disbursed_at);
                    Ok(())
                })
                .await?;
        }
        tracing::info!(application_number, outcome = ?outcome, "operator disbursement notification");
        Ok(outcome)
    }

    /// Tells the counterparty the disbursement did not go through. The status is unchanged.
    pub async fn disbursement_failure_notification(
        &self,
        application_number: &str,
        reason: &str,
    ) -> Result<DeliveryOutcome> {
        let mapping = self.loan_created(application_number).await?;
        let outcome = self
            .sender
            .deliver(
                &self.composer,
                &mapping,
                MessageType::LoanDisbursementFailureNotification,
                disbursement_failure_details(&mapping, reason),
            )
            .await?;
        tracing::info!(application_number, reason, outcome = ?outcome, "operator disbursement failure notification");
        Ok(outcome)
    }
}
