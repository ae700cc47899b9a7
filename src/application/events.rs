//! Banking engine webhooks.
//!
//! Events arrive unsigned and possibly more than once, so every transition here is guarded by
//! the current status and replays are reported as ignored.

use super::lifecycle::{LoanLifecycle, advance};
use super::scheduler::NotificationScheduler;
use crate::domain::loan::LoanStatus;
use crate::domain::message::MessageType;
use crate::error::{GatewayError, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEntity {
    pub id: Option<i64>,
    pub loan_id: Option<i64>,
}

/// A webhook body: `{"entityName":"LOAN","actionName":"DISBURSE","entity":{"id":42}}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankingEvent {
    pub entity_name: String,
    pub action_name: String,
    #[serde(default)]
    pub entity: EventEntity,
    pub loan_id: Option<i64>,
    pub resource_id: Option<i64>,
}

impl BankingEvent {
    pub fn loan_id(&self) -> Option<i64> {
        self.entity
            .id
            .or(self.entity.loan_id)
            .or(self.loan_id)
            .or(self.resource_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Approved,
    Disbursed,
}

impl Action {
    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "CREATE" | "APPROVE" => Some(Action::Approved),
            "DISBURSE" => Some(Action::Disbursed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum EventOutcome {
    Applied {
        application_number: String,
        status: LoanStatus,
    },
    Ignored {
        reason: String,
    },
}

impl EventOutcome {
    fn ignored(reason: impl Into<String>) -> Self {
        EventOutcome::Ignored {
            reason: reason.into(),
        }
    }
}

#[derive(Clone)]
pub struct BankingEventListener {
    lifecycle: LoanLifecycle,
    scheduler: NotificationScheduler,
    disbursement_delay: Duration,
}

impl BankingEventListener {
    pub fn new(lifecycle: LoanLifecycle, scheduler: NotificationScheduler, disbursement_delay: Duration) -> Self {
        Self {
            lifecycle,
            scheduler,
            disbursement_delay,
        }
    }

    pub async fn handle(&self, event: BankingEvent) -> Result<EventOutcome> {
        if !event.entity_name.eq_ignore_ascii_case("LOAN") {
            return Ok(EventOutcome::ignored(format!("entity {} not tracked", event.entity_name)));
        }
        let Some(action) = Action::from_name(&event.action_name) else {
            return Ok(EventOutcome::ignored(format!("action {} not tracked", event.action_name)));
        };
        let loan_id = event
            .loan_id()
            .ok_or_else(|| GatewayError::ValidationError("event carries no loan id".to_string()))?;
        let Some(mapping) = self.lifecycle.store().find_by_mifos_loan_id(loan_id).await? else {
            tracing::warn!(loan_id, action = %event.action_name, "event for a loan this gateway did not create");
            return Ok(EventOutcome::ignored(format!("loan {loan_id} unknown")));
        };
        let app = mapping.application_number.clone();

        let target = match action {
            Action::Approved => LoanStatus::LoanCreated,
            Action::Disbursed => LoanStatus::Disbursed,
        };
        let reachable = match (mapping.status, action) {
            (LoanStatus::InitialApprovalSent, _) => true,
            (LoanStatus::LoanCreated, Action::Disbursed) => true,
            _ => false,
        };
        if !reachable {
            tracing::info!(application_number = %app, status = %mapping.status, action = %event.action_name, "event ignored");
            return Ok(EventOutcome::ignored(format!("application {app} is {}", mapping.status)));
        }

        let mapping = self
            .lifecycle
            .update(&app, |m| {
                if target == LoanStatus::Disbursed {
                    advance(m, LoanStatus::LoanCreated)?;
                    advance(m, LoanStatus::Disbursed)?;
                    m.metadata.disbursed_at.get_or_insert_with(Utc::now);
                } else {
                    advance(m, target)?;
                }
                Ok(())
            })
            .await?;
        tracing::info!(application_number = %app, loan_id, status = %mapping.status, "banking event applied");

        if action == Action::Disbursed {
            self.scheduler
                .schedule(&app, MessageType::LoanDisbursementNotification, self.disbursement_delay)
                .await?;
        }
        Ok(EventOutcome::Applied {
            application_number: app,
            status: mapping.status,
        })
    }
}
