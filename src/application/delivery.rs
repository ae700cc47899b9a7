//! Callback delivery with bounded, fixed-interval retry.

use super::lifecycle::LoanLifecycle;
use super::notifications::{ComposedDocument, DocumentComposer};
use crate::config::DeliveryConfig;
use crate::domain::loan::{CallbackEvent, CallbackStatus, LoanMapping};
use crate::domain::message::{Direction, MessageType};
use crate::domain::message_log::{Correlation, DeliveryStatus, MessageLogEntry};
use crate::domain::ports::{CallbackTransportRef, MessageLogStoreRef};
use crate::error::{GatewayError, Result};
use crate::signature::XmlElement;
use chrono::Utc;
use std::time::Duration;

/// Log correlation fields for a loan.
pub fn correlation_for(mapping: &LoanMapping) -> Correlation {
    let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
    Correlation {
        application_number: Some(mapping.application_number.clone()),
        loan_number: non_empty(&mapping.loan_number_alias),
        fsp_reference_number: non_empty(&mapping.fsp_reference_number),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl From<&DeliveryConfig> for RetryPolicy {
    fn from(config: &DeliveryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: Duration::from_secs(config.backoff_secs),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&DeliveryConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent,
    SentAfterRetry { attempts: u32 },
    Failed { attempts: u32, error: String },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        !matches!(self, DeliveryOutcome::Failed { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            DeliveryOutcome::Sent => 1,
            DeliveryOutcome::SentAfterRetry { attempts } | DeliveryOutcome::Failed { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn callback_status(&self) -> CallbackStatus {
        match self {
            DeliveryOutcome::Sent => CallbackStatus::Sent,
            DeliveryOutcome::SentAfterRetry { .. } => CallbackStatus::SentAfterRetry,
            DeliveryOutcome::Failed { .. } => CallbackStatus::Failed,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            DeliveryOutcome::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Sends signed documents to the counterparty and records every attempt.
#[derive(Clone)]
pub struct NotificationSender {
    transport: CallbackTransportRef,
    log: MessageLogStoreRef,
    lifecycle: LoanLifecycle,
    policy: RetryPolicy,
}

impl NotificationSender {
    pub fn new(
        transport: CallbackTransportRef,
        log: MessageLogStoreRef,
        lifecycle: LoanLifecycle,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            log,
            lifecycle,
            policy,
        }
    }

    /// Delivers `document`, retrying non-2xx replies and transport errors.
    ///
    /// The log entry is written before the first attempt and after each one. When the
    /// correlation names an application, the outcome is also appended to its callbacks.
    /// Only storage failures surface as `Err`; delivery failure is an outcome.
    pub async fn send_with_retry(
        &self,
        document: &ComposedDocument,
        correlation: Correlation,
    ) -> Result<DeliveryOutcome> {
        let resend = match correlation.application_number.as_deref() {
            Some(app) => self
                .lifecycle
                .get(app)
                .await?
                .is_some_and(|m| m.last_callback(document.message_type).is_some()),
            None => false,
        };

        let mut entry = MessageLogEntry::new(
            &document.message_id,
            document.message_type,
            Direction::Outbound,
            &document.xml,
            correlation.clone(),
        );
        self.log.record(entry.clone()).await?;

        let mut last_error = String::new();
        let mut outcome = None;
        for attempt in 1..=self.policy.max_attempts {
            match self.transport.post(&document.xml).await {
                Ok(response) if response.is_success() => {
                    entry.status = if resend {
                        DeliveryStatus::Resent
                    } else {
                        DeliveryStatus::Sent
                    };
                    entry.response = Some(response.body);
                    entry.error = None;
                    entry.retry_count = attempt - 1;
                    entry.updated_at = Utc::now();
                    self.log.record(entry.clone()).await?;
                    outcome = Some(if attempt == 1 {
                        DeliveryOutcome::Sent
                    } else {
                        DeliveryOutcome::SentAfterRetry { attempts: attempt }
                    });
                    break;
                }
                Ok(response) => {
                    last_error = format!("HTTP {}: {}", response.status, response.body);
                    entry.response = Some(response.body);
                }
                Err(e) => last_error = e.to_string(),
            }

            tracing::warn!(
                msg_id = %document.message_id,
                message_type = %document.message_type,
                attempt,
                error = %last_error,
                "callback attempt failed"
            );
            entry.error = Some(last_error.clone());
            entry.retry_count = attempt;
            entry.updated_at = Utc::now();
            self.log.record(entry.clone()).await?;

            if attempt < self.policy.max_attempts {
                tokio::time::sleep(self.policy.backoff).await;
            }
        }

        let outcome = match outcome {
            Some(outcome) => {
                tracing::info!(msg_id = %document.message_id, message_type = %document.message_type, "callback delivered");
                outcome
            }
            None => {
                entry.status = DeliveryStatus::Failed;
                entry.updated_at = Utc::now();
                self.log.record(entry).await?;
                tracing::error!(
                    msg_id = %document.message_id,
                    message_type = %document.message_type,
                    attempts = self.policy.max_attempts,
                    "callback delivery failed after retries"
                );
                DeliveryOutcome::Failed {
                    attempts: self.policy.max_attempts,
                    error: last_error,
                }
            }
        };

        if let Some(app) = correlation.application_number.as_deref() {
            let event = CallbackEvent {
                message_type: document.message_type,
                message_id: document.message_id.clone(),
                sent_at: Utc::now(),
                status: outcome.callback_status(),
                attempts: outcome.attempts(),
                error: outcome.error().map(str::to_string),
            };
            match self.lifecycle.record_callback(app, event).await {
                Ok(_) | Err(GatewayError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(outcome)
    }

    /// Signs `details` as a `message_type` document for `mapping` and delivers it.
    ///
    /// A document that cannot be signed is never sent; the failure is recorded in the log and
    /// on the mapping like any other failed delivery.
    pub async fn deliver(
        &self,
        composer: &DocumentComposer,
        mapping: &LoanMapping,
        message_type: MessageType,
        details: XmlElement,
    ) -> Result<DeliveryOutcome> {
        let correlation = correlation_for(mapping);
        match composer.compose(message_type, details) {
            Ok(document) => self.send_with_retry(&document, correlation).await,
            Err(e) => {
                let error = e.to_string();
                tracing::error!(
                    application_number = %mapping.application_number,
                    message_type = %message_type,
                    error = %error,
                    "notification not signed, nothing sent"
                );
                let message_id = composer.ids().message_id(message_type);
                let mut entry = MessageLogEntry::new(
                    &message_id,
                    message_type,
                    Direction::Outbound,
                    "",
                    correlation,
                );
                entry.status = DeliveryStatus::Failed;
                entry.error = Some(error.clone());
                self.log.record(entry).await?;

                let outcome = DeliveryOutcome::Failed { attempts: 0, error };
                self.lifecycle
                    .record_callback(
                        &mapping.application_number,
                        CallbackEvent {
                            message_type,
                            message_id,
                            sent_at: Utc::now(),
                            status: CallbackStatus::Failed,
                            attempts: 0,
                            error: outcome.error().map(str::to_string),
                        },
                    )
                    .await?;
                Ok(outcome)
            }
        }
    }
}
