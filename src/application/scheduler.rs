//! Deferred notifications.
//!
//! Each scheduled send is persisted as a pending intent on the loan mapping before its task
//! is spawned, so a restart can pick it up again through [`NotificationScheduler::recover`].

use super::delivery::{DeliveryOutcome, NotificationSender};
use super::lifecycle::LoanLifecycle;
use super::notifications::{DocumentComposer, disbursement_details, initial_approval_details};
use crate::domain::loan::{LoanMapping, LoanStatus};
use crate::domain::message::MessageType;
use crate::error::{GatewayError, Result};
use crate::signature::XmlElement;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

type Key = (String, MessageType);

struct Inner {
    lifecycle: LoanLifecycle,
    composer: DocumentComposer,
    sender: NotificationSender,
    in_flight: Mutex<HashSet<Key>>,
}

#[derive(Clone)]
pub struct NotificationScheduler {
    inner: Arc<Inner>,
}

impl NotificationScheduler {
    pub fn new(lifecycle: LoanLifecycle, composer: DocumentComposer, sender: NotificationSender) -> Self {
        Self {
            inner: Arc::new(Inner {
                lifecycle,
                composer,
                sender,
                in_flight: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Sends `message_type` for `application_number` once, after `delay`.
    ///
    /// Returns `None` when the same notification is already waiting.
    pub async fn schedule(
        &self,
        application_number: &str,
        message_type: MessageType,
        delay: Duration,
    ) -> Result<Option<JoinHandle<()>>> {
        if !is_deferrable(message_type) {
            return Err(GatewayError::UnsupportedMessage(format!(
                "{message_type} cannot be deferred"
            )));
        }
        let key = (application_number.to_string(), message_type);
        if !self.claim(&key) {
            tracing::debug!(application_number, message_type = %message_type, "already scheduled");
            return Ok(None);
        }

        let due_at = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        if let Err(e) = self
            .inner
            .lifecycle
            .add_pending(application_number, message_type, due_at)
            .await
        {
            self.release(&key);
            return Err(e);
        }

        tracing::info!(
            application_number,
            message_type = %message_type,
            delay_secs = delay.as_secs(),
            "notification scheduled"
        );
        Ok(Some(self.spawn(key, delay)))
    }

    /// Re-arms every pending intent found in the store with its remaining delay.
    pub async fn recover(&self) -> Result<Vec<JoinHandle<()>>> {
        let mappings = self.inner.lifecycle.store().list_with_pending_notifications().await?;
        let now = Utc::now();
        let mut handles = Vec::new();
        for mapping in mappings {
            for pending in &mapping.metadata.pending_notifications {
                let key = (mapping.application_number.clone(), pending.message_type);
                if !self.claim(&key) {
                    continue;
                }
                let remaining = (pending.due_at - now).to_std().unwrap_or(Duration::ZERO);
                handles.push(self.spawn(key, remaining));
            }
        }
        if !handles.is_empty() {
            tracing::info!(count = handles.len(), "pending notifications recovered");
        }
        Ok(handles)
    }

    fn claim(&self, key: &Key) -> bool {
        match self.inner.in_flight.lock() {
            Ok(mut in_flight) => in_flight.insert(key.clone()),
            Err(poisoned) => poisoned.into_inner().insert(key.clone()),
        }
    }

    fn release(&self, key: &Key) {
        match self.inner.in_flight.lock() {
            Ok(mut in_flight) => in_flight.remove(key),
            Err(poisoned) => poisoned.into_inner().remove(key),
        };
    }

    fn spawn(&self, key: Key, delay: Duration) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let (application_number, message_type) = &key;
            if let Err(e) = scheduler.fire(application_number, *message_type).await {
                tracing::error!(
                    application_number = %application_number,
                    message_type = %message_type,
                    error = %e,
                    "deferred notification failed"
                );
            }
            scheduler.release(&key);
        })
    }

    async fn fire(&self, application_number: &str, message_type: MessageType) -> Result<Option<DeliveryOutcome>> {
        let inner = &self.inner;
        let Some(mapping) = inner.lifecycle.get(application_number).await? else {
            return Ok(None);
        };
        if !mapping.has_pending(message_type) {
            return Ok(None);
        }
        if mapping.status.is_terminal() {
            tracing::info!(
                application_number,
                message_type = %message_type,
                status = %mapping.status,
                "loan reached a terminal status, notification dropped"
            );
            inner.lifecycle.clear_pending(application_number, message_type).await?;
            return Ok(None);
        }

        let details = details_for(&mapping, message_type);
        let outcome = inner
            .sender
            .deliver(&inner.composer, &mapping, message_type, details)
            .await?;
        inner.lifecycle.clear_pending(application_number, message_type).await?;

        if outcome.is_delivered() && message_type == MessageType::LoanInitialApprovalNotification {
            inner
                .lifecycle
                .transition(application_number, LoanStatus::InitialApprovalSent)
                .await?;
        }
        Ok(Some(outcome))
    }
}

fn is_deferrable(message_type: MessageType) -> bool {
    matches!(
        message_type,
        MessageType::LoanInitialApprovalNotification | MessageType::LoanDisbursementNotification
    )
}

fn details_for(mapping: &LoanMapping, message_type: MessageType) -> XmlElement {
    match message_type {
        MessageType::LoanDisbursementNotification => {
            disbursement_details(mapping, mapping.metadata.disbursed_at.unwrap_or_else(Utc::now))
        }
        _ => initial_approval_details(mapping),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::delivery::RetryPolicy;
    use crate::application::ids::MessageIdGenerator;
    use crate::config::FspConfig;
    use crate::domain::loan::{CallbackStatus, PendingNotification};
    use crate::domain::ports::{CallbackTransport, TransportResponse};
    use crate::infrastructure::in_memory::{InMemoryLoanStore, InMemoryMessageLog};
    use crate::signature::SigningContext;
    use async_trait::async_trait;
    use rsa::{RsaPrivateKey, RsaPublicKey};
    use std::sync::OnceLock;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn key() -> &'static RsaPrivateKey {
        static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
        KEY.get_or_init(|| RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap())
    }

    #[derive(Default)]
    struct CountingTransport {
        calls: AtomicU32,
    }

    #[async_trait]
    impl CallbackTransport for CountingTransport {
        async fn post(&self, _payload: &str) -> Result<TransportResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(TransportResponse {
                status: 200,
                body: String::new(),
            })
        }
    }

    async fn setup() -> (NotificationScheduler, LoanLifecycle, Arc<CountingTransport>) {
        let lifecycle = LoanLifecycle::new(Arc::new(InMemoryLoanStore::new()));
        lifecycle
            .upsert(
                "APP1",
                || LoanMapping::new("APP1", "CHK1", MessageType::LoanOfferRequest),
                |_| Ok(()),
            )
            .await
            .unwrap();
        let transport = Arc::new(CountingTransport::default());
        let sender = NotificationSender::new(
            transport.clone(),
            Arc::new(InMemoryMessageLog::new()),
            lifecycle.clone(),
            RetryPolicy {
                max_attempts: 1,
                backoff: Duration::ZERO,
            },
        );
        let composer = DocumentComposer::new(
            Arc::new(SigningContext::new(
                Some(key().clone()),
                Some(RsaPublicKey::from(key())),
                None,
            )),
            Arc::new(MessageIdGenerator::new("FL0001")),
            FspConfig::default(),
        );
        (
            NotificationScheduler::new(lifecycle.clone(), composer, sender),
            lifecycle,
            transport,
        )
    }

    #[tokio::test]
    async fn test_fires_once_and_advances_status() {
        let (scheduler, lifecycle, transport) = setup().await;
        let handle = scheduler
            .schedule("APP1", MessageType::LoanInitialApprovalNotification, Duration::ZERO)
            .await
            .unwrap()
            .unwrap();
        handle.await.unwrap();

        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        let mapping = lifecycle.require("APP1").await.unwrap();
        assert_eq!(mapping.status, LoanStatus::InitialApprovalSent);
        assert!(mapping.metadata.pending_notifications.is_empty());
        assert_eq!(mapping.metadata.callbacks_sent[0].status, CallbackStatus::Sent);
    }

    #[tokio::test]
    async fn test_duplicate_schedule_is_suppressed() {
        let (scheduler, _lifecycle, transport) = setup().await;
        let first = scheduler
            .schedule("APP1", MessageType::LoanInitialApprovalNotification, Duration::from_millis(50))
            .await
            .unwrap();
        let second = scheduler
            .schedule("APP1", MessageType::LoanInitialApprovalNotification, Duration::ZERO)
            .await
            .unwrap();
        assert!(second.is_none());
        first.unwrap().await.unwrap();
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_terminal_status_drops_the_send() {
        let (scheduler, lifecycle, transport) = setup().await;
        let handle = scheduler
            .schedule("APP1", MessageType::LoanInitialApprovalNotification, Duration::from_millis(50))
            .await
            .unwrap()
            .unwrap();
        lifecycle.transition("APP1", LoanStatus::Cancelled).await.unwrap();
        handle.await.unwrap();

        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
        let mapping = lifecycle.require("APP1").await.unwrap();
        assert!(mapping.metadata.pending_notifications.is_empty());
        assert_eq!(mapping.status, LoanStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_recover_rearms_persisted_intents() {
        let (scheduler, lifecycle, transport) = setup().await;
        lifecycle
            .update("APP1", |m| {
                m.metadata.pending_notifications.push(PendingNotification {
                    message_type: MessageType::LoanInitialApprovalNotification,
                    due_at: Utc::now() - chrono::Duration::seconds(30),
                });
                Ok(())
            })
            .await
            .unwrap();

        let handles = scheduler.recover().await.unwrap();
        assert_eq!(handles.len(), 1);
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert!(scheduler.recover().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_deferrable_type_is_rejected() {
        let (scheduler, _, _) = setup().await;
        let err = scheduler
            .schedule("APP1", MessageType::LoanStatusResponse, Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::UnsupportedMessage(_)));
    }
}
