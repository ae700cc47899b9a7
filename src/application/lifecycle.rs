//! Authoritative per-application state, written only through optimistic compare-and-swap.

use crate::domain::loan::{CallbackEvent, LoanMapping, LoanStatus, PendingNotification};
use crate::domain::message::MessageType;
use crate::domain::ports::LoanStoreRef;
use crate::error::{GatewayError, Result};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};

const MAX_WRITE_ATTEMPTS: u32 = 64;

/// Moves `mapping` to `to`. Re-entering the current status is a no-op.
pub fn advance(mapping: &mut LoanMapping, to: LoanStatus) -> Result<()> {
    if mapping.status == to {
        return Ok(());
    }
    if !mapping.status.can_transition_to(to) {
        return Err(GatewayError::InvalidTransition {
            from: mapping.status,
            to,
        });
    }
    mapping.status = to;
    Ok(())
}

#[derive(Clone)]
pub struct LoanLifecycle {
    store: LoanStoreRef,
}

impl LoanLifecycle {
    pub fn new(store: LoanStoreRef) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &LoanStoreRef {
        &self.store
    }

    pub async fn get(&self, application_number: &str) -> Result<Option<LoanMapping>> {
        self.store.get(application_number).await
    }

    /// Like [`Self::get`] but a missing application is an error.
    pub async fn require(&self, application_number: &str) -> Result<LoanMapping> {
        self.store
            .get(application_number)
            .await?
            .ok_or_else(|| GatewayError::NotFound(application_number.to_string()))
    }

    /// Creates the mapping with `create` when absent, then applies `apply` to the stored copy.
    ///
    /// `apply` may run more than once if another writer wins a race, so it must only derive
    /// the new state from its argument.
    pub async fn upsert<C, F>(&self, application_number: &str, create: C, apply: F) -> Result<LoanMapping>
    where
        C: Fn() -> LoanMapping,
        F: Fn(&mut LoanMapping) -> Result<()>,
    {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            match self.store.get(application_number).await? {
                None => {
                    let mut mapping = create();
                    apply(&mut mapping)?;
                    if self.store.insert_if_absent(mapping.clone()).await? {
                        return Ok(mapping);
                    }
                }
                Some(mapping) => {
                    if let Some(written) = self.try_write(mapping, &apply).await? {
                        return Ok(written);
                    }
                }
            }
        }
        Err(contention(application_number))
    }

    /// Applies `apply` to an existing mapping, retrying on version conflicts.
    pub async fn update<F>(&self, application_number: &str, apply: F) -> Result<LoanMapping>
    where
        F: Fn(&mut LoanMapping) -> Result<()>,
    {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let mapping = self.require(application_number).await?;
            if let Some(written) = self.try_write(mapping, &apply).await? {
                return Ok(written);
            }
        }
        Err(contention(application_number))
    }

    async fn try_write<F>(&self, mut mapping: LoanMapping, apply: &F) -> Result<Option<LoanMapping>>
    where
        F: Fn(&mut LoanMapping) -> Result<()>,
    {
        let before = mapping.clone();
        apply(&mut mapping)?;
        if mapping == before {
            return Ok(Some(mapping));
        }
        mapping.updated_at = Utc::now();
        if self.store.compare_and_swap(mapping.clone()).await? {
            mapping.version += 1;
            Ok(Some(mapping))
        } else {
            Ok(None)
        }
    }

    pub async fn transition(&self, application_number: &str, to: LoanStatus) -> Result<LoanMapping> {
        let mapping = self.update(application_number, |m| advance(m, to)).await?;
        tracing::info!(application_number, status = %mapping.status, "loan status updated");
        Ok(mapping)
    }

    /// Marks the application `FAILED` with an error marker for `stage`.
    ///
    /// A mapping already in a terminal state keeps its status and only gains the marker.
    pub async fn record_failure(&self, application_number: &str, stage: &str, error: &str) -> Result<LoanMapping> {
        tracing::error!(application_number, stage, error, "downstream failure recorded");
        self.update(application_number, |m| {
            m.record_error(stage, error);
            if !m.status.is_terminal() {
                m.status = LoanStatus::Failed;
            }
            Ok(())
        })
        .await
    }

    /// Adds an error marker for `stage` without touching the status.
    pub async fn record_error(&self, application_number: &str, stage: &str, error: &str) -> Result<LoanMapping> {
        tracing::warn!(application_number, stage, error, "downstream error recorded");
        self.update(application_number, |m| {
            m.record_error(stage, error);
            Ok(())
        })
        .await
    }

    pub async fn record_callback(&self, application_number: &str, event: CallbackEvent) -> Result<LoanMapping> {
        self.update(application_number, |m| {
            m.metadata.callbacks_sent.push(event.clone());
            Ok(())
        })
        .await
    }

    /// Persists the intent to send `message_type` at `due_at`.
    ///
    /// Returns `false` when the same intent was already pending.
    pub async fn add_pending(
        &self,
        application_number: &str,
        message_type: MessageType,
        due_at: DateTime<Utc>,
    ) -> Result<bool> {
        let inserted = AtomicBool::new(false);
        self.update(application_number, |m| {
            let fresh = !m.has_pending(message_type);
            if fresh {
                m.metadata
                    .pending_notifications
                    .push(PendingNotification { message_type, due_at });
            }
            inserted.store(fresh, Ordering::Relaxed);
            Ok(())
        })
        .await?;
        Ok(inserted.load(Ordering::Relaxed))
    }

    pub async fn clear_pending(&self, application_number: &str, message_type: MessageType) -> Result<()> {
        self.update(application_number, |m| {
            m.metadata
                .pending_notifications
                .retain(|p| p.message_type != message_type);
            Ok(())
        })
        .await?;
        Ok(())
    }
}

fn contention(application_number: &str) -> GatewayError {
    GatewayError::Storage(format!(
        "gave up writing {application_number} after {MAX_WRITE_ATTEMPTS} conflicting attempts"
    ))
}
