use crate::domain::charges::ChargeCalculationSnapshot;
use crate::domain::loan::LoanMapping;
use crate::domain::message_log::{MessageLogEntry, MessageLogQuery};
use crate::domain::ports::{ChargeSnapshotStore, LoanMappingStore, MessageLogStore};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory store for loan mappings.
///
/// Uses `Arc<RwLock<HashMap<String, LoanMapping>>>` keyed by application number. The write
/// lock is held across the version check and the replace, which is what makes
/// `compare_and_swap` atomic.
#[derive(Default, Clone)]
pub struct InMemoryLoanStore {
    mappings: Arc<RwLock<HashMap<String, LoanMapping>>>,
}

impl InMemoryLoanStore {
    /// Creates a new, empty in-memory loan store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LoanMappingStore for InMemoryLoanStore {
    async fn get(&self, application_number: &str) -> Result<Option<LoanMapping>> {
        let mappings = self.mappings.read().await;
        Ok(mappings.get(application_number).cloned())
    }

    async fn insert_if_absent(&self, mapping: LoanMapping) -> Result<bool> {
        let mut mappings = self.mappings.write().await;
        match mappings.entry(mapping.application_number.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(mapping);
                Ok(true)
            }
        }
    }

    async fn compare_and_swap(&self, mut mapping: LoanMapping) -> Result<bool> {
        let mut mappings = self.mappings.write().await;
        match mappings.get_mut(&mapping.application_number) {
            Some(current) if current.version == mapping.version => {
                mapping.version += 1;
                *current = mapping;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_by_check_number(&self, check_number: &str) -> Result<Vec<LoanMapping>> {
        let mappings = self.mappings.read().await;
        let mut found: Vec<LoanMapping> = mappings
            .values()
            .filter(|m| m.check_number == check_number)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn find_by_mifos_loan_id(&self, loan_id: i64) -> Result<Option<LoanMapping>> {
        let mappings = self.mappings.read().await;
        Ok(mappings
            .values()
            .find(|m| m.mifos_loan_id == Some(loan_id))
            .cloned())
    }

    async fn find_by_loan_number(&self, loan_number: &str) -> Result<Option<LoanMapping>> {
        let mappings = self.mappings.read().await;
        Ok(mappings
            .values()
            .find(|m| m.loan_number_alias == loan_number)
            .cloned())
    }

    async fn list_with_pending_notifications(&self) -> Result<Vec<LoanMapping>> {
        let mappings = self.mappings.read().await;
        Ok(mappings
            .values()
            .filter(|m| !m.metadata.pending_notifications.is_empty())
            .cloned()
            .collect())
    }
}

/// A thread-safe in-memory message log.
#[derive(Default, Clone)]
pub struct InMemoryMessageLog {
    entries: Arc<RwLock<HashMap<String, MessageLogEntry>>>,
}

impl InMemoryMessageLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageLogStore for InMemoryMessageLog {
    async fn record(&self, entry: MessageLogEntry) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(entry.message_id.clone(), entry);
        Ok(())
    }

    async fn get(&self, message_id: &str) -> Result<Option<MessageLogEntry>> {
        let entries = self.entries.read().await;
        Ok(entries.get(message_id).cloned())
    }

    async fn list(&self, query: &MessageLogQuery) -> Result<Vec<MessageLogEntry>> {
        let entries = self.entries.read().await;
        let mut found: Vec<MessageLogEntry> = entries
            .values()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.message_id.cmp(&a.message_id))
        });
        if let Some(limit) = query.limit {
            found.truncate(limit);
        }
        Ok(found)
    }
}

/// A thread-safe in-memory store for the latest charge calculation per check number.
#[derive(Default, Clone)]
pub struct InMemorySnapshotStore {
    snapshots: Arc<RwLock<HashMap<String, ChargeCalculationSnapshot>>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChargeSnapshotStore for InMemorySnapshotStore {
    async fn put(&self, snapshot: ChargeCalculationSnapshot) -> Result<()> {
        let mut snapshots = self.snapshots.write().await;
        snapshots.insert(snapshot.check_number.clone(), snapshot);
        Ok(())
    }

    async fn get(&self, check_number: &str) -> Result<Option<ChargeCalculationSnapshot>> {
        let snapshots = self.snapshots.read().await;
        Ok(snapshots.get(check_number).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::loan::PendingNotification;
    use crate::domain::message::{Direction, MessageType};
    use crate::domain::message_log::{Correlation, DeliveryStatus};
    use chrono::Utc;

    #[tokio::test]
    async fn test_insert_if_absent_is_idempotent() {
        let store = InMemoryLoanStore::new();
        let mapping = LoanMapping::new("APP1", "CHK1", MessageType::LoanOfferRequest);

        assert!(store.insert_if_absent(mapping.clone()).await.unwrap());
        assert!(!store.insert_if_absent(mapping).await.unwrap());
        assert_eq!(store.find_by_check_number("CHK1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_compare_and_swap_rejects_stale_version() {
        let store = InMemoryLoanStore::new();
        let mapping = LoanMapping::new("APP1", "CHK1", MessageType::LoanOfferRequest);
        store.insert_if_absent(mapping.clone()).await.unwrap();

        let mut first = mapping.clone();
        first.tenure = 24;
        assert!(store.compare_and_swap(first).await.unwrap());

        let mut stale = mapping;
        stale.tenure = 36;
        assert!(!store.compare_and_swap(stale).await.unwrap());

        let stored = store.get("APP1").await.unwrap().unwrap();
        assert_eq!(stored.tenure, 24);
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn test_compare_and_swap_on_missing_record() {
        let store = InMemoryLoanStore::new();
        let mapping = LoanMapping::new("APP1", "CHK1", MessageType::LoanOfferRequest);
        assert!(!store.compare_and_swap(mapping).await.unwrap());
    }

    #[tokio::test]
    async fn test_secondary_lookups() {
        let store = InMemoryLoanStore::new();
        let mut mapping = LoanMapping::new("APP1", "CHK1", MessageType::LoanOfferRequest);
        mapping.mifos_loan_id = Some(42);
        mapping.loan_number_alias = "FL0000LN1".into();
        mapping.metadata.pending_notifications.push(PendingNotification {
            message_type: MessageType::LoanInitialApprovalNotification,
            due_at: Utc::now(),
        });
        store.insert_if_absent(mapping).await.unwrap();
        store
            .insert_if_absent(LoanMapping::new("APP2", "CHK2", MessageType::LoanOfferRequest))
            .await
            .unwrap();

        assert_eq!(
            store.find_by_mifos_loan_id(42).await.unwrap().unwrap().application_number,
            "APP1"
        );
        assert!(store.find_by_mifos_loan_id(7).await.unwrap().is_none());
        assert!(store.find_by_loan_number("FL0000LN1").await.unwrap().is_some());
        assert_eq!(store.list_with_pending_notifications().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_message_log_filters_and_orders() {
        let log = InMemoryMessageLog::new();
        for (i, app) in ["APP1", "APP2", "APP1"].iter().enumerate() {
            let mut entry = MessageLogEntry::new(
                format!("MSG{i}"),
                MessageType::LoanInitialApprovalNotification,
                Direction::Outbound,
                "<Document/>",
                Correlation::for_application(*app),
            );
            entry.created_at += chrono::Duration::seconds(i as i64);
            log.record(entry).await.unwrap();
        }

        let query = MessageLogQuery {
            application_number: Some("APP1".into()),
            ..Default::default()
        };
        let found = log.list(&query).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].message_id, "MSG2");

        let mut updated = log.get("MSG0").await.unwrap().unwrap();
        updated.status = DeliveryStatus::Sent;
        log.record(updated).await.unwrap();
        let sent = log
            .list(&MessageLogQuery {
                status: Some(DeliveryStatus::Sent),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(sent.len(), 1);
    }
}
