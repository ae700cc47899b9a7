use crate::domain::charges::ChargeCalculationSnapshot;
use crate::domain::loan::LoanMapping;
use crate::domain::message_log::{MessageLogEntry, MessageLogQuery};
use crate::domain::ports::{ChargeSnapshotStore, LoanMappingStore, MessageLogStore};
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for loan mappings, keyed by application number.
pub const CF_LOAN_MAPPINGS: &str = "loan_mappings";
/// Column Family for wire message log entries, keyed by message id.
pub const CF_MESSAGE_LOGS: &str = "message_logs";
/// Column Family for charge snapshots, keyed by check number.
pub const CF_CHARGE_SNAPSHOTS: &str = "charge_snapshots";

/// A persistent store implementation using RocksDB.
///
/// Loan mappings, message log entries and charge snapshots live in separate Column Families
/// as JSON values. Secondary lookups scan the column family.
///
/// RocksDB has no compare-and-swap primitive, so conditional writes to loan mappings are
/// serialized through `write_lock`. Plain puts do not take it.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the three column families exist.
    ///
    /// # Arguments
    ///
    /// * `path` - The filesystem path where the database will be stored.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = [CF_LOAN_MAPPINGS, CF_MESSAGE_LOGS, CF_CHARGE_SNAPSHOTS]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| GatewayError::Storage(format!("column family {name} not found")))
    }

    fn read<T: DeserializeOwned>(&self, cf_name: &str, key: &str) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_pinned_cf(cf, key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write<T: Serialize>(&self, cf_name: &str, key: &str, value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        let bytes = serde_json::to_vec(value)?;
        self.db.put_cf(cf, key.as_bytes(), bytes)?;
        Ok(())
    }

    /// Every value in `cf_name` accepted by `keep`.
    fn scan<T, F>(&self, cf_name: &str, mut keep: F) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
        F: FnMut(&T) -> bool,
    {
        let cf = self.cf(cf_name)?;
        let mut found = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            let record: T = serde_json::from_slice(&value)?;
            if keep(&record) {
                found.push(record);
            }
        }
        Ok(found)
    }
}

#[async_trait]
impl LoanMappingStore for RocksDBStore {
    async fn get(&self, application_number: &str) -> Result<Option<LoanMapping>> {
        self.read(CF_LOAN_MAPPINGS, application_number)
    }

    async fn insert_if_absent(&self, mapping: LoanMapping) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let existing: Option<LoanMapping> = self.read(CF_LOAN_MAPPINGS, &mapping.application_number)?;
        if existing.is_some() {
            return Ok(false);
        }
        self.write(CF_LOAN_MAPPINGS, &mapping.application_number, &mapping)?;
        Ok(true)
    }

    async fn compare_and_swap(&self, mut mapping: LoanMapping) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let current: Option<LoanMapping> = self.read(CF_LOAN_MAPPINGS, &mapping.application_number)?;
        match current {
            Some(current) if current.version == mapping.version => {
                mapping.version += 1;
                self.write(CF_LOAN_MAPPINGS, &mapping.application_number, &mapping)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_by_check_number(&self, check_number: &str) -> Result<Vec<LoanMapping>> {
        let mut found = self.scan(CF_LOAN_MAPPINGS, |m: &LoanMapping| m.check_number == check_number)?;
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn find_by_mifos_loan_id(&self, loan_id: i64) -> Result<Option<LoanMapping>> {
        let found = self.scan(CF_LOAN_MAPPINGS, |m: &LoanMapping| m.mifos_loan_id == Some(loan_id))?;
        Ok(found.into_iter().next())
    }

    async fn find_by_loan_number(&self, loan_number: &str) -> Result<Option<LoanMapping>> {
        let found = self.scan(CF_LOAN_MAPPINGS, |m: &LoanMapping| m.loan_number_alias == loan_number)?;
        Ok(found.into_iter().next())
    }

    async fn list_with_pending_notifications(&self) -> Result<Vec<LoanMapping>> {
        self.scan(CF_LOAN_MAPPINGS, |m: &LoanMapping| {
            !m.metadata.pending_notifications.is_empty()
        })
    }
}

#[async_trait]
impl MessageLogStore for RocksDBStore {
    async fn record(&self, entry: MessageLogEntry) -> Result<()> {
        self.write(CF_MESSAGE_LOGS, &entry.message_id, &entry)
    }

    async fn get(&self, message_id: &str) -> Result<Option<MessageLogEntry>> {
        self.read(CF_MESSAGE_LOGS, message_id)
    }

    async fn list(&self, query: &MessageLogQuery) -> Result<Vec<MessageLogEntry>> {
        let mut found = self.scan(CF_MESSAGE_LOGS, |e: &MessageLogEntry| query.matches(e))?;
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

#[async_trait]
impl ChargeSnapshotStore for RocksDBStore {
    async fn put(&self, snapshot: ChargeCalculationSnapshot) -> Result<()> {
        self.write(CF_CHARGE_SNAPSHOTS, &snapshot.check_number, &snapshot)
    }

    async fn get(&self, check_number: &str) -> Result<Option<ChargeCalculationSnapshot>> {
        self.read(CF_CHARGE_SNAPSHOTS, check_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::{Direction, MessageType};
    use crate::domain::message_log::Correlation;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).expect("Failed to open RocksDB");

        assert!(store.db.cf_handle(CF_LOAN_MAPPINGS).is_some());
        assert!(store.db.cf_handle(CF_MESSAGE_LOGS).is_some());
        assert!(store.db.cf_handle(CF_CHARGE_SNAPSHOTS).is_some());
    }

    #[tokio::test]
    async fn test_rocksdb_loan_store_cas() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let mapping = LoanMapping::new("APP1", "CHK1", MessageType::LoanOfferRequest);

        assert!(store.insert_if_absent(mapping.clone()).await.unwrap());
        assert!(!store.insert_if_absent(mapping.clone()).await.unwrap());

        let mut updated = mapping.clone();
        updated.mifos_loan_id = Some(9);
        assert!(store.compare_and_swap(updated).await.unwrap());
        assert!(!store.compare_and_swap(mapping).await.unwrap());

        let stored = LoanMappingStore::get(&store, "APP1").await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(
            store.find_by_mifos_loan_id(9).await.unwrap().unwrap().application_number,
            "APP1"
        );
    }

    #[tokio::test]
    async fn test_rocksdb_message_log() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let entry = MessageLogEntry::new(
            "MSG1",
            MessageType::Response,
            Direction::Outbound,
            "<Document/>",
            Correlation::for_application("APP1"),
        );

        store.record(entry.clone()).await.unwrap();
        let retrieved = MessageLogStore::get(&store, "MSG1").await.unwrap().unwrap();
        assert_eq!(retrieved, entry);

        let listed = store.list(&MessageLogQuery::default()).await.unwrap();
        assert_eq!(listed.len(), 1);
    }
}
