//! Wiring: builds every application service from configuration and adapters.

use super::delivery::{NotificationSender, RetryPolicy};
use super::dispatcher::Dispatcher;
use super::events::BankingEventListener;
use super::handlers::Services;
use super::ids::MessageIdGenerator;
use super::lifecycle::LoanLifecycle;
use super::notifications::DocumentComposer;
use super::operator::OperatorTriggers;
use super::scheduler::NotificationScheduler;
use crate::calculation::LoanCalculator;
use crate::config::{GatewayConfig, StorageConfig};
use crate::domain::ports::{
    CallbackTransportRef, CoreBankingRef, LoanStoreRef, MessageLogStoreRef, SnapshotStoreRef,
};
use crate::error::Result;
use crate::infrastructure::banking::HttpCoreBanking;
use crate::infrastructure::callback::HttpCallbackTransport;
use crate::infrastructure::in_memory::{InMemoryLoanStore, InMemoryMessageLog, InMemorySnapshotStore};
use crate::signature::SigningContext;
use std::sync::Arc;

/// The three persistent collections.
#[derive(Clone)]
pub struct Stores {
    pub loans: LoanStoreRef,
    pub log: MessageLogStoreRef,
    pub snapshots: SnapshotStoreRef,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            loans: Arc::new(InMemoryLoanStore::new()),
            log: Arc::new(InMemoryMessageLog::new()),
            snapshots: Arc::new(InMemorySnapshotStore::new()),
        }
    }

    #[cfg(feature = "storage-rocksdb")]
    pub fn rocksdb(path: &std::path::Path) -> Result<Self> {
        let store = crate::infrastructure::rocksdb::RocksDBStore::open(path)?;
        Ok(Self {
            loans: Arc::new(store.clone()),
            log: Arc::new(store.clone()),
            snapshots: Arc::new(store),
        })
    }

    pub fn open(config: &StorageConfig) -> Result<Self> {
        match config {
            StorageConfig::Memory => Ok(Self::in_memory()),
            #[cfg(feature = "storage-rocksdb")]
            StorageConfig::Rocksdb { path } => Self::rocksdb(path),
            #[cfg(not(feature = "storage-rocksdb"))]
            StorageConfig::Rocksdb { .. } => Err(crate::error::GatewayError::Storage(
                "built without the storage-rocksdb feature".to_string(),
            )),
        }
    }
}

/// Outbound adapters.
#[derive(Clone)]
pub struct Adapters {
    pub transport: CallbackTransportRef,
    pub banking: CoreBankingRef,
}

impl Adapters {
    pub fn http(config: &GatewayConfig) -> Result<Self> {
        Ok(Self {
            transport: Arc::new(HttpCallbackTransport::new(&config.counterparty)?),
            banking: Arc::new(HttpCoreBanking::new(config.banking.clone())?),
        })
    }
}

/// Every long-lived service of a running gateway.
#[derive(Clone)]
pub struct Gateway {
    pub dispatcher: Dispatcher,
    pub events: BankingEventListener,
    pub operator: OperatorTriggers,
    pub scheduler: NotificationScheduler,
    pub signer: Arc<SigningContext>,
    pub stores: Stores,
}

impl Gateway {
    pub fn assemble(
        config: &GatewayConfig,
        signer: Arc<SigningContext>,
        stores: Stores,
        adapters: Adapters,
    ) -> Self {
        let ids = Arc::new(MessageIdGenerator::new(&config.fsp.code));
        let lifecycle = LoanLifecycle::new(stores.loans.clone());
        let composer = DocumentComposer::new(signer.clone(), ids.clone(), config.fsp.clone());
        let sender = NotificationSender::new(
            adapters.transport.clone(),
            stores.log.clone(),
            lifecycle.clone(),
            RetryPolicy::from(&config.delivery),
        );
        let scheduler = NotificationScheduler::new(lifecycle.clone(), composer.clone(), sender.clone());

        let services = Services {
            lifecycle: lifecycle.clone(),
            calculator: LoanCalculator::new(config.loan.clone()),
            snapshots: stores.snapshots.clone(),
            banking: adapters.banking.clone(),
            scheduler: scheduler.clone(),
            ids,
            delays: config.delays.clone(),
            auto_disburse: config.banking.auto_disburse,
        };

        Self {
            dispatcher: Dispatcher::new(services, composer.clone(), stores.log.clone()),
            events: BankingEventListener::new(
                lifecycle.clone(),
                scheduler.clone(),
                config.delays.disbursement(),
            ),
            operator: OperatorTriggers::new(lifecycle, composer, sender),
            scheduler,
            signer,
            stores,
        }
    }

    /// Loads trust material, opens storage and connects the HTTP adapters.
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let signer = Arc::new(SigningContext::load(&config.signing));
        let stores = Stores::open(&config.storage)?;
        let adapters = Adapters::http(config)?;
        Ok(Self::assemble(config, signer, stores, adapters))
    }
}
