//! One handler per inbound message family.
//!
//! Handlers return a [`Reply`] describing the synchronous answer; the dispatcher signs it.
//! Anything slow (banking calls, deferred notifications) is spawned and never delays the reply.

pub mod approval;
pub mod balance;
pub mod charges;
pub mod offer;
pub mod restructure;
pub mod status;

use super::ids::MessageIdGenerator;
use super::lifecycle::LoanLifecycle;
use super::notifications::response_details;
use super::scheduler::NotificationScheduler;
use crate::calculation::LoanCalculator;
use crate::config::DelayConfig;
use crate::domain::message::{MessageType, ResponseCode};
use crate::domain::message_log::Correlation;
use crate::domain::ports::{CoreBankingRef, SnapshotStoreRef};
use crate::signature::XmlElement;
use std::sync::Arc;

/// Everything a handler may touch.
#[derive(Clone)]
pub struct Services {
    pub lifecycle: LoanLifecycle,
    pub calculator: LoanCalculator,
    pub snapshots: SnapshotStoreRef,
    pub banking: CoreBankingRef,
    pub scheduler: NotificationScheduler,
    pub ids: Arc<MessageIdGenerator>,
    pub delays: DelayConfig,
    pub auto_disburse: bool,
}

/// The synchronous answer to an inbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub message_type: MessageType,
    pub details: XmlElement,
    pub correlation: Correlation,
}

impl Reply {
    pub fn new(message_type: MessageType, details: XmlElement, correlation: Correlation) -> Self {
        Self {
            message_type,
            details,
            correlation,
        }
    }

    /// A `RESPONSE` with code 8000.
    pub fn ack(description: &str, correlation: Correlation) -> Self {
        Self::new(
            MessageType::Response,
            response_details(ResponseCode::Success, description),
            correlation,
        )
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fixtures shared by the handler tests.

    use super::*;
    use crate::application::delivery::{NotificationSender, RetryPolicy};
    use crate::application::notifications::DocumentComposer;
    use crate::config::FspConfig;
    use crate::domain::money::Money;
    use crate::domain::ports::{
        CallbackTransport, CoreBanking, NewClient, NewLoan, TransportResponse,
    };
    use crate::error::{GatewayError, Result};
    use crate::infrastructure::in_memory::{
        InMemoryLoanStore, InMemoryMessageLog, InMemorySnapshotStore,
    };
    use crate::signature::SigningContext;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use rsa::{RsaPrivateKey, RsaPublicKey};
    use std::sync::Mutex;
    use std::sync::OnceLock;
    use std::time::Duration;

    pub fn key() -> &'static RsaPrivateKey {
        static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
        KEY.get_or_init(|| RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap())
    }

    /// Records every call and fails the ones named in `fail_on`.
    #[derive(Default)]
    pub struct FakeBanking {
        pub calls: Mutex<Vec<String>>,
        pub fail_on: Option<&'static str>,
    }

    impl FakeBanking {
        pub fn failing(stage: &'static str) -> Self {
            Self {
                fail_on: Some(stage),
                ..Default::default()
            }
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn call(&self, name: &str) -> Result<()> {
            self.calls.lock().unwrap().push(name.to_string());
            if self.fail_on.is_some_and(|stage| name.starts_with(stage)) {
                return Err(GatewayError::Banking(format!("{name} refused")));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl CoreBanking for FakeBanking {
        async fn create_client(&self, _client: &NewClient) -> Result<i64> {
            self.call("create_client")?;
            Ok(11)
        }

        async fn create_loan(&self, _loan: &NewLoan) -> Result<i64> {
            self.call("create_loan")?;
            Ok(22)
        }

        async fn approve_loan(&self, _loan_id: i64, _on: NaiveDate) -> Result<()> {
            self.call("approve_loan")
        }

        async fn disburse_loan(&self, _loan_id: i64, _amount: Money, _on: NaiveDate) -> Result<()> {
            self.call("disburse_loan")
        }

        async fn reschedule_loan(&self, _loan_id: i64, extra_terms: u32, _on: NaiveDate) -> Result<()> {
            self.call(&format!("reschedule_loan:{extra_terms}"))
        }
    }

    #[derive(Default)]
    pub struct OkTransport {
        pub posted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CallbackTransport for OkTransport {
        async fn post(&self, payload: &str) -> Result<TransportResponse> {
            self.posted.lock().unwrap().push(payload.to_string());
            Ok(TransportResponse {
                status: 200,
                body: String::new(),
            })
        }
    }

    pub struct Fixture {
        pub services: Services,
        pub banking: Arc<FakeBanking>,
        pub transport: Arc<OkTransport>,
        pub composer: DocumentComposer,
        pub log: Arc<InMemoryMessageLog>,
    }

    /// Services over in-memory stores with every delay at zero.
    pub fn fixture_with(banking: FakeBanking) -> Fixture {
        let lifecycle = LoanLifecycle::new(Arc::new(InMemoryLoanStore::new()));
        let banking = Arc::new(banking);
        let transport = Arc::new(OkTransport::default());
        let log = Arc::new(InMemoryMessageLog::new());
        let ids = Arc::new(MessageIdGenerator::new("FL0001"));
        let composer = DocumentComposer::new(
            Arc::new(SigningContext::new(
                Some(key().clone()),
                Some(RsaPublicKey::from(key())),
                None,
            )),
            ids.clone(),
            FspConfig::default(),
        );
        let sender = NotificationSender::new(
            transport.clone(),
            log.clone(),
            lifecycle.clone(),
            RetryPolicy {
                max_attempts: 1,
                backoff: Duration::ZERO,
            },
        );
        let scheduler = NotificationScheduler::new(lifecycle.clone(), composer.clone(), sender);
        let services = Services {
            lifecycle,
            calculator: LoanCalculator::default(),
            snapshots: Arc::new(InMemorySnapshotStore::new()),
            banking: banking.clone(),
            scheduler,
            ids,
            delays: DelayConfig {
                loan_offer_secs: 0,
                top_up_offer_secs: 0,
                takeover_offer_secs: 0,
                restructure_secs: 0,
                disbursement_secs: 0,
            },
            auto_disburse: true,
        };
        Fixture {
            services,
            banking,
            transport,
            composer,
            log,
        }
    }

    pub fn fixture() -> Fixture {
        fixture_with(FakeBanking::default())
    }

    /// Polls until `check` holds, for background work spawned by a handler.
    pub async fn eventually<F, Fut>(check: F)
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..200 {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }
}
