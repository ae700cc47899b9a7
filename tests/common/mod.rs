#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use fsp_gateway::application::{Adapters, Gateway, Stores};
use fsp_gateway::config::{DelayConfig, DeliveryConfig, GatewayConfig};
use fsp_gateway::domain::money::Money;
use fsp_gateway::domain::ports::{CallbackTransport, CoreBanking, NewClient, NewLoan, TransportResponse};
use fsp_gateway::error::Result;
use fsp_gateway::signature::canonical::parse;
use fsp_gateway::signature::envelope::body;
use fsp_gateway::signature::{Envelope, Header, SigningContext, build_signed_document};
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

pub fn key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap())
}

/// Signs with the shared test key and trusts documents signed by it.
pub fn signer() -> SigningContext {
    SigningContext::new(Some(key().clone()), Some(RsaPublicKey::from(key())), None)
}

/// Defaults with every deferral and backoff at zero.
pub fn test_config() -> GatewayConfig {
    GatewayConfig {
        delays: DelayConfig {
            loan_offer_secs: 0,
            top_up_offer_secs: 0,
            takeover_offer_secs: 0,
            restructure_secs: 0,
            disbursement_secs: 0,
        },
        delivery: DeliveryConfig {
            max_attempts: 2,
            backoff_secs: 0,
        },
        ..Default::default()
    }
}

#[derive(Default)]
pub struct RecordingBanking {
    pub calls: Mutex<Vec<String>>,
}

impl RecordingBanking {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CoreBanking for RecordingBanking {
    async fn create_client(&self, client: &NewClient) -> Result<i64> {
        self.calls.lock().unwrap().push(format!("client:{}", client.external_id));
        Ok(501)
    }

    async fn create_loan(&self, loan: &NewLoan) -> Result<i64> {
        self.calls.lock().unwrap().push(format!("loan:{}", loan.tenure));
        Ok(902)
    }

    async fn approve_loan(&self, loan_id: i64, _on: NaiveDate) -> Result<()> {
        self.calls.lock().unwrap().push(format!("approve:{loan_id}"));
        Ok(())
    }

    async fn disburse_loan(&self, loan_id: i64, _amount: Money, _on: NaiveDate) -> Result<()> {
        self.calls.lock().unwrap().push(format!("disburse:{loan_id}"));
        Ok(())
    }

    async fn reschedule_loan(&self, loan_id: i64, extra_terms: u32, _on: NaiveDate) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("reschedule:{loan_id}:{extra_terms}"));
        Ok(())
    }
}

/// Accepts every callback and keeps the parsed documents.
#[derive(Default)]
pub struct RecordingTransport {
    pub posted: Mutex<Vec<String>>,
}

impl RecordingTransport {
    pub fn documents(&self) -> Vec<Envelope> {
        self.posted
            .lock()
            .unwrap()
            .iter()
            .map(|xml| Envelope::parse(xml).unwrap())
            .collect()
    }

    pub fn of_type(&self, message_type: &str) -> Vec<Envelope> {
        self.documents()
            .into_iter()
            .filter(|e| e.header.message_type == message_type)
            .collect()
    }
}

#[async_trait]
impl CallbackTransport for RecordingTransport {
    async fn post(&self, payload: &str) -> Result<TransportResponse> {
        self.posted.lock().unwrap().push(payload.to_string());
        Ok(TransportResponse {
            status: 200,
            body: String::new(),
        })
    }
}

pub struct TestGateway {
    pub gateway: Gateway,
    pub banking: Arc<RecordingBanking>,
    pub transport: Arc<RecordingTransport>,
}

pub fn gateway_with(config: &GatewayConfig, stores: Stores) -> TestGateway {
    let banking = Arc::new(RecordingBanking::default());
    let transport = Arc::new(RecordingTransport::default());
    let adapters = Adapters {
        transport: transport.clone(),
        banking: banking.clone(),
    };
    let gateway = Gateway::assemble(config, Arc::new(signer()), stores, adapters);
    TestGateway {
        gateway,
        banking,
        transport,
    }
}

pub fn gateway() -> TestGateway {
    gateway_with(&test_config(), Stores::in_memory())
}

/// A counterparty document of type `tag` carrying `details`, signed with the test key.
pub fn document(tag: &str, msg_id: &str, details: &str) -> String {
    let header = Header {
        sender: "ESS_UTUMISHI".into(),
        receiver: "FSP".into(),
        fsp_code: "FL0000".into(),
        msg_id: msg_id.into(),
        message_type: tag.into(),
    };
    let details = parse(&format!("<MessageDetails>{details}</MessageDetails>")).unwrap();
    build_signed_document(&body(&header, details), &signer()).unwrap()
}

pub fn response_code(xml: &str) -> Option<String> {
    Envelope::parse(xml).unwrap().details.child_text("ResponseCode")
}

/// Polls until `check` holds, for work the gateway finishes in the background.
pub async fn eventually<F, Fut>(check: F)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..300 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}
