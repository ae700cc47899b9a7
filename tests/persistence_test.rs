#![cfg(feature = "storage-rocksdb")]

mod common;

use common::{document, eventually, gateway_with, response_code, test_config};
use fsp_gateway::application::Stores;
use fsp_gateway::domain::loan::LoanStatus;
use fsp_gateway::domain::message::MessageType;
use tempfile::tempdir;

const OFFER: &str = "<ApplicationNumber>APP9</ApplicationNumber><CheckNumber>CHK9</CheckNumber>\
    <DesiredDeductibleAmount>200000</DesiredDeductibleAmount><Tenure>60</Tenure>";

#[test]
fn test_pending_notification_survives_restart() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("gateway_db");

    // 1. First run: accept the offer, then shut down before the deferral elapses.
    {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let mut config = test_config();
            config.delays.loan_offer_secs = 1;
            let t = gateway_with(&config, Stores::rocksdb(&db_path).unwrap());
            let ack = t
                .gateway
                .dispatcher
                .dispatch(&document("LOAN_OFFER_REQUEST", "ESS1", OFFER))
                .await;
            assert_eq!(response_code(&ack.xml).as_deref(), Some("8000"));

            let mapping = t.gateway.dispatcher.services().lifecycle.require("APP9").await.unwrap();
            assert!(mapping.has_pending(MessageType::LoanInitialApprovalNotification));
            assert!(t.transport.posted.lock().unwrap().is_empty());
        });
        // Dropping the runtime cancels the sleeping task and releases the database.
    }

    // 2. Second run on the same database: recovery re-arms the rest of the delay and sends.
    let runtime = tokio::runtime::Runtime::new().unwrap();
    runtime.block_on(async {
        let t = gateway_with(&test_config(), Stores::rocksdb(&db_path).unwrap());
        let handles = t.gateway.scheduler.recover().await.unwrap();
        assert_eq!(handles.len(), 1);
        for handle in handles {
            handle.await.unwrap();
        }

        let lifecycle = t.gateway.dispatcher.services().lifecycle.clone();
        eventually(|| {
            let lifecycle = lifecycle.clone();
            async move {
                lifecycle.require("APP9").await.unwrap().status == LoanStatus::InitialApprovalSent
            }
        })
        .await;
        assert_eq!(t.transport.of_type("LOAN_INITIAL_APPROVAL_NOTIFICATION").len(), 1);
    });
}

#[tokio::test]
async fn test_message_log_is_durable() {
    use fsp_gateway::domain::ports::MessageLogStore;

    let dir = tempdir().unwrap();
    let db_path = dir.path().join("log_db");
    let stores = Stores::rocksdb(&db_path).unwrap();
    let t = gateway_with(&test_config(), stores.clone());
    t.gateway
        .dispatcher
        .dispatch(&document(
            "LOAN_STATUS_REQUEST",
            "ESS42",
            "<ApplicationNumber>APP404</ApplicationNumber>",
        ))
        .await;

    let entry = stores.log.get("ESS42").await.unwrap().unwrap();
    assert_eq!(entry.message_type, MessageType::LoanStatusRequest);
}
