use super::charges::ChargeCalculationSnapshot;
use super::loan::LoanMapping;
use super::message_log::{MessageLogEntry, MessageLogQuery};
use super::money::Money;
use crate::error::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::sync::Arc;

#[async_trait]
pub trait LoanMappingStore: Send + Sync {
    async fn get(&self, application_number: &str) -> Result<Option<LoanMapping>>;

    /// Stores `mapping` only when no record exists for its application number.
    /// Returns `false` if another writer got there first.
    async fn insert_if_absent(&self, mapping: LoanMapping) -> Result<bool>;

    /// Replaces the stored record if its version still equals `mapping.version`.
    /// The stored copy is written with the version bumped by one.
    async fn compare_and_swap(&self, mapping: LoanMapping) -> Result<bool>;

    async fn find_by_check_number(&self, check_number: &str) -> Result<Vec<LoanMapping>>;
    async fn find_by_mifos_loan_id(&self, loan_id: i64) -> Result<Option<LoanMapping>>;
    async fn find_by_loan_number(&self, loan_number: &str) -> Result<Option<LoanMapping>>;
    async fn list_with_pending_notifications(&self) -> Result<Vec<LoanMapping>>;
}

#[async_trait]
pub trait MessageLogStore: Send + Sync {
    /// Inserts or replaces the entry keyed by its message id.
    async fn record(&self, entry: MessageLogEntry) -> Result<()>;
    async fn get(&self, message_id: &str) -> Result<Option<MessageLogEntry>>;
    /// Matching entries, newest first.
    async fn list(&self, query: &MessageLogQuery) -> Result<Vec<MessageLogEntry>>;
}

#[async_trait]
pub trait ChargeSnapshotStore: Send + Sync {
    async fn put(&self, snapshot: ChargeCalculationSnapshot) -> Result<()>;
    async fn get(&self, check_number: &str) -> Result<Option<ChargeCalculationSnapshot>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Delivers a signed document to the counterparty callback endpoint.
#[async_trait]
pub trait CallbackTransport: Send + Sync {
    async fn post(&self, payload: &str) -> Result<TransportResponse>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewClient {
    pub external_id: String,
    pub full_name: String,
    pub first_name: String,
    pub last_name: String,
    pub mobile_number: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub activation_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewLoan {
    pub client_id: i64,
    pub external_id: String,
    pub principal: Money,
    pub tenure: u32,
    pub annual_rate: Decimal,
    pub submitted_on: NaiveDate,
}

/// The slice of the core banking engine this gateway drives.
#[async_trait]
pub trait CoreBanking: Send + Sync {
    async fn create_client(&self, client: &NewClient) -> Result<i64>;
    async fn create_loan(&self, loan: &NewLoan) -> Result<i64>;
    async fn approve_loan(&self, loan_id: i64, on: NaiveDate) -> Result<()>;
    async fn disburse_loan(&self, loan_id: i64, amount: Money, on: NaiveDate) -> Result<()>;
    /// Lengthens the repayment schedule by `extra_terms` installments from `on`.
    async fn reschedule_loan(&self, loan_id: i64, extra_terms: u32, on: NaiveDate) -> Result<()>;
}

pub type LoanStoreRef = Arc<dyn LoanMappingStore>;
pub type MessageLogStoreRef = Arc<dyn MessageLogStore>;
pub type SnapshotStoreRef = Arc<dyn ChargeSnapshotStore>;
pub type CallbackTransportRef = Arc<dyn CallbackTransport>;
pub type CoreBankingRef = Arc<dyn CoreBanking>;
