use super::charges::Charges;
use super::message::{MessageType, OfferVariant};
use super::money::Money;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoanStatus {
    InitialOffer,
    InitialApprovalSent,
    LoanCreated,
    Disbursed,
    RestructurePending,
    RestructureApproved,
    Cancelled,
    Rejected,
    Failed,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::InitialOffer => "INITIAL_OFFER",
            LoanStatus::InitialApprovalSent => "INITIAL_APPROVAL_SENT",
            LoanStatus::LoanCreated => "LOAN_CREATED",
            LoanStatus::Disbursed => "DISBURSED",
            LoanStatus::RestructurePending => "RESTRUCTURE_PENDING",
            LoanStatus::RestructureApproved => "RESTRUCTURE_APPROVED",
            LoanStatus::Cancelled => "CANCELLED",
            LoanStatus::Rejected => "REJECTED",
            LoanStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LoanStatus::Cancelled | LoanStatus::Rejected | LoanStatus::Failed
        )
    }

    /// Statuses from which a restructure may be requested.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            LoanStatus::InitialApprovalSent | LoanStatus::LoanCreated | LoanStatus::Disbursed
        )
    }

    pub fn can_transition_to(&self, next: LoanStatus) -> bool {
        use LoanStatus::*;
        if self.is_terminal() {
            return false;
        }
        match (*self, next) {
            (_, Cancelled | Rejected | Failed) => true,
            (InitialOffer, InitialApprovalSent) => true,
            (InitialApprovalSent, LoanCreated) => true,
            (LoanCreated, Disbursed) => true,
            (current, RestructurePending) => current.is_active(),
            (RestructurePending, RestructureApproved) => true,
            (RestructureApproved, InitialApprovalSent) => true,
            _ => false,
        }
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackStatus {
    Sent,
    SentAfterRetry,
    Failed,
}

/// One delivery of an outbound notification for this application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackEvent {
    pub message_type: MessageType,
    pub message_id: String,
    pub sent_at: DateTime<Utc>,
    pub status: CallbackStatus,
    pub attempts: u32,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceRequest {
    pub message_id: String,
    pub requested_at: DateTime<Utc>,
    pub installments_paid: u32,
    pub outstanding_balance: Money,
}

/// A deferred notification that has been promised but not yet fired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingNotification {
    pub message_type: MessageType,
    pub due_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMarker {
    pub stage: String,
    pub error: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientSnapshot {
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub sex: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub marital_status: Option<String>,
    pub national_id: Option<String>,
    pub mobile_number: Option<String>,
    pub email: Option<String>,
    pub bank_account_number: Option<String>,
    pub swift_code: Option<String>,
}

impl ClientSnapshot {
    pub fn full_name(&self) -> String {
        [&self.first_name, &self.middle_name, &self.last_name]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmploymentSnapshot {
    pub check_number: String,
    pub designation_code: Option<String>,
    pub designation_name: Option<String>,
    pub vote_code: Option<String>,
    pub vote_name: Option<String>,
    pub basic_salary: Option<Money>,
    pub net_salary: Option<Money>,
    pub one_third_amount: Option<Money>,
    pub employment_date: Option<NaiveDate>,
    pub retirement_date: Option<NaiveDate>,
    pub terms_of_employment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanSnapshot {
    pub variant: OfferVariant,
    pub product_code: Option<String>,
    pub loan_purpose: Option<String>,
    pub desired_deductible_amount: Option<Money>,
    pub existing_loan_number: Option<String>,
    pub settlement_amount: Option<Money>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestructureDetails {
    pub requested_tenure: Option<u32>,
    pub requested_amount: Option<Money>,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoanMetadata {
    pub client: Option<ClientSnapshot>,
    pub employment: Option<EmploymentSnapshot>,
    pub loan: Option<LoanSnapshot>,
    #[serde(default)]
    pub callbacks_sent: Vec<CallbackEvent>,
    #[serde(default)]
    pub balance_requests: Vec<BalanceRequest>,
    #[serde(default)]
    pub pending_notifications: Vec<PendingNotification>,
    #[serde(default)]
    pub errors: Vec<ErrorMarker>,
    pub restructure: Option<RestructureDetails>,
    pub rejection_reason: Option<String>,
    pub cancellation_reason: Option<String>,
    pub liquidated_at: Option<DateTime<Utc>>,
    pub disbursed_at: Option<DateTime<Utc>>,
    /// Set once by the final approval that starts banking provisioning.
    #[serde(default)]
    pub provisioning_started_at: Option<DateTime<Utc>>,
}

/// The durable record of one counterparty loan application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanMapping {
    pub application_number: String,
    pub check_number: String,
    pub fsp_reference_number: String,
    pub loan_number_alias: String,
    pub mifos_client_id: Option<i64>,
    pub mifos_loan_id: Option<i64>,
    pub status: LoanStatus,
    pub requested_amount: Money,
    pub eligible_amount: Money,
    pub tenure: u32,
    pub interest_rate: Decimal,
    pub monthly_installment: Money,
    pub charges: Charges,
    pub total_amount_to_pay: Money,
    pub original_message_type: MessageType,
    pub metadata: LoanMetadata,
    /// Bumped on every successful write; used for compare-and-swap updates.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LoanMapping {
    pub fn new(
        application_number: impl Into<String>,
        check_number: impl Into<String>,
        original_message_type: MessageType,
    ) -> Self {
        let now = Utc::now();
        Self {
            application_number: application_number.into(),
            check_number: check_number.into(),
            fsp_reference_number: String::new(),
            loan_number_alias: String::new(),
            mifos_client_id: None,
            mifos_loan_id: None,
            status: LoanStatus::InitialOffer,
            requested_amount: Money::ZERO,
            eligible_amount: Money::ZERO,
            tenure: 0,
            interest_rate: Decimal::ZERO,
            monthly_installment: Money::ZERO,
            charges: Charges::default(),
            total_amount_to_pay: Money::ZERO,
            original_message_type,
            metadata: LoanMetadata::default(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_pending(&self, message_type: MessageType) -> bool {
        self.metadata
            .pending_notifications
            .iter()
            .any(|p| p.message_type == message_type)
    }

    pub fn last_callback(&self, message_type: MessageType) -> Option<&CallbackEvent> {
        self.metadata
            .callbacks_sent
            .iter()
            .rev()
            .find(|c| c.message_type == message_type)
    }

    pub fn record_error(&mut self, stage: &str, error: impl Into<String>) {
        self.metadata.errors.push(ErrorMarker {
            stage: stage.to_string(),
            error: error.into(),
            at: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_main_line_transitions() {
        assert!(LoanStatus::InitialOffer.can_transition_to(LoanStatus::InitialApprovalSent));
        assert!(LoanStatus::InitialApprovalSent.can_transition_to(LoanStatus::LoanCreated));
        assert!(LoanStatus::LoanCreated.can_transition_to(LoanStatus::Disbursed));
        assert!(!LoanStatus::InitialOffer.can_transition_to(LoanStatus::Disbursed));
        assert!(!LoanStatus::LoanCreated.can_transition_to(LoanStatus::InitialOffer));
    }

    #[test]
    fn test_terminal_states_reachable_from_non_terminal() {
        for s in [
            LoanStatus::InitialOffer,
            LoanStatus::InitialApprovalSent,
            LoanStatus::LoanCreated,
            LoanStatus::RestructurePending,
        ] {
            assert!(s.can_transition_to(LoanStatus::Cancelled));
            assert!(s.can_transition_to(LoanStatus::Failed));
            assert!(s.can_transition_to(LoanStatus::Rejected));
        }
        assert!(!LoanStatus::Cancelled.can_transition_to(LoanStatus::Failed));
        assert!(!LoanStatus::Rejected.can_transition_to(LoanStatus::InitialApprovalSent));
    }

    #[test]
    fn test_restructure_branch() {
        assert!(LoanStatus::Disbursed.can_transition_to(LoanStatus::RestructurePending));
        assert!(!LoanStatus::InitialOffer.can_transition_to(LoanStatus::RestructurePending));
        assert!(LoanStatus::RestructurePending.can_transition_to(LoanStatus::RestructureApproved));
        assert!(LoanStatus::RestructureApproved.can_transition_to(LoanStatus::InitialApprovalSent));
    }

    #[test]
    fn test_status_serializes_as_wire_name() {
        let json = serde_json::to_string(&LoanStatus::InitialApprovalSent).unwrap();
        assert_eq!(json, "\"INITIAL_APPROVAL_SENT\"");
    }

    #[test]
    fn test_full_name_skips_missing_parts() {
        let c = ClientSnapshot {
            first_name: Some("Amina".into()),
            last_name: Some("Juma".into()),
            ..Default::default()
        };
        assert_eq!(c.full_name(), "Amina Juma");
    }
}
