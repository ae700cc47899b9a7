//! The closed catalogue of wire message types exchanged with the counterparty.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Which offer flow an offer-type request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferVariant {
    NewLoan,
    TopUp,
    Takeover,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    // counterparty -> gateway
    LoanChargesRequest,
    LoanOfferRequest,
    TopUpOfferRequest,
    LoanTakeoverOfferRequest,
    TopUpPayOffBalanceRequest,
    LoanFinalApprovalNotification,
    LoanRestructureRequest,
    LoanStatusRequest,
    LoanCancellationNotification,
    LoanLiquidationNotification,
    // gateway -> counterparty
    Response,
    LoanChargesResponse,
    LoanStatusResponse,
    LoanTopUpBalanceResponse,
    LoanInitialApprovalNotification,
    LoanDisbursementNotification,
    LoanDisbursementFailureNotification,
}

impl MessageType {
    pub const ALL: [MessageType; 17] = [
        MessageType::LoanChargesRequest,
        MessageType::LoanOfferRequest,
        MessageType::TopUpOfferRequest,
        MessageType::LoanTakeoverOfferRequest,
        MessageType::TopUpPayOffBalanceRequest,
        MessageType::LoanFinalApprovalNotification,
        MessageType::LoanRestructureRequest,
        MessageType::LoanStatusRequest,
        MessageType::LoanCancellationNotification,
        MessageType::LoanLiquidationNotification,
        MessageType::Response,
        MessageType::LoanChargesResponse,
        MessageType::LoanStatusResponse,
        MessageType::LoanTopUpBalanceResponse,
        MessageType::LoanInitialApprovalNotification,
        MessageType::LoanDisbursementNotification,
        MessageType::LoanDisbursementFailureNotification,
    ];

    /// The `MessageType` header value on the wire.
    pub fn tag(&self) -> &'static str {
        match self {
            MessageType::LoanChargesRequest => "LOAN_CHARGES_REQUEST",
            MessageType::LoanOfferRequest => "LOAN_OFFER_REQUEST",
            MessageType::TopUpOfferRequest => "TOP_UP_OFFER_REQUEST",
            MessageType::LoanTakeoverOfferRequest => "LOAN_TAKEOVER_OFFER_REQUEST",
            MessageType::TopUpPayOffBalanceRequest => "TOP_UP_PAY_OFF_BALANCE_REQUEST",
            MessageType::LoanFinalApprovalNotification => "LOAN_FINAL_APPROVAL_NOTIFICATION",
            MessageType::LoanRestructureRequest => "LOAN_RESTRUCTURE_REQUEST",
            MessageType::LoanStatusRequest => "LOAN_STATUS_REQUEST",
            MessageType::LoanCancellationNotification => "LOAN_CANCELLATION_NOTIFICATION",
            MessageType::LoanLiquidationNotification => "LOAN_LIQUIDATION_NOTIFICATION",
            MessageType::Response => "RESPONSE",
            MessageType::LoanChargesResponse => "LOAN_CHARGES_RESPONSE",
            MessageType::LoanStatusResponse => "LOAN_STATUS_RESPONSE",
            MessageType::LoanTopUpBalanceResponse => "LOAN_TOP_UP_BALANCE_RESPONSE",
            MessageType::LoanInitialApprovalNotification => "LOAN_INITIAL_APPROVAL_NOTIFICATION",
            MessageType::LoanDisbursementNotification => "LOAN_DISBURSEMENT_NOTIFICATION",
            MessageType::LoanDisbursementFailureNotification => {
                "LOAN_DISBURSEMENT_FAILURE_NOTIFICATION"
            }
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        let tag = tag.trim();
        // Some counterparty builds spell "OFF" with a zero.
        if tag == "TOP_UP_PAY_0FF_BALANCE_REQUEST" {
            return Some(MessageType::TopUpPayOffBalanceRequest);
        }
        Self::ALL.into_iter().find(|t| t.tag() == tag)
    }

    pub fn direction(&self) -> Direction {
        match self {
            MessageType::LoanChargesRequest
            | MessageType::LoanOfferRequest
            | MessageType::TopUpOfferRequest
            | MessageType::LoanTakeoverOfferRequest
            | MessageType::TopUpPayOffBalanceRequest
            | MessageType::LoanFinalApprovalNotification
            | MessageType::LoanRestructureRequest
            | MessageType::LoanStatusRequest
            | MessageType::LoanCancellationNotification
            | MessageType::LoanLiquidationNotification => Direction::Inbound,
            _ => Direction::Outbound,
        }
    }

    pub fn offer_variant(&self) -> Option<OfferVariant> {
        match self {
            MessageType::LoanOfferRequest => Some(OfferVariant::NewLoan),
            MessageType::TopUpOfferRequest => Some(OfferVariant::TopUp),
            MessageType::LoanTakeoverOfferRequest => Some(OfferVariant::Takeover),
            _ => None,
        }
    }

    /// Three-letter prefix used when minting message ids of this type.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            MessageType::LoanChargesRequest => "LCQ",
            MessageType::LoanOfferRequest => "LOQ",
            MessageType::TopUpOfferRequest => "TOQ",
            MessageType::LoanTakeoverOfferRequest => "TKQ",
            MessageType::TopUpPayOffBalanceRequest => "TBQ",
            MessageType::LoanFinalApprovalNotification => "LFA",
            MessageType::LoanRestructureRequest => "LRQ",
            MessageType::LoanStatusRequest => "LSQ",
            MessageType::LoanCancellationNotification => "LCN",
            MessageType::LoanLiquidationNotification => "LLN",
            MessageType::Response => "RSP",
            MessageType::LoanChargesResponse => "LCR",
            MessageType::LoanStatusResponse => "LSR",
            MessageType::LoanTopUpBalanceResponse => "TBR",
            MessageType::LoanInitialApprovalNotification => "LIA",
            MessageType::LoanDisbursementNotification => "LDN",
            MessageType::LoanDisbursementFailureNotification => "LDF",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Result codes carried in `RESPONSE` documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResponseCode {
    Success,
    MalformedMessage,
    InvalidSignature,
    UnsupportedMessageType,
    ValidationFailed,
    TrustMaterialUnavailable,
    ApplicationNotFound,
    InvalidState,
    InternalError,
}

impl ResponseCode {
    pub fn code(&self) -> &'static str {
        match self {
            ResponseCode::Success => "8000",
            ResponseCode::MalformedMessage => "8001",
            ResponseCode::InvalidSignature => "8002",
            ResponseCode::UnsupportedMessageType => "8003",
            ResponseCode::ValidationFailed => "8004",
            ResponseCode::TrustMaterialUnavailable => "8005",
            ResponseCode::ApplicationNotFound => "8006",
            ResponseCode::InvalidState => "8007",
            ResponseCode::InternalError => "8099",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ResponseCode::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_are_unique_and_round_trip() {
        let mut seen = std::collections::HashSet::new();
        for t in MessageType::ALL {
            assert!(seen.insert(t.tag()), "duplicate tag {}", t.tag());
            assert_eq!(MessageType::from_tag(t.tag()), Some(t));
        }
    }

    #[test]
    fn test_zero_spelling_alias() {
        assert_eq!(
            MessageType::from_tag("TOP_UP_PAY_0FF_BALANCE_REQUEST"),
            Some(MessageType::TopUpPayOffBalanceRequest)
        );
    }

    #[test]
    fn test_unknown_tag() {
        assert_eq!(MessageType::from_tag("PRODUCT_CATALOG"), None);
    }

    #[test]
    fn test_offer_variants() {
        assert_eq!(
            MessageType::TopUpOfferRequest.offer_variant(),
            Some(OfferVariant::TopUp)
        );
        assert_eq!(MessageType::LoanStatusRequest.offer_variant(), None);
        assert_eq!(MessageType::Response.direction(), Direction::Outbound);
    }
}
