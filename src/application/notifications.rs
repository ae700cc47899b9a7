//! Outbound documents: headers, per-type `MessageDetails` and signing.

use super::ids::MessageIdGenerator;
use crate::config::FspConfig;
use crate::domain::charges::LoanQuote;
use crate::domain::loan::LoanMapping;
use crate::domain::message::{MessageType, ResponseCode};
use crate::domain::money::Money;
use crate::error::SignatureError;
use crate::signature::envelope::{self, MESSAGE_DETAILS};
use crate::signature::{Header, SigningContext, XmlElement, build_signed_document};
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// A serialized document ready for the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedDocument {
    pub message_id: String,
    pub message_type: MessageType,
    pub xml: String,
    pub signed: bool,
}

/// Wraps details in a header and signs them with the process trust material.
#[derive(Clone)]
pub struct DocumentComposer {
    signer: Arc<SigningContext>,
    ids: Arc<MessageIdGenerator>,
    fsp: FspConfig,
}

impl DocumentComposer {
    pub fn new(signer: Arc<SigningContext>, ids: Arc<MessageIdGenerator>, fsp: FspConfig) -> Self {
        Self { signer, ids, fsp }
    }

    pub fn signer(&self) -> &SigningContext {
        &self.signer
    }

    pub fn ids(&self) -> &MessageIdGenerator {
        &self.ids
    }

    fn header(&self, message_type: MessageType) -> Header {
        Header {
            sender: self.fsp.name.clone(),
            receiver: self.fsp.counterparty_name.clone(),
            fsp_code: self.fsp.code.clone(),
            msg_id: self.ids.message_id(message_type),
            message_type: message_type.tag().to_string(),
        }
    }

    pub fn compose(
        &self,
        message_type: MessageType,
        details: XmlElement,
    ) -> Result<ComposedDocument, SignatureError> {
        let header = self.header(message_type);
        let data = envelope::body(&header, details);
        let xml = build_signed_document(&data, &self.signer)?;
        Ok(ComposedDocument {
            message_id: header.msg_id,
            message_type,
            xml,
            signed: true,
        })
    }

    /// A `RESPONSE` document. Never fails: when signing is impossible the answer degrades to
    /// an unsigned trust-material error.
    pub fn compose_response(&self, code: ResponseCode, description: &str) -> ComposedDocument {
        match self.compose(MessageType::Response, response_details(code, description)) {
            Ok(document) => document,
            Err(e) => {
                tracing::error!(error = %e, code = code.code(), "cannot sign response, answering unsigned");
                let header = self.header(MessageType::Response);
                let details = response_details(
                    ResponseCode::TrustMaterialUnavailable,
                    &format!("Response could not be signed: {e}"),
                );
                ComposedDocument {
                    message_id: header.msg_id.clone(),
                    message_type: MessageType::Response,
                    xml: envelope::build_unsigned_document(&envelope::body(&header, details)),
                    signed: false,
                }
            }
        }
    }
}

fn details() -> XmlElement {
    XmlElement::new(MESSAGE_DETAILS)
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub fn response_details(code: ResponseCode, description: &str) -> XmlElement {
    details()
        .with_text("ResponseCode", code.code())
        .with_text("Description", description)
}

pub fn charges_response_details(quote: &LoanQuote) -> XmlElement {
    details()
        .with_text("DesiredDeductibleAmount", quote.deduction_capacity)
        .with_text("TotalInsurance", quote.charges.insurance)
        .with_text("TotalProcessingFees", quote.charges.processing_fee)
        .with_text("TotalInterestRateAmount", quote.total_interest)
        .with_text("OtherCharges", quote.charges.other_charges)
        .with_text("NetLoanAmount", quote.net_loan_amount)
        .with_text("TotalAmountToPay", quote.total_amount_to_pay)
        .with_text("Tenure", quote.tenure)
        .with_text("EligibleAmount", quote.eligible_amount)
        .with_text("MonthlyReturnAmount", quote.monthly_installment)
}

pub fn initial_approval_details(mapping: &LoanMapping) -> XmlElement {
    let reason = if mapping.metadata.restructure.is_some() {
        "Restructure approved"
    } else {
        "Loan offer approved"
    };
    details()
        .with_text("ApplicationNumber", &mapping.application_number)
        .with_text("Reason", reason)
        .with_text("FSPReferenceNumber", &mapping.fsp_reference_number)
        .with_text("LoanNumber", &mapping.loan_number_alias)
        .with_text("TotalAmountToPay", mapping.total_amount_to_pay)
        .with_text("OtherCharges", mapping.charges.total())
        .with_text("Approval", "APPROVED")
}

pub fn disbursement_details(mapping: &LoanMapping, disbursed_at: DateTime<Utc>) -> XmlElement {
    details()
        .with_text("ApplicationNumber", &mapping.application_number)
        .with_text("FSPReferenceNumber", &mapping.fsp_reference_number)
        .with_text("LoanNumber", &mapping.loan_number_alias)
        .with_text("TotalAmountToPay", mapping.total_amount_to_pay)
        .with_text("DisbursementDate", timestamp(disbursed_at))
}

pub fn disbursement_failure_details(mapping: &LoanMapping, reason: &str) -> XmlElement {
    details()
        .with_text("ApplicationNumber", &mapping.application_number)
        .with_text("Reason", reason)
}

pub fn status_response_details(mapping: &LoanMapping) -> XmlElement {
    details()
        .with_text("ApplicationNumber", &mapping.application_number)
        .with_text("LoanNumber", &mapping.loan_number_alias)
        .with_text("FSPReferenceNumber", &mapping.fsp_reference_number)
        .with_text("Status", mapping.status)
        .with_text("EligibleAmount", mapping.eligible_amount)
        .with_text("MonthlyReturnAmount", mapping.monthly_installment)
        .with_text("Tenure", mapping.tenure)
        .with_optional("DisbursementDate", mapping.metadata.disbursed_at.map(timestamp))
        .with_optional("Reason", mapping.metadata.rejection_reason.as_deref())
}

/// Figures reported back for a top-up pay-off balance inquiry.
#[derive(Debug, Clone, PartialEq)]
pub struct PayOffBalance {
    pub payment_reference: String,
    pub outstanding_balance: Money,
    pub total_payoff_amount: Money,
    pub last_deduction_date: Option<NaiveDate>,
    pub final_payment_date: NaiveDate,
    pub end_date: NaiveDate,
}

pub fn top_up_balance_details(mapping: &LoanMapping, balance: &PayOffBalance) -> XmlElement {
    details()
        .with_text("LoanNumber", &mapping.loan_number_alias)
        .with_text("FSPReferenceNumber", &mapping.fsp_reference_number)
        .with_text("PaymentReferenceNumber", &balance.payment_reference)
        .with_text("TotalPayoffAmount", balance.total_payoff_amount)
        .with_text("OutstandingBalance", balance.outstanding_balance)
        .with_text("FinalPaymentDate", balance.final_payment_date)
        .with_optional("LastDeductionDate", balance.last_deduction_date)
        .with_text("EndDate", balance.end_date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::envelope::Envelope;
    use crate::signature::signer::VerificationOutcome;
    use rsa::{RsaPrivateKey, RsaPublicKey};
    use rust_decimal_macros::dec;

    fn composer(signer: SigningContext) -> DocumentComposer {
        DocumentComposer::new(
            Arc::new(signer),
            Arc::new(MessageIdGenerator::new("FL0001")),
            FspConfig::default(),
        )
    }

    fn mapping() -> LoanMapping {
        let mut m = LoanMapping::new("APP1", "CHK1", MessageType::LoanOfferRequest);
        m.fsp_reference_number = "FL0001REF1".into();
        m.loan_number_alias = "FL0001LN1".into();
        m.total_amount_to_pay = Money::new(dec!(1200));
        m
    }

    #[test]
    fn test_compose_signs_and_verifies() {
        let key = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        let composer = composer(SigningContext::new(
            Some(key.clone()),
            Some(RsaPublicKey::from(&key)),
            None,
        ));

        let doc = composer
            .compose(
                MessageType::LoanInitialApprovalNotification,
                initial_approval_details(&mapping()),
            )
            .unwrap();
        assert!(doc.signed);
        assert!(doc.message_id.starts_with("LIAFL0001"));

        let envelope = Envelope::parse(&doc.xml).unwrap();
        assert_eq!(envelope.header.message_type, "LOAN_INITIAL_APPROVAL_NOTIFICATION");
        assert_eq!(envelope.header.msg_id, doc.message_id);
        assert_eq!(
            envelope.details.child_text("TotalAmountToPay").as_deref(),
            Some("1200.00")
        );
        assert_eq!(
            composer
                .signer()
                .verify_inbound(&envelope.signed_bytes(), envelope.signature.as_deref())
                .unwrap(),
            VerificationOutcome::Verified
        );
    }

    #[test]
    fn test_response_without_key_degrades_to_unsigned_8005() {
        let composer = composer(SigningContext::empty());
        let doc = composer.compose_response(ResponseCode::Success, "ok");
        assert!(!doc.signed);
        let envelope = Envelope::parse(&doc.xml).unwrap();
        assert!(envelope.signature.is_none());
        assert_eq!(
            envelope.details.child_text("ResponseCode").as_deref(),
            Some("8005")
        );
    }

    #[test]
    fn test_status_details_skip_absent_fields() {
        let details = status_response_details(&mapping());
        assert_eq!(details.child_text("Status").as_deref(), Some("INITIAL_OFFER"));
        assert!(details.child("DisbursementDate").is_none());
        assert!(details.child("Reason").is_none());
    }
}
