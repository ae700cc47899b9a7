//! Typed views over inbound `MessageDetails`.
//!
//! Field-level problems (a missing `ApplicationNumber`, an amount that is not a number or is
//! negative) are validation errors, reported with code 8004 before anything is persisted.

use crate::calculation::AffordabilityRequest;
use crate::domain::loan::{ClientSnapshot, EmploymentSnapshot, LoanSnapshot};
use crate::domain::message::{MessageType, OfferVariant};
use crate::domain::money::{Amount, Money, validate_amount};
use crate::error::{GatewayError, Result};
use crate::signature::XmlElement;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::str::FromStr;

struct Fields<'a>(&'a XmlElement);

impl Fields<'_> {
    fn optional(&self, name: &str) -> Option<String> {
        self.0.child_text(name)
    }

    fn required(&self, name: &str) -> Result<String> {
        self.optional(name)
            .ok_or_else(|| GatewayError::ValidationError(format!("{name} is required")))
    }

    fn decimal(&self, name: &str) -> Result<Option<Decimal>> {
        self.optional(name)
            .map(|raw| {
                let value = Decimal::from_str(raw.replace(',', "").trim()).map_err(|_| {
                    GatewayError::ValidationError(format!("{name} is not a number: {raw}"))
                })?;
                validate_amount(name, value)
            })
            .transpose()
    }

    fn money(&self, name: &str) -> Result<Option<Money>> {
        Ok(self.decimal(name)?.map(Money::new))
    }

    /// An amount that, when present, must be strictly positive.
    fn positive_money(&self, name: &str) -> Result<Option<Money>> {
        self.decimal(name)?
            .map(|value| Amount::named(name, value).map(Money::from))
            .transpose()
    }

    fn months(&self, name: &str) -> Result<Option<u32>> {
        self.optional(name)
            .map(|raw| {
                raw.trim().parse::<u32>().map_err(|_| {
                    GatewayError::ValidationError(format!("{name} is not a month count: {raw}"))
                })
            })
            .transpose()
    }

    /// Accepts `YYYY-MM-DD`, optionally followed by a time part.
    fn date(&self, name: &str) -> Result<Option<NaiveDate>> {
        self.optional(name)
            .map(|raw| {
                let day = raw.get(..10).unwrap_or(&raw);
                NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|_| {
                    GatewayError::ValidationError(format!("{name} is not a date: {raw}"))
                })
            })
            .transpose()
    }

    fn employment(&self) -> Result<EmploymentSnapshot> {
        Ok(EmploymentSnapshot {
            check_number: self.required("CheckNumber")?,
            designation_code: self.optional("DesignationCode"),
            designation_name: self.optional("DesignationName"),
            vote_code: self.optional("VoteCode"),
            vote_name: self.optional("VoteName"),
            basic_salary: self.money("BasicSalary")?,
            net_salary: self.money("NetSalary")?,
            one_third_amount: self.money("OneThirdAmount")?,
            employment_date: self.date("EmploymentDate")?,
            retirement_date: self.date("RetirementDate")?,
            terms_of_employment: self.optional("TermsOfEmployment"),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChargesInquiry {
    pub employment: EmploymentSnapshot,
    pub requested_amount: Option<Decimal>,
    pub deductible_amount: Option<Decimal>,
    pub desired_deductible_amount: Option<Decimal>,
    pub tenure: Option<u32>,
    pub product_code: Option<String>,
}

impl ChargesInquiry {
    pub fn affordability(&self, as_of: NaiveDate) -> AffordabilityRequest {
        AffordabilityRequest {
            requested_amount: self.requested_amount,
            deductible_amount: self.deductible_amount,
            desired_deductible_amount: self.desired_deductible_amount,
            tenure: self.tenure,
            retirement_date: self.employment.retirement_date,
            as_of: Some(as_of),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OfferRequest {
    pub variant: OfferVariant,
    pub application_number: String,
    pub client: ClientSnapshot,
    pub employment: EmploymentSnapshot,
    pub loan: LoanSnapshot,
    pub requested_amount: Option<Decimal>,
    pub deductible_amount: Option<Decimal>,
    pub tenure: Option<u32>,
}

impl OfferRequest {
    pub fn check_number(&self) -> &str {
        &self.employment.check_number
    }

    pub fn affordability(&self, as_of: NaiveDate) -> AffordabilityRequest {
        AffordabilityRequest {
            requested_amount: self.requested_amount,
            deductible_amount: self.deductible_amount,
            desired_deductible_amount: self.loan.desired_deductible_amount.map(|m| m.value()),
            tenure: self.tenure,
            retirement_date: self.employment.retirement_date,
            as_of: Some(as_of),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PayOffBalanceRequest {
    pub check_number: Option<String>,
    pub loan_number: String,
    pub installments_paid: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FinalApproval {
    pub application_number: String,
    pub approved: bool,
    pub reason: Option<String>,
    pub fsp_reference_number: Option<String>,
    pub loan_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RestructureRequest {
    pub application_number: String,
    pub check_number: String,
    pub loan_number: Option<String>,
    pub requested_tenure: Option<u32>,
    pub requested_amount: Option<Money>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cancellation {
    pub application_number: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Liquidation {
    pub application_number: String,
    pub loan_number: Option<String>,
    pub remarks: Option<String>,
}

/// Every inbound message the gateway acts on.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    ChargesInquiry(ChargesInquiry),
    Offer(OfferRequest),
    PayOffBalance(PayOffBalanceRequest),
    FinalApproval(FinalApproval),
    Restructure(RestructureRequest),
    StatusInquiry { application_number: String },
    Cancellation(Cancellation),
    Liquidation(Liquidation),
}

impl InboundMessage {
    /// Reads the details of a `message_type` document. Outbound-only types are unsupported.
    pub fn parse(message_type: MessageType, details: &XmlElement) -> Result<Self> {
        let f = Fields(details);
        let message = match message_type {
            MessageType::LoanChargesRequest => Self::ChargesInquiry(ChargesInquiry {
                employment: f.employment()?,
                requested_amount: f.decimal("RequestedAmount")?,
                deductible_amount: f.decimal("DeductibleAmount")?,
                desired_deductible_amount: f.decimal("DesiredDeductibleAmount")?,
                tenure: f.months("Tenure")?,
                product_code: f.optional("ProductCode"),
            }),
            MessageType::LoanOfferRequest
            | MessageType::TopUpOfferRequest
            | MessageType::LoanTakeoverOfferRequest => {
                let variant = message_type
                    .offer_variant()
                    .ok_or_else(|| GatewayError::UnsupportedMessage(message_type.to_string()))?;
                Self::Offer(parse_offer(&f, variant)?)
            }
            MessageType::TopUpPayOffBalanceRequest => Self::PayOffBalance(PayOffBalanceRequest {
                check_number: f.optional("CheckNumber"),
                loan_number: f.required("LoanNumber")?,
                installments_paid: f.months("InstallmentsPaid")?,
            }),
            MessageType::LoanFinalApprovalNotification => {
                let approval = f.required("Approval")?;
                let approved = match approval.to_ascii_uppercase().as_str() {
                    "APPROVED" => true,
                    "REJECTED" => false,
                    other => {
                        return Err(GatewayError::ValidationError(format!(
                            "Approval must be APPROVED or REJECTED, got {other}"
                        )));
                    }
                };
                Self::FinalApproval(FinalApproval {
                    application_number: f.required("ApplicationNumber")?,
                    approved,
                    reason: f.optional("Reason"),
                    fsp_reference_number: f.optional("FSPReferenceNumber"),
                    loan_number: f.optional("LoanNumber"),
                })
            }
            MessageType::LoanRestructureRequest => {
                let request = RestructureRequest {
                    application_number: f.required("ApplicationNumber")?,
                    check_number: f.required("CheckNumber")?,
                    loan_number: f.optional("LoanNumber"),
                    requested_tenure: f.months("Tenure")?,
                    requested_amount: f.positive_money("RequestedAmount")?,
                };
                if request.requested_tenure == Some(0) {
                    return Err(GatewayError::ValidationError(
                        "Tenure must be at least one month".to_string(),
                    ));
                }
                if request.requested_tenure.is_none() && request.requested_amount.is_none() {
                    return Err(GatewayError::ValidationError(
                        "restructure needs a Tenure or a RequestedAmount".to_string(),
                    ));
                }
                Self::Restructure(request)
            }
            MessageType::LoanStatusRequest => Self::StatusInquiry {
                application_number: f.required("ApplicationNumber")?,
            },
            MessageType::LoanCancellationNotification => Self::Cancellation(Cancellation {
                application_number: f.required("ApplicationNumber")?,
                reason: f.optional("Reason"),
            }),
            MessageType::LoanLiquidationNotification => Self::Liquidation(Liquidation {
                application_number: f.required("ApplicationNumber")?,
                loan_number: f.optional("LoanNumber"),
                remarks: f.optional("Remarks"),
            }),
            MessageType::Response
            | MessageType::LoanChargesResponse
            | MessageType::LoanStatusResponse
            | MessageType::LoanTopUpBalanceResponse
            | MessageType::LoanInitialApprovalNotification
            | MessageType::LoanDisbursementNotification
            | MessageType::LoanDisbursementFailureNotification => {
                return Err(GatewayError::UnsupportedMessage(format!(
                    "{message_type} is not accepted inbound"
                )));
            }
        };
        Ok(message)
    }

    pub fn application_number(&self) -> Option<&str> {
        match self {
            Self::Offer(m) => Some(&m.application_number),
            Self::FinalApproval(m) => Some(&m.application_number),
            Self::Restructure(m) => Some(&m.application_number),
            Self::StatusInquiry { application_number } => Some(application_number),
            Self::Cancellation(m) => Some(&m.application_number),
            Self::Liquidation(m) => Some(&m.application_number),
            Self::ChargesInquiry(_) | Self::PayOffBalance(_) => None,
        }
    }
}

fn parse_offer(f: &Fields<'_>, variant: OfferVariant) -> Result<OfferRequest> {
    let employment = f.employment()?;
    let client = ClientSnapshot {
        first_name: f.optional("FirstName"),
        middle_name: f.optional("MiddleName"),
        last_name: f.optional("LastName"),
        sex: f.optional("Sex"),
        date_of_birth: f.date("DateOfBirth")?,
        marital_status: f.optional("MaritalStatus"),
        national_id: f.optional("NIN"),
        mobile_number: f.optional("MobileNumber"),
        email: f.optional("EmailAddress"),
        bank_account_number: f.optional("BankAccountNumber"),
        swift_code: f.optional("SwiftCode"),
    };
    let existing_loan_number = match variant {
        OfferVariant::NewLoan => None,
        OfferVariant::TopUp => f.optional("LoanNumber"),
        OfferVariant::Takeover => f.optional("FSP1LoanNumber").or_else(|| f.optional("LoanNumber")),
    };
    let settlement_amount = match variant {
        OfferVariant::NewLoan => None,
        OfferVariant::TopUp => f.money("SettlementAmount")?,
        OfferVariant::Takeover => match f.money("TakeOverBalance")? {
            Some(balance) => Some(balance),
            None => f.money("SettlementAmount")?,
        },
    };
    let loan = LoanSnapshot {
        variant,
        product_code: f.optional("ProductCode"),
        loan_purpose: f.optional("LoanPurpose"),
        desired_deductible_amount: f.money("DesiredDeductibleAmount")?,
        existing_loan_number,
        settlement_amount,
    };
    let deductible_amount = match f.decimal("DeductibleAmount")? {
        Some(amount) => Some(amount),
        None => employment.one_third_amount.map(|m| m.value()),
    };

    Ok(OfferRequest {
        variant,
        application_number: f.required("ApplicationNumber")?,
        client,
        employment,
        loan,
        requested_amount: f.decimal("RequestedAmount")?,
        deductible_amount,
        tenure: f.months("Tenure")?,
    })
}
