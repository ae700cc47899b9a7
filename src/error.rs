use crate::domain::loan::LoanStatus;
use crate::domain::message::ResponseCode;
use thiserror::Error;

/// Failures of the signature subsystem.
///
/// Kept apart from [`GatewayError`] so the dispatcher can tell "the material is missing" from
/// "the document does not verify" and answer with distinct protocol codes.
#[derive(Error, Debug)]
pub enum SignatureError {
    #[error("signing material unavailable: {0}")]
    MaterialUnavailable(String),
    #[error("signature verification failed")]
    VerificationFailed,
    #[error("envelope carries no signature")]
    MissingSignature,
    #[error("invalid key material: {0}")]
    InvalidKey(String),
    #[error("signing failed: {0}")]
    SigningFailed(String),
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("Malformed message: {0}")]
    Malformed(String),
    #[error("Missing required element: {0}")]
    MissingElement(String),
    #[error(transparent)]
    Signature(#[from] SignatureError),
    #[error("Unsupported message type: {0}")]
    UnsupportedMessage(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Application not found: {0}")]
    NotFound(String),
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: LoanStatus, to: LoanStatus },
    #[error("Precondition failed: {0}")]
    Precondition(String),
    #[error("Banking engine error: {0}")]
    Banking(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Timed out: {0}")]
    Timeout(String),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDbError(#[from] rocksdb::Error),
    #[error("Internal error: {0}")]
    InternalError(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl GatewayError {
    /// The protocol code this failure is reported under in a `RESPONSE` document.
    pub fn response_code(&self) -> ResponseCode {
        match self {
            GatewayError::Xml(_) | GatewayError::Malformed(_) | GatewayError::MissingElement(_) => {
                ResponseCode::MalformedMessage
            }
            GatewayError::Signature(SignatureError::MaterialUnavailable(_))
            | GatewayError::Signature(SignatureError::InvalidKey(_))
            | GatewayError::Signature(SignatureError::SigningFailed(_)) => {
                ResponseCode::TrustMaterialUnavailable
            }
            GatewayError::Signature(_) => ResponseCode::InvalidSignature,
            GatewayError::UnsupportedMessage(_) => ResponseCode::UnsupportedMessageType,
            GatewayError::ValidationError(_) => ResponseCode::ValidationFailed,
            GatewayError::NotFound(_) => ResponseCode::ApplicationNotFound,
            GatewayError::InvalidTransition { .. } | GatewayError::Precondition(_) => {
                ResponseCode::InvalidState
            }
            _ => ResponseCode::InternalError,
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
