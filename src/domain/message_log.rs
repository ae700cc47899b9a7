use super::message::{Direction, MessageType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
    Resent,
}

/// Identifiers that tie a wire message back to an application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    pub application_number: Option<String>,
    pub loan_number: Option<String>,
    pub fsp_reference_number: Option<String>,
}

impl Correlation {
    pub fn for_application(application_number: impl Into<String>) -> Self {
        Self {
            application_number: Some(application_number.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageLogEntry {
    pub message_id: String,
    pub message_type: MessageType,
    pub direction: Direction,
    pub status: DeliveryStatus,
    pub payload: String,
    pub response: Option<String>,
    pub error: Option<String>,
    pub retry_count: u32,
    pub correlation: Correlation,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MessageLogEntry {
    pub fn new(
        message_id: impl Into<String>,
        message_type: MessageType,
        direction: Direction,
        payload: impl Into<String>,
        correlation: Correlation,
    ) -> Self {
        let now = Utc::now();
        Self {
            message_id: message_id.into(),
            message_type,
            direction,
            status: DeliveryStatus::Pending,
            payload: payload.into(),
            response: None,
            error: None,
            retry_count: 0,
            correlation,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Filter for listing message log entries, newest first.
#[derive(Debug, Clone, Default)]
pub struct MessageLogQuery {
    pub message_type: Option<MessageType>,
    pub status: Option<DeliveryStatus>,
    pub application_number: Option<String>,
    pub limit: Option<usize>,
}

impl MessageLogQuery {
    pub fn matches(&self, entry: &MessageLogEntry) -> bool {
        self.message_type.is_none_or(|t| t == entry.message_type)
            && self.status.is_none_or(|s| s == entry.status)
            && self.application_number.as_deref().is_none_or(|a| {
                entry.correlation.application_number.as_deref() == Some(a)
            })
    }
}
