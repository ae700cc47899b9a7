use crate::domain::message::MessageType;
use chrono::Utc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Generates correlation identifiers in the formats the counterparty expects.
///
/// A process-wide counter keeps identifiers minted within the same millisecond apart.
#[derive(Debug)]
pub struct MessageIdGenerator {
    fsp_code: String,
    sequence: AtomicU32,
}

impl MessageIdGenerator {
    pub fn new(fsp_code: impl Into<String>) -> Self {
        Self {
            fsp_code: fsp_code.into(),
            sequence: AtomicU32::new(0),
        }
    }

    fn next_sequence(&self, modulo: u32) -> u32 {
        self.sequence.fetch_add(1, Ordering::Relaxed) % modulo
    }

    /// `<prefix><FSPCode><yyyyMMddHHmmssSSS><4-digit sequence>`
    pub fn message_id(&self, message_type: MessageType) -> String {
        format!(
            "{}{}{}{:04}",
            message_type.id_prefix(),
            self.fsp_code,
            Utc::now().format("%Y%m%d%H%M%S%3f"),
            self.next_sequence(10_000)
        )
    }

    /// `<FSPCode>LN<yyMMddHHmmss><6-digit sequence>`
    pub fn loan_number(&self) -> String {
        format!(
            "{}LN{}{:06}",
            self.fsp_code,
            Utc::now().format("%y%m%d%H%M%S"),
            self.next_sequence(1_000_000)
        )
    }

    /// `<FSPCode>REF<yyMMddHHmmss><6-digit sequence>`
    pub fn fsp_reference(&self) -> String {
        format!(
            "{}REF{}{:06}",
            self.fsp_code,
            Utc::now().format("%y%m%d%H%M%S"),
            self.next_sequence(1_000_000)
        )
    }
}
