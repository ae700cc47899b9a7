//! Inbound envelope processing: parse, verify, route, answer.
//!
//! Every inbound document gets exactly one XML answer, success or protocol error; nothing here
//! surfaces as a transport failure.

use super::handlers::{self, Reply, Services};
use super::inbound::InboundMessage;
use super::notifications::{ComposedDocument, DocumentComposer, response_details};
use crate::domain::message::{Direction, MessageType, ResponseCode};
use crate::domain::message_log::{Correlation, DeliveryStatus, MessageLogEntry};
use crate::domain::ports::MessageLogStoreRef;
use crate::error::{GatewayError, Result, SignatureError};
use crate::signature::{Envelope, VerificationOutcome};
use chrono::Utc;

#[derive(Clone)]
pub struct Dispatcher {
    services: Services,
    composer: DocumentComposer,
    log: MessageLogStoreRef,
}

impl Dispatcher {
    pub fn new(services: Services, composer: DocumentComposer, log: MessageLogStoreRef) -> Self {
        Self {
            services,
            composer,
            log,
        }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn composer(&self) -> &DocumentComposer {
        &self.composer
    }

    /// Handles one raw inbound document and returns the answer to send back.
    pub async fn dispatch(&self, raw: &str) -> ComposedDocument {
        let envelope = match Envelope::parse(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, "unparseable inbound document");
                return self.respond_error(&e, Correlation::default()).await;
            }
        };
        let msg_id = envelope.header.msg_id.clone();

        let Some(message_type) = MessageType::from_tag(&envelope.header.message_type) else {
            tracing::warn!(msg_id = %msg_id, tag = %envelope.header.message_type, "unknown message type");
            let e = GatewayError::UnsupportedMessage(envelope.header.message_type.clone());
            return self.respond_error(&e, Correlation::default()).await;
        };

        let mut inbound = MessageLogEntry::new(
            &msg_id,
            message_type,
            Direction::Inbound,
            raw,
            Correlation::default(),
        );
        let result = self.process(&envelope, message_type).await;
        let (reply, error) = match result {
            Ok(reply) => (reply, None),
            Err(e) => {
                let correlation = Correlation {
                    application_number: application_number_of(&envelope),
                    ..Default::default()
                };
                tracing::warn!(
                    msg_id = %msg_id,
                    message_type = %message_type,
                    code = e.response_code().code(),
                    error = %e,
                    "inbound message refused"
                );
                (error_reply(&e, correlation), Some(e.to_string()))
            }
        };

        inbound.correlation = reply.correlation.clone();
        inbound.status = if error.is_some() {
            DeliveryStatus::Failed
        } else {
            DeliveryStatus::Sent
        };
        inbound.error = error;
        inbound.updated_at = Utc::now();
        self.record(inbound).await;

        self.answer(reply).await
    }

    /// Answers a document that never reached parsing, such as an unreadable body or one whose
    /// handling ran past the request deadline.
    pub async fn reject(&self, error: &GatewayError) -> ComposedDocument {
        tracing::warn!(code = error.response_code().code(), error = %error, "inbound document rejected");
        self.respond_error(error, Correlation::default()).await
    }

    async fn process(&self, envelope: &Envelope, message_type: MessageType) -> Result<Reply> {
        match self
            .composer
            .signer()
            .verify_inbound(&envelope.signed_bytes(), envelope.signature.as_deref())?
        {
            VerificationOutcome::Verified => {}
            VerificationOutcome::Skipped => {
                tracing::warn!(msg_id = %envelope.header.msg_id, "processing unverified document");
            }
            VerificationOutcome::Rejected => {
                return Err(SignatureError::VerificationFailed.into());
            }
        }

        let message = InboundMessage::parse(message_type, &envelope.details)?;
        tracing::info!(
            msg_id = %envelope.header.msg_id,
            message_type = %message_type,
            application_number = message.application_number().unwrap_or_default(),
            "inbound message accepted"
        );
        self.route(message, &envelope.header.msg_id).await
    }

    async fn route(&self, message: InboundMessage, msg_id: &str) -> Result<Reply> {
        let services = &self.services;
        match message {
            InboundMessage::ChargesInquiry(inquiry) => handlers::charges::handle(services, inquiry).await,
            InboundMessage::Offer(offer) => handlers::offer::handle(services, offer).await,
            InboundMessage::PayOffBalance(request) => {
                handlers::balance::handle(services, request, msg_id).await
            }
            InboundMessage::FinalApproval(approval) => {
                handlers::approval::handle(services, approval).await
            }
            InboundMessage::Restructure(request) => {
                handlers::restructure::handle(services, request).await
            }
            InboundMessage::StatusInquiry { application_number } => {
                handlers::status::status(services, &application_number).await
            }
            InboundMessage::Cancellation(cancellation) => {
                handlers::status::cancel(services, cancellation).await
            }
            InboundMessage::Liquidation(liquidation) => {
                handlers::status::liquidate(services, liquidation).await
            }
        }
    }

    /// Signs `reply`; a reply that cannot be signed degrades to an unsigned 8005 `RESPONSE`.
    async fn answer(&self, reply: Reply) -> ComposedDocument {
        let document = match self.composer.compose(reply.message_type, reply.details) {
            Ok(document) => document,
            Err(e) => {
                tracing::error!(message_type = %reply.message_type, error = %e, "reply could not be signed");
                self.composer
                    .compose_response(ResponseCode::TrustMaterialUnavailable, &e.to_string())
            }
        };
        self.log_outbound(&document, reply.correlation).await;
        document
    }

    async fn respond_error(&self, error: &GatewayError, correlation: Correlation) -> ComposedDocument {
        self.answer(error_reply(error, correlation)).await
    }

    async fn log_outbound(&self, document: &ComposedDocument, correlation: Correlation) {
        let mut entry = MessageLogEntry::new(
            &document.message_id,
            document.message_type,
            Direction::Outbound,
            &document.xml,
            correlation,
        );
        entry.status = DeliveryStatus::Sent;
        self.record(entry).await;
    }

    /// Logging problems never change the answer.
    async fn record(&self, entry: MessageLogEntry) {
        if let Err(e) = self.log.record(entry).await {
            tracing::error!(error = %e, "message log write failed");
        }
    }
}

fn error_reply(error: &GatewayError, correlation: Correlation) -> Reply {
    Reply::new(
        MessageType::Response,
        response_details(error.response_code(), &error.to_string()),
        correlation,
    )
}

fn application_number_of(envelope: &Envelope) -> Option<String> {
    envelope.details.child_text("ApplicationNumber")
}
