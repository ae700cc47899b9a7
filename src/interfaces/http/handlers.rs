//! HTTP request handlers

use super::state::AppState;
use crate::application::delivery::DeliveryOutcome;
use crate::application::events::{BankingEvent, EventOutcome};
use crate::application::notifications::ComposedDocument;
use crate::error::GatewayError;
use axum::{
    Json,
    body::{Body, Bytes},
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// API error wrapper for JSON endpoints
pub struct ApiError(GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Precondition(_) | GatewayError::InvalidTransition { .. } => StatusCode::CONFLICT,
            GatewayError::ValidationError(_) | GatewayError::Serialization(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

/// Receives a counterparty document. The answer is always a 200 carrying an XML document;
/// failures travel inside it as response codes.
pub async fn receive_message(State(state): State<AppState>, body: Body) -> Response {
    let limits = state.inbound;
    let answer = match tokio::time::timeout(limits.timeout, read_and_dispatch(&state, body)).await {
        Ok(answer) => answer,
        Err(_) => {
            let error = GatewayError::Timeout(format!(
                "inbound document not handled within {}s",
                limits.timeout.as_secs()
            ));
            state.gateway.dispatcher.reject(&error).await
        }
    };
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/xml")],
        answer.xml,
    )
        .into_response()
}

async fn read_and_dispatch(state: &AppState, body: Body) -> ComposedDocument {
    let dispatcher = &state.gateway.dispatcher;
    let max = state.inbound.max_body_size;
    let bytes = match axum::body::to_bytes(body, max).await {
        Ok(bytes) => bytes,
        Err(e) => {
            let error = GatewayError::Malformed(format!("document unreadable or over {max} bytes: {e}"));
            return dispatcher.reject(&error).await;
        }
    };
    match std::str::from_utf8(&bytes) {
        Ok(raw) => dispatcher.dispatch(raw).await,
        Err(e) => {
            let error = GatewayError::Malformed(format!("document is not valid UTF-8: {e}"));
            dispatcher.reject(&error).await
        }
    }
}

pub async fn banking_webhook(State(state): State<AppState>, body: Bytes) -> Result<Json<EventOutcome>, ApiError> {
    let event: BankingEvent = serde_json::from_slice(&body).map_err(GatewayError::from)?;
    let outcome = state.gateway.events.handle(event).await?;
    Ok(Json(outcome))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NotificationReport {
    pub application_number: String,
    pub delivered: bool,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NotificationReport {
    fn new(application_number: String, outcome: &DeliveryOutcome) -> Self {
        let error = match outcome {
            DeliveryOutcome::Failed { error, .. } => Some(error.clone()),
            _ => None,
        };
        Self {
            application_number,
            delivered: outcome.is_delivered(),
            attempts: outcome.attempts(),
            error,
        }
    }
}

pub async fn disbursement_notification(
    State(state): State<AppState>,
    Path(application_number): Path<String>,
) -> Result<Json<NotificationReport>, ApiError> {
    let outcome = state
        .gateway
        .operator
        .disbursement_notification(&application_number)
        .await?;
    Ok(Json(NotificationReport::new(application_number, &outcome)))
}

#[derive(Debug, Default, Deserialize)]
pub struct FailureNotice {
    #[serde(default)]
    pub reason: Option<String>,
}

const DEFAULT_FAILURE_REASON: &str = "Disbursement failed";

pub async fn disbursement_failure_notification(
    State(state): State<AppState>,
    Path(application_number): Path<String>,
    body: Bytes,
) -> Result<Json<NotificationReport>, ApiError> {
    let notice: FailureNotice = if body.is_empty() {
        FailureNotice::default()
    } else {
        serde_json::from_slice(&body).map_err(GatewayError::from)?
    };
    let reason = notice
        .reason
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_FAILURE_REASON.to_string());
    let outcome = state
        .gateway
        .operator
        .disbursement_failure_notification(&application_number, &reason)
        .await?;
    Ok(Json(NotificationReport::new(application_number, &outcome)))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub signing_material_loaded: bool,
    pub verify_signatures: bool,
    pub started_at: DateTime<Utc>,
}

/// Health check
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let signer = &state.gateway.signer;
    Json(HealthResponse {
        status: "ok",
        signing_material_loaded: signer.can_sign(),
        verify_signatures: signer.verification_enabled(),
        started_at: state.started_at,
    })
}

#[cfg(test)]
mod tests {
    use crate::application::handlers::testing::{FakeBanking, OkTransport, key};
    use crate::application::{Adapters, Gateway, Stores};
    use crate::config::{GatewayConfig, ServerConfig};
    use crate::domain::loan::{LoanMapping, LoanStatus};
    use crate::domain::message::MessageType;
    use crate::interfaces::http::{AppState, create_router};
    use crate::signature::{Envelope, SigningContext};
    use axum::Router;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use rsa::RsaPublicKey;
    use std::sync::Arc;
    use tower::ServiceExt;

    struct Harness {
        app: Router,
        gateway: Gateway,
        transport: Arc<OkTransport>,
    }

    fn harness() -> Harness {
        harness_with(&ServerConfig::default())
    }

    fn harness_with(server: &ServerConfig) -> Harness {
        let config = GatewayConfig::default();
        let signer = Arc::new(
            SigningContext::new(Some(key().clone()), Some(RsaPublicKey::from(key())), None)
                .with_verification(false),
        );
        let transport = Arc::new(OkTransport::default());
        let adapters = Adapters {
            transport: transport.clone(),
            banking: Arc::new(FakeBanking::default()),
        };
        let gateway = Gateway::assemble(&config, signer, Stores::in_memory(), adapters);
        let app = create_router(AppState::new(gateway.clone()), server);
        Harness {
            app,
            gateway,
            transport,
        }
    }

    async fn seed(gateway: &Gateway, status: LoanStatus) {
        gateway
            .dispatcher
            .services()
            .lifecycle
            .upsert(
                "APP1",
                || LoanMapping::new("APP1", "CHK1", MessageType::LoanOfferRequest),
                |m| {
                    m.status = status;
                    m.mifos_loan_id = Some(42);
                    Ok(())
                },
            )
            .await
            .unwrap();
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn post(uri: &str, body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.into())
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let h = harness();
        let response = h
            .app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["signing_material_loaded"], true);
        assert_eq!(json["verify_signatures"], false);
    }

    #[tokio::test]
    async fn test_loan_endpoint_answers_xml() {
        let h = harness();
        let raw = "<Document><Data><Header><MsgId>ESS1</MsgId>\
                   <MessageType>LOAN_CHARGES_REQUEST</MessageType></Header>\
                   <MessageDetails><CheckNumber>CHK1</CheckNumber><RequestedAmount>0</RequestedAmount>\
                   <DesiredDeductibleAmount>266667</DesiredDeductibleAmount><Tenure>96</Tenure>\
                   </MessageDetails></Data></Document>";
        let request = Request::builder()
            .method("POST")
            .uri("/api/loan")
            .header(header::CONTENT_TYPE, "application/xml")
            .body(Body::from(raw))
            .unwrap();
        let response = h.app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/xml"
        );
        let envelope = Envelope::parse(&body_string(response).await).unwrap();
        assert_eq!(envelope.header.message_type, "LOAN_CHARGES_RESPONSE");
        assert!(envelope.signature.is_some());
    }

    #[tokio::test]
    async fn test_garbage_still_gets_200() {
        let h = harness();
        let response = h.app.oneshot(post("/api/loan", "{oops")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let envelope = Envelope::parse(&body_string(response).await).unwrap();
        assert_eq!(envelope.details.child_text("ResponseCode").as_deref(), Some("8001"));
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_malformed() {
        let h = harness();
        let response = h
            .app
            .oneshot(post("/api/loan", vec![b'<', 0xff, 0xfe, b'>']))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let envelope = Envelope::parse(&body_string(response).await).unwrap();
        assert_eq!(envelope.details.child_text("ResponseCode").as_deref(), Some("8001"));
    }

    #[tokio::test]
    async fn test_oversized_document_gets_xml_answer() {
        let h = harness_with(&ServerConfig {
            max_body_size: 256,
            ..ServerConfig::default()
        });
        let response = h
            .app
            .clone()
            .oneshot(post("/api/loan", "x".repeat(1024)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE].to_str().unwrap(),
            "application/xml"
        );
        let envelope = Envelope::parse(&body_string(response).await).unwrap();
        assert_eq!(envelope.details.child_text("ResponseCode").as_deref(), Some("8001"));

        // JSON endpoints keep the plain HTTP limit.
        let response = h
            .app
            .oneshot(post("/api/webhook/mifos", "x".repeat(1024)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_webhook_applies_event() {
        let h = harness();
        seed(&h.gateway, LoanStatus::InitialApprovalSent).await;
        let body = r#"{"entityName":"LOAN","actionName":"APPROVE","entity":{"id":42}}"#;
        let response = h.app.oneshot(post("/api/webhook/mifos", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["result"], "applied");
        assert_eq!(json["status"], "LOAN_CREATED");
    }

    #[tokio::test]
    async fn test_webhook_rejects_bad_json() {
        let h = harness();
        let response = h.app.oneshot(post("/api/webhook/mifos", "nope")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_operator_disbursement_notification() {
        let h = harness();
        seed(&h.gateway, LoanStatus::LoanCreated).await;
        let response = h
            .app
            .oneshot(post("/api/loans/APP1/disbursement-notification", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["delivered"], true);
        assert_eq!(json["attempts"], 1);
        assert_eq!(h.transport.posted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_operator_failure_notification_default_reason() {
        let h = harness();
        seed(&h.gateway, LoanStatus::LoanCreated).await;
        let response = h
            .app
            .oneshot(post(
                "/api/loans/APP1/disbursement-failure-notification",
                Body::empty(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(h.transport.posted.lock().unwrap()[0].contains("Disbursement failed"));
    }

    #[tokio::test]
    async fn test_operator_errors_map_to_status_codes() {
        let h = harness();
        let response = h
            .app
            .clone()
            .oneshot(post("/api/loans/NOPE/disbursement-notification", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        seed(&h.gateway, LoanStatus::InitialApprovalSent).await;
        let response = h
            .app
            .oneshot(post("/api/loans/APP1/disbursement-notification", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert!(h.transport.posted.lock().unwrap().is_empty());
    }
}
