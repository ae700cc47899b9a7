use crate::application::Gateway;
use crate::config::ServerConfig;
use std::sync::Arc;
use std::time::Duration;

/// Bounds applied by the counterparty document endpoint itself, so that breaching them still
/// produces an XML answer.
#[derive(Debug, Clone, Copy)]
pub struct InboundLimits {
    pub max_body_size: usize,
    pub timeout: Duration,
}

impl From<&ServerConfig> for InboundLimits {
    fn from(server: &ServerConfig) -> Self {
        Self {
            max_body_size: server.max_body_size,
            timeout: Duration::from_secs(server.request_timeout_secs),
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub inbound: InboundLimits,
}

impl AppState {
    pub fn new(gateway: Gateway) -> Self {
        Self {
            gateway: Arc::new(gateway),
            started_at: chrono::Utc::now(),
            inbound: InboundLimits::from(&ServerConfig::default()),
        }
    }

    pub fn with_limits(mut self, server: &ServerConfig) -> Self {
        self.inbound = InboundLimits::from(server);
        self
    }
}
