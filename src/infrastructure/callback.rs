use crate::config::CounterpartyConfig;
use crate::domain::ports::{CallbackTransport, TransportResponse};
use crate::error::Result;
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;

/// Posts signed documents to the counterparty callback URL.
#[derive(Clone)]
pub struct HttpCallbackTransport {
    client: Client,
    url: String,
}

impl HttpCallbackTransport {
    pub fn new(config: &CounterpartyConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: config.callback_url.clone(),
        })
    }
}

#[async_trait]
impl CallbackTransport for HttpCallbackTransport {
    async fn post(&self, payload: &str) -> Result<TransportResponse> {
        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/xml")
            .body(payload.to_owned())
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Ok(TransportResponse { status, body })
    }
}
