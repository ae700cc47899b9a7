//! HTTP adapter for a Fineract-style core banking API.

use crate::config::BankingConfig;
use crate::domain::money::Money;
use crate::domain::ports::{CoreBanking, NewClient, NewLoan};
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, RequestBuilder};
use serde_json::{Value, json};
use std::time::Duration;

const TENANT_HEADER: &str = "Fineract-Platform-TenantId";
const DATE_FORMAT: &str = "dd MMMM yyyy";
const LOCALE: &str = "en";
/// Monthly, in the banking engine's period-type codes.
const PERIOD_MONTHS: u8 = 2;

fn format_date(date: NaiveDate) -> String {
    date.format("%d %B %Y").to_string()
}

#[derive(Clone)]
pub struct HttpCoreBanking {
    client: Client,
    config: BankingConfig,
}

impl HttpCoreBanking {
    pub fn new(config: BankingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    fn request(&self, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), path);
        self.client
            .post(url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .header(TENANT_HEADER, &self.config.tenant)
    }

    /// Sends `body` and returns the decoded JSON reply, failing on any non-2xx status.
    async fn post(&self, path: &str, body: Value) -> Result<Value> {
        let response = self.request(path).json(&body).send().await?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(GatewayError::Banking(format!(
                "POST {path} returned {}: {text}",
                status.as_u16()
            )));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    fn resource_id(reply: &Value, field: &str) -> Result<i64> {
        reply
            .get(field)
            .or_else(|| reply.get("resourceId"))
            .and_then(Value::as_i64)
            .ok_or_else(|| GatewayError::Banking(format!("reply carries no {field}: {reply}")))
    }
}

#[async_trait]
impl CoreBanking for HttpCoreBanking {
    async fn create_client(&self, client: &NewClient) -> Result<i64> {
        let mut body = json!({
            "officeId": 1,
            "legalFormId": 1,
            "firstname": client.first_name,
            "lastname": client.last_name,
            "externalId": client.external_id,
            "active": true,
            "activationDate": format_date(client.activation_date),
            "dateFormat": DATE_FORMAT,
            "locale": LOCALE,
        });
        if let Some(mobile) = &client.mobile_number {
            body["mobileNo"] = json!(mobile);
        }
        if let Some(dob) = client.date_of_birth {
            body["dateOfBirth"] = json!(format_date(dob));
        }
        let reply = self.post("clients", body).await?;
        let id = Self::resource_id(&reply, "clientId")?;
        tracing::info!(client_id = id, external_id = %client.external_id, "banking client created");
        Ok(id)
    }

    async fn create_loan(&self, loan: &NewLoan) -> Result<i64> {
        let submitted = format_date(loan.submitted_on);
        let body = json!({
            "clientId": loan.client_id,
            "productId": self.config.product_id,
            "externalId": loan.external_id,
            "principal": loan.principal.value(),
            "loanTermFrequency": loan.tenure,
            "loanTermFrequencyType": PERIOD_MONTHS,
            "numberOfRepayments": loan.tenure,
            "repaymentEvery": 1,
            "repaymentFrequencyType": PERIOD_MONTHS,
            "interestRatePerPeriod": loan.annual_rate,
            "interestRateFrequencyType": 3,
            "amortizationType": 1,
            "interestType": 0,
            "interestCalculationPeriodType": 1,
            "transactionProcessingStrategyCode": "mifos-standard-strategy",
            "loanType": "individual",
            "expectedDisbursementDate": submitted,
            "submittedOnDate": submitted,
            "dateFormat": DATE_FORMAT,
            "locale": LOCALE,
        });
        let reply = self.post("loans", body).await?;
        let id = Self::resource_id(&reply, "loanId")?;
        tracing::info!(loan_id = id, external_id = %loan.external_id, "banking loan created");
        Ok(id)
    }

    async fn approve_loan(&self, loan_id: i64, on: NaiveDate) -> Result<()> {
        let body = json!({
            "approvedOnDate": format_date(on),
            "dateFormat": DATE_FORMAT,
            "locale": LOCALE,
        });
        self.post(&format!("loans/{loan_id}?command=approve"), body).await?;
        Ok(())
    }

    async fn disburse_loan(&self, loan_id: i64, amount: Money, on: NaiveDate) -> Result<()> {
        let body = json!({
            "actualDisbursementDate": format_date(on),
            "transactionAmount": amount.value(),
            "dateFormat": DATE_FORMAT,
            "locale": LOCALE,
        });
        self.post(&format!("loans/{loan_id}?command=disburse"), body).await?;
        Ok(())
    }

    async fn reschedule_loan(&self, loan_id: i64, extra_terms: u32, on: NaiveDate) -> Result<()> {
        let date = format_date(on);
        let body = json!({
            "loanId": loan_id,
            "rescheduleFromDate": date,
            "submittedOnDate": date,
            "rescheduleReasonId": 1,
            "extraTerms": extra_terms,
            "dateFormat": DATE_FORMAT,
            "locale": LOCALE,
        });
        self.post("rescheduleloans", body).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{header, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn banking(server: &MockServer) -> HttpCoreBanking {
        HttpCoreBanking::new(BankingConfig {
            base_url: format!("{}/api/v1/", server.uri()),
            timeout_secs: 5,
            ..BankingConfig::default()
        })
        .unwrap()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 4).unwrap()
    }

    #[test]
    fn test_date_format() {
        assert_eq!(format_date(date()), "04 March 2025");
    }

    #[tokio::test]
    async fn test_create_client_returns_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/clients"))
            .and(header(TENANT_HEADER, "default"))
            .and(header_exists("authorization"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"clientId": 17, "resourceId": 17})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let id = banking(&server)
            .create_client(&NewClient {
                external_id: "CHK1".into(),
                full_name: "Amina Juma".into(),
                first_name: "Amina".into(),
                last_name: "Juma".into(),
                mobile_number: None,
                date_of_birth: None,
                activation_date: date(),
            })
            .await
            .unwrap();
        assert_eq!(id, 17);
    }

    #[tokio::test]
    async fn test_create_loan_falls_back_to_resource_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/loans"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"resourceId": 88})))
            .mount(&server)
            .await;

        let id = banking(&server)
            .create_loan(&NewLoan {
                client_id: 17,
                external_id: "APP1".into(),
                principal: Money::new(dec!(1000000)),
                tenure: 24,
                annual_rate: dec!(15),
                submitted_on: date(),
            })
            .await
            .unwrap();
        assert_eq!(id, 88);
    }

    #[tokio::test]
    async fn test_commands_use_query_string() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/loans/88"))
            .and(query_param("command", "disburse"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"loanId": 88})))
            .expect(1)
            .mount(&server)
            .await;

        banking(&server)
            .disburse_loan(88, Money::new(dec!(100)), date())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_error_status_becomes_banking_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("denied"))
            .mount(&server)
            .await;

        let err = banking(&server).approve_loan(1, date()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Banking(msg) if msg.contains("403")));
    }
}
