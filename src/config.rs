//! Gateway configuration.
//!
//! Layered the usual way: compiled defaults, then an optional file, then `FSP_GATEWAY__*`
//! environment variables (`__` separates sections, e.g. `FSP_GATEWAY__FSP__CODE`).

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub fsp: FspConfig,
    #[serde(default)]
    pub counterparty: CounterpartyConfig,
    #[serde(default)]
    pub banking: BankingConfig,
    #[serde(default)]
    pub signing: SigningConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub delays: DelayConfig,
    #[serde(default)]
    pub loan: LoanProductConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Identity this gateway presents in outbound headers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FspConfig {
    pub name: String,
    pub code: String,
    /// `Receiver` value on documents sent to the counterparty.
    pub counterparty_name: String,
}

impl Default for FspConfig {
    fn default() -> Self {
        Self {
            name: "FSP".to_string(),
            code: "FL0000".to_string(),
            counterparty_name: "ESS_UTUMISHI".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterpartyConfig {
    pub callback_url: String,
    pub timeout_secs: u64,
}

impl Default for CounterpartyConfig {
    fn default() -> Self {
        Self {
            callback_url: "http://127.0.0.1:9000/ess/callback".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankingConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub tenant: String,
    pub timeout_secs: u64,
    pub product_id: i64,
    /// Disburse straight after approval instead of waiting for a manual disbursement.
    pub auto_disburse: bool,
}

impl Default for BankingConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8443/fineract-provider/api/v1".to_string(),
            username: "mifos".to_string(),
            password: "password".to_string(),
            tenant: "default".to_string(),
            timeout_secs: 30,
            product_id: 1,
            auto_disburse: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningConfig {
    pub private_key_path: PathBuf,
    pub certificate_path: PathBuf,
    /// Counterparty certificate; the gateway's own certificate is used when unset.
    pub counterparty_certificate_path: Option<PathBuf>,
    /// Test-only switch. When false inbound signatures are not checked.
    pub verify_signatures: bool,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            private_key_path: PathBuf::from("keys/private.pem"),
            certificate_path: PathBuf::from("keys/certificate.pem"),
            counterparty_certificate_path: None,
            verify_signatures: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    pub max_attempts: u32,
    pub backoff_secs: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_secs: 5,
        }
    }
}

/// Seconds to wait before each deferred notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelayConfig {
    pub loan_offer_secs: u64,
    pub top_up_offer_secs: u64,
    pub takeover_offer_secs: u64,
    pub restructure_secs: u64,
    pub disbursement_secs: u64,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            loan_offer_secs: 20,
            top_up_offer_secs: 30,
            takeover_offer_secs: 45,
            restructure_secs: 20,
            disbursement_secs: 5,
        }
    }
}

impl DelayConfig {
    pub fn loan_offer(&self) -> Duration {
        Duration::from_secs(self.loan_offer_secs)
    }

    pub fn top_up_offer(&self) -> Duration {
        Duration::from_secs(self.top_up_offer_secs)
    }

    pub fn takeover_offer(&self) -> Duration {
        Duration::from_secs(self.takeover_offer_secs)
    }

    pub fn restructure(&self) -> Duration {
        Duration::from_secs(self.restructure_secs)
    }

    pub fn disbursement(&self) -> Duration {
        Duration::from_secs(self.disbursement_secs)
    }
}

/// Pricing and limits of the single loan product the gateway offers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanProductConfig {
    /// Annual nominal rate in percent.
    pub annual_interest_rate: Decimal,
    /// Fraction of principal, e.g. `0.02` for 2%.
    pub processing_fee_rate: Decimal,
    pub insurance_rate: Decimal,
    pub other_charges: Decimal,
    pub min_loan_amount: Decimal,
    pub max_tenure: u32,
    /// Tenure used when the request carries no retirement date to cap against.
    pub default_tenure: u32,
}

impl Default for LoanProductConfig {
    fn default() -> Self {
        Self {
            annual_interest_rate: dec!(15),
            processing_fee_rate: dec!(0.02),
            insurance_rate: dec!(0.01),
            other_charges: dec!(0),
            min_loan_amount: dec!(100000),
            max_tenure: 96,
            default_tenure: 96,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub request_timeout_secs: u64,
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            request_timeout_secs: 60,
            max_body_size: 2 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    #[default]
    Memory,
    Rocksdb {
        path: PathBuf,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl GatewayConfig {
    /// Loads defaults, then `path` if given, then the environment.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&GatewayConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("FSP_GATEWAY")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}
