use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use fsp_gateway::application::Gateway;
use fsp_gateway::calculation::{AffordabilityRequest, LoanCalculator};
use fsp_gateway::config::{GatewayConfig, LoggingConfig};
use fsp_gateway::interfaces::http::{AppState, create_router};
use miette::{IntoDiagnostic, Result};
use rust_decimal::Decimal;
use std::net::SocketAddr;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, env = "FSP_GATEWAY_CONFIG")]
    config: Option<String>,

    /// Log level filter, overrides the configured one
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP gateway (default)
    Serve {
        /// Address to listen on, overrides the configured one
        #[arg(short, long)]
        listen: Option<SocketAddr>,
    },
    /// Price a loan with the configured product and print the quote as JSON
    Quote {
        /// Requested principal; omit to compute the largest affordable loan
        #[arg(long)]
        amount: Option<Decimal>,
        /// Monthly deduction the employee can carry
        #[arg(long)]
        deduction: Decimal,
        /// Tenure in months; omit to search the candidate tenures
        #[arg(long)]
        tenure: Option<u32>,
        /// Retirement date (YYYY-MM-DD) capping the tenure
        #[arg(long)]
        retirement_date: Option<NaiveDate>,
    },
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let registry = tracing_subscriber::registry().with(filter);
    if logging.json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = GatewayConfig::load(cli.config.as_deref()).into_diagnostic()?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if cli.json {
        config.logging.json = true;
    }

    match cli.command.unwrap_or(Command::Serve { listen: None }) {
        Command::Quote {
            amount,
            deduction,
            tenure,
            retirement_date,
        } => {
            let calculator = LoanCalculator::new(config.loan.clone());
            let quote = calculator
                .quote(&AffordabilityRequest {
                    requested_amount: amount,
                    desired_deductible_amount: Some(deduction),
                    tenure,
                    retirement_date,
                    as_of: Some(chrono::Utc::now().date_naive()),
                    ..Default::default()
                })
                .into_diagnostic()?;
            println!("{}", serde_json::to_string_pretty(&quote).into_diagnostic()?);
            Ok(())
        }
        Command::Serve { listen } => {
            if let Some(addr) = listen {
                config.server.listen_addr = addr;
            }
            serve(config).await
        }
    }
}

async fn serve(config: GatewayConfig) -> Result<()> {
    init_tracing(&config.logging);

    let gateway = Gateway::from_config(&config).into_diagnostic()?;
    if !gateway.signer.can_sign() {
        tracing::warn!("no usable signing material, outbound documents will be refused");
    }

    let recovered = gateway.scheduler.recover().await.into_diagnostic()?;
    tracing::info!(count = recovered.len(), "pending notifications re-armed");

    let app = create_router(AppState::new(gateway), &config.server);
    let listener = tokio::net::TcpListener::bind(config.server.listen_addr)
        .await
        .into_diagnostic()?;
    tracing::info!(addr = %config.server.listen_addr, fsp = %config.fsp.code, "gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .into_diagnostic()?;

    tracing::info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
