use fund_portfolio_advisor::{api::start_server, config::AdvisorConfig, coordinator::Coordinator};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AdvisorConfig::from_env()?;

    info!("Fund Portfolio Advisor - API Server");
    info!(
        port = config.port,
        model = %config.gemini_model,
        language_model = config.gemini_api_key.is_some(),
        postgres = config.database_url.is_some(),
        timeout_secs = config.optimization_timeout.as_secs(),
        "Configuration loaded"
    );

    let coordinator = Arc::new(Coordinator::from_config(&config)?);
    info!("Coordinator initialized");

    start_server(coordinator, config.port).await?;

    Ok(())
}
