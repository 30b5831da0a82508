use lottery_server::config::Config;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(action = "config", result = "fail", error = %e);
            std::process::exit(1);
        }
    };

    info!(
        action = "startup",
        result = "in_progress",
        port = config.port,
        expected_agencies = config.expected_agencies,
        lottery_winner_number = config.lottery_winner_number,
        max_workers = config.max_workers,
    );

    if let Err(e) = lottery_server::server::run(config).await {
        error!(action = "startup", result = "fail", error = %e);
        std::process::exit(1);
    }
}
