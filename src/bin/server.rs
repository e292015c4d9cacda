use anyhow::Result;
use dotenvy::dotenv;
use log::{error, info};

use retouch::config::Config;
use retouch::http_server::start_http_server;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv().ok();

    let config = Config::from_env()?;

    // RUST_LOG wins over LOG_LEVEL when both are set
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.log_level.as_str())).init();

    info!("🚀 Starting image editing server...");
    info!("✅ Configuration loaded | model: {} | timeout: {:?}", config.gemini_model, config.request_timeout);

    let port = config.http_port;
    info!("🌐 Starting HTTP server on port {}", port);

    if let Err(e) = start_http_server(config).await {
        error!("❌ HTTP server failed: {}", e);
        return Err(e);
    }

    Ok(())
}
