use backend::config::Config;
use backend::{service, AppState};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    let addr = config.socket_addr()?;
    if config.draw_seed.is_some() {
        tracing::warn!("DRAW_SEED is set; draws are reproducible");
    }

    let state = AppState::from_config(&config);
    let app = service(state, &config);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Starting server on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
