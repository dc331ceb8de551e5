use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use parley_gateway::app;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley_gateway=info,tower_http=debug".into()),
        )
        .init();

    // load config: explicit PARLEY_CONFIG path > ./parley.toml > defaults
    let config_path = std::env::var("PARLEY_CONFIG").ok();
    let config = parley_core::config::ParleyConfig::load(config_path.as_deref())
        .unwrap_or_else(|e| {
            tracing::warn!("Config load failed ({}), using defaults", e);
            parley_core::config::ParleyConfig::default()
        });

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;
    let state = Arc::new(app::AppState::new(config));
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!("Parley gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
