use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use parley_bots::{BotManager, BotRegistry};
use parley_channels::ChannelStore;
use parley_core::config::ParleyConfig;

/// Central shared state — passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: ParleyConfig,
    pub store: Arc<ChannelStore>,
    pub bots: BotManager,
}

impl AppState {
    pub fn new(config: ParleyConfig) -> Self {
        let store = Arc::new(ChannelStore::new());
        let bots = BotManager::new(
            Arc::clone(&store),
            BotRegistry::with_builtins(),
            config.sandbox.clone(),
        );
        Self {
            config,
            store,
            bots,
        }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/rpc", post(crate::rpc::rpc_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
