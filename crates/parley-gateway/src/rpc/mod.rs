pub mod dispatch;
pub mod handlers;

use std::sync::Arc;

use axum::{extract::State, http::HeaderMap, Json};

use parley_protocol::frames::{ReqFrame, ResFrame};

use crate::app::AppState;

/// Header carrying the transport-authenticated session id.
pub const SESSION_HEADER: &str = "x-parley-session";

/// POST /rpc — single request/response entry point for every operation.
pub async fn rpc_handler(
    State(app): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ReqFrame>,
) -> Json<ResFrame> {
    let session = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty());

    Json(dispatch::route(&req.method, req.params.as_ref(), &req.id, session, &app).await)
}
