use parley_core::ParleyError;
use parley_protocol::frames::ResFrame;
use parley_protocol::methods;

use crate::app::AppState;
use crate::rpc::handlers;

/// Route an RPC method call to the correct handler.
///
/// Session requirements are enforced here: everything except health_check,
/// create_channel, and list_channels needs a transport-supplied session id.
pub async fn route(
    method: &str,
    params: Option<&serde_json::Value>,
    req_id: &str,
    session: Option<&str>,
    app: &AppState,
) -> ResFrame {
    let session = match (method, session) {
        (methods::HEALTH_CHECK | methods::CREATE_CHANNEL | methods::LIST_CHANNELS, s) => {
            s.unwrap_or_default()
        }
        (_, Some(s)) => s,
        (_, None) => {
            let e = ParleyError::NoSession;
            return ResFrame::err(req_id, e.code(), &e.to_string());
        }
    };

    match method {
        methods::HEALTH_CHECK => handlers::handle_health_check(req_id).await,
        methods::CREATE_CHANNEL => handlers::handle_create_channel(params, req_id, app).await,
        methods::JOIN_CHANNEL => handlers::handle_join_channel(params, req_id, session, app).await,
        methods::POST_MESSAGE => handlers::handle_post_message(params, req_id, session, app).await,
        methods::MAKE_GAME_MOVE => {
            handlers::handle_make_game_move(params, req_id, session, app).await
        }
        methods::SYNC_MESSAGES => {
            handlers::handle_sync_messages(params, req_id, session, app).await
        }
        methods::GET_CHANNEL_INFO => {
            handlers::handle_get_channel_info(params, req_id, session, app).await
        }
        methods::GET_BOT_CODE => handlers::handle_get_bot_code(params, req_id, session, app).await,
        methods::LIST_CHANNELS => handlers::handle_list_channels(req_id, app).await,
        methods::UPDATE_CHANNEL => {
            handlers::handle_update_channel(params, req_id, session, app).await
        }
        _ => {
            let e = ParleyError::InvalidRequest(format!("unknown method '{}'", method));
            ResFrame::err(req_id, e.code(), &e.to_string())
        }
    }
}
