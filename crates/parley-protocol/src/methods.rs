// Operation names exposed on the transport — must match client expectations.

pub const HEALTH_CHECK: &str = "health_check";

// channels
pub const CREATE_CHANNEL: &str = "create_channel";
pub const JOIN_CHANNEL: &str = "join_channel";
pub const POST_MESSAGE: &str = "post_message";
pub const MAKE_GAME_MOVE: &str = "make_game_move";
pub const SYNC_MESSAGES: &str = "sync_messages";
pub const GET_CHANNEL_INFO: &str = "get_channel_info";
pub const LIST_CHANNELS: &str = "list_channels";
pub const UPDATE_CHANNEL: &str = "update_channel";

// bots
pub const GET_BOT_CODE: &str = "get_bot_code";
