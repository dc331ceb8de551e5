use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client → Server request.
/// Wire: `{ "type": "req", "id": "abc", "method": "post_message", "params": {...} }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReqFrame {
    #[serde(rename = "type", default = "req_type")]
    pub frame_type: String,
    pub id: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

fn req_type() -> String {
    "req".to_string()
}

/// Server → Client response.
/// Wire: `{ "type": "res", "id": "abc", "ok": true, "payload": {...} }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    pub id: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorShape>,
}

impl ResFrame {
    pub fn ok(id: impl Into<String>, payload: impl Serialize) -> Self {
        Self {
            frame_type: "res".to_string(),
            id: id.into(),
            ok: true,
            payload: Some(serde_json::to_value(payload).unwrap_or(Value::Null)),
            error: None,
        }
    }

    pub fn err(id: impl Into<String>, code: &str, message: &str) -> Self {
        Self {
            frame_type: "res".to_string(),
            id: id.into(),
            ok: false,
            payload: None,
            error: Some(ErrorShape {
                code: code.to_string(),
                message: message.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorShape {
    pub code: String,
    pub message: String,
}
