// Verify wire format matches what Parley clients expect.
// These tests ensure protocol compatibility is never broken.

use parley_protocol::frames::{ReqFrame, ResFrame};

#[test]
fn req_frame_round_trip() {
    let json = r#"{"type":"req","id":"abc-123","method":"post_message","params":{"channel_id":"chn_1"}}"#;
    let req: ReqFrame = serde_json::from_str(json).unwrap();
    assert_eq!(req.frame_type, "req");
    assert_eq!(req.method, "post_message");
    assert_eq!(req.id, "abc-123");
    assert!(req.params.is_some());
}

#[test]
fn req_frame_type_defaults_when_omitted() {
    let json = r#"{"id":"r1","method":"health_check"}"#;
    let req: ReqFrame = serde_json::from_str(json).unwrap();
    assert_eq!(req.frame_type, "req");
    assert!(req.params.is_none());
}

#[test]
fn res_ok_serialization() {
    let res = ResFrame::ok("req-1", serde_json::json!({"msg_id": 7}));
    let json = serde_json::to_string(&res).unwrap();

    assert!(json.contains(r#""type":"res""#));
    assert!(json.contains(r#""ok":true"#));
    assert!(json.contains(r#""msg_id":7"#));
    // error field must be absent on success
    assert!(!json.contains(r#""error""#));
}

#[test]
fn res_err_serialization() {
    let res = ResFrame::err("req-2", "NOT_MEMBER", "not a channel member");
    let json = serde_json::to_string(&res).unwrap();

    assert!(json.contains(r#""ok":false"#));
    assert!(json.contains(r#""NOT_MEMBER""#));
    // payload must be absent on error
    assert!(!json.contains(r#""payload""#));
}
