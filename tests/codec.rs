//! Property tests for the frame codec.

use proptest::prelude::*;
use serde_json::json;

use mcpio::shared::{parse_frame, serialize_frame, TransportMessage};
use mcpio::types::{
    JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId,
};

fn request_ids() -> impl Strategy<Value = RequestId> {
    prop_oneof![
        any::<i64>().prop_map(RequestId::Number),
        // Digit-only strings are the interesting case: they must stay
        // strings through a round trip.
        "[0-9]{1,9}".prop_map(RequestId::String),
        "[a-zA-Z][a-zA-Z0-9_-]{0,15}".prop_map(RequestId::String),
    ]
}

fn methods() -> impl Strategy<Value = String> {
    "[a-z]{1,8}(/[a-z]{1,8}){0,2}".prop_map(|s| s)
}

fn params() -> impl Strategy<Value = Option<serde_json::Value>> {
    prop_oneof![
        Just(None),
        any::<bool>().prop_map(|b| Some(json!({ "flag": b }))),
        any::<i64>().prop_map(|n| Some(json!({ "count": n }))),
        "[ -~]{0,32}".prop_map(|s| Some(json!({ "text": s }))),
    ]
}

proptest! {
    #[test]
    fn requests_round_trip(id in request_ids(), method in methods(), params in params()) {
        let frame = TransportMessage::Request(JsonRpcRequest::new(id, method, params));
        let decoded = parse_frame(&serialize_frame(&frame).unwrap()).unwrap();
        prop_assert_eq!(decoded, frame);
    }

    #[test]
    fn notifications_round_trip(method in methods(), params in params()) {
        let frame = TransportMessage::Notification(JsonRpcNotification::new(method, params));
        let decoded = parse_frame(&serialize_frame(&frame).unwrap()).unwrap();
        prop_assert_eq!(decoded, frame);
    }

    #[test]
    fn success_responses_round_trip(id in request_ids(), value in params()) {
        let frame = TransportMessage::Response(JsonRpcResponse::success(
            id,
            value.unwrap_or(serde_json::Value::Null),
        ));
        let decoded = parse_frame(&serialize_frame(&frame).unwrap()).unwrap();
        prop_assert_eq!(decoded, frame);
    }

    #[test]
    fn error_responses_round_trip(
        id in request_ids(),
        code in -33000i32..-32000,
        message in "[ -~]{0,48}",
    ) {
        let frame = TransportMessage::Response(JsonRpcResponse::error(
            id,
            JsonRpcError { code, message, data: None },
        ));
        let decoded = parse_frame(&serialize_frame(&frame).unwrap()).unwrap();
        prop_assert_eq!(decoded, frame);
    }
}
