//! Frame encoding and the request/response/notification discriminator.
//!
//! The discriminator checks `result`/`error` before `method`: a frame that
//! somehow carries both an id-with-result and a method is treated as a
//! Response, so responses win ties against same-id requests.

use crate::error::{Error, Result, TransportError};
use crate::shared::TransportMessage;
use crate::types::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

/// Parse one JSON frame into a [`TransportMessage`].
pub fn parse_frame(bytes: &[u8]) -> Result<TransportMessage> {
    let value: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| Error::parse(format!("invalid JSON frame: {e}")))?;

    let has_id = value.get("id").is_some_and(|id| !id.is_null());
    let has_result = value.get("result").is_some();
    let has_error = value.get("error").is_some();
    let has_method = value.get("method").is_some();

    if has_id && (has_result || has_error) {
        let response: JsonRpcResponse = serde_json::from_value(value)
            .map_err(|e| Error::parse(format!("invalid response frame: {e}")))?;
        Ok(TransportMessage::Response(response))
    } else if has_method && has_id {
        let request: JsonRpcRequest = serde_json::from_value(value)
            .map_err(|e| Error::parse(format!("invalid request frame: {e}")))?;
        Ok(TransportMessage::Request(request))
    } else if has_method {
        let notification: JsonRpcNotification = serde_json::from_value(value)
            .map_err(|e| Error::parse(format!("invalid notification frame: {e}")))?;
        Ok(TransportMessage::Notification(notification))
    } else {
        Err(Error::parse("frame is neither request, response nor notification".to_string()))
    }
}

/// Serialize one frame to JSON bytes (no framing delimiter).
pub fn serialize_frame(message: &TransportMessage) -> Result<Vec<u8>> {
    let serialized = match message {
        TransportMessage::Request(request) => serde_json::to_vec(request),
        TransportMessage::Response(response) => serde_json::to_vec(response),
        TransportMessage::Notification(notification) => serde_json::to_vec(notification),
    };
    serialized
        .map_err(|e| TransportError::InvalidMessage(format!("failed to serialize frame: {e}")).into())
}
