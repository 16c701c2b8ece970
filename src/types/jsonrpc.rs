//! JSON-RPC 2.0 frame types.
//!
//! Frames are kept generic: `params` and `result` stay [`Value`] so handlers
//! can deserialize lazily into their own parameter structs. [`RequestId`]
//! preserves the scalar kind of the id (string vs number) so responses echo
//! it exactly.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// The protocol version marker every frame carries.
pub const JSONRPC_VERSION: &str = "2.0";

/// A request id, preserving the original scalar kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric id.
    Number(i64),
    /// String id.
    String(String),
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

/// A JSON-RPC request frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Request id, echoed on the matching response.
    pub id: RequestId,
    /// Method name.
    pub method: String,
    /// Raw parameters; handlers deserialize lazily.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Build a request frame.
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }

    /// Deserialize the params into a concrete type, treating absent params
    /// as `null` (so types with all-optional fields still parse).
    pub fn params_as<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        let value = self.params.clone().unwrap_or(Value::Null);
        serde_json::from_value(value)
            .map_err(|e| Error::invalid_params(format!("{}: {e}", self.method)))
    }
}

/// A JSON-RPC notification frame (no id, no response).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Method name.
    pub method: String,
    /// Raw parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    /// Build a notification frame.
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }

    /// Deserialize the params into a concrete type.
    pub fn params_as<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        let value = self.params.clone().unwrap_or(Value::Null);
        serde_json::from_value(value)
            .map_err(|e| Error::invalid_params(format!("{}: {e}", self.method)))
    }
}

/// The error object of an error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// JSON-RPC error code.
    pub code: i32,
    /// Human-readable message.
    pub message: String,
    /// Optional structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Result-XOR-error payload of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponsePayload {
    /// Success payload.
    Result {
        /// The result value.
        result: Value,
    },
    /// Failure payload.
    Error {
        /// The error object.
        error: JsonRpcError,
    },
}

/// A JSON-RPC response frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// The id of the request this answers, kind preserved.
    pub id: RequestId,
    /// Result or error.
    #[serde(flatten)]
    pub payload: ResponsePayload,
}

impl JsonRpcResponse {
    /// Build a success response.
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            payload: ResponsePayload::Result { result },
        }
    }

    /// Build an error response.
    pub fn error(id: RequestId, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            payload: ResponsePayload::Error { error },
        }
    }

    /// The success payload, if any.
    pub fn result(&self) -> Option<&Value> {
        match &self.payload {
            ResponsePayload::Result { result } => Some(result),
            ResponsePayload::Error { .. } => None,
        }
    }

    /// The error payload, if any.
    pub fn error_payload(&self) -> Option<&JsonRpcError> {
        match &self.payload {
            ResponsePayload::Error { error } => Some(error),
            ResponsePayload::Result { .. } => None,
        }
    }

    /// Unwrap into a `Result`, converting a wire error into [`Error::Peer`].
    pub fn into_result(self) -> Result<Value> {
        match self.payload {
            ResponsePayload::Result { result } => Ok(result),
            ResponsePayload::Error { error } => Err(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_id_preserves_scalar_kind() {
        let numeric: RequestId = serde_json::from_str("7").unwrap();
        assert_eq!(numeric, RequestId::Number(7));
        let stringy: RequestId = serde_json::from_str("\"7\"").unwrap();
        assert_eq!(stringy, RequestId::String("7".to_string()));
        assert_ne!(numeric, stringy);

        assert_eq!(serde_json::to_string(&numeric).unwrap(), "7");
        assert_eq!(serde_json::to_string(&stringy).unwrap(), "\"7\"");
    }

    #[test]
    fn response_flattens_result() {
        let resp = JsonRpcResponse::success(RequestId::Number(1), json!({"ok": true}));
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["id"], 1);
        assert_eq!(value["result"]["ok"], true);
        assert!(value.get("error").is_none());
    }

    #[test]
    fn response_flattens_error() {
        let resp = JsonRpcResponse::error(
            RequestId::from("r-1"),
            JsonRpcError {
                code: -32601,
                message: "method not found".into(),
                data: None,
            },
        );
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["error"]["code"], -32601);
        assert!(value.get("result").is_none());

        let back: JsonRpcResponse = serde_json::from_value(value).unwrap();
        assert_eq!(back.error_payload().unwrap().code, -32601);
    }

    #[test]
    fn error_response_with_null_result_style_is_error() {
        let raw = json!({
            "jsonrpc": "2.0",
            "id": "abc",
            "error": {"code": -32700, "message": "parse error"}
        });
        let resp: JsonRpcResponse = serde_json::from_value(raw).unwrap();
        assert!(resp.result().is_none());
        assert_eq!(resp.error_payload().unwrap().code, -32700);
    }

    #[test]
    fn params_as_tolerates_missing_params() {
        #[derive(serde::Deserialize, Default)]
        struct Empty {}
        let req = JsonRpcRequest::new(RequestId::Number(1), "ping", None);
        // `Empty` has no required fields, so null params must parse.
        let _empty: Option<Empty> = req.params_as().unwrap();
    }

    #[test]
    fn encode_emits_jsonrpc_first() {
        let req = JsonRpcRequest::new(RequestId::Number(1), "tools/list", None);
        let encoded = serde_json::to_string(&req).unwrap();
        assert!(encoded.starts_with("{\"jsonrpc\":\"2.0\""));
    }
}
