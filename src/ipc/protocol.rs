//! JSON-RPC 2.0 message types exchanged with Avogadro2.
//!
//! Only one request is ever sent (`loadMolecule`) and only the `error` member
//! of a response is interpreted; everything else a well-formed response
//! carries is ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// JSON-RPC protocol version stamped on every request.
pub const JSONRPC_VERSION: &str = "2.0";

/// Method Avogadro2 uses to replace the displayed molecule.
pub const LOAD_MOLECULE: &str = "loadMolecule";

/// A JSON-RPC 2.0 request.
///
/// The id is carried as its decimal string form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub id: String,
    pub method: String,
    pub params: Value,
}

impl Request {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.to_string(),
            method: method.into(),
            params,
        }
    }

    /// Serialize to compact JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Parameters of a `loadMolecule` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoleculeParams {
    /// File format identifier understood by Avogadro2 (e.g. "xyz", "cml").
    pub format: String,
    /// Molecule text in that format.
    pub content: String,
}

/// Error object reported by the peer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Server error {}: {message}", display_code(.code))]
pub struct RpcError {
    /// `error.code`, unset when absent or not an integer.
    pub code: Option<i64>,
    /// `error.message`, empty when absent or not a string.
    pub message: String,
}

fn display_code(code: &Option<i64>) -> String {
    code.map_or_else(|| "(no code)".to_string(), |c| c.to_string())
}

impl RpcError {
    fn from_value(error: &Value) -> Self {
        Self {
            code: error.get("code").and_then(Value::as_i64),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }
    }
}

/// Why an inbound payload could not be interpreted.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Payload is not a JSON document at all.
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    /// Payload is valid JSON, but the top-level value is not an object.
    #[error("JSON document is not an object")]
    NotAnObject,
}

/// Classification of a decoded response.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Anything without an `error` member. Nothing further is read from it.
    Ack,
    /// The peer rejected the most recent request.
    Error(RpcError),
}

impl Response {
    /// Parse and classify one frame payload.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_slice(bytes).map_err(DecodeError::InvalidJson)?;

        let object = value.as_object().ok_or(DecodeError::NotAnObject)?;

        Ok(match object.get("error") {
            Some(error) => Response::Error(RpcError::from_value(error)),
            None => Response::Ack,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_request_roundtrip() {
        let params = MoleculeParams {
            format: "xyz".to_string(),
            content: "1\nH atom\nH 0 0 0".to_string(),
        };
        let request = Request::new(7, LOAD_MOLECULE, serde_json::to_value(&params).unwrap());

        let bytes = request.to_bytes().unwrap();
        let parsed: Request = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(parsed, request);
        assert_eq!(parsed.jsonrpc, "2.0");
        assert_eq!(parsed.id, "7");
        let parsed_params: MoleculeParams = serde_json::from_value(parsed.params).unwrap();
        assert_eq!(parsed_params, params);
    }

    #[test]
    fn test_request_is_compact_with_string_id() {
        let request = Request::new(1, LOAD_MOLECULE, json!({"format": "xyz", "content": ""}));
        let text = String::from_utf8(request.to_bytes().unwrap()).unwrap();
        assert_eq!(
            text,
            r#"{"jsonrpc":"2.0","id":"1","method":"loadMolecule","params":{"content":"","format":"xyz"}}"#
        );
    }

    #[test]
    fn test_error_response() {
        let response = Response::from_slice(br#"{"error":{"code":42,"message":"bad format"}}"#).unwrap();
        assert_eq!(
            response,
            Response::Error(RpcError {
                code: Some(42),
                message: "bad format".to_string(),
            })
        );
    }

    #[test]
    fn test_error_response_missing_fields() {
        let response = Response::from_slice(br#"{"id":"3","error":{}}"#).unwrap();
        assert_eq!(
            response,
            Response::Error(RpcError {
                code: None,
                message: String::new(),
            })
        );
    }

    #[test]
    fn test_success_response_is_ack() {
        let response = Response::from_slice(br#"{"jsonrpc":"2.0","id":"1","result":true}"#).unwrap();
        assert_eq!(response, Response::Ack);
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            Response::from_slice(b"{not json"),
            Err(DecodeError::InvalidJson(_))
        ));
        assert!(matches!(
            Response::from_slice(b""),
            Err(DecodeError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_non_object() {
        assert!(matches!(
            Response::from_slice(b"[1,2,3]"),
            Err(DecodeError::NotAnObject)
        ));
    }

    #[test]
    fn test_rpc_error_display() {
        let err = RpcError {
            code: Some(-32602),
            message: "Invalid params".to_string(),
        };
        assert_eq!(err.to_string(), "Server error -32602: Invalid params");
    }
}
