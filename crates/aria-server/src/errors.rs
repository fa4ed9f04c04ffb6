//! RPC error mapping.
//!
//! Protocol-level failures use the reserved JSON-RPC codes; domain failures
//! carry their stable application code (see the taxonomy in `aria-core`)
//! plus the string kind under `error.data.code`.

use aria_core::errors::CodedError;
use serde_json::json;

use crate::types::RpcErrorBody;

/// JSON parse failure.
pub const PARSE_ERROR: i64 = -32700;
/// Structurally invalid request object.
pub const INVALID_REQUEST: i64 = -32600;
/// Unknown method.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Params missing or of the wrong shape.
pub const INVALID_PARAMS: i64 = -32602;
/// Unexpected internal failure.
pub const INTERNAL_ERROR: i64 = -32603;

/// Errors produced by method handlers and the framing layer.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// A required param is missing or has the wrong type.
    #[error("{message}")]
    InvalidParams {
        /// What is wrong.
        message: String,
    },

    /// Unexpected internal failure.
    #[error("{message}")]
    Internal {
        /// Description.
        message: String,
    },

    /// Domain failure with a stable application code.
    #[error("{0}")]
    App(#[from] CodedError),
}

impl RpcError {
    /// Convenience constructor for missing/mistyped params.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }

    /// Integer code on the wire.
    pub fn code(&self) -> i64 {
        match self {
            Self::InvalidParams { .. } => INVALID_PARAMS,
            Self::Internal { .. } => INTERNAL_ERROR,
            Self::App(coded) => coded.kind.code(),
        }
    }

    /// Wire-format error body.
    pub fn to_error_body(&self) -> RpcErrorBody {
        RpcErrorBody {
            code: self.code(),
            message: self.to_string(),
            data: match self {
                Self::App(coded) => Some(json!({ "code": coded.kind.as_str() })),
                _ => None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aria_core::errors::ErrorKind;

    #[test]
    fn invalid_params_uses_jsonrpc_code() {
        let e = RpcError::invalid_params("missing 'prompt'");
        assert_eq!(e.code(), INVALID_PARAMS);
        assert_eq!(e.to_string(), "missing 'prompt'");
        assert!(e.to_error_body().data.is_none());
    }

    #[test]
    fn app_error_carries_stable_codes() {
        let e = RpcError::App(CodedError::new(ErrorKind::QueueFull, "queue limit of 8 reached"));
        assert_eq!(e.code(), 1009);
        let body = e.to_error_body();
        assert_eq!(body.code, 1009);
        assert_eq!(body.data.unwrap()["code"], "QUEUE_FULL");
    }

    #[test]
    fn coded_error_converts_via_from() {
        let coded = CodedError::new(ErrorKind::InvalidDuration, "5-120");
        let e: RpcError = coded.into();
        assert_eq!(e.code(), 1002);
    }

    #[test]
    fn internal_code() {
        let e = RpcError::Internal { message: "boom".into() };
        assert_eq!(e.code(), INTERNAL_ERROR);
    }
}
