//! Method registry and async dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use metrics::{counter, histogram};
use serde_json::Value;
use tracing::warn;

use crate::context::RpcContext;
use crate::errors::{self, RpcError};
use crate::types::{RpcErrorBody, RpcRequest, RpcResponse};

/// Trait implemented by every RPC method handler.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    /// Execute the handler with the given params and context.
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError>;
}

/// Registry mapping method names to handlers.
pub struct MethodRegistry {
    handlers: HashMap<String, Arc<dyn MethodHandler>>,
}

impl MethodRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for a method name.
    pub fn register(&mut self, method: &str, handler: impl MethodHandler + 'static) {
        let _ = self.handlers.insert(method.to_owned(), Arc::new(handler));
    }

    /// Dispatch a call to the appropriate handler.
    pub async fn dispatch(&self, request: RpcRequest, ctx: &RpcContext) -> RpcResponse {
        let id = request.id.unwrap_or(Value::Null);
        let method = request.method;
        counter!("rpc_requests_total", "method" => method.clone()).increment(1);

        let Some(handler) = self.handlers.get(&method) else {
            counter!("rpc_errors_total", "method" => method.clone(), "error_type" => "method_not_found")
                .increment(1);
            return RpcResponse::error(
                id,
                RpcErrorBody {
                    code: errors::METHOD_NOT_FOUND,
                    message: format!("Method '{method}' not found"),
                    data: None,
                },
            );
        };

        let start = std::time::Instant::now();
        let response = match handler.handle(request.params, ctx).await {
            Ok(result) => RpcResponse::success(id, result),
            Err(err) => {
                counter!("rpc_errors_total", "method" => method.clone(), "error_type" => err.code().to_string())
                    .increment(1);
                RpcResponse::error(id, err.to_error_body())
            }
        };

        let duration = start.elapsed();
        histogram!("rpc_request_duration_seconds", "method" => method.clone())
            .record(duration.as_secs_f64());

        if duration.as_secs() >= 5 {
            warn!(method, duration_secs = duration.as_secs_f64(), "slow RPC request");
        }

        response
    }

    /// List registered method names (sorted).
    pub fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check whether a method is registered.
    pub fn has_method(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_helpers::make_test_context;
    use serde_json::json;

    struct EchoHandler;

    #[async_trait]
    impl MethodHandler for EchoHandler {
        async fn handle(&self, params: Option<Value>, _ctx: &RpcContext) -> Result<Value, RpcError> {
            Ok(params.unwrap_or(json!(null)))
        }
    }

    struct FailHandler;

    #[async_trait]
    impl MethodHandler for FailHandler {
        async fn handle(&self, _params: Option<Value>, _ctx: &RpcContext) -> Result<Value, RpcError> {
            Err(RpcError::Internal { message: "boom".into() })
        }
    }

    fn call(id: i64, method: &str, params: Option<Value>) -> RpcRequest {
        RpcRequest {
            jsonrpc: "2.0".into(),
            id: Some(json!(id)),
            method: method.into(),
            params,
        }
    }

    #[tokio::test]
    async fn register_and_dispatch_success() {
        let (ctx, _guard) = make_test_context();
        let mut reg = MethodRegistry::new();
        reg.register("echo", EchoHandler);

        let resp = reg.dispatch(call(1, "echo", Some(json!({"x": 1}))), &ctx).await;
        assert_eq!(resp.id, json!(1));
        assert_eq!(resp.result.unwrap()["x"], 1);
        assert!(resp.error.is_none());
    }

    #[tokio::test]
    async fn dispatch_method_not_found() {
        let (ctx, _guard) = make_test_context();
        let reg = MethodRegistry::new();

        let resp = reg.dispatch(call(2, "no.such", None), &ctx).await;
        let err = resp.error.unwrap();
        assert_eq!(err.code, errors::METHOD_NOT_FOUND);
        assert!(err.message.contains("no.such"));
    }

    #[tokio::test]
    async fn dispatch_handler_error() {
        let (ctx, _guard) = make_test_context();
        let mut reg = MethodRegistry::new();
        reg.register("fail", FailHandler);

        let resp = reg.dispatch(call(3, "fail", None), &ctx).await;
        assert_eq!(resp.error.unwrap().code, errors::INTERNAL_ERROR);
        assert_eq!(resp.id, json!(3));
    }

    #[tokio::test]
    async fn list_methods_sorted() {
        let mut reg = MethodRegistry::new();
        reg.register("b", EchoHandler);
        reg.register("a", EchoHandler);
        assert_eq!(reg.methods(), vec!["a", "b"]);
        assert!(reg.has_method("a"));
        assert!(!reg.has_method("c"));
    }

    #[tokio::test]
    async fn register_overwrites_previous() {
        let (ctx, _guard) = make_test_context();
        let mut reg = MethodRegistry::new();
        reg.register("m", EchoHandler);
        reg.register("m", FailHandler);
        let resp = reg.dispatch(call(4, "m", None), &ctx).await;
        assert!(resp.error.is_some());
    }
}
