//! Method handlers for the daemon's RPC surface.
//!
//! `generate`, `cancel`, `get_backends`, `download_backend`, `ping`,
//! `shutdown`, plus the cache-management supplements `list_tracks` and
//! `clear_cache`.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{info, instrument};

use aria_core::backend::BackendKind;
use aria_core::errors::{CodedError, ErrorKind};
use aria_core::ids::TrackId;
use aria_core::request::RawGenerateRequest;

use crate::context::RpcContext;
use crate::errors::RpcError;
use crate::registry::{MethodHandler, MethodRegistry};

/// Build the production registry with every method bound.
pub fn build_registry() -> MethodRegistry {
    let mut registry = MethodRegistry::new();
    registry.register("generate", GenerateHandler);
    registry.register("cancel", CancelHandler);
    registry.register("get_backends", GetBackendsHandler);
    registry.register("download_backend", DownloadBackendHandler);
    registry.register("ping", PingHandler);
    registry.register("shutdown", ShutdownHandler);
    registry.register("list_tracks", ListTracksHandler);
    registry.register("clear_cache", ClearCacheHandler);
    registry
}

fn require_params(params: Option<Value>) -> Result<Value, RpcError> {
    params.ok_or_else(|| RpcError::invalid_params("params object required"))
}

/// Validate, consult the cache, and admit a generation job.
pub struct GenerateHandler;

#[async_trait]
impl MethodHandler for GenerateHandler {
    #[instrument(skip(self, params, ctx), fields(method = "generate"))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let params = require_params(params)?;
        let raw: RawGenerateRequest = serde_json::from_value(params)
            .map_err(|e| RpcError::invalid_params(format!("generate params: {e}")))?;

        let result = ctx.service.submit(raw)?;
        serde_json::to_value(&result).map_err(|e| RpcError::Internal {
            message: format!("serialize response: {e}"),
        })
    }
}

/// Flip the cancellation flag on a queued or active job.
pub struct CancelHandler;

#[async_trait]
impl MethodHandler for CancelHandler {
    #[instrument(skip(self, params, ctx), fields(method = "cancel"))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let params = require_params(params)?;
        let track_id = params
            .get("track_id")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("missing 'track_id'"))?;

        let result = ctx.service.cancel(&TrackId::from_raw(track_id))?;
        Ok(json!({
            "cancelled": result.cancelled,
            "was_generating": result.was_generating,
        }))
    }
}

/// Report both back-ends with status and limits.
pub struct GetBackendsHandler;

#[async_trait]
impl MethodHandler for GetBackendsHandler {
    #[instrument(skip(self, _params, ctx), fields(method = "get_backends"))]
    async fn handle(&self, _params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let (backends, default_backend) = ctx.service.backends_snapshot();
        Ok(json!({
            "backends": backends,
            "default_backend": default_backend,
        }))
    }
}

/// Start (or report) an asset download for a back-end.
pub struct DownloadBackendHandler;

#[async_trait]
impl MethodHandler for DownloadBackendHandler {
    #[instrument(skip(self, params, ctx), fields(method = "download_backend"))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let params = require_params(params)?;
        let tag = params
            .get("backend")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("missing 'backend'"))?;
        let kind = BackendKind::parse(tag).ok_or_else(|| {
            RpcError::App(CodedError::new(
                ErrorKind::InvalidBackend,
                format!("unknown backend '{tag}'"),
            ))
        })?;

        let result = ctx.service.download_backend(kind)?;
        Ok(json!({
            "started": result.started,
            "already_installed": result.already_installed,
        }))
    }
}

/// Liveness probe.
pub struct PingHandler;

#[async_trait]
impl MethodHandler for PingHandler {
    async fn handle(&self, _params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        Ok(json!({ "status": "ok", "version": ctx.version }))
    }
}

/// Begin graceful shutdown: the response goes out first, then the main
/// loop drains the active job and exits.
pub struct ShutdownHandler;

#[async_trait]
impl MethodHandler for ShutdownHandler {
    #[instrument(skip(self, _params, ctx), fields(method = "shutdown"))]
    async fn handle(&self, _params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        info!("shutdown requested over RPC");
        ctx.shutdown.notify_one();
        Ok(json!({ "status": "shutting_down" }))
    }
}

/// Enumerate cached tracks, most recently accessed first.
pub struct ListTracksHandler;

#[async_trait]
impl MethodHandler for ListTracksHandler {
    #[instrument(skip(self, _params, ctx), fields(method = "list_tracks"))]
    async fn handle(&self, _params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let tracks = ctx.service.cache().list();
        let stats = ctx.service.cache().stats();
        Ok(json!({
            "tracks": tracks,
            "total_size_mb": (stats.bytes as f64) / (1024.0 * 1024.0),
        }))
    }
}

/// Remove every cached track.
pub struct ClearCacheHandler;

#[async_trait]
impl MethodHandler for ClearCacheHandler {
    #[instrument(skip(self, _params, ctx), fields(method = "clear_cache"))]
    async fn handle(&self, _params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let (removed, freed) = ctx.service.cache().clear();
        info!(removed, freed, "cache cleared over RPC");
        Ok(json!({
            "removed": removed,
            "freed_mb": (freed as f64) / (1024.0 * 1024.0),
        }))
    }
}
