//! Shared state handed to every method handler.

use std::sync::Arc;

use tokio::sync::Notify;

use aria_runtime::GenerationService;

/// Handler context: the generation service plus daemon-level hooks.
#[derive(Clone)]
pub struct RpcContext {
    /// Queue / cache / back-end orchestration.
    pub service: GenerationService,
    /// Signalled by the `shutdown` method; the main loop drains and exits.
    pub shutdown: Arc<Notify>,
    /// Daemon version reported by `ping`.
    pub version: String,
}
