//! Line-delimited JSON-RPC over stdin/stdout.
//!
//! One reader task consumes stdin lines and dispatches calls inline; all
//! outbound bytes (responses and notifications) funnel through one writer
//! task, so no two JSON documents ever interleave on a line. Stdout is
//! protocol-only — logs go to stderr.

use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Notify;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use aria_core::events::Notification;
use aria_runtime::GenerationService;

use crate::context::RpcContext;
use crate::errors;
use crate::handlers::build_registry;
use crate::registry::MethodRegistry;
use crate::types::{RpcErrorBody, RpcNotification, RpcRequest, RpcResponse};

/// Run the daemon's RPC loop until stdin EOF or a `shutdown` call.
///
/// Drains the active job before returning; queued jobs are dropped with
/// cancelled notifications. Returns cleanly so the caller exits 0.
pub async fn run(
    service: GenerationService,
    events_rx: mpsc::UnboundedReceiver<Notification>,
    version: &str,
) -> std::io::Result<()> {
    let (out_tx, out_rx) = mpsc::unbounded_channel::<String>();

    let writer = tokio::spawn(writer_task(out_rx));
    let pump = tokio::spawn(notification_pump(events_rx, out_tx.clone()));

    let shutdown = Arc::new(Notify::new());
    let ctx = RpcContext {
        service: service.clone(),
        shutdown: Arc::clone(&shutdown),
        version: version.to_owned(),
    };
    let registry = build_registry();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            () = shutdown.notified() => {
                info!("shutdown method received, draining");
                break;
            }
            line = lines.next_line() => match line? {
                None => {
                    info!("stdin EOF, draining");
                    break;
                }
                Some(line) => handle_line(&registry, &ctx, &out_tx, &line).await,
            }
        }
    }

    // Finish the active job; dropped queue entries emit their terminal
    // cancellations through the pump before we tear it down.
    service.shutdown().await;
    // Give the pump a beat to forward the drain's cancelled notifications
    // before tearing it down.
    tokio::time::sleep(std::time::Duration::from_millis(25)).await;
    pump.abort();
    drop(out_tx);
    if let Err(e) = writer.await {
        warn!(error = %e, "writer task ended abnormally");
    }
    Ok(())
}

/// Parse one inbound line and queue any response for the writer.
async fn handle_line(
    registry: &MethodRegistry,
    ctx: &RpcContext,
    out_tx: &mpsc::UnboundedSender<String>,
    line: &str,
) {
    if line.trim().is_empty() {
        return;
    }

    let request: RpcRequest = match serde_json::from_str(line) {
        Ok(req) => req,
        Err(e) => {
            // Try to salvage an id so the error can be correlated.
            let id = serde_json::from_str::<Value>(line)
                .ok()
                .and_then(|v| v.get("id").cloned())
                .unwrap_or(Value::Null);
            let code = if serde_json::from_str::<Value>(line).is_ok() {
                errors::INVALID_REQUEST
            } else {
                errors::PARSE_ERROR
            };
            send_response(
                out_tx,
                RpcResponse::error(
                    id,
                    RpcErrorBody {
                        code,
                        message: format!("invalid request: {e}"),
                        data: None,
                    },
                ),
            );
            return;
        }
    };

    if !request.is_call() {
        // Inbound notifications are fire-and-forget; unknown ones are
        // silently dropped per JSON-RPC.
        debug!(method = request.method, "ignoring inbound notification");
        return;
    }

    let response = registry.dispatch(request, ctx).await;
    send_response(out_tx, response);
}

fn send_response(out_tx: &mpsc::UnboundedSender<String>, response: RpcResponse) {
    match serde_json::to_string(&response) {
        Ok(line) => {
            if out_tx.send(line).is_err() {
                warn!("writer channel closed, dropping response");
            }
        }
        Err(e) => warn!(error = %e, "failed to serialize response"),
    }
}

/// Forward service notifications onto the single outbound channel.
async fn notification_pump(
    mut events_rx: mpsc::UnboundedReceiver<Notification>,
    out_tx: mpsc::UnboundedSender<String>,
) {
    while let Some(event) = events_rx.recv().await {
        let wire = RpcNotification::from_event(&event);
        match serde_json::to_string(&wire) {
            Ok(line) => {
                if out_tx.send(line).is_err() {
                    return;
                }
            }
            Err(e) => warn!(method = event.method(), error = %e, "failed to serialize notification"),
        }
    }
}

/// The single stdout writer: one JSON document per LF-terminated line.
async fn writer_task(mut out_rx: mpsc::UnboundedReceiver<String>) {
    let mut stdout = tokio::io::stdout();
    while let Some(line) = out_rx.recv().await {
        if stdout.write_all(line.as_bytes()).await.is_err() {
            return;
        }
        if stdout.write_all(b"\n").await.is_err() {
            return;
        }
        if stdout.flush().await.is_err() {
            return;
        }
    }
    let _ = stdout.flush().await;
}
