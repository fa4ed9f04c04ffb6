//! The single worker task.
//!
//! Pops jobs strictly serially, runs inference on a blocking thread, and
//! turns engine outcomes into cache commits plus exactly one terminal
//! notification per job. Engine failures are caught here; the daemon never
//! crashes on a failed generation.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use aria_core::errors::{EngineError, ErrorKind};
use aria_core::events::{
    GenerationCancelled, GenerationComplete, GenerationError, GenerationProgress, Notification,
};
use aria_core::ids::TrackId;
use aria_core::job::{Job, JobStatus, Progress};
use aria_core::track::Track;
use aria_dsp::wav::Channels;

use crate::service::ServiceInner;

/// Emit a progress notification at most once per 5-percent bucket.
const PERCENT_BUCKET: u8 = 5;

/// Worker main loop; runs until the runtime is torn down.
pub(crate) async fn worker_loop(inner: Arc<ServiceInner>) {
    loop {
        let job = {
            let mut state = inner.state.lock();
            match state.queue.pop() {
                Some(mut job) => {
                    job.status = JobStatus::Generating;
                    job.started_at = Some(Instant::now());
                    state.active = Some(job.clone());
                    Some(job)
                }
                None => None,
            }
        };

        let Some(job) = job else {
            inner.work_notify.notified().await;
            continue;
        };

        run_job(&inner, job).await;

        inner.state.lock().active = None;
        inner.idle_notify.notify_waiters();
    }
}

/// Run one job to its terminal state.
async fn run_job(inner: &Arc<ServiceInner>, job: Job) {
    let track_id = job.track_id.clone();
    let backend = job.request.backend;
    let handle = inner.backends.get(backend).clone();
    let total_steps = handle.total_steps(&job.request);
    let started = Instant::now();

    info!(
        track_id = %track_id,
        backend = backend.tag(),
        duration_sec = job.request.duration_sec,
        seed = job.request.seed,
        "job started"
    );

    // Early-cancel: the flag may have been set while the job sat queued.
    if job.cancel.is_set() {
        finish_cancelled(inner, &track_id, 0, total_steps);
        return;
    }

    inner.backends.set_loading(backend, !handle.is_loaded());
    let load_result = handle.ensure_loaded().await;
    inner.backends.set_loading(backend, false);
    if let Err(e) = load_result {
        finish_error(inner, &track_id, &e);
        return;
    }

    let (progress_tx, progress_rx) = mpsc::unbounded_channel::<(u32, u32)>();
    let forwarder = tokio::spawn(forward_progress(
        Arc::clone(inner),
        track_id.clone(),
        progress_rx,
    ));

    let stage_path = inner.cache.stage_path(&track_id);
    let request = job.request.clone();
    let cancel = job.cancel.clone();
    let blocking_handle = handle.clone();
    let blocking_stage = stage_path.clone();

    let outcome = tokio::task::spawn_blocking(move || {
        let mut progress = |current: u32, total: u32| {
            let _ = progress_tx.send((current, total));
        };
        let audio = blocking_handle.generate_blocking(&request, &cancel, &mut progress)?;
        aria_dsp::write_wav(&blocking_stage, &audio.samples, audio.sample_rate, Channels::Mono)
            .map_err(|e| {
                EngineError::failed(ErrorKind::ModelInferenceFailed, format!("artifact write: {e}"))
            })?;
        Ok::<(f64, u32), EngineError>((audio.duration_sec(), audio.sample_rate))
    })
    .await;

    // The progress sender is dropped with the closure; drain the forwarder
    // so no progress notification can land after the terminal event.
    if let Err(e) = forwarder.await {
        warn!(track_id = %track_id, error = %e, "progress forwarder panicked");
    }

    let generation_time = started.elapsed().as_secs_f64();
    match outcome {
        Err(join_error) => {
            error!(track_id = %track_id, error = %join_error, "inference task panicked");
            inner.cache.discard_staged(&track_id);
            finish_error(
                inner,
                &track_id,
                &EngineError::failed(ErrorKind::ModelInferenceFailed, "inference task panicked"),
            );
        }
        Ok(Err(EngineError::Cancelled { at_step })) => {
            inner.cache.discard_staged(&track_id);
            finish_cancelled(inner, &track_id, at_step, total_steps);
        }
        Ok(Err(e)) => {
            inner.cache.discard_staged(&track_id);
            finish_error(inner, &track_id, &e);
        }
        Ok(Ok((duration_sec, sample_rate))) => {
            let now = chrono::Utc::now();
            let track = Track {
                track_id: track_id.clone(),
                path: inner.cache.track_path(&track_id),
                prompt: job.request.prompt.clone(),
                duration_sec,
                sample_rate,
                seed: job.request.seed,
                backend,
                model_version: handle.model_version().to_owned(),
                generation_time_sec: generation_time,
                created_at: now,
                last_accessed: now,
            };
            match inner.cache.commit(track) {
                Ok(track) => {
                    histogram!("generation_seconds", "backend" => backend.tag())
                        .record(generation_time);
                    counter!("generation_jobs_total", "outcome" => "complete").increment(1);
                    info!(
                        track_id = %track_id,
                        generation_time_sec = generation_time,
                        "job complete"
                    );
                    inner.emit(Notification::Complete(GenerationComplete {
                        track_id: track.track_id.clone(),
                        path: track.path.clone(),
                        duration_sec: track.duration_sec,
                        sample_rate: track.sample_rate,
                        generation_time_sec: track.generation_time_sec,
                        backend,
                        model_version: track.model_version,
                    }));
                }
                Err(e) => {
                    inner.cache.discard_staged(&track_id);
                    finish_error(
                        inner,
                        &track_id,
                        &EngineError::failed(
                            ErrorKind::ModelInferenceFailed,
                            format!("cache commit: {e}"),
                        ),
                    );
                }
            }
        }
    }
}

fn finish_cancelled(inner: &ServiceInner, track_id: &TrackId, at_step: u32, total_steps: u32) {
    counter!("generation_jobs_total", "outcome" => "cancelled").increment(1);
    info!(track_id = %track_id, at_step, "job cancelled");
    inner.emit(Notification::Cancelled(GenerationCancelled {
        track_id: track_id.clone(),
        at_step,
        total_steps,
    }));
}

fn finish_error(inner: &ServiceInner, track_id: &TrackId, error: &EngineError) {
    let (kind, message) = match error {
        EngineError::Failed(coded) => (coded.kind, coded.message.clone()),
        EngineError::Cancelled { .. } => (ErrorKind::Cancelled, error.to_string()),
    };
    counter!("generation_jobs_total", "outcome" => "failed").increment(1);
    warn!(track_id = %track_id, code = kind.as_str(), message, "job failed");
    inner.emit(Notification::Error(GenerationError {
        track_id: track_id.clone(),
        code: kind,
        message,
    }));
}

/// Throttle raw per-step progress into ≤ one notification per 5% bucket,
/// with a rolling ETA from the observed step rate.
async fn forward_progress(
    inner: Arc<ServiceInner>,
    track_id: TrackId,
    mut rx: mpsc::UnboundedReceiver<(u32, u32)>,
) {
    let started = Instant::now();
    let mut last_bucket: Option<u8> = None;

    while let Some((current, total)) = rx.recv().await {
        let progress = Progress::at(current, total);
        let bucket = progress.percent / PERCENT_BUCKET;
        if last_bucket == Some(bucket) {
            continue;
        }
        last_bucket = Some(bucket);

        let eta_sec = if current > 0 && total > current {
            let per_step = started.elapsed().as_secs_f64() / f64::from(current);
            Some(per_step * f64::from(total - current))
        } else {
            None
        };

        debug!(track_id = %track_id, percent = progress.percent, current, total, "progress");
        inner.emit(Notification::Progress(GenerationProgress {
            track_id: track_id.clone(),
            percent: progress.percent,
            current_step: current,
            total_steps: total,
            eta_sec,
        }));
    }
}
