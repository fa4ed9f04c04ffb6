//! The generation service: admission, cancellation, downloads, shutdown.
//!
//! One instance owns the queue, the back-end set, and the track cache. RPC
//! handlers call into it; a single worker task (spawned by the daemon)
//! drains the queue strictly serially.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use aria_cache::TrackCache;
use aria_core::backend::{BackendDescriptor, BackendKind};
use aria_core::errors::{CodedError, ErrorKind};
use aria_core::events::{GenerationCancelled, Notification};
use aria_core::ids::TrackId;
use aria_core::job::{Job, JobStatus};
use aria_core::request::RawGenerateRequest;
use aria_core::track::Track;
use aria_models::fetcher;
use aria_models::manifest;
use aria_settings::Settings;

use crate::backends::BackendSet;
use crate::queue::BoundedQueue;

/// Immediate disposition of a `generate` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SubmitStatus {
    /// Content tuple already cached; no job created.
    Cached,
    /// Admitted behind other work.
    Queued,
    /// Admitted and starting immediately (or already in flight).
    Generating,
}

/// Result of a successful `generate` admission.
#[derive(Clone, Debug, Serialize)]
pub struct SubmitResult {
    /// Content address of the artifact.
    pub track_id: TrackId,
    /// Disposition.
    pub status: SubmitStatus,
    /// 1-based queue position; 0 when cached or generating.
    pub position: usize,
    /// Seed in effect (echoed so omitted seeds are reproducible).
    pub seed: u64,
    /// Back-end that will produce (or produced) the track.
    pub backend: BackendKind,
}

/// Result of a `cancel` call.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct CancelResult {
    /// Whether a job was cancelled (or flagged for cancellation).
    pub cancelled: bool,
    /// Whether the job was actively generating when flagged.
    pub was_generating: bool,
}

/// Result of a `download_backend` call.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct DownloadStart {
    /// Whether a download task was spawned.
    pub started: bool,
    /// Whether the assets were already complete.
    pub already_installed: bool,
}

pub(crate) struct QueueState {
    pub queue: BoundedQueue,
    pub active: Option<Job>,
}

pub(crate) struct ServiceInner {
    pub settings: Arc<Settings>,
    pub cache: Arc<TrackCache>,
    pub backends: BackendSet,
    pub state: Mutex<QueueState>,
    pub work_notify: Notify,
    pub idle_notify: Notify,
    pub accepting: AtomicBool,
    pub events_tx: UnboundedSender<Notification>,
}

impl ServiceInner {
    pub fn emit(&self, notification: Notification) {
        if self.events_tx.send(notification).is_err() {
            warn!("notification channel closed");
        }
    }
}

/// Handle shared between RPC handlers and the worker.
#[derive(Clone)]
pub struct GenerationService {
    pub(crate) inner: Arc<ServiceInner>,
}

impl GenerationService {
    /// Build the service. The worker is not started; call
    /// [`GenerationService::spawn_worker`] once from the daemon.
    pub fn new(
        settings: Arc<Settings>,
        cache: Arc<TrackCache>,
        events_tx: UnboundedSender<Notification>,
    ) -> Self {
        let backends = BackendSet::from_settings(&settings);
        let queue = BoundedQueue::new(settings.queue_limit);
        Self {
            inner: Arc::new(ServiceInner {
                settings,
                cache,
                backends,
                state: Mutex::new(QueueState {
                    queue,
                    active: None,
                }),
                work_notify: Notify::new(),
                idle_notify: Notify::new(),
                accepting: AtomicBool::new(true),
                events_tx,
            }),
        }
    }

    /// Start the single worker task.
    pub fn spawn_worker(&self) -> tokio::task::JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(crate::worker::worker_loop(inner))
    }

    /// The track cache (for `list_tracks` / `clear_cache`).
    pub fn cache(&self) -> &Arc<TrackCache> {
        &self.inner.cache
    }

    /// Validate, consult the cache, and admit a generation request.
    pub fn submit(&self, raw: RawGenerateRequest) -> Result<SubmitResult, CodedError> {
        if !self.inner.accepting.load(Ordering::SeqCst) {
            return Err(CodedError::new(ErrorKind::QueueFull, "daemon is shutting down"));
        }

        let request = raw.validate(
            self.inner.settings.default_backend,
            self.inner.settings.diffusion_defaults(),
            rand::random::<u64>,
        )?;

        let handle = self.inner.backends.get(request.backend);
        if !handle.is_installed() {
            let kind = if self.inner.backends.is_downloading(request.backend) {
                ErrorKind::BackendLoading
            } else {
                ErrorKind::BackendNotInstalled
            };
            return Err(CodedError::new(
                kind,
                format!("backend '{}' has no model files installed", request.backend.tag()),
            ));
        }

        let track_id = TrackId::derive(
            &request.prompt,
            request.seed,
            request.duration_sec,
            handle.model_version(),
            request.backend,
        );

        if self.inner.cache.get(&track_id).is_some() {
            return Ok(SubmitResult {
                track_id,
                status: SubmitStatus::Cached,
                position: 0,
                seed: request.seed,
                backend: request.backend,
            });
        }

        let seed = request.seed;
        let backend = request.backend;
        let mut state = self.inner.state.lock();

        // Identical content tuple already in flight: report its state
        // instead of doing the work twice.
        if state.active.as_ref().is_some_and(|j| j.track_id == track_id) {
            return Ok(SubmitResult {
                track_id,
                status: SubmitStatus::Generating,
                position: 0,
                seed,
                backend,
            });
        }
        if let Some(position) = state.queue.position(&track_id) {
            return Ok(SubmitResult {
                track_id,
                status: SubmitStatus::Queued,
                position,
                seed,
                backend,
            });
        }

        let starts_now = state.active.is_none() && state.queue.is_empty();
        let job = Job::new(track_id.clone(), request);
        let position = state.queue.push(job)?;
        drop(state);

        self.inner.work_notify.notify_one();
        Ok(SubmitResult {
            track_id,
            status: if starts_now {
                SubmitStatus::Generating
            } else {
                SubmitStatus::Queued
            },
            position: if starts_now { 0 } else { position },
            seed,
            backend,
        })
    }

    /// Cancel a queued or active job.
    pub fn cancel(&self, track_id: &TrackId) -> Result<CancelResult, CodedError> {
        let mut state = self.inner.state.lock();

        if state.active.as_ref().is_some_and(|j| &j.track_id == track_id) {
            // The engine observes the flag at the next step boundary; the
            // worker emits the terminal notification.
            if let Some(active) = state.active.as_ref() {
                active.cancel.set();
            }
            info!(track_id = %track_id, "cancel flagged on active job");
            return Ok(CancelResult {
                cancelled: true,
                was_generating: true,
            });
        }

        if let Some(job) = state.queue.remove(track_id) {
            drop(state);
            let total = self.inner.backends.get(job.request.backend).total_steps(&job.request);
            info!(track_id = %track_id, "cancelled queued job");
            self.inner.emit(Notification::Cancelled(GenerationCancelled {
                track_id: track_id.clone(),
                at_step: 0,
                total_steps: total,
            }));
            return Ok(CancelResult {
                cancelled: true,
                was_generating: false,
            });
        }
        drop(state);

        if self.inner.cache.contains(track_id) {
            Err(CodedError::new(
                ErrorKind::AlreadyComplete,
                format!("track {track_id} already completed"),
            ))
        } else {
            Err(CodedError::new(
                ErrorKind::TrackNotFound,
                format!("no job or track with id {track_id}"),
            ))
        }
    }

    /// Snapshot for `get_backends`.
    pub fn backends_snapshot(&self) -> (Vec<BackendDescriptor>, BackendKind) {
        let descriptors = vec![
            self.inner.backends.descriptor(BackendKind::MusicGen),
            self.inner.backends.descriptor(BackendKind::AceStep),
        ];
        (descriptors, self.inner.settings.default_backend)
    }

    /// Kick off an asset download for a back-end.
    pub fn download_backend(&self, kind: BackendKind) -> Result<DownloadStart, CodedError> {
        let handle = self.inner.backends.get(kind);
        if handle.is_installed() {
            return Ok(DownloadStart {
                started: false,
                already_installed: true,
            });
        }
        if !self.inner.backends.begin_download(kind) {
            return Err(CodedError::new(
                ErrorKind::DownloadInProgress,
                format!("download already running for '{}'", kind.tag()),
            ));
        }

        let inner = Arc::clone(&self.inner);
        let dir = self.inner.settings.model_dir(kind);
        drop(tokio::spawn(async move {
            let events = inner.events_tx.clone();
            let sink: fetcher::ProgressSink = Box::new(move |p| {
                let _ = events.send(Notification::Download(p));
            });
            match fetcher::fetch_missing(manifest::assets_for(kind), &dir, sink).await {
                Ok(files) => info!(backend = kind.tag(), files, "backend download finished"),
                Err(e) => warn!(backend = kind.tag(), error = %e, "backend download failed"),
            }
            inner.backends.end_download(kind);
        }));

        Ok(DownloadStart {
            started: true,
            already_installed: false,
        })
    }

    /// Queue length plus active job (diagnostics).
    pub fn queue_depth(&self) -> usize {
        let state = self.inner.state.lock();
        state.queue.len() + usize::from(state.active.is_some())
    }

    /// Stop admission, drop queued jobs (each with a cancelled
    /// notification), and wait for the active job to finish.
    pub async fn shutdown(&self) {
        self.inner.accepting.store(false, Ordering::SeqCst);

        let dropped = {
            let mut state = self.inner.state.lock();
            state.queue.drain_all()
        };
        for job in dropped {
            let total = self.inner.backends.get(job.request.backend).total_steps(&job.request);
            self.inner.emit(Notification::Cancelled(GenerationCancelled {
                track_id: job.track_id,
                at_step: 0,
                total_steps: total,
            }));
        }

        loop {
            let notified = self.inner.idle_notify.notified();
            tokio::pin!(notified);
            // Register before checking so a completion between the check
            // and the await cannot be missed.
            notified.as_mut().enable();
            if self.inner.state.lock().active.is_none() {
                break;
            }
            notified.await;
        }
        info!("generation service drained");
    }

    /// Look up a cached track, bumping its access time.
    pub fn cached_track(&self, track_id: &TrackId) -> Option<Track> {
        self.inner.cache.get(track_id)
    }

    /// Whether the active job (if any) has this id — test and status hook.
    pub fn is_generating(&self, track_id: &TrackId) -> bool {
        self.inner
            .state
            .lock()
            .active
            .as_ref()
            .is_some_and(|j| &j.track_id == track_id)
    }

    /// Current status of a job by track id, if known to the queue.
    pub fn job_status(&self, track_id: &TrackId) -> Option<JobStatus> {
        let state = self.inner.state.lock();
        if state.active.as_ref().is_some_and(|j| &j.track_id == track_id) {
            return Some(JobStatus::Generating);
        }
        if state.queue.contains(track_id) {
            return Some(JobStatus::Queued);
        }
        None
    }
}
