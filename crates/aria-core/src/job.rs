//! Job lifecycle records.
//!
//! A [`Job`] is minted per accepted `generate` call. Its cancellation flag
//! is an `Arc<AtomicBool>` shared with the inference engine, which polls it
//! between decode/denoise steps; tensor calls are never interrupted mid-op.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::errors::CodedError;
use crate::ids::{JobId, TrackId};
use crate::request::{GenerateRequest, Priority};

/// Job state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting in the admission queue.
    Queued,
    /// The single active job.
    Generating,
    /// Finished; track written to cache.
    Complete,
    /// Engine error; terminal.
    Failed,
    /// Cancelled before or during generation; terminal.
    Cancelled,
    /// Refused at admission; terminal.
    Rejected,
}

impl JobStatus {
    /// Whether the job can no longer change state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Cancelled | Self::Rejected)
    }
}

/// Progress counters; `percent` stays below 100 until the terminal event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Steps completed so far.
    pub current_step: u32,
    /// Total steps for this job.
    pub total_steps: u32,
    /// `floor(99 × current/total)`.
    pub percent: u8,
}

impl Progress {
    /// Compute counters for a step position.
    pub fn at(current_step: u32, total_steps: u32) -> Self {
        let percent = if total_steps == 0 {
            0
        } else {
            ((u64::from(current_step) * 99) / u64::from(total_steps)) as u8
        };
        Self {
            current_step,
            total_steps,
            percent,
        }
    }
}

/// Shared cancellation flag, checked at step boundaries.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Fresh un-set flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A generation job owned by the queue/worker.
#[derive(Clone, Debug)]
pub struct Job {
    /// Fresh identity for this submission.
    pub job_id: JobId,
    /// Content address of the artifact being produced.
    pub track_id: TrackId,
    /// Validated request parameters.
    pub request: GenerateRequest,
    /// Priority class (drives queue insertion).
    pub priority: Priority,
    /// Current state.
    pub status: JobStatus,
    /// Progress counters.
    pub progress: Progress,
    /// Error captured on failure.
    pub error: Option<CodedError>,
    /// Submission instant.
    pub submitted_at: Instant,
    /// Set when the worker picks the job up.
    pub started_at: Option<Instant>,
    /// Set on the terminal transition.
    pub finished_at: Option<Instant>,
    /// Cooperative cancellation flag.
    pub cancel: CancelFlag,
}

impl Job {
    /// Create a queued job from a validated request.
    pub fn new(track_id: TrackId, request: GenerateRequest) -> Self {
        let priority = request.priority;
        Self {
            job_id: JobId::new(),
            track_id,
            request,
            priority,
            status: JobStatus::Queued,
            progress: Progress::default(),
            error: None,
            submitted_at: Instant::now(),
            started_at: None,
            finished_at: None,
            cancel: CancelFlag::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendKind;
    use crate::request::RawGenerateRequest;

    fn job() -> Job {
        let req = RawGenerateRequest {
            prompt: "ambient pads".into(),
            duration_sec: 10,
            ..Default::default()
        }
        .validate(BackendKind::MusicGen, Default::default(), || 1)
        .unwrap();
        let id = TrackId::derive(&req.prompt, req.seed, req.duration_sec, "v1", req.backend);
        Job::new(id, req)
    }

    #[test]
    fn new_job_is_queued() {
        let j = job();
        assert_eq!(j.status, JobStatus::Queued);
        assert!(!j.cancel.is_set());
        assert!(j.started_at.is_none());
    }

    #[test]
    fn terminal_states() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Generating.is_terminal());
        assert!(JobStatus::Complete.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(JobStatus::Rejected.is_terminal());
    }

    #[test]
    fn cancel_flag_is_shared_across_clones() {
        let j = job();
        let engine_side = j.cancel.clone();
        assert!(!engine_side.is_set());
        j.cancel.set();
        assert!(engine_side.is_set());
    }

    #[test]
    fn progress_never_reaches_100() {
        for total in [1u32, 7, 60, 500, 6000] {
            for step in 0..=total {
                let p = Progress::at(step, total);
                assert!(p.percent <= 99, "step {step}/{total} gave {}", p.percent);
            }
            assert_eq!(Progress::at(total, total).percent, 99);
        }
    }

    #[test]
    fn progress_is_monotone() {
        let total = 313;
        let mut last = 0;
        for step in 0..=total {
            let p = Progress::at(step, total).percent;
            assert!(p >= last);
            last = p;
        }
    }

    #[test]
    fn progress_zero_total_is_zero() {
        assert_eq!(Progress::at(0, 0).percent, 0);
    }
}
