//! Bounded two-class priority FIFO.
//!
//! High-priority jobs insert before all normal-priority jobs; arrival order
//! is preserved within each class. Admission is bounded: a push over the
//! limit is rejected with `QUEUE_FULL` and no job is created.

use aria_core::errors::{CodedError, ErrorKind};
use aria_core::ids::TrackId;
use aria_core::job::Job;
use aria_core::request::Priority;

/// FIFO with a two-class priority discipline and an admission bound.
#[derive(Debug)]
pub struct BoundedQueue {
    jobs: Vec<Job>,
    limit: usize,
}

impl BoundedQueue {
    /// Create with the configured admission bound.
    pub fn new(limit: usize) -> Self {
        Self {
            jobs: Vec::new(),
            limit,
        }
    }

    /// Queue length.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Admit a job; returns its 1-based queue position.
    pub fn push(&mut self, job: Job) -> Result<usize, CodedError> {
        if self.jobs.len() >= self.limit {
            return Err(CodedError::new(
                ErrorKind::QueueFull,
                format!("queue limit of {} reached", self.limit),
            ));
        }
        let index = match job.priority {
            Priority::Normal => self.jobs.len(),
            // Before every normal job, after previously queued high jobs.
            Priority::High => self
                .jobs
                .iter()
                .position(|j| j.priority == Priority::Normal)
                .unwrap_or(self.jobs.len()),
        };
        self.jobs.insert(index, job);
        Ok(index + 1)
    }

    /// Pop the next job to run.
    pub fn pop(&mut self) -> Option<Job> {
        if self.jobs.is_empty() {
            None
        } else {
            Some(self.jobs.remove(0))
        }
    }

    /// Remove a queued job by track id.
    pub fn remove(&mut self, id: &TrackId) -> Option<Job> {
        let index = self.jobs.iter().position(|j| &j.track_id == id)?;
        Some(self.jobs.remove(index))
    }

    /// 1-based position of a queued job.
    pub fn position(&self, id: &TrackId) -> Option<usize> {
        self.jobs.iter().position(|j| &j.track_id == id).map(|i| i + 1)
    }

    /// Whether a track id is queued.
    pub fn contains(&self, id: &TrackId) -> bool {
        self.position(id).is_some()
    }

    /// Take every queued job (shutdown drain).
    pub fn drain_all(&mut self) -> Vec<Job> {
        std::mem::take(&mut self.jobs)
    }
}
