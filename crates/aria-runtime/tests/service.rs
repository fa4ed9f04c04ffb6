//! Admission, cancellation, and lifecycle behavior of the generation
//! service, exercised without touching ONNX Runtime.

use std::path::Path;
use std::sync::Arc;

use assert_matches::assert_matches;
use tokio::sync::mpsc;

use aria_cache::TrackCache;
use aria_core::backend::{BackendKind, BackendStatus};
use aria_core::errors::ErrorKind;
use aria_core::events::Notification;
use aria_core::ids::TrackId;
use aria_core::request::RawGenerateRequest;
use aria_core::track::Track;
use aria_runtime::{GenerationService, SubmitStatus};
use aria_settings::Settings;

struct Fixture {
    service: GenerationService,
    events: mpsc::UnboundedReceiver<Notification>,
    _dir: tempfile::TempDir,
}

/// Write zero-byte files for every required asset so `is_installed` holds.
fn install_fake_assets(cache_dir: &Path, kind: BackendKind) {
    let dir = cache_dir.join(kind.tag());
    std::fs::create_dir_all(&dir).unwrap();
    for f in aria_models::manifest::assets_for(kind).files {
        std::fs::write(dir.join(f.name), b"").unwrap();
    }
}

fn fixture(queue_limit: usize, install: &[BackendKind]) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    for kind in install {
        install_fake_assets(dir.path(), *kind);
    }
    let settings = Arc::new(Settings {
        cache_dir: dir.path().to_path_buf(),
        queue_limit,
        ..Default::default()
    });
    let cache = Arc::new(TrackCache::open(&settings.tracks_dir(), 1024, None).unwrap());
    let (tx, rx) = mpsc::unbounded_channel();
    Fixture {
        service: GenerationService::new(settings, cache, tx),
        events: rx,
        _dir: dir,
    }
}

fn request(prompt: &str, duration: u32) -> RawGenerateRequest {
    RawGenerateRequest {
        prompt: prompt.into(),
        duration_sec: duration,
        seed: Some(42),
        ..Default::default()
    }
}

#[tokio::test]
async fn submit_rejects_invalid_duration_synchronously() {
    let f = fixture(8, &[BackendKind::MusicGen]);
    let err = f.service.submit(request("p", 4)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidDuration);
    let err = f.service.submit(request("p", 121)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidDuration);
    // No job was created for either.
    assert_eq!(f.service.queue_depth(), 0);
}

#[tokio::test]
async fn submit_rejects_uninstalled_backend() {
    let f = fixture(8, &[]);
    let err = f.service.submit(request("p", 10)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::BackendNotInstalled);
}

#[tokio::test]
async fn first_submit_reports_generating_with_position_zero() {
    let f = fixture(8, &[BackendKind::MusicGen]);
    let result = f.service.submit(request("lofi hip hop", 10)).unwrap();
    assert_eq!(result.status, SubmitStatus::Generating);
    assert_eq!(result.position, 0);
    assert_eq!(result.seed, 42);
    assert_eq!(result.backend, BackendKind::MusicGen);
}

#[tokio::test]
async fn identical_tuple_resubmit_reports_existing_job() {
    let f = fixture(8, &[BackendKind::MusicGen]);
    let first = f.service.submit(request("same prompt", 10)).unwrap();
    let second = f.service.submit(request("same prompt", 10)).unwrap();
    // Same content address, no second job admitted.
    assert_eq!(first.track_id, second.track_id);
    assert_eq!(f.service.queue_depth(), 1);
}

#[tokio::test]
async fn distinct_seeds_are_distinct_jobs() {
    let f = fixture(8, &[BackendKind::MusicGen]);
    let mut a = request("same prompt", 10);
    a.seed = Some(1);
    let mut b = request("same prompt", 10);
    b.seed = Some(2);
    let ra = f.service.submit(a).unwrap();
    let rb = f.service.submit(b).unwrap();
    assert_ne!(ra.track_id, rb.track_id);
    assert_eq!(f.service.queue_depth(), 2);
}

#[tokio::test]
async fn admission_bound_returns_queue_full() {
    let f = fixture(5, &[BackendKind::MusicGen]);
    for i in 0..5 {
        let _ = f.service.submit(request(&format!("prompt {i}"), 10)).unwrap();
    }
    let err = f.service.submit(request("prompt 5", 10)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::QueueFull);
    assert_eq!(f.service.queue_depth(), 5);
}

#[tokio::test]
async fn high_priority_inserts_ahead_of_normals() {
    let f = fixture(8, &[BackendKind::MusicGen]);
    let _ = f.service.submit(request("n1", 10)).unwrap();
    let _ = f.service.submit(request("n2", 10)).unwrap();

    let mut high = request("h", 10);
    high.priority = Some("high".into());
    let result = f.service.submit(high).unwrap();
    assert_eq!(result.status, SubmitStatus::Queued);
    assert_eq!(result.position, 1, "high priority lands ahead of both normals");
}

#[tokio::test]
async fn cached_tuple_returns_cached_without_enqueue() {
    let f = fixture(8, &[BackendKind::MusicGen]);

    // Derive the id exactly as submit would, then plant a cache entry.
    let model_version = "musicgen-small-onnx-1.0";
    let track_id = TrackId::derive("warm prompt", 42, 10, model_version, BackendKind::MusicGen);
    std::fs::write(f.service.cache().stage_path(&track_id), vec![0u8; 64]).unwrap();
    let now = chrono::Utc::now();
    let _ = f
        .service
        .cache()
        .commit(Track {
            track_id: track_id.clone(),
            path: f.service.cache().track_path(&track_id),
            prompt: "warm prompt".into(),
            duration_sec: 10.0,
            sample_rate: 32_000,
            seed: 42,
            backend: BackendKind::MusicGen,
            model_version: model_version.into(),
            generation_time_sec: 1.0,
            created_at: now,
            last_accessed: now,
        })
        .unwrap();

    let result = f.service.submit(request("warm prompt", 10)).unwrap();
    assert_eq!(result.status, SubmitStatus::Cached);
    assert_eq!(result.track_id, track_id);
    assert_eq!(f.service.queue_depth(), 0, "cache hit creates no job");
}

#[tokio::test]
async fn cancel_queued_job_emits_cancelled_notification() {
    let mut f = fixture(8, &[BackendKind::MusicGen]);
    let submitted = f.service.submit(request("to cancel", 10)).unwrap();

    let result = f.service.cancel(&submitted.track_id).unwrap();
    assert!(result.cancelled);
    assert!(!result.was_generating);
    assert_eq!(f.service.queue_depth(), 0);

    let event = f.events.try_recv().expect("cancellation notification");
    assert_matches!(event, Notification::Cancelled(ref c) => {
        assert_eq!(c.track_id, submitted.track_id);
        assert_eq!(c.at_step, 0);
        assert_eq!(c.total_steps, 500);
    });
}

#[tokio::test]
async fn cancel_unknown_track_is_not_found() {
    let f = fixture(8, &[BackendKind::MusicGen]);
    let err = f.service.cancel(&TrackId::from_raw("00ff00ff00ff00ff")).unwrap_err();
    assert_eq!(err.kind, ErrorKind::TrackNotFound);
}

#[tokio::test]
async fn cancel_completed_track_is_already_complete() {
    let f = fixture(8, &[BackendKind::MusicGen]);
    let track_id = TrackId::from_raw("11aa11aa11aa11aa");
    std::fs::write(f.service.cache().stage_path(&track_id), vec![0u8; 16]).unwrap();
    let now = chrono::Utc::now();
    let _ = f
        .service
        .cache()
        .commit(Track {
            track_id: track_id.clone(),
            path: f.service.cache().track_path(&track_id),
            prompt: "done".into(),
            duration_sec: 1.0,
            sample_rate: 32_000,
            seed: 1,
            backend: BackendKind::MusicGen,
            model_version: "v".into(),
            generation_time_sec: 0.5,
            created_at: now,
            last_accessed: now,
        })
        .unwrap();

    let err = f.service.cancel(&track_id).unwrap_err();
    assert_eq!(err.kind, ErrorKind::AlreadyComplete);
}

#[tokio::test]
async fn backends_snapshot_lists_both_with_status() {
    let f = fixture(8, &[BackendKind::MusicGen]);
    let (descriptors, default) = f.service.backends_snapshot();
    assert_eq!(descriptors.len(), 2);
    assert_eq!(default, BackendKind::MusicGen);

    let musicgen = descriptors.iter().find(|d| d.kind == BackendKind::MusicGen).unwrap();
    assert_eq!(musicgen.status, BackendStatus::Ready);
    let ace = descriptors.iter().find(|d| d.kind == BackendKind::AceStep).unwrap();
    assert_eq!(ace.status, BackendStatus::NotInstalled);
}

#[tokio::test]
async fn download_installed_backend_reports_already_installed() {
    let f = fixture(8, &[BackendKind::MusicGen]);
    let result = f.service.download_backend(BackendKind::MusicGen).unwrap();
    assert!(!result.started);
    assert!(result.already_installed);
}

#[tokio::test]
async fn shutdown_drops_queue_and_refuses_new_work() {
    let mut f = fixture(8, &[BackendKind::MusicGen]);
    let a = f.service.submit(request("a", 10)).unwrap();
    let b = f.service.submit(request("b", 10)).unwrap();

    f.service.shutdown().await;
    assert_eq!(f.service.queue_depth(), 0);

    // Both dropped jobs got a cancelled terminal event.
    let mut cancelled = Vec::new();
    while let Ok(event) = f.events.try_recv() {
        if let Notification::Cancelled(c) = event {
            cancelled.push(c.track_id);
        }
    }
    assert!(cancelled.contains(&a.track_id));
    assert!(cancelled.contains(&b.track_id));

    let err = f.service.submit(request("late", 10)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::QueueFull);
}

#[tokio::test]
async fn job_status_reflects_queue_membership() {
    let f = fixture(8, &[BackendKind::MusicGen]);
    let submitted = f.service.submit(request("status check", 10)).unwrap();
    assert_eq!(
        f.service.job_status(&submitted.track_id),
        Some(aria_core::job::JobStatus::Queued)
    );
    assert!(f.service.job_status(&TrackId::from_raw("beefbeefbeefbeef")).is_none());
}
