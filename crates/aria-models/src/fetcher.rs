//! Resumable model-asset downloads.
//!
//! Each file streams into `<name>.part` and is renamed into place only when
//! complete, so a killed daemon resumes from the partial byte offset with a
//! ranged GET. Progress is reported through a callback, throttled to a 5%
//! increment or 200 ms, whichever comes first.

use std::path::Path;
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use aria_core::backend::BackendKind;
use aria_core::events::DownloadProgress;

use crate::errors::{ModelError, ResultExt};
use crate::manifest::{AssetFile, BackendAssets};

/// Minimum interval between progress emissions.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(200);
/// Minimum percent delta between progress emissions.
const PROGRESS_STEP: u8 = 5;

/// Sink for throttled download-progress events.
pub type ProgressSink = Box<dyn FnMut(DownloadProgress) + Send>;

/// Throttle state shared across the files of one download run.
struct ProgressThrottle {
    backend: BackendKind,
    sink: ProgressSink,
    last_emit: Instant,
    last_overall: u8,
    bytes_done_previous_files: u64,
}

impl ProgressThrottle {
    fn new(backend: BackendKind, sink: ProgressSink) -> Self {
        Self {
            backend,
            sink,
            last_emit: Instant::now()
                .checked_sub(PROGRESS_INTERVAL)
                .unwrap_or_else(Instant::now),
            last_overall: 0,
            bytes_done_previous_files: 0,
        }
    }

    /// Emit when 5% or 200 ms has passed; `force` for file boundaries.
    fn tick(
        &mut self,
        component: &str,
        file_index: usize,
        file_count: usize,
        file_bytes: u64,
        file_total: Option<u64>,
        force: bool,
    ) {
        let component_percent = match file_total {
            Some(total) if total > 0 => ((file_bytes * 100) / total).min(100) as u8,
            _ => 0,
        };
        // Weight each file equally; per-file byte totals are not always known
        // up front, so the overall figure is file-granular plus the current
        // file's fraction.
        let overall = (((file_index * 100) as u64 + u64::from(component_percent)) / file_count as u64)
            .min(99) as u8;

        let due = self.last_emit.elapsed() >= PROGRESS_INTERVAL
            || overall >= self.last_overall.saturating_add(PROGRESS_STEP);
        if !(due || force) {
            return;
        }
        self.last_emit = Instant::now();
        self.last_overall = overall;
        (self.sink)(DownloadProgress {
            backend: self.backend,
            component: component.to_owned(),
            component_percent,
            overall_percent: overall,
            bytes_downloaded: self.bytes_done_previous_files + file_bytes,
            bytes_total: None,
        });
    }

    fn finish_file(&mut self, bytes: u64) {
        self.bytes_done_previous_files += bytes;
    }
}

/// Download every missing file of `assets` into `dir`.
///
/// Files already present are skipped. Returns the number of files fetched.
pub async fn fetch_missing(
    assets: &BackendAssets,
    dir: &Path,
    sink: ProgressSink,
) -> Result<usize, ModelError> {
    let missing = assets.missing_files(dir);
    if missing.is_empty() {
        debug!(backend = assets.backend.tag(), "all assets present, nothing to fetch");
        return Ok(0);
    }

    tokio::fs::create_dir_all(dir).await?;
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(20))
        .build()
        .download_ctx("http client")?;

    let mut throttle = ProgressThrottle::new(assets.backend, sink);
    let count = missing.len();

    for (index, file) in missing.iter().enumerate() {
        info!(backend = assets.backend.tag(), file = file.name, "fetching asset");
        let bytes = fetch_one(&client, file, dir, index, count, &mut throttle).await?;
        throttle.finish_file(bytes);
    }

    info!(backend = assets.backend.tag(), files = count, "asset fetch complete");
    Ok(count)
}

/// Fetch a single file with resume + one corruption retry.
async fn fetch_one(
    client: &reqwest::Client,
    file: &AssetFile,
    dir: &Path,
    index: usize,
    count: usize,
    throttle: &mut ProgressThrottle,
) -> Result<u64, ModelError> {
    match stream_to_part(client, file, dir, index, count, throttle).await {
        Ok(bytes) => Ok(bytes),
        Err(e) => {
            // A size mismatch usually means a stale partial; drop it and
            // retry once from byte zero.
            warn!(file = file.name, error = %e, "fetch failed, retrying from scratch");
            let part = dir.join(format!("{}.part", file.name));
            let _ = tokio::fs::remove_file(&part).await;
            stream_to_part(client, file, dir, index, count, throttle).await
        }
    }
}

async fn stream_to_part(
    client: &reqwest::Client,
    file: &AssetFile,
    dir: &Path,
    index: usize,
    count: usize,
    throttle: &mut ProgressThrottle,
) -> Result<u64, ModelError> {
    let final_path = dir.join(file.name);
    let part_path = dir.join(format!("{}.part", file.name));

    let mut resume_from = match tokio::fs::metadata(&part_path).await {
        Ok(meta) => meta.len(),
        Err(_) => 0,
    };

    let mut request = client.get(file.url);
    if resume_from > 0 {
        debug!(file = file.name, offset = resume_from, "resuming partial download");
        request = request.header(reqwest::header::RANGE, format!("bytes={resume_from}-"));
    }

    let response = request.send().await.download_ctx(file.name)?;
    let status = response.status();
    if !status.is_success() {
        return Err(ModelError::Download(format!("{}: HTTP {status}", file.name)));
    }

    // A 200 to a ranged request means the server ignored the range; start over.
    if resume_from > 0 && status != reqwest::StatusCode::PARTIAL_CONTENT {
        resume_from = 0;
        let _ = tokio::fs::remove_file(&part_path).await;
    }

    let expected_total = response.content_length().map(|remaining| resume_from + remaining);

    let mut out = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&part_path)
        .await?;

    let mut written = resume_from;
    let mut response = response;
    while let Some(chunk) = response.chunk().await.download_ctx(file.name)? {
        out.write_all(&chunk).await?;
        written += chunk.len() as u64;
        throttle.tick(file.name, index, count, written, expected_total, false);
    }
    out.flush().await?;
    out.sync_all().await?;
    drop(out);

    if let Some(expected) = expected_total {
        if written != expected {
            return Err(ModelError::Download(format!(
                "{}: size mismatch ({written} of {expected} bytes)",
                file.name
            )));
        }
    }

    tokio::fs::rename(&part_path, &final_path).await?;
    throttle.tick(file.name, index, count, written, expected_total, true);
    Ok(written - resume_from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aria_core::backend::BackendKind;
    use std::sync::{Arc, Mutex};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn collect_sink() -> (ProgressSink, Arc<Mutex<Vec<DownloadProgress>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let clone = Arc::clone(&events);
        let sink: ProgressSink = Box::new(move |p| clone.lock().unwrap().push(p));
        (sink, events)
    }

    fn test_assets(file: &'static AssetFile) -> BackendAssets {
        BackendAssets {
            backend: BackendKind::MusicGen,
            model_version: "test",
            files: std::slice::from_ref(file),
        }
    }

    // Leaked statics keep AssetFile 'static without touching the real
    // manifests; fine in tests.
    fn leaked_file(name: &'static str, url: String) -> &'static AssetFile {
        Box::leak(Box::new(AssetFile {
            name,
            url: Box::leak(url.into_boxed_str()),
        }))
    }

    #[tokio::test]
    async fn downloads_and_renames_into_place() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/model.onnx"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 4096]))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = leaked_file("model.onnx", format!("{}/model.onnx", server.uri()));
        let (sink, events) = collect_sink();

        let fetched = fetch_missing(&test_assets(file), dir.path(), sink).await.unwrap();
        assert_eq!(fetched, 1);
        assert_eq!(std::fs::read(dir.path().join("model.onnx")).unwrap().len(), 4096);
        assert!(!dir.path().join("model.onnx.part").exists());
        assert!(!events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn skips_files_already_present() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("model.onnx"), b"cached").unwrap();
        let file = leaked_file("model.onnx", "https://unreachable.invalid/model.onnx".to_owned());
        let (sink, _) = collect_sink();

        // No network call is made for present files, so the bogus URL never resolves.
        let fetched = fetch_missing(&test_assets(file), dir.path(), sink).await.unwrap();
        assert_eq!(fetched, 0);
    }

    #[tokio::test]
    async fn resumes_from_partial_with_range_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/big.onnx"))
            .and(wiremock::matchers::header("range", "bytes=100-"))
            .respond_with(
                ResponseTemplate::new(206).set_body_bytes(vec![9u8; 156]),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("big.onnx.part"), vec![1u8; 100]).unwrap();
        let file = leaked_file("big.onnx", format!("{}/big.onnx", server.uri()));
        let (sink, _) = collect_sink();

        let fetched = fetch_missing(&test_assets(file), dir.path(), sink).await.unwrap();
        assert_eq!(fetched, 1);
        let data = std::fs::read(dir.path().join("big.onnx")).unwrap();
        assert_eq!(data.len(), 256);
        assert_eq!(data[0], 1, "resumed file keeps the original prefix");
        assert_eq!(data[255], 9);
    }

    #[tokio::test]
    async fn http_error_is_a_download_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone.onnx"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = leaked_file("gone.onnx", format!("{}/gone.onnx", server.uri()));
        let (sink, _) = collect_sink();

        let err = fetch_missing(&test_assets(file), dir.path(), sink).await.unwrap_err();
        assert!(matches!(err, ModelError::Download(_)), "{err}");
        assert!(!dir.path().join("gone.onnx").exists());
    }

    #[test]
    fn throttle_suppresses_small_increments() {
        let (sink, events) = collect_sink();
        let mut throttle = ProgressThrottle::new(BackendKind::MusicGen, sink);

        throttle.tick("f", 0, 1, 0, Some(1000), false);
        // 1%, 2% land inside both the time and percent windows.
        throttle.tick("f", 0, 1, 10, Some(1000), false);
        throttle.tick("f", 0, 1, 20, Some(1000), false);
        // 7% crosses the 5% step.
        throttle.tick("f", 0, 1, 70, Some(1000), false);

        let seen: Vec<u8> = events.lock().unwrap().iter().map(|e| e.component_percent).collect();
        assert_eq!(seen, vec![0, 7]);
    }

    #[test]
    fn throttle_force_always_emits() {
        let (sink, events) = collect_sink();
        let mut throttle = ProgressThrottle::new(BackendKind::MusicGen, sink);
        throttle.tick("f", 0, 2, 0, Some(100), false);
        throttle.tick("f", 0, 2, 1, Some(100), true);
        assert_eq!(events.lock().unwrap().len(), 2);
    }
}
