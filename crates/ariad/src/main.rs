//! Daemon entry point.
//!
//! `ariad serve` (the default) speaks JSON-RPC on stdin/stdout until EOF
//! or a `shutdown` call. `ariad generate` drives the same pipeline once
//! from the command line as a smoke test, printing the cached artifact
//! path on success.
//!
//! Stdout is reserved for protocol (or the final artifact path in smoke
//! mode); all logs go to stderr.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use aria_cache::TrackCache;
use aria_core::events::Notification;
use aria_core::request::RawGenerateRequest;
use aria_runtime::{GenerationService, SubmitStatus};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Local offline music-generation daemon.
#[derive(Parser, Debug)]
#[command(name = "ariad", version, about)]
struct Cli {
    /// Settings file (default: ~/.aria/settings.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the cache root for this run.
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the JSON-RPC daemon on stdin/stdout (the default).
    Serve,
    /// Generate one track from the command line (smoke test).
    Generate {
        /// Text prompt.
        #[arg(long)]
        prompt: String,
        /// Duration in seconds.
        #[arg(long, default_value_t = 10)]
        duration: u32,
        /// Back-end tag (`musicgen` / `ace_step`).
        #[arg(long)]
        backend: Option<String>,
        /// PRNG seed (random when omitted).
        #[arg(long)]
        seed: Option<u64>,
        /// Diffusion-only: inference step count.
        #[arg(long)]
        steps: Option<u32>,
        /// Diffusion-only: scheduler (`euler` / `heun` / `pingpong`).
        #[arg(long)]
        scheduler: Option<String>,
        /// Diffusion-only: guidance scale.
        #[arg(long)]
        guidance: Option<f32>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("ARIA_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => aria_settings::load_settings_from_path(path)
            .with_context(|| format!("unreadable config {}", path.display()))?,
        None => aria_settings::load_settings().context("load settings")?,
    };
    if let Some(dir) = cli.cache_dir {
        settings.cache_dir = dir;
    }
    aria_settings::init_settings(settings.clone());
    let settings = Arc::new(settings);

    std::fs::create_dir_all(&settings.cache_dir)
        .with_context(|| format!("unwritable cache root {}", settings.cache_dir.display()))?;
    let cache = Arc::new(
        TrackCache::open(
            &settings.tracks_dir(),
            settings.cache_max_mb,
            settings.cache_max_tracks,
        )
        .context("open track cache")?,
    );

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let service = GenerationService::new(Arc::clone(&settings), cache, events_tx);
    let _worker = service.spawn_worker();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            info!(
                cache_dir = %settings.cache_dir.display(),
                default_backend = settings.default_backend.tag(),
                queue_limit = settings.queue_limit,
                "ariad serving on stdio"
            );
            aria_server::run(service, events_rx, env!("CARGO_PKG_VERSION")).await?;
        }
        Command::Generate {
            prompt,
            duration,
            backend,
            seed,
            steps,
            scheduler,
            guidance,
        } => {
            smoke_generate(
                &service,
                events_rx,
                RawGenerateRequest {
                    prompt,
                    duration_sec: duration,
                    backend,
                    seed,
                    priority: None,
                    inference_steps: steps,
                    scheduler,
                    guidance_scale: guidance,
                },
            )
            .await?;
        }
    }

    Ok(())
}

/// Drive one generation end-to-end and print the artifact path.
async fn smoke_generate(
    service: &GenerationService,
    mut events_rx: mpsc::UnboundedReceiver<Notification>,
    request: RawGenerateRequest,
) -> anyhow::Result<()> {
    let submitted = service
        .submit(request)
        .map_err(|e| anyhow::anyhow!("{} ({})", e.message, e.kind.as_str()))?;

    if submitted.status == SubmitStatus::Cached {
        let track = service
            .cached_track(&submitted.track_id)
            .context("cached track disappeared")?;
        info!(track_id = %track.track_id, "cache hit");
        println!("{}", track.path.display());
        return Ok(());
    }

    info!(
        track_id = %submitted.track_id,
        seed = submitted.seed,
        backend = submitted.backend.tag(),
        "generating"
    );

    while let Some(event) = events_rx.recv().await {
        match event {
            Notification::Progress(p) if p.track_id == submitted.track_id => {
                info!(percent = p.percent, step = p.current_step, total = p.total_steps, "progress");
            }
            Notification::Complete(c) if c.track_id == submitted.track_id => {
                info!(
                    duration_sec = c.duration_sec,
                    generation_time_sec = c.generation_time_sec,
                    "complete"
                );
                println!("{}", c.path.display());
                return Ok(());
            }
            Notification::Error(e) if e.track_id == submitted.track_id => {
                bail!("generation failed: {} ({})", e.message, e.code.as_str());
            }
            Notification::Cancelled(c) if c.track_id == submitted.track_id => {
                bail!("generation cancelled at step {}", c.at_step);
            }
            _ => {}
        }
    }
    bail!("event stream ended before completion");
}
