//! The on-disk track store and its in-memory index.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, info, warn};

use aria_core::ids::TrackId;
use aria_core::track::Track;

use crate::CacheError;

/// Aggregate numbers for `list_tracks` / `clear_cache`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cached tracks.
    pub tracks: usize,
    /// Total artifact bytes on disk.
    pub bytes: u64,
}

/// Content-addressed track cache.
///
/// The index is a sharded map keyed by track id; per-key locking keeps the
/// hot `get` path free of a global lock. All mutation of the directory goes
/// through temp-file-then-rename so a crash never leaves a torn entry.
pub struct TrackCache {
    dir: PathBuf,
    max_bytes: u64,
    max_tracks: Option<usize>,
    index: DashMap<String, Track>,
}

impl TrackCache {
    /// Open (and create if needed) the cache under `dir`, then rebuild the
    /// index by scanning existing sidecars.
    pub fn open(dir: &Path, max_mb: u64, max_tracks: Option<usize>) -> Result<Self, CacheError> {
        fs::create_dir_all(dir)?;
        let cache = Self {
            dir: dir.to_path_buf(),
            max_bytes: max_mb * 1024 * 1024,
            max_tracks,
            index: DashMap::new(),
        };
        cache.rescan()?;
        info!(dir = %dir.display(), tracks = cache.index.len(), "track cache ready");
        Ok(cache)
    }

    /// Rebuild the index from the directory contents.
    ///
    /// A sidecar whose WAV is gone is deleted; a WAV without a sidecar is
    /// left alone (another process may be mid-write) but not indexed.
    pub fn rescan(&self) -> Result<(), CacheError> {
        self.index.clear();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_sidecar(&path) {
                Ok(track) if track.path.exists() => {
                    let _ = self.index.insert(track.track_id.to_string(), track);
                }
                Ok(track) => {
                    debug!(track_id = %track.track_id, "dropping sidecar without artifact");
                    let _ = fs::remove_file(&path);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable sidecar");
                }
            }
        }
        Ok(())
    }

    /// Final artifact path for a track id.
    pub fn track_path(&self, id: &TrackId) -> PathBuf {
        self.dir.join(format!("{id}.wav"))
    }

    /// Staging path the engine writes into before commit.
    pub fn stage_path(&self, id: &TrackId) -> PathBuf {
        self.dir.join(format!("{id}.wav.tmp"))
    }

    /// Cache probe; bumps the access time for LRU on hit.
    pub fn get(&self, id: &TrackId) -> Option<Track> {
        let mut entry = self.index.get_mut(id.as_str())?;
        entry.last_accessed = Utc::now();
        let track = entry.clone();
        drop(entry);
        // Persist the new access time so LRU survives restarts; losing the
        // write only costs eviction precision.
        if let Err(e) = self.write_sidecar(&track) {
            warn!(track_id = %track.track_id, error = %e, "failed to persist access time");
        }
        Some(track)
    }

    /// Whether an id is cached without bumping its access time.
    pub fn contains(&self, id: &TrackId) -> bool {
        self.index.contains_key(id.as_str())
    }

    /// Promote a staged artifact to a live cache entry.
    ///
    /// The staged WAV is fsynced and renamed to its final path, the sidecar
    /// is written, the index updated, and LRU eviction runs.
    pub fn commit(&self, mut track: Track) -> Result<Track, CacheError> {
        let staged = self.stage_path(&track.track_id);
        if !staged.exists() {
            return Err(CacheError::NotStaged(track.track_id.to_string()));
        }
        let final_path = self.track_path(&track.track_id);

        let file = fs::File::open(&staged)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&staged, &final_path)?;

        track.path = final_path;
        self.write_sidecar(&track)?;
        let _ = self.index.insert(track.track_id.to_string(), track.clone());

        self.evict();
        Ok(track)
    }

    /// Delete a staged artifact (failed or cancelled generation).
    pub fn discard_staged(&self, id: &TrackId) {
        let staged = self.stage_path(id);
        if staged.exists() {
            if let Err(e) = fs::remove_file(&staged) {
                warn!(track_id = %id, error = %e, "failed to remove staged artifact");
            }
        }
    }

    /// Remove a single entry (artifact + sidecar).
    pub fn remove(&self, id: &TrackId) -> bool {
        let Some((_, track)) = self.index.remove(id.as_str()) else {
            return false;
        };
        let _ = fs::remove_file(&track.path);
        let _ = fs::remove_file(self.sidecar_path(id));
        true
    }

    /// Remove everything; returns (removed count, freed bytes).
    pub fn clear(&self) -> (usize, u64) {
        let ids: Vec<(String, u64)> = self
            .index
            .iter()
            .map(|e| (e.key().clone(), artifact_bytes(e.value())))
            .collect();
        let mut removed = 0usize;
        let mut freed = 0u64;
        for (id, bytes) in ids {
            if self.remove(&TrackId::from_raw(id)) {
                removed += 1;
                freed += bytes;
            }
        }
        (removed, freed)
    }

    /// All tracks, most recently accessed first.
    pub fn list(&self) -> Vec<Track> {
        let mut tracks: Vec<Track> = self.index.iter().map(|e| e.value().clone()).collect();
        tracks.sort_by(|a, b| b.last_accessed.cmp(&a.last_accessed));
        tracks
    }

    /// Aggregate size/count numbers.
    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();
        for entry in self.index.iter() {
            stats.tracks += 1;
            stats.bytes += artifact_bytes(entry.value());
        }
        stats
    }

    /// Evict least-recently-accessed entries until the ceilings hold.
    fn evict(&self) {
        let stats = self.stats();
        let over_bytes = stats.bytes > self.max_bytes;
        let over_count = self.max_tracks.is_some_and(|max| stats.tracks > max);
        if !over_bytes && !over_count {
            return;
        }

        // Oldest access first.
        let mut tracks = self.list();
        tracks.reverse();

        let mut bytes = stats.bytes;
        let mut count = stats.tracks;
        for track in tracks {
            let within_bytes = bytes <= self.max_bytes;
            let within_count = self.max_tracks.is_none_or(|max| count <= max);
            if within_bytes && within_count {
                break;
            }
            let freed = artifact_bytes(&track);
            if self.remove(&track.track_id) {
                info!(track_id = %track.track_id, freed, "evicted LRU track");
                bytes = bytes.saturating_sub(freed);
                count -= 1;
            }
        }
    }

    fn sidecar_path(&self, id: &TrackId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Atomic sidecar write: temp, fsync, rename.
    fn write_sidecar(&self, track: &Track) -> Result<(), CacheError> {
        let final_path = self.sidecar_path(&track.track_id);
        let tmp_path = self.dir.join(format!("{}.json.tmp", track.track_id));

        let json = serde_json::to_vec_pretty(track).map_err(|e| CacheError::Sidecar(e.to_string()))?;
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(&json)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp_path, &final_path)?;
        Ok(())
    }
}

/// On-disk artifact size, falling back to the metadata estimate.
fn artifact_bytes(track: &Track) -> u64 {
    fs::metadata(&track.path)
        .map(|m| m.len())
        .unwrap_or_else(|_| track.estimated_bytes())
}

fn read_sidecar(path: &Path) -> Result<Track, CacheError> {
    let raw = fs::read_to_string(path)?;
    serde_json::from_str(&raw).map_err(|e| CacheError::Sidecar(e.to_string()))
}
