//! The persisted music library
//!
//! - [`LibraryDb`] - SQLite store for tracks, preserved sets and playlists
//! - [`PreservedSetRegistry`] - preserved set IDs, mirrored into preferences
//! - [`Library`] - deletion and restoration that keep rows, files and
//!   preserved IDs consistent

mod db;
mod model;
mod preserved;

pub use db::LibraryDb;
pub use model::{Playlist, PlaylistEntry, PreservedSetId, Track};
pub use preserved::PreservedSetRegistry;

use chrono::Utc;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{Config, Preferences};
use crate::error::{Error, Result};
use crate::utils::{remove_file_if_exists, set_asset_dir};

/// Library operations that span the database, the registry and the disk
#[derive(Debug, Clone)]
pub struct Library {
    db: LibraryDb,
    registry: PreservedSetRegistry,
    library_dir: PathBuf,
}

impl Library {
    pub fn new(db: LibraryDb, prefs: Arc<Preferences>, library_dir: impl AsRef<Path>) -> Self {
        Self {
            registry: PreservedSetRegistry::new(db.clone(), prefs),
            db,
            library_dir: library_dir.as_ref().to_path_buf(),
        }
    }

    pub fn from_config(config: &Config, db: LibraryDb, prefs: Arc<Preferences>) -> Self {
        Self::new(db, prefs, &config.library_dir)
    }

    pub fn db(&self) -> &LibraryDb {
        &self.db
    }

    pub fn registry(&self) -> &PreservedSetRegistry {
        &self.registry
    }

    pub async fn tracks(&self) -> Result<Vec<Track>> {
        self.db.list_tracks().await
    }

    /// Delete a track together with its audio and cover files.
    ///
    /// Files still referenced by a sibling track are kept. When the set has no
    /// tracks left, it stops being preserved, its playlist entries are flagged
    /// as not downloaded and its directory is removed with whatever is left in it.
    pub async fn delete_track(&self, id: &str) -> Result<Track> {
        let track = self
            .db
            .get_track(id)
            .await?
            .ok_or_else(|| Error::TrackNotFound(id.to_string()))?;

        self.db.delete_track(id).await?;

        let set_id = track.beatmap_set_id;
        let siblings = self.db.tracks_for_set(set_id).await?;
        for path in std::iter::once(track.audio_file()).chain(track.cover_file()) {
            if siblings.iter().any(|t| t.references(&path)) {
                continue;
            }
            if let Err(e) = remove_file_if_exists(&path).await {
                warn!(set_id, path = %path.display(), error = %e, "Failed to remove track file");
            }
        }

        if siblings.is_empty() {
            self.release_set(set_id).await?;
        }

        info!(set_id, track = %track.id, "Deleted track");
        Ok(track)
    }

    /// Delete every track of a set; returns how many were deleted
    pub async fn delete_set(&self, set_id: i64) -> Result<usize> {
        let tracks = self.db.tracks_for_set(set_id).await?;
        for track in &tracks {
            self.delete_track(&track.id).await?;
        }
        Ok(tracks.len())
    }

    async fn release_set(&self, set_id: i64) -> Result<()> {
        self.registry.remove(set_id).await?;
        self.db.set_download_status(set_id, false).await?;

        // Backgrounds no track points at still live here
        let dir = set_asset_dir(&self.library_dir, set_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => info!(set_id, "Removed set directory"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(set_id, dir = %dir.display(), error = %e, "Failed to remove set directory"),
        }
        Ok(())
    }

    /// Destructive reset: drops every track row, keeps files and preserved IDs.
    ///
    /// Preserved sets afterwards show up in [`Library::pending_restorations`].
    pub async fn reset_tracks(&self) -> Result<u64> {
        let removed = self.db.delete_all_tracks().await?;
        warn!(removed, "Library tracks reset");
        Ok(removed)
    }

    /// Preserved sets that currently have no tracks, to be offered for re-download
    pub async fn pending_restorations(&self) -> Result<Vec<i64>> {
        let present = self.db.track_set_ids().await?;
        Ok(self
            .registry
            .list()
            .await?
            .into_iter()
            .map(|p| p.beatmap_set_id)
            .filter(|id| !present.contains(id))
            .collect())
    }

    /// Refill the preserved table from the preference mirror if it was wiped
    pub async fn recover_preserved(&self) -> Result<usize> {
        self.registry.recover().await
    }

    /// Set directories on disk that no track row points into
    pub async fn find_orphans(&self) -> Result<Vec<PathBuf>> {
        if !tokio::fs::try_exists(&self.library_dir).await.unwrap_or(false) {
            return Ok(Vec::new());
        }
        let present = self.db.track_set_ids().await?;
        let library_dir = self.library_dir.clone();
        tokio::task::spawn_blocking(move || orphans_among(&library_dir, &present))
            .await
            .map_err(|e| Error::Other(e.to_string()))?
    }

    /// Create a playlist
    pub async fn create_playlist(&self, name: &str) -> Result<i64> {
        self.db
            .create_playlist(name, Utc::now().timestamp_millis())
            .await
    }

    /// Add a set to a playlist, flagged by whether it is already in the library
    pub async fn add_to_playlist(
        &self,
        playlist_id: i64,
        set_id: i64,
        title: &str,
        artist: &str,
    ) -> Result<PlaylistEntry> {
        let entry = PlaylistEntry {
            playlist_id,
            beatmap_set_id: set_id,
            title: title.to_string(),
            artist: artist.to_string(),
            downloaded: self.db.count_tracks_for_set(set_id).await? > 0,
            added_at: Utc::now().timestamp_millis(),
        };
        self.db.upsert_playlist_entry(&entry).await?;
        Ok(entry)
    }
}

/// Numeric directories directly below `library_dir` not in `present`
fn orphans_among(library_dir: &Path, present: &HashSet<i64>) -> Result<Vec<PathBuf>> {
    let mut orphans = Vec::new();
    for entry in walkdir::WalkDir::new(library_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| Error::Other(e.to_string()))?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let Some(set_id) = entry
            .file_name()
            .to_str()
            .and_then(|name| name.parse::<i64>().ok())
        else {
            continue;
        };
        if !present.contains(&set_id) {
            orphans.push(entry.into_path());
        }
    }
    Ok(orphans)
}
