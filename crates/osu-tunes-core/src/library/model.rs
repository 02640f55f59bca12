//! Rows of the library database

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::path::{Path, PathBuf};

/// One playable library entry.
///
/// The row owns the files at `audio_path` and `cover_path`; removing one
/// without the other leaves the library inconsistent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Track {
    /// `<set id>-<audio file name>`, stable across re-imports
    pub id: String,
    pub beatmap_set_id: i64,
    pub title: String,
    pub artist: String,
    pub creator: String,
    pub difficulty: Option<String>,
    /// Absolute path of the audio asset
    pub audio_path: String,
    /// Absolute path of the cover asset, empty when there is none
    pub cover_path: String,
    /// Unix milliseconds
    pub imported_at: i64,
    /// The owning set produced more than one track
    pub is_album: bool,
    pub genre: Option<String>,
}

impl Track {
    /// Deterministic ID for the track built from `audio_path` of `set_id`
    pub fn id_for(set_id: i64, audio_path: &Path) -> String {
        let name = audio_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        format!("{}-{}", set_id, name)
    }

    pub fn audio_file(&self) -> PathBuf {
        PathBuf::from(&self.audio_path)
    }

    pub fn cover_file(&self) -> Option<PathBuf> {
        if self.cover_path.is_empty() {
            None
        } else {
            Some(PathBuf::from(&self.cover_path))
        }
    }

    pub fn imported_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.imported_at)
    }

    /// Whether this track points at `path` as audio or cover
    pub fn references(&self, path: &Path) -> bool {
        Path::new(&self.audio_path) == path
            || (!self.cover_path.is_empty() && Path::new(&self.cover_path) == path)
    }
}

/// A set whose library membership survives destructive resets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PreservedSetId {
    pub beatmap_set_id: i64,
    /// Unix milliseconds
    pub preserved_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Playlist {
    pub id: i64,
    pub name: String,
    pub created_at: i64,
}

/// A beatmap set referenced by a playlist, downloaded or not
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PlaylistEntry {
    pub playlist_id: i64,
    pub beatmap_set_id: i64,
    pub title: String,
    pub artist: String,
    /// All of the set's tracks are in the library
    pub downloaded: bool,
    pub added_at: i64,
}
