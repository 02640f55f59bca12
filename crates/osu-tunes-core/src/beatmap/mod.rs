//! Beatmap sets as sourced from the remote service

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Ranked status of a beatmap set on the remote service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankedStatus {
    Graveyard = -2,
    Wip = -1,
    #[default]
    Pending = 0,
    Ranked = 1,
    Approved = 2,
    Qualified = 3,
    Loved = 4,
}

impl From<i32> for RankedStatus {
    fn from(value: i32) -> Self {
        match value {
            -2 => Self::Graveyard,
            -1 => Self::Wip,
            1 => Self::Ranked,
            2 => Self::Approved,
            3 => Self::Qualified,
            4 => Self::Loved,
            _ => Self::Pending,
        }
    }
}

impl fmt::Display for RankedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RankedStatus::Graveyard => write!(f, "Graveyard"),
            RankedStatus::Wip => write!(f, "WIP"),
            RankedStatus::Pending => write!(f, "Pending"),
            RankedStatus::Ranked => write!(f, "Ranked"),
            RankedStatus::Approved => write!(f, "Approved"),
            RankedStatus::Qualified => write!(f, "Qualified"),
            RankedStatus::Loved => write!(f, "Loved"),
        }
    }
}

/// A beatmap set reference. Immutable; keys every pipeline operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeatmapSet {
    /// Online beatmap set ID
    pub id: i64,
    pub title: String,
    pub artist: String,
    pub creator: String,
    /// Genre tag, if the service reports one
    pub genre: Option<String>,
    pub status: RankedStatus,
}

/// One playable audio file produced by extraction or direct fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedTrack {
    pub audio_path: PathBuf,
    pub cover_path: Option<PathBuf>,
    /// Difficulty that first referenced this audio, when known
    pub difficulty: Option<String>,
}

impl ExtractedTrack {
    /// True when the cover is missing or points at nothing on disk
    pub async fn needs_cover(&self) -> bool {
        match self.cover_path {
            Some(ref path) => !tokio::fs::metadata(path)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false),
            None => true,
        }
    }
}
