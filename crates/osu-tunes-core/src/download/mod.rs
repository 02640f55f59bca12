//! Fetching beatmap assets from mirrors
//!
//! - [`ArchiveFetcher`] downloads a whole archive, falling back across mirrors
//! - [`DirectAssetFetcher`] downloads individual files from a manifest
//! - [`CoverFallbackFetcher`] grabs a cover image when extraction found none

mod archive;
mod cover;
mod direct;

pub use archive::ArchiveFetcher;
pub use cover::{CoverFallbackFetcher, FALLBACK_COVER_FILE};
pub use direct::{plan_direct_fetch, DirectAssetFetcher, DirectPlan, ManifestDifficulty, PlannedTrack};

use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::beatmap::ExtractedTrack;
use crate::error::{Error, Result};
use crate::stream::EventSink;
use crate::utils::format_bytes;

/// Accept header sent to mirrors; some reject requests without one
pub(crate) const ARCHIVE_ACCEPT: &str =
    "application/x-osu-beatmap-archive, application/octet-stream, application/zip, */*";

/// Progress and result of a single fetch attempt.
///
/// A fetch ends with exactly one of `Downloaded`, `Completed` or `Error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadEvent {
    /// Transfer in progress; `percent` is `None` when the size is unknown
    Downloading { percent: Option<u8>, label: String },
    /// Archive is on disk and needs extraction
    Downloaded { set_id: i64, archive: PathBuf },
    /// Assets were fetched individually; no extraction step
    Completed {
        set_id: i64,
        tracks: Vec<ExtractedTrack>,
    },
    Error { message: String },
}

impl DownloadEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Downloading { .. })
    }
}

/// Host part of a URL for progress labels
pub(crate) fn host_label(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}

/// Decides when a byte count is worth reporting
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    total: Option<u64>,
    copied: u64,
    last_percent: Option<u8>,
    last_reported: u64,
}

impl ProgressTracker {
    /// Report unknown-length transfers at most once per this many bytes
    const UNKNOWN_LENGTH_STEP: u64 = 256 * 1024;

    pub(crate) fn new(total: Option<u64>) -> Self {
        Self {
            total: total.filter(|&t| t > 0),
            copied: 0,
            last_percent: None,
            last_reported: 0,
        }
    }

    pub(crate) fn copied(&self) -> u64 {
        self.copied
    }

    /// Account for `n` more bytes; returns a percentage to report, if any
    pub(crate) fn advance(&mut self, n: u64) -> Option<Option<u8>> {
        self.copied += n;
        match self.total {
            Some(total) => {
                let percent = ((self.copied.min(total) * 100) / total) as u8;
                if self.last_percent == Some(percent) {
                    return None;
                }
                self.last_percent = Some(percent);
                Some(Some(percent))
            }
            None => {
                if self.copied - self.last_reported < Self::UNKNOWN_LENGTH_STEP {
                    return None;
                }
                self.last_reported = self.copied;
                Some(None)
            }
        }
    }

    pub(crate) fn label(&self, host: &str) -> String {
        match self.total {
            Some(total) => format!(
                "Downloading from {}: {} / {}",
                host,
                format_bytes(self.copied),
                format_bytes(total)
            ),
            None => format!("Downloading from {}: {}", host, format_bytes(self.copied)),
        }
    }
}

/// A download target that is deleted unless explicitly kept.
///
/// Covers every exit path, including the producer task being aborted.
#[derive(Debug)]
pub(crate) struct PartialFile {
    path: PathBuf,
    keep: bool,
}

impl PartialFile {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path, keep: false }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Move the finished file into place
    pub(crate) async fn persist(mut self, dest: &Path) -> Result<()> {
        tokio::fs::rename(&self.path, dest).await?;
        self.keep = true;
        Ok(())
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.keep {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Stream a successful response body into `dest`.
///
/// With a `sink` and a `progress_host`, byte progress is emitted to the sink;
/// the sink's consumer going away stops the copy between chunks. The file
/// only appears at `dest` once the body was copied completely.
pub(crate) async fn copy_response(
    response: reqwest::Response,
    dest: &Path,
    sink: Option<&EventSink<DownloadEvent>>,
    progress_host: Option<&str>,
) -> Result<u64> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut part_name = dest.as_os_str().to_owned();
    part_name.push(".part");
    let part = PartialFile::new(PathBuf::from(part_name));

    let mut tracker = ProgressTracker::new(response.content_length());
    let expected = response.content_length();

    {
        let mut file = tokio::fs::File::create(part.path()).await?;
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            if sink.is_some_and(EventSink::is_cancelled) {
                return Err(Error::Cancelled);
            }
            let chunk = chunk?;
            file.write_all(&chunk).await?;

            if let Some(percent) = tracker.advance(chunk.len() as u64) {
                if let (Some(sink), Some(host)) = (sink, progress_host) {
                    let event = DownloadEvent::Downloading {
                        percent,
                        label: tracker.label(host),
                    };
                    if !sink.emit(event).await {
                        return Err(Error::Cancelled);
                    }
                }
            }
        }

        file.flush().await?;
    }

    if let Some(expected) = expected {
        if tracker.copied() < expected {
            return Err(Error::Other(format!(
                "Incomplete download: {} of {} bytes",
                tracker.copied(),
                expected
            )));
        }
    }

    part.persist(dest).await?;
    Ok(tracker.copied())
}
