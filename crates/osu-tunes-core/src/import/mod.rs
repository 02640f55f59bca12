//! Download-and-import orchestration
//!
//! One import walks fetch → extract → entity construction → persistence →
//! preserved-list update, reporting a single stream of [`ImportEvent`]s that
//! ends with exactly one `Success` or `Error`.

use chrono::Utc;
use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::beatmap::{BeatmapSet, ExtractedTrack};
use crate::config::{Config, Preferences};
use crate::download::{ArchiveFetcher, CoverFallbackFetcher, DirectAssetFetcher, DownloadEvent};
use crate::error::{Error, Result};
use crate::extract::ArchiveExtractor;
use crate::library::{LibraryDb, PreservedSetRegistry, Track};
use crate::mirror::endpoint_url;
use crate::stream::{EventSink, EventStream};
use crate::utils::remove_file_if_exists;

/// Label of the progress event emitted before extraction starts
pub const EXTRACTING_LABEL: &str = "Extracting";

/// What to import and how to label it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportRequest {
    pub set_id: i64,
    pub auth_token: Option<String>,
    pub title: String,
    pub artist: String,
    pub creator: String,
    pub genre: Option<String>,
    /// Cover to download if the assets contain none
    pub cover_url: Option<String>,
}

impl ImportRequest {
    pub fn new(set_id: i64) -> Self {
        Self {
            set_id,
            ..Self::default()
        }
    }

    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token;
        self
    }

    pub fn with_cover_url(mut self, url: impl Into<String>) -> Self {
        self.cover_url = Some(url.into());
        self
    }
}

impl From<&BeatmapSet> for ImportRequest {
    fn from(set: &BeatmapSet) -> Self {
        Self {
            set_id: set.id,
            auth_token: None,
            title: set.title.clone(),
            artist: set.artist.clone(),
            creator: set.creator.clone(),
            genre: set.genre.clone(),
            cover_url: None,
        }
    }
}

/// Progress of one import
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportEvent {
    /// `percent` is `None` while the download size is unknown
    Progress { percent: Option<u8>, label: String },
    Success { set_id: i64 },
    Error { message: String },
}

impl ImportEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress { .. })
    }
}

/// Runs imports. Cheap to clone; every import is an independent pipeline.
///
/// Concurrent imports of the same set ID are not serialized and may race on
/// the set's asset directory.
#[derive(Debug, Clone)]
pub struct ImportCoordinator {
    archive: ArchiveFetcher,
    direct: DirectAssetFetcher,
    extractor: ArchiveExtractor,
    covers: CoverFallbackFetcher,
    db: LibraryDb,
    registry: PreservedSetRegistry,
    prefs: Arc<Preferences>,
    cover_url_template: Option<String>,
}

impl ImportCoordinator {
    /// Wire up every stage from `config`
    pub fn new(config: &Config, db: LibraryDb, prefs: Arc<Preferences>) -> Result<Self> {
        let client = config.http_client()?;
        Ok(Self {
            archive: ArchiveFetcher::from_config(config, client.clone()),
            direct: DirectAssetFetcher::from_config(config, client.clone()),
            extractor: ArchiveExtractor::from_config(config),
            covers: CoverFallbackFetcher::from_config(config, client),
            registry: PreservedSetRegistry::new(db.clone(), prefs.clone()),
            db,
            prefs,
            cover_url_template: config.cover_url_template.clone(),
        })
    }

    pub fn registry(&self) -> &PreservedSetRegistry {
        &self.registry
    }

    /// Start importing; dropping the stream cancels the import
    pub fn import(&self, request: ImportRequest) -> EventStream<ImportEvent> {
        let this = self.clone();
        EventStream::spawn(move |sink| async move {
            let set_id = request.set_id;
            if let Some(event) = this.run(request, &sink).await {
                if let ImportEvent::Error { ref message } = event {
                    warn!(set_id, %message, "Import failed");
                }
                sink.emit(event).await;
            }
        })
    }

    /// Drive one import; returns the terminal event, or `None` if the consumer left
    async fn run(&self, request: ImportRequest, sink: &EventSink<ImportEvent>) -> Option<ImportEvent> {
        let set_id = request.set_id;
        // Read once per import
        let preference = self.prefs.preferred_mirror();

        let mut fetch = if self.direct.handles(&preference) {
            self.direct.fetch(set_id)
        } else {
            self.archive
                .fetch(set_id, request.auth_token.clone(), &preference)
        };

        let mut extracted = None;
        while let Some(event) = fetch.next().await {
            match event {
                DownloadEvent::Downloading { percent, label } => {
                    if !sink.emit(ImportEvent::Progress { percent, label }).await {
                        return None;
                    }
                }
                DownloadEvent::Downloaded { archive, .. } => {
                    let extracting = ImportEvent::Progress {
                        percent: Some(100),
                        label: EXTRACTING_LABEL.to_string(),
                    };
                    if !sink.emit(extracting).await {
                        return None;
                    }

                    let extractor = self.extractor.clone();
                    let output =
                        tokio::task::spawn_blocking(move || extractor.extract(&archive, set_id))
                            .await;
                    match output {
                        Ok(Ok(output)) => extracted = Some(output.into_tracks()),
                        Ok(Err(e)) => return Some(extraction_failed(e)),
                        Err(e) => return Some(extraction_failed(e)),
                    }
                    break;
                }
                DownloadEvent::Completed { tracks, .. } => {
                    extracted = Some(tracks);
                    break;
                }
                DownloadEvent::Error { message } => {
                    return Some(ImportEvent::Error { message });
                }
            }
        }

        let Some(tracks) = extracted else {
            return Some(ImportEvent::Error {
                message: "Download ended without a result".to_string(),
            });
        };

        match self.register(&request, tracks).await {
            Ok(count) => {
                info!(set_id, tracks = count, "Imported beatmap set");
                Some(ImportEvent::Success { set_id })
            }
            Err(e) => Some(ImportEvent::Error {
                message: format!("Registration failed: {}", e),
            }),
        }
    }

    /// Persist the extracted tracks of a set.
    ///
    /// Rows are written one at a time without a transaction: a failure part
    /// way leaves the earlier rows in place. Once every row is written, rows
    /// of an earlier import that this one did not replace are dropped along
    /// with files no new track uses.
    async fn register(&self, request: &ImportRequest, mut tracks: Vec<ExtractedTrack>) -> Result<usize> {
        let set_id = request.set_id;
        if tracks.is_empty() {
            return Err(Error::Other("no playable audio".to_string()));
        }

        let is_album = tracks.len() > 1;

        let mut missing_cover = Vec::new();
        for (i, track) in tracks.iter().enumerate() {
            if track.needs_cover().await {
                missing_cover.push(i);
            }
        }
        if !missing_cover.is_empty() {
            let url = request.cover_url.clone().or_else(|| {
                self.cover_url_template
                    .as_ref()
                    .map(|t| endpoint_url(t, set_id))
            });
            // One download per set, shared by every cover-less track
            let fallback = match url {
                Some(url) => self.covers.fetch(set_id, &url).await,
                None => None,
            };
            for i in missing_cover {
                tracks[i].cover_path = fallback.clone();
            }
        }

        let previous = self.db.tracks_for_set(set_id).await?;

        let imported_at = Utc::now().timestamp_millis();
        let mut rows = Vec::with_capacity(tracks.len());
        for extracted in &tracks {
            let track = Track {
                id: Track::id_for(set_id, &extracted.audio_path),
                beatmap_set_id: set_id,
                title: request.title.clone(),
                artist: request.artist.clone(),
                creator: request.creator.clone(),
                difficulty: extracted.difficulty.clone(),
                audio_path: extracted.audio_path.to_string_lossy().to_string(),
                cover_path: extracted
                    .cover_path
                    .as_ref()
                    .map(|p| p.to_string_lossy().to_string())
                    .unwrap_or_default(),
                imported_at,
                is_album,
                genre: request.genre.clone(),
            };
            self.db.insert_track(&track).await?;
            rows.push(track);
        }

        self.drop_replaced(set_id, previous, &rows).await?;

        self.registry.add(set_id).await?;
        self.db.set_download_status(set_id, true).await?;
        Ok(rows.len())
    }

    /// Remove rows of an earlier import of `set_id` that `current` did not replace
    async fn drop_replaced(&self, set_id: i64, previous: Vec<Track>, current: &[Track]) -> Result<()> {
        for stale in previous {
            if current.iter().any(|t| t.id == stale.id) {
                continue;
            }
            self.db.delete_track(&stale.id).await?;
            for path in std::iter::once(stale.audio_file()).chain(stale.cover_file()) {
                if current.iter().any(|t| t.references(&path)) {
                    continue;
                }
                if let Err(e) = remove_file_if_exists(&path).await {
                    warn!(set_id, path = %path.display(), error = %e, "Failed to remove replaced file");
                }
            }
            debug!(set_id, track = %stale.id, "Dropped track replaced by re-import");
        }
        Ok(())
    }
}

fn extraction_failed(reason: impl std::fmt::Display) -> ImportEvent {
    ImportEvent::Error {
        message: format!("Extraction failed: {}", reason),
    }
}
