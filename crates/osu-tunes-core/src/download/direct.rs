//! Direct-fetch path for providers that serve files individually

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{copy_response, DownloadEvent};
use crate::beatmap::ExtractedTrack;
use crate::config::{Config, DirectProviderConfig};
use crate::error::{Error, Result};
use crate::mirror::endpoint_url;
use crate::stream::{EventSink, EventStream};
use crate::utils::{sanitize_filename, set_asset_dir};

const FILE_PLACEHOLDER: &str = "{file}";

#[derive(Debug, Deserialize)]
struct ManifestResponse {
    #[serde(default)]
    status: i32,
    data: Option<ManifestData>,
}

#[derive(Debug, Deserialize)]
struct ManifestData {
    #[serde(default)]
    bid_data: Vec<ManifestDifficulty>,
}

/// One difficulty as listed in the provider's manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ManifestDifficulty {
    /// Audio file name
    #[serde(default)]
    pub audio: String,
    /// Background file name
    #[serde(default)]
    pub bg: String,
    /// Difficulty name
    #[serde(default)]
    pub version: String,
}

/// A track to build once its files are on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTrack {
    pub audio: String,
    pub background: Option<String>,
    pub difficulty: Option<String>,
}

/// Files to download and tracks to build for one set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectPlan {
    /// Distinct file names, in first-referenced order
    pub files: Vec<String>,
    /// One entry per distinct audio file
    pub tracks: Vec<PlannedTrack>,
}

/// Collapse per-difficulty records into distinct files and tracks.
///
/// Difficulties sharing an audio file produce one track, paired with the
/// background of the first difficulty that referenced that audio.
pub fn plan_direct_fetch(difficulties: &[ManifestDifficulty]) -> DirectPlan {
    let mut plan = DirectPlan::default();
    let mut seen_files = HashSet::new();
    let mut seen_audio = HashSet::new();

    for diff in difficulties {
        let Some(audio) = sanitize_filename(&diff.audio) else {
            continue;
        };
        let background = sanitize_filename(&diff.bg);

        if seen_audio.insert(audio.clone()) {
            plan.tracks.push(PlannedTrack {
                audio: audio.clone(),
                background: background.clone(),
                difficulty: Some(diff.version.trim().to_string()).filter(|v| !v.is_empty()),
            });
        }

        for file in std::iter::once(audio).chain(background) {
            if seen_files.insert(file.clone()) {
                plan.files.push(file);
            }
        }
    }

    plan
}

/// Fetches a set's audio and backgrounds one file at a time
#[derive(Debug, Clone)]
pub struct DirectAssetFetcher {
    client: reqwest::Client,
    provider: DirectProviderConfig,
    library_dir: PathBuf,
}

impl DirectAssetFetcher {
    pub fn new(client: reqwest::Client, provider: DirectProviderConfig, library_dir: PathBuf) -> Self {
        Self {
            client,
            provider,
            library_dir,
        }
    }

    pub fn from_config(config: &Config, client: reqwest::Client) -> Self {
        Self::new(client, config.direct.clone(), config.library_dir.clone())
    }

    /// Whether a mirror preference selects this provider
    pub fn handles(&self, preference: &str) -> bool {
        self.provider.name.eq_ignore_ascii_case(preference.trim())
    }

    /// Fetch every distinct file of `set_id`; ends with `Completed` or `Error`
    pub fn fetch(&self, set_id: i64) -> EventStream<DownloadEvent> {
        let this = self.clone();
        EventStream::spawn(move |sink| async move {
            let event = match this.run(set_id, &sink).await {
                Ok(tracks) => DownloadEvent::Completed { set_id, tracks },
                Err(Error::Cancelled) => return,
                Err(e) => {
                    warn!(set_id, error = %e, "Direct fetch failed");
                    DownloadEvent::Error {
                        message: e.to_string(),
                    }
                }
            };
            sink.emit(event).await;
        })
    }

    async fn run(&self, set_id: i64, sink: &EventSink<DownloadEvent>) -> Result<Vec<ExtractedTrack>> {
        let difficulties = self.manifest(set_id).await?;
        let plan = plan_direct_fetch(&difficulties);
        if plan.tracks.is_empty() {
            return Err(Error::Other(format!(
                "Set {} has no audio on {}",
                set_id, self.provider.name
            )));
        }

        let set_dir = set_asset_dir(&self.library_dir, set_id);
        tokio::fs::create_dir_all(&set_dir).await?;

        let audio_files: HashSet<String> = plan.tracks.iter().map(|t| t.audio.clone()).collect();
        let mut failed_backgrounds = HashSet::new();
        let total = plan.files.len();

        for (done, file) in plan.files.iter().enumerate() {
            let dest = set_dir.join(file);
            if is_present(&dest).await {
                debug!(set_id, file = %file, "Already present, skipping");
            } else if let Err(e) = self.download_file(set_id, file, &dest, sink).await {
                if matches!(e, Error::Cancelled) || audio_files.contains(file) {
                    return Err(e);
                }
                warn!(set_id, file = %file, error = %e, "Background download failed");
                failed_backgrounds.insert(file.clone());
            }

            let event = DownloadEvent::Downloading {
                percent: Some((((done + 1) * 100) / total) as u8),
                label: format!("Downloaded {} of {} files", done + 1, total),
            };
            if !sink.emit(event).await {
                return Err(Error::Cancelled);
            }
        }

        info!(set_id, files = total, tracks = plan.tracks.len(), "Direct fetch complete");

        Ok(plan
            .tracks
            .into_iter()
            .map(|t| ExtractedTrack {
                audio_path: set_dir.join(&t.audio),
                cover_path: t
                    .background
                    .filter(|bg| !failed_backgrounds.contains(bg))
                    .map(|bg| set_dir.join(bg)),
                difficulty: t.difficulty,
            })
            .collect())
    }

    async fn manifest(&self, set_id: i64) -> Result<Vec<ManifestDifficulty>> {
        let url = endpoint_url(&self.provider.manifest_template, set_id);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url,
            });
        }

        let manifest: ManifestResponse = serde_json::from_slice(&response.bytes().await?)?;
        match manifest.data {
            Some(data) if manifest.status == 0 => Ok(data.bid_data),
            _ => Err(Error::Other(format!(
                "Set {} not found on {} (status {})",
                set_id, self.provider.name, manifest.status
            ))),
        }
    }

    fn file_url(&self, set_id: i64, file: &str) -> Result<reqwest::Url> {
        let with_id = endpoint_url(&self.provider.file_template, set_id);
        let base = with_id.strip_suffix(FILE_PLACEHOLDER).ok_or_else(|| {
            Error::Config(format!(
                "Direct file template must end with {}: {}",
                FILE_PLACEHOLDER, self.provider.file_template
            ))
        })?;

        let mut url = reqwest::Url::parse(base).map_err(|e| Error::Config(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("Not a base URL: {}", base)))?
            .pop_if_empty()
            .push(file);
        Ok(url)
    }

    async fn download_file(
        &self,
        set_id: i64,
        file: &str,
        dest: &Path,
        sink: &EventSink<DownloadEvent>,
    ) -> Result<u64> {
        let url = self.file_url(set_id, file)?;
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        copy_response(response, dest, Some(sink), None).await
    }
}

/// A file counts as present when it exists and is not empty
async fn is_present(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}
