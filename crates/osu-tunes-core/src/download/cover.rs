//! Fallback cover download

use std::path::PathBuf;
use tracing::{debug, warn};

use super::copy_response;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::utils::set_asset_dir;

/// File name a fallback cover is stored under inside the set directory
pub const FALLBACK_COVER_FILE: &str = "cover.jpg";

/// Downloads a cover image when extraction produced none.
///
/// Best-effort: every failure yields `None`, never an error.
#[derive(Debug, Clone)]
pub struct CoverFallbackFetcher {
    client: reqwest::Client,
    library_dir: PathBuf,
}

impl CoverFallbackFetcher {
    pub fn new(client: reqwest::Client, library_dir: PathBuf) -> Self {
        Self {
            client,
            library_dir,
        }
    }

    pub fn from_config(config: &Config, client: reqwest::Client) -> Self {
        Self::new(client, config.library_dir.clone())
    }

    /// Download `url` into the set directory; `None` on any failure
    pub async fn fetch(&self, set_id: i64, url: &str) -> Option<PathBuf> {
        match self.try_fetch(set_id, url).await {
            Ok(path) => {
                debug!(set_id, path = %path.display(), "Saved fallback cover");
                Some(path)
            }
            Err(e) => {
                warn!(set_id, %url, error = %e, "Fallback cover unavailable");
                None
            }
        }
    }

    async fn try_fetch(&self, set_id: i64, url: &str) -> Result<PathBuf> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let dest = set_asset_dir(&self.library_dir, set_id).join(FALLBACK_COVER_FILE);
        let bytes = copy_response(response, &dest, None, None).await?;
        if bytes == 0 {
            let _ = tokio::fs::remove_file(&dest).await;
            return Err(Error::Other("Empty cover image".to_string()));
        }
        Ok(dest)
    }
}
