//! Archive download with sequential mirror fallback

use reqwest::header::ACCEPT;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use super::{copy_response, host_label, DownloadEvent, ARCHIVE_ACCEPT};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::mirror::{endpoint_url, MirrorResolver};
use crate::stream::{EventSink, EventStream};

/// Downloads a beatmap archive, trying mirrors one after another.
///
/// Mirrors are never raced concurrently: the first one that answers with a
/// complete body wins and the rest are not contacted.
#[derive(Debug, Clone)]
pub struct ArchiveFetcher {
    client: reqwest::Client,
    resolver: MirrorResolver,
    downloads_dir: PathBuf,
}

impl ArchiveFetcher {
    pub fn new(client: reqwest::Client, resolver: MirrorResolver, downloads_dir: PathBuf) -> Self {
        Self {
            client,
            resolver,
            downloads_dir,
        }
    }

    pub fn from_config(config: &Config, client: reqwest::Client) -> Self {
        Self::new(
            client,
            MirrorResolver::new(config.mirrors.clone()),
            config.downloads_dir(),
        )
    }

    pub fn resolver(&self) -> &MirrorResolver {
        &self.resolver
    }

    /// Where the archive for `set_id` lands
    pub fn archive_path(&self, set_id: i64) -> PathBuf {
        self.downloads_dir.join(format!("{}.osz", set_id))
    }

    /// Fetch the archive of `set_id`, mirrors ordered by `preference`.
    ///
    /// Ends with `Downloaded` or with `Error` carrying the last mirror's failure.
    pub fn fetch(
        &self,
        set_id: i64,
        auth_token: Option<String>,
        preference: &str,
    ) -> EventStream<DownloadEvent> {
        let templates = self.resolver.resolve(preference);
        let this = self.clone();
        EventStream::spawn(move |sink| async move {
            this.run(set_id, auth_token, templates, sink).await;
        })
    }

    async fn run(
        self,
        set_id: i64,
        auth_token: Option<String>,
        templates: Vec<String>,
        sink: EventSink<DownloadEvent>,
    ) {
        let dest = self.archive_path(set_id);
        let mut last_error = Error::NoMirrors.to_string();

        for (attempt, template) in templates.iter().enumerate() {
            let url = endpoint_url(template, set_id);
            debug!(set_id, %url, attempt = attempt + 1, "Trying mirror");

            match self.download(&url, auth_token.as_deref(), &dest, &sink).await {
                Ok(bytes) => {
                    info!(set_id, %url, bytes, "Archive downloaded");
                    sink.emit(DownloadEvent::Downloaded {
                        set_id,
                        archive: dest,
                    })
                    .await;
                    return;
                }
                Err(Error::Cancelled) => {
                    debug!(set_id, "Download abandoned by consumer");
                    return;
                }
                Err(e) => {
                    warn!(set_id, %url, error = %e, "Mirror failed, trying next");
                    last_error = e.to_string();
                }
            }
        }

        sink.emit(DownloadEvent::Error {
            message: last_error,
        })
        .await;
    }

    async fn download(
        &self,
        url: &str,
        auth_token: Option<&str>,
        dest: &std::path::Path,
        sink: &EventSink<DownloadEvent>,
    ) -> Result<u64> {
        let mut request = self.client.get(url).header(ACCEPT, ARCHIVE_ACCEPT);
        if let Some(token) = auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let host = host_label(url);
        copy_response(response, dest, Some(sink), Some(&host)).await
    }
}
