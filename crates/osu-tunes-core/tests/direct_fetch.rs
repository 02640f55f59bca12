//! The per-file fetch path for providers that expose a manifest.

mod common;

use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use common::{collect, serve, HitLog};
use osu_tunes_core::{DirectAssetFetcher, DirectProviderConfig, DownloadEvent};
use serde_json::{json, Value};
use tempfile::TempDir;

/// Provider serving `manifest` for every set and any file except `missing.*`
fn provider_router(manifest: Value, hits: &HitLog) -> Router {
    let files = hits.clone();
    Router::new()
        .route(
            "/manifest/:id",
            get(move || {
                let manifest = manifest.clone();
                async move { Json(manifest) }
            }),
        )
        .route(
            "/files/:id/:file",
            get(move |Path((id, file)): Path<(String, String)>| {
                let hits = files.clone();
                async move {
                    hits.record(format!("{}/{}", id, file));
                    if file.starts_with("missing") {
                        return (StatusCode::NOT_FOUND, Vec::new());
                    }
                    (StatusCode::OK, format!("contents of {}", file).into_bytes())
                }
            }),
        )
}

fn fetcher(base: &str, library: &TempDir) -> DirectAssetFetcher {
    DirectAssetFetcher::new(
        reqwest::Client::new(),
        DirectProviderConfig {
            name: "direct".to_string(),
            manifest_template: format!("{}/manifest/%s", base),
            file_template: format!("{}/files/%s/{{file}}", base),
        },
        library.path().to_path_buf(),
    )
}

fn manifest(difficulties: Value) -> Value {
    json!({ "status": 0, "data": { "sid": 1, "bid_data": difficulties } })
}

#[tokio::test]
async fn shared_audio_downloads_once() {
    let hits = HitLog::default();
    let base = serve(provider_router(
        manifest(json!([
            { "audio": "audio.mp3", "bg": "bg.jpg", "version": "Easy" },
            { "audio": "audio.mp3", "bg": "bg.jpg", "version": "Normal" },
            { "audio": "audio.mp3", "bg": "bg.jpg", "version": "Hard" },
        ])),
        &hits,
    ))
    .await;
    let library = TempDir::new().unwrap();

    let events = collect(fetcher(&base, &library).fetch(10)).await;

    let Some(DownloadEvent::Completed { set_id, tracks }) = events.last() else {
        panic!("expected Completed, got {:?}", events.last());
    };
    assert_eq!(*set_id, 10);
    assert_eq!(tracks.len(), 1);
    assert_eq!(tracks[0].difficulty.as_deref(), Some("Easy"));
    assert_eq!(
        std::fs::read_to_string(&tracks[0].audio_path).unwrap(),
        "contents of audio.mp3"
    );
    assert!(tracks[0].cover_path.as_ref().unwrap().is_file());

    assert_eq!(hits.count("10/audio.mp3"), 1);
    assert_eq!(hits.count("10/bg.jpg"), 1);

    let percents: Vec<Option<u8>> = events
        .iter()
        .filter_map(|e| match e {
            DownloadEvent::Downloading { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect();
    assert_eq!(percents, vec![Some(50), Some(100)]);
}

#[tokio::test]
async fn existing_files_are_not_downloaded_again() {
    let hits = HitLog::default();
    let base = serve(provider_router(
        manifest(json!([{ "audio": "audio.mp3", "bg": "bg.jpg", "version": "Easy" }])),
        &hits,
    ))
    .await;
    let library = TempDir::new().unwrap();
    let set_dir = library.path().join("11");
    std::fs::create_dir_all(&set_dir).unwrap();
    std::fs::write(set_dir.join("audio.mp3"), b"already here").unwrap();

    let events = collect(fetcher(&base, &library).fetch(11)).await;

    assert!(matches!(events.last(), Some(DownloadEvent::Completed { .. })));
    assert_eq!(hits.hits(), vec!["11/bg.jpg"]);
    assert_eq!(
        std::fs::read_to_string(set_dir.join("audio.mp3")).unwrap(),
        "already here"
    );
}

#[tokio::test]
async fn failed_background_keeps_the_track() {
    let hits = HitLog::default();
    let base = serve(provider_router(
        manifest(json!([{ "audio": "audio.ogg", "bg": "missing.png", "version": "" }])),
        &hits,
    ))
    .await;
    let library = TempDir::new().unwrap();

    let events = collect(fetcher(&base, &library).fetch(12)).await;

    let Some(DownloadEvent::Completed { tracks, .. }) = events.last() else {
        panic!("expected Completed, got {:?}", events.last());
    };
    assert_eq!(tracks.len(), 1);
    assert_eq!(tracks[0].cover_path, None);
    assert!(tracks[0].needs_cover().await);
}

#[tokio::test]
async fn failed_audio_is_an_error() {
    let hits = HitLog::default();
    let base = serve(provider_router(
        manifest(json!([{ "audio": "missing.mp3", "bg": "bg.jpg", "version": "Easy" }])),
        &hits,
    ))
    .await;
    let library = TempDir::new().unwrap();

    let events = collect(fetcher(&base, &library).fetch(13)).await;

    match events.last() {
        Some(DownloadEvent::Error { message }) => assert!(message.contains("404"), "{}", message),
        other => panic!("expected Error, got {:?}", other),
    }
}

#[tokio::test]
async fn unknown_set_is_an_error() {
    let hits = HitLog::default();
    let base = serve(provider_router(json!({ "status": -1 }), &hits)).await;
    let library = TempDir::new().unwrap();

    let events = collect(fetcher(&base, &library).fetch(14)).await;

    assert!(matches!(&events[..], [DownloadEvent::Error { .. }]));
    assert!(hits.hits().is_empty());
}
