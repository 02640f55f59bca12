//! Mirror fallback and streaming behavior of the archive fetcher.

mod common;

use axum::body::Body;
use axum::extract::Path;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::Router;
use common::{collect, endless_body, serve, wait_until_gone, HitLog};
use futures::StreamExt;
use osu_tunes_core::{ArchiveFetcher, DownloadEvent, MirrorEndpoint, MirrorResolver};
use tempfile::TempDir;

fn fetcher(base: &str, mirrors: &[(&str, &str)], downloads: &TempDir) -> ArchiveFetcher {
    let endpoints = mirrors
        .iter()
        .map(|(name, path)| MirrorEndpoint::new(*name, format!("{}{}", base, path)))
        .collect();
    ArchiveFetcher::new(
        reqwest::Client::new(),
        MirrorResolver::new(endpoints),
        downloads.path().to_path_buf(),
    )
}

/// `/fail/:id` answers 500, `/missing/:id` 404, `/ok/:id` 1024 bytes
fn mirror_router(hits: &HitLog) -> Router {
    let fail = hits.clone();
    let missing = hits.clone();
    let ok = hits.clone();
    Router::new()
        .route(
            "/fail/:id",
            get(move |Path(id): Path<String>| {
                let hits = fail.clone();
                async move {
                    hits.record(format!("fail/{}", id));
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            }),
        )
        .route(
            "/missing/:id",
            get(move |Path(id): Path<String>| {
                let hits = missing.clone();
                async move {
                    hits.record(format!("missing/{}", id));
                    StatusCode::NOT_FOUND
                }
            }),
        )
        .route(
            "/ok/:id",
            get(move |Path(id): Path<String>| {
                let hits = ok.clone();
                async move {
                    hits.record(format!("ok/{}", id));
                    vec![7u8; 1024]
                }
            }),
        )
}

#[tokio::test]
async fn falls_back_to_next_mirror_and_reports_progress() {
    let hits = HitLog::default();
    let base = serve(mirror_router(&hits)).await;
    let downloads = TempDir::new().unwrap();
    let fetcher = fetcher(&base, &[("fail", "/fail/%s"), ("ok", "/ok/%s")], &downloads);

    let events = collect(fetcher.fetch(123, None, "auto")).await;

    assert_eq!(hits.hits(), vec!["fail/123", "ok/123"]);

    let (last, progress) = events.split_last().expect("no events");
    let percents: Vec<Option<u8>> = progress
        .iter()
        .map(|e| match e {
            DownloadEvent::Downloading { percent, .. } => *percent,
            other => panic!("unexpected event before terminal: {:?}", other),
        })
        .collect();
    assert_eq!(percents.last(), Some(&Some(100)));
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));

    match last {
        DownloadEvent::Downloaded { set_id, archive } => {
            assert_eq!(*set_id, 123);
            assert_eq!(std::fs::metadata(archive).unwrap().len(), 1024);
        }
        other => panic!("expected Downloaded, got {:?}", other),
    }
}

#[tokio::test]
async fn stops_at_first_successful_mirror() {
    let hits = HitLog::default();
    let base = serve(mirror_router(&hits)).await;
    let downloads = TempDir::new().unwrap();
    let fetcher = fetcher(
        &base,
        &[("ok", "/ok/%s"), ("fail", "/fail/%s"), ("missing", "/missing/%s")],
        &downloads,
    );

    let events = collect(fetcher.fetch(5, None, "auto")).await;

    assert!(matches!(events.last(), Some(DownloadEvent::Downloaded { .. })));
    assert_eq!(hits.hits(), vec!["ok/5"]);
}

#[tokio::test]
async fn reports_last_error_when_every_mirror_fails() {
    let hits = HitLog::default();
    let base = serve(mirror_router(&hits)).await;
    let downloads = TempDir::new().unwrap();
    let fetcher = fetcher(
        &base,
        &[("fail", "/fail/%s"), ("missing", "/missing/%s")],
        &downloads,
    );

    let events = collect(fetcher.fetch(9, None, "auto")).await;

    // Each mirror tried exactly once, in order
    assert_eq!(hits.hits(), vec!["fail/9", "missing/9"]);
    assert_eq!(events.len(), 1);
    match &events[0] {
        DownloadEvent::Error { message } => assert!(message.contains("404"), "{}", message),
        other => panic!("expected Error, got {:?}", other),
    }
    assert!(!fetcher.archive_path(9).exists());
}

#[tokio::test]
async fn preferred_mirror_goes_first() {
    let hits = HitLog::default();
    let base = serve(mirror_router(&hits)).await;
    let downloads = TempDir::new().unwrap();
    let fetcher = fetcher(&base, &[("fail", "/fail/%s"), ("ok", "/ok/%s")], &downloads);

    let events = collect(fetcher.fetch(77, None, "ok")).await;

    assert!(matches!(events.last(), Some(DownloadEvent::Downloaded { .. })));
    assert_eq!(hits.hits(), vec!["ok/77"]);
}

#[tokio::test]
async fn sends_bearer_token_and_browser_headers() {
    let router = Router::new().route(
        "/auth/:id",
        get(|headers: HeaderMap| async move {
            let auth = headers.get("authorization").and_then(|v| v.to_str().ok());
            let agent = headers.get("user-agent").and_then(|v| v.to_str().ok());
            let accept = headers.get("accept").and_then(|v| v.to_str().ok());
            if auth != Some("Bearer secret") || agent.is_none() || accept.is_none() {
                return (StatusCode::UNAUTHORIZED, Vec::new());
            }
            (StatusCode::OK, vec![1u8; 16])
        }),
    );
    let base = serve(router).await;
    let downloads = TempDir::new().unwrap();
    let client = reqwest::Client::builder()
        .user_agent(osu_tunes_core::config::DEFAULT_USER_AGENT)
        .build()
        .unwrap();
    let fetcher = ArchiveFetcher::new(
        client,
        MirrorResolver::new(vec![MirrorEndpoint::new("auth", format!("{}/auth/%s", base))]),
        downloads.path().to_path_buf(),
    );

    let without = collect(fetcher.fetch(1, None, "auto")).await;
    assert!(matches!(without.last(), Some(DownloadEvent::Error { .. })));

    let with = collect(fetcher.fetch(1, Some("secret".to_string()), "auto")).await;
    assert!(matches!(with.last(), Some(DownloadEvent::Downloaded { .. })));
}

#[tokio::test]
async fn unknown_length_reports_no_percentage() {
    let router = Router::new().route(
        "/chunked/:id",
        get(|| async {
            let chunks = (0..6).map(|_| Ok::<_, std::io::Error>(vec![3u8; 100 * 1024]));
            Body::from_stream(futures::stream::iter(chunks))
        }),
    );
    let base = serve(router).await;
    let downloads = TempDir::new().unwrap();
    let fetcher = fetcher(&base, &[("chunked", "/chunked/%s")], &downloads);

    let events = collect(fetcher.fetch(2, None, "auto")).await;

    let (last, progress) = events.split_last().unwrap();
    assert!(!progress.is_empty());
    assert!(progress
        .iter()
        .all(|e| matches!(e, DownloadEvent::Downloading { percent: None, .. })));
    match last {
        DownloadEvent::Downloaded { archive, .. } => {
            assert_eq!(std::fs::metadata(archive).unwrap().len(), 600 * 1024);
        }
        other => panic!("expected Downloaded, got {:?}", other),
    }
}

#[tokio::test]
async fn empty_mirror_list_is_an_error() {
    let downloads = TempDir::new().unwrap();
    let fetcher = ArchiveFetcher::new(
        reqwest::Client::new(),
        MirrorResolver::new(Vec::new()),
        downloads.path().to_path_buf(),
    );

    let events = collect(fetcher.fetch(1, None, "auto")).await;
    assert!(matches!(&events[..], [DownloadEvent::Error { .. }]));
}

#[tokio::test]
async fn dropping_the_stream_discards_the_partial_download() {
    let router = Router::new().route("/slow/:id", get(|| async { endless_body() }));
    let base = serve(router).await;
    let downloads = TempDir::new().unwrap();
    let fetcher = fetcher(&base, &[("slow", "/slow/%s")], &downloads);
    let archive = fetcher.archive_path(3);
    let part = downloads.path().join("3.osz.part");

    let mut events = fetcher.fetch(3, None, "auto");
    let first = events.next().await.expect("stream ended early");
    assert!(matches!(first, DownloadEvent::Downloading { percent: None, .. }));
    assert!(part.exists());

    drop(events);

    assert!(wait_until_gone(&part).await, "partial file left behind");
    assert!(!archive.exists());
}
