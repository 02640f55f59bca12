//! Shared fixtures: local HTTP servers standing in for mirrors, zip builders
//! and a throwaway library.

#![allow(dead_code)]

use axum::body::Body;
use axum::Router;
use futures::StreamExt;
use osu_tunes_core::{
    Config, DirectProviderConfig, EventStream, ImportCoordinator, Library, LibraryDb,
    MirrorEndpoint, Preferences,
};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use zip::write::FileOptions;
use zip::ZipWriter;

/// Route library logs to the test harness
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_target(false)
        .try_init();
}

/// Serve `router` on an ephemeral local port; returns the base URL
pub async fn serve(router: Router) -> String {
    init_tracing();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().expect("Failed to read local address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Test server crashed");
    });
    format!("http://{}", addr)
}

/// Records which paths a test server was asked for, in order
#[derive(Debug, Clone, Default)]
pub struct HitLog(Arc<Mutex<Vec<String>>>);

impl HitLog {
    pub fn record(&self, hit: impl Into<String>) {
        self.0.lock().unwrap().push(hit.into());
    }

    pub fn hits(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, hit: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|h| *h == hit).count()
    }
}

/// A response body of unknown length that never ends, one 300 KiB chunk at a time
pub fn endless_body() -> Body {
    let chunks = futures::stream::unfold((), |()| async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Some((Ok::<_, std::io::Error>(vec![0u8; 300 * 1024]), ()))
    });
    Body::from_stream(chunks)
}

/// Wait up to two seconds for `path` to disappear
pub async fn wait_until_gone(path: &Path) -> bool {
    for _ in 0..100 {
        if !path.exists() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

/// Build an in-memory zip archive
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::<()>::default().compression_method(zip::CompressionMethod::Stored);
    for (name, content) in entries {
        zip.start_file(*name, options).expect("Failed to start zip entry");
        zip.write_all(content).expect("Failed to write zip entry");
    }
    zip.finish().expect("Failed to finish zip").into_inner()
}

/// A typical archive: two difficulties sharing one song and one background
pub fn typical_archive() -> Vec<u8> {
    zip_bytes(&[
        ("diff1.osu", b"osu file format v14\n[Metadata]\nVersion:Easy"),
        ("diff2.osu", b"osu file format v14\n[Metadata]\nVersion:Hard"),
        ("song.mp3", b"ID3 pretend audio"),
        ("bg.jpg", b"pretend jpeg"),
    ])
}

/// Collect every event of a stream
pub async fn collect<T: Send + 'static>(stream: EventStream<T>) -> Vec<T> {
    stream.collect().await
}

/// A throwaway library rooted in a temp dir
pub struct TestFixture {
    _temp_dir: TempDir,
    pub config: Config,
    pub prefs: Arc<Preferences>,
    pub db: LibraryDb,
}

impl TestFixture {
    /// Mirrors are given as `(name, path template)` relative to `base`
    pub async fn new(base: &str, mirrors: &[(&str, &str)]) -> Self {
        init_tracing();
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut config = Config::with_root(temp_dir.path());
        config.mirrors = mirrors
            .iter()
            .map(|(name, path)| MirrorEndpoint::new(*name, format!("{}{}", base, path)))
            .collect();
        config.direct = DirectProviderConfig {
            name: "direct".to_string(),
            manifest_template: format!("{}/manifest/%s", base),
            file_template: format!("{}/files/%s/{{file}}", base),
        };
        config.cover_url_template = Some(format!("{}/covers/%s.jpg", base));

        let prefs = Arc::new(
            Preferences::open(&config.preferences_path).expect("Failed to open preferences"),
        );
        let db = LibraryDb::in_memory().await.expect("Failed to open database");

        Self {
            _temp_dir: temp_dir,
            config,
            prefs,
            db,
        }
    }

    pub fn coordinator(&self) -> ImportCoordinator {
        ImportCoordinator::new(&self.config, self.db.clone(), self.prefs.clone())
            .expect("Failed to build coordinator")
    }

    pub fn library(&self) -> Library {
        Library::from_config(&self.config, self.db.clone(), self.prefs.clone())
    }

    pub fn set_dir(&self, set_id: i64) -> PathBuf {
        self.config.set_dir(set_id)
    }

    /// Sorted file names in a set directory
    pub fn set_files(&self, set_id: i64) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.set_dir(set_id))
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().to_string())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}
