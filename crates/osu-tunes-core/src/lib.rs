//! # osu-tunes-core
//!
//! Turns osu! beatmap sets into a local, playable music library.
//!
//! This crate provides the download-and-import pipeline:
//! - Ordering download mirrors by user preference
//! - Downloading `.osz` archives with sequential mirror fallback
//! - Fetching individual files from providers that expose them
//! - Extracting one audio file and one cover per archive
//! - Persisting tracks and keeping the preserved-set list consistent
//!
//! ## Modules
//!
//! - [`beatmap`] - Beatmap set references and extracted tracks
//! - [`config`] - Configuration and the key-value preference store
//! - [`download`] - Archive, direct and cover fetchers
//! - [`error`] - Error types and Result alias
//! - [`extract`] - Archive extraction heuristics
//! - [`import`] - The import coordinator
//! - [`library`] - Relational store, preserved sets, track deletion
//! - [`mirror`] - Mirror ordering
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use futures::StreamExt;
//! use osu_tunes_core::{Config, ImportCoordinator, ImportEvent, ImportRequest, LibraryDb, Preferences};
//!
//! # async fn run() -> osu_tunes_core::Result<()> {
//! let config = Config::load();
//! let prefs = Arc::new(Preferences::open(&config.preferences_path)?);
//! let db = LibraryDb::open(&config.database_path).await?;
//!
//! let coordinator = ImportCoordinator::new(&config, db, prefs)?;
//! let mut events = coordinator.import(ImportRequest::new(39804));
//! while let Some(event) = events.next().await {
//!     match event {
//!         ImportEvent::Progress { label, .. } => println!("{}", label),
//!         ImportEvent::Success { set_id } => println!("imported {}", set_id),
//!         ImportEvent::Error { message } => eprintln!("{}", message),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

// Module declarations
pub mod beatmap;
pub mod config;
pub mod download;
pub mod error;
pub mod extract;
pub mod import;
pub mod library;
pub mod mirror;
pub mod stream;
pub mod utils;

// Re-export key types for convenience

// Error types
pub use error::{Error, Result};

// Beatmap types
pub use beatmap::{BeatmapSet, ExtractedTrack, RankedStatus};

// Configuration
pub use config::{keys, Config, DirectProviderConfig, PreferenceValue, Preferences};

// Mirrors and fetching
pub use download::{
    ArchiveFetcher, CoverFallbackFetcher, DirectAssetFetcher, DownloadEvent,
};
pub use mirror::{MirrorEndpoint, MirrorResolver};

// Extraction
pub use extract::{ArchiveExtractor, ExtractionOutput};

// Import pipeline
pub use import::{ImportCoordinator, ImportEvent, ImportRequest};
pub use stream::EventStream;

// Library
pub use library::{
    Library, LibraryDb, Playlist, PlaylistEntry, PreservedSetId, PreservedSetRegistry, Track,
};
