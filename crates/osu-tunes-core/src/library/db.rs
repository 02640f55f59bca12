//! SQLite-backed relational store

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;

use super::model::{Playlist, PlaylistEntry, PreservedSetId, Track};
use crate::error::Result;

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS tracks (
        id TEXT PRIMARY KEY NOT NULL,
        beatmap_set_id INTEGER NOT NULL,
        title TEXT NOT NULL,
        artist TEXT NOT NULL,
        creator TEXT NOT NULL,
        difficulty TEXT,
        audio_path TEXT NOT NULL,
        cover_path TEXT NOT NULL DEFAULT '',
        imported_at INTEGER NOT NULL,
        is_album INTEGER NOT NULL DEFAULT 0,
        genre TEXT
    )"#,
    r#"CREATE INDEX IF NOT EXISTS idx_tracks_set ON tracks (beatmap_set_id)"#,
    r#"CREATE TABLE IF NOT EXISTS preserved_sets (
        beatmap_set_id INTEGER PRIMARY KEY NOT NULL,
        preserved_at INTEGER NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS playlists (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS playlist_entries (
        playlist_id INTEGER NOT NULL REFERENCES playlists (id) ON DELETE CASCADE,
        beatmap_set_id INTEGER NOT NULL,
        title TEXT NOT NULL,
        artist TEXT NOT NULL,
        downloaded INTEGER NOT NULL DEFAULT 0,
        added_at INTEGER NOT NULL,
        PRIMARY KEY (playlist_id, beatmap_set_id)
    )"#,
];

/// Tracks, preserved sets and playlists.
///
/// Cheap to clone; clones share the connection pool. Write serialization is
/// left to SQLite.
#[derive(Debug, Clone)]
pub struct LibraryDb {
    pool: SqlitePool,
}

impl LibraryDb {
    /// Open (or create) the database file at `path`
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    /// A private in-memory database
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // Every connection would see its own empty database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        Ok(Self { pool })
    }

    /// The underlying pool, for queries this type does not wrap
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    // Tracks

    /// Insert a track, replacing any row with the same ID
    pub async fn insert_track(&self, track: &Track) -> Result<()> {
        sqlx::query(
            r#"INSERT OR REPLACE INTO tracks
               (id, beatmap_set_id, title, artist, creator, difficulty,
                audio_path, cover_path, imported_at, is_album, genre)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"#,
        )
        .bind(&track.id)
        .bind(track.beatmap_set_id)
        .bind(&track.title)
        .bind(&track.artist)
        .bind(&track.creator)
        .bind(&track.difficulty)
        .bind(&track.audio_path)
        .bind(&track.cover_path)
        .bind(track.imported_at)
        .bind(track.is_album)
        .bind(&track.genre)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_track(&self, id: &str) -> Result<Option<Track>> {
        let track = sqlx::query_as(r#"SELECT * FROM tracks WHERE id = ?1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(track)
    }

    /// All tracks, newest import first
    pub async fn list_tracks(&self) -> Result<Vec<Track>> {
        let tracks = sqlx::query_as(r#"SELECT * FROM tracks ORDER BY imported_at DESC, id"#)
            .fetch_all(&self.pool)
            .await?;
        Ok(tracks)
    }

    pub async fn tracks_for_set(&self, set_id: i64) -> Result<Vec<Track>> {
        let tracks = sqlx::query_as(r#"SELECT * FROM tracks WHERE beatmap_set_id = ?1 ORDER BY id"#)
            .bind(set_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(tracks)
    }

    pub async fn count_tracks_for_set(&self, set_id: i64) -> Result<i64> {
        let count = sqlx::query_scalar(r#"SELECT COUNT(*) FROM tracks WHERE beatmap_set_id = ?1"#)
            .bind(set_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn count_tracks(&self) -> Result<i64> {
        let count = sqlx::query_scalar(r#"SELECT COUNT(*) FROM tracks"#)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Set IDs that currently own at least one track
    pub async fn track_set_ids(&self) -> Result<HashSet<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar(r#"SELECT DISTINCT beatmap_set_id FROM tracks"#)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().collect())
    }

    /// Returns `true` if a row was deleted
    pub async fn delete_track(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(r#"DELETE FROM tracks WHERE id = ?1"#)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Wipe every track row; files on disk are untouched
    pub async fn delete_all_tracks(&self) -> Result<u64> {
        let result = sqlx::query(r#"DELETE FROM tracks"#)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // Preserved sets

    /// Returns `true` if the ID was not preserved before
    pub async fn insert_preserved(&self, set_id: i64, preserved_at: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"INSERT OR IGNORE INTO preserved_sets (beatmap_set_id, preserved_at) VALUES (?1, ?2)"#,
        )
        .bind(set_id)
        .bind(preserved_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_preserved(&self, set_id: i64) -> Result<bool> {
        let result = sqlx::query(r#"DELETE FROM preserved_sets WHERE beatmap_set_id = ?1"#)
            .bind(set_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_preserved(&self) -> Result<Vec<PreservedSetId>> {
        let rows = sqlx::query_as(r#"SELECT * FROM preserved_sets ORDER BY preserved_at, beatmap_set_id"#)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn count_preserved(&self) -> Result<i64> {
        let count = sqlx::query_scalar(r#"SELECT COUNT(*) FROM preserved_sets"#)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // Playlists

    pub async fn create_playlist(&self, name: &str, created_at: i64) -> Result<i64> {
        let result = sqlx::query(r#"INSERT INTO playlists (name, created_at) VALUES (?1, ?2)"#)
            .bind(name)
            .bind(created_at)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn list_playlists(&self) -> Result<Vec<Playlist>> {
        let playlists = sqlx::query_as(r#"SELECT * FROM playlists ORDER BY id"#)
            .fetch_all(&self.pool)
            .await?;
        Ok(playlists)
    }

    pub async fn delete_playlist(&self, playlist_id: i64) -> Result<bool> {
        let result = sqlx::query(r#"DELETE FROM playlists WHERE id = ?1"#)
            .bind(playlist_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Add or replace a playlist entry
    pub async fn upsert_playlist_entry(&self, entry: &PlaylistEntry) -> Result<()> {
        sqlx::query(
            r#"INSERT OR REPLACE INTO playlist_entries
               (playlist_id, beatmap_set_id, title, artist, downloaded, added_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
        )
        .bind(entry.playlist_id)
        .bind(entry.beatmap_set_id)
        .bind(&entry.title)
        .bind(&entry.artist)
        .bind(entry.downloaded)
        .bind(entry.added_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn remove_playlist_entry(&self, playlist_id: i64, set_id: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"DELETE FROM playlist_entries WHERE playlist_id = ?1 AND beatmap_set_id = ?2"#,
        )
        .bind(playlist_id)
        .bind(set_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn playlist_entries(&self, playlist_id: i64) -> Result<Vec<PlaylistEntry>> {
        let entries = sqlx::query_as(
            r#"SELECT * FROM playlist_entries WHERE playlist_id = ?1 ORDER BY added_at, beatmap_set_id"#,
        )
        .bind(playlist_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    /// Flag every playlist entry of `set_id`; returns the number of entries touched
    pub async fn set_download_status(&self, set_id: i64, downloaded: bool) -> Result<u64> {
        let result =
            sqlx::query(r#"UPDATE playlist_entries SET downloaded = ?1 WHERE beatmap_set_id = ?2"#)
                .bind(downloaded)
                .bind(set_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}
