//! Set IDs that survive destructive library resets

use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::db::LibraryDb;
use super::model::PreservedSetId;
use crate::config::{keys, Preferences};
use crate::error::{Error, Result};

/// Preserved set IDs, written through to the database and the preference mirror.
///
/// The database is authoritative for reads. The preference copy only exists
/// so the list can be recovered after the database was wiped; the two stores
/// are not updated atomically.
#[derive(Debug, Clone)]
pub struct PreservedSetRegistry {
    db: LibraryDb,
    prefs: Arc<Preferences>,
}

impl PreservedSetRegistry {
    pub fn new(db: LibraryDb, prefs: Arc<Preferences>) -> Self {
        Self { db, prefs }
    }

    /// Preserve `set_id`. Adding an ID twice keeps one entry.
    ///
    /// Returns `true` if the database did not have the ID yet.
    pub async fn add(&self, set_id: i64) -> Result<bool> {
        let inserted = self
            .db
            .insert_preserved(set_id, Utc::now().timestamp_millis())
            .await?;
        self.update_mirror(move |ids| {
            ids.insert(set_id.to_string());
        })
        .await?;
        if inserted {
            debug!(set_id, "Preserved set");
        }
        Ok(inserted)
    }

    /// Stop preserving `set_id`; returns `true` if the database had it
    pub async fn remove(&self, set_id: i64) -> Result<bool> {
        let removed = self.db.delete_preserved(set_id).await?;
        self.update_mirror(move |ids| {
            ids.remove(&set_id.to_string());
        })
        .await?;
        if removed {
            debug!(set_id, "Released preserved set");
        }
        Ok(removed)
    }

    pub async fn list(&self) -> Result<Vec<PreservedSetId>> {
        self.db.list_preserved().await
    }

    pub async fn count(&self) -> Result<i64> {
        self.db.count_preserved().await
    }

    pub async fn contains(&self, set_id: i64) -> Result<bool> {
        Ok(self.list().await?.iter().any(|p| p.beatmap_set_id == set_id))
    }

    /// IDs held by the preference mirror; unparsable entries are skipped
    pub fn mirrored_ids(&self) -> BTreeSet<i64> {
        self.prefs
            .get_string_set(keys::PRESERVED_SET_IDS)
            .iter()
            .filter_map(|id| match id.parse::<i64>() {
                Ok(id) => Some(id),
                Err(_) => {
                    warn!("Ignoring malformed preserved set ID {:?}", id);
                    None
                }
            })
            .collect()
    }

    /// Re-seed an empty database table from the preference mirror.
    ///
    /// Returns the number of IDs restored. A non-empty table is left alone.
    pub async fn recover(&self) -> Result<usize> {
        if self.count().await? > 0 {
            return Ok(0);
        }

        let now = Utc::now().timestamp_millis();
        let mut restored = 0;
        for set_id in self.mirrored_ids() {
            if self.db.insert_preserved(set_id, now).await? {
                restored += 1;
            }
        }
        if restored > 0 {
            info!(restored, "Recovered preserved sets from preference mirror");
        }
        Ok(restored)
    }

    /// Overwrite the preference mirror with the database contents
    pub async fn refresh_mirror(&self) -> Result<usize> {
        let ids: BTreeSet<String> = self
            .list()
            .await?
            .iter()
            .map(|p| p.beatmap_set_id.to_string())
            .collect();
        let count = ids.len();
        self.update_mirror(move |mirrored| *mirrored = ids).await?;
        Ok(count)
    }

    /// Rewrite the preference mirror off the async runtime
    async fn update_mirror<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut BTreeSet<String>) + Send + 'static,
    {
        let prefs = self.prefs.clone();
        tokio::task::spawn_blocking(move || prefs.update_string_set(keys::PRESERVED_SET_IDS, f))
            .await
            .map_err(|e| Error::Other(e.to_string()))?
    }
}
