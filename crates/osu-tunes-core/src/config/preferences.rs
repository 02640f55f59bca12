//! Flat key-value preference store backed by a JSON file

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::Result;

/// Well-known preference keys
pub mod keys {
    /// Name of the mirror the user pinned, or `auto`
    pub const PREFERRED_MIRROR: &str = "preferred_mirror";
    /// OAuth access token sent to mirrors that accept it
    pub const ACCESS_TOKEN: &str = "access_token";
    /// Mirror of the preserved set IDs kept in the relational store
    pub const PRESERVED_SET_IDS: &str = "preserved_set_ids";
}

/// A single stored value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PreferenceValue {
    Bool(bool),
    Text(String),
    Set(BTreeSet<String>),
}

/// Typed get/set access to persisted preferences.
///
/// Every mutation is written to disk before it returns.
#[derive(Debug)]
pub struct Preferences {
    path: Option<PathBuf>,
    values: Mutex<BTreeMap<String, PreferenceValue>>,
}

impl Preferences {
    /// Open the store at `path`, starting empty if the file does not exist yet
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let values = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path: Some(path),
            values: Mutex::new(values),
        })
    }

    /// A store that is never written to disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            values: Mutex::new(BTreeMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, PreferenceValue>> {
        self.values.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self, values: &BTreeMap<String, PreferenceValue>) -> Result<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(values)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `f` to a copy of the values; the copy replaces them only once persisted
    fn modify<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut BTreeMap<String, PreferenceValue>) -> bool,
    {
        let mut values = self.lock();
        let mut updated = values.clone();
        if !f(&mut updated) {
            return Ok(());
        }
        self.persist(&updated)?;
        *values = updated;
        Ok(())
    }

    fn set(&self, key: &str, value: PreferenceValue) -> Result<()> {
        self.modify(|values| {
            values.insert(key.to_string(), value);
            true
        })
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.lock().get(key) {
            Some(PreferenceValue::Text(s)) => Some(s.clone()),
            _ => None,
        }
    }

    pub fn set_string(&self, key: &str, value: impl Into<String>) -> Result<()> {
        self.set(key, PreferenceValue::Text(value.into()))
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.lock().get(key) {
            Some(PreferenceValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.set(key, PreferenceValue::Bool(value))
    }

    /// Get a string set; a missing key reads as the empty set
    pub fn get_string_set(&self, key: &str) -> BTreeSet<String> {
        match self.lock().get(key) {
            Some(PreferenceValue::Set(set)) => set.clone(),
            _ => BTreeSet::new(),
        }
    }

    pub fn set_string_set(&self, key: &str, value: BTreeSet<String>) -> Result<()> {
        self.set(key, PreferenceValue::Set(value))
    }

    /// Apply `f` to a string set and store the result under the same lock
    pub fn update_string_set<F>(&self, key: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut BTreeSet<String>),
    {
        self.modify(|values| {
            let mut set = match values.remove(key) {
                Some(PreferenceValue::Set(set)) => set,
                _ => BTreeSet::new(),
            };
            f(&mut set);
            values.insert(key.to_string(), PreferenceValue::Set(set));
            true
        })
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        self.modify(|values| values.remove(key).is_some())
    }

    /// The pinned mirror name, `auto` when unset
    pub fn preferred_mirror(&self) -> String {
        self.get_string(keys::PREFERRED_MIRROR)
            .unwrap_or_else(|| "auto".to_string())
    }

    pub fn access_token(&self) -> Option<String> {
        self.get_string(keys::ACCESS_TOKEN).filter(|t| !t.is_empty())
    }
}
