//! Download mirror ordering

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Placeholder substituted with the beatmap set ID
pub const SET_ID_PLACEHOLDER: &str = "%s";

/// A named archive mirror
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorEndpoint {
    pub name: String,
    /// URL template containing exactly one `%s`
    pub template: String,
}

impl MirrorEndpoint {
    pub fn new(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
        }
    }

    /// Built-in mirror order
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("catboy", "https://catboy.best/d/%s"),
            Self::new("nerinyan", "https://api.nerinyan.moe/d/%s"),
            Self::new("osudirect", "https://osu.direct/api/d/%s"),
            Self::new("beatconnect", "https://beatconnect.io/b/%s"),
            Self::new("sayobot", "https://dl.sayobot.cn/beatmaps/download/full/%s"),
        ]
    }

    /// Whether the template carries exactly one placeholder
    pub fn is_valid(&self) -> bool {
        self.template.matches(SET_ID_PLACEHOLDER).count() == 1
    }
}

/// Substitute the set ID into a mirror template
pub fn endpoint_url(template: &str, set_id: i64) -> String {
    template.replacen(SET_ID_PLACEHOLDER, &set_id.to_string(), 1)
}

/// Orders mirror templates according to the user's preference.
///
/// Pure function of configuration: no network access, no failure mode.
#[derive(Debug, Clone)]
pub struct MirrorResolver {
    endpoints: Vec<MirrorEndpoint>,
}

impl Default for MirrorResolver {
    fn default() -> Self {
        Self::new(MirrorEndpoint::defaults())
    }
}

impl MirrorResolver {
    /// Create a resolver over a default mirror order.
    ///
    /// Templates without exactly one placeholder are dropped.
    pub fn new(endpoints: Vec<MirrorEndpoint>) -> Self {
        let endpoints = endpoints
            .into_iter()
            .filter(|e| {
                let valid = e.is_valid();
                if !valid {
                    tracing::warn!("Ignoring mirror {} with invalid template {}", e.name, e.template);
                }
                valid
            })
            .collect();
        Self { endpoints }
    }

    pub fn endpoints(&self) -> &[MirrorEndpoint] {
        &self.endpoints
    }

    /// Find a configured mirror by name (case-insensitive)
    pub fn find(&self, name: &str) -> Option<&MirrorEndpoint> {
        self.endpoints
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name.trim()))
    }

    /// Ordered list of templates to try.
    ///
    /// A preference naming a configured mirror moves it to the front; any other
    /// value (`auto`, empty, unknown) keeps the default order. Duplicate
    /// templates are removed, first occurrence wins.
    pub fn resolve(&self, preference: &str) -> Vec<String> {
        let pinned = self.find(preference);

        let mut seen = HashSet::new();
        pinned
            .into_iter()
            .chain(self.endpoints.iter())
            .filter(|e| seen.insert(e.template.as_str()))
            .map(|e| e.template.clone())
            .collect()
    }
}
