//! Utility functions shared across modules.

use std::path::{Path, PathBuf};

/// Directory holding the assets of one beatmap set
pub fn set_asset_dir(library_dir: &Path, set_id: i64) -> PathBuf {
    library_dir.join(set_id.to_string())
}

/// Reduce a provider-supplied file name to a safe single path component.
///
/// Directory parts are dropped and the characters
/// `/`, `\`, `:`, `*`, `?`, `"`, `<`, `>`, `|` are replaced with underscores.
/// Returns `None` when nothing usable is left.
///
/// # Examples
///
/// ```
/// use osu_tunes_core::utils::sanitize_filename;
///
/// assert_eq!(sanitize_filename("audio.mp3").as_deref(), Some("audio.mp3"));
/// assert_eq!(sanitize_filename("../../etc/passwd").as_deref(), Some("passwd"));
/// assert_eq!(sanitize_filename("bg:1.jpg").as_deref(), Some("bg_1.jpg"));
/// assert_eq!(sanitize_filename(".."), None);
/// ```
pub fn sanitize_filename(name: &str) -> Option<String> {
    let last = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    let cleaned: String = last
        .chars()
        .map(|c| match c {
            ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            _ => c,
        })
        .collect::<String>()
        .trim()
        .to_string();

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        None
    } else {
        Some(cleaned)
    }
}

/// Lower-cased extension of a file name, without the dot
pub fn extension_lower(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(|e| e.to_ascii_lowercase())
}

/// Format a byte count for progress labels
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.0} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Remove a file, treating "already gone" as success
pub async fn remove_file_if_exists(path: &Path) -> std::io::Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
