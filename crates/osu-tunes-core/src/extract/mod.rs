//! Pulling one audio file and one cover out of a beatmap archive

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::beatmap::ExtractedTrack;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::utils::{extension_lower, set_asset_dir};

/// Extensions treated as the song's audio
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "ogg", "wav", "flac", "m4a"];

/// Extensions treated as images
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Substrings in an image name that suggest a background
const BACKGROUND_HINTS: &[&str] = &["background", "bg", "back", "cover", "wallpaper"];

/// Prefixes of skin elements that ship inside archives
const SKIN_PREFIXES: &[&str] = &[
    "hit", "approach", "cursor", "slider", "spinner", "score-", "default-", "combo",
    "followpoint", "reverse", "lighting", "particle", "star", "sb-", "ranking", "menu",
];

/// What extraction left on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionOutput {
    /// Per-set asset directory
    pub directory: PathBuf,
    /// `audio.<ext>`
    pub audio: PathBuf,
    /// `cover.<ext>`, if any image qualified
    pub cover: Option<PathBuf>,
}

impl ExtractionOutput {
    /// Archives always yield exactly one track
    pub fn into_tracks(self) -> Vec<ExtractedTrack> {
        vec![ExtractedTrack {
            audio_path: self.audio,
            cover_path: self.cover,
            difficulty: None,
        }]
    }
}

/// Score an image name as a cover candidate; 0 means not acceptable.
///
/// Skin elements never qualify. Names hinting at a background score 2, other
/// JPEGs score 1. PNGs without a hint are assumed to be skin parts.
pub fn cover_score(file_name: &str) -> u8 {
    let Some(ext) = extension_lower(file_name) else {
        return 0;
    };
    if !IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        return 0;
    }

    let lower = file_name.to_lowercase();
    if SKIN_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        return 0;
    }
    if BACKGROUND_HINTS.iter().any(|hint| lower.contains(hint)) {
        return 2;
    }
    if ext == "jpg" || ext == "jpeg" {
        return 1;
    }
    0
}

/// Whether a file name carries a recognized audio extension
pub fn is_audio_file(file_name: &str) -> bool {
    extension_lower(file_name).is_some_and(|ext| AUDIO_EXTENSIONS.contains(&ext.as_str()))
}

/// Deletes the archive when dropped, whatever the outcome of extraction
struct ArchiveCleanup<'a>(&'a Path);

impl Drop for ArchiveCleanup<'_> {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(self.0) {
            if e.kind() == io::ErrorKind::NotFound {
                return;
            }
            warn!("Failed to remove archive {}: {}", self.0.display(), e);
        }
    }
}

/// Extracts downloaded archives into per-set directories.
///
/// Blocking; run it on a blocking-capable thread.
#[derive(Debug, Clone)]
pub struct ArchiveExtractor {
    library_dir: PathBuf,
}

impl ArchiveExtractor {
    pub fn new(library_dir: impl AsRef<Path>) -> Self {
        Self {
            library_dir: library_dir.as_ref().to_path_buf(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.library_dir)
    }

    /// Extract `archive_path` for `set_id`.
    ///
    /// The first audio entry becomes `audio.<ext>`; later audio entries are
    /// ignored. The first acceptable image becomes `cover.<ext>` and is never
    /// replaced by a later, better-scoring one. The archive is deleted on
    /// every exit path. On failure, files already written stay in place.
    pub fn extract(&self, archive_path: &Path, set_id: i64) -> Result<ExtractionOutput> {
        let _cleanup = ArchiveCleanup(archive_path);

        let file = File::open(archive_path)?;
        let mut archive = ZipArchive::new(file).map_err(|e| Error::InvalidArchive {
            path: archive_path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let directory = set_asset_dir(&self.library_dir, set_id);
        fs::create_dir_all(&directory)?;

        let mut audio = None;
        let mut cover = None;

        for i in 0..archive.len() {
            if audio.is_some() && cover.is_some() {
                break;
            }

            let mut entry = archive.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            let Some(entry_path) = entry.enclosed_name() else {
                warn!("Skipping unsafe archive entry {}", entry.name());
                continue;
            };
            let Some(file_name) = entry_path
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string)
            else {
                continue;
            };
            let Some(ext) = extension_lower(&file_name) else {
                continue;
            };

            if audio.is_none() && is_audio_file(&file_name) {
                let dest = directory.join(format!("audio.{}", ext));
                write_entry(&mut entry, &dest)?;
                debug!(set_id, entry = %file_name, "Extracted audio");
                audio = Some(dest);
            } else if cover.is_none() && cover_score(&file_name) > 0 {
                let dest = directory.join(format!("cover.{}", ext));
                write_entry(&mut entry, &dest)?;
                debug!(set_id, entry = %file_name, "Extracted cover");
                cover = Some(dest);
            }
        }

        let audio = audio.ok_or_else(|| Error::InvalidArchive {
            path: archive_path.to_path_buf(),
            reason: "no audio file found".to_string(),
        })?;

        Ok(ExtractionOutput {
            directory,
            audio,
            cover,
        })
    }
}

fn write_entry(entry: &mut impl io::Read, dest: &Path) -> Result<()> {
    let mut output = BufWriter::new(File::create(dest)?);
    io::copy(entry, &mut output)?;
    output.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut zip = ZipWriter::new(file);
        let options = FileOptions::<()>::default().compression_method(zip::CompressionMethod::Stored);
        for (name, content) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content).unwrap();
        }
        zip.finish().unwrap();
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_is_audio_file() {
        assert!(is_audio_file("song.mp3"));
        assert!(is_audio_file("song.OGG"));
        assert!(is_audio_file("song.wav"));
        assert!(!is_audio_file("bg.jpg"));
        assert!(!is_audio_file("diff.osu"));
    }

    #[test]
    fn test_cover_score() {
        assert_eq!(cover_score("bg.jpg"), 2);
        assert_eq!(cover_score("Background.PNG"), 2);
        assert_eq!(cover_score("scenery.jpg"), 1);
        assert_eq!(cover_score("hitcircle.jpg"), 0);
        assert_eq!(cover_score("hitcircle.png"), 0);
        assert_eq!(cover_score("random.png"), 0);
        assert_eq!(cover_score("song.mp3"), 0);
        assert_eq!(cover_score("menu-back.png"), 0);
    }

    #[test]
    fn test_extract_typical_archive() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("123.osz");
        write_zip(
            &archive,
            &[
                ("diff1.osu", b"osu file format v14"),
                ("diff2.osu", b"osu file format v14"),
                ("song.mp3", b"ID3 audio"),
                ("bg.jpg", b"jpeg bytes"),
            ],
        );

        let extractor = ArchiveExtractor::new(temp.path().join("library"));
        let output = extractor.extract(&archive, 123).unwrap();

        assert_eq!(file_names(&output.directory), vec!["audio.mp3", "cover.jpg"]);
        assert_eq!(fs::read(&output.audio).unwrap(), b"ID3 audio");
        assert!(!archive.exists());
    }

    #[test]
    fn test_first_audio_wins() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("1.osz");
        write_zip(
            &archive,
            &[("first.ogg", b"first"), ("second.mp3", b"second")],
        );

        let output = ArchiveExtractor::new(temp.path()).extract(&archive, 1).unwrap();
        assert_eq!(output.audio.file_name().unwrap(), "audio.ogg");
        assert_eq!(fs::read(&output.audio).unwrap(), b"first");
        assert_eq!(output.cover, None);
        assert_eq!(file_names(&output.directory), vec!["audio.ogg"]);
    }

    #[test]
    fn test_first_cover_not_replaced() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("2.osz");
        write_zip(
            &archive,
            &[
                ("hitcircle.png", b"skin"),
                ("scenery.jpg", b"plain"),
                ("audio.mp3", b"audio"),
                ("bg.png", b"better"),
            ],
        );

        let output = ArchiveExtractor::new(temp.path()).extract(&archive, 2).unwrap();
        let cover = output.cover.unwrap();
        assert_eq!(cover.file_name().unwrap(), "cover.jpg");
        assert_eq!(fs::read(cover).unwrap(), b"plain");
    }

    #[test]
    fn test_corrupt_archive_is_removed() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("3.osz");
        fs::write(&archive, b"this is not a zip file").unwrap();

        let result = ArchiveExtractor::new(temp.path()).extract(&archive, 3);
        assert!(matches!(result, Err(Error::InvalidArchive { .. })));
        assert!(!archive.exists());
    }

    #[test]
    fn test_archive_without_audio() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("4.osz");
        write_zip(&archive, &[("diff.osu", b"x"), ("bg.jpg", b"y")]);

        let result = ArchiveExtractor::new(temp.path()).extract(&archive, 4);
        assert!(matches!(result, Err(Error::InvalidArchive { .. })));
        assert!(!archive.exists());
        // Partial output is left in place
        assert!(temp.path().join("4").join("cover.jpg").exists());
    }

    #[test]
    fn test_nested_entries_use_file_name() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("5.osz");
        write_zip(&archive, &[("sub/dir/Track.MP3", b"nested")]);

        let output = ArchiveExtractor::new(temp.path()).extract(&archive, 5).unwrap();
        assert_eq!(output.audio, temp.path().join("5").join("audio.mp3"));
    }
}
