//! Command definitions and their execution

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use futures::StreamExt;

use osu_tunes_core::config::{keys, Config, Preferences};
use osu_tunes_core::utils::format_bytes;
use osu_tunes_core::{
    ImportCoordinator, ImportEvent, ImportRequest, Library, LibraryDb, MirrorResolver, Track,
};

#[derive(Debug, Parser)]
#[command(name = "osu-tunes", version, about = "Turn osu! beatmap sets into a local music library")]
pub struct Cli {
    /// Keep library, database and preferences below this directory
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Download and import beatmap sets
    Import {
        /// Beatmap set IDs
        #[arg(required = true)]
        set_ids: Vec<i64>,
        /// Title recorded on the imported tracks
        #[arg(long, default_value = "")]
        title: String,
        /// Artist recorded on the imported tracks
        #[arg(long, default_value = "")]
        artist: String,
        /// Cover to download when the set has none
        #[arg(long)]
        cover_url: Option<String>,
    },
    /// List imported tracks
    Tracks,
    /// Delete one track and its files
    Delete { track_id: String },
    /// Delete every track of a beatmap set
    DeleteSet { set_id: i64 },
    /// List preserved set IDs
    Preserved,
    /// Recover preserved IDs and re-import sets that have no tracks
    Restore,
    /// Show download mirrors in the order they will be tried
    Mirrors,
    /// Pin a mirror by name, or `auto` for the configured order
    SetMirror { name: String },
    /// Store the bearer token sent to mirrors; omit to clear it
    SetToken { token: Option<String> },
    /// List set directories no track points into
    Orphans,
    /// Delete every track row; files and preserved IDs are kept
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },
}

/// Everything a command may need, opened once
struct Session {
    config: Config,
    prefs: Arc<Preferences>,
    db: LibraryDb,
}

impl Session {
    async fn open(root: Option<PathBuf>) -> anyhow::Result<Self> {
        let config = match root {
            Some(root) => Config::with_root(root),
            None => Config::load(),
        };
        let prefs = Arc::new(
            Preferences::open(&config.preferences_path).with_context(|| {
                format!("Failed to open preferences at {}", config.preferences_path.display())
            })?,
        );
        let db = LibraryDb::open(&config.database_path).await.with_context(|| {
            format!("Failed to open database at {}", config.database_path.display())
        })?;
        Ok(Self { config, prefs, db })
    }

    fn library(&self) -> Library {
        Library::from_config(&self.config, self.db.clone(), self.prefs.clone())
    }

    fn coordinator(&self) -> anyhow::Result<ImportCoordinator> {
        Ok(ImportCoordinator::new(
            &self.config,
            self.db.clone(),
            self.prefs.clone(),
        )?)
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let ctx = Session::open(cli.root).await?;
    let json = cli.json;

    let result = match cli.command {
        Command::Import {
            set_ids,
            title,
            artist,
            cover_url,
        } => {
            let requests = set_ids
                .into_iter()
                .map(|id| {
                    let mut request = ImportRequest {
                        title: title.clone(),
                        artist: artist.clone(),
                        ..ImportRequest::new(id)
                    };
                    if let Some(ref url) = cover_url {
                        request = request.with_cover_url(url.clone());
                    }
                    request
                })
                .collect();
            run_imports(&ctx, requests, json).await
        }
        Command::Tracks => run_tracks(&ctx, json).await,
        Command::Delete { track_id } => {
            let track = ctx.library().delete_track(&track_id).await?;
            println!("Deleted {} ({})", track.id, track.title);
            Ok(())
        }
        Command::DeleteSet { set_id } => {
            let count = ctx.library().delete_set(set_id).await?;
            println!("Deleted {} track(s) of set {}", count, set_id);
            Ok(())
        }
        Command::Preserved => run_preserved(&ctx, json).await,
        Command::Restore => run_restore(&ctx, json).await,
        Command::Mirrors => {
            run_mirrors(&ctx, json);
            Ok(())
        }
        Command::SetMirror { name } => run_set_mirror(&ctx, &name),
        Command::SetToken { token } => {
            match token {
                Some(token) => ctx.prefs.set_string(keys::ACCESS_TOKEN, token)?,
                None => ctx.prefs.remove(keys::ACCESS_TOKEN)?,
            }
            println!("Access token updated");
            Ok(())
        }
        Command::Orphans => run_orphans(&ctx, json).await,
        Command::Reset { yes } => {
            anyhow::ensure!(yes, "Refusing to reset without --yes");
            let removed = ctx.library().reset_tracks().await?;
            println!("Removed {} track row(s); run `osu-tunes restore` to re-import", removed);
            Ok(())
        }
    };

    ctx.db.close().await;
    result
}

/// Import sets one after another; fails if any import failed
async fn run_imports(
    ctx: &Session,
    requests: Vec<ImportRequest>,
    json: bool,
) -> anyhow::Result<()> {
    let coordinator = ctx.coordinator()?;
    let token = ctx.prefs.access_token();

    let mut imported = Vec::new();
    let mut failed = Vec::new();

    for request in requests {
        let set_id = request.set_id;
        let mut events = coordinator.import(request.with_auth_token(token.clone()));

        while let Some(event) = events.next().await {
            match event {
                ImportEvent::Progress { percent, label } => {
                    if !json {
                        let percent = percent
                            .map(|p| format!("{:>3}%", p))
                            .unwrap_or_else(|| "  ? ".to_string());
                        eprint!("\r\x1b[2K[{}] {} {}", set_id, percent, label);
                        let _ = std::io::stderr().flush();
                    }
                }
                ImportEvent::Success { set_id } => {
                    if !json {
                        eprintln!("\r\x1b[2K[{}] Imported", set_id);
                    }
                    imported.push(set_id);
                }
                ImportEvent::Error { message } => {
                    if !json {
                        eprintln!("\r\x1b[2K[{}] Failed: {}", set_id, message);
                    }
                    failed.push((set_id, message));
                }
            }
        }
    }

    if json {
        let errors: Vec<_> = failed
            .iter()
            .map(|(set_id, message)| serde_json::json!({ "set_id": set_id, "message": message }))
            .collect();
        println!("{}", serde_json::json!({ "imported": imported, "failed": errors }));
    }

    anyhow::ensure!(
        failed.is_empty(),
        "{} of {} import(s) failed",
        failed.len(),
        imported.len() + failed.len()
    );
    Ok(())
}

async fn run_tracks(ctx: &Session, json: bool) -> anyhow::Result<()> {
    let tracks = ctx.library().tracks().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&tracks)?);
        return Ok(());
    }

    if tracks.is_empty() {
        println!("No tracks imported yet");
        return Ok(());
    }

    for track in &tracks {
        println!("{}", describe_track(track));
    }
    println!();
    println!("{} track(s)", tracks.len());
    Ok(())
}

fn describe_track(track: &Track) -> String {
    let size = std::fs::metadata(track.audio_file())
        .map(|m| format_bytes(m.len()))
        .unwrap_or_else(|_| "missing".to_string());
    let mut line = format!("  {:<32} {} - {}", track.id, track.artist, track.title);
    if let Some(ref difficulty) = track.difficulty {
        line.push_str(&format!(" [{}]", difficulty));
    }
    if track.is_album {
        line.push_str(" (album)");
    }
    line.push_str(&format!("  {}", size));
    line
}

async fn run_preserved(ctx: &Session, json: bool) -> anyhow::Result<()> {
    let library = ctx.library();
    let preserved = library.registry().list().await?;
    let pending = library.pending_restorations().await?;

    if json {
        let items: Vec<_> = preserved
            .iter()
            .map(|p| {
                serde_json::json!({
                    "set_id": p.beatmap_set_id,
                    "preserved_at": p.preserved_at,
                    "pending": pending.contains(&p.beatmap_set_id),
                })
            })
            .collect();
        println!("{}", serde_json::Value::Array(items));
        return Ok(());
    }

    println!("Preserved sets: {}", preserved.len());
    for p in &preserved {
        let marker = if pending.contains(&p.beatmap_set_id) {
            " (no tracks)"
        } else {
            ""
        };
        println!("  {}{}", p.beatmap_set_id, marker);
    }
    Ok(())
}

async fn run_restore(ctx: &Session, json: bool) -> anyhow::Result<()> {
    let library = ctx.library();
    let recovered = library.recover_preserved().await?;
    if recovered > 0 && !json {
        println!("Recovered {} preserved set ID(s)", recovered);
    }

    let pending = library.pending_restorations().await?;
    if pending.is_empty() {
        if !json {
            println!("Nothing to restore");
        }
        return Ok(());
    }

    let requests = pending.into_iter().map(ImportRequest::new).collect();
    run_imports(ctx, requests, json).await
}

fn run_mirrors(ctx: &Session, json: bool) {
    let resolver = MirrorResolver::new(ctx.config.mirrors.clone());
    let preference = ctx.prefs.preferred_mirror();
    let direct = &ctx.config.direct;
    let uses_direct = direct.name.eq_ignore_ascii_case(preference.trim());

    if json {
        println!(
            "{}",
            serde_json::json!({
                "preference": preference,
                "direct": uses_direct,
                "order": resolver.resolve(&preference),
            })
        );
        return;
    }

    println!("Preference: {}", preference);
    if uses_direct {
        println!("Files are fetched individually from {}", direct.name);
        return;
    }
    for (i, template) in resolver.resolve(&preference).iter().enumerate() {
        println!("  {}. {}", i + 1, template);
    }
}

fn run_set_mirror(ctx: &Session, name: &str) -> anyhow::Result<()> {
    let resolver = MirrorResolver::new(ctx.config.mirrors.clone());
    let known = name.eq_ignore_ascii_case("auto")
        || ctx.config.direct.name.eq_ignore_ascii_case(name)
        || resolver.find(name).is_some();
    anyhow::ensure!(known, "Unknown mirror '{}'", name);

    ctx.prefs.set_string(keys::PREFERRED_MIRROR, name)?;
    println!("Preferred mirror set to {}", name);
    Ok(())
}

async fn run_orphans(ctx: &Session, json: bool) -> anyhow::Result<()> {
    let orphans = ctx.library().find_orphans().await?;

    if json {
        let paths: Vec<_> = orphans.iter().map(|p| p.display().to_string()).collect();
        println!("{}", serde_json::json!(paths));
        return Ok(());
    }

    if orphans.is_empty() {
        println!("No orphaned set directories");
    }
    for path in &orphans {
        println!("  {}", path.display());
    }
    Ok(())
}
