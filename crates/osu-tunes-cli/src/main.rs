//! osu-tunes - Turn osu! beatmap sets into a local music library
//!
//! Usage:
//!   osu-tunes import <set-id>...     Download and import beatmap sets
//!   osu-tunes tracks [--json]        List imported tracks
//!   osu-tunes restore                Re-import preserved sets with no tracks
//!   osu-tunes --help                 Show help

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();
    cli::run(cli).await
}

fn init_logging() {
    // Logs go to stderr so stdout stays machine-readable with --json
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
