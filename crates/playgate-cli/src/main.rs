//! Playgate CLI - Headless player and preview-gate tool
//!
//! Features:
//! - Stream source resolution (protected URLs, transport detection)
//! - Quality ladder inspection against a resolution ceiling
//! - Preview gate simulation with a persistent floor store
//! - Floor store maintenance

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod output;

/// Playgate CLI - Gated playback toolkit
#[derive(Parser)]
#[command(name = "playgate")]
#[command(version)]
#[command(about = "Stream resolution and preview gate toolkit", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json, table)
    #[arg(short, long, default_value = "text")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a source URL to its effective URL and transport
    Resolve {
        /// Source URL (or its protected form with --protected)
        url: String,

        /// The URL is base64-protected
        #[arg(short, long)]
        protected: bool,

        /// Declared source type (m3u8, mpd, iframe, mp4, auto)
        #[arg(short = 't', long = "type")]
        declared_type: Option<String>,

        /// Page is not served over HTTPS; keep http:// URLs as they are
        #[arg(long)]
        insecure_origin: bool,
    },

    /// Produce the protected form of a URL
    Protect {
        url: String,
    },

    /// List the quality levels of a segmented source
    Levels {
        /// URL of the master playlist
        manifest: String,

        /// Resolution ceiling (vertical pixels)
        #[arg(short, long)]
        cap: Option<u32>,
    },

    /// Simulate a gated viewing session
    Simulate {
        /// Source URL
        url: String,

        /// Asset identity as type:id
        #[arg(short, long, default_value = "movie:demo")]
        asset: String,

        /// Preview budget in seconds
        #[arg(short, long)]
        preview_seconds: Option<f64>,

        /// Drain multiplier
        #[arg(short, long)]
        drain: Option<f64>,

        /// Wall-clock seconds to watch
        #[arg(short, long, default_value = "60")]
        watch: f64,

        /// Seek to this position after the first second
        #[arg(long)]
        seek_to: Option<f64>,

        /// Quota collaborator reports the daily cap as reached
        #[arg(long)]
        daily_cap_reached: bool,

        /// Viewer is entitled
        #[arg(long)]
        entitled: bool,

        /// Upgrade destination shown on lock
        #[arg(long)]
        cta: Option<String>,

        /// Redirect to the upgrade destination after locking
        #[arg(long)]
        redirect: bool,

        /// Floor store file
        #[arg(short, long, default_value = "playgate-floors.json")]
        store: PathBuf,

        /// Player configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Inspect or clear persisted preview floors
    Floor {
        #[command(subcommand)]
        action: FloorAction,

        /// Floor store file
        #[arg(short, long, default_value = "playgate-floors.json", global = true)]
        store: PathBuf,
    },
}

#[derive(Subcommand)]
enum FloorAction {
    /// Show all stored floors
    Show,
    /// Forget the floor of one asset (type:id)
    Clear { asset: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Resolve { url, protected, declared_type, insecure_origin } => {
            commands::resolve(&url, protected, declared_type.as_deref(), !insecure_origin, &cli.format)?;
        }
        Commands::Protect { url } => {
            commands::protect(&url);
        }
        Commands::Levels { manifest, cap } => {
            commands::levels(&manifest, cap, &cli.format).await?;
        }
        Commands::Simulate {
            url,
            asset,
            preview_seconds,
            drain,
            watch,
            seek_to,
            daily_cap_reached,
            entitled,
            cta,
            redirect,
            store,
            config,
        } => {
            let options = commands::SimulateOptions {
                url,
                asset,
                preview_seconds,
                drain,
                watch_secs: watch,
                seek_to,
                daily_cap_reached,
                entitled,
                cta,
                redirect,
                store,
                config,
                verbose: cli.verbose,
            };
            commands::simulate(options, &cli.format)?;
        }
        Commands::Floor { action, store } => match action {
            FloorAction::Show => commands::floor_show(&store, &cli.format)?,
            FloorAction::Clear { asset } => commands::floor_clear(&store, &asset)?,
        },
    }

    Ok(())
}
