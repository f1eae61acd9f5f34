//! `radrec` CLI - record radiko time-free programs

mod cmd;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "radrec")]
#[command(about = "Record radiko time-free programs with ffmpeg")]
#[command(version)]
struct Cli {
    /// Configuration file (default: ~/.config/radrec/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging (overridden by `RUST_LOG`)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Authenticate, print the resolved region and log out again
    Auth {
        /// Premium account mail address
        #[arg(long)]
        mail: Option<String>,

        /// Premium account password
        #[arg(long)]
        password: Option<String>,
    },

    /// Record one program from the time-free archive
    Record {
        /// Station id (e.g. TBS, QRR, FMJ)
        station: String,

        /// Program start, YYYYMMDDHHMMSS (JST)
        #[arg(long)]
        from: String,

        /// Program end, YYYYMMDDHHMMSS (JST)
        #[arg(long)]
        to: String,

        /// Output directory (default: ~/radiko_recordings)
        #[arg(short, long)]
        out_dir: Option<PathBuf>,

        /// Premium account mail address
        #[arg(long)]
        mail: Option<String>,

        /// Premium account password
        #[arg(long)]
        password: Option<String>,

        /// ffmpeg binary to use
        #[arg(long)]
        ffmpeg: Option<PathBuf>,
    },

    /// List well-known stations
    Stations,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries results only
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    match cli.command {
        Commands::Auth { mail, password } => {
            let config = cmd::load_config(cli.config.as_deref())?;
            cmd::auth::cmd_auth(config, mail, password).await?;
        }
        Commands::Record {
            station,
            from,
            to,
            out_dir,
            mail,
            password,
            ffmpeg,
        } => {
            let config = cmd::load_config(cli.config.as_deref())?;
            cmd::record::cmd_record(config, &station, &from, &to, out_dir, mail, password, ffmpeg)
                .await?;
        }
        Commands::Stations => {
            cmd::stations::cmd_stations();
        }
    }

    Ok(())
}
