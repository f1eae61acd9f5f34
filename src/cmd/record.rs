use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use radrec::config::Config;
use radrec::stations::display_name;
use radrec::stream::{
    output_path, validate_station_id, ProgressCallback, StreamProgress, TransferOutcome,
};
use radrec::{AuthenticationSession, Session, StreamAcquisition, StreamRequestBuilder, StreamWindow};

use super::resolve_credentials;

#[allow(clippy::too_many_arguments)]
pub async fn cmd_record(
    mut config: Config,
    station: &str,
    from: &str,
    to: &str,
    out_dir: Option<PathBuf>,
    mail: Option<String>,
    password: Option<String>,
    ffmpeg: Option<PathBuf>,
) -> Result<()> {
    // Everything local is checked before the first request goes out
    let window = StreamWindow::parse(from, to).context("invalid time window")?;
    validate_station_id(station)?;

    if let Some(dir) = out_dir {
        config.recorder.output_dir = dir;
    }
    if let Some(path) = ffmpeg {
        config.recorder.ffmpeg = Some(path);
    }

    let acquisition = StreamAcquisition::from_config(&config.recorder);
    if !acquisition.check_available().await {
        bail!(
            "ffmpeg not found at {}; install it or pass --ffmpeg",
            acquisition.ffmpeg_path().display()
        );
    }

    eprintln!("📻 {} ({station}) {window}", display_name(station));

    let credentials = resolve_credentials(&config, mail, password);
    let mut auth = AuthenticationSession::with_http(config.auth.clone())?;
    let session = auth
        .authenticate(credentials.as_ref())
        .await
        .context("authentication failed")?;
    eprintln!("🔐 Authenticated, region {}", session.region());

    let result = record(&config, &acquisition, &session, station, &window).await;
    auth.terminate(&session).await;

    let destination = result?;
    println!("{}", destination.display());
    Ok(())
}

async fn record(
    config: &Config,
    acquisition: &StreamAcquisition,
    session: &Session,
    station: &str,
    window: &StreamWindow,
) -> Result<PathBuf> {
    let descriptor =
        StreamRequestBuilder::new(&config.auth.endpoints.playlist).build(station, window, session)?;
    let destination = output_path(&config.recorder.output_dir, &descriptor);

    let transfer = acquisition
        .start(session, &descriptor, &destination, Some(progress_line()))
        .await?;

    let cancel = transfer.cancel_handle();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n⏹  Cancelling...");
            cancel.cancel();
        }
    });

    let outcome = transfer.wait().await;
    ctrl_c.abort();
    eprintln!();

    match outcome? {
        TransferOutcome::Completed => {
            eprintln!("✅ Saved {}", destination.display());
            Ok(destination)
        }
        TransferOutcome::Cancelled => {
            remove_partial(&destination);
            bail!("recording cancelled")
        }
    }
}

fn progress_line() -> ProgressCallback {
    Box::new(|p: StreamProgress| {
        let mut stderr = std::io::stderr();
        let _ = write!(stderr, "\r⏺  {:5.1}% ({:.0}s)", p.percent, p.elapsed_seconds);
        let _ = stderr.flush();
    })
}

fn remove_partial(path: &Path) {
    if path.exists() {
        if let Err(err) = std::fs::remove_file(path) {
            tracing::warn!("Could not remove partial recording {}: {err}", path.display());
        }
    }
}
