//! ffmpeg-driven stream acquisition.
//!
//! [`StreamAcquisition::start`] spawns ffmpeg against a [`StreamDescriptor`]
//! and hands the child to a supervisor task. The caller gets a [`Transfer`]:
//! a state view, a cancel switch and the join handle. The process handle
//! itself never leaves the supervisor.
//!
//! Cancellation runs in explicit phases: `Running` → SIGTERM → `Terminating`
//! → (grace period expires) → SIGKILL → `Killed`.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::progress::ProgressEstimator;
use super::request::StreamDescriptor;
use crate::auth::{Session, TransferClaim};
use crate::config::RecorderConfig;

/// Callback invoked with progress reports, from the supervisor task.
pub type ProgressCallback = Box<dyn Fn(StreamProgress) + Send + Sync>;

/// One progress report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamProgress {
    /// Wall-clock estimate in `[0, 100]`; 100 only once the process exited 0.
    pub percent: f64,
    /// Seconds since the process was spawned.
    pub elapsed_seconds: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    Running,
    /// Cancel requested; waiting for the process to exit.
    Terminating,
    Completed,
    Failed,
    Cancelled,
}

impl TransferState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// How a transfer that did not fail ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    Completed,
    Cancelled,
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("session is not authenticated")]
    NotAuthenticated,

    #[error("a transfer is already running for this session")]
    Busy,

    #[error("{} not found; install ffmpeg or set recorder.ffmpeg", .tool.display())]
    ToolUnavailable { tool: PathBuf },

    #[error("ffmpeg exited with {}: {diagnostics}", .code.map_or_else(|| "a signal".to_string(), |c| format!("status {c}")))]
    ProcessFailed {
        code: Option<i32>,
        diagnostics: String,
    },

    #[error("cannot prepare output {}", .path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("I/O error while supervising ffmpeg: {0}")]
    Io(#[from] io::Error),

    #[error("transfer supervisor failed: {0}")]
    Supervisor(String),
}

/// Spawns and supervises ffmpeg transfers.
#[derive(Debug, Clone)]
pub struct StreamAcquisition {
    ffmpeg_path: PathBuf,
    grace_period: Duration,
    tick: Duration,
}

impl Default for StreamAcquisition {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamAcquisition {
    pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);
    pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

    /// Locate ffmpeg in `PATH`, falling back to the bare name.
    pub fn new() -> Self {
        let ffmpeg_path = which::which("ffmpeg").unwrap_or_else(|_| PathBuf::from("ffmpeg"));
        Self {
            ffmpeg_path,
            grace_period: Self::DEFAULT_GRACE_PERIOD,
            tick: Self::DEFAULT_TICK,
        }
    }

    pub fn from_config(config: &RecorderConfig) -> Self {
        let acquisition = Self::new().with_grace_period(config.grace_period());
        match &config.ffmpeg {
            Some(path) => acquisition.with_ffmpeg_path(path),
            None => acquisition,
        }
    }

    #[must_use]
    pub fn with_ffmpeg_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffmpeg_path = path.into();
        self
    }

    /// Time between SIGTERM and SIGKILL on cancel.
    #[must_use]
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Progress reporting interval.
    #[must_use]
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick.max(Duration::from_millis(1));
        self
    }

    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg_path
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// ffmpeg arguments for one descriptor.
    pub fn build_args(&self, descriptor: &StreamDescriptor, destination: &Path) -> Vec<String> {
        let mut args: Vec<String> = ["-loglevel", "error", "-fflags", "+discardcorrupt"]
            .iter()
            .map(ToString::to_string)
            .collect();

        if !descriptor.headers.is_empty() {
            let header_str = descriptor
                .headers
                .iter()
                .map(|(k, v)| format!("{k}: {v}"))
                .collect::<Vec<_>>()
                .join("\r\n");
            args.push("-headers".to_string());
            args.push(format!("{header_str}\r\n"));
        }

        args.push("-i".to_string());
        args.push(descriptor.url.clone());

        // Stream copy, audio only, ADTS to MP4 framing
        args.extend(
            ["-acodec", "copy", "-vn", "-bsf:a", "aac_adtstoasc", "-y"]
                .iter()
                .map(ToString::to_string),
        );
        args.push(destination.to_string_lossy().into_owned());

        args
    }

    /// Check if ffmpeg runs at all.
    pub async fn check_available(&self) -> bool {
        Command::new(&self.ffmpeg_path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Spawn ffmpeg for `descriptor`, writing to `destination`.
    ///
    /// Returns as soon as the process is running. The destination's parent
    /// directory is created if needed.
    pub async fn start(
        &self,
        session: &Session,
        descriptor: &StreamDescriptor,
        destination: &Path,
        on_progress: Option<ProgressCallback>,
    ) -> Result<Transfer, TransferError> {
        let claim = claim_session(session)?;

        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| TransferError::Output {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let args = self.build_args(descriptor, destination);
        debug!(
            station = %descriptor.station_id,
            url = %descriptor.url,
            "ffmpeg {} args",
            args.len()
        );

        let mut command = Command::new(&self.ffmpeg_path);
        command.args(&args);

        let transfer = self.launch(command, claim, descriptor.window.duration(), on_progress)?;
        info!(
            station = %descriptor.station_id,
            window = %descriptor.window,
            destination = %destination.display(),
            "Recording started"
        );
        Ok(transfer)
    }

    /// [`start`](Self::start) and wait for the result.
    pub async fn acquire(
        &self,
        session: &Session,
        descriptor: &StreamDescriptor,
        destination: &Path,
        on_progress: Option<ProgressCallback>,
    ) -> Result<TransferOutcome, TransferError> {
        self.start(session, descriptor, destination, on_progress)
            .await?
            .wait()
            .await
    }

    fn launch(
        &self,
        mut command: Command,
        claim: TransferClaim,
        total: Duration,
        on_progress: Option<ProgressCallback>,
    ) -> Result<Transfer, TransferError> {
        // Own process group: a terminal Ctrl-C reaches radrec, not ffmpeg
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| match err.kind() {
                io::ErrorKind::NotFound => TransferError::ToolUnavailable {
                    tool: PathBuf::from(command.as_std().get_program()),
                },
                _ => TransferError::Io(err),
            })?;

        let stderr = child.stderr.take().map(|mut pipe| {
            tokio::spawn(async move {
                let mut raw = Vec::new();
                if let Err(err) = pipe.read_to_end(&mut raw).await {
                    debug!("stderr read stopped: {err}");
                }
                String::from_utf8_lossy(&raw).into_owned()
            })
        });

        let (state_tx, state_rx) = watch::channel(TransferState::Running);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let supervisor = Supervisor {
            child,
            stderr,
            cancel: cancel_rx,
            state: state_tx,
            estimator: ProgressEstimator::new(total),
            on_progress,
            grace_period: self.grace_period,
            tick: self.tick,
            _claim: claim,
        };
        let handle = tokio::spawn(supervisor.run());

        Ok(Transfer {
            state: state_rx,
            cancel: Arc::new(cancel_tx),
            handle: Some(handle),
        })
    }
}

fn claim_session(session: &Session) -> Result<TransferClaim, TransferError> {
    if !session.is_authenticated() {
        return Err(TransferError::NotAuthenticated);
    }
    session.try_claim_transfer().ok_or(TransferError::Busy)
}

/// A running (or finished) transfer.
///
/// Dropping it before [`wait`](Self::wait) cancels the process.
pub struct Transfer {
    state: watch::Receiver<TransferState>,
    cancel: Arc<watch::Sender<bool>>,
    handle: Option<JoinHandle<Result<TransferOutcome, TransferError>>>,
}

impl Transfer {
    pub fn state(&self) -> TransferState {
        *self.state.borrow()
    }

    /// Request cancellation. No-op once the transfer is terminal.
    pub fn cancel(&self) {
        request_cancel(&self.cancel, &self.state);
    }

    /// A cloneable handle that can cancel from another task.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            cancel: Arc::clone(&self.cancel),
            state: self.state.clone(),
        }
    }

    /// Wait for the supervisor to finish.
    pub async fn wait(mut self) -> Result<TransferOutcome, TransferError> {
        let Some(handle) = self.handle.as_mut() else {
            return Err(TransferError::Supervisor("transfer already awaited".into()));
        };
        // Kept in place until it resolves, so dropping this future still cancels
        let joined = handle.await;
        self.handle = None;
        joined.map_err(|err| TransferError::Supervisor(err.to_string()))?
    }
}

impl Drop for Transfer {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.cancel();
        }
    }
}

impl std::fmt::Debug for Transfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transfer")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Cancels a [`Transfer`] from anywhere.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    cancel: Arc<watch::Sender<bool>>,
    state: watch::Receiver<TransferState>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        request_cancel(&self.cancel, &self.state);
    }

    pub fn state(&self) -> TransferState {
        *self.state.borrow()
    }
}

fn request_cancel(cancel: &watch::Sender<bool>, state: &watch::Receiver<TransferState>) {
    if state.borrow().is_terminal() {
        return;
    }
    cancel.send_replace(true);
}

enum Phase {
    Running,
    Terminating { deadline: Instant },
    Killed,
}

/// Owns the child process for its whole life.
struct Supervisor {
    child: Child,
    stderr: Option<JoinHandle<String>>,
    cancel: watch::Receiver<bool>,
    state: watch::Sender<TransferState>,
    estimator: ProgressEstimator,
    on_progress: Option<ProgressCallback>,
    grace_period: Duration,
    tick: Duration,
    // Released when the supervisor exits
    _claim: TransferClaim,
}

impl Supervisor {
    async fn run(mut self) -> Result<TransferOutcome, TransferError> {
        let started = Instant::now();
        let mut ticker = tokio::time::interval_at(started + self.tick, self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut phase = Phase::Running;

        loop {
            phase = match phase {
                Phase::Running => {
                    tokio::select! {
                        status = self.child.wait() => {
                            return self.finish(status, started).await;
                        }
                        _ = ticker.tick() => {
                            let percent = self.estimator.tick(started.elapsed());
                            self.report(percent, started);
                            Phase::Running
                        }
                        changed = self.cancel.changed() => {
                            // A dropped sender means every handle is gone
                            if changed.is_ok() && !*self.cancel.borrow() {
                                Phase::Running
                            } else {
                                self.begin_termination()
                            }
                        }
                    }
                }
                Phase::Terminating { deadline } => {
                    tokio::select! {
                        status = self.child.wait() => {
                            if let Err(err) = status {
                                warn!("waiting for ffmpeg failed: {err}");
                            }
                            break;
                        }
                        () = tokio::time::sleep_until(deadline) => {
                            warn!(
                                "ffmpeg still running {:?} after SIGTERM, killing",
                                self.grace_period
                            );
                            if let Err(err) = self.child.start_kill() {
                                warn!("SIGKILL failed: {err}");
                            }
                            Phase::Killed
                        }
                    }
                }
                Phase::Killed => {
                    if let Err(err) = self.child.wait().await {
                        warn!("waiting for killed ffmpeg failed: {err}");
                    }
                    break;
                }
            };
        }

        Ok(self.cancelled())
    }

    fn cancelled(&mut self) -> TransferOutcome {
        if let Some(stderr) = self.stderr.take() {
            stderr.abort();
        }
        self.state.send_replace(TransferState::Cancelled);
        info!("Recording cancelled");
        TransferOutcome::Cancelled
    }

    /// Cancel was requested, even if the exit was observed first.
    fn cancel_requested(&self) -> bool {
        *self.cancel.borrow()
    }

    fn begin_termination(&mut self) -> Phase {
        debug!("cancel requested, sending SIGTERM to ffmpeg");
        self.state.send_replace(TransferState::Terminating);
        if let Err(err) = request_termination(&mut self.child) {
            warn!("SIGTERM failed: {err}");
        }
        Phase::Terminating {
            deadline: Instant::now() + self.grace_period,
        }
    }

    async fn finish(
        &mut self,
        status: io::Result<ExitStatus>,
        started: Instant,
    ) -> Result<TransferOutcome, TransferError> {
        let status = match status {
            Ok(status) => status,
            Err(_) if self.cancel_requested() => return Ok(self.cancelled()),
            Err(err) => {
                self.state.send_replace(TransferState::Failed);
                return Err(err.into());
            }
        };

        if status.success() {
            let percent = self.estimator.complete();
            self.report(percent, started);
            self.state.send_replace(TransferState::Completed);
            info!(
                elapsed_secs = started.elapsed().as_secs(),
                "Recording completed"
            );
            return Ok(TransferOutcome::Completed);
        }

        // A cancel racing the exit still ends as cancelled
        if self.cancel_requested() {
            return Ok(self.cancelled());
        }

        let diagnostics = match self.stderr.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };
        self.state.send_replace(TransferState::Failed);
        warn!(code = ?status.code(), "ffmpeg failed");
        Err(TransferError::ProcessFailed {
            code: status.code(),
            diagnostics: diagnostics.trim().to_string(),
        })
    }

    fn report(&self, percent: f64, started: Instant) {
        if let Some(cb) = &self.on_progress {
            cb(StreamProgress {
                percent,
                elapsed_seconds: started.elapsed().as_secs_f64(),
            });
        }
    }
}

#[cfg(unix)]
fn request_termination(child: &mut Child) -> io::Result<()> {
    // Already reaped
    let Some(pid) = child.id() else {
        return Ok(());
    };
    let pid = libc::pid_t::try_from(pid).map_err(io::Error::other)?;
    // SAFETY: pid is our own unreaped child, so it cannot have been recycled.
    if unsafe { libc::kill(pid, libc::SIGTERM) } == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn request_termination(child: &mut Child) -> io::Result<()> {
    child.start_kill()
}
