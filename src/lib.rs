//! `radrec` - radiko time-free recorder
//!
//! # Features
//!
//! - **Authentication**: the auth1/auth2 challenge-response handshake, with
//!   optional premium (area-free) login
//! - **Requests**: time-free playlist URLs and transport headers for a
//!   station and time window
//! - **Acquisition**: supervised ffmpeg transfers with progress estimation
//!   and graceful cancellation
//!
//! # Example
//!
//! ```rust,no_run
//! use radrec::{AuthenticationSession, StreamAcquisition, StreamRequestBuilder, StreamWindow};
//! use radrec::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let mut auth = AuthenticationSession::with_http(config.auth.clone())?;
//!     let session = auth.authenticate(None).await?;
//!
//!     let window = StreamWindow::parse("20240521050000", "20240521053000")?;
//!     let descriptor = StreamRequestBuilder::new(&config.auth.endpoints.playlist)
//!         .build("TBS", &window, &session)?;
//!     let destination = radrec::stream::output_path(&config.recorder.output_dir, &descriptor);
//!
//!     StreamAcquisition::from_config(&config.recorder)
//!         .acquire(&session, &descriptor, &destination, None)
//!         .await?;
//!     auth.terminate(&session).await;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod config;
pub mod http_client;
pub mod stations;
pub mod stream;

pub use auth::{
    derive_partial_key, AuthError, AuthState, AuthenticationSession, Credentials, Region, Session,
    UpgradeHandle,
};
pub use http_client::{HttpClient, Transport};
pub use stream::{
    StreamAcquisition, StreamDescriptor, StreamRequestBuilder, StreamWindow, Transfer,
    TransferError, TransferOutcome,
};

/// Version of radrec
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
