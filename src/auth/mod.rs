//! radiko authentication
//!
//! Runs the two-round challenge-response handshake:
//!
//! 1. *(optional)* premium login, which upgrades the cookie session to
//!    area-free access
//! 2. auth1: declare the client, receive a token plus a key offset/length
//! 3. auth2: answer with the matching slice of the shared secret and learn
//!    the resolved area id
//!
//! A [`Session`] is only handed out after all stages succeed. Any failure
//! short-circuits and leaves the [`AuthenticationSession`] unauthenticated.

pub mod key;
pub mod protocol;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::AuthConfig;
use crate::http_client::{HttpClient, Transport, TransportError, WireRequest, WireResponse};

pub use key::{derive_partial_key, KeyRangeError};
pub use protocol::Challenge;

/// Handshake stage, for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Login,
    Challenge,
    Respond,
    Logout,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Login => write!(f, "login"),
            Stage::Challenge => write!(f, "auth1"),
            Stage::Respond => write!(f, "auth2"),
            Stage::Logout => write!(f, "logout"),
        }
    }
}

/// Authentication errors. None of them are retried here.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("network error during {stage}: {source}")]
    Network {
        stage: Stage,
        #[source]
        source: TransportError,
    },

    #[error("protocol error during {stage}: {detail}")]
    Protocol { stage: Stage, detail: String },

    #[error("credentials rejected: {0}")]
    Credential(String),

    #[error("region denied: this client is outside the service area")]
    RegionDenied,

    #[error(transparent)]
    Range(#[from] KeyRangeError),
}

/// Where the handshake currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    UpgradePending,
    Challenged,
    Authenticated,
    Terminated,
}

/// Resolved area identifier, e.g. `JP13`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Region(String);

impl Region {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of a successful premium login.
#[derive(Clone, PartialEq, Eq)]
pub struct UpgradeHandle {
    /// `radiko_session`, appended to auth2 and posted on logout.
    pub session_id: String,
    /// Area-free entitlement marker.
    pub area_free: bool,
}

impl fmt::Debug for UpgradeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpgradeHandle")
            .field("session_id", &mask(&self.session_id))
            .field("area_free", &self.area_free)
            .finish()
    }
}

/// Premium account credentials.
#[derive(Clone)]
pub struct Credentials {
    pub mail: String,
    pub password: String,
}

impl Credentials {
    pub fn new(mail: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            mail: mail.into(),
            password: password.into(),
        }
    }

    /// Both mail and password are non-empty.
    pub fn is_complete(&self) -> bool {
        !self.mail.is_empty() && !self.password.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("mail", &self.mail)
            .field("password", &"[redacted]")
            .finish()
    }
}

/// An authenticated session.
///
/// Clones share state: terminating one clone invalidates all of them, and
/// at most one transfer may run across all clones at a time.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    token: String,
    region: Region,
    upgrade: Option<UpgradeHandle>,
    valid: AtomicBool,
    transfer_running: AtomicBool,
}

impl Session {
    pub(crate) fn new(token: String, region: Region, upgrade: Option<UpgradeHandle>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                token,
                region,
                upgrade,
                valid: AtomicBool::new(true),
                transfer_running: AtomicBool::new(false),
            }),
        }
    }

    /// Token required by every stream request.
    pub fn token(&self) -> &str {
        &self.inner.token
    }

    pub fn region(&self) -> &Region {
        &self.inner.region
    }

    pub fn upgrade(&self) -> Option<&UpgradeHandle> {
        self.inner.upgrade.as_ref()
    }

    pub fn is_upgraded(&self) -> bool {
        self.inner.upgrade.is_some()
    }

    /// `false` once the session has been terminated.
    pub fn is_authenticated(&self) -> bool {
        self.inner.valid.load(Ordering::Acquire)
    }

    pub(crate) fn invalidate(&self) {
        self.inner.valid.store(false, Ordering::Release);
    }

    /// Claim the session's single transfer slot.
    pub(crate) fn try_claim_transfer(&self) -> Option<TransferClaim> {
        self.inner
            .transfer_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| TransferClaim {
                session: self.clone(),
            })
    }

    pub fn has_running_transfer(&self) -> bool {
        self.inner.transfer_running.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &mask(&self.inner.token))
            .field("region", &self.inner.region)
            .field("upgrade", &self.inner.upgrade)
            .field("valid", &self.is_authenticated())
            .finish()
    }
}

/// Releases the transfer slot on drop.
pub(crate) struct TransferClaim {
    session: Session,
}

impl Drop for TransferClaim {
    fn drop(&mut self) {
        self.session
            .inner
            .transfer_running
            .store(false, Ordering::Release);
    }
}

/// Shorten a credential for logs: first four characters only.
pub(crate) fn mask(secret: &str) -> String {
    let shown: String = secret.chars().take(4).collect();
    format!("{shown}…")
}

/// Drives the handshake over a [`Transport`].
///
/// One value holds one transport, so the cookie context of a premium login
/// is the one auth1 and auth2 run in.
pub struct AuthenticationSession<T: Transport = HttpClient> {
    transport: T,
    config: AuthConfig,
    state: AuthState,
    upgrade: Option<UpgradeHandle>,
}

impl AuthenticationSession<HttpClient> {
    /// Session over a fresh reqwest client configured from `config`.
    pub fn with_http(config: AuthConfig) -> Result<Self, AuthError> {
        let transport = HttpClient::new(config.timeout()).map_err(|source| AuthError::Network {
            stage: Stage::Challenge,
            source,
        })?;
        Ok(Self::new(transport, config))
    }
}

impl<T: Transport> AuthenticationSession<T> {
    pub fn new(transport: T, config: AuthConfig) -> Self {
        Self {
            transport,
            config,
            state: AuthState::Unauthenticated,
            upgrade: None,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Premium login. Optional; skipping it has no side effects.
    #[instrument(skip_all, fields(mail = %mail))]
    pub async fn begin_upgrade(
        &mut self,
        mail: &str,
        password: &str,
    ) -> Result<UpgradeHandle, AuthError> {
        self.state = AuthState::UpgradePending;
        let request = protocol::login_request(&self.config.endpoints, mail, password);
        let handle = match self.send(Stage::Login, request).await {
            Ok(response) => protocol::parse_login(&response),
            Err(err) => Err(err),
        }
        .inspect_err(|_| self.state = AuthState::Unauthenticated)?;

        info!("Premium login succeeded, area-free access enabled");
        self.upgrade = Some(handle.clone());
        Ok(handle)
    }

    /// auth1: obtain token, key offset and key length.
    #[instrument(skip_all)]
    pub async fn challenge(&mut self) -> Result<Challenge, AuthError> {
        let request = protocol::challenge_request(&self.config.endpoints, &self.config.identity);
        let response = self.send(Stage::Challenge, request).await?;
        let challenge = protocol::parse_challenge(&response)?;

        debug!(
            offset = challenge.offset,
            length = challenge.length,
            "auth1 issued key range"
        );
        self.state = AuthState::Challenged;
        Ok(challenge)
    }

    /// auth2: prove possession of the secret and resolve the region.
    #[instrument(skip_all)]
    pub async fn respond(&mut self, challenge: &Challenge) -> Result<Region, AuthError> {
        let partial_key = derive_partial_key(
            self.config.secret_bytes(),
            challenge.offset,
            challenge.length,
        )?;
        let request = protocol::respond_request(
            &self.config.endpoints,
            &self.config.identity,
            &challenge.token,
            &partial_key,
            self.upgrade.as_ref(),
        );
        let response = self.send(Stage::Respond, request).await?;
        let region = protocol::parse_region(&response)?;

        info!(region = %region, "auth2 resolved region");
        Ok(region)
    }

    /// Run every stage in order and hand out a [`Session`].
    ///
    /// The premium login only runs when both mail and password are present.
    pub async fn authenticate(
        &mut self,
        credentials: Option<&Credentials>,
    ) -> Result<Session, AuthError> {
        match self.run_stages(credentials).await {
            Ok(session) => {
                self.state = AuthState::Authenticated;
                Ok(session)
            }
            Err(err) => {
                warn!("Authentication failed: {err}");
                self.state = AuthState::Unauthenticated;
                self.upgrade = None;
                Err(err)
            }
        }
    }

    async fn run_stages(&mut self, credentials: Option<&Credentials>) -> Result<Session, AuthError> {
        self.upgrade = None;
        if let Some(creds) = credentials.filter(|c| c.is_complete()) {
            self.begin_upgrade(&creds.mail, &creds.password).await?;
        }

        let challenge = self.challenge().await?;
        let region = self.respond(&challenge).await?;

        Ok(Session::new(challenge.token, region, self.upgrade.clone()))
    }

    /// Invalidate `session` and release a premium login, if any.
    ///
    /// Never fails: logout problems are logged and swallowed so shutdown is
    /// never blocked by them.
    pub async fn terminate(&mut self, session: &Session) {
        session.invalidate();
        self.state = AuthState::Terminated;
        self.upgrade = None;

        let Some(handle) = session.upgrade() else {
            return;
        };

        info!("Releasing premium session");
        let request = protocol::logout_request(&self.config.endpoints, handle);
        match self.send(Stage::Logout, request).await {
            Ok(response) if response.is_success() => debug!("Logout acknowledged"),
            Ok(response) => warn!(status = response.status, "Logout was not acknowledged"),
            Err(err) => warn!("Logout failed: {err}"),
        }
    }

    async fn send(&self, stage: Stage, request: WireRequest) -> Result<WireResponse, AuthError> {
        self.transport
            .send(request)
            .await
            .map_err(|source| AuthError::Network { stage, source })
    }
}
