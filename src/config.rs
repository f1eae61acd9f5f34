//! Configuration loaded from `~/.config/radrec/config.toml`.
//!
//! Every field is optional; a missing file means defaults. The defaults are
//! the radiko endpoints and the `pc_html5` client identity.
//!
//! ```toml
//! [auth]
//! timeout_secs = 10
//!
//! [auth.identity]
//! app = "pc_html5"
//!
//! [recorder]
//! output_dir = "/srv/radio"
//! grace_period_secs = 5
//!
//! [account]
//! mail = "me@example.com"
//! password = "hunter2"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Shared secret the `pc_html5` player slices its partial key from.
///
/// This is deliberately the public web player's key, since the auth1 offsets
/// are issued for the `pc_html5` identity. Other identities need their own
/// key in `[auth] secret`.
pub const DEFAULT_SECRET: &str = "bcd151073c03b352e1ef2fd66c32209da9ca0afa";

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub auth: AuthConfig,
    pub recorder: RecorderConfig,
    /// Premium account used for the area-free upgrade.
    pub account: Option<Account>,
}

/// Everything the handshake and the stream request need from the outside.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Static secret, as text. Its bytes are what the key offsets index into.
    pub secret: String,
    /// Per-request timeout for handshake calls.
    pub timeout_secs: u64,
    pub endpoints: Endpoints,
    pub identity: ClientIdentity,
}

impl AuthConfig {
    pub fn secret_bytes(&self) -> &[u8] {
        self.secret.as_bytes()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: DEFAULT_SECRET.to_string(),
            timeout_secs: 10,
            endpoints: Endpoints::default(),
            identity: ClientIdentity::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub auth1: String,
    pub auth2: String,
    pub login: String,
    pub logout: String,
    pub playlist: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            auth1: "https://radiko.jp/v2/api/auth1".to_string(),
            auth2: "https://radiko.jp/v2/api/auth2".to_string(),
            login: "https://radiko.jp/v4/api/member/login".to_string(),
            logout: "https://radiko.jp/v4/api/member/logout".to_string(),
            playlist: "https://radiko.jp/v2/api/ts/playlist.m3u8".to_string(),
        }
    }
}

/// Fixed client-identity values the server expects on both handshake rounds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientIdentity {
    pub app: String,
    pub app_version: String,
    pub device: String,
    pub user: String,
}

impl Default for ClientIdentity {
    fn default() -> Self {
        Self {
            app: "pc_html5".to_string(),
            app_version: "0.0.1".to_string(),
            device: "pc".to_string(),
            user: "dummy_user".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// ffmpeg binary. `None` means search `PATH`.
    pub ffmpeg: Option<PathBuf>,
    /// Directory recordings are written to.
    pub output_dir: PathBuf,
    /// How long a cancelled ffmpeg gets to exit before it is killed.
    pub grace_period_secs: u64,
}

impl RecorderConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            ffmpeg: None,
            output_dir: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("radiko_recordings"),
            grace_period_secs: 5,
        }
    }
}

#[derive(Clone, Deserialize)]
pub struct Account {
    pub mail: String,
    pub password: String,
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("mail", &self.mail)
            .field("password", &"[redacted]")
            .finish()
    }
}

/// Load the configuration from the default location.
///
/// Returns defaults if the file doesn't exist.
pub fn load_config() -> Result<Config> {
    load_config_from(&config_path())
}

/// Load the configuration from `path`, falling back to defaults when absent.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| format!("invalid TOML in {}", path.display()))?;
    config.recorder.output_dir = expand_home(&config.recorder.output_dir);
    config.recorder.ffmpeg = config.recorder.ffmpeg.as_deref().map(expand_home);
    Ok(config)
}

/// Replace a leading `~` with the home directory. Other paths pass through.
fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

/// Return the path to the config file.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("radrec")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_config() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.auth.secret, DEFAULT_SECRET);
        assert_eq!(config.auth.endpoints, Endpoints::default());
        assert_eq!(config.auth.identity.app, "pc_html5");
        assert_eq!(config.recorder.grace_period(), Duration::from_secs(5));
        assert!(config.account.is_none());
    }

    #[test]
    fn parse_partial_sections() {
        let toml_str = r#"
[auth]
timeout_secs = 3

[auth.endpoints]
auth1 = "http://127.0.0.1:9000/auth1"

[recorder]
ffmpeg = "/opt/ffmpeg/bin/ffmpeg"
output_dir = "/srv/radio"

[account]
mail = "me@example.com"
password = "secret"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.auth.timeout(), Duration::from_secs(3));
        assert_eq!(config.auth.endpoints.auth1, "http://127.0.0.1:9000/auth1");
        // untouched fields keep their defaults
        assert_eq!(config.auth.endpoints.auth2, Endpoints::default().auth2);
        assert_eq!(
            config.recorder.ffmpeg,
            Some(PathBuf::from("/opt/ffmpeg/bin/ffmpeg"))
        );
        assert_eq!(config.recorder.output_dir, PathBuf::from("/srv/radio"));
        assert_eq!(config.recorder.grace_period_secs, 5);
        assert_eq!(config.account.unwrap().mail, "me@example.com");
    }

    #[test]
    fn account_debug_hides_password() {
        let account = Account {
            mail: "me@example.com".into(),
            password: "secret".into(),
        };
        let shown = format!("{account:?}");
        assert!(shown.contains("me@example.com"));
        assert!(!shown.contains("secret"));
    }

    #[test]
    fn secret_can_be_overridden() {
        let config: Config = toml::from_str("[auth]\nsecret = \"0123456789abcdef\"\n").unwrap();
        assert_eq!(config.auth.secret_bytes(), b"0123456789abcdef");
        assert_ne!(config.auth.secret, DEFAULT_SECRET);
    }

    #[test]
    fn leading_tilde_is_expanded() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[recorder]\noutput_dir = \"~/radiko_recordings\"\nffmpeg = \"~/bin/ffmpeg\"\n",
        )
        .unwrap();

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.recorder.output_dir, home.join("radiko_recordings"));
        assert_eq!(config.recorder.ffmpeg, Some(home.join("bin/ffmpeg")));
    }

    #[test]
    fn tilde_elsewhere_is_kept() {
        assert_eq!(expand_home(Path::new("/srv/~radio")), PathBuf::from("/srv/~radio"));
        assert_eq!(expand_home(Path::new("~user/x")), PathBuf::from("~user/x"));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.auth.timeout_secs, 10);
    }

    #[test]
    fn invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[auth\nsecret = ").unwrap();
        let err = load_config_from(&path).unwrap_err();
        assert!(err.to_string().contains("invalid TOML"));
    }

    #[test]
    fn zero_timeout_is_clamped() {
        let config = AuthConfig {
            timeout_secs: 0,
            ..AuthConfig::default()
        };
        assert_eq!(config.timeout(), Duration::from_secs(1));
    }
}
