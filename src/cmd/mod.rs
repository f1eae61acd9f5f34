pub mod auth;
pub mod record;
pub mod stations;

use std::path::Path;

use anyhow::{bail, Result};
use tracing::warn;

use radrec::config::{self, Config};
use radrec::Credentials;

/// Config from `--config`, or the default location.
///
/// An explicit path must exist; the default location may be absent.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) if !path.exists() => bail!("config file {} not found", path.display()),
        Some(path) => config::load_config_from(path),
        None => config::load_config(),
    }
}

/// Premium credentials: flags first, then `[account]`.
pub fn resolve_credentials(
    config: &Config,
    mail: Option<String>,
    password: Option<String>,
) -> Option<Credentials> {
    let account = config.account.as_ref();
    let mail = mail.or_else(|| account.map(|a| a.mail.clone()));
    let password = password.or_else(|| account.map(|a| a.password.clone()));

    match (mail, password) {
        (None, None) => None,
        (mail, password) => {
            let credentials = Credentials::new(mail.unwrap_or_default(), password.unwrap_or_default());
            if !credentials.is_complete() {
                warn!("Both mail and password are needed for premium login, continuing without");
            }
            Some(credentials)
        }
    }
}
