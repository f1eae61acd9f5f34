use anyhow::{Context, Result};

use radrec::config::Config;
use radrec::AuthenticationSession;

use super::resolve_credentials;

pub async fn cmd_auth(config: Config, mail: Option<String>, password: Option<String>) -> Result<()> {
    let credentials = resolve_credentials(&config, mail, password);

    eprintln!("🔐 Authenticating with {}", config.auth.endpoints.auth1);

    let mut auth = AuthenticationSession::with_http(config.auth)?;
    let session = auth
        .authenticate(credentials.as_ref())
        .await
        .context("authentication failed")?;

    eprintln!("✅ Authenticated");
    if session.is_upgraded() {
        eprintln!("   Premium: area-free");
    }
    println!("{}", session.region());

    auth.terminate(&session).await;
    Ok(())
}
