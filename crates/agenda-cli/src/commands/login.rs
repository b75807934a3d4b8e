use std::time::Duration;

use agenda_auth::{AuthError, AuthFlow, Credential, CredentialLocator};
use agenda_core::Config;
use anyhow::{Context, Result};

pub async fn run(locator: &CredentialLocator, config: &Config) -> Result<()> {
    let paths = locator.locate();
    let credential = Credential::load(&paths.credentials)
        .with_context(|| format!("No usable OAuth client at {}", paths.credentials.display()))?;

    let flow = AuthFlow::new()
        .with_timeout(Duration::from_secs(config.auth.login_timeout_secs))
        .with_browser(config.auth.open_browser);

    match flow.run_and_store(&credential, &paths.token).await {
        Ok(token) => {
            println!("Signed in. Access valid until {}.", token.expiry.format("%Y-%m-%d %H:%M UTC"));
            Ok(())
        }
        Err(AuthError::Persistence { token, source }) => {
            tracing::warn!("Signed in but the token was not saved: {}", source);
            println!("Signed in. Access valid until {}.", token.expiry.format("%Y-%m-%d %H:%M UTC"));
            eprintln!(
                "Warning: the session could not be saved to {}; you will need to sign in again next time.",
                source.path.display()
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("Login failed: {}", e);
            anyhow::bail!("{}", e.user_message())
        }
    }
}
