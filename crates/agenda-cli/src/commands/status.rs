use agenda_auth::{AuthState, CredentialLocator};
use anyhow::Result;

pub fn run(locator: &CredentialLocator) -> Result<()> {
    let state = AuthState::detect(Some(locator));
    let paths = locator.locate();

    println!("{}", state.status_text());
    match state {
        AuthState::NotConfigured => {
            println!(
                "\nDownload an OAuth client (Desktop app) from the Google Cloud console and save it as:\n  {}",
                paths.credentials.display()
            );
        }
        AuthState::NeedsLogin | AuthState::Revoked => {
            println!("\nSign in with:\n  agenda login");
        }
        AuthState::Ready => {
            println!("Token: {}", paths.token.display());
        }
    }

    Ok(())
}
