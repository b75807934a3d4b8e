use agenda_auth::{delete_token, CredentialLocator};
use anyhow::{Context, Result};

pub fn run(locator: &CredentialLocator) -> Result<()> {
    let paths = locator.locate();
    delete_token(&paths.token).context("Failed to remove the stored token")?;
    println!("Signed out.");
    Ok(())
}
