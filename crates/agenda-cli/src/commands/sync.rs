use std::sync::Arc;
use std::time::Duration;

use agenda_auth::{AuthState, CredentialLocator};
use agenda_calendar::{CalendarSync, SyncClient, SyncMessage};
use agenda_core::Config;
use anyhow::{Context, Result};

use crate::render;

pub async fn run(locator: &CredentialLocator, config: &Config, watch: bool) -> Result<()> {
    let state = AuthState::detect(Some(locator));
    if !state.is_ready() {
        anyhow::bail!("{}. Run `agenda status` for details.", state.status_text());
    }

    let client = SyncClient::new().with_timeout(Duration::from_secs(config.sync.fetch_timeout_secs));
    let sync = CalendarSync::open(&locator.locate(), client)
        .context("Failed to load Google credentials")?;

    if !watch {
        let events = sync.sync_once().await.map_err(|e| {
            tracing::error!("Sync failed: {}", e);
            anyhow::anyhow!("{}", e.user_message())
        })?;
        print!("{}", render::agenda(&events));
        return Ok(());
    }

    let interval = Duration::from_secs(u64::from(config.sync.interval_minutes) * 60);
    let (tx, rx) = std::sync::mpsc::channel();
    let task = Arc::new(sync).spawn_periodic(interval, tx);

    // Prints until the sync task stops or Ctrl-C.
    let printer = tokio::task::spawn_blocking(move || {
        for message in rx {
            match message {
                SyncMessage::Updated(events) => {
                    println!("--- synced at {} ---", chrono::Local::now().format("%H:%M:%S"));
                    print!("{}", render::agenda(&events));
                }
                SyncMessage::Failed(e) => eprintln!("Sync failed: {}", e.user_message()),
            }
        }
    });

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            tracing::info!("Stopping background sync");
        }
        result = printer => {
            result.context("Output task failed")?;
        }
    }
    task.abort();

    Ok(())
}
