//! Sync driver: owns the cursor and the local event list.
//! Background runs report through a std mpsc channel.

use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Duration;

use agenda_auth::{ConfigurationError, CredentialPaths, RefreshingSource, TokenPersister, TokenSource};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::client::{SyncClient, SyncMode};
use crate::error::SyncError;
use crate::merge::{merge, sort_events};
use crate::normalize::{expand_multi_day, normalize_all};
use crate::types::CalendarEvent;

/// Default pause between background syncs.
pub const SYNC_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Messages sent from background syncs to the consumer.
#[derive(Debug)]
pub enum SyncMessage {
    /// Expanded, sorted view after a successful sync.
    Updated(Vec<CalendarEvent>),
    /// The sync failed; the previous view is still current.
    Failed(SyncError),
}

#[derive(Default)]
struct SyncState {
    cursor: Option<String>,
    /// Canonical list, one entry per event id.
    events: Vec<CalendarEvent>,
}

pub struct CalendarSync<S> {
    tokens: TokenPersister<S>,
    client: SyncClient,
    state: Mutex<SyncState>,
}

impl CalendarSync<RefreshingSource> {
    /// Sync the primary calendar with the stored Google credentials.
    pub fn open(paths: &CredentialPaths, client: SyncClient) -> Result<Self, ConfigurationError> {
        Ok(Self::new(TokenPersister::open(paths)?, client))
    }
}

impl<S: TokenSource> CalendarSync<S> {
    pub fn new(tokens: TokenPersister<S>, client: SyncClient) -> Self {
        Self {
            tokens,
            client,
            state: Mutex::new(SyncState::default()),
        }
    }

    /// Cursor for the next delta sync, if a sync has completed.
    pub async fn cursor(&self) -> Option<String> {
        self.state.lock().await.cursor.clone()
    }

    /// Expanded, sorted view of the current event list.
    pub async fn events(&self) -> Vec<CalendarEvent> {
        sorted_view(&self.state.lock().await.events)
    }

    /// Fetch, apply and return the expanded view.
    ///
    /// A full sync replaces the event list; a delta sync is merged into it.
    /// On error the cursor and events are left as they were. Concurrent calls
    /// run one after another.
    #[tracing::instrument(skip(self), level = "info")]
    pub async fn sync_once(&self) -> Result<Vec<CalendarEvent>, SyncError> {
        let mut state = self.state.lock().await;

        let access_token = self.tokens.access_token().await?;
        let result = self
            .client
            .fetch(&access_token, state.cursor.as_deref())
            .await?;

        let changes = normalize_all(result.events);
        state.events = match result.mode {
            SyncMode::Full => merge(&[], changes),
            SyncMode::Delta => merge(&state.events, changes),
        };
        if result.next_cursor.is_none() {
            tracing::warn!("Sync response carried no cursor, next sync will be a full sync");
        }
        state.cursor = result.next_cursor;

        tracing::info!("Calendar holds {} events", state.events.len());
        Ok(sorted_view(&state.events))
    }
}

/// Multi-day expansion re-sorted so every copy sits under its own day.
fn sorted_view(events: &[CalendarEvent]) -> Vec<CalendarEvent> {
    let mut view = expand_multi_day(events);
    sort_events(&mut view);
    view
}

impl<S: TokenSource + 'static> CalendarSync<S> {
    /// Sync now and then every `interval` until the receiver goes away.
    ///
    /// Missed ticks are delayed rather than bunched up.
    pub fn spawn_periodic(self: Arc<Self>, interval: Duration, tx: Sender<SyncMessage>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let message = match self.sync_once().await {
                    Ok(events) => SyncMessage::Updated(events),
                    Err(e) => {
                        tracing::warn!("Calendar sync failed: {}", e);
                        SyncMessage::Failed(e)
                    }
                };

                if tx.send(message).is_err() {
                    tracing::debug!("Sync receiver dropped, stopping background sync");
                    break;
                }
            }
        })
    }
}
