//! Google Calendar events client: full and incremental sync.

use std::time::Duration;

use chrono::{DateTime, Months, Utc};
use tracing::instrument;

use crate::error::SyncError;
use crate::types::{ApiErrorResponse, EventListResponse, RawEvent};

const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
const CALENDAR_ID: &str = "primary";
const MAX_RESULTS: u32 = 250;

/// Default upper bound for one fetch, all pages included.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Time-windowed listing; replaces the local collection.
    Full,
    /// Changes since the cursor; merged into the local collection.
    Delta,
}

#[derive(Debug)]
pub struct FetchResult {
    pub events: Vec<RawEvent>,
    /// Cursor for the next delta sync, from the last page.
    pub next_cursor: Option<String>,
    pub mode: SyncMode,
}

pub struct SyncClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl Default for SyncClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: CALENDAR_API_BASE.to_string(),
            timeout: FETCH_TIMEOUT,
        }
    }

    /// Point the client at another API root, e.g. a mock server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fetch events from the primary calendar.
    ///
    /// Without a cursor this is a full sync over `now - 1 month .. now + 3 months`.
    /// With one it is a delta sync; if the server reports the cursor as gone the
    /// fetch is re-issued once as a full sync.
    #[instrument(skip_all, fields(delta = cursor.is_some_and(|c| !c.is_empty())), level = "info")]
    pub async fn fetch(
        &self,
        access_token: &str,
        cursor: Option<&str>,
    ) -> Result<FetchResult, SyncError> {
        tokio::time::timeout(self.timeout, self.fetch_inner(access_token, cursor))
            .await
            .map_err(|_| SyncError::Timeout(self.timeout))?
    }

    async fn fetch_inner(
        &self,
        access_token: &str,
        cursor: Option<&str>,
    ) -> Result<FetchResult, SyncError> {
        let cursor = match cursor.filter(|c| !c.is_empty()) {
            Some(cursor) => cursor,
            None => return self.full_sync(access_token).await,
        };

        match self.list_pages(access_token, &delta_query(cursor), SyncMode::Delta).await {
            Err(SyncError::CursorExpired) => {
                tracing::warn!("Sync cursor expired, falling back to full sync");
                self.full_sync(access_token).await
            }
            other => other,
        }
    }

    async fn full_sync(&self, access_token: &str) -> Result<FetchResult, SyncError> {
        let now = Utc::now();
        let time_min = now
            .checked_sub_months(Months::new(1))
            .unwrap_or(now - chrono::Duration::days(30));
        let time_max = now
            .checked_add_months(Months::new(3))
            .unwrap_or(now + chrono::Duration::days(90));

        self.list_pages(access_token, &full_query(time_min, time_max), SyncMode::Full)
            .await
    }

    /// Follow `nextPageToken` until the last page, accumulating items.
    async fn list_pages(
        &self,
        access_token: &str,
        query: &str,
        mode: SyncMode,
    ) -> Result<FetchResult, SyncError> {
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = format!(
                "{}/calendars/{}/events?{}",
                self.base_url,
                urlencoding::encode(CALENDAR_ID),
                query,
            );
            if let Some(pt) = &page_token {
                url.push_str(&format!("&pageToken={}", urlencoding::encode(pt)));
            }

            let response = self
                .client
                .get(&url)
                .header("Authorization", format!("Bearer {}", access_token))
                .timeout(self.timeout)
                .send()
                .await
                .map_err(|e| self.request_error(e))?;

            let page: EventListResponse = handle_response(response).await?;
            tracing::debug!("Fetched page with {} events", page.items.len());
            events.extend(page.items);

            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => {
                    tracing::info!("{:?} sync returned {} events", mode, events.len());
                    return Ok(FetchResult {
                        events,
                        next_cursor: page.next_sync_token,
                        mode,
                    });
                }
            }
        }
    }

    fn request_error(&self, e: reqwest::Error) -> SyncError {
        if e.is_timeout() {
            SyncError::Timeout(self.timeout)
        } else {
            SyncError::Network(e)
        }
    }
}

fn full_query(time_min: DateTime<Utc>, time_max: DateTime<Utc>) -> String {
    format!(
        "singleEvents=true&showDeleted=true&orderBy=startTime&maxResults={}&timeMin={}&timeMax={}",
        MAX_RESULTS,
        urlencoding::encode(&time_min.to_rfc3339()),
        urlencoding::encode(&time_max.to_rfc3339()),
    )
}

// The server rejects time bounds and ordering alongside a sync token.
fn delta_query(cursor: &str) -> String {
    format!(
        "singleEvents=true&showDeleted=true&syncToken={}",
        urlencoding::encode(cursor)
    )
}

/// Map API responses and status codes onto [`SyncError`].
async fn handle_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, SyncError> {
    let status = response.status();

    if status.is_success() {
        response
            .json()
            .await
            .map_err(|e| SyncError::Api(format!("JSON parse error: {}", e)))
    } else if status.as_u16() == 410 {
        Err(SyncError::CursorExpired)
    } else if status.as_u16() == 401 {
        Err(SyncError::Unauthorized)
    } else if status.as_u16() == 429 {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or(60);
        Err(SyncError::RateLimited(retry_after))
    } else {
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorResponse>(&text)
            .map(|e| e.error.message)
            .unwrap_or(text);
        Err(SyncError::Api(format!("{}: {}", status, message)))
    }
}
