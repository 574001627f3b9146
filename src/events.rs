use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("event schedule request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("event schedule is not a list of events: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledEvent {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub event_start: Option<DateTime<Utc>>,
}

/// Lookup of upcoming events by name.
#[async_trait]
pub trait EventSchedule: Send + Sync {
    async fn find_matching_event(&self, name: &str) -> Result<Option<ScheduledEvent>, ScheduleError>;
}

/// Reads a JSON list of events and picks the first whose name mentions the
/// quest's event name.
pub struct HttpEventSchedule {
    client: reqwest::Client,
    url: String,
}

impl HttpEventSchedule {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self { client, url: url.into() }
    }
}

#[async_trait]
impl EventSchedule for HttpEventSchedule {
    async fn find_matching_event(&self, name: &str) -> Result<Option<ScheduledEvent>, ScheduleError> {
        let body = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let events: Vec<ScheduledEvent> = serde_json::from_str(&body)?;
        Ok(match_event(events, name))
    }
}

fn match_event(events: Vec<ScheduledEvent>, name: &str) -> Option<ScheduledEvent> {
    let needle = name.to_lowercase();
    events
        .into_iter()
        .find(|e| e.name.to_lowercase().contains(&needle))
}

/// Whether `now` falls in the warm-up window before `event_start`.
pub fn in_warmup(event_start: DateTime<Utc>, warmup: Duration, now: DateTime<Utc>) -> bool {
    event_start - warmup <= now && now < event_start
}

/// Warm-up tracking for one quest instance.
#[derive(Debug)]
pub struct EventWindow {
    warmup: Duration,
    check_interval: Duration,
    /// Event from the last lookup; `None` if there was none or the lookup failed.
    last_event: Option<ScheduledEvent>,
    last_checked: Option<DateTime<Utc>>,
    pending: bool,
}

impl EventWindow {
    pub fn new(warmup: Duration, check_interval: Duration) -> Self {
        Self {
            warmup,
            check_interval,
            last_event: None,
            last_checked: None,
            pending: false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn last_event(&self) -> Option<&ScheduledEvent> {
        self.last_event.as_ref()
    }

    /// Whether the schedule should be queried again at `now`.
    pub fn lookup_due(&self, now: DateTime<Utc>) -> bool {
        self.last_checked
            .is_none_or(|checked| now - checked >= self.check_interval)
    }

    /// Store a lookup result. Failures count as "no event".
    pub fn record_lookup(&mut self, result: Result<Option<ScheduledEvent>, ScheduleError>, now: DateTime<Utc>) {
        self.last_checked = Some(now);
        self.last_event = match result {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("event lookup failed, scoring stays open: {e}");
                None
            }
        };
    }

    /// Re-derive the pending flag from the last lookup.
    /// Returns `true` when this call moved the window into warm-up.
    pub fn refresh(&mut self, now: DateTime<Utc>) -> bool {
        let was_pending = self.pending;
        self.pending = self
            .last_event
            .as_ref()
            .and_then(|e| e.event_start)
            .is_some_and(|start| in_warmup(start, self.warmup, now));
        self.pending && !was_pending
    }
}
