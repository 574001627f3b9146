use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("position request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// One observed rider position in map-plane coordinates.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiderPosition {
    pub id: u64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub x: f64,
    pub y: f64,
    /// When the sample was taken; feeds without timestamps get the receive time.
    #[serde(default = "Utc::now")]
    pub time: DateTime<Utc>,
}

impl RiderPosition {
    pub fn same_spot(&self, other: &RiderPosition) -> bool {
        self.x == other.x && self.y == other.y
    }
}

/// Live rider positions for a world, polled on demand.
#[async_trait]
pub trait PositionFeed: Send + Sync {
    /// Positions of riders in `world` who are riding the event named `event`.
    async fn positions(&self, world: u32, event: &str) -> Result<Vec<RiderPosition>, FeedError>;
}

pub struct HttpPositionFeed {
    client: reqwest::Client,
    url: String,
}

impl HttpPositionFeed {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self { client, url: url.into() }
    }

    fn request(&self, world: u32, event: &str) -> reqwest::RequestBuilder {
        self.client
            .get(&self.url)
            .query(&[("world", world.to_string()), ("filter", format!("event:{event}"))])
    }
}

#[async_trait]
impl PositionFeed for HttpPositionFeed {
    async fn positions(&self, world: u32, event: &str) -> Result<Vec<RiderPosition>, FeedError> {
        let records: Vec<Value> = self
            .request(world, event)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(decode_positions(records))
    }
}

/// Decode feed records one by one, skipping any that lack an id or numeric x/y.
pub fn decode_positions(records: Vec<Value>) -> Vec<RiderPosition> {
    let total = records.len();
    let positions: Vec<RiderPosition> = records
        .into_iter()
        .filter_map(|record| match serde_json::from_value(record) {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::debug!("skipping position record: {e}");
                None
            }
        })
        .collect();

    if positions.len() < total {
        tracing::warn!("skipped {} malformed position record(s)", total - positions.len());
    }
    positions
}
