use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::mapping::CoordinateMapper;
use crate::waypoint::{Waypoint, WaypointKey, WaypointRole};

const WAYPOINT_SIZE: f64 = 1.8;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("quest request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("quest payload is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Remote source of quest definitions.
#[async_trait]
pub trait QuestSource: Send + Sync {
    async fn fetch(&self) -> Result<Value, SourceError>;
}

/// Fetches the quest definition as JSON over HTTP.
pub struct HttpQuestSource {
    client: reqwest::Client,
    url: String,
}

impl HttpQuestSource {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self { client, url: url.into() }
    }
}

#[async_trait]
impl QuestSource for HttpQuestSource {
    async fn fetch(&self) -> Result<Value, SourceError> {
        // Served as text/plain upstream, so decode the body ourselves.
        let body = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[derive(Debug, Deserialize)]
struct RawWaypoint {
    #[serde(default)]
    name: String,
    lat: f64,
    long: f64,
}

#[derive(Debug, Deserialize)]
struct RawQuest {
    start: RawWaypoint,
    waypoints: Vec<RawWaypoint>,
    finish: RawWaypoint,
}

/// Outcome of interpreting a quest payload for one world.
#[derive(Debug, Clone, PartialEq)]
pub enum QuestResolution {
    Active(Vec<Waypoint>),
    /// The quest runs in another world.
    ActiveElsewhere(u32),
    /// No usable quest for the requested world.
    Inactive,
}

/// Picks the quest for `world` out of a payload and maps it onto the world's plane.
///
/// A `worlds` wrapper keyed by world id takes precedence over a flat payload.
pub fn resolve_quest(payload: &Value, world: u32, mapper: &dyn CoordinateMapper) -> QuestResolution {
    let quest = payload
        .get("worlds")
        .and_then(|worlds| worlds.get(world.to_string()))
        .unwrap_or(payload);

    let quest_world = quest.get("worldId").and_then(world_id);

    if quest.get("waypoints").is_some() && quest_world.is_none_or(|w| w == world) {
        return match RawQuest::deserialize(quest) {
            Ok(raw) => match map_quest(&raw, world, mapper) {
                Some(points) => QuestResolution::Active(points),
                None => {
                    tracing::warn!("no projection for world {world}");
                    QuestResolution::Inactive
                }
            },
            Err(e) => {
                tracing::warn!("malformed quest for world {world}: {e}");
                QuestResolution::Inactive
            }
        };
    }

    match quest_world {
        Some(other) => QuestResolution::ActiveElsewhere(other),
        None => QuestResolution::Inactive,
    }
}

fn world_id(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn map_quest(raw: &RawQuest, world: u32, mapper: &dyn CoordinateMapper) -> Option<Vec<Waypoint>> {
    let mut points = Vec::with_capacity(raw.waypoints.len() + 2);
    points.push(to_waypoint(&raw.start, Some(WaypointRole::Start), "zq_start", world, mapper)?);
    for wp in &raw.waypoints {
        points.push(to_waypoint(wp, None, "zq_waypoint", world, mapper)?);
    }
    points.push(to_waypoint(&raw.finish, Some(WaypointRole::Finish), "zq_finish", world, mapper)?);
    Some(points)
}

fn to_waypoint(
    raw: &RawWaypoint,
    role: Option<WaypointRole>,
    image: &'static str,
    world: u32,
    mapper: &dyn CoordinateMapper,
) -> Option<Waypoint> {
    let (x, y) = mapper.to_xy(world, raw.lat, raw.long)?;
    Some(Waypoint {
        key: WaypointKey::new(role, raw.lat, raw.long),
        name: raw.name.clone(),
        x,
        y,
        role,
        rotate: mapper.rotation(world),
        size: WAYPOINT_SIZE,
        image,
    })
}
