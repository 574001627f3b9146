use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use crate::mapping::{self, CoordinateMapper};
use crate::source::{QuestResolution, QuestSource, resolve_quest};
use crate::ttl_cache::TtlCache;
use crate::waypoint::Waypoint;

/// What a lookup means for the quest's banner message.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusChange {
    Unchanged,
    Clear,
    Set(String),
}

#[derive(Debug, Clone)]
pub struct QuestLookup {
    pub waypoints: Arc<[Waypoint]>,
    pub status: StatusChange,
}

/// Mapped waypoint lists per world, refetched from the quest source after
/// they expire. Fetch failures are never cached.
pub struct QuestCache {
    source: Arc<dyn QuestSource>,
    mapper: Arc<dyn CoordinateMapper>,
    title: String,
    entries: Mutex<TtlCache<u32, Arc<[Waypoint]>>>,
}

impl QuestCache {
    pub fn new(
        source: Arc<dyn QuestSource>,
        mapper: Arc<dyn CoordinateMapper>,
        title: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            source,
            mapper,
            title: title.into(),
            entries: Mutex::new(TtlCache::new(ttl)),
        }
    }

    pub async fn get(&self, world: u32, now: DateTime<Utc>) -> QuestLookup {
        if let Some(waypoints) = self.entries.lock().await.get(&world, now) {
            return QuestLookup {
                waypoints: waypoints.clone(),
                status: StatusChange::Unchanged,
            };
        }

        let payload = match self.source.fetch().await {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("quest fetch for world {world} failed: {e}");
                return QuestLookup {
                    waypoints: Arc::default(),
                    status: StatusChange::Set(self.inactive_message(world)),
                };
            }
        };

        let (waypoints, status) = match resolve_quest(&payload, world, self.mapper.as_ref()) {
            QuestResolution::Active(points) => {
                tracing::info!("loaded quest for world {world}: {} waypoint(s)", points.len());
                (points, StatusChange::Clear)
            }
            QuestResolution::ActiveElsewhere(other) => {
                tracing::info!("quest requested for world {world} is active in world {other}");
                let name = mapping::world_name(other)
                    .map(str::to_owned)
                    .unwrap_or_else(|| format!("world {other}"));
                (Vec::new(), StatusChange::Set(format!("{} is currently in {name}", self.title)))
            }
            QuestResolution::Inactive => {
                tracing::info!("no quest for world {world}");
                (Vec::new(), StatusChange::Set(self.inactive_message(world)))
            }
        };

        let waypoints: Arc<[Waypoint]> = Arc::from(waypoints);
        self.entries.lock().await.insert(world, waypoints.clone(), now);
        QuestLookup { waypoints, status }
    }

    pub async fn sweep(&self, now: DateTime<Utc>) -> usize {
        self.entries.lock().await.sweep(now)
    }

    fn inactive_message(&self, world: u32) -> String {
        let name = mapping::world_name(world)
            .map(str::to_owned)
            .unwrap_or_else(|| format!("world {world}"));
        format!("{} is not currently in {name}", self.title)
    }
}
