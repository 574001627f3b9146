use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

use crate::config::Config;
use crate::crossing::ProximityDetector;
use crate::events::{EventSchedule, HttpEventSchedule};
use crate::feed::{HttpPositionFeed, PositionFeed};
use crate::leaderboard::Credit;
use crate::mapping::WorldMapper;
use crate::quest::{Adapters, QuestInstance, QuestSettings};
use crate::quest_cache::QuestCache;
use crate::source::HttpQuestSource;
use crate::store::PlayerStore;

pub struct AppStateInner {
    pub config: Config,
    pub quests: BTreeMap<u32, Arc<QuestInstance>>,
    quest_cache: Arc<QuestCache>,
    players: Arc<PlayerStore>,
}

pub type AppState = Arc<AppStateInner>;

impl AppStateInner {
    /// Wire one quest instance per configured world onto shared caches and
    /// HTTP adapters.
    pub fn new(config: Config, client: reqwest::Client) -> Self {
        let quest_cache = Arc::new(QuestCache::new(
            Arc::new(HttpQuestSource::new(client.clone(), config.waypoints_url.clone())),
            Arc::new(WorldMapper),
            config.credit.name.clone(),
            config.timing.quest_ttl,
        ));
        let players = Arc::new(PlayerStore::new(config.timing.player_ttl));

        let adapters = Adapters {
            feed: config
                .positions_url
                .as_ref()
                .map(|url| Arc::new(HttpPositionFeed::new(client.clone(), url.clone())) as Arc<dyn PositionFeed>),
            schedule: config
                .events_url
                .as_ref()
                .map(|url| Arc::new(HttpEventSchedule::new(client.clone(), url.clone())) as Arc<dyn EventSchedule>),
            detector: Arc::new(ProximityDetector::new(config.visit_radius)),
        };

        let settings = QuestSettings {
            event_name: config.event_name.clone(),
            credit: Credit::from(&config.credit),
            timing: config.timing.clone(),
        };

        let quests = config
            .worlds
            .iter()
            .map(|&world| {
                let instance = QuestInstance::new(
                    world,
                    settings.clone(),
                    quest_cache.clone(),
                    players.clone(),
                    adapters.clone(),
                );
                (world, Arc::new(instance))
            })
            .collect();

        Self {
            config,
            quests,
            quest_cache,
            players,
        }
    }

    pub fn quest(&self, world: u32) -> Option<Arc<QuestInstance>> {
        self.quests.get(&world).cloned()
    }

    /// Drop expired quest and player entries. Returns (quests, players) removed.
    pub async fn sweep(&self) -> (usize, usize) {
        let now = Utc::now();
        (self.quest_cache.sweep(now).await, self.players.sweep(now).await)
    }
}

/// Periodically evict expired cache entries.
pub fn spawn_sweeper(state: AppState) -> JoinHandle<()> {
    let period = state.config.sweep_interval;
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let (quests, players) = state.sweep().await;
            if quests + players > 0 {
                tracing::info!("swept {quests} quest(s) and {players} player(s)");
            }
        }
    })
}
