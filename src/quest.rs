use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use crate::config::Timing;
use crate::crossing::CrossingDetector;
use crate::events::{EventSchedule, EventWindow};
use crate::feed::PositionFeed;
use crate::leaderboard::{self, Credit, InfoPanel};
use crate::quest_cache::{QuestCache, StatusChange};
use crate::store::PlayerStore;
use crate::waypoint::Waypoint;

/// Live collaborators a quest instance polls.
#[derive(Clone)]
pub struct Adapters {
    /// Without a feed the instance serves waypoints but never scores.
    pub feed: Option<Arc<dyn PositionFeed>>,
    /// Without a schedule scoring is never frozen.
    pub schedule: Option<Arc<dyn EventSchedule>>,
    pub detector: Arc<dyn CrossingDetector>,
}

#[derive(Debug, Clone)]
pub struct QuestSettings {
    pub event_name: String,
    pub credit: Credit,
    pub timing: Timing,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestStatus {
    pub world: u32,
    pub polling: bool,
    /// Start of the most recent poll cycle, including one still running.
    pub last_poll: Option<DateTime<Utc>>,
    pub event_pending: bool,
    pub event_start: Option<DateTime<Utc>>,
    pub players: usize,
    pub message: Option<String>,
}

/// The quest as seen from one world: the only writer of that world's quest
/// cache entry, player partition and event window.
pub struct QuestInstance {
    world: u32,
    settings: QuestSettings,
    quests: Arc<QuestCache>,
    players: Arc<PlayerStore>,
    adapters: Adapters,
    /// Held for the whole poll cycle; at most one cycle runs at a time.
    poll: Mutex<()>,
    last_poll: RwLock<Option<DateTime<Utc>>>,
    window: Mutex<EventWindow>,
    message: RwLock<Option<String>>,
}

impl QuestInstance {
    pub fn new(
        world: u32,
        settings: QuestSettings,
        quests: Arc<QuestCache>,
        players: Arc<PlayerStore>,
        adapters: Adapters,
    ) -> Self {
        let window = EventWindow::new(settings.timing.warmup, settings.timing.event_check_interval);
        Self {
            world,
            settings,
            quests,
            players,
            adapters,
            poll: Mutex::new(()),
            last_poll: RwLock::new(None),
            window: Mutex::new(window),
            message: RwLock::new(None),
        }
    }

    /// Current waypoints for this world. Drives a poll cycle when one is due.
    pub async fn get(&self) -> Vec<Waypoint> {
        self.get_at(Utc::now()).await
    }

    pub async fn info_panel(&self) -> InfoPanel {
        self.info_panel_at(Utc::now()).await
    }

    pub async fn status(&self) -> QuestStatus {
        self.status_at(Utc::now()).await
    }

    pub(crate) async fn get_at(&self, now: DateTime<Utc>) -> Vec<Waypoint> {
        let lookup = self.quests.get(self.world, now).await;
        match lookup.status {
            StatusChange::Unchanged => {}
            StatusChange::Clear => *self.message.write().await = None,
            StatusChange::Set(text) => *self.message.write().await = Some(text),
        }

        if !lookup.waypoints.is_empty() {
            self.update_state(&lookup.waypoints, now).await;
        }
        lookup.waypoints.to_vec()
    }

    pub(crate) async fn info_panel_at(&self, now: DateTime<Utc>) -> InfoPanel {
        let scores = self.players.scores(self.world, now).await;
        let message = self.message.read().await.clone();
        leaderboard::info_panel(self.settings.credit.clone(), scores, message)
    }

    pub(crate) async fn status_at(&self, now: DateTime<Utc>) -> QuestStatus {
        let polling = self.poll.try_lock().is_err();
        let last_poll = *self.last_poll.read().await;
        let (event_pending, event_start) = {
            let window = self.window.lock().await;
            (window.is_pending(), window.last_event().and_then(|e| e.event_start))
        };
        QuestStatus {
            world: self.world,
            polling,
            last_poll,
            event_pending,
            event_start,
            players: self.players.count(self.world, now).await,
            message: self.message.read().await.clone(),
        }
    }

    async fn update_state(&self, template: &[Waypoint], now: DateTime<Utc>) {
        let Some(feed) = &self.adapters.feed else {
            return;
        };

        let Ok(_cycle) = self.poll.try_lock() else {
            tracing::debug!("world {}: poll already in flight", self.world);
            return;
        };
        {
            let mut last_poll = self.last_poll.write().await;
            if last_poll.is_some_and(|last| now - last < self.settings.timing.poll_interval) {
                return;
            }
            *last_poll = Some(now);
        }

        let lookup_due = self.window.lock().await.lookup_due(now);
        let event_lookup = async {
            match &self.adapters.schedule {
                Some(schedule) if lookup_due => {
                    Some(schedule.find_matching_event(&self.settings.event_name).await)
                }
                _ => None,
            }
        };
        let (event, positions) = futures::join!(
            event_lookup,
            feed.positions(self.world, &self.settings.event_name)
        );

        let (entered_warmup, scoring) = {
            let mut window = self.window.lock().await;
            if let Some(result) = event {
                window.record_lookup(result, now);
            }
            let entered = window.refresh(now);
            (entered, !window.is_pending())
        };

        if entered_warmup {
            let reset = self.players.reset_scores(self.world, now).await;
            tracing::info!("world {}: event warm-up started, reset {reset} player(s)", self.world);
        }

        let positions = match positions {
            Ok(positions) => positions,
            Err(e) => {
                tracing::warn!("world {}: position poll failed: {e}", self.world);
                return;
            }
        };

        let seen = positions.len();
        let created = self
            .players
            .apply_positions(
                self.world,
                positions,
                template,
                self.adapters.detector.as_ref(),
                scoring,
                now,
            )
            .await;
        tracing::debug!(
            "world {}: applied {seen} position(s), {created} new player(s), scoring={scoring}",
            self.world
        );
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Duration;
    use serde_json::json;
    use tokio::sync::Notify;

    use super::*;
    use crate::crossing::ProximityDetector;
    use crate::events::{ScheduleError, ScheduledEvent};
    use crate::feed::{FeedError, RiderPosition};
    use crate::player::fixtures::{position, t0};
    use crate::quest_cache::fixtures::ScriptedSource;
    use crate::source::fixtures::IdentityMapper;

    #[derive(Default)]
    struct ScriptedFeed {
        batches: StdMutex<VecDeque<Vec<RiderPosition>>>,
        calls: AtomicUsize,
        requests: StdMutex<Vec<(u32, String)>>,
        gate: Option<Arc<Notify>>,
    }

    impl ScriptedFeed {
        fn push(&self, batch: Vec<RiderPosition>) {
            self.batches.lock().unwrap().push_back(batch);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PositionFeed for ScriptedFeed {
        async fn positions(&self, world: u32, event: &str) -> Result<Vec<RiderPosition>, FeedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push((world, event.to_string()));
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            Ok(self.batches.lock().unwrap().pop_front().unwrap_or_default())
        }
    }

    #[derive(Default)]
    struct SettableSchedule {
        event: StdMutex<Option<ScheduledEvent>>,
    }

    #[async_trait]
    impl EventSchedule for SettableSchedule {
        async fn find_matching_event(&self, _name: &str) -> Result<Option<ScheduledEvent>, ScheduleError> {
            Ok(self.event.lock().unwrap().clone())
        }
    }

    fn abc() -> serde_json::Value {
        json!({
            "start": { "name": "A", "lat": 0.0, "long": 0.0 },
            "waypoints": [ { "name": "B", "lat": 1000.0, "long": 1000.0 } ],
            "finish": { "name": "C", "lat": 2000.0, "long": 0.0 }
        })
    }

    fn instance(
        payload: serde_json::Value,
        feed: Option<Arc<ScriptedFeed>>,
        schedule: Option<Arc<SettableSchedule>>,
    ) -> QuestInstance {
        instance_from(ScriptedSource::new(vec![Some(payload)]), feed, schedule)
    }

    fn instance_from(
        source: ScriptedSource,
        feed: Option<Arc<ScriptedFeed>>,
        schedule: Option<Arc<SettableSchedule>>,
    ) -> QuestInstance {
        let timing = Timing::default();
        let quests = Arc::new(QuestCache::new(
            Arc::new(source),
            Arc::new(IdentityMapper),
            "ZwiftQuest",
            timing.quest_ttl,
        ));
        let players = Arc::new(PlayerStore::new(timing.player_ttl));
        let settings = QuestSettings {
            event_name: "zwiftquest".into(),
            credit: Credit {
                prompt: "Event details at".into(),
                name: "ZwiftQuest".into(),
                href: "http://zwiftquest.com/".into(),
            },
            timing,
        };
        let adapters = Adapters {
            feed: feed.map(|f| f as Arc<dyn PositionFeed>),
            schedule: schedule.map(|s| s as Arc<dyn EventSchedule>),
            detector: Arc::new(ProximityDetector::new(50.0)),
        };
        QuestInstance::new(1, settings, quests, players, adapters)
    }

    fn at(secs: i64) -> DateTime<Utc> {
        t0() + Duration::seconds(secs)
    }

    async fn score_of(quest: &QuestInstance, rider: u64, now: DateTime<Utc>) -> Option<u32> {
        quest
            .info_panel_at(now)
            .await
            .scores
            .and_then(|scores| scores.into_iter().find(|s| s.rider.id == rider))
            .map(|s| s.score)
    }

    #[tokio::test]
    async fn test_in_order_ride_scores_two() {
        let feed = Arc::new(ScriptedFeed::default());
        let quest = instance(abc(), Some(feed.clone()), None);

        for (i, (x, y)) in [(0.0, 0.0), (1000.0, 1000.0), (2000.0, 0.0)].into_iter().enumerate() {
            let secs = i as i64 * 3;
            feed.push(vec![position(7, x, y, secs)]);
            let points = quest.get_at(at(secs)).await;
            assert_eq!(points.len(), 3);
        }

        assert_eq!(score_of(&quest, 7, at(10)).await, Some(2));
        let panel = quest.info_panel_at(at(10)).await;
        assert!(!panel.show_waypoints);
        assert!(panel.messages.is_none());
    }

    #[tokio::test]
    async fn test_world_mismatch_banner() {
        let feed = Arc::new(ScriptedFeed::default());
        let quest = instance(json!({ "worldId": 2 }), Some(feed.clone()), None);

        assert!(quest.get_at(t0()).await.is_empty());
        // Nothing to score against, so the feed is left alone
        assert_eq!(feed.calls(), 0);

        let panel = quest.info_panel_at(t0()).await;
        assert!(panel.scores.is_none());
        assert!(panel.show_waypoints);
        let messages = panel.messages.unwrap();
        assert_eq!(messages.list[0].text, "ZwiftQuest is currently in Richmond");
    }

    #[tokio::test]
    async fn test_banner_cleared_when_quest_returns() {
        let source = ScriptedSource::new(vec![Some(json!({ "worldId": 2 })), Some(abc())]);
        let quest = instance_from(source, None, None);

        assert!(quest.get_at(t0()).await.is_empty());
        assert!(quest.info_panel_at(t0()).await.messages.is_some());

        // Still inside the quest TTL: the mismatch stays cached
        let cached = t0() + Duration::minutes(29);
        assert!(quest.get_at(cached).await.is_empty());
        assert!(quest.info_panel_at(cached).await.messages.is_some());

        let expired = t0() + Duration::minutes(31);
        assert_eq!(quest.get_at(expired).await.len(), 3);
        let panel = quest.info_panel_at(expired).await;
        assert!(panel.messages.is_none());
        assert!(quest.status_at(expired).await.message.is_none());
    }

    #[tokio::test]
    async fn test_feed_filtered_by_event() {
        let feed = Arc::new(ScriptedFeed::default());
        let quest = instance(abc(), Some(feed.clone()), None);
        quest.get_at(t0()).await;
        assert_eq!(*feed.requests.lock().unwrap(), vec![(1, "zwiftquest".to_string())]);
    }

    #[tokio::test]
    async fn test_status_keeps_last_poll_while_polling() {
        let gate = Arc::new(Notify::new());
        let feed = Arc::new(ScriptedFeed {
            gate: Some(gate.clone()),
            ..Default::default()
        });
        let quest = instance(abc(), Some(feed.clone()), None);

        let poll = quest.get_at(t0());
        let during = async {
            let status = quest.status_at(at(1)).await;
            gate.notify_one();
            status
        };
        let (_, status) = tokio::join!(poll, during);
        assert!(status.polling);
        assert_eq!(status.last_poll, Some(t0()));

        let after = quest.status_at(at(2)).await;
        assert!(!after.polling);
        assert_eq!(after.last_poll, Some(t0()));
    }

    #[tokio::test]
    async fn test_polls_debounced() {
        let feed = Arc::new(ScriptedFeed::default());
        let quest = instance(abc(), Some(feed.clone()), None);

        quest.get_at(t0()).await;
        let points = quest.get_at(t0() + Duration::milliseconds(2400)).await;
        assert_eq!(points.len(), 3);
        assert_eq!(feed.calls(), 1);

        quest.get_at(t0() + Duration::milliseconds(2500)).await;
        assert_eq!(feed.calls(), 2);
    }

    #[tokio::test]
    async fn test_single_poll_in_flight() {
        let gate = Arc::new(Notify::new());
        let feed = Arc::new(ScriptedFeed {
            gate: Some(gate.clone()),
            ..Default::default()
        });
        let quest = instance(abc(), Some(feed.clone()), None);

        let first = quest.get_at(t0());
        let second = async {
            let points = quest.get_at(at(10)).await;
            gate.notify_one();
            points
        };
        let (a, b) = tokio::join!(first, second);
        assert_eq!(a.len(), 3);
        assert_eq!(b.len(), 3);
        assert_eq!(feed.calls(), 1);
    }

    #[tokio::test]
    async fn test_no_feed_serves_waypoints() {
        let quest = instance(abc(), None, None);
        assert_eq!(quest.get_at(t0()).await.len(), 3);
        let status = quest.status_at(t0()).await;
        assert!(status.last_poll.is_none());
        assert_eq!(status.players, 0);
    }

    #[tokio::test]
    async fn test_warmup_resets_and_freezes_scores() {
        let feed = Arc::new(ScriptedFeed::default());
        let schedule = Arc::new(SettableSchedule::default());
        let quest = instance(abc(), Some(feed.clone()), Some(schedule.clone()));

        feed.push(vec![position(7, 0.0, 0.0, 0)]);
        quest.get_at(at(0)).await;
        feed.push(vec![position(7, 1000.0, 1000.0, 3)]);
        quest.get_at(at(3)).await;
        assert_eq!(score_of(&quest, 7, at(3)).await, Some(1));

        // Event starts five minutes after the next schedule lookup
        let event_start = at(40) + Duration::minutes(5);
        *schedule.event.lock().unwrap() = Some(ScheduledEvent {
            name: "ZwiftQuest".into(),
            event_start: Some(event_start),
        });

        feed.push(vec![position(7, 2000.0, 0.0, 40)]);
        quest.get_at(at(40)).await;
        let status = quest.status_at(at(40)).await;
        assert!(status.event_pending);
        assert_eq!(status.event_start, Some(event_start));
        let panel = quest.info_panel_at(at(40)).await;
        assert!(panel.scores.is_none());
        assert!(panel.show_waypoints);

        // Crossing start and B during warm-up does not count
        feed.push(vec![position(7, 0.0, 0.0, 43)]);
        quest.get_at(at(43)).await;
        feed.push(vec![position(7, 1000.0, 1000.0, 46)]);
        quest.get_at(at(46)).await;
        assert_eq!(score_of(&quest, 7, at(46)).await, None);

        // Once the event has started scoring resumes from scratch
        let after = 40 + 5 * 60 + 1;
        feed.push(vec![position(7, 500.0, -500.0, after)]);
        quest.get_at(at(after)).await;
        assert!(!quest.status_at(at(after)).await.event_pending);
        feed.push(vec![position(7, 0.0, 0.0, after + 3)]);
        quest.get_at(at(after + 3)).await;
        assert_eq!(score_of(&quest, 7, at(after + 3)).await, Some(0));
        feed.push(vec![position(7, 1000.0, 1000.0, after + 6)]);
        quest.get_at(at(after + 6)).await;
        assert_eq!(score_of(&quest, 7, at(after + 6)).await, Some(1));
    }

    #[tokio::test]
    async fn test_schedule_failure_keeps_scoring() {
        struct BrokenSchedule;

        #[async_trait]
        impl EventSchedule for BrokenSchedule {
            async fn find_matching_event(&self, _name: &str) -> Result<Option<ScheduledEvent>, ScheduleError> {
                Err(ScheduleError::Decode(serde_json::from_str::<Vec<ScheduledEvent>>("{").unwrap_err()))
            }
        }

        let feed = Arc::new(ScriptedFeed::default());
        let mut quest = instance(abc(), Some(feed.clone()), None);
        quest.adapters.schedule = Some(Arc::new(BrokenSchedule));

        feed.push(vec![position(7, 0.0, 0.0, 0)]);
        quest.get_at(at(0)).await;
        feed.push(vec![position(7, 1000.0, 1000.0, 3)]);
        quest.get_at(at(3)).await;
        assert_eq!(score_of(&quest, 7, at(3)).await, Some(1));
    }
}
