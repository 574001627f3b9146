use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use crate::crossing::CrossingDetector;
use crate::feed::RiderPosition;
use crate::leaderboard::{self, ScoreEntry};
use crate::player::Player;
use crate::ttl_cache::TtlCache;
use crate::waypoint::Waypoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlayerKey {
    pub world: u32,
    pub rider: u64,
}

/// Per-player quest progress, partitioned by world. Players idle for longer
/// than the TTL are forgotten.
pub struct PlayerStore {
    players: Mutex<TtlCache<PlayerKey, Player>>,
}

impl PlayerStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            players: Mutex::new(TtlCache::new(ttl)),
        }
    }

    /// Apply one batch of positions against one waypoint template under a
    /// single lock. Returns how many players were seen for the first time.
    pub async fn apply_positions(
        &self,
        world: u32,
        positions: Vec<RiderPosition>,
        template: &[Waypoint],
        detector: &dyn CrossingDetector,
        scoring: bool,
        now: DateTime<Utc>,
    ) -> usize {
        let mut players = self.players.lock().await;
        let mut created = 0;
        for position in positions {
            let key = PlayerKey { world, rider: position.id };
            if players.get(&key, now).is_none() {
                created += 1;
            }
            let player = players.get_or_insert_with(key, now, || Player::new(&position, now));
            player.update(position, template, detector, scoring);
        }
        created
    }

    /// Clear every visit of every live player in `world`.
    pub async fn reset_scores(&self, world: u32, now: DateTime<Utc>) -> usize {
        let mut players = self.players.lock().await;
        let mut reset = 0;
        for (_, player) in players
            .iter_live_mut(now)
            .filter(|(key, _)| key.world == world)
        {
            player.reset_score();
            reset += 1;
        }
        reset
    }

    pub async fn scores(&self, world: u32, now: DateTime<Utc>) -> Vec<ScoreEntry> {
        let players = self.players.lock().await;
        leaderboard::rank(
            players
                .iter_live(now)
                .filter(|(key, _)| key.world == world)
                .map(|(_, player)| player),
        )
    }

    pub async fn count(&self, world: u32, now: DateTime<Utc>) -> usize {
        self.players
            .lock()
            .await
            .iter_live(now)
            .filter(|(key, _)| key.world == world)
            .count()
    }

    pub async fn sweep(&self, now: DateTime<Utc>) -> usize {
        self.players.lock().await.sweep(now)
    }

    #[cfg(test)]
    pub async fn player(&self, world: u32, rider: u64, now: DateTime<Utc>) -> Option<Player> {
        self.players
            .lock()
            .await
            .get(&PlayerKey { world, rider }, now)
            .cloned()
    }
}
