use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::crossing::CrossingDetector;
use crate::feed::RiderPosition;
use crate::waypoint::{Waypoint, WaypointRole};

/// How many recent positions are kept per player.
pub const POSITION_HISTORY: usize = 3;

/// A player's copy of a quest waypoint.
#[derive(Debug, Clone)]
pub struct PlayerWaypoint {
    pub waypoint: Waypoint,
    pub visited: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiderIdentity {
    pub id: u64,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone)]
pub struct Player {
    pub rider: RiderIdentity,
    positions: Vec<RiderPosition>,
    waypoints: Vec<PlayerWaypoint>,
    /// Time of the most recent visit; creation time until the first one.
    pub last_score: DateTime<Utc>,
}

impl Player {
    pub fn new(position: &RiderPosition, now: DateTime<Utc>) -> Self {
        Self {
            rider: RiderIdentity {
                id: position.id,
                first_name: position.first_name.clone(),
                last_name: position.last_name.clone(),
            },
            positions: Vec::with_capacity(POSITION_HISTORY + 1),
            waypoints: Vec::new(),
            last_score: now,
        }
    }

    /// Rebind to the current quest template, keeping the visited flag of every
    /// waypoint whose identity survives.
    pub fn refresh_waypoints(&mut self, template: &[Waypoint]) {
        let previous = std::mem::take(&mut self.waypoints);
        self.waypoints = template
            .iter()
            .map(|waypoint| PlayerWaypoint {
                visited: previous
                    .iter()
                    .any(|p| p.visited && p.waypoint.key == waypoint.key),
                waypoint: waypoint.clone(),
            })
            .collect();
    }

    /// Record a new position. When `scoring` is set, every enabled waypoint
    /// the move crossed is marked visited. Repeats of the last (x, y) are
    /// ignored entirely.
    pub fn update_position(&mut self, position: RiderPosition, detector: &dyn CrossingDetector, scoring: bool) {
        if self.positions.last().is_some_and(|last| last.same_spot(&position)) {
            return;
        }

        if scoring {
            for i in 0..self.waypoints.len() {
                if self.waypoints[i].visited || !self.waypoint_enabled(i) {
                    continue;
                }
                if let Some(visit) =
                    detector.check_visited(&position, &self.positions, &self.waypoints[i].waypoint)
                {
                    self.waypoints[i].visited = true;
                    self.last_score = visit.time;
                }
            }
        }

        self.positions.push(position);
        if self.positions.len() > POSITION_HISTORY {
            self.positions.remove(0);
        }
    }

    /// Refresh against `template`, then record `position`.
    pub fn update(
        &mut self,
        position: RiderPosition,
        template: &[Waypoint],
        detector: &dyn CrossingDetector,
        scoring: bool,
    ) {
        self.refresh_waypoints(template);
        self.update_position(position, detector, scoring);
    }

    fn waypoint_enabled(&self, index: usize) -> bool {
        match self.waypoints[index].waypoint.role {
            Some(WaypointRole::Start) => true,
            Some(WaypointRole::Finish) => self
                .waypoints
                .iter()
                .all(|p| !p.waypoint.is_ordinary() || p.visited),
            None => self
                .waypoints
                .iter()
                .all(|p| p.waypoint.role != Some(WaypointRole::Start) || p.visited),
        }
    }

    /// Visited waypoints other than the start.
    pub fn score(&self) -> u32 {
        self.waypoints
            .iter()
            .filter(|p| p.visited && p.waypoint.role != Some(WaypointRole::Start))
            .count() as u32
    }

    pub fn has_started(&self) -> bool {
        self.waypoints.iter().any(|p| p.visited)
    }

    pub fn reset_score(&mut self) {
        for p in &mut self.waypoints {
            p.visited = false;
        }
    }

    #[cfg(test)]
    pub fn positions(&self) -> &[RiderPosition] {
        &self.positions
    }

    #[cfg(test)]
    pub fn waypoints(&self) -> &[PlayerWaypoint] {
        &self.waypoints
    }
}
