use chrono::{DateTime, Duration, Utc};

use crate::feed::RiderPosition;
use crate::waypoint::Waypoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Visit {
    pub time: DateTime<Utc>,
}

/// Decides whether a rider passed a waypoint on the way to `current`.
pub trait CrossingDetector: Send + Sync {
    fn check_visited(
        &self,
        current: &RiderPosition,
        history: &[RiderPosition],
        waypoint: &Waypoint,
    ) -> Option<Visit>;
}

/// Counts a visit when the path from the last known position to the current
/// one comes within `radius` of the waypoint.
#[derive(Debug, Clone, Copy)]
pub struct ProximityDetector {
    pub radius: f64,
}

impl ProximityDetector {
    pub fn new(radius: f64) -> Self {
        Self { radius }
    }
}

impl CrossingDetector for ProximityDetector {
    fn check_visited(
        &self,
        current: &RiderPosition,
        history: &[RiderPosition],
        waypoint: &Waypoint,
    ) -> Option<Visit> {
        let Some(previous) = history.last() else {
            let d = distance((current.x, current.y), (waypoint.x, waypoint.y));
            return (d <= self.radius).then_some(Visit { time: current.time });
        };

        let (t, d) = closest_approach(
            (previous.x, previous.y),
            (current.x, current.y),
            (waypoint.x, waypoint.y),
        );
        if d > self.radius {
            return None;
        }

        // Interpolate the crossing time along the segment
        let span = current.time - previous.time;
        let offset_ms = (span.num_milliseconds() as f64 * t).round() as i64;
        Some(Visit {
            time: previous.time + Duration::milliseconds(offset_ms),
        })
    }
}

fn distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

/// Parameter `t` in [0, 1] of the point on segment `a`-`b` nearest to `p`,
/// and the distance from `p` to that point.
fn closest_approach(a: (f64, f64), b: (f64, f64), p: (f64, f64)) -> (f64, f64) {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq == 0.0 {
        0.0
    } else {
        (((p.0 - a.0) * dx + (p.1 - a.1) * dy) / len_sq).clamp(0.0, 1.0)
    };
    let nearest = (a.0 + t * dx, a.1 + t * dy);
    (t, distance(nearest, p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waypoint::fixtures::waypoint;

    fn at(x: f64, y: f64, secs: i64) -> RiderPosition {
        let t0 = DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        RiderPosition {
            id: 1,
            first_name: "Ann".into(),
            last_name: "Lee".into(),
            x,
            y,
            time: t0 + Duration::seconds(secs),
        }
    }

    #[test]
    fn test_first_sample_on_waypoint() {
        let detector = ProximityDetector::new(50.0);
        let wp = waypoint("A", 0.0, 0.0, None);
        assert!(detector.check_visited(&at(30.0, 30.0, 0), &[], &wp).is_some());
        assert!(detector.check_visited(&at(60.0, 0.0, 0), &[], &wp).is_none());
    }

    #[test]
    fn test_segment_passes_waypoint() {
        let detector = ProximityDetector::new(50.0);
        let wp = waypoint("B", 500.0, 10.0, None);
        let history = [at(0.0, 0.0, 0)];
        let visit = detector.check_visited(&at(1000.0, 0.0, 10), &history, &wp).unwrap();
        // Halfway along a 10 s segment
        assert_eq!(visit.time, at(0.0, 0.0, 5).time);
    }

    #[test]
    fn test_segment_misses_waypoint() {
        let detector = ProximityDetector::new(50.0);
        let wp = waypoint("B", 500.0, 200.0, None);
        let history = [at(0.0, 0.0, 0)];
        assert!(detector.check_visited(&at(1000.0, 0.0, 10), &history, &wp).is_none());
    }

    #[test]
    fn test_closest_approach_clamps_to_segment() {
        let (t, d) = closest_approach((0.0, 0.0), (10.0, 0.0), (20.0, 0.0));
        assert_eq!(t, 1.0);
        assert_eq!(d, 10.0);
    }
}
