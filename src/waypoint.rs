use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WaypointRole {
    Start,
    Finish,
}

/// Identity of a waypoint across quest reloads.
///
/// Derived once from the source definition (role plus the exact source
/// latitude/longitude), so a refetch of the same quest yields the same keys
/// regardless of how the projected coordinates round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaypointKey {
    role: Option<WaypointRole>,
    lat_bits: u64,
    long_bits: u64,
}

impl WaypointKey {
    pub fn new(role: Option<WaypointRole>, lat: f64, long: f64) -> Self {
        Self {
            role,
            lat_bits: lat.to_bits(),
            long_bits: long.to_bits(),
        }
    }
}

/// A quest waypoint in map-plane coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Waypoint {
    #[serde(skip)]
    pub key: WaypointKey,
    pub name: String,
    pub x: f64,
    pub y: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<WaypointRole>,
    pub rotate: f64,
    pub size: f64,
    pub image: &'static str,
}

impl Waypoint {
    pub fn is_ordinary(&self) -> bool {
        self.role.is_none()
    }
}
