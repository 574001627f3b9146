/// Metres per degree of latitude.
const LAT_DEGREE_METRES: f64 = 110_614.71;
/// Metres per degree of longitude at the equator.
const LONG_DEGREE_METRES_EQUATOR: f64 = 111_320.0;

/// Fixed projection parameters for one world.
///
/// Quest sources publish coordinates in the same frame as the world's
/// centre, so the centre is the whole per-world offset: it is subtracted
/// from every source coordinate before scaling.
#[derive(Debug, Clone, Copy)]
pub struct WorldMap {
    pub name: &'static str,
    pub center_lat: f64,
    pub center_long: f64,
    /// Marker rotation hint for waypoints drawn on this world.
    pub rotate: f64,
}

static WORLDS: [(u32, WorldMap); 3] = [
    (
        1,
        WorldMap {
            name: "Watopia",
            center_lat: -11.644904,
            center_long: 166.95293,
            rotate: 90.0,
        },
    ),
    (
        2,
        WorldMap {
            name: "Richmond",
            center_lat: 37.543,
            center_long: -77.4374,
            rotate: 90.0,
        },
    ),
    (
        3,
        WorldMap {
            name: "London",
            center_lat: 51.501705,
            center_long: -0.16794094,
            rotate: 0.0,
        },
    ),
];

pub fn world_map(world: u32) -> Option<&'static WorldMap> {
    WORLDS.iter().find(|(id, _)| *id == world).map(|(_, map)| map)
}

pub fn world_name(world: u32) -> Option<&'static str> {
    world_map(world).map(|m| m.name)
}

/// Converts geographic coordinates into map-plane coordinates.
pub trait CoordinateMapper: Send + Sync {
    /// Returns `None` for worlds the mapper has no projection for.
    fn to_xy(&self, world: u32, lat: f64, long: f64) -> Option<(f64, f64)>;

    fn rotation(&self, world: u32) -> f64;
}

/// Equirectangular projection around each world's centre, in centimetres.
#[derive(Debug, Default, Clone, Copy)]
pub struct WorldMapper;

impl CoordinateMapper for WorldMapper {
    fn to_xy(&self, world: u32, lat: f64, long: f64) -> Option<(f64, f64)> {
        let map = world_map(world)?;
        let long_degree = LONG_DEGREE_METRES_EQUATOR * map.center_lat.to_radians().cos();

        let x = (lat - map.center_lat) * LAT_DEGREE_METRES * 100.0;
        let y = (long - map.center_long) * long_degree * 100.0;
        Some((x, y))
    }

    fn rotation(&self, world: u32) -> f64 {
        world_map(world).map(|m| m.rotate).unwrap_or(0.0)
    }
}
