use std::str::FromStr;

use chrono::Duration;
use thiserror::Error;

use crate::mapping;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid worlds list: {0}")]
    InvalidWorlds(String),

    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: String, value: String },
}

const DEFAULT_WAYPOINTS_URL: &str = "http://zwiftquest.com/wp-content/uploads/2018/02/waypoints.txt";

/// Who gets credited in the info panel.
#[derive(Debug, Clone)]
pub struct CreditConfig {
    pub prompt: String,
    pub name: String,
    pub href: String,
}

/// Timing knobs for one quest instance.
#[derive(Debug, Clone)]
pub struct Timing {
    /// Minimum gap between two poll cycles.
    pub poll_interval: Duration,
    /// How long before the event start scoring is frozen.
    pub warmup: Duration,
    /// Minimum gap between two event schedule lookups.
    pub event_check_interval: Duration,
    pub quest_ttl: Duration,
    pub player_ttl: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            poll_interval: Duration::milliseconds(2500),
            warmup: Duration::minutes(10),
            event_check_interval: Duration::seconds(30),
            quest_ttl: Duration::minutes(30),
            player_ttl: Duration::minutes(600),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub worlds: Vec<u32>,
    pub listen_addr: String,
    pub waypoints_url: String,
    /// Live position feed; no polling happens without it.
    pub positions_url: Option<String>,
    /// Event schedule; scoring is never frozen without it.
    pub events_url: Option<String>,
    pub event_name: String,
    pub timing: Timing,
    pub sweep_interval: std::time::Duration,
    /// Crossing radius in map units.
    pub visit_radius: f64,
    pub credit: CreditConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let worlds_str = lookup("WAYPOINTER_WORLDS").unwrap_or_else(|| "1,2,3".into());
        let worlds: Vec<u32> = worlds_str
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(|s| {
                let world = s
                    .trim()
                    .parse::<u32>()
                    .map_err(|e| ConfigError::InvalidWorlds(format!("{s}: {e}")))?;
                if mapping::world_name(world).is_none() {
                    return Err(ConfigError::InvalidWorlds(format!("unknown world {world}")));
                }
                Ok(world)
            })
            .collect::<Result<Vec<_>, _>>()?;

        if worlds.is_empty() {
            return Err(ConfigError::InvalidWorlds("at least one world required".into()));
        }

        let listen_addr = lookup("WAYPOINTER_LISTEN_ADDR").unwrap_or_else(|| "0.0.0.0:8091".into());
        let waypoints_url =
            lookup("WAYPOINTER_WAYPOINTS_URL").unwrap_or_else(|| DEFAULT_WAYPOINTS_URL.into());
        let positions_url = lookup("WAYPOINTER_POSITIONS_URL").filter(|s| !s.is_empty());
        let events_url = lookup("WAYPOINTER_EVENTS_URL").filter(|s| !s.is_empty());
        let event_name = lookup("WAYPOINTER_EVENT_NAME").unwrap_or_else(|| "zwiftquest".into());

        let defaults = Timing::default();
        let timing = Timing {
            poll_interval: duration(&lookup, "WAYPOINTER_POLL_INTERVAL_MS", Duration::try_milliseconds)?
                .unwrap_or(defaults.poll_interval),
            warmup: duration(&lookup, "WAYPOINTER_WARMUP_MINUTES", Duration::try_minutes)?
                .unwrap_or(defaults.warmup),
            event_check_interval: duration(&lookup, "WAYPOINTER_EVENT_CHECK_SECS", Duration::try_seconds)?
                .unwrap_or(defaults.event_check_interval),
            quest_ttl: duration(&lookup, "WAYPOINTER_QUEST_TTL_MINUTES", Duration::try_minutes)?
                .unwrap_or(defaults.quest_ttl),
            player_ttl: duration(&lookup, "WAYPOINTER_PLAYER_TTL_MINUTES", Duration::try_minutes)?
                .unwrap_or(defaults.player_ttl),
        };

        let sweep_secs: u64 = checked(&lookup, "WAYPOINTER_SWEEP_SECS", |secs: &u64| *secs > 0)?.unwrap_or(120);
        let sweep_interval = std::time::Duration::from_secs(sweep_secs);
        let visit_radius = checked(&lookup, "WAYPOINTER_VISIT_RADIUS", |r: &f64| r.is_finite() && *r > 0.0)?
            .unwrap_or(2000.0);

        let credit = CreditConfig {
            prompt: "Event details at".into(),
            name: lookup("WAYPOINTER_CREDIT_NAME").unwrap_or_else(|| "ZwiftQuest".into()),
            href: lookup("WAYPOINTER_CREDIT_URL").unwrap_or_else(|| "http://zwiftquest.com/".into()),
        };

        Ok(Config {
            worlds,
            listen_addr,
            waypoints_url,
            positions_url,
            events_url,
            event_name,
            timing,
            sweep_interval,
            visit_radius,
            credit,
        })
    }
}

fn parsed<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>, ConfigError> {
    match lookup(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { name: name.into(), value }),
    }
}

/// Parse a number that must pass `valid`.
fn checked<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    valid: impl Fn(&T) -> bool,
) -> Result<Option<T>, ConfigError> {
    match parsed::<T>(lookup, name)? {
        Some(value) if !valid(&value) => Err(invalid(lookup, name)),
        other => Ok(other),
    }
}

/// Parse a strictly positive whole number of `unit`s into a duration.
/// Values that overflow `chrono::Duration` are rejected.
fn duration(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    unit: fn(i64) -> Option<Duration>,
) -> Result<Option<Duration>, ConfigError> {
    match checked::<i64>(lookup, name, |n| *n > 0)? {
        None => Ok(None),
        Some(n) => unit(n).map(Some).ok_or_else(|| invalid(lookup, name)),
    }
}

fn invalid(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.into(),
        value: lookup(name).unwrap_or_default(),
    }
}
