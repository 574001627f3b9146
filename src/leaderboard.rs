use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::CreditConfig;
use crate::player::{Player, RiderIdentity};

#[derive(Debug, Clone, Serialize)]
pub struct Credit {
    pub prompt: String,
    pub name: String,
    pub href: String,
}

impl From<&CreditConfig> for Credit {
    fn from(c: &CreditConfig) -> Self {
        Self {
            prompt: c.prompt.clone(),
            name: c.name.clone(),
            href: c.href.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreEntry {
    pub rider: RiderIdentity,
    pub score: u32,
    pub last_score: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BannerText {
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Messages {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub list: Vec<BannerText>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoPanel {
    pub details: Credit,
    pub scores: Option<Vec<ScoreEntry>>,
    pub show_waypoints: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Messages>,
}

/// Started players, best score first; equal scores rank whoever got there first.
pub fn rank<'a>(players: impl IntoIterator<Item = &'a Player>) -> Vec<ScoreEntry> {
    let mut scores: Vec<ScoreEntry> = players
        .into_iter()
        .filter(|p| p.has_started())
        .map(|p| ScoreEntry {
            rider: p.rider.clone(),
            score: p.score(),
            last_score: p.last_score,
        })
        .collect();
    scores.sort_by(|a, b| b.score.cmp(&a.score).then(a.last_score.cmp(&b.last_score)));
    scores
}

pub fn info_panel(credit: Credit, scores: Vec<ScoreEntry>, status: Option<String>) -> InfoPanel {
    let show_waypoints = scores.is_empty();
    InfoPanel {
        details: credit,
        scores: (!scores.is_empty()).then_some(scores),
        show_waypoints,
        messages: status.map(|text| Messages {
            kind: "banner",
            list: vec![BannerText { text }],
        }),
    }
}
