use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures::future::join_all;

use crate::quest::QuestInstance;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/worlds/{world}/points", get(get_points))
        .route("/worlds/{world}/info", get(get_info))
        .route("/status", get(get_status))
        .with_state(state)
}

fn quest_for(state: &AppState, world: u32) -> Result<Arc<QuestInstance>, StatusCode> {
    state.quest(world).ok_or(StatusCode::NOT_FOUND)
}

async fn get_points(
    State(state): State<AppState>,
    Path(world): Path<u32>,
) -> Result<impl IntoResponse, StatusCode> {
    let quest = quest_for(&state, world)?;
    Ok(Json(quest.get().await))
}

async fn get_info(
    State(state): State<AppState>,
    Path(world): Path<u32>,
) -> Result<impl IntoResponse, StatusCode> {
    let quest = quest_for(&state, world)?;
    Ok(Json(quest.info_panel().await))
}

async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    let statuses = join_all(state.quests.values().map(|quest| quest.status())).await;
    Json(statuses)
}
