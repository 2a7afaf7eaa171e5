//! Endpoints driving the analysis orchestrator
//!
//! Commands are queued and acknowledged with `202 Accepted`; their effect
//! shows up in `GET /state`.

use axum::{extract::rejection::JsonRejection, extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use chess_replay_core::{AnalysisSettings, AnalysisState, Command, NavTarget};

use super::ApiError;
use crate::AppState;

type Accepted = Result<StatusCode, ApiError>;

#[derive(Debug, Deserialize)]
pub struct VariationRequest {
    /// Index into the displayed lines, best first
    pub line: usize,
    pub ply: usize,
}

#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    pub uci: String,
}

async fn accept(state: &AppState, command: Command) -> Accepted {
    state.analysis.send(command).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn current_state(State(state): State<Arc<AppState>>) -> Json<AnalysisState> {
    Json(state.analysis.state())
}

pub async fn load_game(
    State(state): State<Arc<AppState>>,
    pgn: String,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let moves = state.analysis.load_pgn(&pgn).await?;
    info!(moves, "game submitted");
    Ok((StatusCode::ACCEPTED, Json(json!({ "moves": moves }))))
}

pub async fn clear_game(State(state): State<Arc<AppState>>) -> Accepted {
    accept(&state, Command::Clear).await
}

/// Body is a tagged target: `{"to":"next"}`, `{"to":"move","index":3}`.
/// `{"to":"start"}` (or `{"to":"move","index":null}`) shows the position
/// before the first move.
pub async fn navigate(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NavTarget>, JsonRejection>,
) -> Accepted {
    let Json(target) = payload?;
    accept(&state, Command::Navigate(target)).await
}

pub async fn biggest_change(State(state): State<Arc<AppState>>) -> Accepted {
    accept(&state, Command::JumpToBiggestChange).await
}

pub async fn enter_variation(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<VariationRequest>, JsonRejection>,
) -> Accepted {
    let Json(request) = payload?;
    let command = Command::EnterVariation {
        line: request.line,
        ply: request.ply,
    };
    accept(&state, command).await
}

pub async fn play_move(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<MoveRequest>, JsonRejection>,
) -> Accepted {
    let Json(request) = payload?;
    let command = Command::play_uci(&request.uci)?;
    accept(&state, command).await
}

pub async fn return_to_game(State(state): State<Arc<AppState>>) -> Accepted {
    accept(&state, Command::ReturnToGame).await
}

pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AnalysisSettings>, JsonRejection>,
) -> Accepted {
    let Json(settings) = payload?;
    info!(engine = %settings.engine_path, "settings updated");
    accept(&state, Command::UpdateSettings(settings)).await
}
