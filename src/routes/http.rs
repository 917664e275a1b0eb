//! HTTP endpoint handlers. These are thin wrappers that forward to sessions and core logic.
//! Each handler is instrumented and logs parameters and basic result info.

use std::sync::Arc;
use axum::{body::Bytes, extract::{Path, State}, http::StatusCode, Json, response::IntoResponse};
use serde::de::DeserializeOwned;
use tracing::{info, instrument, warn};

use crate::error::ApiError;
use crate::logic::*;
use crate::protocol::*;
use crate::state::AppState;

/// Optional JSON body: empty means defaults, anything else must parse.
fn optional_json<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
  if body.iter().all(u8::is_ascii_whitespace) {
    return Ok(T::default());
  }
  serde_json::from_slice(body).map_err(|e| {
    warn!(target: "kotoba_quiz", error = %e, body_len = body.len(), "Rejected malformed body");
    ApiError::BadRequest(e.to_string())
  })
}

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info")]
pub async fn http_get_rules() -> impl IntoResponse { Json(game_rules()) }

#[instrument(level = "info", skip(state, body))]
pub async fn http_new_game(
  State(state): State<Arc<AppState>>,
  body: Bytes,
) -> Result<(StatusCode, Json<GameOut>), ApiError> {
  let body: NewGameIn = optional_json(&body)?;
  let session = state.create_session(body.difficulty).await;
  info!(target: "round", session = %session.id, "HTTP game created");
  Ok((StatusCode::CREATED, Json(GameOut { session_id: session.id.clone(), state: session.snapshot() })))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_get_game(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<GameOut>, ApiError> {
  let session = state.session(&id).await?;
  Ok(Json(GameOut { session_id: id, state: session.snapshot() }))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_delete_game(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
  state.remove_session(&id).await?;
  Ok(StatusCode::NO_CONTENT)
}

#[instrument(level = "info", skip(state, body), fields(%id, text_len = body.text.len()))]
pub async fn http_post_text(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<TextIn>,
) -> Result<Json<GameOut>, ApiError> {
  let st = state.session(&id).await?.update_user_text(&body.text)?;
  Ok(Json(GameOut { session_id: id, state: st }))
}

#[instrument(level = "info", skip(state, body), fields(%id))]
pub async fn http_post_guess(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  body: Bytes,
) -> Result<Json<GameOut>, ApiError> {
  let body: GuessIn = optional_json(&body)?;
  let st = state.session(&id).await?.submit_guess(body.text.as_deref()).await?;
  info!(target: "round", session = %id, outcome = ?st.outcome, score = st.score, attempts = st.attempts, "HTTP guess evaluated");
  Ok(Json(GameOut { session_id: id, state: st }))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_post_next(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<GameOut>, ApiError> {
  let st = state.session(&id).await?.advance_round()?;
  Ok(Json(GameOut { session_id: id, state: st }))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_post_reset(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<GameOut>, ApiError> {
  let st = state.session(&id).await?.reset_game()?;
  Ok(Json(GameOut { session_id: id, state: st }))
}

#[instrument(level = "info", skip(state, body), fields(%id, difficulty = %body.difficulty))]
pub async fn http_post_difficulty(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<DifficultyIn>,
) -> Result<Json<GameOut>, ApiError> {
  let st = state.session(&id).await?.change_difficulty(body.difficulty)?;
  Ok(Json(GameOut { session_id: id, state: st }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_backends(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(backends_overview(&state).await)
}

#[instrument(level = "info", skip(state, body), fields(kind = %body.kind))]
pub async fn http_post_select_backend(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SelectBackendIn>,
) -> Result<Json<BackendsOut>, ApiError> {
  Ok(Json(select_backend(&state, body.kind).await?))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_post_api_key(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ApiKeyIn>,
) -> impl IntoResponse {
  Json(update_hosted_api_key(&state, body.api_key).await)
}
