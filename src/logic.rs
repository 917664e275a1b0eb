//! Behaviors shared by both HTTP and WebSocket handlers that are not tied to a
//! single game session: backend inspection and switching.

use tracing::{info, instrument};

use crate::domain::BackendKind;
use crate::error::ApiError;
use crate::protocol::BackendsOut;
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn backends_overview(state: &AppState) -> BackendsOut {
  let available = state.selector.available_kinds().await;
  let status = state.selector.status().await;
  BackendsOut { status, available }
}

#[instrument(level = "info", skip(state), fields(%kind))]
pub async fn select_backend(state: &AppState, kind: BackendKind) -> Result<BackendsOut, ApiError> {
  let b = state.selector.select_specific(kind).await?;
  info!(target: "backend", %kind, name = %b.name(), "Backend switched by client");
  Ok(backends_overview(state).await)
}

/// New hosted credential; if nothing is live yet, try to pick a backend right away.
#[instrument(level = "info", skip(state, api_key), fields(has_key = api_key.is_some()))]
pub async fn update_hosted_api_key(state: &AppState, api_key: Option<String>) -> BackendsOut {
  state.selector.set_hosted_api_key(api_key).await;
  if state.selector.status().await.active.is_none() {
    if let Err(e) = state.selector.select_best().await {
      info!(target: "backend", error = %e, "Still no backend after credential change");
    }
  }
  backends_overview(state).await
}
