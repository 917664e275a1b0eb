//! WebSocket upgrade + message loop. Each connection owns one game session.
//! Every client message is parsed as JSON and answered with a single JSON message.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{info, error, instrument, debug};

use crate::error::ApiError;
use crate::logic::*;
use crate::protocol::{game_rules, ClientWsMessage, ServerWsMessage};
use crate::state::{AppState, GameSession};

#[instrument(level = "info", skip(ws, state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "kotoba_quiz", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  let session = state.create_session(None).await;
  info!(target: "kotoba_quiz", session = %session.id, "WebSocket connected");

  // Greet with the initial round so the client can render immediately.
  let hello = state_msg(&session, Ok(session.snapshot()));
  if send_json(&mut socket, &hello).await.is_err() {
    let _ = state.remove_session(&session.id).await;
    return;
  }

  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "kotoba_quiz", kind = incoming.kind(), text_len = ?incoming.text_len(), "WS received");
            handle_client_ws(incoming, &state, &session).await
          }
          Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) },
        };

        if let Err(e) = send_json(&mut socket, &reply_msg).await {
          error!(target: "kotoba_quiz", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }

  let _ = state.remove_session(&session.id).await;
  info!(target: "kotoba_quiz", session = %session.id, "WebSocket disconnected");
}

async fn send_json(socket: &mut WebSocket, msg: &ServerWsMessage) -> Result<(), axum::Error> {
  let out = serde_json::to_string(msg).unwrap_or_else(|e| {
    serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
  });
  socket.send(Message::Text(out)).await
}

fn state_msg(session: &GameSession, st: Result<crate::domain::RoundState, ApiError>) -> ServerWsMessage {
  match st {
    Ok(state) => ServerWsMessage::State { session_id: session.id.clone(), state },
    Err(e) => ServerWsMessage::Error { message: e.to_string() },
  }
}

#[instrument(level = "info", skip(msg, state, session), fields(session = %session.id, kind = msg.kind(), text_len = ?msg.text_len()))]
async fn handle_client_ws(msg: ClientWsMessage, state: &AppState, session: &GameSession) -> ServerWsMessage {
  match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    ClientWsMessage::GetState => state_msg(session, Ok(session.snapshot())),

    ClientWsMessage::UpdateText { text } => state_msg(session, session.update_user_text(&text)),

    ClientWsMessage::SubmitGuess { text } => {
      let res = session.submit_guess(text.as_deref()).await;
      if let Ok(st) = &res {
        info!(target: "round", outcome = ?st.outcome, score = st.score, attempts = st.attempts, "WS guess evaluated");
      }
      state_msg(session, res)
    }

    ClientWsMessage::NextRound => state_msg(session, session.advance_round()),

    ClientWsMessage::ResetGame => state_msg(session, session.reset_game()),

    ClientWsMessage::ChangeDifficulty { difficulty } => state_msg(session, session.change_difficulty(difficulty)),

    ClientWsMessage::BackendStatus => ServerWsMessage::Backends { backends: backends_overview(state).await },

    ClientWsMessage::SelectBackend { kind } => match select_backend(state, kind).await {
      Ok(backends) => ServerWsMessage::Backends { backends },
      Err(e) => ServerWsMessage::Error { message: e.to_string() },
    },

    ClientWsMessage::Rules => ServerWsMessage::Rules { rules: game_rules() },
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::backend::testing::ScriptedFactory;
  use crate::config::GameConfig;
  use crate::domain::Outcome;

  #[tokio::test]
  async fn dispatches_session_messages() {
    let f = ScriptedFactory::new(true, false);
    f.local.push(Ok("NG: お題そのものです"));
    let mut cfg = GameConfig::default();
    cfg.topics.normal = vec!["桜".into()];
    let state = AppState::with_factory(cfg, f.clone());
    let session = state.create_session(None).await;

    let reply = handle_client_ws(ClientWsMessage::SubmitGuess { text: Some("桜です".into()) }, &state, &session).await;
    match reply {
      ServerWsMessage::State { state: st, .. } => {
        assert_eq!(st.outcome, Outcome::Incorrect);
        assert_eq!(st.last_response_text, "ルール違反: お題そのものです");
      }
      other => panic!("unexpected reply: {:?}", other),
    }

    assert!(matches!(handle_client_ws(ClientWsMessage::Ping, &state, &session).await, ServerWsMessage::Pong));
    assert!(matches!(
      handle_client_ws(ClientWsMessage::Rules, &state, &session).await,
      ServerWsMessage::Rules { .. }
    ));
  }
}
