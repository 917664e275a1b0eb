//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::backend::selector::{AvailableBackend, BackendStatus};
use crate::domain::{BackendKind, Difficulty, RoundState};

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    UpdateText {
        text: String,
    },
    SubmitGuess {
        #[serde(default)]
        text: Option<String>,
    },
    NextRound,
    ResetGame,
    ChangeDifficulty {
        difficulty: Difficulty,
    },
    GetState,
    BackendStatus,
    SelectBackend {
        kind: BackendKind,
    },
    Rules,
}

impl ClientWsMessage {
    /// Wire tag, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientWsMessage::Ping => "ping",
            ClientWsMessage::UpdateText { .. } => "update_text",
            ClientWsMessage::SubmitGuess { .. } => "submit_guess",
            ClientWsMessage::NextRound => "next_round",
            ClientWsMessage::ResetGame => "reset_game",
            ClientWsMessage::ChangeDifficulty { .. } => "change_difficulty",
            ClientWsMessage::GetState => "get_state",
            ClientWsMessage::BackendStatus => "backend_status",
            ClientWsMessage::SelectBackend { .. } => "select_backend",
            ClientWsMessage::Rules => "rules",
        }
    }

    /// Length of the player's description carried by the message, if any.
    pub fn text_len(&self) -> Option<usize> {
        match self {
            ClientWsMessage::UpdateText { text } => Some(text.chars().count()),
            ClientWsMessage::SubmitGuess { text } => text.as_ref().map(|t| t.chars().count()),
            _ => None,
        }
    }
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    State {
        #[serde(rename = "sessionId")]
        session_id: String,
        state: RoundState,
    },
    Backends {
        backends: BackendsOut,
    },
    Rules {
        rules: RulesOut,
    },
    Error {
        message: String,
    },
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize, Default)]
pub struct NewGameIn {
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
}

#[derive(Debug, Serialize)]
pub struct GameOut {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub state: RoundState,
}

#[derive(Debug, Deserialize)]
pub struct TextIn {
    pub text: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct GuessIn {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DifficultyIn {
    pub difficulty: Difficulty,
}

#[derive(Debug, Deserialize)]
pub struct SelectBackendIn {
    pub kind: BackendKind,
}

#[derive(Deserialize)]
pub struct ApiKeyIn {
    #[serde(rename = "apiKey", default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BackendsOut {
    #[serde(flatten)]
    pub status: BackendStatus,
    pub available: Vec<AvailableBackend>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RulesOut {
    pub steps: Vec<&'static str>,
    pub tips: Vec<&'static str>,
}

/// Rules and tips shown next to the board.
pub fn game_rules() -> RulesOut {
    RulesOut {
        steps: vec![
            "画面に表示されたお題の言葉を確認しましょう",
            "お題の言葉を使わずにその特徴を説明してください",
            "AIがあなたの説明から答えを推測します",
            "AIの推測が正解なら成功！結果を表示します",
        ],
        tips: vec![
            "具体的な特徴や用途を説明する",
            "色、形、大きさなどの外見を描写する",
            "関連する場所や状況を説明する",
            "お題の言葉は絶対に使わない",
        ],
    }
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}
