//! Domain models used by the backend: difficulty tiers, backend kinds, round state.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Topic pool tier. Also changes how the guess prompt frames vocabulary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
  /// Concrete, everyday words.
  #[default]
  #[serde(alias = "easy")]
  Normal,
  /// Abstract and emotional words.
  Hard,
}

impl Difficulty {
  pub fn as_str(&self) -> &'static str {
    match self {
      Difficulty::Normal => "normal",
      Difficulty::Hard => "hard",
    }
  }
}

impl fmt::Display for Difficulty {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Difficulty {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "normal" | "easy" => Ok(Difficulty::Normal),
      "hard" => Ok(Difficulty::Hard),
      other => Err(format!("unknown difficulty '{}'", other)),
    }
  }
}

/// Which text-generation backend serves a prompt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
  /// Model running on this machine (Ollama-compatible server).
  #[serde(alias = "local", alias = "local-model", alias = "ollama")]
  LocalModel,
  /// Hosted chat-completions API (OpenAI).
  #[serde(alias = "hosted", alias = "hosted-model", alias = "openai")]
  HostedModel,
}

impl BackendKind {
  pub const ALL: [BackendKind; 2] = [BackendKind::LocalModel, BackendKind::HostedModel];

  pub fn as_str(&self) -> &'static str {
    match self {
      BackendKind::LocalModel => "local_model",
      BackendKind::HostedModel => "hosted_model",
    }
  }
}

impl fmt::Display for BackendKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for BackendKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
      "local" | "local_model" | "ollama" => Ok(BackendKind::LocalModel),
      "hosted" | "hosted_model" | "openai" => Ok(BackendKind::HostedModel),
      other => Err(format!("unknown backend '{}'", other)),
    }
  }
}

/// Result of the last resolved attempt in the current round.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
  #[default]
  Unknown,
  Correct,
  Incorrect,
}

/// Parsed OK/NG judgment of the validation step. Derived per attempt, never stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationVerdict {
  pub valid: bool,
  pub reason: Option<String>,
}

/// Everything the UI needs to render one game session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundState {
  pub secret_topic: String,
  pub user_text: String,
  pub last_response_text: String,
  pub pending: bool,
  pub outcome: Outcome,
  pub score: u32,
  pub attempts: u32,
  pub difficulty: Difficulty,
}

impl RoundState {
  pub fn new(secret_topic: String, difficulty: Difficulty) -> Self {
    Self {
      secret_topic,
      user_text: String::new(),
      last_response_text: String::new(),
      pending: false,
      outcome: Outcome::Unknown,
      score: 0,
      attempts: 0,
      difficulty,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn backend_kind_accepts_config_spellings() {
    assert_eq!("local-model".parse::<BackendKind>(), Ok(BackendKind::LocalModel));
    assert_eq!("Ollama".parse::<BackendKind>(), Ok(BackendKind::LocalModel));
    assert_eq!("openai".parse::<BackendKind>(), Ok(BackendKind::HostedModel));
    assert!("gemini".parse::<BackendKind>().is_err());
  }

  #[test]
  fn round_state_serializes_camel_case() {
    let st = RoundState::new("猫".into(), Difficulty::Hard);
    let v = serde_json::to_value(&st).unwrap();
    assert_eq!(v["secretTopic"], "猫");
    assert_eq!(v["outcome"], "unknown");
    assert_eq!(v["difficulty"], "hard");
    assert_eq!(v["lastResponseText"], "");
  }
}
