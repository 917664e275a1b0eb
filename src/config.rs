//! Loading game configuration (backends, prompts, topic pools) from TOML + env.
//!
//! Precedence: env variables > TOML file at GAME_CONFIG_PATH > built-in defaults.
//! Any IO/parse problem is logged and the defaults are kept, so startup never blocks.

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::domain::{BackendKind, Difficulty};
use crate::topics::TopicOrder;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct GameConfig {
  #[serde(default)]
  pub game: GameSection,
  #[serde(default)]
  pub hosted: HostedConfig,
  #[serde(default)]
  pub local: LocalConfig,
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub topics: TopicsConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct GameSection {
  pub preferred_backend: BackendKind,
  pub difficulty: Difficulty,
  pub topic_order: TopicOrder,
  /// Fixed seed for the random topic order (handy for demos and tests).
  pub rng_seed: Option<u64>,
}

impl Default for GameSection {
  fn default() -> Self {
    Self {
      preferred_backend: BackendKind::LocalModel,
      difficulty: Difficulty::Normal,
      topic_order: TopicOrder::Random,
      rng_seed: None,
    }
  }
}

impl GameSection {
  /// Preferred backend first, then every other kind in declaration order.
  pub fn backend_order(&self) -> Vec<BackendKind> {
    let mut order = vec![self.preferred_backend];
    order.extend(BackendKind::ALL.iter().copied().filter(|k| *k != self.preferred_backend));
    order
  }
}

/// Hosted chat-completions API (OpenAI).
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct HostedConfig {
  pub api_key: Option<String>,
  pub base_url: String,
  pub model: String,
  pub temperature: f32,
  pub max_tokens: u32,
  pub timeout_secs: u64,
}

impl Default for HostedConfig {
  fn default() -> Self {
    Self {
      api_key: None,
      base_url: "https://api.openai.com/v1".into(),
      model: "gpt-4o-mini".into(),
      temperature: 0.7,
      max_tokens: 500,
      timeout_secs: 20,
    }
  }
}

/// Ollama-compatible model server on the local machine.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
  pub host: String,
  pub model: String,
  pub system_prompt: String,
  pub temperature: f32,
  pub top_k: u32,
  pub timeout_secs: u64,
  pub probe_timeout_ms: u64,
}

impl Default for LocalConfig {
  fn default() -> Self {
    Self {
      host: "http://localhost:11434".into(),
      model: "gemma2:2b".into(),
      system_prompt: "あなたは言葉当てゲームのプレイヤーです。指示に従い、簡潔に日本語で回答してください。".into(),
      temperature: 0.7,
      top_k: 3,
      timeout_secs: 60,
      probe_timeout_ms: 800,
    }
  }
}

/// Prompt templates. Placeholders: `{user_text}`, `{secret_word}`, `{difficulty}`,
/// `{difficulty_framing}`. Override in TOML to tune tone/structure.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub validation_template: String,
  pub guess_template: String,
  pub normal_framing: String,
  pub hard_framing: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      validation_template: r#"あなたは言葉当てゲームの審判です。プレイヤーはお題の単語を直接使わずに、その単語を説明しなければなりません。

お題の単語: 「{secret_word}」
難易度: {difficulty}
プレイヤーの説明: 「{user_text}」

次のいずれかに当てはまる場合はルール違反です:
1. お題の単語そのものが含まれている
2. お題の単語の別表記（ひらがな・カタカナ・漢字・ローマ字）が含まれている
3. お題の単語の他言語での表現（英語訳など）が含まれている
4. お題の単語の一部がそのまま含まれている

ルール違反がなければ「OK」とだけ答えてください。
ルール違反があれば「NG: 理由」の形式で、理由を一文で答えてください。
回答は必ず OK または NG から始めてください。"#
        .into(),
      guess_template: r#"あなたは言葉当てゲームの回答者です。プレイヤーがある単語を、その単語を使わずに説明しています。
{difficulty_framing}

プレイヤーの説明: 「{user_text}」

説明が指している単語を日本語で1つだけ答えてください。説明や記号は付けず、単語だけを出力してください。"#
        .into(),
      normal_framing: "お題は身近で具体的な言葉です（食べ物、生き物、自然、乗り物、日用品など）。".into(),
      hard_framing: "お題は抽象的な言葉です（感情、気持ち、状態、概念など）。目に見えないものも候補に含めて考えてください。".into(),
    }
  }
}

/// Optional topic pools. Empty lists fall back to the built-in pools.
#[derive(Clone, Debug, Deserialize, Default)]
#[serde(default)]
pub struct TopicsConfig {
  pub normal: Vec<String>,
  pub hard: Vec<String>,
}

impl GameConfig {
  /// Parse a TOML document.
  pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
    toml::from_str::<GameConfig>(s)
  }

  /// Apply env overrides using the given lookup (std::env::var in production).
  pub fn apply_env<F>(&mut self, lookup: F)
  where
    F: Fn(&str) -> Option<String>,
  {
    if let Some(v) = lookup("PREFERRED_BACKEND") {
      match v.parse::<BackendKind>() {
        Ok(kind) => self.game.preferred_backend = kind,
        Err(e) => warn!(target: "kotoba_quiz", error = %e, "Ignoring PREFERRED_BACKEND"),
      }
    }
    if let Some(v) = lookup("DEFAULT_DIFFICULTY") {
      match v.parse::<Difficulty>() {
        Ok(d) => self.game.difficulty = d,
        Err(e) => warn!(target: "kotoba_quiz", error = %e, "Ignoring DEFAULT_DIFFICULTY"),
      }
    }
    if let Some(v) = lookup("TOPIC_ORDER") {
      match v.parse::<TopicOrder>() {
        Ok(o) => self.game.topic_order = o,
        Err(e) => warn!(target: "kotoba_quiz", error = %e, "Ignoring TOPIC_ORDER"),
      }
    }
    if let Some(key) = lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty()) {
      self.hosted.api_key = Some(key);
    }
    if let Some(v) = lookup("OPENAI_BASE_URL") { self.hosted.base_url = v; }
    if let Some(v) = lookup("OPENAI_MODEL") { self.hosted.model = v; }
    if let Some(v) = lookup("LOCAL_MODEL_URL") { self.local.host = v; }
    if let Some(v) = lookup("LOCAL_MODEL_NAME") { self.local.model = v; }
  }
}

/// Attempt to load `GameConfig` from GAME_CONFIG_PATH, then apply env overrides.
pub fn load_game_config_from_env() -> GameConfig {
  let mut cfg = match std::env::var("GAME_CONFIG_PATH") {
    Ok(path) => match std::fs::read_to_string(&path) {
      Ok(s) => match GameConfig::from_toml_str(&s) {
        Ok(cfg) => {
          info!(target: "kotoba_quiz", %path, "Loaded game config (TOML)");
          cfg
        }
        Err(e) => {
          error!(target: "kotoba_quiz", %path, error = %e, "Failed to parse TOML config; using defaults");
          GameConfig::default()
        }
      },
      Err(e) => {
        error!(target: "kotoba_quiz", %path, error = %e, "Failed to read TOML config file; using defaults");
        GameConfig::default()
      }
    },
    Err(_) => GameConfig::default(),
  };
  cfg.apply_env(|k| std::env::var(k).ok());
  cfg
}
