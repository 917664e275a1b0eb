//! Round controller: validate-then-guess workflow over one game session.
//!
//! Flow of `submit_guess`:
//!   1) validation prompt -> backend -> `parse_verdict` (fail-closed on odd output)
//!   2) only on OK: guess prompt -> backend -> substring check against the secret
//! Every non-empty submission counts as exactly one attempt, whatever happens.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::backend::BackendSelector;
use crate::config::Prompts;
use crate::domain::{Difficulty, Outcome, RoundState, ValidationVerdict};
use crate::prompts::{build_guess_prompt, build_validation_prompt};
use crate::topics::TopicProvider;
use crate::util::trunc_for_log;

/// Shown when the validator answered with neither OK nor NG.
pub const UNJUDGED_REASON: &str = "入力を判定できませんでした。説明を変えてもう一度お試しください。";

const OK_TOKEN: &str = "OK";
const NG_TOKEN: &str = "NG";

/// Interpret the validator's free text.
///
/// Whichever of `OK` / `NG` occurs first wins. The NG reason is whatever follows
/// the token, minus a leading colon (ASCII or full-width) and whitespace.
/// Text with neither token is rejected with [`UNJUDGED_REASON`].
pub fn parse_verdict(text: &str) -> ValidationVerdict {
  let ok_at = text.find(OK_TOKEN);
  let ng_at = text.find(NG_TOKEN);

  let ng_first = match (ok_at, ng_at) {
    (Some(ok), Some(ng)) => ng < ok,
    (None, Some(_)) => true,
    (Some(_), None) => false,
    (None, None) => {
      warn!(target: "round", response_len = text.len(), "Malformed verdict; treating as NG");
      return ValidationVerdict { valid: false, reason: Some(UNJUDGED_REASON.to_string()) };
    }
  };

  if !ng_first {
    return ValidationVerdict { valid: true, reason: None };
  }

  let after = &text[ng_at.unwrap_or(0) + NG_TOKEN.len()..];
  let reason = after
    .trim_start()
    .trim_start_matches([':', '：'])
    .trim();
  ValidationVerdict {
    valid: false,
    reason: if reason.is_empty() { None } else { Some(reason.to_string()) },
  }
}

/// The guess is right when the raw response contains the secret word verbatim.
pub fn is_correct_guess(response: &str, secret: &str) -> bool {
  !secret.is_empty() && response.contains(secret)
}

/// User-facing text for a rejected description.
fn rejection_text(verdict: &ValidationVerdict) -> String {
  match &verdict.reason {
    Some(reason) => format!("ルール違反: {}", reason),
    None => "ルール違反: お題の言葉、またはそれに近い表現が含まれています。".to_string(),
  }
}

pub struct RoundController {
  state: RoundState,
  topics: TopicProvider,
  prompts: Prompts,
  selector: Arc<BackendSelector>,
}

impl RoundController {
  pub fn new(
    selector: Arc<BackendSelector>,
    prompts: Prompts,
    mut topics: TopicProvider,
    difficulty: Difficulty,
  ) -> Self {
    let first = topics.next_topic(difficulty);
    Self { state: RoundState::new(first, difficulty), topics, prompts, selector }
  }

  /// Read-only copy for rendering.
  pub fn snapshot(&self) -> RoundState {
    self.state.clone()
  }

  pub fn update_user_text(&mut self, text: &str) {
    self.state.user_text = text.to_string();
  }

  /// Run one guess attempt. No-op when the description is blank.
  #[instrument(level = "info", skip(self), fields(topic = %self.state.secret_topic, difficulty = %self.state.difficulty))]
  pub async fn submit_guess(&mut self) -> RoundState {
    if self.state.user_text.trim().is_empty() {
      return self.snapshot();
    }
    self.state.pending = true;

    let (outcome, response) = self.run_attempt().await;

    self.state.attempts += 1;
    if outcome == Outcome::Correct {
      self.state.score += 1;
    }
    self.state.outcome = outcome;
    self.state.last_response_text = response;
    self.state.pending = false;

    info!(target: "round", ?outcome, score = self.state.score, attempts = self.state.attempts, "Attempt resolved");
    self.snapshot()
  }

  async fn run_attempt(&self) -> (Outcome, String) {
    let backend = match self.selector.active().await {
      Ok(b) => b,
      Err(e) => {
        warn!(target: "round", error = %e, "No backend for this attempt");
        return (Outcome::Incorrect, e.to_string());
      }
    };
    let st = &self.state;

    let validation_prompt = build_validation_prompt(&self.prompts, &st.user_text, &st.secret_topic, st.difficulty);
    let verdict = match backend.produce_text(&validation_prompt).await {
      Ok(text) => parse_verdict(&text),
      Err(e) => {
        warn!(target: "round", backend = %backend.name(), error = ?e, "Validation call failed");
        return (Outcome::Incorrect, e.to_string());
      }
    };
    if !verdict.valid {
      info!(target: "round", reason = ?verdict.reason, "Description rejected");
      return (Outcome::Incorrect, rejection_text(&verdict));
    }

    let guess_prompt = build_guess_prompt(&self.prompts, &st.user_text, st.difficulty);
    match backend.produce_text(&guess_prompt).await {
      Ok(text) => {
        debug!(target: "round", guess = %trunc_for_log(&text, 40), "Guess response");
        let outcome = if is_correct_guess(&text, &st.secret_topic) { Outcome::Correct } else { Outcome::Incorrect };
        (outcome, text)
      }
      Err(e) => {
        warn!(target: "round", backend = %backend.name(), error = ?e, "Guess call failed");
        (Outcome::Incorrect, e.to_string())
      }
    }
  }

  fn clear_round(&mut self) {
    self.state.secret_topic = self.topics.next_topic(self.state.difficulty);
    self.state.user_text.clear();
    self.state.last_response_text.clear();
    self.state.outcome = Outcome::Unknown;
    self.state.pending = false;
  }

  /// Next topic; score and attempts carry over.
  #[instrument(level = "info", skip(self))]
  pub fn advance_round(&mut self) -> RoundState {
    self.clear_round();
    self.snapshot()
  }

  /// Fresh game: zero counters and a new topic.
  #[instrument(level = "info", skip(self))]
  pub fn reset_game(&mut self) -> RoundState {
    let topic = self.topics.next_topic(self.state.difficulty);
    self.state = RoundState::new(topic, self.state.difficulty);
    self.snapshot()
  }

  /// Switch topic pool. Resets the current round; score and attempts are kept.
  #[instrument(level = "info", skip(self), fields(%difficulty))]
  pub fn change_difficulty(&mut self, difficulty: Difficulty) -> RoundState {
    self.state.difficulty = difficulty;
    self.clear_round();
    self.snapshot()
  }
}
