//! Prompt assembly for the two backend calls of a round.
//!
//! Pure string templating over `config::Prompts`: no IO, no state. User text is
//! embedded verbatim.

use crate::config::Prompts;
use crate::domain::Difficulty;
use crate::util::fill_template;

fn difficulty_label(difficulty: Difficulty) -> &'static str {
  match difficulty {
    Difficulty::Normal => "ノーマル",
    Difficulty::Hard => "ハード",
  }
}

fn difficulty_framing(prompts: &Prompts, difficulty: Difficulty) -> &str {
  match difficulty {
    Difficulty::Normal => &prompts.normal_framing,
    Difficulty::Hard => &prompts.hard_framing,
  }
}

/// Ask the backend whether `user_text` describes `secret_word` without naming it
/// (or its other spellings, translations and substrings). The reply is expected to
/// start with `OK`, or `NG` followed by a reason.
pub fn build_validation_prompt(
  prompts: &Prompts,
  user_text: &str,
  secret_word: &str,
  difficulty: Difficulty,
) -> String {
  fill_template(
    &prompts.validation_template,
    &[
      ("user_text", user_text),
      ("secret_word", secret_word),
      ("difficulty", difficulty_label(difficulty)),
      ("difficulty_framing", difficulty_framing(prompts, difficulty)),
    ],
  )
}

/// Ask the backend for exactly one guessed word. The secret word never appears here.
pub fn build_guess_prompt(prompts: &Prompts, user_text: &str, difficulty: Difficulty) -> String {
  fill_template(
    &prompts.guess_template,
    &[
      ("user_text", user_text),
      ("difficulty", difficulty_label(difficulty)),
      ("difficulty_framing", difficulty_framing(prompts, difficulty)),
    ],
  )
}
