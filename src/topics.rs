//! Built-in topic pools and the per-session topic provider.

use std::{collections::HashMap, str::FromStr};

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::Deserialize;

use crate::config::TopicsConfig;
use crate::domain::Difficulty;

/// Absolute last-resort topic when every pool is empty.
pub const FALLBACK_TOPIC: &str = "桜";

/// Concrete, everyday words.
pub fn seed_normal_topics() -> Vec<String> {
  [
    "桜", "ラーメン", "富士山", "電車", "猫", "スマートフォン", "寿司", "本",
    "コーヒー", "雨", "ピアノ", "海", "花火", "雪", "太陽", "月", "星",
    "風", "虹", "蝶", "鳥", "犬", "魚", "花", "木", "川", "山", "森", "空",
  ]
  .iter()
  .map(|s| s.to_string())
  .collect()
}

/// Abstract and emotional words.
pub fn seed_hard_topics() -> Vec<String> {
  [
    "友情", "勇気", "孤独", "希望", "後悔", "懐かしさ", "嫉妬", "感謝",
    "自由", "平和", "時間", "記憶", "夢", "約束", "秘密", "不安",
    "憧れ", "信頼", "退屈", "緊張",
  ]
  .iter()
  .map(|s| s.to_string())
  .collect()
}

/// How the next topic is picked from a pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicOrder {
  /// Walk the pool by index, wrapping around.
  #[serde(alias = "seq")]
  Sequential,
  /// Uniform pick, never the same word twice in a row.
  #[default]
  #[serde(alias = "rand")]
  Random,
}

impl FromStr for TopicOrder {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "sequential" | "seq" => Ok(TopicOrder::Sequential),
      "random" | "rand" => Ok(TopicOrder::Random),
      other => Err(format!("unknown topic order '{}'", other)),
    }
  }
}

/// Supplies the secret word for each round.
pub struct TopicProvider {
  pools: HashMap<Difficulty, Vec<String>>,
  order: TopicOrder,
  cursor: HashMap<Difficulty, usize>,
  last: Option<String>,
  rng: StdRng,
}

impl TopicProvider {
  pub fn new(cfg: &TopicsConfig, order: TopicOrder, seed: Option<u64>) -> Self {
    let pick = |configured: &[String], builtin: fn() -> Vec<String>| {
      let cleaned: Vec<String> = configured
        .iter()
        .map(|w| w.trim().to_string())
        .filter(|w| !w.is_empty())
        .collect();
      if cleaned.is_empty() { builtin() } else { cleaned }
    };
    let pools = HashMap::from([
      (Difficulty::Normal, pick(&cfg.normal, seed_normal_topics)),
      (Difficulty::Hard, pick(&cfg.hard, seed_hard_topics)),
    ]);
    let rng = match seed {
      Some(s) => StdRng::seed_from_u64(s),
      None => StdRng::from_entropy(),
    };
    Self { pools, order, cursor: HashMap::new(), last: None, rng }
  }

  pub fn pool(&self, difficulty: Difficulty) -> &[String] {
    self.pools.get(&difficulty).map(Vec::as_slice).unwrap_or(&[])
  }

  /// Pick the next topic for `difficulty` according to the configured order.
  pub fn next_topic(&mut self, difficulty: Difficulty) -> String {
    let pool = match self.pools.get(&difficulty) {
      Some(p) if !p.is_empty() => p,
      _ => return FALLBACK_TOPIC.to_string(),
    };

    let chosen = match self.order {
      TopicOrder::Sequential => {
        let idx = self.cursor.entry(difficulty).or_insert(0);
        let word = pool[*idx % pool.len()].clone();
        *idx = (*idx + 1) % pool.len();
        word
      }
      TopicOrder::Random => {
        let candidates: Vec<&String> = match &self.last {
          Some(last) if pool.len() > 1 => pool.iter().filter(|w| *w != last).collect(),
          _ => pool.iter().collect(),
        };
        candidates
          .choose(&mut self.rng)
          .map(|w| (*w).clone())
          .unwrap_or_else(|| pool[0].clone())
      }
    };
    self.last = Some(chosen.clone());
    chosen
  }
}
