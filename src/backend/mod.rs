//! Text-generation backends behind one capability trait, plus the selector that
//! decides which one serves the game.

use async_trait::async_trait;

use crate::domain::BackendKind;

pub mod hosted;
pub mod local;
pub mod selector;

pub use selector::{BackendFactory, BackendSelector, DefaultBackendFactory, SelectorError};

/// Adapter-level failures. Messages are shown to the player as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
  #[error("AIサービスが利用できません: {0}")]
  Unavailable(String),
  #[error("APIキーが無効です。")]
  Auth(String),
  #[error("APIの使用量上限に達しています。")]
  Quota(String),
  #[error("AIリクエストに失敗しました: {0}")]
  Transient(String),
}

/// Uniform contract every text-generation backend implements.
#[async_trait]
pub trait TextBackend: Send + Sync {
  fn kind(&self) -> BackendKind;

  /// Human-readable backend name for the UI and logs.
  fn name(&self) -> &str;

  /// Cheap capability probe. Must never issue a generation call.
  async fn is_available(&self) -> bool;

  /// Acquire whatever the backend needs before generating (model handle, session).
  /// Backends without such state succeed immediately.
  async fn initialize(&self) -> Result<(), BackendError> {
    Ok(())
  }

  /// Send `prompt` and return the complete text output. Never retried here.
  async fn produce_text(&self, prompt: &str) -> Result<String, BackendError>;

  /// Release any held model handle. Safe to call more than once.
  async fn dispose(&self) {}
}

#[cfg(test)]
pub(crate) mod testing {
  //! Scripted backend used by selector/controller tests.

  use std::collections::VecDeque;
  use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
  };

  use tokio::sync::Semaphore;

  use super::*;

  pub struct ScriptedBackend {
    pub kind: BackendKind,
    pub available: AtomicBool,
    pub replies: Mutex<VecDeque<Result<String, BackendError>>>,
    pub prompts: Mutex<Vec<String>>,
    pub disposed: AtomicUsize,
    gate: Mutex<Option<Arc<Semaphore>>>,
  }

  impl ScriptedBackend {
    pub fn new(kind: BackendKind, available: bool) -> Arc<Self> {
      Arc::new(Self {
        kind,
        available: AtomicBool::new(available),
        replies: Mutex::new(VecDeque::new()),
        prompts: Mutex::new(Vec::new()),
        disposed: AtomicUsize::new(0),
        gate: Mutex::new(None),
      })
    }

    pub fn push(&self, reply: Result<&str, BackendError>) {
      self.replies.lock().unwrap().push_back(reply.map(str::to_string));
    }

    /// Make every reply wait for a permit on the returned semaphore.
    pub fn hold_replies(&self) -> Arc<Semaphore> {
      let gate = Arc::new(Semaphore::new(0));
      *self.gate.lock().unwrap() = Some(gate.clone());
      gate
    }

    pub fn calls(&self) -> usize {
      self.prompts.lock().unwrap().len()
    }

    pub fn dispose_count(&self) -> usize {
      self.disposed.load(Ordering::SeqCst)
    }
  }

  #[async_trait]
  impl TextBackend for ScriptedBackend {
    fn kind(&self) -> BackendKind { self.kind }

    fn name(&self) -> &str { "scripted" }

    async fn is_available(&self) -> bool { self.available.load(Ordering::SeqCst) }

    async fn produce_text(&self, prompt: &str) -> Result<String, BackendError> {
      self.prompts.lock().unwrap().push(prompt.to_string());
      let gate = self.gate.lock().unwrap().clone();
      if let Some(gate) = gate {
        if let Ok(permit) = gate.acquire().await {
          permit.forget();
        }
      }
      self.replies
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| Err(BackendError::Transient("script exhausted".into())))
    }

    async fn dispose(&self) {
      self.disposed.fetch_add(1, Ordering::SeqCst);
    }
  }

  /// Factory handing out pre-built scripted backends by kind.
  pub struct ScriptedFactory {
    pub local: Arc<ScriptedBackend>,
    pub hosted: Arc<ScriptedBackend>,
    pub hosted_key: Mutex<Option<String>>,
  }

  impl ScriptedFactory {
    pub fn new(local_available: bool, hosted_available: bool) -> Arc<Self> {
      Arc::new(Self {
        local: ScriptedBackend::new(BackendKind::LocalModel, local_available),
        hosted: ScriptedBackend::new(BackendKind::HostedModel, hosted_available),
        hosted_key: Mutex::new(None),
      })
    }
  }

  impl BackendFactory for ScriptedFactory {
    fn build(&self, kind: BackendKind) -> Arc<dyn TextBackend> {
      match kind {
        BackendKind::LocalModel => self.local.clone(),
        BackendKind::HostedModel => self.hosted.clone(),
      }
    }

    fn set_hosted_api_key(&self, key: Option<String>) {
      self.hosted.available.store(key.is_some(), Ordering::SeqCst);
      *self.hosted_key.lock().unwrap() = key;
    }
  }
}
