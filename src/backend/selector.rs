//! Backend selection: preference order, fallback, caching and disposal.
//!
//! At most one adapter is live at a time. Switching kinds disposes the previous
//! adapter before the new one is installed; adapters acquire their model handle
//! lazily, so probing a candidate never holds a second handle.

use std::sync::{Arc, RwLock};

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use super::hosted::HostedBackend;
use super::local::LocalModelBackend;
use super::{BackendError, TextBackend};
use crate::config::{HostedConfig, LocalConfig};
use crate::domain::BackendKind;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
  #[error("利用可能なAIサービスがありません。")]
  NoBackendAvailable,
  #[error(transparent)]
  Backend(#[from] BackendError),
}

/// Builds adapters by kind. Construction must be cheap and must not load a model.
pub trait BackendFactory: Send + Sync {
  fn build(&self, kind: BackendKind) -> Arc<dyn TextBackend>;

  /// Credential change for the hosted backend; affects adapters built afterwards.
  fn set_hosted_api_key(&self, key: Option<String>);
}

/// Production factory building adapters from configuration.
pub struct DefaultBackendFactory {
  local: LocalConfig,
  hosted: RwLock<HostedConfig>,
}

impl DefaultBackendFactory {
  pub fn new(local: LocalConfig, hosted: HostedConfig) -> Self {
    Self { local, hosted: RwLock::new(hosted) }
  }
}

impl BackendFactory for DefaultBackendFactory {
  fn build(&self, kind: BackendKind) -> Arc<dyn TextBackend> {
    match kind {
      BackendKind::LocalModel => Arc::new(LocalModelBackend::new(&self.local)),
      BackendKind::HostedModel => {
        let cfg = self.hosted.read().map(|c| c.clone()).unwrap_or_default();
        Arc::new(HostedBackend::new(&cfg))
      }
    }
  }

  fn set_hosted_api_key(&self, key: Option<String>) {
    if let Ok(mut cfg) = self.hosted.write() {
      cfg.api_key = key;
    }
  }
}

/// Snapshot of the selector for the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendStatus {
  pub active: Option<BackendKind>,
  pub active_name: Option<String>,
  pub preference: Vec<BackendKind>,
}

/// A backend kind that answered its probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailableBackend {
  pub kind: BackendKind,
  pub name: String,
}

pub struct BackendSelector {
  factory: Arc<dyn BackendFactory>,
  order: Vec<BackendKind>,
  active: Mutex<Option<Arc<dyn TextBackend>>>,
}

impl BackendSelector {
  pub fn new(factory: Arc<dyn BackendFactory>, order: Vec<BackendKind>) -> Self {
    let order = if order.is_empty() { BackendKind::ALL.to_vec() } else { order };
    Self { factory, order, active: Mutex::new(None) }
  }

  pub fn preference(&self) -> &[BackendKind] {
    &self.order
  }

  fn cached_or_build(&self, cached: &Option<Arc<dyn TextBackend>>, kind: BackendKind) -> Arc<dyn TextBackend> {
    match cached {
      Some(b) if b.kind() == kind => b.clone(),
      _ => self.factory.build(kind),
    }
  }

  /// Dispose the current adapter if it is a different kind, then install `next`.
  async fn install(&self, slot: &mut Option<Arc<dyn TextBackend>>, next: Arc<dyn TextBackend>) {
    if let Some(prev) = slot.as_ref() {
      if prev.kind() == next.kind() {
        return;
      }
      info!(target: "backend", from = %prev.kind(), to = %next.kind(), "Switching backend; disposing previous");
      prev.dispose().await;
    }
    *slot = Some(next);
  }

  /// Probe kinds in preference order and cache the first available one.
  #[instrument(level = "info", skip(self))]
  pub async fn select_best(&self) -> Result<Arc<dyn TextBackend>, SelectorError> {
    let mut active = self.active.lock().await;
    for kind in self.order.iter().copied() {
      let candidate = self.cached_or_build(&active, kind);
      if candidate.is_available().await {
        info!(target: "backend", %kind, name = %candidate.name(), "Backend selected");
        self.install(&mut active, candidate.clone()).await;
        return Ok(candidate);
      }
      warn!(target: "backend", %kind, "Backend unavailable; trying next preference");
    }
    Err(SelectorError::NoBackendAvailable)
  }

  /// Force a particular backend kind.
  #[instrument(level = "info", skip(self), fields(%kind))]
  pub async fn select_specific(&self, kind: BackendKind) -> Result<Arc<dyn TextBackend>, SelectorError> {
    let mut active = self.active.lock().await;
    let candidate = self.cached_or_build(&active, kind);
    if !candidate.is_available().await {
      warn!(target: "backend", %kind, "Requested backend is unavailable");
      return Err(BackendError::Unavailable(format!("{} は現在利用できません", candidate.name())).into());
    }
    self.install(&mut active, candidate.clone()).await;
    info!(target: "backend", %kind, name = %candidate.name(), "Backend forced");
    Ok(candidate)
  }

  /// Drop and dispose the cached adapter of `kind`, if it is the live one.
  #[instrument(level = "info", skip(self), fields(%kind))]
  pub async fn invalidate(&self, kind: BackendKind) {
    let mut active = self.active.lock().await;
    if active.as_ref().map(|b| b.kind()) == Some(kind) {
      if let Some(prev) = active.take() {
        prev.dispose().await;
        info!(target: "backend", %kind, "Backend invalidated");
      }
    }
  }

  /// The cached adapter, selecting one first if nothing is cached yet.
  pub async fn active(&self) -> Result<Arc<dyn TextBackend>, SelectorError> {
    if let Some(b) = self.active.lock().await.as_ref() {
      return Ok(b.clone());
    }
    self.select_best().await
  }

  /// Probe every kind without changing the selection.
  #[instrument(level = "info", skip(self))]
  pub async fn available_kinds(&self) -> Vec<AvailableBackend> {
    let snapshot = { self.active.lock().await.clone() };
    let mut out = Vec::new();
    for kind in self.order.iter().copied() {
      let b = self.cached_or_build(&snapshot, kind);
      if b.is_available().await {
        out.push(AvailableBackend { kind, name: b.name().to_string() });
      }
    }
    out
  }

  /// New hosted credential: update the factory and drop the stale hosted adapter.
  pub async fn set_hosted_api_key(&self, key: Option<String>) {
    let key = key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty());
    info!(target: "backend", has_key = key.is_some(), "Hosted API key updated");
    self.factory.set_hosted_api_key(key);
    self.invalidate(BackendKind::HostedModel).await;
  }

  pub async fn status(&self) -> BackendStatus {
    let active = self.active.lock().await;
    BackendStatus {
      active: active.as_ref().map(|b| b.kind()),
      active_name: active.as_ref().map(|b| b.name().to_string()),
      preference: self.preference().to_vec(),
    }
  }

  /// Release whatever is live (shutdown).
  pub async fn shutdown(&self) {
    if let Some(prev) = self.active.lock().await.take() {
      prev.dispose().await;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::backend::testing::ScriptedFactory;
  use std::sync::atomic::Ordering;

  fn selector(f: &Arc<ScriptedFactory>, order: Vec<BackendKind>) -> BackendSelector {
    BackendSelector::new(f.clone(), order)
  }

  #[tokio::test]
  async fn best_prefers_first_available() {
    let f = ScriptedFactory::new(true, true);
    let s = selector(&f, vec![BackendKind::LocalModel, BackendKind::HostedModel]);
    assert_eq!(s.select_best().await.unwrap().kind(), BackendKind::LocalModel);
    assert_eq!(s.status().await.active, Some(BackendKind::LocalModel));
  }

  #[tokio::test]
  async fn best_falls_back_when_preferred_probe_fails() {
    let f = ScriptedFactory::new(false, true);
    let s = selector(&f, vec![BackendKind::LocalModel, BackendKind::HostedModel]);
    assert_eq!(s.select_best().await.unwrap().kind(), BackendKind::HostedModel);
  }

  #[tokio::test]
  async fn best_fails_when_nothing_answers() {
    let f = ScriptedFactory::new(false, false);
    let s = selector(&f, vec![BackendKind::LocalModel, BackendKind::HostedModel]);
    assert_eq!(s.select_best().await.err(), Some(SelectorError::NoBackendAvailable));
    assert_eq!(s.status().await.active, None);
  }

  #[tokio::test]
  async fn specific_rejects_unavailable_kind() {
    let f = ScriptedFactory::new(true, false);
    let s = selector(&f, vec![]);
    let err = s.select_specific(BackendKind::HostedModel).await.err().unwrap();
    assert!(matches!(err, SelectorError::Backend(BackendError::Unavailable(_))));
  }

  #[tokio::test]
  async fn switching_kinds_disposes_previous() {
    let f = ScriptedFactory::new(true, true);
    let s = selector(&f, vec![BackendKind::LocalModel, BackendKind::HostedModel]);
    s.select_best().await.unwrap();
    s.select_best().await.unwrap();
    assert_eq!(f.local.dispose_count(), 0, "re-selecting same kind keeps the handle");

    s.select_specific(BackendKind::HostedModel).await.unwrap();
    assert_eq!(f.local.dispose_count(), 1);
    assert_eq!(s.status().await.active, Some(BackendKind::HostedModel));
  }

  #[tokio::test]
  async fn invalidate_only_touches_matching_kind() {
    let f = ScriptedFactory::new(true, true);
    let s = selector(&f, vec![BackendKind::LocalModel]);
    s.select_best().await.unwrap();
    s.invalidate(BackendKind::HostedModel).await;
    assert_eq!(f.local.dispose_count(), 0);
    s.invalidate(BackendKind::LocalModel).await;
    s.invalidate(BackendKind::LocalModel).await;
    assert_eq!(f.local.dispose_count(), 1);
    assert_eq!(s.status().await.active, None);
  }

  #[tokio::test]
  async fn api_key_change_enables_hosted_and_drops_stale_instance() {
    let f = ScriptedFactory::new(false, false);
    let s = selector(&f, vec![BackendKind::HostedModel]);
    assert!(s.available_kinds().await.is_empty());

    s.set_hosted_api_key(Some(" sk-new ".into())).await;
    assert_eq!(f.hosted_key.lock().unwrap().as_deref(), Some("sk-new"));
    assert!(f.hosted.available.load(Ordering::SeqCst));
    s.select_best().await.unwrap();

    s.set_hosted_api_key(Some("sk-rotated".into())).await;
    assert_eq!(f.hosted.dispose_count(), 1);
    assert_eq!(s.status().await.active, None);
  }

  #[tokio::test]
  async fn active_selects_lazily_and_caches() {
    let f = ScriptedFactory::new(true, true);
    let s = selector(&f, vec![BackendKind::HostedModel, BackendKind::LocalModel]);
    assert_eq!(s.active().await.unwrap().kind(), BackendKind::HostedModel);
    f.hosted.available.store(false, Ordering::SeqCst);
    assert_eq!(s.active().await.unwrap().kind(), BackendKind::HostedModel, "cached instance is reused");
  }

  #[test]
  fn empty_order_uses_all_kinds() {
    let f = ScriptedFactory::new(true, true);
    let s = selector(&f, vec![]);
    assert_eq!(s.preference(), &BackendKind::ALL);
  }
}
