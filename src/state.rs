//! Application state: config, the shared backend selector, and the in-memory session store.
//!
//! This module owns:
//!   - game sessions by id (one RoundController each)
//!   - the backend selector (one live adapter for the whole process)
//!   - the loaded configuration (prompts, topic pools, defaults)
//!
//! Sessions are not persisted. Idle sessions are pruned when new ones are created.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock as StdRwLock},
    time::{Duration, Instant},
};
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::backend::{BackendFactory, BackendSelector, DefaultBackendFactory};
use crate::config::{load_game_config_from_env, GameConfig};
use crate::domain::{Difficulty, RoundState};
use crate::error::ApiError;
use crate::game::RoundController;
use crate::topics::TopicProvider;

const SESSION_IDLE_TTL: Duration = Duration::from_secs(60 * 60);

/// One player's game. The controller lock doubles as the "guess in flight" gate.
pub struct GameSession {
    pub id: String,
    controller: Arc<Mutex<RoundController>>,
    view: Arc<StdRwLock<RoundState>>,
    last_seen: StdRwLock<Instant>,
}

fn publish_view(view: &StdRwLock<RoundState>, st: &RoundState) {
    if let Ok(mut v) = view.write() {
        *v = st.clone();
    }
}

impl GameSession {
    fn new(id: String, controller: RoundController) -> Self {
        let view = controller.snapshot();
        Self {
            id,
            controller: Arc::new(Mutex::new(controller)),
            view: Arc::new(StdRwLock::new(view)),
            last_seen: StdRwLock::new(Instant::now()),
        }
    }

    fn touch(&self) {
        if let Ok(mut t) = self.last_seen.write() {
            *t = Instant::now();
        }
    }

    fn idle_for(&self) -> Duration {
        self.last_seen.read().map(|t| t.elapsed()).unwrap_or_default()
    }

    fn publish(&self, st: &RoundState) {
        publish_view(&self.view, st);
    }

    /// Latest published state; readable while a guess is in flight.
    pub fn snapshot(&self) -> RoundState {
        self.touch();
        self.view
            .read()
            .map(|v| v.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    /// Run a synchronous controller operation unless a guess is pending.
    fn with_controller<F>(&self, op: F) -> Result<RoundState, ApiError>
    where
        F: FnOnce(&mut RoundController) -> RoundState,
    {
        self.touch();
        let mut ctl = self.controller.try_lock().map_err(|_| ApiError::GuessPending)?;
        let st = op(&mut *ctl);
        self.publish(&st);
        Ok(st)
    }

    pub fn update_user_text(&self, text: &str) -> Result<RoundState, ApiError> {
        self.with_controller(|c| {
            c.update_user_text(text);
            c.snapshot()
        })
    }

    pub fn advance_round(&self) -> Result<RoundState, ApiError> {
        self.with_controller(RoundController::advance_round)
    }

    pub fn reset_game(&self) -> Result<RoundState, ApiError> {
        self.with_controller(RoundController::reset_game)
    }

    pub fn change_difficulty(&self, difficulty: Difficulty) -> Result<RoundState, ApiError> {
        self.with_controller(|c| c.change_difficulty(difficulty))
    }

    /// Submit the current (or given) description. Rejected while another guess runs.
    ///
    /// The attempt runs on its own task: if the caller goes away (client disconnect),
    /// the round still resolves, counts its attempt and publishes `pending: false`.
    #[instrument(level = "info", skip(self, text), fields(session = %self.id))]
    pub async fn submit_guess(&self, text: Option<&str>) -> Result<RoundState, ApiError> {
        self.touch();
        let mut ctl = self
            .controller
            .clone()
            .try_lock_owned()
            .map_err(|_| ApiError::GuessPending)?;
        if let Some(t) = text {
            ctl.update_user_text(t);
        }
        let before = ctl.snapshot();
        if before.user_text.trim().is_empty() {
            self.publish(&before);
            return Ok(before);
        }
        self.publish(&RoundState { pending: true, ..before });

        let view = self.view.clone();
        let attempt = tokio::spawn(async move {
            let st = ctl.submit_guess().await;
            publish_view(&view, &st);
            st
        });
        attempt.await.map_err(|e| {
            error!(target: "round", session = %self.id, error = %e, "Guess task failed");
            ApiError::Internal(e.to_string())
        })
    }
}

pub struct AppState {
    pub config: GameConfig,
    pub selector: Arc<BackendSelector>,
    sessions: RwLock<HashMap<String, Arc<GameSession>>>,
}

impl AppState {
    /// Build state from env: load config, build the backend selector.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let config = load_game_config_from_env();
        let factory: Arc<dyn BackendFactory> = Arc::new(DefaultBackendFactory::new(
            config.local.clone(),
            config.hosted.clone(),
        ));
        info!(
            target: "kotoba_quiz",
            preference = ?config.game.backend_order(),
            local_host = %config.local.host,
            local_model = %config.local.model,
            hosted_model = %config.hosted.model,
            hosted_key = config.hosted.api_key.is_some(),
            "Backend configuration"
        );
        Self::with_factory(config, factory)
    }

    /// Same as `new` with an explicit config and adapter factory (tests, embedding).
    pub fn with_factory(config: GameConfig, factory: Arc<dyn BackendFactory>) -> Self {
        let selector = Arc::new(BackendSelector::new(factory, config.game.backend_order()));
        Self { config, selector, sessions: RwLock::new(HashMap::new()) }
    }

    /// Pick a backend up front so the first guess does not pay for probing.
    /// Failure only logs: games still start and report the error per attempt.
    pub async fn warm_up(&self) {
        match self.selector.select_best().await {
            Ok(b) => match b.initialize().await {
                Ok(()) => info!(target: "kotoba_quiz", kind = %b.kind(), name = %b.name(), "Backend ready"),
                Err(e) => warn!(target: "kotoba_quiz", kind = %b.kind(), error = %e, "Backend selected but not initialized; will retry on first guess"),
            },
            Err(e) => error!(target: "kotoba_quiz", error = %e, "No backend available at startup; games will report errors until one is configured"),
        }
    }

    /// Start a new game session.
    #[instrument(level = "info", skip(self))]
    pub async fn create_session(&self, difficulty: Option<Difficulty>) -> Arc<GameSession> {
        let difficulty = difficulty.unwrap_or(self.config.game.difficulty);
        let topics = TopicProvider::new(
            &self.config.topics,
            self.config.game.topic_order,
            self.config.game.rng_seed,
        );
        let pool_size = topics.pool(difficulty).len();
        let controller = RoundController::new(
            self.selector.clone(),
            self.config.prompts.clone(),
            topics,
            difficulty,
        );
        let id = Uuid::new_v4().to_string();
        let session = Arc::new(GameSession::new(id.clone(), controller));

        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.idle_for() < SESSION_IDLE_TTL);
        if sessions.len() < before {
            warn!(target: "kotoba_quiz", pruned = before - sessions.len(), "Pruned idle sessions");
        }
        sessions.insert(id.clone(), session.clone());
        info!(target: "round", session = %id, %difficulty, pool_size, live_sessions = sessions.len(), "Session created");
        session
    }

    pub async fn session(&self, id: &str) -> Result<Arc<GameSession>, ApiError> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::UnknownSession(id.to_string()))
    }

    pub async fn remove_session(&self, id: &str) -> Result<(), ApiError> {
        self.sessions
            .write()
            .await
            .remove(id)
            .map(|_| info!(target: "round", session = %id, "Session closed"))
            .ok_or_else(|| ApiError::UnknownSession(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::ScriptedFactory;
    use crate::domain::Outcome;

    fn app(f: &Arc<ScriptedFactory>) -> AppState {
        let mut cfg = GameConfig::default();
        cfg.topics.normal = vec!["桜".into()];
        cfg.game.topic_order = crate::topics::TopicOrder::Sequential;
        AppState::with_factory(cfg, f.clone())
    }

    #[tokio::test]
    async fn sessions_are_independent() {
        let f = ScriptedFactory::new(true, false);
        let st = app(&f);
        let a = st.create_session(None).await;
        let b = st.create_session(Some(Difficulty::Hard)).await;
        a.update_user_text("春の花").unwrap();
        assert_eq!(b.snapshot().user_text, "");
        assert_eq!(b.snapshot().difficulty, Difficulty::Hard);
        assert_eq!(a.snapshot().secret_topic, "桜");
    }

    #[tokio::test]
    async fn submit_with_text_resolves_and_publishes() {
        let f = ScriptedFactory::new(true, false);
        f.local.push(Ok("OK"));
        f.local.push(Ok("桜かな"));
        let st = app(&f);
        let s = st.create_session(None).await;
        let out = s.submit_guess(Some("春の花")).await.unwrap();
        assert_eq!(out.outcome, Outcome::Correct);
        assert_eq!(s.snapshot(), out);
    }

    #[tokio::test]
    async fn pending_session_rejects_other_mutations() {
        let f = ScriptedFactory::new(true, false);
        let st = app(&f);
        let s = st.create_session(None).await;
        let _held = s.controller.lock().await;
        assert!(matches!(s.submit_guess(Some("x")).await, Err(ApiError::GuessPending)));
        assert!(matches!(s.advance_round(), Err(ApiError::GuessPending)));
    }

    #[tokio::test]
    async fn dropped_submit_still_resolves_the_round() {
        let f = ScriptedFactory::new(true, false);
        f.local.push(Ok("OK"));
        f.local.push(Ok("桜です"));
        let gate = f.local.hold_replies();
        let st = app(&f);
        let s = st.create_session(None).await;

        {
            let fut = s.submit_guess(Some("春の花"));
            tokio::pin!(fut);
            tokio::select! {
                biased;
                _ = &mut fut => panic!("guess resolved while the backend was held"),
                _ = std::future::ready(()) => {}
            }
        }
        assert!(s.snapshot().pending, "in-flight attempt is visible");
        assert!(matches!(s.advance_round(), Err(ApiError::GuessPending)));

        gate.add_permits(2);
        for _ in 0..1000 {
            if !s.snapshot().pending {
                break;
            }
            tokio::task::yield_now().await;
        }
        let snap = s.snapshot();
        assert!(!snap.pending);
        assert_eq!(snap.attempts, 1);
        assert_eq!(snap.outcome, Outcome::Correct);
        assert!(s.advance_round().is_ok(), "session is usable again");
    }

    #[tokio::test]
    async fn blank_submit_is_a_no_op() {
        let f = ScriptedFactory::new(true, false);
        let st = app(&f);
        let s = st.create_session(None).await;
        let out = s.submit_guess(Some("   ")).await.unwrap();
        assert!(!out.pending);
        assert_eq!(out.attempts, 0);
        assert_eq!(f.local.calls(), 0);
    }

    #[tokio::test]
    async fn unknown_and_removed_sessions() {
        let f = ScriptedFactory::new(true, false);
        let st = app(&f);
        assert!(matches!(st.session("nope").await, Err(ApiError::UnknownSession(_))));
        let s = st.create_session(None).await;
        st.remove_session(&s.id).await.unwrap();
        assert!(st.session(&s.id).await.is_err());
    }
}
