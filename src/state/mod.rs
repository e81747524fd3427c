pub mod rate_limit;

use std::{sync::Arc, time::Duration};

use tokio::sync::{RwLock, watch};

use crate::auth::SessionKeys;
use crate::config::AppSettings;
use crate::dao::history_store::HistoryStore;
use crate::error::ServiceError;
use crate::rag::QueryEngine;

pub use self::rate_limit::{RateDecision, RateLimiter};

pub type SharedState = Arc<AppState>;

/// Central application state holding shared handles and runtime flags.
pub struct AppState {
    settings: AppSettings,
    session_keys: SessionKeys,
    history_store: RwLock<Option<Arc<dyn HistoryStore>>>,
    degraded: watch::Sender<bool>,
    query_engine: Option<Arc<QueryEngine>>,
    rate_limiter: RateLimiter,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is
    /// installed. `query_engine` is `None` when retrieval secrets are missing;
    /// chat then answers with 503 while the rest of the API keeps working.
    pub fn new(
        settings: AppSettings,
        session_keys: SessionKeys,
        query_engine: Option<Arc<QueryEngine>>,
    ) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        let rate_limiter = RateLimiter::new(Duration::from_secs(settings.chat.rate_window_secs));
        Arc::new(Self {
            settings,
            session_keys,
            history_store: RwLock::new(None),
            degraded: degraded_tx,
            query_engine,
            rate_limiter,
        })
    }

    /// Runtime settings loaded at startup.
    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    /// Keys used to sign and verify session tokens.
    pub fn session_keys(&self) -> &SessionKeys {
        &self.session_keys
    }

    /// Obtain a handle to the current history store, if one is installed.
    pub async fn history_store(&self) -> Option<Arc<dyn HistoryStore>> {
        let guard = self.history_store.read().await;
        guard.as_ref().cloned()
    }

    /// Storage handle for request paths that cannot run in degraded mode.
    pub async fn require_history_store(&self) -> Result<Arc<dyn HistoryStore>, ServiceError> {
        self.history_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new history store implementation and leave degraded mode.
    pub async fn install_history_store(&self, store: Arc<dyn HistoryStore>) {
        {
            let mut guard = self.history_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current history store and enter degraded mode.
    pub async fn clear_history_store(&self) {
        {
            let mut guard = self.history_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        let guard = self.history_store.read().await;
        guard.is_none()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Retrieval pipeline, absent when its secrets were not configured.
    pub fn query_engine(&self) -> Option<Arc<QueryEngine>> {
        self.query_engine.clone()
    }

    /// Fixed-window limiter shared by every chat caller.
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Update and broadcast the degraded flag when the value changes.
    fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current != value {
                *current = value;
                true
            } else {
                false
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SharedState {
        AppState::new(
            AppSettings::default(),
            SessionKeys::from_secret("state-test"),
            None,
        )
    }

    #[tokio::test]
    async fn starts_degraded_without_a_store() {
        let state = state();
        assert!(state.is_degraded().await);
        assert!(state.history_store().await.is_none());
        assert!(state.query_engine().is_none());
    }

    #[cfg(feature = "sqlite-store")]
    #[tokio::test]
    async fn installing_and_clearing_a_store_flips_degraded_mode() {
        use crate::dao::history_store::sqlite::SqliteHistoryStore;

        let state = state();
        let mut watcher = state.degraded_watcher();

        let store = SqliteHistoryStore::connect("sqlite::memory:", 1)
            .await
            .expect("in-memory store should open");
        state.install_history_store(Arc::new(store)).await;

        assert!(!state.is_degraded().await);
        assert!(watcher.changed().await.is_ok());
        assert!(!*watcher.borrow_and_update());

        state.clear_history_store().await;
        assert!(state.is_degraded().await);
        assert!(watcher.changed().await.is_ok());
        assert!(*watcher.borrow_and_update());
    }
}
