use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{history_store::HistoryStore, storage::StorageError},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Keep the history store attached, entering degraded mode whenever the
/// backend is unreachable.
///
/// While degraded, chat still answers questions; only persistence and
/// the history endpoints are unavailable. The loop only returns on a
/// misconfigured database URL, which no amount of retrying can fix.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn HistoryStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(store) => {
                state.install_history_store(store.clone()).await;
                info!("history storage attached; leaving degraded mode");
                delay = INITIAL_DELAY;

                loop {
                    match store.health_check().await {
                        Ok(()) => {
                            if state.is_degraded().await {
                                info!("history storage healthy again; leaving degraded mode");
                                state.install_history_store(store.clone()).await;
                            }
                            sleep(HEALTH_POLL_INTERVAL).await;
                        }
                        Err(err) => {
                            warn!(error = %err, "history storage health check failed; entering degraded mode");
                            state.clear_history_store().await;

                            if reattach(&state, &store).await {
                                sleep(HEALTH_POLL_INTERVAL).await;
                            } else {
                                warn!("exhausted storage reconnect attempts; staying in degraded mode");
                                break;
                            }
                        }
                    }
                }

                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
            Err(
                err @ (StorageError::UnsupportedScheme { .. }
                | StorageError::BackendDisabled { .. }),
            ) => {
                warn!(error = %err, "history storage misconfigured; persistence stays off");
                return;
            }
            Err(err) => {
                warn!(error = %err, "history storage connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
}

/// Try a bounded number of reconnects on the existing handle.
///
/// Returns `true` once the store is reinstalled, `false` when every
/// attempt failed and a fresh connection is needed.
async fn reattach(state: &SharedState, store: &Arc<dyn HistoryStore>) -> bool {
    let mut delay = INITIAL_DELAY;

    for attempt in 0..MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "history storage reconnected after failed health check");
                state.install_history_store(store.clone()).await;
                return true;
            }
            Err(err) => {
                warn!(attempt, error = %err, "history storage reconnect attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }

    false
}
