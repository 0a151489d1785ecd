use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::backend::{Backend, BackendError, MemoryBackend, PgBackend};
use crate::client::{Authenticator, PollStore, RefreshBus, VoteRecorder};
use crate::config::{Config, ConfigError};
use crate::visitor::{FileStore, IdentityResolver, Session, VisitorState};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to connect to the database: {0}")]
    Backend(#[from] BackendError),

    #[error("failed to bind {addr}: {message}")]
    Bind { addr: String, message: String },
}

/// Everything the routes need, built once at startup.
pub struct AppState {
    pub config: Config,
    pub backend: Arc<dyn Backend>,
    pub session: Session,
    pub visitor: Arc<VisitorState>,
    pub identity: IdentityResolver,
    pub refresh: RefreshBus,
    pub polls: PollStore,
    pub votes: VoteRecorder,
    pub auth: Authenticator,
}

impl AppState {
    /// Connects the configured backend. Building the PostgreSQL pool blocks,
    /// so it runs on the blocking pool.
    pub async fn new(config: Config) -> Result<Arc<AppState>, StartupError> {
        let backend: Arc<dyn Backend> = match &config.database_url {
            Some(url) => {
                let url = url.clone();
                let notify_interval = config.notify_interval;
                let backend = tokio::task::spawn_blocking(move || PgBackend::connect(&url, notify_interval))
                    .await
                    .map_err(|e| BackendError::Unavailable(e.to_string()))??;
                Arc::new(backend)
            }
            None => {
                info!("DATABASE_URL not set, keeping polls in memory");
                Arc::new(MemoryBackend::new())
            }
        };

        let store = FileStore::open(&config.visitor_state);
        info!("Visitor state at {}", store.path().display());
        Ok(AppState::with_parts(config, backend, VisitorState::new(store)))
    }

    pub fn with_parts(config: Config, backend: Arc<dyn Backend>, visitor: VisitorState) -> Arc<AppState> {
        let session = Session::new();
        let visitor = Arc::new(visitor);
        let identity = IdentityResolver::new(session.clone(), visitor.clone());
        let refresh = RefreshBus::new();

        Arc::new(AppState {
            polls: PollStore::new(backend.clone(), identity.clone(), visitor.clone()),
            votes: VoteRecorder::new(backend.clone(), identity.clone(), visitor.clone(), refresh.clone()),
            auth: Authenticator::new(backend.clone(), session.clone()),
            config,
            backend,
            session,
            visitor,
            identity,
            refresh,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn config(database_url: Option<&str>) -> Config {
        let mut config = Config::from_lookup(|_| None).unwrap();
        config.database_url = database_url.map(str::to_string);
        config.visitor_state = env::temp_dir()
            .join(format!("pollshare-test-{}", uuid::Uuid::new_v4()))
            .join("visitor.json");
        config
    }

    #[tokio::test]
    async fn memory_backend_without_database_url() {
        let state = AppState::new(config(None)).await.unwrap();
        assert!(state.backend.list_polls(&Default::default()).await.unwrap().is_empty());
        assert_eq!(state.visitor.anonymous_id(), None);
    }

    #[tokio::test]
    async fn unreachable_database_fails_without_stalling_the_runtime() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let ticker = tokio::spawn({
            let ticks = ticks.clone();
            async move {
                loop {
                    ticks.fetch_add(1, Ordering::Relaxed);
                    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                }
            }
        });

        let result = AppState::new(config(Some("postgres://pollshare@127.0.0.1:1/pollshare"))).await;
        ticker.abort();

        assert!(matches!(result, Err(StartupError::Backend(BackendError::Unavailable(_)))));
        assert!(ticks.load(Ordering::Relaxed) > 0);
    }
}
