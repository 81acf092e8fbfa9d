#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

pub mod adapters;
pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod telemetry;
pub mod workers;

use crate::adapters::database::DbPool;
use crate::adapters::database::session_repo::PgSessionStore;
use crate::api::ServiceContainer;
use crate::config::Config;
use crate::services::authenticator::{Authenticator, TokenAuthenticator};
use crate::services::health_service::HealthService;
use crate::services::session_service::SessionService;
use crate::services::session_store::SessionStore;
use crate::workers::SessionCleanupWorker;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Fully wired application components, ready to be served.
#[derive(Debug)]
pub struct App {
    pub services: ServiceContainer,
    pub health_service: HealthService,
    pub workers: Workers,
}

/// Background tasks owned by the application.
#[derive(Debug)]
pub struct Workers {
    session_cleanup: SessionCleanupWorker,
}

impl Workers {
    /// Spawns every background worker. Each one exits once `shutdown_rx` flips to `true`.
    #[must_use]
    pub fn spawn_all(self, shutdown_rx: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        vec![tokio::spawn(self.session_cleanup.run(shutdown_rx))]
    }
}

#[derive(Debug)]
pub struct AppBuilder {
    config: Config,
    pool: Option<DbPool>,
    store: Option<Arc<dyn SessionStore>>,
}

impl AppBuilder {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config, pool: None, store: None }
    }

    /// Backs sessions with Postgres through the given pool.
    #[must_use]
    pub fn with_database(mut self, pool: DbPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Uses an explicit store. Takes precedence over [`AppBuilder::with_database`].
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Wires the authenticator, store and services together.
    ///
    /// # Errors
    /// Returns an error if no store was supplied or the signing secret is empty.
    pub fn build(self) -> anyhow::Result<App> {
        let store: Arc<dyn SessionStore> = match (self.store, self.pool) {
            (Some(store), _) => store,
            (None, Some(pool)) => Arc::new(PgSessionStore::new(pool)),
            (None, None) => anyhow::bail!("no session store configured"),
        };

        let authenticator: Arc<dyn TokenAuthenticator> = Arc::new(Authenticator::new(&self.config.auth.jwt_secret)?);

        let session_service = SessionService::new(self.config.auth.clone(), authenticator, Arc::clone(&store));
        let health_service = HealthService::new(Arc::clone(&store), self.config.health.clone());
        let session_cleanup = SessionCleanupWorker::new(
            store,
            self.config.cleanup.interval_secs,
            self.config.auth.refresh_token_ttl(),
        );

        Ok(App {
            services: ServiceContainer { session_service },
            health_service,
            workers: Workers { session_cleanup },
        })
    }
}

/// Applies the embedded migrations to the given pool.
///
/// # Errors
/// Returns an error if a migration fails to apply.
pub async fn run_migrations(pool: &DbPool) -> anyhow::Result<()> {
    sqlx::migrate!().run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}

/// Flips the shutdown channel on SIGINT or SIGTERM.
pub fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => {},
            () = terminate => {},
        }

        tracing::info!("Shutdown signal received, draining...");
        let _ = shutdown_tx.send(true);
    });
}

/// Routes panics through `tracing` so they reach the configured log sink.
pub fn setup_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info.location().map(|l| format!("{}:{}", l.file(), l.line())).unwrap_or_default();
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown".to_string());

        tracing::error!(panic.location = %location, panic.payload = %payload, "Panic occurred");
    }));
}
