use crate::error::Result;
use crate::services::session_store::SessionStore;
use opentelemetry::{global, metrics::Counter};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::Instrument;

/// Periodically removes sessions whose refresh token lifetime has run out.
///
/// Expired sessions are also removed lazily on their next refresh attempt; this worker
/// catches the ones nobody comes back for.
#[derive(Debug)]
pub struct SessionCleanupWorker {
    store: Arc<dyn SessionStore>,
    cleanup_interval_secs: u64,
    refresh_token_ttl: Duration,
    expired_deleted_total: Counter<u64>,
}

impl SessionCleanupWorker {
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, cleanup_interval_secs: u64, refresh_token_ttl: Duration) -> Self {
        let expired_deleted_total = global::meter("tokenkeeper")
            .u64_counter("sessions_expired_cleaned_total")
            .with_description("Total number of expired sessions removed by the cleanup worker")
            .build();
        Self { store, cleanup_interval_secs, refresh_token_ttl, expired_deleted_total }
    }

    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        if self.cleanup_interval_secs == 0 {
            tracing::info!("Session cleanup is disabled (interval = 0)");
            return;
        }

        let mut interval = tokio::time::interval(Duration::from_secs(self.cleanup_interval_secs));

        while !*shutdown.borrow() {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.perform_cleanup()
                        .instrument(tracing::info_span!("run_session_cleanup"))
                        .await
                    {
                        tracing::error!(error = ?e, "Session cleanup iteration failed");
                    }
                }
                _ = shutdown.changed() => {}
            }
        }
        tracing::info!("Session cleanup loop shutting down...");
    }

    /// Deletes every session created more than one refresh TTL ago.
    ///
    /// # Errors
    /// Returns an error if the store call fails.
    #[tracing::instrument(skip(self), err, fields(expired_deleted = tracing::field::Empty))]
    pub async fn perform_cleanup(&self) -> Result<u64> {
        tracing::debug!("Running session cleanup...");

        let ttl = time::Duration::try_from(self.refresh_token_ttl).unwrap_or(time::Duration::MAX);
        let cutoff = OffsetDateTime::now_utc().checked_sub(ttl).unwrap_or(OffsetDateTime::UNIX_EPOCH);

        let count = self.store.delete_created_before(cutoff).await?;
        if count > 0 {
            tracing::info!(count = %count, "Deleted expired sessions");
            tracing::Span::current().record("expired_deleted", count);
            self.expired_deleted_total.add(count, &[]);
        }

        Ok(count)
    }
}
