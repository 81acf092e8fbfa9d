use crate::config::AuthConfig;
use crate::domain::session::{self, RefreshValidation, TokenPair};
use crate::error::{AppError, Result};
use crate::services::authenticator::TokenAuthenticator;
use crate::services::session_store::SessionStore;
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::sync::Arc;
use time::OffsetDateTime;

#[derive(Clone, Debug)]
struct Metrics {
    sessions_started_total: Counter<u64>,
    sessions_rotated_total: Counter<u64>,
    refresh_rejected_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("tokenkeeper");
        Self {
            sessions_started_total: meter
                .u64_counter("sessions_started_total")
                .with_description("Total number of sessions started by login")
                .build(),
            sessions_rotated_total: meter
                .u64_counter("sessions_rotated_total")
                .with_description("Total number of successful refresh token rotations")
                .build(),
            refresh_rejected_total: meter
                .u64_counter("refresh_rejected_total")
                .with_description("Total number of rejected refresh attempts, by reason")
                .build(),
        }
    }
}

/// Outcome of checking a refresh token, keeping the stored hash when it matched.
enum Checked {
    Valid { stored_hash: String },
    Rejected(RefreshValidation),
}

/// Runs the session protocol: login, refresh token validation and rotation.
///
/// Holds no locks. Races between concurrent logins and rotations for the same user are
/// settled by the store's conditional `establish` and `replace` operations.
#[derive(Clone, Debug)]
pub struct SessionService {
    config: AuthConfig,
    authenticator: Arc<dyn TokenAuthenticator>,
    store: Arc<dyn SessionStore>,
    metrics: Metrics,
}

impl SessionService {
    #[must_use]
    pub fn new(config: AuthConfig, authenticator: Arc<dyn TokenAuthenticator>, store: Arc<dyn SessionStore>) -> Self {
        Self { config, authenticator, store, metrics: Metrics::new() }
    }

    /// Creates the user's only session, dropping any session they already had.
    ///
    /// # Errors
    /// Returns an error if hashing, signing or any store call fails. Nothing is returned to
    /// the caller on partial failure.
    #[tracing::instrument(skip(self), err(level = "warn"))]
    pub async fn start_session(&self, user_name: &str) -> Result<TokenPair> {
        let refresh_token = self.authenticator.mint_refresh_token();
        let refresh_hash = self.hash_for_storage(&refresh_token).await?;

        let purged = self.store.establish(user_name, &refresh_hash, OffsetDateTime::now_utc()).await?;
        if purged > 0 {
            tracing::info!(purged = %purged, "Previous session superseded by login");
        }

        let access_token = self.issue_access_token(user_name)?;

        tracing::info!("Session started");
        self.metrics.sessions_started_total.add(1, &[]);

        Ok(TokenPair { user_name: user_name.to_string(), access_token, refresh_token })
    }

    /// Checks a presented refresh token against the user's session.
    ///
    /// An expired session is deleted as a side effect, so a later check reports `NotFound`.
    ///
    /// # Errors
    /// Returns an error only for store or hashing failures, never for a bad token.
    #[tracing::instrument(skip(self, provided), err(level = "warn"))]
    pub async fn validate_refresh_token(&self, provided: &str, user_name: &str) -> Result<RefreshValidation> {
        match self.check_refresh_token(provided, user_name).await? {
            Checked::Valid { .. } => Ok(RefreshValidation::Valid),
            Checked::Rejected(outcome) => Ok(outcome),
        }
    }

    /// Boolean view of [`SessionService::validate_refresh_token`].
    ///
    /// # Errors
    /// Same as [`SessionService::validate_refresh_token`].
    pub async fn is_refresh_token_valid(&self, provided: &str, user_name: &str) -> Result<bool> {
        Ok(self.validate_refresh_token(provided, user_name).await?.is_valid())
    }

    /// Exchanges a valid refresh token for a new one, replacing the stored session.
    ///
    /// # Errors
    /// Returns `AppError::AuthError` if `old_token` is not valid for `user_name`, including when a
    /// concurrent rotation or login replaced the session first.
    #[tracing::instrument(skip(self, old_token), err(level = "warn"))]
    pub async fn rotate_session(&self, old_token: &str, user_name: &str) -> Result<String> {
        let old_hash = match self.check_refresh_token(old_token, user_name).await? {
            Checked::Valid { stored_hash } => stored_hash,
            Checked::Rejected(_) => return Err(AppError::AuthError),
        };

        let new_token = self.authenticator.mint_refresh_token();
        let new_hash = self.hash_for_storage(&new_token).await?;

        if !self.store.replace(user_name, &old_hash, &new_hash, OffsetDateTime::now_utc()).await? {
            tracing::warn!("Rotation lost to a concurrent session change");
            self.metrics.refresh_rejected_total.add(1, &[KeyValue::new("reason", "superseded")]);
            return Err(AppError::AuthError);
        }

        tracing::info!("Refresh token rotated");
        self.metrics.sessions_rotated_total.add(1, &[]);

        Ok(new_token)
    }

    /// Rotates the refresh token and issues a fresh access token in one step.
    ///
    /// # Errors
    /// Same as [`SessionService::rotate_session`], plus signing failures.
    pub async fn refresh_session(&self, old_token: &str, user_name: &str) -> Result<TokenPair> {
        let refresh_token = self.rotate_session(old_token, user_name).await?;
        let access_token = self.issue_access_token(user_name)?;

        Ok(TokenPair { user_name: user_name.to_string(), access_token, refresh_token })
    }

    /// # Errors
    /// Returns `AppError::Crypto` if signing fails.
    pub fn issue_access_token(&self, user_name: &str) -> Result<String> {
        self.authenticator.mint_access_token(user_name, self.config.access_token_ttl())
    }

    /// Deletes every session of `user_name`. Returns how many were removed.
    ///
    /// # Errors
    /// Returns an error if a store call fails.
    #[tracing::instrument(skip(self), err(level = "warn"))]
    pub async fn enforce_single_session(&self, user_name: &str) -> Result<u64> {
        if self.store.count(user_name).await? == 0 {
            return Ok(0);
        }

        let removed = self.store.delete_by_user(user_name).await?;
        tracing::info!(removed = %removed, "Existing sessions purged");
        Ok(removed)
    }

    async fn check_refresh_token(&self, provided: &str, user_name: &str) -> Result<Checked> {
        let Some(stored_hash) = self.store.find_hash(user_name).await? else {
            return Ok(self.reject(RefreshValidation::NotFound));
        };

        if !self.verify(provided, &stored_hash).await? {
            return Ok(self.reject(RefreshValidation::Mismatch));
        }

        // Gone between the two reads: a concurrent rotation or login replaced it.
        let Some(created_at) = self.store.created_at(&stored_hash, user_name).await? else {
            return Ok(self.reject(RefreshValidation::NotFound));
        };

        if session::is_expired(created_at, self.config.refresh_token_ttl(), OffsetDateTime::now_utc()) {
            self.store.delete_by_hash(&stored_hash).await?;
            return Ok(self.reject(RefreshValidation::Expired));
        }

        Ok(Checked::Valid { stored_hash })
    }

    fn reject(&self, outcome: RefreshValidation) -> Checked {
        tracing::info!(reason = %outcome, "Refresh token rejected");
        self.metrics.refresh_rejected_total.add(1, &[KeyValue::new("reason", outcome.as_str())]);
        Checked::Rejected(outcome)
    }

    async fn hash_for_storage(&self, token: &str) -> Result<String> {
        let authenticator = Arc::clone(&self.authenticator);
        let token = token.to_string();
        tokio::task::spawn_blocking(move || authenticator.hash_for_storage(&token))
            .await
            .map_err(|e| blocking_task_failed("hash_for_storage", &e))?
    }

    async fn verify(&self, provided: &str, stored_hash: &str) -> Result<bool> {
        let authenticator = Arc::clone(&self.authenticator);
        let provided = provided.to_string();
        let stored_hash = stored_hash.to_string();
        tokio::task::spawn_blocking(move || authenticator.verify(&provided, &stored_hash))
            .await
            .map_err(|e| blocking_task_failed("verify", &e))
    }
}

fn blocking_task_failed(op: &'static str, err: &tokio::task::JoinError) -> AppError {
    tracing::error!(op, error = %err, panicked = err.is_panic(), "Blocking crypto task failed");
    AppError::Internal
}
