use std::fmt;
use std::time::Duration;
use time::OffsetDateTime;

/// A persisted session: one per user while it is active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub user_name: String,
    /// Salted hash of the current refresh token. The raw token is never stored.
    pub refresh_token_hash: String,
    pub created_at: OffsetDateTime,
}

impl SessionRecord {
    #[must_use]
    pub fn new(user_name: &str, refresh_token_hash: &str, created_at: OffsetDateTime) -> Self {
        Self {
            user_name: user_name.to_string(),
            refresh_token_hash: refresh_token_hash.to_string(),
            created_at,
        }
    }
}

/// A session created at `created_at` stops being valid once `ttl` has fully elapsed.
#[must_use]
pub fn is_expired(created_at: OffsetDateTime, ttl: Duration, now: OffsetDateTime) -> bool {
    let ttl = time::Duration::try_from(ttl).unwrap_or(time::Duration::MAX);
    created_at.checked_add(ttl).is_none_or(|deadline| deadline <= now)
}

/// Result of checking a presented refresh token against the stored session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshValidation {
    Valid,
    /// No session exists for the user.
    NotFound,
    /// A session exists but the token does not match its hash.
    Mismatch,
    /// The token matched but the session outlived its TTL. The record has been removed.
    Expired,
}

impl RefreshValidation {
    #[must_use]
    pub const fn is_valid(self) -> bool {
        matches!(self, Self::Valid)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::NotFound => "not_found",
            Self::Mismatch => "mismatch",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for RefreshValidation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub user_name: String,
    pub access_token: String,
    pub refresh_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_boundary() {
        let created = OffsetDateTime::now_utc();
        let ttl = Duration::from_secs(60);

        assert!(!is_expired(created, ttl, created));
        assert!(!is_expired(created, ttl, created + time::Duration::seconds(59)));
        assert!(is_expired(created, ttl, created + time::Duration::seconds(60)));
        assert!(is_expired(created, ttl, created + time::Duration::days(1)));
    }

    #[test]
    fn test_only_valid_is_valid() {
        assert!(RefreshValidation::Valid.is_valid());
        assert!(!RefreshValidation::NotFound.is_valid());
        assert!(!RefreshValidation::Mismatch.is_valid());
        assert!(!RefreshValidation::Expired.is_valid());
        assert_eq!(RefreshValidation::Expired.to_string(), "expired");
    }
}
