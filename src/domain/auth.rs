use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Claims carried by a signed access token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// User identity the token was issued to.
    pub sub: String,
    pub exp: u64,
    pub iat: u64,
    /// Unique per token, so two tokens for the same subject and TTL never collide.
    pub jti: Uuid,
}

impl Claims {
    #[must_use]
    pub fn new(subject: &str, issued_at: u64, ttl_secs: u64) -> Self {
        Self { sub: subject.to_string(), exp: issued_at.saturating_add(ttl_secs), iat: issued_at, jti: Uuid::new_v4() }
    }
}
