use crate::domain::auth::Claims;
use crate::error::{AppError, Result};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::{RngCore, rngs::OsRng};
use std::fmt;
use std::time::Duration;
use time::OffsetDateTime;

/// Length in bytes of a refresh token before hex encoding.
pub const REFRESH_TOKEN_BYTES: usize = 32;

/// Cryptographic capabilities the session protocol relies on.
///
/// Every method is stateless apart from the signing secret held by the implementation.
pub trait TokenAuthenticator: Send + Sync + fmt::Debug {
    /// Signs a token asserting `subject`, valid for `ttl` from now.
    ///
    /// # Errors
    /// Returns `AppError::Crypto` if signing fails.
    fn mint_access_token(&self, subject: &str, ttl: Duration) -> Result<String>;

    /// Checks signature and expiry of an access token.
    ///
    /// # Errors
    /// Returns `AppError::AuthError` if the token is malformed, forged or expired.
    fn verify_access_token(&self, token: &str) -> Result<Claims>;

    /// Generates a new opaque refresh token from a cryptographically secure source.
    fn mint_refresh_token(&self) -> String;

    /// Produces a salted, slow hash of `token` for storage at rest.
    ///
    /// # Errors
    /// Returns `AppError::Crypto` if hashing fails.
    fn hash_for_storage(&self, token: &str) -> Result<String>;

    /// Returns `true` only if `provided` matches `stored_hash`. Malformed hashes are a plain mismatch.
    fn verify(&self, provided: &str, stored_hash: &str) -> bool;
}

/// HS512 access tokens, hex refresh tokens from the OS RNG and Argon2 storage hashes.
#[derive(Clone)]
pub struct Authenticator {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticator").finish_non_exhaustive()
    }
}

impl Authenticator {
    /// # Errors
    /// Returns `AppError::Config` if `signing_secret` is empty.
    pub fn new(signing_secret: &str) -> Result<Self> {
        if signing_secret.is_empty() {
            return Err(AppError::Config("empty signing secret".to_string()));
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(signing_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(signing_secret.as_bytes()),
        })
    }
}

impl TokenAuthenticator for Authenticator {
    fn mint_access_token(&self, subject: &str, ttl: Duration) -> Result<String> {
        let now = u64::try_from(OffsetDateTime::now_utc().unix_timestamp()).unwrap_or(0);
        let claims = Claims::new(subject, now, ttl.as_secs());

        encode(&Header::new(Algorithm::HS512), &claims, &self.encoding_key).map_err(|e| AppError::Crypto(e.to_string()))
    }

    fn verify_access_token(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS512);
        validation.leeway = 0;

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|_| AppError::AuthError)?;

        Ok(token_data.claims)
    }

    fn mint_refresh_token(&self) -> String {
        let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    #[tracing::instrument(level = "debug", skip_all, err)]
    fn hash_for_storage(&self, token: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(token.as_bytes(), &salt)
            .map_err(|e| AppError::Crypto(e.to_string()))?
            .to_string();
        Ok(hash)
    }

    fn verify(&self, provided: &str, stored_hash: &str) -> bool {
        PasswordHash::new(stored_hash)
            .is_ok_and(|parsed| Argon2::default().verify_password(provided.as_bytes(), &parsed).is_ok())
    }
}
