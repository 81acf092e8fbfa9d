use crate::error::Result;
use async_trait::async_trait;
use time::OffsetDateTime;

/// Durable storage for session records. Holds no protocol logic of its own.
///
/// Implementations must be safe for concurrent use. `establish` and `replace` are the only
/// mutating operations the session protocol depends on for its single-session guarantee,
/// so both must be atomic with respect to each other for the same user.
#[async_trait]
pub trait SessionStore: Send + Sync + std::fmt::Debug {
    /// Adds the user's session record.
    ///
    /// # Errors
    /// Returns `AppError::DuplicateSession` if the user already has one.
    async fn insert(&self, user_name: &str, token_hash: &str, created_at: OffsetDateTime) -> Result<()>;

    /// Returns the number of records removed.
    async fn delete_by_hash(&self, token_hash: &str) -> Result<u64>;

    /// Returns the number of records removed.
    async fn delete_by_user(&self, user_name: &str) -> Result<u64>;

    async fn count(&self, user_name: &str) -> Result<i64>;

    /// Hash of the user's current refresh token, if the user has a session.
    async fn find_hash(&self, user_name: &str) -> Result<Option<String>>;

    async fn created_at(&self, token_hash: &str, user_name: &str) -> Result<Option<OffsetDateTime>>;

    /// Swaps the record holding `old_hash` for a new one, as a single conditional step.
    ///
    /// Returns `false` without writing anything if no record for `user_name` holds `old_hash`
    /// anymore, which is how a concurrent rotation that got there first shows up.
    async fn replace(
        &self,
        user_name: &str,
        old_hash: &str,
        new_hash: &str,
        created_at: OffsetDateTime,
    ) -> Result<bool>;

    /// Removes every record for `user_name` and inserts a fresh one, atomically.
    /// Returns how many records were purged.
    async fn establish(&self, user_name: &str, token_hash: &str, created_at: OffsetDateTime) -> Result<u64>;

    /// Removes records created before `cutoff`. Returns the number removed.
    async fn delete_created_before(&self, cutoff: OffsetDateTime) -> Result<u64>;

    /// Cheap connectivity probe.
    async fn ping(&self) -> Result<()>;
}
