#![allow(clippy::unwrap_used, clippy::panic, clippy::missing_panics_doc, missing_debug_implementations, unreachable_pub)]
//! Runs one behavioural contract against every `SessionStore` backend.
//!
//! The Postgres cases need a live database: `DATABASE_URL=postgres://... cargo test -- --ignored`.
use std::sync::Arc;
use time::OffsetDateTime;
use tokenkeeper::adapters::database::session_repo::PgSessionStore;
use tokenkeeper::adapters::database::{self, DbPool};
use tokenkeeper::adapters::memory::InMemorySessionStore;
use tokenkeeper::error::AppError;
use tokenkeeper::services::authenticator::{Authenticator, TokenAuthenticator};
use tokenkeeper::services::session_service::SessionService;
use tokenkeeper::services::session_store::SessionStore;
use uuid::Uuid;

mod common;

async fn get_test_pool() -> DbPool {
    common::setup_tracing();
    let config = common::get_test_config();

    let pool = database::init_pool(&config.database).await.expect("Failed to connect to DB. Is Postgres running?");
    tokenkeeper::run_migrations(&pool).await.expect("Failed to run migrations");

    pool
}

fn unique(prefix: &str) -> String {
    format!("{prefix}_{}", &Uuid::new_v4().to_string()[..8])
}

/// Behaviour every backend must share. Names and hashes are unique per run so the
/// Postgres cases can share a database.
async fn assert_store_contract(store: &dyn SessionStore) {
    let user = unique("user");
    let other = unique("other");
    let (h1, h2, h3, h4) = (unique("h1"), unique("h2"), unique("h3"), unique("h4"));
    // Postgres keeps microseconds.
    let now = OffsetDateTime::now_utc().replace_nanosecond(0).unwrap();

    store.ping().await.unwrap();
    assert_eq!(store.count(&user).await.unwrap(), 0);
    assert!(store.find_hash(&user).await.unwrap().is_none());

    // At most one record per user.
    store.insert(&user, &h1, now).await.unwrap();
    let err = store.insert(&user, &h2, now).await.unwrap_err();
    assert!(matches!(err, AppError::DuplicateSession(ref name) if *name == user), "unexpected error: {err:?}");
    assert_eq!(store.count(&user).await.unwrap(), 1);
    assert_eq!(store.find_hash(&user).await.unwrap(), Some(h1.clone()));
    assert_eq!(store.created_at(&h1, &user).await.unwrap(), Some(now));
    assert!(store.created_at(&h1, &other).await.unwrap().is_none());

    // Replace only succeeds against the current hash.
    assert!(store.replace(&user, &h1, &h2, now).await.unwrap());
    assert!(!store.replace(&user, &h1, &h3, now).await.unwrap());
    assert!(!store.replace(&other, &h2, &h3, now).await.unwrap());
    assert_eq!(store.count(&user).await.unwrap(), 1);
    assert_eq!(store.find_hash(&user).await.unwrap(), Some(h2.clone()));

    // Establish purges whatever was there.
    assert_eq!(store.establish(&user, &h3, now).await.unwrap(), 1);
    assert_eq!(store.establish(&other, &h4, now).await.unwrap(), 0);
    assert_eq!(store.find_hash(&user).await.unwrap(), Some(h3.clone()));

    assert_eq!(store.delete_by_hash(&h3).await.unwrap(), 1);
    assert_eq!(store.delete_by_hash(&h3).await.unwrap(), 0);
    assert_eq!(store.count(&user).await.unwrap(), 0);

    assert_eq!(store.delete_by_user(&other).await.unwrap(), 1);
    assert_eq!(store.delete_by_user(&other).await.unwrap(), 0);

    let stale = unique("stale");
    let fresh = unique("fresh");
    store.insert(&stale, &unique("h"), now - time::Duration::days(400)).await.unwrap();
    store.insert(&fresh, &unique("h"), now).await.unwrap();

    assert!(store.delete_created_before(now - time::Duration::days(365)).await.unwrap() >= 1);
    assert_eq!(store.count(&stale).await.unwrap(), 0);
    assert_eq!(store.count(&fresh).await.unwrap(), 1);

    store.delete_by_user(&fresh).await.unwrap();
}

#[tokio::test]
async fn test_memory_store_contract() {
    assert_store_contract(&InMemorySessionStore::new()).await;
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn test_pg_store_contract() {
    assert_store_contract(&PgSessionStore::new(get_test_pool().await)).await;
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn test_pg_concurrent_rotations_single_winner() {
    let pool = get_test_pool().await;
    let store = Arc::new(PgSessionStore::new(pool));
    let config = common::get_test_config();
    let authenticator: Arc<dyn TokenAuthenticator> = Arc::new(Authenticator::new(&config.auth.jwt_secret).unwrap());
    let service = SessionService::new(config.auth, authenticator, Arc::clone(&store) as Arc<dyn SessionStore>);
    let user = unique("race");

    let pair = service.start_session(&user).await.unwrap();

    let s1 = service.clone();
    let s2 = service.clone();
    let (t1, t2) = (pair.refresh_token.clone(), pair.refresh_token.clone());
    let (u1, u2) = (user.clone(), user.clone());
    let (a, b) = tokio::join!(
        tokio::spawn(async move { s1.rotate_session(&t1, &u1).await }),
        tokio::spawn(async move { s2.rotate_session(&t2, &u2).await }),
    );

    let successes = [a.unwrap(), b.unwrap()].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    assert_eq!(store.count(&user).await.unwrap(), 1);
}
