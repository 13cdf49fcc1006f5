//! PgUserStore integration tests against a live Postgres
//!
//! Skipped unless `POLARWAY_TEST_DATABASE_URL` points at a disposable
//! database. Every test uses fresh random logins so runs never collide.

use chrono::Duration;
use jsonwebtoken::Algorithm;
use tokio::sync::OnceCell;
use uuid::Uuid;

use polarway_auth::{
    token_digest, with_tx, Argon2Hasher, AuthConfig, AuthError, PgUserStore, SessionService,
    TokenCodec, UniqueField, UserStore,
};

// Concurrent CREATE TABLE IF NOT EXISTS can still collide in pg_type
static SCHEMA: OnceCell<()> = OnceCell::const_new();

async fn test_store() -> Option<PgUserStore> {
    let url = match std::env::var("POLARWAY_TEST_DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("POLARWAY_TEST_DATABASE_URL not set, skipping");
            return None;
        }
    };
    let config = AuthConfig::new(url).with_max_connections(4);
    let store = PgUserStore::connect(&config).await.unwrap();
    SCHEMA
        .get_or_init(|| async { store.migrate().await.unwrap() })
        .await;
    Some(store)
}

fn unique(prefix: &str) -> (String, String) {
    let tag = Uuid::new_v4().simple().to_string();
    (format!("{prefix}-{tag}"), format!("{prefix}-{tag}@x.com"))
}

#[tokio::test]
async fn test_migrate_is_idempotent() {
    let Some(store) = test_store().await else { return };
    store.migrate().await.unwrap();
    store.migrate().await.unwrap();
}

#[tokio::test]
async fn test_insert_defaults_and_lookup() {
    let Some(store) = test_store().await else { return };
    let (login, email) = unique("alice");

    let tx = store.begin_tx().await.unwrap();
    store.insert(&tx, &login, &email, "hash").await.unwrap();
    store.commit(tx).await.unwrap();

    let tx = store.begin_tx().await.unwrap();
    let by_login = store.get_by_login(&tx, &login).await.unwrap();
    let by_email = store.get_by_email(&tx, &email).await.unwrap();
    store.rollback(tx).await.unwrap();

    assert_eq!(by_login, by_email);
    assert!(by_login.is_active);
    assert!(!by_login.is_verified);
    assert_eq!(by_login.role, "user");
    assert!(by_login.refresh_token_hash.is_empty());
}

#[tokio::test]
async fn test_unique_violation_names_field() {
    let Some(store) = test_store().await else { return };
    let (login, email) = unique("bob");

    let tx = store.begin_tx().await.unwrap();
    store.insert(&tx, &login, &email, "hash").await.unwrap();
    store.commit(tx).await.unwrap();

    let tx = store.begin_tx().await.unwrap();
    let err = store.insert(&tx, &login, "fresh@x.com", "hash").await.unwrap_err();
    assert!(matches!(err, AuthError::AlreadyExists { field: UniqueField::Login }));
    store.rollback(tx).await.unwrap();

    let tx = store.begin_tx().await.unwrap();
    let (other_login, _) = unique("carol");
    let err = store.insert(&tx, &other_login, &email, "hash").await.unwrap_err();
    assert!(matches!(err, AuthError::AlreadyExists { field: UniqueField::Email }));
    store.rollback(tx).await.unwrap();
}

#[tokio::test]
async fn test_failed_work_rolls_back() {
    let Some(store) = test_store().await else { return };
    let (login, email) = unique("dave");

    let result: Result<(), AuthError> = with_tx(&store, "test.rollback", |tx| {
        let store = store.clone();
        let (login, email) = (login.clone(), email.clone());
        async move {
            store.insert(&tx, &login, &email, "hash").await?;
            Err(AuthError::Internal("abort".into()))
        }
    })
    .await;
    assert!(result.is_err());

    let tx = store.begin_tx().await.unwrap();
    assert!(matches!(
        store.get_by_login(&tx, &login).await,
        Err(AuthError::UserNotFound)
    ));
    store.rollback(tx).await.unwrap();
}

#[tokio::test]
async fn test_update_auth_state_keeps_verified() {
    let Some(store) = test_store().await else { return };
    let (login, email) = unique("erin");

    let tx = store.begin_tx().await.unwrap();
    store.insert(&tx, &login, &email, "hash").await.unwrap();
    let mut user = store.get_by_login(&tx, &login).await.unwrap();
    user.is_verified = true;
    user.refresh_token_hash = token_digest("refresh");
    store.update_auth_state(&tx, &user).await.unwrap();
    store.commit(tx).await.unwrap();

    let tx = store.begin_tx().await.unwrap();
    user.is_verified = false;
    user.refresh_token_hash.clear();
    store.update_auth_state(&tx, &user).await.unwrap();
    let stored = store.get_by_login(&tx, &login).await.unwrap();
    store.commit(tx).await.unwrap();

    assert!(stored.is_verified);
    assert!(stored.refresh_token_hash.is_empty());
}

#[tokio::test]
async fn test_session_flow_on_postgres() {
    let Some(store) = test_store().await else { return };
    let (login, email) = unique("frank");

    let codec = TokenCodec::new(
        "test-secret-jwt-key-min-32-chars!!",
        Algorithm::HS256,
        Duration::minutes(30),
    );
    let sessions = SessionService::new(store, codec, Argon2Hasher::with_cost(8, 1, 1).unwrap());

    let confirmation = sessions.register(&login, &email, "pw1").await.unwrap();
    let pair = sessions.confirm(&confirmation).await.unwrap();
    let access = sessions.refresh(&pair.refresh_token).await.unwrap();

    let me = sessions.current_user(&access).await.unwrap();
    assert_eq!(me.login, login);
    assert!(me.is_verified);

    sessions.log_out(&access).await.unwrap();
    let err = sessions.refresh(&pair.refresh_token).await.unwrap_err();
    assert!(matches!(err, AuthError::StaleOrRevokedToken));
}
