//! PgUserStore — Postgres adapter for [`UserStore`] built on sqlx
//!
//! One row per user in the `auth` table (see `migrations/`). Unique
//! violations are told apart by constraint name so registration can report
//! which field collided. Driver errors are logged in full and surfaced as
//! `AuthError::Storage`, whose display carries no SQL.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::auth::types::User;
use crate::config::AuthConfig;
use crate::error::{AuthError, Result, UniqueField};

use super::UserStore;

const SCHEMA_SQL: &str = include_str!("../../migrations/0001_create_auth.sql");

/// SQLSTATE for unique_violation
pub const UNIQUE_VIOLATION: &str = "23505";
pub const LOGIN_CONSTRAINT: &str = "auth_login_key";
pub const EMAIL_CONSTRAINT: &str = "auth_email_key";

const SELECT_BY_LOGIN: &str = "SELECT id, login, email, password_hash, is_active, is_verified, role, refresh_token_hash \
     FROM auth WHERE login = $1";
const SELECT_BY_EMAIL: &str = "SELECT id, login, email, password_hash, is_active, is_verified, role, refresh_token_hash \
     FROM auth WHERE email = $1";
const INSERT_USER: &str = "INSERT INTO auth (login, email, password_hash) VALUES ($1, $2, $3)";
const UPDATE_AUTH_STATE: &str =
    "UPDATE auth SET refresh_token_hash = $1, is_verified = is_verified OR $2 WHERE id = $3";

/// Handle to one open Postgres transaction
///
/// The transaction is taken out on commit/rollback. If every clone is
/// dropped first, sqlx rolls it back.
#[derive(Clone)]
pub struct PgTx {
    inner: Arc<Mutex<Option<Transaction<'static, Postgres>>>>,
}

fn live<'a>(
    slot: &'a mut Option<Transaction<'static, Postgres>>,
    op: &'static str,
) -> Result<&'a mut Transaction<'static, Postgres>> {
    slot.as_mut()
        .ok_or_else(|| AuthError::storage(op, "transaction already finished"))
}

fn db_error(op: &'static str, err: sqlx::Error) -> AuthError {
    warn!(op, error = %err, "database operation failed");
    AuthError::storage(op, err)
}

fn insert_error(err: sqlx::Error) -> AuthError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some(UNIQUE_VIOLATION) {
            match db.constraint() {
                Some(LOGIN_CONSTRAINT) => {
                    return AuthError::AlreadyExists { field: UniqueField::Login }
                }
                Some(EMAIL_CONSTRAINT) => {
                    return AuthError::AlreadyExists { field: UniqueField::Email }
                }
                _ => {}
            }
        }
    }
    db_error("store.insert", err)
}

/// Postgres-backed user store
///
/// Thread-safe and cheap to clone: the pool is reference counted.
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    /// Connect a pool sized from the config
    pub async fn connect(config: &AuthConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await
            .map_err(|e| db_error("store.connect", e))?;
        info!(max_connections = config.max_connections, "Postgres user store connected");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the `auth` table if missing (idempotent)
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("store.migrate", e))?;
        info!("auth schema ready");
        Ok(())
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    type Tx = PgTx;

    async fn begin_tx(&self) -> Result<PgTx> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("store.begin", e))?;
        Ok(PgTx {
            inner: Arc::new(Mutex::new(Some(tx))),
        })
    }

    async fn commit(&self, tx: PgTx) -> Result<()> {
        let tx = tx
            .inner
            .lock()
            .await
            .take()
            .ok_or_else(|| AuthError::storage("store.commit", "transaction already finished"))?;
        tx.commit().await.map_err(|e| db_error("store.commit", e))
    }

    async fn rollback(&self, tx: PgTx) -> Result<()> {
        match tx.inner.lock().await.take() {
            Some(tx) => tx.rollback().await.map_err(|e| db_error("store.rollback", e)),
            None => Ok(()),
        }
    }

    async fn get_by_login(&self, tx: &PgTx, login: &str) -> Result<User> {
        let mut guard = tx.inner.lock().await;
        let conn = live(&mut guard, "store.get_by_login")?;
        sqlx::query_as::<_, User>(SELECT_BY_LOGIN)
            .bind(login)
            .fetch_optional(&mut **conn)
            .await
            .map_err(|e| db_error("store.get_by_login", e))?
            .ok_or(AuthError::UserNotFound)
    }

    async fn get_by_email(&self, tx: &PgTx, email: &str) -> Result<User> {
        let mut guard = tx.inner.lock().await;
        let conn = live(&mut guard, "store.get_by_email")?;
        sqlx::query_as::<_, User>(SELECT_BY_EMAIL)
            .bind(email)
            .fetch_optional(&mut **conn)
            .await
            .map_err(|e| db_error("store.get_by_email", e))?
            .ok_or(AuthError::UserNotFound)
    }

    async fn insert(&self, tx: &PgTx, login: &str, email: &str, password_hash: &str) -> Result<()> {
        let mut guard = tx.inner.lock().await;
        let conn = live(&mut guard, "store.insert")?;
        sqlx::query(INSERT_USER)
            .bind(login)
            .bind(email)
            .bind(password_hash)
            .execute(&mut **conn)
            .await
            .map_err(insert_error)?;
        Ok(())
    }

    async fn update_auth_state(&self, tx: &PgTx, user: &User) -> Result<()> {
        let mut guard = tx.inner.lock().await;
        let conn = live(&mut guard, "store.update_auth_state")?;
        let done = sqlx::query(UPDATE_AUTH_STATE)
            .bind(&user.refresh_token_hash)
            .bind(user.is_verified)
            .bind(user.id)
            .execute(&mut **conn)
            .await
            .map_err(|e| db_error("store.update_auth_state", e))?;
        if done.rows_affected() == 0 {
            return Err(AuthError::UserNotFound);
        }
        Ok(())
    }
}
