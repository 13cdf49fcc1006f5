//! User storage — capability trait, transaction scope, and adapters
//!
//! [`UserStore`] is the seam between the session protocol and the database.
//! All reads and writes take a transaction handle; [`with_tx`] owns the
//! commit/rollback discipline so use-cases never duplicate it.

pub mod memory;
pub mod postgres;

use std::future::Future;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::warn;

use crate::auth::types::User;
use crate::error::Result;

pub use memory::MemoryUserStore;
pub use postgres::PgUserStore;

/// Durable user records, accessed through explicit transactions
///
/// `Tx` is a cloneable handle to one open transaction. Dropping every clone
/// without calling [`commit`](UserStore::commit) discards its writes.
#[async_trait]
pub trait UserStore: Send + Sync {
    type Tx: Clone + Send + Sync;

    async fn begin_tx(&self) -> Result<Self::Tx>;

    async fn commit(&self, tx: Self::Tx) -> Result<()>;

    async fn rollback(&self, tx: Self::Tx) -> Result<()>;

    /// `AuthError::UserNotFound` when no row matches
    async fn get_by_login(&self, tx: &Self::Tx, login: &str) -> Result<User>;

    /// `AuthError::UserNotFound` when no row matches
    async fn get_by_email(&self, tx: &Self::Tx, email: &str) -> Result<User>;

    /// `AuthError::AlreadyExists { field }` on a login or email collision
    async fn insert(&self, tx: &Self::Tx, login: &str, email: &str, password_hash: &str)
        -> Result<()>;

    /// Persist `refresh_token_hash` and `is_verified` for `user.id`
    async fn update_auth_state(&self, tx: &Self::Tx, user: &User) -> Result<()>;
}

/// Run `work` inside one transaction
///
/// Commits when `work` returns `Ok`, rolls back when it returns `Err`, and on
/// a panic rolls back before resuming the unwind. Storage errors raised by
/// begin/commit are labelled with `op`.
pub async fn with_tx<S, T, F, Fut>(store: &S, op: &'static str, work: F) -> Result<T>
where
    S: UserStore + ?Sized,
    F: FnOnce(S::Tx) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let tx = store.begin_tx().await.map_err(|e| e.in_op(op))?;

    match AssertUnwindSafe(work(tx.clone())).catch_unwind().await {
        Ok(Ok(value)) => {
            store.commit(tx).await.map_err(|e| e.in_op(op))?;
            Ok(value)
        }
        Ok(Err(err)) => {
            if let Err(rb) = store.rollback(tx).await {
                warn!(op, error = ?rb, "rollback failed");
            }
            Err(err.in_op(op))
        }
        Err(panic) => {
            if let Err(rb) = store.rollback(tx).await {
                warn!(op, error = ?rb, "rollback after panic failed");
            }
            std::panic::resume_unwind(panic)
        }
    }
}
