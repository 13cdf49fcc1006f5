//! MemoryUserStore — in-process `UserStore` with real transaction semantics
//!
//! Writes are staged per transaction, visible only through that
//! transaction's handle, applied on commit and discarded on rollback or
//! drop. Uniqueness is checked at insert time and re-checked at commit, so
//! two transactions racing on the same login behave like Postgres.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::auth::types::{User, DEFAULT_ROLE};
use crate::error::{AuthError, Result, UniqueField};

use super::UserStore;

#[derive(Default)]
struct Shared {
    rows: Mutex<BTreeMap<i64, User>>,
    next_id: AtomicI64,
    open_txs: AtomicUsize,
    fail_commits: AtomicBool,
}

impl Shared {
    fn alloc_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// In-memory user table, cheap to clone (shared state)
#[derive(Clone, Default)]
pub struct MemoryUserStore {
    shared: Arc<Shared>,
}

struct TxState {
    shared: Arc<Shared>,
    staged: BTreeMap<i64, User>,
    finished: bool,
}

impl TxState {
    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.shared.open_txs.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.finished {
            return Err(AuthError::storage("memory", "transaction already finished"));
        }
        Ok(())
    }

    fn find(&self, committed: &BTreeMap<i64, User>, pred: impl Fn(&User) -> bool) -> Option<User> {
        self.staged
            .values()
            .find(|u| pred(*u))
            .or_else(|| {
                committed
                    .values()
                    .find(|u| !self.staged.contains_key(&u.id) && pred(*u))
            })
            .cloned()
    }

    fn current(&self, committed: &BTreeMap<i64, User>, id: i64) -> Option<User> {
        self.staged.get(&id).or_else(|| committed.get(&id)).cloned()
    }
}

impl Drop for TxState {
    fn drop(&mut self) {
        if !self.finished {
            debug!(staged = self.staged.len(), "memory transaction dropped, discarding writes");
        }
        self.finish();
    }
}

/// Handle to one open memory transaction
#[derive(Clone)]
pub struct MemoryTx {
    state: Arc<Mutex<TxState>>,
}

fn conflict(rows: &BTreeMap<i64, User>, candidate: &User) -> Option<UniqueField> {
    let others = || rows.values().filter(|u| u.id != candidate.id);
    if others().any(|u| u.login == candidate.login) {
        return Some(UniqueField::Login);
    }
    if others().any(|u| u.email == candidate.email) {
        return Some(UniqueField::Email);
    }
    None
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed users
    pub fn len(&self) -> usize {
        self.shared.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Transactions begun but neither committed, rolled back nor dropped
    pub fn open_transactions(&self) -> usize {
        self.shared.open_txs.load(Ordering::SeqCst)
    }

    /// Committed row for `login`, outside any transaction
    pub fn snapshot(&self, login: &str) -> Option<User> {
        self.shared
            .rows
            .lock()
            .values()
            .find(|u| u.login == login)
            .cloned()
    }

    /// Insert and commit a user directly, returning its id
    pub fn seed(&self, login: &str, email: &str, password_hash: &str) -> i64 {
        let id = self.shared.alloc_id();
        self.shared
            .rows
            .lock()
            .insert(id, new_user(id, login, email, password_hash));
        id
    }

    /// Make every subsequent commit fail with a storage error
    pub fn fail_commits(&self, fail: bool) {
        self.shared.fail_commits.store(fail, Ordering::SeqCst);
    }
}

fn new_user(id: i64, login: &str, email: &str, password_hash: &str) -> User {
    User {
        id,
        login: login.to_string(),
        email: email.to_string(),
        password_hash: password_hash.to_string(),
        is_active: true,
        is_verified: false,
        role: DEFAULT_ROLE.to_string(),
        refresh_token_hash: String::new(),
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    type Tx = MemoryTx;

    async fn begin_tx(&self) -> Result<MemoryTx> {
        self.shared.open_txs.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryTx {
            state: Arc::new(Mutex::new(TxState {
                shared: Arc::clone(&self.shared),
                staged: BTreeMap::new(),
                finished: false,
            })),
        })
    }

    async fn commit(&self, tx: MemoryTx) -> Result<()> {
        let mut state = tx.state.lock();
        state.ensure_open()?;
        let staged = std::mem::take(&mut state.staged);
        state.finish();

        if self.shared.fail_commits.load(Ordering::SeqCst) {
            return Err(AuthError::storage("memory.commit", "injected commit failure"));
        }

        let mut rows = self.shared.rows.lock();
        for user in staged.values() {
            if let Some(field) = conflict(&rows, user) {
                return Err(AuthError::AlreadyExists { field });
            }
        }
        // Merge like `is_verified = is_verified OR $2`: the flag never resets
        for (id, user) in staged {
            let merged = match rows.get(&id) {
                Some(current) => User {
                    is_verified: current.is_verified || user.is_verified,
                    ..user
                },
                None => user,
            };
            rows.insert(id, merged);
        }
        Ok(())
    }

    async fn rollback(&self, tx: MemoryTx) -> Result<()> {
        let mut state = tx.state.lock();
        state.staged.clear();
        state.finish();
        Ok(())
    }

    async fn get_by_login(&self, tx: &MemoryTx, login: &str) -> Result<User> {
        let state = tx.state.lock();
        state.ensure_open()?;
        let rows = self.shared.rows.lock();
        state
            .find(&rows, |u| u.login == login)
            .ok_or(AuthError::UserNotFound)
    }

    async fn get_by_email(&self, tx: &MemoryTx, email: &str) -> Result<User> {
        let state = tx.state.lock();
        state.ensure_open()?;
        let rows = self.shared.rows.lock();
        state
            .find(&rows, |u| u.email == email)
            .ok_or(AuthError::UserNotFound)
    }

    async fn insert(
        &self,
        tx: &MemoryTx,
        login: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<()> {
        let mut state = tx.state.lock();
        state.ensure_open()?;
        let rows = self.shared.rows.lock();

        if state.find(&rows, |u| u.login == login).is_some() {
            return Err(AuthError::AlreadyExists { field: UniqueField::Login });
        }
        if state.find(&rows, |u| u.email == email).is_some() {
            return Err(AuthError::AlreadyExists { field: UniqueField::Email });
        }
        drop(rows);

        let id = self.shared.alloc_id();
        state.staged.insert(id, new_user(id, login, email, password_hash));
        Ok(())
    }

    async fn update_auth_state(&self, tx: &MemoryTx, user: &User) -> Result<()> {
        let mut state = tx.state.lock();
        state.ensure_open()?;
        let rows = self.shared.rows.lock();

        let mut row = state.current(&rows, user.id).ok_or(AuthError::UserNotFound)?;
        drop(rows);

        row.refresh_token_hash = user.refresh_token_hash.clone();
        row.is_verified = row.is_verified || user.is_verified;
        state.staged.insert(row.id, row);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_visible_only_inside_tx() {
        let store = MemoryUserStore::new();
        let tx = store.begin_tx().await.unwrap();
        store.insert(&tx, "alice", "a@x.com", "h").await.unwrap();

        assert!(store.get_by_login(&tx, "alice").await.is_ok());
        assert!(store.snapshot("alice").is_none());

        let other = store.begin_tx().await.unwrap();
        assert!(matches!(
            store.get_by_login(&other, "alice").await,
            Err(AuthError::UserNotFound)
        ));
        store.rollback(other).await.unwrap();

        store.commit(tx).await.unwrap();
        let alice = store.snapshot("alice").unwrap();
        assert!(alice.is_active);
        assert!(!alice.is_verified);
        assert_eq!(alice.role, DEFAULT_ROLE);
        assert!(alice.refresh_token_hash.is_empty());
    }

    #[tokio::test]
    async fn test_unique_constraints() {
        let store = MemoryUserStore::new();
        store.seed("alice", "a@x.com", "h");

        let tx = store.begin_tx().await.unwrap();
        let err = store.insert(&tx, "alice", "other@x.com", "h").await.unwrap_err();
        assert!(matches!(err, AuthError::AlreadyExists { field: UniqueField::Login }));

        let err = store.insert(&tx, "bob", "a@x.com", "h").await.unwrap_err();
        assert!(matches!(err, AuthError::AlreadyExists { field: UniqueField::Email }));
        store.rollback(tx).await.unwrap();
    }

    #[tokio::test]
    async fn test_racing_inserts_conflict_at_commit() {
        let store = MemoryUserStore::new();
        let t1 = store.begin_tx().await.unwrap();
        let t2 = store.begin_tx().await.unwrap();
        store.insert(&t1, "alice", "a@x.com", "h").await.unwrap();
        store.insert(&t2, "alice", "b@x.com", "h").await.unwrap();

        store.commit(t1).await.unwrap();
        let err = store.commit(t2).await.unwrap_err();
        assert!(matches!(err, AuthError::AlreadyExists { field: UniqueField::Login }));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_tx_discards_writes() {
        let store = MemoryUserStore::new();
        let id = store.seed("alice", "a@x.com", "h");

        {
            let tx = store.begin_tx().await.unwrap();
            let mut user = store.get_by_login(&tx, "alice").await.unwrap();
            assert_eq!(user.id, id);
            user.refresh_token_hash = "digest".into();
            store.update_auth_state(&tx, &user).await.unwrap();
            assert_eq!(store.open_transactions(), 1);
        }

        assert_eq!(store.open_transactions(), 0);
        assert!(store.snapshot("alice").unwrap().refresh_token_hash.is_empty());
    }

    #[tokio::test]
    async fn test_verified_never_reset() {
        let store = MemoryUserStore::new();
        store.seed("alice", "a@x.com", "h");

        let tx = store.begin_tx().await.unwrap();
        let mut user = store.get_by_login(&tx, "alice").await.unwrap();
        user.is_verified = true;
        store.update_auth_state(&tx, &user).await.unwrap();
        store.commit(tx).await.unwrap();

        let tx = store.begin_tx().await.unwrap();
        let mut stale = store.get_by_login(&tx, "alice").await.unwrap();
        stale.is_verified = false;
        store.update_auth_state(&tx, &stale).await.unwrap();
        store.commit(tx).await.unwrap();

        assert!(store.snapshot("alice").unwrap().is_verified);
    }

    #[tokio::test]
    async fn test_stale_login_commit_keeps_confirmation() {
        let store = MemoryUserStore::new();
        store.seed("alice", "a@x.com", "h");

        // Login reads the unverified row first
        let login_tx = store.begin_tx().await.unwrap();
        let mut user = store.get_by_login(&login_tx, "alice").await.unwrap();
        user.refresh_token_hash = "login-digest".into();
        store.update_auth_state(&login_tx, &user).await.unwrap();

        // Confirmation commits in between
        let confirm_tx = store.begin_tx().await.unwrap();
        let mut confirmed = store.get_by_email(&confirm_tx, "a@x.com").await.unwrap();
        confirmed.is_verified = true;
        confirmed.refresh_token_hash = "confirm-digest".into();
        store.update_auth_state(&confirm_tx, &confirmed).await.unwrap();
        store.commit(confirm_tx).await.unwrap();
        assert!(store.snapshot("alice").unwrap().is_verified);

        store.commit(login_tx).await.unwrap();
        let alice = store.snapshot("alice").unwrap();
        assert!(alice.is_verified);
        assert_eq!(alice.refresh_token_hash, "login-digest");
    }

    #[tokio::test]
    async fn test_finished_tx_rejects_use() {
        let store = MemoryUserStore::new();
        let tx = store.begin_tx().await.unwrap();
        store.commit(tx.clone()).await.unwrap();
        assert!(matches!(
            store.get_by_login(&tx, "alice").await,
            Err(AuthError::Storage { .. })
        ));
    }

    #[tokio::test]
    async fn test_injected_commit_failure() {
        let store = MemoryUserStore::new();
        store.fail_commits(true);
        let tx = store.begin_tx().await.unwrap();
        store.insert(&tx, "alice", "a@x.com", "h").await.unwrap();
        assert!(matches!(store.commit(tx).await, Err(AuthError::Storage { .. })));
        assert!(store.is_empty());
    }
}
