//! SessionService — the six session use-cases
//!
//! Each use-case is one short transaction against the [`UserStore`]. No
//! session state lives in memory between calls: it is carried by the
//! persisted refresh digest and by the self-verifying tokens.
//!
//! # Usage
//!
//! ```rust,no_run
//! use polarway_auth::{AuthConfig, PgUserStore, SessionService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AuthConfig::new("postgres://localhost/auth")
//!         .with_jwt_secret("my-production-secret");
//!     let store = PgUserStore::connect(&config).await?;
//!     store.migrate().await?;
//!
//!     let sessions = SessionService::from_config(store, &config);
//!
//!     // Register → confirmation token for out-of-band delivery
//!     let confirmation = sessions.register("alice", "a@x.com", "pw1").await?;
//!     let pair = sessions.confirm(&confirmation).await?;
//!
//!     // Exchange the refresh token for a fresh access token
//!     let access = sessions.refresh(&pair.refresh_token).await?;
//!     let me = sessions.current_user(&access).await?;
//!     assert!(me.is_verified);
//!
//!     sessions.log_out(&access).await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::config::AuthConfig;
use crate::error::{AuthError, Result};
use crate::store::{with_tx, UserStore};

use super::hasher::{Argon2Hasher, CredentialHasher};
use super::token::{token_digest, TokenCodec};
use super::types::{ClaimKind, TokenPair, UserProfile};

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AuthError::validation(format!("{field} is required")));
    }
    Ok(())
}

/// Translate a store miss into the error the caller is allowed to see
fn missing_user_as(err: AuthError, replacement: impl FnOnce() -> AuthError) -> AuthError {
    match err {
        AuthError::UserNotFound => replacement(),
        other => other,
    }
}

/// Hide primitive failures behind an operation-scoped internal error
fn at_boundary(op: &'static str, err: AuthError) -> AuthError {
    match err {
        AuthError::Signing(detail) | AuthError::Hashing(detail) => {
            error!(op, detail = %detail, "credential primitive failed");
            AuthError::Internal(format!("{op} failed"))
        }
        AuthError::UserNotFound => AuthError::InvalidCredentials,
        other => other,
    }
}

fn unknown_subject() -> AuthError {
    AuthError::InvalidToken("unknown subject".into())
}

/// Stateless session orchestrator
///
/// Cheap to clone; every collaborator is shared behind an `Arc`.
pub struct SessionService<S: UserStore, H: CredentialHasher = Argon2Hasher> {
    store: Arc<S>,
    codec: Arc<TokenCodec>,
    hasher: Arc<H>,
}

impl<S: UserStore, H: CredentialHasher> Clone for SessionService<S, H> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            codec: Arc::clone(&self.codec),
            hasher: Arc::clone(&self.hasher),
        }
    }
}

impl<S: UserStore> SessionService<S, Argon2Hasher> {
    /// Codec from the config's secret/algorithm/TTL, default Argon2id hasher
    pub fn from_config(store: S, config: &AuthConfig) -> Self {
        Self::new(store, TokenCodec::from_config(config), Argon2Hasher::new())
    }
}

impl<S: UserStore, H: CredentialHasher + 'static> SessionService<S, H> {
    pub fn new(store: S, codec: TokenCodec, hasher: H) -> Self {
        Self {
            store: Arc::new(store),
            codec: Arc::new(codec),
            hasher: Arc::new(hasher),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Run a CPU-bound hasher call on the blocking pool
    ///
    /// A panic in the hasher is resumed on the calling task so `with_tx`
    /// still rolls back.
    async fn off_runtime<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&H) -> Result<T> + Send + 'static,
    {
        let hasher = Arc::clone(&self.hasher);
        match tokio::task::spawn_blocking(move || work(&hasher)).await {
            Ok(result) => result,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(err) => Err(AuthError::Internal(format!("hasher task cancelled: {err}"))),
        }
    }

    async fn hash_password(&self, password: &str) -> Result<String> {
        let password = password.to_string();
        self.off_runtime(move |hasher| hasher.hash(&password)).await
    }

    async fn verify_password(&self, password: &str, hash: &str) -> Result<bool> {
        let (password, hash) = (password.to_string(), hash.to_string());
        self.off_runtime(move |hasher| hasher.verify(&password, &hash)).await
    }

    fn issue_pair(&self, login: &str) -> Result<TokenPair> {
        Ok(TokenPair {
            access_token: self.codec.issue_default(ClaimKind::Login, login)?,
            refresh_token: self.codec.issue_default(ClaimKind::Login, login)?,
        })
    }

    /// Create an account and return its email-confirmation token
    ///
    /// The token is issued inside the insert's transaction: if signing fails
    /// the row is rolled back.
    pub async fn register(&self, login: &str, email: &str, password: &str) -> Result<String> {
        const OP: &str = "session.register";
        require("login", login)?;
        require("email", email)?;
        require("password", password)?;

        let password_hash = self
            .hash_password(password)
            .await
            .map_err(|e| at_boundary(OP, e))?;

        let confirmation = with_tx(&*self.store, OP, |tx| async move {
            self.store.insert(&tx, login, email, &password_hash).await?;
            self.codec.issue_default(ClaimKind::Email, email)
        })
        .await
        .map_err(|e| at_boundary(OP, e))?;

        info!(login, email, "user registered, confirmation token issued");
        Ok(confirmation)
    }

    /// Password login; rotates the stored refresh digest
    ///
    /// Unknown login and wrong password both yield `InvalidCredentials`.
    pub async fn authenticate(&self, login: &str, password: &str) -> Result<TokenPair> {
        const OP: &str = "session.authenticate";
        require("login", login)?;
        require("password", password)?;

        let pair = with_tx(&*self.store, OP, |tx| async move {
            let mut user = match self.store.get_by_login(&tx, login).await {
                Err(AuthError::UserNotFound) => {
                    debug!(login, "login rejected: unknown login");
                    return Err(AuthError::InvalidCredentials);
                }
                found => found?,
            };

            if !self.verify_password(password, &user.password_hash).await? {
                debug!(login, "login rejected: password mismatch");
                return Err(AuthError::InvalidCredentials);
            }

            let pair = self.issue_pair(&user.login)?;
            user.refresh_token_hash = token_digest(&pair.refresh_token);
            self.store.update_auth_state(&tx, &user).await?;
            Ok(pair)
        })
        .await
        .map_err(|e| at_boundary(OP, e))?;

        info!(login, "user authenticated");
        Ok(pair)
    }

    /// Email confirmation; marks the account verified and opens a session
    pub async fn confirm(&self, confirmation_token: &str) -> Result<TokenPair> {
        const OP: &str = "session.confirm";
        require("token", confirmation_token)?;

        let email = self
            .codec
            .verify_and_extract(confirmation_token, ClaimKind::Email)?;

        let (login, pair) = with_tx(&*self.store, OP, |tx| async move {
            let mut user = self
                .store
                .get_by_email(&tx, &email)
                .await
                .map_err(|e| missing_user_as(e, unknown_subject))?;

            user.is_verified = true;
            let pair = self.issue_pair(&user.login)?;
            user.refresh_token_hash = token_digest(&pair.refresh_token);
            self.store.update_auth_state(&tx, &user).await?;
            Ok::<_, AuthError>((user.login, pair))
        })
        .await
        .map_err(|e| at_boundary(OP, e))?;

        info!(login = %login, "email confirmed");
        Ok(pair)
    }

    /// Exchange a live refresh token for a new access token
    ///
    /// The presented token must match the stored digest. The digest itself
    /// is left in place.
    pub async fn refresh(&self, refresh_token: &str) -> Result<String> {
        const OP: &str = "session.refresh";
        require("refresh token", refresh_token)?;

        let login = self
            .codec
            .verify_and_extract(refresh_token, ClaimKind::Login)?;
        let presented = token_digest(refresh_token);

        let user = with_tx(&*self.store, OP, |tx| async move {
            let user = self
                .store
                .get_by_login(&tx, &login)
                .await
                .map_err(|e| missing_user_as(e, unknown_subject))?;

            if !user.has_session() || user.refresh_token_hash != presented {
                debug!(login = %user.login, "refresh rejected: digest mismatch");
                return Err(AuthError::StaleOrRevokedToken);
            }
            Ok(user)
        })
        .await
        .map_err(|e| at_boundary(OP, e))?;

        let access = self
            .codec
            .issue_default(ClaimKind::Login, &user.login)
            .map_err(|e| at_boundary(OP, e))?;

        info!(login = %user.login, "access token refreshed");
        Ok(access)
    }

    /// Profile of the access token's owner
    pub async fn current_user(&self, access_token: &str) -> Result<UserProfile> {
        const OP: &str = "session.current_user";
        require("access token", access_token)?;

        let login = self
            .codec
            .verify_and_extract(access_token, ClaimKind::Login)?;

        let profile = with_tx(&*self.store, OP, |tx| async move {
            self.store
                .get_by_login(&tx, &login)
                .await
                .map(|user| user.profile())
                .map_err(|e| missing_user_as(e, unknown_subject))
        })
        .await
        .map_err(|e| at_boundary(OP, e))?;

        debug!(login = %profile.login, "current user resolved");
        Ok(profile)
    }

    /// Revoke the refresh session of the access token's owner
    ///
    /// Already-issued access tokens stay valid until they expire.
    pub async fn log_out(&self, access_token: &str) -> Result<()> {
        const OP: &str = "session.log_out";
        require("access token", access_token)?;

        let login = self
            .codec
            .verify_and_extract(access_token, ClaimKind::Login)?;

        with_tx(&*self.store, OP, |tx| async move {
            let mut user = self
                .store
                .get_by_login(&tx, &login)
                .await
                .map_err(|e| missing_user_as(e, unknown_subject))?;

            user.refresh_token_hash.clear();
            self.store.update_auth_state(&tx, &user).await
        })
        .await
        .map_err(|e| at_boundary(OP, e))?;

        info!("user logged out");
        Ok(())
    }
}
