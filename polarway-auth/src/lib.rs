//! # Polarway Auth
//!
//! Session and credential lifecycle core for Polarway: registration, password
//! login, email confirmation, refresh and logout, persisted in Postgres.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │              SessionService               │
//! │  register · authenticate · confirm ·      │
//! │  refresh · current_user · log_out         │
//! ├──────────────┬──────────────┬─────────────┤
//! │  TokenCodec  │ Credential-  │  with_tx    │
//! │  (HMAC JWT,  │ Hasher       │  (commit /  │
//! │   sha256     │ (Argon2id)   │   rollback) │
//! │   digest)    │              │             │
//! ├──────────────┴──────────────┴─────────────┤
//! │                 UserStore                 │
//! │     PgUserStore (sqlx) · MemoryUserStore  │
//! └───────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use polarway_auth::{AuthConfig, PgUserStore, SessionService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AuthConfig::from_env()?;
//!     polarway_auth::telemetry::try_init_tracing(config.environment)?;
//!
//!     let store = PgUserStore::connect(&config).await?;
//!     store.migrate().await?;
//!     let sessions = SessionService::from_config(store, &config);
//!
//!     let pair = sessions.authenticate("alice", "pw1").await?;
//!     let me = sessions.current_user(&pair.access_token).await?;
//!     println!("{} ({})", me.login, me.role);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Stateless sessions**: only the refresh-token digest is persisted
//! - **Single live refresh token** per user; login/confirm rotate it, logout clears it
//! - **Transactional use-cases**: rollback on error and on panic
//! - **Railway Programming**: all operations return `Result<T, AuthError>`

pub mod auth;
pub mod config;
pub mod error;
pub mod store;
pub mod telemetry;

// Re-exports for convenience
pub use auth::{
    token_digest, Argon2Hasher, ClaimKind, CredentialHasher, SessionService, TokenCodec,
    TokenPair, User, UserProfile,
};
pub use config::{AuthConfig, Environment};
pub use error::{AuthError, ErrorKind, Result, UniqueField};
pub use store::{with_tx, MemoryUserStore, PgUserStore, UserStore};
