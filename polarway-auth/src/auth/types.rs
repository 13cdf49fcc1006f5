//! Auth domain types — User, UserProfile, TokenPair, ClaimKind
//!
//! Serializable, cloneable, and cheap to pass around.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Role assigned to every new account
pub const DEFAULT_ROLE: &str = "user";

/// User record — full row of the `auth` table
///
/// Never serialized towards callers; use [`UserProfile`] for that.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub login: String,
    pub email: String,
    pub password_hash: String,
    pub is_active: bool,
    pub is_verified: bool,
    pub role: String,
    /// Hex SHA-256 of the live refresh token, empty when logged out
    pub refresh_token_hash: String,
}

impl User {
    /// Whether a refresh token is currently bound to this user
    pub fn has_session(&self) -> bool {
        !self.refresh_token_hash.is_empty()
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile::from(self)
    }
}

/// Caller-facing projection returned by `current_user`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub login: String,
    pub is_active: bool,
    pub is_verified: bool,
    pub role: String,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            login: user.login.clone(),
            is_active: user.is_active,
            is_verified: user.is_verified,
            role: user.role.clone(),
        }
    }
}

/// Access + refresh token returned by `authenticate` and `confirm`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Identity claim embedded in a bearer token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimKind {
    /// Access and refresh tokens
    Login,
    /// Email-confirmation tokens
    Email,
}

impl ClaimKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Email => "email",
        }
    }
}

impl fmt::Display for ClaimKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JWT claims for every token kind
///
/// Exactly one of `login` / `email` is set. `jti` keeps two tokens minted in
/// the same second for the same identity distinct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Expiry (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    pub jti: String,
}

impl IdentityClaims {
    pub fn claim(&self, kind: ClaimKind) -> Option<&str> {
        match kind {
            ClaimKind::Login => self.login.as_deref(),
            ClaimKind::Email => self.email.as_deref(),
        }
    }
}
