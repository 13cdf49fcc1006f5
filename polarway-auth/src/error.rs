//! Error types for polarway-auth — Railway Programming
//!
//! Every operation returns `Result<T, AuthError>`. jsonwebtoken and argon2
//! failures convert here; sqlx failures are wrapped by the Postgres store.
//! Everything is classified into the small [`ErrorKind`] taxonomy the RPC
//! gateway maps to status codes.

use std::fmt;

use thiserror::Error;

/// Unique column of the `auth` table that a registration collided with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Login,
    Email,
}

impl UniqueField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Email => "email",
        }
    }
}

impl fmt::Display for UniqueField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified error type for all session and storage operations
#[derive(Error, Debug)]
pub enum AuthError {
    // ─── Caller Errors ───

    #[error("{0}")]
    Validation(String),

    #[error("{field} already exists")]
    AlreadyExists { field: UniqueField },

    // ─── Auth Errors ───

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("refresh token is stale or revoked")]
    StaleOrRevokedToken,

    /// Store-level miss. Use-cases translate it before returning.
    #[error("user not found")]
    UserNotFound,

    // ─── Primitive Errors ───

    #[error("token signing failed: {0}")]
    Signing(String),

    #[error("password hashing failed: {0}")]
    Hashing(String),

    // ─── Infrastructure Errors ───

    /// The display form carries only the operation name; `detail` is for logs.
    #[error("storage error during {op}")]
    Storage { op: &'static str, detail: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Error taxonomy honoured by the transport gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    AlreadyExists,
    InvalidCredentials,
    InvalidToken,
    StaleOrRevokedToken,
    Storage,
    Internal,
}

impl AuthError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn storage(op: &'static str, detail: impl fmt::Display) -> Self {
        Self::Storage {
            op,
            detail: detail.to_string(),
        }
    }

    /// Re-label a storage error with the use-case that hit it
    pub fn in_op(self, op: &'static str) -> Self {
        match self {
            Self::Storage { detail, .. } => Self::Storage { op, detail },
            other => other,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::InvalidCredentials | Self::UserNotFound => ErrorKind::InvalidCredentials,
            Self::InvalidToken(_) => ErrorKind::InvalidToken,
            Self::StaleOrRevokedToken => ErrorKind::StaleOrRevokedToken,
            Self::Storage { .. } => ErrorKind::Storage,
            Self::Signing(_) | Self::Hashing(_) | Self::Config(_) | Self::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        AuthError::InvalidToken(err.to_string())
    }
}

impl From<argon2::password_hash::Error> for AuthError {
    fn from(err: argon2::password_hash::Error) -> Self {
        AuthError::Hashing(err.to_string())
    }
}

#[cfg(feature = "grpc")]
impl From<AuthError> for tonic::Status {
    fn from(err: AuthError) -> Self {
        let msg = err.to_string();
        match err.kind() {
            ErrorKind::Validation => tonic::Status::invalid_argument(msg),
            ErrorKind::AlreadyExists => tonic::Status::already_exists(msg),
            ErrorKind::InvalidCredentials
            | ErrorKind::InvalidToken
            | ErrorKind::StaleOrRevokedToken => tonic::Status::unauthenticated(msg),
            ErrorKind::Storage | ErrorKind::Internal => tonic::Status::internal(msg),
        }
    }
}

/// Result type alias for auth operations
pub type Result<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_taxonomy() {
        assert_eq!(AuthError::validation("login is required").kind(), ErrorKind::Validation);
        assert_eq!(
            AuthError::AlreadyExists { field: UniqueField::Email }.kind(),
            ErrorKind::AlreadyExists
        );
        assert_eq!(AuthError::Signing("no key".into()).kind(), ErrorKind::Internal);
        assert_eq!(AuthError::Hashing("bad phc".into()).kind(), ErrorKind::Internal);
        assert_eq!(AuthError::UserNotFound.kind(), ErrorKind::InvalidCredentials);
    }

    #[test]
    fn test_storage_display_hides_detail() {
        let err = AuthError::storage("store.insert", "syntax error at or near \"INSERT\"")
            .in_op("session.register");
        assert_eq!(err.to_string(), "storage error during session.register");
        match err {
            AuthError::Storage { detail, .. } => assert!(detail.contains("INSERT")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_conflict_names_field() {
        let err = AuthError::AlreadyExists { field: UniqueField::Login };
        assert_eq!(err.to_string(), "login already exists");
    }

    #[cfg(feature = "grpc")]
    #[test]
    fn test_status_mapping() {
        use tonic::Code;

        let status: tonic::Status = AuthError::validation("email is required").into();
        assert_eq!(status.code(), Code::InvalidArgument);

        let status: tonic::Status = AuthError::AlreadyExists { field: UniqueField::Email }.into();
        assert_eq!(status.code(), Code::AlreadyExists);

        for err in [
            AuthError::InvalidCredentials,
            AuthError::InvalidToken("ExpiredSignature".into()),
            AuthError::StaleOrRevokedToken,
        ] {
            let status: tonic::Status = err.into();
            assert_eq!(status.code(), Code::Unauthenticated);
        }

        let status: tonic::Status = AuthError::storage("session.refresh", "pool timed out").into();
        assert_eq!(status.code(), Code::Internal);
        assert!(!status.message().contains("pool"));
    }
}
