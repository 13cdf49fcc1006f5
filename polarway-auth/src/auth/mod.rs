//! Session and credential lifecycle — tokens, password hashing, use-cases
//!
//! Stateless: every use-case reads and writes through the `UserStore`.

pub mod types;
pub mod token;
pub mod hasher;
pub mod session;

pub use hasher::{Argon2Hasher, CredentialHasher};
pub use session::SessionService;
pub use token::{token_digest, TokenCodec};
pub use types::{ClaimKind, IdentityClaims, TokenPair, User, UserProfile};
