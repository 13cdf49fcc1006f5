//! TokenCodec — signed, time-limited bearer tokens
//!
//! Every token carries one identity claim (`login` or `email`) and an
//! absolute expiry. Signature, algorithm family and expiry are checked in a
//! single `decode` call, so an expired token is never partially trusted.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use crate::config::{AuthConfig, HMAC_ALGORITHMS};
use crate::error::{AuthError, Result};

use super::types::{ClaimKind, IdentityClaims};

/// Lowercase hex SHA-256 of a token, as persisted in `refresh_token_hash`
pub fn token_digest(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

#[derive(Clone)]
struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

/// Issues and verifies HMAC-signed JWTs
///
/// Built once from [`AuthConfig`] and shared read-only.
#[derive(Clone)]
pub struct TokenCodec {
    keys: Option<SigningKeys>,
    algorithm: Algorithm,
    default_ttl: Duration,
    validation: Validation,
}

impl TokenCodec {
    pub fn new(secret: &str, algorithm: Algorithm, default_ttl: Duration) -> Self {
        let keys = (!secret.is_empty()).then(|| SigningKeys {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        });

        let mut validation = Validation::new(algorithm);
        validation.algorithms = HMAC_ALGORITHMS.to_vec();
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            keys,
            algorithm,
            default_ttl,
            validation,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(&config.jwt_secret, config.jwt_algorithm, config.token_ttl)
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Sign a token carrying `claim = value`, expiring `ttl` from now
    pub fn issue(&self, claim: ClaimKind, value: &str, ttl: Duration) -> Result<String> {
        let keys = self
            .keys
            .as_ref()
            .ok_or_else(|| AuthError::Signing("signing key unavailable".into()))?;

        let now = Utc::now();
        let (login, email) = match claim {
            ClaimKind::Login => (Some(value.to_string()), None),
            ClaimKind::Email => (None, Some(value.to_string())),
        };
        let claims = IdentityClaims {
            login,
            email,
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(self.algorithm), &claims, &keys.encoding)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }

    /// [`issue`](Self::issue) with the configured TTL
    pub fn issue_default(&self, claim: ClaimKind, value: &str) -> Result<String> {
        self.issue(claim, value, self.default_ttl)
    }

    /// Verify signature + expiry and return the named claim
    pub fn verify_and_extract(&self, token: &str, claim: ClaimKind) -> Result<String> {
        let keys = self
            .keys
            .as_ref()
            .ok_or_else(|| AuthError::InvalidToken("signing key unavailable".into()))?;

        let data = decode::<IdentityClaims>(token, &keys.decoding, &self.validation).map_err(|e| {
            debug!(error = %e, "token rejected");
            AuthError::from(e)
        })?;
        let claims = data.claims;

        if claims.login.is_some() && claims.email.is_some() {
            return Err(AuthError::InvalidToken("token carries more than one identity".into()));
        }

        claims
            .claim(claim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or_else(|| AuthError::InvalidToken(format!("missing '{claim}' claim")))
    }
}
