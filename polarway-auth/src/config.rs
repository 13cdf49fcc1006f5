//! Configuration for Polarway Auth

use std::fmt;
use std::str::FromStr;

use chrono::Duration;
use jsonwebtoken::Algorithm;

use crate::error::{AuthError, Result};

/// Deployment environment, drives log format and verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Local,
    Dev,
    Prod,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Dev => "dev",
            Self::Prod => "prod",
        }
    }
}

impl FromStr for Environment {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "dev" => Ok(Self::Dev),
            "prod" => Ok(Self::Prod),
            other => Err(AuthError::Config(format!("unknown environment '{other}'"))),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Auth service configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Postgres connection string for the user store
    pub database_url: String,

    /// Maximum pooled connections
    pub max_connections: u32,

    /// HMAC secret for token signing. Empty means signing is unavailable.
    pub jwt_secret: String,

    /// Signing algorithm (HMAC family only)
    pub jwt_algorithm: Algorithm,

    /// Lifetime of every issued token (access, refresh and confirmation)
    pub token_ttl: Duration,

    pub environment: Environment,
}

impl AuthConfig {
    /// Default token lifetime: 30 minutes
    pub const DEFAULT_TOKEN_TTL_MINUTES: i64 = 30;

    /// Create config with sensible defaults
    ///
    /// The signing secret is taken from `POLARWAY_JWT_SECRET` when set.
    /// There is no fallback secret: without one, token issuance fails.
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 10,
            jwt_secret: std::env::var("POLARWAY_JWT_SECRET").unwrap_or_default(),
            jwt_algorithm: Algorithm::HS256,
            token_ttl: Duration::minutes(Self::DEFAULT_TOKEN_TTL_MINUTES),
            environment: Environment::Local,
        }
    }

    /// Build the full config from `POLARWAY_*` environment variables
    ///
    /// | Variable                      | Required | Default  |
    /// |-------------------------------|----------|----------|
    /// | `POLARWAY_DATABASE_URL`       | yes      |          |
    /// | `POLARWAY_JWT_SECRET`         | no       | empty    |
    /// | `POLARWAY_JWT_ALGORITHM`      | no       | `HS256`  |
    /// | `POLARWAY_TOKEN_TTL_SECS`     | no       | `1800`   |
    /// | `POLARWAY_DB_MAX_CONNECTIONS` | no       | `10`     |
    /// | `POLARWAY_ENV`                | no       | `local`  |
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var("POLARWAY_DATABASE_URL")
            .map_err(|_| AuthError::Config("POLARWAY_DATABASE_URL is not set".into()))?;
        let mut cfg = Self::new(database_url);

        if let Ok(alg) = std::env::var("POLARWAY_JWT_ALGORITHM") {
            cfg.jwt_algorithm = parse_hmac_algorithm(&alg)?;
        }
        if let Ok(secs) = std::env::var("POLARWAY_TOKEN_TTL_SECS") {
            let secs: i64 = secs
                .parse()
                .map_err(|_| AuthError::Config(format!("invalid POLARWAY_TOKEN_TTL_SECS '{secs}'")))?;
            if secs <= 0 {
                return Err(AuthError::Config("POLARWAY_TOKEN_TTL_SECS must be positive".into()));
            }
            cfg.token_ttl = Duration::seconds(secs);
        }
        if let Ok(max) = std::env::var("POLARWAY_DB_MAX_CONNECTIONS") {
            cfg.max_connections = max.parse().map_err(|_| {
                AuthError::Config(format!("invalid POLARWAY_DB_MAX_CONNECTIONS '{max}'"))
            })?;
        }
        if let Ok(env) = std::env::var("POLARWAY_ENV") {
            cfg.environment = env.parse()?;
        }
        Ok(cfg)
    }

    /// Override JWT secret
    pub fn with_jwt_secret(mut self, secret: impl Into<String>) -> Self {
        self.jwt_secret = secret.into();
        self
    }

    /// Override signing algorithm (rejects anything outside HS256/HS384/HS512)
    pub fn with_jwt_algorithm(mut self, algorithm: &str) -> Result<Self> {
        self.jwt_algorithm = parse_hmac_algorithm(algorithm)?;
        Ok(self)
    }

    /// Override token lifetime
    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }
}

/// HMAC algorithms accepted for signing and verification
pub const HMAC_ALGORITHMS: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

fn parse_hmac_algorithm(name: &str) -> Result<Algorithm> {
    let alg = Algorithm::from_str(name.trim())
        .map_err(|_| AuthError::Config(format!("unknown JWT algorithm '{name}'")))?;
    if !HMAC_ALGORITHMS.contains(&alg) {
        return Err(AuthError::Config(format!(
            "JWT algorithm '{name}' is not in the HMAC family"
        )));
    }
    Ok(alg)
}
