//! Tracing setup keyed on the deployment environment
//!
//! `RUST_LOG` always wins; otherwise `Local` logs at debug in a readable
//! form, `Dev` at info compactly and `Prod` at info as JSON lines.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::Environment;
use crate::error::{AuthError, Result};

fn default_directive(env: Environment) -> &'static str {
    match env {
        Environment::Local => "polarway_auth=debug,sqlx=warn",
        Environment::Dev | Environment::Prod => "polarway_auth=info,sqlx=warn",
    }
}

fn env_filter(env: Environment) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(env)))
}

/// Install the global subscriber for `env`
///
/// Fails with `AuthError::Config` if a subscriber is already installed.
pub fn try_init_tracing(env: Environment) -> Result<()> {
    let registry = tracing_subscriber::registry().with(env_filter(env));

    let installed = match env {
        Environment::Local => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init(),
        Environment::Dev => registry
            .with(tracing_subscriber::fmt::layer().compact())
            .try_init(),
        Environment::Prod => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .try_init(),
    };

    installed.map_err(|e| AuthError::Config(format!("tracing already initialised: {e}")))
}
