//! Authgate Library
//!
//! A sample demonstrating protected web, API and GraphQL endpoints secured
//! by a multi-tenant identity provider, with a desktop client acquiring
//! and presenting bearer tokens.
//!
//! # Composition
//!
//! - **Schemes**: session cookie, bearer JWT and an OIDC interactive
//!   challenge, unified under one default authorization policy
//! - **Multi-tenant issuer validation**: tokens from any tenant of a
//!   single multi-tenant application registration are accepted; forged or
//!   mismatched issuers are rejected
//! - **Endpoint metadata synthesis**: the GraphQL path participates in the
//!   same authorization pipeline as routed endpoints, with enforcement
//!   deferred to field-level checks

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod graphql;
pub mod server;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
