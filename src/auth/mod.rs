//! Authentication and authorization composition.
//!
//! Three credential-proof schemes (session cookie, bearer JWT, and the
//! OIDC interactive challenge) are unified under one default
//! authorization policy. A custom multi-tenant issuer validator accepts
//! tokens from any tenant of a single multi-tenant application
//! registration while rejecting forged or mismatched issuers, and an
//! endpoint-metadata synthesizer lets the GraphQL path participate in the
//! same authorization pipeline as routed endpoints.

pub mod bearer;
pub mod cookie;
pub mod endpoint;
pub mod issuer;
pub mod jwks;
pub mod middleware;
pub mod oidc;
pub mod policy;
pub mod principal;
pub mod schemes;

pub use bearer::{BearerValidator, KeySource};
pub use cookie::SessionCodec;
pub use endpoint::{EndpointMetadata, RouteTable, attach_endpoint_metadata};
pub use issuer::{IssuerTemplates, InvalidIssuerError, validate_issuer};
pub use jwks::JwksCache;
pub use middleware::{AuthState, authenticate, authorize};
pub use oidc::OidcChallenge;
pub use policy::{AuthorizationPolicy, PolicyDecision};
pub use principal::Principal;
pub use schemes::{FailureAction, SchemeBinding, SchemeName, SchemeRegistry};

use thiserror::Error;

/// Authentication pipeline failures.
///
/// Every variant is fatal to the request's authentication attempt and
/// never retried; requests fail independently and never crash the process.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The issuer claim matched no configured template.
    #[error(transparent)]
    InvalidIssuer(#[from] InvalidIssuerError),

    /// Signature, expiry or audience validation failed.
    #[error("Token rejected: {0}")]
    TokenRejected(#[from] jsonwebtoken::errors::Error),

    /// The JWT header carries no `kid` to select a signing key.
    #[error("JWT missing 'kid' field in header")]
    MissingKeyId,

    /// The `kid` is absent from the provider's key set, even after refresh.
    #[error("Unknown key ID: {0}")]
    UnknownKeyId(String),

    /// Network or HTTP error while fetching the provider's key set.
    #[error("JWKS fetch error: {0}")]
    JwksFetch(#[from] reqwest::Error),

    /// The session cookie was malformed, forged, or expired.
    #[error("Session rejected: {0}")]
    Session(&'static str),

    /// Building or completing the OIDC challenge failed.
    #[error("Challenge error: {0}")]
    Challenge(String),
}
