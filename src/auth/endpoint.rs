//! Endpoint metadata and the synthesizer for non-routed paths.
//!
//! The authorization middleware only evaluates a policy when the request
//! resolved to an endpoint carrying metadata. The GraphQL path is handled
//! by a downstream executor with its own field-level authorization, so
//! without help every GraphQL request would bypass policy evaluation
//! entirely, including principal construction, and break the field-level
//! checks that expect the principal on the request context. The
//! synthesizer attaches `{requires_authorization: true, allow_anonymous:
//! true}` for that path: the gate still runs (populating the principal)
//! but does not itself block, since some fields are public.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};

/// Per-request endpoint metadata consulted by the authorization stage.
///
/// When both flags are set the authorization middleware must still run but
/// must not itself block the request; enforcement is deferred to the
/// resource handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointMetadata {
    /// The default policy applies to this endpoint.
    pub requires_authorization: bool,
    /// The gate itself must not reject anonymous callers.
    pub allow_anonymous: bool,
}

impl EndpointMetadata {
    /// Metadata for a routed endpoint requiring an authenticated principal.
    #[must_use]
    pub fn protected() -> Self {
        Self {
            requires_authorization: true,
            allow_anonymous: false,
        }
    }

    /// Synthetic metadata for paths whose authorization is deferred
    /// downstream.
    #[must_use]
    pub fn deferred() -> Self {
        Self {
            requires_authorization: true,
            allow_anonymous: true,
        }
    }
}

/// Route-derived metadata plus the deferred-authorization path prefix.
///
/// Built once at startup; immutable afterwards.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routed: Vec<(String, EndpointMetadata)>,
    deferred_prefix: String,
}

impl RouteTable {
    /// The standard table for this application's HTTP surface.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            routed: vec![
                ("/Profile".to_string(), EndpointMetadata::protected()),
                ("/Login".to_string(), EndpointMetadata::protected()),
                ("/api/Values/Profile".to_string(), EndpointMetadata::protected()),
            ],
            deferred_prefix: "/GraphQL".to_string(),
        }
    }

    /// Create a table from explicit entries (tests, alternate surfaces).
    #[must_use]
    pub fn new(routed: Vec<(String, EndpointMetadata)>, deferred_prefix: String) -> Self {
        Self {
            routed,
            deferred_prefix,
        }
    }

    /// Resolve metadata for a request path.
    ///
    /// Routed paths take their registered metadata; the deferred prefix
    /// (path-segment match, not substring) gets the synthetic pair; other
    /// paths carry none.
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<EndpointMetadata> {
        if let Some((_, meta)) = self.routed.iter().find(|(p, _)| p == path) {
            return Some(*meta);
        }
        if path == self.deferred_prefix
            || path.starts_with(&format!("{}/", self.deferred_prefix))
        {
            return Some(EndpointMetadata::deferred());
        }
        None
    }
}

/// Middleware attaching endpoint metadata to the request context.
///
/// Runs exactly once per request, before the authentication and
/// authorization stages. Inserts only when no metadata is present, so it
/// is idempotent and never alters metadata for a path that already
/// resolved to a real routed endpoint.
pub async fn attach_endpoint_metadata(
    State(table): State<Arc<RouteTable>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if request.extensions().get::<EndpointMetadata>().is_none() {
        if let Some(metadata) = table.resolve(request.uri().path()) {
            request.extensions_mut().insert(metadata);
        }
    }
    next.run(request).await
}
