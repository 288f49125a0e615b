//! Authentication and authorization middleware.
//!
//! Authentication evaluates an explicit ordered list of capability-tagged
//! validators (cookie first, then bearer) and takes the first success; a
//! credential that fails validation is logged and skipped, leaving the
//! request anonymous for the authorization stage to judge. Authorization
//! consumes the endpoint metadata attached upstream: no metadata means no
//! policy evaluation, `allow_anonymous` means the gate runs (the principal
//! is already populated) but does not block, and a failing policy resolves
//! to the scheme failure action selected deterministically by content
//! negotiation: browsers are forwarded to the OIDC challenge, API callers
//! get a plain status code.

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use serde_json::json;
use tracing::{debug, warn};

use super::bearer::BearerValidator;
use super::cookie::SessionCodec;
use super::endpoint::EndpointMetadata;
use super::oidc::{ChallengeState, OidcChallenge};
use super::policy::{AuthorizationPolicy, PolicyDecision};
use super::principal::Principal;
use super::schemes::{FailureAction, SchemeName, SchemeRegistry};

/// Immutable authentication state shared across requests.
///
/// Constructed once at startup and passed by reference into the pipeline;
/// there is no runtime reconfiguration.
pub struct AuthState {
    /// Registered scheme bindings.
    pub registry: SchemeRegistry,
    /// The default authorization policy.
    pub policy: AuthorizationPolicy,
    /// Session cookie codec.
    pub session: SessionCodec,
    /// Bearer token validator.
    pub bearer: BearerValidator,
    /// OIDC challenge machinery.
    pub challenge: OidcChallenge,
    /// Externally visible base URL (for the OIDC redirect URI).
    pub external_url: String,
}

impl AuthState {
    /// The redirect URI registered with the identity provider.
    #[must_use]
    pub fn redirect_uri(&self) -> String {
        format!(
            "{}{}",
            self.external_url.trim_end_matches('/'),
            self.challenge.redirect_path
        )
    }

    /// Build the challenge redirect for a browser request.
    pub fn challenge_redirect(&self, return_url: &str) -> Response {
        let state = ChallengeState::new(return_url.to_string());
        let sealed = state.seal(&self.session);
        match self
            .challenge
            .challenge_url(&self.redirect_uri(), &sealed, &state.nonce)
        {
            Ok(url) => Redirect::to(url.as_str()).into_response(),
            Err(e) => {
                warn!(error = %e, "Failed to build challenge URL");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

/// Authentication middleware: populate the request principal.
///
/// Validators run in registration order; the first success wins. A request
/// presenting no credentials, or only invalid ones, proceeds anonymously.
pub async fn authenticate(
    State(auth): State<Arc<AuthState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    for binding in auth.registry.bindings() {
        if !binding.authenticates {
            continue;
        }
        let attempt = match binding.name {
            SchemeName::Cookie => try_cookie(&auth, &request),
            SchemeName::Bearer => match extract_bearer_token(&request) {
                Some(token) => try_bearer(&auth, &token, request.uri().path()).await,
                None => None,
            },
            SchemeName::Oidc => None,
        };
        if let Some(principal) = attempt {
            debug!(scheme = %binding.name, path = %request.uri().path(), "Authenticated request");
            request.extensions_mut().insert(principal);
            break;
        }
    }

    next.run(request).await
}

/// Evaluate the cookie scheme against the request.
fn try_cookie(auth: &AuthState, request: &Request<Body>) -> Option<Principal> {
    let cookies = request
        .headers()
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())?;
    let blob = auth.session.extract(cookies)?;
    match auth.session.open(blob) {
        Ok(principal) => Some(principal),
        Err(e) => {
            debug!(error = %e, "Session cookie rejected");
            None
        }
    }
}

/// Extract the bearer token from the request's Authorization header.
///
/// Returned owned so the request reference is not held across the
/// asynchronous validation await (`Request<Body>` is not `Sync`).
fn extract_bearer_token(request: &Request<Body>) -> Option<String> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            v.strip_prefix("Bearer ")
                .or_else(|| v.strip_prefix("bearer "))
        })
        .map(ToOwned::to_owned)
}

/// Evaluate the bearer scheme against an extracted token.
async fn try_bearer(auth: &AuthState, token: &str, path: &str) -> Option<Principal> {
    match auth.bearer.validate(token).await {
        Ok(principal) => Some(principal),
        Err(e) => {
            warn!(error = %e, path = %path, "Bearer token rejected");
            None
        }
    }
}

/// Authorization middleware: evaluate the default policy at the gate.
pub async fn authorize(
    State(auth): State<Arc<AuthState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    // Policies are only evaluated when the request resolved to endpoint
    // metadata; everything else is public by construction.
    let Some(metadata) = request.extensions().get::<EndpointMetadata>().copied() else {
        return next.run(request).await;
    };
    if !metadata.requires_authorization {
        return next.run(request).await;
    }

    let decision = auth.policy.evaluate(request.extensions().get::<Principal>());
    match decision {
        PolicyDecision::Allow => next.run(request).await,
        // The gate must not reject when anonymous access is allowed;
        // enforcement is deferred to the resource handler.
        _ if metadata.allow_anonymous => next.run(request).await,
        PolicyDecision::Unauthorized => {
            debug!(path = %request.uri().path(), "No principal for protected endpoint");
            unauthorized_response(&auth, &request)
        }
        PolicyDecision::Forbidden => forbidden_response(),
    }
}

/// Whether the request negotiates for an interactive browser response.
///
/// The declared content negotiation decides which scheme failure action
/// wins; the check is a pure function of the request, never racy.
fn is_browser_request(request: &Request<Body>) -> bool {
    request
        .headers()
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/html"))
}

/// Apply the failing schemes' failure actions.
fn unauthorized_response(auth: &AuthState, request: &Request<Body>) -> Response {
    if is_browser_request(request) {
        // Browser traffic follows the cookie scheme's configured action.
        if let Some(binding) = auth.registry.get(SchemeName::Cookie) {
            if let FailureAction::Forward(_) = binding.failure {
                let return_url = request
                    .uri()
                    .path_and_query()
                    .map_or_else(|| "/".to_string(), ToString::to_string);
                return auth.challenge_redirect(&return_url);
            }
        }
    }

    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Bearer")],
        Json(json!({ "error": "unauthorized" })),
    )
        .into_response()
}

/// 403 response for an authenticated principal lacking the required scope.
fn forbidden_response() -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(json!({ "error": "forbidden" })),
    )
        .into_response()
}
