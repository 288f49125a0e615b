//! HTTP router and handlers

use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::{Query, State},
    http::{StatusCode, header},
    middleware,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::Value;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{debug, warn};

use crate::auth::oidc::ChallengeState;
use crate::auth::{
    AuthState, Principal, RouteTable, SchemeName, attach_endpoint_metadata, authenticate,
    authorize,
};
use crate::graphql::{GraphQlRequest, Schema};

/// Shared application state
pub struct AppState {
    /// Authentication pipeline state
    pub auth: Arc<AuthState>,
    /// GraphQL schema
    pub schema: Arc<Schema>,
    /// Route-derived endpoint metadata
    pub routes: Arc<RouteTable>,
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    let auth = Arc::clone(&state.auth);
    let routes = Arc::clone(&state.routes);

    Router::new()
        .route("/", get(home_handler))
        .route("/Profile", get(profile_handler))
        .route("/Login", get(login_handler))
        .route("/Logout", get(logout_handler))
        .route("/api/Values", get(api_values_handler))
        .route("/api/Values/Profile", get(api_profile_handler))
        .route("/GraphQL", post(graphql_handler))
        .route("/signin-oidc", get(signin_callback_handler))
        // Pipeline order (outermost first): endpoint metadata synthesis,
        // authentication, authorization, then the handler.
        .layer(middleware::from_fn_with_state(Arc::clone(&auth), authorize))
        .layer(middleware::from_fn_with_state(auth, authenticate))
        .layer(middleware::from_fn_with_state(
            routes,
            attach_endpoint_metadata,
        ))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET / - public landing page
async fn home_handler(principal: Option<Extension<Principal>>) -> Html<String> {
    let greeting = match &principal {
        Some(Extension(p)) => format!(
            "<p>Signed in as <strong>{}</strong>.</p>\
             <p><a href=\"/Profile\">Profile</a> | <a href=\"/Logout\">Sign out</a></p>",
            p.display_name().unwrap_or("(unknown)")
        ),
        None => "<p>Not signed in.</p><p><a href=\"/Login\">Sign in</a></p>".to_string(),
    };
    Html(format!(
        "<!DOCTYPE html><html><head><title>Authgate</title></head>\
         <body><h1>Welcome</h1>{greeting}</body></html>"
    ))
}

/// GET /Profile - claims of the authenticated principal
async fn profile_handler(principal: Option<Extension<Principal>>) -> Response {
    let Some(Extension(principal)) = principal else {
        // The gate produces the unauthorized outcome for this route; a
        // missing principal here means the pipeline was bypassed.
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let rows: String = principal
        .claims
        .iter()
        .map(|(k, v)| format!("<tr><td>{k}</td><td>{v}</td></tr>"))
        .collect();
    Html(format!(
        "<!DOCTYPE html><html><head><title>Profile</title></head>\
         <body><h1>Profile</h1><p>Authenticated via the {} scheme.</p>\
         <table>{rows}</table><p><a href=\"/\">Home</a></p></body></html>",
        principal.scheme
    ))
    .into_response()
}

/// GET /Login - gate-check endpoint; the authorization stage forces the
/// challenge, so reaching the handler means sign-in completed
async fn login_handler() -> Redirect {
    Redirect::to("/")
}

/// GET /Logout - clear the cookie-scheme session
async fn logout_handler(State(state): State<Arc<AppState>>) -> Response {
    (
        [(header::SET_COOKIE, state.auth.session.clear_cookie())],
        Redirect::to("/"),
    )
        .into_response()
}

/// GET /api/Values - public API endpoint
async fn api_values_handler() -> &'static str {
    "Hello API!"
}

/// GET /api/Values/Profile - protected API endpoint
async fn api_profile_handler() -> &'static str {
    "Profile"
}

/// POST /GraphQL - deferred-authorization endpoint; field-level checks run
/// inside the executor against the principal populated by the pipeline
async fn graphql_handler(
    State(state): State<Arc<AppState>>,
    principal: Option<Extension<Principal>>,
    Json(request): Json<GraphQlRequest>,
) -> Json<Value> {
    let principal = principal.as_ref().map(|Extension(p)| p);
    Json(state.schema.execute(&request.query, principal))
}

/// OIDC callback query parameters
#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// GET /signin-oidc - complete the interactive challenge
async fn signin_callback_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Response {
    if let Some(error) = params.error {
        let description = params.error_description.unwrap_or_default();
        warn!(error = %error, description = %description, "Provider returned sign-in error");
        return (
            StatusCode::BAD_REQUEST,
            Html(format!("<h1>Sign-in failed</h1><p>{error}: {description}</p>")),
        )
            .into_response();
    }

    let (Some(code), Some(signed_state)) = (params.code, params.state) else {
        return (StatusCode::BAD_REQUEST, "Missing code or state").into_response();
    };

    let Some(challenge_state) = ChallengeState::open(&signed_state, &state.auth.session) else {
        warn!("Sign-in state failed verification");
        return (StatusCode::BAD_REQUEST, "Invalid state").into_response();
    };

    let exchange = match state
        .auth
        .challenge
        .exchange_code(&code, &state.auth.redirect_uri())
        .await
    {
        Ok(exchange) => exchange,
        Err(e) => {
            warn!(error = %e, "Authorization code exchange failed");
            return (StatusCode::BAD_GATEWAY, "Code exchange failed").into_response();
        }
    };

    // The id_token flows through the same validation pipeline as API
    // bearer tokens: signature, audience, expiry, multi-tenant issuer.
    let principal = match state.auth.bearer.validate(&exchange.id_token).await {
        Ok(principal) => principal,
        Err(e) => {
            warn!(error = %e, "id_token validation failed");
            return (StatusCode::UNAUTHORIZED, "Invalid identity token").into_response();
        }
    };

    if principal.claim_str("nonce") != Some(challenge_state.nonce.as_str()) {
        warn!("id_token nonce mismatch");
        return (StatusCode::UNAUTHORIZED, "Nonce mismatch").into_response();
    }

    // Establish the cookie scheme's session artifact.
    let session_principal = Principal::new(principal.claims, SchemeName::Oidc);
    let blob = match state.auth.session.seal(&session_principal) {
        Ok(blob) => blob,
        Err(e) => {
            warn!(error = %e, "Failed to seal session");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    debug!(return_url = %challenge_state.return_url, "Interactive sign-in completed");
    let return_url = sanitize_return_url(&challenge_state.return_url);
    (
        [(header::SET_COOKIE, state.auth.session.set_cookie(&blob))],
        Redirect::to(&return_url),
    )
        .into_response()
}

/// Only local absolute paths are followed after sign-in; anything else
/// falls back to the index.
fn sanitize_return_url(url: &str) -> String {
    if url.starts_with('/') && !url.starts_with("//") {
        url.to_string()
    } else {
        "/".to_string()
    }
}
