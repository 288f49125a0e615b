//! Interactive sign-in: authorization code flow with PKCE.
//!
//! A local callback server receives the authorization code after the user
//! signs in at the identity provider; the code is exchanged for tokens
//! with the PKCE verifier (public client, no secret). User-initiated
//! cancellation surfaces as [`SignInError::Canceled`] so the caller can
//! swallow it; everything else carries the provider's error code and
//! message.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State},
    response::Html,
    routing::get,
};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use url::Url;

use super::ClientOptions;
use super::cache::TokenInfo;
use crate::auth::oidc::ProviderEndpoints;

/// Interactive sign-in failures.
#[derive(Debug, Error)]
pub enum SignInError {
    /// The user canceled the sign-in; take no action.
    #[error("Sign-in canceled by the user")]
    Canceled,

    /// Any other failure, surfaced with the provider's code and message.
    #[error("Sign-in failed ({code}): {message}")]
    Unexpected {
        /// Provider or transport error code.
        code: String,
        /// Human-readable description.
        message: String,
    },
}

/// Callback query parameters
#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// State shared with the callback handler
struct CallbackState {
    expected_state: String,
    tx: Option<oneshot::Sender<Result<String, SignInError>>>,
}

/// Token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    token_type: Option<String>,
    expires_in: Option<u64>,
    refresh_token: Option<String>,
    scope: Option<String>,
}

/// Token endpoint error body
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Run the interactive flow and return the acquired tokens.
///
/// # Errors
///
/// Returns [`SignInError::Canceled`] when the user aborts at the provider,
/// [`SignInError::Unexpected`] otherwise.
pub async fn interactive_sign_in(options: &ClientOptions) -> Result<TokenInfo, SignInError> {
    let (code_verifier, code_challenge) = generate_pkce();
    let state = generate_state();

    // Start the callback server first so the redirect URI carries the
    // actual port.
    let (redirect_uri, rx, server) = start_callback_server(state.clone()).await?;

    let endpoints = options.endpoints();
    let mut auth_url = Url::parse(&endpoints.authorize).map_err(|e| SignInError::Unexpected {
        code: "invalid_endpoint".to_string(),
        message: e.to_string(),
    })?;
    auth_url
        .query_pairs_mut()
        .append_pair("client_id", &options.client_id)
        .append_pair("response_type", "code")
        .append_pair("response_mode", "query")
        .append_pair("redirect_uri", &redirect_uri)
        .append_pair("scope", &options.scopes.join(" "))
        .append_pair("state", &state)
        .append_pair("code_challenge", &code_challenge)
        .append_pair("code_challenge_method", "S256");

    info!(url = %auth_url, "Waiting for interactive sign-in");
    println!("\nTo sign in, visit:\n\n  {auth_url}\n");

    let outcome = rx.await.map_err(|_| SignInError::Unexpected {
        code: "callback_closed".to_string(),
        message: "Callback channel closed unexpectedly".to_string(),
    });
    server.abort();
    let code = outcome??;

    debug!("Received authorization code");
    exchange_code(options, &endpoints, &code, &redirect_uri, &code_verifier).await
}

/// Redeem a refresh token for a fresh access token.
///
/// # Errors
///
/// Returns [`SignInError::Unexpected`] when the provider rejects the
/// refresh token; callers fall back to the interactive flow.
pub async fn refresh(
    options: &ClientOptions,
    refresh_token: &str,
) -> Result<TokenInfo, SignInError> {
    let endpoints = options.endpoints();
    let scope = options.scopes.join(" ");
    let form = [
        ("client_id", options.client_id.as_str()),
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh_token),
        ("scope", scope.as_str()),
    ];

    request_tokens(&endpoints.token, &form).await
}

/// Start the local callback server; returns the redirect URI, the
/// receiver for the authorization code, and the server task to abort once
/// the callback has been received.
async fn start_callback_server(
    expected_state: String,
) -> Result<
    (
        String,
        oneshot::Receiver<Result<String, SignInError>>,
        tokio::task::JoinHandle<()>,
    ),
    SignInError,
> {
    let addr: SocketAddr = "127.0.0.1:0".parse().expect("static address");
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| SignInError::Unexpected {
            code: "callback_bind".to_string(),
            message: format!("Failed to bind callback server: {e}"),
        })?;
    let port = listener
        .local_addr()
        .map_err(|e| SignInError::Unexpected {
            code: "callback_bind".to_string(),
            message: e.to_string(),
        })?
        .port();

    let redirect_uri = format!("http://127.0.0.1:{port}/signin-oidc");
    debug!(uri = %redirect_uri, "Callback server listening");

    let (tx, rx) = oneshot::channel();
    let shared = Arc::new(tokio::sync::Mutex::new(CallbackState {
        expected_state,
        tx: Some(tx),
    }));

    let app = Router::new()
        .route("/signin-oidc", get(handle_callback))
        .with_state(shared);

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!(error = %e, "Callback server error");
        }
    });

    Ok((redirect_uri, rx, server))
}

/// Handle the provider redirect.
async fn handle_callback(
    State(state): State<Arc<tokio::sync::Mutex<CallbackState>>>,
    Query(params): Query<CallbackParams>,
) -> Html<&'static str> {
    let mut state = state.lock().await;

    if let Some(error) = params.error {
        // The provider reports user cancellation as access_denied.
        let result = if error == "access_denied" {
            Err(SignInError::Canceled)
        } else {
            Err(SignInError::Unexpected {
                code: error,
                message: params.error_description.unwrap_or_default(),
            })
        };
        if let Some(tx) = state.tx.take() {
            let _ = tx.send(result);
        }
        return Html("<h1>Sign-in failed</h1><p>You can close this window.</p>");
    }

    let outcome = match (params.code, params.state) {
        (Some(code), Some(cb_state)) if cb_state == state.expected_state => Ok(code),
        _ => Err(SignInError::Unexpected {
            code: "invalid_callback".to_string(),
            message: "Missing code or state mismatch".to_string(),
        }),
    };

    let page = if outcome.is_ok() {
        "<h1>Signed in</h1><p>You can close this window and return to the application.</p>"
    } else {
        "<h1>Sign-in failed</h1><p>You can close this window.</p>"
    };
    if let Some(tx) = state.tx.take() {
        let _ = tx.send(outcome);
    }
    Html(page)
}

/// Exchange the authorization code for tokens.
async fn exchange_code(
    options: &ClientOptions,
    endpoints: &ProviderEndpoints,
    code: &str,
    redirect_uri: &str,
    code_verifier: &str,
) -> Result<TokenInfo, SignInError> {
    let scope = options.scopes.join(" ");
    let form = [
        ("client_id", options.client_id.as_str()),
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", redirect_uri),
        ("code_verifier", code_verifier),
        ("scope", scope.as_str()),
    ];

    request_tokens(&endpoints.token, &form).await
}

/// POST a grant to the token endpoint and parse the response.
async fn request_tokens(
    token_endpoint: &str,
    form: &[(&str, &str)],
) -> Result<TokenInfo, SignInError> {
    let response = reqwest::Client::new()
        .post(token_endpoint)
        .form(form)
        .send()
        .await
        .map_err(|e| SignInError::Unexpected {
            code: "network_error".to_string(),
            message: e.to_string(),
        })?;

    if response.status().is_success() {
        let tokens: TokenResponse =
            response.json().await.map_err(|e| SignInError::Unexpected {
                code: "malformed_response".to_string(),
                message: e.to_string(),
            })?;
        Ok(TokenInfo::from_response(
            tokens.access_token,
            tokens.token_type,
            tokens.refresh_token,
            tokens.expires_in,
            tokens.scope,
        ))
    } else {
        let err: TokenErrorResponse =
            response.json().await.map_err(|e| SignInError::Unexpected {
                code: "malformed_response".to_string(),
                message: e.to_string(),
            })?;
        Err(SignInError::Unexpected {
            code: err.error,
            message: err.error_description.unwrap_or_default(),
        })
    }
}

/// Generate PKCE code verifier and challenge
fn generate_pkce() -> (String, String) {
    let verifier_bytes: [u8; 32] = rand::rng().random();
    let verifier = URL_SAFE_NO_PAD.encode(verifier_bytes);

    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    let challenge = URL_SAFE_NO_PAD.encode(hasher.finalize());

    (verifier, challenge)
}

/// Generate the CSRF state parameter
fn generate_state() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pkce_verifier_is_base64url_safe() {
        let (verifier, challenge) = generate_pkce();

        assert!(verifier.len() >= 43);
        for part in [&verifier, &challenge] {
            assert!(!part.contains('+'));
            assert!(!part.contains('/'));
            assert!(!part.contains('='));
        }
        assert_ne!(verifier, challenge);
    }

    #[test]
    fn pkce_challenge_is_sha256_of_verifier() {
        let (verifier, challenge) = generate_pkce();

        let mut hasher = Sha256::new();
        hasher.update(verifier.as_bytes());
        assert_eq!(challenge, URL_SAFE_NO_PAD.encode(hasher.finalize()));
    }

    #[test]
    fn callback_params_deserialize() {
        let params: CallbackParams =
            serde_urlencoded::from_str("code=abc123&state=xyz789").unwrap();

        assert_eq!(params.code.as_deref(), Some("abc123"));
        assert_eq!(params.state.as_deref(), Some("xyz789"));
        assert!(params.error.is_none());
    }

    #[test]
    fn cancellation_is_distinguished_from_other_errors() {
        let params: CallbackParams =
            serde_urlencoded::from_str("error=access_denied&error_description=user+canceled")
                .unwrap();
        assert_eq!(params.error.as_deref(), Some("access_denied"));

        let params: CallbackParams =
            serde_urlencoded::from_str("error=server_error&error_description=boom").unwrap();
        assert_eq!(params.error.as_deref(), Some("server_error"));
        assert_eq!(params.error_description.as_deref(), Some("boom"));
    }
}
