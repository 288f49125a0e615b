//! Desktop client: acquires tokens and calls the protected endpoints.
//!
//! Acquisition is silent first (the cached token, then a refresh-token
//! grant) and falls back to the interactive browser flow. The acquired
//! bearer token is presented to the protected REST and GraphQL endpoints.
//! A user-canceled sign-in is swallowed; any other sign-in failure is
//! surfaced with the provider's error code and message.

pub mod cache;
pub mod signin;

use std::path::PathBuf;

pub use cache::{TokenCache, TokenInfo};
pub use signin::SignInError;

use serde_json::json;
use tracing::{debug, info};

use crate::auth::oidc::ProviderEndpoints;
use crate::{Error, Result};

/// Client invocation options.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Identity-provider authority URL.
    pub authority: String,
    /// Application (client) identifier.
    pub client_id: String,
    /// Scopes to request (e.g. `api://<api-id>/<scope>`).
    pub scopes: Vec<String>,
    /// Base URL of the protected service.
    pub base_url: String,
    /// Token cache file override; defaults to the platform location.
    pub cache_path: Option<PathBuf>,
}

impl ClientOptions {
    /// Provider endpoints for this authority.
    #[must_use]
    pub fn endpoints(&self) -> ProviderEndpoints {
        ProviderEndpoints::for_authority(&self.authority)
    }

    fn cache(&self) -> Result<TokenCache> {
        match &self.cache_path {
            Some(path) => TokenCache::new(path.clone()),
            None => TokenCache::default_location(),
        }
    }
}

/// Sign in (silently when possible) and call the protected endpoints.
///
/// # Errors
///
/// Returns an error when token acquisition fails for a reason other than
/// user cancellation, or a protected call cannot be made.
pub async fn run_sign_in(options: &ClientOptions) -> Result<()> {
    let cache = options.cache()?;

    let token = match acquire_token(options, &cache).await {
        Ok(token) => token,
        Err(SignInError::Canceled) => {
            // The user canceled sign-in; take no action.
            info!("Sign-in canceled");
            return Ok(());
        }
        Err(e @ SignInError::Unexpected { .. }) => {
            return Err(Error::Internal(e.to_string()));
        }
    };

    call_rest(options, &token.access_token).await?;
    call_graphql(options, &token.access_token).await?;

    Ok(())
}

/// Clear the cached tokens.
///
/// # Errors
///
/// Returns an error when the cache cannot be cleared.
pub async fn run_sign_out(options: &ClientOptions) -> Result<()> {
    options.cache()?.clear()?;
    println!("Signed out.");
    Ok(())
}

/// Silent-then-interactive token acquisition.
async fn acquire_token(
    options: &ClientOptions,
    cache: &TokenCache,
) -> std::result::Result<TokenInfo, SignInError> {
    let cached = cache.load().map_err(|e| SignInError::Unexpected {
        code: "cache_error".to_string(),
        message: e.to_string(),
    })?;

    if let Some(token) = cached {
        if !token.is_expired() {
            debug!("Using cached access token");
            return Ok(token);
        }
        if let Some(refresh_token) = token.refresh_token.as_deref() {
            if let Ok(refreshed) = signin::refresh(options, refresh_token).await {
                debug!("Refreshed access token");
                save_token(cache, &refreshed)?;
                return Ok(refreshed);
            }
        }
    }

    let token = signin::interactive_sign_in(options).await?;
    save_token(cache, &token)?;
    Ok(token)
}

fn save_token(cache: &TokenCache, token: &TokenInfo) -> std::result::Result<(), SignInError> {
    cache.save(token).map_err(|e| SignInError::Unexpected {
        code: "cache_error".to_string(),
        message: e.to_string(),
    })
}

/// Call the protected REST endpoint.
async fn call_rest(options: &ClientOptions, access_token: &str) -> Result<()> {
    let url = format!(
        "{}/api/Values/Profile",
        options.base_url.trim_end_matches('/')
    );
    let response = reqwest::Client::new()
        .get(&url)
        .bearer_auth(access_token)
        .send()
        .await?;

    if response.status().is_success() {
        println!("Got from REST API: {}", response.text().await?);
    } else {
        println!("Failed to get REST data! {}", response.status());
    }
    Ok(())
}

/// Call the protected GraphQL field.
async fn call_graphql(options: &ClientOptions, access_token: &str) -> Result<()> {
    let url = format!("{}/GraphQL", options.base_url.trim_end_matches('/'));
    let response = reqwest::Client::new()
        .post(&url)
        .bearer_auth(access_token)
        .json(&json!({ "query": "{ profile }" }))
        .send()
        .await?;

    if response.status().is_success() {
        println!("Got from GraphQL: {}", response.text().await?);
    } else {
        println!("Failed to get GraphQL data! {}", response.status());
    }
    Ok(())
}
