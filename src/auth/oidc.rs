//! OIDC challenge scheme: redirect-based interactive login.
//!
//! Unauthenticated browser traffic is forwarded here by the cookie
//! scheme's failure action. The challenge redirects to the identity
//! provider's authorize endpoint with signed correlation state; the
//! provider redirects back to `/signin-oidc` with an authorization code,
//! which is exchanged for an id_token. The id_token flows through the same
//! bearer validation pipeline (signature, audience, multi-tenant issuer)
//! and the resulting principal is sealed into the cookie scheme's session.

use rand::RngExt;
use serde::{Deserialize, Serialize};
use url::Url;

use super::AuthError;
use super::cookie::SessionCodec;
use crate::config::AuthenticationConfig;

/// Resolved provider endpoints.
///
/// Endpoint discovery is a deployment concern: explicit configuration wins,
/// and absent values fall back to the targeted provider family's
/// conventional layout under the authority URL.
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    /// Interactive authorization endpoint.
    pub authorize: String,
    /// Code-exchange token endpoint.
    pub token: String,
}

impl ProviderEndpoints {
    /// Conventional endpoint layout under an authority URL.
    #[must_use]
    pub fn for_authority(authority: &str) -> Self {
        let base = authority.trim_end_matches('/');
        Self {
            authorize: format!("{base}/oauth2/v2.0/authorize"),
            token: format!("{base}/oauth2/v2.0/token"),
        }
    }

    /// Resolve endpoints from configuration; explicit values win.
    #[must_use]
    pub fn from_config(config: &AuthenticationConfig) -> Self {
        let mut endpoints = Self::for_authority(&config.authority);
        if let Some(authorize) = &config.authorize_endpoint {
            endpoints.authorize.clone_from(authorize);
        }
        if let Some(token) = &config.token_endpoint {
            endpoints.token.clone_from(token);
        }
        endpoints
    }
}

/// Correlation state round-tripped through the provider, signed with the
/// session key so the callback can trust it.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChallengeState {
    /// Where to send the browser after the session is established.
    pub return_url: String,
    /// Nonce echoed in the id_token.
    pub nonce: String,
}

impl ChallengeState {
    /// Create state for a challenge, with a fresh nonce.
    #[must_use]
    pub fn new(return_url: String) -> Self {
        let nonce_bytes: [u8; 16] = rand::rng().random();
        Self {
            return_url,
            nonce: hex::encode(nonce_bytes),
        }
    }

    /// Seal into the signed `state` parameter.
    #[must_use]
    pub fn seal(&self, codec: &SessionCodec) -> String {
        let body = serde_json::to_vec(self).unwrap_or_default();
        codec.sign_state(&body)
    }

    /// Open a signed `state` parameter; `None` when the signature or shape
    /// is invalid.
    #[must_use]
    pub fn open(signed: &str, codec: &SessionCodec) -> Option<Self> {
        let body = codec.open_state(signed)?;
        serde_json::from_slice(&body).ok()
    }
}

/// Successful code exchange.
#[derive(Debug, Deserialize)]
pub struct TokenExchangeResponse {
    /// The OIDC identity token.
    pub id_token: String,
}

/// Error body returned by the token endpoint.
#[derive(Debug, Deserialize)]
struct TokenExchangeError {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// The OIDC scheme's challenge/exchange machinery.
pub struct OidcChallenge {
    endpoints: ProviderEndpoints,
    client_id: String,
    client_secret: Option<String>,
    scopes: Vec<String>,
    /// Callback path registered with the provider.
    pub redirect_path: String,
    http: reqwest::Client,
}

impl OidcChallenge {
    /// Build the challenge machinery from configuration.
    #[must_use]
    pub fn from_config(config: &AuthenticationConfig) -> Self {
        Self {
            endpoints: ProviderEndpoints::from_config(config),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            scopes: config.scopes.clone(),
            redirect_path: "/signin-oidc".to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Build the authorize-endpoint redirect URL for a challenge.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Challenge`] when the configured authorize
    /// endpoint is not a valid URL.
    pub fn challenge_url(
        &self,
        redirect_uri: &str,
        state: &str,
        nonce: &str,
    ) -> Result<Url, AuthError> {
        let mut url = Url::parse(&self.endpoints.authorize)
            .map_err(|e| AuthError::Challenge(format!("Invalid authorize endpoint: {e}")))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("response_type", "code")
            .append_pair("response_mode", "query")
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", &self.scopes.join(" "))
            .append_pair("state", state)
            .append_pair("nonce", nonce);
        Ok(url)
    }

    /// Exchange an authorization code for an id_token.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Challenge`] on transport failure or a provider
    /// error response.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenExchangeResponse, AuthError> {
        let mut form = vec![
            ("client_id", self.client_id.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ];
        let scope = self.scopes.join(" ");
        form.push(("scope", scope.as_str()));
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.as_str()));
        }

        let response = self
            .http
            .post(&self.endpoints.token)
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::Challenge(format!("Token endpoint unreachable: {e}")))?;

        if response.status().is_success() {
            response
                .json::<TokenExchangeResponse>()
                .await
                .map_err(|e| AuthError::Challenge(format!("Malformed token response: {e}")))
        } else {
            let err: TokenExchangeError = response.json().await.map_err(|e| {
                AuthError::Challenge(format!("Malformed token error response: {e}"))
            })?;
            Err(AuthError::Challenge(format!(
                "{}: {}",
                err.error,
                err.error_description.unwrap_or_default()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config() -> AuthenticationConfig {
        AuthenticationConfig {
            authority: "https://login.microsoftonline.com/common/v2.0".to_string(),
            client_id: "client-1".to_string(),
            ..AuthenticationConfig::default()
        }
    }

    fn codec() -> SessionCodec {
        SessionCodec::new(b"secret", "s".to_string(), Duration::from_secs(60))
    }

    #[test]
    fn endpoints_default_under_authority() {
        let endpoints = ProviderEndpoints::from_config(&config());

        assert_eq!(
            endpoints.authorize,
            "https://login.microsoftonline.com/common/v2.0/oauth2/v2.0/authorize"
        );
        assert_eq!(
            endpoints.token,
            "https://login.microsoftonline.com/common/v2.0/oauth2/v2.0/token"
        );
    }

    #[test]
    fn explicit_endpoints_win() {
        let cfg = AuthenticationConfig {
            authorize_endpoint: Some("https://idp.example/authorize".to_string()),
            token_endpoint: Some("https://idp.example/token".to_string()),
            ..config()
        };
        let endpoints = ProviderEndpoints::from_config(&cfg);

        assert_eq!(endpoints.authorize, "https://idp.example/authorize");
        assert_eq!(endpoints.token, "https://idp.example/token");
    }

    #[test]
    fn challenge_url_carries_protocol_parameters() {
        let challenge = OidcChallenge::from_config(&config());

        let url = challenge
            .challenge_url("https://localhost:5001/signin-oidc", "st", "nc")
            .unwrap();

        let query: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(query.contains(&("client_id".to_string(), "client-1".to_string())));
        assert!(query.contains(&("response_type".to_string(), "code".to_string())));
        assert!(query.contains(&(
            "redirect_uri".to_string(),
            "https://localhost:5001/signin-oidc".to_string()
        )));
        assert!(query.contains(&("state".to_string(), "st".to_string())));
        assert!(query.contains(&("nonce".to_string(), "nc".to_string())));
    }

    #[test]
    fn challenge_state_round_trips_through_signed_parameter() {
        let codec = codec();
        let state = ChallengeState::new("/Profile".to_string());

        let sealed = state.seal(&codec);
        let opened = ChallengeState::open(&sealed, &codec).unwrap();

        assert_eq!(opened, state);
        assert!(ChallengeState::open("forged.state", &codec).is_none());
    }

    #[test]
    fn nonces_are_unique_per_challenge() {
        let a = ChallengeState::new("/".to_string());
        let b = ChallengeState::new("/".to_string());
        assert_ne!(a.nonce, b.nonce);
    }
}
