//! Configuration management

use std::{env, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use rand::RngExt;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Identity-provider binding
    pub authentication: AuthenticationConfig,
    /// Session cookie configuration
    pub session: SessionConfig,
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist, cannot be
    /// parsed, or fails startup validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // Merge environment variables (AUTHGATE_ prefix)
        figment = figment.merge(Env::prefixed("AUTHGATE_").split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.expand_env_vars();
        config.validate()?;

        Ok(config)
    }

    /// Validate required values.
    ///
    /// Absence of required authentication values must fail startup, never
    /// silently disable auth.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the authority or client id is
    /// missing.
    pub fn validate(&self) -> Result<()> {
        if self.authentication.authority.trim().is_empty() {
            return Err(Error::Config(
                "authentication.authority is required".to_string(),
            ));
        }
        if self.authentication.client_id.trim().is_empty() {
            return Err(Error::Config(
                "authentication.client_id is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Expand `${VAR}` and `${VAR:-default}` patterns in secret-bearing
    /// values
    fn expand_env_vars(&mut self) {
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").expect("static pattern");

        if let Some(secret) = &self.authentication.client_secret {
            self.authentication.client_secret = Some(Self::expand_string(&re, secret));
        }
        self.session.secret = Self::expand_string(&re, &self.session.secret);
    }

    /// Expand environment variables in a string
    fn expand_string(re: &Regex, value: &str) -> String {
        re.replace_all(value, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map_or("", |m| m.as_str());
            env::var(var_name).unwrap_or_else(|_| default.to_string())
        })
        .into_owned()
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Externally visible base URL (for the OIDC redirect URI).
    /// Defaults to `http://{host}:{port}`.
    pub external_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5001,
            external_url: None,
        }
    }
}

impl ServerConfig {
    /// Resolve the externally visible base URL.
    #[must_use]
    pub fn resolve_external_url(&self) -> String {
        self.external_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", self.host, self.port))
    }
}

/// Identity-provider binding for the three schemes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthenticationConfig {
    /// Identity-provider authority URL (required)
    pub authority: String,
    /// Application (client) identifier (required)
    pub client_id: String,
    /// Client secret for the authorization-code exchange
    /// (supports `${VAR}` expansion)
    pub client_secret: Option<String>,
    /// Allowed issuer templates; each may contain the literal
    /// `{tenantid}` placeholder
    pub valid_issuers: Vec<String>,
    /// Single default issuer template merged into the candidate set
    pub default_issuer: Option<String>,
    /// JWKS URI override; defaults to the well-known path under the
    /// authority
    pub jwks_uri: Option<String>,
    /// Authorize endpoint override
    pub authorize_endpoint: Option<String>,
    /// Token endpoint override
    pub token_endpoint: Option<String>,
    /// Scopes requested during the interactive challenge
    pub scopes: Vec<String>,
    /// Scheme the cookie scheme forwards unauthenticated browser traffic
    /// to; `None` means a bare 401
    pub forward_challenge: Option<String>,
    /// Static symmetric signing key (development and tests only); when
    /// set, bearer tokens are verified with HS256 against this key
    /// instead of the provider's JWKS
    pub signing_key: Option<String>,
}

impl Default for AuthenticationConfig {
    fn default() -> Self {
        Self {
            authority: String::new(),
            client_id: String::new(),
            client_secret: None,
            valid_issuers: vec!["https://login.microsoftonline.com/{tenantid}/v2.0".to_string()],
            default_issuer: None,
            jwks_uri: None,
            authorize_endpoint: None,
            token_endpoint: None,
            scopes: vec!["openid".to_string(), "profile".to_string()],
            forward_challenge: Some("oidc".to_string()),
            signing_key: None,
        }
    }
}

/// Session cookie configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Session signing secret
    /// Supports: literal value, `${VAR}` expansion, or `auto` (generates a
    /// random secret; sessions do not survive restarts)
    pub secret: String,
    /// Session cookie name
    pub cookie_name: String,
    /// Session lifetime
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: "auto".to_string(),
            cookie_name: "authgate.session".to_string(),
            ttl: Duration::from_secs(8 * 3600),
        }
    }
}

impl SessionConfig {
    /// Resolve the session secret (generate if `auto`)
    #[must_use]
    pub fn resolve_secret(&self) -> Vec<u8> {
        if self.secret == "auto" {
            let random_bytes: [u8; 32] = rand::rng().random();
            tracing::info!("Generated random session secret; sessions will not survive restarts");
            random_bytes.to_vec()
        } else {
            self.secret.clone().into_bytes()
        }
    }
}

/// Custom humantime serde module for Duration
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration to human-readable string (e.g., "30s")
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}s", duration.as_secs()))
    }

    /// Deserialize human-readable duration string (e.g., "30s", "5m", "8h")
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the string cannot be parsed as a
    /// duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;

        if let Some(hours) = s.strip_suffix('h') {
            hours
                .parse::<u64>()
                .map(|h| Duration::from_secs(h * 3600))
                .map_err(serde::de::Error::custom)
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(serde::de::Error::custom)
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_deserializes_from_yaml() {
        let yaml = r#"
server:
  host: "0.0.0.0"
  port: 8443
authentication:
  authority: "https://login.microsoftonline.com/common/v2.0"
  client_id: "11111111-2222-3333-4444-555555555555"
  valid_issuers:
    - "https://login.microsoftonline.com/{tenantid}/v2.0"
  forward_challenge: "oidc"
session:
  cookie_name: "sample.session"
  ttl: "8h"
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.server.port, 8443);
        assert_eq!(
            config.authentication.valid_issuers,
            vec!["https://login.microsoftonline.com/{tenantid}/v2.0"]
        );
        assert_eq!(config.session.cookie_name, "sample.session");
        assert_eq!(config.session.ttl, Duration::from_secs(8 * 3600));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_client_id_fails_validation() {
        let config = Config {
            authentication: AuthenticationConfig {
                authority: "https://login.microsoftonline.com/common/v2.0".to_string(),
                client_id: String::new(),
                ..AuthenticationConfig::default()
            },
            ..Config::default()
        };

        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn missing_authority_fails_validation() {
        let config = Config {
            authentication: AuthenticationConfig {
                client_id: "client".to_string(),
                ..AuthenticationConfig::default()
            },
            ..Config::default()
        };

        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn auto_session_secret_is_random() {
        let session = SessionConfig::default();
        assert_ne!(session.resolve_secret(), session.resolve_secret());
    }

    #[test]
    fn literal_session_secret_is_kept() {
        let session = SessionConfig {
            secret: "fixed-secret".to_string(),
            ..SessionConfig::default()
        };
        assert_eq!(session.resolve_secret(), b"fixed-secret".to_vec());
    }

    #[test]
    fn external_url_defaults_from_host_and_port() {
        let server = ServerConfig::default();
        assert_eq!(server.resolve_external_url(), "http://127.0.0.1:5001");
    }
}
