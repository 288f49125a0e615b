//! Named credential-proof schemes and their process-wide registry.
//!
//! Three schemes participate in the pipeline:
//!
//! - **Cookie**: validates the session artifact set by a completed OIDC
//!   sign-in; its failure action is configurable to either a bare 401 or a
//!   forward to another scheme's challenge.
//! - **Bearer**: validates a presented JWT; failure always yields a status
//!   code, never a redirect, because API callers cannot follow interactive
//!   redirects.
//! - **Oidc**: orchestrates the redirect-based interactive login and, on
//!   completion, establishes the Cookie scheme's session artifact.
//!
//! The registry is built exactly once at startup and is immutable
//! afterwards. Registering the same scheme name twice is rejected, never
//! silently merged.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::AuthenticationConfig;
use crate::{Error, Result};

/// Scheme identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemeName {
    /// Browser session cookie.
    Cookie,
    /// Bearer JWT from the `Authorization` header.
    Bearer,
    /// OpenID Connect interactive challenge.
    Oidc,
}

impl SchemeName {
    /// Parse a configured scheme name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cookie" | "cookies" => Some(Self::Cookie),
            "bearer" => Some(Self::Bearer),
            "oidc" => Some(Self::Oidc),
            _ => None,
        }
    }
}

impl fmt::Display for SchemeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Cookie => "cookie",
            Self::Bearer => "bearer",
            Self::Oidc => "oidc",
        };
        f.write_str(s)
    }
}

/// Action taken when a scheme is asked to authenticate and cannot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// Respond with a status code (401 for missing principal).
    Status,
    /// Forward to the named scheme's interactive challenge.
    Forward(SchemeName),
}

/// Association between a scheme name and its pipeline capabilities.
#[derive(Debug, Clone)]
pub struct SchemeBinding {
    /// The scheme this binding describes.
    pub name: SchemeName,
    /// Whether the scheme can produce a [`Principal`](super::Principal)
    /// from request credentials.
    pub authenticates: bool,
    /// Whether the scheme can issue an interactive challenge (redirect).
    pub can_challenge: bool,
    /// Failure action for unauthenticated traffic hitting this scheme.
    pub failure: FailureAction,
}

/// Immutable, process-wide registry of scheme bindings.
#[derive(Debug, Clone)]
pub struct SchemeRegistry {
    bindings: Vec<SchemeBinding>,
}

impl SchemeRegistry {
    /// Start building a registry.
    #[must_use]
    pub fn builder() -> SchemeRegistryBuilder {
        SchemeRegistryBuilder {
            bindings: Vec::new(),
        }
    }

    /// Build the standard three bindings from configuration.
    ///
    /// The cookie scheme's failure action comes from
    /// `authentication.forward_challenge`; absent, it falls back to a bare
    /// 401.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the forward target names an unknown
    /// scheme or one that cannot issue a challenge.
    pub fn from_config(config: &AuthenticationConfig) -> Result<Self> {
        let cookie_failure = match config.forward_challenge.as_deref() {
            Some(name) => {
                let target = SchemeName::parse(name).ok_or_else(|| {
                    Error::Config(format!("Unknown forward_challenge scheme: {name}"))
                })?;
                FailureAction::Forward(target)
            }
            None => FailureAction::Status,
        };

        Self::builder()
            .register(SchemeBinding {
                name: SchemeName::Cookie,
                authenticates: true,
                can_challenge: false,
                failure: cookie_failure,
            })?
            .register(SchemeBinding {
                name: SchemeName::Bearer,
                authenticates: true,
                can_challenge: false,
                failure: FailureAction::Status,
            })?
            .register(SchemeBinding {
                name: SchemeName::Oidc,
                authenticates: false,
                can_challenge: true,
                failure: FailureAction::Status,
            })?
            .build()
    }

    /// Look up a binding by name.
    #[must_use]
    pub fn get(&self, name: SchemeName) -> Option<&SchemeBinding> {
        self.bindings.iter().find(|b| b.name == name)
    }

    /// All bindings in registration order.
    #[must_use]
    pub fn bindings(&self) -> &[SchemeBinding] {
        &self.bindings
    }

    /// The scheme unauthenticated browser traffic is forwarded to, if any.
    #[must_use]
    pub fn forward_target(&self) -> Option<SchemeName> {
        self.bindings.iter().find_map(|b| match b.failure {
            FailureAction::Forward(target) => Some(target),
            FailureAction::Status => None,
        })
    }
}

/// Builder enforcing one-time, reject-on-duplicate registration.
#[derive(Debug)]
pub struct SchemeRegistryBuilder {
    bindings: Vec<SchemeBinding>,
}

impl SchemeRegistryBuilder {
    /// Register a scheme binding.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the scheme name is already
    /// registered. Re-registration with different parameters must never
    /// silently merge.
    pub fn register(mut self, binding: SchemeBinding) -> Result<Self> {
        if self.bindings.iter().any(|b| b.name == binding.name) {
            return Err(Error::Config(format!(
                "Scheme '{}' is already registered",
                binding.name
            )));
        }
        self.bindings.push(binding);
        Ok(self)
    }

    /// Finish the registry, checking cross-binding invariants.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when more than one scheme is designated as
    /// a forward target, or a forward target references an unregistered or
    /// non-challenging scheme.
    pub fn build(self) -> Result<SchemeRegistry> {
        let forwards: Vec<SchemeName> = self
            .bindings
            .iter()
            .filter_map(|b| match b.failure {
                FailureAction::Forward(target) => Some(target),
                FailureAction::Status => None,
            })
            .collect();

        if forwards.len() > 1 {
            return Err(Error::Config(
                "At most one scheme may forward unauthenticated traffic to a challenge"
                    .to_string(),
            ));
        }

        if let Some(target) = forwards.first() {
            let ok = self
                .bindings
                .iter()
                .any(|b| b.name == *target && b.can_challenge);
            if !ok {
                return Err(Error::Config(format!(
                    "Forward target '{target}' is not a registered challenge scheme"
                )));
            }
        }

        Ok(SchemeRegistry {
            bindings: self.bindings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(name: SchemeName) -> SchemeBinding {
        SchemeBinding {
            name,
            authenticates: true,
            can_challenge: name == SchemeName::Oidc,
            failure: FailureAction::Status,
        }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let result = SchemeRegistry::builder()
            .register(binding(SchemeName::Bearer))
            .unwrap()
            .register(binding(SchemeName::Bearer));

        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn forward_target_must_be_registered_challenge_scheme() {
        let result = SchemeRegistry::builder()
            .register(SchemeBinding {
                name: SchemeName::Cookie,
                authenticates: true,
                can_challenge: false,
                failure: FailureAction::Forward(SchemeName::Oidc),
            })
            .unwrap()
            .build();

        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn standard_registry_binds_oidc_as_forward_target() {
        let config = AuthenticationConfig {
            forward_challenge: Some("oidc".to_string()),
            ..AuthenticationConfig::default()
        };

        let registry = SchemeRegistry::from_config(&config).unwrap();

        assert_eq!(registry.forward_target(), Some(SchemeName::Oidc));
        assert!(registry.get(SchemeName::Cookie).is_some());
        assert!(registry.get(SchemeName::Bearer).is_some());
        assert!(registry.get(SchemeName::Oidc).unwrap().can_challenge);
    }

    #[test]
    fn unknown_forward_target_fails() {
        let config = AuthenticationConfig {
            forward_challenge: Some("saml".to_string()),
            ..AuthenticationConfig::default()
        };

        assert!(SchemeRegistry::from_config(&config).is_err());
    }

    #[test]
    fn scheme_name_parses_config_spellings() {
        assert_eq!(SchemeName::parse("Cookies"), Some(SchemeName::Cookie));
        assert_eq!(SchemeName::parse("bearer"), Some(SchemeName::Bearer));
        assert_eq!(SchemeName::parse("OIDC"), Some(SchemeName::Oidc));
        assert_eq!(SchemeName::parse("saml"), None);
    }
}
