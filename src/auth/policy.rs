//! Authorization policy applied when a handler names no explicit policy.
//!
//! One endpoint (the REST profile endpoint, say) must serve both a browser
//! session and a native client presenting a bearer token without two code
//! paths, so the default policy accepts a principal from *either* the
//! Bearer or the Cookie scheme. The accepted-scheme set must include every
//! scheme capable of producing a principal, or legitimately authenticated
//! callers using an excluded scheme would be rejected.

use super::principal::Principal;
use super::schemes::SchemeName;

/// An ordered set of accepted schemes plus a require-authenticated flag.
#[derive(Debug, Clone)]
pub struct AuthorizationPolicy {
    /// Schemes whose principals this policy accepts, in evaluation order.
    pub schemes: Vec<SchemeName>,
    /// Whether a non-null, authenticated principal is required.
    pub require_authenticated: bool,
}

/// Outcome of evaluating a policy against the request's principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    /// The request may proceed.
    Allow,
    /// No principal could be established by any accepted scheme.
    Unauthorized,
    /// A principal exists but was produced by a scheme the policy excludes.
    Forbidden,
}

impl AuthorizationPolicy {
    /// The default policy: Bearer or Cookie, authenticated principal
    /// required.
    #[must_use]
    pub fn default_policy() -> Self {
        Self {
            schemes: vec![SchemeName::Bearer, SchemeName::Cookie],
            require_authenticated: true,
        }
    }

    /// Evaluate this policy against an optional principal.
    #[must_use]
    pub fn evaluate(&self, principal: Option<&Principal>) -> PolicyDecision {
        if !self.require_authenticated {
            return PolicyDecision::Allow;
        }
        match principal {
            None => PolicyDecision::Unauthorized,
            Some(p) if self.schemes.contains(&p.scheme) => PolicyDecision::Allow,
            Some(_) => PolicyDecision::Forbidden,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn principal(scheme: SchemeName) -> Principal {
        Principal::new(Map::new(), scheme)
    }

    #[test]
    fn default_policy_accepts_bearer_and_cookie() {
        let policy = AuthorizationPolicy::default_policy();

        assert_eq!(
            policy.evaluate(Some(&principal(SchemeName::Bearer))),
            PolicyDecision::Allow
        );
        assert_eq!(
            policy.evaluate(Some(&principal(SchemeName::Cookie))),
            PolicyDecision::Allow
        );
    }

    #[test]
    fn missing_principal_is_unauthorized() {
        let policy = AuthorizationPolicy::default_policy();
        assert_eq!(policy.evaluate(None), PolicyDecision::Unauthorized);
    }

    #[test]
    fn excluded_scheme_is_forbidden() {
        let policy = AuthorizationPolicy {
            schemes: vec![SchemeName::Bearer],
            require_authenticated: true,
        };

        assert_eq!(
            policy.evaluate(Some(&principal(SchemeName::Cookie))),
            PolicyDecision::Forbidden
        );
    }

    #[test]
    fn anonymous_policy_always_allows() {
        let policy = AuthorizationPolicy {
            schemes: vec![],
            require_authenticated: false,
        };

        assert_eq!(policy.evaluate(None), PolicyDecision::Allow);
    }
}
