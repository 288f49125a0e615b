//! Authenticated principal attached to a request.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::schemes::SchemeName;

/// The authenticated identity resulting from a successful scheme evaluation.
///
/// Created per-request on successful validation and discarded at request
/// end; never persisted server-side. The cookie scheme persists it
/// client-side as a sealed blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    /// Claims from the validated credential.
    pub claims: Map<String, Value>,
    /// The scheme that produced this principal.
    pub scheme: SchemeName,
}

impl Principal {
    /// Create a principal from a claim map and the producing scheme.
    #[must_use]
    pub fn new(claims: Map<String, Value>, scheme: SchemeName) -> Self {
        Self { claims, scheme }
    }

    /// String claim accessor; `None` when absent or not a string.
    #[must_use]
    pub fn claim_str(&self, name: &str) -> Option<&str> {
        self.claims.get(name).and_then(Value::as_str)
    }

    /// Tenant id (`tid`) claim.
    #[must_use]
    pub fn tenant_id(&self) -> Option<&str> {
        self.claim_str("tid")
    }

    /// Issuer (`iss`) claim.
    #[must_use]
    pub fn issuer(&self) -> Option<&str> {
        self.claim_str("iss")
    }

    /// Subject (`sub`) claim.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.claim_str("sub")
    }

    /// Display name: `name`, falling back to `preferred_username`.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.claim_str("name")
            .or_else(|| self.claim_str("preferred_username"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims() -> Map<String, Value> {
        let Value::Object(map) = json!({
            "tid": "contoso",
            "iss": "https://login.microsoftonline.com/contoso/v2.0",
            "sub": "user-1",
            "preferred_username": "alice@contoso.com",
        }) else {
            unreachable!()
        };
        map
    }

    #[test]
    fn claim_accessors() {
        let p = Principal::new(claims(), SchemeName::Bearer);

        assert_eq!(p.tenant_id(), Some("contoso"));
        assert_eq!(p.subject(), Some("user-1"));
        assert_eq!(p.display_name(), Some("alice@contoso.com"));
        assert_eq!(p.scheme, SchemeName::Bearer);
    }

    #[test]
    fn non_string_claim_is_none() {
        let mut c = claims();
        c.insert("tid".to_string(), json!(42));
        let p = Principal::new(c, SchemeName::Cookie);

        assert_eq!(p.tenant_id(), None);
    }
}
