//! Minimal GraphQL query execution with field-level authorization.
//!
//! The endpoint gate allows anonymous callers through (some fields are
//! public), so enforcement happens here: each registered field is tagged
//! with whether it requires an authenticated principal, and resolution of
//! a tagged field without one produces a GraphQL error instead of data.
//!
//! The executor dispatches top-level fields of documents shaped like
//! `{ profile values }`. Resolvers are opaque functions returning data;
//! selection sets, arguments and fragments are out of scope.

use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::auth::Principal;

/// A resolvable top-level field.
pub struct Field {
    /// Field name as it appears in queries.
    pub name: &'static str,
    /// Whether resolution requires an authenticated principal.
    pub requires_auth: bool,
    /// The resolver; receives the request principal, if any.
    pub resolver: fn(Option<&Principal>) -> Value,
}

/// The executable schema: a registry of tagged fields.
pub struct Schema {
    fields: Vec<Field>,
}

/// JSON request body for the GraphQL endpoint.
#[derive(Debug, Deserialize)]
pub struct GraphQlRequest {
    /// The query document.
    pub query: String,
}

impl Schema {
    /// Create a schema from explicit fields.
    #[must_use]
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// The sample schema: a public `values` field and a protected
    /// `profile` field.
    #[must_use]
    pub fn sample() -> Self {
        Self::new(vec![
            Field {
                name: "values",
                requires_auth: false,
                resolver: |_| json!("Hello GraphQL!"),
            },
            Field {
                name: "profile",
                requires_auth: true,
                resolver: |_| json!("Profile"),
            },
        ])
    }

    /// Execute a query document against the request's principal.
    ///
    /// Returns the GraphQL response value: `{"data": …}` on success,
    /// `{"errors": […]}` otherwise.
    #[must_use]
    pub fn execute(&self, query: &str, principal: Option<&Principal>) -> Value {
        let Some(selections) = parse_top_level(query) else {
            return error_response("Malformed query document", "GRAPHQL_PARSE_FAILED");
        };
        if selections.is_empty() {
            return error_response("Empty selection set", "GRAPHQL_PARSE_FAILED");
        }

        let mut data = Map::new();
        for name in selections {
            let Some(field) = self.fields.iter().find(|f| f.name == name) else {
                return error_response(
                    &format!("Field '{name}' does not exist"),
                    "GRAPHQL_FIELD_NOT_FOUND",
                );
            };
            if field.requires_auth && principal.is_none() {
                return error_response(
                    "The current user is not authorized to access this resource",
                    "AUTH_NOT_AUTHORIZED",
                );
            }
            data.insert(name.to_string(), (field.resolver)(principal));
        }

        json!({ "data": data })
    }
}

/// Extract top-level field names from `{ a b }` (optionally prefixed with
/// the `query` keyword).
fn parse_top_level(query: &str) -> Option<Vec<&str>> {
    let trimmed = query.trim();
    let trimmed = trimmed.strip_prefix("query").map_or(trimmed, str::trim_start);
    let inner = trimmed.strip_prefix('{')?.strip_suffix('}')?;
    Some(inner.split_whitespace().collect())
}

fn error_response(message: &str, code: &str) -> Value {
    json!({
        "errors": [{
            "message": message,
            "extensions": { "code": code }
        }]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SchemeName;

    fn principal() -> Principal {
        Principal::new(Map::new(), SchemeName::Bearer)
    }

    #[test]
    fn public_field_resolves_anonymously() {
        let response = Schema::sample().execute("{ values }", None);
        assert_eq!(response["data"]["values"], json!("Hello GraphQL!"));
    }

    #[test]
    fn protected_field_is_rejected_without_principal() {
        let response = Schema::sample().execute("{ profile }", None);

        assert!(response.get("data").is_none());
        assert_eq!(
            response["errors"][0]["extensions"]["code"],
            json!("AUTH_NOT_AUTHORIZED")
        );
    }

    #[test]
    fn protected_field_resolves_with_principal() {
        let response = Schema::sample().execute("{ profile }", Some(&principal()));
        assert_eq!(response["data"]["profile"], json!("Profile"));
    }

    #[test]
    fn multiple_fields_resolve_together() {
        let response = Schema::sample().execute("{ values profile }", Some(&principal()));

        assert_eq!(response["data"]["values"], json!("Hello GraphQL!"));
        assert_eq!(response["data"]["profile"], json!("Profile"));
    }

    #[test]
    fn query_keyword_prefix_is_accepted() {
        let response = Schema::sample().execute("query { values }", None);
        assert_eq!(response["data"]["values"], json!("Hello GraphQL!"));
    }

    #[test]
    fn unknown_field_is_an_error() {
        let response = Schema::sample().execute("{ secrets }", Some(&principal()));
        assert_eq!(
            response["errors"][0]["extensions"]["code"],
            json!("GRAPHQL_FIELD_NOT_FOUND")
        );
    }

    #[test]
    fn malformed_document_is_an_error() {
        let response = Schema::sample().execute("profile", None);
        assert_eq!(
            response["errors"][0]["extensions"]["code"],
            json!("GRAPHQL_PARSE_FAILED")
        );
    }
}
