//! Bearer scheme: JWT validation producing a [`Principal`].
//!
//! Signature, expiry and audience are verified by `jsonwebtoken`; the
//! issuer claim is then checked by the multi-tenant issuer validator, which
//! is injected as a plain function pointer so the hot path stays pure and
//! testable. Failure never redirects: API callers cannot follow
//! interactive challenges.

use std::sync::Arc;

use jsonwebtoken::{Algorithm, DecodingKey, Header, TokenData, Validation};
use serde_json::{Map, Value};
use tracing::warn;

use super::AuthError;
use super::issuer::{IssuerTemplates, IssuerValidatorFn, validate_issuer};
use super::jwks::JwksCache;
use super::principal::Principal;
use super::schemes::SchemeName;

/// Where bearer signature keys come from.
pub enum KeySource {
    /// OIDC discovery: fetch the provider's JWKS (cached, single-flight).
    Jwks {
        /// Shared key cache.
        cache: Arc<JwksCache>,
        /// JWKS document URI.
        jwks_uri: String,
    },
    /// A statically configured key (development, tests, pinned deployments).
    Static {
        /// The decoding key.
        key: DecodingKey,
        /// Algorithm the key verifies.
        algorithm: Algorithm,
    },
}

/// Bearer token validation configuration.
///
/// Built once at startup; immutable and shared across requests.
pub struct BearerValidator {
    /// Expected audience (the application's client id).
    audience: String,
    /// Allowed issuer templates.
    templates: IssuerTemplates,
    /// Issuer validation function (defaults to
    /// [`validate_issuer`](super::issuer::validate_issuer)).
    issuer_validator: IssuerValidatorFn,
    /// Signature key source.
    key_source: KeySource,
}

impl BearerValidator {
    /// Create a validator.
    #[must_use]
    pub fn new(audience: String, templates: IssuerTemplates, key_source: KeySource) -> Self {
        Self {
            audience,
            templates,
            issuer_validator: validate_issuer,
            key_source,
        }
    }

    /// Override the issuer validation function.
    #[must_use]
    pub fn with_issuer_validator(mut self, validator: IssuerValidatorFn) -> Self {
        self.issuer_validator = validator;
        self
    }

    /// Validate a compact JWT and produce the principal it asserts.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when the signature, expiry, audience or issuer
    /// is rejected, or the signing key cannot be resolved.
    pub async fn validate(&self, token: &str) -> Result<Principal, AuthError> {
        let header = jsonwebtoken::decode_header(token)?;

        let (decoding_key, algorithm) = match &self.key_source {
            KeySource::Static { key, algorithm } => (key.clone(), *algorithm),
            KeySource::Jwks { cache, jwks_uri } => {
                let kid = header.kid.clone().ok_or(AuthError::MissingKeyId)?;
                let key = cache.find_decoding_key(jwks_uri, &kid).await?;
                (key, asymmetric_algorithm(&header))
            }
        };

        let mut validation = Validation::new(algorithm);
        validation.leeway = 60;
        // Standard audience validation is disabled and handled manually
        // below to support both single-string and array forms. The issuer
        // claim cannot be preset as a literal list at all (multi-tenant),
        // so it is left to the injected validator.
        validation.validate_aud = false;

        let token_data: TokenData<Map<String, Value>> =
            jsonwebtoken::decode(token, &decoding_key, &validation)?;
        let claims = token_data.claims;

        if !self.audience.is_empty() {
            check_audience(claims.get("aud"), &self.audience)?;
        }

        let issuer = claims.get("iss").and_then(Value::as_str).unwrap_or_default();
        let tid = claims.get("tid").and_then(Value::as_str);
        (self.issuer_validator)(issuer, tid, &self.templates)?;

        Ok(Principal::new(claims, SchemeName::Bearer))
    }
}

/// Validate that the token's `aud` claim contains the expected audience.
///
/// The claim may be a single string or an array of strings.
fn check_audience(aud_claim: Option<&Value>, expected: &str) -> Result<(), AuthError> {
    let matches = match aud_claim {
        Some(Value::String(s)) => s == expected,
        Some(Value::Array(arr)) => arr
            .iter()
            .any(|v| v.as_str().is_some_and(|s| s == expected)),
        _ => false,
    };

    if matches {
        Ok(())
    } else {
        Err(AuthError::TokenRejected(jsonwebtoken::errors::Error::from(
            jsonwebtoken::errors::ErrorKind::InvalidAudience,
        )))
    }
}

/// Restrict the header-declared algorithm to the asymmetric set used with
/// JWKS keys.
fn asymmetric_algorithm(header: &Header) -> Algorithm {
    match header.alg {
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::ES256
        | Algorithm::ES384 => header.alg,
        other => {
            warn!(alg = ?other, "Unsupported JWT algorithm for JWKS keys, defaulting to RS256");
            Algorithm::RS256
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, encode};
    use serde_json::json;
    use std::time::{SystemTime, UNIX_EPOCH};

    const SECRET: &[u8] = b"unit-test-signing-secret";
    const CLIENT_ID: &str = "11111111-2222-3333-4444-555555555555";

    fn validator() -> BearerValidator {
        BearerValidator::new(
            CLIENT_ID.to_string(),
            IssuerTemplates {
                allowed: vec!["https://login.microsoftonline.com/{tenantid}/v2.0".to_string()],
                default: None,
            },
            KeySource::Static {
                key: DecodingKey::from_secret(SECRET),
                algorithm: Algorithm::HS256,
            },
        )
    }

    fn sign(claims: &Value) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap()
    }

    fn fresh_exp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
            + 600
    }

    #[tokio::test]
    async fn valid_token_yields_bearer_principal() {
        let token = sign(&json!({
            "aud": CLIENT_ID,
            "exp": fresh_exp(),
            "tid": "contoso",
            "iss": "https://login.microsoftonline.com/contoso/v2.0",
            "name": "Alice",
        }));

        let principal = validator().validate(&token).await.unwrap();

        assert_eq!(principal.scheme, SchemeName::Bearer);
        assert_eq!(principal.tenant_id(), Some("contoso"));
        assert_eq!(principal.display_name(), Some("Alice"));
    }

    #[tokio::test]
    async fn wrong_issuer_is_invalid_issuer() {
        let token = sign(&json!({
            "aud": CLIENT_ID,
            "exp": fresh_exp(),
            "tid": "contoso",
            "iss": "https://evil.example.com/contoso/v2.0",
        }));

        let err = validator().validate(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidIssuer(_)));
    }

    #[tokio::test]
    async fn missing_tid_is_invalid_issuer() {
        let token = sign(&json!({
            "aud": CLIENT_ID,
            "exp": fresh_exp(),
            "iss": "https://login.microsoftonline.com/contoso/v2.0",
        }));

        let err = validator().validate(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidIssuer(_)));
    }

    #[tokio::test]
    async fn wrong_audience_is_rejected_before_issuer_check() {
        let token = sign(&json!({
            "aud": "some-other-app",
            "exp": fresh_exp(),
            "tid": "contoso",
            "iss": "https://login.microsoftonline.com/contoso/v2.0",
        }));

        let err = validator().validate(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenRejected(_)));
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let token = sign(&json!({
            "aud": CLIENT_ID,
            "exp": 1_000_000,
            "tid": "contoso",
            "iss": "https://login.microsoftonline.com/contoso/v2.0",
        }));

        let err = validator().validate(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenRejected(_)));
    }

    #[tokio::test]
    async fn audience_array_form_is_accepted() {
        let token = sign(&json!({
            "aud": ["other-app", CLIENT_ID],
            "exp": fresh_exp(),
            "tid": "contoso",
            "iss": "https://login.microsoftonline.com/contoso/v2.0",
        }));

        assert!(validator().validate(&token).await.is_ok());
    }

    #[tokio::test]
    async fn garbage_token_is_rejected() {
        let err = validator().validate("not-a-jwt").await.unwrap_err();
        assert!(matches!(err, AuthError::TokenRejected(_)));
    }
}
