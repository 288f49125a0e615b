//! Multi-tenant issuer validation.
//!
//! A multi-tenant application registration accepts tokens from every tenant
//! of the identity provider, so the issuer claim is of the form
//! `https://login.microsoftonline.com/{tenantid}/v2.0` and cannot be pinned
//! to a fixed list up front. Instead the configuration carries issuer
//! *templates* containing the literal placeholder `{tenantid}`; a token's
//! issuer is accepted when at least one template, after substituting the
//! token's own `tid` claim, equals the issuer exactly.
//!
//! Substitution is a single-pass literal string replace. Templates are never
//! treated as patterns and never matched partially, so a tenant id that
//! itself contains the placeholder substring cannot trigger recursive or
//! partial substitution.
//!
//! The validator is a pure function: same inputs, same verdict. It sits on
//! the hot path of every authenticated request and must be safe to
//! re-evaluate.

use std::fmt;

/// Literal placeholder substituted with the token's tenant id.
pub const TENANT_ID_PLACEHOLDER: &str = "{tenantid}";

/// Allowed issuer templates bound from configuration.
#[derive(Debug, Clone, Default)]
pub struct IssuerTemplates {
    /// Allowed issuer strings, each optionally containing `{tenantid}`.
    pub allowed: Vec<String>,
    /// Single default template, merged into the candidate set.
    pub default: Option<String>,
}

impl IssuerTemplates {
    /// Render the configured candidates for diagnostics.
    ///
    /// Three misconfiguration states are materially different and must stay
    /// distinguishable in error messages: nothing configured at all
    /// (`"null"`), configured but only empty entries (`"empty"`), and a
    /// real list (comma-joined literals).
    fn render(&self) -> String {
        if self.allowed.is_empty() && self.default.is_none() {
            return "null".to_string();
        }
        let non_empty: Vec<&str> = self
            .allowed
            .iter()
            .map(String::as_str)
            .chain(self.default.as_deref())
            .filter(|s| !s.is_empty())
            .collect();
        if non_empty.is_empty() {
            "empty".to_string()
        } else {
            non_empty.join(", ")
        }
    }

    /// Candidate templates: allowed ∪ default, minus empty entries.
    fn candidates(&self) -> impl Iterator<Item = &str> {
        self.allowed
            .iter()
            .map(String::as_str)
            .chain(self.default.as_deref())
            .filter(|s| !s.is_empty())
    }
}

/// The issuer claim matched no configured template.
///
/// Always fatal to the request's authentication attempt; never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidIssuerError {
    /// The issuer claim as presented by the token.
    pub issuer: String,
    /// Rendered candidate list (`"null"`, `"empty"`, or joined literals).
    pub candidates: String,
}

impl fmt::Display for InvalidIssuerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Issuer validation failed. Issuer: '{}'. Did not match allowed issuers: '{}'",
            self.issuer, self.candidates
        )
    }
}

impl std::error::Error for InvalidIssuerError {}

/// Signature of an issuer validator, passed into the bearer validation
/// configuration as a plain function pointer.
pub type IssuerValidatorFn =
    fn(&str, Option<&str>, &IssuerTemplates) -> Result<String, InvalidIssuerError>;

/// Validate a token's issuer claim against the configured templates.
///
/// `tid` is the token's tenant-id claim, `None` when absent or not a
/// well-formed string. Every occurrence of [`TENANT_ID_PLACEHOLDER`] in each
/// candidate is replaced with the tenant id and the result compared for
/// exact equality with `issuer`; the first match wins and returns the
/// accepted issuer.
///
/// # Errors
///
/// Returns [`InvalidIssuerError`] when the tenant-id claim is missing or no
/// candidate matches after substitution.
pub fn validate_issuer(
    issuer: &str,
    tid: Option<&str>,
    templates: &IssuerTemplates,
) -> Result<String, InvalidIssuerError> {
    if let Some(tid) = tid {
        for candidate in templates.candidates() {
            if candidate.replace(TENANT_ID_PLACEHOLDER, tid) == issuer {
                return Ok(issuer.to_string());
            }
        }
    }

    Err(InvalidIssuerError {
        issuer: issuer.to_string(),
        candidates: templates.render(),
    })
}
