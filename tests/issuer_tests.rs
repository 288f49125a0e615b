//! Multi-tenant issuer validation properties.
//!
//! Exercises the validator through the public API, the way the bearer
//! pipeline calls it.

use authgate::auth::{IssuerTemplates, validate_issuer};

const TEMPLATE: &str = "https://login.microsoftonline.com/{tenantid}/v2.0";

fn templates() -> IssuerTemplates {
    IssuerTemplates {
        allowed: vec![TEMPLATE.to_string()],
        default: None,
    }
}

#[test]
fn any_tenant_of_the_registration_is_accepted() {
    for tenant in ["contoso", "fabrikam", "9122040d-6c67-4c5b-b112-36a304b66dad"] {
        let issuer = format!("https://login.microsoftonline.com/{tenant}/v2.0");
        assert_eq!(
            validate_issuer(&issuer, Some(tenant), &templates()),
            Ok(issuer.clone()),
            "tenant {tenant} should validate"
        );
    }
}

#[test]
fn forged_issuer_host_is_rejected_for_any_tenant() {
    for tenant in ["contoso", "fabrikam"] {
        let issuer = format!("https://evil.example.com/{tenant}/v2.0");
        assert!(
            validate_issuer(&issuer, Some(tenant), &templates()).is_err(),
            "forged issuer for tenant {tenant} must be rejected"
        );
    }
}

#[test]
fn token_without_tenant_id_is_rejected_regardless_of_issuer() {
    let issuer = "https://login.microsoftonline.com/contoso/v2.0";
    assert!(validate_issuer(issuer, None, &templates()).is_err());
}

#[test]
fn misconfiguration_states_are_distinguishable() {
    // Nothing configured at all.
    let none = IssuerTemplates {
        allowed: vec![],
        default: None,
    };
    let err = validate_issuer("https://x/v2.0", Some("t"), &none).unwrap_err();
    assert_eq!(err.candidates, "null");

    // Configured, but only an empty entry.
    let empty = IssuerTemplates {
        allowed: vec![],
        default: Some(String::new()),
    };
    let err = validate_issuer("https://x/v2.0", Some("t"), &empty).unwrap_err();
    assert_eq!(err.candidates, "empty");

    // A real list renders its literals.
    let listed = IssuerTemplates {
        allowed: vec!["https://x/{tenantid}/v2.0".to_string()],
        default: None,
    };
    let err = validate_issuer("https://y/t/v2.0", Some("t"), &listed).unwrap_err();
    assert_eq!(err.candidates, "https://x/{tenantid}/v2.0");
}

#[test]
fn validation_is_pure_and_repeatable() {
    let issuer = "https://login.microsoftonline.com/contoso/v2.0";
    let first = validate_issuer(issuer, Some("contoso"), &templates());
    for _ in 0..10 {
        assert_eq!(validate_issuer(issuer, Some("contoso"), &templates()), first);
    }
}
