//! Cookie scheme: client-side session blobs.
//!
//! A completed OIDC sign-in seals the principal into a tamper-proof blob
//! stored in a cookie; each subsequent browser request re-opens it. The
//! blob is `base64url(payload) . base64url(HMAC-SHA256(payload))` with the
//! MAC compared in constant time. Nothing is persisted server-side.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, KeyInit, Mac};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::AuthError;
use super::principal::Principal;
use super::schemes::SchemeName;

type HmacSha256 = Hmac<Sha256>;

/// Sealed session payload carried by the cookie.
#[derive(Debug, Serialize, Deserialize)]
struct SessionPayload {
    /// Principal claims captured at sign-in.
    claims: Map<String, Value>,
    /// Absolute expiry (Unix seconds).
    exp: u64,
}

/// Seals and opens session cookies.
///
/// Built once at startup from the session secret; immutable afterwards.
pub struct SessionCodec {
    key: Vec<u8>,
    cookie_name: String,
    ttl: Duration,
}

impl SessionCodec {
    /// Create a codec from the session secret.
    #[must_use]
    pub fn new(secret: &[u8], cookie_name: String, ttl: Duration) -> Self {
        Self {
            key: secret.to_vec(),
            cookie_name,
            ttl,
        }
    }

    /// Cookie name this codec reads and writes.
    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Seal a principal into a session blob.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Session`] if the payload cannot be serialized.
    pub fn seal(&self, principal: &Principal) -> Result<String, AuthError> {
        let payload = SessionPayload {
            claims: principal.claims.clone(),
            exp: now_secs() + self.ttl.as_secs(),
        };
        let body = serde_json::to_vec(&payload)
            .map_err(|_| AuthError::Session("session payload not serializable"))?;

        let tag = self.mac(&body);
        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&body),
            URL_SAFE_NO_PAD.encode(tag)
        ))
    }

    /// Open a session blob, yielding the principal it carries.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Session`] when the blob is malformed, the MAC
    /// does not verify, or the session has expired.
    pub fn open(&self, blob: &str) -> Result<Principal, AuthError> {
        let (body_b64, tag_b64) = blob
            .split_once('.')
            .ok_or(AuthError::Session("malformed session blob"))?;

        let body = URL_SAFE_NO_PAD
            .decode(body_b64)
            .map_err(|_| AuthError::Session("malformed session blob"))?;
        let tag = URL_SAFE_NO_PAD
            .decode(tag_b64)
            .map_err(|_| AuthError::Session("malformed session blob"))?;

        let expected = self.mac(&body);
        if expected.as_slice().ct_eq(tag.as_slice()).unwrap_u8() != 1 {
            return Err(AuthError::Session("session signature mismatch"));
        }

        let payload: SessionPayload = serde_json::from_slice(&body)
            .map_err(|_| AuthError::Session("malformed session payload"))?;

        if payload.exp <= now_secs() {
            return Err(AuthError::Session("session expired"));
        }

        Ok(Principal::new(payload.claims, SchemeName::Cookie))
    }

    /// Extract this codec's cookie value from a `Cookie` header.
    #[must_use]
    pub fn extract<'a>(&self, cookie_header: &'a str) -> Option<&'a str> {
        cookie_header.split(';').find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == self.cookie_name).then_some(value)
        })
    }

    /// `Set-Cookie` value establishing the session.
    #[must_use]
    pub fn set_cookie(&self, blob: &str) -> String {
        format!(
            "{}={blob}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            self.cookie_name,
            self.ttl.as_secs()
        )
    }

    /// `Set-Cookie` value clearing the session.
    #[must_use]
    pub fn clear_cookie(&self) -> String {
        format!(
            "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
            self.cookie_name
        )
    }

    /// Sign transient state (OIDC correlation) with the session key.
    #[must_use]
    pub fn sign_state(&self, state: &[u8]) -> String {
        format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(state),
            URL_SAFE_NO_PAD.encode(self.mac(state))
        )
    }

    /// Verify and unwrap transient state signed by [`Self::sign_state`].
    #[must_use]
    pub fn open_state(&self, signed: &str) -> Option<Vec<u8>> {
        let (body_b64, tag_b64) = signed.split_once('.')?;
        let body = URL_SAFE_NO_PAD.decode(body_b64).ok()?;
        let tag = URL_SAFE_NO_PAD.decode(tag_b64).ok()?;
        (self.mac(&body).as_slice().ct_eq(tag.as_slice()).unwrap_u8() == 1).then_some(body)
    }

    fn mac(&self, data: &[u8]) -> Vec<u8> {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("HMAC accepts any key length");
        mac.update(data);
        mac.finalize().into_bytes().to_vec()
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
