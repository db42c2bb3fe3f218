use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use gateway_common::DidInfo;
use gateway_provider_core::{header_get, Headers};

#[derive(Debug, Clone)]
pub struct AuthError {
    pub status: u16,
    pub message: String,
}

impl AuthError {
    fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

/// Verifies the caller's DID auth header and hands back their identity.
///
/// Real signature verification is an external collaborator's concern; this
/// crate only owns parsing the header into the shape the rest of the
/// pipeline needs. Swap in a different `AuthAdapter` to plug in a real
/// verifier without touching the router or pipeline.
pub trait AuthAdapter: Send + Sync {
    fn authenticate(&self, headers: &Headers) -> Result<DidInfo, AuthError>;
}

#[derive(serde::Deserialize)]
struct DidAuthPayload {
    did: String,
    #[serde(rename = "keyId")]
    key_id: String,
}

/// Parses `Authorization: DIDAuthV1 u<base64url-json>` into a `DidInfo`.
///
/// This stops at structural validity: well-formed prefix, valid base64url,
/// valid JSON with the two required fields. It does not check a signature —
/// that verification step lives with whichever collaborator owns DID key
/// resolution and is expected to wrap or replace this adapter.
#[derive(Debug, Default)]
pub struct DidHeaderAuth;

const SCHEME_PREFIX: &str = "DIDAuthV1 u";

impl AuthAdapter for DidHeaderAuth {
    fn authenticate(&self, headers: &Headers) -> Result<DidInfo, AuthError> {
        let raw = header_get(headers, "authorization")
            .ok_or_else(|| AuthError::new(401, "missing authorization header"))?;

        let encoded = raw
            .strip_prefix(SCHEME_PREFIX)
            .ok_or_else(|| AuthError::new(401, "unsupported authorization scheme"))?;

        let decoded = URL_SAFE_NO_PAD
            .decode(encoded.trim())
            .map_err(|_| AuthError::new(401, "malformed did auth payload"))?;

        let payload: DidAuthPayload = serde_json::from_slice(&decoded)
            .map_err(|_| AuthError::new(401, "malformed did auth payload"))?;

        if payload.did.is_empty() || payload.key_id.is_empty() {
            return Err(AuthError::new(401, "empty did or key id"));
        }

        Ok(DidInfo {
            did: payload.did,
            key_id: payload.key_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_payload(did: &str, key_id: &str) -> String {
        let json = format!(r#"{{"did":"{did}","keyId":"{key_id}"}}"#);
        URL_SAFE_NO_PAD.encode(json)
    }

    #[test]
    fn parses_well_formed_header() {
        let token = encode_payload("did:key:z6Mk...", "key-1");
        let headers: Headers = vec![(
            "authorization".to_string(),
            format!("DIDAuthV1 u{token}"),
        )];
        let info = DidHeaderAuth.authenticate(&headers).unwrap();
        assert_eq!(info.did, "did:key:z6Mk...");
        assert_eq!(info.key_id, "key-1");
    }

    #[test]
    fn missing_header_is_unauthorized() {
        let err = DidHeaderAuth.authenticate(&vec![]).unwrap_err();
        assert_eq!(err.status, 401);
    }

    #[test]
    fn wrong_scheme_is_rejected() {
        let headers: Headers = vec![("authorization".to_string(), "Bearer abc".to_string())];
        let err = DidHeaderAuth.authenticate(&headers).unwrap_err();
        assert_eq!(err.status, 401);
    }

    #[test]
    fn garbage_base64_is_rejected() {
        let headers: Headers = vec![(
            "authorization".to_string(),
            "DIDAuthV1 u!!!not-base64!!!".to_string(),
        )];
        assert!(DidHeaderAuth.authenticate(&headers).is_err());
    }
}
