//! Capability token issuance and verification.
//!
//! Tokens are signed JSON claim sets. We do not depend on a JWT library;
//! the wire form is a compact envelope of the claims JSON followed by an
//! HMAC-SHA-256 tag, base64url-encoded under a versioned header:
//!
//! Token format: `wft1.cap.<base64url(claims_json || 32-byte tag)>`
//!
//! The MAC input is `header || claims_json`, so a token cannot be replayed
//! under a different envelope type.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::claims::CapabilityClaims;
use crate::error::{CredError, CredResult};
use crate::key::SigningKey;
use weft_core::Timestamp;

type HmacSha256 = Hmac<Sha256>;

/// Capability token header.
pub const CAPABILITY_HEADER: &str = "wft1.cap.";

/// HMAC-SHA-256 tag length appended to the payload.
pub(crate) const TAG_LEN: usize = 32;

/// Issue a signed capability token.
///
/// Pure with respect to process state: the only inputs are the arguments
/// and the clock.
pub fn issue(
    subject: &str,
    capabilities: Vec<String>,
    audience: Vec<String>,
    ttl_seconds: u64,
    key: &SigningKey,
) -> CredResult<String> {
    let now = Timestamp::now().seconds_since_epoch;
    let claims = CapabilityClaims {
        sub: subject.to_string(),
        capabilities,
        aud: audience,
        iat: now,
        exp: now + ttl_seconds,
    };
    let payload = serde_json::to_vec(&claims)
        .map_err(|_| CredError::Malformed("failed to encode claims".into()))?;
    Ok(seal_envelope(CAPABILITY_HEADER, &payload, key))
}

/// Verify a capability token and return its claims.
///
/// Checks, in order: envelope structure, MAC, claim shape, expiry.
pub fn verify(token: &str, key: &SigningKey) -> CredResult<CapabilityClaims> {
    let payload = open_envelope(CAPABILITY_HEADER, token, key)?;
    let claims: CapabilityClaims = serde_json::from_slice(&payload)
        .map_err(|_| CredError::Malformed("invalid claims JSON".into()))?;
    if claims.is_expired() {
        return Err(CredError::Expired);
    }
    Ok(claims)
}

/// Seal a payload under `header` with the key's MAC.
pub(crate) fn seal_envelope(header: &str, payload: &[u8], key: &SigningKey) -> String {
    let tag = compute_tag(header, payload, key);
    let mut body = Vec::with_capacity(payload.len() + TAG_LEN);
    body.extend_from_slice(payload);
    body.extend_from_slice(&tag);
    format!("{}{}", header, URL_SAFE_NO_PAD.encode(body))
}

/// Open an envelope: strip the header, decode, and verify the MAC.
/// Returns the raw claims payload.
pub(crate) fn open_envelope(header: &str, token: &str, key: &SigningKey) -> CredResult<Vec<u8>> {
    let encoded = token
        .strip_prefix(header)
        .ok_or_else(|| CredError::Malformed(format!("expected {} envelope", header)))?;
    let body = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|_| CredError::Malformed("invalid base64url encoding".into()))?;
    if body.len() < TAG_LEN {
        return Err(CredError::Malformed("token body too short".into()));
    }
    let (payload, tag) = body.split_at(body.len() - TAG_LEN);

    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .expect("HMAC accepts any key length, 32 bytes is always valid");
    mac.update(header.as_bytes());
    mac.update(payload);
    mac.verify_slice(tag)
        .map_err(|_| CredError::InvalidSignature)?;

    Ok(payload.to_vec())
}

fn compute_tag(header: &str, payload: &[u8], key: &SigningKey) -> [u8; TAG_LEN] {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .expect("HMAC accepts any key length, 32 bytes is always valid");
    mac.update(header.as_bytes());
    mac.update(payload);
    let out = mac.finalize().into_bytes();
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&out);
    tag
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::{has_audience, has_capability};

    fn make_key() -> SigningKey {
        SigningKey::from_bytes([0x42; 32])
    }

    fn issue_default(key: &SigningKey) -> String {
        issue(
            "agent-a",
            vec!["db:inventory:read".into(), "tool:compute_pricing".into()],
            vec!["InventoryDB_*".into()],
            300,
            key,
        )
        .unwrap()
    }

    #[test]
    fn test_issue_and_verify() {
        let key = make_key();
        let token = issue_default(&key);
        assert!(token.starts_with("wft1.cap."));

        let claims = verify(&token, &key).unwrap();
        assert_eq!(claims.sub, "agent-a");
        assert!(has_capability(&claims, "db:inventory:read"));
        assert!(has_audience(&claims, "InventoryDB_Primary"));
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_verify_wrong_key() {
        let token = issue_default(&make_key());
        let other = SigningKey::from_bytes([0x99; 32]);
        let result = verify(&token, &other);
        assert!(matches!(result, Err(CredError::InvalidSignature)));
    }

    #[test]
    fn test_verify_tampered_payload() {
        let key = make_key();
        let token = issue_default(&key);

        // Re-encode with one payload byte flipped; the MAC must reject it.
        let body = URL_SAFE_NO_PAD
            .decode(token.strip_prefix(CAPABILITY_HEADER).unwrap())
            .unwrap();
        let mut tampered = body.clone();
        tampered[0] ^= 0x01;
        let forged = format!("{}{}", CAPABILITY_HEADER, URL_SAFE_NO_PAD.encode(tampered));
        assert!(matches!(
            verify(&forged, &key),
            Err(CredError::InvalidSignature)
        ));
    }

    #[test]
    fn test_verify_wrong_header() {
        let key = make_key();
        assert!(matches!(
            verify("wft1.dlg.abc", &key),
            Err(CredError::Malformed(_))
        ));
        assert!(matches!(
            verify("not-a-token", &key),
            Err(CredError::Malformed(_))
        ));
    }

    #[test]
    fn test_verify_bad_base64() {
        let key = make_key();
        let result = verify("wft1.cap.!!!invalid!!!", &key);
        assert!(matches!(result, Err(CredError::Malformed(_))));
    }

    #[test]
    fn test_verify_too_short() {
        let key = make_key();
        let short = format!("{}{}", CAPABILITY_HEADER, URL_SAFE_NO_PAD.encode([0u8; 8]));
        assert!(matches!(verify(&short, &key), Err(CredError::Malformed(_))));
    }

    #[test]
    fn test_verify_expired() {
        let key = make_key();
        let claims = CapabilityClaims {
            sub: "agent-a".into(),
            capabilities: vec![],
            aud: vec![],
            iat: 1_000,
            exp: 2_000,
        };
        let payload = serde_json::to_vec(&claims).unwrap();
        let token = seal_envelope(CAPABILITY_HEADER, &payload, &key);
        assert!(matches!(verify(&token, &key), Err(CredError::Expired)));
    }

    #[test]
    fn test_verify_missing_claims_is_malformed() {
        let key = make_key();
        // Well-MACed envelope around JSON that is not a full claim set.
        let payload = br#"{"sub":"agent-a"}"#;
        let token = seal_envelope(CAPABILITY_HEADER, payload, &key);
        assert!(matches!(verify(&token, &key), Err(CredError::Malformed(_))));
    }

    #[test]
    fn test_header_binds_envelope_type() {
        let key = make_key();
        let claims = CapabilityClaims {
            sub: "agent-a".into(),
            capabilities: vec![],
            aud: vec![],
            iat: 1_000,
            exp: u64::MAX,
        };
        let payload = serde_json::to_vec(&claims).unwrap();
        let token = seal_envelope(CAPABILITY_HEADER, &payload, &key);

        // Swapping the header without re-MACing must fail the signature.
        let swapped = token.replacen("wft1.cap.", "wft1.dlg.", 1);
        let result = open_envelope("wft1.dlg.", &swapped, &key);
        assert!(matches!(result, Err(CredError::InvalidSignature)));
    }

    #[test]
    fn test_different_subjects_produce_different_tokens() {
        let key = make_key();
        let t1 = issue("agent-a", vec![], vec![], 300, &key).unwrap();
        let t2 = issue("agent-b", vec![], vec![], 300, &key).unwrap();
        assert_ne!(t1, t2);
    }
}
