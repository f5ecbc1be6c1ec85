//! Delegation proofs — scoped authority handed from one agent to another.
//!
//! A proof is a second signed credential that accompanies the delegator's
//! primary token on a call made on the delegator's behalf. Verification
//! takes the primary claims as context: the proof is only valid if its
//! delegated scopes are implied by what the delegator actually holds.
//!
//! Proof format: `wft1.dlg.<base64url(claims_json || 32-byte tag)>`

use crate::claims::{CapabilityClaims, DelegationClaims};
use crate::error::{CredError, CredResult};
use crate::key::SigningKey;
use crate::token::{open_envelope, seal_envelope};
use weft_core::scope::any_pattern_matches;
use weft_core::Timestamp;

/// Delegation proof header.
pub const DELEGATION_HEADER: &str = "wft1.dlg.";

/// Issue a signed delegation proof.
pub fn issue_delegation(
    delegator: &str,
    delegatee: &str,
    delegated_capabilities: Vec<String>,
    ttl_seconds: u64,
    key: &SigningKey,
) -> CredResult<String> {
    let now = Timestamp::now().seconds_since_epoch;
    let claims = DelegationClaims {
        delegator: delegator.to_string(),
        delegatee: delegatee.to_string(),
        delegated_capabilities,
        iat: now,
        exp: now + ttl_seconds,
    };
    let payload = serde_json::to_vec(&claims)
        .map_err(|_| CredError::Malformed("failed to encode delegation claims".into()))?;
    Ok(seal_envelope(DELEGATION_HEADER, &payload, key))
}

/// Verify a delegation proof against the primary token's claims.
///
/// Requires, in order:
/// 1. a valid MAC over a well-formed claim set,
/// 2. an unexpired proof,
/// 3. `delegator` equal to the primary subject,
/// 4. `delegatee` equal to the verifying server's name,
/// 5. every delegated scope implied by some primary capability
///    (wildcard-aware).
pub fn verify_delegation(
    primary: &CapabilityClaims,
    proof: &str,
    delegatee: &str,
    key: &SigningKey,
) -> CredResult<DelegationClaims> {
    let payload = open_envelope(DELEGATION_HEADER, proof, key)?;
    let claims: DelegationClaims = serde_json::from_slice(&payload)
        .map_err(|_| CredError::Malformed("invalid delegation claims JSON".into()))?;

    if claims.is_expired() {
        return Err(CredError::Expired);
    }
    if claims.delegator != primary.sub {
        return Err(CredError::DelegationRejected(format!(
            "delegator '{}' does not match token subject '{}'",
            claims.delegator, primary.sub
        )));
    }
    if claims.delegatee != delegatee {
        return Err(CredError::DelegationRejected(format!(
            "proof intended for '{}', not '{}'",
            claims.delegatee, delegatee
        )));
    }
    for scope in &claims.delegated_capabilities {
        if !any_pattern_matches(&primary.capabilities, scope) {
            return Err(CredError::DelegationRejected(format!(
                "delegated scope '{}' exceeds the delegator's capabilities",
                scope
            )));
        }
    }

    Ok(claims)
}
