//! Claim sets carried by fabric credentials.

use serde::{Deserialize, Serialize};

use weft_core::scope::{any_pattern_matches, pattern_matches};
use weft_core::Timestamp;

/// Claims embedded in a capability token.
///
/// Every field is required; a token missing any of them fails verification
/// as malformed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityClaims {
    /// Subject — the actor the token was issued to.
    pub sub: String,
    /// Scope strings, exact (`db:inventory:read`) or wildcard
    /// (`event:publish:inventory:*`).
    pub capabilities: Vec<String>,
    /// Audience patterns naming the servers the token may be presented to.
    pub aud: Vec<String>,
    /// Issued-at, unix seconds.
    pub iat: u64,
    /// Expiry, unix seconds.
    pub exp: u64,
}

impl CapabilityClaims {
    pub fn is_expired(&self) -> bool {
        Timestamp::now().seconds_since_epoch > self.exp
    }
}

/// Claims embedded in a delegation proof.
///
/// A distinct credential type from [`CapabilityClaims`]: it is only
/// meaningful alongside a primary token, and its verifier takes the primary
/// claims as context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationClaims {
    /// Subject of the primary token that granted the delegation.
    pub delegator: String,
    /// Server name the proof is intended for.
    pub delegatee: String,
    /// Scope subset delegated to the delegatee.
    pub delegated_capabilities: Vec<String>,
    /// Issued-at, unix seconds.
    pub iat: u64,
    /// Expiry, unix seconds.
    pub exp: u64,
}

impl DelegationClaims {
    pub fn is_expired(&self) -> bool {
        Timestamp::now().seconds_since_epoch > self.exp
    }

    /// True if the delegated set grants `required` under the wildcard rule.
    pub fn grants(&self, required: &str) -> bool {
        any_pattern_matches(&self.delegated_capabilities, required)
    }
}

/// Returns true if any capability in `claims` satisfies `required`.
pub fn has_capability(claims: &CapabilityClaims, required: &str) -> bool {
    any_pattern_matches(&claims.capabilities, required)
}

/// Returns true if any audience pattern in `claims` matches `target`,
/// the verifying server's own name.
pub fn has_audience(claims: &CapabilityClaims, target: &str) -> bool {
    claims.aud.iter().any(|a| pattern_matches(a, target))
}
