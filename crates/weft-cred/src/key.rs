//! Shared-secret signing key.
//!
//! The fabric signs credentials with HMAC-SHA-256 under a 32-byte shared
//! secret. Deployments may substitute an asymmetric scheme behind the same
//! issue/verify interface; the key type here is the symmetric reference.

use zeroize::Zeroize;

use crate::error::{CredError, CredResult};

/// Key length required for HMAC-SHA-256 signing.
pub const KEY_LEN: usize = 32;

/// A 32-byte shared signing secret. Zeroed on drop.
#[derive(Clone)]
pub struct SigningKey([u8; KEY_LEN]);

impl SigningKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse a key from a 64-character hex string.
    pub fn from_hex(hex_str: &str) -> CredResult<Self> {
        let bytes = hex::decode(hex_str)
            .map_err(|_| CredError::InvalidKey("key is not valid hex".into()))?;
        let arr: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| CredError::InvalidKey(format!("key must be {} bytes", KEY_LEN)))?;
        Ok(Self(arr))
    }

    /// Generate a fresh random key from the OS RNG.
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningKey(..)")
    }
}

impl Drop for SigningKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}
