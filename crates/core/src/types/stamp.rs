//! Revocation stamps.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Number of random bytes in a freshly generated stamp.
const STAMP_BYTES: usize = 24;

/// Opaque per-account value copied into every session credential.
///
/// Rotating the stamp on the account record invalidates every credential
/// issued before the rotation, without any session store.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(feature = "postgres", sqlx(transparent))]
#[serde(transparent)]
pub struct RevocationStamp(String);

impl RevocationStamp {
    /// Generate a new random stamp (24 bytes, base64url without padding).
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0_u8; STAMP_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Get the stamp as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RevocationStamp {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for RevocationStamp {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

// Stamps are not secrets, but there is no reason to spray them into logs.
impl std::fmt::Debug for RevocationStamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RevocationStamp(..)")
    }
}
