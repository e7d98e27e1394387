//! Checksummed public address derivation and parsing.
//!
//! An Overlink address is the 32-byte Ed25519 public key followed by a
//! 4-byte checksum (the first 4 bytes of `SHA3-256(public_key)`),
//! 36 bytes total. Addresses are rendered as 72 uppercase hex characters
//! for display and safe copy-paste (typo detection).

use std::fmt;
use std::str::FromStr;

use overlink_types::{OverlinkError, PublicKey, Result};
use sha3::{Digest, Sha3_256};

/// Number of checksum bytes appended to the public key.
const CHECKSUM_LEN: usize = 4;

// ---------------------------------------------------------------------------
// PublicAddress
// ---------------------------------------------------------------------------

/// A 32-byte public key plus a 4-byte integrity checksum (36 bytes total).
///
/// The checksum is the first 4 bytes of `SHA3-256(public_key)`. It
/// provides lightweight typo detection when addresses are exchanged
/// out-of-band. The same public key always derives the same address.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PublicAddress {
    /// The 32-byte Ed25519 public key.
    public_key: PublicKey,
    /// First 4 bytes of `SHA3-256(public_key)`.
    checksum: [u8; CHECKSUM_LEN],
}

impl PublicAddress {
    /// Total byte length of an address: public key (32) + checksum (4).
    pub const LEN: usize = PublicKey::LEN + CHECKSUM_LEN;

    /// Derives the address for a public key.
    ///
    /// Checksum = `SHA3-256(public_key)[0..4]`.
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        let digest = sha3_256(public_key.as_bytes());
        let mut checksum = [0u8; CHECKSUM_LEN];
        checksum.copy_from_slice(&digest[..CHECKSUM_LEN]);
        Self {
            public_key: *public_key,
            checksum,
        }
    }

    /// Returns the public key portion (the canonical identifier).
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Returns the 4-byte checksum portion.
    pub fn checksum(&self) -> &[u8; CHECKSUM_LEN] {
        &self.checksum
    }

    /// Returns the full 36-byte representation (public key ∥ checksum).
    pub fn as_bytes(&self) -> [u8; 36] {
        let mut out = [0u8; 36];
        out[..32].copy_from_slice(self.public_key.as_bytes());
        out[32..].copy_from_slice(&self.checksum);
        out
    }

    /// Parses an address from its 36-byte representation.
    ///
    /// # Validation order
    ///
    /// 1. Length is exactly 36 bytes.
    /// 2. Embedded checksum matches `SHA3-256(public_key)[0..4]`.
    ///
    /// # Errors
    ///
    /// Returns [`OverlinkError::InvalidAddress`] if either check fails.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        // 1. Length.
        if bytes.len() != Self::LEN {
            return Err(OverlinkError::InvalidAddress {
                reason: format!(
                    "expected {} bytes (32 key + 4 checksum), got {}",
                    Self::LEN,
                    bytes.len()
                ),
            });
        }

        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes[..32]);
        let mut checksum = [0u8; CHECKSUM_LEN];
        checksum.copy_from_slice(&bytes[32..]);

        // 2. Checksum.
        let digest = sha3_256(&key);
        if checksum != digest[..CHECKSUM_LEN] {
            return Err(OverlinkError::InvalidAddress {
                reason: "checksum mismatch".into(),
            });
        }

        Ok(Self {
            public_key: PublicKey::new(key),
            checksum,
        })
    }
}

impl fmt::Display for PublicAddress {
    /// Renders the address as 72 uppercase hex characters.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(self.as_bytes()))
    }
}

impl FromStr for PublicAddress {
    type Err = OverlinkError;

    /// Parses an address from hex. Both upper- and lowercase digits are
    /// accepted; the checksum is verified after decoding.
    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| OverlinkError::InvalidAddress {
            reason: format!("invalid hex: {e}"),
        })?;
        Self::from_bytes(&bytes)
    }
}

// ---------------------------------------------------------------------------
// Internal
// ---------------------------------------------------------------------------

/// Computes the SHA3-256 hash of arbitrary data.
fn sha3_256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha3_256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&result);
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
