//! Account identities and feed identifiers.
//!
//! Both are 32-byte values rendered as lowercase hex, matching the way price
//! feed ids and account addresses are usually published.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

/// An account identity (manager, operator, admin, vault).
#[serde_as]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(#[serde_as(as = "serde_with::hex::Hex")] [u8; 32]);

/// Identifier of a price feed at the price source.
#[serde_as]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedId(#[serde_as(as = "serde_with::hex::Hex")] [u8; 32]);

/// Caller identity did not match the stored identity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unauthorized caller {caller}")]
pub struct AuthError {
    /// The rejected caller.
    pub caller: Identity,
}

impl Identity {
    /// Wrap raw identity bytes.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The raw identity bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl FeedId {
    /// Wrap raw feed id bytes.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The raw feed id bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

fn parse_hex32(s: &str) -> Result<[u8; 32], hex::FromHexError> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let mut out = [0u8; 32];
    hex::decode_to_slice(s, &mut out)?;
    Ok(out)
}

impl FromStr for Identity {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex32(s).map(Self)
    }
}

impl FromStr for FeedId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex32(s).map(Self)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps log lines readable.
        write!(f, "Identity(0x{}..)", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FeedId(0x{}..)", hex::encode(&self.0[..4]))
    }
}

/// Check that `caller` is exactly `expected`.
///
/// # Errors
///
/// [`AuthError`] carrying the rejected caller.
pub fn ensure_identity(caller: &Identity, expected: &Identity) -> Result<(), AuthError> {
    if caller == expected {
        Ok(())
    } else {
        Err(AuthError { caller: *caller })
    }
}

/// Check that `caller` is one of `allowed`.
///
/// # Errors
///
/// [`AuthError`] carrying the rejected caller.
pub fn ensure_any(caller: &Identity, allowed: &[&Identity]) -> Result<(), AuthError> {
    if allowed.iter().any(|id| *id == caller) {
        Ok(())
    } else {
        Err(AuthError { caller: *caller })
    }
}
