//! Fixed width ledger values: account addresses, role identifiers and the Keccak-256
//! digest they are derived with.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};

/// Name of the administrative role whose identifier is all zeroes.
pub const DEFAULT_ADMIN_ROLE: &str = "DEFAULT_ADMIN_ROLE";

/// Keccak-256 digest of `data`.
#[must_use]
pub fn keccak256(data: impl AsRef<[u8]>) -> [u8; 32] {
    Keccak256::digest(data.as_ref()).into()
}

/// Failure to parse a hex encoded fixed width value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseHexError {
    /// Value had the wrong number of bytes.
    #[error("expected {expected} bytes, got {actual}")]
    Length {
        /// Bytes required.
        expected: usize,
        /// Bytes found.
        actual: usize,
    },
    /// Value was not hex.
    #[error("invalid hex: {0}")]
    Hex(String),
}

/// Decode `s` (with or without a `0x` prefix) into exactly `N` bytes.
fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N], ParseHexError> {
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    let bytes = hex::decode(digits).map_err(|e| ParseHexError::Hex(e.to_string()))?;
    let actual = bytes.len();
    bytes.try_into().map_err(|_| {
        ParseHexError::Length {
            expected: N,
            actual,
        }
    })
}

/// A 20 byte ledger account or contract address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; 20]);

impl Address {
    /// The zero address.
    pub const ZERO: Address = Address([0; 20]);

    /// Wrap raw address bytes.
    #[must_use]
    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Raw address bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Take the trailing 20 bytes of a 32 byte word or digest.
    #[must_use]
    pub fn from_word(word: &[u8; 32]) -> Self {
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(word.get(12..).unwrap_or_default());
        Self(bytes)
    }
}

impl FromStr for Address {
    type Err = ParseHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_fixed(s).map(Self)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

/// A 32 byte access-control role identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct RoleId([u8; 32]);

impl RoleId {
    /// Wrap raw role identifier bytes.
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Derive the identifier of a named role.
    ///
    /// `DEFAULT_ADMIN_ROLE` is the zero identifier, every other role is the
    /// Keccak-256 digest of its name.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        if name == DEFAULT_ADMIN_ROLE {
            Self([0; 32])
        } else {
            Self(keccak256(name))
        }
    }

    /// Raw identifier bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl FromStr for RoleId {
    type Err = ParseHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_fixed(s).map(Self)
    }
}

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RoleId({self})")
    }
}

/// Serde support for any type which round trips through its hex string form.
macro_rules! hex_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_serde!(Address);
hex_serde!(RoleId);

/// A hex encoded 32 byte hash, used for transaction and Safe transaction hashes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TxHash([u8; 32]);

impl TxHash {
    /// Wrap raw hash bytes.
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw hash bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl FromStr for TxHash {
    type Err = ParseHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_fixed(s).map(Self)
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({self})")
    }
}

hex_serde!(TxHash);

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn role_names_hash_to_known_ids() {
        let minter = RoleId::from_name("MINTER_ROLE");
        assert_eq!(
            minter.to_string(),
            "0x9f2df0fed2c77648de5860a4cc508cd0818c85b8b8a1ab4ceeef8d981c8956a6"
        );
        assert_eq!(RoleId::from_name(DEFAULT_ADMIN_ROLE), RoleId::default());
    }

    #[test]
    fn address_parses_mixed_case_with_prefix() {
        let addr: Address = "0x3fD63728288546AC41dAe3bf25ca383061c3A929".parse().unwrap();
        assert_eq!(addr.to_string(), "0x3fd63728288546ac41dae3bf25ca383061c3a929");
    }

    #[test]
    fn address_rejects_wrong_length() {
        let err = "0x1234".parse::<Address>().unwrap_err();
        assert_eq!(
            err,
            ParseHexError::Length {
                expected: 20,
                actual: 2
            }
        );
        assert!(matches!("0xzz".parse::<Address>(), Err(ParseHexError::Hex(_))));
    }

    #[test]
    fn serde_uses_hex_strings() {
        let role = RoleId::from_name("ISSUER_ROLE");
        let json = serde_json::to_string(&role).unwrap();
        let back: RoleId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, role);
    }
}
