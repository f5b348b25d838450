//! Local secp256k1 signing identity.
//!
//! The key is loaded once at start-up and shared read-only by the ledger client
//! (transaction signatures) and the multisig authority (owner approvals).

use std::fmt;

use k256::ecdsa::SigningKey;

use crate::{
    error::ConfigurationError,
    primitives::{keccak256, Address},
};

/// A 65 byte recoverable ECDSA signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature {
    /// `r` component.
    pub r: [u8; 32],
    /// `s` component, always in the lower half of the curve order.
    pub s: [u8; 32],
    /// Recovery id, 0 or 1.
    pub recovery_id: u8,
}

/// Failure to produce a signature.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("ECDSA signing failed: {0}")]
pub struct SignError(String);

/// The signing credential of the run.
#[derive(Clone)]
pub struct LocalSigner {
    /// Secret key.
    key: SigningKey,
    /// Address derived from the public key.
    address: Address,
}

impl LocalSigner {
    /// Load a hex encoded 32 byte secret key, with or without `0x`.
    ///
    /// # Errors
    ///
    /// `ConfigurationError::InvalidCredential` when the key is not 32 bytes of hex or
    /// is not a valid secp256k1 scalar.
    pub fn from_hex(secret: &str) -> Result<Self, ConfigurationError> {
        let digits = secret.trim();
        let digits = digits.strip_prefix("0x").unwrap_or(digits);
        let bytes = hex::decode(digits)
            .map_err(|_| ConfigurationError::InvalidCredential("private key is not hex".into()))?;
        if bytes.len() != 32 {
            return Err(ConfigurationError::InvalidCredential(format!(
                "private key must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        let key = SigningKey::from_slice(&bytes)
            .map_err(|e| ConfigurationError::InvalidCredential(e.to_string()))?;
        Ok(Self::from_key(key))
    }

    /// Wrap an existing key.
    #[must_use]
    pub fn from_key(key: SigningKey) -> Self {
        let point = key.verifying_key().to_encoded_point(false);
        let public = point.as_bytes().get(1..).unwrap_or_default();
        let address = Address::from_word(&keccak256(public));
        Self { key, address }
    }

    /// Address of this identity on the ledger.
    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign a 32 byte digest.
    ///
    /// # Errors
    ///
    /// If the underlying ECDSA implementation rejects the digest.
    pub fn sign_digest(&self, digest: &[u8; 32]) -> Result<RecoverableSignature, SignError> {
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(digest)
            .map_err(|e| SignError(e.to_string()))?;
        let bytes = signature.to_bytes();
        let (r_bytes, s_bytes) = bytes.split_at(32);
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(r_bytes);
        s.copy_from_slice(s_bytes);
        Ok(RecoverableSignature {
            r,
            s,
            recovery_id: recovery_id.to_byte(),
        })
    }
}

impl fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};

    use super::*;

    /// Well known development key #0.
    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn derives_owner_address() {
        let signer = LocalSigner::from_hex(DEV_KEY).unwrap();
        assert_eq!(
            signer.address().to_string(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
        assert!(!format!("{signer:?}").contains("ac0974"));
    }

    #[test]
    fn signatures_recover_to_signer() {
        let signer = LocalSigner::from_hex(DEV_KEY).unwrap();
        let digest = keccak256(b"grant");
        let sig = signer.sign_digest(&digest).unwrap();

        let mut rs = [0u8; 64];
        rs.get_mut(..32).unwrap().copy_from_slice(&sig.r);
        rs.get_mut(32..).unwrap().copy_from_slice(&sig.s);
        let signature = Signature::from_slice(&rs).unwrap();
        let recovery_id = RecoveryId::from_byte(sig.recovery_id).unwrap();
        let recovered =
            VerifyingKey::recover_from_prehash(&digest, &signature, recovery_id).unwrap();
        assert_eq!(LocalSigner::from_key_address(&recovered), signer.address());
    }

    #[test]
    fn rejects_malformed_keys() {
        assert!(matches!(
            LocalSigner::from_hex("0x1234"),
            Err(ConfigurationError::InvalidCredential(_))
        ));
        assert!(matches!(
            LocalSigner::from_hex(&"00".repeat(32)),
            Err(ConfigurationError::InvalidCredential(_))
        ));
    }

    impl LocalSigner {
        /// Address of an arbitrary public key.
        fn from_key_address(key: &VerifyingKey) -> Address {
            let point = key.to_encoded_point(false);
            Address::from_word(&keccak256(point.as_bytes().get(1..).unwrap()))
        }
    }
}
