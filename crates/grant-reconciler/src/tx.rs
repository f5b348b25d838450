//! Legacy (EIP-155) transaction encoding.
//!
//! Only what the ledger client needs to broadcast a call from a local key: RLP
//! encoding of byte strings, integers and lists, the replay protected signing
//! hash, and the signed envelope.

use crate::{
    primitives::{keccak256, Address, TxHash},
    signer::{LocalSigner, RecoverableSignature, SignError},
};

/// RLP encode a byte string.
fn rlp_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    match bytes {
        [b] if *b < 0x80 => out.push(*b),
        _ => {
            rlp_length(out, 0x80, bytes.len());
            out.extend_from_slice(bytes);
        },
    }
}

/// RLP length prefix for a string (`offset = 0x80`) or list (`offset = 0xc0`).
fn rlp_length(out: &mut Vec<u8>, offset: u8, len: usize) {
    if len <= 55 {
        // Fits in the single prefix byte.
        out.push(offset.saturating_add(u8::try_from(len).unwrap_or(55)));
    } else {
        let len_bytes = trim_leading_zeros(&len.to_be_bytes()).to_vec();
        let len_of_len = u8::try_from(len_bytes.len()).unwrap_or(8);
        out.push(offset.saturating_add(55).saturating_add(len_of_len));
        out.extend_from_slice(&len_bytes);
    }
}

/// Strip leading zero bytes, RLP integers are minimal big endian.
fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    bytes.get(first..).unwrap_or_default()
}

/// RLP encode an unsigned integer.
fn rlp_uint(out: &mut Vec<u8>, value: u128) {
    rlp_bytes(out, trim_leading_zeros(&value.to_be_bytes()));
}

/// Wrap already encoded items in a list header.
fn rlp_list(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len().saturating_add(9));
    rlp_length(&mut out, 0xc0, payload.len());
    out.extend_from_slice(payload);
    out
}

/// A legacy transaction with EIP-155 replay protection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTransaction {
    /// Sender account nonce.
    pub nonce: u64,
    /// Price per gas unit, in wei.
    pub gas_price: u128,
    /// Gas limit.
    pub gas_limit: u64,
    /// Call target.
    pub to: Address,
    /// Native value, in wei.
    pub value: u128,
    /// Call data.
    pub data: Vec<u8>,
    /// Chain the signature is bound to.
    pub chain_id: u64,
}

impl LegacyTransaction {
    /// The six common fields, RLP encoded back to back.
    fn fields(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.data.len().saturating_add(64));
        rlp_uint(&mut out, self.nonce.into());
        rlp_uint(&mut out, self.gas_price);
        rlp_uint(&mut out, self.gas_limit.into());
        rlp_bytes(&mut out, self.to.as_bytes());
        rlp_uint(&mut out, self.value);
        rlp_bytes(&mut out, &self.data);
        out
    }

    /// RLP payload that is hashed for signing.
    #[must_use]
    pub fn signing_payload(&self) -> Vec<u8> {
        let mut payload = self.fields();
        rlp_uint(&mut payload, self.chain_id.into());
        rlp_uint(&mut payload, 0);
        rlp_uint(&mut payload, 0);
        rlp_list(&payload)
    }

    /// Digest the sender signs.
    #[must_use]
    pub fn signing_hash(&self) -> [u8; 32] {
        keccak256(self.signing_payload())
    }

    /// Encode with a signature over [`LegacyTransaction::signing_hash`].
    #[must_use]
    pub fn encode_signed(&self, signature: &RecoverableSignature) -> Vec<u8> {
        let v = u128::from(self.chain_id)
            .saturating_mul(2)
            .saturating_add(35)
            .saturating_add(u128::from(signature.recovery_id));
        let mut payload = self.fields();
        rlp_uint(&mut payload, v);
        rlp_bytes(&mut payload, trim_leading_zeros(&signature.r));
        rlp_bytes(&mut payload, trim_leading_zeros(&signature.s));
        rlp_list(&payload)
    }

    /// Sign and encode, returning the raw transaction and its hash.
    ///
    /// # Errors
    ///
    /// If signing fails.
    pub fn sign(&self, signer: &LocalSigner) -> Result<(Vec<u8>, TxHash), SignError> {
        let signature = signer.sign_digest(&self.signing_hash())?;
        let raw = self.encode_signed(&signature);
        let hash = TxHash::new(keccak256(&raw));
        Ok((raw, hash))
    }
}
