//! Contract call encoding.
//!
//! Only the subset of the contract ABI the reconciler needs: 32 byte words,
//! addresses, unsigned integers and a single level of dynamic `bytes`.

use crate::primitives::{keccak256, Address};

/// Width of one ABI word.
const WORD: usize = 32;

/// A single call argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// `address`
    Address(Address),
    /// `bytes32`
    Word([u8; 32]),
    /// `uint8` .. `uint256` holding a value that fits in 128 bits.
    Uint(u128),
    /// `bytes`
    Bytes(Vec<u8>),
}

impl Token {
    /// Is this token encoded in the tail section.
    fn is_dynamic(&self) -> bool {
        matches!(self, Token::Bytes(_))
    }

    /// Head word of a static token.
    fn static_word(&self) -> [u8; 32] {
        match self {
            Token::Address(addr) => address_word(addr),
            Token::Word(word) => *word,
            Token::Uint(value) => uint_word(*value),
            Token::Bytes(_) => [0; 32],
        }
    }
}

/// Malformed return data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AbiError {
    /// Return data ended early.
    #[error("return data too short: need {needed} bytes, have {have}")]
    Truncated {
        /// Bytes needed.
        needed: usize,
        /// Bytes available.
        have: usize,
    },
    /// A value did not fit the expected type.
    #[error("value out of range for {0}")]
    OutOfRange(&'static str),
}

/// Left pad an address to a word.
#[must_use]
pub fn address_word(addr: &Address) -> [u8; 32] {
    let mut word = [0u8; 32];
    if let Some(tail) = word.get_mut(12..) {
        tail.copy_from_slice(addr.as_bytes());
    }
    word
}

/// Big endian word of an unsigned integer.
#[must_use]
pub fn uint_word(value: u128) -> [u8; 32] {
    let mut word = [0u8; 32];
    if let Some(tail) = word.get_mut(16..) {
        tail.copy_from_slice(&value.to_be_bytes());
    }
    word
}

/// The four byte selector of a function signature such as
/// `grantRole(bytes32,address)`.
#[must_use]
pub fn selector(signature: &str) -> [u8; 4] {
    let digest = keccak256(signature);
    let mut out = [0u8; 4];
    out.copy_from_slice(digest.get(..4).unwrap_or_default());
    out
}

/// Encode arguments in head/tail form.
#[must_use]
pub fn encode_args(args: &[Token]) -> Vec<u8> {
    let head_len = args.len() * WORD;
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for token in args {
        if let Token::Bytes(data) = token {
            head.extend_from_slice(&uint_word((head_len + tail.len()) as u128));
            tail.extend_from_slice(&uint_word(data.len() as u128));
            tail.extend_from_slice(data);
            let padding = (WORD - data.len() % WORD) % WORD;
            tail.resize(tail.len() + padding, 0);
        } else {
            debug_assert!(!token.is_dynamic());
            head.extend_from_slice(&token.static_word());
        }
    }

    head.extend_from_slice(&tail);
    head
}

/// Selector followed by the encoded arguments.
#[must_use]
pub fn encode_call(signature: &str, args: &[Token]) -> Vec<u8> {
    let mut data = selector(signature).to_vec();
    data.extend_from_slice(&encode_args(args));
    data
}

/// The word at `offset` in `data`.
fn word_at(data: &[u8], offset: usize) -> Result<[u8; 32], AbiError> {
    let end = offset
        .checked_add(WORD)
        .ok_or(AbiError::OutOfRange("offset"))?;
    let bytes = data.get(offset..end).ok_or(AbiError::Truncated {
        needed: end,
        have: data.len(),
    })?;
    let mut word = [0u8; 32];
    word.copy_from_slice(bytes);
    Ok(word)
}

/// Decode a word as an unsigned integer that must fit in 64 bits.
fn word_to_u64(word: &[u8; 32], what: &'static str) -> Result<u64, AbiError> {
    let (high, low) = word.split_at(24);
    if high.iter().any(|b| *b != 0) {
        return Err(AbiError::OutOfRange(what));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(low);
    Ok(u64::from_be_bytes(buf))
}

/// Decode a single `bool` return value.
///
/// # Errors
///
/// Fails when the data is shorter than one word or the word is not 0 or 1.
pub fn decode_bool(data: &[u8]) -> Result<bool, AbiError> {
    match word_to_u64(&word_at(data, 0)?, "bool")? {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(AbiError::OutOfRange("bool")),
    }
}

/// Decode a single `uint256` return value that fits in 64 bits.
///
/// # Errors
///
/// Fails when the data is too short or the value exceeds `u64`.
pub fn decode_u64(data: &[u8]) -> Result<u64, AbiError> {
    word_to_u64(&word_at(data, 0)?, "uint64")
}

/// Decode a single `address[]` return value.
///
/// # Errors
///
/// Fails when the offset, length or any element lies outside the data.
pub fn decode_address_array(data: &[u8]) -> Result<Vec<Address>, AbiError> {
    let offset = usize::try_from(word_to_u64(&word_at(data, 0)?, "offset")?)
        .map_err(|_| AbiError::OutOfRange("offset"))?;
    let len = usize::try_from(word_to_u64(&word_at(data, offset)?, "length")?)
        .map_err(|_| AbiError::OutOfRange("length"))?;

    (0..len)
        .map(|i| {
            let at = i
                .checked_add(1)
                .and_then(|words| words.checked_mul(WORD))
                .and_then(|skip| skip.checked_add(offset))
                .ok_or(AbiError::OutOfRange("offset"))?;
            word_at(data, at).map(|w| Address::from_word(&w))
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::primitives::RoleId;

    #[test]
    fn known_selectors() {
        assert_eq!(selector("grantRole(bytes32,address)"), [0x2f, 0x2f, 0xf1, 0x5d]);
        assert_eq!(selector("hasRole(bytes32,address)"), [0x91, 0xd1, 0x48, 0x54]);
    }

    #[test]
    fn static_call_matches_recorded_calldata() {
        let role = RoleId::from_name("MINTER_ROLE");
        let grantee: Address = "0x3fd63728288546ac41dae3bf25ca383061c3a929".parse().unwrap();
        let data = encode_call(
            "grantRole(bytes32,address)",
            &[Token::Word(*role.as_bytes()), Token::Address(grantee)],
        );
        assert_eq!(
            format!("0x{}", hex::encode(data)),
            "0x2f2ff15d9f2df0fed2c77648de5860a4cc508cd0818c85b8b8a1ab4ceeef8d981c8956a6\
             0000000000000000000000003fd63728288546ac41dae3bf25ca383061c3a929"
        );
    }

    #[test]
    fn dynamic_bytes_go_to_the_tail() {
        let encoded = encode_args(&[Token::Uint(7), Token::Bytes(vec![0xaa; 33])]);
        // head: 2 words, tail: length word + 2 padded words
        assert_eq!(encoded.len(), 5 * WORD);
        assert_eq!(word_at(&encoded, WORD).unwrap(), uint_word(64));
        assert_eq!(word_at(&encoded, 2 * WORD).unwrap(), uint_word(33));
        assert_eq!(encoded.get(3 * WORD + 33..).unwrap(), &[0u8; 31]);
    }

    #[test]
    fn decodes_owner_list() {
        let a: Address = "0x93696b537d814aed5875c4490143195983aed365".parse().unwrap();
        let b: Address = "0xdff9e47eb007bf02e47477d577de9ffa99791528".parse().unwrap();
        let mut data = uint_word(32).to_vec();
        data.extend_from_slice(&uint_word(2));
        data.extend_from_slice(&address_word(&a));
        data.extend_from_slice(&address_word(&b));
        assert_eq!(decode_address_array(&data).unwrap(), vec![a, b]);
    }

    #[test]
    fn hostile_owner_list_is_an_error() {
        let huge = uint_word(u128::from(u64::MAX));
        assert_eq!(decode_address_array(&huge), Err(AbiError::OutOfRange("offset")));

        // A length that overflows the element offsets.
        let mut data = uint_word(32).to_vec();
        data.extend_from_slice(&huge);
        assert!(decode_address_array(&data).is_err());

        // A length larger than the data.
        let mut data = uint_word(32).to_vec();
        data.extend_from_slice(&uint_word(3));
        data.extend_from_slice(&address_word(&Address::ZERO));
        assert!(matches!(decode_address_array(&data), Err(AbiError::Truncated { .. })));
    }

    #[test]
    fn rejects_short_or_invalid_bool() {
        assert!(matches!(decode_bool(&[0u8; 4]), Err(AbiError::Truncated { .. })));
        assert_eq!(decode_bool(&uint_word(2)), Err(AbiError::OutOfRange("bool")));
        assert!(decode_bool(&uint_word(1)).unwrap());
    }
}
