//! Transaction Builder.

use crate::{
    abi::{encode_call, Token},
    grant::GrantEntry,
    primitives::Address,
};

/// Access control write that creates a grant.
pub const GRANT_ROLE: &str = "grantRole(bytes32,address)";

/// A contract call ready to hand to a transaction authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallPayload {
    /// Contract called.
    pub to: Address,
    /// Encoded call.
    pub data: Vec<u8>,
    /// Native value sent with the call.
    pub value: u128,
}

/// Encode the grant of `entry`. Never carries value.
#[must_use]
pub fn build(entry: &GrantEntry) -> CallPayload {
    CallPayload {
        to: entry.target_contract,
        data: encode_call(GRANT_ROLE, &[
            Token::Word(*entry.role_id.as_bytes()),
            Token::Address(entry.grantee),
        ]),
        value: 0,
    }
}
