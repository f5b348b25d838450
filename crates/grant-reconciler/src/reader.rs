//! Ledger State Reader.

use std::sync::Arc;

use tracing::debug;

use crate::{
    abi::{decode_bool, Token},
    error::{LedgerError, ReadError},
    ledger::LedgerClient,
    primitives::{Address, RoleId},
};

/// Access control read used to check a grant.
pub const HAS_ROLE: &str = "hasRole(bytes32,address)";

/// What a grant read told us.
///
/// Converting a read result into this type is where the fail-open policy lives: an
/// unreadable grant needs the same action as a missing one, and the read error is
/// kept so it can be reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantState {
    /// The ledger holds the grant.
    Granted,
    /// The ledger does not hold the grant.
    NotGranted,
    /// The ledger could not answer.
    Unreadable(ReadError),
}

impl GrantState {
    /// Apply the fail-open policy to a read result.
    #[must_use]
    pub fn fail_open(result: Result<bool, ReadError>) -> Self {
        match result {
            Ok(true) => GrantState::Granted,
            Ok(false) => GrantState::NotGranted,
            Err(err) => GrantState::Unreadable(err),
        }
    }

    /// Does the grant have to be submitted.
    #[must_use]
    pub fn needs_action(&self) -> bool {
        !matches!(self, GrantState::Granted)
    }
}

/// Read-only grant queries.
#[derive(Clone)]
pub struct LedgerStateReader {
    /// Ledger queried.
    ledger: Arc<dyn LedgerClient>,
}

impl LedgerStateReader {
    /// A reader over `ledger`.
    #[must_use]
    pub fn new(ledger: Arc<dyn LedgerClient>) -> Self {
        Self { ledger }
    }

    /// Does `account` hold `role` on `contract`.
    ///
    /// # Errors
    ///
    /// `ReadError` when the ledger call fails or returns something other than a
    /// boolean.
    pub async fn has_grant(
        &self, contract: Address, role: RoleId, account: Address,
    ) -> Result<bool, ReadError> {
        let args = [Token::Word(*role.as_bytes()), Token::Address(account)];
        let granted = self
            .ledger
            .read(contract, HAS_ROLE, &args)
            .await
            .and_then(|data| decode_bool(&data).map_err(LedgerError::from))
            .map_err(|source| ReadError { contract, source })?;
        debug!(%contract, %role, %account, granted, "Grant read");
        Ok(granted)
    }

    /// Read a grant and apply the fail-open policy.
    pub async fn observe(&self, contract: Address, role: RoleId, account: Address) -> GrantState {
        GrantState::fail_open(self.has_grant(contract, role, account).await)
    }
}

impl std::fmt::Debug for LedgerStateReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerStateReader").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreadable_grants_need_action() {
        let err = ReadError {
            contract: Address::ZERO,
            source: LedgerError::Timeout,
        };
        assert!(GrantState::fail_open(Err(err.clone())).needs_action());
        assert_eq!(
            GrantState::fail_open(Err(err.clone())),
            GrantState::Unreadable(err)
        );
        assert!(GrantState::fail_open(Ok(false)).needs_action());
        assert!(!GrantState::fail_open(Ok(true)).needs_action());
    }
}
