//! Whole-run scenarios against an in-memory ledger and authority.
#![allow(clippy::unwrap_used, clippy::panic, clippy::indexing_slicing)]

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use grant_reconciler::{
    abi::{selector, uint_word, Token},
    authority::{SafeTransaction, SignedTransaction},
    builder::{CallPayload, GRANT_ROLE},
    catalog::{CatalogEntry, CatalogStage},
    ledger::{Receipt, ReceiptHandle},
    primitives::keccak256,
    reader::HAS_ROLE,
    Address, AuthorityError, Catalog, ConfigurationError, GrantStatus, LedgerClient,
    LedgerError, Reconciler, RoleId, RunReport, StageStatus, TransactionAuthority, TxHash,
};

/// Something the ledger saw, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    /// A grant was read.
    Read(Address),
    /// A grant was broadcast.
    Submit(Address),
    /// A receipt was handed out.
    Confirm(Address),
}

/// Grants held in memory, with injectable failures.
#[derive(Default)]
struct MemoryLedger {
    /// `(contract, role, account)` grants present.
    grants: Mutex<HashSet<(Address, RoleId, Address)>>,
    /// Contracts whose reads time out.
    unreadable: Mutex<HashSet<Address>>,
    /// Contracts whose submissions are rejected.
    rejecting: Mutex<HashSet<Address>>,
    /// Submitting to this contract takes the endpoint down.
    breaks_on: Mutex<Option<Address>>,
    /// The endpoint is down.
    down: Mutex<bool>,
    /// Everything that happened.
    events: Mutex<Vec<Event>>,
}

impl MemoryLedger {
    fn grant(&self, entry: &CatalogEntry) {
        self.grants
            .lock()
            .unwrap()
            .insert((entry.target_contract, entry.role_id, entry.grantee));
    }

    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn submissions(&self) -> Vec<Address> {
        self.events()
            .into_iter()
            .filter_map(|e| {
                match e {
                    Event::Submit(to) => Some(to),
                    _ => None,
                }
            })
            .collect()
    }

    fn check_up(&self) -> Result<(), LedgerError> {
        if *self.down.lock().unwrap() {
            Err(LedgerError::Unreachable("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    async fn chain_id(&self) -> Result<u64, LedgerError> {
        self.check_up()?;
        Ok(42161)
    }

    async fn read(
        &self, contract: Address, signature: &str, args: &[Token],
    ) -> Result<Vec<u8>, LedgerError> {
        self.check_up()?;
        assert_eq!(signature, HAS_ROLE);
        self.events.lock().unwrap().push(Event::Read(contract));
        if self.unreadable.lock().unwrap().contains(&contract) {
            return Err(LedgerError::Timeout);
        }
        let [Token::Word(role), Token::Address(account)] = args else {
            panic!("unexpected hasRole arguments {args:?}");
        };
        let granted = self
            .grants
            .lock()
            .unwrap()
            .contains(&(contract, RoleId::new(*role), *account));
        Ok(uint_word(granted.into()).to_vec())
    }

    async fn submit(
        &self, to: Address, data: &[u8], _value: u128,
    ) -> Result<ReceiptHandle, LedgerError> {
        self.check_up()?;
        if *self.breaks_on.lock().unwrap() == Some(to) {
            *self.down.lock().unwrap() = true;
            return Err(LedgerError::Unreachable("connection reset".into()));
        }
        if self.rejecting.lock().unwrap().contains(&to) {
            return Err(LedgerError::Rpc {
                code: -32000,
                message: "insufficient funds".into(),
            });
        }

        assert_eq!(data.get(..4), Some(selector(GRANT_ROLE).as_slice()));
        let role = RoleId::new(data.get(4..36).unwrap().try_into().unwrap());
        let account = Address::from_word(data.get(36..68).unwrap().try_into().unwrap());
        self.grants.lock().unwrap().insert((to, role, account));

        let mut events = self.events.lock().unwrap();
        events.push(Event::Submit(to));
        let mut preimage = data.to_vec();
        preimage.extend_from_slice(&events.len().to_be_bytes());
        Ok(ReceiptHandle {
            tx_hash: TxHash::new(keccak256(preimage)),
        })
    }

    async fn await_receipt(
        &self, _handle: ReceiptHandle, _timeout: Duration,
    ) -> Result<Option<Receipt>, LedgerError> {
        self.check_up()?;
        let mut events = self.events.lock().unwrap();
        let Some(Event::Submit(to)) = events.last().copied() else {
            panic!("receipt requested without a submission");
        };
        events.push(Event::Confirm(to));
        Ok(Some(Receipt {
            succeeded: true,
            block_number: u64::try_from(events.len()).unwrap(),
            gas_used: 50_000,
        }))
    }
}

/// Authority that forwards the inner call straight to the ledger.
struct DirectAuthority {
    /// Ledger written to.
    ledger: Arc<MemoryLedger>,
    /// Fail the start-up checks.
    refuse_preflight: bool,
}

#[async_trait]
impl TransactionAuthority for DirectAuthority {
    async fn preflight(&self) -> Result<(), ConfigurationError> {
        if self.refuse_preflight {
            Err(ConfigurationError::NotAnOwner {
                signer: Address::ZERO,
                authority: Address::ZERO,
            })
        } else {
            Ok(())
        }
    }

    async fn create_transaction(
        &self, payload: &CallPayload,
    ) -> Result<SafeTransaction, AuthorityError> {
        Ok(SafeTransaction::call(Address::ZERO, payload, 0))
    }

    fn hash(&self, draft: &SafeTransaction) -> TxHash {
        draft.safe_tx_hash(42161)
    }

    async fn sign(&self, draft: SafeTransaction) -> Result<SignedTransaction, AuthorityError> {
        let safe_tx_hash = self.hash(&draft);
        Ok(SignedTransaction {
            draft,
            safe_tx_hash,
            signatures: vec![0; 65],
        })
    }

    async fn execute(&self, signed: &SignedTransaction) -> Result<ReceiptHandle, AuthorityError> {
        Ok(self
            .ledger
            .submit(signed.draft.to, &signed.draft.data, 0)
            .await?)
    }

    async fn confirm(
        &self, handle: ReceiptHandle, timeout: Duration,
    ) -> Result<Receipt, AuthorityError> {
        self.ledger
            .await_receipt(handle, timeout)
            .await?
            .ok_or(AuthorityError::ConfirmationTimeout(timeout))
    }
}

/// An entry with its own target contract, so ledger events identify it.
fn entry(contract: u8, role: &str) -> CatalogEntry {
    CatalogEntry {
        target_contract: Address::new([contract; 20]),
        role_id: RoleId::from_name(role),
        role_name: Some(role.to_string()),
        grantee: Address::new([0xee; 20]),
        description: format!("{role} on {contract}"),
    }
}

fn stage(id: u32, entries: Vec<CatalogEntry>) -> CatalogStage {
    CatalogStage {
        id,
        name: format!("Stage {id}"),
        entries,
    }
}

fn reconciler(ledger: &Arc<MemoryLedger>) -> Reconciler {
    let authority = Arc::new(DirectAuthority {
        ledger: ledger.clone(),
        refuse_preflight: false,
    });
    Reconciler::with_authority(ledger.clone(), authority, Duration::from_secs(1))
}

fn statuses(report: &RunReport) -> Vec<Vec<GrantStatus>> {
    report
        .stages
        .iter()
        .map(|s| s.entries().iter().map(|e| e.status()).collect())
        .collect()
}

/// Stage 1 = [A already granted, B], stage 2 = [C].
#[test_log::test(tokio::test)]
async fn second_run_submits_nothing() {
    let (a, b, c) = (entry(1, "MINTER_ROLE"), entry(2, "BURNER_ROLE"), entry(3, "PAUSER_ROLE"));
    let catalog = Catalog::new(vec![stage(1, vec![a.clone(), b]), stage(2, vec![c])]).unwrap();
    let ledger = Arc::new(MemoryLedger::default());
    ledger.grant(&a);

    let first = reconciler(&ledger).apply(&catalog).await.unwrap();
    assert_eq!(statuses(&first), vec![
        vec![GrantStatus::AlreadyGranted, GrantStatus::Confirmed],
        vec![GrantStatus::Confirmed],
    ]);
    assert_eq!(first.totals.transactions, 2);
    assert_eq!(first.totals.failed, 0);
    assert_eq!(first.exit_code(), 0);
    assert!(first.is_complete());

    let second = reconciler(&ledger).apply(&catalog).await.unwrap();
    assert_eq!(statuses(&second), vec![
        vec![GrantStatus::AlreadyGranted, GrantStatus::AlreadyGranted],
        vec![GrantStatus::AlreadyGranted],
    ]);
    assert_eq!(second.totals.transactions, 0);
    assert_eq!(second.totals.already_granted, 3);
    assert_eq!(ledger.submissions().len(), 2);
}

#[tokio::test]
async fn out_of_band_grants_are_excluded() {
    let entries = vec![entry(1, "MINTER_ROLE"), entry(2, "MINTER_ROLE"), entry(3, "MINTER_ROLE")];
    let catalog = Catalog::new(vec![stage(1, entries.clone())]).unwrap();
    let ledger = Arc::new(MemoryLedger::default());
    ledger.grant(entries.get(1).unwrap());

    let plan = Reconciler::read_only(ledger.clone(), Some(42161))
        .plan(&catalog)
        .await
        .unwrap();
    let pending: Vec<_> = plan.pending().map(|e| e.target_contract).collect();
    assert_eq!(pending, vec![Address::new([1; 20]), Address::new([3; 20])]);
    assert_eq!(plan.totals.transactions, 0);
    assert!(ledger.submissions().is_empty());

    reconciler(&ledger).apply(&catalog).await.unwrap();
    assert_eq!(ledger.submissions(), pending);
}

#[tokio::test]
async fn stages_and_entries_run_strictly_in_order() {
    let catalog = Catalog::new(vec![
        stage(1, vec![entry(1, "A"), entry(2, "B")]),
        stage(2, vec![entry(3, "C"), entry(4, "D")]),
    ])
    .unwrap();
    let ledger = Arc::new(MemoryLedger::default());

    reconciler(&ledger).apply(&catalog).await.unwrap();

    let writes: Vec<_> = ledger
        .events()
        .into_iter()
        .filter(|e| !matches!(e, Event::Read(_)))
        .collect();
    let expected: Vec<_> = (1..=4u8)
        .flat_map(|n| {
            let to = Address::new([n; 20]);
            [Event::Submit(to), Event::Confirm(to)]
        })
        .collect();
    assert_eq!(writes, expected);
}

#[tokio::test]
async fn unreadable_grants_are_attempted() {
    let catalog = Catalog::new(vec![stage(1, vec![entry(1, "A"), entry(2, "B")])]).unwrap();
    let ledger = Arc::new(MemoryLedger::default());
    ledger.unreadable.lock().unwrap().insert(Address::new([2; 20]));

    let report = reconciler(&ledger).apply(&catalog).await.unwrap();

    let unreadable = report.stages.first().unwrap().entries().get(1).unwrap();
    assert_eq!(unreadable.status(), GrantStatus::Confirmed);
    assert!(unreadable.read_error().unwrap().contains("timed out"));
    assert!(ledger.submissions().contains(&Address::new([2; 20])));
}

#[test_log::test(tokio::test)]
async fn fatal_error_stops_later_stages() {
    let catalog = Catalog::new(vec![
        stage(1, vec![entry(1, "A")]),
        stage(2, vec![entry(2, "B"), entry(3, "C"), entry(4, "D")]),
        stage(3, vec![entry(5, "E"), entry(6, "F")]),
    ])
    .unwrap();
    let ledger = Arc::new(MemoryLedger::default());
    *ledger.breaks_on.lock().unwrap() = Some(Address::new([3; 20]));

    let report = reconciler(&ledger).apply(&catalog).await.unwrap();

    let stage_statuses: Vec<_> = report.stages.iter().map(|s| s.status()).collect();
    assert_eq!(stage_statuses, vec![
        StageStatus::Completed,
        StageStatus::Aborted,
        StageStatus::NotStarted
    ]);
    assert_eq!(statuses(&report), vec![
        vec![GrantStatus::Confirmed],
        vec![GrantStatus::Confirmed, GrantStatus::Failed, GrantStatus::Skipped],
        vec![GrantStatus::Pending, GrantStatus::Pending],
    ]);
    assert!(report
        .aborted_stage()
        .and_then(|s| s.abort_reason())
        .unwrap()
        .contains("Ledger unreachable"));
    assert_eq!(ledger.submissions(), vec![
        Address::new([1; 20]),
        Address::new([2; 20])
    ]);
    assert_eq!(report.totals.not_started, 2);
    assert_eq!(report.totals.skipped, 1);
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test]
async fn failed_entries_do_not_stop_their_stage() {
    let catalog = Catalog::new(vec![
        stage(1, vec![entry(1, "A"), entry(2, "B"), entry(3, "C")]),
        stage(2, vec![entry(4, "D")]),
    ])
    .unwrap();
    let ledger = Arc::new(MemoryLedger::default());
    ledger.rejecting.lock().unwrap().insert(Address::new([2; 20]));

    let report = reconciler(&ledger).apply(&catalog).await.unwrap();

    assert_eq!(statuses(&report), vec![
        vec![GrantStatus::Confirmed, GrantStatus::Failed, GrantStatus::Confirmed],
        vec![GrantStatus::Confirmed],
    ]);
    let failed = report.stages.first().unwrap().entries().get(1).unwrap();
    assert!(failed.error().unwrap().contains("insufficient funds"));
    assert!(report.is_complete());
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.totals.failed, 1);
    assert_eq!(report.totals.transactions, 3);
}

#[tokio::test]
async fn report_lists_every_entry() {
    let catalog = Catalog::new(vec![
        stage(1, vec![entry(1, "A"), entry(2, "B")]),
        stage(2, vec![]),
        stage(3, vec![entry(3, "C"), entry(4, "D"), entry(5, "E")]),
        stage(4, vec![entry(6, "F")]),
    ])
    .unwrap();
    let ledger = Arc::new(MemoryLedger::default());
    ledger.grant(&entry(1, "A"));
    *ledger.breaks_on.lock().unwrap() = Some(Address::new([4; 20]));

    let report = reconciler(&ledger).apply(&catalog).await.unwrap();

    assert_eq!(report.totals.entries, catalog.len());
    for stage in &report.stages {
        for entry in stage.entries() {
            match stage.status() {
                StageStatus::NotStarted => assert_eq!(entry.status(), GrantStatus::Pending),
                _ => assert!(entry.status().is_terminal(), "{} left {}", entry.entry_ref, entry.status()),
            }
        }
    }
    let totals = &report.totals;
    assert_eq!(
        totals.already_granted + totals.confirmed + totals.failed + totals.skipped + totals.not_started,
        totals.entries
    );

    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["mode"], "apply");
    assert_eq!(json["stages"][1]["status"], "Completed");
    assert_eq!(json["stages"][2]["status"], "Aborted");
    assert_eq!(json["stages"][3]["entries"][0]["status"], "Pending");
    assert!(json["recommendation"].as_str().unwrap().contains("always safe"));
}

#[tokio::test]
async fn configuration_errors_start_nothing() {
    let catalog = Catalog::new(vec![stage(1, vec![entry(1, "A")])]).unwrap();
    let ledger = Arc::new(MemoryLedger::default());

    let refusing = Reconciler::with_authority(
        ledger.clone(),
        Arc::new(DirectAuthority {
            ledger: ledger.clone(),
            refuse_preflight: true,
        }),
        Duration::from_secs(1),
    );
    assert!(matches!(
        refusing.apply(&catalog).await,
        Err(ConfigurationError::NotAnOwner { .. })
    ));

    let read_only = Reconciler::read_only(ledger.clone(), None);
    assert!(matches!(
        read_only.apply(&catalog).await,
        Err(ConfigurationError::MissingSetting(_))
    ));
    assert!(ledger.events().is_empty());

    let wrong_chain = Reconciler::read_only(ledger.clone(), Some(1));
    assert!(matches!(
        wrong_chain.plan(&catalog).await,
        Err(ConfigurationError::ChainMismatch { expected: 1, .. })
    ));
}
