//! Diff Engine: catalog against observed ledger state.

use tracing::{info, warn};

use crate::{
    catalog::Catalog,
    grant::{GrantEntry, GrantStatus},
    reader::{GrantState, LedgerStateReader},
    stage::Stage,
};

/// Build the stages of a run, each entry `AlreadyGranted` or `Pending`.
///
/// Reads are issued one at a time in catalog order and the returned stages keep that
/// order, stage by stage and entry by entry.
pub async fn compute_pending(catalog: &Catalog, reader: &LedgerStateReader) -> Vec<Stage> {
    let mut stages = Vec::with_capacity(catalog.stages().len());
    for catalog_stage in catalog.stages() {
        let mut stage = Stage::from_catalog(catalog_stage);
        for entry in stage.entries_mut() {
            classify(entry, reader).await;
        }
        info!(
            stage = stage.id,
            entries = stage.entries().len(),
            pending = stage.pending_indices().len(),
            "Stage diffed"
        );
        stages.push(stage);
    }
    stages
}

/// Resolve one entry against the ledger.
async fn classify(entry: &mut GrantEntry, reader: &LedgerStateReader) {
    match reader
        .observe(entry.target_contract, entry.role_id, entry.grantee)
        .await
    {
        GrantState::Granted => {
            if let Err(err) = entry.mark_already_granted() {
                warn!(entry = %entry.entry_ref, error = %err, "Entry can not be marked granted");
            }
        },
        GrantState::NotGranted => {},
        GrantState::Unreadable(err) => {
            warn!(entry = %entry.entry_ref, error = %err, "Grant unreadable, treating as not granted");
            entry.note_read_error(&err);
        },
    }
}

/// Entries still requiring a submission, in execution order.
pub fn pending_entries(stages: &[Stage]) -> impl Iterator<Item = &GrantEntry> {
    stages
        .iter()
        .flat_map(Stage::entries)
        .filter(|entry| entry.status() == GrantStatus::Pending)
}
