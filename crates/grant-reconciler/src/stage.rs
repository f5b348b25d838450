//! Stage state machine.

use serde::Serialize;
use tracing::warn;

use crate::{catalog::CatalogStage, grant::{EntryRef, GrantEntry, GrantStatus}};

/// Progress of a stage.
///
/// ```text
/// NotStarted -> Running -> Completed | Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
pub enum StageStatus {
    /// Not reached yet, or never reached because an earlier stage aborted.
    NotStarted,
    /// Entries are being processed.
    Running,
    /// Every entry reached a terminal status.
    Completed,
    /// A stage-fatal error stopped the stage.
    Aborted,
}

/// An illegal stage status change was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("stage {stage}: illegal transition {from} -> {to}")]
pub struct StageTransitionError {
    /// Stage concerned.
    pub stage: u32,
    /// Current status.
    pub from: StageStatus,
    /// Requested status.
    pub to: StageStatus,
}

/// An ordered group of entries. Owns its entries.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    /// Stage ordinal.
    pub id: u32,
    /// Human readable name.
    pub name: String,
    /// Current status.
    status: StageStatus,
    /// Why the stage aborted.
    #[serde(skip_serializing_if = "Option::is_none")]
    abort_reason: Option<String>,
    /// Entries in declaration order.
    entries: Vec<GrantEntry>,
}

impl Stage {
    /// A `NotStarted` stage with `Pending` entries for a catalog stage.
    #[must_use]
    pub fn from_catalog(stage: &CatalogStage) -> Self {
        let entries = stage
            .entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                GrantEntry::new(
                    EntryRef {
                        stage: stage.id,
                        index,
                    },
                    entry,
                )
            })
            .collect();
        Self {
            id: stage.id,
            name: stage.name.clone(),
            status: StageStatus::NotStarted,
            abort_reason: None,
            entries,
        }
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> StageStatus {
        self.status
    }

    /// Why the stage aborted.
    #[must_use]
    pub fn abort_reason(&self) -> Option<&str> {
        self.abort_reason.as_deref()
    }

    /// Entries in declaration order.
    #[must_use]
    pub fn entries(&self) -> &[GrantEntry] {
        &self.entries
    }

    /// Mutable access to entries.
    pub fn entries_mut(&mut self) -> &mut [GrantEntry] {
        &mut self.entries
    }

    /// Indices of entries that still need action, in declaration order.
    #[must_use]
    pub fn pending_indices(&self) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.status() == GrantStatus::Pending)
            .map(|(i, _)| i)
            .collect()
    }

    /// Move to `next` if legal.
    fn transition(&mut self, next: StageStatus) -> Result<(), StageTransitionError> {
        use StageStatus::{Aborted, Completed, NotStarted, Running};
        if matches!(
            (self.status, next),
            (NotStarted, Running) | (Running, Completed | Aborted)
        ) {
            self.status = next;
            Ok(())
        } else {
            Err(StageTransitionError {
                stage: self.id,
                from: self.status,
                to: next,
            })
        }
    }

    /// Begin processing.
    ///
    /// # Errors
    ///
    /// If the stage already started.
    pub fn start(&mut self) -> Result<(), StageTransitionError> {
        self.transition(StageStatus::Running)
    }

    /// Every entry was processed.
    ///
    /// # Errors
    ///
    /// If the stage is not running.
    pub fn complete(&mut self) -> Result<(), StageTransitionError> {
        self.transition(StageStatus::Completed)
    }

    /// Stop the stage; every entry not yet attempted becomes `Skipped`.
    ///
    /// # Errors
    ///
    /// If the stage is not running.
    pub fn abort(&mut self, reason: &str) -> Result<(), StageTransitionError> {
        self.transition(StageStatus::Aborted)?;
        self.abort_reason = Some(reason.to_string());
        let skip_reason = format!("stage {} aborted: {reason}", self.id);
        for entry in &mut self.entries {
            if entry.status() == GrantStatus::Pending {
                if let Err(err) = entry.mark_skipped(&skip_reason) {
                    warn!(entry = %entry.entry_ref, error = %err, "Entry can not be skipped");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{catalog::CatalogEntry, primitives::{Address, RoleId}};

    fn catalog_stage(n: usize) -> CatalogStage {
        CatalogStage {
            id: 2,
            name: "Financial".into(),
            entries: (0..n)
                .map(|i| {
                    CatalogEntry {
                        target_contract: Address::ZERO,
                        role_id: RoleId::from_name(&format!("ROLE_{i}")),
                        role_name: None,
                        grantee: Address::ZERO,
                        description: String::new(),
                    }
                })
                .collect(),
        }
    }

    #[test]
    fn abort_skips_unattempted_entries() {
        let mut stage = Stage::from_catalog(&catalog_stage(3));
        stage.entries_mut().first_mut().unwrap().mark_already_granted().unwrap();
        stage.start().unwrap();
        stage.abort("Ledger unreachable").unwrap();

        assert_eq!(stage.status(), StageStatus::Aborted);
        assert_eq!(stage.abort_reason(), Some("Ledger unreachable"));
        let statuses: Vec<_> = stage.entries().iter().map(GrantEntry::status).collect();
        assert_eq!(
            statuses,
            vec![
                GrantStatus::AlreadyGranted,
                GrantStatus::Skipped,
                GrantStatus::Skipped
            ]
        );
    }

    #[test]
    fn stage_can_not_restart() {
        let mut stage = Stage::from_catalog(&catalog_stage(0));
        assert!(stage.complete().is_err());
        stage.start().unwrap();
        stage.complete().unwrap();
        assert!(stage.start().is_err());
    }
}
