//! Run report.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    grant::{GrantEntry, GrantStatus},
    stage::{Stage, StageStatus},
};

/// Advice printed with every report.
pub const RECOMMENDATION: &str = "Re-running the reconciler is always safe: granted roles are \
                                  detected and skipped. Re-run to retry any Failed or Skipped \
                                  entries.";

/// How the run was performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "lowercase")]
pub enum RunMode {
    /// Missing grants were submitted.
    Apply,
    /// Missing grants were only listed.
    Plan,
}

/// Entry counts across the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    /// Entries in the catalog.
    pub entries: usize,
    /// Entries already present on the ledger.
    pub already_granted: usize,
    /// Entries confirmed in this run.
    pub confirmed: usize,
    /// Entries attempted without success.
    pub failed: usize,
    /// Entries of an aborted stage that were never attempted.
    pub skipped: usize,
    /// Entries still to submit in stages that never started.
    pub not_started: usize,
    /// Ledger transactions broadcast.
    pub transactions: usize,
}

impl Totals {
    /// Count the entries of `stages`.
    #[must_use]
    pub fn count(stages: &[Stage]) -> Self {
        let mut totals = Totals::default();
        for stage in stages {
            for entry in stage.entries() {
                totals.add(stage.status(), entry);
            }
        }
        totals
    }

    /// Count one entry.
    fn add(&mut self, stage_status: StageStatus, entry: &GrantEntry) {
        self.entries = self.entries.saturating_add(1);
        let counter = match entry.status() {
            GrantStatus::AlreadyGranted => &mut self.already_granted,
            GrantStatus::Confirmed => &mut self.confirmed,
            GrantStatus::Failed => &mut self.failed,
            GrantStatus::Skipped => &mut self.skipped,
            GrantStatus::Pending if stage_status == StageStatus::NotStarted => {
                &mut self.not_started
            },
            // Only reachable if an entry was left behind by a started stage.
            GrantStatus::Pending | GrantStatus::Submitted => &mut self.failed,
        };
        *counter = counter.saturating_add(1);
        if entry.record().is_some_and(|r| r.broadcast()) {
            self.transactions = self.transactions.saturating_add(1);
        }
    }
}

/// Terminal view of a run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    /// Apply or plan.
    pub mode: RunMode,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// Entry counts.
    pub totals: Totals,
    /// Every stage with every entry.
    pub stages: Vec<Stage>,
    /// Standing advice.
    pub recommendation: &'static str,
}

impl RunReport {
    /// Assemble the report of a finished run.
    #[must_use]
    pub fn new(mode: RunMode, started_at: DateTime<Utc>, stages: Vec<Stage>) -> Self {
        Self {
            mode,
            started_at,
            finished_at: Utc::now(),
            totals: Totals::count(&stages),
            stages,
            recommendation: RECOMMENDATION,
        }
    }

    /// The stage that stopped the run.
    #[must_use]
    pub fn aborted_stage(&self) -> Option<&Stage> {
        self.stages
            .iter()
            .find(|s| s.status() == StageStatus::Aborted)
    }

    /// Every stage ran to completion.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.stages
            .iter()
            .all(|s| s.status() == StageStatus::Completed)
    }

    /// Process exit code: 1 when a stage aborted, 0 otherwise.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        u8::from(self.aborted_stage().is_some())
    }

    /// Entries that still need a submission, in execution order.
    pub fn pending(&self) -> impl Iterator<Item = &GrantEntry> {
        crate::diff::pending_entries(&self.stages)
    }

    /// Pretty JSON rendering.
    ///
    /// # Errors
    ///
    /// If serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
