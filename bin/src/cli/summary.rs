//! Human readable run summary, written to stderr next to the JSON report.

use console::{style, Emoji};
use grant_reconciler::{report::RunMode, GrantStatus, RunReport, StageStatus, TxHash};
use url::Url;

/// Marker shown in front of an entry.
fn entry_marker(status: GrantStatus) -> Emoji<'static, 'static> {
    match status {
        GrantStatus::Confirmed => Emoji::new("✅", "+"),
        GrantStatus::AlreadyGranted => Emoji::new("👌", "="),
        GrantStatus::Failed => Emoji::new("❌", "x"),
        GrantStatus::Skipped => Emoji::new("⏭️", "-"),
        GrantStatus::Pending | GrantStatus::Submitted => Emoji::new("⏳", "?"),
    }
}

/// Marker shown in front of a stage.
fn stage_marker(status: StageStatus) -> Emoji<'static, 'static> {
    match status {
        StageStatus::Completed => Emoji::new("🏁", ""),
        StageStatus::Aborted => Emoji::new("🛑", ""),
        StageStatus::NotStarted | StageStatus::Running => Emoji::new("💤", ""),
    }
}

/// Explorer page of a transaction.
fn tx_link(explorer: &Url, tx_hash: TxHash) -> String {
    format!("{}/tx/{tx_hash}", explorer.as_str().trim_end_matches('/'))
}

/// Print the summary of `report`.
pub(crate) fn print(report: &RunReport, explorer: Option<&Url>) {
    for stage in &report.stages {
        eprintln!(
            "\n{} Stage {}: {} [{}]",
            stage_marker(stage.status()),
            stage.id,
            style(&stage.name).bold(),
            stage.status()
        );
        if let Some(reason) = stage.abort_reason() {
            eprintln!("   {}", style(reason).red());
        }
        for entry in stage.entries() {
            eprintln!(
                "   {} {} {}",
                entry_marker(entry.status()),
                entry.label(),
                style(entry.status()).dim()
            );
            if let Some(tx_hash) = entry.tx_hash() {
                let link = explorer.map_or_else(|| tx_hash.to_string(), |url| tx_link(url, tx_hash));
                eprintln!("      {link}");
            }
            if let Some(read_error) = entry.read_error() {
                eprintln!("      {}", style(read_error).yellow());
            }
            if let Some(error) = entry.error() {
                eprintln!("      {}", style(error).red());
            }
        }
    }

    let totals = &report.totals;
    eprintln!();
    match report.mode {
        RunMode::Apply => {
            eprintln!(
                "{} {} entries: {} confirmed, {} already granted, {} failed, {} skipped, {} not started, {} transactions",
                Emoji::new("📋", ""),
                totals.entries,
                style(totals.confirmed).green(),
                totals.already_granted,
                style(totals.failed).red(),
                totals.skipped,
                totals.not_started,
                totals.transactions
            );
        },
        RunMode::Plan => {
            eprintln!(
                "{} {} entries: {} already granted, {} to submit",
                Emoji::new("📋", ""),
                totals.entries,
                totals.already_granted,
                style(report.pending().count()).yellow()
            );
        },
    }
    eprintln!("{}", style(report.recommendation).dim());
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("https://arbiscan.io" ; "bare")]
    #[test_case("https://arbiscan.io/" ; "trailing slash")]
    fn links_transactions(explorer: &str) {
        let tx_hash: TxHash = format!("0x{}", "ab".repeat(32)).parse().unwrap();
        let link = tx_link(&explorer.parse().unwrap(), tx_hash);
        assert_eq!(link, format!("https://arbiscan.io/tx/0x{}", "ab".repeat(32)));
    }

    #[test]
    fn explorer_path_is_kept() {
        let tx_hash = TxHash::default();
        let explorer: Url = "https://explorer.example/arbitrum".parse().unwrap();
        assert!(tx_link(&explorer, tx_hash).starts_with("https://explorer.example/arbitrum/tx/0x00"));
    }
}
