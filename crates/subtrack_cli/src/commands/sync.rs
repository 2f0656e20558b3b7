//! Sync command implementation.

use super::Workspace;
use serde::Serialize;
use subtrack_sync_engine::{SyncConfig, SyncCycleResult};
use subtrack_sync_protocol::ConflictStrategy;
use tracing::info;

/// Outcome of one sync pass, as printed by the CLI.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// Whether the pass completed.
    pub success: bool,
    /// Failure message, if the pass failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Operations accepted by the server.
    pub pushed: u64,
    /// Ids of operations dropped after exhausting their retries.
    pub dropped: Vec<String>,
    /// Rows inserted from the server.
    pub inserted: u64,
    /// Rows overwritten by the server version.
    pub updated: u64,
    /// Rows removed because the server no longer has them.
    pub removed: u64,
    /// Conflicts found, as `entity_id: action`.
    pub conflicts: Vec<String>,
    /// Operations still queued after the pass.
    pub queued: usize,
    /// Wall time of the pass in milliseconds.
    pub duration_ms: u128,
}

impl SyncReport {
    fn new(result: &SyncCycleResult, queued: usize) -> Self {
        Self {
            success: result.success,
            error: result.error.clone(),
            pushed: result.pushed,
            dropped: result.dropped.iter().map(|op| op.id.clone()).collect(),
            inserted: result.inserted,
            updated: result.updated,
            removed: result.removed,
            conflicts: result
                .conflicts
                .iter()
                .map(|c| format!("{}: {}", c.entity_id, c.action))
                .collect(),
            queued,
            duration_ms: result.duration.as_millis(),
        }
    }
}

/// Runs the sync command.
pub fn run(
    workspace: &Workspace,
    strategy: &str,
    max_retries: u32,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let strategy: ConflictStrategy = strategy.parse()?;
    let config = SyncConfig::default()
        .with_conflict_strategy(strategy)
        .with_max_retry_attempts(max_retries);
    let service = workspace.open(config)?;

    info!(
        "Syncing {:?} ({} queued, {})",
        workspace.data_dir(),
        service.engine().log().size(),
        strategy
    );
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(service.engine().sync());
    let report = SyncReport::new(&result, service.engine().log().size());

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => print_text_output(&report),
    }

    match report.error {
        Some(error) if !report.success => Err(format!("Sync failed: {error}").into()),
        _ => Ok(()),
    }
}

fn print_text_output(report: &SyncReport) {
    if report.success {
        println!("Sync complete in {} ms", report.duration_ms);
    } else {
        println!(
            "Sync failed: {}",
            report.error.as_deref().unwrap_or("unknown error")
        );
    }
    println!("  Pushed:    {}", report.pushed);
    println!("  Inserted:  {}", report.inserted);
    println!("  Updated:   {}", report.updated);
    println!("  Removed:   {}", report.removed);
    println!("  Queued:    {}", report.queued);

    if !report.conflicts.is_empty() {
        println!("  Conflicts:");
        for conflict in &report.conflicts {
            println!("    {conflict}");
        }
    }
    if !report.dropped.is_empty() {
        println!("  Dropped (see `subtrack queue --dead-letters`):");
        for id in &report.dropped {
            println!("    {id}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::temp_workspace;

    #[test]
    fn unknown_strategy_is_rejected() {
        let (_dir, workspace) = temp_workspace();
        assert!(run(&workspace, "random", 3, "text").is_err());
    }

    #[test]
    fn unreachable_server_keeps_queue() {
        let (_dir, workspace) = temp_workspace();
        let service = workspace.open_default().unwrap();
        service
            .add(subtrack_sync_protocol::NewSubscription::new(
                "Netflix",
                9.99,
                "monthly",
                "2024-01-01",
                "2024-02-01",
            ))
            .unwrap();
        drop(service);

        let err = run(&workspace, "client-wins", 3, "json").unwrap_err();
        assert!(err.to_string().contains("Offline"));
        assert_eq!(workspace.open_default().unwrap().engine().log().size(), 1);
    }

    #[test]
    fn report_lists_dropped_ids() {
        let mut result = SyncCycleResult {
            success: true,
            pushed: 2,
            ..Default::default()
        };
        result.dropped.push(subtrack_sync_protocol::SyncOperation::from_request(
            subtrack_sync_protocol::NewOperation::delete("x"),
            chrono::Utc::now(),
        ));

        let report = SyncReport::new(&result, 0);
        assert_eq!(report.dropped, vec![result.dropped[0].id.clone()]);
        assert_eq!(report.pushed, 2);
        assert!(report.error.is_none());
    }
}
