//! Queue inspection and maintenance commands.

use super::Workspace;
use chrono::{DateTime, Utc};
use subtrack_sync_protocol::SyncOperation;
use tracing::info;

/// Runs the queue command.
pub fn run(
    workspace: &Workspace,
    dead_letters: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let service = workspace.open_default()?;
    let log = service.engine().log();
    let operations = if dead_letters {
        log.dead_letters()
    } else {
        log.all()
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&operations)?),
        _ => print_text_output(&operations, dead_letters),
    }

    Ok(())
}

/// Runs the retry command.
pub fn retry(workspace: &Workspace, op_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let service = workspace.open_default()?;
    if !service.engine().log().retry_dead_letter(op_id) {
        return Err(format!("No dropped operation with id {op_id}").into());
    }
    info!("Re-queued operation {}", op_id);

    println!("Re-queued {op_id}");
    Ok(())
}

/// Runs the clear-queue command.
pub fn clear(workspace: &Workspace, dead_letters: bool) -> Result<(), Box<dyn std::error::Error>> {
    let service = workspace.open_default()?;
    let log = service.engine().log();

    if dead_letters {
        let count = log.dead_letters().len();
        log.clear_dead_letters();
        println!("Cleared {count} dropped operations");
    } else {
        let count = log.size();
        log.clear();
        println!("Cleared {count} queued operations");
    }

    Ok(())
}

fn print_text_output(operations: &[SyncOperation], dead_letters: bool) {
    let label = if dead_letters { "dropped" } else { "queued" };
    println!("{} {} operations", operations.len(), label);
    println!();

    for op in operations {
        let queued_at = DateTime::<Utc>::from_timestamp_millis(op.timestamp)
            .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| op.timestamp.to_string());
        println!("{}", op.id);
        println!("  Kind:     {}", op.kind);
        println!("  Entity:   {} {}", op.entity_type, op.entity_id);
        println!("  Queued:   {queued_at}");
        println!("  Attempts: {}", op.attempts);
        if let Some(error) = &op.error {
            println!("  Error:    {error}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::temp_workspace;
    use subtrack_sync_protocol::NewOperation;

    #[test]
    fn retry_moves_dead_letter_back() {
        let (_dir, workspace) = temp_workspace();
        let service = workspace.open_default().unwrap();
        let op = service
            .engine()
            .log()
            .enqueue(NewOperation::delete("gone"));
        service.engine().log().dead_letter(&op.id).unwrap();
        drop(service);

        assert!(retry(&workspace, "unknown").is_err());
        retry(&workspace, &op.id).unwrap();

        let service = workspace.open_default().unwrap();
        assert_eq!(service.engine().log().size(), 1);
        assert!(service.engine().log().dead_letters().is_empty());
    }

    #[test]
    fn clear_targets_one_list() {
        let (_dir, workspace) = temp_workspace();
        let service = workspace.open_default().unwrap();
        let log = service.engine().log();
        log.enqueue(NewOperation::delete("a"));
        let dropped = log.enqueue(NewOperation::delete("b"));
        log.dead_letter(&dropped.id).unwrap();
        drop(service);

        clear(&workspace, true).unwrap();
        let service = workspace.open_default().unwrap();
        assert_eq!(service.engine().log().size(), 1);
        assert!(service.engine().log().dead_letters().is_empty());
        drop(service);

        clear(&workspace, false).unwrap();
        assert!(workspace.open_default().unwrap().engine().log().is_empty());
    }
}
