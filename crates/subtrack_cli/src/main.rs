//! Subtrack CLI
//!
//! Command-line client for tracking subscriptions offline and syncing them
//! with a remote server.
//!
//! # Commands
//!
//! - `add` / `update` / `delete` - Edit subscriptions locally and queue the change
//! - `list` - Show local subscriptions
//! - `costs` - Show the monthly total and upcoming renewals
//! - `queue` - Show pending or dead-lettered operations
//! - `retry` / `clear-queue` - Manage the operation queue
//! - `sync` - Run one sync pass against the server

mod commands;

use clap::{Parser, Subcommand};
use commands::Workspace;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Offline-first subscription tracker.
#[derive(Parser)]
#[command(name = "subtrack")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the local replica and operation queue
    #[arg(global = true, short, long, default_value = ".subtrack")]
    data_dir: PathBuf,

    /// Base URL of the sync server API
    #[arg(
        global = true,
        long,
        env = "SUBTRACK_SERVER_URL",
        default_value = "http://localhost:3000/api"
    )]
    server: String,

    /// Bearer token sent with every request
    #[arg(global = true, long, env = "SUBTRACK_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a subscription
    Add(commands::edit::AddArgs),

    /// Change fields of a subscription
    Update(commands::edit::UpdateArgs),

    /// Delete a subscription
    Delete {
        /// Subscription id
        id: String,
    },

    /// List local subscriptions
    List {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show the monthly total and upcoming renewals
    Costs {
        /// Renewal window in days
        #[arg(long, default_value = "30")]
        days: u64,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show queued operations
    Queue {
        /// Show dropped operations instead of the pending queue
        #[arg(long)]
        dead_letters: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Move a dropped operation back into the queue
    Retry {
        /// Operation id
        op_id: String,
    },

    /// Discard queued operations
    ClearQueue {
        /// Clear the dead-letter list instead of the pending queue
        #[arg(long)]
        dead_letters: bool,
    },

    /// Run one sync pass against the server
    Sync {
        /// Conflict strategy (server-wins, last-write-wins, client-wins)
        #[arg(short, long, default_value = "last-write-wins")]
        strategy: String,

        /// Attempts before an operation is dropped
        #[arg(short, long, default_value = "3")]
        max_retries: u32,

        /// Request timeout in seconds
        #[arg(short, long, default_value = "30")]
        timeout: u64,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let workspace = Workspace::new(cli.data_dir, cli.server, cli.token);

    match cli.command {
        Commands::Add(args) => commands::edit::add(&workspace, args)?,
        Commands::Update(args) => commands::edit::update(&workspace, args)?,
        Commands::Delete { id } => commands::edit::delete(&workspace, &id)?,
        Commands::List { format } => commands::list::run(&workspace, &format)?,
        Commands::Costs { days, format } => commands::list::costs(&workspace, days, &format)?,
        Commands::Queue {
            dead_letters,
            format,
        } => commands::queue::run(&workspace, dead_letters, &format)?,
        Commands::Retry { op_id } => commands::queue::retry(&workspace, &op_id)?,
        Commands::ClearQueue { dead_letters } => {
            commands::queue::clear(&workspace, dead_letters)?;
        }
        Commands::Sync {
            strategy,
            max_retries,
            timeout,
            format,
        } => {
            let workspace = workspace.with_timeout(Duration::from_secs(timeout));
            commands::sync::run(&workspace, &strategy, max_retries, &format)?;
        }
    }

    Ok(())
}
