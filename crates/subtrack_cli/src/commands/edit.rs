//! Add, update and delete commands.
//!
//! Every edit is applied to the local replica and queued; nothing is sent
//! until the next `sync`.

use super::{format_price, Workspace};
use chrono::NaiveDate;
use clap::Args;
use subtrack_sync_protocol::{NewSubscription, Subscription, SubscriptionPatch};
use tracing::info;

/// Arguments for `add`.
#[derive(Debug, Args)]
pub struct AddArgs {
    /// Display name
    pub name: String,

    /// Price per billing cycle
    #[arg(short, long)]
    pub price: f64,

    /// Billing cycle (monthly, yearly, quarterly, weekly, daily)
    #[arg(short, long, default_value = "monthly")]
    pub cycle: String,

    /// First billing date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub start: String,

    /// Next renewal date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub renewal: String,

    #[command(flatten)]
    pub details: DetailArgs,
}

/// Arguments for `update`.
#[derive(Debug, Args)]
pub struct UpdateArgs {
    /// Subscription id
    pub id: String,

    /// New display name
    #[arg(short, long)]
    pub name: Option<String>,

    /// New price
    #[arg(short, long)]
    pub price: Option<f64>,

    /// New billing cycle
    #[arg(short, long)]
    pub cycle: Option<String>,

    /// New first billing date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub start: Option<String>,

    /// New renewal date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub renewal: Option<String>,

    #[command(flatten)]
    pub details: DetailArgs,
}

/// Optional descriptive fields shared by `add` and `update`.
#[derive(Debug, Default, Args)]
pub struct DetailArgs {
    /// Plan or tier
    #[arg(long)]
    pub plan: Option<String>,

    /// ISO currency code
    #[arg(long)]
    pub currency: Option<String>,

    /// Category label
    #[arg(long)]
    pub category: Option<String>,

    /// Account email used for the subscription
    #[arg(long)]
    pub account: Option<String>,

    /// Payment method
    #[arg(long)]
    pub payment_method: Option<String>,

    /// Status (active, paused, cancelled)
    #[arg(long)]
    pub status: Option<String>,

    /// Cancellation instructions
    #[arg(long)]
    pub cancellation_info: Option<String>,

    /// Free-form notes
    #[arg(long)]
    pub notes: Option<String>,
}

impl AddArgs {
    /// Builds the new subscription these arguments describe.
    pub fn into_new(self) -> NewSubscription {
        let DetailArgs {
            plan,
            currency,
            category,
            account,
            payment_method,
            status,
            cancellation_info,
            notes,
        } = self.details;

        let mut new =
            NewSubscription::new(self.name, self.price, self.cycle, self.start, self.renewal);
        if let Some(currency) = currency {
            new = new.with_currency(currency);
        }
        if let Some(status) = status {
            new = new.with_status(status);
        }
        new.plan = plan;
        new.category = category;
        new.account_email = account;
        new.payment_method = payment_method;
        new.cancellation_info = cancellation_info;
        new.notes = notes;
        new
    }
}

impl UpdateArgs {
    /// Builds the patch these arguments describe.
    pub fn to_patch(&self) -> SubscriptionPatch {
        let details = &self.details;
        SubscriptionPatch {
            name: self.name.clone(),
            plan: details.plan.clone(),
            price: self.price,
            currency: details.currency.clone(),
            billing_cycle: self.cycle.clone(),
            start_date: self.start.clone(),
            renewal_date: self.renewal.clone(),
            payment_method: details.payment_method.clone(),
            account_email: details.account.clone(),
            category: details.category.clone(),
            status: details.status.clone(),
            cancellation_info: details.cancellation_info.clone(),
            notes: details.notes.clone(),
        }
    }
}

fn parse_date(text: &str) -> Result<String, String> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map(|date| date.format("%Y-%m-%d").to_string())
        .map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

/// Runs the add command.
pub fn add(workspace: &Workspace, args: AddArgs) -> Result<(), Box<dyn std::error::Error>> {
    let service = workspace.open_default()?;
    let added = service.add(args.into_new())?;
    info!("Queued CREATE for {}", added.id);

    print_row(&added);
    Ok(())
}

/// Runs the update command.
pub fn update(workspace: &Workspace, args: UpdateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let patch = args.to_patch();
    if patch.is_empty() {
        return Err("Nothing to update: pass at least one field".into());
    }

    let service = workspace.open_default()?;
    let updated = service
        .update(&args.id, patch)?
        .ok_or_else(|| format!("No subscription with id {}", args.id))?;
    info!("Queued UPDATE for {}", updated.id);

    print_row(&updated);
    Ok(())
}

/// Runs the delete command.
pub fn delete(workspace: &Workspace, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let service = workspace.open_default()?;
    if !service.delete(id)? {
        return Err(format!("No subscription with id {id}").into());
    }
    info!("Queued DELETE for {}", id);

    println!("Deleted {id}");
    Ok(())
}

fn print_row(row: &Subscription) {
    println!("{}", row.id);
    println!("  Name:     {}", row.name);
    println!(
        "  Price:    {} ({})",
        format_price(row.price, &row.currency),
        row.billing_cycle
    );
    println!("  Renewal:  {}", row.renewal_date);
    println!("  Status:   {}", row.status);
}
