//! List and costs commands.

use super::{format_price, Workspace};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use subtrack_sync_protocol::Subscription;

/// Cost summary for the `costs` command.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostSummary {
    /// Sum of active subscriptions normalised to one month.
    pub monthly_total: f64,
    /// Twelve times the monthly total.
    pub yearly_total: f64,
    /// Renewal window in days.
    pub window_days: u64,
    /// Active subscriptions renewing inside the window.
    pub upcoming: Vec<Subscription>,
}

/// Runs the list command.
pub fn run(workspace: &Workspace, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let rows = workspace.open_default()?.list()?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&rows)?),
        _ => print_rows(&rows),
    }

    Ok(())
}

/// Runs the costs command.
pub fn costs(workspace: &Workspace, days: u64, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let summary = summarize(workspace, days, Local::now().date_naive())?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&summary)?),
        _ => print_summary(&summary),
    }

    Ok(())
}

fn summarize(
    workspace: &Workspace,
    days: u64,
    today: NaiveDate,
) -> Result<CostSummary, Box<dyn std::error::Error>> {
    let service = workspace.open_default()?;
    let monthly_total = service.monthly_cost()?;
    Ok(CostSummary {
        monthly_total,
        yearly_total: monthly_total * 12.0,
        window_days: days,
        upcoming: service.upcoming_renewals(days, today)?,
    })
}

fn print_rows(rows: &[Subscription]) {
    if rows.is_empty() {
        println!("No subscriptions");
        return;
    }

    println!(
        "{:<36}  {:<20}  {:>14}  {:<10}  {:<10}  {}",
        "ID", "NAME", "PRICE", "CYCLE", "RENEWAL", "STATUS"
    );
    for row in rows {
        println!(
            "{:<36}  {:<20}  {:>14}  {:<10}  {:<10}  {}",
            row.id,
            row.name,
            format_price(row.price, &row.currency),
            row.billing_cycle,
            row.renewal_date,
            row.status
        );
    }
}

fn print_summary(summary: &CostSummary) {
    println!("Monthly total: {:.2}", summary.monthly_total);
    println!("Yearly total:  {:.2}", summary.yearly_total);
    println!();

    if summary.upcoming.is_empty() {
        println!("No renewals in the next {} days", summary.window_days);
        return;
    }
    println!("Renewals in the next {} days:", summary.window_days);
    for row in &summary.upcoming {
        println!(
            "  {}  {:<20}  {}",
            row.renewal_date,
            row.name,
            format_price(row.price, &row.currency)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::temp_workspace;
    use subtrack_sync_protocol::NewSubscription;

    #[test]
    fn summary_covers_active_rows_only() {
        let (_dir, workspace) = temp_workspace();
        let service = workspace.open_default().unwrap();
        service
            .add(NewSubscription::new("Netflix", 10.0, "monthly", "2024-01-01", "2024-02-05"))
            .unwrap();
        service
            .add(NewSubscription::new("Drive", 120.0, "yearly", "2024-01-01", "2024-06-01"))
            .unwrap();
        service
            .add(
                NewSubscription::new("Paused", 50.0, "monthly", "2024-01-01", "2024-02-02")
                    .with_status("paused"),
            )
            .unwrap();
        drop(service);

        let today = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let summary = summarize(&workspace, 30, today).unwrap();

        assert!((summary.monthly_total - 20.0).abs() < 1e-9);
        assert!((summary.yearly_total - 240.0).abs() < 1e-9);
        assert_eq!(summary.upcoming.len(), 1);
        assert_eq!(summary.upcoming[0].name, "Netflix");
    }

    #[test]
    fn summary_serialises_camel_case() {
        let summary = CostSummary {
            monthly_total: 1.0,
            yearly_total: 12.0,
            window_days: 7,
            upcoming: Vec::new(),
        };
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["windowDays"], 7);
        assert!(value.get("monthlyTotal").is_some());
    }
}
