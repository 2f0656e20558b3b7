//! Local mutation path.
//!
//! Every write lands in the replica first and is then queued for the
//! remote store, so edits made offline are visible immediately and pushed on
//! the next pass.

use crate::error::SyncResult;
use crate::gateway::RemoteGateway;
use crate::replica::{LocalReplica, RowMutation};
use crate::state::SyncEngine;
use chrono::{Days, NaiveDate, Utc};
use std::sync::Arc;
use subtrack_sync_protocol::{
    NewOperation, NewSubscription, Subscription, SubscriptionPatch, SyncStatus,
};
use tracing::debug;
use uuid::Uuid;

/// Creates, edits and queries subscriptions through a [`SyncEngine`].
pub struct SubscriptionService<G: RemoteGateway, R: LocalReplica> {
    engine: Arc<SyncEngine<G, R>>,
}

impl<G, R> SubscriptionService<G, R>
where
    G: RemoteGateway + 'static,
    R: LocalReplica + 'static,
{
    /// Creates a service over `engine`.
    pub fn new(engine: Arc<SyncEngine<G, R>>) -> Self {
        Self { engine }
    }

    /// Returns the engine.
    pub fn engine(&self) -> &Arc<SyncEngine<G, R>> {
        &self.engine
    }

    /// Adds a subscription under a fresh id and queues its CREATE.
    ///
    /// # Errors
    ///
    /// Returns an error if the replica rejects the row.
    pub fn add(&self, new: NewSubscription) -> SyncResult<Subscription> {
        let mut subscription = Subscription::from_new(Uuid::new_v4().to_string(), new);
        subscription.touch(Utc::now());

        self.engine.replica().set(subscription.clone())?;
        self.engine.log().enqueue(NewOperation::create(
            subscription.id.clone(),
            subscription.to_payload()?,
        ));
        debug!(entity_id = %subscription.id, "subscription added");

        self.after_write();
        Ok(subscription)
    }

    /// Patches a subscription and queues an UPDATE with the changed fields.
    ///
    /// Returns `None` if no row has that id. An empty patch returns the row
    /// unchanged and queues nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the replica rejects the write.
    pub fn update(&self, id: &str, patch: SubscriptionPatch) -> SyncResult<Option<Subscription>> {
        let replica = self.engine.replica();
        let Some(current) = replica.get(id)? else {
            return Ok(None);
        };
        if patch.is_empty() {
            return Ok(Some(current));
        }

        let payload = patch.to_payload()?;
        replica.apply_batch(vec![RowMutation::Patch {
            id: id.to_string(),
            patch,
            at: Utc::now(),
        }])?;
        self.engine
            .log()
            .enqueue(NewOperation::update(id.to_string(), payload));
        debug!(entity_id = id, "subscription updated");

        self.after_write();
        replica.get(id)
    }

    /// Deletes a subscription and queues its DELETE.
    ///
    /// Returns false if no row has that id.
    ///
    /// # Errors
    ///
    /// Returns an error if the replica rejects the delete.
    pub fn delete(&self, id: &str) -> SyncResult<bool> {
        if !self.engine.replica().delete(id)? {
            return Ok(false);
        }
        self.engine.log().enqueue(NewOperation::delete(id.to_string()));
        debug!(entity_id = id, "subscription deleted");

        self.after_write();
        Ok(true)
    }

    /// Reads one subscription.
    pub fn get(&self, id: &str) -> SyncResult<Option<Subscription>> {
        self.engine.replica().get(id)
    }

    /// Lists every subscription by renewal date, then name.
    pub fn list(&self) -> SyncResult<Vec<Subscription>> {
        let mut rows = self.engine.replica().all()?;
        rows.sort_by(|a, b| {
            a.renewal_date
                .cmp(&b.renewal_date)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(rows)
    }

    /// Lists active subscriptions renewing within `days` of `today`,
    /// soonest first. Overdue renewals are included.
    pub fn upcoming_renewals(&self, days: u64, today: NaiveDate) -> SyncResult<Vec<Subscription>> {
        let horizon = today.checked_add_days(Days::new(days)).unwrap_or(NaiveDate::MAX);
        let mut rows: Vec<Subscription> = self
            .list()?
            .into_iter()
            .filter(|row| row.is_active())
            .filter(|row| row.renewal_day().is_some_and(|day| day <= horizon))
            .collect();
        rows.sort_by_key(Subscription::renewal_day);
        Ok(rows)
    }

    /// Sums the monthly cost of every active subscription.
    pub fn monthly_cost(&self) -> SyncResult<f64> {
        Ok(self
            .engine
            .replica()
            .all()?
            .iter()
            .filter(|row| row.is_active())
            .map(Subscription::monthly_cost)
            .sum())
    }

    fn after_write(&self) {
        if self.engine.config().sync_on_write && self.engine.status() != SyncStatus::Offline {
            self.engine.request_sync();
        }
    }
}

impl<G: RemoteGateway, R: LocalReplica> Clone for SubscriptionService<G, R> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::gateway::MockGateway;
    use crate::queue::OperationLog;
    use crate::replica::MemoryReplica;
    use std::time::Duration;
    use subtrack_sync_protocol::OperationKind;

    fn service(config: SyncConfig) -> SubscriptionService<MockGateway, MemoryReplica> {
        SubscriptionService::new(Arc::new(SyncEngine::new(
            config.with_auto_sync(false),
            Arc::new(MockGateway::new()),
            Arc::new(MemoryReplica::new()),
            Arc::new(OperationLog::in_memory()),
        )))
    }

    fn netflix() -> NewSubscription {
        NewSubscription::new("Netflix", 15.49, "monthly", "2024-01-01", "2024-02-01")
    }

    fn date(text: &str) -> NaiveDate {
        NaiveDate::parse_from_str(text, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn add_writes_row_and_queues_create() {
        let service = service(SyncConfig::default());
        let added = service.add(netflix()).unwrap();

        assert!(Uuid::parse_str(&added.id).is_ok());
        assert!(added.updated_at.is_some());
        assert_eq!(added.last_modified, added.updated_at_millis());
        assert_eq!(service.get(&added.id).unwrap(), Some(added.clone()));

        let queued = service.engine().log().all();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].kind, OperationKind::Create);
        assert_eq!(queued[0].entity_id, added.id);
        assert_eq!(queued[0].data.as_ref().unwrap()["name"], "Netflix");
    }

    #[test]
    fn update_patches_and_queues_changed_fields() {
        let service = service(SyncConfig::default());
        let added = service.add(netflix()).unwrap();

        let patch = SubscriptionPatch {
            price: Some(17.99),
            ..Default::default()
        };
        let updated = service.update(&added.id, patch).unwrap().unwrap();

        assert_eq!(updated.price, 17.99);
        assert_eq!(updated.name, "Netflix");
        assert!(updated.updated_at_millis() >= added.updated_at_millis());

        let queued = service.engine().log().all();
        assert_eq!(queued.len(), 2);
        assert_eq!(queued[1].kind, OperationKind::Update);
        let data = queued[1].data.as_ref().unwrap();
        assert_eq!(data["price"], 17.99);
        assert!(data.get("name").is_none());
    }

    #[test]
    fn update_unknown_or_empty() {
        let service = service(SyncConfig::default());
        assert!(service
            .update("missing", SubscriptionPatch::default())
            .unwrap()
            .is_none());

        let added = service.add(netflix()).unwrap();
        let unchanged = service
            .update(&added.id, SubscriptionPatch::default())
            .unwrap();
        assert_eq!(unchanged, Some(added));
        assert_eq!(service.engine().log().size(), 1);
    }

    #[test]
    fn delete_removes_and_queues() {
        let service = service(SyncConfig::default());
        let added = service.add(netflix()).unwrap();

        assert!(service.delete(&added.id).unwrap());
        assert!(!service.delete(&added.id).unwrap());
        assert!(service.get(&added.id).unwrap().is_none());

        let kinds: Vec<OperationKind> = service
            .engine()
            .log()
            .all()
            .iter()
            .map(|op| op.kind)
            .collect();
        assert_eq!(kinds, vec![OperationKind::Create, OperationKind::Delete]);
    }

    #[test]
    fn list_orders_by_renewal_then_name() {
        let service = service(SyncConfig::default());
        service
            .add(NewSubscription::new("Spotify", 9.99, "monthly", "2024-01-01", "2024-03-01"))
            .unwrap();
        service
            .add(NewSubscription::new("Netflix", 15.49, "monthly", "2024-01-01", "2024-02-01"))
            .unwrap();
        service
            .add(NewSubscription::new("Hulu", 7.99, "monthly", "2024-01-01", "2024-02-01"))
            .unwrap();

        let names: Vec<String> = service.list().unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["Hulu", "Netflix", "Spotify"]);
    }

    #[test]
    fn upcoming_renewals_window() {
        let service = service(SyncConfig::default());
        service
            .add(NewSubscription::new("Soon", 1.0, "monthly", "2024-01-01", "2024-02-05"))
            .unwrap();
        service
            .add(NewSubscription::new("Later", 1.0, "monthly", "2024-01-01", "2024-04-01"))
            .unwrap();
        service
            .add(
                NewSubscription::new("Cancelled", 1.0, "monthly", "2024-01-01", "2024-02-03")
                    .with_status("cancelled"),
            )
            .unwrap();

        let upcoming = service.upcoming_renewals(7, date("2024-02-01")).unwrap();
        let names: Vec<&str> = upcoming.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Soon"]);
    }

    #[test]
    fn monthly_cost_sums_active_rows() {
        let service = service(SyncConfig::default());
        service
            .add(NewSubscription::new("Yearly", 120.0, "yearly", "2024-01-01", "2025-01-01"))
            .unwrap();
        service
            .add(NewSubscription::new("Monthly", 5.0, "monthly", "2024-01-01", "2024-02-01"))
            .unwrap();
        service
            .add(
                NewSubscription::new("Paused", 50.0, "monthly", "2024-01-01", "2024-02-01")
                    .with_status("paused"),
            )
            .unwrap();

        let total = service.monthly_cost().unwrap();
        assert!((total - 15.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn sync_on_write_pushes_in_background() {
        let service = service(SyncConfig::default().with_sync_on_write(true));
        service.add(netflix()).unwrap();

        for _ in 0..100 {
            if service.engine().log().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(service.engine().log().is_empty());
        assert_eq!(service.engine().gateway().applied().len(), 1);
    }
}
