//! Reference model for replay checks.
//!
//! [`ReferenceModel`] applies mutations directly to a map, with no queue,
//! no network and no timestamps. After a sync pass the remote store must
//! hold the same rows as the model.

use crate::generators::Mutation;
use std::collections::BTreeMap;
use subtrack_sync_engine::{LocalReplica, RemoteGateway, SubscriptionService, SyncResult};
use subtrack_sync_protocol::{NewSubscription, Subscription, SubscriptionPatch};

/// The expected row set after a sequence of mutations.
#[derive(Debug, Clone, Default)]
pub struct ReferenceModel {
    rows: BTreeMap<String, Subscription>,
    live: Vec<String>,
}

impl ReferenceModel {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a row under `id`.
    pub fn add(&mut self, id: &str, new: NewSubscription) {
        self.rows
            .insert(id.to_string(), Subscription::from_new(id, new));
        self.live.push(id.to_string());
    }

    /// Patches a row. Unknown ids are ignored.
    pub fn update(&mut self, id: &str, patch: &SubscriptionPatch) {
        if let Some(row) = self.rows.get_mut(id) {
            row.apply_patch(patch);
        }
    }

    /// Removes a row.
    pub fn delete(&mut self, id: &str) {
        self.rows.remove(id);
        self.live.retain(|live| live != id);
    }

    /// Resolves a mutation index to a live id, in insertion order.
    pub fn pick(&self, index: usize) -> Option<String> {
        if self.live.is_empty() {
            return None;
        }
        Some(self.live[index % self.live.len()].clone())
    }

    /// Returns the rows ordered by id.
    pub fn rows(&self) -> Vec<Subscription> {
        self.rows.values().cloned().collect()
    }

    /// Returns the number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Applies `mutations` through `service` and mirrors them in `model`.
///
/// Ids assigned by the service are recorded in the model so later
/// mutations address the same rows on both sides.
///
/// # Errors
///
/// Returns the first error raised by the service.
pub fn replay<G, R>(
    service: &SubscriptionService<G, R>,
    model: &mut ReferenceModel,
    mutations: &[Mutation],
) -> SyncResult<()>
where
    G: RemoteGateway + 'static,
    R: LocalReplica + 'static,
{
    for mutation in mutations {
        match mutation {
            Mutation::Add(new) => {
                let added = service.add(new.clone())?;
                model.add(&added.id, new.clone());
            }
            Mutation::Update(index, patch) => {
                if let Some(id) = model.pick(*index) {
                    service.update(&id, patch.clone())?;
                    model.update(&id, patch);
                }
            }
            Mutation::Delete(index) => {
                if let Some(id) = model.pick(*index) {
                    service.delete(&id)?;
                    model.delete(&id);
                }
            }
        }
    }
    Ok(())
}
