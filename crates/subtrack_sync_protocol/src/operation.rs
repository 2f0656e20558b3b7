//! Sync operations.

use crate::error::{ProtocolError, ProtocolResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Kind of mutation an operation carries to the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationKind {
    /// Entity was created locally.
    Create,
    /// Entity was changed locally.
    Update,
    /// Entity was deleted locally.
    Delete,
}

impl OperationKind {
    /// Returns the wire name (`CREATE`, `UPDATE` or `DELETE`).
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "CREATE",
            OperationKind::Update => "UPDATE",
            OperationKind::Delete => "DELETE",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> ProtocolResult<Self> {
        match s.to_ascii_uppercase().as_str() {
            "CREATE" => Ok(OperationKind::Create),
            "UPDATE" => Ok(OperationKind::Update),
            "DELETE" => Ok(OperationKind::Delete),
            _ => Err(ProtocolError::unknown("operation kind", s)),
        }
    }
}

/// Type of entity an operation targets.
///
/// Only subscriptions are synchronized today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    /// A [`crate::Subscription`].
    #[default]
    Subscription,
}

impl EntityType {
    /// Returns the wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Subscription => "subscription",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The caller-supplied part of an operation.
///
/// The operation log turns this into a [`SyncOperation`] by assigning an id,
/// the enqueue timestamp and a zero attempt counter.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOperation {
    /// Kind of mutation.
    pub kind: OperationKind,
    /// Target entity id.
    pub entity_id: String,
    /// Target entity type.
    pub entity_type: EntityType,
    /// Full or partial entity data; absent for deletes.
    pub data: Option<Value>,
}

impl NewOperation {
    /// Creates a CREATE request carrying the full entity payload.
    pub fn create(entity_id: impl Into<String>, data: Value) -> Self {
        Self {
            kind: OperationKind::Create,
            entity_id: entity_id.into(),
            entity_type: EntityType::Subscription,
            data: Some(data),
        }
    }

    /// Creates an UPDATE request carrying a full or partial payload.
    pub fn update(entity_id: impl Into<String>, data: Value) -> Self {
        Self {
            kind: OperationKind::Update,
            entity_id: entity_id.into(),
            entity_type: EntityType::Subscription,
            data: Some(data),
        }
    }

    /// Creates a DELETE request.
    pub fn delete(entity_id: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::Delete,
            entity_id: entity_id.into(),
            entity_type: EntityType::Subscription,
            data: None,
        }
    }
}

/// A pending mutation awaiting transmission to the remote store.
///
/// # Fields
///
/// - `id`: Unique operation identifier, independent of the entity id
/// - `kind`: CREATE, UPDATE or DELETE
/// - `entity_id`: The entity being modified
/// - `data`: Payload for CREATE/UPDATE, absent for DELETE
/// - `timestamp`: Enqueue time in milliseconds since the epoch
/// - `attempts`: Failed transmissions so far
/// - `error`: Message of the most recent failure
///
/// The persisted JSON form is camelCase with the kind stored under `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOperation {
    /// Unique operation ID.
    pub id: String,
    /// Operation kind.
    #[serde(rename = "type", alias = "kind")]
    pub kind: OperationKind,
    /// Target entity ID.
    pub entity_id: String,
    /// Target entity type.
    #[serde(default)]
    pub entity_type: EntityType,
    /// Entity payload (for CREATE and UPDATE).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Enqueue time in milliseconds since the epoch.
    pub timestamp: i64,
    /// Number of failed transmission attempts.
    #[serde(default)]
    pub attempts: u32,
    /// Last transmission error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncOperation {
    /// Builds an operation from a request, assigning a fresh UUID v4 id.
    #[must_use]
    pub fn from_request(request: NewOperation, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind: request.kind,
            entity_id: request.entity_id,
            entity_type: request.entity_type,
            data: request.data,
            timestamp: now.timestamp_millis(),
            attempts: 0,
            error: None,
        }
    }

    /// Records one failed transmission.
    pub fn record_failure(&mut self, error: Option<String>) {
        self.attempts = self.attempts.saturating_add(1);
        self.error = error;
    }

    /// Returns true once `attempts` has reached `max_attempts`.
    #[must_use]
    pub fn is_exhausted(&self, max_attempts: u32) -> bool {
        self.attempts >= max_attempts
    }

    /// Clears the attempt counter and last error.
    pub fn reset_attempts(&mut self) {
        self.attempts = 0;
        self.error = None;
    }

    /// Returns true if this operation targets the given entity.
    #[must_use]
    pub fn targets(&self, entity_type: EntityType, entity_id: &str) -> bool {
        self.entity_type == entity_type && self.entity_id == entity_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_names() {
        assert_eq!(OperationKind::Create.as_str(), "CREATE");
        assert_eq!(OperationKind::Delete.to_string(), "DELETE");
        assert_eq!("update".parse::<OperationKind>().unwrap(), OperationKind::Update);
        assert!("MERGE".parse::<OperationKind>().is_err());
    }

    #[test]
    fn from_request_assigns_identity() {
        let now = Utc::now();
        let a = SyncOperation::from_request(NewOperation::delete("sub-1"), now);
        let b = SyncOperation::from_request(NewOperation::delete("sub-1"), now);

        assert_ne!(a.id, b.id);
        assert_eq!(a.timestamp, now.timestamp_millis());
        assert_eq!(a.attempts, 0);
        assert_eq!(a.error, None);
        assert_eq!(a.entity_type, EntityType::Subscription);
    }

    #[test]
    fn persisted_shape() {
        let op = SyncOperation {
            id: "op-1".into(),
            kind: OperationKind::Create,
            entity_id: "sub-1".into(),
            entity_type: EntityType::Subscription,
            data: Some(json!({"name": "Netflix"})),
            timestamp: 1_700_000_000_000,
            attempts: 2,
            error: Some("boom".into()),
        };

        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "op-1",
                "type": "CREATE",
                "entityId": "sub-1",
                "entityType": "subscription",
                "data": {"name": "Netflix"},
                "timestamp": 1_700_000_000_000_i64,
                "attempts": 2,
                "error": "boom"
            })
        );
    }

    #[test]
    fn delete_has_no_data() {
        let op = SyncOperation::from_request(NewOperation::delete("x"), Utc::now());
        let value = serde_json::to_value(&op).unwrap();
        assert!(value.get("data").is_none());
    }

    #[test]
    fn accepts_kind_alias() {
        let op: SyncOperation = serde_json::from_value(json!({
            "id": "op-2",
            "kind": "UPDATE",
            "entityId": "sub-2",
            "timestamp": 5
        }))
        .unwrap();
        assert_eq!(op.kind, OperationKind::Update);
        assert_eq!(op.attempts, 0);
    }

    #[test]
    fn failure_bookkeeping() {
        let mut op = SyncOperation::from_request(NewOperation::delete("x"), Utc::now());
        op.record_failure(Some("timeout".into()));
        op.record_failure(Some("503".into()));

        assert_eq!(op.attempts, 2);
        assert_eq!(op.error.as_deref(), Some("503"));
        assert!(op.is_exhausted(2));
        assert!(!op.is_exhausted(3));

        op.reset_attempts();
        assert_eq!(op.attempts, 0);
        assert_eq!(op.error, None);
    }

    #[test]
    fn targets_matches_type_and_id() {
        let op = SyncOperation::from_request(
            NewOperation::create("sub-1", json!({})),
            Utc::now(),
        );
        assert!(op.targets(EntityType::Subscription, "sub-1"));
        assert!(!op.targets(EntityType::Subscription, "sub-2"));
    }
}
