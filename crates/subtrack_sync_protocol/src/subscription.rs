//! The subscription entity in its local shape.

use crate::error::{ProtocolError, ProtocolResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status value for subscriptions that are being billed.
pub const STATUS_ACTIVE: &str = "active";

/// Currency assumed when none is given.
pub const DEFAULT_CURRENCY: &str = "USD";

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_status() -> String {
    STATUS_ACTIVE.to_string()
}

/// A recurring subscription as stored in the local replica.
///
/// Two fields drive synchronization:
///
/// - `last_modified`: milliseconds since the epoch, set on every local write
/// - `updated_at`: ISO-8601 timestamp of the last write, mirrored from the
///   remote record once pulled
///
/// Conflict resolution compares `updated_at` only; see
/// [`Subscription::updated_at_millis`].
///
/// The JSON form uses camelCase field names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    /// Opaque unique identifier.
    pub id: String,
    /// Display name, e.g. "Netflix".
    pub name: String,
    /// Plan or tier name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    /// Price per billing cycle.
    pub price: f64,
    /// ISO currency code.
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Billing cycle, e.g. "monthly" or "yearly".
    pub billing_cycle: String,
    /// Start date (`YYYY-MM-DD`).
    pub start_date: String,
    /// Next renewal date (`YYYY-MM-DD`).
    pub renewal_date: String,
    /// Payment method description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    /// Account the subscription is registered under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_email: Option<String>,
    /// Free-form category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Lifecycle status, "active" by default.
    #[serde(default = "default_status")]
    pub status: String,
    /// How to cancel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancellation_info: Option<String>,
    /// Free-text notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Local modification time in milliseconds since the epoch.
    #[serde(default)]
    pub last_modified: i64,
    /// ISO-8601 time of the last write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Subscription {
    /// Builds a subscription with the given id from its user-supplied fields.
    ///
    /// Timestamps are left unset; call [`Subscription::touch`] before storing.
    #[must_use]
    pub fn from_new(id: impl Into<String>, new: NewSubscription) -> Self {
        Self {
            id: id.into(),
            name: new.name,
            plan: new.plan,
            price: new.price,
            currency: new.currency,
            billing_cycle: new.billing_cycle,
            start_date: new.start_date,
            renewal_date: new.renewal_date,
            payment_method: new.payment_method,
            account_email: new.account_email,
            category: new.category,
            status: new.status,
            cancellation_info: new.cancellation_info,
            notes: new.notes,
            last_modified: 0,
            updated_at: None,
        }
    }

    /// Decodes a subscription from an operation payload and the entity id.
    ///
    /// Payloads never carry the id themselves.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not an object or misses required
    /// fields.
    pub fn from_payload(id: &str, payload: &Value) -> ProtocolResult<Self> {
        let mut object = payload
            .as_object()
            .cloned()
            .ok_or_else(|| ProtocolError::invalid_payload("subscription payload must be an object"))?;
        object.insert("id".to_string(), Value::String(id.to_string()));
        Ok(serde_json::from_value(Value::Object(object))?)
    }

    /// Encodes every field except `id` as a JSON object.
    ///
    /// This is the payload carried by CREATE operations and by the UPDATE
    /// that pushes a local version after a conflict.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_payload(&self) -> ProtocolResult<Value> {
        let mut value = serde_json::to_value(self)?;
        if let Some(object) = value.as_object_mut() {
            object.remove("id");
        }
        Ok(value)
    }

    /// Stamps `last_modified` and `updated_at` from the same instant.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_modified = now.timestamp_millis();
        self.updated_at = Some(format_timestamp(now));
    }

    /// Returns `updated_at` in milliseconds since the epoch.
    ///
    /// A missing or unparseable timestamp is treated as the epoch, so such a
    /// version always loses a last-write-wins comparison.
    #[must_use]
    pub fn updated_at_millis(&self) -> i64 {
        self.updated_at.as_deref().map_or(0, parse_timestamp_millis)
    }

    /// Applies every field present in `patch`.
    pub fn apply_patch(&mut self, patch: &SubscriptionPatch) {
        fn set<T: Clone>(target: &mut T, value: &Option<T>) {
            if let Some(value) = value {
                *target = value.clone();
            }
        }
        fn set_opt<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                target.clone_from(value);
            }
        }

        set(&mut self.name, &patch.name);
        set_opt(&mut self.plan, &patch.plan);
        set(&mut self.price, &patch.price);
        set(&mut self.currency, &patch.currency);
        set(&mut self.billing_cycle, &patch.billing_cycle);
        set(&mut self.start_date, &patch.start_date);
        set(&mut self.renewal_date, &patch.renewal_date);
        set_opt(&mut self.payment_method, &patch.payment_method);
        set_opt(&mut self.account_email, &patch.account_email);
        set_opt(&mut self.category, &patch.category);
        set(&mut self.status, &patch.status);
        set_opt(&mut self.cancellation_info, &patch.cancellation_info);
        set_opt(&mut self.notes, &patch.notes);
    }

    /// Returns true if the subscription is currently billed.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == STATUS_ACTIVE
    }

    /// Returns the price normalised to one month.
    ///
    /// Cycles are matched case-insensitively: yearly/annual divide by 12,
    /// quarterly by 3, weekly multiplies by 4.33 and daily by 30.44. Any other
    /// cycle is taken as monthly.
    #[must_use]
    pub fn monthly_cost(&self) -> f64 {
        match self.billing_cycle.to_ascii_lowercase().as_str() {
            "yearly" | "annual" => self.price / 12.0,
            "quarterly" => self.price / 3.0,
            "weekly" => self.price * 4.33,
            "daily" => self.price * 30.44,
            _ => self.price,
        }
    }

    /// Parses the date part of `renewal_date`.
    #[must_use]
    pub fn renewal_day(&self) -> Option<NaiveDate> {
        let date = self.renewal_date.get(..10)?;
        NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
    }

    /// Returns true if both versions agree on every user-editable field.
    ///
    /// `last_modified` and `updated_at` are ignored.
    #[must_use]
    pub fn same_fields(&self, other: &Self) -> bool {
        let mut other = other.clone();
        other.last_modified = self.last_modified;
        other.updated_at.clone_from(&self.updated_at);
        *self == other
    }
}

/// User-supplied fields of a subscription that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSubscription {
    /// Display name.
    pub name: String,
    /// Plan or tier name.
    #[serde(default)]
    pub plan: Option<String>,
    /// Price per billing cycle.
    pub price: f64,
    /// ISO currency code.
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Billing cycle.
    pub billing_cycle: String,
    /// Start date.
    pub start_date: String,
    /// Next renewal date.
    pub renewal_date: String,
    /// Payment method description.
    #[serde(default)]
    pub payment_method: Option<String>,
    /// Account the subscription is registered under.
    #[serde(default)]
    pub account_email: Option<String>,
    /// Free-form category.
    #[serde(default)]
    pub category: Option<String>,
    /// Lifecycle status.
    #[serde(default = "default_status")]
    pub status: String,
    /// How to cancel.
    #[serde(default)]
    pub cancellation_info: Option<String>,
    /// Free-text notes.
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewSubscription {
    /// Creates an active subscription in the default currency.
    pub fn new(
        name: impl Into<String>,
        price: f64,
        billing_cycle: impl Into<String>,
        start_date: impl Into<String>,
        renewal_date: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            plan: None,
            price,
            currency: default_currency(),
            billing_cycle: billing_cycle.into(),
            start_date: start_date.into(),
            renewal_date: renewal_date.into(),
            payment_method: None,
            account_email: None,
            category: None,
            status: default_status(),
            cancellation_info: None,
            notes: None,
        }
    }

    /// Sets the plan name.
    #[must_use]
    pub fn with_plan(mut self, plan: impl Into<String>) -> Self {
        self.plan = Some(plan.into());
        self
    }

    /// Sets the currency.
    #[must_use]
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    /// Sets the category.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Sets the status.
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    /// Sets the payment method.
    #[must_use]
    pub fn with_payment_method(mut self, method: impl Into<String>) -> Self {
        self.payment_method = Some(method.into());
        self
    }

    /// Sets the account email.
    #[must_use]
    pub fn with_account_email(mut self, email: impl Into<String>) -> Self {
        self.account_email = Some(email.into());
        self
    }

    /// Sets the notes.
    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// A partial update of the user-editable subscription fields.
///
/// `None` means "leave unchanged"; a patch cannot clear an optional field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct SubscriptionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_cycle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renewal_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancellation_info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl SubscriptionPatch {
    /// Returns true if the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Decodes a patch from an UPDATE payload.
    ///
    /// Unknown keys such as `lastModified` or `updatedAt` are ignored, so a
    /// full subscription payload is also a valid patch.
    ///
    /// # Errors
    ///
    /// Returns an error if a known field has the wrong type.
    pub fn from_payload(payload: &Value) -> ProtocolResult<Self> {
        Ok(serde_json::from_value(payload.clone())?)
    }

    /// Encodes the fields that are set as a JSON object.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_payload(&self) -> ProtocolResult<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Formats an instant the way `updated_at` stores it.
#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parses an ISO-8601 timestamp into milliseconds since the epoch.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` (taken as UTC) and bare dates.
/// Anything else yields 0.
#[must_use]
pub fn parse_timestamp_millis(text: &str) -> i64 {
    let text = text.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return at.timestamp_millis();
    }
    if let Ok(at) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return at.and_utc().timestamp_millis();
    }
    if let Ok(day) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return day
            .and_hms_opt(0, 0, 0)
            .map_or(0, |at| at.and_utc().timestamp_millis());
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn netflix() -> Subscription {
        Subscription::from_new(
            "sub-1",
            NewSubscription::new("Netflix", 15.49, "monthly", "2024-01-01", "2024-02-01")
                .with_plan("Standard"),
        )
    }

    #[test]
    fn json_uses_camel_case() {
        let mut sub = netflix();
        sub.account_email = Some("me@example.com".into());
        let value = serde_json::to_value(&sub).unwrap();

        assert_eq!(value["billingCycle"], "monthly");
        assert_eq!(value["accountEmail"], "me@example.com");
        assert_eq!(value["lastModified"], 0);
        assert!(value.get("updatedAt").is_none());
        assert!(value.get("notes").is_none());
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let sub: Subscription = serde_json::from_value(json!({
            "id": "x",
            "name": "Spotify",
            "price": 9.99,
            "billingCycle": "monthly",
            "startDate": "2024-01-01",
            "renewalDate": "2024-02-01"
        }))
        .unwrap();

        assert_eq!(sub.currency, "USD");
        assert_eq!(sub.status, "active");
        assert_eq!(sub.last_modified, 0);
        assert_eq!(sub.updated_at, None);
    }

    #[test]
    fn payload_omits_id_and_restores_it() {
        let sub = netflix();
        let payload = sub.to_payload().unwrap();
        assert!(payload.get("id").is_none());

        let decoded = Subscription::from_payload("sub-1", &payload).unwrap();
        assert_eq!(decoded, sub);
    }

    #[test]
    fn from_payload_rejects_non_object() {
        let result = Subscription::from_payload("x", &json!([1, 2]));
        assert!(matches!(result, Err(ProtocolError::InvalidPayload(_))));
    }

    #[test]
    fn touch_sets_both_timestamps() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let mut sub = netflix();
        sub.touch(now);

        assert_eq!(sub.last_modified, now.timestamp_millis());
        assert_eq!(sub.updated_at.as_deref(), Some("2024-03-01T12:00:00.000Z"));
        assert_eq!(sub.updated_at_millis(), now.timestamp_millis());
    }

    #[test]
    fn timestamp_parsing() {
        let jan = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap().timestamp_millis();
        assert_eq!(parse_timestamp_millis("2024-01-01T00:00:00Z"), jan);
        assert_eq!(parse_timestamp_millis("2024-01-01T01:00:00+01:00"), jan);
        assert_eq!(parse_timestamp_millis("2024-01-01 00:00:00"), jan);
        assert_eq!(parse_timestamp_millis("2024-01-01"), jan);
        assert_eq!(parse_timestamp_millis("yesterday"), 0);
        assert_eq!(parse_timestamp_millis(""), 0);
    }

    #[test]
    fn missing_updated_at_is_epoch() {
        let sub = netflix();
        assert_eq!(sub.updated_at_millis(), 0);
    }

    #[test]
    fn patch_applies_only_set_fields() {
        let mut sub = netflix();
        let patch = SubscriptionPatch {
            price: Some(17.99),
            notes: Some("price increase".into()),
            ..SubscriptionPatch::default()
        };
        sub.apply_patch(&patch);

        assert_eq!(sub.price, 17.99);
        assert_eq!(sub.notes.as_deref(), Some("price increase"));
        assert_eq!(sub.name, "Netflix");
        assert_eq!(sub.plan.as_deref(), Some("Standard"));
    }

    #[test]
    fn patch_payload_skips_unset_fields() {
        let patch = SubscriptionPatch {
            billing_cycle: Some("yearly".into()),
            ..SubscriptionPatch::default()
        };
        assert_eq!(patch.to_payload().unwrap(), json!({"billingCycle": "yearly"}));
        assert!(SubscriptionPatch::default().is_empty());
        assert!(!patch.is_empty());
    }

    #[test]
    fn full_payload_is_a_patch() {
        let mut source = netflix();
        source.name = "Netflix Premium".into();
        source.price = 22.99;
        let patch = SubscriptionPatch::from_payload(&source.to_payload().unwrap()).unwrap();

        let mut target = netflix();
        target.apply_patch(&patch);
        assert_eq!(target.name, "Netflix Premium");
        assert_eq!(target.price, 22.99);
    }

    #[test]
    fn monthly_cost_normalises_cycles() {
        let mut sub = netflix();
        sub.price = 120.0;

        sub.billing_cycle = "Yearly".into();
        assert!((sub.monthly_cost() - 10.0).abs() < 1e-9);
        sub.billing_cycle = "annual".into();
        assert!((sub.monthly_cost() - 10.0).abs() < 1e-9);
        sub.billing_cycle = "quarterly".into();
        assert!((sub.monthly_cost() - 40.0).abs() < 1e-9);

        sub.price = 10.0;
        sub.billing_cycle = "weekly".into();
        assert!((sub.monthly_cost() - 43.3).abs() < 1e-9);
        sub.billing_cycle = "daily".into();
        assert!((sub.monthly_cost() - 304.4).abs() < 1e-9);
        sub.billing_cycle = "monthly".into();
        assert!((sub.monthly_cost() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn renewal_day_parses_date_prefix() {
        let mut sub = netflix();
        assert_eq!(sub.renewal_day(), NaiveDate::from_ymd_opt(2024, 2, 1));

        sub.renewal_date = "2024-02-01T00:00:00Z".into();
        assert_eq!(sub.renewal_day(), NaiveDate::from_ymd_opt(2024, 2, 1));

        sub.renewal_date = "soon".into();
        assert_eq!(sub.renewal_day(), None);
    }

    #[test]
    fn same_fields_ignores_timestamps() {
        let a = netflix();
        let mut b = a.clone();
        b.touch(Utc::now());
        assert!(a.same_fields(&b));

        b.price = 1.0;
        assert!(!a.same_fields(&b));
    }
}
