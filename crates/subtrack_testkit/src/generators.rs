//! Property-based test generators using proptest.
//!
//! Strategies produce valid subscriptions, patches and sequences of local
//! mutations.

use proptest::prelude::*;
use subtrack_sync_protocol::{NewSubscription, SubscriptionPatch};

/// Strategy for display names.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z][a-z]{2,12}").expect("Invalid regex")
}

/// Strategy for prices with two decimals.
pub fn price_strategy() -> impl Strategy<Value = f64> {
    (0u32..50_000).prop_map(|cents| f64::from(cents) / 100.0)
}

/// Strategy for billing cycles.
pub fn billing_cycle_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["monthly", "yearly", "quarterly", "weekly"])
        .prop_map(str::to_string)
}

/// Strategy for `YYYY-MM-DD` dates.
pub fn date_strategy() -> impl Strategy<Value = String> {
    (2023u32..2027, 1u32..=12, 1u32..=28)
        .prop_map(|(year, month, day)| format!("{year:04}-{month:02}-{day:02}"))
}

/// Strategy for subscription statuses.
pub fn status_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["active", "paused", "cancelled"]).prop_map(str::to_string)
}

/// Strategy for new subscriptions.
pub fn new_subscription_strategy() -> impl Strategy<Value = NewSubscription> {
    (
        name_strategy(),
        price_strategy(),
        billing_cycle_strategy(),
        date_strategy(),
        date_strategy(),
        prop::option::of(name_strategy()),
        prop::option::of(status_strategy()),
    )
        .prop_map(|(name, price, cycle, start, renewal, plan, status)| {
            let mut new = NewSubscription::new(name, price, cycle, start, renewal);
            if let Some(plan) = plan {
                new = new.with_plan(plan);
            }
            if let Some(status) = status {
                new = new.with_status(status);
            }
            new
        })
}

/// Strategy for patches. May be empty.
pub fn patch_strategy() -> impl Strategy<Value = SubscriptionPatch> {
    (
        prop::option::of(name_strategy()),
        prop::option::of(price_strategy()),
        prop::option::of(date_strategy()),
        prop::option::of(status_strategy()),
        prop::option::of("[a-z ]{0,20}"),
    )
        .prop_map(|(name, price, renewal_date, status, notes)| SubscriptionPatch {
            name,
            price,
            renewal_date,
            status,
            notes,
            ..Default::default()
        })
}

/// A local mutation made through the subscription service.
///
/// `Update` and `Delete` pick their target by index into the live rows,
/// modulo the number of rows; with no rows they do nothing.
#[derive(Debug, Clone)]
pub enum Mutation {
    /// Add a subscription.
    Add(NewSubscription),
    /// Patch a live subscription.
    Update(usize, SubscriptionPatch),
    /// Delete a live subscription.
    Delete(usize),
}

/// Strategy for single mutations.
pub fn mutation_strategy() -> impl Strategy<Value = Mutation> {
    prop_oneof![
        3 => new_subscription_strategy().prop_map(Mutation::Add),
        2 => (any::<usize>(), patch_strategy()).prop_map(|(i, p)| Mutation::Update(i, p)),
        1 => any::<usize>().prop_map(Mutation::Delete),
    ]
}

/// Strategy for a sequence of mutations.
pub fn mutation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<Mutation>> {
    prop::collection::vec(mutation_strategy(), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
