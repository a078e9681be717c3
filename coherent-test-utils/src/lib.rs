//! Coherent Test Utilities
//!
//! Shared test infrastructure for the Coherent workspace:
//! - Proptest generators for records, patches and filter criteria
//! - Fixtures that wire the in-memory collaborators for each strategy
//! - Assertions for the error categories callers branch on

// Re-export in-memory collaborators from their source crate
pub use coherent_storage::{InMemoryCacheBackend, InMemoryRecordStore};

// Re-export core types for convenience
pub use coherent_core::{
    CoherentConfig, CoherentError, CoherentResult, Customer, CustomerId, CustomerPatch,
    FilterCriteria, PageRequest, StrategyKind,
};

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating Coherent types.

    use super::*;
    use proptest::prelude::*;

    /// Generate a customer id from a short alphanumeric string.
    pub fn arb_customer_id() -> impl Strategy<Value = CustomerId> {
        "[a-z0-9]{1,12}".prop_map(CustomerId::new)
    }

    pub fn arb_gender() -> impl Strategy<Value = String> {
        prop::sample::select(vec!["F", "M", "X"]).prop_map(String::from)
    }

    pub fn arb_email() -> impl Strategy<Value = String> {
        ("[a-z]{1,8}", "[a-z]{1,6}").prop_map(|(user, host)| format!("{}@{}.com", user, host))
    }

    /// Generate an unsaved customer (no id).
    pub fn arb_customer() -> impl Strategy<Value = Customer> {
        (
            "[A-Z][a-z]{1,10}",
            "[A-Z][a-z]{1,10}",
            0u32..=100,
            prop::option::of(arb_gender()),
            prop::option::of("[0-9]{10}"),
            prop::option::of(arb_email()),
        )
            .prop_map(|(first, last, age, gender, contact_no, email_id)| Customer {
                id: None,
                first_name: first,
                last_name: last,
                gender,
                age,
                contact_no,
                email_id,
            })
    }

    /// Generate a customer that already carries an id.
    pub fn arb_saved_customer() -> impl Strategy<Value = Customer> {
        (arb_customer_id(), arb_customer()).prop_map(|(id, customer)| customer.with_id(id))
    }

    pub fn arb_patch() -> impl Strategy<Value = CustomerPatch> {
        (
            prop::option::of("[A-Z][a-z]{1,10}"),
            prop::option::of("[A-Z][a-z]{1,10}"),
            prop::option::of(arb_gender()),
            prop::option::of(0u32..=100),
            prop::option::of("[0-9]{10}"),
            prop::option::of(arb_email()),
        )
            .prop_map(
                |(first_name, last_name, gender, age, contact_no, email_id)| CustomerPatch {
                    first_name,
                    last_name,
                    gender,
                    age,
                    contact_no,
                    email_id,
                },
            )
    }

    /// Generate a valid inclusive age range `[min, max]`.
    pub fn arb_age_range() -> impl Strategy<Value = (u32, u32)> {
        (0u32..=100).prop_flat_map(|min| (Just(min), min..=100))
    }

    /// Generate criteria that pass validation.
    pub fn arb_filter_criteria() -> impl Strategy<Value = FilterCriteria> {
        prop_oneof![
            (0u32..=100).prop_map(|age| FilterCriteria::new().with_age(age)),
            (0u32..=100).prop_map(|min| FilterCriteria::new().with_min_age(min)),
            (0u32..=100).prop_map(|max| FilterCriteria::new().with_max_age(max)),
            arb_age_range()
                .prop_map(|(min, max)| FilterCriteria::new().with_bounds(Some(min), Some(max))),
            arb_email().prop_map(|email| FilterCriteria::new().with_email(email)),
            arb_gender().prop_map(|gender| FilterCriteria::new().with_gender(gender)),
        ]
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common testing scenarios.

    use super::*;
    use std::sync::Arc;

    /// A small population spread across the age range.
    pub fn sample_customers() -> Vec<Customer> {
        vec![
            Customer::new("Ada", "Lovelace", 18)
                .with_gender("F")
                .with_email("ada@example.com"),
            Customer::new("Alan", "Turing", 22)
                .with_gender("M")
                .with_email("alan@example.com"),
            Customer::new("Grace", "Hopper", 27)
                .with_gender("F")
                .with_email("grace@example.com"),
            Customer::new("Edsger", "Dijkstra", 33)
                .with_gender("M")
                .with_email("edsger@example.com"),
            Customer::new("Barbara", "Liskov", 39)
                .with_gender("F")
                .with_email("barbara@example.com"),
            Customer::new("Donald", "Knuth", 45)
                .with_gender("M")
                .with_email("donald@example.com"),
        ]
    }

    /// Store seeded with [`sample_customers`].
    pub fn seeded_store() -> Arc<InMemoryRecordStore> {
        Arc::new(InMemoryRecordStore::with_records(sample_customers()))
    }

    /// Empty in-memory store and cache.
    pub fn empty_collaborators() -> (Arc<InMemoryRecordStore>, Arc<InMemoryCacheBackend>) {
        (
            Arc::new(InMemoryRecordStore::new()),
            Arc::new(InMemoryCacheBackend::new()),
        )
    }

    /// Default configuration with the given strategy.
    pub fn config_for(strategy: StrategyKind) -> CoherentConfig {
        CoherentConfig::default().with_strategy(strategy)
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for the error categories callers branch on.

    use super::*;

    /// Assert that a CoherentResult is a NotFound error.
    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &CoherentResult<T>) {
        match result {
            Err(e) if e.is_not_found() => {}
            other => panic!("Expected NotFound, got: {:?}", other),
        }
    }

    /// Assert that a CoherentResult is a StoreUnavailable error.
    #[track_caller]
    pub fn assert_store_unavailable<T: std::fmt::Debug>(result: &CoherentResult<T>) {
        match result {
            Err(e) if e.is_store_unavailable() => {}
            other => panic!("Expected StoreUnavailable, got: {:?}", other),
        }
    }

    /// Assert that a CoherentResult is a CacheUnavailable error.
    #[track_caller]
    pub fn assert_cache_unavailable<T: std::fmt::Debug>(result: &CoherentResult<T>) {
        match result {
            Err(e) if e.is_cache_unavailable() => {}
            other => panic!("Expected CacheUnavailable, got: {:?}", other),
        }
    }

    /// Assert that a CoherentResult is an InvalidCriteria error.
    #[track_caller]
    pub fn assert_invalid_criteria<T: std::fmt::Debug>(result: &CoherentResult<T>) {
        match result {
            Err(e) if e.is_invalid_criteria() => {}
            other => panic!("Expected InvalidCriteria, got: {:?}", other),
        }
    }

    /// Assert that every record satisfies the criteria.
    #[track_caller]
    pub fn assert_all_match(criteria: &FilterCriteria, records: &[Customer]) {
        for record in records {
            assert!(
                criteria.matches(record),
                "Record {:?} does not match {:?}",
                record,
                criteria
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::generators::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_generated_criteria_are_valid(criteria in arb_filter_criteria()) {
            prop_assert!(criteria.validate().is_ok());
        }

        #[test]
        fn prop_generated_customers_are_unsaved(customer in arb_customer()) {
            prop_assert!(customer.id.is_none());
            prop_assert!(customer.age <= 100);
        }
    }
}
