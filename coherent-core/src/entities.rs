//! Record types cached and persisted by the consistency layer

use crate::CustomerId;
use serde::{Deserialize, Serialize};

/// A customer record.
///
/// Records are value types from the cache's point of view: equality is by
/// content, identity is `id`. A record without an `id` has not been saved
/// yet; every strategy assigns one on `save`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Customer {
    pub id: Option<CustomerId>,
    pub first_name: String,
    pub last_name: String,
    /// Exact-match field 2.
    pub gender: Option<String>,
    /// Numeric field used by range queries.
    pub age: u32,
    pub contact_no: Option<String>,
    /// Exact-match field 1.
    pub email_id: Option<String>,
}

impl Customer {
    /// Create an unsaved customer with the required attributes.
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>, age: u32) -> Self {
        Self {
            id: None,
            first_name: first_name.into(),
            last_name: last_name.into(),
            gender: None,
            age,
            contact_no: None,
            email_id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<CustomerId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email_id = Some(email.into());
        self
    }

    pub fn with_gender(mut self, gender: impl Into<String>) -> Self {
        self.gender = Some(gender.into());
        self
    }

    pub fn with_contact_no(mut self, contact_no: impl Into<String>) -> Self {
        self.contact_no = Some(contact_no.into());
        self
    }

    /// Return the identity, minting one first if the record has none.
    pub fn ensure_id(&mut self) -> CustomerId {
        self.id.get_or_insert_with(CustomerId::generate).clone()
    }

    /// Merge a partial update onto this record.
    ///
    /// Each field present in the patch overwrites the current value; absent
    /// fields leave the current value untouched. The identity never changes.
    pub fn apply_patch(&mut self, patch: &CustomerPatch) {
        if let Some(first_name) = &patch.first_name {
            self.first_name = first_name.clone();
        }
        if let Some(last_name) = &patch.last_name {
            self.last_name = last_name.clone();
        }
        if let Some(gender) = &patch.gender {
            self.gender = Some(gender.clone());
        }
        if let Some(age) = patch.age {
            self.age = age;
        }
        if let Some(contact_no) = &patch.contact_no {
            self.contact_no = Some(contact_no.clone());
        }
        if let Some(email_id) = &patch.email_id {
            self.email_id = Some(email_id.clone());
        }
    }

    /// Consume the record and return a patched copy.
    pub fn patched(mut self, patch: &CustomerPatch) -> Self {
        self.apply_patch(patch);
        self
    }
}

/// Partial update payload for customers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub age: Option<u32>,
    pub contact_no: Option<String>,
    pub email_id: Option<String>,
}

impl CustomerPatch {
    /// True when the patch carries no field at all.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> Customer {
        Customer::new("Ada", "Lovelace", 36)
            .with_id("c-1")
            .with_email("ada@example.com")
            .with_gender("F")
    }

    #[test]
    fn test_patch_overwrites_only_present_fields() {
        let patch = CustomerPatch {
            age: Some(37),
            contact_no: Some("555-0100".to_string()),
            ..Default::default()
        };
        let patched = sample().patched(&patch);

        assert_eq!(patched.age, 37);
        assert_eq!(patched.contact_no.as_deref(), Some("555-0100"));
        assert_eq!(patched.first_name, "Ada");
        assert_eq!(patched.email_id.as_deref(), Some("ada@example.com"));
        assert_eq!(patched.id, Some(CustomerId::new("c-1")));
    }

    #[test]
    fn test_ensure_id_keeps_existing_identity() {
        let mut customer = sample();
        assert_eq!(customer.ensure_id(), CustomerId::new("c-1"));

        let mut fresh = Customer::new("Alan", "Turing", 41);
        let minted = fresh.ensure_id();
        assert_eq!(fresh.id, Some(minted.clone()));
        assert_eq!(fresh.ensure_id(), minted);
    }

    #[test]
    fn test_empty_patch_detection() {
        assert!(CustomerPatch::default().is_empty());
        assert!(!CustomerPatch {
            gender: Some("M".to_string()),
            ..Default::default()
        }
        .is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// An empty patch leaves any record unchanged.
        #[test]
        fn prop_empty_patch_is_identity(
            age in 0u32..120,
            first in "[A-Za-z]{1,12}",
            email in proptest::option::of("[a-z]{1,8}@x\\.com"),
        ) {
            let mut customer = Customer::new(first, "Doe", age);
            customer.email_id = email;
            let patched = customer.clone().patched(&CustomerPatch::default());
            prop_assert_eq!(patched, customer);
        }

        /// Applying the same patch twice equals applying it once.
        #[test]
        fn prop_patch_is_idempotent(age in 0u32..120, new_age in 0u32..120) {
            let patch = CustomerPatch { age: Some(new_age), ..Default::default() };
            let once = Customer::new("A", "B", age).patched(&patch);
            let twice = once.clone().patched(&patch);
            prop_assert_eq!(once, twice);
        }
    }
}
