//! Encoding of cached values.
//!
//! Records travel through the cache as JSON strings. The encoded string of a
//! record is also its identity as a dirty-set member, so encoding must be
//! deterministic for a given record value.

use coherent_core::constants::RECORD_KEY_PREFIX;
use coherent_core::{CacheError, CoherentResult, CustomerId};
use serde::{de::DeserializeOwned, Serialize};

/// Per-record cache key, e.g. `customer:<id>`.
pub fn record_key(id: &CustomerId) -> String {
    format!("{}{}", RECORD_KEY_PREFIX, id)
}

pub(crate) fn encode<T: Serialize>(value: &T) -> CoherentResult<String> {
    serde_json::to_string(value).map_err(|e| {
        CacheError::Serialization {
            reason: e.to_string(),
        }
        .into()
    })
}

pub(crate) fn decode<T: DeserializeOwned>(raw: &str) -> CoherentResult<T> {
    serde_json::from_str(raw).map_err(|e| {
        CacheError::Serialization {
            reason: e.to_string(),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use coherent_core::Customer;

    #[test]
    fn test_record_key_uses_prefix() {
        assert_eq!(record_key(&CustomerId::new("42")), "customer:42");
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let customer = Customer::new("Ada", "Lovelace", 36).with_id("c-1");
        assert_eq!(encode(&customer).unwrap(), encode(&customer.clone()).unwrap());
        let back: Customer = decode(&encode(&customer).unwrap()).unwrap();
        assert_eq!(back, customer);
    }

    #[test]
    fn test_decode_garbage_is_serialization_error() {
        let err = decode::<Customer>("{not json").unwrap_err();
        assert!(matches!(
            err,
            coherent_core::CoherentError::Cache(CacheError::Serialization { .. })
        ));
    }
}
