//! Error types for consistency-layer operations

use crate::CustomerId;
use thiserror::Error;

/// Durable store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Customer not found: {id}")]
    NotFound { id: CustomerId },

    #[error("Store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Cache backend errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Cache serialization failed: {reason}")]
    Serialization { reason: String },
}

/// Validation errors for query criteria and requests.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Filter criteria specify no recognized field")]
    EmptyCriteria,

    #[error("Inverted range: min {min} is greater than max {max}")]
    InvertedRange { min: u32, max: u32 },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all consistency-layer errors.
#[derive(Debug, Clone, Error)]
pub enum CoherentError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl CoherentError {
    pub fn not_found(id: impl Into<CustomerId>) -> Self {
        StorageError::NotFound { id: id.into() }.into()
    }

    pub fn store_unavailable(reason: impl Into<String>) -> Self {
        StorageError::Unavailable {
            reason: reason.into(),
        }
        .into()
    }

    pub fn cache_unavailable(reason: impl Into<String>) -> Self {
        CacheError::Unavailable {
            reason: reason.into(),
        }
        .into()
    }

    /// Target record absent from both cache and store.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Storage(StorageError::NotFound { .. }))
    }

    /// Store I/O failed.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Storage(StorageError::Unavailable { .. } | StorageError::LockPoisoned)
        )
    }

    /// Cache backend I/O failed.
    pub fn is_cache_unavailable(&self) -> bool {
        matches!(self, Self::Cache(_))
    }

    /// Query criteria were rejected.
    pub fn is_invalid_criteria(&self) -> bool {
        matches!(
            self,
            Self::Validation(ValidationError::EmptyCriteria | ValidationError::InvertedRange { .. })
        )
    }
}

/// Result type alias for consistency-layer operations.
pub type CoherentResult<T> = Result<T, CoherentError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display_not_found() {
        let err = StorageError::NotFound {
            id: CustomerId::new("c-42"),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("not found"));
        assert!(msg.contains("c-42"));
    }

    #[test]
    fn test_validation_error_display_inverted_range() {
        let msg = format!("{}", ValidationError::InvertedRange { min: 40, max: 20 });
        assert!(msg.contains("40"));
        assert!(msg.contains("20"));
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "cache_address".to_string(),
            value: "bad".to_string(),
            reason: "must be a redis:// url".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("cache_address"));
        assert!(msg.contains("bad"));
        assert!(msg.contains("redis://"));
    }

    #[test]
    fn test_category_predicates() {
        assert!(CoherentError::not_found("x").is_not_found());
        assert!(CoherentError::store_unavailable("down").is_store_unavailable());
        assert!(CoherentError::from(StorageError::LockPoisoned).is_store_unavailable());
        assert!(CoherentError::cache_unavailable("down").is_cache_unavailable());
        assert!(CoherentError::from(ValidationError::EmptyCriteria).is_invalid_criteria());

        let invalid_value = CoherentError::from(ValidationError::InvalidValue {
            field: "page_size".to_string(),
            reason: "zero".to_string(),
        });
        assert!(!invalid_value.is_invalid_criteria());
        assert!(!invalid_value.is_not_found());
    }

    #[test]
    fn test_coherent_error_from_variants() {
        let storage = CoherentError::from(StorageError::LockPoisoned);
        assert!(matches!(storage, CoherentError::Storage(_)));

        let cache = CoherentError::from(CacheError::Serialization {
            reason: "eof".to_string(),
        });
        assert!(matches!(cache, CoherentError::Cache(_)));

        let config = CoherentError::from(ConfigError::MissingRequired {
            field: "strategy".to_string(),
        });
        assert!(matches!(config, CoherentError::Config(_)));
    }
}
