//! Service-level error types

use coherent_core::CoherentError;
use thiserror::Error;

/// Errors raised while bootstrapping or tearing down the runtime.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Core(#[from] CoherentError),

    #[error("Telemetry initialization failed: {0}")]
    Telemetry(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl ServiceError {
    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }

    pub fn task(message: impl Into<String>) -> Self {
        Self::Task(message.into())
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
