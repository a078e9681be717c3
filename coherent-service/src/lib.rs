//! Coherent Service
//!
//! Process-level wiring for the consistency layer: builds the configured
//! strategy once, schedules the write-back flush, and sets up logging.

pub mod error;
pub mod runtime;
pub mod telemetry;

pub use error::{ServiceError, ServiceResult};
pub use runtime::CacheRuntime;
pub use telemetry::{init_tracing, TelemetryConfig, DEFAULT_LOG_FILTER};
