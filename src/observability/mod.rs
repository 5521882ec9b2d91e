//! # Observability
//!
//! - `metrics`: Prometheus metrics collection
//! - `audit`: Audit events for changes to controller-owned resources

pub mod audit;
pub mod metrics;

// Re-export for convenience
pub use audit::{log_resource_change, ResourceChange};
