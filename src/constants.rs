//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! Naming constants are part of the contract with the GitOps engine and must not change.
//! The remaining values are defaults that can be overridden via configuration.

/// Prefix of the `GitOpsDeploymentManagedEnvironment` generated for an Environment
pub const MANAGED_ENVIRONMENT_PREFIX: &str = "managed-environment-";

/// Prefix of the Secret mirrored from a DeploymentTarget's credentials
pub const MANAGED_ENVIRONMENT_SECRET_PREFIX: &str = "managed-environment-secret-";

/// Label carried by mirrored secrets, value is the owning Environment's name
pub const MANAGED_ENVIRONMENT_SECRET_LABEL: &str = "appstudio.openshift.io/environment-secret";

/// Secret type of credentials that are already in the form the GitOps engine consumes
pub const MANAGED_ENVIRONMENT_SECRET_TYPE: &str = "managed-gitops.redhat.com/managed-environment";

/// API group older controller releases wrote into the Environment owner reference of a
/// ManagedEnvironment
pub const LEGACY_ENVIRONMENT_OWNER_GROUP: &str = "managed-gitops.redhat.com";

/// Secret type for plain user secrets
pub const OPAQUE_SECRET_TYPE: &str = "Opaque";

/// Condition type used for the single rolling error condition on an Environment
pub const CONDITION_ERROR_OCCURRED: &str = "ErrorOccurred";

/// Reason set while the error condition is raised
pub const REASON_ERROR_OCCURRED: &str = "ErrorOccurred";

/// Suffix appended to the reason once an error has been resolved
pub const RESOLVED_SUFFIX: &str = "Resolved";

/// Field manager used for status patches
pub const FIELD_MANAGER: &str = "environment-controller";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default maximum number of concurrent reconciliations
pub const DEFAULT_MAX_CONCURRENT_RECONCILIATIONS: u16 = 10;

/// Default minimum backoff after a failed reconciliation (seconds)
pub const DEFAULT_BACKOFF_MIN_SECS: u64 = 5;

/// Default maximum backoff after repeated failed reconciliations (seconds)
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 300;

/// Default delay before restarting the controller after its stream ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Default tracing filter when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "environment_controller=info";

/// Initial delay when the API server throttles the watch (milliseconds)
pub const WATCH_THROTTLE_BACKOFF_START_MS: u64 = 500;

/// Cap of the throttling delay (milliseconds)
pub const WATCH_THROTTLE_BACKOFF_MAX_MS: u64 = 30_000;
