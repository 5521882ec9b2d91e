//! # Audit Log
//!
//! Every create, update or delete the controller performs on a resource it owns is recorded
//! as an INFO event on the `audit` target, so operators can filter them with
//! `RUST_LOG=audit=info`.

use crate::observability::metrics;
use std::fmt;
use tracing::info;

/// Kind of change applied to an owned resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceChange {
    Created,
    Modified,
    Deleted,
}

impl ResourceChange {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceChange::Created => "Created",
            ResourceChange::Modified => "Modified",
            ResourceChange::Deleted => "Deleted",
        }
    }
}

impl fmt::Display for ResourceChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record a mutation of a controller-owned resource
pub fn log_resource_change(kind: &str, namespace: &str, name: &str, change: ResourceChange) {
    info!(
        target: "audit",
        {
            resource.kind = kind,
            resource.namespace = namespace,
            resource.name = name,
            change = change.as_str()
        },
        "API resource changed"
    );
    metrics::increment_managed_resource_changes(kind, change.as_str());
}
