//! # Reconciler
//!
//! Core reconciliation logic for `Environment` resources.
//!
//! The reconciler:
//! - Watches `Environment` resources and the kinds they depend on
//! - Resolves cluster credentials from a `DeploymentTargetClaim` or from inline configuration
//! - Mirrors claim-provided credential secrets into a secret owned by the Environment
//! - Creates, updates and deletes the derived `GitOpsDeploymentManagedEnvironment`
//! - Reports user errors through the `ErrorOccurred` status condition
//!
//! ## Reconciliation Flow
//!
//! 1. Skip Environments whose namespace is being deleted
//! 2. Fetch the Environment; if it is gone, delete its ManagedEnvironment
//! 3. Reject Environments that configure both a claim and inline credentials
//! 4. Generate the desired ManagedEnvironment (`desired.rs`)
//! 5. Create the ManagedEnvironment, or update its spec when it drifted

pub mod binding;
pub mod client;
pub mod conditions;
pub mod desired;
pub mod index;
pub mod mappers;
pub mod reconcile;
pub mod types;

#[cfg(test)]
pub mod fake;

// Re-export public API
pub use client::{ClientError, EnvironmentClient, KubeEnvironmentClient};
pub use desired::generate_desired_state;
pub use index::{spawn_reflector, CachedKind, EnvironmentIndex, IndexError, StoreIndex};
pub use reconcile::reconcile;
pub use types::{resource_key, BackoffState, DesiredState, Reconciler, ReconcilerError};
