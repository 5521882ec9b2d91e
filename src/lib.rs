//! Environment Controller Library
//!
//! Core functionality of the Environment controller. Tests live next to the code they
//! cover, with CRD and entity store integration tests under `tests/`.
//!
//! - `config`: controller settings loaded from the environment
//! - `constants`: naming contract and defaults
//! - `controller`: reconciler, event mappers, backoff and the probe server
//! - `crd`: Environment, DeploymentTargetClaim, DeploymentTarget and ManagedEnvironment types
//! - `observability`: metrics and audit logging
//! - `runtime`: initialization and the watch loop
//! - `store`: entity store for cluster and repository credentials

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod runtime;
pub mod store;
