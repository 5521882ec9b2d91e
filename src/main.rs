//! # Environment Controller
//!
//! A Kubernetes controller that turns `Environment` resources into the
//! `GitOpsDeploymentManagedEnvironment` resources a GitOps engine uses to reach a cluster.
//!
//! ## Overview
//!
//! For every Environment the controller:
//!
//! 1. **Resolves credentials** - from a bound `DeploymentTargetClaim`/`DeploymentTarget` pair,
//!    or from the Environment's inline configuration
//! 2. **Mirrors secrets** - copies claim-provided credential secrets into a secret the
//!    Environment owns
//! 3. **Maintains the ManagedEnvironment** - creates it, keeps its spec in sync, and deletes it
//!    when the Environment goes away
//! 4. **Reports errors** - through the Environment's `ErrorOccurred` status condition
//!
//! Settings are read from environment variables (see `ControllerConfig`); command-line flags
//! override them.

use anyhow::Result;
use clap::Parser;
use environment_controller::config::{ControllerConfig, LogFormat};
use environment_controller::runtime::{initialize, run_watch_loop};

/// Environment controller
#[derive(Debug, Parser)]
#[command(name = "environment-controller", version, about, long_about = None)]
struct Args {
    /// Port of the metrics and probe server
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Only watch this namespace
    #[arg(long)]
    watch_namespace: Option<String>,

    /// Maximum number of Environments reconciled at the same time
    #[arg(long)]
    max_concurrent_reconciliations: Option<u16>,

    /// First backoff step after a failed reconciliation, in seconds
    #[arg(long)]
    backoff_min_secs: Option<u64>,

    /// Maximum backoff after repeated failures, in seconds
    #[arg(long)]
    backoff_max_secs: Option<u64>,

    /// Log output format: text or json
    #[arg(long)]
    log_format: Option<LogFormat>,
}

impl Args {
    fn apply(self, config: &mut ControllerConfig) {
        if let Some(port) = self.metrics_port {
            config.metrics_port = port;
        }
        if let Some(namespace) = self.watch_namespace.filter(|ns| !ns.trim().is_empty()) {
            config.watch_namespace = Some(namespace);
        }
        if let Some(concurrency) = self.max_concurrent_reconciliations {
            config.max_concurrent_reconciliations = concurrency;
        }
        if let Some(min) = self.backoff_min_secs {
            config.backoff_min_secs = min;
        }
        if let Some(max) = self.backoff_max_secs {
            config.backoff_max_secs = max;
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut config = ControllerConfig::from_env();
    Args::parse().apply(&mut config);

    let init = initialize(&config).await?;

    run_watch_loop(
        init.client,
        init.reconciler,
        init.index,
        init.server_state,
        &config,
    )
    .await
}
