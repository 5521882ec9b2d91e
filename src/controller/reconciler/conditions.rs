//! # Status Conditions
//!
//! An Environment carries a single rolling `ErrorOccurred` condition. Raising it while an
//! identical condition is present, or resolving it when it is absent or already resolved,
//! writes nothing. This keeps repeated reconciliations from churning the resourceVersion.
//!
//! The Environment passed in is updated in place after a successful write, so later steps
//! of the same reconciliation see the new state.

use crate::constants::{CONDITION_ERROR_OCCURRED, RESOLVED_SUFFIX};
use crate::controller::reconciler::client::{ClientError, EnvironmentClient};
use crate::crd::{Condition, ConditionStatus, Environment};
use crate::observability::metrics;
use kube::ResourceExt;
use tracing::debug;

/// Upsert the `ErrorOccurred` condition as raised with `message` and `reason`
///
/// Returns a copy of the list with the condition raised, or `None` when an identical
/// condition is already present.
#[must_use]
pub fn with_raised(conditions: &[Condition], message: &str, reason: &str, now: &str) -> Option<Vec<Condition>> {
    let desired = Condition {
        r#type: CONDITION_ERROR_OCCURRED.to_string(),
        status: ConditionStatus::True.as_str().to_string(),
        last_transition_time: Some(now.to_string()),
        reason: reason.to_string(),
        message: message.to_string(),
    };

    let mut updated = conditions.to_vec();
    let Some(index) = updated
        .iter()
        .position(|c| c.r#type == CONDITION_ERROR_OCCURRED)
    else {
        updated.push(desired);
        return Some(updated);
    };

    let existing = &mut updated[index];
    if existing.same_as(&desired) {
        return None;
    }
    if existing.status != desired.status {
        existing.last_transition_time = desired.last_transition_time;
    }
    existing.status = desired.status;
    existing.reason = desired.reason;
    existing.message = desired.message;
    Some(updated)
}

/// Mark the `ErrorOccurred` condition as resolved
///
/// Returns `None` when there is no such condition or it already carries `reason` + `Resolved`.
#[must_use]
pub fn with_resolved(conditions: &[Condition], reason: &str, now: &str) -> Option<Vec<Condition>> {
    let resolved_reason = format!("{reason}{RESOLVED_SUFFIX}");

    let mut updated = conditions.to_vec();
    let existing = updated
        .iter_mut()
        .find(|c| c.r#type == CONDITION_ERROR_OCCURRED)?;
    if existing.reason == resolved_reason {
        return None;
    }

    let resolved_status = ConditionStatus::False.as_str();
    if existing.status != resolved_status {
        existing.last_transition_time = Some(now.to_string());
    }
    existing.status = resolved_status.to_string();
    existing.reason = resolved_reason;
    existing.message = String::new();
    Some(updated)
}

/// Raise the error condition on the Environment, persisting it if it changed
///
/// # Errors
///
/// Returns the client error if the status write fails.
pub async fn raise(
    client: &dyn EnvironmentClient,
    env: &mut Environment,
    message: &str,
    reason: &str,
) -> Result<bool, ClientError> {
    let now = chrono::Utc::now().to_rfc3339();
    let Some(conditions) = with_raised(env.conditions(), message, reason, &now) else {
        debug!(condition.message = message, "error condition already raised");
        return Ok(false);
    };
    persist(client, env, conditions, "raise").await?;
    Ok(true)
}

/// Resolve the error condition on the Environment, persisting it if it changed
///
/// # Errors
///
/// Returns the client error if the status write fails.
pub async fn resolve(
    client: &dyn EnvironmentClient,
    env: &mut Environment,
    reason: &str,
) -> Result<bool, ClientError> {
    let now = chrono::Utc::now().to_rfc3339();
    let Some(conditions) = with_resolved(env.conditions(), reason, &now) else {
        return Ok(false);
    };
    persist(client, env, conditions, "resolve").await?;
    Ok(true)
}

async fn persist(
    client: &dyn EnvironmentClient,
    env: &mut Environment,
    conditions: Vec<Condition>,
    transition: &str,
) -> Result<(), ClientError> {
    let namespace = env.namespace().unwrap_or_default();
    let name = env.name_any();
    client
        .patch_environment_conditions(&namespace, &name, &conditions)
        .await?;
    metrics::increment_condition_writes(transition);
    env.status.get_or_insert_with(Default::default).conditions = conditions;
    Ok(())
}
