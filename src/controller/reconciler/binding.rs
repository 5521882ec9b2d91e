//! # Claim/Target Binding
//!
//! A DeploymentTarget satisfies a DeploymentTargetClaim when the claim names the target
//! (`spec.targetName`) or the target points back at the claim (`spec.claimRef`).

use crate::crd::{DeploymentTarget, DeploymentTargetClaim};
use kube::ResourceExt;
use std::borrow::Borrow;

/// How strongly a target is bound to a claim; lower ranks win
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BindingMatch {
    /// Both sides reference each other
    Bidirectional,
    /// Only the claim's `targetName` matches
    TargetName,
    /// Only the target's `claimRef` matches
    ClaimRef,
}

/// Classify the binding between a claim and a target, if any
#[must_use]
pub fn binding_match(claim: &DeploymentTargetClaim, target: &DeploymentTarget) -> Option<BindingMatch> {
    let by_target_name = claim.target_name() == Some(target.name_any().as_str());
    let by_claim_ref = target.claim_ref() == Some(claim.name_any().as_str());
    match (by_target_name, by_claim_ref) {
        (true, true) => Some(BindingMatch::Bidirectional),
        (true, false) => Some(BindingMatch::TargetName),
        (false, true) => Some(BindingMatch::ClaimRef),
        (false, false) => None,
    }
}

/// Pick the target bound to `claim`, preferring a bidirectional match
///
/// Ties keep the first target in iteration order.
pub fn select_target<'a, T>(claim: &DeploymentTargetClaim, targets: &'a [T]) -> Option<&'a T>
where
    T: Borrow<DeploymentTarget>,
{
    targets
        .iter()
        .filter_map(|t| binding_match(claim, t.borrow()).map(|rank| (rank, t)))
        .min_by_key(|(rank, _)| *rank)
        .map(|(_, t)| t)
}
