//! # Naming Contract Tests
//!
//! The GitOps engine and other controllers find the generated objects by name and label,
//! so these values are pinned here.

use environment_controller::constants::{
    MANAGED_ENVIRONMENT_SECRET_LABEL, MANAGED_ENVIRONMENT_SECRET_TYPE, OPAQUE_SECRET_TYPE,
};
use environment_controller::crd::{managed_environment_name, managed_environment_secret_name};

#[test]
fn test_managed_environment_name() {
    assert_eq!(managed_environment_name("prod"), "managed-environment-prod");
    assert_eq!(
        managed_environment_name("team-a-staging"),
        "managed-environment-team-a-staging"
    );
}

#[test]
fn test_managed_environment_secret_name() {
    assert_eq!(
        managed_environment_secret_name("prod"),
        "managed-environment-secret-prod"
    );
}

#[test]
fn test_secret_label_and_types() {
    assert_eq!(
        MANAGED_ENVIRONMENT_SECRET_LABEL,
        "appstudio.openshift.io/environment-secret"
    );
    assert_eq!(
        MANAGED_ENVIRONMENT_SECRET_TYPE,
        "managed-gitops.redhat.com/managed-environment"
    );
    assert_eq!(OPAQUE_SECRET_TYPE, "Opaque");
}
