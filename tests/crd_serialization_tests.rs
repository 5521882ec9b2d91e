//! # CRD Serialization Tests
//!
//! Field names are shared with the GitOps engine and with manifests users write by hand,
//! so they are checked against literal YAML and JSON here.

use environment_controller::crd::{
    render_crds, DeploymentTarget, DeploymentTargetClaim, DeploymentTargetClaimPhase, Environment,
    GitOpsDeploymentManagedEnvironment, GitOpsDeploymentManagedEnvironmentSpec,
};

#[test]
fn test_environment_with_claim() {
    let yaml = r#"
apiVersion: appstudio.redhat.com/v1alpha1
kind: Environment
metadata:
  name: prod
  namespace: team-a
spec:
  displayName: Production
  deploymentStrategy: AppStudioAutomated
  configuration:
    target:
      deploymentTargetClaim:
        claimName: prod-claim
"#;

    let env: Environment = serde_yaml::from_str(yaml).expect("environment should deserialize");
    assert_eq!(env.claim_name(), Some("prod-claim"));
    assert!(env.inline_configuration().is_none());
    assert!(!env.has_conflicting_sources());
    assert_eq!(env.spec.display_name.as_deref(), Some("Production"));
}

#[test]
fn test_environment_with_inline_credentials() {
    let yaml = r#"
apiVersion: appstudio.redhat.com/v1alpha1
kind: Environment
metadata:
  name: staging
  namespace: team-a
spec:
  unstableConfigurationFields:
    clusterType: Kubernetes
    kubernetesCredentials:
      targetNamespace: team-a-staging
      apiURL: https://api.staging.example.com:6443
      clusterCredentialsSecret: staging-credentials
      allowInsecureSkipTLSVerify: true
      namespaces:
        - team-a-staging
        - team-a-tools
      clusterResources: true
"#;

    let env: Environment = serde_yaml::from_str(yaml).expect("environment should deserialize");
    assert!(env.claim_name().is_none());

    let inline = env.inline_configuration().expect("inline credentials");
    assert_eq!(inline.api_url, "https://api.staging.example.com:6443");
    assert_eq!(inline.cluster_credentials_secret, "staging-credentials");
    assert!(inline.allow_insecure_skip_tls_verify);
    assert_eq!(inline.namespaces, vec!["team-a-staging", "team-a-tools"]);
    assert!(inline.cluster_resources);
}

#[test]
fn test_environment_with_both_sources_is_conflicting() {
    let yaml = r#"
apiVersion: appstudio.redhat.com/v1alpha1
kind: Environment
metadata:
  name: confused
  namespace: team-a
spec:
  configuration:
    target:
      deploymentTargetClaim:
        claimName: some-claim
  unstableConfigurationFields:
    kubernetesCredentials:
      apiURL: https://api.example.com:6443
      clusterCredentialsSecret: creds
"#;

    let env: Environment = serde_yaml::from_str(yaml).expect("environment should deserialize");
    assert!(env.has_conflicting_sources());
}

#[test]
fn test_empty_claim_name_is_ignored() {
    let yaml = r#"
apiVersion: appstudio.redhat.com/v1alpha1
kind: Environment
metadata:
  name: blank
  namespace: team-a
spec:
  configuration:
    target:
      deploymentTargetClaim:
        claimName: ""
"#;

    let env: Environment = serde_yaml::from_str(yaml).expect("environment should deserialize");
    assert!(env.claim_name().is_none());
    assert!(!env.has_conflicting_sources());
}

#[test]
fn test_environment_status_conditions() {
    let json = serde_json::json!({
        "apiVersion": "appstudio.redhat.com/v1alpha1",
        "kind": "Environment",
        "metadata": { "name": "prod", "namespace": "team-a" },
        "spec": {},
        "status": {
            "conditions": [{
                "type": "ErrorOccurred",
                "status": "True",
                "reason": "ErrorOccurred",
                "message": "boom",
                "lastTransitionTime": "2024-01-01T00:00:00Z"
            }]
        }
    });

    let env: Environment = serde_json::from_value(json).expect("environment should deserialize");
    assert_eq!(env.conditions().len(), 1);
    assert_eq!(env.conditions()[0].r#type, "ErrorOccurred");
}

#[test]
fn test_claim_and_target() {
    let claim: DeploymentTargetClaim = serde_yaml::from_str(
        r#"
apiVersion: appstudio.redhat.com/v1alpha1
kind: DeploymentTargetClaim
metadata:
  name: prod-claim
  namespace: team-a
spec:
  deploymentTargetClassName: isolation-level-namespace
  targetName: prod-target
status:
  phase: Bound
"#,
    )
    .expect("claim should deserialize");
    assert!(claim.is_bound());
    assert_eq!(claim.target_name(), Some("prod-target"));
    assert_eq!(
        claim.status.as_ref().and_then(|s| s.phase),
        Some(DeploymentTargetClaimPhase::Bound)
    );

    let target: DeploymentTarget = serde_yaml::from_str(
        r#"
apiVersion: appstudio.redhat.com/v1alpha1
kind: DeploymentTarget
metadata:
  name: prod-target
  namespace: team-a
spec:
  deploymentTargetClassName: isolation-level-namespace
  kubernetesCredentials:
    defaultNamespace: team-a-prod
    apiURL: https://api.prod.example.com:6443
    clusterCredentialsSecret: prod-target-secret
  claimRef: prod-claim
"#,
    )
    .expect("target should deserialize");
    assert_eq!(target.claim_ref(), Some("prod-claim"));
    assert_eq!(
        target.spec.kubernetes_cluster_credentials.cluster_credentials_secret,
        "prod-target-secret"
    );
}

#[test]
fn test_pending_claim_is_not_bound() {
    let claim: DeploymentTargetClaim = serde_yaml::from_str(
        r#"
apiVersion: appstudio.redhat.com/v1alpha1
kind: DeploymentTargetClaim
metadata:
  name: waiting
  namespace: team-a
spec:
  deploymentTargetClassName: isolation-level-namespace
status:
  phase: Pending
"#,
    )
    .expect("claim should deserialize");
    assert!(!claim.is_bound());
    assert!(claim.target_name().is_none());
}

#[test]
fn test_managed_environment_field_names() {
    let managed = GitOpsDeploymentManagedEnvironment::new(
        "managed-environment-prod",
        GitOpsDeploymentManagedEnvironmentSpec {
            api_url: "https://api.prod.example.com:6443".to_string(),
            cluster_credentials_secret: "managed-environment-secret-prod".to_string(),
            allow_insecure_skip_tls_verify: true,
            cluster_resources: false,
            namespaces: vec!["team-a-prod".to_string()],
        },
    );

    let value = serde_json::to_value(&managed).expect("managed environment should serialize");
    assert_eq!(value["apiVersion"], "managed-gitops.redhat.com/v1alpha1");
    assert_eq!(value["kind"], "GitOpsDeploymentManagedEnvironment");

    let spec = &value["spec"];
    assert_eq!(spec["apiURL"], "https://api.prod.example.com:6443");
    assert_eq!(spec["credentialsSecret"], "managed-environment-secret-prod");
    assert_eq!(spec["allowInsecureSkipTLSVerify"], true);
    assert_eq!(spec["clusterResources"], false);
    assert_eq!(spec["namespaces"][0], "team-a-prod");
}

#[test]
fn test_managed_environment_omits_empty_namespaces() {
    let managed = GitOpsDeploymentManagedEnvironment::new(
        "managed-environment-dev",
        GitOpsDeploymentManagedEnvironmentSpec {
            api_url: "https://api.dev.example.com:6443".to_string(),
            cluster_credentials_secret: "dev-credentials".to_string(),
            ..GitOpsDeploymentManagedEnvironmentSpec::default()
        },
    );

    let value = serde_json::to_value(&managed).expect("managed environment should serialize");
    assert!(value["spec"].get("namespaces").is_none());
}

#[test]
fn test_render_crds_contains_every_kind() {
    let rendered = render_crds().expect("CRDs should render");

    for kind in [
        "kind: Environment\n",
        "kind: DeploymentTargetClaim\n",
        "kind: DeploymentTarget\n",
        "kind: GitOpsDeploymentManagedEnvironment\n",
    ] {
        assert!(rendered.contains(kind), "missing {kind:?}");
    }
    assert_eq!(rendered.matches("---\n").count(), 3);
}
