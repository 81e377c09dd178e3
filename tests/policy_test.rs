use std::sync::Arc;

use mesh_control_plane::config::{ConfigDocument, ConfigStore};
use mesh_control_plane::load::LoadState;
use mesh_control_plane::policy::{AuthContext, PolicyContext, PolicyEnforcer, NO_POLICIES_REASON};
use serde_json::json;

async fn enforcer(policies: serde_json::Value) -> PolicyEnforcer {
    let global = ConfigDocument::try_from(json!({ "securityPolicies": policies })).unwrap();
    let enforcer = PolicyEnforcer::new(Arc::new(ConfigStore::new(global)));
    enforcer.load_policies().await;
    enforcer
}

fn deny_admin() -> serde_json::Value {
    json!({
        "id": "deny-admin",
        "action": "DENY",
        "destination": { "services": ["serviceC"], "paths": [{ "pathPrefix": "/admin" }] }
    })
}

fn allow_all() -> serde_json::Value {
    json!({ "id": "allow-all", "action": "ALLOW" })
}

fn admin_request() -> PolicyContext {
    PolicyContext::new()
        .source("serviceA")
        .destination("serviceC")
        .request("GET", "/admin/x")
}

#[tokio::test]
async fn test_first_matching_policy_wins() {
    let enforcer = enforcer(json!([deny_admin(), allow_all()])).await;

    let decision = enforcer.evaluate(&admin_request());
    assert!(!decision.allowed);
    assert_eq!(decision.matched_policy_id.as_deref(), Some("deny-admin"));

    let public = PolicyContext::new().destination("serviceC").request("GET", "/public");
    let decision = enforcer.evaluate(&public);
    assert!(decision.allowed);
    assert_eq!(decision.matched_policy_id.as_deref(), Some("allow-all"));
}

#[tokio::test]
async fn test_reordering_flips_outcome() {
    let enforcer = enforcer(json!([allow_all(), deny_admin()])).await;

    let decision = enforcer.evaluate(&admin_request());
    assert!(decision.allowed);
    assert_eq!(decision.matched_policy_id.as_deref(), Some("allow-all"));
}

#[tokio::test]
async fn test_default_deny_without_policies() {
    let global = ConfigDocument::new();
    let enforcer = PolicyEnforcer::new(Arc::new(ConfigStore::new(global)));

    // 적재 전
    let decision = enforcer.evaluate(&admin_request());
    assert!(!decision.allowed);
    assert_eq!(decision.reason, NO_POLICIES_REASON);

    // 필드가 없는 상태로 적재
    assert_eq!(enforcer.load_policies().await, 0);
    let decision = enforcer.evaluate(&PolicyContext::new());
    assert!(!decision.allowed);
    assert!(decision.reason.contains("No policies loaded"));
}

#[tokio::test]
async fn test_principal_and_namespace_constraints() {
    let enforcer = enforcer(json!([{
        "id": "payments-team",
        "action": "ALLOW",
        "source": { "principals": ["alice", "billing"], "namespaces": ["payments"] },
        "destination": { "ports": [8443] }
    }]))
    .await;

    let alice = PolicyContext::new()
        .port(8443)
        .auth(AuthContext::user("alice").with_namespace("payments"));
    assert!(enforcer.evaluate(&alice).allowed);

    let wrong_port = PolicyContext::new()
        .port(80)
        .auth(AuthContext::user("alice").with_namespace("payments"));
    assert!(!enforcer.evaluate(&wrong_port).allowed);

    let no_namespace = PolicyContext::new().source("billing").port(8443);
    assert!(!enforcer.evaluate(&no_namespace).allowed);
}

#[tokio::test]
async fn test_malformed_policy_fails_to_empty() {
    let enforcer = enforcer(json!([allow_all(), { "id": "broken", "action": "MAYBE" }])).await;

    assert_eq!(enforcer.state(), LoadState::Failed);
    let decision = enforcer.evaluate(&admin_request());
    assert!(!decision.allowed);
    assert_eq!(decision.reason, NO_POLICIES_REASON);
}
