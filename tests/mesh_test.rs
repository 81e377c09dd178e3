use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mesh_control_plane::config::{ConfigDocument, ConfigSource, ConfigStore, StoreError};
use mesh_control_plane::load::{LoadError, LoadState};
use mesh_control_plane::policy::{AuthContext, NO_POLICIES_REASON};
use mesh_control_plane::retry::DownstreamError;
use mesh_control_plane::routing::RequestContext;
use mesh_control_plane::{MeshControlPlane, MeshError};
use serde_json::json;

fn mesh_config() -> serde_json::Value {
    json!({
        "routingRules": [
            {
                "id": "orders",
                "priority": 10,
                "matches": [{ "pathPrefix": "/orders" }],
                "action": { "targetService": "orders", "targetPort": 8080, "retryPolicy": "fast" }
            },
            {
                "id": "admin",
                "priority": 20,
                "matches": [{ "pathPrefix": "/admin" }],
                "action": { "targetService": "backoffice" }
            }
        ],
        "retryPolicies": [{
            "id": "fast",
            "maxAttempts": 3,
            "backoffStrategy": "FIXED",
            "initialIntervalMs": 10,
            "retryOnHttpStatusCodes": [503]
        }],
        "securityPolicies": [
            { "id": "deny-backoffice", "action": "DENY", "destination": { "services": ["backoffice"] } },
            { "id": "allow-all", "action": "ALLOW" }
        ]
    })
}

async fn loaded_mesh() -> (Arc<ConfigStore>, Arc<MeshControlPlane>) {
    let store = Arc::new(ConfigStore::new(ConfigDocument::try_from(mesh_config()).unwrap()));
    let mesh = Arc::new(MeshControlPlane::new(store.clone()));
    mesh.reload().await.unwrap();
    (store, mesh)
}

/// 정상 적재 후 실패로 전환할 수 있는 설정 원본
struct FlakySource {
    inner: ConfigStore,
    failing: AtomicBool,
}

#[async_trait]
impl ConfigSource for FlakySource {
    async fn global_config(&self) -> Result<ConfigDocument, StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                reason: "config backend offline".to_string(),
            });
        }
        self.inner.global_config().await
    }
}

#[tokio::test]
async fn test_authorize_builds_call_plan() {
    let (_, mesh) = loaded_mesh().await;

    let plan = mesh
        .authorize(&RequestContext::new("GET", "/orders/42"), Some("web"), None)
        .unwrap();
    assert_eq!(plan.route.matched_rule.id, "orders");
    assert_eq!(plan.route.effective_action.target_port, Some(8080));
    assert!(plan.decision.allowed);
    assert_eq!(plan.decision.matched_policy_id.as_deref(), Some("allow-all"));
}

#[tokio::test]
async fn test_authorize_rejects_unrouted_and_denied() {
    let (_, mesh) = loaded_mesh().await;

    let result = mesh.authorize(&RequestContext::new("GET", "/unknown"), None, None);
    assert!(matches!(result, Err(MeshError::NoRoute { ref path, .. }) if path == "/unknown"));

    let auth = AuthContext::user("alice");
    let result = mesh.authorize(&RequestContext::new("GET", "/admin/users"), None, Some(&auth));
    match result {
        Err(MeshError::Denied { policy_id, .. }) => {
            assert_eq!(policy_id.as_deref(), Some("deny-backoffice"))
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_execute_retries_with_route_policy() {
    let (_, mesh) = loaded_mesh().await;
    let calls = AtomicU32::new(0);

    let result = mesh
        .execute(&RequestContext::new("POST", "/orders"), Some("web"), None, |plan, attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            let target = plan.route.effective_action.target_service.clone();
            async move {
                if attempt < 2 {
                    Err(DownstreamError::http(503, "unavailable"))
                } else {
                    Ok(format!("{}:{}", target, attempt))
                }
            }
        })
        .await;

    assert_eq!(result.unwrap(), "orders:2");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_execute_denied_never_calls_downstream() {
    let (_, mesh) = loaded_mesh().await;
    let calls = AtomicU32::new(0);

    let result: Result<(), MeshError<DownstreamError>> = mesh
        .execute(&RequestContext::new("GET", "/admin"), None, None, |_, _| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })
        .await;

    assert!(matches!(result, Err(MeshError::Denied { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_reload_rethrows_and_fails_to_empty() {
    let source = Arc::new(FlakySource {
        inner: ConfigStore::new(ConfigDocument::try_from(mesh_config()).unwrap()),
        failing: AtomicBool::new(false),
    });
    let mesh = MeshControlPlane::new(source.clone());
    mesh.reload().await.unwrap();
    assert_eq!(mesh.routes().rules().len(), 2);

    source.failing.store(true, Ordering::SeqCst);
    let result = mesh.reload().await;
    assert!(matches!(result, Err(MeshError::Load(LoadError::Store(_)))));

    assert_eq!(mesh.routes().state(), LoadState::Failed);
    assert!(mesh.routes().rules().is_empty());
    assert!(mesh.retries().policies().is_empty());
    let decision = mesh
        .policies()
        .evaluate(&mesh_control_plane::policy::PolicyContext::new());
    assert_eq!(decision.reason, NO_POLICIES_REASON);

    // 개별 적재는 에러를 삼키고 0을 돌려줌
    assert_eq!(mesh.routes().load_routing_rules().await, 0);
}

#[tokio::test]
async fn test_policies_removed_from_file_deny_after_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mesh.json");
    std::fs::write(&path, json!({ "global": mesh_config() }).to_string()).unwrap();

    let store = Arc::new(ConfigStore::from_file(&path).await.unwrap());
    let mesh = MeshControlPlane::new(store.clone());
    mesh.reload().await.unwrap();
    assert!(mesh
        .authorize(&RequestContext::new("GET", "/orders"), None, None)
        .is_ok());

    let mut without_policies = mesh_config();
    without_policies
        .as_object_mut()
        .unwrap()
        .remove("securityPolicies");
    std::fs::write(&path, json!({ "global": without_policies }).to_string()).unwrap();
    store.replace_from_file(&path).await.unwrap();

    let summary = mesh.reload().await.unwrap();
    assert_eq!(summary.security_policies, 0);
    match mesh.authorize(&RequestContext::new("GET", "/orders"), None, None) {
        Err(MeshError::Denied { reason, policy_id }) => {
            assert_eq!(reason, NO_POLICIES_REASON);
            assert_eq!(policy_id, None);
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_watch_store_reloads_on_global_change() {
    let (store, mesh) = loaded_mesh().await;
    let (subscription, task) = mesh.watch_store(&store);

    store.update_global_config(
        ConfigDocument::try_from(json!({
            "routingRules": [{
                "id": "only",
                "matches": [{ "pathPrefix": "/" }],
                "action": { "targetService": "single" }
            }]
        }))
        .unwrap(),
    );

    let mut reloaded = false;
    for _ in 0..100 {
        if mesh.routes().rules().len() == 1 {
            reloaded = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(reloaded, "routes were not reloaded after a global change");
    assert_eq!(mesh.routes().rules()[0].id, "only");

    assert!(subscription.unsubscribe());
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .unwrap()
        .unwrap();
}
