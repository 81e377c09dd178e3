use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::request::{NormalizedRequest, RequestContext};
use super::rule::{EffectiveAction, ResolvedRoute, RouteRule};
use crate::config::ConfigSource;
use crate::load::{self, LoadError, LoadState, Swappable};

/// 전역 설정에서 라우팅 규칙을 읽는 필드 이름
pub const ROUTING_RULES_KEY: &str = "routingRules";

/// 우선순위 순으로 정렬된 라우팅 규칙을 관리합니다.
pub struct RouteManager {
    source: Arc<dyn ConfigSource>,
    rules: Swappable<Vec<RouteRule>>,
}

impl RouteManager {
    pub fn new(source: Arc<dyn ConfigSource>) -> Self {
        Self {
            source,
            rules: Swappable::new(),
        }
    }

    /// 규칙을 다시 적재합니다. 실패하면 규칙 목록은 비워지고 에러는 로그로만 남습니다.
    ///
    /// 적재된 규칙 수를 돌려줍니다.
    pub async fn load_routing_rules(&self) -> usize {
        self.try_load_routing_rules().await.unwrap_or(0)
    }

    /// `load_routing_rules`와 같지만 적재 실패를 호출자에게 돌려줍니다.
    /// 실패 시 규칙 목록이 비워지는 것은 동일합니다.
    pub async fn try_load_routing_rules(&self) -> Result<usize, LoadError> {
        self.rules.begin();

        match load::fetch_array::<RouteRule>(self.source.as_ref(), ROUTING_RULES_KEY).await {
            Ok(Some(mut rules)) => {
                // 안정 정렬이므로 같은 우선순위는 적재 순서를 유지
                rules.sort_by_key(RouteRule::effective_priority);
                let count = rules.len();
                info!(
                    count,
                    order = ?rules.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
                    "라우팅 규칙 적재 완료"
                );
                self.rules.replace(rules, count);
                Ok(count)
            }
            Ok(None) => {
                warn!(field = ROUTING_RULES_KEY, "라우팅 규칙 필드가 없거나 배열이 아님, 빈 목록 사용");
                self.rules.replace(Vec::new(), 0);
                Ok(0)
            }
            Err(e) => {
                error!(error = %e, "라우팅 규칙 적재 실패, 규칙 목록을 비움");
                self.rules.fail();
                Err(e)
            }
        }
    }

    /// 현재 적재된 규칙 (우선순위 순)
    pub fn rules(&self) -> Arc<Vec<RouteRule>> {
        self.rules.snapshot()
    }

    pub fn state(&self) -> LoadState {
        self.rules.state()
    }

    /// 요청과 일치하는 첫 번째 규칙을 찾습니다.
    ///
    /// 우선순위, 그 다음 적재 순서로 규칙을 평가하며 가장 먼저 만족된
    /// 매치 블록이 결과를 결정합니다. 일치하는 규칙이 없으면 `None`이며
    /// 암묵적인 기본 라우트는 없습니다.
    pub fn find_match(&self, request: &RequestContext) -> Option<ResolvedRoute> {
        let rules = self.rules.snapshot();
        let normalized = NormalizedRequest::new(request);

        for rule in rules.iter() {
            if let Some(matched) = rule.matches.iter().find(|m| m.matches(&normalized)) {
                let effective_action = EffectiveAction::resolve(&rule.action, matched, &request.path);
                debug!(
                    rule_id = %rule.id,
                    method = %normalized.method,
                    path = %request.path,
                    target = %effective_action.target_service,
                    "라우팅 규칙 일치"
                );
                return Some(ResolvedRoute {
                    matched_rule: rule.clone(),
                    effective_action,
                });
            }
        }

        debug!(
            method = %normalized.method,
            path = %request.path,
            rules = rules.len(),
            "일치하는 라우팅 규칙 없음"
        );
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigDocument, ConfigStore};
    use serde_json::json;

    fn manager(global: serde_json::Value) -> (Arc<ConfigStore>, RouteManager) {
        let store = Arc::new(ConfigStore::new(ConfigDocument::try_from(global).unwrap()));
        let manager = RouteManager::new(store.clone());
        (store, manager)
    }

    #[tokio::test]
    async fn test_unloaded_manager_matches_nothing() {
        let (_, manager) = manager(json!({}));
        assert_eq!(manager.state(), LoadState::Unloaded);
        assert!(manager.find_match(&RequestContext::new("GET", "/")).is_none());
    }

    #[tokio::test]
    async fn test_missing_field_loads_empty() {
        let (_, manager) = manager(json!({ "routingRules": "nope" }));
        assert_eq!(manager.load_routing_rules().await, 0);
        assert_eq!(manager.state(), LoadState::Loaded { count: 0 });
    }

    #[tokio::test]
    async fn test_equal_priorities_keep_load_order() {
        let (_, manager) = manager(json!({
            "routingRules": [
                { "id": "first", "priority": 1, "matches": [{ "pathPrefix": "/" }], "action": { "targetService": "a" } },
                { "id": "second", "priority": 1, "matches": [{ "pathPrefix": "/" }], "action": { "targetService": "b" } }
            ]
        }));
        manager.load_routing_rules().await;

        let resolved = manager.find_match(&RequestContext::new("GET", "/x")).unwrap();
        assert_eq!(resolved.matched_rule.id, "first");
    }

    #[tokio::test]
    async fn test_malformed_rule_clears_previous_rules() {
        let (store, manager) = manager(json!({
            "routingRules": [
                { "id": "ok", "matches": [{ "pathPrefix": "/" }], "action": { "targetService": "a" } }
            ]
        }));
        assert_eq!(manager.load_routing_rules().await, 1);

        store.update_global_config(
            ConfigDocument::try_from(json!({
                "routingRules": [{ "id": "broken", "priority": "high", "action": { "targetService": "a" } }]
            }))
            .unwrap(),
        );

        assert!(manager.try_load_routing_rules().await.is_err());
        assert_eq!(manager.state(), LoadState::Failed);
        assert!(manager.rules().is_empty());
        assert!(manager.find_match(&RequestContext::new("GET", "/")).is_none());
    }
}
