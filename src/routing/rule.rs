use serde::Deserialize;
use tracing::debug;

use super::error::RuleError;
use super::matcher::{HttpRouteMatch, PathMatch};
use crate::load::Validate;

/// 우선순위가 지정되지 않은 규칙은 가장 마지막에 평가됩니다.
pub const UNSPECIFIED_PRIORITY: i64 = i64::MAX;

/// 라우팅 규칙. `matches` 중 하나라도 만족하면 (OR) `action`이 적용됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRule {
    pub id: String,
    /// 낮을수록 먼저 평가
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub matches: Vec<HttpRouteMatch>,
    pub action: HttpRouteAction,
}

impl RouteRule {
    pub fn effective_priority(&self) -> i64 {
        self.priority.unwrap_or(UNSPECIFIED_PRIORITY)
    }
}

impl Validate for RouteRule {
    fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err(RuleError::MissingId.to_string());
        }
        if self.action.target_service.is_empty() {
            return Err(RuleError::MissingTargetService {
                rule_id: self.id.clone(),
            }
            .to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouteAction {
    pub target_service: String,
    #[serde(default)]
    pub target_port: Option<u16>,
    #[serde(default)]
    pub rewrite: Option<RouteRewrite>,
    /// 호출 시 사용할 재시도 정책 이름
    #[serde(default)]
    pub retry_policy: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawRouteRewrite")]
pub struct RouteRewrite {
    pub path: Option<PathRewrite>,
    pub authority: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathRewrite {
    /// 일치한 pathPrefix 부분만 교체
    Prefix(String),
    /// 경로 전체 교체
    Full(String),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRouteRewrite {
    prefix: Option<String>,
    full_path: Option<String>,
    authority: Option<String>,
}

impl TryFrom<RawRouteRewrite> for RouteRewrite {
    type Error = RuleError;

    fn try_from(raw: RawRouteRewrite) -> Result<Self, Self::Error> {
        let path = match (raw.prefix, raw.full_path) {
            (Some(_), Some(_)) => return Err(RuleError::ConflictingRewrite),
            (Some(prefix), None) => Some(PathRewrite::Prefix(prefix)),
            (None, Some(full)) => Some(PathRewrite::Full(full)),
            (None, None) => None,
        };
        Ok(Self {
            path,
            authority: raw.authority,
        })
    }
}

/// 재작성이 반영된 최종 라우팅 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveAction {
    pub target_service: String,
    pub target_port: Option<u16>,
    /// 재작성 후 경로
    pub path: String,
    /// 재작성된 authority (선언된 경우)
    pub authority: Option<String>,
    pub retry_policy: Option<String>,
}

impl EffectiveAction {
    pub(crate) fn resolve(action: &HttpRouteAction, matched: &HttpRouteMatch, path: &str) -> Self {
        let rewrite = action.rewrite.as_ref();
        let path = match rewrite.and_then(|r| r.path.as_ref()) {
            Some(PathRewrite::Full(full)) => full.clone(),
            Some(PathRewrite::Prefix(replacement)) => match &matched.path {
                Some(PathMatch::Prefix(prefix)) if path.starts_with(prefix.as_str()) => {
                    format!("{}{}", replacement, &path[prefix.len()..])
                }
                _ => {
                    debug!(path = %path, "prefix 재작성은 pathPrefix로 일치한 경우에만 적용됨");
                    path.to_string()
                }
            },
            None => path.to_string(),
        };

        Self {
            target_service: action.target_service.clone(),
            target_port: action.target_port,
            path,
            authority: rewrite.and_then(|r| r.authority.clone()),
            retry_policy: action.retry_policy.clone(),
        }
    }
}

/// `find_match` 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoute {
    pub matched_rule: RouteRule,
    pub effective_action: EffectiveAction,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule(value: serde_json::Value) -> RouteRule {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_prefix_rewrite_replaces_matched_prefix() {
        let rule = rule(json!({
            "id": "r1",
            "matches": [{ "pathPrefix": "/api/v1" }],
            "action": { "targetService": "svc", "rewrite": { "prefix": "/v1" } }
        }));

        let action = EffectiveAction::resolve(&rule.action, &rule.matches[0], "/api/v1/users");
        assert_eq!(action.path, "/v1/users");
    }

    #[test]
    fn test_prefix_rewrite_ignored_without_prefix_match() {
        let rule = rule(json!({
            "id": "r1",
            "matches": [{ "pathExact": "/api/v1" }],
            "action": { "targetService": "svc", "rewrite": { "prefix": "/v1" } }
        }));

        let action = EffectiveAction::resolve(&rule.action, &rule.matches[0], "/api/v1");
        assert_eq!(action.path, "/api/v1");
    }

    #[test]
    fn test_full_path_and_authority_rewrite() {
        let rule = rule(json!({
            "id": "r1",
            "matches": [{ "pathPrefix": "/" }],
            "action": {
                "targetService": "svc",
                "targetPort": 8080,
                "retryPolicy": "default",
                "rewrite": { "fullPath": "/health", "authority": "svc.internal" }
            }
        }));

        let action = EffectiveAction::resolve(&rule.action, &rule.matches[0], "/anything");
        assert_eq!(action.path, "/health");
        assert_eq!(action.authority.as_deref(), Some("svc.internal"));
        assert_eq!(action.target_port, Some(8080));
        assert_eq!(action.retry_policy.as_deref(), Some("default"));
    }

    #[test]
    fn test_conflicting_rewrite_rejected() {
        let result = serde_json::from_value::<RouteRule>(json!({
            "id": "r1",
            "action": { "targetService": "svc", "rewrite": { "prefix": "/a", "fullPath": "/b" } }
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_priority_sorts_last() {
        let rule = rule(json!({ "id": "r1", "action": { "targetService": "svc" } }));
        assert_eq!(rule.effective_priority(), UNSPECIFIED_PRIORITY);
        assert!(rule.matches.is_empty());
    }

    #[test]
    fn test_empty_target_service_fails_validation() {
        let rule = rule(json!({ "id": "r1", "action": { "targetService": "" } }));
        assert!(rule.validate().is_err());
    }
}
