use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::types::{Decision, PolicyAction, PolicyContext, SecurityPolicy};
use crate::config::ConfigSource;
use crate::load::{self, LoadError, LoadState, Swappable};

/// 전역 설정에서 보안 정책을 읽는 필드 이름
pub const SECURITY_POLICIES_KEY: &str = "securityPolicies";

/// 정책이 하나도 적재되지 않았을 때의 거부 사유
pub const NO_POLICIES_REASON: &str = "No policies loaded, default deny.";

/// 일치하는 정책이 없을 때의 거부 사유
pub const NO_MATCH_REASON: &str = "Default deny: No matching policy found.";

/// 목록 순서대로 보안 정책을 평가합니다. 처음 일치한 정책이 결정을 내립니다.
pub struct PolicyEnforcer {
    source: Arc<dyn ConfigSource>,
    policies: Swappable<Vec<SecurityPolicy>>,
}

impl PolicyEnforcer {
    pub fn new(source: Arc<dyn ConfigSource>) -> Self {
        Self {
            source,
            policies: Swappable::new(),
        }
    }

    /// 정책을 다시 적재합니다. 실패하면 정책은 비워지고 (모든 요청 거부) 에러는 로그로만 남습니다.
    pub async fn load_policies(&self) -> usize {
        self.try_load_policies().await.unwrap_or(0)
    }

    pub async fn try_load_policies(&self) -> Result<usize, LoadError> {
        self.policies.begin();

        match load::fetch_array::<SecurityPolicy>(self.source.as_ref(), SECURITY_POLICIES_KEY).await {
            Ok(Some(policies)) => {
                let count = policies.len();
                info!(
                    count,
                    order = ?policies.iter().map(|p| p.id.as_str()).collect::<Vec<_>>(),
                    "보안 정책 적재 완료"
                );
                self.policies.replace(policies, count);
                Ok(count)
            }
            Ok(None) => {
                warn!(field = SECURITY_POLICIES_KEY, "보안 정책 필드가 없거나 배열이 아님, 모든 요청 거부");
                self.policies.replace(Vec::new(), 0);
                Ok(0)
            }
            Err(e) => {
                error!(error = %e, "보안 정책 적재 실패, 정책을 비움");
                self.policies.fail();
                Err(e)
            }
        }
    }

    pub fn policies(&self) -> Arc<Vec<SecurityPolicy>> {
        self.policies.snapshot()
    }

    pub fn state(&self) -> LoadState {
        self.policies.state()
    }

    /// 요청 컨텍스트를 평가합니다.
    ///
    /// 정책 목록의 순서가 곧 우선순위입니다. 넓은 ALLOW 앞에 DENY를 두면
    /// 해당 요청은 거부됩니다.
    pub fn evaluate(&self, ctx: &PolicyContext) -> Decision {
        let policies = self.policies.snapshot();

        if policies.is_empty() {
            debug!(
                source = ?ctx.source_service,
                destination = ?ctx.destination_service,
                "적재된 보안 정책 없음, 거부"
            );
            return Decision {
                allowed: false,
                reason: NO_POLICIES_REASON.to_string(),
                matched_policy_id: None,
            };
        }

        if let Some(policy) = policies.iter().find(|p| p.matches(ctx)) {
            let allowed = policy.action == PolicyAction::Allow;
            debug!(
                policy_id = %policy.id,
                action = %policy.action,
                source = ?ctx.source_service,
                destination = ?ctx.destination_service,
                path = ?ctx.path,
                "보안 정책 일치"
            );
            return Decision {
                allowed,
                reason: format!("Matched policy '{}' ({})", policy.id, policy.action),
                matched_policy_id: Some(policy.id.clone()),
            };
        }

        debug!(
            source = ?ctx.source_service,
            destination = ?ctx.destination_service,
            path = ?ctx.path,
            policies = policies.len(),
            "일치하는 보안 정책 없음, 거부"
        );
        Decision {
            allowed: false,
            reason: NO_MATCH_REASON.to_string(),
            matched_policy_id: None,
        }
    }
}
