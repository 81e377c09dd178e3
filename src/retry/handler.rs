use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

use super::error::StatusCodes;
use super::policy::{calculate_delay, should_retry, RetryPolicy};
use crate::config::ConfigSource;
use crate::load::{self, LoadError, LoadState, Swappable};

/// 전역 설정에서 재시도 정책을 읽는 필드 이름
pub const RETRY_POLICIES_KEY: &str = "retryPolicies";

/// 이름이 붙은 재시도 정책으로 비동기 작업을 감쌉니다.
pub struct RetryHandler {
    source: Arc<dyn ConfigSource>,
    policies: Swappable<HashMap<String, RetryPolicy>>,
}

impl RetryHandler {
    pub fn new(source: Arc<dyn ConfigSource>) -> Self {
        Self {
            source,
            policies: Swappable::new(),
        }
    }

    /// 정책을 다시 적재합니다. 실패하면 정책은 비워지고 에러는 로그로만 남습니다.
    pub async fn load_retry_policies(&self) -> usize {
        self.try_load_retry_policies().await.unwrap_or(0)
    }

    pub async fn try_load_retry_policies(&self) -> Result<usize, LoadError> {
        self.policies.begin();

        match load::fetch_array::<RetryPolicy>(self.source.as_ref(), RETRY_POLICIES_KEY).await {
            Ok(Some(list)) => {
                let mut policies = HashMap::with_capacity(list.len());
                for policy in list {
                    if let Some(previous) = policies.insert(policy.id.clone(), policy) {
                        warn!(policy_id = %previous.id, "중복된 재시도 정책 id, 뒤에 선언된 정책 사용");
                    }
                }
                let count = policies.len();
                info!(count, "재시도 정책 적재 완료");
                self.policies.replace(policies, count);
                Ok(count)
            }
            Ok(None) => {
                warn!(field = RETRY_POLICIES_KEY, "재시도 정책 필드가 없거나 배열이 아님, 빈 목록 사용");
                self.policies.replace(HashMap::new(), 0);
                Ok(0)
            }
            Err(e) => {
                error!(error = %e, "재시도 정책 적재 실패, 정책을 비움");
                self.policies.fail();
                Err(e)
            }
        }
    }

    pub fn policy(&self, id: &str) -> Option<RetryPolicy> {
        self.policies.snapshot().get(id).cloned()
    }

    pub fn policies(&self) -> Arc<HashMap<String, RetryPolicy>> {
        self.policies.snapshot()
    }

    pub fn state(&self) -> LoadState {
        self.policies.state()
    }

    /// `operation`을 `policy_name` 정책에 따라 재시도하며 실행합니다.
    ///
    /// `operation`은 1부터 시작하는 시도 번호를 받습니다. 정책은 호출 시작 시점에
    /// 한 번만 읽으므로 실행 도중의 재적재는 이 호출에 영향을 주지 않습니다.
    /// 정책을 찾을 수 없으면 재시도 없이 한 번만 실행합니다.
    ///
    /// 재시도할 수 없는 오류이거나 시도를 모두 소진하면 마지막 오류를 그대로 돌려줍니다.
    pub async fn execute_with_retries<F, Fut, T, E>(
        &self,
        mut operation: F,
        policy_name: &str,
        context: Option<&str>,
    ) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: StatusCodes + fmt::Display,
    {
        let context = context.unwrap_or("-");
        let Some(policy) = self.policy(policy_name) else {
            warn!(policy = %policy_name, context = %context, "알 수 없는 재시도 정책, 한 번만 실행");
            return operation(1).await;
        };

        let mut attempt = 1;
        loop {
            let error = match operation(attempt).await {
                Ok(result) => {
                    if attempt > 1 {
                        info!(policy = %policy.id, context = %context, attempt, "재시도 후 성공");
                    }
                    return Ok(result);
                }
                Err(error) => error,
            };

            if !should_retry(&error, &policy) {
                warn!(
                    policy = %policy.id,
                    context = %context,
                    attempt,
                    error = %error,
                    "재시도할 수 없는 오류"
                );
                return Err(error);
            }

            if attempt >= policy.max_attempts {
                error!(
                    policy = %policy.id,
                    context = %context,
                    attempts = attempt,
                    error = %error,
                    "재시도 횟수 소진"
                );
                return Err(error);
            }

            let delay = calculate_delay(attempt, &policy);
            warn!(
                policy = %policy.id,
                context = %context,
                attempt,
                max_attempts = policy.max_attempts,
                delay_ms = delay,
                error = %error,
                "작업 실패, 재시도 예정"
            );
            sleep(Duration::from_millis(delay)).await;
            attempt += 1;
            debug!(policy = %policy.id, context = %context, attempt, "재시도 시작");
        }
    }
}
