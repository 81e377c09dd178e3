//! 라우팅, 보안 정책, 재시도를 하나의 호출 흐름으로 묶는 제어 평면입니다.

use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::{ConfigScope, ConfigSource, ConfigStore, Subscription};
use crate::load::LoadError;
use crate::logging::{log_call, CallLog};
use crate::policy::{AuthContext, Decision, PolicyContext, PolicyEnforcer};
use crate::retry::{RetryHandler, StatusCodes};
use crate::routing::{RequestContext, ResolvedRoute, RouteManager};

/// 제어 평면 호출 실패
#[derive(Debug)]
pub enum MeshError<E = Infallible> {
    /// 재적재 중 컬렉션 하나가 적재되지 못함
    Load(LoadError),
    NoRoute { method: String, path: String },
    Denied {
        reason: String,
        policy_id: Option<String>,
    },
    /// 재시도까지 마친 뒤의 마지막 다운스트림 오류
    Downstream(E),
}

impl MeshError<Infallible> {
    /// 다운스트림 오류가 없는 에러를 임의의 `MeshError<E>`로 옮깁니다.
    pub fn widen<E>(self) -> MeshError<E> {
        match self {
            Self::Load(e) => MeshError::Load(e),
            Self::NoRoute { method, path } => MeshError::NoRoute { method, path },
            Self::Denied { reason, policy_id } => MeshError::Denied { reason, policy_id },
            Self::Downstream(never) => match never {},
        }
    }
}

impl<E: fmt::Display> fmt::Display for MeshError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Load(e) => write!(f, "제어 평면 적재 실패: {}", e),
            Self::NoRoute { method, path } => write!(f, "일치하는 라우트 없음: {} {}", method, path),
            Self::Denied { reason, .. } => write!(f, "보안 정책에 의해 거부됨: {}", reason),
            Self::Downstream(e) => write!(f, "다운스트림 호출 실패: {}", e),
        }
    }
}

impl<E> std::error::Error for MeshError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Load(e) => Some(e),
            Self::Downstream(e) => Some(e),
            _ => None,
        }
    }
}

impl<E> From<LoadError> for MeshError<E> {
    fn from(e: LoadError) -> Self {
        Self::Load(e)
    }
}

/// `reload` 결과로 적재된 항목 수
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    pub routes: usize,
    pub retry_policies: usize,
    pub security_policies: usize,
}

/// 라우팅과 인가를 통과한 호출 계획
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallPlan {
    pub route: ResolvedRoute,
    pub decision: Decision,
}

pub struct MeshControlPlane {
    routes: RouteManager,
    retries: RetryHandler,
    policies: PolicyEnforcer,
}

impl MeshControlPlane {
    /// 세 컴포넌트가 모두 같은 설정 원본을 공유합니다.
    pub fn new(source: Arc<dyn ConfigSource>) -> Self {
        Self {
            routes: RouteManager::new(Arc::clone(&source)),
            retries: RetryHandler::new(Arc::clone(&source)),
            policies: PolicyEnforcer::new(source),
        }
    }

    pub fn routes(&self) -> &RouteManager {
        &self.routes
    }

    pub fn retries(&self) -> &RetryHandler {
        &self.retries
    }

    pub fn policies(&self) -> &PolicyEnforcer {
        &self.policies
    }

    /// 세 컬렉션을 모두 다시 적재합니다.
    ///
    /// 실패한 컴포넌트는 각자 빈 컬렉션으로 전환되고, 나머지는 정상 적재됩니다.
    /// 실패가 하나라도 있으면 처음 관찰된 에러를 돌려줍니다.
    pub async fn reload(&self) -> Result<LoadSummary, MeshError> {
        let (routes, retry_policies, security_policies) = tokio::join!(
            self.routes.try_load_routing_rules(),
            self.retries.try_load_retry_policies(),
            self.policies.try_load_policies(),
        );

        let summary = LoadSummary {
            routes: routes?,
            retry_policies: retry_policies?,
            security_policies: security_policies?,
        };
        info!(
            routes = summary.routes,
            retry_policies = summary.retry_policies,
            security_policies = summary.security_policies,
            "제어 평면 재적재 완료"
        );
        Ok(summary)
    }

    /// 요청을 라우팅하고 보안 정책으로 인가합니다. 다운스트림 호출은 하지 않습니다.
    pub fn authorize(
        &self,
        request: &RequestContext,
        source_service: Option<&str>,
        auth: Option<&AuthContext>,
    ) -> Result<CallPlan, MeshError> {
        let Some(route) = self.routes.find_match(request) else {
            return Err(MeshError::NoRoute {
                method: request.method.clone(),
                path: request.path.clone(),
            });
        };

        let action = &route.effective_action;
        let ctx = PolicyContext {
            source_service: source_service.map(str::to_string),
            destination_service: Some(action.target_service.clone()),
            destination_port: action.target_port,
            path: Some(request.path.clone()),
            method: Some(request.method.clone()),
            auth_context: auth.cloned(),
        };

        let decision = self.policies.evaluate(&ctx);
        if !decision.allowed {
            return Err(MeshError::Denied {
                reason: decision.reason,
                policy_id: decision.matched_policy_id,
            });
        }

        debug!(
            route = %route.matched_rule.id,
            target = %action.target_service,
            policy = ?decision.matched_policy_id,
            "호출 인가"
        );
        Ok(CallPlan { route, decision })
    }

    /// 인가를 거친 뒤 라우트의 재시도 정책으로 다운스트림 호출을 실행합니다.
    ///
    /// 라우트에 재시도 정책이 없으면 한 번만 호출합니다. `operation`은
    /// 호출 계획과 1부터 시작하는 시도 번호를 받습니다.
    pub async fn execute<F, Fut, T, E>(
        &self,
        request: &RequestContext,
        source_service: Option<&str>,
        auth: Option<&AuthContext>,
        mut operation: F,
    ) -> Result<T, MeshError<E>>
    where
        F: FnMut(&CallPlan, u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: StatusCodes + fmt::Display,
    {
        let mut log = CallLog::new(request.method.as_str(), request.path.as_str());
        log.with_source(source_service);

        let plan = match self.authorize(request, source_service, auth) {
            Ok(plan) => plan,
            Err(e) => {
                if let MeshError::Denied { .. } = &e {
                    log.with_decision(false);
                }
                log.with_error(&e);
                log.finish();
                log_call(&log);
                return Err(e.widen());
            }
        };
        log.with_route(&plan.route.matched_rule.id, &plan.route.effective_action.target_service);
        log.with_decision(true);

        let mut attempts = 0;
        let result = match plan.route.effective_action.retry_policy.as_deref() {
            Some(policy_name) => {
                self.retries
                    .execute_with_retries(
                        |attempt| {
                            attempts = attempt;
                            operation(&plan, attempt)
                        },
                        policy_name,
                        Some(plan.route.matched_rule.id.as_str()),
                    )
                    .await
            }
            None => {
                attempts = 1;
                operation(&plan, 1).await
            }
        };

        log.with_attempts(attempts);
        if let Err(e) = &result {
            log.with_error(e);
        }
        log.finish();
        log_call(&log);

        result.map_err(MeshError::Downstream)
    }

    /// 저장소의 전역 설정이 바뀔 때마다 백그라운드에서 `reload`를 실행합니다.
    ///
    /// 리스너는 재적재 요청만 큐에 넣습니다. 대기 중인 요청이 이미 있으면
    /// 새 요청은 합쳐집니다. 구독을 해제하면 백그라운드 작업도 끝납니다.
    /// tokio 런타임 안에서 호출해야 합니다.
    pub fn watch_store(self: &Arc<Self>, store: &ConfigStore) -> (Subscription, JoinHandle<()>) {
        let (reload_tx, mut reload_rx) = mpsc::channel::<()>(1);

        let subscription = store.on_config_change(move |change| {
            if change.scope != ConfigScope::Global {
                return Ok(());
            }
            match reload_tx.try_send(()) {
                Ok(()) | Err(TrySendError::Full(())) => Ok(()),
                Err(TrySendError::Closed(())) => Err("재적재 작업이 이미 종료됨".into()),
            }
        });

        let mesh = Arc::clone(self);
        let handle = tokio::spawn(async move {
            while reload_rx.recv().await.is_some() {
                if let Err(e) = mesh.reload().await {
                    error!(error = %e, "설정 변경 후 재적재 실패");
                }
            }
            debug!("설정 감시 종료");
        });

        (subscription, handle)
    }
}
