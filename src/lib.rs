//! 서비스 메시 제어 평면의 핵심 로직입니다.
//!
//! # 주요 기능
//!
//! - 전역/서비스별 설정 저장소와 변경 통지
//! - 우선순위 기반 HTTP 라우트 매칭
//! - 이름 있는 정책에 따른 재시도와 백오프
//! - 순서 기반 보안 정책 평가 (기본 거부)
//!
//! # 예제
//!
//! ```
//! use std::sync::Arc;
//! use mesh_control_plane::config::{ConfigDocument, ConfigStore};
//! use mesh_control_plane::routing::{RequestContext, RouteManager};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let global = ConfigDocument::try_from(json!({
//!     "routingRules": [{
//!         "id": "api",
//!         "priority": 10,
//!         "matches": [{ "pathPrefix": "/api" }],
//!         "action": { "targetService": "api-service" }
//!     }]
//! }))
//! .unwrap();
//!
//! let routes = RouteManager::new(Arc::new(ConfigStore::new(global)));
//! routes.load_routing_rules().await;
//!
//! let resolved = routes.find_match(&RequestContext::new("GET", "/api/users")).unwrap();
//! assert_eq!(resolved.effective_action.target_service, "api-service");
//! # }
//! ```
//!
//! # 설정 적재
//!
//! 라우트, 재시도 정책, 보안 정책은 모두 전역 설정에서 읽어 한 번에 교체됩니다.
//! 적재에 실패한 컴포넌트는 빈 컬렉션으로 전환되므로 라우트는 찾지 못하고
//! 재시도는 하지 않으며 모든 요청은 거부됩니다.

pub mod config;
pub mod load;
pub mod logging;
pub mod mesh;
pub mod policy;
pub mod retry;
pub mod routing;
pub mod settings;

pub use mesh::{CallPlan, LoadSummary, MeshControlPlane, MeshError};
