//! 우선순위 기반 HTTP 라우트 매칭을 제공하는 모듈입니다.

mod error;
mod manager;
pub mod matcher;
mod request;
mod rule;

pub use error::RuleError;
pub use manager::{RouteManager, ROUTING_RULES_KEY};
pub use matcher::{
    HeaderMatch, HeaderPredicate, HttpRouteMatch, PathMatch, Pattern, QueryMatch, QueryPredicate,
};
pub use request::{ParamValue, RequestContext};
pub use rule::{
    EffectiveAction, HttpRouteAction, PathRewrite, ResolvedRoute, RouteRewrite, RouteRule,
    UNSPECIFIED_PRIORITY,
};
