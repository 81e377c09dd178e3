//! 순서 기반(first-match-wins) 보안 정책 평가 모듈입니다.

mod enforcer;
mod types;

pub use enforcer::{PolicyEnforcer, NO_MATCH_REASON, NO_POLICIES_REASON, SECURITY_POLICIES_KEY};
pub use types::{
    AuthContext, Decision, DestinationConstraint, PathRule, PolicyAction, PolicyContext,
    SecurityPolicy, SourceConstraint, WILDCARD,
};
