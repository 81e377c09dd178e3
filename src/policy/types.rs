use std::fmt;

use serde::{Deserialize, Serialize};

use crate::load::Validate;

/// 모든 값을 허용하는 와일드카드. 값 자체는 존재해야 합니다.
pub const WILDCARD: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyAction {
    Allow,
    Deny,
}

impl fmt::Display for PolicyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => f.write_str("ALLOW"),
            Self::Deny => f.write_str("DENY"),
        }
    }
}

/// 보안 정책. 선언된 조건이 모두 만족될 때만 일치합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityPolicy {
    pub id: String,
    pub action: PolicyAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceConstraint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<DestinationConstraint>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConstraint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principals: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespaces: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationConstraint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<Vec<u16>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paths: Option<Vec<PathRule>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathRule {
    pub path_prefix: String,
    /// 없으면 모든 메서드
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub methods: Option<Vec<String>>,
}

impl Validate for SecurityPolicy {
    fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("보안 정책 id가 비어 있음".to_string());
        }
        let paths = self
            .destination
            .as_ref()
            .and_then(|d| d.paths.as_deref())
            .unwrap_or_default();
        if paths.iter().any(|p| p.path_prefix.is_empty()) {
            return Err(format!("보안 정책 {}의 pathPrefix가 비어 있음", self.id));
        }
        Ok(())
    }
}

/// 인증된 호출자 정보
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthContext {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
}

impl AuthContext {
    pub fn user<U: Into<String>>(user_id: U) -> Self {
        Self {
            user_id: Some(user_id.into()),
            namespace: None,
        }
    }

    pub fn with_namespace<N: Into<String>>(mut self, namespace: N) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

/// 정책 평가 입력
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyContext {
    #[serde(default)]
    pub source_service: Option<String>,
    #[serde(default)]
    pub destination_service: Option<String>,
    #[serde(default)]
    pub destination_port: Option<u16>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub auth_context: Option<AuthContext>,
}

impl PolicyContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source<S: Into<String>>(mut self, service: S) -> Self {
        self.source_service = Some(service.into());
        self
    }

    pub fn destination<S: Into<String>>(mut self, service: S) -> Self {
        self.destination_service = Some(service.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.destination_port = Some(port);
        self
    }

    pub fn request<M: Into<String>, P: Into<String>>(mut self, method: M, path: P) -> Self {
        self.method = Some(method.into());
        self.path = Some(path.into());
        self
    }

    pub fn auth(mut self, auth: AuthContext) -> Self {
        self.auth_context = Some(auth);
        self
    }
}

/// 정책 평가 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub allowed: bool,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_policy_id: Option<String>,
}

// === 조건 평가 ===

fn listed(list: &[String], value: Option<&str>) -> bool {
    match value {
        Some(value) => list.iter().any(|item| item == WILDCARD || item == value),
        None => false,
    }
}

impl SourceConstraint {
    pub fn matches(&self, ctx: &PolicyContext) -> bool {
        let auth = ctx.auth_context.as_ref();

        if let Some(principals) = &self.principals {
            let user = auth.and_then(|a| a.user_id.as_deref());
            let service = ctx.source_service.as_deref();
            if !listed(principals, user) && !listed(principals, service) {
                return false;
            }
        }

        if let Some(namespaces) = &self.namespaces {
            if !listed(namespaces, auth.and_then(|a| a.namespace.as_deref())) {
                return false;
            }
        }
        true
    }
}

impl DestinationConstraint {
    pub fn matches(&self, ctx: &PolicyContext) -> bool {
        if let Some(services) = &self.services {
            if !listed(services, ctx.destination_service.as_deref()) {
                return false;
            }
        }

        if let Some(ports) = &self.ports {
            match ctx.destination_port {
                Some(port) if ports.contains(&port) => {}
                _ => return false,
            }
        }

        if let Some(paths) = &self.paths {
            if !paths.iter().any(|rule| rule.matches(ctx)) {
                return false;
            }
        }
        true
    }
}

impl PathRule {
    pub fn matches(&self, ctx: &PolicyContext) -> bool {
        let Some(path) = ctx.path.as_deref() else {
            return false;
        };
        if !path.starts_with(self.path_prefix.as_str()) {
            return false;
        }
        match (&self.methods, ctx.method.as_deref()) {
            (None, _) => true,
            (Some(methods), Some(method)) => methods.iter().any(|m| m.eq_ignore_ascii_case(method)),
            (Some(_), None) => false,
        }
    }
}

impl SecurityPolicy {
    /// 선언된 source/destination 조건이 모두 만족되는지 여부
    pub fn matches(&self, ctx: &PolicyContext) -> bool {
        self.source.as_ref().map_or(true, |s| s.matches(ctx))
            && self.destination.as_ref().map_or(true, |d| d.matches(ctx))
    }
}
