use std::hash::{Hash, Hasher};

use regex_lite as regex;
use serde::Deserialize;
use tracing::error;

use super::error::RuleError;
use super::request::{NormalizedRequest, ParamValue};

/// 적재 시점에 컴파일된 정규식
///
/// 컴파일에 실패한 패턴도 원문은 보관하며, 평가 시에는 항상 불일치로 처리합니다.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Option<regex::Regex>,
}

impl Pattern {
    pub fn new(source: &str) -> Self {
        let regex = match regex::Regex::new(source) {
            Ok(re) => Some(re),
            Err(e) => {
                error!(pattern = %source, error = %e, "정규식 컴파일 실패, 이 조건은 일치하지 않음");
                None
            }
        };
        Self {
            source: source.to_string(),
            regex,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_valid(&self) -> bool {
        self.regex.is_some()
    }

    pub fn is_match(&self, value: &str) -> bool {
        match &self.regex {
            Some(re) => re.is_match(value),
            None => {
                error!(pattern = %self.source, "잘못된 정규식 조건 평가, 불일치로 처리");
                false
            }
        }
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for Pattern {}

impl Hash for Pattern {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source.hash(state);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathMatch {
    Exact(String),
    Prefix(String),
    Regex(Pattern),
}

impl PathMatch {
    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Exact(exact) => path == exact,
            Self::Prefix(prefix) => path.starts_with(prefix.as_str()),
            Self::Regex(pattern) => pattern.is_match(path),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HeaderMatch {
    Exact(String),
    Prefix(String),
    Suffix(String),
    Regex(Pattern),
    /// `true`면 헤더가 있어야 하고 `false`면 없어야 함
    Present(bool),
}

/// 헤더 조건. 이름은 소문자로 저장됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "RawHeaderMatch")]
pub struct HeaderPredicate {
    pub name: String,
    pub matcher: HeaderMatch,
}

impl HeaderPredicate {
    pub(crate) fn matches(&self, request: &NormalizedRequest<'_>) -> bool {
        let value = request.header(&self.name);
        match (&self.matcher, value) {
            (HeaderMatch::Present(expected), value) => value.is_some() == *expected,
            (_, None) => false,
            (matcher, Some(values)) => values.iter().copied().any(|v| match matcher {
                HeaderMatch::Exact(exact) => v == exact,
                HeaderMatch::Prefix(prefix) => v.starts_with(prefix.as_str()),
                HeaderMatch::Suffix(suffix) => v.ends_with(suffix.as_str()),
                HeaderMatch::Regex(pattern) => pattern.is_match(v),
                HeaderMatch::Present(_) => true,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryMatch {
    Exact(String),
    Regex(Pattern),
    /// 값 조건 없이 존재만 확인
    Present,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "RawQueryMatch")]
pub struct QueryPredicate {
    pub name: String,
    pub matcher: QueryMatch,
}

impl QueryPredicate {
    pub(crate) fn matches(&self, request: &NormalizedRequest<'_>) -> bool {
        let Some(value) = request.query_param(&self.name) else {
            return false;
        };
        value_matches(value, |v| match &self.matcher {
            QueryMatch::Exact(exact) => v == exact,
            QueryMatch::Regex(pattern) => pattern.is_match(v),
            QueryMatch::Present => true,
        })
    }
}

fn value_matches<F: Fn(&str) -> bool>(value: &ParamValue, predicate: F) -> bool {
    value.values().any(predicate)
}

/// 하나의 매치 블록. 선언된 조건이 모두 만족되어야 합니다.
///
/// 경로 조건은 최대 하나입니다. 경로 조건이 없는 블록은 모든 경로에 일치하고
/// 메서드/헤더/쿼리 조건만으로 판단합니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "RawHttpRouteMatch")]
pub struct HttpRouteMatch {
    pub path: Option<PathMatch>,
    /// 대문자로 정규화된 메서드 집합. `None`이면 모든 메서드
    pub methods: Option<Vec<String>>,
    pub headers: Vec<HeaderPredicate>,
    pub query_params: Vec<QueryPredicate>,
}

impl HttpRouteMatch {
    pub(crate) fn matches(&self, request: &NormalizedRequest<'_>) -> bool {
        if let Some(methods) = &self.methods {
            if !methods.iter().any(|m| *m == request.method) {
                return false;
            }
        }

        if let Some(path) = &self.path {
            if !path.matches(request.path) {
                return false;
            }
        }

        self.headers.iter().all(|h| h.matches(request))
            && self.query_params.iter().all(|q| q.matches(request))
    }
}

// === 역직렬화용 원시 형태 ===

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawHttpRouteMatch {
    path_exact: Option<String>,
    path_prefix: Option<String>,
    path_regex: Option<String>,
    methods: Option<Vec<String>>,
    #[serde(default)]
    headers: Vec<HeaderPredicate>,
    #[serde(default)]
    query_params: Vec<QueryPredicate>,
}

impl TryFrom<RawHttpRouteMatch> for HttpRouteMatch {
    type Error = RuleError;

    fn try_from(raw: RawHttpRouteMatch) -> Result<Self, Self::Error> {
        let mut declared = Vec::new();
        let mut path = None;
        if let Some(exact) = raw.path_exact {
            declared.push("pathExact");
            path = Some(PathMatch::Exact(exact));
        }
        if let Some(prefix) = raw.path_prefix {
            declared.push("pathPrefix");
            path = Some(PathMatch::Prefix(prefix));
        }
        if let Some(source) = raw.path_regex {
            declared.push("pathRegex");
            path = Some(PathMatch::Regex(Pattern::new(&source)));
        }
        if declared.len() > 1 {
            return Err(RuleError::ConflictingPathMatch { declared });
        }

        Ok(Self {
            path,
            methods: raw
                .methods
                .map(|methods| methods.iter().map(|m| m.to_ascii_uppercase()).collect()),
            headers: raw.headers,
            query_params: raw.query_params,
        })
    }
}

#[derive(Deserialize)]
struct RawHeaderMatch {
    name: String,
    exact: Option<String>,
    prefix: Option<String>,
    suffix: Option<String>,
    regex: Option<String>,
    present: Option<bool>,
}

impl TryFrom<RawHeaderMatch> for HeaderPredicate {
    type Error = RuleError;

    fn try_from(raw: RawHeaderMatch) -> Result<Self, Self::Error> {
        if raw.name.is_empty() {
            return Err(RuleError::EmptyName { what: "헤더" });
        }
        let name = raw.name.to_ascii_lowercase();

        let mut candidates: Vec<(&'static str, HeaderMatch)> = Vec::new();
        if let Some(v) = raw.exact {
            candidates.push(("exact", HeaderMatch::Exact(v)));
        }
        if let Some(v) = raw.prefix {
            candidates.push(("prefix", HeaderMatch::Prefix(v)));
        }
        if let Some(v) = raw.suffix {
            candidates.push(("suffix", HeaderMatch::Suffix(v)));
        }
        if let Some(v) = raw.regex {
            candidates.push(("regex", HeaderMatch::Regex(Pattern::new(&v))));
        }
        if let Some(v) = raw.present {
            candidates.push(("present", HeaderMatch::Present(v)));
        }

        if candidates.len() > 1 {
            return Err(RuleError::ConflictingHeaderMatch {
                name,
                declared: candidates.iter().map(|(kind, _)| *kind).collect(),
            });
        }
        let matcher = candidates
            .pop()
            .map(|(_, matcher)| matcher)
            .unwrap_or(HeaderMatch::Present(true));

        Ok(Self { name, matcher })
    }
}

#[derive(Deserialize)]
struct RawQueryMatch {
    name: String,
    exact: Option<String>,
    regex: Option<String>,
}

impl TryFrom<RawQueryMatch> for QueryPredicate {
    type Error = RuleError;

    fn try_from(raw: RawQueryMatch) -> Result<Self, Self::Error> {
        if raw.name.is_empty() {
            return Err(RuleError::EmptyName { what: "쿼리 파라미터" });
        }
        let matcher = match (raw.exact, raw.regex) {
            (Some(_), Some(_)) => return Err(RuleError::ConflictingQueryMatch { name: raw.name }),
            (Some(exact), None) => QueryMatch::Exact(exact),
            (None, Some(source)) => QueryMatch::Regex(Pattern::new(&source)),
            (None, None) => QueryMatch::Present,
        };
        Ok(Self {
            name: raw.name,
            matcher,
        })
    }
}
