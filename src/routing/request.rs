use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// 헤더/쿼리 값. 같은 이름이 여러 번 올 수 있습니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Single(String),
    Multi(Vec<String>),
}

impl ParamValue {
    pub fn values(&self) -> impl Iterator<Item = &str> {
        let slice: &[String] = match self {
            Self::Single(value) => std::slice::from_ref(value),
            Self::Multi(values) => values,
        };
        slice.iter().map(String::as_str)
    }

    /// 값이 하나도 없는 경우 (빈 배열)
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Multi(values) if values.is_empty())
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Single(value)
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(values: Vec<String>) -> Self {
        Self::Multi(values)
    }
}

impl From<Vec<&str>> for ParamValue {
    fn from(values: Vec<&str>) -> Self {
        Self::Multi(values.into_iter().map(str::to_string).collect())
    }
}

/// 라우트 매칭에 사용되는 요청 정보
///
/// 헤더 이름은 매칭 시점에 소문자로 정규화되므로 어떤 대소문자로 넣어도 됩니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    pub path: String,
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, ParamValue>,
    #[serde(default)]
    pub query_params: HashMap<String, ParamValue>,
}

impl RequestContext {
    pub fn new<M: Into<String>, P: Into<String>>(method: M, path: P) -> Self {
        Self {
            path: path.into(),
            method: method.into(),
            headers: HashMap::new(),
            query_params: HashMap::new(),
        }
    }

    pub fn with_header<N: Into<String>, V: Into<ParamValue>>(mut self, name: N, value: V) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_query_param<N: Into<String>, V: Into<ParamValue>>(mut self, name: N, value: V) -> Self {
        self.query_params.insert(name.into(), value.into());
        self
    }
}

/// 매칭 한 번 동안 사용하는 정규화된 요청 보기
pub(crate) struct NormalizedRequest<'a> {
    pub path: &'a str,
    pub method: String,
    /// 소문자 이름별로 모은 값. 대소문자만 다른 같은 헤더는 하나로 합쳐짐
    headers: HashMap<String, Vec<&'a str>>,
    query_params: &'a HashMap<String, ParamValue>,
}

impl<'a> NormalizedRequest<'a> {
    pub fn new(request: &'a RequestContext) -> Self {
        let mut headers: HashMap<String, Vec<&'a str>> = HashMap::new();
        for (name, value) in &request.headers {
            headers
                .entry(name.to_ascii_lowercase())
                .or_default()
                .extend(value.values());
        }

        Self {
            path: &request.path,
            method: request.method.to_ascii_uppercase(),
            headers,
            query_params: &request.query_params,
        }
    }

    /// 헤더 값 목록. 값이 하나도 없으면 `None`. `name`은 이미 소문자여야 합니다.
    pub fn header(&self, name: &str) -> Option<&[&'a str]> {
        self.headers
            .get(name)
            .map(Vec::as_slice)
            .filter(|values| !values.is_empty())
    }

    pub fn query_param(&self, name: &str) -> Option<&'a ParamValue> {
        self.query_params.get(name).filter(|value| !value.is_empty())
    }
}
