//! 규칙/정책 컬렉션의 적재(load-then-swap) 공통 로직입니다.
//!
//! 세 컴포넌트(라우트, 재시도 정책, 보안 정책)는 모두 같은 방식으로 동작합니다.
//! 전역 설정에서 배열 필드를 읽어 타입 검증을 거친 뒤 한 번에 교체하고,
//! 실패하면 이전 내용을 버리고 빈 컬렉션으로 전환합니다.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::{ConfigSource, StoreError};

/// 컬렉션 적재 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// 아직 한 번도 적재하지 않음
    Unloaded,
    /// 적재 진행 중 (이전 컬렉션은 교체 전까지 그대로 보임)
    Loading,
    Loaded { count: usize },
    /// 마지막 적재가 실패하여 컬렉션이 비어 있음
    Failed,
}

/// 적재 경계에서 발생하는 에러
#[derive(Debug)]
pub enum LoadError {
    /// 설정 원본 읽기 실패
    Store(StoreError),
    /// 문서 형식 오류
    Malformed {
        field: &'static str,
        index: Option<usize>,
        reason: String,
    },
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(e) => write!(f, "설정 읽기 실패: {}", e),
            Self::Malformed { field, index: Some(index), reason } =>
                write!(f, "{}[{}] 형식 오류: {}", field, index, reason),
            Self::Malformed { field, index: None, reason } =>
                write!(f, "{} 형식 오류: {}", field, reason),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            Self::Malformed { .. } => None,
        }
    }
}

impl From<StoreError> for LoadError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

/// 역직렬화 이후의 의미 검증
pub trait Validate {
    fn validate(&self) -> Result<(), String>;
}

/// 전역 설정의 `field` 배열을 읽어 타입으로 변환합니다.
///
/// 필드가 없거나 배열이 아니면 `Ok(None)`. 항목 하나라도 잘못되면
/// 전체가 `LoadError::Malformed`가 됩니다.
pub(crate) async fn fetch_array<T>(
    source: &dyn ConfigSource,
    field: &'static str,
) -> Result<Option<Vec<T>>, LoadError>
where
    T: DeserializeOwned + Validate,
{
    let global = source.global_config().await?;
    let items = match global.get(field) {
        Some(Value::Array(items)) => items,
        _ => return Ok(None),
    };

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let parsed = T::deserialize(item).map_err(|e| LoadError::Malformed {
                field,
                index: Some(index),
                reason: e.to_string(),
            })?;
            parsed.validate().map_err(|reason| LoadError::Malformed {
                field,
                index: Some(index),
                reason,
            })?;
            Ok(parsed)
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

/// 원자적으로 교체되는 컬렉션과 그 적재 상태
pub(crate) struct Swappable<C> {
    current: RwLock<Arc<C>>,
    state: RwLock<LoadState>,
}

impl<C: Default> Swappable<C> {
    pub(crate) fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(C::default())),
            state: RwLock::new(LoadState::Unloaded),
        }
    }

    /// 현재 컬렉션 스냅샷. 이후 교체가 일어나도 스냅샷은 변하지 않습니다.
    pub(crate) fn snapshot(&self) -> Arc<C> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub(crate) fn state(&self) -> LoadState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn begin(&self) {
        self.set_state(LoadState::Loading);
    }

    pub(crate) fn replace(&self, collection: C, count: usize) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(collection);
        self.set_state(LoadState::Loaded { count });
    }

    /// 이전 내용을 버리고 빈 컬렉션으로 전환합니다.
    pub(crate) fn fail(&self) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(C::default());
        self.set_state(LoadState::Failed);
    }

    fn set_state(&self, state: LoadState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigDocument, ConfigStore};
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Item {
        id: String,
    }

    impl Validate for Item {
        fn validate(&self) -> Result<(), String> {
            if self.id.is_empty() {
                return Err("id가 비어 있음".to_string());
            }
            Ok(())
        }
    }

    fn store(value: Value) -> ConfigStore {
        ConfigStore::new(ConfigDocument::try_from(value).unwrap())
    }

    #[tokio::test]
    async fn test_missing_field_is_none() {
        let store = store(json!({}));
        let items = fetch_array::<Item>(&store, "items").await.unwrap();
        assert!(items.is_none());
    }

    #[tokio::test]
    async fn test_non_array_is_none() {
        let store = store(json!({ "items": { "id": "a" } }));
        let items = fetch_array::<Item>(&store, "items").await.unwrap();
        assert!(items.is_none());
    }

    #[tokio::test]
    async fn test_validation_failure_reports_index() {
        let store = store(json!({ "items": [{ "id": "a" }, { "id": "" }] }));
        match fetch_array::<Item>(&store, "items").await {
            Err(LoadError::Malformed { field, index, .. }) => {
                assert_eq!(field, "items");
                assert_eq!(index, Some(1));
            }
            other => panic!("형식 오류를 기대했지만 {:?}", other),
        }
    }

    #[test]
    fn test_swappable_lifecycle() {
        let cell: Swappable<Vec<u32>> = Swappable::new();
        assert_eq!(cell.state(), LoadState::Unloaded);

        cell.begin();
        assert_eq!(cell.state(), LoadState::Loading);

        cell.replace(vec![1, 2, 3], 3);
        let before = cell.snapshot();
        assert_eq!(cell.state(), LoadState::Loaded { count: 3 });

        cell.fail();
        assert_eq!(cell.state(), LoadState::Failed);
        assert!(cell.snapshot().is_empty());
        // 교체 전에 얻은 스냅샷은 그대로
        assert_eq!(*before, vec![1, 2, 3]);
    }
}
