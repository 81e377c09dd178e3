use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use async_trait::async_trait;
use tracing::{debug, error, info};

use super::document::ConfigDocument;
use super::error::StoreError;
use super::file;
use super::ConfigSource;

/// 서비스 설정에 전역 기본값을 채워 넣을 때 사용하는 키 매핑
/// (전역 키, 서비스 키)
const SERVICE_DEFAULTS: [(&str, &str); 2] = [
    ("defaultTimeoutMs", "timeoutMs"),
    ("defaultRetries", "retries"),
];

/// 변경이 일어난 설정 범위
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigScope {
    Global,
    Service,
}

/// 리스너에게 전달되는 변경 알림
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigChange {
    pub scope: ConfigScope,
    /// `Service` 범위일 때만 채워짐
    pub service_id: Option<String>,
    /// 병합이 끝난 설정
    pub config: ConfigDocument,
}

pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

type Listener = Arc<dyn Fn(&ConfigChange) -> Result<(), ListenerError> + Send + Sync>;

struct ListenerEntry {
    id: u64,
    callback: Listener,
}

type ListenerList = Mutex<Vec<ListenerEntry>>;

/// 리스너 등록 해제 핸들
///
/// 핸들을 그냥 버리면 리스너는 계속 등록된 상태로 남습니다.
#[derive(Debug)]
#[must_use = "구독을 해제하려면 unsubscribe()를 호출해야 합니다"]
pub struct Subscription {
    id: u64,
    listeners: Weak<ListenerList>,
}

impl Subscription {
    /// 리스너를 제거합니다. 이미 제거되었거나 저장소가 사라졌으면 `false`.
    pub fn unsubscribe(self) -> bool {
        let Some(listeners) = self.listeners.upgrade() else {
            return false;
        };
        let mut listeners = listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|entry| entry.id != self.id);
        before != listeners.len()
    }
}

/// 전역/서비스별 설정을 보관하고 변경을 통지하는 저장소입니다.
///
/// 읽기는 항상 마지막으로 병합된 스냅샷의 복사본을 돌려주며 실패하지 않습니다.
///
/// 병합은 잠금 안에서, 통지는 잠금 밖에서 일어납니다. 여러 스레드에서 동시에
/// 업데이트하면 리스너가 받는 스냅샷의 순서는 병합 순서와 다를 수 있습니다.
pub struct ConfigStore {
    global: RwLock<ConfigDocument>,
    services: RwLock<HashMap<String, ConfigDocument>>,
    listeners: Arc<ListenerList>,
    next_listener_id: AtomicU64,
}

impl ConfigStore {
    pub fn new(global: ConfigDocument) -> Self {
        Self::with_services(global, HashMap::new())
    }

    pub fn with_services(global: ConfigDocument, services: HashMap<String, ConfigDocument>) -> Self {
        Self {
            global: RwLock::new(global),
            services: RwLock::new(services),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener_id: AtomicU64::new(0),
        }
    }

    /// JSON 설정 파일로부터 저장소를 생성합니다.
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let loaded = file::load_file(path).await?;
        Ok(Self::with_services(loaded.global, loaded.services))
    }

    /// 설정 파일을 다시 읽어 저장소 내용을 파일 내용으로 교체합니다.
    ///
    /// 병합이 아니라 교체이므로 파일에서 지운 키와 서비스는 저장소에서도 사라집니다.
    /// 전역 설정 변경이 먼저, 이어서 파일에 있는 서비스마다 변경이 통지됩니다.
    /// 파일이 잘못되었으면 저장소는 그대로 유지됩니다.
    pub async fn replace_from_file<P: AsRef<Path>>(&self, path: P) -> Result<(), StoreError> {
        let loaded = file::load_file(&path).await?;
        info!(
            path = %path.as_ref().display(),
            services = loaded.services.len(),
            "설정 파일 재적용"
        );

        {
            let mut global = self.global.write().unwrap_or_else(PoisonError::into_inner);
            *global = loaded.global.clone();
        }
        {
            let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);
            *services = loaded.services.clone();
        }

        self.notify(ConfigChange {
            scope: ConfigScope::Global,
            service_id: None,
            config: loaded.global,
        });
        let mut services: Vec<_> = loaded.services.into_iter().collect();
        services.sort_by(|a, b| a.0.cmp(&b.0));
        for (service_id, config) in services {
            self.notify(ConfigChange {
                scope: ConfigScope::Service,
                service_id: Some(service_id),
                config,
            });
        }
        Ok(())
    }

    pub fn get_global_config(&self) -> ConfigDocument {
        self.global.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// 전역 설정에 부분 설정을 얕게 병합하고 리스너에게 알립니다.
    pub fn update_global_config(&self, partial: ConfigDocument) -> ConfigDocument {
        let merged = {
            let mut global = self.global.write().unwrap_or_else(PoisonError::into_inner);
            global.merge(partial);
            global.clone()
        };
        debug!(keys = merged.len(), "전역 설정 업데이트");

        self.notify(ConfigChange {
            scope: ConfigScope::Global,
            service_id: None,
            config: merged.clone(),
        });
        merged
    }

    /// 전역 기본값 위에 서비스별 설정을 덮어쓴 결과를 돌려줍니다.
    pub fn get_service_config(&self, service_id: &str) -> ConfigDocument {
        let mut effective = ConfigDocument::new();
        {
            let global = self.global.read().unwrap_or_else(PoisonError::into_inner);
            for (global_key, service_key) in SERVICE_DEFAULTS {
                if let Some(value) = global.get(global_key) {
                    effective.insert(service_key, value.clone());
                }
            }
        }

        let services = self.services.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(overrides) = services.get(service_id) {
            effective.merge(overrides.clone());
        }
        effective
    }

    /// 서비스별 설정에 부분 설정을 병합하고 리스너에게 알립니다.
    pub fn update_service_config(&self, service_id: &str, partial: ConfigDocument) -> ConfigDocument {
        let merged = {
            let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);
            let stored = services.entry(service_id.to_string()).or_default();
            stored.merge(partial);
            stored.clone()
        };
        debug!(service = %service_id, keys = merged.len(), "서비스 설정 업데이트");

        self.notify(ConfigChange {
            scope: ConfigScope::Service,
            service_id: Some(service_id.to_string()),
            config: merged.clone(),
        });
        merged
    }

    pub fn service_ids(&self) -> Vec<String> {
        let services = self.services.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<String> = services.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// 설정 변경 리스너를 등록합니다.
    ///
    /// 리스너는 등록 순서대로 동기 호출되며, 한 리스너의 실패나 패닉은
    /// 로그만 남기고 다음 리스너 호출을 막지 않습니다.
    pub fn on_config_change<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ConfigChange) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ListenerEntry {
                id,
                callback: Arc::new(listener),
            });

        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn notify(&self, change: ConfigChange) {
        // 리스너 안에서 저장소를 다시 호출해도 교착되지 않도록 잠금 밖에서 호출
        let snapshot: Vec<(u64, Listener)> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|entry| (entry.id, Arc::clone(&entry.callback)))
            .collect();

        for (id, callback) in snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| callback(&change))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(
                    listener_id = id,
                    scope = ?change.scope,
                    service = ?change.service_id,
                    error = %e,
                    "설정 변경 리스너 실패"
                ),
                Err(_) => error!(
                    listener_id = id,
                    scope = ?change.scope,
                    service = ?change.service_id,
                    "설정 변경 리스너 패닉"
                ),
            }
        }
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(ConfigDocument::new())
    }
}

#[async_trait]
impl ConfigSource for ConfigStore {
    async fn global_config(&self) -> Result<ConfigDocument, StoreError> {
        Ok(self.get_global_config())
    }
}
