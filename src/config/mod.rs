//! 전역/서비스별 설정 저장소와 설정 파일 처리를 담당하는 모듈입니다.

mod document;
mod error;
pub mod file;
mod store;
mod watcher;

use async_trait::async_trait;

pub use document::ConfigDocument;
pub use error::StoreError;
pub use file::{MeshConfigFile, MeshConfigValidator};
pub use store::{ConfigChange, ConfigScope, ConfigStore, ListenerError, Subscription};
pub use watcher::{ConfigEvent, ConfigWatcher};

/// 전역 설정 문서를 제공하는 원본
///
/// 실제 배포에서는 원격 호출일 수 있으므로 비동기이며 실패할 수 있습니다.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn global_config(&self) -> Result<ConfigDocument, StoreError>;
}
