use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Result as NotifyResult, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error};

use super::error::StoreError;

/// 설정 파일 변경 이벤트
#[derive(Debug, PartialEq, Clone)]
pub enum ConfigEvent {
    Modified(PathBuf),
    Created(PathBuf),
    Deleted(PathBuf),
}

impl ConfigEvent {
    /// 파일을 다시 읽어야 하는 이벤트인지 여부
    pub fn requires_reload(&self) -> bool {
        matches!(self, Self::Modified(_) | Self::Created(_))
    }
}

/// 단일 설정 파일 감시자
///
/// 편집기가 파일을 교체하는 경우도 잡기 위해 상위 디렉토리를 감시하고
/// 대상 파일 이름으로 이벤트를 거릅니다.
pub struct ConfigWatcher {
    target: PathBuf,
    event_tx: mpsc::Sender<ConfigEvent>,
    event_rx: mpsc::Receiver<ConfigEvent>,
    watcher: Option<RecommendedWatcher>,
}

impl ConfigWatcher {
    pub fn new<P: Into<PathBuf>>(target: P) -> Self {
        let (event_tx, event_rx) = mpsc::channel(32);
        Self {
            target: target.into(),
            event_tx,
            event_rx,
            watcher: None,
        }
    }

    /// 감시자를 만들고 바로 감시를 시작합니다.
    pub fn watch_file<P: Into<PathBuf>>(target: P) -> Result<Self, StoreError> {
        let mut watcher = Self::new(target);
        watcher.start()?;
        Ok(watcher)
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    #[cfg(test)]
    pub(crate) fn sender(&self) -> mpsc::Sender<ConfigEvent> {
        self.event_tx.clone()
    }

    pub fn start(&mut self) -> Result<(), StoreError> {
        let event_tx = self.event_tx.clone();
        let file_name = self.target.file_name().map(|name| name.to_os_string());

        let mut watcher = notify::recommended_watcher(move |res: NotifyResult<Event>| match res {
            Ok(event) => {
                for path in event.paths {
                    if file_name.as_deref() != path.file_name() {
                        continue;
                    }
                    let config_event = match event.kind {
                        EventKind::Modify(_) => ConfigEvent::Modified(path),
                        EventKind::Create(_) => ConfigEvent::Created(path),
                        EventKind::Remove(_) => ConfigEvent::Deleted(path),
                        _ => continue,
                    };
                    debug!(event = ?config_event, "설정 파일 이벤트");
                    // notify 전용 스레드에서 호출되므로 블로킹 전송 가능
                    let _ = event_tx.blocking_send(config_event);
                }
            }
            Err(e) => error!("감시 오류: {}", e),
        })
        .map_err(|e| StoreError::WatchError(e.to_string()))?;

        let dir = match self.target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        debug!(dir = %dir.display(), file = %self.target.display(), "설정 파일 감시 시작");
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| StoreError::WatchError(e.to_string()))?;

        self.watcher = Some(watcher);
        Ok(())
    }

    /// 다음 이벤트를 기다립니다.
    pub async fn next_event(&mut self) -> Option<ConfigEvent> {
        self.event_rx.recv().await
    }
}
