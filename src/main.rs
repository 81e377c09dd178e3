use std::process::ExitCode;
use std::sync::Arc;

use mesh_control_plane::config::{ConfigStore, ConfigWatcher};
use mesh_control_plane::logging::init_logging;
use mesh_control_plane::settings::Settings;
use mesh_control_plane::MeshControlPlane;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    // 설정 로드 (로깅 초기화 전이므로 stderr로 보고)
    let settings = match Settings::load().await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("설정 로드 실패: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let _guard = match init_logging(&settings.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("로깅 초기화 실패: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let store = match &settings.config.path {
        Some(path) => match ConfigStore::from_file(path).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                error!(error = %e, path = %path.display(), "메시 구성 파일 로드 실패");
                return ExitCode::FAILURE;
            }
        },
        None => {
            warn!("메시 구성 파일이 지정되지 않음, 빈 설정으로 시작 (모든 요청 거부)");
            Arc::new(ConfigStore::default())
        }
    };

    let mesh = Arc::new(MeshControlPlane::new(store.clone()));
    match mesh.reload().await {
        Ok(summary) => info!(
            routes = summary.routes,
            retry_policies = summary.retry_policies,
            security_policies = summary.security_policies,
            "제어 평면 시작"
        ),
        // 실패한 컴포넌트는 빈 상태로 동작하므로 계속 진행
        Err(e) => error!(error = %e, "초기 적재 실패"),
    }

    let (subscription, reload_task) = mesh.watch_store(&store);

    let mut watcher = match (&settings.config.path, settings.config.watch) {
        (Some(path), true) => match ConfigWatcher::watch_file(path.clone()) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                error!(error = %e, "구성 파일 감시 시작 실패");
                None
            }
        },
        _ => None,
    };

    loop {
        let event = async {
            match watcher.as_mut() {
                Some(watcher) => watcher.next_event().await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("종료 신호 수신");
                break;
            }
            event = event => {
                let Some(event) = event else {
                    warn!("구성 파일 감시 채널 종료");
                    watcher = None;
                    continue;
                };
                if !event.requires_reload() {
                    warn!(event = ?event, "구성 파일이 삭제됨, 현재 설정 유지");
                    continue;
                }
                if let Some(path) = &settings.config.path {
                    if let Err(e) = store.replace_from_file(path).await {
                        error!(error = %e, "구성 파일 재적용 실패, 이전 설정 유지");
                    }
                }
            }
        }
    }

    subscription.unsubscribe();
    if let Err(e) = reload_task.await {
        error!(error = %e, "재적재 작업 종료 실패");
    }
    ExitCode::SUCCESS
}
