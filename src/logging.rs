use std::path::Path;
use std::time::Instant;

use tracing::{error, info, span, warn, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::settings::{LogFormat, LogOutput, LogSettings};

pub type InitError = Box<dyn std::error::Error + Send + Sync>;

/// 전역 tracing 구독자를 설치합니다.
///
/// `RUST_LOG`가 있으면 그 지시어가 우선이고 설정의 레벨은 기본값으로만 쓰입니다.
/// 돌려받은 가드가 살아 있는 동안만 로그가 기록되므로 프로세스 끝까지 보관해야 합니다.
pub fn init_logging(settings: &LogSettings) -> Result<WorkerGuard, InitError> {
    let filter = EnvFilter::builder()
        .with_default_directive(settings.level.into())
        .from_env_lossy();

    let (writer, guard) = match &settings.output {
        LogOutput::Stdout => tracing_appender::non_blocking(std::io::stdout()),
        LogOutput::File(path) => {
            let path = Path::new(path);
            let directory = path
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .ok_or_else(|| format!("로그 파일 이름이 없음: {}", path.display()))?;
            tracing_appender::non_blocking(tracing_appender::rolling::daily(directory, file_name))
        }
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::new(time::format_description::well_known::Rfc3339))
        .with_writer(writer)
        .with_ansi(matches!(settings.output, LogOutput::Stdout))
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    match settings.format {
        LogFormat::Text => builder.try_init()?,
        LogFormat::Json => builder.json().try_init()?,
    }

    Ok(guard)
}

/// 메시를 통과한 호출 한 건의 기록
#[derive(Debug, Clone)]
pub struct CallLog {
    pub call_id: String,
    pub method: String,
    pub path: String,
    pub source_service: Option<String>,
    pub route_id: Option<String>,
    pub target_service: Option<String>,
    pub allowed: Option<bool>,
    pub attempts: u32,
    pub duration_ms: u64,
    pub error: Option<String>,
    started: Instant,
}

impl CallLog {
    pub fn new<M: Into<String>, P: Into<String>>(method: M, path: P) -> Self {
        Self {
            call_id: Uuid::new_v4().to_string(),
            method: method.into(),
            path: path.into(),
            source_service: None,
            route_id: None,
            target_service: None,
            allowed: None,
            attempts: 0,
            duration_ms: 0,
            error: None,
            started: Instant::now(),
        }
    }

    pub fn with_source(&mut self, source_service: Option<&str>) {
        self.source_service = source_service.map(str::to_string);
    }

    pub fn with_route(&mut self, route_id: &str, target_service: &str) {
        self.route_id = Some(route_id.to_string());
        self.target_service = Some(target_service.to_string());
    }

    pub fn with_decision(&mut self, allowed: bool) {
        self.allowed = Some(allowed);
    }

    pub fn with_attempts(&mut self, attempts: u32) {
        self.attempts = attempts;
    }

    pub fn with_error(&mut self, error: impl std::fmt::Display) {
        self.error = Some(error.to_string());
    }

    /// 경과 시간을 기록합니다.
    pub fn finish(&mut self) {
        self.duration_ms = self.started.elapsed().as_millis() as u64;
    }

    fn level(&self) -> Level {
        if self.allowed == Some(false) || (self.route_id.is_none() && self.error.is_some()) {
            Level::WARN
        } else if self.error.is_some() {
            Level::ERROR
        } else {
            Level::INFO
        }
    }
}

/// 결과에 따라 레벨을 골라 호출 기록을 남깁니다.
///
/// 거부와 라우트 없음은 WARN, 다운스트림 실패는 ERROR입니다.
pub fn log_call(log: &CallLog) {
    let level = log.level();

    let span = span!(
        Level::INFO,
        "call",
        call_id = %log.call_id,
        method = %log.method,
        path = %log.path,
        source = ?log.source_service,
        duration_ms = %log.duration_ms
    );
    let _enter = span.enter();

    match level {
        Level::ERROR => error!(
            route = ?log.route_id,
            target = ?log.target_service,
            attempts = log.attempts,
            error = ?log.error,
            "호출 실패"
        ),
        Level::WARN => warn!(
            route = ?log.route_id,
            allowed = ?log.allowed,
            error = ?log.error,
            "호출 거부"
        ),
        _ => info!(
            route = ?log.route_id,
            target = ?log.target_service,
            attempts = log.attempts,
            "호출 완료"
        ),
    }
}
