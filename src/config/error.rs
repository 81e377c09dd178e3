use std::fmt;

/// 설정 저장소 관련 에러입니다.
#[derive(Debug)]
pub enum StoreError {
    /// 설정 원본을 읽을 수 없음 (원격 저장소 장애 등)
    Unavailable {
        reason: String,
    },
    /// 설정 파일 입출력 실패
    FileError {
        path: String,
        error: std::io::Error,
    },
    /// 설정 파일 JSON 파싱 실패
    ParseError {
        path: String,
        source: serde_json::Error,
    },
    /// 스키마 검증 실패
    SchemaError {
        path: String,
        errors: Vec<String>,
    },
    /// 스키마 자체를 컴파일할 수 없음
    SchemaCompileError {
        reason: String,
    },
    /// 객체가 아닌 값을 설정 문서로 사용하려 함
    NotAnObject {
        what: String,
    },
    /// 파일 감시 실패
    WatchError(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { reason } =>
                write!(f, "설정 저장소를 사용할 수 없음: {}", reason),
            Self::FileError { path, error } =>
                write!(f, "설정 파일 {} 오류: {}", path, error),
            Self::ParseError { path, source } =>
                write!(f, "설정 파일 {} 파싱 오류: {}", path, source),
            Self::SchemaError { path, errors } =>
                write!(f, "설정 파일 {} 스키마 검증 실패: {}", path, errors.join("; ")),
            Self::SchemaCompileError { reason } =>
                write!(f, "스키마 컴파일 오류: {}", reason),
            Self::NotAnObject { what } =>
                write!(f, "설정 문서는 객체여야 함 (실제: {})", what),
            Self::WatchError(reason) =>
                write!(f, "설정 파일 감시 오류: {}", reason),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::FileError { error, .. } => Some(error),
            Self::ParseError { source, .. } => Some(source),
            _ => None,
        }
    }
}
