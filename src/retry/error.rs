use std::fmt;

/// 재시도 분류에 사용되는 상태 코드를 노출하는 오류
///
/// 두 코드 모두 없으면 어떤 정책으로도 재시도되지 않습니다.
pub trait StatusCodes {
    fn http_status_code(&self) -> Option<u16> {
        None
    }

    fn grpc_status_code(&self) -> Option<&str> {
        None
    }
}

impl<E: StatusCodes + ?Sized> StatusCodes for Box<E> {
    fn http_status_code(&self) -> Option<u16> {
        (**self).http_status_code()
    }

    fn grpc_status_code(&self) -> Option<&str> {
        (**self).grpc_status_code()
    }
}

/// 다운스트림 호출 실패
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownstreamError {
    pub message: String,
    pub http_status_code: Option<u16>,
    pub grpc_status_code: Option<String>,
}

impl DownstreamError {
    pub fn http<M: Into<String>>(status: u16, message: M) -> Self {
        Self {
            message: message.into(),
            http_status_code: Some(status),
            grpc_status_code: None,
        }
    }

    pub fn grpc<C: Into<String>, M: Into<String>>(code: C, message: M) -> Self {
        Self {
            message: message.into(),
            http_status_code: None,
            grpc_status_code: Some(code.into()),
        }
    }

    /// 상태 코드가 없는 실패 (연결 오류 등)
    pub fn other<M: Into<String>>(message: M) -> Self {
        Self {
            message: message.into(),
            http_status_code: None,
            grpc_status_code: None,
        }
    }
}

impl StatusCodes for DownstreamError {
    fn http_status_code(&self) -> Option<u16> {
        self.http_status_code
    }

    fn grpc_status_code(&self) -> Option<&str> {
        self.grpc_status_code.as_deref()
    }
}

impl fmt::Display for DownstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.http_status_code, &self.grpc_status_code) {
            (Some(http), _) => write!(f, "다운스트림 실패 (HTTP {}): {}", http, self.message),
            (None, Some(grpc)) => write!(f, "다운스트림 실패 (gRPC {}): {}", grpc, self.message),
            (None, None) => write!(f, "다운스트림 실패: {}", self.message),
        }
    }
}

impl std::error::Error for DownstreamError {}

/// 재시도 정책 문서의 형식 오류
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyError {
    MissingId,
    InvalidMaxAttempts {
        policy_id: String,
        value: u32,
    },
    InvalidMultiplier {
        policy_id: String,
        value: f64,
    },
}

impl fmt::Display for PolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingId =>
                write!(f, "재시도 정책 id가 비어 있음"),
            Self::InvalidMaxAttempts { policy_id, value } =>
                write!(f, "재시도 정책 {}의 maxAttempts는 1 이상이어야 함 (실제: {})", policy_id, value),
            Self::InvalidMultiplier { policy_id, value } =>
                write!(f, "재시도 정책 {}의 multiplier는 양수여야 함 (실제: {})", policy_id, value),
        }
    }
}

impl std::error::Error for PolicyError {}
