//! 이름이 붙은 정책에 따른 재시도 실행을 제공하는 모듈입니다.

mod error;
mod handler;
mod policy;

pub use error::{DownstreamError, PolicyError, StatusCodes};
pub use handler::{RetryHandler, RETRY_POLICIES_KEY};
pub use policy::{
    calculate_delay, calculate_delay_with, should_retry, BackoffStrategy, RetryPolicy,
    DEFAULT_MULTIPLIER, EXPONENTIAL_JITTER_RATIO,
};
