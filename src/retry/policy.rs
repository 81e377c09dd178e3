use rand::Rng;
use serde::{Deserialize, Serialize};

use super::error::{PolicyError, StatusCodes};
use crate::load::Validate;

/// `multiplier`가 없을 때 사용하는 지수 백오프 배수
pub const DEFAULT_MULTIPLIER: f64 = 2.0;

/// 지수 백오프에 더해지는 대칭 지터 비율 (±20%)
pub const EXPONENTIAL_JITTER_RATIO: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackoffStrategy {
    Fixed,
    Exponential,
    RandomJitter,
}

/// 이름이 붙은 재시도 정책
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    pub id: String,
    /// 첫 시도를 포함한 최대 시도 횟수
    pub max_attempts: u32,
    pub backoff_strategy: BackoffStrategy,
    pub initial_interval_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_interval_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiplier: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retry_on_http_status_codes: Vec<u16>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retry_on_grpc_status_codes: Vec<String>,
}

impl RetryPolicy {
    fn clamp(&self, delay_ms: f64) -> f64 {
        match self.max_interval_ms {
            Some(max) => delay_ms.min(max as f64),
            None => delay_ms,
        }
    }
}

impl Validate for RetryPolicy {
    fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err(PolicyError::MissingId.to_string());
        }
        if self.max_attempts < 1 {
            return Err(PolicyError::InvalidMaxAttempts {
                policy_id: self.id.clone(),
                value: self.max_attempts,
            }
            .to_string());
        }
        if let Some(multiplier) = self.multiplier {
            if !multiplier.is_finite() || multiplier <= 0.0 {
                return Err(PolicyError::InvalidMultiplier {
                    policy_id: self.id.clone(),
                    value: multiplier,
                }
                .to_string());
            }
        }
        Ok(())
    }
}

/// 오류가 정책의 재시도 대상 상태 코드에 해당하는지 판단합니다.
///
/// 코드가 일치하지 않으면 남은 시도가 있어도 재시도하지 않습니다.
pub fn should_retry<E: StatusCodes + ?Sized>(error: &E, policy: &RetryPolicy) -> bool {
    let http = error
        .http_status_code()
        .map_or(false, |code| policy.retry_on_http_status_codes.contains(&code));
    let grpc = error.grpc_status_code().map_or(false, |code| {
        policy
            .retry_on_grpc_status_codes
            .iter()
            .any(|c| c.eq_ignore_ascii_case(code))
    });
    http || grpc
}

/// `attempt`번째 시도가 실패한 뒤 다음 시도까지 기다릴 시간 (밀리초)
pub fn calculate_delay(attempt: u32, policy: &RetryPolicy) -> u64 {
    calculate_delay_with(attempt, policy, &mut rand::thread_rng())
}

/// 난수 생성기를 지정하는 `calculate_delay`
///
/// - `FIXED`: `initialIntervalMs`
/// - `EXPONENTIAL`: `initialIntervalMs × multiplier^(attempt−1)`를 상한으로 자른 뒤 ±20% 지터.
///   지터가 상한 이후에 적용되므로 결과는 상한을 최대 20%까지 넘을 수 있습니다.
/// - `RANDOM_JITTER`: `initialIntervalMs + [0, initialIntervalMs]`
///
/// `FIXED`와 `RANDOM_JITTER`는 상한을 넘지 않습니다. 결과는 항상 0 이상의 정수입니다.
pub fn calculate_delay_with<R: Rng>(attempt: u32, policy: &RetryPolicy, rng: &mut R) -> u64 {
    let initial = policy.initial_interval_ms as f64;

    let delay = match policy.backoff_strategy {
        BackoffStrategy::Fixed => policy.clamp(initial),
        BackoffStrategy::Exponential => {
            let multiplier = policy.multiplier.unwrap_or(DEFAULT_MULTIPLIER);
            let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
            let capped = policy.clamp(initial * multiplier.powi(exponent));
            if capped.is_finite() {
                capped + capped * EXPONENTIAL_JITTER_RATIO * rng.gen_range(-1.0..=1.0)
            } else {
                capped
            }
        }
        BackoffStrategy::RandomJitter => policy.clamp(initial + rng.gen_range(0.0..=initial)),
    };

    if delay.is_nan() {
        return 0;
    }
    // `as`는 범위를 벗어난 값을 포화시킴
    delay.max(0.0).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::DownstreamError;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn policy(strategy: BackoffStrategy) -> RetryPolicy {
        RetryPolicy {
            id: "test".to_string(),
            max_attempts: 5,
            backoff_strategy: strategy,
            initial_interval_ms: 100,
            max_interval_ms: None,
            multiplier: None,
            retry_on_http_status_codes: vec![500, 503],
            retry_on_grpc_status_codes: vec!["UNAVAILABLE".to_string()],
        }
    }

    #[test]
    fn test_fixed_delay() {
        let policy = policy(BackoffStrategy::Fixed);
        for attempt in 1..=5 {
            assert_eq!(calculate_delay(attempt, &policy), 100);
        }
    }

    #[test]
    fn test_exponential_within_jitter_band() {
        let mut policy = policy(BackoffStrategy::Exponential);
        policy.multiplier = Some(3.0);
        let mut rng = StdRng::seed_from_u64(7);

        for (attempt, nominal) in [(1u32, 100.0f64), (2, 300.0), (3, 900.0)] {
            for _ in 0..50 {
                let delay = calculate_delay_with(attempt, &policy, &mut rng) as f64;
                assert!(
                    delay >= (nominal * 0.8).floor() && delay <= (nominal * 1.2).ceil(),
                    "attempt {} delay {} nominal {}",
                    attempt,
                    delay,
                    nominal
                );
            }
        }
    }

    #[test]
    fn test_exponential_default_multiplier() {
        let policy = policy(BackoffStrategy::Exponential);
        let mut rng = StdRng::seed_from_u64(1);
        let delay = calculate_delay_with(3, &policy, &mut rng);
        // 100 × 2² = 400 ± 20%
        assert!((320..=480).contains(&delay), "delay {}", delay);
    }

    #[test]
    fn test_exponential_cap_applies_before_jitter() {
        let mut policy = policy(BackoffStrategy::Exponential);
        policy.initial_interval_ms = 10;
        policy.multiplier = Some(10.0);
        policy.max_interval_ms = Some(100);
        let mut rng = StdRng::seed_from_u64(42);

        for attempt in [3, 4, 10, 40] {
            for _ in 0..100 {
                let delay = calculate_delay_with(attempt, &policy, &mut rng);
                assert!(delay <= 120, "attempt {} delay {}", attempt, delay);
                assert!(delay >= 80, "attempt {} delay {}", attempt, delay);
            }
        }
    }

    #[test]
    fn test_exponential_overflow_saturates() {
        let mut policy = policy(BackoffStrategy::Exponential);
        policy.multiplier = Some(1e10);
        let delay = calculate_delay(u32::MAX, &policy);
        assert_eq!(delay, u64::MAX);
    }

    #[test]
    fn test_random_jitter_range() {
        let policy = policy(BackoffStrategy::RandomJitter);
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let delay = calculate_delay_with(1, &policy, &mut rng);
            assert!((100..=200).contains(&delay), "delay {}", delay);
        }
    }

    #[test]
    fn test_random_jitter_respects_cap() {
        let mut policy = policy(BackoffStrategy::RandomJitter);
        policy.max_interval_ms = Some(120);
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..100 {
            assert!(calculate_delay_with(1, &policy, &mut rng) <= 120);
        }
    }

    #[test]
    fn test_zero_interval() {
        let mut policy = policy(BackoffStrategy::RandomJitter);
        policy.initial_interval_ms = 0;
        assert_eq!(calculate_delay(1, &policy), 0);
    }

    #[test]
    fn test_should_retry_classification() {
        let policy = policy(BackoffStrategy::Fixed);

        assert!(should_retry(&DownstreamError::http(503, "unavailable"), &policy));
        assert!(!should_retry(&DownstreamError::http(400, "bad request"), &policy));
        assert!(should_retry(&DownstreamError::grpc("unavailable", "down"), &policy));
        assert!(!should_retry(&DownstreamError::grpc("NOT_FOUND", "missing"), &policy));
        assert!(!should_retry(&DownstreamError::other("boom"), &policy));
    }

    #[test]
    fn test_validation() {
        let mut policy = policy(BackoffStrategy::Fixed);
        assert!(policy.validate().is_ok());

        policy.max_attempts = 0;
        assert!(policy.validate().is_err());

        policy.max_attempts = 1;
        policy.multiplier = Some(0.0);
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_wire_format() {
        let policy: RetryPolicy = serde_json::from_value(serde_json::json!({
            "id": "default",
            "maxAttempts": 3,
            "backoffStrategy": "RANDOM_JITTER",
            "initialIntervalMs": 50,
            "retryOnHttpStatusCodes": [502]
        }))
        .unwrap();

        assert_eq!(policy.backoff_strategy, BackoffStrategy::RandomJitter);
        assert_eq!(policy.retry_on_http_status_codes, vec![502]);
        assert!(policy.retry_on_grpc_status_codes.is_empty());
        assert_eq!(policy.max_interval_ms, None);
    }
}
