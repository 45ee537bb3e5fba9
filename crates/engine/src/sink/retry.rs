//! 재시도 정책 -- 상한이 있는 지수 백오프

use std::time::Duration;

use crate::config::SinkSettings;

/// 재시도 정책
///
/// `limit`은 첫 시도 이후의 재시도 횟수입니다. 총 시도 횟수는 `limit + 1`입니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 최대 재시도 횟수
    pub limit: u32,
    /// 첫 재시도 전 대기 시간
    pub base: Duration,
    /// 대기 시간 상한
    pub max: Duration,
}

impl RetryPolicy {
    /// 정책 생성
    pub fn new(limit: u32, base: Duration, max: Duration) -> Self {
        Self { limit, base, max }
    }

    /// `attempt`번째 시도가 실패한 뒤 기다릴 시간 (1부터 시작)
    ///
    /// `base * 2^(attempt-1)`, 최대 `max`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max)
            .min(self.max)
    }

    /// 총 시도 가능 횟수
    pub fn max_attempts(&self) -> u32 {
        self.limit.saturating_add(1)
    }

    /// `attempts`번 시도한 뒤 한 번 더 시도할 수 있는지 여부
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts()
    }
}

impl From<&SinkSettings> for RetryPolicy {
    fn from(settings: &SinkSettings) -> Self {
        Self::new(settings.retry_limit, settings.backoff_base, settings.backoff_max)
    }
}
