//! 链路退避策略与状态机。

use std::time::Duration;
use tokio::time::Instant;

/// 指数退避：第 n 次连续失败后等待 `min(floor × 2^(n-1), ceiling)`。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub floor: Duration,
    pub ceiling: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            floor: Duration::from_secs(1),
            ceiling: Duration::from_secs(60),
        }
    }
}

impl BackoffPolicy {
    pub fn new(floor: Duration, ceiling: Duration) -> Self {
        Self {
            floor,
            ceiling: ceiling.max(floor),
        }
    }

    pub fn delay(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return Duration::ZERO;
        }
        let shift = (consecutive_failures - 1).min(31);
        self.floor
            .checked_mul(1u32 << shift)
            .map_or(self.ceiling, |delay| delay.min(self.ceiling))
    }
}

/// 端口链路状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Healthy,
    Backoff { failures: u32, until: Instant },
}

impl LinkStatus {
    /// 是否允许向链路发起请求。退避到期后的第一次请求作为探测。
    pub fn ready(&self, now: Instant) -> bool {
        match self {
            Self::Healthy => true,
            Self::Backoff { until, .. } => *until <= now,
        }
    }

    pub fn failures(&self) -> u32 {
        match self {
            Self::Healthy => 0,
            Self::Backoff { failures, .. } => *failures,
        }
    }

    pub fn backoff_until(&self) -> Option<Instant> {
        match self {
            Self::Healthy => None,
            Self::Backoff { until, .. } => Some(*until),
        }
    }

    pub fn on_failure(self, policy: &BackoffPolicy, now: Instant) -> Self {
        let failures = self.failures().saturating_add(1);
        Self::Backoff {
            failures,
            until: now + policy.delay(failures),
        }
    }

    pub fn on_success(self) -> Self {
        Self::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_until_ceiling() {
        let policy = BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(30));
        let delays: Vec<u64> = (0..8).map(|n| policy.delay(n).as_secs()).collect();
        assert_eq!(delays, vec![0, 1, 2, 4, 8, 16, 30, 30]);
    }

    #[test]
    fn delay_is_monotonic_and_bounded() {
        let policy = BackoffPolicy::new(Duration::from_millis(250), Duration::from_secs(60));
        let mut previous = Duration::ZERO;
        for failures in 0..200 {
            let delay = policy.delay(failures);
            assert!(delay >= previous);
            assert!(delay <= policy.ceiling);
            previous = delay;
        }
        assert_eq!(policy.delay(u32::MAX), policy.ceiling);
    }

    #[test]
    fn ceiling_never_below_floor() {
        let policy = BackoffPolicy::new(Duration::from_secs(5), Duration::from_secs(1));
        assert_eq!(policy.delay(1), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn status_resets_on_success() {
        let policy = BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(10));
        let now = Instant::now();

        let status = LinkStatus::Healthy.on_failure(&policy, now);
        assert_eq!(status.failures(), 1);
        assert!(!status.ready(now));
        assert!(status.ready(now + Duration::from_secs(1)));

        let status = status.on_failure(&policy, now);
        assert_eq!(status.backoff_until(), Some(now + Duration::from_secs(2)));

        let status = status.on_success();
        assert_eq!(status, LinkStatus::Healthy);
        assert_eq!(status.on_failure(&policy, now).failures(), 1);
    }
}
