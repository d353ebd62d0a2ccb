// 实时流断开后的重连策略

use std::time::Duration;

use common::DispatchError;
use serde::{Deserialize, Serialize};

/// 重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    /// 立即重试
    Immediate,
    /// 指数退避
    ExponentialBackoff,
    /// 线性退避
    LinearBackoff,
}

/// 错误恢复策略配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorRecoveryPolicy {
    /// 最大重试次数
    pub max_retries: u32,
    /// 重试策略
    pub retry_strategy: RetryStrategy,
    /// 基础退避时间
    #[serde(serialize_with = "crate::serde_helpers::serialize_duration")]
    #[serde(deserialize_with = "crate::serde_helpers::deserialize_duration")]
    pub backoff_base: Duration,
    /// 最大退避时间
    #[serde(serialize_with = "crate::serde_helpers::serialize_duration")]
    #[serde(deserialize_with = "crate::serde_helpers::deserialize_duration")]
    pub backoff_max: Duration,
}

impl Default for ErrorRecoveryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_strategy: RetryStrategy::ExponentialBackoff,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(30),
        }
    }
}

impl ErrorRecoveryPolicy {
    /// 计算第`attempt`次重试（从0开始）前的等待时间
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        match self.retry_strategy {
            RetryStrategy::Immediate => Duration::ZERO,

            RetryStrategy::LinearBackoff => self
                .backoff_base
                .saturating_mul(attempt.saturating_add(1))
                .min(self.backoff_max),

            RetryStrategy::ExponentialBackoff => {
                let multiplier = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
                self.backoff_base
                    .saturating_mul(multiplier)
                    .min(self.backoff_max)
            }
        }
    }

    /// 判断是否应该重试
    ///
    /// 只有实时流错误可以重试，登录和清单错误需要人工处理。
    pub fn should_retry(&self, error: &DispatchError, attempt: u32) -> bool {
        if attempt >= self.max_retries {
            return false;
        }

        matches!(error, DispatchError::LiveFeed(_) | DispatchError::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_immediate() {
        let policy = ErrorRecoveryPolicy {
            max_retries: 3,
            retry_strategy: RetryStrategy::Immediate,
            backoff_base: Duration::from_millis(100),
            backoff_max: Duration::from_secs(10),
        };

        assert_eq!(policy.calculate_delay(0), Duration::ZERO);
        assert_eq!(policy.calculate_delay(2), Duration::ZERO);
    }

    #[test]
    fn test_retry_policy_linear() {
        let policy = ErrorRecoveryPolicy {
            max_retries: 3,
            retry_strategy: RetryStrategy::LinearBackoff,
            backoff_base: Duration::from_millis(100),
            backoff_max: Duration::from_secs(10),
        };

        assert_eq!(policy.calculate_delay(0), Duration::from_millis(100));
        assert_eq!(policy.calculate_delay(1), Duration::from_millis(200));
        assert_eq!(policy.calculate_delay(2), Duration::from_millis(300));
    }

    #[test]
    fn test_retry_policy_exponential_is_capped() {
        let policy = ErrorRecoveryPolicy {
            max_retries: 10,
            retry_strategy: RetryStrategy::ExponentialBackoff,
            backoff_base: Duration::from_millis(100),
            backoff_max: Duration::from_secs(1),
        };

        assert_eq!(policy.calculate_delay(0), Duration::from_millis(100));
        assert_eq!(policy.calculate_delay(3), Duration::from_millis(800));
        assert_eq!(policy.calculate_delay(10), Duration::from_secs(1));
        assert_eq!(policy.calculate_delay(64), Duration::from_secs(1));
    }

    #[test]
    fn test_should_retry() {
        let policy = ErrorRecoveryPolicy::default();

        assert!(policy.should_retry(&DispatchError::LiveFeed("closed".to_string()), 0));
        assert!(!policy.should_retry(
            &DispatchError::AuthenticationFailed {
                host: "nvr1".to_string(),
                reason: "bad password".to_string(),
            },
            0
        ));

        // 超过最大重试次数
        assert!(!policy.should_retry(&DispatchError::LiveFeed("closed".to_string()), 3));
    }

    #[test]
    fn test_policy_from_toml() {
        let policy: ErrorRecoveryPolicy = toml::from_str(
            r#"
max_retries = 7
retry_strategy = "linear_backoff"
backoff_base = 250
"#,
        )
        .unwrap();

        assert_eq!(policy.max_retries, 7);
        assert_eq!(policy.retry_strategy, RetryStrategy::LinearBackoff);
        assert_eq!(policy.backoff_base, Duration::from_millis(250));
        assert_eq!(policy.backoff_max, Duration::from_secs(30));
    }
}
