use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{ConnectorError, ConnectorResult};

pub const DEFAULT_GLOBAL_RPS: f64 = 100.0;
pub const DEFAULT_GLOBAL_BURST: u32 = 100;
pub const DEFAULT_PER_SENDER_RPS: f64 = 100.0;
pub const DEFAULT_PER_SENDER_BURST: u32 = 100;
pub const DEFAULT_WORKFLOW_RPS: f64 = 5.0;
pub const DEFAULT_WORKFLOW_BURST: u32 = 50;

pub const DEFAULT_TIMEOUT_MS: u64 = 20_000;
pub const DEFAULT_CONNECTION_MARGIN_MS: u64 = 100;
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 1_000;
pub const DEFAULT_BACKOFF_INITIAL_MS: u64 = 10;
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 10_000;

/// 双层限流配置
///
/// 字段为0时在构造阶段落回对应方向的默认值，非0字段保持调用方覆盖。
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RateLimiterConfig {
    pub global_rps: f64,
    pub global_burst: u32,
    pub per_key_rps: f64,
    pub per_key_burst: u32,
}

impl RateLimiterConfig {
    /// 出站方向默认值，按工作流限Key
    pub fn outbound_defaults() -> Self {
        Self {
            global_rps: DEFAULT_GLOBAL_RPS,
            global_burst: DEFAULT_GLOBAL_BURST,
            per_key_rps: DEFAULT_WORKFLOW_RPS,
            per_key_burst: DEFAULT_WORKFLOW_BURST,
        }
    }

    /// 入站方向默认值，按发送方限Key
    pub fn inbound_defaults() -> Self {
        Self {
            global_rps: DEFAULT_GLOBAL_RPS,
            global_burst: DEFAULT_GLOBAL_BURST,
            per_key_rps: DEFAULT_PER_SENDER_RPS,
            per_key_burst: DEFAULT_PER_SENDER_BURST,
        }
    }

    /// 0值字段落回给定默认配置
    pub fn or_defaults(mut self, defaults: &RateLimiterConfig) -> Self {
        if self.global_rps == 0.0 {
            self.global_rps = defaults.global_rps;
        }
        if self.global_burst == 0 {
            self.global_burst = defaults.global_burst;
        }
        if self.per_key_rps == 0.0 {
            self.per_key_rps = defaults.per_key_rps;
        }
        if self.per_key_burst == 0 {
            self.per_key_burst = defaults.per_key_burst;
        }
        self
    }

    pub fn validate(&self) -> ConnectorResult<()> {
        if self.global_rps <= 0.0 {
            return Err(ConnectorError::config_error(
                "global_rps must be greater than 0",
            ));
        }
        if self.global_burst == 0 {
            return Err(ConnectorError::config_error(
                "global_burst must be greater than 0",
            ));
        }
        if self.per_key_rps <= 0.0 {
            return Err(ConnectorError::config_error(
                "per_key_rps must be greater than 0",
            ));
        }
        if self.per_key_burst == 0 {
            return Err(ConnectorError::config_error(
                "per_key_burst must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// 连接器整体配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConnectorConfig {
    pub outgoing_rate_limiter: RateLimiterConfig,
    pub incoming_rate_limiter: RateLimiterConfig,
    pub default_timeout_ms: u64,
    pub connection_margin_ms: u64,
    pub probe_timeout_ms: u64,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            outgoing_rate_limiter: RateLimiterConfig::default(),
            incoming_rate_limiter: RateLimiterConfig::default(),
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            connection_margin_ms: DEFAULT_CONNECTION_MARGIN_MS,
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            backoff_initial_ms: DEFAULT_BACKOFF_INITIAL_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
        }
    }
}

impl ConnectorConfig {
    pub fn validate(&self) -> ConnectorResult<()> {
        if self.default_timeout_ms == 0 {
            return Err(ConnectorError::config_error(
                "default_timeout_ms must be greater than 0",
            ));
        }
        if self.probe_timeout_ms == 0 {
            return Err(ConnectorError::config_error(
                "probe_timeout_ms must be greater than 0",
            ));
        }
        if self.backoff_initial_ms == 0 {
            return Err(ConnectorError::config_error(
                "backoff_initial_ms must be greater than 0",
            ));
        }
        if self.backoff_max_ms < self.backoff_initial_ms {
            return Err(ConnectorError::config_error(
                "backoff_max_ms must be greater than or equal to backoff_initial_ms",
            ));
        }
        Ok(())
    }

    pub fn connection_margin(&self) -> Duration {
        Duration::from_millis(self.connection_margin_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn backoff_initial(&self) -> Duration {
        Duration::from_millis(self.backoff_initial_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connector_config_default() {
        let config = ConnectorConfig::default();
        assert_eq!(config.default_timeout_ms, 20_000);
        assert_eq!(config.connection_margin_ms, 100);
        assert_eq!(config.probe_timeout_ms, 1_000);
        assert_eq!(config.backoff_initial_ms, 10);
        assert_eq!(config.backoff_max_ms, 10_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rate_limiter_partial_override_is_additive() {
        let supplied = RateLimiterConfig {
            per_key_burst: 1,
            per_key_rps: 1.0,
            ..Default::default()
        };
        let effective = supplied.or_defaults(&RateLimiterConfig::outbound_defaults());
        // 覆盖的字段保留，未覆盖的字段取默认
        assert_eq!(effective.per_key_burst, 1);
        assert_eq!(effective.per_key_rps, 1.0);
        assert_eq!(effective.global_rps, DEFAULT_GLOBAL_RPS);
        assert_eq!(effective.global_burst, DEFAULT_GLOBAL_BURST);
        assert!(effective.validate().is_ok());
    }

    #[test]
    fn test_inbound_and_outbound_defaults_differ() {
        let outbound = RateLimiterConfig::outbound_defaults();
        let inbound = RateLimiterConfig::inbound_defaults();
        assert_eq!(outbound.per_key_rps, DEFAULT_WORKFLOW_RPS);
        assert_eq!(outbound.per_key_burst, DEFAULT_WORKFLOW_BURST);
        assert_eq!(inbound.per_key_rps, DEFAULT_PER_SENDER_RPS);
        assert_eq!(inbound.per_key_burst, DEFAULT_PER_SENDER_BURST);
    }

    #[test]
    fn test_config_validation() {
        let mut config = ConnectorConfig::default();
        config.default_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = ConnectorConfig::default();
        config.backoff_initial_ms = 100;
        config.backoff_max_ms = 10;
        assert!(config.validate().is_err());

        let zeroed = RateLimiterConfig::default();
        assert!(zeroed.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = ConnectorConfig::default();
        let serialized = serde_json::to_string(&config).expect("Failed to serialize");
        let deserialized: ConnectorConfig =
            serde_json::from_str(&serialized).expect("Failed to deserialize");
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_partial_toml_override() {
        let config: ConnectorConfig = toml::from_str(
            r#"
            default_timeout_ms = 5000

            [outgoing_rate_limiter]
            per_key_rps = 2.0
            "#,
        )
        .expect("Failed to parse toml");

        assert_eq!(config.default_timeout_ms, 5_000);
        assert_eq!(config.connection_margin_ms, DEFAULT_CONNECTION_MARGIN_MS);
        assert_eq!(config.outgoing_rate_limiter.per_key_rps, 2.0);
        assert_eq!(config.outgoing_rate_limiter.global_rps, 0.0);
    }
}
