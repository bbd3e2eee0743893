use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;

use crate::config::RateLimiterConfig;
use crate::errors::ConnectorResult;

/// 令牌桶，按rps连续补充，容量为burst
#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    rps: f64,
    burst: u32,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(rps: f64, burst: u32, now: Instant) -> Self {
        Self {
            tokens: burst as f64,
            rps,
            burst,
            last_refill: now,
        }
    }

    fn allow(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rps).min(self.burst as f64);
        self.last_refill = now;
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// 双层限流器
///
/// 全局桶与按Key桶相互独立，每次检查两层各自消耗令牌，
/// 两层同时放行才算通过。按Key桶在首次出现时惰性创建。
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    global: Mutex<TokenBucket>,
    per_key: Mutex<HashMap<String, TokenBucket>>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> ConnectorResult<Self> {
        config.validate()?;
        let now = Instant::now();
        Ok(Self {
            global: Mutex::new(TokenBucket::new(config.global_rps, config.global_burst, now)),
            per_key: Mutex::new(HashMap::new()),
            config,
        })
    }

    /// 分别返回按Key层与全局层的放行结果
    pub fn allow_verbose(&self, key: &str) -> (bool, bool) {
        let now = Instant::now();
        let key_allowed = {
            let mut buckets = self.per_key.lock();
            buckets
                .entry(key.to_string())
                .or_insert_with(|| {
                    TokenBucket::new(self.config.per_key_rps, self.config.per_key_burst, now)
                })
                .allow(now)
        };
        let global_allowed = self.global.lock().allow(now);
        (key_allowed, global_allowed)
    }

    /// 两层都放行才允许通过
    pub fn allow(&self, key: &str) -> bool {
        let (key_allowed, global_allowed) = self.allow_verbose(key);
        key_allowed && global_allowed
    }
}
