use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use connector_core::{ConnectorError, ConnectorResult};

/// 轮询网关选择策略
pub struct RoundRobinSelector {
    gateway_ids: Vec<String>,
    counter: AtomicUsize,
}

impl RoundRobinSelector {
    pub fn new(gateway_ids: Vec<String>) -> Self {
        Self {
            gateway_ids,
            counter: AtomicUsize::new(0),
        }
    }

    /// 指定起始下标，测试用
    pub fn with_start_index(gateway_ids: Vec<String>, start: usize) -> Self {
        Self {
            gateway_ids,
            counter: AtomicUsize::new(start),
        }
    }

    pub fn next_gateway(&self) -> ConnectorResult<String> {
        if self.gateway_ids.is_empty() {
            return Err(ConnectorError::GatewayUnreachable(
                "没有可用的网关节点".to_string(),
            ));
        }
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % self.gateway_ids.len();
        Ok(self.gateway_ids[index].clone())
    }

    pub fn known_ids(&self) -> &[String] {
        &self.gateway_ids
    }
}

/// 一次探测循环内的尝试计数与退避状态
///
/// 显式状态机：转移步骤均为纯函数，等待本身由调用方经时钟抽象执行。
/// 退避在整轮失败后翻倍，受上限约束，计数随之清零。
#[derive(Debug)]
pub struct GatewayCycle {
    attempts: HashMap<String, u32>,
    backoff: Duration,
    backoff_max: Duration,
}

impl GatewayCycle {
    pub fn new(backoff_initial: Duration, backoff_max: Duration) -> Self {
        Self {
            attempts: HashMap::new(),
            backoff: backoff_initial,
            backoff_max,
        }
    }

    /// 该候选在本轮是否已尝试过
    pub fn attempted(&self, gateway_id: &str) -> bool {
        self.attempts.get(gateway_id).copied().unwrap_or(0) > 0
    }

    /// 所有已知候选是否都已尝试过（整轮耗尽）
    pub fn cycle_exhausted(&self, known: &[String]) -> bool {
        known.iter().all(|id| self.attempted(id))
    }

    pub fn record_attempt(&mut self, gateway_id: &str) {
        *self.attempts.entry(gateway_id.to_string()).or_insert(0) += 1;
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// 整轮失败后的状态推进：清空计数并翻倍退避
    pub fn complete_cycle(&mut self) {
        self.attempts.clear();
        self.backoff = (self.backoff * 2).min(self.backoff_max);
    }
}
