use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use metrics::{counter, histogram};

/// 调度结果指标
///
/// 原子计数器用于进程内自检与测试断言，同时经metrics门面上报。
#[derive(Debug, Clone, Default)]
pub struct DispatchMetrics {
    requests_success: Arc<AtomicU64>,
    requests_timeout: Arc<AtomicU64>,
    requests_failed: Arc<AtomicU64>,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次出站调用的最终结果，每次调用恰好记录一次
    pub fn record_send_outcome(&self, status: &str, workflow_id: &str, elapsed_ms: u64) {
        match status {
            "success" => self.requests_success.fetch_add(1, Ordering::Relaxed),
            "timeout" => self.requests_timeout.fetch_add(1, Ordering::Relaxed),
            _ => self.requests_failed.fetch_add(1, Ordering::Relaxed),
        };
        counter!(
            "gateway_connector_requests_total",
            "status" => status.to_string(),
            "workflow_id" => workflow_id.to_string()
        )
        .increment(1);
        histogram!(
            "gateway_connector_request_duration_ms",
            "status" => status.to_string()
        )
        .record(elapsed_ms as f64);
    }

    /// 记录一次网关连接探测的耗时
    pub fn record_await_connection(&self, gateway_id: &str, success: bool, elapsed_ms: u64) {
        histogram!(
            "gateway_connector_await_conn_duration_ms",
            "gateway" => gateway_id.to_string(),
            "success" => success.to_string()
        )
        .record(elapsed_ms as f64);
    }

    /// 获取当前统计快照
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_success: self.requests_success.load(Ordering::Relaxed),
            requests_timeout: self.requests_timeout.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
        }
    }
}

/// 指标快照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub requests_success: u64,
    pub requests_timeout: u64,
    pub requests_failed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_counters() {
        let metrics = DispatchMetrics::new();
        metrics.record_send_outcome("success", "wf-1", 12);
        metrics.record_send_outcome("timeout", "wf-1", 20_100);
        metrics.record_send_outcome("fail", "wf-2", 3);
        metrics.record_send_outcome("fail", "wf-2", 5);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_success, 1);
        assert_eq!(snapshot.requests_timeout, 1);
        assert_eq!(snapshot.requests_failed, 2);
    }
}
