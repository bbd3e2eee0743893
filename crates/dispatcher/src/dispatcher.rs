use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use connector_core::{
    Clock, ConnectorConfig, ConnectorError, ConnectorResult, Envelope, GatewayTransport,
    InboundHandler, Method, OutboundRequest, RateLimitLayer, RateLimiter, RateLimiterConfig,
    SignedEnvelope, SystemClock,
};

use crate::metrics::DispatchMetrics;
use crate::registry::ResponseRegistry;
use crate::selector::{GatewayCycle, RoundRobinSelector};

/// 出站网关调度器
///
/// 对调用方提供同步语义的[`send`](GatewayDispatcher::send)入口：
/// 准入 -> 构造信封 -> 登记槽位 -> 选择网关 -> 签名发送 -> 限时等待。
/// 入站侧的多路分解实现见inbound模块。
pub struct GatewayDispatcher {
    pub(crate) transport: Arc<dyn GatewayTransport>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) method: Method,
    pub(crate) config: ConnectorConfig,
    pub(crate) outgoing_limiter: RateLimiter,
    pub(crate) incoming_limiter: RateLimiter,
    pub(crate) registry: ResponseRegistry,
    pub(crate) metrics: DispatchMetrics,
    started: AtomicBool,
    closed: AtomicBool,
}

impl GatewayDispatcher {
    pub fn new(
        transport: Arc<dyn GatewayTransport>,
        method: Method,
        config: ConnectorConfig,
    ) -> ConnectorResult<Self> {
        Self::with_clock(transport, method, config, Arc::new(SystemClock))
    }

    /// 注入时钟的构造入口，测试用
    pub fn with_clock(
        transport: Arc<dyn GatewayTransport>,
        method: Method,
        config: ConnectorConfig,
        clock: Arc<dyn Clock>,
    ) -> ConnectorResult<Self> {
        if !method.is_dispatchable() {
            return Err(ConnectorError::config_error(format!(
                "方法 {method} 不允许注册为出站方法"
            )));
        }
        config.validate()?;

        let outgoing_limiter = RateLimiter::new(
            config
                .outgoing_rate_limiter
                .clone()
                .or_defaults(&RateLimiterConfig::outbound_defaults()),
        )?;
        let incoming_limiter = RateLimiter::new(
            config
                .incoming_rate_limiter
                .clone()
                .or_defaults(&RateLimiterConfig::inbound_defaults()),
        )?;

        Ok(Self {
            transport,
            clock,
            method,
            config,
            outgoing_limiter,
            incoming_limiter,
            registry: ResponseRegistry::new(),
            metrics: DispatchMetrics::new(),
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    /// 向传输层注册本调度器处理的方法集合，重复调用幂等
    pub async fn start(self: Arc<Self>) -> ConnectorResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("调度器已启动，忽略重复的start调用");
            return Ok(());
        }
        let handler: Arc<dyn InboundHandler> = self.clone();
        if let Err(err) = self.transport.add_handler(&[self.method], handler).await {
            self.started.store(false, Ordering::SeqCst);
            return Err(err);
        }
        info!("网关调度器已启动: 方法 {}", self.method);
        Ok(())
    }

    /// 关闭幂等且不阻塞，在途调用各自受截止时间约束
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("网关调度器已关闭: 方法 {}", self.method);
    }

    /// 发起一次出站调用并等待对应的入站结果
    ///
    /// `correlation_id`由调用方保证唯一；`cancel`贯穿本次调用的全部阻塞点。
    /// 每次调用恰好产生一条结果指标记录。
    pub async fn send(
        &self,
        correlation_id: &str,
        request: OutboundRequest,
        cancel: CancellationToken,
    ) -> ConnectorResult<Envelope> {
        let started = self.clock.now();
        let workflow_id = request.workflow_id.clone();

        let result = self.send_inner(correlation_id, request, &cancel).await;

        let status = match &result {
            Ok(_) => "success",
            Err(err) if err.is_timeout() => "timeout",
            Err(_) => "fail",
        };
        let elapsed = self.clock.now().duration_since(started);
        self.metrics
            .record_send_outcome(status, &workflow_id, elapsed.as_millis() as u64);

        result
    }

    async fn send_inner(
        &self,
        correlation_id: &str,
        mut request: OutboundRequest,
        cancel: &CancellationToken,
    ) -> ConnectorResult<Envelope> {
        let (workflow_allowed, global_allowed) =
            self.outgoing_limiter.allow_verbose(&request.workflow_id);
        if !workflow_allowed {
            return Err(ConnectorError::rate_limited(RateLimitLayer::OutboundWorkflow));
        }
        if !global_allowed {
            return Err(ConnectorError::rate_limited(RateLimitLayer::OutboundGlobal));
        }

        if request.timeout_ms == 0 {
            request.timeout_ms = self.config.default_timeout_ms;
        }
        // 截止时间包含给网关处理的余量，让真正的远端超时先于本地超时浮现
        let deadline = self.clock.now()
            + Duration::from_millis(request.timeout_ms)
            + self.config.connection_margin();

        let payload = serde_json::to_value(&request)?;
        let don_id = self
            .transport
            .don_id()
            .await
            .map_err(|err| ConnectorError::Transport(format!("获取DON ID失败: {err}")))?;
        let envelope = Envelope::new(correlation_id, &don_id, self.method, payload);

        let mut rx = self.registry.create(correlation_id)?;
        let _guard = RegistryGuard {
            registry: &self.registry,
            id: correlation_id,
        };

        debug!(
            "向网关发送请求: 关联ID {} 工作流 {}",
            correlation_id, request.workflow_id
        );

        let probe_started = self.clock.now();
        let selected = self
            .await_connection(cancel, deadline, correlation_id, &request.workflow_id)
            .await;
        let probe_elapsed = self.clock.now().duration_since(probe_started);
        self.metrics.record_await_connection(
            selected.as_deref().unwrap_or("none"),
            selected.is_ok(),
            probe_elapsed.as_millis() as u64,
        );
        let selected = selected?;

        let signature = self
            .transport
            .sign_message(&envelope.canonical_bytes())
            .await
            .map_err(|err| ConnectorError::Transport(format!("请求签名失败: {err}")))?;
        let signed = SignedEnvelope::new(envelope, &signature);

        self.transport
            .send_to_gateway(&selected, &signed)
            .await
            .map_err(|err| {
                ConnectorError::Transport(format!("发送请求到网关 {selected} 失败: {err}"))
            })?;

        // 等待入站结果、取消或截止时间，三者取其先
        let remaining = deadline.saturating_duration_since(self.clock.now());
        let resolved = tokio::select! {
            biased;
            resolved = rx.recv() => match resolved {
                Some(envelope) => envelope,
                None => return Err(ConnectorError::transport("等待槽位被意外关闭")),
            },
            _ = cancel.cancelled() => return Err(ConnectorError::Cancelled),
            _ = self.clock.sleep(remaining) => return Err(ConnectorError::Timeout),
        };

        if Method::from_tag(&resolved.method) == Some(Method::InternalError) {
            let wire_error = match resolved.wire_error() {
                Ok(wire_error) => wire_error,
                Err(err) => {
                    error!("内部错误载荷解码失败: {} (关联ID {})", err, correlation_id);
                    return Err(ConnectorError::RemoteInternal {
                        code: 500,
                        message: "未知内部错误".to_string(),
                    });
                }
            };
            return Err(ConnectorError::RemoteInternal {
                code: wire_error.code,
                message: wire_error.message,
            });
        }

        debug!("收到网关响应: 关联ID {}", correlation_id);
        Ok(resolved)
    }

    /// 网关连接探测循环
    ///
    /// 每轮要么尝试一个新候选，要么执行严格为正的退避等待；
    /// 取消与截止时间在每次迭代开头检查，而不止于阻塞点。
    async fn await_connection(
        &self,
        cancel: &CancellationToken,
        deadline: Instant,
        correlation_id: &str,
        workflow_id: &str,
    ) -> ConnectorResult<String> {
        let gateway_ids = self
            .transport
            .gateway_ids()
            .await
            .map_err(|err| ConnectorError::Transport(format!("获取网关列表失败: {err}")))?;
        let selector = RoundRobinSelector::new(gateway_ids);
        let mut cycle =
            GatewayCycle::new(self.config.backoff_initial(), self.config.backoff_max());

        loop {
            if cancel.is_cancelled() {
                return Err(ConnectorError::Cancelled);
            }
            if self.clock.now() >= deadline {
                return Err(ConnectorError::Timeout);
            }

            let gateway = selector.next_gateway()?;

            if cycle.attempted(&gateway) && cycle.cycle_exhausted(selector.known_ids()) {
                warn!(
                    "所有网关均尝试失败，退避 {:?} 后重试: 关联ID {}",
                    cycle.backoff(),
                    correlation_id
                );
                tokio::select! {
                    _ = self.clock.sleep(cycle.backoff()) => cycle.complete_cycle(),
                    _ = cancel.cancelled() => return Err(ConnectorError::Cancelled),
                }
            }

            cycle.record_attempt(&gateway);

            info!(
                "已选择网关，等待连接: {} (关联ID {} 工作流 {})",
                gateway, correlation_id, workflow_id
            );

            match self.probe_gateway(cancel, &gateway).await {
                Ok(()) => {
                    debug!("网关连接成功: {}", gateway);
                    return Ok(gateway);
                }
                Err(ConnectorError::Cancelled) => return Err(ConnectorError::Cancelled),
                Err(err) => {
                    warn!("网关连接失败，尝试下一个候选: {} - {}", gateway, err);
                    continue;
                }
            }
        }
    }

    /// 单个候选的连接探测，受固定子超时约束
    async fn probe_gateway(
        &self,
        cancel: &CancellationToken,
        gateway_id: &str,
    ) -> ConnectorResult<()> {
        let probe_timeout = self.config.probe_timeout();
        tokio::select! {
            result = tokio::time::timeout(probe_timeout, self.transport.await_connection(gateway_id)) => {
                match result {
                    Ok(inner) => inner,
                    Err(_) => Err(ConnectorError::GatewayUnreachable(format!(
                        "连接网关 {gateway_id} 超时"
                    ))),
                }
            }
            _ = cancel.cancelled() => Err(ConnectorError::Cancelled),
        }
    }

    pub fn registry(&self) -> &ResponseRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> &DispatchMetrics {
        &self.metrics
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// 槽位清理守卫，保证任意退出路径都恰好移除一次
struct RegistryGuard<'a> {
    registry: &'a ResponseRegistry,
    id: &'a str,
}

impl Drop for RegistryGuard<'_> {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use connector_testing_utils::{FakeClock, MockGatewayTransport};
    use std::time::Duration;

    fn dispatcher_with(
        transport: &MockGatewayTransport,
        clock: &FakeClock,
        config: ConnectorConfig,
    ) -> GatewayDispatcher {
        GatewayDispatcher::with_clock(
            Arc::new(transport.clone()),
            Method::WebApiTarget,
            config,
            Arc::new(clock.clone()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_selects_first_reachable_gateway_without_backoff() {
        let transport = MockGatewayTransport::new(vec!["g1", "g2"]);
        transport.set_unreachable("g1");
        let clock = FakeClock::new();
        let dispatcher = dispatcher_with(&transport, &clock, ConnectorConfig::default());

        let cancel = CancellationToken::new();
        let deadline = clock.now() + Duration::from_secs(30);
        let selected = dispatcher
            .await_connection(&cancel, deadline, "m1", "wf-1")
            .await
            .unwrap();

        assert_eq!(selected, "g2");
        assert_eq!(transport.connection_attempts(), vec!["g1", "g2"]);
        assert!(clock.recorded_sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_backoff_doubles_across_failed_cycles() {
        let transport = MockGatewayTransport::new(vec!["g1", "g2"]);
        transport.set_unreachable("g1");
        transport.set_unreachable("g2");
        let clock = FakeClock::new();
        let dispatcher = dispatcher_with(&transport, &clock, ConnectorConfig::default());

        let cancel = CancellationToken::new();
        let deadline = clock.now() + Duration::from_millis(100);
        let err = dispatcher
            .await_connection(&cancel, deadline, "m1", "wf-1")
            .await
            .unwrap_err();
        assert!(err.is_timeout());

        let sleeps = clock.recorded_sleeps();
        assert_eq!(
            sleeps,
            vec![
                Duration::from_millis(10),
                Duration::from_millis(20),
                Duration::from_millis(40),
                Duration::from_millis(80),
            ]
        );
    }

    #[tokio::test]
    async fn test_backoff_respects_configured_cap() {
        let transport = MockGatewayTransport::new(vec!["g1"]);
        transport.set_unreachable("g1");
        let clock = FakeClock::new();
        let config = ConnectorConfig {
            backoff_max_ms: 40,
            ..Default::default()
        };
        let dispatcher = dispatcher_with(&transport, &clock, config);

        let cancel = CancellationToken::new();
        let deadline = clock.now() + Duration::from_millis(200);
        let err = dispatcher
            .await_connection(&cancel, deadline, "m1", "wf-1")
            .await
            .unwrap_err();
        assert!(err.is_timeout());

        let sleeps = clock.recorded_sleeps();
        assert_eq!(sleeps[0], Duration::from_millis(10));
        assert_eq!(sleeps[1], Duration::from_millis(20));
        assert!(sleeps[2..]
            .iter()
            .all(|&pause| pause == Duration::from_millis(40)));
    }

    #[tokio::test]
    async fn test_cancellation_checked_before_first_attempt() {
        let transport = MockGatewayTransport::new(vec!["g1"]);
        let clock = FakeClock::new();
        let dispatcher = dispatcher_with(&transport, &clock, ConnectorConfig::default());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let deadline = clock.now() + Duration::from_secs(30);
        let err = dispatcher
            .await_connection(&cancel, deadline, "m1", "wf-1")
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(transport.connection_attempts().is_empty());
    }

    #[tokio::test]
    async fn test_empty_gateway_set_is_unreachable() {
        let transport = MockGatewayTransport::new(vec![]);
        let clock = FakeClock::new();
        let dispatcher = dispatcher_with(&transport, &clock, ConnectorConfig::default());

        let cancel = CancellationToken::new();
        let deadline = clock.now() + Duration::from_secs(30);
        let err = dispatcher
            .await_connection(&cancel, deadline, "m1", "wf-1")
            .await
            .unwrap_err();

        assert!(matches!(err, ConnectorError::GatewayUnreachable(_)));
    }
}
