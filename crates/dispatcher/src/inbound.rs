use async_trait::async_trait;
use tracing::{debug, error, warn};

use connector_core::{Envelope, InboundHandler, Method, SignedEnvelope, WireError};

use crate::dispatcher::GatewayDispatcher;

/// 入站限流拒绝时写入内部错误载荷的原因文案
pub const ERROR_INCOMING_RATELIMIT_SENDER: &str = "发送方消息超过单发送方速率限制";
pub const ERROR_INCOMING_RATELIMIT_GLOBAL: &str = "网关消息超过全局速率限制";

#[async_trait]
impl InboundHandler for GatewayDispatcher {
    /// 处理网关的异步回复并解析回对应的等待槽位
    ///
    /// 非法、未知关联或不支持的入站消息一律记录后丢弃，
    /// 绝不向传输层传播错误，双工通道必须继续服务其余在途调用。
    async fn on_message(&self, gateway_id: &str, raw: &[u8]) {
        let signed = match SignedEnvelope::from_wire(raw) {
            Ok(signed) => signed,
            Err(err) => {
                error!("入站信封校验失败: {} (网关 {})", err, gateway_id);
                return;
            }
        };
        let envelope = signed.body;

        let Some(slot) = self.registry.resolver(&envelope.correlation_id) else {
            warn!(
                "未找到等待槽位，调用方可能已超时: 关联ID {} (网关 {})",
                envelope.correlation_id, gateway_id
            );
            return;
        };

        let sender = envelope.sender.clone().unwrap_or_default();
        let (sender_allowed, global_allowed) = self.incoming_limiter.allow_verbose(&sender);
        let mut reason = String::new();
        if !sender_allowed {
            reason.push_str(ERROR_INCOMING_RATELIMIT_SENDER);
        }
        if !global_allowed {
            if !reason.is_empty() {
                reason.push('\n');
            }
            reason.push_str(ERROR_INCOMING_RATELIMIT_GLOBAL);
        }
        if !reason.is_empty() {
            error!(
                "入站消息被限流: 关联ID {} 发送方 {}",
                envelope.correlation_id, sender
            );
            // 合成内部错误并照常解析等待方，而不是让调用自然超时
            let synthesized = Envelope::internal_error(
                &envelope.correlation_id,
                WireError {
                    code: 500,
                    message: reason,
                },
            );
            if slot.try_send(synthesized).is_err() {
                debug!(
                    "槽位已被占用或放弃，丢弃限流回执: 关联ID {}",
                    envelope.correlation_id
                );
            }
            return;
        }

        debug!(
            "处理网关消息: 关联ID {} 方法 {}",
            envelope.correlation_id, envelope.method
        );

        match Method::from_tag(&envelope.method) {
            Some(method) => {
                if let Err(err) = method.check_payload(&envelope.payload) {
                    error!(
                        "入站载荷模式校验失败: {} (关联ID {})",
                        err, envelope.correlation_id
                    );
                    return;
                }
                let correlation_id = envelope.correlation_id.clone();
                if slot.try_send(envelope).is_err() {
                    debug!("槽位已被占用或放弃，丢弃响应: 关联ID {}", correlation_id);
                }
            }
            None => {
                error!(
                    "不支持的方法: {} (关联ID {})",
                    envelope.method, envelope.correlation_id
                );
            }
        }
    }
}
