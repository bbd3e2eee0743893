use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::ConnectorResult;
use crate::models::{Method, SignedEnvelope};

/// 网关双工传输抽象接口，由宿主进程提供实现
#[async_trait]
pub trait GatewayTransport: Send + Sync {
    /// 解析当前节点所属DON的标识
    async fn don_id(&self) -> ConnectorResult<String>;

    /// 列出当前已知的网关节点
    async fn gateway_ids(&self) -> ConnectorResult<Vec<String>>;

    /// 向指定网关发送已签名信封
    async fn send_to_gateway(
        &self,
        gateway_id: &str,
        message: &SignedEnvelope,
    ) -> ConnectorResult<()>;

    /// 等待与指定网关建立连接
    async fn await_connection(&self, gateway_id: &str) -> ConnectorResult<()>;

    /// 对规范化字节做签名
    async fn sign_message(&self, data: &[u8]) -> ConnectorResult<Vec<u8>>;

    /// 注册入站消息处理器及其方法集合
    async fn add_handler(
        &self,
        methods: &[Method],
        handler: Arc<dyn InboundHandler>,
    ) -> ConnectorResult<()>;
}

/// 入站消息处理器
///
/// 处理过程不向传输层传播错误，坏消息记录后丢弃。
#[async_trait]
pub trait InboundHandler: Send + Sync {
    async fn on_message(&self, gateway_id: &str, raw: &[u8]);
}
