use thiserror::Error;

/// 连接器错误类型定义
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("触发限流: {layer}")]
    RateLimited { layer: RateLimitLayer },

    #[error("重复的关联ID: {id}")]
    DuplicateCorrelation { id: String },

    #[error("传输层错误: {0}")]
    Transport(String),

    #[error("网关不可达: {0}")]
    GatewayUnreachable(String),

    #[error("请求超时")]
    Timeout,

    #[error("请求已取消")]
    Cancelled,

    #[error("网关返回内部错误: {message} (code: {code})")]
    RemoteInternal { code: i64, message: String },

    #[error("信封格式非法: {0}")]
    Malformed(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("配置错误: {0}")]
    Configuration(String),
}

/// 限流层级，用于区分调用被哪一层拒绝
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitLayer {
    OutboundGlobal,
    OutboundWorkflow,
    InboundGlobal,
    InboundSender,
}

impl RateLimitLayer {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitLayer::OutboundGlobal => "outbound-global",
            RateLimitLayer::OutboundWorkflow => "outbound-workflow",
            RateLimitLayer::InboundGlobal => "inbound-global",
            RateLimitLayer::InboundSender => "inbound-sender",
        }
    }
}

impl std::fmt::Display for RateLimitLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ConnectorError {
    pub fn rate_limited(layer: RateLimitLayer) -> Self {
        Self::RateLimited { layer }
    }
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Self::Transport(msg.into())
    }
    pub fn malformed<S: Into<String>>(msg: S) -> Self {
        Self::Malformed(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    /// 是否为超时错误，用于结果指标的状态标签
    pub fn is_timeout(&self) -> bool {
        matches!(self, ConnectorError::Timeout)
    }
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ConnectorError::Cancelled)
    }
}

/// 统一的Result类型
pub type ConnectorResult<T> = std::result::Result<T, ConnectorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_layer_labels() {
        assert_eq!(RateLimitLayer::OutboundGlobal.as_str(), "outbound-global");
        assert_eq!(
            RateLimitLayer::OutboundWorkflow.as_str(),
            "outbound-workflow"
        );
        assert_eq!(RateLimitLayer::InboundGlobal.as_str(), "inbound-global");
        assert_eq!(RateLimitLayer::InboundSender.as_str(), "inbound-sender");
    }

    #[test]
    fn test_error_display_contains_layer() {
        let err = ConnectorError::rate_limited(RateLimitLayer::OutboundWorkflow);
        assert!(err.to_string().contains("outbound-workflow"));
    }

    #[test]
    fn test_classification_predicates() {
        assert!(ConnectorError::Timeout.is_timeout());
        assert!(!ConnectorError::Cancelled.is_timeout());
        assert!(ConnectorError::Cancelled.is_cancelled());
        assert!(!ConnectorError::transport("boom").is_cancelled());
    }
}
