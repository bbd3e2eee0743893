use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// 出站调用请求，由调用方提供并整体序列化为信封载荷
///
/// `timeout_ms`为0表示使用配置的默认超时；`workflow_id`作为出站准入的限流Key。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutboundRequest {
    pub url: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: Vec<u8>,
    #[serde(default)]
    pub timeout_ms: u64,
    #[serde(default)]
    pub workflow_id: String,
}

/// 网关响应载荷的模式，入站侧只做结构校验
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GatewayResponse {
    pub success: bool,
    #[serde(default)]
    pub error_message: String,
    #[serde(default)]
    pub status_code: u16,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: Vec<u8>,
}
