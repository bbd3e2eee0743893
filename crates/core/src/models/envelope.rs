use serde::{Deserialize, Serialize};

use crate::errors::{ConnectorError, ConnectorResult};

use super::request::GatewayResponse;

/// 网关双工传输上交换的消息信封
///
/// `method`在线上是字符串标签，封闭的方法集合见[`Method`]。
/// `sender`仅出现在入站回复中，由网关侧填写，用于入站准入的限流Key。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub correlation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    pub don_id: String,
    pub method: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
}

impl Envelope {
    pub fn new(
        correlation_id: &str,
        don_id: &str,
        method: Method,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            correlation_id: correlation_id.to_string(),
            sender: None,
            don_id: don_id.to_string(),
            method: method.as_tag().to_string(),
            payload,
            receiver: None,
        }
    }

    /// 构造内部错误信封，用于向等待方投递失败结果
    pub fn internal_error(correlation_id: &str, error: WireError) -> Self {
        Self {
            correlation_id: correlation_id.to_string(),
            sender: None,
            don_id: String::new(),
            method: Method::InternalError.as_tag().to_string(),
            payload: serde_json::to_value(&error).unwrap_or(serde_json::Value::Null),
            receiver: None,
        }
    }

    /// 签名所覆盖的规范化字节编码
    ///
    /// 字段按固定顺序拼接并以0字节分隔，保证签名输入确定。
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for field in [
            self.correlation_id.as_str(),
            self.don_id.as_str(),
            self.method.as_str(),
        ] {
            out.extend_from_slice(field.as_bytes());
            out.push(0);
        }
        out.extend_from_slice(self.payload.to_string().as_bytes());
        out.push(0);
        if let Some(receiver) = &self.receiver {
            out.extend_from_slice(receiver.as_bytes());
        }
        out
    }

    /// 解码内部错误信封携带的错误载荷
    pub fn wire_error(&self) -> ConnectorResult<WireError> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// 信封加其分离签名
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignedEnvelope {
    pub body: Envelope,
    pub signature: String,
}

impl SignedEnvelope {
    /// 附加签名字节，十六进制编码
    pub fn new(body: Envelope, signature: &[u8]) -> Self {
        Self {
            body,
            signature: hex::encode(signature),
        }
    }

    /// 从入站原始字节解析并做结构校验
    pub fn from_wire(raw: &[u8]) -> ConnectorResult<Self> {
        let signed: SignedEnvelope = serde_json::from_slice(raw)
            .map_err(|e| ConnectorError::malformed(format!("信封解析失败: {e}")))?;
        signed.validate()?;
        Ok(signed)
    }

    /// 结构校验：必填字段非空、签名为合法十六进制。签名算法本身由传输层负责
    pub fn validate(&self) -> ConnectorResult<()> {
        if self.body.correlation_id.is_empty() {
            return Err(ConnectorError::malformed("信封缺少关联ID"));
        }
        if self.body.don_id.is_empty() {
            return Err(ConnectorError::malformed("信封缺少DON ID"));
        }
        if self.body.method.is_empty() {
            return Err(ConnectorError::malformed("信封缺少方法标签"));
        }
        if self.signature.is_empty() {
            return Err(ConnectorError::malformed("信封缺少签名"));
        }
        if hex::decode(&self.signature).is_err() {
            return Err(ConnectorError::malformed("签名不是合法的十六进制编码"));
        }
        Ok(())
    }
}

/// 支持的方法标签（封闭集合）
///
/// 入站路由通过[`Method::from_tag`]查表，未知标签不进入该枚举，
/// 由入站侧按丢弃处理。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    WebApiTarget,
    ComputeAction,
    WorkflowSyncer,
    InternalError,
}

impl Method {
    pub fn as_tag(&self) -> &'static str {
        match self {
            Method::WebApiTarget => "web_api_target",
            Method::ComputeAction => "compute_action",
            Method::WorkflowSyncer => "workflow_syncer",
            Method::InternalError => "internal_error",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Method> {
        match tag {
            "web_api_target" => Some(Method::WebApiTarget),
            "compute_action" => Some(Method::ComputeAction),
            "workflow_syncer" => Some(Method::WorkflowSyncer),
            "internal_error" => Some(Method::InternalError),
            _ => None,
        }
    }

    /// 可注册为出站调用的方法，internal_error为保留标签
    pub fn is_dispatchable(&self) -> bool {
        !matches!(self, Method::InternalError)
    }

    /// 入站载荷的模式校验，只检查结构不解释业务含义
    pub fn check_payload(&self, payload: &serde_json::Value) -> ConnectorResult<()> {
        match self {
            Method::WebApiTarget | Method::ComputeAction | Method::WorkflowSyncer => {
                serde_json::from_value::<GatewayResponse>(payload.clone())?;
            }
            Method::InternalError => {
                serde_json::from_value::<WireError>(payload.clone())?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// 内部错误信封携带的错误载荷
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireError {
    pub code: i64,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_envelope() -> Envelope {
        Envelope::new(
            "corr-1",
            "don-1",
            Method::WebApiTarget,
            json!({"url": "http://example.com"}),
        )
    }

    #[test]
    fn test_wire_field_names_are_camel_case() {
        let signed = SignedEnvelope::new(sample_envelope(), &[0xab, 0xcd]);
        let text = serde_json::to_string(&signed).unwrap();
        assert!(text.contains("\"correlationId\""));
        assert!(text.contains("\"donId\""));
        assert!(text.contains("\"signature\":\"abcd\""));
        // 未填写的可选字段不出现在线上
        assert!(!text.contains("receiver"));
        assert!(!text.contains("sender"));
    }

    #[test]
    fn test_canonical_bytes_deterministic_and_distinct() {
        let a = sample_envelope();
        let b = sample_envelope();
        assert_eq!(a.canonical_bytes(), b.canonical_bytes());

        let mut c = sample_envelope();
        c.correlation_id = "corr-2".to_string();
        assert_ne!(a.canonical_bytes(), c.canonical_bytes());
    }

    #[test]
    fn test_method_tag_table() {
        for method in [
            Method::WebApiTarget,
            Method::ComputeAction,
            Method::WorkflowSyncer,
            Method::InternalError,
        ] {
            assert_eq!(Method::from_tag(method.as_tag()), Some(method));
        }
        assert_eq!(Method::from_tag("no_such_method"), None);
        assert!(!Method::InternalError.is_dispatchable());
        assert!(Method::WebApiTarget.is_dispatchable());
    }

    #[test]
    fn test_validate_rejects_missing_fields() {
        let valid = SignedEnvelope::new(sample_envelope(), &[0x01]);
        assert!(valid.validate().is_ok());

        let mut missing_id = valid.clone();
        missing_id.body.correlation_id.clear();
        assert!(missing_id.validate().is_err());

        let mut missing_signature = valid.clone();
        missing_signature.signature.clear();
        assert!(missing_signature.validate().is_err());

        let mut bad_signature = valid.clone();
        bad_signature.signature = "zz-not-hex".to_string();
        assert!(bad_signature.validate().is_err());
    }

    #[test]
    fn test_from_wire_round_trip() {
        let signed = SignedEnvelope::new(sample_envelope(), &[0x01, 0x02]);
        let raw = serde_json::to_vec(&signed).unwrap();
        let parsed = SignedEnvelope::from_wire(&raw).unwrap();
        assert_eq!(parsed, signed);

        assert!(SignedEnvelope::from_wire(b"{not json").is_err());
    }

    #[test]
    fn test_internal_error_envelope() {
        let envelope = Envelope::internal_error(
            "corr-9",
            WireError {
                code: 500,
                message: "boom".to_string(),
            },
        );
        assert_eq!(envelope.method, Method::InternalError.as_tag());
        let decoded = envelope.wire_error().unwrap();
        assert_eq!(decoded.code, 500);
        assert_eq!(decoded.message, "boom");
    }

    #[test]
    fn test_check_payload_schema_only() {
        let ok = json!({"success": true, "statusCode": 200});
        assert!(Method::WebApiTarget.check_payload(&ok).is_ok());

        let bad = json!({"success": "not-a-bool"});
        assert!(Method::WebApiTarget.check_payload(&bad).is_err());

        let err_payload = json!({"code": 500, "message": "x"});
        assert!(Method::InternalError.check_payload(&err_payload).is_ok());
    }
}
