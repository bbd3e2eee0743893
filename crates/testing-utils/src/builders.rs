//! Builders for requests and inbound envelopes

use std::collections::HashMap;

use uuid::Uuid;

use connector_core::{Envelope, GatewayResponse, Method, OutboundRequest, SignedEnvelope, WireError};

/// Builder for outbound requests with sensible test defaults
pub struct OutboundRequestBuilder {
    request: OutboundRequest,
}

impl OutboundRequestBuilder {
    pub fn new() -> Self {
        Self {
            request: OutboundRequest {
                url: "http://example.com".to_string(),
                method: "GET".to_string(),
                headers: HashMap::new(),
                body: Vec::new(),
                timeout_ms: 0,
                workflow_id: "wf-1".to_string(),
            },
        }
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.request.url = url.to_string();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.request.timeout_ms = timeout_ms;
        self
    }

    pub fn with_workflow_id(mut self, workflow_id: &str) -> Self {
        self.request.workflow_id = workflow_id.to_string();
        self
    }

    pub fn build(self) -> OutboundRequest {
        self.request
    }
}

impl Default for OutboundRequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for inbound reply envelopes as a gateway would produce them
pub struct EnvelopeBuilder {
    envelope: Envelope,
    signature: String,
}

impl EnvelopeBuilder {
    pub fn new() -> Self {
        let payload = serde_json::to_value(GatewayResponse {
            success: true,
            error_message: String::new(),
            status_code: 200,
            headers: HashMap::new(),
            body: Vec::new(),
        })
        .unwrap_or(serde_json::Value::Null);

        Self {
            envelope: Envelope {
                correlation_id: Uuid::new_v4().to_string(),
                sender: Some("gateway-sender".to_string()),
                don_id: "don-1".to_string(),
                method: Method::WebApiTarget.as_tag().to_string(),
                payload,
                receiver: None,
            },
            signature: "ab".repeat(65),
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: &str) -> Self {
        self.envelope.correlation_id = correlation_id.to_string();
        self
    }

    pub fn with_sender(mut self, sender: &str) -> Self {
        self.envelope.sender = Some(sender.to_string());
        self
    }

    pub fn with_method_tag(mut self, tag: &str) -> Self {
        self.envelope.method = tag.to_string();
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.envelope.payload = payload;
        self
    }

    pub fn with_signature(mut self, signature: &str) -> Self {
        self.signature = signature.to_string();
        self
    }

    /// Turn the envelope into a genuine internal-error reply
    pub fn internal_error(mut self, code: i64, message: &str) -> Self {
        self.envelope.method = Method::InternalError.as_tag().to_string();
        self.envelope.payload = serde_json::to_value(WireError {
            code,
            message: message.to_string(),
        })
        .unwrap_or(serde_json::Value::Null);
        self
    }

    pub fn build(self) -> SignedEnvelope {
        SignedEnvelope {
            body: self.envelope,
            signature: self.signature,
        }
    }

    /// Wire bytes as delivered by the transport
    pub fn build_raw(self) -> Vec<u8> {
        serde_json::to_vec(&self.build()).unwrap_or_default()
    }
}

impl Default for EnvelopeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
