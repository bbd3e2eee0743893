//! Mock implementation of the transport collaborator
//!
//! Keeps everything in memory so dispatch logic can be tested without a
//! real duplex transport or gateway nodes. Connectivity per gateway and
//! send/sign failures are scriptable; outbound traffic is recorded.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use connector_core::{
    ConnectorError, ConnectorResult, GatewayTransport, InboundHandler, Method, SignedEnvelope,
};

#[derive(Clone)]
pub struct MockGatewayTransport {
    state: Arc<MockTransportState>,
}

struct MockTransportState {
    don_id: Mutex<String>,
    gateway_ids: Mutex<Vec<String>>,
    unreachable: Mutex<HashSet<String>>,
    connection_attempts: Mutex<Vec<String>>,
    sent: Mutex<Vec<(String, SignedEnvelope)>>,
    send_error: Mutex<Option<String>>,
    sign_error: Mutex<Option<String>>,
    signature: Mutex<Vec<u8>>,
    handlers: Mutex<Vec<Vec<Method>>>,
}

impl MockGatewayTransport {
    pub fn new(gateway_ids: Vec<&str>) -> Self {
        Self {
            state: Arc::new(MockTransportState {
                don_id: Mutex::new("don-1".to_string()),
                gateway_ids: Mutex::new(gateway_ids.iter().map(|s| s.to_string()).collect()),
                unreachable: Mutex::new(HashSet::new()),
                connection_attempts: Mutex::new(Vec::new()),
                sent: Mutex::new(Vec::new()),
                send_error: Mutex::new(None),
                sign_error: Mutex::new(None),
                signature: Mutex::new(vec![0xab; 65]),
                handlers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn set_don_id(&self, don_id: &str) {
        *self.state.don_id.lock() = don_id.to_string();
    }

    /// Make `await_connection` fail for the given gateway
    pub fn set_unreachable(&self, gateway_id: &str) {
        self.state.unreachable.lock().insert(gateway_id.to_string());
    }

    pub fn fail_sends_with(&self, message: &str) {
        *self.state.send_error.lock() = Some(message.to_string());
    }

    pub fn fail_signing_with(&self, message: &str) {
        *self.state.sign_error.lock() = Some(message.to_string());
    }

    /// Probe order as observed by the transport
    pub fn connection_attempts(&self) -> Vec<String> {
        self.state.connection_attempts.lock().clone()
    }

    /// Every (gateway, message) pair sent so far
    pub fn sent_messages(&self) -> Vec<(String, SignedEnvelope)> {
        self.state.sent.lock().clone()
    }

    /// Method sets registered through add_handler, one entry per call
    pub fn registered_method_sets(&self) -> Vec<Vec<Method>> {
        self.state.handlers.lock().clone()
    }
}

#[async_trait]
impl GatewayTransport for MockGatewayTransport {
    async fn don_id(&self) -> ConnectorResult<String> {
        Ok(self.state.don_id.lock().clone())
    }

    async fn gateway_ids(&self) -> ConnectorResult<Vec<String>> {
        Ok(self.state.gateway_ids.lock().clone())
    }

    async fn send_to_gateway(
        &self,
        gateway_id: &str,
        message: &SignedEnvelope,
    ) -> ConnectorResult<()> {
        if let Some(err) = self.state.send_error.lock().clone() {
            return Err(ConnectorError::Transport(err));
        }
        self.state
            .sent
            .lock()
            .push((gateway_id.to_string(), message.clone()));
        Ok(())
    }

    async fn await_connection(&self, gateway_id: &str) -> ConnectorResult<()> {
        self.state
            .connection_attempts
            .lock()
            .push(gateway_id.to_string());
        if self.state.unreachable.lock().contains(gateway_id) {
            return Err(ConnectorError::GatewayUnreachable(format!(
                "mock: gateway {gateway_id} unreachable"
            )));
        }
        Ok(())
    }

    async fn sign_message(&self, _data: &[u8]) -> ConnectorResult<Vec<u8>> {
        if let Some(err) = self.state.sign_error.lock().clone() {
            return Err(ConnectorError::Transport(err));
        }
        Ok(self.state.signature.lock().clone())
    }

    async fn add_handler(
        &self,
        methods: &[Method],
        _handler: Arc<dyn InboundHandler>,
    ) -> ConnectorResult<()> {
        self.state.handlers.lock().push(methods.to_vec());
        Ok(())
    }
}
